use image::{ImageBuffer, Luma};
use ndarray::{Array1, Array2, ArrayD};
use nugrid::fftc::fftc_inplace;
use nugrid::{grid, rolloff};
use num_complex::Complex;
use rustfft::FftDirection;
use std::f64::consts::PI;

/// Reconstructs a radially acquired Gaussian phantom: grid the spokes onto a
/// Cartesian k-space matrix, inverse transform, and apply rolloff correction.
pub fn main() {
    let mtx = 256usize;
    let spokes = 403;
    let per_spoke = 256;
    let sigma = 14.0; // image-domain width of the phantom, in pixels

    let n = spokes * per_spoke;
    let mut coords = Array2::zeros((n, 2));
    let mut values = Array1::zeros(n);
    let mut weights = Array1::zeros(n);

    for s in 0..spokes {
        let theta = s as f64 / spokes as f64 * PI;
        for p in 0..per_spoke {
            let r = (p as f64 / (per_spoke - 1) as f64 - 0.5) * (mtx as f64 - 2.0);
            let ky = r * theta.sin();
            let kx = r * theta.cos();
            let i = s * per_spoke + p;
            coords[[i, 0]] = ky;
            coords[[i, 1]] = kx;

            // analytic spectrum of a centred Gaussian
            let f2 = (ky * ky + kx * kx) / (mtx as f64 * mtx as f64);
            values[i] = Complex::new((-2.0 * PI * PI * sigma * sigma * f2).exp(), 0.0);

            // ramp density compensation for the radial trajectory
            weights[i] = r.abs().max(0.5);
        }
    }

    let half_widths = [1.5, 1.5];
    let mut kspace = grid(
        coords.view(),
        values.view(),
        weights.view(),
        &[mtx, mtx],
        &half_widths,
    )
    .unwrap();

    let correction = rolloff(kspace.view(), mtx / 2, &half_widths).unwrap();

    fftc_inplace(kspace.view_mut(), FftDirection::Inverse);

    let corrected = kspace.mapv(|e| e.norm()) * &correction;

    save_magnitude_png("radial_recon.png", &corrected).unwrap();
    save_magnitude_png("radial_rolloff.png", &correction).unwrap();
}

fn save_magnitude_png(path: &str, img: &ArrayD<f64>) -> Result<(), image::ImageError> {
    let h = img.shape()[0];
    let w = img.shape()[1];
    let peak = img.iter().cloned().fold(0.0, f64::max).max(1e-30);

    let buf = ImageBuffer::from_fn(w as u32, h as u32, |x, y| {
        let v = (img[[y as usize, x as usize]] / peak).max(0.0);
        Luma([(v.sqrt() * 255.0).min(255.0) as u8])
    });
    buf.save(path)
}
