//! Convolution gridding between non-uniformly placed samples and a Cartesian
//! grid, using separable Kaiser-Bessel kernels, with rolloff correction for
//! the apodization the kernel introduces.
//!
//! Coordinates are in grid-cell units centred at zero: a coordinate of 0 on an
//! axis of length `n` addresses the cell at index `n / 2`.

use ndarray::{Array1, Array2, ArrayD, ArrayView1, ArrayView2, ArrayViewD, IxDyn, Zip};
use num_complex::Complex;
use rayon::prelude::*;
use rustfft::FftDirection;
use unchecked_index::get_unchecked_mut;

mod errors;
pub mod fftc;
pub mod kernel;

pub use errors::GriddingError;
pub use kernel::{GridKernel, KaiserBessel, KernelTable};

use fftc::fftc_inplace;

/// Oversampling ratio used for Beatty beta selection when only half-widths
/// are given.
pub const DEFAULT_OVERSAMPLING: f64 = 1.375;

/// Fraction of the peak kernel-transform magnitude below which rolloff
/// denominators are clamped.
pub const ROLLOFF_CLAMP_FRACTION: f64 = 0.05;

/// Spreads weighted complex samples onto a zero-initialised Cartesian grid by
/// convolution with a Kaiser-Bessel kernel.
///
/// For every sample and every integer grid index within the kernel's support
/// box around the sample coordinate, `kernel(idx - c) * value * weight` is
/// added to the grid. Support boxes reaching past the grid edge are clipped;
/// a sample entirely outside the grid contributes nothing.
///
/// * `coords` - sample locations, shape `(npoints, D)`, grid-cell units
/// * `values` - one complex value per sample
/// * `weights` - one density-compensation weight per sample
/// * `out_dims` - target grid extents, one per axis
/// * `half_widths` - kernel support radius per axis, in grid cells
pub fn grid(
    coords: ArrayView2<'_, f64>,
    values: ArrayView1<'_, Complex<f64>>,
    weights: ArrayView1<'_, f64>,
    out_dims: &[usize],
    half_widths: &[f64],
) -> Result<ArrayD<Complex<f64>>, GriddingError> {
    let kernels = beatty_tables(half_widths)?;
    grid_with_kernels(coords, values, weights, out_dims, &kernels)
}

/// As [`grid`], with explicit per-axis kernels substituted for the default
/// Kaiser-Bessel tables.
pub fn grid_with_kernels<K: GridKernel + Sync>(
    coords: ArrayView2<'_, f64>,
    values: ArrayView1<'_, Complex<f64>>,
    weights: ArrayView1<'_, f64>,
    out_dims: &[usize],
    kernels: &[K],
) -> Result<ArrayD<Complex<f64>>, GriddingError> {
    validate_dims(out_dims)?;
    validate_kernels(kernels)?;
    let d = out_dims.len();
    if coords.ncols() != d {
        return Err(GriddingError::RankMismatch {
            axes: coords.ncols(),
            grid: d,
        });
    }
    if kernels.len() != d {
        return Err(GriddingError::RankMismatch {
            axes: kernels.len(),
            grid: d,
        });
    }
    let n = coords.nrows();
    if values.len() != n || weights.len() != n {
        return Err(GriddingError::SampleCountMismatch {
            coords: n,
            values: values.len(),
            weights: weights.len(),
        });
    }

    // row-major strides for the flat accumulation buffer
    let mut strides = vec![0usize; d];
    let mut acc = 1usize;
    for a in (0..d).rev() {
        strides[a] = acc;
        acc *= out_dims[a];
    }

    let identity = || {
        (
            ArrayD::<Complex<f64>>::zeros(IxDyn(out_dims)),
            SupportBox::new(d),
        )
    };

    // overlapping support boxes make a shared grid a write hazard, so each
    // worker accumulates into its own partial grid and the partials are
    // summed afterwards
    let (out, _) = (0..n)
        .into_par_iter()
        .with_min_len(1024)
        .fold(&identity, |(mut partial, mut sb), s| {
            if sb.fill(coords.row(s), out_dims, kernels) {
                let v = values[s] * weights[s];
                let slice = partial.as_slice_memory_order_mut().unwrap();
                sb.visit(|idx, w| {
                    let mut off = 0;
                    for (a, &i) in idx.iter().enumerate() {
                        off += i * strides[a];
                    }
                    debug_assert!(off < slice.len());
                    unsafe {
                        *get_unchecked_mut(slice, off) += v * w;
                    }
                });
            }
            (partial, sb)
        })
        .reduce(&identity, |(mut a, sb), (b, _)| {
            a += &b;
            (a, sb)
        });

    Ok(out)
}

/// Interpolates a complex value at each coordinate by convolving the grid
/// with the kernel: the adjoint of [`grid`], without the weight term.
///
/// Grid cells outside the array are treated as zero, so coordinates near or
/// past the edge read only the in-bounds part of their support box.
///
/// * `coords` - target locations, shape `(npoints, D)`, grid-cell units
/// * `grid_in` - Cartesian source grid of rank `D`
/// * `half_widths` - kernel support radius per axis, in grid cells
pub fn degrid(
    coords: ArrayView2<'_, f64>,
    grid_in: ArrayViewD<'_, Complex<f64>>,
    half_widths: &[f64],
) -> Result<Array1<Complex<f64>>, GriddingError> {
    let kernels = beatty_tables(half_widths)?;
    degrid_with_kernels(coords, grid_in, &kernels)
}

/// As [`degrid`], with explicit per-axis kernels.
pub fn degrid_with_kernels<K: GridKernel + Sync>(
    coords: ArrayView2<'_, f64>,
    grid_in: ArrayViewD<'_, Complex<f64>>,
    kernels: &[K],
) -> Result<Array1<Complex<f64>>, GriddingError> {
    validate_kernels(kernels)?;
    let d = grid_in.ndim();
    if coords.ncols() != d || d == 0 {
        return Err(GriddingError::RankMismatch {
            axes: coords.ncols(),
            grid: d,
        });
    }
    if kernels.len() != d {
        return Err(GriddingError::RankMismatch {
            axes: kernels.len(),
            grid: d,
        });
    }

    let dims = grid_in.shape();
    let mut out = Array1::zeros(coords.nrows());

    // each target writes exactly one output slot, so this path has no
    // accumulation hazard and parallelises per coordinate
    Zip::from(&mut out)
        .and(coords.rows())
        .into_par_iter()
        .for_each_init(
            || SupportBox::new(d),
            |sb, (e, c)| {
                *e = if sb.fill(c, dims, kernels) {
                    let mut acc = Complex::new(0.0, 0.0);
                    sb.visit(|idx, w| acc += grid_in[idx] * w);
                    acc
                } else {
                    Complex::new(0.0, 0.0)
                };
            },
        );

    Ok(out)
}

/// Computes the rolloff-correction map for a grid of the same extents as
/// `grid_in`: the reciprocal magnitude of the transformed footprint of a
/// unit-weight sample gridded at the centre.
///
/// Multiplying a reconstructed image by this map removes the intensity
/// attenuation the kernel's finite support imposes. Within `isofov` grid
/// cells of the centre the map is strictly positive and finite; the
/// denominator is clamped below at [`ROLLOFF_CLAMP_FRACTION`] of its peak.
/// Cells beyond `isofov` are outside the usable field of view and are set
/// to zero rather than amplified.
pub fn rolloff(
    grid_in: ArrayViewD<'_, Complex<f64>>,
    isofov: usize,
    half_widths: &[f64],
) -> Result<ArrayD<f64>, GriddingError> {
    let kernels = beatty_tables(half_widths)?;
    rolloff_with_kernels(grid_in.shape(), isofov, &kernels)
}

/// As [`rolloff`], with explicit per-axis kernels and extents.
pub fn rolloff_with_kernels<K: GridKernel + Sync>(
    out_dims: &[usize],
    isofov: usize,
    kernels: &[K],
) -> Result<ArrayD<f64>, GriddingError> {
    validate_dims(out_dims)?;
    validate_kernels(kernels)?;
    let d = out_dims.len();
    if kernels.len() != d {
        return Err(GriddingError::RankMismatch {
            axes: kernels.len(),
            grid: d,
        });
    }
    let limit = out_dims.iter().copied().min().unwrap() / 2;
    if isofov == 0 || isofov > limit {
        return Err(GriddingError::InvalidIsofov { isofov, limit });
    }

    // spread a unit-weight impulse at the grid centre with the same kernel,
    // then transform it to obtain the apodization footprint
    let coords = Array2::<f64>::zeros((1, d));
    let values = ndarray::arr1(&[Complex::new(1.0, 0.0)]);
    let weights = ndarray::arr1(&[1.0]);
    let mut footprint =
        grid_with_kernels(coords.view(), values.view(), weights.view(), out_dims, kernels)?;

    fftc_inplace(footprint.view_mut(), FftDirection::Forward);

    let magnitude = footprint.mapv(|e| e.norm());
    let peak = magnitude.iter().cloned().fold(0.0, f64::max);
    let floor = peak * ROLLOFF_CLAMP_FRACTION;
    let iso2 = (isofov * isofov) as f64;

    // row-major strides to decode flat offsets back into per-axis indices;
    // both arrays are freshly allocated, so the flat orders agree
    let mut strides = vec![0usize; d];
    let mut acc = 1usize;
    for a in (0..d).rev() {
        strides[a] = acc;
        acc *= out_dims[a];
    }

    let mut out = ArrayD::zeros(IxDyn(out_dims));
    {
        let out_slice = out.as_slice_memory_order_mut().unwrap();
        let mag_slice = magnitude.as_slice_memory_order().unwrap();
        out_slice
            .par_iter_mut()
            .zip(mag_slice.par_iter())
            .enumerate()
            .for_each(|(off, (e, &m))| {
                let mut rem = off;
                let mut r2 = 0.0;
                for a in 0..d {
                    let i = rem / strides[a];
                    rem %= strides[a];
                    let x = i as f64 - (out_dims[a] / 2) as f64;
                    r2 += x * x;
                }
                *e = if r2 <= iso2 { 1.0 / m.max(floor) } else { 0.0 };
            });
    }

    Ok(out)
}

fn validate_dims(dims: &[usize]) -> Result<(), GriddingError> {
    if dims.is_empty() || dims.iter().any(|&e| e == 0) {
        return Err(GriddingError::EmptyExtent);
    }
    Ok(())
}

fn validate_kernels<K: GridKernel>(kernels: &[K]) -> Result<(), GriddingError> {
    for k in kernels {
        let h = k.half_width();
        if !(h > 0.0 && h.is_finite()) {
            return Err(GriddingError::InvalidHalfWidth(h));
        }
    }
    Ok(())
}

fn beatty_tables(half_widths: &[f64]) -> Result<Vec<KernelTable>, GriddingError> {
    half_widths
        .iter()
        .map(|&h| {
            if h > 0.0 && h.is_finite() {
                Ok(KernelTable::beatty(h, DEFAULT_OVERSAMPLING))
            } else {
                Err(GriddingError::InvalidHalfWidth(h))
            }
        })
        .collect()
}

/// Per-worker scratch describing the in-bounds part of one sample's kernel
/// support box: per-axis start indices and kernel tap weights.
struct SupportBox {
    lo: Vec<usize>,
    taps: Vec<Vec<f64>>,
    pos: Vec<usize>,
    idx: Vec<usize>,
}

impl SupportBox {
    fn new(ndim: usize) -> SupportBox {
        SupportBox {
            lo: vec![0; ndim],
            taps: vec![Vec::new(); ndim],
            pos: vec![0; ndim],
            idx: vec![0; ndim],
        }
    }

    /// Computes the clipped support box and per-axis kernel weights for one
    /// coordinate. Returns false if the box is empty on any axis, i.e. the
    /// sample lies entirely outside the grid.
    fn fill<K: GridKernel>(
        &mut self,
        coord: ArrayView1<'_, f64>,
        dims: &[usize],
        kernels: &[K],
    ) -> bool {
        for a in 0..dims.len() {
            let centre = coord[a] + (dims[a] / 2) as f64;
            if !centre.is_finite() {
                return false;
            }
            let h = kernels[a].half_width();
            let lo = (centre - h).ceil() as isize;
            let hi = (centre + h).floor() as isize;
            let lo = lo.max(0);
            let hi = hi.min(dims[a] as isize - 1);
            if lo > hi {
                return false;
            }
            self.lo[a] = lo as usize;
            self.taps[a].clear();
            for i in lo..=hi {
                self.taps[a].push(kernels[a].eval(i as f64 - centre));
            }
        }
        true
    }

    /// Walks every cell of the box, calling `f` with the absolute grid index
    /// and the separable kernel weight product. The last axis varies fastest.
    fn visit<F: FnMut(&[usize], f64)>(&mut self, mut f: F) {
        let d = self.taps.len();
        for a in 0..d {
            self.pos[a] = 0;
            self.idx[a] = self.lo[a];
        }
        loop {
            let mut w = 1.0;
            for a in 0..d {
                w *= self.taps[a][self.pos[a]];
            }
            f(&self.idx, w);

            let mut a = d;
            loop {
                if a == 0 {
                    return;
                }
                a -= 1;
                self.pos[a] += 1;
                if self.pos[a] < self.taps[a].len() {
                    self.idx[a] = self.lo[a] + self.pos[a];
                    break;
                }
                self.pos[a] = 0;
                self.idx[a] = self.lo[a];
            }
        }
    }
}
