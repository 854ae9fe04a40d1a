//! Immutable uniform sampling grid for pulse envelopes.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::errors::{CpaError, ErrorInfo};

/// Relative tolerance for uniform-spacing validation at construction.
pub const UNIFORM_SPACING_RTOL: f64 = 1e-9;

/// Uniform time/frequency sampling grid shared by all stages of a run.
///
/// A grid is never mutated after construction; resampling produces a new
/// [`Grid`]. Time is carried in femtoseconds and the angular-frequency axis
/// is baseband, i.e. relative to the optical carrier at
/// `center_wavelength_nm`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    samples: usize,
    dt_fs: f64,
    center_wavelength_nm: f64,
}

impl Grid {
    /// Creates a grid from a sample count, time step and center wavelength.
    pub fn new(samples: usize, dt_fs: f64, center_wavelength_nm: f64) -> Result<Self, CpaError> {
        if samples == 0 {
            return Err(CpaError::Config(ErrorInfo::new(
                "grid-empty",
                "grid sample count must be > 0",
            )));
        }
        if !(dt_fs.is_finite() && dt_fs > 0.0) {
            return Err(CpaError::Config(
                ErrorInfo::new("grid-dt", "grid time step must be finite and > 0")
                    .with_value("dt_fs", dt_fs),
            ));
        }
        if !(center_wavelength_nm.is_finite() && center_wavelength_nm > 0.0) {
            return Err(CpaError::Config(
                ErrorInfo::new(
                    "grid-wavelength",
                    "grid center wavelength must be finite and > 0",
                )
                .with_value("center_wavelength_nm", center_wavelength_nm),
            ));
        }
        Ok(Self {
            samples,
            dt_fs,
            center_wavelength_nm,
        })
    }

    /// Builds a grid from explicit time samples, validating uniform spacing.
    ///
    /// Spacing must be uniform within [`UNIFORM_SPACING_RTOL`] relative to
    /// the first interval; the error names the maximum deviation and the
    /// index at which it occurs.
    pub fn from_time_samples(t_fs: &[f64], center_wavelength_nm: f64) -> Result<Self, CpaError> {
        if t_fs.len() < 2 {
            return Err(CpaError::Config(
                ErrorInfo::new("grid-too-short", "grid requires at least two time samples")
                    .with_context("samples", t_fs.len().to_string()),
            ));
        }
        let dt = t_fs[1] - t_fs[0];
        if !(dt.is_finite() && dt > 0.0) {
            return Err(CpaError::Config(
                ErrorInfo::new("grid-dt", "leading time interval must be finite and > 0")
                    .with_value("dt_fs", dt),
            ));
        }
        let mut max_dev = 0.0_f64;
        let mut max_index = 0_usize;
        for (idx, pair) in t_fs.windows(2).enumerate() {
            let dev = ((pair[1] - pair[0]) - dt).abs() / dt.abs();
            if dev > max_dev {
                max_dev = dev;
                max_index = idx + 1;
            }
        }
        if max_dev > UNIFORM_SPACING_RTOL {
            return Err(CpaError::Config(
                ErrorInfo::new("grid-nonuniform", "time samples are not uniformly spaced")
                    .with_value("max_relative_deviation", max_dev)
                    .with_context("at_index", max_index.to_string())
                    .with_value("rtol", UNIFORM_SPACING_RTOL),
            ));
        }
        Self::new(t_fs.len(), dt, center_wavelength_nm)
    }

    /// Number of samples in the grid.
    pub fn samples(&self) -> usize {
        self.samples
    }

    /// Time step in femtoseconds.
    pub fn dt_fs(&self) -> f64 {
        self.dt_fs
    }

    /// Center wavelength in nanometers.
    pub fn center_wavelength_nm(&self) -> f64 {
        self.center_wavelength_nm
    }

    /// Angular frequency resolution `2π/(N·dt)` in rad/fs.
    pub fn domega_rad_per_fs(&self) -> f64 {
        2.0 * std::f64::consts::PI / (self.samples as f64 * self.dt_fs)
    }

    /// Zero-centered time axis in femtoseconds.
    pub fn time_axis_fs(&self) -> Vec<f64> {
        let half = (self.samples / 2) as isize;
        (0..self.samples)
            .map(|k| (k as isize - half) as f64 * self.dt_fs)
            .collect()
    }

    /// Monotonic baseband angular-frequency axis in rad/fs.
    ///
    /// Ordering matches the fftshifted transform output of
    /// [`crate::fft::FftConvention::forward`].
    pub fn omega_axis_rad_per_fs(&self) -> Vec<f64> {
        let domega = self.domega_rad_per_fs();
        let half = (self.samples / 2) as isize;
        (0..self.samples)
            .map(|j| (j as isize - half) as f64 * domega)
            .collect()
    }

    /// Returns a resampled copy with the new sample count over the same span.
    pub fn resampled(&self, samples: usize) -> Result<Self, CpaError> {
        if samples < 2 {
            return Err(CpaError::Config(
                ErrorInfo::new("grid-resample", "resampled grid requires >= 2 samples")
                    .with_context("samples", samples.to_string()),
            ));
        }
        let span = (self.samples - 1) as f64 * self.dt_fs;
        Self::new(samples, span / (samples - 1) as f64, self.center_wavelength_nm)
    }
}

/// Returns the power of two nearest to `size` (log-rounded).
pub fn nearest_power_of_two(size: usize) -> Result<usize, CpaError> {
    if size < 1 {
        return Err(CpaError::Config(ErrorInfo::new(
            "grid-size",
            "grid size must be >= 1",
        )));
    }
    let exponent = (size as f64).log2().round() as u32;
    Ok(1usize << exponent)
}

/// Returns true when `size` has a prime factor larger than `limit`.
///
/// Large prime factors degrade mixed-radix FFT throughput, so backends may
/// use this to decide whether resampling is worthwhile.
pub fn has_large_prime_factor(size: usize, limit: usize) -> bool {
    let mut n = size;
    let mut factor = 2;
    let mut largest = 1;
    while factor * factor <= n {
        while n % factor == 0 {
            largest = factor;
            n /= factor;
        }
        factor += 1;
    }
    if n > 1 {
        largest = largest.max(n);
    }
    largest > limit
}

/// Linearly interpolates a complex signal onto a uniform grid of `new_size`
/// samples spanning the same window as `old_t_fs`.
pub fn resample_complex_uniform(
    signal: &[Complex64],
    old_t_fs: &[f64],
    new_size: usize,
) -> Vec<Complex64> {
    debug_assert_eq!(signal.len(), old_t_fs.len());
    let first = old_t_fs[0];
    let last = old_t_fs[old_t_fs.len() - 1];
    let step = (last - first) / (new_size - 1) as f64;
    let mut out = Vec::with_capacity(new_size);
    let mut cursor = 0_usize;
    for j in 0..new_size {
        let t = first + j as f64 * step;
        while cursor + 2 < old_t_fs.len() && old_t_fs[cursor + 1] < t {
            cursor += 1;
        }
        let t0 = old_t_fs[cursor];
        let t1 = old_t_fs[cursor + 1];
        let frac = if t1 == t0 { 0.0 } else { ((t - t0) / (t1 - t0)).clamp(0.0, 1.0) };
        out.push(signal[cursor] * (1.0 - frac) + signal[cursor + 1] * frac);
    }
    out
}
