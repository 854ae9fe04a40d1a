//! Fixed FFT conventions for all spectral-domain stage math.
//!
//! One convention is used everywhere: the forward transform is scaled by
//! `dt` and the inverse by `1/(N·dt)` so Parseval's theorem holds and
//! stage-to-stage energy accounting needs no hidden rescaling. Both
//! directions apply fftshift ordering so buffers line up with the monotonic
//! axes of [`crate::grid::Grid`].

use num_complex::Complex64;
use rustfft::FftPlanner;

use crate::errors::{CpaError, ErrorInfo};

/// Speed of light in micrometers per femtosecond.
pub const SPEED_OF_LIGHT_UM_PER_FS: f64 = 0.299792458;

/// Rotates a buffer so the zero bin moves to the center (numpy `fftshift`).
pub fn fftshift(buf: &mut [Complex64]) {
    let mid = buf.len() - buf.len() / 2;
    buf.rotate_left(mid % buf.len().max(1));
}

/// Inverse of [`fftshift`] (numpy `ifftshift`).
pub fn ifftshift(buf: &mut [Complex64]) {
    buf.rotate_left(buf.len() / 2);
}

/// FFT convention bound to a specific grid size and time step.
#[derive(Debug, Clone, Copy)]
pub struct FftConvention {
    samples: usize,
    dt_fs: f64,
}

impl FftConvention {
    /// Creates the convention for a grid of `samples` points spaced `dt_fs`.
    pub fn new(samples: usize, dt_fs: f64) -> Self {
        Self { samples, dt_fs }
    }

    /// Transforms a time-domain envelope to the shifted frequency domain.
    ///
    /// Output is ordered to match [`crate::grid::Grid::omega_axis_rad_per_fs`]
    /// and scaled by `dt` (units of sqrt(W)·fs).
    pub fn forward(&self, field_t: &[Complex64]) -> Vec<Complex64> {
        debug_assert_eq!(field_t.len(), self.samples);
        let mut buf = field_t.to_vec();
        ifftshift(&mut buf);
        let mut planner = FftPlanner::<f64>::new();
        planner.plan_fft_forward(self.samples).process(&mut buf);
        for sample in &mut buf {
            *sample *= self.dt_fs;
        }
        fftshift(&mut buf);
        buf
    }

    /// Transforms a shifted frequency-domain buffer back to the time domain.
    pub fn inverse(&self, field_w: &[Complex64]) -> Vec<Complex64> {
        debug_assert_eq!(field_w.len(), self.samples);
        let mut buf = field_w.to_vec();
        ifftshift(&mut buf);
        let mut planner = FftPlanner::<f64>::new();
        planner.plan_fft_inverse(self.samples).process(&mut buf);
        let scale = 1.0 / (self.samples as f64 * self.dt_fs);
        for sample in &mut buf {
            *sample *= scale;
        }
        fftshift(&mut buf);
        buf
    }

    /// Time-domain energy `Σ|A|²·dt` in W·fs.
    pub fn energy_time(&self, field_t: &[Complex64]) -> f64 {
        field_t.iter().map(|a| a.norm_sqr()).sum::<f64>() * self.dt_fs
    }

    /// Frequency-domain energy `Σ|Ã|²·dω/2π`, equal to the time-domain
    /// energy under this convention.
    pub fn energy_freq(&self, field_w: &[Complex64]) -> f64 {
        let domega = 2.0 * std::f64::consts::PI / (self.samples as f64 * self.dt_fs);
        field_w.iter().map(|a| a.norm_sqr()).sum::<f64>() * domega
            / (2.0 * std::f64::consts::PI)
    }
}

/// Asserts that a spectral transform was phase-only.
///
/// Compares bin-by-bin spectral magnitudes of two frequency-domain buffers;
/// any relative deviation beyond `rtol` (against the peak input magnitude)
/// is reported with the offending bin index and deviation.
pub fn assert_phase_only(
    before_w: &[Complex64],
    after_w: &[Complex64],
    rtol: f64,
) -> Result<(), CpaError> {
    if before_w.len() != after_w.len() {
        return Err(CpaError::Numerics(
            ErrorInfo::new("phase-only-shape", "spectral buffers differ in length")
                .with_context("before", before_w.len().to_string())
                .with_context("after", after_w.len().to_string()),
        ));
    }
    let peak = before_w
        .iter()
        .map(|a| a.norm())
        .fold(0.0_f64, f64::max)
        .max(f64::MIN_POSITIVE);
    for (idx, (before, after)) in before_w.iter().zip(after_w.iter()).enumerate() {
        let dev = (after.norm() - before.norm()).abs() / peak;
        if dev > rtol {
            return Err(CpaError::Numerics(
                ErrorInfo::new(
                    "phase-only-violation",
                    "spectral magnitude changed under a phase-only operator",
                )
                .with_context("bin", idx.to_string())
                .with_value("relative_deviation", dev)
                .with_value("rtol", rtol),
            ));
        }
    }
    Ok(())
}
