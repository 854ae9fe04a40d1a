//! Symmetric split-step Fourier solver for the envelope equation.
//!
//! Models linear dispersion, distributed gain/loss and Kerr self-phase
//! modulation over a fixed number of segments. Step count is the caller's
//! accuracy/runtime trade-off; there is no adaptive control, which keeps the
//! operation order (and therefore the output bits) identical across runs.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use cpa_core::errors::{CpaError, ErrorInfo};
use cpa_core::fft::FftConvention;
use cpa_core::grid::Grid;
use cpa_core::pulse::check_field_finite;

const LN10: f64 = std::f64::consts::LN_10;

fn default_segments() -> usize {
    100
}

/// Physical fiber parameters.
///
/// Units: time in femtoseconds, length in meters. `betas_fsn_per_m[k]`
/// holds the Taylor dispersion coefficient `β_{k+2}` in fs^(k+2)/m, so the
/// leading entry is group-velocity dispersion. Loss is a power coefficient
/// in dB/m; negative values describe distributed gain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiberPhysics {
    /// Fiber length in meters.
    pub length_m: f64,
    /// Kerr nonlinear coefficient in 1/(W·m).
    #[serde(default)]
    pub gamma_per_w_m: f64,
    /// Dispersion Taylor coefficients starting at β₂, in fs^k/m.
    #[serde(default)]
    pub betas_fsn_per_m: Vec<f64>,
    /// Distributed power loss in dB/m (negative means gain).
    #[serde(default)]
    pub loss_db_per_m: f64,
}

impl FiberPhysics {
    /// Net distributed power-gain coefficient `g` in 1/m.
    pub fn power_gain_per_m(&self) -> f64 {
        -self.loss_db_per_m * LN10 / 10.0
    }
}

/// Numeric knobs for the split-step solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitStepNumerics {
    /// Number of fixed-length segments the fiber is divided into.
    #[serde(default = "default_segments")]
    pub segments: usize,
}

impl Default for SplitStepNumerics {
    fn default() -> Self {
        Self {
            segments: default_segments(),
        }
    }
}

/// Nonlinear sub-step seam of the split-step solver.
///
/// The built-in engine applies instantaneous Kerr self-phase modulation; an
/// extended solver can layer Raman or self-steepening terms by overriding
/// this step while reusing the linear machinery.
pub trait NonlinearOperator {
    /// Applies the nonlinear operator in place over one segment of `dz_m`.
    fn nonlinear_step(&self, field: &mut [Complex64], dz_m: f64);
}

/// Fixed-step symmetric (Strang) split-step Fourier engine.
#[derive(Debug, Clone)]
pub struct SplitStepEngine {
    physics: FiberPhysics,
    numerics: SplitStepNumerics,
}

impl NonlinearOperator for SplitStepEngine {
    fn nonlinear_step(&self, field: &mut [Complex64], dz_m: f64) {
        let gamma = self.physics.gamma_per_w_m;
        if gamma == 0.0 {
            return;
        }
        for sample in field {
            let phase = gamma * dz_m * sample.norm_sqr();
            *sample *= Complex64::new(0.0, phase).exp();
        }
    }
}

impl SplitStepEngine {
    /// Creates a validated engine instance.
    pub fn new(physics: FiberPhysics, numerics: SplitStepNumerics) -> Result<Self, CpaError> {
        if !(physics.length_m.is_finite() && physics.length_m > 0.0) {
            return Err(CpaError::Config(
                ErrorInfo::new("fiber-length", "fiber length must be finite and > 0")
                    .with_value("length_m", physics.length_m),
            ));
        }
        if numerics.segments == 0 {
            return Err(CpaError::Config(ErrorInfo::new(
                "fiber-segments",
                "split-step segment count must be > 0",
            )));
        }
        for (offset, beta) in physics.betas_fsn_per_m.iter().enumerate() {
            if !beta.is_finite() {
                return Err(CpaError::Config(
                    ErrorInfo::new("fiber-beta", "dispersion coefficient must be finite")
                        .with_context("order", (offset + 2).to_string())
                        .with_value("beta", *beta),
                ));
            }
        }
        if !physics.gamma_per_w_m.is_finite() || !physics.loss_db_per_m.is_finite() {
            return Err(CpaError::Config(
                ErrorInfo::new("fiber-coefficients", "gamma and loss must be finite")
                    .with_value("gamma_per_w_m", physics.gamma_per_w_m)
                    .with_value("loss_db_per_m", physics.loss_db_per_m),
            ));
        }
        Ok(Self { physics, numerics })
    }

    /// Physical parameters the engine was built with.
    pub fn physics(&self) -> &FiberPhysics {
        &self.physics
    }

    /// Numeric parameters the engine was built with.
    pub fn numerics(&self) -> &SplitStepNumerics {
        &self.numerics
    }

    /// Per-amplitude multiplier for one half linear step, per spectral bin.
    ///
    /// `exp((i·D(ω) + g/2)·dz/2)` with `D(ω) = Σ β_k/k!·ω^k` over the
    /// baseband axis.
    fn half_linear_multipliers(&self, grid: &Grid, dz_m: f64) -> Vec<Complex64> {
        let g = self.physics.power_gain_per_m();
        let amp = (g / 2.0 * dz_m / 2.0).exp();
        grid.omega_axis_rad_per_fs()
            .iter()
            .map(|&omega| {
                let mut d = 0.0_f64;
                let mut factorial = 2.0_f64;
                let mut power = omega * omega;
                for (offset, beta) in self.physics.betas_fsn_per_m.iter().enumerate() {
                    let k = (offset + 2) as f64;
                    if offset > 0 {
                        factorial *= k;
                        power *= omega;
                    }
                    d += beta / factorial * power;
                }
                amp * Complex64::new(0.0, d * dz_m / 2.0).exp()
            })
            .collect()
    }

    /// Propagates a time-domain envelope through the full fiber length.
    ///
    /// The returned buffer is a fresh allocation; the input is not touched.
    /// Any NaN/Inf appearing in the field aborts with the segment index.
    pub fn propagate(
        &self,
        grid: &Grid,
        field_t: &[Complex64],
        stage: &str,
    ) -> Result<Vec<Complex64>, CpaError> {
        let conv = FftConvention::new(grid.samples(), grid.dt_fs());
        let dz = self.physics.length_m / self.numerics.segments as f64;
        let half_linear = self.half_linear_multipliers(grid, dz);

        let mut field = field_t.to_vec();
        for segment in 0..self.numerics.segments {
            let mut spectrum = conv.forward(&field);
            for (bin, mult) in spectrum.iter_mut().zip(half_linear.iter()) {
                *bin *= mult;
            }
            field = conv.inverse(&spectrum);

            self.nonlinear_step(&mut field, dz);

            let mut spectrum = conv.forward(&field);
            for (bin, mult) in spectrum.iter_mut().zip(half_linear.iter()) {
                *bin *= mult;
            }
            field = conv.inverse(&spectrum);

            check_field_finite(&field, stage).map_err(|err| match err {
                CpaError::Numerics(info) => {
                    CpaError::Numerics(info.with_context("segment", segment.to_string()))
                }
                other => other,
            })?;
        }
        Ok(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gaussian_field(grid: &Grid, fwhm_fs: f64, peak_w: f64) -> Vec<Complex64> {
        grid.time_axis_fs()
            .iter()
            .map(|&t| {
                let i = peak_w * (-4.0 * 2.0_f64.ln() * (t / fwhm_fs).powi(2)).exp();
                Complex64::new(i.sqrt(), 0.0)
            })
            .collect()
    }

    fn energy(grid: &Grid, field: &[Complex64]) -> f64 {
        field.iter().map(|a| a.norm_sqr()).sum::<f64>() * grid.dt_fs()
    }

    #[test]
    fn lossless_propagation_conserves_energy() {
        let grid = Grid::new(512, 2.0, 1030.0).unwrap();
        let field = gaussian_field(&grid, 150.0, 1.0e3);
        let engine = SplitStepEngine::new(
            FiberPhysics {
                length_m: 1.0,
                gamma_per_w_m: 1.0e-3,
                betas_fsn_per_m: vec![2.3e4, -1.0e2],
                loss_db_per_m: 0.0,
            },
            SplitStepNumerics { segments: 40 },
        )
        .unwrap();
        let out = engine.propagate(&grid, &field, "fiber").unwrap();
        let ratio = energy(&grid, &out) / energy(&grid, &field);
        assert!((ratio - 1.0).abs() < 1e-10, "energy drift: {ratio}");
    }

    #[test]
    fn gain_only_propagation_matches_decibel_budget() {
        let grid = Grid::new(256, 2.0, 1030.0).unwrap();
        let field = gaussian_field(&grid, 100.0, 10.0);
        let gain_db = 7.5; // over the whole length
        let engine = SplitStepEngine::new(
            FiberPhysics {
                length_m: 2.0,
                gamma_per_w_m: 0.0,
                betas_fsn_per_m: Vec::new(),
                loss_db_per_m: -gain_db / 2.0,
            },
            SplitStepNumerics { segments: 17 },
        )
        .unwrap();
        let out = engine.propagate(&grid, &field, "amp").unwrap();
        let ratio = energy(&grid, &out) / energy(&grid, &field);
        let expected = 10.0_f64.powf(gain_db / 10.0);
        assert!((ratio - expected).abs() / expected < 1e-10);
    }

    #[test]
    fn spm_only_bandwidth_grows_with_gamma() {
        let grid = Grid::new(1024, 1.0, 1030.0).unwrap();
        let field = gaussian_field(&grid, 120.0, 1.0);
        let conv = FftConvention::new(grid.samples(), grid.dt_fs());
        let omega = grid.omega_axis_rad_per_fs();
        let rms = |f: &[Complex64]| {
            let spec = conv.forward(f);
            let total: f64 = spec.iter().map(|a| a.norm_sqr()).sum();
            let second: f64 = spec
                .iter()
                .zip(omega.iter())
                .map(|(a, &w)| w * w * a.norm_sqr())
                .sum();
            (second / total).sqrt()
        };
        let mut widths = Vec::new();
        for gamma in [0.0, 1.0, 2.0, 4.0] {
            let engine = SplitStepEngine::new(
                FiberPhysics {
                    length_m: 0.5,
                    gamma_per_w_m: gamma,
                    betas_fsn_per_m: Vec::new(),
                    loss_db_per_m: 0.0,
                },
                SplitStepNumerics { segments: 25 },
            )
            .unwrap();
            let out = engine.propagate(&grid, &field, "fiber").unwrap();
            widths.push(rms(&out));
        }
        assert!(widths.windows(2).all(|w| w[1] >= w[0] - 1e-12));
        assert!(widths[3] > widths[0]);
    }

    #[test]
    fn zero_segment_count_is_rejected() {
        let err = SplitStepEngine::new(
            FiberPhysics {
                length_m: 1.0,
                gamma_per_w_m: 0.0,
                betas_fsn_per_m: Vec::new(),
                loss_db_per_m: 0.0,
            },
            SplitStepNumerics { segments: 0 },
        )
        .unwrap_err();
        assert_eq!(err.info().code, "fiber-segments");
    }
}
