//! Analytic pulse initialization stage.

use std::collections::BTreeMap;
use std::sync::Arc;

use num_complex::Complex64;

use cpa_core::errors::CpaError;
use cpa_core::grid::Grid;
use cpa_core::pulse::{PulseState, FS_TO_S};

use crate::config::{LaserGenCfg, PulseShape};
use crate::stage::{RunContext, Stage, StageInput, StageOutput};

/// Metadata key under which the repetition rate is stored for later stages.
pub const REP_RATE_HZ_KEY: &str = "laser.rep_rate_hz";

/// Metadata key recording the seed-pulse energy at initialization, in W·fs.
pub const ENERGY_IN_W_FS_KEY: &str = "laser.energy_in_w_fs";

/// Produces the first pulse state of a run from an analytic envelope.
#[derive(Debug, Clone)]
pub struct AnalyticLaserStage {
    cfg: LaserGenCfg,
}

impl AnalyticLaserStage {
    /// Creates the stage from its config.
    pub fn new(cfg: LaserGenCfg) -> Self {
        Self { cfg }
    }

    fn intensity_at(&self, t_fs: f64) -> f64 {
        let i0 = self.cfg.peak_power_w;
        match self.cfg.shape {
            PulseShape::Gaussian => {
                i0 * (-4.0 * 2.0_f64.ln() * (t_fs / self.cfg.fwhm_fs).powi(2)).exp()
            }
            PulseShape::Sech2 => {
                // FWHM of sech² is 2·acosh(√2)·T0.
                let t0 = self.cfg.fwhm_fs / (2.0 * 2.0_f64.sqrt().acosh());
                let sech = 1.0 / (t_fs / t0).cosh();
                i0 * sech * sech
            }
        }
    }
}

impl Stage for AnalyticLaserStage {
    fn name(&self) -> &str {
        &self.cfg.name
    }

    fn process(&self, input: StageInput, _ctx: &RunContext) -> Result<StageOutput, CpaError> {
        // An initializer ignores any carried state by contract; accepting
        // one anyway would hide a mis-ordered plan, so reject it.
        if let StageInput::State(_) = input {
            return Err(CpaError::Config(
                cpa_core::errors::ErrorInfo::new(
                    "stage-reinitialize",
                    "pulse initializer must be the first stage of a pipeline",
                )
                .with_context("stage", self.cfg.name.clone()),
            ));
        }

        let dt_fs = self.cfg.time_window_fs / (self.cfg.samples - 1) as f64;
        let grid = Arc::new(Grid::new(
            self.cfg.samples,
            dt_fs,
            self.cfg.center_wavelength_nm,
        )?);
        let field: Vec<Complex64> = grid
            .time_axis_fs()
            .iter()
            .map(|&t| Complex64::new(self.intensity_at(t).sqrt(), 0.0))
            .collect();

        let mut state = PulseState::new(grid, field)?;
        state.check_finite(&self.cfg.name)?;

        let energy_w_fs = state.energy_w_fs();
        let pulse_energy_j = energy_w_fs * FS_TO_S;
        let avg_power_w = pulse_energy_j * self.cfg.rep_rate_hz;
        state
            .metadata
            .insert(REP_RATE_HZ_KEY.to_string(), self.cfg.rep_rate_hz.to_string());
        state.metadata.insert(
            ENERGY_IN_W_FS_KEY.to_string(),
            format!("{energy_w_fs:.17e}"),
        );

        let mut metrics = BTreeMap::new();
        metrics.insert("energy_w_fs".to_string(), energy_w_fs);
        metrics.insert("peak_power_w".to_string(), state.peak_power_w());
        metrics.insert("intensity_fwhm_fs".to_string(), self.cfg.fwhm_fs);
        metrics.insert("pulse_energy_j".to_string(), pulse_energy_j);
        metrics.insert("avg_power_w".to_string(), avg_power_w);

        Ok(StageOutput { state, metrics })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StageConfig;
    use crate::stage::build_stage;

    fn cfg() -> LaserGenCfg {
        LaserGenCfg {
            name: "laser_init".to_string(),
            shape: PulseShape::Gaussian,
            fwhm_fs: 100.0,
            peak_power_w: 1.0e3,
            samples: 512,
            time_window_fs: 2000.0,
            center_wavelength_nm: 1030.0,
            rep_rate_hz: 80.0e6,
        }
    }

    #[test]
    fn produces_expected_gaussian_energy() {
        let stage = build_stage(&StageConfig::Analytic(cfg())).unwrap();
        let out = stage.process(StageInput::Seed, &RunContext::new(7)).unwrap();
        // Gaussian: E = I0 · FWHM · sqrt(π / (4 ln2)).
        let expected = 1.0e3 * 100.0 * (std::f64::consts::PI / (4.0 * 2.0_f64.ln())).sqrt();
        let energy = out.metrics["energy_w_fs"];
        assert!((energy - expected).abs() / expected < 1e-3, "{energy}");
        assert!((out.metrics["peak_power_w"] - 1.0e3).abs() < 1e-9);
    }

    #[test]
    fn sech2_peak_matches_config() {
        let mut c = cfg();
        c.shape = PulseShape::Sech2;
        let stage = AnalyticLaserStage::new(c);
        let out = stage.process(StageInput::Seed, &RunContext::new(0)).unwrap();
        assert!((out.state.peak_power_w() - 1.0e3).abs() / 1.0e3 < 1e-9);
    }

    #[test]
    fn rejects_running_mid_pipeline() {
        let stage = AnalyticLaserStage::new(cfg());
        let first = stage.process(StageInput::Seed, &RunContext::new(0)).unwrap();
        let err = stage
            .process(StageInput::State(first.state), &RunContext::new(0))
            .unwrap_err();
        assert_eq!(err.info().code, "stage-reinitialize");
    }
}
