//! Amplifier stages: power-targeted fiber amplifier and flat gain.

use std::collections::BTreeMap;

use num_complex::Complex64;

use cpa_core::errors::{CpaError, ErrorInfo};
use cpa_core::pulse::PulseState;
use cpa_fiber::backend::{resolve_backend, BackendConfig};
use cpa_fiber::engine::FiberPhysics;
use cpa_fiber::gain::{map_power_target, PowerTargetRequest};

use crate::config::{FiberAmpCfg, SimpleGainCfg};
use crate::laser::REP_RATE_HZ_KEY;
use crate::stage::{RunContext, Stage, StageInput, StageOutput};

fn rep_rate_hz(state: &PulseState, stage: &str) -> Result<f64, CpaError> {
    let raw = state.metadata.get(REP_RATE_HZ_KEY).ok_or_else(|| {
        CpaError::Config(
            ErrorInfo::new(
                "amp-missing-rep-rate",
                "amplifier requires the repetition rate recorded by the initializer",
            )
            .with_context("stage", stage)
            .with_context("metadata_key", REP_RATE_HZ_KEY),
        )
    })?;
    raw.parse::<f64>().map_err(|_| {
        CpaError::Config(
            ErrorInfo::new("amp-bad-rep-rate", "repetition rate metadata is not a number")
                .with_context("stage", stage)
                .with_context("value", raw.clone()),
        )
    })
}

/// Fiber amplifier wrapper: maps an average-power target to distributed
/// gain, propagates through the gain fiber, then trims the field so the
/// achieved measurement-plane power equals the target exactly.
#[derive(Debug, Clone)]
pub struct FiberAmpStage {
    cfg: FiberAmpCfg,
}

impl FiberAmpStage {
    /// Creates the stage from its config.
    pub fn new(cfg: FiberAmpCfg) -> Self {
        Self { cfg }
    }
}

impl Stage for FiberAmpStage {
    fn name(&self) -> &str {
        &self.cfg.name
    }

    fn process(&self, input: StageInput, ctx: &RunContext) -> Result<StageOutput, CpaError> {
        let state = input.into_state(self.name())?;
        let rep_rate = rep_rate_hz(&state, &self.cfg.name)?;

        let mapped = map_power_target(
            state.energy_j(),
            &PowerTargetRequest {
                target_avg_power_w: self.cfg.target_avg_power_w,
                rep_rate_hz: rep_rate,
                length_m: self.cfg.physics.length_m,
                intrinsic_loss_db_per_m: self.cfg.physics.loss_db_per_m,
            },
        )?;
        if let Some(max_db) = ctx.policy.max_net_gain_db {
            if mapped.net_gain_db > max_db {
                return Err(CpaError::Guardrail(
                    ErrorInfo::new("amp-gain-cap", "requested net gain exceeds the policy cap")
                        .with_context("stage", self.cfg.name.clone())
                        .with_value("net_gain_db", mapped.net_gain_db)
                        .with_value("max_net_gain_db", max_db),
                ));
            }
        }

        let backend = resolve_backend(&BackendConfig::SplitStep {
            physics: FiberPhysics {
                loss_db_per_m: mapped.total_loss_db_per_m,
                ..self.cfg.physics.clone()
            },
            numerics: self.cfg.numerics.clone(),
            grid_policy: self.cfg.grid_policy.clone(),
        })?;
        let outcome = backend.propagate(&state, &self.cfg.name)?;

        // The distributed gain lands the average power on target up to
        // resampling and intrinsic-loss bookkeeping; trim the residual at
        // the measurement plane.
        let achieved_w = outcome.state.energy_j() * rep_rate;
        if !(achieved_w.is_finite() && achieved_w > 0.0) {
            return Err(CpaError::Guardrail(
                ErrorInfo::new("amp-degenerate-output", "propagated average power is not positive")
                    .with_context("stage", self.cfg.name.clone())
                    .with_value("power_out_avg_w", achieved_w),
            ));
        }
        let trim = (self.cfg.target_avg_power_w / achieved_w).sqrt();
        let field: Vec<Complex64> = outcome
            .state
            .field_t
            .iter()
            .map(|sample| sample * trim)
            .collect();
        let out = outcome.state.with_field(field)?;
        out.check_finite(&self.cfg.name)?;

        let mut metrics = outcome.metrics;
        metrics.insert("power_in_avg_w".to_string(), mapped.power_in_avg_w);
        metrics.insert(
            "power_out_target_w".to_string(),
            self.cfg.target_avg_power_w,
        );
        metrics.insert("power_out_avg_w".to_string(), out.energy_j() * rep_rate);
        metrics.insert(
            "effective_loss_db_per_m".to_string(),
            mapped.effective_loss_db_per_m,
        );
        metrics.insert("net_gain_db".to_string(), mapped.net_gain_db);

        Ok(StageOutput { state: out, metrics })
    }
}

/// Flat power gain: multiplies the field by `sqrt(gain_linear)`.
#[derive(Debug, Clone)]
pub struct SimpleGainStage {
    cfg: SimpleGainCfg,
}

impl SimpleGainStage {
    /// Creates the stage from its config.
    pub fn new(cfg: SimpleGainCfg) -> Self {
        Self { cfg }
    }
}

impl Stage for SimpleGainStage {
    fn name(&self) -> &str {
        &self.cfg.name
    }

    fn process(&self, input: StageInput, _ctx: &RunContext) -> Result<StageOutput, CpaError> {
        let state = input.into_state(self.name())?;
        let field_gain = self.cfg.gain_linear.sqrt();
        let field: Vec<Complex64> = state
            .field_t
            .iter()
            .map(|sample| sample * field_gain)
            .collect();
        let out = state.with_field(field)?;
        out.check_finite(&self.cfg.name)?;
        let mut metrics = BTreeMap::new();
        metrics.insert("gain_linear".to_string(), self.cfg.gain_linear);
        metrics.insert("energy_w_fs".to_string(), out.energy_w_fs());
        Ok(StageOutput { state: out, metrics })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LaserGenCfg, PulseShape, StageConfig};
    use crate::laser::AnalyticLaserStage;
    use crate::stage::build_stage;
    use cpa_fiber::engine::SplitStepNumerics;
    use cpa_fiber::GridPolicy;

    fn seeded_state() -> PulseState {
        let stage = AnalyticLaserStage::new(LaserGenCfg {
            name: "laser_init".to_string(),
            shape: PulseShape::Gaussian,
            fwhm_fs: 100.0,
            peak_power_w: 1.0e3,
            samples: 512,
            time_window_fs: 2000.0,
            center_wavelength_nm: 1030.0,
            rep_rate_hz: 80.0e6,
        });
        stage
            .process(StageInput::Seed, &RunContext::new(3))
            .unwrap()
            .state
    }

    fn amp_cfg(target_w: f64) -> FiberAmpCfg {
        FiberAmpCfg {
            name: "amp".to_string(),
            target_avg_power_w: target_w,
            physics: FiberPhysics {
                length_m: 1.0,
                gamma_per_w_m: 0.0,
                betas_fsn_per_m: Vec::new(),
                loss_db_per_m: 0.0,
            },
            numerics: SplitStepNumerics { segments: 20 },
            grid_policy: GridPolicy::Keep,
        }
    }

    #[test]
    fn linear_amp_hits_the_power_target() {
        let stage = build_stage(&StageConfig::FiberAmp(amp_cfg(1.0))).unwrap();
        let out = stage
            .process(StageInput::State(seeded_state()), &RunContext::new(3))
            .unwrap();
        let achieved = out.metrics["power_out_avg_w"];
        assert!((achieved - 1.0).abs() < 1e-6, "achieved {achieved}");
        assert!(out.metrics["effective_loss_db_per_m"] < 0.0);
    }

    #[test]
    fn policy_gain_cap_is_enforced() {
        let stage = FiberAmpStage::new(amp_cfg(1.0e3));
        let mut ctx = RunContext::new(3);
        ctx.policy.max_net_gain_db = Some(10.0);
        let err = stage
            .process(StageInput::State(seeded_state()), &ctx)
            .unwrap_err();
        assert_eq!(err.info().code, "amp-gain-cap");
    }

    #[test]
    fn missing_rep_rate_is_config_error() {
        let mut state = seeded_state();
        state.metadata.remove(REP_RATE_HZ_KEY);
        let stage = FiberAmpStage::new(amp_cfg(1.0));
        let err = stage
            .process(StageInput::State(state), &RunContext::new(3))
            .unwrap_err();
        assert_eq!(err.info().code, "amp-missing-rep-rate");
    }

    #[test]
    fn simple_gain_scales_energy_linearly() {
        let state = seeded_state();
        let energy_in = state.energy_w_fs();
        let stage = SimpleGainStage::new(SimpleGainCfg {
            name: "gain".to_string(),
            gain_linear: 4.0,
        });
        let out = stage
            .process(StageInput::State(state), &RunContext::new(0))
            .unwrap();
        assert!((out.metrics["energy_w_fs"] / energy_in - 4.0).abs() < 1e-9);
    }
}
