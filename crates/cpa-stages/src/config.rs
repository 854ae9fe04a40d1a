//! Immutable, tagged stage configurations.
//!
//! Every stage config carries a `kind` discriminator so plans deserialize
//! into a closed set of variants at parse time; unknown kinds or unknown
//! fields for a given kind fail before any stage executes.

use serde::{Deserialize, Serialize};

use cpa_core::errors::{CpaError, ErrorInfo};
use cpa_core::hash::stable_hash_string;
use cpa_fiber::backend::BackendConfig;
use cpa_fiber::engine::{FiberPhysics, SplitStepNumerics};
use cpa_fiber::GridPolicy;

fn config_error(info: ErrorInfo) -> CpaError {
    CpaError::Config(info)
}

fn require_positive(stage: &str, field: &str, value: f64) -> Result<(), CpaError> {
    if value.is_finite() && value > 0.0 {
        return Ok(());
    }
    Err(config_error(
        ErrorInfo::new("config-positive", "field must be finite and > 0")
            .with_context("stage", stage)
            .with_context("field", field)
            .with_value("value", value),
    ))
}

/// Pulse intensity profile family for the analytic initializer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PulseShape {
    /// `I(t) ∝ exp(−4 ln2 (t/FWHM)²)`.
    #[default]
    Gaussian,
    /// `I(t) ∝ sech²(t/T0)` with `T0 = FWHM/(2·acosh√2)`.
    Sech2,
}

/// Analytic pulse-initialization stage configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LaserGenCfg {
    /// Stage name used for metric namespacing and provenance.
    pub name: String,
    /// Intensity profile family.
    #[serde(default)]
    pub shape: PulseShape,
    /// Intensity full width at half maximum in femtoseconds.
    pub fwhm_fs: f64,
    /// Peak instantaneous power in watts.
    pub peak_power_w: f64,
    /// Number of time samples.
    pub samples: usize,
    /// Total simulated time window in femtoseconds.
    pub time_window_fs: f64,
    /// Optical carrier wavelength in nanometers.
    pub center_wavelength_nm: f64,
    /// Pulse repetition rate in hertz.
    pub rep_rate_hz: f64,
}

/// Treacy grating-pair dispersive stage configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TreacyGratingCfg {
    /// Stage name used for metric namespacing and provenance.
    pub name: String,
    /// Grating line density in lines per millimeter.
    pub line_density_per_mm: f64,
    /// Incidence angle in degrees.
    pub incidence_angle_deg: f64,
    /// Grating separation in micrometers.
    pub separation_um: f64,
    /// Design wavelength in nanometers.
    pub wavelength_nm: f64,
    /// Diffraction order (typically −1).
    pub diffraction_order: i32,
    /// Number of passes through the pair (2 for double pass).
    pub n_passes: u32,
    /// Include third-order dispersion in the applied phase.
    #[serde(default = "default_true")]
    pub include_tod: bool,
    /// Apply the computed phase to the pulse (false computes metrics only).
    #[serde(default = "default_true")]
    pub apply_to_pulse: bool,
    /// Overrides the computed GDD (fs²) when set.
    #[serde(default)]
    pub override_gdd_fs2: Option<f64>,
    /// Overrides the computed TOD (fs³) when set.
    #[serde(default)]
    pub override_tod_fs3: Option<f64>,
}

/// Direct phase-only dispersion stage configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PhaseOnlyCfg {
    /// Stage name used for metric namespacing and provenance.
    pub name: String,
    /// Group-delay dispersion in fs².
    #[serde(default)]
    pub gdd_fs2: f64,
    /// Third-order dispersion in fs³.
    #[serde(default)]
    pub tod_fs3: f64,
    /// Apply the phase to the pulse (false computes metrics only).
    #[serde(default = "default_true")]
    pub apply_to_pulse: bool,
}

/// Nonlinear fiber propagation stage configuration.
///
/// No `deny_unknown_fields` here: the flattened backend selection owns the
/// remaining keys and rejects unknown backends itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiberStageCfg {
    /// Stage name used for metric namespacing and provenance.
    pub name: String,
    /// Backend selection and parameters.
    #[serde(flatten)]
    pub backend: BackendConfig,
}

/// Amplifier wrapper configuration: power target mapped to distributed gain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FiberAmpCfg {
    /// Stage name used for metric namespacing and provenance.
    pub name: String,
    /// Desired average output power at the measurement plane, in watts.
    pub target_avg_power_w: f64,
    /// Gain-fiber physical parameters; `loss_db_per_m` is the intrinsic
    /// passive loss, the mapped gain is added on top.
    pub physics: FiberPhysics,
    /// Split-step solver configuration.
    #[serde(default)]
    pub numerics: SplitStepNumerics,
    /// Grid resampling policy applied before propagation.
    #[serde(default)]
    pub grid_policy: GridPolicy,
}

/// Flat field gain stage configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimpleGainCfg {
    /// Stage name used for metric namespacing and provenance.
    pub name: String,
    /// Linear power gain (1.0 is transparent).
    pub gain_linear: f64,
}

/// Terminal metrics stage configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsCfg {
    /// Stage name used for metric namespacing and provenance.
    pub name: String,
}

fn default_true() -> bool {
    true
}

/// Tagged union over all stage configurations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageConfig {
    /// Analytic pulse initializer (`kind = "analytic"`).
    Analytic(LaserGenCfg),
    /// Treacy grating pair (`kind = "treacy_grating"`).
    TreacyGrating(TreacyGratingCfg),
    /// Direct phase-only dispersion (`kind = "phase_only"`).
    PhaseOnly(PhaseOnlyCfg),
    /// Nonlinear fiber propagation (`kind = "fiber"`).
    Fiber(FiberStageCfg),
    /// Amplifier wrapper with power targeting (`kind = "fiber_amp"`).
    FiberAmp(FiberAmpCfg),
    /// Flat power gain (`kind = "simple_gain"`).
    SimpleGain(SimpleGainCfg),
    /// Terminal metrics stage (`kind = "metrics"`).
    Metrics(MetricsCfg),
}

impl StageConfig {
    /// Stage name as declared in the plan.
    pub fn name(&self) -> &str {
        match self {
            StageConfig::Analytic(cfg) => &cfg.name,
            StageConfig::TreacyGrating(cfg) => &cfg.name,
            StageConfig::PhaseOnly(cfg) => &cfg.name,
            StageConfig::Fiber(cfg) => &cfg.name,
            StageConfig::FiberAmp(cfg) => &cfg.name,
            StageConfig::SimpleGain(cfg) => &cfg.name,
            StageConfig::Metrics(cfg) => &cfg.name,
        }
    }

    /// The `kind` discriminator string for this variant.
    pub fn kind(&self) -> &'static str {
        match self {
            StageConfig::Analytic(_) => "analytic",
            StageConfig::TreacyGrating(_) => "treacy_grating",
            StageConfig::PhaseOnly(_) => "phase_only",
            StageConfig::Fiber(_) => "fiber",
            StageConfig::FiberAmp(_) => "fiber_amp",
            StageConfig::SimpleGain(_) => "simple_gain",
            StageConfig::Metrics(_) => "metrics",
        }
    }

    /// True when this config produces the first state of a run.
    pub fn is_initializer(&self) -> bool {
        matches!(self, StageConfig::Analytic(_))
    }

    /// True when this config is a terminal metrics stage.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StageConfig::Metrics(_))
    }

    /// Stable fingerprint over the canonical JSON form of the config.
    pub fn fingerprint(&self) -> Result<String, CpaError> {
        stable_hash_string(self)
    }

    /// Validates field-level constraints before execution.
    pub fn validate(&self) -> Result<(), CpaError> {
        if self.name().is_empty() {
            return Err(config_error(
                ErrorInfo::new("config-name", "stage name must not be empty")
                    .with_context("kind", self.kind()),
            ));
        }
        match self {
            StageConfig::Analytic(cfg) => {
                require_positive(&cfg.name, "fwhm_fs", cfg.fwhm_fs)?;
                require_positive(&cfg.name, "peak_power_w", cfg.peak_power_w)?;
                require_positive(&cfg.name, "time_window_fs", cfg.time_window_fs)?;
                require_positive(&cfg.name, "center_wavelength_nm", cfg.center_wavelength_nm)?;
                require_positive(&cfg.name, "rep_rate_hz", cfg.rep_rate_hz)?;
                if cfg.samples < 2 {
                    return Err(config_error(
                        ErrorInfo::new("config-samples", "initializer requires >= 2 samples")
                            .with_context("stage", cfg.name.clone())
                            .with_context("samples", cfg.samples.to_string()),
                    ));
                }
                Ok(())
            }
            StageConfig::TreacyGrating(cfg) => {
                require_positive(&cfg.name, "line_density_per_mm", cfg.line_density_per_mm)?;
                require_positive(&cfg.name, "separation_um", cfg.separation_um)?;
                require_positive(&cfg.name, "wavelength_nm", cfg.wavelength_nm)?;
                if cfg.diffraction_order == 0 {
                    return Err(config_error(
                        ErrorInfo::new("config-order", "diffraction order must be nonzero")
                            .with_context("stage", cfg.name.clone()),
                    ));
                }
                if cfg.n_passes == 0 {
                    return Err(config_error(
                        ErrorInfo::new("config-passes", "pass count must be > 0")
                            .with_context("stage", cfg.name.clone()),
                    ));
                }
                Ok(())
            }
            StageConfig::PhaseOnly(cfg) => {
                if !cfg.gdd_fs2.is_finite() || !cfg.tod_fs3.is_finite() {
                    return Err(config_error(
                        ErrorInfo::new("config-dispersion", "GDD/TOD must be finite")
                            .with_context("stage", cfg.name.clone())
                            .with_value("gdd_fs2", cfg.gdd_fs2)
                            .with_value("tod_fs3", cfg.tod_fs3),
                    ));
                }
                Ok(())
            }
            StageConfig::Fiber(_) => Ok(()),
            StageConfig::FiberAmp(cfg) => {
                require_positive(&cfg.name, "target_avg_power_w", cfg.target_avg_power_w)?;
                require_positive(&cfg.name, "physics.length_m", cfg.physics.length_m)
            }
            StageConfig::SimpleGain(cfg) => {
                if !(cfg.gain_linear.is_finite() && cfg.gain_linear >= 0.0) {
                    return Err(config_error(
                        ErrorInfo::new("config-gain", "gain_linear must be finite and >= 0")
                            .with_context("stage", cfg.name.clone())
                            .with_value("gain_linear", cfg.gain_linear),
                    ));
                }
                Ok(())
            }
            StageConfig::Metrics(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_tag_round_trips_through_json() {
        let cfg = StageConfig::SimpleGain(SimpleGainCfg {
            name: "amp".to_string(),
            gain_linear: 2.0,
        });
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(json.contains("\"kind\":\"simple_gain\""));
        let back: StageConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn unknown_kind_is_rejected_at_parse_time() {
        let result: Result<StageConfig, _> =
            serde_json::from_str(r#"{"kind":"edfa","name":"amp"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn fingerprint_is_stable() {
        let cfg = StageConfig::Metrics(MetricsCfg {
            name: "metrics".to_string(),
        });
        assert_eq!(cfg.fingerprint().unwrap(), cfg.fingerprint().unwrap());
    }

    #[test]
    fn validation_names_the_offending_field() {
        let cfg = StageConfig::SimpleGain(SimpleGainCfg {
            name: "amp".to_string(),
            gain_linear: f64::NAN,
        });
        let err = cfg.validate().unwrap_err();
        assert_eq!(err.info().code, "config-gain");
        assert_eq!(err.info().context.get("stage").unwrap(), "amp");
    }
}
