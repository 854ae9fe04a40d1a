//! Pipeline plan: the ordered stage list plus run-wide options.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use cpa_core::errors::{CpaError, ErrorInfo};
use cpa_core::hash::stable_hash_string;
use cpa_core::provenance::SchemaVersion;
use cpa_stages::{RunPolicy, StageConfig};

/// A complete, self-contained description of one pipeline run.
///
/// A plan carries everything the executor needs: the master seed, the
/// cross-cutting policy and the ordered stage configs. Two runs of the
/// same plan with the same seed produce bit-identical metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Plan {
    /// Schema version of this plan document.
    #[serde(default)]
    pub schema: SchemaVersion,
    /// Master deterministic seed.
    pub seed: u64,
    /// Cross-cutting run policy handed to every stage.
    #[serde(default)]
    pub policy: RunPolicy,
    /// Ordered stage configurations.
    pub stages: Vec<StageConfig>,
}

impl Plan {
    /// Parses a plan from YAML text.
    pub fn from_yaml_str(text: &str) -> Result<Self, CpaError> {
        serde_yaml::from_str(text)
            .map_err(|err| CpaError::Serde(ErrorInfo::new("plan-yaml", err.to_string())))
    }

    /// Parses a plan from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self, CpaError> {
        serde_json::from_str(text)
            .map_err(|err| CpaError::Serde(ErrorInfo::new("plan-json", err.to_string())))
    }

    /// Loads a plan from a file, selecting the format by extension.
    pub fn from_path(path: &Path) -> Result<Self, CpaError> {
        let text = std::fs::read_to_string(path).map_err(|err| {
            CpaError::Config(
                ErrorInfo::new("plan-read", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&text),
            Some("json") => Self::from_json_str(&text),
            other => Err(CpaError::Config(
                ErrorInfo::new("plan-format", "plan files must be .yaml, .yml or .json")
                    .with_context("path", path.display().to_string())
                    .with_context("extension", other.unwrap_or("").to_string()),
            )),
        }
    }

    /// Stable fingerprint over the canonical JSON form of the whole plan.
    pub fn fingerprint(&self) -> Result<String, CpaError> {
        stable_hash_string(self)
    }

    /// Validates plan shape before any stage executes.
    ///
    /// Checks ordering invariants (an initializer first, a metrics terminal
    /// last), rejects duplicate stage names, and runs each config's own
    /// field validation. Called by the executor; callers may invoke it
    /// earlier to fail fast on load.
    pub fn validate(&self) -> Result<(), CpaError> {
        let first = self.stages.first().ok_or_else(|| {
            CpaError::Config(ErrorInfo::new(
                "plan-empty",
                "a plan must contain at least one stage",
            ))
        })?;
        if !first.is_initializer() {
            return Err(CpaError::Config(
                ErrorInfo::new(
                    "plan-first-stage",
                    "the first stage must initialize the pulse",
                )
                .with_context("stage", first.name())
                .with_context("kind", first.kind()),
            ));
        }
        let last = self.stages.last().ok_or_else(|| {
            CpaError::Config(ErrorInfo::new(
                "plan-empty",
                "a plan must contain at least one stage",
            ))
        })?;
        if !last.is_terminal() {
            return Err(CpaError::Config(
                ErrorInfo::new(
                    "plan-last-stage",
                    "the last stage must be a metrics terminal",
                )
                .with_context("stage", last.name())
                .with_context("kind", last.kind()),
            ));
        }

        let mut seen = BTreeSet::new();
        for config in &self.stages {
            if !seen.insert(config.name().to_string()) {
                return Err(CpaError::Config(
                    ErrorInfo::new(
                        "plan-duplicate-stage",
                        "stage names must be unique within a plan",
                    )
                    .with_context("stage", config.name()),
                ));
            }
            config.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL_YAML: &str = r#"
seed: 42
stages:
  - kind: analytic
    name: laser_init
    shape: gaussian
    fwhm_fs: 100.0
    peak_power_w: 1.0e3
    samples: 512
    time_window_fs: 2000.0
    center_wavelength_nm: 1030.0
    rep_rate_hz: 8.0e7
  - kind: metrics
    name: final_metrics
"#;

    #[test]
    fn yaml_round_trips_and_validates() {
        let plan = Plan::from_yaml_str(MINIMAL_YAML).unwrap();
        assert_eq!(plan.seed, 42);
        assert_eq!(plan.stages.len(), 2);
        plan.validate().unwrap();
    }

    #[test]
    fn fingerprint_is_order_sensitive() {
        let plan = Plan::from_yaml_str(MINIMAL_YAML).unwrap();
        let mut swapped = plan.clone();
        swapped.stages.reverse();
        assert_ne!(
            plan.fingerprint().unwrap(),
            swapped.fingerprint().unwrap()
        );
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut plan = Plan::from_yaml_str(MINIMAL_YAML).unwrap();
        let mut copy = plan.stages[1].clone();
        if let StageConfig::Metrics(cfg) = &mut copy {
            cfg.name = "laser_init".to_string();
        }
        plan.stages.insert(1, copy);
        let err = plan.validate().unwrap_err();
        assert_eq!(err.info().code, "plan-duplicate-stage");
    }

    #[test]
    fn misordered_plans_are_rejected() {
        let mut plan = Plan::from_yaml_str(MINIMAL_YAML).unwrap();
        plan.stages.reverse();
        let err = plan.validate().unwrap_err();
        assert_eq!(err.info().code, "plan-first-stage");
    }

    #[test]
    fn loads_yaml_plans_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.yaml");
        std::fs::write(&path, MINIMAL_YAML).unwrap();
        let plan = Plan::from_path(&path).unwrap();
        assert_eq!(plan.seed, 42);

        let odd = dir.path().join("plan.toml");
        std::fs::write(&odd, "seed = 1").unwrap();
        let err = Plan::from_path(&odd).unwrap_err();
        assert_eq!(err.info().code, "plan-format");
    }

    #[test]
    fn unknown_plan_keys_are_rejected() {
        let err = Plan::from_yaml_str("seed: 1\nstages: []\nextra: true\n").unwrap_err();
        assert_eq!(err.info().code, "plan-yaml");
    }
}
