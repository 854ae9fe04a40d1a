//! Sequential plan execution with provenance accumulation.

use std::collections::BTreeMap;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use cpa_core::errors::CpaError;
use cpa_core::provenance::{RunProvenance, StageRecord};
use cpa_core::pulse::PulseState;
use cpa_stages::{build_stage, RunContext, StageInput};

use crate::plan::Plan;

/// Result of a completed run.
#[derive(Debug)]
pub struct RunReport {
    /// Final pulse state after the terminal stage.
    pub state: PulseState,
    /// Merged metrics from every stage, keyed `"<stage>.<metric>"`.
    pub metrics: BTreeMap<String, f64>,
    /// Provenance covering every executed stage.
    pub provenance: RunProvenance,
}

/// A failed run: the error, the stage it happened in, and the provenance
/// of every stage that completed before it.
#[derive(Debug, Serialize, Deserialize)]
pub struct RunFailure {
    /// Name of the stage that returned the error.
    pub failed_stage: String,
    /// The structured error as reported by the stage.
    pub error: CpaError,
    /// Partial provenance for the stages that completed.
    pub provenance: RunProvenance,
}

fn fail(stage: &str, error: CpaError, provenance: &RunProvenance) -> RunFailure {
    RunFailure {
        failed_stage: stage.to_string(),
        error,
        provenance: provenance.clone(),
    }
}

fn metadata_delta(
    before: &BTreeMap<String, String>,
    after: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    after
        .iter()
        .filter(|&(key, value)| before.get(key) != Some(value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Executes a plan start to finish.
///
/// Stages run strictly in order on a single thread. Stage metrics are
/// namespaced as `"<stage>.<metric>"` and merged both into the report and
/// into the flowing state's metric map, so later stages can observe
/// earlier readings. The first error aborts the run; there are no retries,
/// and [`RunFailure`] carries provenance for the stages that did complete.
pub fn run_plan(plan: &Plan) -> Result<RunReport, RunFailure> {
    let mut provenance = RunProvenance {
        seed: plan.seed,
        created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
        ..RunProvenance::default()
    };

    provenance.plan_fingerprint = plan
        .fingerprint()
        .map_err(|err| fail("", err, &provenance))?;
    provenance.run_id = RunProvenance::run_id_for(
        plan.seed,
        &provenance.plan_fingerprint,
        &provenance.created_at,
    );
    plan.validate().map_err(|err| fail("", err, &provenance))?;

    // Build every stage up front so construction-time errors (unknown
    // backends, bad configs) surface before any physics runs.
    let mut stages = Vec::with_capacity(plan.stages.len());
    for config in &plan.stages {
        let stage = build_stage(config).map_err(|err| fail(config.name(), err, &provenance))?;
        let fingerprint = config
            .fingerprint()
            .map_err(|err| fail(config.name(), err, &provenance))?;
        stages.push((stage, fingerprint));
    }

    let ctx = RunContext {
        seed: plan.seed,
        policy: plan.policy.clone(),
    };

    let mut merged: BTreeMap<String, f64> = BTreeMap::new();
    let mut current: Option<PulseState> = None;
    for (stage, fingerprint) in &stages {
        let name = stage.name().to_string();
        let input = match current.take() {
            None => StageInput::Seed,
            Some(state) => StageInput::State(state),
        };
        let metadata_before = match &input {
            StageInput::Seed => BTreeMap::new(),
            StageInput::State(state) => state.metadata.clone(),
        };

        let output = stage
            .process(input, &ctx)
            .map_err(|err| fail(&name, err, &provenance))?;
        let mut state = output.state;

        let mut namespaced = BTreeMap::new();
        for (key, value) in output.metrics {
            namespaced.insert(format!("{name}.{key}"), value);
        }
        merged.extend(namespaced.clone());
        state.metrics.extend(namespaced.clone());
        // End-of-stage field hash; lets reports compare runs without
        // persisting the arrays themselves.
        let field_hash = state.field_fingerprint();
        state
            .artifacts
            .insert(format!("{name}.field_sha256"), field_hash);

        provenance.stages.push(StageRecord {
            name: name.clone(),
            config_fingerprint: fingerprint.clone(),
            version: stage.version().to_string(),
            metrics_delta: namespaced,
            metadata_delta: metadata_delta(&metadata_before, &state.metadata),
        });
        current = Some(state);
    }

    // validate() guarantees at least one stage, so current is always set.
    let state = current.expect("validated plan has at least one stage");
    Ok(RunReport {
        state,
        metrics: merged,
        provenance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHAIN_YAML: &str = r#"
seed: 7
stages:
  - kind: analytic
    name: laser_init
    shape: gaussian
    fwhm_fs: 100.0
    peak_power_w: 1.0e3
    samples: 512
    time_window_fs: 4000.0
    center_wavelength_nm: 1030.0
    rep_rate_hz: 8.0e7
  - kind: phase_only
    name: stretcher
    gdd_fs2: 2.0e5
    tod_fs3: 0.0
    apply_to_pulse: true
  - kind: metrics
    name: final_metrics
"#;

    #[test]
    fn metrics_are_namespaced_by_stage() {
        let plan = Plan::from_yaml_str(CHAIN_YAML).unwrap();
        let report = run_plan(&plan).unwrap();
        assert!(report.metrics.contains_key("laser_init.energy_w_fs"));
        assert!(report.metrics.contains_key("stretcher.gdd_fs2"));
        assert!(report.metrics.contains_key("final_metrics.fwhm_fs"));
        assert_eq!(report.provenance.stages.len(), 3);
        assert!(report.provenance.run_id.starts_with("run-"));
    }

    #[test]
    fn later_stages_see_earlier_metrics_on_the_state() {
        let plan = Plan::from_yaml_str(CHAIN_YAML).unwrap();
        let report = run_plan(&plan).unwrap();
        assert!(report.state.metrics.contains_key("laser_init.peak_power_w"));
        assert!(report
            .state
            .metrics
            .contains_key("final_metrics.amplification_ratio"));
    }

    #[test]
    fn validation_failure_reports_before_any_stage() {
        let mut plan = Plan::from_yaml_str(CHAIN_YAML).unwrap();
        plan.stages.pop();
        let failure = run_plan(&plan).unwrap_err();
        assert_eq!(failure.error.info().code, "plan-last-stage");
        assert!(failure.provenance.stages.is_empty());
    }
}
