use cpa_core::serde::from_json_slice;
use cpa_pipeline::{run_plan, Plan, RunFailure};

const BAD_GEOMETRY_YAML: &str = r#"
seed: 3
stages:
  - kind: analytic
    name: laser_init
    shape: gaussian
    fwhm_fs: 100.0
    peak_power_w: 10.0
    samples: 512
    time_window_fs: 4000.0
    center_wavelength_nm: 2000.0
    rep_rate_hz: 8.0e7
  - kind: treacy_grating
    name: compressor
    line_density_per_mm: 1200.0
    incidence_angle_deg: 35.0
    separation_um: 1.0e5
    wavelength_nm: 2000.0
    diffraction_order: -1
    n_passes: 2
  - kind: metrics
    name: final_metrics
"#;

#[test]
fn mid_chain_failure_keeps_completed_stage_provenance() {
    let plan = Plan::from_yaml_str(BAD_GEOMETRY_YAML).expect("plan");
    let failure = run_plan(&plan).expect_err("geometry must fail");
    assert_eq!(failure.failed_stage, "compressor");
    assert_eq!(failure.error.info().code, "treacy-no-order");
    assert_eq!(failure.provenance.stages.len(), 1);
    assert_eq!(failure.provenance.stages[0].name, "laser_init");
    assert!(!failure.provenance.plan_fingerprint.is_empty());
}

#[test]
fn failures_serialize_for_reports() {
    let plan = Plan::from_yaml_str(BAD_GEOMETRY_YAML).expect("plan");
    let failure = run_plan(&plan).expect_err("geometry must fail");
    let json = serde_json::to_string(&failure).expect("failure serializes");
    assert!(json.contains("treacy-no-order"));
    assert!(json.contains("compressor"));
    let restored: RunFailure = from_json_slice(json.as_bytes()).expect("failure deserializes");
    assert_eq!(restored.failed_stage, "compressor");
    assert_eq!(restored.error.info().code, "treacy-no-order");
    assert_eq!(restored.provenance.stages.len(), 1);
}

#[test]
fn gain_cap_policy_aborts_the_amplifier() {
    let yaml = r#"
seed: 3
policy:
  max_net_gain_db: 10.0
stages:
  - kind: analytic
    name: laser_init
    shape: gaussian
    fwhm_fs: 100.0
    peak_power_w: 10.0
    samples: 512
    time_window_fs: 4000.0
    center_wavelength_nm: 1030.0
    rep_rate_hz: 8.0e7
  - kind: fiber_amp
    name: booster
    target_avg_power_w: 100.0
    physics:
      length_m: 1.0
      gamma_per_w_m: 0.0
      betas_fsn_per_m: []
      loss_db_per_m: 0.0
    numerics:
      segments: 10
  - kind: metrics
    name: final_metrics
"#;
    let plan = Plan::from_yaml_str(yaml).expect("plan");
    let failure = run_plan(&plan).expect_err("cap must trip");
    assert_eq!(failure.failed_stage, "booster");
    assert_eq!(failure.error.info().code, "amp-gain-cap");
    assert_eq!(failure.provenance.stages.len(), 1);
}
