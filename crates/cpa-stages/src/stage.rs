//! The stage contract: trait, invocation context and dispatch.

use std::collections::BTreeMap;

use cpa_core::errors::{CpaError, ErrorInfo};
use cpa_core::pulse::PulseState;
use cpa_core::rng::RngHandle;
use serde::{Deserialize, Serialize};

use crate::amp::{FiberAmpStage, SimpleGainStage};
use crate::config::StageConfig;
use crate::fiber::FiberStage;
use crate::laser::AnalyticLaserStage;
use crate::metrics::StandardMetricsStage;
use crate::treacy::DispersiveStage;

/// Immutable cross-cutting options passed by value into every stage.
///
/// This replaces any ambient/global policy state: stages see exactly what
/// the pipeline invocation was handed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RunPolicy {
    /// When set, phase-only stages verify their spectral magnitude is
    /// preserved within this relative tolerance after applying the phase.
    #[serde(default)]
    pub phase_only_check_rtol: Option<f64>,
    /// Caller-imposed upper bound on amplifier net gain in dB. The mapper
    /// itself never clamps; exceeding this bound is a guardrail error.
    #[serde(default)]
    pub max_net_gain_db: Option<f64>,
}

/// Per-run invocation context shared by all stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunContext {
    /// Master deterministic seed; stage sub-seeds derive from it by name.
    pub seed: u64,
    /// Cross-cutting policy options.
    pub policy: RunPolicy,
}

impl RunContext {
    /// Creates a context with default policy.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            policy: RunPolicy::default(),
        }
    }

    /// Deterministic RNG substream for the named stage.
    ///
    /// Every call returns a fresh handle at the start of the stream, so a
    /// stage draws the same sequence no matter how many times it asks.
    pub fn rng_for(&self, stage: &str) -> RngHandle {
        RngHandle::for_stage(self.seed, stage)
    }
}

/// Input handed to a stage by the executor.
///
/// The first stage of a pipeline receives [`StageInput::Seed`] and must
/// build the initial [`PulseState`] from nothing but its config and the run
/// context; every later stage receives the previous stage's state by value.
#[derive(Debug)]
pub enum StageInput {
    /// No prior state; produce the first pulse.
    Seed,
    /// State handed off from the previous stage.
    State(PulseState),
}

impl StageInput {
    /// Unwraps the carried state, failing when the stage is mis-positioned.
    pub fn into_state(self, stage: &str) -> Result<PulseState, CpaError> {
        match self {
            StageInput::State(state) => Ok(state),
            StageInput::Seed => Err(CpaError::Config(
                ErrorInfo::new(
                    "stage-needs-state",
                    "stage transforms an existing pulse and cannot run first",
                )
                .with_context("stage", stage),
            )),
        }
    }
}

/// Result of one stage execution.
#[derive(Debug)]
pub struct StageOutput {
    /// Successor pulse state.
    pub state: PulseState,
    /// Stage metrics with raw (unprefixed) names; the executor namespaces
    /// them as `"<stage>.<name>"`.
    pub metrics: BTreeMap<String, f64>,
}

/// Contract every physics stage implements.
///
/// Stages are pure transforms: they take a state by value, never alias a
/// previous stage's buffers, and report scalar metrics only. Any
/// pseudo-randomness must come from the deterministic per-stage sub-seed.
pub trait Stage: Send + Sync {
    /// Stage name as declared in the plan.
    fn name(&self) -> &str;

    /// Stage implementation version tag recorded in provenance.
    fn version(&self) -> &str {
        "v1"
    }

    /// Executes the stage.
    fn process(&self, input: StageInput, ctx: &RunContext) -> Result<StageOutput, CpaError>;
}

/// Builds the executable stage for a validated config.
///
/// Dispatch happens here, at construction time, over the closed set of
/// config variants; there is no runtime tag probing after this point.
pub fn build_stage(config: &StageConfig) -> Result<Box<dyn Stage>, CpaError> {
    config.validate()?;
    match config {
        StageConfig::Analytic(cfg) => Ok(Box::new(AnalyticLaserStage::new(cfg.clone()))),
        StageConfig::TreacyGrating(cfg) => Ok(Box::new(DispersiveStage::grating(cfg.clone()))),
        StageConfig::PhaseOnly(cfg) => Ok(Box::new(DispersiveStage::phase_only(cfg.clone()))),
        StageConfig::Fiber(cfg) => Ok(Box::new(FiberStage::new(cfg.clone())?)),
        StageConfig::FiberAmp(cfg) => Ok(Box::new(FiberAmpStage::new(cfg.clone()))),
        StageConfig::SimpleGain(cfg) => Ok(Box::new(SimpleGainStage::new(cfg.clone()))),
        StageConfig::Metrics(cfg) => Ok(Box::new(StandardMetricsStage::new(cfg.clone()))),
    }
}
