#![deny(missing_docs)]
#![doc = "Stage contract and physics stage implementations for the CPA chain."]

pub mod amp;
pub mod config;
pub mod fiber;
pub mod laser;
pub mod metrics;
pub mod stage;
pub mod treacy;

pub use config::{
    FiberAmpCfg, FiberStageCfg, LaserGenCfg, MetricsCfg, PhaseOnlyCfg, PulseShape, SimpleGainCfg,
    StageConfig, TreacyGratingCfg,
};
pub use stage::{build_stage, RunContext, RunPolicy, Stage, StageInput, StageOutput};
pub use treacy::{treacy_dispersion, TreacyDispersion};
