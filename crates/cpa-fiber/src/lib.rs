#![deny(missing_docs)]
#![doc = "Nonlinear fiber propagation for the CPA chain: split-step engine, backend registry and power-target gain mapping."]

pub mod backend;
pub mod engine;
pub mod gain;

pub use backend::{resolve_backend, FiberBackend, GridPolicy, PropagationOutcome};
pub use engine::{FiberPhysics, NonlinearOperator, SplitStepEngine, SplitStepNumerics};
pub use gain::{map_power_target, PowerTargetRequest};
