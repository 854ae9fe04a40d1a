#![deny(missing_docs)]
#![doc = "Plan loading, validation and sequential execution for the CPA chain."]

pub mod plan;
pub mod run;

pub use plan::Plan;
pub use run::{run_plan, RunFailure, RunReport};
