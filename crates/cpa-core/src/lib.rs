#![deny(missing_docs)]
#![doc = "Core data model and numeric conventions for the CPA chain simulator."]

pub mod errors;
pub mod fft;
pub mod grid;
pub mod hash;
pub mod provenance;
pub mod pulse;
pub mod rng;
pub mod serde;

pub use errors::{CpaError, ErrorInfo};
pub use fft::{FftConvention, SPEED_OF_LIGHT_UM_PER_FS};
pub use grid::Grid;
pub use provenance::{RunProvenance, SchemaVersion, StageRecord};
pub use pulse::PulseState;
pub use rng::{derive_stage_seed, RngHandle};
