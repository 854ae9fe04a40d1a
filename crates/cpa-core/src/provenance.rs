//! Provenance and schema descriptors attached to every pipeline run.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Semantic version describing the schema of serialized payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SchemaVersion {
    /// Major version incremented for breaking changes.
    pub major: u32,
    /// Minor version incremented for additive changes.
    pub minor: u32,
    /// Patch version incremented for bug fixes and documentation updates.
    pub patch: u32,
}

impl SchemaVersion {
    /// Creates a new schema version descriptor.
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl Default for SchemaVersion {
    fn default() -> Self {
        Self::new(1, 0, 0)
    }
}

/// Per-stage provenance record accumulated while a pipeline executes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    /// Stage name as declared in the plan.
    pub name: String,
    /// Stable fingerprint of the stage configuration.
    pub config_fingerprint: String,
    /// Stage implementation version tag.
    pub version: String,
    /// Metrics emitted by this stage (already namespaced).
    pub metrics_delta: BTreeMap<String, f64>,
    /// Metadata keys the stage added or overwrote on the state.
    pub metadata_delta: BTreeMap<String, String>,
}

/// Provenance information attached to every completed or failed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RunProvenance {
    /// Short run identifier derived from the seed and plan fingerprint.
    pub run_id: String,
    /// ISO-8601 timestamp recording when the run started.
    pub created_at: String,
    /// Master deterministic seed used for all stage randomness.
    pub seed: u64,
    /// Stable fingerprint of the whole ordered plan.
    pub plan_fingerprint: String,
    /// Records for every stage that executed, in order.
    pub stages: Vec<StageRecord>,
}

impl RunProvenance {
    /// Derives the short run identifier from the seed and plan fingerprint.
    ///
    /// The timestamp participates so that re-runs of the same plan remain
    /// distinguishable in registries; it never feeds any physics.
    pub fn run_id_for(seed: u64, plan_fingerprint: &str, created_at: &str) -> String {
        use sha2::{Digest, Sha256};
        let digest = Sha256::digest(format!("{seed}:{plan_fingerprint}:{created_at}").as_bytes());
        let hex: String = digest
            .iter()
            .take(8)
            .map(|byte| format!("{byte:02x}"))
            .collect();
        format!("run-{hex}")
    }
}
