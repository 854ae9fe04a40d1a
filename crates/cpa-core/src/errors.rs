//! Structured error types shared across the CPA crates.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured payload attached to every [`CpaError`] variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable machine readable error code.
    pub code: String,
    /// Human readable diagnostic message.
    pub message: String,
    /// Contextual key value pairs (stage names, offending values, indices).
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// Optional hint that may help the caller resolve the issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorInfo {
    /// Creates a new error payload with the provided code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            hint: None,
        }
    }

    /// Adds a context entry to the payload.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Adds a numeric context entry rendered with full precision.
    pub fn with_value(self, key: impl Into<String>, value: f64) -> Self {
        self.with_context(key, format!("{value:.12e}"))
    }

    /// Sets a human readable hint for remediation.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Canonical error type for the CPA engine.
///
/// The variants mirror the failure taxonomy of the simulator: configuration
/// problems are caught before any stage executes, domain errors describe
/// physically invalid geometry, numerics errors flag NaN/Inf field data and
/// always abort the run, and guardrail errors report violated power/gain
/// mapping preconditions. None of these are retried; every failure is a
/// deterministic function of the inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "family", content = "detail")]
pub enum CpaError {
    /// Malformed or missing stage/pipeline configuration.
    #[error("config error: {0}")]
    Config(ErrorInfo),
    /// Physically invalid geometry or parameters inside a stage.
    #[error("domain error: {0}")]
    Domain(ErrorInfo),
    /// NaN/Inf field data detected after a stage or propagation segment.
    #[error("numerics error: {0}")]
    Numerics(ErrorInfo),
    /// Power/gain mapping precondition violated.
    #[error("guardrail error: {0}")]
    Guardrail(ErrorInfo),
    /// Serialization and schema errors.
    #[error("serde error: {0}")]
    Serde(ErrorInfo),
}

impl Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code: {})", self.message, self.code)?;
        if !self.context.is_empty() {
            write!(f, " | context: [")?;
            for (idx, (key, value)) in self.context.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{key}={value}")?;
            }
            write!(f, "]")?;
        }
        if let Some(hint) = &self.hint {
            write!(f, " | hint: {hint}")?;
        }
        Ok(())
    }
}

impl CpaError {
    /// Returns a reference to the payload describing the error.
    pub fn info(&self) -> &ErrorInfo {
        match self {
            CpaError::Config(info)
            | CpaError::Domain(info)
            | CpaError::Numerics(info)
            | CpaError::Guardrail(info)
            | CpaError::Serde(info) => info,
        }
    }
}
