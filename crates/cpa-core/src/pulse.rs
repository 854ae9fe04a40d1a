//! The pulse state handed between pipeline stages.

use std::collections::BTreeMap;
use std::sync::Arc;

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::errors::{CpaError, ErrorInfo};
use crate::fft::FftConvention;
use crate::grid::Grid;
use crate::hash::field_hash;

/// Conversion from femtoseconds to seconds for energy accounting.
pub const FS_TO_S: f64 = 1e-15;

/// Metadata key recording the envelope normalization convention.
pub const FIELD_UNITS_KEY: &str = "pulse.field_units";

/// The only supported envelope normalization: `|A|²` is power in watts.
pub const FIELD_UNITS_SQRT_W: &str = "sqrt(W)";

/// Complex envelope plus derived quantities flowing through the pipeline.
///
/// Stages consume a state and return a new one; no stage mutates arrays a
/// previous stage may still hold. The spectrum is always recomputed from
/// `field_t` rather than cached across stage boundaries, so a stale cache
/// can never leak through a transform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PulseState {
    /// Sampling grid, shared read-only across stages.
    pub grid: Arc<Grid>,
    /// Time-domain envelope in sqrt(W); `|field_t[k]|²` is watts.
    pub field_t: Vec<Complex64>,
    /// Free-form metadata (units, provenance tags, reference traces).
    pub metadata: BTreeMap<String, String>,
    /// Scalar metrics, namespaced `"<stage>.<name>_<unit>"`.
    pub metrics: BTreeMap<String, f64>,
    /// Opaque artifact references; never large arrays.
    pub artifacts: BTreeMap<String, String>,
}

impl PulseState {
    /// Creates a state from a grid and time-domain envelope.
    pub fn new(grid: Arc<Grid>, field_t: Vec<Complex64>) -> Result<Self, CpaError> {
        if field_t.len() != grid.samples() {
            return Err(CpaError::Config(
                ErrorInfo::new("pulse-shape", "field length does not match grid")
                    .with_context("field_len", field_t.len().to_string())
                    .with_context("grid_samples", grid.samples().to_string()),
            ));
        }
        let mut metadata = BTreeMap::new();
        metadata.insert(FIELD_UNITS_KEY.to_string(), FIELD_UNITS_SQRT_W.to_string());
        Ok(Self {
            grid,
            field_t,
            metadata,
            metrics: BTreeMap::new(),
            artifacts: BTreeMap::new(),
        })
    }

    /// FFT convention bound to this state's grid.
    pub fn fft(&self) -> FftConvention {
        FftConvention::new(self.grid.samples(), self.grid.dt_fs())
    }

    /// Recomputed frequency-domain envelope (fftshift ordering).
    pub fn spectrum(&self) -> Vec<Complex64> {
        self.fft().forward(&self.field_t)
    }

    /// Pulse energy `Σ|A|²·dt` in W·fs.
    pub fn energy_w_fs(&self) -> f64 {
        self.fft().energy_time(&self.field_t)
    }

    /// Pulse energy in joules.
    pub fn energy_j(&self) -> f64 {
        self.energy_w_fs() * FS_TO_S
    }

    /// Peak instantaneous power in watts.
    pub fn peak_power_w(&self) -> f64 {
        self.field_t
            .iter()
            .map(|a| a.norm_sqr())
            .fold(0.0_f64, f64::max)
    }

    /// Returns a successor state with a replaced time-domain field.
    ///
    /// Metadata, metrics and artifacts are carried forward; the grid is
    /// shared. This is the copy-on-transform path stages should use.
    pub fn with_field(&self, field_t: Vec<Complex64>) -> Result<Self, CpaError> {
        if field_t.len() != self.grid.samples() {
            return Err(CpaError::Config(
                ErrorInfo::new("pulse-shape", "replacement field length does not match grid")
                    .with_context("field_len", field_t.len().to_string())
                    .with_context("grid_samples", self.grid.samples().to_string()),
            ));
        }
        Ok(Self {
            grid: Arc::clone(&self.grid),
            field_t,
            metadata: self.metadata.clone(),
            metrics: self.metrics.clone(),
            artifacts: self.artifacts.clone(),
        })
    }

    /// Returns a successor state on a new grid (resampling transforms).
    pub fn with_grid_and_field(
        &self,
        grid: Arc<Grid>,
        field_t: Vec<Complex64>,
    ) -> Result<Self, CpaError> {
        let mut next = Self::new(grid, field_t)?;
        next.metadata.extend(self.metadata.clone());
        next.metrics = self.metrics.clone();
        next.artifacts = self.artifacts.clone();
        Ok(next)
    }

    /// Verifies every field sample is finite.
    ///
    /// The error carries the stage label and the first offending sample
    /// index; callers attach segment indices where applicable.
    pub fn check_finite(&self, stage: &str) -> Result<(), CpaError> {
        for (idx, sample) in self.field_t.iter().enumerate() {
            if !sample.re.is_finite() || !sample.im.is_finite() {
                return Err(CpaError::Numerics(
                    ErrorInfo::new("field-non-finite", "field contains NaN or Inf")
                        .with_context("stage", stage)
                        .with_context("sample_index", idx.to_string()),
                ));
            }
        }
        Ok(())
    }

    /// Canonical hash of the field buffer, for state fingerprints.
    pub fn field_fingerprint(&self) -> String {
        field_hash(&self.field_t)
    }
}

/// Verifies a field buffer is finite without constructing a state.
pub fn check_field_finite(field: &[Complex64], stage: &str) -> Result<(), CpaError> {
    for (idx, sample) in field.iter().enumerate() {
        if !sample.re.is_finite() || !sample.im.is_finite() {
            return Err(CpaError::Numerics(
                ErrorInfo::new("field-non-finite", "field contains NaN or Inf")
                    .with_context("stage", stage)
                    .with_context("sample_index", idx.to_string()),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> PulseState {
        let grid = Arc::new(Grid::new(16, 1.0, 1030.0).unwrap());
        let field = vec![Complex64::new(1.0, 0.0); 16];
        PulseState::new(grid, field).unwrap()
    }

    #[test]
    fn energy_accounting_uses_dt() {
        let s = state();
        assert!((s.energy_w_fs() - 16.0).abs() < 1e-12);
        assert!((s.energy_j() - 16.0e-15).abs() < 1e-27);
    }

    #[test]
    fn non_finite_field_is_fatal_with_index() {
        let mut s = state();
        s.field_t[5] = Complex64::new(f64::NAN, 0.0);
        let err = s.check_finite("fiber").unwrap_err();
        assert_eq!(err.info().code, "field-non-finite");
        assert_eq!(err.info().context.get("sample_index").unwrap(), "5");
    }

    #[test]
    fn with_field_shares_grid_but_not_samples() {
        let s = state();
        let next = s.with_field(vec![Complex64::new(2.0, 0.0); 16]).unwrap();
        assert!(Arc::ptr_eq(&s.grid, &next.grid));
        assert!((s.field_t[0].re - 1.0).abs() < f64::EPSILON);
        assert!((next.field_t[0].re - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn shape_mismatch_is_config_error() {
        let s = state();
        let err = s.with_field(vec![Complex64::new(0.0, 0.0); 8]).unwrap_err();
        assert_eq!(err.info().code, "pulse-shape");
    }
}
