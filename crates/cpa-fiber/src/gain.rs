//! Power-target to distributed-gain mapping for amplifier stages.

use serde::{Deserialize, Serialize};

use cpa_core::errors::{CpaError, ErrorInfo};

/// Measurement-plane amplification request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerTargetRequest {
    /// Desired average output power at the measurement plane, in watts.
    pub target_avg_power_w: f64,
    /// Pulse repetition rate in hertz.
    pub rep_rate_hz: f64,
    /// Fiber length in meters.
    pub length_m: f64,
    /// Intrinsic passive loss of the fiber in dB/m.
    #[serde(default)]
    pub intrinsic_loss_db_per_m: f64,
}

/// Resolved gain mapping handed to the propagation engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MappedGain {
    /// Input average power implied by the pulse energy and rep rate, W.
    pub power_in_avg_w: f64,
    /// Net power gain required to hit the target, in dB.
    pub net_gain_db: f64,
    /// Effective distributed loss implementing the gain, dB/m (negative).
    pub effective_loss_db_per_m: f64,
    /// Total loss handed to the engine: intrinsic plus effective, dB/m.
    pub total_loss_db_per_m: f64,
}

fn guardrail(code: &str, message: &str, key: &str, value: f64) -> CpaError {
    CpaError::Guardrail(ErrorInfo::new(code, message).with_value(key, value))
}

/// Maps a target average output power to the distributed gain/loss
/// coefficient consumed by the split-step engine.
///
/// `energy_in_j` is the sampled input pulse energy `Σ|A|²·dt` in joules.
/// No clamping is applied to extreme gain requests; callers impose bounds
/// as policy if they want them.
pub fn map_power_target(
    energy_in_j: f64,
    request: &PowerTargetRequest,
) -> Result<MappedGain, CpaError> {
    if !(request.rep_rate_hz.is_finite() && request.rep_rate_hz > 0.0) {
        return Err(guardrail(
            "gain-rep-rate",
            "repetition rate must be finite and > 0",
            "rep_rate_hz",
            request.rep_rate_hz,
        ));
    }
    if !(request.target_avg_power_w.is_finite() && request.target_avg_power_w > 0.0) {
        return Err(guardrail(
            "gain-target-power",
            "target average power must be finite and > 0",
            "target_avg_power_w",
            request.target_avg_power_w,
        ));
    }
    if !(request.length_m.is_finite() && request.length_m > 0.0) {
        return Err(guardrail(
            "gain-length",
            "fiber length must be finite and > 0",
            "length_m",
            request.length_m,
        ));
    }
    let power_in_avg_w = energy_in_j * request.rep_rate_hz;
    if !(power_in_avg_w.is_finite() && power_in_avg_w > 0.0) {
        return Err(guardrail(
            "gain-input-power",
            "input average power must be finite and > 0; check the input window and normalization",
            "power_in_avg_w",
            power_in_avg_w,
        ));
    }
    let net_gain = request.target_avg_power_w / power_in_avg_w;
    if !(net_gain.is_finite() && net_gain > 0.0) {
        return Err(guardrail(
            "gain-net",
            "net gain must be finite and > 0",
            "net_gain",
            net_gain,
        ));
    }
    let net_gain_db = 10.0 * net_gain.log10();
    let effective_loss_db_per_m = -net_gain_db / request.length_m;
    Ok(MappedGain {
        power_in_avg_w,
        net_gain_db,
        effective_loss_db_per_m,
        total_loss_db_per_m: request.intrinsic_loss_db_per_m + effective_loss_db_per_m,
    })
}
