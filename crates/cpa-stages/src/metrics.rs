//! Terminal metrics stage: summary observables of the final pulse.

use std::collections::BTreeMap;

use cpa_core::errors::CpaError;

use crate::config::MetricsCfg;
use crate::laser::ENERGY_IN_W_FS_KEY;
use crate::stage::{RunContext, Stage, StageInput, StageOutput};

/// Computes end-of-chain summary metrics.
pub struct StandardMetricsStage {
    cfg: MetricsCfg,
}

impl StandardMetricsStage {
    /// Creates the stage from its config.
    pub fn new(cfg: MetricsCfg) -> Self {
        Self { cfg }
    }
}

impl Stage for StandardMetricsStage {
    fn name(&self) -> &str {
        &self.cfg.name
    }

    fn process(&self, input: StageInput, _ctx: &RunContext) -> Result<StageOutput, CpaError> {
        let state = input.into_state(self.name())?;
        state.check_finite(&self.cfg.name)?;

        let t = state.grid.time_axis_fs();
        let intensity: Vec<f64> = state.field_t.iter().map(|a| a.norm_sqr()).collect();
        let spectrum = state.spectrum();
        let spectral_power: Vec<f64> = spectrum.iter().map(|a| a.norm_sqr()).collect();
        let omega = state.grid.omega_axis_rad_per_fs();

        let energy_w_fs = state.energy_w_fs();
        let peak_w = state.peak_power_w();
        let fwhm = interpolated_fwhm(&t, &intensity);
        let ac_fwhm = autocorrelation_fwhm(&intensity, state.grid.dt_fs());
        let bandwidth = spectral_rms_width(&omega, &spectral_power);

        // Energy recorded by the initializer; zero if the plan never ran one
        // (which the executor forbids anyway).
        let energy_in = state
            .metadata
            .get(ENERGY_IN_W_FS_KEY)
            .and_then(|raw| raw.parse::<f64>().ok())
            .unwrap_or(0.0);
        let amplification = if energy_in > 0.0 {
            energy_w_fs / energy_in
        } else {
            0.0
        };

        let mut metrics = BTreeMap::new();
        metrics.insert("energy_w_fs".to_string(), energy_w_fs);
        metrics.insert("pulse_energy_j".to_string(), state.energy_j());
        metrics.insert("peak_power_w".to_string(), peak_w);
        metrics.insert("fwhm_fs".to_string(), fwhm);
        metrics.insert("ac_fwhm_fs".to_string(), ac_fwhm);
        metrics.insert("bandwidth_rad_per_fs".to_string(), bandwidth);
        metrics.insert("amplification_ratio".to_string(), amplification);

        Ok(StageOutput { state, metrics })
    }
}

/// RMS spectral width `sqrt(Σω²·S / ΣS)` in rad/fs.
pub fn spectral_rms_width(omega: &[f64], spectral_power: &[f64]) -> f64 {
    let total: f64 = spectral_power.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    let second: f64 = omega
        .iter()
        .zip(spectral_power.iter())
        .map(|(&w, &s)| w * w * s)
        .sum();
    (second / total).sqrt()
}

/// Temporal FWHM via half-maximum crossings with linear interpolation.
pub fn interpolated_fwhm(t: &[f64], intensity: &[f64]) -> f64 {
    if intensity.len() < 2 {
        return 0.0;
    }
    let (peak_idx, &peak) = intensity
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .expect("non-empty intensity");
    if peak <= 0.0 {
        return 0.0;
    }
    let half = peak / 2.0;

    let mut left = None;
    for idx in (1..=peak_idx).rev() {
        if intensity[idx - 1] < half && half <= intensity[idx] {
            left = Some(interp_crossing(
                t[idx - 1],
                t[idx],
                intensity[idx - 1],
                intensity[idx],
                half,
            ));
            break;
        }
    }
    let mut right = None;
    for idx in peak_idx..intensity.len() - 1 {
        if intensity[idx] >= half && half > intensity[idx + 1] {
            right = Some(interp_crossing(
                t[idx],
                t[idx + 1],
                intensity[idx],
                intensity[idx + 1],
                half,
            ));
            break;
        }
    }
    match (left, right) {
        (Some(l), Some(r)) => r - l,
        _ => 0.0,
    }
}

fn interp_crossing(x0: f64, x1: f64, y0: f64, y1: f64, target: f64) -> f64 {
    if y1 == y0 {
        return x0;
    }
    x0 + (target - y0) * (x1 - x0) / (y1 - y0)
}

/// FWHM of the intensity autocorrelation, in femtoseconds.
pub fn autocorrelation_fwhm(intensity: &[f64], dt_fs: f64) -> f64 {
    let n = intensity.len();
    if n < 2 || !intensity.iter().any(|&i| i > 0.0) {
        return 0.0;
    }
    let clipped: Vec<f64> = intensity.iter().map(|&i| i.max(0.0)).collect();
    let mut autocorr = vec![0.0_f64; 2 * n - 1];
    for (lag_idx, slot) in autocorr.iter_mut().enumerate() {
        let lag = lag_idx as isize - (n as isize - 1);
        let mut sum = 0.0;
        for k in 0..n {
            let j = k as isize + lag;
            if j >= 0 && (j as usize) < n {
                sum += clipped[k] * clipped[j as usize];
            }
        }
        *slot = sum;
    }
    let lags: Vec<f64> = (0..autocorr.len())
        .map(|idx| (idx as isize - (n as isize - 1)) as f64 * dt_fs)
        .collect();
    interpolated_fwhm(&lags, &autocorr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LaserGenCfg, PulseShape, StageConfig};
    use crate::stage::build_stage;

    #[test]
    fn unamplified_chain_reports_unit_ratio_and_seed_width() {
        let laser = build_stage(&StageConfig::Analytic(LaserGenCfg {
            name: "laser_init".to_string(),
            shape: PulseShape::Gaussian,
            fwhm_fs: 100.0,
            peak_power_w: 1.0e3,
            samples: 1024,
            time_window_fs: 4000.0,
            center_wavelength_nm: 1030.0,
            rep_rate_hz: 80.0e6,
        }))
        .unwrap();
        let metrics = build_stage(&StageConfig::Metrics(MetricsCfg {
            name: "metrics".to_string(),
        }))
        .unwrap();

        let ctx = RunContext::new(11);
        let seeded = laser.process(StageInput::Seed, &ctx).unwrap();
        let out = metrics
            .process(StageInput::State(seeded.state), &ctx)
            .unwrap();
        assert!((out.metrics["amplification_ratio"] - 1.0).abs() < 1e-12);
        assert!((out.metrics["fwhm_fs"] - 100.0).abs() < 0.5);
        assert!(out.metrics["bandwidth_rad_per_fs"] > 0.0);
    }

    #[test]
    fn gaussian_fwhm_recovers_width() {
        let fwhm = 120.0_f64;
        let t: Vec<f64> = (0..2048).map(|k| (k as f64 - 1024.0) * 1.0).collect();
        let intensity: Vec<f64> = t
            .iter()
            .map(|&x| (-4.0 * 2.0_f64.ln() * (x / fwhm).powi(2)).exp())
            .collect();
        let measured = interpolated_fwhm(&t, &intensity);
        assert!((measured - fwhm).abs() < 0.5, "{measured}");
    }

    #[test]
    fn gaussian_autocorrelation_is_sqrt2_wider() {
        let fwhm = 80.0_f64;
        let intensity: Vec<f64> = (0..1024)
            .map(|k| {
                let x = k as f64 - 512.0;
                (-4.0 * 2.0_f64.ln() * (x / fwhm).powi(2)).exp()
            })
            .collect();
        let ac = autocorrelation_fwhm(&intensity, 1.0);
        assert!((ac / fwhm - 2.0_f64.sqrt()).abs() < 0.02, "{ac}");
    }

    #[test]
    fn rms_width_handles_empty_and_flat_spectra() {
        assert!(spectral_rms_width(&[], &[]).abs() < f64::EPSILON);
        let width = spectral_rms_width(&[-1.0, 0.0, 1.0], &[1.0, 1.0, 1.0]);
        assert!((width - (2.0_f64 / 3.0).sqrt()).abs() < 1e-12);
    }
}
