//! Grating-pair (Treacy) dispersive stage and direct phase-only dispersion.

use std::collections::BTreeMap;

use num_complex::Complex64;

use cpa_core::errors::{CpaError, ErrorInfo};
use cpa_core::fft::{assert_phase_only, SPEED_OF_LIGHT_UM_PER_FS};
use cpa_core::pulse::PulseState;

use crate::config::{PhaseOnlyCfg, TreacyGratingCfg};
use crate::stage::{RunContext, Stage, StageInput, StageOutput};

/// Closed-form dispersion of a grating pair at its design wavelength.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreacyDispersion {
    /// Group-delay dispersion in fs² (signed).
    pub gdd_fs2: f64,
    /// Third-order dispersion in fs³ (signed).
    pub tod_fs3: f64,
    /// Carrier angular frequency `2πc/λ` in rad/fs.
    pub omega0_rad_per_fs: f64,
    /// Grating period in micrometers.
    pub period_um: f64,
    /// Littrow angle in degrees.
    pub littrow_angle_deg: f64,
    /// Diffraction angle in degrees.
    pub diffraction_angle_deg: f64,
}

fn safe_asin(arg: f64, context: &str, cfg: &TreacyGratingCfg) -> Result<f64, CpaError> {
    if !(-1.0..=1.0).contains(&arg) {
        return Err(CpaError::Domain(
            ErrorInfo::new(
                "treacy-no-order",
                "no propagating diffraction order for this geometry",
            )
            .with_context("stage", cfg.name.clone())
            .with_context("quantity", context)
            .with_value("sin_argument", arg)
            .with_context("diffraction_order", cfg.diffraction_order.to_string())
            .with_value("wavelength_nm", cfg.wavelength_nm)
            .with_value("line_density_per_mm", cfg.line_density_per_mm)
            .with_value("incidence_angle_deg", cfg.incidence_angle_deg),
        ));
    }
    Ok(arg.asin())
}

/// Computes double-pass grating-pair GDD/TOD from the closed-form
/// expressions, honoring the config's overrides and `include_tod` switch.
pub fn treacy_dispersion(cfg: &TreacyGratingCfg) -> Result<TreacyDispersion, CpaError> {
    let lambda_um = cfg.wavelength_nm * 1e-3;
    let period_um = 1000.0 / cfg.line_density_per_mm;
    let theta_i = cfg.incidence_angle_deg.to_radians();
    let m = f64::from(cfg.diffraction_order);
    let n_passes = f64::from(cfg.n_passes);
    let separation_um = cfg.separation_um;
    let c = SPEED_OF_LIGHT_UM_PER_FS;

    let littrow = safe_asin(lambda_um / (2.0 * period_um), "littrow_angle", cfg)?;
    let diff_sin = -m * lambda_um / period_um - theta_i.sin();
    let diffraction = safe_asin(diff_sin, "diffraction_angle", cfg)?;

    let bracket = 1.0 - diff_sin * diff_sin;
    if bracket <= 0.0 {
        return Err(CpaError::Domain(
            ErrorInfo::new("treacy-grazing", "diffracted beam is grazing; GDD diverges")
                .with_context("stage", cfg.name.clone())
                .with_value("bracket", bracket),
        ));
    }
    let gdd = -(n_passes * m * m * separation_um * lambda_um.powi(3))
        / (2.0 * std::f64::consts::PI * c * c * period_um * period_um)
        * bracket.powf(-1.5);

    let tod_den = 1.0 - (lambda_um / period_um - theta_i.sin()).powi(2);
    if tod_den <= 0.0 {
        return Err(CpaError::Domain(
            ErrorInfo::new("treacy-tod-degenerate", "TOD denominator must be > 0")
                .with_context("stage", cfg.name.clone())
                .with_value("denominator", tod_den),
        ));
    }
    let tod_num = 1.0 + (lambda_um / period_um) * theta_i.sin() - theta_i.sin().powi(2);
    let tod = -(3.0 * lambda_um) / (2.0 * std::f64::consts::PI * c) * (tod_num / tod_den) * gdd;

    let gdd_out = cfg.override_gdd_fs2.unwrap_or(gdd);
    let tod_computed = if cfg.include_tod { tod } else { 0.0 };
    let tod_out = cfg.override_tod_fs3.unwrap_or(tod_computed);

    Ok(TreacyDispersion {
        gdd_fs2: gdd_out,
        tod_fs3: tod_out,
        omega0_rad_per_fs: 2.0 * std::f64::consts::PI * c / lambda_um,
        period_um,
        littrow_angle_deg: littrow.to_degrees(),
        diffraction_angle_deg: diffraction.to_degrees(),
    })
}

/// Taylor spectral phase `½·GDD·Δω² + (1/6)·TOD·Δω³` over the baseband
/// axis, in radians per bin.
fn dispersion_phase(omega_rad_per_fs: &[f64], gdd_fs2: f64, tod_fs3: f64) -> Vec<f64> {
    omega_rad_per_fs
        .iter()
        .map(|&w| 0.5 * gdd_fs2 * w * w + tod_fs3 / 6.0 * w * w * w)
        .collect()
}

enum DispersiveKind {
    Grating(TreacyGratingCfg),
    PhaseOnly(PhaseOnlyCfg),
}

/// Phase-only dispersive element: grating pair or direct GDD/TOD.
pub struct DispersiveStage {
    kind: DispersiveKind,
}

impl DispersiveStage {
    /// Grating-pair flavor.
    pub fn grating(cfg: TreacyGratingCfg) -> Self {
        Self {
            kind: DispersiveKind::Grating(cfg),
        }
    }

    /// Direct GDD/TOD flavor.
    pub fn phase_only(cfg: PhaseOnlyCfg) -> Self {
        Self {
            kind: DispersiveKind::PhaseOnly(cfg),
        }
    }

    fn apply_phase(
        &self,
        state: &PulseState,
        gdd_fs2: f64,
        tod_fs3: f64,
        ctx: &RunContext,
    ) -> Result<PulseState, CpaError> {
        let conv = state.fft();
        let spectrum = state.spectrum();
        let omega = state.grid.omega_axis_rad_per_fs();
        let phase = dispersion_phase(&omega, gdd_fs2, tod_fs3);
        let shifted: Vec<Complex64> = spectrum
            .iter()
            .zip(phase.iter())
            .map(|(bin, &phi)| bin * Complex64::new(0.0, phi).exp())
            .collect();
        if let Some(rtol) = ctx.policy.phase_only_check_rtol {
            assert_phase_only(&spectrum, &shifted, rtol)?;
        }
        let out = state.with_field(conv.inverse(&shifted))?;
        out.check_finite(self.name())?;
        Ok(out)
    }
}

impl Stage for DispersiveStage {
    fn name(&self) -> &str {
        match &self.kind {
            DispersiveKind::Grating(cfg) => &cfg.name,
            DispersiveKind::PhaseOnly(cfg) => &cfg.name,
        }
    }

    fn process(&self, input: StageInput, ctx: &RunContext) -> Result<StageOutput, CpaError> {
        let state = input.into_state(self.name())?;
        let mut metrics = BTreeMap::new();

        let (gdd, tod, apply) = match &self.kind {
            DispersiveKind::Grating(cfg) => {
                let dispersion = treacy_dispersion(cfg)?;
                metrics.insert("omega0_rad_per_fs".to_string(), dispersion.omega0_rad_per_fs);
                metrics.insert("period_um".to_string(), dispersion.period_um);
                metrics.insert("littrow_angle_deg".to_string(), dispersion.littrow_angle_deg);
                metrics.insert(
                    "diffraction_angle_deg".to_string(),
                    dispersion.diffraction_angle_deg,
                );
                metrics.insert("n_passes".to_string(), f64::from(cfg.n_passes));
                metrics.insert(
                    "diffraction_order".to_string(),
                    f64::from(cfg.diffraction_order),
                );
                (dispersion.gdd_fs2, dispersion.tod_fs3, cfg.apply_to_pulse)
            }
            DispersiveKind::PhaseOnly(cfg) => (cfg.gdd_fs2, cfg.tod_fs3, cfg.apply_to_pulse),
        };
        metrics.insert("gdd_fs2".to_string(), gdd);
        metrics.insert("tod_fs3".to_string(), tod);
        metrics.insert("applied".to_string(), if apply { 1.0 } else { 0.0 });

        let out = if apply {
            self.apply_phase(&state, gdd, tod, ctx)?
        } else {
            state
        };
        metrics.insert("energy_w_fs".to_string(), out.energy_w_fs());

        Ok(StageOutput {
            state: out,
            metrics,
        })
    }
}
