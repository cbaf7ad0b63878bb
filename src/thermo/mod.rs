//! Thermal-history computation and its frozen result.
//!
//! [`Thermodynamics::compute`] runs the whole pipeline once: parameter
//! validation, helium resolution, grid construction, the staged stiff
//! integration of recombination and reionization, and the derived-quantity
//! pass. The returned value is immutable; queries go through
//! [`Thermodynamics::at_z`] and are safe to issue from multiple threads,
//! each with its own cursor.

mod derived;
mod output;
mod query;
mod solve;
mod table;

pub use query::InterpolationMode;
pub use table::{ColumnLayout, ThermoPoint, ThermoTable};

use crate::background::Background;
use crate::bbn::{helium_from_bbn, BbnTable};
use crate::config::{Engine, HeliumSetting, Precision, ReionizationConfig, ThermoConfig};
use crate::constants as cst;
use crate::error::ThermoError;
use crate::grid::Grid;

/// The frozen thermal history of one cosmology.
#[derive(Clone, Debug)]
pub struct Thermodynamics {
    /// The tabulated history over the redshift grid.
    pub table: ThermoTable,

    /// Primordial helium mass fraction actually used.
    pub y_he: f64,
    /// Helium-to-hydrogen number ratio.
    pub f_he: f64,
    /// Hydrogen number density today [1/m^3].
    pub n_e: f64,
    /// CMB temperature today [K].
    pub t_cmb: f64,
    /// Conformal time of the earliest grid point [Mpc].
    pub tau_ini: f64,

    /// Recombination redshift (visibility maximum).
    pub z_rec: f64,
    /// Conformal time at recombination [Mpc].
    pub tau_rec: f64,
    /// Comoving sound horizon at recombination [Mpc].
    pub rs_rec: f64,
    /// Physical sound horizon at recombination [Mpc].
    pub ds_rec: f64,
    /// Angular diameter distance to recombination [Mpc].
    pub da_rec: f64,
    /// Comoving angular diameter distance to recombination [Mpc].
    pub ra_rec: f64,
    /// ra_rec over the conformal distance to recombination.
    pub angular_rescaling: f64,
    /// Damping scale at recombination [Mpc], when computed.
    pub rd_rec: Option<f64>,

    /// Baryon drag redshift.
    pub z_d: f64,
    /// Conformal time at the drag epoch [Mpc].
    pub tau_d: f64,
    /// Comoving sound horizon at the drag epoch [Mpc].
    pub rs_d: f64,
    /// Physical sound horizon at the drag epoch [Mpc].
    pub ds_d: f64,

    /// Conformal time after which photons free-stream [Mpc].
    pub tau_free_streaming: f64,
    /// Largest conformal time with negligible visibility [Mpc].
    pub tau_cut: f64,

    /// Reionization redshift (CAMB-family schemes only).
    pub z_reio: Option<f64>,
    /// Integrated reionization optical depth.
    pub tau_reio: f64,

    /// Spline queries switch to linear interpolation below this z.
    linear_interp_below: Option<f64>,
}

impl Thermodynamics {
    /// Run the full compute phase for one cosmology.
    pub fn compute<B: Background + ?Sized>(
        precision: &Precision,
        background: &B,
        config: &ThermoConfig,
    ) -> Result<Self, ThermoError> {
        if config.verbose > 0 {
            println!("Computing thermodynamics");
        }

        // primordial helium
        let y_he = match &config.helium {
            HeliumSetting::Fixed(value) => *value,
            HeliumSetting::Bbn(path) => {
                let table = BbnTable::read(path)?;
                helium_from_bbn(&table, background)?
            }
        };
        if config.verbose > 0 {
            println!(" -> with Y_He = {:.4}", y_he);
        }

        validate_parameters(precision, background, config, y_he)?;

        let f_he = y_he / (cst::NOT4 * (1.0 - y_he));
        let layout = ColumnLayout::new(config.compute_damping_scale, config.compute_cb2_derivatives);
        let grid = Grid::build(precision, background)?;
        let tau_ini = grid.tau_ini;
        let mut table = ThermoTable::new(layout, grid.z, grid.tau);

        let solved = solve::solve(precision, background, config, y_he, &mut table)?;
        let derived = derived::compute_derived(precision, background, &mut table)?;
        let linear_interp_below = solved.linear_interp_below;

        let h0_si = background.h0() * cst::C / cst::MPC_OVER_M;
        let n_e = 3.0 * h0_si * h0_si * background.omega0_b()
            / (8.0 * std::f64::consts::PI * cst::G * cst::M_H)
            * (1.0 - y_he);

        let thermo = Self {
            table,
            y_he,
            f_he,
            n_e,
            t_cmb: background.t_cmb(),
            tau_ini,
            z_rec: derived.z_rec,
            tau_rec: derived.tau_rec,
            rs_rec: derived.rs_rec,
            ds_rec: derived.ds_rec,
            da_rec: derived.da_rec,
            ra_rec: derived.ra_rec,
            angular_rescaling: derived.angular_rescaling,
            rd_rec: derived.rd_rec,
            z_d: derived.z_d,
            tau_d: derived.tau_d,
            rs_d: derived.rs_d,
            ds_d: derived.ds_d,
            tau_free_streaming: derived.tau_free_streaming,
            tau_cut: derived.tau_cut,
            z_reio: solved.z_reio,
            tau_reio: solved.tau_reio,
            linear_interp_below,
        };

        if config.verbose > 0 {
            thermo.print_summary(config);
        }
        Ok(thermo)
    }

    /// Verbose summary of the main results.
    fn print_summary(&self, config: &ThermoConfig) {
        println!(" -> recombination at z = {:.6}", self.z_rec);
        println!("    corresponding to conformal time = {:.6} Mpc", self.tau_rec);
        println!("    with comoving sound horizon = {:.6} Mpc", self.rs_rec);
        println!("    angular diameter distance = {:.6} Mpc", self.da_rec);
        println!(
            "    and sound horizon angle 100*theta_s = {:.6}",
            100.0 * self.rs_rec / self.ra_rec
        );
        if let Some(rd) = self.rd_rec {
            println!("    and with comoving photon damping scale = {:.6} Mpc", rd);
            println!(
                "    or comoving damping wavenumber k_d = {:.6} 1/Mpc",
                2.0 * std::f64::consts::PI / rd
            );
        }
        println!(" -> baryon drag stops at z = {:.6}", self.z_d);
        println!("    corresponding to conformal time = {:.6} Mpc", self.tau_d);
        println!("    with comoving sound horizon rs = {:.6} Mpc", self.rs_d);

        match &config.reionization {
            ReionizationConfig::None => {}
            ReionizationConfig::Camb { .. } | ReionizationConfig::HalfTanh { .. } => {
                if let Some(z_reio) = self.z_reio {
                    println!(" -> reionization at z = {:.6}", z_reio);
                }
                println!("    with optical depth = {:.6}", self.tau_reio);
            }
            ReionizationConfig::BinsTanh { .. } => {
                println!(
                    " -> binned reionization gives optical depth = {:.6}",
                    self.tau_reio
                );
            }
            ReionizationConfig::ManyTanh { .. } => {
                println!(
                    " -> many-step reionization gives optical depth = {:.6}",
                    self.tau_reio
                );
            }
            ReionizationConfig::Inter { .. } => {
                println!(
                    " -> interpolated reionization history gives optical depth = {:.6}",
                    self.tau_reio
                );
            }
        }
        if config.verbose > 1 {
            println!(
                " -> free-streaming approximation can be turned on as soon as tau = {:.6} Mpc",
                self.tau_free_streaming
            );
        }
    }
}

/// Check every input against its physical or supported range before any
/// integration starts.
fn validate_parameters<B: Background + ?Sized>(
    precision: &Precision,
    background: &B,
    config: &ThermoConfig,
    y_he: f64,
) -> Result<(), ThermoError> {
    if !(cst::YHE_SMALL..=cst::YHE_BIG).contains(&y_he) {
        return Err(ThermoError::domain(format!(
            "Y_He = {} out of bounds ({} < Y_He < {})",
            y_he,
            cst::YHE_SMALL,
            cst::YHE_BIG
        )));
    }
    if y_he == 1.0 {
        return Err(ThermoError::guard("Y_He = 1 would divide by zero"));
    }

    let injection = &config.injection;
    if injection.annihilation < 0.0 {
        return Err(ThermoError::domain(
            "annihilation parameter cannot be negative",
        ));
    }
    if injection.annihilation > 1.0e-4 {
        return Err(ThermoError::domain(format!(
            "annihilation parameter suspiciously large ({:e}, typical bounds are \
             in the range 1e-7 to 1e-6)",
            injection.annihilation
        )));
    }
    if injection.annihilation_variation > 0.0 {
        return Err(ThermoError::domain(
            "annihilation variation parameter must be negative (decreasing rate)",
        ));
    }
    for (name, value) in [
        ("annihilation_z", injection.annihilation_z),
        ("annihilation_zmin", injection.annihilation_zmin),
        ("annihilation_zmax", injection.annihilation_zmax),
        ("annihilation_f_halo", injection.annihilation_f_halo),
        ("annihilation_z_halo", injection.annihilation_z_halo),
    ] {
        if value < 0.0 {
            return Err(ThermoError::domain(format!(
                "{} cannot be negative",
                name
            )));
        }
    }
    if injection.decay < 0.0 {
        return Err(ThermoError::domain("decay parameter cannot be negative"));
    }
    if (injection.annihilation > 0.0 || injection.decay > 0.0)
        && background.omega0_cdm() == 0.0
    {
        return Err(ThermoError::domain(
            "CDM energy injection requires the presence of CDM",
        ));
    }

    if config.verbose > 0
        && injection.annihilation > 0.0
        && matches!(config.reionization, ReionizationConfig::None)
        && precision.he_switch >= 3
        && matches!(config.engine, Engine::Recfast)
    {
        println!(
            "Warning: with DM annihilation and a helium treatment >= 3, the triplet \
             correction becomes undefined at late times; this is masked by \
             reionization, which is disabled here."
        );
    }

    // grid sanity
    if precision.z_initial <= precision.z_helium_one + precision.delta_z_helium_one {
        return Err(ThermoError::domain(format!(
            "z_initial = {} must lie above the first helium recombination \
             threshold ({})",
            precision.z_initial,
            precision.z_helium_one + precision.delta_z_helium_one
        )));
    }
    if precision.z_linear <= precision.reionization_z_start_max
        || precision.z_initial <= precision.z_linear
    {
        return Err(ThermoError::domain(
            "grid boundaries must satisfy z_start_max < z_linear < z_initial",
        ));
    }
    if precision.nz_log < 2 || precision.nz_lin < 2 {
        return Err(ThermoError::domain(
            "grid segments need at least two points each",
        ));
    }
    if precision.reionization_sampling <= 0.0 {
        return Err(ThermoError::guard(
            "reionization sampling step must be larger than zero",
        ));
    }
    if precision.he_switch > 6 {
        return Err(ThermoError::domain(format!(
            "unknown helium treatment rung {} (expected 0-6)",
            precision.he_switch
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background::LcdmBackground;
    use crate::config::InjectionConfig;

    fn background() -> LcdmBackground {
        LcdmBackground::new(0.0224, 0.120, 0.67, 2.7255, 3.046)
    }

    #[test]
    fn test_validate_rejects_bad_helium() {
        let precision = Precision::default();
        let config = ThermoConfig::default();
        let result = validate_parameters(&precision, &background(), &config, 0.7);
        assert!(matches!(result, Err(ThermoError::Domain(_))));
        let result = validate_parameters(&precision, &background(), &config, 0.001);
        assert!(matches!(result, Err(ThermoError::Domain(_))));
    }

    #[test]
    fn test_validate_rejects_large_annihilation() {
        let precision = Precision::default();
        let config = ThermoConfig {
            injection: InjectionConfig {
                annihilation: 1.0e-3,
                ..Default::default()
            },
            ..Default::default()
        };
        let result = validate_parameters(&precision, &background(), &config, 0.2454);
        assert!(matches!(result, Err(ThermoError::Domain(_))));
    }

    #[test]
    fn test_validate_rejects_low_z_initial() {
        let precision = Precision {
            z_initial: 5000.0,
            ..Default::default()
        };
        let config = ThermoConfig::default();
        let result = validate_parameters(&precision, &background(), &config, 0.2454);
        assert!(matches!(result, Err(ThermoError::Domain(_))));
    }

    #[test]
    fn test_validate_accepts_defaults() {
        let precision = Precision::default();
        let config = ThermoConfig::default();
        assert!(validate_parameters(&precision, &background(), &config, 0.2454).is_ok());
    }
}
