//! Configuration for the thermodynamics computation.
//!
//! [`ThermoConfig`] selects the physics (helium fraction, recombination
//! engine, reionization scheme, exotic energy injection, optional output
//! columns); [`Precision`] collects every numerical tunable with defaults
//! matching the reference history. Both are plain structs with
//! builder-style `with_*` helpers.

use std::path::PathBuf;
use std::sync::Arc;

use crate::recfast::IonizationKernel;

// =============================================================================
// Helium
// =============================================================================

/// How the primordial helium fraction is obtained.
#[derive(Clone, Debug)]
pub enum HeliumSetting {
    /// Use this Y_He directly.
    Fixed(f64),
    /// Interpolate Y_He from a BBN table file given the baryon density and
    /// the effective neutrino number of the background.
    Bbn(PathBuf),
}

// =============================================================================
// Recombination engine
// =============================================================================

/// Which recombination engine integrates the ionization fractions.
#[derive(Clone)]
pub enum Engine {
    /// Built-in Peebles-style three-variable network.
    Recfast,
    /// External single-call kernel subsuming hydrogen and helium.
    External(Arc<dyn IonizationKernel + Send + Sync>),
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Engine::Recfast => write!(f, "Engine::Recfast"),
            Engine::External(_) => write!(f, "Engine::External(..)"),
        }
    }
}

// =============================================================================
// Reionization
// =============================================================================

/// Whether reionization is specified by its redshift or by the integrated
/// optical depth (the latter triggers the bisection search).
#[derive(Clone, Copy, Debug)]
pub enum ReioInput {
    Redshift(f64),
    OpticalDepth(f64),
}

/// Parametric reionization scheme plus its parameters.
#[derive(Clone, Debug)]
pub enum ReionizationConfig {
    /// No reionization.
    None,
    /// Tanh in (1+z)^exponent for hydrogen plus a separate helium tanh.
    Camb {
        input: ReioInput,
        exponent: f64,
        width: f64,
        helium_redshift: f64,
        helium_width: f64,
    },
    /// Half-amplitude variant without the helium contribution.
    HalfTanh {
        input: ReioInput,
        exponent: f64,
        width: f64,
    },
    /// Tanh interpolation between bin centers `(z_i, xe_i)`.
    BinsTanh {
        z: Vec<f64>,
        xe: Vec<f64>,
        sharpness: f64,
    },
    /// Superposition of independent tanh jumps with a common width.
    /// xe sentinels: -1 = after H + first He reionization, -2 = after
    /// H + both He reionizations.
    ManyTanh {
        z: Vec<f64>,
        xe: Vec<f64>,
        width: f64,
    },
    /// Piecewise-linear through `(z_i, xe_i)`; first z must be 0, last xe
    /// must be the sentinel 0 ("whatever recombination left behind").
    Inter { z: Vec<f64>, xe: Vec<f64> },
}

impl ReionizationConfig {
    /// CAMB-style reionization at a given redshift with default shape
    /// parameters.
    pub fn camb_with_z(z_reio: f64) -> Self {
        ReionizationConfig::Camb {
            input: ReioInput::Redshift(z_reio),
            exponent: 1.5,
            width: 0.5,
            helium_redshift: 3.5,
            helium_width: 0.5,
        }
    }

    /// CAMB-style reionization matching a target optical depth.
    pub fn camb_with_tau(tau_reio: f64) -> Self {
        ReionizationConfig::Camb {
            input: ReioInput::OpticalDepth(tau_reio),
            exponent: 1.5,
            width: 0.5,
            helium_redshift: 3.5,
            helium_width: 0.5,
        }
    }

    /// True when the scheme requests the optical-depth bisection.
    pub fn targets_optical_depth(&self) -> bool {
        matches!(
            self,
            ReionizationConfig::Camb {
                input: ReioInput::OpticalDepth(_),
                ..
            } | ReionizationConfig::HalfTanh {
                input: ReioInput::OpticalDepth(_),
                ..
            }
        )
    }
}

// =============================================================================
// Energy injection
// =============================================================================

/// Exotic energy-injection channels (dark-matter annihilation and decay).
#[derive(Clone, Debug)]
pub struct InjectionConfig {
    /// Annihilation efficiency [m^3/s/kg]; 0 disables the channel.
    pub annihilation: f64,
    /// Log-quadratic redshift variation of the annihilation parameter
    /// (must be <= 0: the rate can only decrease away from its peak).
    pub annihilation_variation: f64,
    /// Redshift at which the annihilation parameter is quoted.
    pub annihilation_z: f64,
    /// Below this z the annihilation parameter is frozen.
    pub annihilation_zmin: f64,
    /// Above this z the annihilation parameter is frozen.
    pub annihilation_zmax: f64,
    /// Halo-boost amplitude.
    pub annihilation_f_halo: f64,
    /// Characteristic halo-formation redshift.
    pub annihilation_z_halo: f64,
    /// Decay rate [1/s]; 0 disables the channel.
    pub decay: f64,
    /// Deposit energy where it is injected. When false, the deposited
    /// rate convolves the on-the-spot rate over injection redshifts.
    pub has_on_the_spot: bool,
}

impl Default for InjectionConfig {
    fn default() -> Self {
        Self {
            annihilation: 0.0,
            annihilation_variation: 0.0,
            annihilation_z: 1000.0,
            annihilation_zmin: 30.0,
            annihilation_zmax: 2500.0,
            annihilation_f_halo: 0.0,
            annihilation_z_halo: 30.0,
            decay: 0.0,
            has_on_the_spot: true,
        }
    }
}

impl InjectionConfig {
    /// True when at least one channel is active.
    pub fn is_active(&self) -> bool {
        self.annihilation > 0.0 || self.decay > 0.0
    }
}

// =============================================================================
// Main configuration
// =============================================================================

/// Physics selection for one thermodynamics computation.
#[derive(Clone, Debug)]
pub struct ThermoConfig {
    /// Primordial helium fraction, fixed or from BBN.
    pub helium: HeliumSetting,
    /// Recombination engine.
    pub engine: Engine,
    /// Reionization scheme.
    pub reionization: ReionizationConfig,
    /// Exotic energy injection.
    pub injection: InjectionConfig,
    /// Compute the photon damping scale column.
    pub compute_damping_scale: bool,
    /// Compute conformal-time derivatives of the baryon sound speed.
    pub compute_cb2_derivatives: bool,
    /// Verbosity: 0 silent, 1 summary, 2 chatty.
    pub verbose: u32,
}

impl Default for ThermoConfig {
    fn default() -> Self {
        Self {
            helium: HeliumSetting::Fixed(0.2454),
            engine: Engine::Recfast,
            reionization: ReionizationConfig::None,
            injection: InjectionConfig::default(),
            compute_damping_scale: false,
            compute_cb2_derivatives: false,
            verbose: 0,
        }
    }
}

impl ThermoConfig {
    /// Set the helium fraction.
    pub fn with_helium(mut self, helium: HeliumSetting) -> Self {
        self.helium = helium;
        self
    }

    /// Set the reionization scheme.
    pub fn with_reionization(mut self, reionization: ReionizationConfig) -> Self {
        self.reionization = reionization;
        self
    }

    /// Set the recombination engine.
    pub fn with_engine(mut self, engine: Engine) -> Self {
        self.engine = engine;
        self
    }

    /// Enable the damping-scale column.
    pub fn with_damping_scale(mut self) -> Self {
        self.compute_damping_scale = true;
        self
    }

    /// Enable the sound-speed derivative columns.
    pub fn with_cb2_derivatives(mut self) -> Self {
        self.compute_cb2_derivatives = true;
        self
    }

    /// Set the verbosity level.
    pub fn with_verbose(mut self, verbose: u32) -> Self {
        self.verbose = verbose;
        self
    }
}

// =============================================================================
// Precision
// =============================================================================

/// Every numerical tunable of the computation, with documented defaults.
#[derive(Clone, Debug)]
pub struct Precision {
    /// Highest redshift of the table; must lie above the first helium
    /// recombination threshold.
    pub z_initial: f64,
    /// Redshift where the sampling switches from logarithmic to linear.
    pub z_linear: f64,
    /// Points of the logarithmic segment `[z_linear, z_initial]`.
    pub nz_log: usize,
    /// Points of the linear recombination segment.
    pub nz_lin: usize,
    /// Redshift step of the reionization segment `[0, z_start_max]`.
    pub reionization_sampling: f64,
    /// Highest redshift at which reionization may start.
    pub reionization_z_start_max: f64,

    /// Relative tolerance of the stiff integration.
    pub tol_thermo_integration: f64,

    /// Tolerance of the optical-depth bisection, relative to the target.
    pub reionization_optical_depth_tol: f64,
    /// Reionization starts `start_factor * width` above the tanh center.
    pub reionization_start_factor: f64,
    /// Iteration cap of the optical-depth bisection.
    pub reionization_max_iterations: usize,

    /// First helium recombination (He III -> II) threshold and width.
    pub z_helium_one: f64,
    pub delta_z_helium_one: f64,
    /// Second helium recombination (He II -> I) threshold and width.
    pub z_helium_two: f64,
    pub delta_z_helium_two: f64,
    /// Helium Saha validity threshold and width.
    pub z_helium_saha_end: f64,
    pub delta_z_helium_saha_end: f64,
    /// End of the Saha-equilibrium helium phase. Default carried over
    /// from the reference history; treat as a tunable.
    pub z_helium_two_end: f64,
    /// Start of out-of-equilibrium hydrogen recombination. Default
    /// carried over from the reference history; treat as a tunable.
    pub z_hydrogen_start: f64,
    /// Smoothing width of the hydrogen-phase transition.
    pub delta_z_hydrogen: f64,
    /// Smoothing width of the full-recombination transition.
    pub delta_z_full_recombination: f64,
    /// Smoothing width of the reionization transition.
    pub delta_z_reionization: f64,

    /// Thomson/Hubble timescale ratio switching the matter-temperature
    /// equation between its steady-state expansion and the full form.
    pub tight_coupling_trigger: f64,
    /// Hydrogen Peebles-coefficient trigger: C = 1 above this x_H.
    pub x_hydrogen_trigger: f64,
    /// Helium trigger for the reduced K_He treatment.
    pub x_helium_trigger: f64,

    /// Hydrogen fudge factor and its correction applied under `h_switch`.
    pub fudge_h: f64,
    pub delta_fudge_h: f64,
    /// Apply the double-Gaussian correction to the hydrogen K constant.
    pub h_switch: bool,
    /// Helium treatment ladder (0-6).
    pub he_switch: u8,
    /// Helium fudge factor.
    pub fudge_he: f64,
    /// Double-Gaussian correction in log(1+z): amplitudes, centers, widths.
    pub a_gauss_1: f64,
    pub a_gauss_2: f64,
    pub z_gauss_1: f64,
    pub z_gauss_2: f64,
    pub w_gauss_1: f64,
    pub w_gauss_2: f64,

    /// Boxcar radius for the variation-rate smoothing.
    pub rate_smoothing_radius: usize,
    /// Free-streaming trigger on (1/kappa')/tau.
    pub free_streaming_trigger: f64,
    /// Visibility fraction below which sources are cut.
    pub visibility_cut: f64,
}

impl Default for Precision {
    fn default() -> Self {
        Self {
            z_initial: 5.0e6,
            z_linear: 1.0e4,
            nz_log: 5000,
            nz_lin: 20000,
            reionization_sampling: 1.5e-2,
            reionization_z_start_max: 50.0,

            tol_thermo_integration: 1.0e-2,

            reionization_optical_depth_tol: 1.0e-4,
            reionization_start_factor: 8.0,
            reionization_max_iterations: 50,

            z_helium_one: 8000.0,
            delta_z_helium_one: 50.0,
            z_helium_two: 5000.0,
            delta_z_helium_two: 100.0,
            z_helium_saha_end: 3500.0,
            delta_z_helium_saha_end: 50.0,
            z_helium_two_end: 2870.0,
            z_hydrogen_start: 1600.0,
            delta_z_hydrogen: 50.0,
            delta_z_full_recombination: 50.0,
            delta_z_reionization: 2.0,

            tight_coupling_trigger: 1.0e-3,
            x_hydrogen_trigger: 0.995,
            x_helium_trigger: 0.995,

            fudge_h: 1.14,
            delta_fudge_h: -0.015,
            h_switch: true,
            he_switch: 6,
            fudge_he: 0.86,
            a_gauss_1: -0.14,
            a_gauss_2: 0.079,
            z_gauss_1: 7.28,
            z_gauss_2: 6.73,
            w_gauss_1: 0.18,
            w_gauss_2: 0.33,

            rate_smoothing_radius: 50,
            free_streaming_trigger: 5.0,
            visibility_cut: 1.0e-3,
        }
    }
}

impl Precision {
    /// Coarser sampling for quick runs and tests; identical physics.
    pub fn reduced() -> Self {
        Self {
            nz_log: 1200,
            nz_lin: 5000,
            reionization_sampling: 5.0e-2,
            ..Default::default()
        }
    }

    /// Number of reionization-segment samples.
    pub fn nz_reio(&self) -> usize {
        (self.reionization_z_start_max / self.reionization_sampling) as usize
    }

    /// Total table size.
    pub fn nz_total(&self) -> usize {
        self.nz_log + self.nz_lin + self.nz_reio()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_grid_sizes() {
        let precision = Precision::default();
        assert_eq!(precision.nz_reio(), 3333);
        assert_eq!(precision.nz_total(), 5000 + 20000 + 3333);
    }

    #[test]
    fn test_builder_chain() {
        let config = ThermoConfig::default()
            .with_reionization(ReionizationConfig::camb_with_z(7.67))
            .with_damping_scale()
            .with_verbose(1);
        assert!(config.compute_damping_scale);
        assert_eq!(config.verbose, 1);
        assert!(!config.reionization.targets_optical_depth());
    }

    #[test]
    fn test_tau_target_detection() {
        assert!(ReionizationConfig::camb_with_tau(0.0544).targets_optical_depth());
        assert!(!ReionizationConfig::None.targets_optical_depth());
    }
}
