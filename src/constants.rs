//! Physical and atomic constants.
//!
//! SI values follow CODATA; the H/He line data are the standard
//! recombination-network values (wavenumbers in 1/m, Einstein
//! coefficients in 1/s, case-B fit parameters dimensionless).

use std::f64::consts::PI;

// =============================================================================
// SI constants
// =============================================================================

/// Speed of light [m/s].
pub const C: f64 = 2.99792458e8;

/// Gravitational constant [m^3/kg/s^2].
pub const G: f64 = 6.67428e-11;

/// Planck constant [J s].
pub const H_P: f64 = 6.62606896e-34;

/// Boltzmann constant [J/K].
pub const K_B: f64 = 1.3806504e-23;

/// Electron mass [kg].
pub const M_E: f64 = 9.10938215e-31;

/// Hydrogen-atom mass [kg].
pub const M_H: f64 = 1.673575e-27;

/// He/H mass ratio (slightly below 4 because of binding energies).
pub const NOT4: f64 = 3.9715;

/// Thomson cross-section [m^2].
pub const SIGMA_T: f64 = 6.6524616e-29;

/// Stefan-Boltzmann constant [W/m^2/K^4].
pub const SIGMA_B: f64 = 5.670400e-8;

/// One megaparsec in meters.
pub const MPC_OVER_M: f64 = 3.085677581282e22;

// =============================================================================
// Hydrogen and helium line data (wavenumbers in 1/m)
// =============================================================================

/// H ionization threshold.
pub const L_H_ION: f64 = 1.096787737e7;
/// H Lyman-alpha.
pub const L_H_ALPHA: f64 = 8.225916453e6;
/// He I ionization threshold.
pub const L_HE1_ION: f64 = 1.98310772e7;
/// He II ionization threshold.
pub const L_HE2_ION: f64 = 4.389088863e7;
/// He I 2s (from ground).
pub const L_HE_2S: f64 = 1.66277434e7;
/// He I 2p (from ground).
pub const L_HE_2P: f64 = 1.71134891e7;
/// He I 2P triplet.
pub const L_HE_2PT: f64 = 1.690871466e7;
/// He I 2S triplet.
pub const L_HE_2ST: f64 = 1.5985597526e7;
/// He I 2S triplet ionization.
pub const L_HE_2ST_ION: f64 = 3.8454693845e6;

/// H two-photon decay rate [1/s].
pub const LAMBDA_H: f64 = 8.2245809;
/// He 2s->1s two-photon rate [1/s].
pub const LAMBDA_HE: f64 = 51.3;
/// He singlet 2p->1s Einstein A [1/s].
pub const A2P_S: f64 = 1.798287e9;
/// He triplet 2p->1s Einstein A [1/s].
pub const A2P_T: f64 = 177.58;
/// He singlet 2Ps absorption cross-section [m^2].
pub const SIGMA_HE_2PS: f64 = 1.436289e-22;
/// He triplet 2Pt absorption cross-section [m^2].
pub const SIGMA_HE_2PT: f64 = 1.484872e-22;

// =============================================================================
// Case-B recombination fit coefficients
// =============================================================================

/// Pequignot-Petitjean-Boisson hydrogen fit.
pub const A_PPB: f64 = 4.309;
pub const B_PPB: f64 = -0.6166;
pub const C_PPB: f64 = 0.6703;
pub const D_PPB: f64 = 0.5300;

/// Verner-Ferland helium fit amplitude: 10^(-16.744).
pub const A_VF: f64 = 1.8027795779792548e-17;
pub const B_VF: f64 = 0.711;
/// Verner-Ferland temperature scales: 10^0.477121 K and 10^5.114 K.
pub const T_0_VF: f64 = 2.9999993176542143;
pub const T_1_VF: f64 = 130020.41704499225;

/// Helium triplet fit amplitude: 10^(-16.306).
pub const A_TRIP: f64 = 4.943860712936893e-17;
pub const B_TRIP: f64 = 0.761;

// =============================================================================
// Validity windows
// =============================================================================

/// Lowest physically plausible primordial helium fraction.
pub const YHE_SMALL: f64 = 0.01;
/// Highest physically plausible primordial helium fraction.
pub const YHE_BIG: f64 = 0.5;

/// Window inside which the visibility maximum must fall.
pub const Z_REC_MIN: f64 = 500.0;
pub const Z_REC_MAX: f64 = 2000.0;

/// rho_gamma(T) = RHO_GAMMA_FACTOR * T^4 [J/m^3 per K^4].
pub const RHO_GAMMA_FACTOR: f64 =
    8.0 * PI * PI * PI * PI * PI * K_B * K_B * K_B * K_B / 15.0 / (H_P * H_P * H_P) / (C * C * C);

/// Compton coupling factor: (8/3) sigma_T/(m_e c) * rho_gamma(T)/T^4.
///
/// Multiplied by T_rad^4 this gives the photon-electron energy-exchange
/// rate entering the matter-temperature equation.
pub const COMPTON_COUPLING: f64 = (8.0 / 3.0) * (SIGMA_T / (M_E * C)) * RHO_GAMMA_FACTOR;
