//! Background-cosmology collaborator.
//!
//! The thermodynamics engine never computes expansion history itself: it
//! queries a [`Background`] provider for the conformal time of a redshift
//! and for background quantities at a conformal time. [`LcdmBackground`]
//! is a self-contained flat-ΛCDM implementation of that contract used by
//! the tests, benchmarks and demos.
//!
//! # Units
//!
//! Following the downstream convention, `H` is returned in 1/Mpc (i.e.
//! H/c), conformal times are in Mpc, and densities are in Mpc⁻² (the
//! factor 8πG/3c² is absorbed, so `rho_crit = H²`). Only density ratios
//! and `H` enter the thermodynamic equations, which convert to SI where
//! needed.

use crate::constants;
use crate::error::ThermoError;
use crate::numerics::{
    interval_index, spline_eval, spline_second_derivatives, SplineBoundary,
};

/// How many fields of [`BgPoint`] the caller needs.
///
/// `Short` fills the expansion quantities only; `Normal` adds densities;
/// `Long` additionally fills the integrated quantities (sound horizon,
/// distances, proper time).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetailLevel {
    Short,
    Normal,
    Long,
}

/// Background quantities at one conformal time.
///
/// Fields beyond the requested [`DetailLevel`] are zero.
#[derive(Clone, Copy, Debug, Default)]
pub struct BgPoint {
    /// Redshift.
    pub z: f64,
    /// Scale factor (a0 = 1).
    pub a: f64,
    /// Hubble rate in 1/Mpc.
    pub h: f64,
    /// Conformal-time derivative of H, in 1/Mpc^2.
    pub h_prime: f64,
    /// Photon energy density [Mpc^-2].
    pub rho_g: f64,
    /// Baryon energy density [Mpc^-2].
    pub rho_b: f64,
    /// Cold-dark-matter energy density [Mpc^-2].
    pub rho_cdm: f64,
    /// Critical density at this epoch [Mpc^-2].
    pub rho_crit: f64,
    /// Radiation density fraction (photons + massless neutrinos).
    pub omega_r: f64,
    /// Comoving sound horizon [Mpc].
    pub rs: f64,
    /// Angular diameter distance [Mpc].
    pub ang_distance: f64,
    /// Conformal age of the universe [Mpc].
    pub conformal_age: f64,
    /// Proper time [Mpc/c].
    pub time: f64,
}

/// Pure-query interface to the expansion history.
pub trait Background {
    /// Conformal time at redshift `z` [Mpc].
    fn tau_of_z(&self, z: f64) -> Result<f64, ThermoError>;

    /// Background quantities at conformal time `tau`.
    fn at_tau(&self, tau: f64, detail: DetailLevel) -> Result<BgPoint, ThermoError>;

    /// Today's Hubble rate in 1/Mpc.
    fn h0(&self) -> f64;

    /// CMB temperature today [K].
    fn t_cmb(&self) -> f64;

    /// Baryon density fraction today.
    fn omega0_b(&self) -> f64;

    /// Cold-dark-matter density fraction today.
    fn omega0_cdm(&self) -> f64;

    /// Conformal age [Mpc].
    fn conformal_age(&self) -> f64;
}

// =============================================================================
// Flat-LCDM reference provider
// =============================================================================

/// Highest redshift of the precomputed background table.
const Z_TABLE_MAX: f64 = 1.0e9;
/// Points per decade of (1+z) in the precomputed table.
const POINTS_PER_DECADE: usize = 300;

/// Flat ΛCDM background: photons, massless neutrinos, baryons, CDM and a
/// cosmological constant.
///
/// Conformal time, sound horizon and proper time are integrated once on a
/// logarithmic grid in (1+z) with analytic radiation-dominated tails above
/// the grid, then served by spline interpolation in both directions.
#[derive(Clone, Debug)]
pub struct LcdmBackground {
    h0: f64,
    t_cmb: f64,
    omega_b: f64,
    omega_cdm: f64,
    omega_g: f64,
    omega_ur: f64,
    omega_lambda: f64,
    /// Grid in z, increasing.
    z_grid: Vec<f64>,
    /// tau(z) on the grid [Mpc], decreasing with index.
    tau_grid: Vec<f64>,
    tau_dd: Vec<f64>,
    /// z(tau) spline coefficients over the (decreasing) tau grid.
    z_dd: Vec<f64>,
    /// Sound horizon r_s(z) [Mpc].
    rs_grid: Vec<f64>,
    rs_dd: Vec<f64>,
    /// Proper time t(z) [Mpc/c].
    time_grid: Vec<f64>,
    time_dd: Vec<f64>,
    conformal_age: f64,
}

impl LcdmBackground {
    /// Build a flat ΛCDM background.
    ///
    /// `omega_b_h2`/`omega_cdm_h2` are the physical densities Ω·h²,
    /// `n_eff` the effective number of massless neutrino species.
    pub fn new(omega_b_h2: f64, omega_cdm_h2: f64, h: f64, t_cmb: f64, n_eff: f64) -> Self {
        let h0 = h * 1.0e5 / constants::C; // 1/Mpc
        let omega_b = omega_b_h2 / (h * h);
        let omega_cdm = omega_cdm_h2 / (h * h);

        // photon density fraction from T_cmb
        let h0_si = h * 1.0e5 / constants::MPC_OVER_M; // 1/s
        let rho_crit_si = 3.0 * h0_si * h0_si * constants::C * constants::C
            / (8.0 * std::f64::consts::PI * constants::G); // J/m^3
        let rho_g_si = constants::RHO_GAMMA_FACTOR * t_cmb.powi(4);
        let omega_g = rho_g_si / rho_crit_si;
        let omega_ur = n_eff * 7.0 / 8.0 * (4.0_f64 / 11.0).powf(4.0 / 3.0) * omega_g;
        let omega_lambda = 1.0 - omega_g - omega_ur - omega_b - omega_cdm;

        let mut bg = Self {
            h0,
            t_cmb,
            omega_b,
            omega_cdm,
            omega_g,
            omega_ur,
            omega_lambda,
            z_grid: Vec::new(),
            tau_grid: Vec::new(),
            tau_dd: Vec::new(),
            z_dd: Vec::new(),
            rs_grid: Vec::new(),
            rs_dd: Vec::new(),
            time_grid: Vec::new(),
            time_dd: Vec::new(),
            conformal_age: 0.0,
        };
        bg.tabulate();
        bg
    }

    /// Hubble rate at redshift z, in 1/Mpc.
    pub fn hubble(&self, z: f64) -> f64 {
        let zp1 = 1.0 + z;
        let omega_r = self.omega_g + self.omega_ur;
        self.h0
            * (omega_r * zp1.powi(4)
                + (self.omega_b + self.omega_cdm) * zp1.powi(3)
                + self.omega_lambda)
                .sqrt()
    }

    /// dH/dz at redshift z, in 1/Mpc.
    fn dhubble_dz(&self, z: f64) -> f64 {
        let zp1 = 1.0 + z;
        let omega_r = self.omega_g + self.omega_ur;
        let h = self.hubble(z);
        self.h0 * self.h0
            * (4.0 * omega_r * zp1.powi(3) + 3.0 * (self.omega_b + self.omega_cdm) * zp1.powi(2))
            / (2.0 * h)
    }

    /// Photon-baryon R factor (3 rho_b / 4 rho_g) at redshift z.
    fn baryon_photon_ratio(&self, z: f64) -> f64 {
        0.75 * self.omega_b / self.omega_g / (1.0 + z)
    }

    fn tabulate(&mut self) {
        let decades = (1.0 + Z_TABLE_MAX).log10();
        let n = (decades * POINTS_PER_DECADE as f64).ceil() as usize + 1;

        // log-uniform in (1+z), from z = 0 up to Z_TABLE_MAX
        let mut z_desc: Vec<f64> = (0..n)
            .map(|i| 10.0_f64.powf(decades * (n - 1 - i) as f64 / (n - 1) as f64) - 1.0)
            .collect();
        z_desc[0] = Z_TABLE_MAX;
        z_desc[n - 1] = 0.0;

        // analytic radiation-dominated tails above the table
        let omega_r = self.omega_g + self.omega_ur;
        let sqrt_or = omega_r.sqrt();
        let mut tau = 1.0 / (self.h0 * sqrt_or * (1.0 + Z_TABLE_MAX));
        let r_at = |z: f64| self.baryon_photon_ratio(z);
        let cs = |z: f64| 1.0 / (3.0 * (1.0 + r_at(z))).sqrt();
        let mut rs = tau * cs(Z_TABLE_MAX);
        // t = 1 / (2 H0 sqrt(Omega_r) (1+z)^2) deep in radiation domination
        let mut time = 0.5 / (self.h0 * sqrt_or * (1.0 + Z_TABLE_MAX).powi(2));

        let mut tau_desc = vec![tau];
        let mut rs_desc = vec![rs];
        let mut time_desc = vec![time];

        // trapezoidal quadrature in descending z: dtau = -dz/H
        for i in 1..n {
            let z_hi = z_desc[i - 1];
            let z_lo = z_desc[i];
            let dz = z_hi - z_lo;
            let inv_h_hi = 1.0 / self.hubble(z_hi);
            let inv_h_lo = 1.0 / self.hubble(z_lo);
            tau += 0.5 * dz * (inv_h_hi + inv_h_lo);
            rs += 0.5 * dz * (cs(z_hi) * inv_h_hi + cs(z_lo) * inv_h_lo);
            time += 0.5 * dz * (inv_h_hi / (1.0 + z_hi) + inv_h_lo / (1.0 + z_lo));
            tau_desc.push(tau);
            rs_desc.push(rs);
            time_desc.push(time);
        }

        // store increasing in z
        self.z_grid = z_desc.into_iter().rev().collect();
        self.tau_grid = tau_desc.into_iter().rev().collect();
        self.rs_grid = rs_desc.into_iter().rev().collect();
        self.time_grid = time_desc.into_iter().rev().collect();
        self.conformal_age = self.tau_grid[0];

        self.tau_dd = spline_second_derivatives(
            &self.z_grid,
            &self.tau_grid,
            SplineBoundary::EstimatedDerivatives,
        );
        self.z_dd = spline_second_derivatives(
            &self.tau_grid,
            &self.z_grid,
            SplineBoundary::EstimatedDerivatives,
        );
        self.rs_dd = spline_second_derivatives(
            &self.z_grid,
            &self.rs_grid,
            SplineBoundary::EstimatedDerivatives,
        );
        self.time_dd = spline_second_derivatives(
            &self.z_grid,
            &self.time_grid,
            SplineBoundary::EstimatedDerivatives,
        );
    }

    /// Redshift at conformal time tau.
    pub fn z_of_tau(&self, tau: f64) -> Result<f64, ThermoError> {
        if tau <= 0.0 || tau > self.conformal_age * (1.0 + 1.0e-12) {
            return Err(ThermoError::Background(format!(
                "conformal time {} outside (0, {}]",
                tau, self.conformal_age
            )));
        }
        let idx = interval_index(&self.tau_grid, tau);
        Ok(spline_eval(&self.tau_grid, &self.z_grid, &self.z_dd, idx, tau).max(0.0))
    }
}

impl Background for LcdmBackground {
    fn tau_of_z(&self, z: f64) -> Result<f64, ThermoError> {
        if z < 0.0 || z > Z_TABLE_MAX {
            return Err(ThermoError::Background(format!(
                "redshift {} outside tabulated background range [0, {:.1e}]",
                z, Z_TABLE_MAX
            )));
        }
        let idx = interval_index(&self.z_grid, z);
        Ok(spline_eval(&self.z_grid, &self.tau_grid, &self.tau_dd, idx, z))
    }

    fn at_tau(&self, tau: f64, detail: DetailLevel) -> Result<BgPoint, ThermoError> {
        let z = self.z_of_tau(tau)?;
        let zp1 = 1.0 + z;
        let h = self.hubble(z);

        let mut point = BgPoint {
            z,
            a: 1.0 / zp1,
            h,
            // H' = dH/dtau = -H dH/dz (dz/dtau = -H)
            h_prime: -h * self.dhubble_dz(z),
            ..Default::default()
        };

        if detail == DetailLevel::Short {
            return Ok(point);
        }

        let h0_sq = self.h0 * self.h0;
        point.rho_g = h0_sq * self.omega_g * zp1.powi(4);
        point.rho_b = h0_sq * self.omega_b * zp1.powi(3);
        point.rho_cdm = h0_sq * self.omega_cdm * zp1.powi(3);
        point.rho_crit = h * h;
        point.omega_r = h0_sq * (self.omega_g + self.omega_ur) * zp1.powi(4) / point.rho_crit;

        if detail == DetailLevel::Normal {
            return Ok(point);
        }

        let idx = interval_index(&self.z_grid, z);
        point.rs = spline_eval(&self.z_grid, &self.rs_grid, &self.rs_dd, idx, z);
        point.time = spline_eval(&self.z_grid, &self.time_grid, &self.time_dd, idx, z);
        point.conformal_age = self.conformal_age;
        // flat universe: comoving distance is the conformal lookback time
        point.ang_distance = (self.conformal_age - tau) / zp1;

        Ok(point)
    }

    fn h0(&self) -> f64 {
        self.h0
    }

    fn t_cmb(&self) -> f64 {
        self.t_cmb
    }

    fn omega0_b(&self) -> f64 {
        self.omega_b
    }

    fn omega0_cdm(&self) -> f64 {
        self.omega_cdm
    }

    fn conformal_age(&self) -> f64 {
        self.conformal_age
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planck_like() -> LcdmBackground {
        LcdmBackground::new(0.0224, 0.120, 0.67, 2.7255, 3.046)
    }

    #[test]
    fn test_omega_budget_closes() {
        let bg = planck_like();
        let total = bg.omega_g + bg.omega_ur + bg.omega_b + bg.omega_cdm + bg.omega_lambda;
        assert!((total - 1.0).abs() < 1e-12);
        // Omega_gamma h^2 is about 2.47e-5 at 2.7255 K
        let og_h2 = bg.omega_g * 0.67 * 0.67;
        assert!((og_h2 - 2.47e-5).abs() < 2.0e-7, "Omega_g h^2 = {}", og_h2);
    }

    #[test]
    fn test_conformal_age_is_reasonable() {
        // ~14 Gpc for Planck-like parameters
        let bg = planck_like();
        assert!(
            bg.conformal_age() > 13.0e3 && bg.conformal_age() < 15.5e3,
            "conformal age = {} Mpc",
            bg.conformal_age()
        );
    }

    #[test]
    fn test_tau_roundtrip() {
        let bg = planck_like();
        for &z in &[0.5, 10.0, 1100.0, 5.0e4, 1.0e6] {
            let tau = bg.tau_of_z(z).unwrap();
            let z_back = bg.z_of_tau(tau).unwrap();
            assert!(
                (z_back - z).abs() / z < 1e-6,
                "z = {} round-tripped to {}",
                z,
                z_back
            );
        }
    }

    #[test]
    fn test_hubble_limits() {
        let bg = planck_like();
        // today: H ~ h * 100 km/s/Mpc in 1/Mpc units
        let h0_expected = 0.67 * 1.0e5 / constants::C;
        assert!((bg.hubble(0.0) - h0_expected).abs() / h0_expected < 1e-12);
        // deep matter domination: H grows like (1+z)^1.5
        let ratio = bg.hubble(800.0) / bg.hubble(200.0);
        let expected = (801.0_f64 / 201.0).powf(1.5);
        assert!((ratio - expected).abs() / expected < 0.05);
    }

    #[test]
    fn test_at_tau_detail_levels() {
        let bg = planck_like();
        let tau = bg.tau_of_z(1100.0).unwrap();
        let short = bg.at_tau(tau, DetailLevel::Short).unwrap();
        assert!(short.rho_g == 0.0 && short.rs == 0.0);
        let normal = bg.at_tau(tau, DetailLevel::Normal).unwrap();
        assert!(normal.rho_g > 0.0 && normal.rs == 0.0);
        let long = bg.at_tau(tau, DetailLevel::Long).unwrap();
        assert!(long.rs > 100.0 && long.rs < 200.0, "rs = {}", long.rs);
        assert!(long.ang_distance > 0.0);
        // H' < 0 is decelerating expansion in conformal time at high z
        assert!(long.h_prime < 0.0);
    }

    #[test]
    fn test_sound_horizon_at_recombination() {
        // r_s(z~1090) should be ~145 Mpc for Planck-like parameters
        let bg = planck_like();
        let tau = bg.tau_of_z(1090.0).unwrap();
        let point = bg.at_tau(tau, DetailLevel::Long).unwrap();
        assert!(
            point.rs > 135.0 && point.rs < 155.0,
            "r_s(1090) = {} Mpc",
            point.rs
        );
    }

    #[test]
    fn test_radiation_fraction_grows_with_z() {
        let bg = planck_like();
        let low = bg
            .at_tau(bg.tau_of_z(10.0).unwrap(), DetailLevel::Normal)
            .unwrap();
        let high = bg
            .at_tau(bg.tau_of_z(1.0e5).unwrap(), DetailLevel::Normal)
            .unwrap();
        assert!(high.omega_r > 0.9);
        assert!(low.omega_r < 1.0e-2);
    }
}
