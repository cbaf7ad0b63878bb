//! Recombination physics kernel.
//!
//! The built-in engine evolves out-of-equilibrium hydrogen and helium
//! recombination with fudged Peebles equations (case-B recombination
//! coefficients, a redshift-corrected two-photon escape constant for
//! hydrogen, and a selectable helium treatment ladder with Doppler
//! broadening, continuum opacity and triplet corrections). Saha
//! equilibrium solutions supply the ionization state before each species
//! falls out of equilibrium.
//!
//! An alternative engine can be plugged in through [`IonizationKernel`]:
//! one call per evaluation subsuming hydrogen and helium, typically
//! backed by a pre-tabulated history.

use crate::config::Precision;
use crate::constants as cst;
use crate::error::ThermoError;

/// External recombination engine: returns `(x_e, d x_e / d ln a)` at the
/// given redshift and thermal state.
///
/// Implementations must be pure queries; the evolver calls them at
/// non-monotone redshifts.
pub trait IonizationKernel {
    fn x_e(
        &self,
        z: f64,
        hz_si: f64,
        t_mat: f64,
        t_rad: f64,
        energy_rate: f64,
    ) -> Result<(f64, f64), ThermoError>;
}

/// Fraction of photons ionizing hydrogen, as a function of the free
/// electron fraction (saturating fit).
pub fn chi_ion_hydrogen(x: f64) -> f64 {
    if x < 1.0 {
        0.369202 * (1.0 - x.powf(0.463929)).powf(1.70237)
    } else {
        0.0
    }
}

/// Fraction of injected energy going into heat (saturating fit).
pub fn chi_heat(x: f64) -> f64 {
    if x < 1.0 {
        (0.996857 * (1.0 - (1.0 - x.powf(0.300134)).powf(1.51035))).min(1.0)
    } else {
        1.0
    }
}

/// Analytic (Saha) ionization state with redshift derivatives taken in
/// the +z direction.
#[derive(Clone, Copy, Debug)]
pub struct SahaResult {
    pub x_h: f64,
    pub dx_h: f64,
    pub x_he: f64,
    pub dx_he: f64,
    pub x: f64,
    pub dx: f64,
}

/// Built-in Peebles-style recombination engine.
#[derive(Clone, Debug)]
pub struct RecfastKernel {
    /// Helium-to-hydrogen number ratio.
    pub f_he: f64,
    /// Hydrogen number density today [1/m^3].
    pub n_h0: f64,

    // derived atomic constants
    cdb: f64,
    cdb_he: f64,
    cb1: f64,
    cb1_he1: f64,
    cb1_he2: f64,
    cr: f64,
    ck: f64,
    ck_he: f64,
    cl: f64,
    cl_he: f64,
    bfact: f64,

    // fudging
    fudge_h: f64,
    fudge_he: f64,
    h_switch: bool,
    he_switch: u8,
    a_gauss_1: f64,
    a_gauss_2: f64,
    z_gauss_1: f64,
    z_gauss_2: f64,
    w_gauss_1: f64,
    w_gauss_2: f64,

    // triggers and clamps
    x_h_trigger: f64,
    x_he_trigger: f64,
    x_h_limit_khe: f64,
    x_h_limit_triplet: f64,
    max_exp_boltz: f64,
}

impl RecfastKernel {
    /// Derive the engine constants for one cosmology.
    pub fn new(precision: &Precision, f_he: f64, n_h0: f64) -> Self {
        let l_alpha = 1.0 / cst::L_H_ALPHA;
        let l_alpha_he = 1.0 / cst::L_HE_2P;

        let mut fudge_h = precision.fudge_h;
        if precision.h_switch {
            fudge_h += precision.delta_fudge_h;
        }

        Self {
            f_he,
            n_h0,
            cdb: cst::H_P * cst::C * (cst::L_H_ION - cst::L_H_ALPHA) / cst::K_B,
            cdb_he: cst::H_P * cst::C * (cst::L_HE1_ION - cst::L_HE_2S) / cst::K_B,
            cb1: cst::H_P * cst::C * cst::L_H_ION / cst::K_B,
            cb1_he1: cst::H_P * cst::C * cst::L_HE1_ION / cst::K_B,
            cb1_he2: cst::H_P * cst::C * cst::L_HE2_ION / cst::K_B,
            cr: 2.0 * std::f64::consts::PI * (cst::M_E / cst::H_P) * (cst::K_B / cst::H_P),
            ck: l_alpha.powi(3) / (8.0 * std::f64::consts::PI),
            ck_he: l_alpha_he.powi(3) / (8.0 * std::f64::consts::PI),
            cl: cst::C * cst::H_P / (cst::K_B * l_alpha),
            cl_he: cst::C * cst::H_P * cst::L_HE_2S / cst::K_B,
            bfact: cst::H_P * cst::C * (cst::L_HE_2P - cst::L_HE_2S) / cst::K_B,
            fudge_h,
            fudge_he: precision.fudge_he,
            h_switch: precision.h_switch,
            he_switch: precision.he_switch,
            a_gauss_1: precision.a_gauss_1,
            a_gauss_2: precision.a_gauss_2,
            z_gauss_1: precision.z_gauss_1,
            z_gauss_2: precision.z_gauss_2,
            w_gauss_1: precision.w_gauss_1,
            w_gauss_2: precision.w_gauss_2,
            x_h_trigger: precision.x_hydrogen_trigger,
            x_he_trigger: precision.x_helium_trigger,
            x_h_limit_khe: 0.999_999_9,
            x_h_limit_triplet: 0.99999,
            max_exp_boltz: 680.0,
        }
    }

    // =========================================================================
    // Peebles equations
    // =========================================================================

    /// d x_H / dz (positive z direction) from the fudged Peebles equation.
    #[allow(clippy::too_many_arguments)]
    pub fn dx_h_dz(
        &self,
        x_h: f64,
        x: f64,
        n: f64,
        z: f64,
        hz: f64,
        t_mat: f64,
        t_rad: f64,
        energy_rate: f64,
    ) -> f64 {
        // case-B coefficients; photoionization evaluated at the radiation
        // temperature
        let r_down = 1.0e-19 * cst::A_PPB * (t_mat / 1.0e4).powf(cst::B_PPB)
            / (1.0 + cst::C_PPB * (t_mat / 1.0e4).powf(cst::D_PPB));
        let r_up = 1.0e-19 * cst::A_PPB * (t_rad / 1.0e4).powf(cst::B_PPB)
            / (1.0 + cst::C_PPB * (t_rad / 1.0e4).powf(cst::D_PPB))
            * (self.cr * t_rad).powf(1.5)
            * (-self.cdb / t_rad).exp();

        // two-photon escape constant with the log-redshift correction
        let mut k = self.ck / hz;
        if self.h_switch {
            let lz = (1.0 + z).ln();
            k *= 1.0
                + self.a_gauss_1 * (-((lz - self.z_gauss_1) / self.w_gauss_1).powi(2)).exp()
                + self.a_gauss_2 * (-((lz - self.z_gauss_2) / self.w_gauss_2).powi(2)).exp();
        }

        // Peebles coefficient collapses to one in the fully ionized limit
        let c_peebles = if x_h < self.x_h_trigger {
            (1.0 + k * cst::LAMBDA_H * n * (1.0 - x_h))
                / (1.0 / self.fudge_h
                    + k * cst::LAMBDA_H * n * (1.0 - x_h) / self.fudge_h
                    + k * r_up * n * (1.0 - x_h))
        } else {
            1.0
        };

        let mut dxh = (x * x_h * n * r_down - r_up * (1.0 - x_h) * (-self.cl / t_mat).exp())
            * c_peebles
            / (hz * (1.0 + z));

        dxh += -energy_rate * chi_ion_hydrogen(x) / n
            * (1.0 / cst::L_H_ION + (1.0 - c_peebles) / cst::L_H_ALPHA)
            / (cst::H_P * cst::C * hz * (1.0 + z));

        dxh
    }

    /// d x_He / dz (positive z direction) from the fudged Peebles
    /// equation with the helium treatment ladder.
    #[allow(clippy::too_many_arguments)]
    pub fn dx_he_dz(
        &self,
        x_he: f64,
        x: f64,
        x_h: f64,
        n: f64,
        z: f64,
        hz: f64,
        t_mat: f64,
        t_rad: f64,
        _energy_rate: f64,
    ) -> f64 {
        let sq_0 = (t_mat / cst::T_0_VF).sqrt();
        let sq_1 = (t_mat / cst::T_1_VF).sqrt();
        let r_down_he = cst::A_VF
            / (sq_0 * (1.0 + sq_0).powf(1.0 - cst::B_VF) * (1.0 + sq_1).powf(1.0 + cst::B_VF));
        let sq_0r = (t_rad / cst::T_0_VF).sqrt();
        let sq_1r = (t_rad / cst::T_1_VF).sqrt();
        let r_up_he = 4.0 * cst::A_VF
            / (sq_0r * (1.0 + sq_0r).powf(1.0 - cst::B_VF) * (1.0 + sq_1r).powf(1.0 + cst::B_VF))
            * (self.cr * t_rad).powf(1.5)
            * (-self.cdb_he / t_rad).exp();
        let n_he = self.f_he * n;

        // treatment ladder: 0 = plain escape constant, higher rungs add
        // radiative-transfer corrections
        let he_flag = if !(5.0e-9..=self.x_he_trigger).contains(&x_he) {
            0
        } else {
            self.he_switch
        };

        let mut cf_he_t = 0.0;
        let mut rdown_trip = 0.0;
        let mut rup_trip = 0.0;

        let k_he = if he_flag == 0 {
            self.ck_he / hz
        } else {
            let tau_he_s = cst::A2P_S * self.ck_he * 3.0 * n_he * (1.0 - x_he) / hz;
            let p_he_s = (1.0 - (-tau_he_s).exp()) / tau_he_s;
            let mut k_he = 1.0 / (cst::A2P_S * p_he_s * 3.0 * n_he * (1.0 - x_he));

            if (he_flag == 2 || he_flag >= 5) && x_h < self.x_h_limit_khe {
                // Doppler broadening of the singlet line
                let doppler = 2.0 * cst::K_B * t_mat / (cst::M_H * cst::NOT4 * cst::C * cst::C);
                let doppler = cst::C * cst::L_HE_2P * doppler.sqrt();
                let gamma_2ps = 3.0 * cst::A2P_S * self.f_he * (1.0 - x_he) * cst::C * cst::C
                    / (std::f64::consts::PI.sqrt()
                        * cst::SIGMA_HE_2PS
                        * 8.0
                        * std::f64::consts::PI
                        * doppler
                        * (1.0 - x_h))
                    / (cst::C * cst::L_HE_2P).powi(2);
                let pb = 0.36;
                let qb = self.fudge_he;
                let ah_con = cst::A2P_S / (1.0 + pb * gamma_2ps.powf(qb));
                k_he = 1.0 / ((cst::A2P_S * p_he_s + ah_con) * 3.0 * n_he * (1.0 - x_he));
            }

            if he_flag >= 3 {
                // triplet correction
                rdown_trip = cst::A_TRIP
                    / (sq_0
                        * (1.0 + sq_0).powf(1.0 - cst::B_TRIP)
                        * (1.0 + sq_1).powf(1.0 + cst::B_TRIP));
                rup_trip = cst::A_TRIP
                    / (sq_0r
                        * (1.0 + sq_0r).powf(1.0 - cst::B_TRIP)
                        * (1.0 + sq_1r).powf(1.0 + cst::B_TRIP))
                    * (-cst::H_P * cst::C * cst::L_HE_2ST_ION / (cst::K_B * t_mat)).exp()
                    * (self.cr * t_mat).powf(1.5)
                    * 4.0
                    / 3.0;

                let tau_he_t = cst::A2P_T * n_he * (1.0 - x_he) * 3.0
                    / (8.0 * std::f64::consts::PI * hz * cst::L_HE_2PT.powi(3));
                let p_he_t = (1.0 - (-tau_he_t).exp()) / tau_he_t;
                let cl_pst = cst::H_P * cst::C * (cst::L_HE_2PT - cst::L_HE_2ST) / cst::K_B;

                if he_flag == 3 || he_flag == 5 || x_h >= self.x_h_limit_triplet {
                    cf_he_t = cst::A2P_T * p_he_t * (-cl_pst / t_mat).exp();
                    cf_he_t /= rup_trip + cf_he_t;
                } else {
                    let doppler =
                        2.0 * cst::K_B * t_mat / (cst::M_H * cst::NOT4 * cst::C * cst::C);
                    let doppler = cst::C * cst::L_HE_2PT * doppler.sqrt();
                    let gamma_2pt = 3.0 * cst::A2P_T * self.f_he * (1.0 - x_he) * cst::C * cst::C
                        / (std::f64::consts::PI.sqrt()
                            * cst::SIGMA_HE_2PT
                            * 8.0
                            * std::f64::consts::PI
                            * doppler
                            * (1.0 - x_h))
                        / (cst::C * cst::L_HE_2PT).powi(2);
                    let pb = 0.66;
                    let qb = 0.9;
                    let ah_con = cst::A2P_T / (1.0 + pb * gamma_2pt.powf(qb)) / 3.0;
                    cf_he_t = (cst::A2P_T * p_he_t + ah_con) * (-cl_pst / t_mat).exp();
                    cf_he_t /= rup_trip + cf_he_t;
                }
            }

            k_he
        };

        if x_he < 1.0e-15 {
            return 0.0;
        }

        // Boltzmann factor, clamped against overflow
        let he_boltz = if self.bfact / t_mat < self.max_exp_boltz {
            (self.bfact / t_mat).exp()
        } else {
            self.max_exp_boltz.exp()
        };

        let mut dxhe = ((x * x_he * n * r_down_he
            - r_up_he * (1.0 - x_he) * (-self.cl_he / t_mat).exp())
            * (1.0 + k_he * cst::LAMBDA_HE * n_he * (1.0 - x_he) * he_boltz))
            / (hz
                * (1.0 + z)
                * (1.0 + k_he * (cst::LAMBDA_HE + r_up_he) * n_he * (1.0 - x_he) * he_boltz));

        // energy injection into helium ionization is neglected

        if he_flag >= 3 {
            dxhe += (x * x_he * n * rdown_trip
                - (1.0 - x_he)
                    * 3.0
                    * rup_trip
                    * (-cst::H_P * cst::C * cst::L_HE_2ST / (cst::K_B * t_mat)).exp())
                * cf_he_t
                / (hz * (1.0 + z));
        }

        dxhe
    }

    // =========================================================================
    // Saha-equilibrium solutions
    // =========================================================================

    /// Everything fully ionized, before any recombination.
    pub fn saha_fully_ionized(&self) -> SahaResult {
        SahaResult {
            x_h: 1.0,
            dx_h: 0.0,
            x_he: 1.0,
            dx_he: 0.0,
            x: 1.0 + 2.0 * self.f_he,
            dx: 0.0,
        }
    }

    /// First helium recombination (He III -> He II) in Saha equilibrium.
    pub fn saha_first_helium(&self, z: f64, t_mat: f64, dt_mat: f64) -> SahaResult {
        let rhs = (1.5 * (self.cr * t_mat / (1.0 + z) / (1.0 + z)).ln()
            - self.cb1_he2 / t_mat)
            .exp()
            / self.n_h0;
        let sqrt_val =
            ((rhs - 1.0 - self.f_he).powi(2) + 4.0 * (1.0 + 2.0 * self.f_he) * rhs).sqrt();
        let drhs = rhs
            * (self.cb1_he2 * dt_mat / t_mat / t_mat
                + 1.5 * (dt_mat / t_mat - 2.0 / (1.0 + z)));
        SahaResult {
            x_h: 1.0,
            dx_h: 0.0,
            x_he: 1.0,
            dx_he: 0.0,
            x: 0.5 * (sqrt_val - (rhs - 1.0 - self.f_he)),
            dx: 0.5
                * (((rhs - 1.0 - self.f_he) + 2.0 * (1.0 + 2.0 * self.f_he)) / sqrt_val - 1.0)
                * drhs,
        }
    }

    /// Plateau between the helium recombinations: He fully singly ionized.
    pub fn saha_helium_plateau(&self) -> SahaResult {
        SahaResult {
            x_h: 1.0,
            dx_h: 0.0,
            x_he: 1.0,
            dx_he: 0.0,
            x: 1.0 + self.f_he,
            dx: 0.0,
        }
    }

    /// Second helium recombination (He II -> He I) in Saha equilibrium.
    pub fn saha_second_helium(&self, z: f64, t_mat: f64, dt_mat: f64) -> SahaResult {
        let rhs = 4.0
            * (1.5 * (self.cr * t_mat / (1.0 + z) / (1.0 + z)).ln() - self.cb1_he1 / t_mat)
                .exp()
            / self.n_h0;
        let sqrt_val = ((rhs - 1.0).powi(2) + 4.0 * (1.0 + self.f_he) * rhs).sqrt();
        let drhs = rhs
            * (self.cb1_he1 * dt_mat / t_mat / t_mat
                + 1.5 * (dt_mat / t_mat - 2.0 / (1.0 + z)));
        let x = 0.5 * (sqrt_val - (rhs - 1.0));
        let dx = 0.5 * (((rhs - 1.0) + 2.0 * (1.0 + self.f_he)) / sqrt_val - 1.0) * drhs;
        SahaResult {
            x_h: 1.0,
            dx_h: 0.0,
            x_he: (x - 1.0) / self.f_he,
            dx_he: dx / self.f_he,
            x,
            dx,
        }
    }

    /// Hydrogen Saha equilibrium; returns `(x_H, dx_H/dz)` only, the
    /// helium state keeps evolving numerically in this regime.
    pub fn saha_hydrogen(&self, z: f64, t_mat: f64, dt_mat: f64) -> (f64, f64) {
        let rhs = (1.5 * (self.cr * t_mat / (1.0 + z) / (1.0 + z)).ln() - self.cb1 / t_mat)
            .exp()
            / self.n_h0;
        let sqrt_val = (rhs * rhs + 4.0 * rhs).sqrt();
        let drhs = rhs
            * (self.cb1 * dt_mat / t_mat / t_mat + 1.5 * (dt_mat / t_mat - 2.0 / (1.0 + z)));
        (
            0.5 * (sqrt_val - rhs),
            0.5 * ((rhs + 2.0) / sqrt_val - 1.0) * drhs,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const F_HE: f64 = 0.08112;
    const N_H0: f64 = 0.19; // 1/m^3
    const T_CMB: f64 = 2.7255;

    fn kernel() -> RecfastKernel {
        RecfastKernel::new(&Precision::default(), F_HE, N_H0)
    }

    #[test]
    fn test_chi_fits_limits() {
        assert!((chi_ion_hydrogen(0.0) - 0.369202).abs() < 1e-6);
        assert_eq!(chi_ion_hydrogen(1.0), 0.0);
        assert_eq!(chi_ion_hydrogen(1.5), 0.0);
        assert!(chi_heat(0.0).abs() < 1e-12);
        assert_eq!(chi_heat(1.0), 1.0);
        assert!(chi_heat(0.5) > 0.5 && chi_heat(0.5) < 1.0);
    }

    #[test]
    fn test_saha_hydrogen_ionized_at_high_z() {
        let k = kernel();
        let z = 1500.0;
        let t = T_CMB * (1.0 + z);
        let (x_h, _) = k.saha_hydrogen(z, t, T_CMB);
        assert!(x_h > 0.99, "x_H({}) = {}", z, x_h);
    }

    #[test]
    fn test_saha_hydrogen_recombines() {
        let k = kernel();
        let mut prev = f64::INFINITY;
        for &z in &[1500.0, 1300.0, 1200.0, 1100.0] {
            let t = T_CMB * (1.0 + z);
            let (x_h, dx_h) = k.saha_hydrogen(z, t, T_CMB);
            assert!(x_h < prev, "Saha x_H must fall with decreasing z");
            assert!(dx_h >= 0.0, "x_H grows with z");
            prev = x_h;
        }
        let t = T_CMB * 1101.0;
        let (x_low, _) = k.saha_hydrogen(1100.0, t, T_CMB);
        assert!(x_low < 0.2, "Saha x_H(1100) = {}", x_low);
    }

    #[test]
    fn test_saha_first_helium_limits() {
        let k = kernel();
        // well before the first helium recombination: everything ionized
        let z = 7500.0;
        let t = T_CMB * (1.0 + z);
        let result = k.saha_first_helium(z, t, T_CMB);
        assert!(
            (result.x - (1.0 + 2.0 * F_HE)).abs() < 1e-2,
            "x = {}",
            result.x
        );
        // after it: only singly ionized helium remains
        let z = 5200.0;
        let t = T_CMB * (1.0 + z);
        let result = k.saha_first_helium(z, t, T_CMB);
        assert!(result.x < 1.0 + 2.0 * F_HE);
        assert!(result.x > 1.0 + 0.5 * F_HE);
    }

    #[test]
    fn test_saha_second_helium_approaches_neutral_helium() {
        let k = kernel();
        let z = 2400.0;
        let t = T_CMB * (1.0 + z);
        let result = k.saha_second_helium(z, t, T_CMB);
        // helium mostly neutral well below its Saha threshold
        assert!(result.x_he < 0.3, "x_He({}) = {}", z, result.x_he);
        assert!(result.x_he >= 0.0);
        assert!((result.x_h - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_peebles_sign_in_equilibrium_plasma() {
        let k = kernel();
        let z = 1200.0;
        let t = T_CMB * (1.0 + z);
        let n = N_H0 * (1.0 + z).powi(3);
        let hz = 1.0e-13; // 1/s, matter-era magnitude
        // fully ionized plasma recombines: x_H falls going forward in
        // time, so dx_H/dz > 0
        let dxh = k.dx_h_dz(0.999, 0.999 + F_HE, n, z, hz, t, t, 0.0);
        assert!(dxh > 0.0, "dx_H/dz = {}", dxh);
    }

    #[test]
    fn test_helium_derivative_vanishes_when_neutral() {
        let k = kernel();
        let z = 1800.0;
        let t = T_CMB * (1.0 + z);
        let n = N_H0 * (1.0 + z).powi(3);
        let dxhe = k.dx_he_dz(1.0e-16, 1.0, 1.0, n, z, 1.0e-13, t, t, 0.0);
        assert_eq!(dxhe, 0.0);
    }

    #[test]
    fn test_helium_ladder_rungs_agree_roughly() {
        // all treatment rungs describe the same physics; they should
        // agree on the order of magnitude in the middle of helium
        // recombination
        let z = 2200.0;
        let t = T_CMB * (1.0 + z);
        let n = N_H0 * (1.0 + z).powi(3);
        let hz = 3.0e-13;
        let mut rates = Vec::new();
        for rung in [0u8, 2, 3, 6] {
            let precision = Precision {
                he_switch: rung,
                ..Default::default()
            };
            let k = RecfastKernel::new(&precision, F_HE, N_H0);
            rates.push(k.dx_he_dz(0.5, 1.0 + 0.5 * F_HE, 1.0, n, z, hz, t, t, 0.0));
        }
        for &rate in &rates {
            assert!(rate > 0.0);
            assert!(rate / rates[0] > 0.1 && rate / rates[0] < 10.0);
        }
    }
}
