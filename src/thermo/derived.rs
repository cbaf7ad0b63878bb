//! Post-processing of the integrated history: optical-depth derivatives,
//! visibility, drag time, damping scale and the characteristic epochs.
//!
//! All intermediate quantities live in dedicated scratch buffers; table
//! columns are written exactly once, after their final values are known.

use crate::background::{Background, DetailLevel};
use crate::config::Precision;
use crate::constants::{Z_REC_MAX, Z_REC_MIN};
use crate::error::ThermoError;
use crate::numerics::{
    smooth_boxcar, spline_derive, spline_integrate_cumulative, spline_second_derivatives,
    SplineBoundary,
};
use crate::thermo::table::ThermoTable;

/// Scalar summaries of the frozen history.
#[derive(Clone, Copy, Debug)]
pub(crate) struct DerivedQuantities {
    /// Redshift of the visibility maximum.
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
    /// Ratio of ra_rec to the conformal distance to recombination.
    pub angular_rescaling: f64,
    /// Damping scale at recombination [Mpc], when computed.
    pub rd_rec: Option<f64>,
    /// Baryon drag redshift (tau_d crosses one).
    pub z_d: f64,
    /// Conformal time at the drag epoch [Mpc].
    pub tau_d: f64,
    /// Comoving sound horizon at the drag epoch [Mpc].
    pub rs_d: f64,
    /// Physical sound horizon at the drag epoch [Mpc].
    pub ds_d: f64,
    /// Conformal time after which photons free-stream [Mpc].
    pub tau_free_streaming: f64,
    /// Largest conformal time where the visibility is negligible [Mpc].
    pub tau_cut: f64,
}

/// Photon-baryon ratio R = (3/4) rho_b / rho_g at one conformal time.
fn baryon_photon_ratio<B: Background + ?Sized>(
    background: &B,
    tau: f64,
) -> Result<f64, ThermoError> {
    let point = background.at_tau(tau, DetailLevel::Normal)?;
    Ok(0.75 * point.rho_b / point.rho_g)
}

/// Fill the derived columns and locate the characteristic epochs.
pub(crate) fn compute_derived<B: Background + ?Sized>(
    precision: &Precision,
    background: &B,
    table: &mut ThermoTable,
) -> Result<DerivedQuantities, ThermoError> {
    let n = table.n_rows();
    let layout = table.layout;
    let tau = table.tau.clone();
    let dkappa = table.column(layout.dkappa);

    // -------------------------------------------------------------------------
    // drag time: tau_d(tau) = -int_{tau_0}^{tau} (1/R) kappa' dtau
    // -------------------------------------------------------------------------
    let mut drag_integrand = vec![0.0; n];
    for i in 0..n {
        let r = baryon_photon_ratio(background, tau[i])?;
        drag_integrand[i] = -dkappa[i] / r;
    }
    let dd = spline_second_derivatives(&tau, &drag_integrand, SplineBoundary::EstimatedDerivatives);
    let tau_d_column = spline_integrate_cumulative(&tau, &drag_integrand, &dd);
    table.set_column(layout.tau_d, &tau_d_column);

    // -------------------------------------------------------------------------
    // damping scale (optional): integrate in growing conformal time, with
    // an analytic boundary term for the radiation-dominated start where
    // R -> 0 and the integrand reduces to 16/(15*6)/kappa'
    // -------------------------------------------------------------------------
    if let Some(col_rd) = layout.r_d {
        let tau_grow: Vec<f64> = (0..n).map(|i| tau[n - 1 - i]).collect();
        let mut integrand = vec![0.0; n];
        for i in 0..n {
            let r = baryon_photon_ratio(background, tau_grow[i])?;
            integrand[i] =
                1.0 / 6.0 / dkappa[n - 1 - i] * (r * r / (1.0 + r) + 16.0 / 15.0) / (1.0 + r);
        }
        let dd =
            spline_second_derivatives(&tau_grow, &integrand, SplineBoundary::EstimatedDerivatives);
        let integral = spline_integrate_cumulative(&tau_grow, &integrand, &dd);

        let tau_ini = tau[n - 1];
        let dkappa_ini = dkappa[n - 1];
        let boundary = 16.0 / (15.0 * 6.0 * 3.0) * tau_ini / dkappa_ini;
        let mut r_d = vec![0.0; n];
        for i in 0..n {
            r_d[i] = 2.0 * std::f64::consts::PI * (boundary + integral[n - 1 - i]).sqrt();
        }
        table.set_column(col_rd, &r_d);
    }

    // -------------------------------------------------------------------------
    // optical-depth derivatives, -kappa, visibility and variation rate
    // -------------------------------------------------------------------------
    // the spline curvature of kappa'(tau) is kappa''' at the nodes
    let dddkappa = spline_second_derivatives(&tau, &dkappa, SplineBoundary::EstimatedDerivatives);
    let ddkappa = spline_derive(&tau, &dkappa, &dddkappa);
    let minus_kappa = spline_integrate_cumulative(&tau, &dkappa, &dddkappa);

    let mut exp_m_kappa = vec![0.0; n];
    let mut g = vec![0.0; n];
    let mut dg = vec![0.0; n];
    let mut ddg = vec![0.0; n];
    let mut rate = vec![0.0; n];
    for i in 0..n {
        if dkappa[i] == 0.0 {
            return Err(ThermoError::guard(format!(
                "variation rate diverges: dkappa/dtau vanishes at z = {}",
                table.z[i]
            )));
        }
        let expmk = minus_kappa[i].exp();
        exp_m_kappa[i] = expmk;
        g[i] = dkappa[i] * expmk;
        dg[i] = (ddkappa[i] + dkappa[i] * dkappa[i]) * expmk;
        ddg[i] = (dddkappa[i] + 3.0 * dkappa[i] * ddkappa[i] + dkappa[i].powi(3)) * expmk;
        rate[i] = (dkappa[i] * dkappa[i]
            + (ddkappa[i] / dkappa[i]).powi(2)
            + (dddkappa[i] / dkappa[i]).abs())
        .sqrt();
    }
    smooth_boxcar(&mut rate, precision.rate_smoothing_radius);

    table.set_column(layout.ddkappa, &ddkappa);
    table.set_column(layout.dddkappa, &dddkappa);
    table.set_column(layout.exp_m_kappa, &exp_m_kappa);
    table.set_column(layout.g, &g);
    table.set_column(layout.dg, &dg);
    table.set_column(layout.ddg, &ddg);
    table.set_column(layout.rate, &rate);

    // -------------------------------------------------------------------------
    // sound-speed derivatives (optional)
    // -------------------------------------------------------------------------
    if let (Some(col_dcb2), Some(col_ddcb2)) = (layout.dcb2, layout.ddcb2) {
        let cb2 = table.column(layout.cb2);
        let ddcb2 = spline_second_derivatives(&tau, &cb2, SplineBoundary::EstimatedDerivatives);
        let dcb2 = spline_derive(&tau, &cb2, &ddcb2);
        table.set_column(col_dcb2, &dcb2);
        table.set_column(col_ddcb2, &ddcb2);
    }

    // -------------------------------------------------------------------------
    // second derivatives in z for the query-phase spline
    // -------------------------------------------------------------------------
    for col in 0..layout.n_cols {
        let column = table.column(col);
        let d2 =
            spline_second_derivatives(&table.z, &column, SplineBoundary::EstimatedDerivatives);
        for (row, &value) in d2.iter().enumerate() {
            table.d2[row * layout.n_cols + col] = value;
        }
    }

    // -------------------------------------------------------------------------
    // recombination epoch: maximum of the visibility function
    // -------------------------------------------------------------------------
    let mut index = n - 1;
    while table.z[index] > Z_REC_MAX {
        index -= 1;
    }
    if g[index + 1] > g[index] {
        return Err(ThermoError::domain(format!(
            "visibility still rising at z = {}: recombination beyond the allowed \
             window (z_rec_max = {})",
            Z_REC_MAX, Z_REC_MAX
        )));
    }
    while index > 0 && g[index + 1] < g[index] {
        index -= 1;
    }
    let g_max = g[index];
    let index_max = index;

    // three-point quadratic refinement around the discrete maximum,
    // assuming locally uniform z spacing
    let z_rec = table.z[index + 1]
        + 0.5 * (table.z[index + 1] - table.z[index]) * (g[index] - g[index + 2])
            / (g[index] - 2.0 * g[index + 1] + g[index + 2]);
    if z_rec >= Z_REC_MAX {
        return Err(ThermoError::domain(format!(
            "recombination redshift {} above the allowed window ({})",
            z_rec, Z_REC_MAX
        )));
    }
    if z_rec <= Z_REC_MIN {
        return Err(ThermoError::domain(format!(
            "recombination redshift {} below the allowed window ({})",
            z_rec, Z_REC_MIN
        )));
    }

    let tau_rec = background.tau_of_z(z_rec)?;
    let at_rec = background.at_tau(tau_rec, DetailLevel::Long)?;
    let rs_rec = at_rec.rs;
    let ds_rec = rs_rec / (1.0 + z_rec);
    let da_rec = at_rec.ang_distance;
    let ra_rec = da_rec * (1.0 + z_rec);
    let angular_rescaling = ra_rec / (background.conformal_age() - tau_rec);

    let rd_rec = layout.r_d.map(|col| {
        let z0 = table.z[index];
        let z1 = table.z[index + 1];
        (z1 - z_rec) / (z1 - z0) * table.get(index, col)
            + (z_rec - z0) / (z1 - z0) * table.get(index + 1, col)
    });

    // -------------------------------------------------------------------------
    // free-streaming time: photon mean free path catches up with the
    // horizon (moving forward in time from recombination)
    // -------------------------------------------------------------------------
    let mut index = index_max;
    let mut tau_fs = background.tau_of_z(table.z[index])?;
    while index > 0 && 1.0 / dkappa[index] / tau_fs < precision.free_streaming_trigger {
        index -= 1;
        tau_fs = background.tau_of_z(table.z[index])?;
    }
    let tau_free_streaming = tau_fs;

    // -------------------------------------------------------------------------
    // visibility cut: sources negligible above this conformal time
    // -------------------------------------------------------------------------
    let mut index = index_max;
    while g[index] > g_max * precision.visibility_cut && index > 0 {
        index -= 1;
    }
    let tau_cut = background.tau_of_z(table.z[index])?;

    // -------------------------------------------------------------------------
    // drag epoch: tau_d crosses one
    // -------------------------------------------------------------------------
    let mut index = 0;
    while index < n && tau_d_column[index] < 1.0 {
        index += 1;
    }
    if index == 0 || index == n {
        return Err(ThermoError::domain(
            "conformal drag time never crosses one inside the table",
        ));
    }
    let z_d = table.z[index - 1]
        + (1.0 - tau_d_column[index - 1]) / (tau_d_column[index] - tau_d_column[index - 1])
            * (table.z[index] - table.z[index - 1]);
    let tau_d = background.tau_of_z(z_d)?;
    let at_drag = background.at_tau(tau_d, DetailLevel::Long)?;
    let rs_d = at_drag.rs;
    let ds_d = rs_d / (1.0 + z_d);

    Ok(DerivedQuantities {
        z_rec,
        tau_rec,
        rs_rec,
        ds_rec,
        da_rec,
        ra_rec,
        angular_rescaling,
        rd_rec,
        z_d,
        tau_d,
        rs_d,
        ds_d,
        tau_free_streaming,
        tau_cut,
    })
}
