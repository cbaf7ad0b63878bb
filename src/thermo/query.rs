//! Read-only query surface over the frozen table.
//!
//! Three regimes serve a query at redshift z:
//!
//! - above the tabulated range, analytic asymptotics extrapolate every
//!   column (the caller supplies a background point there);
//! - near a derivative break of the reionization scheme, linear
//!   interpolation avoids spline ringing;
//! - everywhere else, cubic splines with precomputed second derivatives,
//!   either with a fresh binary search or resuming from a caller cursor.

use crate::background::BgPoint;
use crate::constants as cst;
use crate::error::ThermoError;
use crate::numerics::{interval_index, interval_index_closeby};
use crate::thermo::table::ThermoPoint;
use crate::thermo::Thermodynamics;

/// Cursor handling for repeated queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InterpolationMode {
    /// Fresh binary search.
    Normal,
    /// Resume from the caller-maintained cursor (monotone sweeps).
    Closeby,
}

impl Thermodynamics {
    /// Thermodynamics quantities at redshift z.
    ///
    /// `cursor` holds the interpolation bracket between calls in
    /// [`InterpolationMode::Closeby`] mode; each thread of a parallel
    /// sweep should keep its own. `background` is only read when z lies
    /// above the tabulated range and must then be evaluated at the same
    /// redshift.
    pub fn at_z(
        &self,
        z: f64,
        mode: InterpolationMode,
        cursor: &mut usize,
        background: Option<&BgPoint>,
    ) -> Result<ThermoPoint, ThermoError> {
        if z < 0.0 {
            return Err(ThermoError::OutOfRange(format!(
                "negative redshift {}",
                z
            )));
        }

        let table = &self.table;
        let n = table.n_rows();
        let z_max = table.z[n - 1];

        if z >= z_max {
            let point = background.ok_or_else(|| {
                ThermoError::guard(format!(
                    "a background point is required to extrapolate above z = {}",
                    z_max
                ))
            })?;
            return Ok(self.extrapolate_high_z(z, point));
        }

        let idx = match mode {
            InterpolationMode::Normal => interval_index(&table.z, z),
            InterpolationMode::Closeby => interval_index_closeby(&table.z, z, *cursor),
        };
        *cursor = idx;

        let linear = matches!(self.linear_interp_below, Some(limit) if z < limit);
        let layout = table.layout;
        let w = layout.n_cols;
        let lo = table.row(idx);
        let hi = table.row(idx + 1);
        let z0 = table.z[idx];
        let z1 = table.z[idx + 1];
        let h = z1 - z0;

        let mut row = vec![0.0; w];
        if linear {
            let frac = (z - z0) / h;
            for c in 0..w {
                row[c] = lo[c] + frac * (hi[c] - lo[c]);
            }
        } else {
            let a = (z1 - z) / h;
            let b = (z - z0) / h;
            let d2_lo = &table.d2[idx * w..(idx + 1) * w];
            let d2_hi = &table.d2[(idx + 1) * w..(idx + 2) * w];
            for c in 0..w {
                row[c] = a * lo[c]
                    + b * hi[c]
                    + ((a * a * a - a) * d2_lo[c] + (b * b * b - b) * d2_hi[c]) * h * h / 6.0;
            }
        }

        Ok(ThermoPoint::from_row(&layout, &row))
    }

    /// Analytic asymptotics above the tabulated range: frozen x_e, power
    /// laws in (1+z) for the optical-depth quantities, matter locked to
    /// radiation. The source-function quantities are identically zero
    /// (they are never sampled above the table).
    fn extrapolate_high_z(&self, z: f64, background: &BgPoint) -> ThermoPoint {
        let table = &self.table;
        let layout = table.layout;
        let n = table.n_rows();
        let last = table.row(n - 1);
        let z_last = table.z[n - 1];
        let zp1 = 1.0 + z;
        let growth = zp1 / (1.0 + z_last);

        let xe = last[layout.xe];
        let dkappa = zp1 * zp1 * self.n_e * xe * cst::SIGMA_T * cst::MPC_OVER_M;
        let h = background.h;

        let mu_inv = 1.0 + (1.0 / cst::NOT4 - 1.0) * self.y_he + xe * (1.0 - self.y_he);
        let cb2 =
            cst::K_B / (cst::C * cst::C * cst::M_H) * mu_inv * self.t_cmb * zp1 * 4.0 / 3.0;

        ThermoPoint {
            xe,
            dkappa,
            // d/dtau = -H d/dz applied to the (1+z)^2 power law
            ddkappa: -h * 2.0 / zp1 * dkappa,
            dddkappa: (h * h / zp1 - background.h_prime) * 2.0 / zp1 * dkappa,
            exp_m_kappa: 0.0,
            g: 0.0,
            dg: 0.0,
            ddg: 0.0,
            tb: self.t_cmb * zp1,
            cb2,
            tau_d: last[layout.tau_d] * growth * growth,
            dcb2: layout.dcb2.map(|_| -h * background.a * cb2),
            ddcb2: layout.ddcb2.map(|_| -background.h_prime * background.a * cb2),
            rate: dkappa,
            r_d: layout.r_d.map(|col| last[col] * growth.powf(-1.5)),
        }
    }
}
