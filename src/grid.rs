//! Redshift sampling grid and its conformal-time image.
//!
//! Three concatenated segments cover `[0, z_initial]`:
//!
//! 1. logarithmic spacing on `[z_linear, z_initial]` (early times),
//! 2. linear spacing on `[z_start_max, z_linear]` (recombination),
//! 3. linear spacing on `[0, z_start_max]` (reionization), sharing its
//!    upper endpoint with segment 2.
//!
//! The merged grid is stored increasing in z (index 0 = today), so the
//! conformal-time companion decreases with the index.

use crate::background::Background;
use crate::config::Precision;
use crate::error::ThermoError;

/// The merged sampling grid.
#[derive(Clone, Debug)]
pub struct Grid {
    /// Redshifts, strictly increasing, `z[0] = 0`.
    pub z: Vec<f64>,
    /// Conformal time at each redshift [Mpc], strictly decreasing.
    pub tau: Vec<f64>,
    /// Conformal time of the earliest grid point.
    pub tau_ini: f64,
}

impl Grid {
    /// Build the grid and query the background for its conformal times.
    pub fn build<B: Background + ?Sized>(
        precision: &Precision,
        background: &B,
    ) -> Result<Self, ThermoError> {
        let nz_log = precision.nz_log;
        let nz_lin = precision.nz_lin;
        let nz_reio = precision.nz_reio();
        let n = nz_log + nz_lin + nz_reio;
        let top = n - 1;

        let z_initial = precision.z_initial;
        let z_linear = precision.z_linear;
        let z_reio_max = precision.reionization_z_start_max;

        let mut z = vec![0.0; n];

        // log segment: [z_linear, z_initial], earliest point last
        let log_span = z_initial.ln() - z_linear.ln();
        for j in 0..nz_log {
            z[top - j] =
                (log_span * (nz_log - 1 - j) as f64 / (nz_log - 1) as f64 + z_linear.ln()).exp();
        }
        // linear recombination segment: [z_reio_max, z_linear), top point
        // just below z_linear to avoid double-counting
        for j in 0..nz_lin {
            z[top - (j + nz_log)] =
                (z_linear - z_reio_max) * (nz_lin - 1 - j) as f64 / nz_lin as f64 + z_reio_max;
        }
        // reionization segment: [0, z_reio_max), shares its top endpoint
        // with the previous segment
        for j in 0..nz_reio {
            z[top - (j + nz_log + nz_lin)] = z_reio_max * (nz_reio - 1 - j) as f64 / nz_reio as f64;
        }

        let mut tau = vec![0.0; n];
        for i in 0..n {
            tau[i] = background.tau_of_z(z[i])?;
        }
        let tau_ini = tau[n - 1];

        Ok(Self { z, tau, tau_ini })
    }

    /// Number of grid points.
    pub fn len(&self) -> usize {
        self.z.len()
    }

    /// True when the grid holds no points.
    pub fn is_empty(&self) -> bool {
        self.z.is_empty()
    }
}
