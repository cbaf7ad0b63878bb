//! Frozen thermodynamics table: storage layout and row extraction.

/// Runtime column layout of the thermodynamics table.
///
/// Mandatory columns always exist; the damping scale and the sound-speed
/// derivatives are allocated only on request.
#[derive(Clone, Copy, Debug)]
pub struct ColumnLayout {
    pub xe: usize,
    pub dkappa: usize,
    pub ddkappa: usize,
    pub dddkappa: usize,
    pub exp_m_kappa: usize,
    pub g: usize,
    pub dg: usize,
    pub ddg: usize,
    pub tb: usize,
    pub cb2: usize,
    pub tau_d: usize,
    pub dcb2: Option<usize>,
    pub ddcb2: Option<usize>,
    pub rate: usize,
    pub r_d: Option<usize>,
    pub n_cols: usize,
}

impl ColumnLayout {
    /// Assign column indices given the optional-column flags.
    pub fn new(compute_damping_scale: bool, compute_cb2_derivatives: bool) -> Self {
        let mut next = 0;
        let mut take = || {
            let index = next;
            next += 1;
            index
        };

        let xe = take();
        let dkappa = take();
        let ddkappa = take();
        let dddkappa = take();
        let exp_m_kappa = take();
        let g = take();
        let dg = take();
        let ddg = take();
        let tb = take();
        let cb2 = take();
        let tau_d = take();
        let dcb2 = compute_cb2_derivatives.then(&mut take);
        let ddcb2 = compute_cb2_derivatives.then(&mut take);
        let rate = take();
        let r_d = compute_damping_scale.then(&mut take);

        Self {
            xe,
            dkappa,
            ddkappa,
            dddkappa,
            exp_m_kappa,
            g,
            dg,
            ddg,
            tb,
            cb2,
            tau_d,
            dcb2,
            ddcb2,
            rate,
            r_d,
            n_cols: next,
        }
    }
}

/// Dense row-major thermodynamics table over the redshift grid.
#[derive(Clone, Debug)]
pub struct ThermoTable {
    pub layout: ColumnLayout,
    /// Redshift grid, strictly increasing, `z[0] = 0`.
    pub z: Vec<f64>,
    /// Conformal time per grid point [Mpc], strictly decreasing.
    pub tau: Vec<f64>,
    /// Row-major values, `n_rows x layout.n_cols`.
    pub data: Vec<f64>,
    /// Second derivatives in z per column, same shape as `data`.
    pub d2: Vec<f64>,
}

impl ThermoTable {
    /// Allocate a zero-filled table over the given grid.
    pub fn new(layout: ColumnLayout, z: Vec<f64>, tau: Vec<f64>) -> Self {
        let n = z.len();
        Self {
            layout,
            z,
            tau,
            data: vec![0.0; n * layout.n_cols],
            d2: vec![0.0; n * layout.n_cols],
        }
    }

    /// Number of rows.
    pub fn n_rows(&self) -> usize {
        self.z.len()
    }

    /// Value at `(row, col)`.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.layout.n_cols + col]
    }

    /// Set value at `(row, col)`.
    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.data[row * self.layout.n_cols + col] = value;
    }

    /// Copy of one column.
    pub fn column(&self, col: usize) -> Vec<f64> {
        (0..self.n_rows()).map(|row| self.get(row, col)).collect()
    }

    /// Overwrite one column.
    pub fn set_column(&mut self, col: usize, values: &[f64]) {
        debug_assert_eq!(values.len(), self.n_rows());
        for (row, &value) in values.iter().enumerate() {
            self.set(row, col, value);
        }
    }

    /// One row as a slice.
    pub fn row(&self, row: usize) -> &[f64] {
        let w = self.layout.n_cols;
        &self.data[row * w..(row + 1) * w]
    }
}

/// One interpolated (or extrapolated) row of the thermodynamics table.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThermoPoint {
    /// Free-electron fraction.
    pub xe: f64,
    /// Differential optical depth dkappa/dtau [1/Mpc].
    pub dkappa: f64,
    /// d^2 kappa / dtau^2.
    pub ddkappa: f64,
    /// d^3 kappa / dtau^3.
    pub dddkappa: f64,
    /// exp(-kappa) from today back to this redshift.
    pub exp_m_kappa: f64,
    /// Visibility function g [1/Mpc].
    pub g: f64,
    /// dg/dtau.
    pub dg: f64,
    /// d^2 g / dtau^2.
    pub ddg: f64,
    /// Baryon temperature [K].
    pub tb: f64,
    /// Baryon sound speed squared (units of c^2).
    pub cb2: f64,
    /// Conformal drag time (dimensionless).
    pub tau_d: f64,
    /// d c_b^2 / dtau, when requested.
    pub dcb2: Option<f64>,
    /// d^2 c_b^2 / dtau^2, when requested.
    pub ddcb2: Option<f64>,
    /// Smoothed maximum variation rate [1/Mpc].
    pub rate: f64,
    /// Comoving photon damping scale [Mpc], when requested.
    pub r_d: Option<f64>,
}

impl ThermoPoint {
    /// Extract a typed point from a raw row.
    pub fn from_row(layout: &ColumnLayout, row: &[f64]) -> Self {
        Self {
            xe: row[layout.xe],
            dkappa: row[layout.dkappa],
            ddkappa: row[layout.ddkappa],
            dddkappa: row[layout.dddkappa],
            exp_m_kappa: row[layout.exp_m_kappa],
            g: row[layout.g],
            dg: row[layout.dg],
            ddg: row[layout.ddg],
            tb: row[layout.tb],
            cb2: row[layout.cb2],
            tau_d: row[layout.tau_d],
            dcb2: layout.dcb2.map(|c| row[c]),
            ddcb2: layout.ddcb2.map(|c| row[c]),
            rate: row[layout.rate],
            r_d: layout.r_d.map(|c| row[c]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_without_optionals() {
        let layout = ColumnLayout::new(false, false);
        assert_eq!(layout.n_cols, 12);
        assert!(layout.r_d.is_none());
        assert!(layout.dcb2.is_none());
    }

    #[test]
    fn test_layout_with_optionals() {
        let layout = ColumnLayout::new(true, true);
        assert_eq!(layout.n_cols, 15);
        assert!(layout.r_d.is_some());
        assert!(layout.dcb2.is_some() && layout.ddcb2.is_some());
        // optional columns must not alias mandatory ones
        assert_ne!(layout.r_d.unwrap(), layout.rate);
    }

    #[test]
    fn test_table_roundtrip() {
        let layout = ColumnLayout::new(false, false);
        let z = vec![0.0, 1.0, 2.0];
        let tau = vec![300.0, 200.0, 100.0];
        let mut table = ThermoTable::new(layout, z, tau);
        table.set(1, layout.xe, 0.5);
        table.set(1, layout.tb, 42.0);
        assert_eq!(table.get(1, layout.xe), 0.5);

        let point = ThermoPoint::from_row(&layout, table.row(1));
        assert_eq!(point.xe, 0.5);
        assert_eq!(point.tb, 42.0);
        assert!(point.r_d.is_none());

        let column = table.column(layout.xe);
        assert_eq!(column, vec![0.0, 0.5, 0.0]);
    }
}
