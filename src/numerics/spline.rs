//! Cubic-spline table operations.
//!
//! Second derivatives are precomputed once per table column and reused by
//! evaluation, differentiation and integration. Two boundary conditions
//! are supported:
//!
//! - `Natural`: vanishing second derivative at both ends.
//! - `EstimatedDerivatives`: first derivatives at both ends estimated from
//!   the three outermost points (one-sided quadratic fit), then used as
//!   clamped boundary conditions. This is the right choice when the
//!   splined quantity is later differentiated or integrated, since a
//!   natural boundary flattens the curvature at the edges.

/// Boundary condition for [`spline_second_derivatives`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SplineBoundary {
    /// y'' = 0 at both ends.
    Natural,
    /// Clamped with one-sided three-point slope estimates at both ends.
    EstimatedDerivatives,
}

/// One-sided quadratic slope estimate at `x[0]` from the first three points.
fn boundary_slope_first(x: &[f64], y: &[f64]) -> f64 {
    ((x[2] - x[0]) * (x[2] - x[0]) * (y[1] - y[0]) - (x[1] - x[0]) * (x[1] - x[0]) * (y[2] - y[0]))
        / ((x[2] - x[0]) * (x[1] - x[0]) * (x[2] - x[1]))
}

/// One-sided quadratic slope estimate at `x[n-1]` from the last three points.
fn boundary_slope_last(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len();
    ((x[n - 3] - x[n - 1]) * (x[n - 3] - x[n - 1]) * (y[n - 2] - y[n - 1])
        - (x[n - 2] - x[n - 1]) * (x[n - 2] - x[n - 1]) * (y[n - 3] - y[n - 1]))
        / ((x[n - 3] - x[n - 1]) * (x[n - 2] - x[n - 1]) * (x[n - 3] - x[n - 2]))
}

/// Compute spline second derivatives for `y(x)`.
///
/// `x` must be strictly monotone (increasing or decreasing) with at least
/// three points (two for `Natural`).
pub fn spline_second_derivatives(x: &[f64], y: &[f64], bc: SplineBoundary) -> Vec<f64> {
    let n = x.len();
    debug_assert_eq!(n, y.len());
    debug_assert!(n >= 2);

    let mut y2 = vec![0.0; n];
    if n == 2 {
        return y2;
    }
    let mut u = vec![0.0; n - 1];

    match bc {
        SplineBoundary::Natural => {
            y2[0] = 0.0;
            u[0] = 0.0;
        }
        SplineBoundary::EstimatedDerivatives => {
            let yp1 = boundary_slope_first(x, y);
            y2[0] = -0.5;
            u[0] = (3.0 / (x[1] - x[0])) * ((y[1] - y[0]) / (x[1] - x[0]) - yp1);
        }
    }

    // Tridiagonal forward sweep.
    for i in 1..n - 1 {
        let sig = (x[i] - x[i - 1]) / (x[i + 1] - x[i - 1]);
        let p = sig * y2[i - 1] + 2.0;
        y2[i] = (sig - 1.0) / p;
        let slope_diff =
            (y[i + 1] - y[i]) / (x[i + 1] - x[i]) - (y[i] - y[i - 1]) / (x[i] - x[i - 1]);
        u[i] = (6.0 * slope_diff / (x[i + 1] - x[i - 1]) - sig * u[i - 1]) / p;
    }

    let (qn, un) = match bc {
        SplineBoundary::Natural => (0.0, 0.0),
        SplineBoundary::EstimatedDerivatives => {
            let ypn = boundary_slope_last(x, y);
            let h = x[n - 1] - x[n - 2];
            (0.5, (3.0 / h) * (ypn - (y[n - 1] - y[n - 2]) / h))
        }
    };

    y2[n - 1] = (un - qn * u[n - 2]) / (qn * y2[n - 2] + 1.0);
    for k in (0..n - 1).rev() {
        y2[k] = y2[k] * y2[k + 1] + u[k];
    }

    y2
}

/// Find the lower index of the interval bracketing `xv` by binary search.
///
/// Works for monotone increasing and decreasing `x`; the result is clamped
/// to `[0, n-2]` so boundary values evaluate with the edge polynomial.
pub fn interval_index(x: &[f64], xv: f64) -> usize {
    let n = x.len();
    let increasing = x[n - 1] > x[0];
    let mut lo = 0usize;
    let mut hi = n - 1;
    while hi - lo > 1 {
        let mid = (lo + hi) / 2;
        if (x[mid] > xv) == increasing {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    lo
}

/// Resume an interval search from a caller-supplied previous index.
///
/// Intended for monotone query sweeps: the cursor is advanced (in either
/// direction) until the bracketing interval is found.
pub fn interval_index_closeby(x: &[f64], xv: f64, last: usize) -> usize {
    let n = x.len();
    let increasing = x[n - 1] > x[0];
    let mut idx = last.min(n - 2);

    if increasing {
        while idx > 0 && x[idx] > xv {
            idx -= 1;
        }
        while idx < n - 2 && x[idx + 1] < xv {
            idx += 1;
        }
    } else {
        while idx > 0 && x[idx] < xv {
            idx -= 1;
        }
        while idx < n - 2 && x[idx + 1] > xv {
            idx += 1;
        }
    }
    idx
}

/// Evaluate the spline at `xv` inside interval `idx` (lower node index).
pub fn spline_eval(x: &[f64], y: &[f64], y2: &[f64], idx: usize, xv: f64) -> f64 {
    let h = x[idx + 1] - x[idx];
    let a = (x[idx + 1] - xv) / h;
    let b = (xv - x[idx]) / h;
    a * y[idx]
        + b * y[idx + 1]
        + ((a * a * a - a) * y2[idx] + (b * b * b - b) * y2[idx + 1]) * h * h / 6.0
}

/// Evaluate the spline and its first derivative at `xv` inside interval `idx`.
pub fn spline_eval_with_derivative(
    x: &[f64],
    y: &[f64],
    y2: &[f64],
    idx: usize,
    xv: f64,
) -> (f64, f64) {
    let h = x[idx + 1] - x[idx];
    let a = (x[idx + 1] - xv) / h;
    let b = (xv - x[idx]) / h;
    let value = a * y[idx]
        + b * y[idx + 1]
        + ((a * a * a - a) * y2[idx] + (b * b * b - b) * y2[idx + 1]) * h * h / 6.0;
    let deriv = (y[idx + 1] - y[idx]) / h
        + ((3.0 * b * b - 1.0) * y2[idx + 1] - (3.0 * a * a - 1.0) * y2[idx]) * h / 6.0;
    (value, deriv)
}

/// Linear interpolation at `xv` inside interval `idx`.
pub fn linear_eval(x: &[f64], y: &[f64], idx: usize, xv: f64) -> f64 {
    let w = (xv - x[idx]) / (x[idx + 1] - x[idx]);
    y[idx] + w * (y[idx + 1] - y[idx])
}

/// First derivative of the spline at every node.
///
/// Interior nodes use the interval to their right; the last node uses the
/// interval to its left.
pub fn spline_derive(x: &[f64], y: &[f64], y2: &[f64]) -> Vec<f64> {
    let n = x.len();
    let mut dy = vec![0.0; n];
    for i in 0..n - 1 {
        let h = x[i + 1] - x[i];
        dy[i] = (y[i + 1] - y[i]) / h - h * (2.0 * y2[i] + y2[i + 1]) / 6.0;
    }
    let h = x[n - 1] - x[n - 2];
    dy[n - 1] = (y[n - 1] - y[n - 2]) / h + h * (2.0 * y2[n - 1] + y2[n - 2]) / 6.0;
    dy
}

/// Cumulative integral of the spline from the first node.
///
/// `out[i]` is the signed integral from `x[0]` to `x[i]`; for a decreasing
/// abscissa the interval contributions are negative.
pub fn spline_integrate_cumulative(x: &[f64], y: &[f64], y2: &[f64]) -> Vec<f64> {
    let n = x.len();
    let mut out = vec![0.0; n];
    for i in 0..n - 1 {
        let h = x[i + 1] - x[i];
        out[i + 1] = out[i] + h * (y[i] + y[i + 1]) / 2.0 - h * h * h * (y2[i] + y2[i + 1]) / 24.0;
    }
    out
}

/// Total integral of the spline over the full table.
pub fn spline_integrate_total(x: &[f64], y: &[f64], y2: &[f64]) -> f64 {
    let n = x.len();
    let mut total = 0.0;
    for i in 0..n - 1 {
        let h = x[i + 1] - x[i];
        total += h * (y[i] + y[i + 1]) / 2.0 - h * h * h * (y2[i] + y2[i + 1]) / 24.0;
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-9;

    fn cubic_table(n: usize) -> (Vec<f64>, Vec<f64>) {
        // f(x) = x^3 - 2x^2 + 0.5x + 1 on [0, 4]
        let x: Vec<f64> = (0..n).map(|i| 4.0 * i as f64 / (n - 1) as f64).collect();
        let y: Vec<f64> = x
            .iter()
            .map(|&v| v * v * v - 2.0 * v * v + 0.5 * v + 1.0)
            .collect();
        (x, y)
    }

    #[test]
    fn test_spline_reproduces_nodes() {
        let (x, y) = cubic_table(21);
        let y2 = spline_second_derivatives(&x, &y, SplineBoundary::EstimatedDerivatives);
        for i in 0..x.len() - 1 {
            let v = spline_eval(&x, &y, &y2, i, x[i]);
            assert!((v - y[i]).abs() < TOL);
        }
    }

    #[test]
    fn test_spline_interpolates_smooth_function() {
        let (x, y) = cubic_table(41);
        let y2 = spline_second_derivatives(&x, &y, SplineBoundary::EstimatedDerivatives);
        for &xv in &[0.05, 1.33, 2.71, 3.95] {
            let idx = interval_index(&x, xv);
            let v = spline_eval(&x, &y, &y2, idx, xv);
            let exact = xv * xv * xv - 2.0 * xv * xv + 0.5 * xv + 1.0;
            assert!((v - exact).abs() < 1e-3, "x={} v={} exact={}", xv, v, exact);
        }
    }

    #[test]
    fn test_spline_decreasing_abscissa() {
        let x: Vec<f64> = (0..30).map(|i| 10.0 - 0.3 * i as f64).collect();
        let y: Vec<f64> = x.iter().map(|&v| v * v).collect();
        let y2 = spline_second_derivatives(&x, &y, SplineBoundary::EstimatedDerivatives);
        let xv = 4.12;
        let idx = interval_index(&x, xv);
        assert!(x[idx] >= xv && xv >= x[idx + 1]);
        let v = spline_eval(&x, &y, &y2, idx, xv);
        assert!((v - xv * xv).abs() < 1e-4);
    }

    #[test]
    fn test_interval_index_closeby_sweep() {
        let x: Vec<f64> = (0..100).map(|i| i as f64).collect();
        let mut cursor = 0;
        for &xv in &[0.5, 10.2, 10.9, 42.0, 98.5] {
            cursor = interval_index_closeby(&x, xv, cursor);
            assert_eq!(cursor, interval_index(&x, xv));
        }
        // backwards sweep also works
        cursor = interval_index_closeby(&x, 3.5, cursor);
        assert_eq!(cursor, 3);
    }

    #[test]
    fn test_spline_derive_quadratic() {
        let x: Vec<f64> = (0..50).map(|i| 0.1 * i as f64).collect();
        let y: Vec<f64> = x.iter().map(|&v| 3.0 * v * v - v).collect();
        let y2 = spline_second_derivatives(&x, &y, SplineBoundary::EstimatedDerivatives);
        let dy = spline_derive(&x, &y, &y2);
        for (i, &xv) in x.iter().enumerate() {
            let exact = 6.0 * xv - 1.0;
            assert!(
                (dy[i] - exact).abs() < 1e-6,
                "i={} dy={} exact={}",
                i,
                dy[i],
                exact
            );
        }
    }

    #[test]
    fn test_spline_integrate_cumulative_sine() {
        let n = 200;
        let x: Vec<f64> = (0..n)
            .map(|i| std::f64::consts::PI * i as f64 / (n - 1) as f64)
            .collect();
        let y: Vec<f64> = x.iter().map(|&v| v.sin()).collect();
        let y2 = spline_second_derivatives(&x, &y, SplineBoundary::EstimatedDerivatives);
        let cumulative = spline_integrate_cumulative(&x, &y, &y2);
        // int_0^x sin = 1 - cos(x)
        for (i, &xv) in x.iter().enumerate() {
            assert!((cumulative[i] - (1.0 - xv.cos())).abs() < 1e-6);
        }
        let total = spline_integrate_total(&x, &y, &y2);
        assert!((total - 2.0).abs() < 1e-7);
    }

    #[test]
    fn test_cumulative_integral_signed_for_decreasing_axis() {
        let x: Vec<f64> = (0..50).map(|i| 5.0 - 0.1 * i as f64).collect();
        let y = vec![2.0; 50];
        let y2 = spline_second_derivatives(&x, &y, SplineBoundary::Natural);
        let cumulative = spline_integrate_cumulative(&x, &y, &y2);
        // integrating the constant 2 over a span of -4.9
        assert!((cumulative[49] + 9.8).abs() < TOL);
    }

    #[test]
    fn test_spline_eval_with_derivative_matches_nodes() {
        let (x, y) = cubic_table(25);
        let y2 = spline_second_derivatives(&x, &y, SplineBoundary::EstimatedDerivatives);
        let xv = 2.37;
        let idx = interval_index(&x, xv);
        let (v, d) = spline_eval_with_derivative(&x, &y, &y2, idx, xv);
        let exact = xv * xv * xv - 2.0 * xv * xv + 0.5 * xv + 1.0;
        let dexact = 3.0 * xv * xv - 4.0 * xv + 0.5;
        assert!((v - exact).abs() < 1e-3);
        assert!((d - dexact).abs() < 1e-2);
    }

    #[test]
    fn test_linear_eval() {
        let x = vec![0.0, 1.0, 2.0];
        let y = vec![0.0, 10.0, 40.0];
        assert!((linear_eval(&x, &y, 0, 0.5) - 5.0).abs() < TOL);
        assert!((linear_eval(&x, &y, 1, 1.5) - 25.0).abs() < TOL);
    }
}
