//! Variable-order backward-differentiation integrator for stiff systems.
//!
//! The integrator keeps a short history of accepted `(t, y)` points and at
//! each step solves the implicit collocation condition
//!
//! ```text
//! P'(t_new) = f(t_new, y_new)
//! ```
//!
//! where `P` is the interpolating polynomial through the retained history
//! and the new point. Written in Lagrange form this is the variable-step
//! BDF formula of order equal to the history length (1 through 5). The
//! nonlinear equation is solved by a damped Newton iteration with a
//! forward-difference Jacobian; the local error is estimated from the
//! predictor-corrector difference and controls both the step size and the
//! order ramp-up.
//!
//! Requested output points are served by cubic Hermite interpolation
//! between accepted steps; the sink additionally receives the exact RHS at
//! the interpolated state so downstream consumers see a consistent
//! derivative.

use nalgebra::{DMatrix, DVector};

use crate::error::ThermoError;

/// Highest BDF order used (BDF-6 is not zero-stable enough in practice).
const MAX_ORDER: usize = 5;

/// Newton iterations per step attempt.
const MAX_NEWTON_ITER: usize = 6;

/// Tolerances and limits for [`evolve`].
#[derive(Clone, Copy, Debug)]
pub struct StiffOptions {
    /// Relative tolerance on the local error.
    pub rtol: f64,
    /// Absolute tolerance floor entering the error weights.
    pub abstol: f64,
    /// Hard cap on accepted + rejected steps.
    pub max_steps: usize,
    /// Initial step size as a fraction of the integration span.
    pub first_step_fraction: f64,
}

impl Default for StiffOptions {
    fn default() -> Self {
        Self {
            rtol: 1.0e-2,
            abstol: 1.0e-12,
            max_steps: 100_000,
            first_step_fraction: 1.0e-6,
        }
    }
}

/// Derivative weights `l_j'(t_eval)` of the Lagrange basis over `nodes`,
/// evaluated at the last node.
fn lagrange_derivative_weights(nodes: &[f64]) -> Vec<f64> {
    let m = nodes.len();
    let t_eval = nodes[m - 1];
    let mut w = vec![0.0; m];

    // weight of the evaluation node itself
    w[m - 1] = (0..m - 1).map(|i| 1.0 / (t_eval - nodes[i])).sum();

    // remaining nodes: product formula for l_j'(t_eval), t_eval being a node
    for j in 0..m - 1 {
        let mut num = 1.0;
        let mut den = 1.0;
        for i in 0..m {
            if i == j {
                continue;
            }
            if i != m - 1 {
                num *= t_eval - nodes[i];
            }
            den *= nodes[j] - nodes[i];
        }
        w[j] = num / den;
    }
    w
}

/// Lagrange extrapolation of the history polynomial to `t_eval`.
fn lagrange_extrapolate(times: &[f64], values: &[Vec<f64>], t_eval: f64, out: &mut [f64]) {
    let m = times.len();
    out.fill(0.0);
    for j in 0..m {
        let mut basis = 1.0;
        for i in 0..m {
            if i != j {
                basis *= (t_eval - times[i]) / (times[j] - times[i]);
            }
        }
        for (o, v) in out.iter_mut().zip(values[j].iter()) {
            *o += basis * v;
        }
    }
}

/// Cubic Hermite interpolation between two accepted steps.
fn hermite(
    t0: f64,
    y0: &[f64],
    dy0: &[f64],
    t1: f64,
    y1: &[f64],
    dy1: &[f64],
    t: f64,
    out: &mut [f64],
) {
    let h = t1 - t0;
    let s = (t - t0) / h;
    let h00 = (1.0 + 2.0 * s) * (1.0 - s) * (1.0 - s);
    let h10 = s * (1.0 - s) * (1.0 - s);
    let h01 = s * s * (3.0 - 2.0 * s);
    let h11 = s * s * (s - 1.0);
    for i in 0..out.len() {
        out[i] = h00 * y0[i] + h10 * h * dy0[i] + h01 * y1[i] + h11 * h * dy1[i];
    }
}

/// Weighted rms norm with weights `abstol + rtol * |y_ref|`.
fn wrms(err: &[f64], y_ref: &[f64], opts: &StiffOptions) -> f64 {
    let mut acc = 0.0;
    for i in 0..err.len() {
        let wt = opts.abstol + opts.rtol * y_ref[i].abs();
        let e = err[i] / wt;
        acc += e * e;
    }
    (acc / err.len() as f64).sqrt()
}

/// Integrate `dy/dt = f(t, y)` from `t_ini` to `t_end` (`t_end > t_ini`).
///
/// `outputs` must be sorted increasing within `[t_ini, t_end]`; the sink is
/// invoked once per output point, in order, with `(t, y, dy)`. Returns the
/// state at `t_end`.
pub fn evolve<F, S>(
    mut rhs: F,
    t_ini: f64,
    t_end: f64,
    y0: &[f64],
    outputs: &[f64],
    mut sink: S,
    opts: &StiffOptions,
) -> Result<Vec<f64>, ThermoError>
where
    F: FnMut(f64, &[f64], &mut [f64]) -> Result<(), ThermoError>,
    S: FnMut(f64, &[f64], &[f64]) -> Result<(), ThermoError>,
{
    let dim = y0.len();
    let span = t_end - t_ini;
    debug_assert!(span > 0.0);

    let mut y = y0.to_vec();
    let mut dy = vec![0.0; dim];
    rhs(t_ini, &y, &mut dy)?;

    // Serve output points sitting exactly on the interval start.
    let mut next_output = 0usize;
    while next_output < outputs.len() && outputs[next_output] <= t_ini {
        sink(outputs[next_output], &y, &dy)?;
        next_output += 1;
    }

    // History of accepted points, most recent last.
    let mut hist_t: Vec<f64> = vec![t_ini];
    let mut hist_y: Vec<Vec<f64>> = vec![y.clone()];

    let mut order = 1usize;
    let mut h = span * opts.first_step_fraction;
    let h_min = span * 1.0e-14;

    let mut t = t_ini;
    let mut dy_prev = dy.clone();
    let mut n_steps = 0usize;
    let mut rejects_in_a_row = 0usize;
    let mut accepted_since_raise = 0usize;

    let mut y_pred = vec![0.0; dim];
    let mut f_new = vec![0.0; dim];
    let mut f_pert = vec![0.0; dim];

    while t_end - t > h_min {
        n_steps += 1;
        if n_steps > opts.max_steps {
            return Err(ThermoError::convergence(format!(
                "stiff evolver exceeded {} steps at t = {:.6e}",
                opts.max_steps, t
            )));
        }
        if h < h_min {
            return Err(ThermoError::convergence(format!(
                "stiff evolver step size underflow at t = {:.6e}",
                t
            )));
        }

        h = h.min(t_end - t);
        let t_new = t + h;

        // Effective order is limited by available history.
        let k = order.min(hist_t.len());
        let first = hist_t.len() - k;
        let times = &hist_t[first..];
        let values = &hist_y[first..];

        // Predictor and BDF weights over (history nodes, t_new).
        lagrange_extrapolate(times, values, t_new, &mut y_pred);
        let mut nodes = times.to_vec();
        nodes.push(t_new);
        let w = lagrange_derivative_weights(&nodes);
        let w_new = w[k];

        // b = sum over history of w_j y_j
        let mut b = vec![0.0; dim];
        for j in 0..k {
            for i in 0..dim {
                b[i] += w[j] * values[j][i];
            }
        }

        // Forward-difference Jacobian at the predictor. RHS failures are
        // fatal (no local retry): the derivative function only errors on
        // genuine collaborator failures.
        let mut y_new = y_pred.clone();
        rhs(t_new, &y_new, &mut f_new)?;
        let mut jac = DMatrix::zeros(dim, dim);
        for j in 0..dim {
            let delta = f64::EPSILON.sqrt() * (y_new[j].abs() + opts.abstol + opts.rtol);
            let saved = y_new[j];
            y_new[j] = saved + delta;
            rhs(t_new, &y_new, &mut f_pert)?;
            y_new[j] = saved;
            for i in 0..dim {
                jac[(i, j)] = (f_pert[i] - f_new[i]) / delta;
            }
        }

        // Iteration matrix A = w_new I - J.
        let mut a = -jac;
        for i in 0..dim {
            a[(i, i)] += w_new;
        }
        let lu = a.lu();

        // Newton iteration on F(y) = w_new y + b - f(t_new, y).
        let mut converged = false;
        for _ in 0..MAX_NEWTON_ITER {
            let mut residual = DVector::zeros(dim);
            for i in 0..dim {
                residual[i] = -(w_new * y_new[i] + b[i] - f_new[i]);
            }
            let delta = match lu.solve(&residual) {
                Some(d) => d,
                None => break,
            };
            for i in 0..dim {
                y_new[i] += delta[i];
            }
            let delta_norm = wrms(delta.as_slice(), &y_new, opts);
            rhs(t_new, &y_new, &mut f_new)?;
            if delta_norm < 0.05 {
                converged = true;
                break;
            }
        }
        if !converged {
            h *= 0.25;
            rejects_in_a_row += 1;
            if rejects_in_a_row > 3 {
                order = 1;
            }
            continue;
        }

        // Local error from the predictor-corrector difference.
        let err_vec: Vec<f64> = (0..dim).map(|i| y_new[i] - y_pred[i]).collect();
        let err = wrms(&err_vec, &y_new, opts) / (k + 1) as f64;

        if !err.is_finite() || err > 1.0 {
            let err = if err.is_finite() { err } else { 1.0e6 };
            rejects_in_a_row += 1;
            let factor = (0.5 * err.powf(-1.0 / (k + 1) as f64)).clamp(0.1, 0.5);
            h *= factor;
            if rejects_in_a_row > 3 {
                order = 1;
                let last_t = *hist_t.last().unwrap();
                let last_y = hist_y.last().unwrap().clone();
                hist_t = vec![last_t];
                hist_y = vec![last_y];
            }
            continue;
        }

        // Accepted: serve outputs inside (t, t_new] by Hermite interpolation.
        let mut y_out = vec![0.0; dim];
        let mut dy_out = vec![0.0; dim];
        while next_output < outputs.len() && outputs[next_output] <= t_new {
            let t_out = outputs[next_output];
            hermite(t, &y, &dy_prev, t_new, &y_new, &f_new, t_out, &mut y_out);
            rhs(t_out, &y_out, &mut dy_out)?;
            sink(t_out, &y_out, &dy_out)?;
            next_output += 1;
        }

        t = t_new;
        y.copy_from_slice(&y_new);
        dy_prev.copy_from_slice(&f_new);
        hist_t.push(t);
        hist_y.push(y.clone());
        if hist_t.len() > MAX_ORDER + 1 {
            hist_t.remove(0);
            hist_y.remove(0);
        }

        rejects_in_a_row = 0;
        accepted_since_raise += 1;
        if order < MAX_ORDER && accepted_since_raise > order {
            order += 1;
            accepted_since_raise = 0;
        }

        let factor = (0.9 * err.max(1.0e-10).powf(-1.0 / (k + 1) as f64)).clamp(0.2, 2.5);
        h *= factor;
    }

    // Serve any output points left at the interval end (within rounding).
    rhs(t, &y, &mut dy)?;
    while next_output < outputs.len() && outputs[next_output] <= t_end {
        sink(outputs[next_output], &y, &dy)?;
        next_output += 1;
    }
    Ok(y)
}
