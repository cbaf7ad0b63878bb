//! Integration driver: evolves the coupled ionization/temperature system
//! across the approximation phases and deposits samples into the table.
//!
//! The stiff evolver owns time; the derivative function and the sample
//! sink own the workspace. Each phase interval re-initializes the evolved
//! state vector: variables entering the vector get their initial values
//! from the Saha expressions of the previous phase, variables already
//! evolved carry their final values across. When the reionization optical
//! depth is the input, the last interval runs inside a bisection over the
//! reionization redshift.

use std::cell::RefCell;
use std::sync::Arc;

use crate::background::{Background, DetailLevel};
use crate::config::{Engine, Precision, ReioInput, ReionizationConfig, ThermoConfig};
use crate::constants as cst;
use crate::error::ThermoError;
use crate::injection::EnergyInjection;
use crate::numerics::{
    spline_integrate_total, spline_second_derivatives, SplineBoundary,
};
use crate::phases::{Phase, PhaseSchedule};
use crate::recfast::{IonizationKernel, RecfastKernel};
use crate::reionization::ReionizationModel;
use crate::solver::{evolve, StiffOptions};
use crate::thermo::table::ThermoTable;

/// Scalars produced by the integration stage.
pub(crate) struct SolveResult {
    /// Reionization redshift (center of the CAMB-family tanh), when the
    /// scheme has one.
    pub z_reio: Option<f64>,
    /// Integrated reionization optical depth (0 without reionization).
    pub tau_reio: f64,
    /// Query-phase linear-interpolation threshold of the scheme.
    pub linear_interp_below: Option<f64>,
}

/// State-vector slots: the matter temperature is always evolved; helium
/// and hydrogen join in the later phases (built-in engine only).
const SLOT_TMAT: usize = 0;
const SLOT_X_HE: usize = 1;
const SLOT_X_H: usize = 2;

fn vector_len(phase: Phase, external: bool) -> usize {
    if external {
        return 1;
    }
    match (phase.evolves_hydrogen(), phase.evolves_helium()) {
        (true, _) => 3,
        (false, true) => 2,
        (false, false) => 1,
    }
}

/// Everything the derivative function and the sink need, plus the lagged
/// diagnostics they exchange.
struct Driver<'a, B: Background + ?Sized> {
    background: &'a B,
    table: &'a mut ThermoTable,
    kernel: RecfastKernel,
    external: Option<Arc<dyn IonizationKernel + Send + Sync>>,
    injection: EnergyInjection,
    reio: ReionizationModel,
    schedule: PhaseSchedule,
    phase: Phase,
    f_he: f64,
    n_h0: f64,
    t_cmb: f64,
    h0_si: f64,
    y_he: f64,
    tight_coupling_trigger: f64,
    /// Matter-temperature derivative in +z from the previous evaluation.
    d_tmat_dz: f64,
    /// Next table row the sink writes (decreasing).
    next_row: usize,
}

impl<'a, B: Background + ?Sized> Driver<'a, B> {
    /// Composite ionization state for the derivative function.
    /// Returns `(x, dx_dz)` and fills the evolved slots of `dy` (+z
    /// direction).
    fn ionization_derivs(
        &mut self,
        z: f64,
        hz: f64,
        t_mat: f64,
        t_rad: f64,
        n: f64,
        energy_rate: f64,
        y: &[f64],
        dy: &mut [f64],
    ) -> Result<(f64, f64), ThermoError> {
        if let Some(kernel) = &self.external {
            if self.phase == Phase::Brec {
                return Ok((1.0 + 2.0 * self.f_he, 0.0));
            }
            let (x_res, dx_dlna) = kernel.x_e(z, hz, t_mat, t_rad, energy_rate)?;
            let dx_res = -dx_dlna / (1.0 + z);
            if self.phase == Phase::Reionization {
                let (x, dx_scheme) = self.reio.x_at(z, x_res)?;
                return Ok((x, dx_scheme + dx_res));
            }
            return Ok((x_res, dx_res));
        }

        let dt_mat = self.d_tmat_dz;
        match self.phase {
            Phase::Brec => {
                let s = self.kernel.saha_fully_ionized();
                Ok((s.x, s.dx))
            }
            Phase::HeliumOne => {
                let s = self.kernel.saha_first_helium(z, t_mat, dt_mat);
                Ok((s.x, s.dx))
            }
            Phase::HeliumOneDone => {
                let s = self.kernel.saha_helium_plateau();
                Ok((s.x, s.dx))
            }
            Phase::HeliumTwo => {
                let s = self.kernel.saha_second_helium(z, t_mat, dt_mat);
                Ok((s.x, s.dx))
            }
            Phase::Hydrogen => {
                let (x_h, dx_h) = self.kernel.saha_hydrogen(z, t_mat, dt_mat);
                let x_he = y[SLOT_X_HE];
                let x = x_h + self.f_he * x_he;
                let dx_he = self
                    .kernel
                    .dx_he_dz(x_he, x, x_h, n, z, hz, t_mat, t_rad, energy_rate);
                dy[SLOT_X_HE] = dx_he;
                Ok((x, dx_h + self.f_he * dx_he))
            }
            Phase::FullRecombination | Phase::Reionization => {
                let x_he = y[SLOT_X_HE];
                let x_h = y[SLOT_X_H];
                let x_res = x_h + self.f_he * x_he;
                let dx_h = self
                    .kernel
                    .dx_h_dz(x_h, x_res, n, z, hz, t_mat, t_rad, energy_rate);
                let dx_he = self
                    .kernel
                    .dx_he_dz(x_he, x_res, x_h, n, z, hz, t_mat, t_rad, energy_rate);
                dy[SLOT_X_H] = dx_h;
                dy[SLOT_X_HE] = dx_he;
                let dx_res = dx_h + self.f_he * dx_he;
                if self.phase == Phase::Reionization {
                    // reionization rides on top of the live residual
                    let (x, dx_scheme) = self.reio.x_at(z, x_res)?;
                    Ok((x, dx_scheme + dx_res))
                } else {
                    Ok((x_res, dx_res))
                }
            }
        }
    }

    /// Derivative function handed to the stiff evolver (time variable is
    /// minus redshift, so every derivative is negated on the way out).
    fn derivs(&mut self, mz: f64, y: &[f64], dy: &mut [f64]) -> Result<(), ThermoError> {
        let z = -mz;
        let tau = self.background.tau_of_z(z)?;
        let point = self.background.at_tau(tau, DetailLevel::Short)?;
        let hz = point.h * cst::C / cst::MPC_OVER_M;
        let n = self.n_h0 * (1.0 + z).powi(3);
        let t_rad = self.t_cmb * (1.0 + z);
        let t_mat = y[SLOT_TMAT];
        let energy_rate = self.injection.rate(z);

        dy.fill(0.0);
        let (x, dx) = self.ionization_derivs(z, hz, t_mat, t_rad, n, energy_rate, y, dy)?;

        // Matter temperature. In the tightly coupled regime the two terms
        // of the full equation cancel to many digits, so the first-order
        // steady-state expansion around T_mat = T_rad is evaluated
        // instead. Keep the exact expansion form.
        let r_g = cst::COMPTON_COUPLING * t_rad.powi(4);
        let time_thomson = (1.0 / r_g) * (1.0 + x + self.f_he) / x;
        let time_hubble = 2.0 / (3.0 * self.h0_si * (1.0 + z).powf(1.5));

        if time_thomson < self.tight_coupling_trigger * time_hubble {
            let dh_dz = -point.h_prime / point.h * cst::C / cst::MPC_OVER_M;
            let eps = hz * (1.0 + x + self.f_he) / (r_g / t_rad * x);
            let dlneps_dz = dh_dz / hz
                - ((1.0 + self.f_he) / (1.0 + self.f_he + x)) * (dx / x)
                - 3.0 / (1.0 + z);
            dy[SLOT_TMAT] = self.t_cmb - eps * dlneps_dz;
        } else {
            dy[SLOT_TMAT] = r_g * x / (1.0 + x + self.f_he) * (t_mat - t_rad)
                / (hz * (1.0 + z))
                + 2.0 * t_mat / (1.0 + z)
                - 2.0 / (3.0 * cst::K_B) * energy_rate * crate::recfast::chi_heat(x)
                    / n
                    / (1.0 + self.f_he + x)
                    / (hz * (1.0 + z));
        }

        self.d_tmat_dz = dy[SLOT_TMAT];

        // the evolver runs in -z
        for v in dy.iter_mut() {
            *v = -*v;
        }
        Ok(())
    }

    /// Recorded electron fraction for a sample at z, as prescribed by
    /// `phase` (used both for the live phase and, during the smoothing
    /// overlap, for the previous one).
    fn x_for_phase(
        &mut self,
        phase: Phase,
        z: f64,
        t_mat: f64,
        dt_mat: f64,
        y: &[f64],
    ) -> Result<f64, ThermoError> {
        if let Some(kernel) = &self.external {
            if phase == Phase::Brec {
                return Ok(1.0 + 2.0 * self.f_he);
            }
            let tau = self.background.tau_of_z(z)?;
            let point = self.background.at_tau(tau, DetailLevel::Short)?;
            let hz = point.h * cst::C / cst::MPC_OVER_M;
            let t_rad = self.t_cmb * (1.0 + z);
            let energy_rate = self.injection.rate(z);
            let (x_res, _) = kernel.x_e(z, hz, t_mat, t_rad, energy_rate)?;
            if phase == Phase::Reionization {
                let (x, _) = self.reio.x_at(z, x_res)?;
                return Ok(x);
            }
            return Ok(x_res);
        }

        match phase {
            Phase::Brec => Ok(self.kernel.saha_fully_ionized().x),
            Phase::HeliumOne => Ok(self.kernel.saha_first_helium(z, t_mat, dt_mat).x),
            Phase::HeliumOneDone => Ok(self.kernel.saha_helium_plateau().x),
            Phase::HeliumTwo => Ok(self.kernel.saha_second_helium(z, t_mat, dt_mat).x),
            Phase::Hydrogen => {
                let (x_h, _) = self.kernel.saha_hydrogen(z, t_mat, dt_mat);
                Ok(x_h + self.f_he * y[SLOT_X_HE])
            }
            Phase::FullRecombination => Ok(y[SLOT_X_H] + self.f_he * y[SLOT_X_HE]),
            Phase::Reionization => {
                let x_res = y[SLOT_X_H] + self.f_he * y[SLOT_X_HE];
                Ok(self.reio.x_at(z, x_res)?.0)
            }
        }
    }

    /// Sample sink: reconstructs the electron fraction at an output
    /// redshift, applies the cross-phase smoothing, and writes one table
    /// row (x_e, T_b, c_b^2, dkappa/dtau).
    fn store(&mut self, mz: f64, y: &[f64], dy: &[f64]) -> Result<(), ThermoError> {
        let z = -mz;
        let t_mat = y[SLOT_TMAT];
        let dt_mat_mz = dy[SLOT_TMAT];
        // +z direction for the analytic expressions
        let dt_mat = -dt_mat_mz;

        let mut x = self.x_for_phase(self.phase, z, t_mat, dt_mat, y)?;

        // blend with the previous phase's prescription inside the overlap
        // window (built-in engine: the analytic expressions exist there)
        if self.external.is_none() {
            if let Some((weight, previous)) = self.schedule.smoothing(self.phase, z) {
                let x_previous = self.x_for_phase(previous, z, t_mat, dt_mat, y)?;
                x = weight * x + (1.0 - weight) * x_previous;
            }
        }

        let row = self.next_row;
        self.next_row = row.saturating_sub(1);

        let layout = self.table.layout;
        self.table.set(row, layout.xe, x);
        self.table.set(row, layout.tb, t_mat);

        // c_b^2 = (k_B / mu c^2) T_b (1 + (1+z)/3 dln T_b/dz)
        let mu_inv = 1.0 + (1.0 / cst::NOT4 - 1.0) * self.y_he + x * (1.0 - self.y_he);
        let cb2 = cst::K_B / (cst::C * cst::C * cst::M_H)
            * mu_inv
            * t_mat
            * (1.0 - (1.0 + z) * dt_mat_mz / t_mat / 3.0);
        self.table.set(row, layout.cb2, cb2);

        // dkappa/dtau = a n_e x_e sigma_T in 1/Mpc
        self.table.set(
            row,
            layout.dkappa,
            (1.0 + z) * (1.0 + z) * self.n_h0 * x * cst::SIGMA_T * cst::MPC_OVER_M,
        );
        Ok(())
    }
}

/// Integrated optical depth from today up to the reionization start, by
/// splining dkappa/dtau against conformal time and integrating.
fn reionization_optical_depth(
    table: &ThermoTable,
    z_start: f64,
) -> Result<f64, ThermoError> {
    let n = table.n_rows();
    let mut end = 0;
    while table.z[end] < z_start {
        end += 1;
        if end == n {
            return Err(ThermoError::guard(format!(
                "reionization start z = {} beyond the largest tabulated redshift",
                z_start
            )));
        }
    }
    if end < 3 {
        return Err(ThermoError::guard(
            "too few samples below the reionization start to integrate the optical depth",
        ));
    }

    let tau = &table.tau[0..end];
    let dkappa: Vec<f64> = (0..end)
        .map(|row| table.get(row, table.layout.dkappa))
        .collect();
    let dd = spline_second_derivatives(tau, &dkappa, SplineBoundary::EstimatedDerivatives);
    // the tau axis decreases with the index, flip the sign back
    Ok(-spline_integrate_total(tau, &dkappa, &dd))
}

/// Solve recombination and reionization, filling the x_e, T_b, c_b^2 and
/// dkappa columns of the table.
pub(crate) fn solve<B: Background + ?Sized>(
    precision: &Precision,
    background: &B,
    config: &ThermoConfig,
    y_he: f64,
    table: &mut ThermoTable,
) -> Result<SolveResult, ThermoError> {
    let f_he = y_he / (cst::NOT4 * (1.0 - y_he));
    let t_cmb = background.t_cmb();
    let h0_si = background.h0() * cst::C / cst::MPC_OVER_M;
    // hydrogen nuclei today [1/m^3]
    let n_h0 = 3.0 * h0_si * h0_si * background.omega0_b()
        / (8.0 * std::f64::consts::PI * cst::G * cst::M_H)
        * (1.0 - y_he);

    let external = match &config.engine {
        Engine::Recfast => None,
        Engine::External(kernel) => Some(kernel.clone()),
    };

    let schedule = PhaseSchedule::new(precision);
    let reio = ReionizationModel::new(&config.reionization, f_he, precision)?;
    let injection = EnergyInjection::new(
        &config.injection,
        h0_si,
        n_h0,
        background.omega0_b(),
        background.omega0_cdm(),
    );

    let n = table.n_rows();
    // integration runs in minus z, from -z_initial towards 0
    let mz: Vec<f64> = (0..n).map(|i| -table.z[n - 1 - i]).collect();

    // interval limits: start of integration, then each phase's end
    let mut limits = Vec::with_capacity(Phase::ALL.len() + 1);
    limits.push(mz[0]);
    for phase in Phase::ALL {
        limits.push(-schedule.z_end(phase));
    }

    let z_initial = -mz[0];
    let driver = RefCell::new(Driver {
        background,
        table,
        kernel: RecfastKernel::new(precision, f_he, n_h0),
        external,
        injection,
        reio,
        schedule,
        phase: Phase::Brec,
        f_he,
        n_h0,
        t_cmb,
        h0_si,
        y_he,
        tight_coupling_trigger: precision.tight_coupling_trigger,
        d_tmat_dz: t_cmb,
        next_row: n - 1,
    });

    let options = StiffOptions {
        rtol: precision.tol_thermo_integration,
        ..Default::default()
    };

    // initial conditions: matter locked to radiation
    let mut y = vec![t_cmb * (1.0 + z_initial)];
    let mut out_pos = 0usize;

    for (k, &phase) in Phase::ALL.iter().enumerate() {
        let mz_start = limits[k];
        let mz_end = limits[k + 1];

        // outputs inside (start, end]; the very first interval also
        // serves its own starting point
        let out_start = out_pos;
        while out_pos < n && mz[out_pos] <= mz_end {
            out_pos += 1;
        }
        let outputs = &mz[out_start..out_pos];

        // re-initialize the state vector across the transition
        {
            let mut d = driver.borrow_mut();
            d.phase = phase;
            d.next_row = n - 1 - out_start;
            let is_external = d.external.is_some();
            let new_len = vector_len(phase, is_external);
            if new_len > y.len() {
                let z_switch = -mz_start;
                let t_mat = y[SLOT_TMAT];
                let dt_mat = d.d_tmat_dz;
                if new_len == 2 {
                    // helium joins: Saha value of the closing phase
                    let saha = d.kernel.saha_second_helium(z_switch, t_mat, dt_mat);
                    y.push(saha.x_he);
                } else {
                    // hydrogen joins too
                    let (x_h, _) = d.kernel.saha_hydrogen(z_switch, t_mat, dt_mat);
                    y.push(x_h);
                }
            }
        }

        let run_interval = |y0: &[f64]| -> Result<Vec<f64>, ThermoError> {
            evolve(
                |t, y, dy| driver.borrow_mut().derivs(t, y, dy),
                mz_start,
                mz_end,
                y0,
                outputs,
                |t, y, dy| driver.borrow_mut().store(t, y, dy),
                &options,
            )
        };

        let is_tau_target =
            phase == Phase::Reionization && config.reionization.targets_optical_depth();

        if !is_tau_target {
            y = run_interval(&y)?;
            continue;
        }

        // bisect the reionization redshift to match the target depth
        let tau_target = match &config.reionization {
            ReionizationConfig::Camb {
                input: ReioInput::OpticalDepth(tau),
                ..
            }
            | ReionizationConfig::HalfTanh {
                input: ReioInput::OpticalDepth(tau),
                ..
            } => *tau,
            _ => unreachable!("targets_optical_depth checked above"),
        };

        let y_saved = y.clone();
        let d_tmat_saved = driver.borrow().d_tmat_dz;
        let restore = |d: &mut Driver<'_, B>| {
            d.d_tmat_dz = d_tmat_saved;
            d.next_row = n - 1 - out_start;
        };

        // upper bracket: the widest allowed reionization
        let mut z_sup = driver.borrow().reio.z_reio().ok_or_else(|| {
            ThermoError::guard("optical-depth target requires a CAMB-family scheme")
        })?;
        run_interval(&y_saved)?;
        let mut tau_sup = {
            let d = driver.borrow();
            reionization_optical_depth(&*d.table, d.reio.z_start)?
        };
        if tau_sup < tau_target {
            return Err(ThermoError::domain(format!(
                "target tau_reio = {} cannot be reached with reionization starting \
                 below z = {} (got tau = {})",
                tau_target, precision.reionization_z_start_max, tau_sup
            )));
        }

        let mut z_inf = 0.0;
        let mut tau_inf = 0.0;
        let mut counter = 0usize;

        while (tau_sup - tau_inf) > tau_target * precision.reionization_optical_depth_tol {
            let z_mid = 0.5 * (z_sup + z_inf);
            {
                let mut d = driver.borrow_mut();
                d.reio.set_redshift(z_mid)?;
                restore(&mut d);
            }
            run_interval(&y_saved)?;
            let tau_mid = {
                let d = driver.borrow();
                reionization_optical_depth(&*d.table, d.reio.z_start)?
            };

            if tau_mid > tau_target {
                z_sup = z_mid;
                tau_sup = tau_mid;
            } else {
                z_inf = z_mid;
                tau_inf = tau_mid;
            }

            counter += 1;
            if counter > precision.reionization_max_iterations {
                return Err(ThermoError::convergence(format!(
                    "optical-depth bisection exceeded {} iterations \
                     (bracket [{:.6}, {:.6}])",
                    precision.reionization_max_iterations, z_inf, z_sup
                )));
            }
        }

        let d = driver.borrow();
        return Ok(SolveResult {
            z_reio: d.reio.z_reio(),
            tau_reio: tau_target,
            linear_interp_below: d.reio.linear_interp_below(),
        });
    }

    // reionization given by redshift (or absent): report the integrated
    // optical depth of the final history
    let d = driver.borrow();
    let tau_reio = if d.reio.is_none() {
        0.0
    } else {
        reionization_optical_depth(&*d.table, d.reio.z_start)?
    };
    Ok(SolveResult {
        z_reio: d.reio.z_reio(),
        tau_reio,
        linear_interp_below: d.reio.linear_interp_below(),
    })
}
