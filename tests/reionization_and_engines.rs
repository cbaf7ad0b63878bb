//! Scheme-specific reionization histories, the BBN helium path, the
//! optional table columns and the external-engine plumbing.

use std::io::Write;
use std::sync::Arc;

use recomb_rs::numerics::{
    interval_index, spline_eval_with_derivative, spline_second_derivatives, SplineBoundary,
};
use recomb_rs::{
    helium_from_bbn, BbnTable, Engine, HeliumSetting, InterpolationMode, IonizationKernel,
    LcdmBackground, Precision, ReionizationConfig, Thermodynamics, ThermoConfig, ThermoError,
};
use tempfile::NamedTempFile;

fn background() -> LcdmBackground {
    LcdmBackground::new(0.0224, 0.120, 0.67, 2.7255, 3.046)
}

fn precision() -> Precision {
    Precision::reduced()
}

fn compute_with(background: &LcdmBackground, config: &ThermoConfig) -> Thermodynamics {
    Thermodynamics::compute(&precision(), background, config).expect("compute")
}

fn xe_today(thermo: &Thermodynamics) -> f64 {
    let mut cursor = 0;
    thermo
        .at_z(0.0, InterpolationMode::Normal, &mut cursor, None)
        .unwrap()
        .xe
}

// =============================================================================
// Reionization schemes end to end
// =============================================================================

#[test]
fn test_many_tanh_two_jumps() {
    let bg = background();
    let config = ThermoConfig::default().with_reionization(ReionizationConfig::ManyTanh {
        z: vec![3.5, 7.0],
        xe: vec![-2.0, -1.0],
        width: 0.5,
    });
    let thermo = compute_with(&bg, &config);
    let f_he = thermo.f_he;

    // today: hydrogen plus doubly reionized helium
    let today = xe_today(&thermo);
    assert!(
        (today - (1.0 + 2.0 * f_he)).abs() < 0.01,
        "x_e(0) = {} vs {}",
        today,
        1.0 + 2.0 * f_he
    );

    // between the jumps: the after-first-helium level
    let mut cursor = 0;
    let mid = thermo
        .at_z(5.0, InterpolationMode::Normal, &mut cursor, None)
        .unwrap();
    assert!(
        (mid.xe - (1.0 + f_he)).abs() < 0.03,
        "x_e(5) = {} vs {}",
        mid.xe,
        1.0 + f_he
    );

    assert!(thermo.tau_reio > 0.02 && thermo.tau_reio < 0.12);
}

#[test]
fn test_half_tanh_reaches_hydrogen_only() {
    let bg = background();
    let config = ThermoConfig::default().with_reionization(ReionizationConfig::HalfTanh {
        input: recomb_rs::ReioInput::Redshift(7.0),
        exponent: 1.5,
        width: 0.5,
    });
    let thermo = compute_with(&bg, &config);

    let today = xe_today(&thermo);
    assert!((today - 1.0).abs() < 0.01, "x_e(0) = {}", today);

    // queries below 2 z_reio go through the linear branch; across the
    // tanh itself the history falls monotonically with z
    let mut cursor = 0;
    let mut previous = today;
    for i in 1..30 {
        let z = 6.5 * i as f64 / 29.0;
        let point = thermo
            .at_z(z, InterpolationMode::Closeby, &mut cursor, None)
            .unwrap();
        assert!(point.xe <= previous + 1e-6, "x_e not falling at z = {}", z);
        previous = point.xe;
    }
}

#[test]
fn test_inter_scheme_piecewise_linear_history() {
    let bg = background();
    let config = ThermoConfig::default().with_reionization(ReionizationConfig::Inter {
        z: vec![0.0, 3.0, 6.0, 10.0],
        xe: vec![-2.0, -1.0, 1.0, 0.0],
    });
    let thermo = compute_with(&bg, &config);

    // midway between the 6.0 node (x_e = 1) and the residual slot
    let mut cursor = 0;
    let point = thermo
        .at_z(8.0, InterpolationMode::Normal, &mut cursor, None)
        .unwrap();
    assert!(
        point.xe > 0.45 && point.xe < 0.55,
        "x_e(8) = {}",
        point.xe
    );

    let today = xe_today(&thermo);
    assert!((today - (1.0 + 2.0 * thermo.f_he)).abs() < 0.01);
}

#[test]
fn test_bins_tanh_history() {
    let bg = background();
    let config = ThermoConfig::default().with_reionization(ReionizationConfig::BinsTanh {
        z: vec![8.0, 12.0],
        xe: vec![0.8, 0.2],
        sharpness: 0.3,
    });
    let thermo = compute_with(&bg, &config);

    let mut cursor = 0;
    let at_8 = thermo
        .at_z(8.0, InterpolationMode::Normal, &mut cursor, None)
        .unwrap();
    let at_12 = thermo
        .at_z(12.0, InterpolationMode::Normal, &mut cursor, None)
        .unwrap();
    assert!(at_8.xe > at_12.xe);
    assert!(thermo.tau_reio > 0.0);
}

// =============================================================================
// Optional columns
// =============================================================================

#[test]
fn test_damping_scale_and_cb2_derivatives() {
    let bg = background();
    let config = ThermoConfig::default()
        .with_reionization(ReionizationConfig::camb_with_z(7.67))
        .with_damping_scale()
        .with_cb2_derivatives();
    let thermo = compute_with(&bg, &config);

    // Silk scale at recombination is a few tens of Mpc
    let rd_rec = thermo.rd_rec.expect("damping scale requested");
    assert!(rd_rec > 20.0 && rd_rec < 80.0, "r_d(rec) = {}", rd_rec);

    // damping accumulates with time: r_d falls with growing z
    let table = &thermo.table;
    let col = table.layout.r_d.unwrap();
    let early = table.get(table.n_rows() - 1, col);
    let late = table.get(0, col);
    assert!(early < rd_rec && rd_rec < late);

    // sound-speed derivatives populated and finite
    let mut cursor = 0;
    let point = thermo
        .at_z(900.0, InterpolationMode::Normal, &mut cursor, None)
        .unwrap();
    let dcb2 = point.dcb2.expect("dcb2 requested");
    assert!(dcb2.is_finite());
    assert!(point.ddcb2.unwrap().is_finite());
    assert!(point.r_d.unwrap() > 0.0);
}

// =============================================================================
// BBN helium
// =============================================================================

const BBN_TABLE: &str = "\
# omega_b  DeltaN  YHe  (coarse standard-BBN grid)
3 3
0.018 -1.0 0.2315
0.022 -1.0 0.2337
0.026 -1.0 0.2357
0.018 0.0 0.2445
0.022 0.0 0.2467
0.026 0.0 0.2487
0.018 1.0 0.2575
0.022 1.0 0.2597
0.026 1.0 0.2617
";

#[test]
fn test_helium_from_bbn_standard_value() {
    let bg = LcdmBackground::new(0.022, 0.120, 0.67, 2.7255, 3.046);
    let table = BbnTable::parse(BBN_TABLE).unwrap();
    let y_he = helium_from_bbn(&table, &bg).unwrap();
    assert!(
        y_he > 0.245 && y_he < 0.250,
        "BBN helium fraction = {}",
        y_he
    );
}

#[test]
fn test_compute_with_bbn_helium() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{}", BBN_TABLE).unwrap();

    let bg = LcdmBackground::new(0.022, 0.120, 0.67, 2.7255, 3.046);
    let config = ThermoConfig::default()
        .with_helium(HeliumSetting::Bbn(file.path().to_path_buf()))
        .with_reionization(ReionizationConfig::camb_with_z(7.67));
    let thermo = compute_with(&bg, &config);

    assert!(thermo.y_he > 0.245 && thermo.y_he < 0.250);
    assert!(thermo.z_rec > 1055.0 && thermo.z_rec < 1095.0);
}

// =============================================================================
// External engine
// =============================================================================

/// External kernel backed by a pre-tabulated ionization history (the way
/// wrapped recombination codes integrate: solve once, interpolate after).
struct TabulatedKernel {
    z: Vec<f64>,
    xe: Vec<f64>,
    dd: Vec<f64>,
}

impl TabulatedKernel {
    fn from_history(thermo: &Thermodynamics) -> Self {
        let table = &thermo.table;
        let z = table.z.clone();
        let xe: Vec<f64> = (0..table.n_rows())
            .map(|row| table.get(row, table.layout.xe))
            .collect();
        let dd = spline_second_derivatives(&z, &xe, SplineBoundary::EstimatedDerivatives);
        Self { z, xe, dd }
    }
}

impl IonizationKernel for TabulatedKernel {
    fn x_e(
        &self,
        z: f64,
        _hz_si: f64,
        _t_mat: f64,
        _t_rad: f64,
        _energy_rate: f64,
    ) -> Result<(f64, f64), ThermoError> {
        let idx = interval_index(&self.z, z);
        let (x, dx_dz) = spline_eval_with_derivative(&self.z, &self.xe, &self.dd, idx, z);
        // d/d ln a = -(1+z) d/dz
        Ok((x.max(0.0), -(1.0 + z) * dx_dz))
    }
}

#[test]
fn test_external_engine_matches_builtin() {
    let bg = background();

    // reference: built-in engine with CAMB reionization
    let reference = compute_with(
        &bg,
        &ThermoConfig::default().with_reionization(ReionizationConfig::camb_with_z(7.67)),
    );

    // tabulate a reionization-free history and wrap it as the kernel
    let bare = compute_with(&bg, &ThermoConfig::default());
    let kernel = Arc::new(TabulatedKernel::from_history(&bare));

    let external = compute_with(
        &bg,
        &ThermoConfig::default()
            .with_engine(Engine::External(kernel))
            .with_reionization(ReionizationConfig::camb_with_z(7.67)),
    );

    let rel = |a: f64, b: f64| (a / b - 1.0).abs();
    assert!(
        rel(external.z_rec, reference.z_rec) < 5.0e-3,
        "z_rec: {} vs {}",
        external.z_rec,
        reference.z_rec
    );
    assert!(
        rel(external.tau_reio, reference.tau_reio) < 5.0e-3,
        "tau_reio: {} vs {}",
        external.tau_reio,
        reference.tau_reio
    );
    assert!(
        rel(external.rs_rec, reference.rs_rec) < 5.0e-3,
        "rs_rec: {} vs {}",
        external.rs_rec,
        reference.rs_rec
    );
}
