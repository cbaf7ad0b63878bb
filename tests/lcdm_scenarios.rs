//! End-to-end scenarios for a flat ΛCDM cosmology.
//!
//! Verifies the recombination history, the reionization optical depth in
//! both input modes, the table invariants, idempotence and the analytic
//! extrapolation above the tabulated range.

use recomb_rs::{
    Background, DetailLevel, InterpolationMode, LcdmBackground, Precision, ReionizationConfig,
    Thermodynamics, ThermoConfig,
};

fn background() -> LcdmBackground {
    LcdmBackground::new(0.0224, 0.120, 0.67, 2.7255, 3.046)
}

fn precision() -> Precision {
    Precision::reduced()
}

fn compute(config: &ThermoConfig) -> Thermodynamics {
    Thermodynamics::compute(&precision(), &background(), config).expect("compute")
}

#[test]
fn test_minimal_lcdm_without_reionization() {
    let thermo = compute(&ThermoConfig::default());

    assert!(
        thermo.z_rec > 1055.0 && thermo.z_rec < 1095.0,
        "z_rec = {}",
        thermo.z_rec
    );
    assert_eq!(thermo.tau_reio, 0.0);
    assert!(thermo.z_reio.is_none());

    // residual electron fraction today
    let mut cursor = 0;
    let today = thermo
        .at_z(0.0, InterpolationMode::Normal, &mut cursor, None)
        .unwrap();
    assert!(
        today.xe > 1.0e-4 && today.xe < 4.0e-4,
        "x_e(0) = {}",
        today.xe
    );

    // drag epoch shortly below recombination
    assert!(
        thermo.z_d > 980.0 && thermo.z_d < thermo.z_rec,
        "z_d = {}",
        thermo.z_d
    );
    assert!(thermo.rs_d > thermo.rs_rec);
}

#[test]
fn test_camb_reionization_given_redshift() {
    let config =
        ThermoConfig::default().with_reionization(ReionizationConfig::camb_with_z(7.67));
    let thermo = compute(&config);

    assert!(
        thermo.tau_reio > 0.053 && thermo.tau_reio < 0.058,
        "tau_reio = {}",
        thermo.tau_reio
    );
    assert_eq!(thermo.z_reio, Some(7.67));

    // today: hydrogen plus both helium reionization stages
    let f_he = thermo.f_he;
    let mut cursor = 0;
    let today = thermo
        .at_z(0.0, InterpolationMode::Normal, &mut cursor, None)
        .unwrap();
    assert!(
        (today.xe - (1.0 + 2.0 * f_he)).abs() < 0.01,
        "x_e(0) = {} vs {}",
        today.xe,
        1.0 + 2.0 * f_he
    );

    // recombination itself is untouched by reionization
    assert!(thermo.z_rec > 1055.0 && thermo.z_rec < 1095.0);
}

#[test]
fn test_camb_reionization_given_optical_depth() {
    let config =
        ThermoConfig::default().with_reionization(ReionizationConfig::camb_with_tau(0.0544));
    let thermo = compute(&config);

    let z_reio = thermo.z_reio.expect("bisection reports z_reio");
    assert!(z_reio > 7.0 && z_reio < 8.0, "z_reio = {}", z_reio);
    assert!((thermo.tau_reio - 0.0544).abs() < 1e-12);
}

#[test]
fn test_optical_depth_roundtrip() {
    // solve with a given z_reio, then feed the resulting optical depth
    // back in and recover the same redshift
    let forward =
        compute(&ThermoConfig::default().with_reionization(ReionizationConfig::camb_with_z(7.67)));
    let tau_star = forward.tau_reio;

    let inverse = compute(
        &ThermoConfig::default().with_reionization(ReionizationConfig::camb_with_tau(tau_star)),
    );
    let z_recovered = inverse.z_reio.unwrap();
    assert!(
        (z_recovered - 7.67).abs() < 0.05,
        "recovered z_reio = {}",
        z_recovered
    );
}

#[test]
fn test_table_invariants() {
    let config =
        ThermoConfig::default().with_reionization(ReionizationConfig::camb_with_z(7.67));
    let thermo = compute(&config);
    let table = &thermo.table;
    let layout = table.layout;

    let mut previous_exp_m_kappa = f64::INFINITY;
    for row in 0..table.n_rows() {
        let z = table.z[row];
        let xe = table.get(row, layout.xe);
        let expmk = table.get(row, layout.exp_m_kappa);
        let tb = table.get(row, layout.tb);

        assert!(xe >= 0.0, "x_e({}) = {}", z, xe);
        assert!((0.0..=1.0).contains(&expmk), "exp(-kappa)({}) = {}", z, expmk);
        assert!(tb > 0.0);
        // matter can only be cooler than (or locked to) radiation
        assert!(
            tb <= 2.7255 * (1.0 + z) * (1.0 + 1.0e-3),
            "T_b({}) = {} above T_rad = {}",
            z,
            tb,
            2.7255 * (1.0 + z)
        );

        // survival probability falls monotonically with z
        assert!(expmk <= previous_exp_m_kappa * (1.0 + 1.0e-12));
        previous_exp_m_kappa = expmk;
    }

    // the visibility function has a unique maximum inside the window
    let g: Vec<f64> = (0..table.n_rows())
        .map(|row| table.get(row, layout.g))
        .collect();
    let g_max = g.iter().cloned().fold(0.0, f64::max);
    let mut peaks = 0;
    for i in 1..g.len() - 1 {
        let z = table.z[i];
        if z > 500.0 && z < 2000.0 && g[i] > g[i - 1] && g[i] > g[i + 1] && g[i] > 0.5 * g_max
        {
            peaks += 1;
        }
    }
    assert_eq!(peaks, 1, "expected a unique visibility maximum");
}

#[test]
fn test_matter_temperature_decouples() {
    // after recombination the matter temperature falls below the
    // radiation temperature and scales towards (1+z)^2
    let thermo = compute(&ThermoConfig::default());
    let mut cursor = 0;
    let at_50 = thermo
        .at_z(50.0, InterpolationMode::Normal, &mut cursor, None)
        .unwrap();
    let t_rad = 2.7255 * 51.0;
    assert!(
        at_50.tb > 0.1 * t_rad && at_50.tb < 0.5 * t_rad,
        "T_b(50) = {} should sit well below T_rad = {}",
        at_50.tb,
        t_rad
    );

    // tightly coupled before recombination
    let deep = thermo
        .at_z(3000.0, InterpolationMode::Normal, &mut cursor, None)
        .unwrap();
    assert!((deep.tb / (2.7255 * 3001.0) - 1.0).abs() < 1.0e-3);
}

#[test]
fn test_idempotence() {
    let config =
        ThermoConfig::default().with_reionization(ReionizationConfig::camb_with_z(7.67));
    let first = compute(&config);
    let second = compute(&config);
    assert_eq!(first.table.data, second.table.data);
    assert_eq!(first.z_rec, second.z_rec);
    assert_eq!(first.tau_reio, second.tau_reio);
}

#[test]
fn test_extrapolation_continuity_at_table_edge() {
    let bg = background();
    let thermo = compute(&ThermoConfig::default());
    let n = thermo.table.n_rows();
    let z_edge = thermo.table.z[n - 1];

    let tau = bg.tau_of_z(z_edge).unwrap();
    let point = bg.at_tau(tau, DetailLevel::Short).unwrap();

    let mut cursor = 0;
    let extrapolated = thermo
        .at_z(z_edge, InterpolationMode::Normal, &mut cursor, Some(&point))
        .unwrap();

    let layout = thermo.table.layout;
    let last = thermo.table.row(n - 1).to_vec();

    assert!((extrapolated.xe - last[layout.xe]).abs() / last[layout.xe] < 1e-12);
    assert!((extrapolated.dkappa - last[layout.dkappa]).abs() / last[layout.dkappa] < 1e-12);
    assert!((extrapolated.tau_d - last[layout.tau_d]).abs() / last[layout.tau_d] < 1e-12);
    assert!((extrapolated.tb - last[layout.tb]).abs() / last[layout.tb] < 1e-3);
    // derivative columns agree to within the solver tolerance
    let rel = (extrapolated.ddkappa - last[layout.ddkappa]).abs() / last[layout.ddkappa].abs();
    assert!(rel < 0.02, "ddkappa mismatch {}", rel);
}

#[test]
fn test_closeby_cursor_matches_normal() {
    let thermo = compute(&ThermoConfig::default());
    let mut cursor = 0;
    for i in 0..200 {
        let z = 3000.0 * i as f64 / 199.0;
        let mut fresh = 0;
        let a = thermo
            .at_z(z, InterpolationMode::Normal, &mut fresh, None)
            .unwrap();
        let b = thermo
            .at_z(z, InterpolationMode::Closeby, &mut cursor, None)
            .unwrap();
        assert_eq!(a.xe, b.xe, "z = {}", z);
        assert_eq!(a.g, b.g);
    }
}

#[test]
fn test_tabular_output() {
    let thermo = compute(&ThermoConfig::default());
    let mut buffer = Vec::new();
    thermo.write_table(&mut buffer).unwrap();
    let text = String::from_utf8(buffer).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert!(lines[0].starts_with('#'));
    assert_eq!(lines.len(), thermo.table.n_rows() + 1);
    // each data line carries nine columns without the damping scale
    assert_eq!(lines[1].split_whitespace().count(), 9);
}
