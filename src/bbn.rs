//! Primordial-helium table reader and interpolator.
//!
//! The table is a whitespace-separated text file. The first data line
//! holds two integers `(N_omega, N_delta)`; every following data line
//! holds a triple `(omega_b, Delta N_eff, Y_He)`, with `omega_b` varying
//! fastest. A line is a comment when its first non-blank character has an
//! ASCII value of 39 or below (this covers `#`, `%`, `!` and blank lines).
//!
//! # File Format
//!
//! ```text
//! # standard BBN table
//! 2 2
//! 0.019 0.0 0.2465
//! 0.025 0.0 0.2490
//! 0.019 1.0 0.2601
//! 0.025 1.0 0.2627
//! ```
//!
//! Interpolation is a two-stage cubic spline: first along ΔN_eff for each
//! tabulated ω_b, then along ω_b. Out-of-range inputs produce descriptive
//! errors instead of extrapolating.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use thiserror::Error;

use crate::background::{Background, DetailLevel};
use crate::error::ThermoError;
use crate::numerics::{
    interval_index, spline_eval, spline_second_derivatives, SplineBoundary,
};

/// Kelvin expressed in MeV.
const KELVIN_IN_MEV: f64 = 8.6173e-11;

/// Photon temperature (MeV) at which the helium fraction is evaluated.
const BBN_TEMPERATURE_MEV: f64 = 0.1;

/// Effective neutrino number the table's ΔN_eff is measured against.
const NEFF_REFERENCE: f64 = 3.046;

/// Error type for BBN-table parsing and interpolation.
#[derive(Debug, Error)]
pub enum BbnError {
    /// File I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error with line number
    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// Fewer data rows than the header promised
    #[error("table ended after {got} of {expected} data rows")]
    Truncated { expected: usize, got: usize },

    /// Requested point outside the tabulated parameter plane
    #[error(
        "{name} = {value:.6e} outside the tabulated range [{min:.6e}, {max:.6e}]; \
         fix Y_He to an explicit value instead of the BBN prediction"
    )]
    OutOfRange {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
}

/// Parsed helium table with spline interpolation over (omega_b, Delta N_eff).
#[derive(Clone, Debug)]
pub struct BbnTable {
    /// omega_b sampling, increasing.
    omegab: Vec<f64>,
    /// Delta N_eff sampling, increasing.
    deltan: Vec<f64>,
    /// Y_He values, omega_b varying fastest.
    yhe: Vec<f64>,
}

/// A line is a comment when its first non-blank byte is at or below
/// ASCII 39 (covers '#', '%', '!', quotes and empty lines).
fn is_comment(line: &str) -> bool {
    match line.trim_start().bytes().next() {
        None => true,
        Some(b) => b <= 39,
    }
}

impl BbnTable {
    /// Read a helium table from a file.
    pub fn read(path: &Path) -> Result<Self, BbnError> {
        let file = File::open(path)?;
        let mut content = String::new();
        for line in BufReader::new(file).lines() {
            content.push_str(&line?);
            content.push('\n');
        }
        Self::parse(&content)
    }

    /// Parse a helium table from a string (same format as the file).
    pub fn parse(content: &str) -> Result<Self, BbnError> {
        let mut num_omegab = 0usize;
        let mut num_deltan = 0usize;
        let mut omegab = Vec::new();
        let mut deltan = Vec::new();
        let mut yhe = Vec::new();
        let mut row = 0usize;

        for (line_num, line) in content.lines().enumerate() {
            if is_comment(line) {
                continue;
            }

            if num_omegab == 0 && num_deltan == 0 {
                let mut parts = line.split_whitespace();
                let parse_count = |s: Option<&str>| -> Option<usize> { s?.parse().ok() };
                num_omegab = parse_count(parts.next()).ok_or_else(|| BbnError::Parse {
                    line: line_num + 1,
                    message: "expected two integers (N_omega, N_delta)".into(),
                })?;
                num_deltan = parse_count(parts.next()).ok_or_else(|| BbnError::Parse {
                    line: line_num + 1,
                    message: "expected two integers (N_omega, N_delta)".into(),
                })?;
                if num_omegab == 0 || num_deltan == 0 {
                    return Err(BbnError::Parse {
                        line: line_num + 1,
                        message: "table dimensions must be positive".into(),
                    });
                }
                omegab = vec![0.0; num_omegab];
                deltan = vec![0.0; num_deltan];
                yhe = vec![0.0; num_omegab * num_deltan];
                continue;
            }

            if row >= num_omegab * num_deltan {
                return Err(BbnError::Parse {
                    line: line_num + 1,
                    message: format!(
                        "more data rows than the {} x {} header allows",
                        num_omegab, num_deltan
                    ),
                });
            }

            let mut parts = line.split_whitespace();
            let mut next_float = |what: &str| -> Result<f64, BbnError> {
                parts
                    .next()
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| BbnError::Parse {
                        line: line_num + 1,
                        message: format!("invalid {} value", what),
                    })
            };
            omegab[row % num_omegab] = next_float("omega_b")?;
            deltan[row / num_omegab] = next_float("Delta N_eff")?;
            yhe[row] = next_float("Y_He")?;
            row += 1;
        }

        if num_omegab == 0 {
            return Err(BbnError::Parse {
                line: 0,
                message: "no header line found".into(),
            });
        }
        if row < num_omegab * num_deltan {
            return Err(BbnError::Truncated {
                expected: num_omegab * num_deltan,
                got: row,
            });
        }

        Ok(Self {
            omegab,
            deltan,
            yhe,
        })
    }

    /// Interpolate Y_He at `(omega_b, delta_neff)`.
    ///
    /// Spline along ΔN_eff first (one spline per tabulated ω_b), then
    /// along ω_b. Errors when the requested point is outside the table.
    pub fn interpolate(&self, omega_b: f64, delta_neff: f64) -> Result<f64, BbnError> {
        let n_om = self.omegab.len();
        let n_dn = self.deltan.len();

        if omega_b < self.omegab[0] || omega_b > self.omegab[n_om - 1] {
            return Err(BbnError::OutOfRange {
                name: "omega_b",
                value: omega_b,
                min: self.omegab[0],
                max: self.omegab[n_om - 1],
            });
        }
        if n_dn > 1 && (delta_neff < self.deltan[0] || delta_neff > self.deltan[n_dn - 1]) {
            return Err(BbnError::OutOfRange {
                name: "Delta N_eff",
                value: delta_neff,
                min: self.deltan[0],
                max: self.deltan[n_dn - 1],
            });
        }

        // stage 1: collapse the Delta N_eff axis
        let mut yhe_at_dn = vec![0.0; n_om];
        if n_dn == 1 {
            yhe_at_dn.copy_from_slice(&self.yhe);
        } else {
            let mut column = vec![0.0; n_dn];
            for i_om in 0..n_om {
                for i_dn in 0..n_dn {
                    column[i_dn] = self.yhe[i_dn * n_om + i_om];
                }
                let dd = spline_second_derivatives(&self.deltan, &column, SplineBoundary::Natural);
                let idx = interval_index(&self.deltan, delta_neff);
                yhe_at_dn[i_om] = spline_eval(&self.deltan, &column, &dd, idx, delta_neff);
            }
        }

        // stage 2: along omega_b
        if n_om == 1 {
            return Ok(yhe_at_dn[0]);
        }
        let dd = spline_second_derivatives(&self.omegab, &yhe_at_dn, SplineBoundary::Natural);
        let idx = interval_index(&self.omegab, omega_b);
        Ok(spline_eval(&self.omegab, &yhe_at_dn, &dd, idx, omega_b))
    }
}

/// Infer Y_He from standard BBN for the given background.
///
/// The effective neutrino number is evaluated at the BBN epoch (photon
/// temperature 0.1 MeV) from the background's radiation content, expressed
/// as a ΔN_eff relative to 3.046, and fed with ω_b into the table.
pub fn helium_from_bbn<B: Background + ?Sized>(
    table: &BbnTable,
    background: &B,
) -> Result<f64, ThermoError> {
    let z_bbn = BBN_TEMPERATURE_MEV / (KELVIN_IN_MEV * background.t_cmb()) - 1.0;
    let tau_bbn = background.tau_of_z(z_bbn)?;
    let point = background.at_tau(tau_bbn, DetailLevel::Normal)?;

    let neff_bbn = (point.omega_r * point.rho_crit - point.rho_g)
        / (7.0 / 8.0 * (4.0_f64 / 11.0).powf(4.0 / 3.0) * point.rho_g);
    let delta_neff = neff_bbn - NEFF_REFERENCE;

    // h0 is H0/c in 1/Mpc; recover the dimensionless h for omega_b h^2
    let h = background.h0() * crate::constants::C / 1.0e5;
    let omega_b_h2 = background.omega0_b() * h * h;

    Ok(table.interpolate(omega_b_h2, delta_neff)?)
}
