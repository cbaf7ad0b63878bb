//! Parametric reionization histories.
//!
//! Five schemes describe the free-electron fraction during reionization:
//! a CAMB-like double tanh, its half-amplitude variant, tanh-connected
//! bins, a superposition of tanh jumps, and direct piecewise-linear
//! interpolation. Every scheme rides on top of whatever residual electron
//! fraction recombination left behind: the evaluation takes that residual
//! (`xe_before`) explicitly and the returned derivative covers the scheme
//! contribution only.

use crate::config::{Precision, ReioInput, ReionizationConfig};
use crate::error::ThermoError;

/// Map an input x_e to its value, expanding the helium sentinels.
///
/// -1 means "hydrogen plus first helium reionization", -2 "hydrogen plus
/// both helium reionizations".
fn expand_sentinel(xe: f64, f_he: f64, what: &str, index: usize) -> Result<f64, ThermoError> {
    if xe >= 0.0 {
        Ok(xe)
    } else if (-1.1..-0.9).contains(&xe) {
        Ok(1.0 + f_he)
    } else if (-2.1..-1.9).contains(&xe) {
        Ok(1.0 + 2.0 * f_he)
    } else {
        Err(ThermoError::domain(format!(
            "{}[{}] = {} makes no sense (expected >= 0, or the sentinels -1, -2)",
            what, index, xe
        )))
    }
}

#[derive(Clone, Debug)]
enum Scheme {
    None,
    /// CAMB-like tanh in (1+z)^exponent; `half` drops the helium term and
    /// uses the half-amplitude form.
    CambLike {
        half: bool,
        z_reio: f64,
        exponent: f64,
        width: f64,
        xe_after: f64,
        helium_fraction: f64,
        helium_redshift: f64,
        helium_width: f64,
    },
    /// Tanh steps between bin centers; arrays carry synthesized edge
    /// points, the last x_e slot is the live residual.
    BinsTanh {
        z: Vec<f64>,
        xe: Vec<f64>,
        sharpness: f64,
    },
    /// Independent tanh jumps with common width; same edge conventions.
    ManyTanh {
        z: Vec<f64>,
        xe: Vec<f64>,
        width: f64,
    },
    /// Piecewise-linear; the last x_e slot is the live residual.
    Inter { z: Vec<f64>, xe: Vec<f64> },
}

/// One reionization history, ready for evaluation.
#[derive(Clone, Debug)]
pub struct ReionizationModel {
    scheme: Scheme,
    /// Redshift above which the scheme returns the residual unchanged.
    pub z_start: f64,
    start_factor: f64,
    z_start_max: f64,
}

impl ReionizationModel {
    /// Build the model from its configuration.
    ///
    /// `f_he` is the helium-to-hydrogen number ratio
    /// Y_He / ((m_H/m_He)(1 - Y_He)).
    pub fn new(
        config: &ReionizationConfig,
        f_he: f64,
        precision: &Precision,
    ) -> Result<Self, ThermoError> {
        let start_factor = precision.reionization_start_factor;
        let z_start_max = precision.reionization_z_start_max;

        let (scheme, z_start) = match config {
            ReionizationConfig::None => (Scheme::None, 0.0),

            ReionizationConfig::Camb { .. } | ReionizationConfig::HalfTanh { .. } => {
                let (input, exponent, width, helium) = match config {
                    ReionizationConfig::Camb {
                        input,
                        exponent,
                        width,
                        helium_redshift,
                        helium_width,
                    } => (input, *exponent, *width, Some((*helium_redshift, *helium_width))),
                    ReionizationConfig::HalfTanh {
                        input,
                        exponent,
                        width,
                    } => (input, *exponent, *width, None),
                    _ => unreachable!(),
                };
                let half = helium.is_none();
                if exponent == 0.0 {
                    return Err(ThermoError::guard("reionization exponent must be nonzero"));
                }
                if width == 0.0 {
                    return Err(ThermoError::guard("reionization width must be nonzero"));
                }
                // the half-amplitude variant carries no helium step; keep
                // placeholder shape parameters for the start-redshift rule
                let (helium_redshift, helium_width) = match helium {
                    Some((_, w)) if w == 0.0 => {
                        return Err(ThermoError::guard(
                            "helium reionization width must be nonzero",
                        ));
                    }
                    Some(pair) => pair,
                    None => (3.5, 0.5),
                };

                let xe_after = if half { 1.0 } else { 1.0 + f_he };

                // with an optical-depth target, start from the widest
                // possible bracket; the bisection narrows it down
                let z_guess = match input {
                    ReioInput::Redshift(z) => *z,
                    ReioInput::OpticalDepth(_) => z_start_max - start_factor * width,
                };
                if z_guess < 0.0 {
                    return Err(ThermoError::domain(
                        "reionization cannot take place before today while starting \
                         below z_start_max; increase reionization_z_start_max",
                    ));
                }

                let z_start = match input {
                    // optical-depth target: prime the widest bracket, the
                    // bisection will move the center down from z_guess
                    ReioInput::OpticalDepth(_) => z_start_max,
                    ReioInput::Redshift(z) => {
                        if half {
                            // the half-amplitude history starts at its center
                            *z
                        } else {
                            let start = (z + start_factor * width)
                                .max(helium_redshift + start_factor * helium_width);
                            if start > z_start_max {
                                return Err(ThermoError::domain(format!(
                                    "starting redshift for reionization {} > \
                                     reionization_z_start_max = {}",
                                    start, z_start_max
                                )));
                            }
                            start
                        }
                    }
                };

                (
                    Scheme::CambLike {
                        half,
                        z_reio: z_guess,
                        exponent,
                        width,
                        xe_after,
                        helium_fraction: f_he,
                        helium_redshift,
                        helium_width,
                    },
                    z_start,
                )
            }

            ReionizationConfig::BinsTanh { z, xe, sharpness } => {
                if z.len() < 2 {
                    return Err(ThermoError::domain(
                        "binned reionization requires at least two bin centers",
                    ));
                }
                if z.len() != xe.len() {
                    return Err(ThermoError::domain(
                        "binned reionization z and xe arrays must have equal length",
                    ));
                }
                for i in 1..z.len() {
                    if z[i - 1] >= z[i] {
                        return Err(ThermoError::domain(format!(
                            "reionization bin centers must be increasing: {} >= {}",
                            z[i - 1],
                            z[i]
                        )));
                    }
                }
                let n = z.len() + 2;
                let mut zs = vec![0.0; n];
                let mut xes = vec![0.0; n];
                zs[1..n - 1].copy_from_slice(z);
                xes[1..n - 1].copy_from_slice(xe);
                // top edge: extend geometrically past the last center
                zs[n - 1] = zs[n - 2] + 2.0 * (zs[n - 2] - zs[n - 3]);
                // bottom edge: mirror the first spacing, floored at zero
                zs[0] = (2.0 * zs[1] - zs[2]).max(0.0);
                xes[0] = 1.0 + f_he;
                // xes[n-1] is the live residual at evaluation time

                let z_top = zs[n - 1];
                if z_top > z_start_max {
                    return Err(ThermoError::domain(format!(
                        "reionization starts at z = {} > reionization_z_start_max = {}; \
                         change the binning or increase reionization_z_start_max",
                        z_top, z_start_max
                    )));
                }
                (
                    Scheme::BinsTanh {
                        z: zs,
                        xe: xes,
                        sharpness: *sharpness,
                    },
                    z_top,
                )
            }

            ReionizationConfig::ManyTanh { z, xe, width } => {
                if z.is_empty() {
                    return Err(ThermoError::domain(
                        "many-tanh reionization requires at least one jump center",
                    ));
                }
                if z.len() != xe.len() {
                    return Err(ThermoError::domain(
                        "many-tanh reionization z and xe arrays must have equal length",
                    ));
                }
                if *width <= 0.0 {
                    return Err(ThermoError::guard(format!(
                        "many-tanh width must be strictly positive, got {}",
                        width
                    )));
                }
                for i in 1..z.len() {
                    if z[i - 1] >= z[i] {
                        return Err(ThermoError::domain(format!(
                            "reionization jump centers must be increasing: {} >= {}",
                            z[i - 1],
                            z[i]
                        )));
                    }
                }
                let n = z.len() + 2;
                let mut zs = vec![0.0; n];
                let mut xes = vec![0.0; n];
                for (i, (&zi, &xi)) in z.iter().zip(xe.iter()).enumerate() {
                    zs[i + 1] = zi;
                    xes[i + 1] = expand_sentinel(xi, f_he, "many_tanh_xe", i)?;
                }
                zs[n - 1] = zs[n - 2] + start_factor * width;
                zs[0] = (zs[1] - start_factor * width).max(0.0);
                xes[0] = xes[1];
                // xes[n-1] is the live residual at evaluation time

                let z_top = zs[n - 1];
                if z_top > z_start_max {
                    return Err(ThermoError::domain(format!(
                        "reionization starts at z = {} > reionization_z_start_max = {}; \
                         change the jumps or increase reionization_z_start_max",
                        z_top, z_start_max
                    )));
                }
                (
                    Scheme::ManyTanh {
                        z: zs,
                        xe: xes,
                        width: *width,
                    },
                    z_top,
                )
            }

            ReionizationConfig::Inter { z, xe } => {
                if z.len() < 2 {
                    return Err(ThermoError::domain(
                        "interpolated reionization requires at least two points",
                    ));
                }
                if z.len() != xe.len() {
                    return Err(ThermoError::domain(
                        "interpolated reionization z and xe arrays must have equal length",
                    ));
                }
                if z[0] != 0.0 {
                    return Err(ThermoError::domain(format!(
                        "the first interpolated reionization redshift must be zero, got {}",
                        z[0]
                    )));
                }
                if *xe.last().unwrap() != 0.0 {
                    return Err(ThermoError::domain(format!(
                        "the last interpolated reionization x_e must be the sentinel 0 \
                         (the residual recombination value), got {}",
                        xe.last().unwrap()
                    )));
                }
                for i in 1..z.len() {
                    if z[i - 1] >= z[i] {
                        return Err(ThermoError::domain(format!(
                            "interpolated reionization redshifts must be increasing: {} >= {}",
                            z[i - 1],
                            z[i]
                        )));
                    }
                }
                let mut xes = vec![0.0; xe.len()];
                for (i, &xi) in xe.iter().enumerate().take(xe.len() - 1) {
                    xes[i] = expand_sentinel(xi, f_he, "reio_inter_xe", i)?;
                }
                // xes[last] is the live residual at evaluation time

                let z_top = *z.last().unwrap();
                if z_top > z_start_max {
                    return Err(ThermoError::domain(format!(
                        "reionization starts at z = {} > reionization_z_start_max = {}",
                        z_top, z_start_max
                    )));
                }
                (
                    Scheme::Inter {
                        z: z.clone(),
                        xe: xes,
                    },
                    z_top,
                )
            }
        };

        Ok(Self {
            scheme,
            z_start,
            start_factor,
            z_start_max,
        })
    }

    /// True when no reionization history is modeled.
    pub fn is_none(&self) -> bool {
        matches!(self.scheme, Scheme::None)
    }

    /// Central reionization redshift of the CAMB-family schemes.
    pub fn z_reio(&self) -> Option<f64> {
        match &self.scheme {
            Scheme::CambLike { z_reio, .. } => Some(*z_reio),
            _ => None,
        }
    }

    /// Move the CAMB-family tanh center to `z` and recompute the starting
    /// redshift. Used by the optical-depth bisection.
    pub fn set_redshift(&mut self, z: f64) -> Result<(), ThermoError> {
        let start_factor = self.start_factor;
        let z_start_max = self.z_start_max;
        match &mut self.scheme {
            Scheme::CambLike {
                z_reio,
                width,
                helium_redshift,
                helium_width,
                ..
            } => {
                *z_reio = z;
                let hydrogen_start = z + start_factor * *width;
                // helium may start later (unrealistic, but allowed)
                let start = hydrogen_start.max(*helium_redshift + start_factor * *helium_width);
                if start > z_start_max {
                    return Err(ThermoError::domain(format!(
                        "starting redshift for reionization {} > reionization_z_start_max = {}",
                        start, z_start_max
                    )));
                }
                self.z_start = start;
                Ok(())
            }
            _ => Err(ThermoError::guard(
                "only the CAMB-family schemes support a movable reionization redshift",
            )),
        }
    }

    /// Linear interpolation must be used below this redshift when querying
    /// the frozen table, to respect the scheme's derivative breaks.
    pub fn linear_interp_below(&self) -> Option<f64> {
        match &self.scheme {
            Scheme::CambLike {
                half: true, z_reio, ..
            } => Some(2.0 * z_reio),
            Scheme::Inter { .. } => Some(50.0),
            _ => None,
        }
    }

    /// Evaluate `(X_e, dX_e/dz)` at redshift z, given the residual
    /// electron fraction recombination would leave at this z.
    ///
    /// The returned derivative covers the scheme contribution only; the
    /// caller adds the residual's own derivative where appropriate.
    pub fn x_at(&self, z: f64, xe_before: f64) -> Result<(f64, f64), ThermoError> {
        match &self.scheme {
            Scheme::None => Ok((xe_before, 0.0)),

            Scheme::CambLike {
                half,
                z_reio,
                exponent,
                width,
                xe_after,
                helium_fraction,
                helium_redshift,
                helium_width,
            } => {
                if z > self.z_start {
                    return Ok((xe_before, 0.0));
                }

                // hydrogen: tanh in the (1+z)^exponent variable
                let zp1_pow = (1.0 + z).powf(*exponent);
                let center_pow = (1.0 + z_reio).powf(*exponent);
                let norm = exponent * (1.0 + z_reio).powf(exponent - 1.0) * width;
                let argument = (center_pow - zp1_pow) / norm;
                let dargument =
                    -(1.0 + z).powf(exponent - 1.0) / ((1.0 + z_reio).powf(exponent - 1.0) * width);

                let (mut x, mut dx) = if *half {
                    (
                        (xe_after - xe_before) * argument.tanh() + xe_before,
                        (xe_after - xe_before) * (1.0 - argument.tanh().powi(2)) * dargument,
                    )
                } else {
                    (
                        (xe_after - xe_before) * (argument.tanh() + 1.0) / 2.0 + xe_before,
                        (xe_after - xe_before) * (1.0 - argument.tanh().powi(2)) / 2.0 * dargument,
                    )
                };

                // helium: a second tanh centered at its own redshift
                if !*half {
                    let he_arg = (helium_redshift - z) / helium_width;
                    let he_darg = -1.0 / helium_width;
                    x += helium_fraction * (he_arg.tanh() + 1.0) / 2.0;
                    dx += helium_fraction * (1.0 - he_arg.tanh().powi(2)) / 2.0 * he_darg;
                }
                Ok((x, dx))
            }

            Scheme::BinsTanh { z: zs, xe, sharpness } => {
                let n = zs.len();
                if z > zs[n - 1] {
                    return Ok((xe_before, 0.0));
                }
                if z < zs[0] {
                    return Ok((xe[0], 0.0));
                }
                let mut i = 0;
                while i + 2 < n && zs[i + 1] < z {
                    i += 1;
                }
                let value = |slot: usize| if slot == n - 1 { xe_before } else { xe[slot] };

                // central redshift of the tanh connecting bins i and i+1
                let z_jump = if i == n - 2 {
                    zs[i] + 0.5 * (zs[i] - zs[i - 1])
                } else {
                    0.5 * (zs[i + 1] + zs[i])
                };

                let t = ((z - z_jump) / sharpness).tanh();
                let step = value(i + 1) - value(i);
                let x = value(i) + 0.5 * (t + 1.0) * step;
                let dx = 0.5 * (1.0 - t * t) * step / sharpness;
                Ok((x, dx))
            }

            Scheme::ManyTanh { z: zs, xe, width } => {
                let n = zs.len();
                if z > zs[n - 1] {
                    return Ok((xe_before, 0.0));
                }
                if z <= zs[0] {
                    return Ok((xe[0], 0.0));
                }
                let value = |slot: usize| if slot == n - 1 { xe_before } else { xe[slot] };

                let mut x = xe_before;
                let mut dx = 0.0;
                for jump in 1..n - 1 {
                    let center = zs[n - 1 - jump];
                    // jump heights counted from high z downwards
                    let before = value(n - 1 - jump) - value(n - jump);
                    let after = 0.0;
                    let t = ((z - center) / width).tanh();
                    x += before + (after - before) * (t + 1.0) / 2.0;
                    dx += (after - before) * (1.0 - t * t) / 2.0 / width;
                }
                Ok((x, dx))
            }

            Scheme::Inter { z: zs, xe } => {
                let n = zs.len();
                if z > zs[n - 1] {
                    return Ok((xe_before, 0.0));
                }
                let mut i = 0;
                while i + 2 < n && zs[i + 1] < z {
                    i += 1;
                }
                let value = |slot: usize| if slot == n - 1 { xe_before } else { xe[slot] };

                let frac = (z - zs[i]) / (zs[i + 1] - zs[i]);
                let dfrac = 1.0 / (zs[i + 1] - zs[i]);
                let x = value(i) + frac * (value(i + 1) - value(i));
                let dx = dfrac * (value(i + 1) - value(i));
                if x < 0.0 {
                    return Err(ThermoError::guard(format!(
                        "interpolated reionization gives negative x_e = {} at z = {}",
                        x, z
                    )));
                }
                Ok((x, dx))
            }
        }
    }
}
