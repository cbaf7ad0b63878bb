//! # recomb-rs
//!
//! A cosmological thermodynamics engine: computes the ionization history
//! of the early universe (free-electron fraction, baryon temperature,
//! optical depth, visibility function and related observables) as a
//! function of redshift, then serves it through a single interpolation
//! query.
//!
//! This crate provides the core building blocks:
//! - A staged stiff integration of the Saha/Peebles recombination network
//!   with automatic switching between analytic and numerical regimes
//! - Five parametric reionization histories, including matching a target
//!   integrated optical depth by bisection
//! - A derived-quantity pass (visibility function and derivatives, drag
//!   epoch, damping scale, characteristic times)
//! - Spline/linear/asymptotic interpolation of the frozen table
//! - A background-cosmology trait with a flat-ΛCDM reference provider
//! - BBN helium-table interpolation and exotic energy injection
//!
//! # Example
//!
//! ```no_run
//! use recomb_rs::{
//!     InterpolationMode, LcdmBackground, Precision, ReionizationConfig,
//!     Thermodynamics, ThermoConfig,
//! };
//!
//! let background = LcdmBackground::new(0.0224, 0.120, 0.67, 2.7255, 3.046);
//! let config = ThermoConfig::default()
//!     .with_reionization(ReionizationConfig::camb_with_z(7.67));
//!
//! let thermo = Thermodynamics::compute(&Precision::default(), &background, &config)?;
//! println!("recombination at z = {:.1}", thermo.z_rec);
//!
//! let mut cursor = 0;
//! let point = thermo.at_z(1100.0, InterpolationMode::Normal, &mut cursor, None)?;
//! println!("x_e(1100) = {:.4}", point.xe);
//! # Ok::<(), recomb_rs::ThermoError>(())
//! ```

pub mod background;
pub mod bbn;
pub mod config;
pub mod constants;
pub mod error;
pub mod grid;
pub mod injection;
pub mod numerics;
pub mod phases;
pub mod recfast;
pub mod reionization;
pub mod solver;
pub mod thermo;

// Re-export the main types for convenience
pub use background::{Background, BgPoint, DetailLevel, LcdmBackground};
pub use bbn::{helium_from_bbn, BbnError, BbnTable};
pub use config::{
    Engine, HeliumSetting, InjectionConfig, Precision, ReioInput, ReionizationConfig,
    ThermoConfig,
};
pub use error::ThermoError;
pub use injection::EnergyInjection;
pub use recfast::{IonizationKernel, RecfastKernel};
pub use reionization::ReionizationModel;
pub use thermo::{ColumnLayout, InterpolationMode, Thermodynamics, ThermoPoint, ThermoTable};
