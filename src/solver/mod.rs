//! Stiff ODE integration.

mod bdf;

pub use bdf::{evolve, StiffOptions};
