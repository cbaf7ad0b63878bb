//! Error type for the thermodynamics computation.

use thiserror::Error;

use crate::bbn::BbnError;

/// Error type covering every failure mode of the compute and query phases.
#[derive(Debug, Error)]
pub enum ThermoError {
    /// Input outside the physical or supported range. Raised before any
    /// integration starts.
    #[error("domain violation: {0}")]
    Domain(String),

    /// An iterative procedure (stiff solver, optical-depth bisection)
    /// exceeded its iteration budget or failed to converge.
    #[error("convergence failure: {0}")]
    Convergence(String),

    /// A precondition protecting against division by zero or a diverging
    /// intermediate quantity was violated.
    #[error("numerical guard: {0}")]
    Guard(String),

    /// Failure reported by the background-cosmology provider.
    #[error("background provider: {0}")]
    Background(String),

    /// Failure while reading or interpolating the BBN helium table.
    #[error(transparent)]
    Bbn(#[from] BbnError),

    /// Query outside the supported range of the frozen table.
    #[error("query out of range: {0}")]
    OutOfRange(String),
}

impl ThermoError {
    /// Shorthand for a domain violation.
    pub fn domain(msg: impl Into<String>) -> Self {
        ThermoError::Domain(msg.into())
    }

    /// Shorthand for a convergence failure.
    pub fn convergence(msg: impl Into<String>) -> Self {
        ThermoError::Convergence(msg.into())
    }

    /// Shorthand for a numerical-guard failure.
    pub fn guard(msg: impl Into<String>) -> Self {
        ThermoError::Guard(msg.into())
    }
}
