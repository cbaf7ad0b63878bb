//! Low-level numerical primitives: cubic-spline table operations and
//! boxcar smoothing.
//!
//! All spline routines operate on strictly monotone abscissas in either
//! direction, because the engine splines both against redshift (stored
//! increasing) and against conformal time (decreasing with the same index).

mod smooth;
mod spline;

pub use smooth::smooth_boxcar;
pub use spline::{
    interval_index, interval_index_closeby, linear_eval, spline_derive, spline_eval,
    spline_eval_with_derivative, spline_integrate_cumulative, spline_integrate_total,
    spline_second_derivatives, SplineBoundary,
};
