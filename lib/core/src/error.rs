//! Error handling foundation for reportek.
//!
//! Crates define their own domain error enums. Layers that aggregate
//! failures from several collaborators (catalog loading, server startup)
//! wrap them in a rootcause `Report` so that context accumulates as the
//! error travels up.

use rootcause::Report;

/// A Result type alias using rootcause's Report for error handling.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;
