//! Core types and traits for Girder
//!
//! This crate defines the foundational types used throughout the system:
//! - Error: error type hierarchy for framing, version and construction errors
//! - Correlation: the integer id tuple stamped on every build event
//! - Timestamp: microsecond-precision event times
//! - DependencyProvider: seam for per-project target dependency data

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use traits::{DependencyProvider, TargetDefinition};
pub use types::{Correlation, Timestamp, NO_ID};
