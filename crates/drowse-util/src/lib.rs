//! Shared utilities for drowse
//!
//! This crate provides:
//! - ID types (NodeName, WorkloadId)
//! - Time utilities (monotonic time, daily wall-clock windows)
//! - Error types
//! - Default paths and local host identification

mod error;
mod ids;
mod paths;
mod time;

pub use error::*;
pub use ids::*;
pub use paths::*;
pub use time::*;
