//! Decision engine and orchestrator for drowsed
//!
//! This crate is the heart of drowsed, containing:
//! - Idle detection (critical vs safe-to-stop workloads)
//! - Node lifecycle state machine (Active -> IdleStarted -> GracePeriod -> ShutdownInitiated)
//! - Node shutdown sequences and the ordered fleet cascade
//! - Consecutive-error circuit breaker
//! - Startup permission preflight
//! - The polling scheduler that drives all of the above

mod breaker;
mod events;
mod idle;
mod lifecycle;
mod orchestrator;
mod preflight;
mod scheduler;
mod state;

pub use breaker::*;
pub use events::*;
pub use idle::*;
pub use lifecycle::*;
pub use orchestrator::*;
pub use preflight::*;
pub use scheduler::*;
pub use state::*;
