//! Cluster API trait interfaces for drowse
//!
//! This crate defines the interface between the decision engine and the
//! virtualization platform. It contains no transport code itself; the
//! Proxmox implementation lives in `drowse-host-pve`, and [`MockCluster`]
//! backs the tests.

mod inventory;
mod mock;
mod privileges;
mod traits;
mod types;

pub use inventory::*;
pub use mock::*;
pub use privileges::*;
pub use traits::*;
pub use types::*;
