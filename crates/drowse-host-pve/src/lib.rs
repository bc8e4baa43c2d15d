//! Proxmox VE adapter for drowsed
//!
//! Provides:
//! - `PveClient`: the `ClusterApi` over the Proxmox REST API (API token auth)
//! - `SystemPower`: `LocalPower` through the OS shutdown command

mod client;
mod power;
mod wire;

pub use client::*;
pub use power::*;
