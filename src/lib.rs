//! Herdsman - Supervise many game-client profiles on one machine
//!
//! Each profile is launched suspended, byte-patched for its game version,
//! handed a license key from a shared pool and watched until it stops.
//! Crashed or unresponsive games are restarted a bounded number of times.

pub mod core;
pub mod persistence;
pub mod platform;

/// Application name constant
pub const APP_NAME: &str = "Herdsman";

/// Application version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
