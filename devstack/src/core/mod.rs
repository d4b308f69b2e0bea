//! Deterministic, pure logic for stack provisioning.
//!
//! Nothing in here touches the filesystem or spawns processes: modules take
//! text or settings in and return text or descriptions out.

pub mod config_patch;
pub mod endpoints;
pub mod env_file;
pub mod persistence;
pub mod topology;
