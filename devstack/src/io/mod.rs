//! Side-effecting operations: filesystem, subprocesses, config.

pub mod config;
pub mod materialize;
pub mod ownership;
pub mod paths;
pub mod preflight;
pub mod process;
pub mod render;
pub mod toolchain;
