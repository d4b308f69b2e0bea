//! Bootstraps a local full-stack development environment on Docker Compose.
//!
//! - **[`core`]**: pure logic (persistence variants, topology, env rewriting,
//!   config patching, endpoints). No I/O.
//! - **[`io`]**: filesystem, subprocesses, configuration and the external
//!   toolchain behind capability traits, so tests can substitute a fake.
//!
//! [`backend`], [`frontend`] and [`up`] coordinate the two to implement
//! `devstack up`.

pub mod backend;
pub mod core;
pub mod exit_codes;
pub mod frontend;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod up;
