//! Provisioning and supervision of a local OpenTelemetry collector.
//!
//! The pipeline resolves the latest GitHub release of a binary, picks the
//! asset for the host platform, installs the extracted executable into a
//! per-project cache, runs it in the background and waits for its port.
//! [`cleanup`] makes sure the process and its log handle are released when
//! the run ends, however it ends.

pub mod cache;
pub mod cleanup;
pub mod collector;
pub mod config;
pub mod download;
pub mod error;
pub mod install;
pub mod locate;
pub mod platform;
pub mod readiness;
pub mod release;
pub mod supervisor;
pub mod types;
