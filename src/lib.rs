//! Transforge - local media transcoding job host
//!
//! This library crate exposes the job host (engine loader, staging area,
//! executor, queue, packager), the preset catalogue, artifact sinks, and
//! configuration for the `transforge` binary and for integration testing.

pub mod config;
pub mod sink;
pub mod transcode;
