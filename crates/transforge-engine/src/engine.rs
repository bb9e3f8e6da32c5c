//! The [`Engine`] trait: the narrow interface every transcoding backend offers.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::Result;

/// Outcome of a completed engine invocation.
///
/// The engine finished running; whether it *succeeded* is reported by the
/// exit code. Faults that prevented the run from finishing at all are
/// returned as [`crate::Error`] instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    /// Process-style exit code. Zero means success.
    pub exit_code: i32,
    /// Diagnostic text emitted by the engine (stderr for ffmpeg).
    pub diagnostic: String,
}

impl RunOutput {
    /// A successful run with no diagnostic output.
    pub fn ok() -> Self {
        Self {
            exit_code: 0,
            diagnostic: String::new(),
        }
    }

    /// A failed run with the given status and diagnostic.
    pub fn failed(exit_code: i32, diagnostic: impl Into<String>) -> Self {
        Self {
            exit_code,
            diagnostic: diagnostic.into(),
        }
    }

    /// Whether the run reported success.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// A transcoding engine with a private, flat file namespace.
///
/// Engines are not reentrant: callers must never have two [`Engine::run`]
/// invocations outstanding on one instance. Namespace keys are flat names
/// (no directories); see [`crate::namespace::validate_name`].
///
/// Implementations must be safe to share across threads (`Send + Sync`).
#[async_trait]
pub trait Engine: Send + Sync {
    /// Human-readable name identifying this backend.
    fn name(&self) -> &'static str;

    /// Whether the engine offers the named capability (e.g. an encoder).
    fn has_capability(&self, capability: &str) -> bool;

    /// Store `data` under `path`, replacing any existing entry.
    async fn write_file(&self, path: &str, data: Bytes) -> Result<()>;

    /// Read the entry stored under `path`.
    async fn read_file(&self, path: &str) -> Result<Bytes>;

    /// Remove the entry stored under `path`.
    ///
    /// Returns a not-found error if no such entry exists.
    async fn delete_file(&self, path: &str) -> Result<()>;

    /// Execute one invocation with a flat argument vector.
    ///
    /// Resolves exactly once, when the engine has finished.
    async fn run(&self, args: &[String]) -> Result<RunOutput>;
}

/// Flags passed to an [`EngineBuilder`] at construction time.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Forward engine log output to tracing at debug level.
    pub log: bool,
}

/// Constructs engine instances.
///
/// Building is the expensive, one-time step (locating binaries, probing
/// capabilities, allocating the namespace). Hosts call it lazily and cache
/// the result.
#[async_trait]
pub trait EngineBuilder: Send + Sync {
    /// Name of the backend this builder produces.
    fn backend(&self) -> &'static str;

    /// Construct a ready-to-use engine.
    async fn build(&self, options: &BuildOptions) -> Result<Arc<dyn Engine>>;
}
