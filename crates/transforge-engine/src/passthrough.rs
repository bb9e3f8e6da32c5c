//! In-memory engine that copies its input to its output.
//!
//! Useful for smoke testing the host without a media toolchain: the argument
//! vector is scanned for the first entry present in the namespace, which is
//! copied to the name given as the last argument. Option-like arguments are
//! ignored.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::engine::{BuildOptions, Engine, EngineBuilder, RunOutput};
use crate::namespace::MemoryNamespace;
use crate::Result;

/// Capability advertised by the passthrough engine.
pub const COPY_CAPABILITY: &str = "copy";

/// Constructs [`PassthroughEngine`] instances.
#[derive(Debug, Clone, Default)]
pub struct PassthroughBuilder {
    capacity: Option<u64>,
}

impl PassthroughBuilder {
    /// Builder for engines with an unbounded namespace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit the namespace to `bytes`.
    pub fn with_capacity(mut self, bytes: u64) -> Self {
        self.capacity = Some(bytes);
        self
    }
}

#[async_trait]
impl EngineBuilder for PassthroughBuilder {
    fn backend(&self) -> &'static str {
        "passthrough"
    }

    async fn build(&self, _options: &BuildOptions) -> Result<Arc<dyn Engine>> {
        let namespace = match self.capacity {
            Some(bytes) => MemoryNamespace::with_capacity(bytes),
            None => MemoryNamespace::new(),
        };
        Ok(Arc::new(PassthroughEngine { namespace }))
    }
}

/// Engine whose only operation is a byte-for-byte copy.
#[derive(Debug, Default)]
pub struct PassthroughEngine {
    namespace: MemoryNamespace,
}

impl PassthroughEngine {
    /// Engine with an unbounded namespace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Names currently stored in the namespace.
    pub fn entries(&self) -> Vec<String> {
        self.namespace.list()
    }
}

#[async_trait]
impl Engine for PassthroughEngine {
    fn name(&self) -> &'static str {
        "passthrough"
    }

    fn has_capability(&self, capability: &str) -> bool {
        capability == COPY_CAPABILITY
    }

    async fn write_file(&self, path: &str, data: Bytes) -> Result<()> {
        self.namespace.write(path, data)
    }

    async fn read_file(&self, path: &str) -> Result<Bytes> {
        self.namespace.read(path)
    }

    async fn delete_file(&self, path: &str) -> Result<()> {
        self.namespace.remove(path)
    }

    async fn run(&self, args: &[String]) -> Result<RunOutput> {
        let Some((target, sources)) = args.split_last() else {
            return Ok(RunOutput::failed(1, "At least one output file must be specified"));
        };

        let source = sources
            .iter()
            .filter(|a| !a.starts_with('-'))
            .find(|a| self.namespace.contains(a));

        match source {
            Some(source) => {
                let data = self.namespace.read(source)?;
                self.namespace.write(target, data)?;
                Ok(RunOutput::ok())
            }
            None => Ok(RunOutput::failed(
                1,
                format!("{}: No such file or directory", sources.join(" ")),
            )),
        }
    }
}
