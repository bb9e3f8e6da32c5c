//! Engine backed by an installed `ffmpeg` binary.
//!
//! The engine owns a private [`DirNamespace`]; every invocation runs with
//! that directory as its working directory, so the flat names used in
//! argument vectors resolve to namespace entries.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, info};

use crate::command::ToolCommand;
use crate::engine::{BuildOptions, Engine, EngineBuilder, RunOutput};
use crate::namespace::DirNamespace;
use crate::tools::{get_tool_path, parse_encoders};
use crate::{Error, Result};

/// Upper bound for the version and encoder probes run during construction.
const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Arguments prepended to every invocation: no banner, never read stdin,
/// overwrite outputs without prompting.
const BASE_ARGS: &[&str] = &["-hide_banner", "-nostdin", "-y"];

/// Constructs [`FfmpegEngine`] instances.
#[derive(Debug, Clone, Default)]
pub struct FfmpegBuilder {
    ffmpeg_path: Option<PathBuf>,
}

impl FfmpegBuilder {
    /// Locate ffmpeg on `PATH`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefer this executable when it exists.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ffmpeg_path = Some(path.into());
        self
    }
}

#[async_trait]
impl EngineBuilder for FfmpegBuilder {
    fn backend(&self) -> &'static str {
        "ffmpeg"
    }

    async fn build(&self, options: &BuildOptions) -> Result<Arc<dyn Engine>> {
        let binary = get_tool_path("ffmpeg", self.ffmpeg_path.as_deref())?;

        let version = ToolCommand::new(binary.clone())
            .arg("-version")
            .timeout(PROBE_TIMEOUT)
            .execute()
            .await?
            .stdout
            .lines()
            .next()
            .unwrap_or_default()
            .to_string();

        let listing = ToolCommand::new(binary.clone())
            .args(["-hide_banner", "-encoders"])
            .timeout(PROBE_TIMEOUT)
            .execute()
            .await?;
        let encoders = parse_encoders(&listing.stdout);
        if encoders.is_empty() {
            return Err(Error::tool_failed(
                "ffmpeg",
                "encoder listing was empty or unreadable",
            ));
        }

        let namespace = DirNamespace::new()?;

        info!(
            path = %binary.display(),
            version = %version,
            encoders = encoders.len(),
            namespace = %namespace.root().display(),
            "ffmpeg engine initialized"
        );

        Ok(Arc::new(FfmpegEngine {
            binary,
            version,
            encoders,
            namespace,
            log: options.log,
        }))
    }
}

/// A single ffmpeg installation plus its private namespace.
#[derive(Debug)]
pub struct FfmpegEngine {
    binary: PathBuf,
    version: String,
    encoders: BTreeSet<String>,
    namespace: DirNamespace,
    log: bool,
}

impl FfmpegEngine {
    /// First line of `ffmpeg -version`.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// The private namespace.
    pub fn namespace(&self) -> &DirNamespace {
        &self.namespace
    }
}

#[async_trait]
impl Engine for FfmpegEngine {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    fn has_capability(&self, capability: &str) -> bool {
        self.encoders.contains(capability)
    }

    async fn write_file(&self, path: &str, data: Bytes) -> Result<()> {
        self.namespace.write(path, &data).await
    }

    async fn read_file(&self, path: &str) -> Result<Bytes> {
        self.namespace.read(path).await
    }

    async fn delete_file(&self, path: &str) -> Result<()> {
        self.namespace.remove(path).await
    }

    async fn run(&self, args: &[String]) -> Result<RunOutput> {
        debug!(args = ?args, "ffmpeg run");

        let output = ToolCommand::new(self.binary.clone())
            .args(BASE_ARGS.iter().copied())
            .args(args.iter().cloned())
            .current_dir(self.namespace.root())
            .output()
            .await?;

        if self.log {
            for line in output.stderr.lines() {
                debug!(target: "transforge_engine::ffmpeg::log", "{}", line);
            }
        }

        let exit_code = match output.status.code() {
            Some(code) => code,
            // Terminated by a signal: report as a crash.
            None => {
                return Err(Error::tool_failed(
                    "ffmpeg",
                    format!("terminated abnormally ({})", output.status),
                ))
            }
        };

        Ok(RunOutput {
            exit_code,
            diagnostic: output.stderr.trim().to_string(),
        })
    }
}
