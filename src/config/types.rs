use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

/// Which engine implementation backs the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineBackend {
    #[default]
    Ffmpeg,
    Passthrough,
}

impl std::str::FromStr for EngineBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ffmpeg" => Ok(Self::Ffmpeg),
            "passthrough" => Ok(Self::Passthrough),
            other => Err(format!("unknown engine backend '{other}'")),
        }
    }
}

impl std::fmt::Display for EngineBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ffmpeg => write!(f, "ffmpeg"),
            Self::Passthrough => write!(f, "passthrough"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub backend: EngineBackend,

    /// Path to the ffmpeg executable (defaults to a PATH lookup)
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    /// Encoders the engine must offer; initialization fails otherwise
    #[serde(default)]
    pub required_encoders: Vec<String>,

    /// Forward engine diagnostics to the debug log
    #[serde(default = "default_true")]
    pub log: bool,
}

impl EngineConfig {
    /// Add `encoders` to the required set, skipping ones already listed.
    pub fn require_encoders<I, S>(&mut self, encoders: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for encoder in encoders {
            let encoder = encoder.as_ref();
            if !self.required_encoders.iter().any(|e| e == encoder) {
                self.required_encoders.push(encoder.to_string());
            }
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: EngineBackend::default(),
            ffmpeg_path: None,
            required_encoders: Vec::new(),
            log: default_true(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    /// Applied to requests that carry no timeout of their own (0 = none)
    #[serde(default)]
    pub default_timeout_secs: u64,

    /// Number of finished job states kept for status queries
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl QueueConfig {
    pub fn default_timeout(&self) -> Option<Duration> {
        (self.default_timeout_secs > 0).then(|| Duration::from_secs(self.default_timeout_secs))
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: 0,
            history_limit: default_history_limit(),
        }
    }
}

fn default_history_limit() -> usize {
    256
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Directory finished artifacts are written to
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_true() -> bool {
    true
}
