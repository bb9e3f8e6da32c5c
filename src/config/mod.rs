mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config = parse_config(&content)
        .with_context(|| format!("Failed to load config file: {:?}", path))?;

    tracing::debug!(path = %path.display(), "Loaded configuration");
    Ok(config)
}

/// Parse and validate configuration from TOML text
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).context("Failed to parse configuration")?;
    validate_config(&config)?;
    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./transforge.toml",
        "./config.toml",
        "~/.config/transforge/config.toml",
        "/etc/transforge/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
fn validate_config(config: &Config) -> Result<()> {
    if config.queue.history_limit == 0 {
        anyhow::bail!("queue.history_limit cannot be 0");
    }

    if config.engine.backend == EngineBackend::Ffmpeg {
        if let Some(path) = &config.engine.ffmpeg_path {
            if !path.exists() {
                tracing::warn!("Configured ffmpeg path does not exist: {:?}", path);
            }
        }
    }

    for encoder in &config.engine.required_encoders {
        if encoder.trim().is_empty() {
            anyhow::bail!("engine.required_encoders contains an empty entry");
        }
    }

    Ok(())
}
