use clap::{Parser, Subcommand};
use std::path::PathBuf;
use transforge::config::EngineBackend;
use transforge::transcode::Preset;

#[derive(Parser)]
#[command(name = "transforge")]
#[command(author, version, about = "Local media transcoding job host")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Convert one or more files through the job queue
    Convert {
        /// Input files, processed in order
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Preset, e.g. `mp3` or `compress-video:crf=30` (see `presets`)
        #[arg(short, long, conflicts_with = "args")]
        preset: Option<Preset>,

        /// Output file name (single input only; raw arguments)
        #[arg(long, conflicts_with = "preset")]
        output_name: Option<String>,

        /// Output extension used to name outputs (raw arguments)
        #[arg(long, conflicts_with_all = ["preset", "output_name"])]
        output_ext: Option<String>,

        /// Declared content type of the output
        #[arg(long)]
        mime: Option<String>,

        /// Directory for finished files (overrides `output.dir`)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Engine backend (overrides `engine.backend`)
        #[arg(long)]
        engine: Option<EngineBackend>,

        /// Per-job timeout in seconds, measured from submission
        #[arg(long)]
        timeout: Option<u64>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,

        /// Raw engine arguments using INPUT and OUTPUT placeholders
        #[arg(last = true)]
        args: Vec<String>,
    },

    /// List available presets
    Presets,

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
