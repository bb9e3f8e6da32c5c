//! # transforge-engine
//!
//! Transcoding engine backends for transforge.
//!
//! An [`Engine`] exposes a private, flat file namespace (write, read, delete
//! by bare name) and a single [`Engine::run`] operation taking an
//! ffmpeg-style argument vector. Engines are constructed through an
//! [`EngineBuilder`]; construction is expensive and performed once per host.
//!
//! Backends:
//!
//! - [`FfmpegEngine`]: an installed `ffmpeg` binary running inside a private
//!   temporary directory.
//! - [`PassthroughEngine`]: in-memory copy engine for environments without a
//!   media toolchain.

pub mod command;
pub mod engine;
pub mod error;
pub mod ffmpeg;
pub mod namespace;
pub mod passthrough;
pub mod tools;

pub use command::{ToolCommand, ToolOutput};
pub use engine::{BuildOptions, Engine, EngineBuilder, RunOutput};
pub use error::{Error, Result};
pub use ffmpeg::{FfmpegBuilder, FfmpegEngine};
pub use namespace::{DirNamespace, MemoryNamespace};
pub use passthrough::{PassthroughBuilder, PassthroughEngine};
pub use tools::{check_tools, ToolInfo};
