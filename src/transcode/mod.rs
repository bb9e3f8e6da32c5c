//! Local transcoding job host.
//!
//! Data flow for one job:
//!
//! ```text
//! caller -> JobQueue -> EngineLoader (ensure ready) -> StagingScope (write input)
//!        -> Engine::run -> StagingScope (read output, release) -> packager -> caller
//! ```
//!
//! [`build_queue`] wires the pieces together from configuration.

pub mod executor;
pub mod loader;
pub mod packager;
pub mod presets;
pub mod queue;
pub mod request;
pub mod staging;

pub use executor::{JobExecutor, TranscodeResult};
pub use loader::{EngineHandle, EngineLoader};
pub use packager::{package, Artifact};
pub use presets::Preset;
pub use queue::{CancelOutcome, JobQueue, JobTicket, QueueOptions};
pub use request::TranscodeRequest;
pub use staging::{StagedFile, StagingArea, StagingScope, StagingStats};

use std::sync::Arc;

use transforge_common::EventBus;
use transforge_engine::{BuildOptions, EngineBuilder, FfmpegBuilder, PassthroughBuilder};

use crate::config::{Config, EngineBackend, EngineConfig};

/// Engine builder for the configured backend.
pub fn engine_builder(config: &EngineConfig) -> Arc<dyn EngineBuilder> {
    match config.backend {
        EngineBackend::Ffmpeg => {
            let builder = match &config.ffmpeg_path {
                Some(path) => FfmpegBuilder::new().with_path(path),
                None => FfmpegBuilder::new(),
            };
            Arc::new(builder)
        }
        EngineBackend::Passthrough => Arc::new(PassthroughBuilder::new()),
    }
}

/// Assemble loader, staging area, executor, and queue around `builder`.
pub fn build_queue_with(
    config: &Config,
    builder: Arc<dyn EngineBuilder>,
    events: Arc<EventBus>,
) -> JobQueue {
    let loader = EngineLoader::new(builder)
        .with_options(BuildOptions {
            log: config.engine.log,
        })
        .with_required_capabilities(config.engine.required_encoders.iter().cloned())
        .with_events(Arc::clone(&events));

    let executor = JobExecutor::new(Arc::new(loader), StagingArea::new(), Arc::clone(&events));

    JobQueue::new(
        executor,
        events,
        QueueOptions {
            default_timeout: config.queue.default_timeout(),
            history_limit: config.queue.history_limit,
        },
    )
}

/// Assemble a queue for the configured backend. Must be called within a
/// Tokio runtime.
pub fn build_queue(config: &Config) -> JobQueue {
    build_queue_with(
        config,
        engine_builder(&config.engine),
        Arc::new(EventBus::default()),
    )
}
