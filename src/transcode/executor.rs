//! Transcode job executor.
//!
//! Runs one request against the shared engine: stage the input, bind the
//! placeholders, run every pass, collect the output, and clean up. The caller
//! must hold the single-flight gate; see [`super::queue`].

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info, warn};
use transforge_common::{EventBus, EventPayload, JobId, JobStage, Result, TranscodeError};

use super::loader::{EngineHandle, EngineLoader};
use super::request::{Bindings, TranscodeRequest};
use super::staging::{StagingArea, StagingScope};

/// Raw outcome of a completed job.
#[derive(Debug, Clone)]
pub struct TranscodeResult {
    pub output_bytes: Bytes,
    pub output_name: String,
    /// Declared content type, if the request carried one.
    pub mime_type: Option<String>,
}

/// Executes requests against the engine owned by a loader.
pub struct JobExecutor {
    loader: Arc<EngineLoader>,
    staging: StagingArea,
    events: Arc<EventBus>,
}

impl JobExecutor {
    pub fn new(loader: Arc<EngineLoader>, staging: StagingArea, events: Arc<EventBus>) -> Self {
        Self {
            loader,
            staging,
            events,
        }
    }

    pub fn loader(&self) -> &Arc<EngineLoader> {
        &self.loader
    }

    pub fn staging(&self) -> &StagingArea {
        &self.staging
    }

    /// Execute `request` to completion.
    ///
    /// Every staged entry is removed before this returns, whatever the
    /// outcome.
    pub async fn execute(&self, job_id: JobId, request: &TranscodeRequest) -> Result<TranscodeResult> {
        request.validate()?;

        self.progress(job_id, JobStage::LoadingEngine, "ensure_ready");
        let engine = self.loader.ensure_ready().await?;

        let mut scope = self.staging.scope(engine.clone());
        let outcome = self.run_staged(job_id, request, &engine, &mut scope).await;

        self.progress(
            job_id,
            JobStage::CleaningUp,
            format!("{} entries", scope.entries().len()),
        );
        scope.release().await;

        outcome
    }

    async fn run_staged(
        &self,
        job_id: JobId,
        request: &TranscodeRequest,
        engine: &EngineHandle,
        scope: &mut StagingScope,
    ) -> Result<TranscodeResult> {
        self.progress(job_id, JobStage::Staging, request.input_name.clone());
        let input = scope
            .write_input(request.input_bytes.clone(), &request.input_name)
            .await?;
        let output = scope.reserve_output(&request.output_name);

        let mut bindings = Bindings::new(&input.virtual_path, &output.virtual_path);
        for ext in request.scratch_extensions() {
            let scratch = scope.reserve_scratch(&ext);
            bindings = bindings.with_scratch(ext, scratch.virtual_path);
        }

        let total = request.prepasses.len() + 1;
        for (index, pass) in request.passes().enumerate() {
            let args = bindings.resolve(pass);
            self.progress(
                job_id,
                JobStage::Transcoding,
                format!("pass {}/{}", index + 1, total),
            );
            debug!(job_id = %job_id, args = ?args, "Invoking engine");

            let run = engine.run(&args).await.map_err(|e| {
                warn!(job_id = %job_id, error = %e, "Engine fault");
                TranscodeError::transcode_failure(e.to_string())
            })?;

            if !run.success() {
                warn!(
                    job_id = %job_id,
                    exit_code = run.exit_code,
                    pass = index + 1,
                    "Engine reported failure"
                );
                let diagnostic = if run.diagnostic.trim().is_empty() {
                    format!("engine exited with status {}", run.exit_code)
                } else {
                    run.diagnostic
                };
                return Err(TranscodeError::transcode_failure(diagnostic));
            }
        }

        self.progress(job_id, JobStage::Collecting, output.virtual_path.clone());
        let output_bytes = scope.read_output(&output.virtual_path).await?;
        if output_bytes.is_empty() {
            return Err(TranscodeError::transcode_failure(
                "engine produced an empty output file",
            ));
        }

        info!(
            job_id = %job_id,
            output = %request.output_name,
            size_bytes = output_bytes.len(),
            "Transcode finished"
        );

        Ok(TranscodeResult {
            output_bytes,
            output_name: request.output_name.clone(),
            mime_type: request.mime_type.clone(),
        })
    }

    fn progress(&self, job_id: JobId, stage: JobStage, step: impl Into<String>) {
        self.events.broadcast(EventPayload::JobProgress {
            job_id,
            stage,
            step: step.into(),
        });
    }
}
