//! Transcode requests and placeholder resolution.
//!
//! Argument vectors refer to staged files through whole-token placeholders:
//! `INPUT`, `OUTPUT`, and `SCRATCH.<ext>` for a per-job intermediate. The
//! executor binds each placeholder to a generated virtual path just before
//! invoking the engine.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use bytes::Bytes;
use transforge_common::{Result, TranscodeError};

/// Placeholder for the staged input file.
pub const INPUT: &str = "INPUT";
/// Placeholder for the reserved output file.
pub const OUTPUT: &str = "OUTPUT";
/// Prefix of intermediate-file placeholders (`SCRATCH.png`).
pub const SCRATCH_PREFIX: &str = "SCRATCH.";

/// A single transcode job as submitted by a caller.
#[derive(Debug, Clone)]
pub struct TranscodeRequest {
    /// Raw input media.
    pub input_bytes: Bytes,
    /// Logical input file name; its extension is kept when staging.
    pub input_name: String,
    /// Desired output file name.
    pub output_name: String,
    /// Main argument vector.
    pub arguments: Vec<String>,
    /// Declared content type of the output, inferred when absent.
    pub mime_type: Option<String>,
    /// Argument vectors run, in order, before the main one.
    pub prepasses: Vec<Vec<String>>,
    /// Host-level watchdog measured from submission.
    pub timeout: Option<Duration>,
}

impl TranscodeRequest {
    pub fn new<I, S>(
        input_bytes: impl Into<Bytes>,
        input_name: impl Into<String>,
        output_name: impl Into<String>,
        arguments: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            input_bytes: input_bytes.into(),
            input_name: input_name.into(),
            output_name: output_name.into(),
            arguments: arguments.into_iter().map(Into::into).collect(),
            mime_type: None,
            prepasses: Vec::new(),
            timeout: None,
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn with_prepass<I, S>(mut self, arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prepasses
            .push(arguments.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Fill in missing placeholders the way a bare ffmpeg command line would
    /// be completed: `-i INPUT` is prepended when no pass names the input,
    /// and `OUTPUT` is appended to the main vector when absent.
    pub fn with_default_io(mut self) -> Self {
        if !self.mentions_input() {
            let mut completed = vec!["-i".to_string(), INPUT.to_string()];
            completed.append(&mut self.arguments);
            self.arguments = completed;
        }
        if !self.arguments.iter().any(|a| a == OUTPUT) {
            self.arguments.push(OUTPUT.to_string());
        }
        self
    }

    /// All argument vectors in execution order.
    pub fn passes(&self) -> impl Iterator<Item = &[String]> {
        self.prepasses
            .iter()
            .map(Vec::as_slice)
            .chain(std::iter::once(self.arguments.as_slice()))
    }

    /// Extensions of every `SCRATCH.<ext>` placeholder across all passes.
    pub fn scratch_extensions(&self) -> BTreeSet<String> {
        self.passes()
            .flatten()
            .filter_map(|a| a.strip_prefix(SCRATCH_PREFIX))
            .filter(|ext| !ext.is_empty())
            .map(str::to_string)
            .collect()
    }

    fn mentions_input(&self) -> bool {
        self.passes().flatten().any(|a| a == INPUT)
    }

    /// Reject requests that cannot be executed, before anything is staged.
    pub fn validate(&self) -> Result<()> {
        if self.input_bytes.is_empty() {
            return Err(TranscodeError::invalid_request("input buffer is empty"));
        }
        if self.output_name.trim().is_empty() {
            return Err(TranscodeError::invalid_request("output name is empty"));
        }
        if !self.mentions_input() {
            return Err(TranscodeError::invalid_request(format!(
                "arguments never reference {INPUT}"
            )));
        }
        if !self.arguments.iter().any(|a| a == OUTPUT) {
            return Err(TranscodeError::invalid_request(format!(
                "main arguments do not reference {OUTPUT}"
            )));
        }
        if self.passes().flatten().any(|a| a == SCRATCH_PREFIX) {
            return Err(TranscodeError::invalid_request(
                "scratch placeholder is missing an extension",
            ));
        }
        Ok(())
    }
}

/// Virtual paths bound to the placeholders of one job.
///
/// # Example
///
/// ```
/// use transforge::transcode::request::Bindings;
///
/// let bindings = Bindings::new("in_1.mp4", "out_2.gif").with_scratch("png", "scratch_3.png");
/// let args = ["-i", "INPUT", "-i", "SCRATCH.png", "OUTPUT"].map(String::from);
/// assert_eq!(
///     bindings.resolve(&args),
///     ["-i", "in_1.mp4", "-i", "scratch_3.png", "out_2.gif"]
/// );
/// ```
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    input: String,
    output: String,
    scratch: BTreeMap<String, String>,
}

impl Bindings {
    pub fn new(input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            scratch: BTreeMap::new(),
        }
    }

    pub fn with_scratch(mut self, ext: impl Into<String>, path: impl Into<String>) -> Self {
        self.scratch.insert(ext.into(), path.into());
        self
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    /// Replace whole-token placeholders; everything else passes through.
    pub fn resolve(&self, arguments: &[String]) -> Vec<String> {
        arguments
            .iter()
            .map(|arg| match arg.as_str() {
                INPUT => self.input.clone(),
                OUTPUT => self.output.clone(),
                other => other
                    .strip_prefix(SCRATCH_PREFIX)
                    .and_then(|ext| self.scratch.get(ext))
                    .cloned()
                    .unwrap_or_else(|| arg.clone()),
            })
            .collect()
    }
}
