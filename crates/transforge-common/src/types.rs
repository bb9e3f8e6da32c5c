//! Core type definitions for jobs and staged files.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a transcode job.
///
/// `Queued -> Running -> Completed | Failed`. A queued job may also end as
/// `Cancelled` or `TimedOut` without ever running; a running job ends as one
/// of those when its result was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Waiting in the FIFO for the engine.
    Queued,
    /// Currently holding the engine.
    Running,
    /// Finished with an artifact.
    Completed,
    /// Finished with a typed failure.
    Failed,
    /// Withdrawn by the caller.
    Cancelled,
    /// Host watchdog elapsed.
    TimedOut,
}

impl JobState {
    /// Whether no further transitions can happen.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Queued | Self::Running)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::TimedOut => write!(f, "timedout"),
        }
    }
}

/// Role of an entry in the engine's virtual namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Caller bytes copied into the engine.
    Input,
    /// Produced by the engine, read back by the host.
    Output,
    /// Intermediate produced and consumed by the engine within one job.
    Scratch,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::Output => write!(f, "output"),
            Self::Scratch => write!(f, "scratch"),
        }
    }
}

/// Pipeline stage reported while a job is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    /// Waiting for the engine to initialize.
    LoadingEngine,
    /// Copying input into the engine's namespace.
    Staging,
    /// The engine is transcoding.
    Transcoding,
    /// Reading the output back.
    Collecting,
    /// Removing staged entries.
    CleaningUp,
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LoadingEngine => write!(f, "loading_engine"),
            Self::Staging => write!(f, "staging"),
            Self::Transcoding => write!(f, "transcoding"),
            Self::Collecting => write!(f, "collecting"),
            Self::CleaningUp => write!(f, "cleaning_up"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!JobState::Queued.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(JobState::Cancelled.is_terminal());
        assert!(JobState::TimedOut.is_terminal());
    }

    #[test]
    fn test_display() {
        assert_eq!(JobState::Running.to_string(), "running");
        assert_eq!(Direction::Scratch.to_string(), "scratch");
        assert_eq!(JobStage::LoadingEngine.to_string(), "loading_engine");
    }

    #[test]
    fn test_serde() {
        let json = serde_json::to_string(&JobState::Completed).unwrap();
        assert_eq!(json, "\"completed\"");
        let back: JobStage = serde_json::from_str("\"cleaning_up\"").unwrap();
        assert_eq!(back, JobStage::CleaningUp);
    }
}
