//! Transforge-Common: Shared types, errors, and events.
//!
//! This crate provides common functionality used across transforge:
//!
//! - **Typed IDs**: Type-safe UUID wrapper for transcode jobs
//! - **Core Types**: Job states and staged-file directions
//! - **Error Handling**: The typed transcode failure taxonomy
//! - **Events**: A broadcast bus for job lifecycle notifications
//! - **Path Utilities**: Name sanitizing, extension and content type helpers
//!
//! # Examples
//!
//! ```
//! use transforge_common::{JobId, JobState, TranscodeError};
//! use transforge_common::paths::mime_from_name;
//!
//! let job_id = JobId::new();
//! assert!(!JobState::Queued.is_terminal());
//!
//! assert_eq!(mime_from_name("clip.mp3"), "audio/mpeg");
//!
//! let err = TranscodeError::invalid_request("input buffer is empty");
//! assert_eq!(err.kind().as_str(), "invalid_request");
//! # let _ = job_id;
//! ```

pub mod error;
pub mod events;
pub mod ids;
pub mod paths;
pub mod types;

pub use error::{ErrorKind, Result, TranscodeError};
pub use events::{Event, EventBus, EventPayload};
pub use ids::*;
pub use types::*;
