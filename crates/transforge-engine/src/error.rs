//! Error types for transforge-engine.

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Faults raised by an engine backend.
///
/// A non-zero exit status is not a fault: it is reported through
/// [`RunOutput`](crate::RunOutput). These variants cover everything else.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required external tool is not available.
    #[error("tool not found: {tool}")]
    ToolNotFound { tool: String },

    /// An external tool failed to start or crashed.
    #[error("tool execution failed: {tool}: {message}")]
    ToolFailed { tool: String, message: String },

    /// The engine lacks a capability the host requires.
    #[error("missing capability: {capability}")]
    MissingCapability { capability: String },

    /// The namespace has no entry with this name.
    #[error("no such entry: {path}")]
    NotFound { path: String },

    /// The name is not a valid flat namespace key.
    #[error("invalid virtual path: {path:?}")]
    InvalidPath { path: String },

    /// The namespace cannot hold more data.
    #[error("namespace exhausted: {needed} bytes requested, {available} available")]
    NamespaceFull { needed: u64, available: u64 },

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a tool not found error.
    pub fn tool_not_found(tool: impl Into<String>) -> Self {
        Self::ToolNotFound { tool: tool.into() }
    }

    /// Create a tool execution failed error.
    pub fn tool_failed(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolFailed {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Create a missing capability error.
    pub fn missing_capability(capability: impl Into<String>) -> Self {
        Self::MissingCapability {
            capability: capability.into(),
        }
    }

    /// Create a not found error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Create an invalid path error.
    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath { path: path.into() }
    }

    /// Whether this error means the entry does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}
