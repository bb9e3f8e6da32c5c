//! Wraps finished output as a downloadable artifact.

use bytes::Bytes;
use serde::Serialize;
use transforge_common::paths::mime_from_name;
use transforge_common::{Result, TranscodeError};

use super::executor::TranscodeResult;

/// Output bytes with a file name and content type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    #[serde(skip)]
    pub bytes: Bytes,
    pub name: String,
    pub mime_type: String,
}

impl Artifact {
    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Package `bytes` as `output_name`.
///
/// The declared content type wins; otherwise it is inferred from the
/// extension of `output_name`.
///
/// # Example
///
/// ```
/// use bytes::Bytes;
/// use transforge::transcode::packager::package;
///
/// let artifact = package(Bytes::from_static(b"ID3"), "song.mp3", None).unwrap();
/// assert_eq!(artifact.mime_type, "audio/mpeg");
/// ```
pub fn package(bytes: Bytes, output_name: &str, declared_mime: Option<&str>) -> Result<Artifact> {
    if output_name.trim().is_empty() {
        return Err(TranscodeError::invalid_request("output name is empty"));
    }

    let mime_type = declared_mime
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| mime_from_name(output_name))
        .to_string();

    Ok(Artifact {
        bytes,
        name: output_name.to_string(),
        mime_type,
    })
}

/// Package a completed [`TranscodeResult`].
pub fn package_result(result: TranscodeResult) -> Result<Artifact> {
    package(
        result.output_bytes,
        &result.output_name,
        result.mime_type.as_deref(),
    )
}
