//! Filename utilities: sanitizing, extensions, and content types.
//!
//! Names handled here are logical filenames supplied by callers, never host
//! paths. Only the final component matters.

/// Extension to content type table used when no type is declared.
const MIME_TYPES: &[(&str, &str)] = &[
    ("mp3", "audio/mpeg"),
    ("ogg", "audio/ogg"),
    ("wav", "audio/wav"),
    ("m4a", "audio/mp4"),
    ("aac", "audio/aac"),
    ("flac", "audio/flac"),
    ("opus", "audio/opus"),
    ("mp4", "video/mp4"),
    ("m4v", "video/mp4"),
    ("webm", "video/webm"),
    ("mkv", "video/x-matroska"),
    ("mov", "video/quicktime"),
    ("avi", "video/x-msvideo"),
    ("gif", "image/gif"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("webp", "image/webp"),
];

/// Fallback content type.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Replace every character outside `[A-Za-z0-9._-]` with `_`.
///
/// # Examples
///
/// ```
/// use transforge_common::paths::sanitize_name;
///
/// assert_eq!(sanitize_name("my clip (1).mp4"), "my_clip__1_.mp4");
/// assert_eq!(sanitize_name("../etc/passwd"), ".._etc_passwd");
/// ```
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Lowercased extension of a logical filename, without the dot.
///
/// A leading dot (hidden file) is not treated as an extension separator.
///
/// # Examples
///
/// ```
/// use transforge_common::paths::extension;
///
/// assert_eq!(extension("Movie.MKV").as_deref(), Some("mkv"));
/// assert_eq!(extension("archive.tar.gz").as_deref(), Some("gz"));
/// assert_eq!(extension("README"), None);
/// assert_eq!(extension(".hidden"), None);
/// ```
pub fn extension(name: &str) -> Option<String> {
    let base = base_name(name);
    match base.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < base.len() => Some(base[idx + 1..].to_lowercase()),
        _ => None,
    }
}

/// Filename without its final extension.
///
/// # Examples
///
/// ```
/// use transforge_common::paths::file_stem;
///
/// assert_eq!(file_stem("holiday.mov"), "holiday");
/// assert_eq!(file_stem("noext"), "noext");
/// ```
pub fn file_stem(name: &str) -> &str {
    let base = base_name(name);
    match base.rfind('.') {
        Some(idx) if idx > 0 => &base[..idx],
        _ => base,
    }
}

/// Replace (or add) the extension of a filename.
///
/// # Examples
///
/// ```
/// use transforge_common::paths::change_extension;
///
/// assert_eq!(change_extension("clip.mp4", "gif"), "clip.gif");
/// assert_eq!(change_extension("clip", "mp3"), "clip.mp3");
/// ```
pub fn change_extension(name: &str, ext: &str) -> String {
    format!("{}.{}", file_stem(name), ext)
}

/// Build an output name from an input name: `<stem>[-<suffix>].<ext>`.
///
/// # Examples
///
/// ```
/// use transforge_common::paths::output_name;
///
/// assert_eq!(output_name("talk.mp4", None, "mp3"), "talk.mp3");
/// assert_eq!(output_name("talk.mp4", Some("compressed"), "mp4"), "talk-compressed.mp4");
/// ```
pub fn output_name(input_name: &str, suffix: Option<&str>, ext: &str) -> String {
    match suffix {
        Some(s) if !s.is_empty() => format!("{}-{}.{}", file_stem(input_name), s, ext),
        _ => change_extension(input_name, ext),
    }
}

/// Content type inferred from the extension of `name`.
///
/// # Examples
///
/// ```
/// use transforge_common::paths::mime_from_name;
///
/// assert_eq!(mime_from_name("song.mp3"), "audio/mpeg");
/// assert_eq!(mime_from_name("video.MKV"), "video/x-matroska");
/// assert_eq!(mime_from_name("a.out"), "application/octet-stream");
/// ```
pub fn mime_from_name(name: &str) -> &'static str {
    extension(name)
        .and_then(|ext| {
            MIME_TYPES
                .iter()
                .find(|(known, _)| *known == ext)
                .map(|(_, mime)| *mime)
        })
        .unwrap_or(OCTET_STREAM)
}

fn base_name(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}
