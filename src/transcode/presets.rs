//! Ready-made conversions.
//!
//! Each [`Preset`] turns an input file into a complete [`TranscodeRequest`]:
//! argument vector, output name, and content type. Presets are parsed from
//! `name[:key=value,...]`, e.g. `compress-video:crf=30` or
//! `crop:w=640,h=360`.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use transforge_common::paths::{change_extension, mime_from_name, output_name};

use super::request::{TranscodeRequest, INPUT, OUTPUT};

/// Default CRF for [`Preset::CompressVideo`].
pub const DEFAULT_CRF: u8 = 28;
/// Accepted CRF range for [`Preset::CompressVideo`].
pub const CRF_RANGE: std::ops::RangeInclusive<u8> = 18..=35;
/// Default bitrate (kbit/s) for [`Preset::CompressMp3`].
pub const DEFAULT_MP3_BITRATE: u32 = 128;
/// Bitrates (kbit/s) offered by [`Preset::CompressMp3`].
pub const MP3_BITRATES: [u32; 4] = [96, 128, 192, 256];

const H264_ARGS: &[&str] = &[
    "-c:v", "libx264", "-preset", "medium", "-crf", "23", "-c:a", "aac", "-b:a", "192k",
];

/// A conversion from the tool catalogue.
#[derive(Debug, Clone, PartialEq)]
pub enum Preset {
    /// Extract the audio track as MP3.
    Mp3,
    /// Re-encode audio as Ogg Vorbis.
    Ogg,
    /// H.264/AAC in an MP4 container.
    Mp4,
    /// VP9/Opus in a WebM container.
    Webm,
    /// H.264/AAC in a Matroska container.
    Mkv,
    /// Animated GIF to an MP4 that plays everywhere.
    GifToMp4,
    /// Video to animated GIF through a generated palette.
    Gif { fps: u32, width: u32 },
    /// Smaller H.264 MP4 at the given CRF.
    CompressVideo { crf: u8 },
    /// Re-encode MP3 at the given bitrate.
    CompressMp3 { bitrate: u32 },
    /// Shrink WAV with IMA ADPCM at 22.05 kHz.
    CompressWav,
    /// Re-encode a GIF through an in-graph palette, single pass.
    CompressGif { fps: u32, width: u32 },
    /// Cut `duration` seconds starting at `start` without re-encoding.
    Trim { start: f64, duration: f64 },
    /// Crop a `width`x`height` window at (`x`, `y`).
    Crop { width: u32, height: u32, x: u32, y: u32 },
}

/// Catalogue entry: name and summary.
pub const CATALOGUE: &[(&str, &str)] = &[
    ("mp3", "Extract audio as MP3 (192k)"),
    ("ogg", "Convert audio to Ogg Vorbis"),
    ("mp4", "Convert video to H.264/AAC MP4"),
    ("mov-to-mp4", "Convert QuickTime MOV to MP4"),
    ("webm", "Convert video to VP9/Opus WebM"),
    ("mkv", "Convert video to H.264/AAC MKV"),
    ("gif-to-mp4", "Convert animated GIF to MP4"),
    ("gif", "Convert video to GIF [fps=10,width=480]"),
    ("compress-video", "Compress video to MP4 [crf=18..35, default 28]"),
    ("compress-mp3", "Compress MP3 [bitrate=96|128|192|256, default 128]"),
    ("compress-wav", "Compress WAV with IMA ADPCM at 22.05 kHz"),
    ("compress-gif", "Compress GIF [fps=10,width=480]"),
    ("trim", "Cut a clip without re-encoding [start=0,duration=5]"),
    ("crop", "Crop video [w=480,h=480,x=0,y=0]"),
];

/// Error parsing or validating a preset.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PresetError {
    #[error("Unknown preset '{0}'")]
    Unknown(String),

    #[error("Invalid parameter '{key}' for preset '{preset}': {message}")]
    InvalidParam {
        preset: String,
        key: String,
        message: String,
    },
}

impl Preset {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Ogg => "ogg",
            Self::Mp4 => "mp4",
            Self::Webm => "webm",
            Self::Mkv => "mkv",
            Self::GifToMp4 => "gif-to-mp4",
            Self::Gif { .. } => "gif",
            Self::CompressVideo { .. } => "compress-video",
            Self::CompressMp3 { .. } => "compress-mp3",
            Self::CompressWav => "compress-wav",
            Self::CompressGif { .. } => "compress-gif",
            Self::Trim { .. } => "trim",
            Self::Crop { .. } => "crop",
        }
    }

    /// Output file name for `input_name`.
    pub fn output_name(&self, input_name: &str) -> String {
        match self {
            Self::Mp3 => change_extension(input_name, "mp3"),
            Self::Ogg => change_extension(input_name, "ogg"),
            Self::Mp4 | Self::GifToMp4 => change_extension(input_name, "mp4"),
            Self::Webm => change_extension(input_name, "webm"),
            Self::Mkv => change_extension(input_name, "mkv"),
            Self::Gif { .. } => change_extension(input_name, "gif"),
            Self::CompressVideo { .. } => output_name(input_name, Some("compressed"), "mp4"),
            Self::CompressMp3 { bitrate } => {
                output_name(input_name, Some(&format!("{bitrate}k")), "mp3")
            }
            Self::CompressWav => output_name(input_name, Some("compressed"), "wav"),
            Self::CompressGif { .. } => output_name(input_name, Some("compressed"), "gif"),
            Self::Trim { .. } => output_name(input_name, Some("trim"), "mp4"),
            Self::Crop { .. } => output_name(input_name, Some("crop"), "mp4"),
        }
    }

    /// Build the request converting `input_bytes` named `input_name`.
    pub fn request(&self, input_bytes: impl Into<Bytes>, input_name: &str) -> TranscodeRequest {
        let output = self.output_name(input_name);
        let mime_type = mime_from_name(&output);

        let mut request = TranscodeRequest::new(input_bytes, input_name, output, self.arguments())
            .with_mime_type(mime_type);
        if let Some(prepass) = self.prepass() {
            request = request.with_prepass(prepass);
        }
        request
    }

    /// Main argument vector, with placeholders.
    pub fn arguments(&self) -> Vec<String> {
        let mut args: Vec<String> = Vec::new();
        push(&mut args, &["-i", INPUT]);

        match self {
            Self::Mp3 => push(&mut args, &["-vn", "-c:a", "libmp3lame", "-b:a", "192k"]),
            Self::Ogg => push(&mut args, &["-c:a", "libvorbis", "-qscale:a", "5"]),
            Self::Mp4 => {
                push(&mut args, H264_ARGS);
                push(&mut args, &["-movflags", "faststart"]);
            }
            Self::Mkv => push(&mut args, H264_ARGS),
            Self::Webm => push(
                &mut args,
                &["-c:v", "libvpx-vp9", "-b:v", "0", "-crf", "33", "-c:a", "libopus"],
            ),
            Self::GifToMp4 => push(
                &mut args,
                &[
                    "-movflags",
                    "faststart",
                    "-pix_fmt",
                    "yuv420p",
                    "-vf",
                    "scale=trunc(iw/2)*2:trunc(ih/2)*2",
                ],
            ),
            Self::Gif { fps, width } => {
                let filter =
                    format!("fps={fps},scale={width}:-1:flags=lanczos[x];[x][1:v]paletteuse");
                push(&mut args, &["-i", "SCRATCH.png", "-lavfi", filter.as_str()]);
            }
            Self::CompressVideo { crf } => {
                let crf = crf.to_string();
                push(
                    &mut args,
                    &[
                        "-c:v", "libx264", "-preset", "fast", "-crf", crf.as_str(), "-c:a", "aac", "-b:a",
                        "128k", "-movflags", "faststart",
                    ],
                );
            }
            Self::CompressMp3 { bitrate } => {
                let bitrate = format!("{bitrate}k");
                push(&mut args, &["-c:a", "libmp3lame", "-b:a", bitrate.as_str()]);
            }
            Self::CompressWav => push(&mut args, &["-c:a", "adpcm_ima_wav", "-ar", "22050"]),
            Self::CompressGif { fps, width } => {
                let filter = format!(
                    "fps={fps},scale={width}:-1:flags=lanczos,split[s0][s1];[s0]palettegen[p];[s1][p]paletteuse"
                );
                push(&mut args, &["-vf", filter.as_str()]);
            }
            Self::Trim { start, duration } => {
                // Input seeking: `-ss` goes before `-i`.
                args.clear();
                let (start, duration) = (start.to_string(), duration.to_string());
                push(
                    &mut args,
                    &["-ss", start.as_str(), "-i", INPUT, "-t", duration.as_str(), "-c", "copy"],
                );
            }
            Self::Crop { width, height, x, y } => {
                let filter = format!("crop={width}:{height}:{x}:{y}");
                push(&mut args, &["-filter:v", filter.as_str(), "-c:a", "copy"]);
            }
        }

        args.push(OUTPUT.to_string());
        args
    }

    /// Argument vector run before the main one, if any.
    pub fn prepass(&self) -> Option<Vec<String>> {
        match self {
            Self::Gif { fps, width } => Some(
                [
                    "-i".to_string(),
                    INPUT.to_string(),
                    "-vf".to_string(),
                    format!("fps={fps},scale={width}:-1:flags=lanczos,palettegen"),
                    "SCRATCH.png".to_string(),
                ]
                .into(),
            ),
            _ => None,
        }
    }

    /// Encoders the engine needs for this preset.
    pub fn encoders(&self) -> &'static [&'static str] {
        match self {
            Self::Mp3 | Self::CompressMp3 { .. } => &["libmp3lame"],
            Self::Ogg => &["libvorbis"],
            Self::Mp4 | Self::Mkv | Self::GifToMp4 | Self::CompressVideo { .. } => {
                &["libx264", "aac"]
            }
            Self::Webm => &["libvpx-vp9", "libopus"],
            Self::CompressWav => &["adpcm_ima_wav"],
            Self::Gif { .. } | Self::CompressGif { .. } => &["gif"],
            Self::Trim { .. } => &[],
            Self::Crop { .. } => &["libx264"],
        }
    }
}

fn push(args: &mut Vec<String>, items: &[&str]) {
    args.extend(items.iter().map(|s| s.to_string()));
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gif { fps, width } => write!(f, "gif:fps={fps},width={width}"),
            Self::CompressGif { fps, width } => write!(f, "compress-gif:fps={fps},width={width}"),
            Self::CompressVideo { crf } => write!(f, "compress-video:crf={crf}"),
            Self::CompressMp3 { bitrate } => write!(f, "compress-mp3:bitrate={bitrate}"),
            Self::Trim { start, duration } => write!(f, "trim:start={start},duration={duration}"),
            Self::Crop { width, height, x, y } => {
                write!(f, "crop:w={width},h={height},x={x},y={y}")
            }
            other => f.write_str(other.name()),
        }
    }
}

struct Params<'a> {
    preset: &'a str,
    values: HashMap<&'a str, &'a str>,
}

impl<'a> Params<'a> {
    fn parse(preset: &'a str, raw: Option<&'a str>) -> Result<Self, PresetError> {
        let mut values = HashMap::new();
        for pair in raw.unwrap_or_default().split(',').filter(|p| !p.trim().is_empty()) {
            let (key, value) = pair.split_once('=').ok_or_else(|| PresetError::InvalidParam {
                preset: preset.to_string(),
                key: pair.trim().to_string(),
                message: "expected key=value".to_string(),
            })?;
            values.insert(key.trim(), value.trim());
        }
        Ok(Self { preset, values })
    }

    fn get<T: FromStr>(&self, key: &str, default: T) -> Result<T, PresetError> {
        match self.values.get(key) {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|_| self.invalid(key, format!("cannot parse '{raw}'"))),
        }
    }

    fn invalid(&self, key: &str, message: impl Into<String>) -> PresetError {
        PresetError::InvalidParam {
            preset: self.preset.to_string(),
            key: key.to_string(),
            message: message.into(),
        }
    }

    /// `fps` and `width` shared by the GIF presets.
    fn gif_geometry(&self) -> Result<(u32, u32), PresetError> {
        self.reject_unknown(&["fps", "width"])?;
        let fps = self.get("fps", 10u32)?;
        let width = self.get("width", 480u32)?;
        if fps == 0 {
            return Err(self.invalid("fps", "must be positive"));
        }
        if width == 0 {
            return Err(self.invalid("width", "must be positive"));
        }
        Ok((fps, width))
    }

    fn reject_unknown(&self, known: &[&str]) -> Result<(), PresetError> {
        match self.values.keys().find(|k| !known.contains(*k)) {
            Some(key) => Err(self.invalid(key, "unknown parameter")),
            None => Ok(()),
        }
    }
}

impl FromStr for Preset {
    type Err = PresetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, raw) = match s.split_once(':') {
            Some((name, raw)) => (name.trim(), Some(raw)),
            None => (s.trim(), None),
        };
        let params = Params::parse(name, raw)?;

        let preset = match name {
            "mp3" => Self::Mp3,
            "ogg" => Self::Ogg,
            "mp4" | "mov-to-mp4" => Self::Mp4,
            "webm" => Self::Webm,
            "mkv" => Self::Mkv,
            "gif-to-mp4" => Self::GifToMp4,
            "gif" => {
                let (fps, width) = params.gif_geometry()?;
                return Ok(Self::Gif { fps, width });
            }
            "compress-gif" => {
                let (fps, width) = params.gif_geometry()?;
                return Ok(Self::CompressGif { fps, width });
            }
            "compress-wav" => Self::CompressWav,
            "compress-video" => {
                params.reject_unknown(&["crf"])?;
                let crf = params.get("crf", DEFAULT_CRF)?;
                if !CRF_RANGE.contains(&crf) {
                    return Err(params.invalid(
                        "crf",
                        format!("must be within {}..={}", CRF_RANGE.start(), CRF_RANGE.end()),
                    ));
                }
                return Ok(Self::CompressVideo { crf });
            }
            "compress-mp3" => {
                params.reject_unknown(&["bitrate"])?;
                let bitrate = params.get("bitrate", DEFAULT_MP3_BITRATE)?;
                if !MP3_BITRATES.contains(&bitrate) {
                    return Err(params.invalid("bitrate", format!("must be one of {MP3_BITRATES:?}")));
                }
                return Ok(Self::CompressMp3 { bitrate });
            }
            "trim" => {
                params.reject_unknown(&["start", "duration"])?;
                let start = params.get("start", 0.0f64)?;
                let duration = params.get("duration", 5.0f64)?;
                if !start.is_finite() || start < 0.0 {
                    return Err(params.invalid("start", "must be zero or positive"));
                }
                if !duration.is_finite() || duration <= 0.0 {
                    return Err(params.invalid("duration", "must be positive"));
                }
                return Ok(Self::Trim { start, duration });
            }
            "crop" => {
                params.reject_unknown(&["w", "h", "x", "y"])?;
                let width = params.get("w", 480u32)?;
                let height = params.get("h", 480u32)?;
                if width == 0 || height == 0 {
                    return Err(params.invalid("w", "crop window must not be empty"));
                }
                return Ok(Self::Crop {
                    width,
                    height,
                    x: params.get("x", 0u32)?,
                    y: params.get("y", 0u32)?,
                });
            }
            other => return Err(PresetError::Unknown(other.to_string())),
        };

        params.reject_unknown(&[])?;
        Ok(preset)
    }
}
