//! Video assembly over external tools.
//!
//! Optionally probes `0.png` with ImageMagick `identify`, then runs ffmpeg over
//! the contiguous `%d.png` sequence produced by the sequencer.

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use frame_capture_types::FRAME_EXTENSION;
use thiserror::Error;

use crate::config::EncoderSettings;
use crate::process::{ProcessError, ProcessSpec, run_to_completion};

/// Pixel size of a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error("cannot read dimensions from {0:?}")]
    Unparseable(String),
}

#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("no frames to encode")]
    NoFrames,
    #[error("probe {path:?}: {source}")]
    Probe { path: PathBuf, source: ProbeError },
    #[error("encode: {0}")]
    Encode(#[source] ProcessError),
}

/// Turns a sequenced frame directory into one video file.
#[async_trait]
pub trait VideoAssembler: Send + Sync {
    /// Encode `0.png .. (frame_count-1).png` in `frames_dir` into `output`.
    async fn assemble(
        &self,
        frames_dir: &Path,
        frame_count: usize,
        output: &Path,
    ) -> Result<(), AssemblyError>;
}

/// Parse `identify` output of the form `<width> x <height>`.
pub fn parse_dimensions(text: &str) -> Option<Dimensions> {
    let (w, h) = text.trim().split_once('x')?;
    let width = w.trim().parse::<u32>().ok()?;
    let height = h.trim().parse::<u32>().ok()?;
    (width > 0 && height > 0).then_some(Dimensions { width, height })
}

/// `identify` invocation for one frame.
pub fn probe_command(settings: &EncoderSettings, frame: &Path) -> ProcessSpec {
    ProcessSpec::new(&settings.identify_path)
        .args(["-format", "%w x %h"])
        .arg(frame)
}

/// ffmpeg invocation over `<frames_dir>/%d.png`, in fixed argument order.
pub fn encode_command(
    settings: &EncoderSettings,
    frames_dir: &Path,
    size: Option<Dimensions>,
    output: &Path,
) -> ProcessSpec {
    let pattern = frames_dir.join(format!("%d.{FRAME_EXTENSION}"));
    let mut spec = ProcessSpec::new(&settings.ffmpeg_path)
        .arg("-y")
        .args(["-framerate".to_string(), settings.frame_rate.to_string()])
        .args(["-f", "image2", "-start_number", "0", "-i"])
        .arg(pattern)
        .args(["-c:v", settings.codec.as_str()])
        .args(["-crf".to_string(), settings.crf.to_string()]);
    if let Some(pix_fmt) = settings.pixel_format.as_deref() {
        spec = spec.args(["-pix_fmt", pix_fmt]);
    }
    if let Some(size) = size {
        spec = spec.args(["-s".to_string(), size.to_string()]);
    }
    spec.args(["-progress", "pipe:1", "-nostats"]).arg(output)
}

/// Production assembler backed by `identify` and `ffmpeg`.
pub struct FfmpegAssembler {
    settings: EncoderSettings,
}

impl FfmpegAssembler {
    pub fn new(settings: EncoderSettings) -> Self {
        Self { settings }
    }

    async fn probe(&self, frame: &Path) -> Result<Dimensions, ProbeError> {
        let out = run_to_completion(&probe_command(&self.settings, frame), self.settings.timeout)
            .await?;
        let text = out.stdout_lossy();
        parse_dimensions(&text).ok_or(ProbeError::Unparseable(text))
    }
}

#[async_trait]
impl VideoAssembler for FfmpegAssembler {
    async fn assemble(
        &self,
        frames_dir: &Path,
        frame_count: usize,
        output: &Path,
    ) -> Result<(), AssemblyError> {
        if frame_count == 0 {
            return Err(AssemblyError::NoFrames);
        }

        let size = if self.settings.probe_dimensions {
            let first = frames_dir.join(format!("0.{FRAME_EXTENSION}"));
            let dims = self
                .probe(&first)
                .await
                .map_err(|source| AssemblyError::Probe {
                    path: first.clone(),
                    source,
                })?;
            tracing::debug!(frame = %first.display(), size = %dims, "probed frame size");
            Some(dims)
        } else {
            None
        };

        let spec = encode_command(&self.settings, frames_dir, size, output);
        tracing::info!(
            command = %spec.display(),
            frames = frame_count,
            "encoding video"
        );
        let out = run_to_completion(&spec, self.settings.timeout)
            .await
            .map_err(AssemblyError::Encode)?;
        tracing::debug!(
            output = %output.display(),
            progress_bytes = out.stdout.len(),
            "encoder finished"
        );
        Ok(())
    }
}
