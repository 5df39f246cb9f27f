use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::{
    encode::runner::{ProcessCommand, ProcessRunner},
    foundation::core::{Fps, ImageSize},
    foundation::error::{MapZoomError, MapZoomResult, ProcessFailure},
};

/// Encode an ordered image sequence into a silent H.264 video.
#[derive(Clone, Debug, PartialEq)]
pub struct EncodeJob {
    /// `image2` pattern, e.g. `<workspace>/frame-%05d.png`.
    pub frame_pattern: PathBuf,
    /// Index of the first frame file.
    pub start_number: u64,
    /// Number of frame files available to the encoder.
    pub frame_count: u64,
    pub fps: Fps,
    pub codec: String,
    pub pixel_format: String,
    /// Stop after this many seconds of output.
    pub duration_cap_secs: Option<f64>,
    /// Rescale frames to this size.
    pub scale: Option<ImageSize>,
    pub out_path: PathBuf,
}

impl EncodeJob {
    pub fn validate(&self) -> MapZoomResult<()> {
        if self.frame_count == 0 {
            return Err(MapZoomError::invalid_input("encode needs at least one frame"));
        }
        if self.fps.num == 0 || self.fps.den == 0 {
            return Err(MapZoomError::invalid_input("encode fps must be non-zero"));
        }
        if self.codec.trim().is_empty() || self.pixel_format.trim().is_empty() {
            return Err(MapZoomError::invalid_input(
                "encode codec and pixel format must be set",
            ));
        }
        if let Some(cap) = self.duration_cap_secs
            && (!cap.is_finite() || cap <= 0.0)
        {
            return Err(MapZoomError::invalid_input(
                "encode duration cap must be a positive number of seconds",
            ));
        }
        if let Some(scale) = self.scale {
            scale.validate()?;
            if self.pixel_format == "yuv420p"
                && (!scale.width.is_multiple_of(2) || !scale.height.is_multiple_of(2))
            {
                return Err(MapZoomError::invalid_input(
                    "encode scale must be even (required for yuv420p mp4 output)",
                ));
            }
        }
        Ok(())
    }

    /// Frames that end up in the output once the duration cap is applied.
    pub fn output_frames(&self) -> u64 {
        match self.duration_cap_secs {
            Some(cap) => self.frame_count.min(self.fps.secs_to_frames_floor(cap).max(1)),
            None => self.frame_count,
        }
    }

    /// Expected output duration in seconds.
    pub fn output_duration_secs(&self) -> f64 {
        self.fps.frames_to_secs(self.output_frames())
    }

    pub fn to_command(&self, program: &Path) -> ProcessCommand {
        let mut args: Vec<OsString> = vec![
            "-y".into(),
            "-loglevel".into(),
            "error".into(),
            "-framerate".into(),
            self.fps.to_ffmpeg_rate().into(),
            "-start_number".into(),
            self.start_number.to_string().into(),
            "-i".into(),
            self.frame_pattern.clone().into(),
            "-an".into(),
            "-c:v".into(),
            self.codec.clone().into(),
            "-pix_fmt".into(),
            self.pixel_format.clone().into(),
        ];
        if let Some(scale) = self.scale {
            args.push("-vf".into());
            args.push(format!("scale={}:{}", scale.width, scale.height).into());
        }
        if let Some(cap) = self.duration_cap_secs {
            args.push("-t".into());
            args.push(cap.to_string().into());
        }
        args.push("-movflags".into());
        args.push("+faststart".into());
        args.push(self.out_path.clone().into());

        ProcessCommand::new(program).args(args)
    }
}

/// Combine a silent video with a background audio track.
///
/// The video stream is copied, audio is encoded to AAC and the output ends with the shorter input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MuxJob {
    pub video_path: PathBuf,
    pub audio_path: PathBuf,
    pub out_path: PathBuf,
}

impl MuxJob {
    pub fn to_command(&self, program: &Path) -> ProcessCommand {
        ProcessCommand::new(program)
            .args(["-y", "-loglevel", "error", "-i"])
            .arg(&self.video_path)
            .arg("-i")
            .arg(&self.audio_path)
            .args([
                "-map",
                "0:v:0",
                "-map",
                "1:a:0",
                "-c:v",
                "copy",
                "-c:a",
                "aac",
                "-shortest",
                "-movflags",
                "+faststart",
            ])
            .arg(&self.out_path)
    }
}

/// Drives encode and mux jobs through a [`ProcessRunner`].
pub struct FfmpegTool<'a> {
    runner: &'a dyn ProcessRunner,
    program: PathBuf,
}

impl<'a> FfmpegTool<'a> {
    pub fn new(runner: &'a dyn ProcessRunner, program: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            program: program.into(),
        }
    }

    /// Run `job`; returns the path of the verified output.
    #[tracing::instrument(skip_all, fields(out = %job.out_path.display(), frames = job.frame_count))]
    pub fn encode(&self, job: &EncodeJob) -> MapZoomResult<PathBuf> {
        job.validate()?;
        let cmd = job.to_command(&self.program);
        run_checked(self.runner, &cmd, &job.out_path).map_err(MapZoomError::Encode)?;
        Ok(job.out_path.clone())
    }

    /// Run `job`; returns the path of the verified output.
    #[tracing::instrument(skip_all, fields(out = %job.out_path.display()))]
    pub fn mux(&self, job: &MuxJob) -> MapZoomResult<PathBuf> {
        if !job.audio_path.is_file() {
            return Err(MapZoomError::invalid_input(format!(
                "audio track '{}' does not exist",
                job.audio_path.display()
            )));
        }
        let cmd = job.to_command(&self.program);
        run_checked(self.runner, &cmd, &job.out_path).map_err(MapZoomError::Mux)?;
        Ok(job.out_path.clone())
    }
}

/// Run `cmd`, then require a successful exit and a non-empty `expected_output`.
fn run_checked(
    runner: &dyn ProcessRunner,
    cmd: &ProcessCommand,
    expected_output: &Path,
) -> Result<(), ProcessFailure> {
    // A stale file must not pass the output check.
    if expected_output.exists() {
        std::fs::remove_file(expected_output).map_err(|e| {
            ProcessFailure::Spawn(format!(
                "cannot remove stale output '{}': {e}",
                expected_output.display()
            ))
        })?;
    }

    tracing::debug!(command = %cmd.display(), "running external process");
    let output = runner
        .run(cmd)
        .map_err(|e| ProcessFailure::Spawn(format!("{}: {e}", cmd.program.display())))?;

    if !output.success {
        return Err(ProcessFailure::Exit {
            code: output.code,
            stderr: output.stderr,
        });
    }

    let len = std::fs::metadata(expected_output)
        .map(|m| m.len())
        .unwrap_or(0);
    if len == 0 {
        return Err(ProcessFailure::MissingOutput(expected_output.to_path_buf()));
    }
    Ok(())
}

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> MapZoomResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        use anyhow::Context as _;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// Return `true` when `program` (normally `ffmpeg`) can be invoked.
pub fn is_ffmpeg_on_path(program: &Path) -> bool {
    std::process::Command::new(program)
        .arg("-version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(test)]
#[path = "../../tests/unit/encode/ffmpeg.rs"]
mod tests;
