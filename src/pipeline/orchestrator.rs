use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::{
    acquire::frames::acquire_frames,
    encode::ffmpeg::{EncodeJob, FfmpegTool, MuxJob, ensure_parent_dir},
    encode::runner::{ProcessRunner, SystemRunner},
    foundation::cancel::CancelToken,
    foundation::core::Coordinate,
    foundation::error::{MapZoomError, MapZoomResult},
    pipeline::config::PipelineConfig,
    schedule::builder::{FrameSchedule, build_schedule},
    tiles::source::{TileSource, create_tile_source},
    workspace::scratch::Workspace,
};

static NEXT_OUTPUT: AtomicU64 = AtomicU64::new(0);

/// Where a run currently is.
///
/// A run moves `Idle → SchedulingFrames → AcquiringFrames → Encoding → [Muxing] → Cleaning`, then
/// ends in `Done` or `Failed`. `Cleaning` is entered on every path, including early failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Idle,
    SchedulingFrames,
    AcquiringFrames,
    Encoding,
    Muxing,
    Cleaning,
    Done,
    Failed,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::SchedulingFrames => "scheduling_frames",
            Self::AcquiringFrames => "acquiring_frames",
            Self::Encoding => "encoding",
            Self::Muxing => "muxing",
            Self::Cleaning => "cleaning",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A failed run: the stage that failed plus the underlying cause.
#[derive(thiserror::Error, Debug)]
#[error("{stage} failed: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: MapZoomError,
}

impl PipelineError {
    pub fn new(stage: Stage, source: MapZoomError) -> Self {
        Self { stage, source }
    }

    /// Machine-readable cause, e.g. `tile_fetch` or `encode`.
    pub fn reason_code(&self) -> &'static str {
        self.source.reason_code()
    }
}

/// One video to produce.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderRequest {
    pub center: Coordinate,
    /// Passed through to the artifact; never sent to a provider.
    pub display_name: Option<String>,
    /// Explicit output file. Defaults to `output-<unix millis>-<seq>.mp4` in the output dir.
    pub out_path: Option<PathBuf>,
}

impl RenderRequest {
    pub fn at(center: Coordinate) -> Self {
        Self {
            center,
            display_name: None,
            out_path: None,
        }
    }
}

/// The finished video and what a caller must show alongside it.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct VideoArtifact {
    pub video_path: PathBuf,
    /// Provider attribution required wherever the video is displayed.
    pub attribution: String,
    pub provider: String,
    pub frame_count: u64,
    pub fps: f64,
    pub duration_secs: f64,
    pub display_name: Option<String>,
    pub has_audio: bool,
}

type StageObserver = Box<dyn Fn(Stage) + Send + Sync>;

/// Runs the schedule → acquire → encode → mux pipeline.
///
/// Holds no per-run state, so one orchestrator can serve concurrent runs; each run gets its own
/// workspace.
pub struct Orchestrator {
    config: PipelineConfig,
    source: Box<dyn TileSource>,
    runner: Box<dyn ProcessRunner>,
    observer: Option<StageObserver>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("source", &self.source.name())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn new(
        config: PipelineConfig,
        source: Box<dyn TileSource>,
        runner: Box<dyn ProcessRunner>,
    ) -> MapZoomResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            source,
            runner,
            observer: None,
        })
    }

    /// Build the provider from `config.tiles` and run ffmpeg as a child process.
    pub fn from_config(config: PipelineConfig) -> MapZoomResult<Self> {
        config.validate()?;
        let source = create_tile_source(&config.tiles, config.request_timeout())?;
        Self::new(config, source, Box::new(SystemRunner))
    }

    /// Receive every stage transition, in order.
    pub fn with_observer(mut self, observer: impl Fn(Stage) + Send + Sync + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Compute the frame schedule for the configured range and mode against this provider.
    pub fn plan(&self) -> MapZoomResult<FrameSchedule> {
        let (lo, hi) = self.source.zoom_bounds();
        if !self.config.zoom.within(lo, hi) {
            return Err(MapZoomError::invalid_input(format!(
                "zoom {}..{} is outside what {} serves ({lo}..{hi})",
                self.config.zoom.min,
                self.config.zoom.max,
                self.source.name()
            )));
        }
        if self.config.mode.is_fractional() && !self.source.fractional_zoom() {
            return Err(MapZoomError::invalid_input(format!(
                "{} only serves whole zoom levels; use discrete mode",
                self.source.name()
            )));
        }
        build_schedule(self.config.zoom, self.config.mode)
    }

    /// Produce one video for `req`.
    ///
    /// The workspace is released before this returns, whatever the outcome. A cleanup problem is
    /// logged and never replaces the run's own result.
    #[tracing::instrument(skip_all, fields(lat = req.center.lat(), lng = req.center.lng(), provider = self.source.name()))]
    pub fn run(
        &self,
        req: &RenderRequest,
        cancel: &CancelToken,
    ) -> Result<VideoArtifact, PipelineError> {
        self.enter(Stage::Idle);
        let out_path = match self.resolve_output(req) {
            Ok(p) => p,
            Err(e) => return Err(self.fail(Stage::Idle, e)),
        };

        self.enter(Stage::SchedulingFrames);
        let schedule = match cancel.check().and_then(|()| self.plan()) {
            Ok(s) => s,
            Err(e) => return Err(self.fail(Stage::SchedulingFrames, e)),
        };

        self.enter(Stage::AcquiringFrames);
        let workspace = match Workspace::acquire(self.config.scratch_root.as_deref()) {
            Ok(ws) => ws,
            Err(e) => return Err(self.fail(Stage::AcquiringFrames, e)),
        };

        let result = self.run_in(&workspace, &schedule, req, &out_path, cancel);

        self.enter(Stage::Cleaning);
        let report = workspace.release();
        if !report.is_clean() {
            tracing::warn!(
                warnings = report.warnings.len(),
                "workspace cleanup incomplete"
            );
        }

        match result {
            Ok(artifact) => {
                self.enter(Stage::Done);
                tracing::info!(video = %artifact.video_path.display(), "video ready");
                Ok(artifact)
            }
            Err(e) => {
                self.enter(Stage::Failed);
                tracing::error!(stage = %e.stage, reason = e.reason_code(), "run failed: {}", e.source);
                Err(e)
            }
        }
    }

    fn run_in(
        &self,
        workspace: &Workspace,
        schedule: &FrameSchedule,
        req: &RenderRequest,
        out_path: &Path,
        cancel: &CancelToken,
    ) -> Result<VideoArtifact, PipelineError> {
        let cfg = &self.config;

        let frames = cancel
            .check()
            .and_then(|()| {
                acquire_frames(
                    self.source.as_ref(),
                    req.center,
                    schedule,
                    workspace,
                    &cfg.acquire_opts(),
                    cancel,
                )
            })
            .map_err(|e| PipelineError::new(Stage::AcquiringFrames, e))?;

        self.enter(Stage::Encoding);
        let tool = FfmpegTool::new(self.runner.as_ref(), &cfg.ffmpeg);
        let job = EncodeJob {
            frame_pattern: workspace.frame_pattern(),
            start_number: 0,
            frame_count: frames.len() as u64,
            fps: cfg.fps,
            codec: cfg.codec.clone(),
            pixel_format: cfg.pixel_format.clone(),
            duration_cap_secs: cfg.duration_cap_secs,
            scale: cfg.scale,
            out_path: workspace.artifact_path("silent.mp4"),
        };
        let silent = cancel
            .check()
            .and_then(|()| tool.encode(&job))
            .map_err(|e| PipelineError::new(Stage::Encoding, e))?;

        let (finished, last_stage) = match &cfg.audio_track {
            Some(audio) => {
                self.enter(Stage::Muxing);
                let mux = MuxJob {
                    video_path: silent,
                    audio_path: audio.clone(),
                    out_path: workspace.artifact_path("final.mp4"),
                };
                let muxed = cancel
                    .check()
                    .and_then(|()| tool.mux(&mux))
                    .map_err(|e| PipelineError::new(Stage::Muxing, e))?;
                (muxed, Stage::Muxing)
            }
            None => {
                tracing::debug!("no audio track configured; skipping mux");
                (silent, Stage::Encoding)
            }
        };

        publish(&finished, out_path, cfg.overwrite)
            .map_err(|e| PipelineError::new(last_stage, e))?;

        Ok(VideoArtifact {
            video_path: out_path.to_path_buf(),
            attribution: self.source.attribution().to_string(),
            provider: self.source.name().to_string(),
            frame_count: job.output_frames(),
            fps: cfg.fps.as_f64(),
            duration_secs: job.output_duration_secs(),
            display_name: req.display_name.clone(),
            has_audio: cfg.audio_track.is_some(),
        })
    }

    fn resolve_output(&self, req: &RenderRequest) -> MapZoomResult<PathBuf> {
        let path = match &req.out_path {
            Some(p) => p.clone(),
            None => self.config.output_dir.join(default_output_name()),
        };
        if path.exists() && !self.config.overwrite {
            return Err(MapZoomError::invalid_input(format!(
                "output '{}' already exists (enable overwrite to replace it)",
                path.display()
            )));
        }
        Ok(path)
    }

    fn enter(&self, stage: Stage) {
        tracing::debug!(%stage, "stage");
        if let Some(observer) = &self.observer {
            observer(stage);
        }
    }

    /// Fail before a workspace exists; there is nothing to release.
    fn fail(&self, stage: Stage, source: MapZoomError) -> PipelineError {
        self.enter(Stage::Cleaning);
        self.enter(Stage::Failed);
        tracing::error!(%stage, reason = source.reason_code(), "run failed: {source}");
        PipelineError::new(stage, source)
    }
}

/// `output-<unix millis>-<seq>.mp4`; the sequence keeps same-millisecond runs apart.
pub fn default_output_name() -> String {
    let millis = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let seq = NEXT_OUTPUT.fetch_add(1, Ordering::Relaxed);
    format!("output-{millis}-{seq}.mp4")
}

/// Move a verified video out of the workspace. Falls back to copy across filesystems.
fn publish(from: &Path, to: &Path, overwrite: bool) -> MapZoomResult<()> {
    ensure_parent_dir(to)?;
    if to.exists() {
        if !overwrite {
            return Err(MapZoomError::invalid_input(format!(
                "output '{}' appeared while rendering",
                to.display()
            )));
        }
        std::fs::remove_file(to).map_err(|e| {
            MapZoomError::workspace(format!("cannot replace '{}': {e}", to.display()))
        })?;
    }
    if std::fs::rename(from, to).is_ok() {
        return Ok(());
    }
    if let Err(e) = std::fs::copy(from, to) {
        let _ = std::fs::remove_file(to);
        return Err(MapZoomError::workspace(format!(
            "cannot publish video to '{}': {e}",
            to.display()
        )));
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/pipeline/orchestrator.rs"]
mod tests;
