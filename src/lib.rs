//! mapzoom turns a coordinate into a short "zoom in from space" video.
//!
//! A run computes a zoom schedule, fetches one static map image per frame from a tile provider,
//! encodes the ordered frames with `ffmpeg` and optionally muxes a background track:
//!
//! - Configure a [`PipelineConfig`] (or start from a [`Preset`])
//! - Build an [`Orchestrator`]
//! - Call [`Orchestrator::run`] with a [`RenderRequest`] and get back a [`VideoArtifact`]
//!
//! Every image provider requires attribution; [`VideoArtifact::attribution`] carries the text a
//! caller must display next to the video.
#![forbid(unsafe_code)]

mod foundation;

/// Frame acquisition from a tile provider.
pub mod acquire;
/// Encoding and muxing through `ffmpeg`.
pub mod encode;
/// Run configuration and orchestration.
pub mod pipeline;
/// Zoom schedules.
pub mod schedule;
/// Tile providers.
pub mod tiles;
/// Per-run scratch storage.
pub mod workspace;

pub use crate::foundation::cancel::CancelToken;
pub use crate::foundation::core::{Coordinate, FrameIndex, Fps, ImageSize, ZoomRange};
pub use crate::foundation::error::{
    MapZoomError, MapZoomResult, ProcessFailure, TileFetchError, TileFetchReason,
};

pub use crate::acquire::frames::{AcquireOpts, FrameFile, RetryPolicy, acquire_frames};
pub use crate::encode::ffmpeg::{EncodeJob, FfmpegTool, MuxJob, is_ffmpeg_on_path};
pub use crate::encode::runner::{ProcessCommand, ProcessOutput, ProcessRunner, SystemRunner};
pub use crate::pipeline::config::{PipelineConfig, Preset};
pub use crate::pipeline::orchestrator::{
    Orchestrator, PipelineError, RenderRequest, Stage, VideoArtifact,
};
pub use crate::schedule::builder::{
    FrameSchedule, FrameSpec, MAX_FRAMES, ZoomMode, build_schedule,
};
pub use crate::tiles::source::{TileSource, TileSourceConfig, create_tile_source};
pub use crate::workspace::scratch::{CleanupReport, Workspace};
