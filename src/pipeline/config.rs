use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{
    acquire::frames::{AcquireOpts, RetryPolicy},
    foundation::core::{Fps, ImageSize, ZoomRange},
    foundation::error::{MapZoomError, MapZoomResult},
    schedule::builder::{MAX_FRAMES, ZoomMode},
    tiles::source::TileSourceConfig,
};

/// Built-in parameter sets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    /// One frame per whole zoom level from 10 to 19 at 24 fps, capped at 4 seconds.
    Discrete,
    /// 120 frames interpolated from zoom 5 to 20 at 10 fps, scaled to 640x640.
    Continuous,
}

/// Everything a pipeline run needs besides the coordinate.
///
/// Loaded from JSON; missing fields fall back to the [`Preset::Discrete`] values. The Mapbox
/// access token is never read from or written to the file.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub tiles: TileSourceConfig,
    pub zoom: ZoomRange,
    pub mode: ZoomMode,
    /// Size requested from the tile provider.
    pub image_size: ImageSize,
    pub fps: Fps,
    pub codec: String,
    pub pixel_format: String,
    pub duration_cap_secs: Option<f64>,
    /// Rescale frames during encode.
    pub scale: Option<ImageSize>,
    pub max_concurrent_fetches: usize,
    pub retry: RetryPolicy,
    pub request_timeout_ms: u64,
    /// Background track muxed into the final video.
    pub audio_track: Option<PathBuf>,
    pub output_dir: PathBuf,
    /// Parent directory for per-run workspaces; the system temp dir when unset.
    pub scratch_root: Option<PathBuf>,
    /// Program used for encode and mux.
    pub ffmpeg: PathBuf,
    pub overwrite: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::preset(Preset::Discrete)
    }
}

impl PipelineConfig {
    pub fn preset(preset: Preset) -> Self {
        let common = Self {
            tiles: TileSourceConfig::default(),
            zoom: ZoomRange {
                min: 10.0,
                max: 19.0,
            },
            mode: ZoomMode::Discrete,
            image_size: ImageSize::square(640),
            fps: Fps { num: 24, den: 1 },
            codec: "libx264".to_string(),
            pixel_format: "yuv420p".to_string(),
            duration_cap_secs: Some(4.0),
            scale: None,
            max_concurrent_fetches: 6,
            retry: RetryPolicy::default(),
            request_timeout_ms: 30_000,
            audio_track: None,
            output_dir: PathBuf::from("videos"),
            scratch_root: None,
            ffmpeg: PathBuf::from("ffmpeg"),
            overwrite: false,
        };
        match preset {
            Preset::Discrete => common,
            Preset::Continuous => Self {
                zoom: ZoomRange {
                    min: 5.0,
                    max: 20.0,
                },
                mode: ZoomMode::Continuous { frames: 120 },
                fps: Fps { num: 10, den: 1 },
                duration_cap_secs: None,
                scale: Some(ImageSize::square(640)),
                ..common
            },
        }
    }

    /// Parse a config from a JSON reader.
    pub fn from_reader<R: std::io::Read>(r: R) -> MapZoomResult<Self> {
        serde_json::from_reader(r)
            .map_err(|e| MapZoomError::invalid_input(format!("parse pipeline config JSON: {e}")))
    }

    /// Parse a config from a JSON file on disk.
    pub fn from_path(path: impl AsRef<Path>) -> MapZoomResult<Self> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| {
            MapZoomError::invalid_input(format!("open pipeline config '{}': {e}", path.display()))
        })?;
        Self::from_reader(BufReader::new(f))
    }

    pub fn validate(&self) -> MapZoomResult<()> {
        self.zoom.validate()?;
        self.image_size.validate()?;
        if self.fps.num == 0 || self.fps.den == 0 {
            return Err(MapZoomError::invalid_input("fps must have num>0 and den>0"));
        }
        if self.max_concurrent_fetches == 0 {
            return Err(MapZoomError::invalid_input(
                "max_concurrent_fetches must be >= 1",
            ));
        }
        if self.request_timeout_ms == 0 {
            return Err(MapZoomError::invalid_input("request_timeout_ms must be > 0"));
        }
        if self.codec.trim().is_empty() || self.pixel_format.trim().is_empty() {
            return Err(MapZoomError::invalid_input(
                "codec and pixel_format must not be empty",
            ));
        }
        if let Some(cap) = self.duration_cap_secs
            && (!cap.is_finite() || cap <= 0.0)
        {
            return Err(MapZoomError::invalid_input(
                "duration_cap_secs must be a positive number",
            ));
        }
        if let Some(scale) = self.scale {
            scale.validate()?;
        }
        match self.mode {
            ZoomMode::Continuous { frames: 0 } => {
                return Err(MapZoomError::invalid_schedule("frame count must be > 0"));
            }
            ZoomMode::Continuous { frames } if frames > MAX_FRAMES => {
                return Err(MapZoomError::invalid_schedule(format!(
                    "frame count {frames} exceeds {MAX_FRAMES}"
                )));
            }
            _ => {}
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn acquire_opts(&self) -> AcquireOpts {
        AcquireOpts {
            size: self.image_size,
            max_concurrent: self.max_concurrent_fetches,
            retry: self.retry,
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/pipeline/config.rs"]
mod tests;
