use crate::foundation::core::{FrameIndex, ZoomRange};
use crate::foundation::error::{MapZoomError, MapZoomResult};

/// How zoom levels are spread across frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ZoomMode {
    /// One frame per whole zoom level, `max - min + 1` frames.
    Discrete,
    /// A fixed number of frames with zoom interpolated linearly between the bounds.
    Continuous {
        /// Total frame count.
        frames: u64,
    },
}

impl ZoomMode {
    /// True when the schedule may contain non-integer zoom values.
    pub fn is_fractional(self) -> bool {
        matches!(self, Self::Continuous { .. })
    }
}

/// One scheduled frame.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize)]
pub struct FrameSpec {
    pub index: FrameIndex,
    pub zoom: f64,
}

/// Ordered, immutable list of frames to fetch.
///
/// Invariants: indices are `0..len` in order, zoom is non-decreasing.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct FrameSchedule {
    range: ZoomRange,
    mode: ZoomMode,
    frames: Vec<FrameSpec>,
}

impl FrameSchedule {
    pub fn frames(&self) -> &[FrameSpec] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn range(&self) -> ZoomRange {
        self.range
    }

    pub fn mode(&self) -> ZoomMode {
        self.mode
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FrameSpec> {
        self.frames.iter()
    }
}

impl<'a> IntoIterator for &'a FrameSchedule {
    type Item = &'a FrameSpec;
    type IntoIter = std::slice::Iter<'a, FrameSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.frames.iter()
    }
}

/// Decimal places kept on interpolated zoom values, so identical requests produce identical URLs.
pub const ZOOM_DECIMALS: i32 = 2;

/// Upper bound on frames in one schedule, in either mode.
pub const MAX_FRAMES: u64 = 10_000;

/// Build the frame schedule for `range` under `mode`.
#[tracing::instrument(level = "debug")]
pub fn build_schedule(range: ZoomRange, mode: ZoomMode) -> MapZoomResult<FrameSchedule> {
    range.validate()?;

    let frames = match mode {
        ZoomMode::Discrete => {
            if !range.is_integral() {
                return Err(MapZoomError::invalid_schedule(format!(
                    "discrete schedule needs whole zoom bounds, got {}..{}",
                    range.min, range.max
                )));
            }
            if range.span() >= MAX_FRAMES as f64 {
                return Err(too_many_frames(range.span()));
            }
            let count = (range.span() as u64)
                .checked_add(1)
                .ok_or_else(|| too_many_frames(range.span()))?;
            (0..count)
                .map(|i| FrameSpec {
                    index: FrameIndex(i),
                    zoom: range.min + i as f64,
                })
                .collect::<Vec<_>>()
        }
        ZoomMode::Continuous { frames: count } => {
            if count == 0 {
                return Err(MapZoomError::invalid_schedule(
                    "frame count must be > 0",
                ));
            }
            if count > MAX_FRAMES {
                return Err(too_many_frames(count as f64));
            }
            let span = range.span();
            (0..count)
                .map(|i| FrameSpec {
                    index: FrameIndex(i),
                    zoom: round_zoom(range.min + span * i as f64 / count as f64),
                })
                .collect::<Vec<_>>()
        }
    };

    tracing::debug!(frames = frames.len(), "built zoom schedule");
    Ok(FrameSchedule {
        range,
        mode,
        frames,
    })
}

fn too_many_frames(requested: f64) -> MapZoomError {
    MapZoomError::invalid_schedule(format!(
        "schedule would need more than {MAX_FRAMES} frames (requested {requested})"
    ))
}

/// Round half away from zero to [`ZOOM_DECIMALS`] places.
pub fn round_zoom(zoom: f64) -> f64 {
    let scale = 10f64.powi(ZOOM_DECIMALS);
    (zoom * scale).round() / scale
}

#[cfg(test)]
#[path = "../../tests/unit/schedule/builder.rs"]
mod tests;
