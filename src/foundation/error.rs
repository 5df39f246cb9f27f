use crate::foundation::core::FrameIndex;

/// Convenience result type used across mapzoom.
pub type MapZoomResult<T> = Result<T, MapZoomError>;

/// Top-level error taxonomy used by pipeline stages.
#[derive(thiserror::Error, Debug)]
pub enum MapZoomError {
    /// Bad coordinate, size, frame rate or other user-provided value.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A schedule that would contain no frames.
    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    /// `min >= max`, or a range the tile source cannot serve.
    #[error("invalid zoom range: {min}..{max}")]
    InvalidRange {
        /// Requested lower bound.
        min: f64,
        /// Requested upper bound.
        max: f64,
    },

    /// A single tile request failed.
    #[error(transparent)]
    TileFetch(#[from] TileFetchError),

    /// The frame set could not be completed.
    #[error("frame {} could not be acquired: {cause}", .index.0)]
    FrameAcquisition {
        /// Absolute index of the first frame observed to fail.
        index: FrameIndex,
        /// Last error seen for that frame.
        cause: Box<MapZoomError>,
    },

    /// The video encoder process failed.
    #[error("encode failed: {0}")]
    Encode(ProcessFailure),

    /// The audio mux process failed.
    #[error("mux failed: {0}")]
    Mux(ProcessFailure),

    /// Scratch directory or output publishing failure.
    #[error("workspace error: {0}")]
    Workspace(String),

    /// The caller cancelled the run.
    #[error("run cancelled")]
    Cancelled,

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MapZoomError {
    /// Build a [`MapZoomError::InvalidInput`] value.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Build a [`MapZoomError::InvalidSchedule`] value.
    pub fn invalid_schedule(msg: impl Into<String>) -> Self {
        Self::InvalidSchedule(msg.into())
    }

    /// Build a [`MapZoomError::Workspace`] value.
    pub fn workspace(msg: impl Into<String>) -> Self {
        Self::Workspace(msg.into())
    }

    /// Stable, documented reason code for callers that map failures to responses.
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::InvalidSchedule(_) => "invalid_schedule",
            Self::InvalidRange { .. } => "invalid_range",
            Self::TileFetch(_) => "tile_fetch",
            Self::FrameAcquisition { .. } => "frame_acquisition",
            Self::Encode(_) => "encode",
            Self::Mux(_) => "mux",
            Self::Workspace(_) => "workspace",
            Self::Cancelled => "cancelled",
            Self::Other(_) => "internal",
        }
    }
}

/// Why a tile request failed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TileFetchReason {
    /// Provider answered with a non-success HTTP status.
    Status(u16),
    /// Request exceeded the configured timeout.
    Timeout,
    /// Connection, TLS or body read failure.
    Transport(String),
    /// Response body is not a decodable raster image.
    Malformed(String),
}

impl std::fmt::Display for TileFetchReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Status(code) => write!(f, "provider returned HTTP {code}"),
            Self::Timeout => f.write_str("request timed out"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::Malformed(msg) => write!(f, "malformed payload: {msg}"),
        }
    }
}

/// Failure of one `(coordinate, zoom)` tile request.
#[derive(thiserror::Error, Clone, Debug, PartialEq)]
#[error("tile fetch at zoom {zoom} failed: {reason}")]
pub struct TileFetchError {
    /// What went wrong.
    pub reason: TileFetchReason,
    /// Zoom level that was requested.
    pub zoom: f64,
}

impl TileFetchError {
    pub fn new(reason: TileFetchReason, zoom: f64) -> Self {
        Self { reason, zoom }
    }

    /// Timeouts, transport errors, 429 and 5xx are worth another attempt.
    pub fn is_transient(&self) -> bool {
        match &self.reason {
            TileFetchReason::Timeout | TileFetchReason::Transport(_) => true,
            TileFetchReason::Status(code) => *code == 429 || (500..600).contains(code),
            TileFetchReason::Malformed(_) => false,
        }
    }
}

/// How an external encode/mux step failed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProcessFailure {
    /// The program could not be started.
    Spawn(String),
    /// The program exited unsuccessfully.
    Exit {
        /// Exit code, `None` when terminated by a signal.
        code: Option<i32>,
        /// Trimmed stderr output.
        stderr: String,
    },
    /// The program succeeded but its output file is missing or empty.
    MissingOutput(std::path::PathBuf),
}

impl std::fmt::Display for ProcessFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Spawn(msg) => write!(f, "failed to start process: {msg}"),
            Self::Exit { code, stderr } => {
                match code {
                    Some(code) => write!(f, "process exited with code {code}")?,
                    None => f.write_str("process terminated by signal")?,
                }
                if !stderr.is_empty() {
                    write!(f, ": {stderr}")?;
                }
                Ok(())
            }
            Self::MissingOutput(path) => {
                write!(f, "expected output '{}' is missing or empty", path.display())
            }
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
