use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Context as _;
use rayon::prelude::*;

use crate::{
    foundation::cancel::CancelToken,
    foundation::core::{Coordinate, ImageSize},
    foundation::error::{MapZoomError, MapZoomResult, TileFetchError, TileFetchReason},
    schedule::builder::{FrameSchedule, FrameSpec},
    tiles::source::TileSource,
    workspace::scratch::Workspace,
};

/// Retry policy for transient tile fetch failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub max_retries: u32,
    /// Delay before the first retry; doubles for each further retry.
    pub initial_backoff_ms: u64,
    /// Upper bound for a single delay.
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff_ms: 250,
            max_backoff_ms: 5_000,
        }
    }
}

impl RetryPolicy {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (0-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u64.checked_shl(retry).unwrap_or(u64::MAX);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

/// Controls for [`acquire_frames`].
#[derive(Clone, Debug)]
pub struct AcquireOpts {
    /// Requested image size per frame.
    pub size: ImageSize,
    /// Upper bound on in-flight tile requests.
    pub max_concurrent: usize,
    pub retry: RetryPolicy,
}

impl Default for AcquireOpts {
    fn default() -> Self {
        Self {
            size: ImageSize::square(640),
            max_concurrent: 6,
            retry: RetryPolicy::default(),
        }
    }
}

/// A frame image persisted in the workspace.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameFile {
    pub spec: FrameSpec,
    pub path: PathBuf,
    pub bytes: u64,
}

enum Outcome {
    Written(FrameFile),
    Failed(FrameSpec, MapZoomError),
    Skipped,
}

/// Fetch every scheduled frame into `workspace`, all-or-nothing.
///
/// Fetches run on a dedicated pool of `opts.max_concurrent` threads. The returned files are in
/// ascending index order regardless of completion order. When any frame fails permanently the
/// remaining workers stop issuing requests and the whole call fails with
/// [`MapZoomError::FrameAcquisition`] for the lowest failing index.
#[tracing::instrument(skip_all, fields(frames = schedule.len(), provider = source.name()))]
pub fn acquire_frames(
    source: &dyn TileSource,
    center: Coordinate,
    schedule: &FrameSchedule,
    workspace: &Workspace,
    opts: &AcquireOpts,
    cancel: &CancelToken,
) -> MapZoomResult<Vec<FrameFile>> {
    opts.size.validate()?;
    cancel.check()?;
    let pool = build_fetch_pool(opts.max_concurrent)?;
    let abort = AtomicBool::new(false);

    tracing::info!(
        concurrency = opts.max_concurrent,
        "acquiring {} frames",
        schedule.len()
    );

    let outcomes: Vec<Outcome> = pool.install(|| {
        schedule
            .frames()
            .par_iter()
            .map(|spec| {
                if abort.load(Ordering::Relaxed) || cancel.is_cancelled() {
                    return Outcome::Skipped;
                }
                match fetch_one(source, center, spec, workspace, opts, cancel, &abort) {
                    Ok(file) => Outcome::Written(file),
                    Err(e) => {
                        abort.store(true, Ordering::Relaxed);
                        Outcome::Failed(*spec, e)
                    }
                }
            })
            .collect()
    });

    if cancel.is_cancelled() {
        return Err(MapZoomError::Cancelled);
    }

    let mut files = Vec::with_capacity(outcomes.len());
    let mut first_failure: Option<(FrameSpec, MapZoomError)> = None;
    for outcome in outcomes {
        match outcome {
            Outcome::Written(file) => files.push(file),
            Outcome::Failed(spec, err) => {
                if first_failure
                    .as_ref()
                    .is_none_or(|(seen, _)| spec.index < seen.index)
                {
                    first_failure = Some((spec, err));
                }
            }
            Outcome::Skipped => {}
        }
    }

    if let Some((spec, cause)) = first_failure {
        tracing::warn!(index = spec.index.0, zoom = spec.zoom, error = %cause, "frame acquisition failed");
        return Err(MapZoomError::FrameAcquisition {
            index: spec.index,
            cause: Box::new(cause),
        });
    }
    if files.len() != schedule.len() {
        return Err(MapZoomError::Other(anyhow::anyhow!(
            "internal error: {} of {} frames written without a reported failure",
            files.len(),
            schedule.len()
        )));
    }

    files.sort_by_key(|f| f.spec.index);
    Ok(files)
}

fn fetch_one(
    source: &dyn TileSource,
    center: Coordinate,
    spec: &FrameSpec,
    workspace: &Workspace,
    opts: &AcquireOpts,
    cancel: &CancelToken,
    abort: &AtomicBool,
) -> MapZoomResult<FrameFile> {
    let body = fetch_with_retry(source, center, spec, opts, cancel, abort)?;
    let png = normalize_to_png(body, spec.zoom)?;

    let path = workspace.frame_path(spec.index);
    std::fs::write(&path, &png)
        .with_context(|| format!("failed to write frame '{}'", path.display()))?;
    tracing::debug!(index = spec.index.0, zoom = spec.zoom, bytes = png.len(), "frame written");

    Ok(FrameFile {
        spec: *spec,
        path,
        bytes: png.len() as u64,
    })
}

fn fetch_with_retry(
    source: &dyn TileSource,
    center: Coordinate,
    spec: &FrameSpec,
    opts: &AcquireOpts,
    cancel: &CancelToken,
    abort: &AtomicBool,
) -> MapZoomResult<Vec<u8>> {
    let mut retry = 0u32;
    loop {
        cancel.check()?;
        match source.fetch(center, spec.zoom, opts.size) {
            Ok(body) => return Ok(body),
            Err(e)
                if e.is_transient()
                    && retry < opts.retry.max_retries
                    && !abort.load(Ordering::Relaxed) =>
            {
                let delay = opts.retry.backoff(retry);
                tracing::warn!(
                    index = spec.index.0,
                    zoom = spec.zoom,
                    retry = retry + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient tile fetch failure, retrying"
                );
                cancel.sleep(delay)?;
                retry += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Keep PNG payloads as-is; decode anything else and re-encode it as PNG so every frame matches
/// the workspace naming pattern.
pub(crate) fn normalize_to_png(body: Vec<u8>, zoom: f64) -> MapZoomResult<Vec<u8>> {
    if matches!(image::guess_format(&body), Ok(image::ImageFormat::Png)) {
        return Ok(body);
    }
    let malformed = |msg: String| TileFetchError::new(TileFetchReason::Malformed(msg), zoom);
    let img = image::load_from_memory(&body).map_err(|e| malformed(format!("decode: {e}")))?;
    let mut out = std::io::Cursor::new(Vec::with_capacity(body.len()));
    img.write_to(&mut out, image::ImageFormat::Png)
        .map_err(|e| malformed(format!("png re-encode: {e}")))?;
    Ok(out.into_inner())
}

fn build_fetch_pool(threads: usize) -> MapZoomResult<rayon::ThreadPool> {
    if threads == 0 {
        return Err(MapZoomError::invalid_input(
            "max_concurrent_fetches must be >= 1",
        ));
    }
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("mapzoom-fetch-{i}"))
        .build()
        .map_err(|e| MapZoomError::Other(anyhow::anyhow!("failed to build fetch pool: {e}")))
}

#[cfg(test)]
#[path = "../../tests/unit/acquire/frames.rs"]
mod tests;
