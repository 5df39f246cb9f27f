use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::foundation::error::{MapZoomError, MapZoomResult};

/// Cooperative cancellation flag shared between a caller and a running pipeline.
///
/// Cloning is cheap; all clones observe the same flag.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once [`CancelToken::cancel`] has been called.
    pub fn check(&self) -> MapZoomResult<()> {
        if self.is_cancelled() {
            Err(MapZoomError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Sleep for `dur` in short slices, returning early with `Err(Cancelled)`.
    pub fn sleep(&self, dur: Duration) -> MapZoomResult<()> {
        const SLICE: Duration = Duration::from_millis(20);
        let deadline = Instant::now() + dur;
        loop {
            self.check()?;
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            std::thread::sleep((deadline - now).min(SLICE));
        }
    }
}
