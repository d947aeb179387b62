//! Throttle/cache policy for the expensive depth model

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::VisionError;
use crate::models::DepthMap;

/// Shared cache cell. All reads and writes happen under the one mutex; the
/// lock is never held across an inference call.
#[derive(Default)]
struct DepthCacheState {
    last_inference: Option<Instant>,
    last_cache: Option<Instant>,
    map: Option<Arc<DepthMap>>,
}

/// Decision taken under the lock, acted on outside it.
enum Gate {
    Reuse(Arc<DepthMap>),
    Skip,
    Run,
}

/// Bounds how often depth inference runs and how long its last output may be
/// reused across detector frames.
pub struct DepthGate {
    interval: Duration,
    cache_window: Duration,
    state: Mutex<DepthCacheState>,
}

impl DepthGate {
    pub fn new(interval: Duration, cache_window: Duration) -> Self {
        Self {
            interval,
            cache_window,
            state: Mutex::new(DepthCacheState::default()),
        }
    }

    /// Obtain a depth map for this frame: run `infer` when the interval has
    /// elapsed, reuse a recent cached map otherwise, or yield nothing when the
    /// throttle blocks a run and the cache has expired.
    ///
    /// Inference errors are logged and yield `None`; timestamps are left
    /// untouched so the next frame may try again.
    pub fn acquire<F>(&self, now: Instant, infer: F) -> Option<Arc<DepthMap>>
    where
        F: FnOnce() -> Result<DepthMap, VisionError>,
    {
        let gate = {
            let mut state = self.state.lock();
            let due = state
                .last_inference
                .map_or(true, |t| now.duration_since(t) >= self.interval);
            if due {
                Gate::Run
            } else {
                match (&state.map, state.last_cache) {
                    (Some(map), Some(cached_at))
                        if now.duration_since(cached_at) <= self.cache_window =>
                    {
                        let map = map.clone();
                        state.last_cache = Some(now);
                        Gate::Reuse(map)
                    }
                    _ => Gate::Skip,
                }
            }
        };

        match gate {
            Gate::Reuse(map) => {
                debug!("Reusing cached depth map");
                Some(map)
            }
            Gate::Skip => None,
            Gate::Run => match infer() {
                Ok(map) => {
                    let map = Arc::new(map);
                    let mut state = self.state.lock();
                    state.last_inference = Some(now);
                    state.last_cache = Some(now);
                    state.map = Some(map.clone());
                    Some(map)
                }
                Err(e) => {
                    warn!("Depth inference error: {}", e);
                    None
                }
            },
        }
    }

    /// Drop the cached map and timestamps. Called when the active depth model
    /// is swapped and on shutdown.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        *state = DepthCacheState::default();
    }
}
