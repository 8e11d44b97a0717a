//! Appear-animation store
//!
//! Registry of animations started before the runtime fully hydrates (for
//! example, an entrance animation kicked off by pre-rendered output). When
//! the runtime mounts the real element it calls [`AppearStore::handoff`] to
//! take over: the stored animation is cancelled and the elapsed offset is
//! returned so the runtime animation can resume mid-flight instead of
//! restarting.
//!
//! A process-wide instance is available through [`global_appear_store`];
//! tests construct their own.

use std::sync::{Mutex, OnceLock};

use rustc_hash::FxHashMap;

use crate::animator::AnimationHandle;

struct AppearEntry {
    handle: AnimationHandle,
    start_time_ms: Option<f64>,
}

/// Store of pre-hydration animations keyed by element id.
#[derive(Default)]
pub struct AppearStore {
    entries: Mutex<FxHashMap<String, AppearEntry>>,
}

impl AppearStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an appear animation for an element id, replacing any
    /// previous registration for that id.
    pub fn register(&self, id: impl Into<String>, handle: AnimationHandle) {
        self.entries.lock().unwrap().insert(
            id.into(),
            AppearEntry {
                handle,
                start_time_ms: None,
            },
        );
    }

    /// Record when the registered animation actually started sampling.
    pub fn record_start_time(&self, id: &str, start_time_ms: f64) {
        if let Some(entry) = self.entries.lock().unwrap().get_mut(id) {
            entry.start_time_ms = Some(start_time_ms);
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.lock().unwrap().contains_key(id)
    }

    /// Take over the appear animation for an element.
    ///
    /// Cancels the stored animation (leaving its last sample on screen) and
    /// returns the elapsed milliseconds the runtime animation should resume
    /// from; zero when no start time was recorded. Returns `None` on a
    /// second call or for ids that never registered.
    pub fn handoff(&self, id: &str, now_ms: f64) -> Option<f64> {
        let entry = self.entries.lock().unwrap().remove(id)?;
        entry.handle.cancel();
        let elapsed = entry
            .start_time_ms
            .map(|start| (now_ms - start).max(0.0))
            .unwrap_or(0.0);
        tracing::debug!(id, elapsed, "appear animation handed off");
        Some(elapsed)
    }
}

/// Process-wide appear store, created on first use; no teardown.
pub fn global_appear_store() -> &'static AppearStore {
    static GLOBAL: OnceLock<AppearStore> = OnceLock::new();
    GLOBAL.get_or_init(AppearStore::new)
}
