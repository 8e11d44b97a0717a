//! Viewport scroll values
//!
//! Four shared values tracking the viewport scroll offset and progress. The
//! host feeds measured scroll metrics in; subscribers watch the values like
//! any other [`SharedValue`]. A process-wide instance is available through
//! [`global_scroll_values`], created on first use; tests construct their own
//! instance instead of relying on the global.

use std::sync::{Arc, OnceLock};

use crate::value::{Clock, SharedValue, SystemClock};

/// Host-measured scroll state for one axis pair.
#[derive(Clone, Copy, Debug, Default)]
pub struct ScrollMetrics {
    pub offset_x: f32,
    pub offset_y: f32,
    pub viewport_width: f32,
    pub viewport_height: f32,
    pub content_width: f32,
    pub content_height: f32,
}

/// Scroll offset and progress values for a viewport.
pub struct ScrollValues {
    pub x: SharedValue,
    pub y: SharedValue,
    pub x_progress: SharedValue,
    pub y_progress: SharedValue,
}

impl ScrollValues {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            x: SharedValue::with_clock(0.0, Arc::clone(&clock)),
            y: SharedValue::with_clock(0.0, Arc::clone(&clock)),
            x_progress: SharedValue::with_clock(0.0, Arc::clone(&clock)),
            y_progress: SharedValue::with_clock(0.0, clock),
        }
    }

    /// Write the latest host-measured metrics into the four values.
    pub fn update(&self, metrics: ScrollMetrics) {
        self.x.set(metrics.offset_x);
        self.y.set(metrics.offset_y);
        self.x_progress.set(axis_progress(
            metrics.offset_x,
            metrics.content_width - metrics.viewport_width,
        ));
        self.y_progress.set(axis_progress(
            metrics.offset_y,
            metrics.content_height - metrics.viewport_height,
        ));
    }
}

impl Default for ScrollValues {
    fn default() -> Self {
        Self::new()
    }
}

fn axis_progress(offset: f32, max_offset: f32) -> f32 {
    if offset == 0.0 || max_offset <= 0.0 {
        0.0
    } else {
        (offset / max_offset).clamp(0.0, 1.0)
    }
}

/// Process-wide scroll values, created on first use. No teardown; the
/// instance lives until process exit.
pub fn global_scroll_values() -> &'static ScrollValues {
    static GLOBAL: OnceLock<ScrollValues> = OnceLock::new();
    GLOBAL.get_or_init(ScrollValues::new)
}
