//! Frame scheduler
//!
//! A cooperative, single-threaded scheduler with five ordered phases per
//! tick: `Read`, `Update`, `PreRender`, `Render`, `PostRender`. Measurement
//! happens in `Read`, value/animation advancement in `Update`, and style
//! writes in `Render`, so reads and writes never interleave within a tick.
//!
//! The scheduler never polls and owns no timer: a host-injected
//! [`TickDriver`] is asked for a tick whenever work is queued, and the host
//! (or a test driver) calls [`FrameScheduler::tick`] once per display
//! refresh. Callbacks are deduplicated by registration identity within a
//! tick, and scheduling into a phase that has already run this tick defers
//! the callback to the next tick.

use std::sync::{Arc, Mutex, Weak};
use std::sync::atomic::{AtomicBool, Ordering};

// ============================================================================
// Phases
// ============================================================================

/// Ordered execution phases within one tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Read,
    Update,
    PreRender,
    Render,
    PostRender,
}

impl Phase {
    pub const ALL: [Phase; 5] = [
        Phase::Read,
        Phase::Update,
        Phase::PreRender,
        Phase::Render,
        Phase::PostRender,
    ];

    fn index(self) -> usize {
        match self {
            Self::Read => 0,
            Self::Update => 1,
            Self::PreRender => 2,
            Self::Render => 3,
            Self::PostRender => 4,
        }
    }
}

/// Timing data for the tick currently being processed.
#[derive(Clone, Copy, Debug, Default)]
pub struct FrameData {
    /// Milliseconds, from the host's timing source.
    pub timestamp: f64,
    /// Milliseconds since the previous tick, clamped to sane bounds.
    pub delta: f64,
}

/// A scheduled callback. Identity (the `Arc` allocation) is what the
/// scheduler dedupes and cancels by, so callers keep a clone of the `Arc`
/// they registered.
pub type FrameCallback = Arc<dyn Fn(FrameData) + Send + Sync>;

/// Host timing capability. `request_tick` must only flag that a tick is
/// wanted; the host calls [`FrameScheduler::tick`] from its own frame
/// callback.
pub trait TickDriver: Send + Sync {
    fn request_tick(&self);
}

/// Test driver: records tick requests for a manual pump loop.
#[derive(Default)]
pub struct ManualTickDriver {
    requested: AtomicBool,
}

impl ManualTickDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether a tick was requested since the last call, clearing
    /// the flag.
    pub fn take_request(&self) -> bool {
        self.requested.swap(false, Ordering::AcqRel)
    }
}

impl TickDriver for ManualTickDriver {
    fn request_tick(&self) {
        self.requested.store(true, Ordering::Release);
    }
}

// ============================================================================
// Steps
// ============================================================================

/// Frame deltas are clamped so a long pause between ticks doesn't teleport
/// animations.
const MAX_FRAME_DELTA_MS: f64 = 40.0;
const DEFAULT_FRAME_DELTA_MS: f64 = 1000.0 / 60.0;

#[derive(Default)]
struct Step {
    /// Callbacks for the upcoming pass. Swapped into the running set when
    /// the phase processes, so anything scheduled after that waits a tick.
    scheduled: Vec<FrameCallback>,
    /// Immediate additions made while this phase is mid-process; drained
    /// before the phase finishes.
    interjected: Vec<FrameCallback>,
    /// Registrations that re-enqueue themselves every tick until cancelled.
    keep_alive: Vec<FrameCallback>,
    is_processing: bool,
}

fn contains(buffer: &[FrameCallback], cb: &FrameCallback) -> bool {
    buffer.iter().any(|entry| Arc::ptr_eq(entry, cb))
}

fn remove(buffer: &mut Vec<FrameCallback>, cb: &FrameCallback) {
    buffer.retain(|entry| !Arc::ptr_eq(entry, cb));
}

impl Step {
    fn schedule(&mut self, cb: FrameCallback, keep_alive: bool, immediate: bool) {
        if keep_alive && !contains(&self.keep_alive, &cb) {
            self.keep_alive.push(Arc::clone(&cb));
        }
        let buffer = if immediate && self.is_processing {
            &mut self.interjected
        } else {
            &mut self.scheduled
        };
        if !contains(buffer, &cb) {
            buffer.push(cb);
        }
    }

    fn cancel(&mut self, cb: &FrameCallback) {
        remove(&mut self.scheduled, cb);
        remove(&mut self.interjected, cb);
        remove(&mut self.keep_alive, cb);
    }
}

// ============================================================================
// Scheduler
// ============================================================================

struct SchedulerInner {
    steps: [Step; 5],
    frame: FrameData,
    has_ticked: bool,
    is_ticking: bool,
    tick_requested: bool,
}

/// The frame scheduler. Typically owned by the application loop; work is
/// scheduled through [`SchedulerHandle`]s, which hold only a weak reference.
pub struct FrameScheduler {
    inner: Arc<Mutex<SchedulerInner>>,
    driver: Arc<dyn TickDriver>,
}

impl FrameScheduler {
    pub fn new(driver: Arc<dyn TickDriver>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SchedulerInner {
                steps: Default::default(),
                frame: FrameData::default(),
                has_ticked: false,
                is_ticking: false,
                tick_requested: false,
            })),
            driver,
        }
    }

    /// Weak handle for schedulers of work (values, animations, the visual
    /// tree). Handles outliving the scheduler no-op safely.
    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            inner: Arc::downgrade(&self.inner),
            driver: Arc::clone(&self.driver),
        }
    }

    /// Process one tick: run every phase in order against the given host
    /// timestamp (milliseconds).
    pub fn tick(&self, timestamp_ms: f64) {
        let frame = {
            let mut inner = self.inner.lock().unwrap();
            inner.tick_requested = false;
            inner.is_ticking = true;
            let delta = if inner.has_ticked {
                (timestamp_ms - inner.frame.timestamp).clamp(1.0, MAX_FRAME_DELTA_MS)
            } else {
                DEFAULT_FRAME_DELTA_MS
            };
            inner.has_ticked = true;
            inner.frame = FrameData {
                timestamp: timestamp_ms,
                delta,
            };
            inner.frame
        };
        tracing::trace!(timestamp = frame.timestamp, delta = frame.delta, "tick");

        for phase in Phase::ALL {
            self.process_phase(phase, frame);
        }

        let request = {
            let mut inner = self.inner.lock().unwrap();
            inner.is_ticking = false;
            let more = inner.steps.iter().any(|step| !step.scheduled.is_empty());
            if more && !inner.tick_requested {
                inner.tick_requested = true;
            }
            more
        };
        if request {
            self.driver.request_tick();
        }
    }

    fn process_phase(&self, phase: Phase, frame: FrameData) {
        // Take the buffer out so callbacks run without the scheduler lock;
        // re-entrant scheduling lands in `scheduled` (next tick) or
        // `interjected` (immediate, this pass).
        let to_run = {
            let mut inner = self.inner.lock().unwrap();
            let step = &mut inner.steps[phase.index()];
            step.is_processing = true;
            std::mem::take(&mut step.scheduled)
        };

        for cb in &to_run {
            cb(frame);
        }

        loop {
            let interjected = {
                let mut inner = self.inner.lock().unwrap();
                std::mem::take(&mut inner.steps[phase.index()].interjected)
            };
            if interjected.is_empty() {
                break;
            }
            for cb in &interjected {
                cb(frame);
            }
        }

        let mut inner = self.inner.lock().unwrap();
        let step = &mut inner.steps[phase.index()];
        step.is_processing = false;
        // Keep-alive registrations go straight back into the next pass.
        for cb in &to_run {
            if contains(&step.keep_alive, cb) && !contains(&step.scheduled, cb) {
                step.scheduled.push(Arc::clone(cb));
            }
        }
    }

    pub fn frame_data(&self) -> FrameData {
        self.inner.lock().unwrap().frame
    }

    pub fn schedule(&self, phase: Phase, cb: FrameCallback, keep_alive: bool, immediate: bool) {
        self.handle().schedule(phase, cb, keep_alive, immediate);
    }

    pub fn cancel(&self, phase: Phase, cb: &FrameCallback) {
        self.handle().cancel(phase, cb);
    }
}

/// Weak handle to the frame scheduler, in the same shape the rest of the
/// system passes around. All operations no-op once the scheduler is gone.
#[derive(Clone)]
pub struct SchedulerHandle {
    inner: Weak<Mutex<SchedulerInner>>,
    driver: Arc<dyn TickDriver>,
}

impl SchedulerHandle {
    /// Queue a callback into a phase.
    ///
    /// `keep_alive` re-enqueues the callback every tick until cancelled.
    /// `immediate` lets a callback scheduled from within its own phase run
    /// before that phase finishes, instead of next tick.
    pub fn schedule(&self, phase: Phase, cb: FrameCallback, keep_alive: bool, immediate: bool) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let request = {
            let mut inner = inner.lock().unwrap();
            inner.steps[phase.index()].schedule(cb, keep_alive, immediate);
            if !inner.is_ticking && !inner.tick_requested {
                inner.tick_requested = true;
                true
            } else {
                false
            }
        };
        if request {
            self.driver.request_tick();
        }
    }

    /// Remove a callback from a phase before it runs. Idempotent; unknown
    /// callbacks are ignored.
    pub fn cancel(&self, phase: Phase, cb: &FrameCallback) {
        if let Some(inner) = self.inner.upgrade() {
            inner.lock().unwrap().steps[phase.index()].cancel(cb);
        }
    }

    /// Timing data of the current (or most recent) tick.
    pub fn frame_data(&self) -> FrameData {
        self.inner
            .upgrade()
            .map(|inner| inner.lock().unwrap().frame)
            .unwrap_or_default()
    }

    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn harness() -> (FrameScheduler, Arc<ManualTickDriver>) {
        let driver = Arc::new(ManualTickDriver::new());
        (FrameScheduler::new(driver.clone()), driver)
    }

    fn counter_cb(count: Arc<Mutex<u32>>) -> FrameCallback {
        Arc::new(move |_| *count.lock().unwrap() += 1)
    }

    #[test]
    fn same_callback_twice_runs_once_per_tick() {
        let (scheduler, driver) = harness();
        let count = Arc::new(Mutex::new(0));
        let cb = counter_cb(count.clone());

        scheduler.schedule(Phase::Update, cb.clone(), false, false);
        scheduler.schedule(Phase::Update, cb.clone(), false, false);
        assert!(driver.take_request());
        scheduler.tick(0.0);
        assert_eq!(*count.lock().unwrap(), 1);

        // Scheduling again after the tick runs it again on the next tick.
        scheduler.schedule(Phase::Update, cb.clone(), false, false);
        scheduler.tick(16.0);
        assert_eq!(*count.lock().unwrap(), 2);
    }

    #[test]
    fn phases_run_in_fixed_order() {
        let (scheduler, _driver) = harness();
        let order = Arc::new(Mutex::new(Vec::new()));
        for (phase, name) in [
            (Phase::Render, "render"),
            (Phase::Read, "read"),
            (Phase::PostRender, "post"),
            (Phase::Update, "update"),
            (Phase::PreRender, "pre"),
        ] {
            let order = order.clone();
            scheduler.schedule(phase, Arc::new(move |_| order.lock().unwrap().push(name)), false, false);
        }
        scheduler.tick(0.0);
        assert_eq!(
            *order.lock().unwrap(),
            vec!["read", "update", "pre", "render", "post"]
        );
    }

    #[test]
    fn scheduling_into_earlier_phase_defers_to_next_tick() {
        let (scheduler, _driver) = harness();
        let handle = scheduler.handle();
        let read_count = Arc::new(Mutex::new(0));
        let read_cb = counter_cb(read_count.clone());

        let read_cb_outer = read_cb.clone();
        let from_update: FrameCallback = Arc::new(move |_| {
            handle.schedule(Phase::Read, read_cb_outer.clone(), false, false);
        });
        scheduler.schedule(Phase::Update, from_update, false, false);

        scheduler.tick(0.0);
        // Read already ran this tick; the callback waits for the next one.
        assert_eq!(*read_count.lock().unwrap(), 0);
        scheduler.tick(16.0);
        assert_eq!(*read_count.lock().unwrap(), 1);
    }

    #[test]
    fn scheduling_into_later_phase_runs_same_tick() {
        let (scheduler, _driver) = harness();
        let handle = scheduler.handle();
        let render_count = Arc::new(Mutex::new(0));
        let render_cb = counter_cb(render_count.clone());

        let render_cb_outer = render_cb.clone();
        let from_update: FrameCallback = Arc::new(move |_| {
            handle.schedule(Phase::Render, render_cb_outer.clone(), false, false);
        });
        scheduler.schedule(Phase::Update, from_update, false, false);

        scheduler.tick(0.0);
        assert_eq!(*render_count.lock().unwrap(), 1);
    }

    #[test]
    fn keep_alive_runs_every_tick_until_cancelled() {
        let (scheduler, driver) = harness();
        let count = Arc::new(Mutex::new(0));
        let cb = counter_cb(count.clone());

        scheduler.schedule(Phase::Update, cb.clone(), true, false);
        scheduler.tick(0.0);
        assert!(driver.take_request());
        scheduler.tick(16.0);
        scheduler.tick(32.0);
        assert_eq!(*count.lock().unwrap(), 3);

        scheduler.cancel(Phase::Update, &cb);
        scheduler.tick(48.0);
        assert_eq!(*count.lock().unwrap(), 3);
    }

    #[test]
    fn cancel_is_idempotent() {
        let (scheduler, _driver) = harness();
        let count = Arc::new(Mutex::new(0));
        let cb = counter_cb(count.clone());

        scheduler.schedule(Phase::Read, cb.clone(), false, false);
        scheduler.cancel(Phase::Read, &cb);
        scheduler.cancel(Phase::Read, &cb);
        scheduler.tick(0.0);
        assert_eq!(*count.lock().unwrap(), 0);
    }

    #[test]
    fn immediate_runs_within_current_phase() {
        let (scheduler, _driver) = harness();
        let handle = scheduler.handle();
        let count = Arc::new(Mutex::new(0));
        let late = counter_cb(count.clone());

        let late_outer = late.clone();
        let from_update: FrameCallback = Arc::new(move |_| {
            handle.schedule(Phase::Update, late_outer.clone(), false, true);
        });
        scheduler.schedule(Phase::Update, from_update, false, false);
        scheduler.tick(0.0);
        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn delta_is_clamped() {
        let (scheduler, _driver) = harness();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let cb: FrameCallback = Arc::new(move |frame| s.lock().unwrap().push(frame.delta));
        scheduler.schedule(Phase::Update, cb.clone(), true, false);

        scheduler.tick(0.0);
        scheduler.tick(500.0);
        let seen = seen.lock().unwrap();
        assert_eq!(seen[0], DEFAULT_FRAME_DELTA_MS);
        assert_eq!(seen[1], MAX_FRAME_DELTA_MS);
    }

    #[test]
    fn handle_outlives_scheduler_safely() {
        let handle = {
            let (scheduler, _driver) = harness();
            scheduler.handle()
        };
        assert!(!handle.is_alive());
        handle.schedule(Phase::Update, Arc::new(|_| {}), false, false);
        handle.cancel(Phase::Update, &(Arc::new(|_| {}) as FrameCallback));
    }
}
