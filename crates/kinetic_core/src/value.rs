//! Observable animatable values
//!
//! A [`SharedValue`] is a single observable payload (number or text) with
//! velocity tracking and synchronous change notification. Values are cheap
//! handles: cloning shares the same cell, so one value can feed many
//! subscribers and one subscriber can watch many values.
//!
//! Animations bind to a value through [`SharedValue::attach_animation`];
//! attaching a new animation replaces (and stops) the previous one, so a
//! value is only ever driven by one animation at a time.

use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::time::Instant;

// ============================================================================
// Payload
// ============================================================================

/// The payload carried by a [`SharedValue`].
///
/// `Text` covers unit strings ("100px", "45deg") and colors ("#fff",
/// "rgba(…)") as well as non-animatable values like "none".
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Number(f32),
    Text(String),
}

impl Value {
    /// Numeric payload, if this is a number.
    pub fn as_number(&self) -> Option<f32> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(_) => None,
        }
    }

    /// Numeric payload, parsing the leading float out of text ("12.5px" -> 12.5).
    pub fn to_f32_lossy(&self) -> f32 {
        match self {
            Self::Number(n) => *n,
            Self::Text(s) => {
                let digits: String = s
                    .chars()
                    .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
                    .collect();
                digits.parse().unwrap_or(0.0)
            }
        }
    }
}

impl From<f32> for Value {
    fn from(n: f32) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

// ============================================================================
// Clocks
// ============================================================================

/// Monotonic time source for velocity tracking.
///
/// Injected so tests can drive values with known timestamps instead of
/// real timers.
pub trait Clock: Send + Sync {
    /// Milliseconds since an arbitrary fixed epoch.
    fn now_ms(&self) -> f64;
}

/// Wall clock backed by [`Instant`], shared process-wide epoch.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> f64 {
        static EPOCH: OnceLock<Instant> = OnceLock::new();
        EPOCH.get_or_init(Instant::now).elapsed().as_secs_f64() * 1000.0
    }
}

/// Manually advanced clock for tests.
#[derive(Default)]
pub struct ManualClock {
    ms: Mutex<f64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, ms: f64) {
        *self.ms.lock().unwrap() += ms;
    }

    pub fn set(&self, ms: f64) {
        *self.ms.lock().unwrap() = ms;
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> f64 {
        *self.ms.lock().unwrap()
    }
}

// ============================================================================
// Subscriptions
// ============================================================================

type Listener = Arc<Mutex<dyn FnMut(&Value) + Send>>;

#[derive(Default)]
struct SubscriberList {
    next_id: u64,
    entries: Vec<(u64, Listener)>,
}

/// Handle to a change listener registered with [`SharedValue::on_change`].
///
/// Unsubscribing is explicit and idempotent; dropping the handle leaves the
/// listener attached for the lifetime of the value.
pub struct Subscription {
    id: u64,
    list: Weak<Mutex<SubscriberList>>,
}

impl Subscription {
    pub fn unsubscribe(&self) {
        if let Some(list) = self.list.upgrade() {
            list.lock().unwrap().entries.retain(|(id, _)| *id != self.id);
        }
    }
}

// ============================================================================
// SharedValue
// ============================================================================

/// Velocity is only meaningful for a short trailing window; samples older
/// than this report zero.
const MAX_VELOCITY_WINDOW_MS: f64 = 30.0;

struct ValueState {
    current: Value,
    prev: Value,
    updated_at: f64,
    prev_updated_at: f64,
    stop_animation: Option<Box<dyn FnOnce() + Send>>,
}

/// An observable value with velocity tracking and animation attachment.
#[derive(Clone)]
pub struct SharedValue {
    state: Arc<Mutex<ValueState>>,
    subscribers: Arc<Mutex<SubscriberList>>,
    clock: Arc<dyn Clock>,
}

impl SharedValue {
    pub fn new(initial: impl Into<Value>) -> Self {
        Self::with_clock(initial, Arc::new(SystemClock))
    }

    pub fn with_clock(initial: impl Into<Value>, clock: Arc<dyn Clock>) -> Self {
        let initial = initial.into();
        let now = clock.now_ms();
        Self {
            state: Arc::new(Mutex::new(ValueState {
                prev: initial.clone(),
                current: initial,
                updated_at: now,
                prev_updated_at: now,
                stop_animation: None,
            })),
            subscribers: Arc::new(Mutex::new(SubscriberList::default())),
            clock,
        }
    }

    /// Current payload.
    pub fn get(&self) -> Value {
        self.state.lock().unwrap().current.clone()
    }

    /// Payload before the most recent write.
    pub fn previous(&self) -> Value {
        self.state.lock().unwrap().prev.clone()
    }

    /// Store a new payload and synchronously notify all listeners.
    pub fn set(&self, v: impl Into<Value>) {
        self.set_at(v, self.clock.now_ms());
    }

    /// Store a new payload with an explicit timestamp (milliseconds).
    ///
    /// Frame-driven writers (animations) pass the frame timestamp so velocity
    /// reflects frame time rather than wall time.
    pub fn set_at(&self, v: impl Into<Value>, timestamp_ms: f64) {
        let v = v.into();
        {
            let mut state = self.state.lock().unwrap();
            state.prev = std::mem::replace(&mut state.current, v.clone());
            state.prev_updated_at = state.updated_at;
            state.updated_at = timestamp_ms;
        }
        self.notify(&v);
    }

    fn notify(&self, v: &Value) {
        // Snapshot the listener list so subscribe/unsubscribe from inside a
        // listener can't deadlock or invalidate the iteration.
        let listeners: Vec<Listener> = {
            let list = self.subscribers.lock().unwrap();
            list.entries.iter().map(|(_, l)| Arc::clone(l)).collect()
        };
        for listener in listeners {
            (listener.lock().unwrap())(v);
        }
    }

    /// Subscribe to payload changes. Listeners run synchronously on every
    /// write, in subscription order.
    pub fn on_change(&self, f: impl FnMut(&Value) + Send + 'static) -> Subscription {
        let mut list = self.subscribers.lock().unwrap();
        let id = list.next_id;
        list.next_id += 1;
        list.entries.push((id, Arc::new(Mutex::new(f))));
        Subscription {
            id,
            list: Arc::downgrade(&self.subscribers),
        }
    }

    /// Remove every change listener.
    pub fn clear_listeners(&self) {
        self.subscribers.lock().unwrap().entries.clear();
    }

    /// Velocity in units per second, derived from the two most recent writes.
    ///
    /// Reports zero for text payloads without a numeric reading, and for
    /// values that have not been written within the trailing velocity window.
    pub fn velocity(&self) -> f32 {
        let state = self.state.lock().unwrap();
        if self.clock.now_ms() - state.updated_at > MAX_VELOCITY_WINDOW_MS {
            return 0.0;
        }
        let (Some(current), Some(prev)) = (
            state.current.as_number().or_else(|| numeric_part(&state.current)),
            state.prev.as_number().or_else(|| numeric_part(&state.prev)),
        ) else {
            return 0.0;
        };
        let elapsed_ms = (state.updated_at - state.prev_updated_at).max(1.0);
        (current - prev) / (elapsed_ms as f32 / 1000.0)
    }

    /// Bind an animation to this value, replacing and stopping any previous
    /// one. The stopper is invoked when the animation is displaced or
    /// [`stop_animation`](Self::stop_animation) is called.
    pub fn attach_animation(&self, stop: Box<dyn FnOnce() + Send>) {
        let prev = {
            let mut state = self.state.lock().unwrap();
            state.stop_animation.replace(stop)
        };
        if let Some(prev) = prev {
            tracing::trace!("replacing active animation on value");
            prev();
        }
    }

    /// Detach and stop the bound animation without reverting the current
    /// payload. No-op when nothing is attached.
    pub fn stop_animation(&self) {
        let stop = self.state.lock().unwrap().stop_animation.take();
        if let Some(stop) = stop {
            stop();
        }
    }

    /// Drop the animation binding without invoking its stopper. Called by the
    /// animation itself on completion.
    pub fn clear_animation(&self) {
        self.state.lock().unwrap().stop_animation = None;
    }

    pub fn has_animation(&self) -> bool {
        self.state.lock().unwrap().stop_animation.is_some()
    }

    /// Weak handle that does not keep the value alive. Listeners that need a
    /// back-reference hold one of these, never a strong clone.
    pub fn downgrade(&self) -> WeakSharedValue {
        WeakSharedValue {
            state: Arc::downgrade(&self.state),
            subscribers: Arc::downgrade(&self.subscribers),
            clock: Arc::clone(&self.clock),
        }
    }

    /// Derive a value whose payload is a function of this one.
    ///
    /// The output updates synchronously whenever this value changes. It holds
    /// only a weak relation back, so dropping every clone of the output ends
    /// the derivation.
    pub fn map(&self, mut f: impl FnMut(&Value) -> Value + Send + 'static) -> SharedValue {
        let out = SharedValue::with_clock(f(&self.get()), Arc::clone(&self.clock));
        let weak_out = out.downgrade();
        // Subscription lives as long as the source value.
        let _ = self.on_change(move |v| {
            if let Some(out) = weak_out.upgrade() {
                out.set(f(v));
            }
        });
        out
    }
}

/// Weak counterpart to [`SharedValue`], produced by [`SharedValue::downgrade`].
#[derive(Clone)]
pub struct WeakSharedValue {
    state: Weak<Mutex<ValueState>>,
    subscribers: Weak<Mutex<SubscriberList>>,
    clock: Arc<dyn Clock>,
}

impl WeakSharedValue {
    pub fn upgrade(&self) -> Option<SharedValue> {
        Some(SharedValue {
            state: self.state.upgrade()?,
            subscribers: self.subscribers.upgrade()?,
            clock: Arc::clone(&self.clock),
        })
    }
}

/// Combine several values into one derived value (many-to-one fan-in).
///
/// The listeners installed on the sources hold only weak relations, both to
/// the output and to the other sources.
pub fn combine_values(
    sources: &[SharedValue],
    f: impl Fn(&[Value]) -> Value + Send + Sync + 'static,
) -> SharedValue {
    let f = Arc::new(f);
    let initial: Vec<Value> = sources.iter().map(SharedValue::get).collect();
    let out = SharedValue::new(f(&initial));
    let weak_sources: Vec<WeakSharedValue> =
        sources.iter().map(SharedValue::downgrade).collect();
    for source in sources {
        let weak_out = out.downgrade();
        let weak_sources = weak_sources.clone();
        let f = Arc::clone(&f);
        let _ = source.on_change(move |_| {
            let Some(out) = weak_out.upgrade() else {
                return;
            };
            let latest: Vec<Value> = weak_sources
                .iter()
                .filter_map(|w| w.upgrade().map(|v| v.get()))
                .collect();
            if latest.len() == weak_sources.len() {
                out.set(f(&latest));
            }
        });
    }
    out
}

fn numeric_part(v: &Value) -> Option<f32> {
    match v {
        Value::Number(n) => Some(*n),
        Value::Text(s) => {
            let digits: String = s
                .chars()
                .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
                .collect();
            digits.parse().ok()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manual() -> (SharedValue, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let value = SharedValue::with_clock(0.0, clock.clone() as Arc<dyn Clock>);
        (value, clock)
    }

    #[test]
    fn set_and_get() {
        let value = SharedValue::new(1.0);
        assert_eq!(value.get(), Value::Number(1.0));
        value.set(2.5);
        assert_eq!(value.get(), Value::Number(2.5));
        assert_eq!(value.previous(), Value::Number(1.0));
    }

    #[test]
    fn clones_share_state() {
        let a = SharedValue::new(0.0);
        let b = a.clone();
        b.set(7.0);
        assert_eq!(a.get(), Value::Number(7.0));
    }

    #[test]
    fn velocity_from_known_elapsed() {
        let (value, clock) = manual();
        value.set_at(10.0, 0.0);
        clock.set(10.0);
        value.set_at(30.0, 10.0);
        // (30 - 10) over 10ms = 2000/s
        assert!((value.velocity() - 2000.0).abs() < 1e-3);
    }

    #[test]
    fn velocity_zero_outside_trailing_window() {
        let (value, clock) = manual();
        value.set_at(10.0, 0.0);
        value.set_at(30.0, 10.0);
        clock.set(100.0);
        assert_eq!(value.velocity(), 0.0);
    }

    #[test]
    fn velocity_reset_by_writing_twice() {
        let (value, clock) = manual();
        value.set_at(0.0, 0.0);
        clock.set(10.0);
        value.set_at(50.0, 10.0);
        value.set_at(50.0, 10.0);
        assert_eq!(value.velocity(), 0.0);
    }

    #[test]
    fn listeners_fire_synchronously_in_order() {
        let value = SharedValue::new(0.0);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let a = seen.clone();
        let _s1 = value.on_change(move |v| a.lock().unwrap().push(("a", v.clone())));
        let b = seen.clone();
        let _s2 = value.on_change(move |v| b.lock().unwrap().push(("b", v.clone())));

        value.set(3.0);
        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![("a", Value::Number(3.0)), ("b", Value::Number(3.0))]
        );
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let value = SharedValue::new(0.0);
        let count = Arc::new(Mutex::new(0));
        let c = count.clone();
        let sub = value.on_change(move |_| *c.lock().unwrap() += 1);
        value.set(1.0);
        sub.unsubscribe();
        sub.unsubscribe();
        value.set(2.0);
        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn attach_replaces_and_stops_previous() {
        let value = SharedValue::new(0.0);
        let stopped = Arc::new(Mutex::new(false));
        let flag = stopped.clone();
        value.attach_animation(Box::new(move || *flag.lock().unwrap() = true));
        value.attach_animation(Box::new(|| {}));
        assert!(*stopped.lock().unwrap());
        assert!(value.has_animation());
    }

    #[test]
    fn stop_detaches_without_reverting() {
        let value = SharedValue::new(0.0);
        value.attach_animation(Box::new(|| {}));
        value.set(5.0);
        value.stop_animation();
        assert!(!value.has_animation());
        assert_eq!(value.get(), Value::Number(5.0));
    }

    #[test]
    fn map_tracks_source() {
        let source = SharedValue::new(2.0);
        let doubled = source.map(|v| Value::Number(v.as_number().unwrap_or(0.0) * 2.0));
        assert_eq!(doubled.get(), Value::Number(4.0));
        source.set(5.0);
        assert_eq!(doubled.get(), Value::Number(10.0));
    }

    #[test]
    fn combine_fans_in() {
        let x = SharedValue::new(2.0);
        let y = SharedValue::new(3.0);
        let product = combine_values(&[x.clone(), y.clone()], |latest| {
            Value::Number(
                latest
                    .iter()
                    .map(|v| v.as_number().unwrap_or(1.0))
                    .product(),
            )
        });
        assert_eq!(product.get(), Value::Number(6.0));
        x.set(4.0);
        assert_eq!(product.get(), Value::Number(12.0));
    }
}
