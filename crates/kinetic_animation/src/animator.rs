//! Animation engine
//!
//! Drives a [`SharedValue`] from an origin to a target through a generator
//! (spring or timed keyframe interpolation), sampling once per scheduler
//! tick in the `Update` phase. Each animation moves through
//! `Pending → Running → {Completed | Cancelled}`; attaching a new animation
//! to a value that already has one replaces and cancels the old one.
//!
//! Generator defaults are selected from a value's semantic category, which
//! is computed once when the value is declared rather than re-derived from
//! the name on every animation.

use std::sync::{Arc, Mutex};

use kinetic_core::value_types::{parse_value, ParsedValue, Unit, UnitValue};
use kinetic_core::{SharedValue, Value};

use crate::easing::Easing;
use crate::error::AnimationError;
use crate::frames::{FrameCallback, Phase, SchedulerHandle};
use crate::keyframes::{resolve_keyframes, AnimationTarget, InterpGenerator};
use crate::spring::{SpringConfig, SpringGenerator};

// ============================================================================
// Value categories
// ============================================================================

/// Semantic category of an animatable value, driving generator defaults.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueCategory {
    /// Translation and rotation: under-damped spring with loose rest.
    Positional,
    /// Scale factors: over-damped spring, stiffer still toward zero.
    ScaleLike,
    /// Opacity and colors: short linear tween.
    Blendable,
    /// Everything else: the over-damped spring fallback.
    Other,
}

impl ValueCategory {
    /// Closed name mapping, evaluated once at value declaration.
    pub fn of(name: &str) -> Self {
        match name {
            "x" | "y" | "z" | "rotate" | "rotateX" | "rotateY" | "rotateZ" => Self::Positional,
            "scale" | "scaleX" | "scaleY" | "scaleZ" => Self::ScaleLike,
            "opacity" | "color" | "backgroundColor" | "borderColor" | "fill" | "stroke" => {
                Self::Blendable
            }
            _ => Self::Other,
        }
    }
}

// ============================================================================
// Transition configuration
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransitionKind {
    Spring,
    Tween,
    Keyframes,
}

/// How to run one animation. Unset fields fall back to category defaults.
#[derive(Clone, Debug, Default)]
pub struct Transition {
    pub kind: Option<TransitionKind>,
    /// Explicit origin override; defaults to the value's current payload.
    pub from: Option<Value>,
    pub delay_ms: f64,
    pub duration_ms: Option<f64>,
    pub ease: Option<Easing>,
    /// Normalized keyframe time offsets; must match the keyframe count.
    pub times: Option<Vec<f32>>,
    pub stiffness: Option<f32>,
    pub damping: Option<f32>,
    pub mass: Option<f32>,
    /// Initial spring velocity; defaults to the value's live velocity.
    pub velocity: Option<f32>,
    pub rest_delta: Option<f32>,
    pub rest_speed: Option<f32>,
}

impl Transition {
    pub fn spring() -> Self {
        Self {
            kind: Some(TransitionKind::Spring),
            ..Default::default()
        }
    }

    pub fn tween(duration_ms: f64) -> Self {
        Self {
            kind: Some(TransitionKind::Tween),
            duration_ms: Some(duration_ms),
            ..Default::default()
        }
    }

    pub fn keyframes(duration_ms: f64) -> Self {
        Self {
            kind: Some(TransitionKind::Keyframes),
            duration_ms: Some(duration_ms),
            ..Default::default()
        }
    }

    pub fn with_spring_config(mut self, config: SpringConfig) -> Self {
        self.kind = Some(TransitionKind::Spring);
        self.stiffness = Some(config.stiffness);
        self.damping = Some(config.damping);
        self.mass = Some(config.mass);
        self.rest_delta = Some(config.rest_delta);
        self.rest_speed = Some(config.rest_speed);
        self
    }

    pub fn with_ease(mut self, ease: Easing) -> Self {
        self.ease = Some(ease);
        self
    }

    pub fn with_delay(mut self, delay_ms: f64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    pub fn with_from(mut self, from: impl Into<Value>) -> Self {
        self.from = Some(from.into());
        self
    }

    pub fn with_velocity(mut self, velocity: f32) -> Self {
        self.velocity = Some(velocity);
        self
    }

    pub fn with_times(mut self, times: Vec<f32>) -> Self {
        self.times = Some(times);
        self
    }
}

// ============================================================================
// Handles
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnimationState {
    Pending,
    Running,
    Completed,
    Cancelled,
}

struct HandleInner {
    state: AnimationState,
    callback: Option<FrameCallback>,
    on_complete: Option<Box<dyn FnOnce() + Send>>,
}

/// Cancellable handle to a started animation.
///
/// Cancelling never errors: a handle whose animation already finished
/// treats cancellation as success and leaves the last written sample in
/// place. Completion is observed through [`on_complete`](Self::on_complete)
/// or by polling [`state`](Self::state).
#[derive(Clone)]
pub struct AnimationHandle {
    inner: Arc<Mutex<HandleInner>>,
    scheduler: SchedulerHandle,
}

impl std::fmt::Debug for AnimationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnimationHandle")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl AnimationHandle {
    pub fn state(&self) -> AnimationState {
        self.inner.lock().unwrap().state
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self.state(),
            AnimationState::Completed | AnimationState::Cancelled
        )
    }

    /// Stop sampling immediately, leaving the value at its last sample.
    /// Idempotent; cancelling a finished animation is a silent no-op.
    pub fn cancel(&self) {
        let cb = {
            let mut inner = self.inner.lock().unwrap();
            match inner.state {
                AnimationState::Completed | AnimationState::Cancelled => return,
                _ => {
                    inner.state = AnimationState::Cancelled;
                    inner.on_complete = None;
                    inner.callback.take()
                }
            }
        };
        if let Some(cb) = cb {
            self.scheduler.cancel(Phase::Update, &cb);
        }
        tracing::debug!("animation cancelled");
    }

    /// Register a completion callback. Fires exactly once when the
    /// animation reaches `Completed`; a cancelled animation never fires it.
    /// Registering on an already-completed handle fires immediately.
    pub fn on_complete(&self, f: impl FnOnce() + Send + 'static) {
        let run_now = {
            let mut inner = self.inner.lock().unwrap();
            match inner.state {
                AnimationState::Completed => true,
                AnimationState::Cancelled => return,
                _ => {
                    inner.on_complete = Some(Box::new(f));
                    return;
                }
            }
        };
        if run_now {
            f();
        }
    }
}

// ============================================================================
// Generator track
// ============================================================================

enum Track {
    Spring {
        generator: SpringGenerator,
        unit: Option<Unit>,
    },
    Interp(InterpGenerator),
}

impl Track {
    fn step(&mut self, dt_ms: f64) -> (Value, bool) {
        match self {
            Self::Spring { generator, unit } => {
                let sample = generator.step(dt_ms);
                let value = match unit {
                    Some(unit) => UnitValue::new(sample, *unit).to_value(),
                    None => Value::Number(sample),
                };
                (value, generator.is_done())
            }
            Self::Interp(generator) => {
                let value = generator.step(dt_ms);
                (value, generator.is_done())
            }
        }
    }
}

/// Read a keyframe as (number, unit) for the spring track.
fn numeric_frame(v: &Value) -> Result<(f32, Option<Unit>), AnimationError> {
    match parse_value(v) {
        Some(ParsedValue::Number(n)) => Ok((n, None)),
        Some(ParsedValue::Unit(u)) => Ok((u.value, Some(u.unit))),
        _ => Err(AnimationError::NotAnimatable {
            from: v.to_string(),
            to: "a spring-driven numeric value".to_string(),
        }),
    }
}

struct DriveState {
    track: Track,
    delay_remaining_ms: f64,
}

// ============================================================================
// Starting animations
// ============================================================================

const DEFAULT_TWEEN_DURATION_MS: f64 = 300.0;
const DEFAULT_KEYFRAMES_DURATION_MS: f64 = 800.0;

/// Start animating `value` toward `target`.
///
/// Resolves the origin and keyframes, selects a generator, binds the
/// animation to the value (displacing any previous animation), and
/// registers an `Update`-phase driver with the scheduler. Invalid targets
/// are reported synchronously and nothing starts.
pub fn start_animation(
    scheduler: &SchedulerHandle,
    value: &SharedValue,
    category: ValueCategory,
    target: impl Into<AnimationTarget>,
    transition: Transition,
) -> Result<AnimationHandle, AnimationError> {
    let target = target.into();
    let origin = transition.from.clone().unwrap_or_else(|| value.get());
    let frames = resolve_keyframes(origin, &target)?;

    let kind = transition.kind.unwrap_or_else(|| {
        if matches!(target, AnimationTarget::Keyframes(_)) {
            TransitionKind::Keyframes
        } else {
            match category {
                ValueCategory::Blendable => TransitionKind::Tween,
                _ => TransitionKind::Spring,
            }
        }
    });

    let track = match kind {
        TransitionKind::Spring => {
            let first = numeric_frame(&frames[0])?;
            let last = numeric_frame(frames.last().unwrap_or(&frames[0]))?;
            let unit = first.1.or(last.1);
            let target_is_zero = last.0 == 0.0;
            let base = match category {
                ValueCategory::Positional => SpringConfig::under_damped(),
                ValueCategory::Blendable => SpringConfig::default(),
                ValueCategory::ScaleLike | ValueCategory::Other => {
                    SpringConfig::over_damped(target_is_zero)
                }
            };
            let config = SpringConfig {
                stiffness: transition.stiffness.unwrap_or(base.stiffness),
                damping: transition.damping.unwrap_or(base.damping),
                mass: transition.mass.unwrap_or(base.mass),
                rest_delta: transition.rest_delta.unwrap_or(base.rest_delta),
                rest_speed: transition.rest_speed.unwrap_or(base.rest_speed),
            };
            let velocity = transition.velocity.unwrap_or_else(|| value.velocity());
            Track::Spring {
                generator: SpringGenerator::new(config, first.0, last.0, velocity),
                unit,
            }
        }
        TransitionKind::Tween => {
            let duration = transition.duration_ms.unwrap_or(DEFAULT_TWEEN_DURATION_MS);
            let ease = transition.ease.unwrap_or(match category {
                ValueCategory::Blendable => Easing::Linear,
                _ => Easing::EaseOut,
            });
            Track::Interp(InterpGenerator::new(
                frames,
                transition.times.clone(),
                duration,
                ease,
            )?)
        }
        TransitionKind::Keyframes => {
            let duration = transition
                .duration_ms
                .unwrap_or(DEFAULT_KEYFRAMES_DURATION_MS);
            let ease = transition.ease.unwrap_or(Easing::Linear);
            Track::Interp(InterpGenerator::new(
                frames,
                transition.times.clone(),
                duration,
                ease,
            )?)
        }
    };

    let handle = AnimationHandle {
        inner: Arc::new(Mutex::new(HandleInner {
            state: AnimationState::Pending,
            callback: None,
            on_complete: None,
        })),
        scheduler: scheduler.clone(),
    };

    let drive = Arc::new(Mutex::new(DriveState {
        track,
        delay_remaining_ms: transition.delay_ms.max(0.0),
    }));

    let cb: FrameCallback = {
        let handle_inner = Arc::clone(&handle.inner);
        let scheduler = scheduler.clone();
        let value = value.clone();
        Arc::new(move |frame| {
            {
                let mut inner = handle_inner.lock().unwrap();
                match inner.state {
                    // A cancelled registration can fire once more in the
                    // tick where cancellation landed.
                    AnimationState::Completed | AnimationState::Cancelled => return,
                    AnimationState::Pending => inner.state = AnimationState::Running,
                    AnimationState::Running => {}
                }
            }

            let (sample, done) = {
                let mut drive = drive.lock().unwrap();
                let mut dt = frame.delta;
                if drive.delay_remaining_ms > 0.0 {
                    drive.delay_remaining_ms -= dt;
                    if drive.delay_remaining_ms > 0.0 {
                        return;
                    }
                    // Spend whatever portion of the frame outlived the delay.
                    dt = -drive.delay_remaining_ms;
                    drive.delay_remaining_ms = 0.0;
                }
                drive.track.step(dt)
            };

            value.set_at(sample, frame.timestamp);

            if done {
                let (cb, on_complete) = {
                    let mut inner = handle_inner.lock().unwrap();
                    inner.state = AnimationState::Completed;
                    (inner.callback.take(), inner.on_complete.take())
                };
                value.clear_animation();
                if let Some(cb) = cb {
                    scheduler.cancel(Phase::Update, &cb);
                }
                tracing::debug!("animation completed");
                if let Some(f) = on_complete {
                    f();
                }
            }
        })
    };

    handle.inner.lock().unwrap().callback = Some(Arc::clone(&cb));

    // Bind to the value first so a displaced animation stops before our
    // first sample lands.
    let stopper = {
        let handle = handle.clone();
        Box::new(move || handle.cancel())
    };
    value.attach_animation(stopper);

    scheduler.schedule(Phase::Update, cb, true, false);
    tracing::debug!(?category, "animation started");
    Ok(handle)
}
