//! Keyframe resolution and timed interpolation
//!
//! Turns an animation request (origin + scalar target or keyframe list)
//! into a fully resolved keyframe sequence, and provides the timed
//! generator that samples through that sequence.
//!
//! Wildcard entries (`None`) in a keyframe list mean "reuse the previous
//! resolved value"; a leading wildcard resolves against the origin. Origins
//! and targets get unit-aware zero coercion so `"none"`/zero endpoints can
//! pair with typed values.

use kinetic_core::value_types::{
    animatable_none, is_none_value, is_zero, mix_values, parse_value, values_animatable,
    zero_like, ParsedValue,
};
use kinetic_core::Value;

use crate::easing::Easing;
use crate::error::AnimationError;

// ============================================================================
// Targets and resolution
// ============================================================================

/// What a value is being animated toward.
#[derive(Clone, Debug)]
pub enum AnimationTarget {
    /// A single destination; the origin becomes the implicit first keyframe.
    To(Value),
    /// An ordered keyframe sequence. `None` entries are wildcards.
    Keyframes(Vec<Option<Value>>),
}

impl From<f32> for AnimationTarget {
    fn from(n: f32) -> Self {
        Self::To(Value::Number(n))
    }
}

impl From<&str> for AnimationTarget {
    fn from(s: &str) -> Self {
        Self::To(Value::Text(s.to_string()))
    }
}

impl From<Value> for AnimationTarget {
    fn from(v: Value) -> Self {
        Self::To(v)
    }
}

/// Resolve origin and target into a concrete keyframe sequence.
///
/// Validates that every adjacent pair can be mixed; the error is reported
/// synchronously and the animation never starts.
pub fn resolve_keyframes(
    origin: Value,
    target: &AnimationTarget,
) -> Result<Vec<Value>, AnimationError> {
    let frames = match target {
        AnimationTarget::To(to) => {
            let (origin, to) = coerce_endpoints(origin, to.clone());
            vec![origin, to]
        }
        AnimationTarget::Keyframes(entries) => {
            if entries.is_empty() {
                return Err(AnimationError::EmptyKeyframes);
            }
            let mut resolved: Vec<Value> = Vec::with_capacity(entries.len());
            for entry in entries {
                let value = match entry {
                    Some(v) => v.clone(),
                    // Wildcard: previous resolved keyframe, or the origin
                    // for a leading wildcard.
                    None => resolved.last().cloned().unwrap_or_else(|| origin.clone()),
                };
                resolved.push(value);
            }
            resolved
        }
    };

    for pair in frames.windows(2) {
        if pair[0] != pair[1] && !values_animatable(&pair[0], &pair[1]) {
            return Err(AnimationError::NotAnimatable {
                from: pair[0].to_string(),
                to: pair[1].to_string(),
            });
        }
    }
    Ok(frames)
}

/// Unit-aware zero/"none" coercion between an origin and a scalar target.
fn coerce_endpoints(origin: Value, target: Value) -> (Value, Value) {
    let target_typed = parse_value(&target).is_some();
    if is_none_value(&origin) && target_typed {
        // Animating from "none": substitute a zero shaped like the target.
        return (animatable_none(&target), target);
    }
    if is_zero(&origin) && matches!(parse_value(&target), Some(ParsedValue::Unit(_))) {
        return (zero_like(&target), target);
    }
    if (is_zero(&target) || is_none_value(&target))
        && matches!(parse_value(&origin), Some(ParsedValue::Unit(_)))
    {
        // Zero target expressed in the origin's unit.
        let target = zero_like(&origin);
        return (origin, target);
    }
    (origin, target)
}

/// Evenly spaced time offsets for `n` keyframes.
pub fn evenly_spaced_times(n: usize) -> Vec<f32> {
    if n < 2 {
        return vec![0.0; n];
    }
    (0..n).map(|i| i as f32 / (n - 1) as f32).collect()
}

// ============================================================================
// Timed generator
// ============================================================================

/// Duration-based generator sampling through a resolved keyframe sequence.
#[derive(Clone, Debug)]
pub struct InterpGenerator {
    keyframes: Vec<Value>,
    /// Normalized time offsets, one per keyframe, ascending over 0..1.
    times: Vec<f32>,
    duration_ms: f64,
    ease: Easing,
    elapsed_ms: f64,
    done: bool,
}

impl InterpGenerator {
    pub fn new(
        keyframes: Vec<Value>,
        times: Option<Vec<f32>>,
        duration_ms: f64,
        ease: Easing,
    ) -> Result<Self, AnimationError> {
        if keyframes.is_empty() {
            return Err(AnimationError::EmptyKeyframes);
        }
        let times = match times {
            Some(times) => {
                if times.len() != keyframes.len() {
                    return Err(AnimationError::MismatchedKeyframes {
                        values: keyframes.len(),
                        times: times.len(),
                    });
                }
                times
            }
            None => evenly_spaced_times(keyframes.len()),
        };
        Ok(Self {
            keyframes,
            times,
            duration_ms: duration_ms.max(0.0),
            ease,
            elapsed_ms: 0.0,
            done: false,
        })
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn duration_ms(&self) -> f64 {
        self.duration_ms
    }

    /// Advance by `dt_ms` and return the sample at the new elapsed time.
    /// Completion is by elapsed-time comparison.
    pub fn step(&mut self, dt_ms: f64) -> Value {
        self.elapsed_ms += dt_ms.max(0.0);
        if self.elapsed_ms >= self.duration_ms {
            self.elapsed_ms = self.duration_ms;
            self.done = true;
        }
        let progress = if self.duration_ms == 0.0 {
            1.0
        } else {
            (self.elapsed_ms / self.duration_ms) as f32
        };
        self.sample(progress)
    }

    /// Sample at a normalized progress without advancing time.
    pub fn sample(&self, progress: f32) -> Value {
        let progress = progress.clamp(0.0, 1.0);
        let last = self.keyframes.len() - 1;
        if last == 0 {
            return self.keyframes[0].clone();
        }

        // Locate the surrounding keyframe pair.
        let mut upper = 1;
        while upper < last && self.times[upper] < progress {
            upper += 1;
        }
        let lower = upper - 1;

        let span = self.times[upper] - self.times[lower];
        let local = if span <= f32::EPSILON {
            1.0
        } else {
            (progress - self.times[lower]) / span
        };
        mix_values(
            &self.keyframes[lower],
            &self.keyframes[upper],
            self.ease.apply(local),
        )
    }
}
