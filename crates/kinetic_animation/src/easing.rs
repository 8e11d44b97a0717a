//! Easing functions
//!
//! Closed set of easing curves applied to normalized progress (0.0 to 1.0).

/// An easing curve.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum Easing {
    #[default]
    Linear,
    EaseIn,
    EaseOut,
    EaseInOut,
    CircIn,
    CircOut,
    BackIn,
    BackOut,
    /// Pulls back before accelerating through, for entrances with intent.
    Anticipate,
}

const BACK_OVERSHOOT: f32 = 1.70158;

impl Easing {
    /// Apply the curve to a progress value. Input outside 0..1 is clamped.
    pub fn apply(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Self::Linear => t,
            Self::EaseIn => t * t * t,
            Self::EaseOut => 1.0 - (1.0 - t).powi(3),
            Self::EaseInOut => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
                }
            }
            Self::CircIn => 1.0 - (1.0 - t * t).max(0.0).sqrt(),
            Self::CircOut => (1.0 - (t - 1.0) * (t - 1.0)).max(0.0).sqrt(),
            Self::BackIn => {
                let c = BACK_OVERSHOOT;
                (c + 1.0) * t * t * t - c * t * t
            }
            Self::BackOut => {
                let c = BACK_OVERSHOOT;
                let t = t - 1.0;
                1.0 + (c + 1.0) * t * t * t + c * t * t
            }
            Self::Anticipate => {
                let t = t * 2.0;
                if t < 1.0 {
                    0.5 * Self::BackIn.apply(t)
                } else {
                    0.5 * (2.0 - f32::powf(2.0, -10.0 * (t - 1.0)))
                }
            }
        }
    }
}

/// Map a progress value through a sub-window of the curve: 0 below `min`,
/// 1 above `max`, eased in between.
pub fn compress(min: f32, max: f32, easing: Easing) -> impl Fn(f32) -> f32 {
    move |p: f32| {
        if p < min {
            0.0
        } else if p > max {
            1.0
        } else {
            easing.apply((p - min) / (max - min))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_are_fixed() {
        for easing in [
            Easing::Linear,
            Easing::EaseIn,
            Easing::EaseOut,
            Easing::EaseInOut,
            Easing::CircIn,
            Easing::CircOut,
            Easing::BackIn,
            Easing::BackOut,
            Easing::Anticipate,
        ] {
            assert!((easing.apply(0.0)).abs() < 1e-5, "{easing:?} at 0");
            assert!((easing.apply(1.0) - 1.0).abs() < 1e-3, "{easing:?} at 1");
        }
    }

    #[test]
    fn back_in_dips_negative() {
        assert!(Easing::BackIn.apply(0.2) < 0.0);
    }

    #[test]
    fn compress_windows_progress() {
        let window = compress(0.5, 0.95, Easing::Linear);
        assert_eq!(window(0.2), 0.0);
        assert_eq!(window(0.99), 1.0);
        assert!((window(0.725) - 0.5).abs() < 1e-4);
    }
}
