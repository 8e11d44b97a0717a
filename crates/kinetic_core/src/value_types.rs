//! Parsing and blending for animatable payloads
//!
//! Payloads come in three animatable shapes: plain numbers, unit values
//! ("100px", "45deg") and colors ("#fff", "rgba(…)"). This module classifies
//! a [`Value`] into one of those shapes, supplies unit-compatible zeros for
//! "none"/zero coercion at animation start, and mixes two payloads by a
//! progress factor.

use crate::value::Value;

// ============================================================================
// Units
// ============================================================================

/// Recognised unit suffixes, longest-match first when parsing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Unit {
    Px,
    Percent,
    Deg,
    Rad,
    Vw,
    Vh,
    Em,
    Rem,
}

impl Unit {
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Px => "px",
            Self::Percent => "%",
            Self::Deg => "deg",
            Self::Rad => "rad",
            Self::Vw => "vw",
            Self::Vh => "vh",
            Self::Em => "em",
            Self::Rem => "rem",
        }
    }

    fn all() -> [Unit; 8] {
        [
            Self::Rem,
            Self::Deg,
            Self::Rad,
            Self::Px,
            Self::Vw,
            Self::Vh,
            Self::Em,
            Self::Percent,
        ]
    }
}

/// A number with a unit suffix.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UnitValue {
    pub value: f32,
    pub unit: Unit,
}

impl UnitValue {
    pub fn new(value: f32, unit: Unit) -> Self {
        Self { value, unit }
    }

    pub fn to_value(self) -> Value {
        Value::Text(format!("{}{}", self.value, self.unit.suffix()))
    }
}

// ============================================================================
// Colors
// ============================================================================

/// RGBA color, channels 0.0..=1.0.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const TRANSPARENT: Color = Color::rgba(0.0, 0.0, 0.0, 0.0);

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Parse "#rgb", "#rrggbb", "#rrggbbaa", "rgb(…)" or "rgba(…)".
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if let Some(hex) = text.strip_prefix('#') {
            return Self::parse_hex(hex);
        }
        if let Some(args) = text
            .strip_prefix("rgba(")
            .or_else(|| text.strip_prefix("rgb("))
            .and_then(|rest| rest.strip_suffix(')'))
        {
            let parts: Vec<f32> = args
                .split(',')
                .map(|p| p.trim().parse::<f32>())
                .collect::<Result<_, _>>()
                .ok()?;
            return match parts.as_slice() {
                [r, g, b] => Some(Self::rgb(r / 255.0, g / 255.0, b / 255.0)),
                [r, g, b, a] => Some(Self::rgba(r / 255.0, g / 255.0, b / 255.0, *a)),
                _ => None,
            };
        }
        None
    }

    fn parse_hex(hex: &str) -> Option<Self> {
        let channel = |s: &str| u8::from_str_radix(s, 16).ok().map(|v| v as f32 / 255.0);
        match hex.len() {
            3 => {
                let mut chans = hex.chars().map(|c| {
                    let s: String = [c, c].iter().collect();
                    channel(&s)
                });
                Some(Self::rgb(chans.next()??, chans.next()??, chans.next()??))
            }
            6 | 8 => {
                let r = channel(&hex[0..2])?;
                let g = channel(&hex[2..4])?;
                let b = channel(&hex[4..6])?;
                let a = if hex.len() == 8 {
                    channel(&hex[6..8])?
                } else {
                    1.0
                };
                Some(Self::rgba(r, g, b, a))
            }
            _ => None,
        }
    }

    pub fn lerp(a: &Color, b: &Color, t: f32) -> Color {
        let t = t.clamp(0.0, 1.0);
        Color {
            r: a.r + (b.r - a.r) * t,
            g: a.g + (b.g - a.g) * t,
            b: a.b + (b.b - a.b) * t,
            a: a.a + (b.a - a.a) * t,
        }
    }

    pub fn to_value(self) -> Value {
        let channel = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        Value::Text(format!(
            "rgba({}, {}, {}, {})",
            channel(self.r),
            channel(self.g),
            channel(self.b),
            self.a.clamp(0.0, 1.0)
        ))
    }
}

// ============================================================================
// Classification
// ============================================================================

/// The animatable reading of a payload.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ParsedValue {
    Number(f32),
    Unit(UnitValue),
    Color(Color),
}

/// Classify a payload into its animatable shape, if it has one.
pub fn parse_value(v: &Value) -> Option<ParsedValue> {
    match v {
        Value::Number(n) => Some(ParsedValue::Number(*n)),
        Value::Text(s) => {
            let s = s.trim();
            if let Some(color) = Color::parse(s) {
                return Some(ParsedValue::Color(color));
            }
            if let Ok(n) = s.parse::<f32>() {
                return Some(ParsedValue::Number(n));
            }
            for unit in Unit::all() {
                if let Some(num) = s.strip_suffix(unit.suffix()) {
                    if let Ok(value) = num.trim().parse::<f32>() {
                        return Some(ParsedValue::Unit(UnitValue::new(value, unit)));
                    }
                }
            }
            None
        }
    }
}

/// "none" or the empty string: a payload with no animatable reading that
/// still has a well-defined zero counterpart.
pub fn is_none_value(v: &Value) -> bool {
    matches!(v, Value::Text(s) if s.trim() == "none" || s.trim().is_empty())
}

/// Zero in any shape: 0, "0px", a fully transparent color.
pub fn is_zero(v: &Value) -> bool {
    match parse_value(v) {
        Some(ParsedValue::Number(n)) => n == 0.0,
        Some(ParsedValue::Unit(u)) => u.value == 0.0,
        Some(ParsedValue::Color(c)) => c.a == 0.0,
        None => false,
    }
}

/// A zero expressed in the unit (or shape) of the given payload, used when
/// animating toward a zero/"none" target from a typed origin.
pub fn zero_like(of: &Value) -> Value {
    match parse_value(of) {
        Some(ParsedValue::Unit(u)) => UnitValue::new(0.0, u.unit).to_value(),
        Some(ParsedValue::Color(_)) => Color::TRANSPARENT.to_value(),
        _ => Value::Number(0.0),
    }
}

/// An animatable zero standing in for a "none" origin, shaped like the
/// target so the pair can be mixed.
pub fn animatable_none(target: &Value) -> Value {
    match parse_value(target) {
        Some(ParsedValue::Color(c)) => Color::rgba(c.r, c.g, c.b, 0.0).to_value(),
        Some(ParsedValue::Unit(u)) => UnitValue::new(0.0, u.unit).to_value(),
        _ => Value::Number(0.0),
    }
}

/// Whether two payloads can be mixed continuously.
pub fn values_animatable(a: &Value, b: &Value) -> bool {
    match (parse_value(a), parse_value(b)) {
        (Some(ParsedValue::Number(_)), Some(ParsedValue::Number(_))) => true,
        (Some(ParsedValue::Unit(x)), Some(ParsedValue::Unit(y))) => x.unit == y.unit,
        (Some(ParsedValue::Color(_)), Some(ParsedValue::Color(_))) => true,
        // A bare zero pairs with any unit value.
        (Some(ParsedValue::Number(n)), Some(ParsedValue::Unit(_)))
        | (Some(ParsedValue::Unit(_)), Some(ParsedValue::Number(n))) => n == 0.0,
        _ => false,
    }
}

fn lerp(from: f32, to: f32, t: f32) -> f32 {
    from + (to - from) * t
}

/// Mix two payloads by `t`. Incompatible pairs fall back to a discrete step
/// at the midpoint; callers reject those pairs at animation start, so the
/// fallback only covers defensive paths.
pub fn mix_values(from: &Value, to: &Value, t: f32) -> Value {
    match (parse_value(from), parse_value(to)) {
        (Some(ParsedValue::Number(a)), Some(ParsedValue::Number(b))) => {
            Value::Number(lerp(a, b, t))
        }
        (Some(ParsedValue::Unit(a)), Some(ParsedValue::Unit(b))) if a.unit == b.unit => {
            UnitValue::new(lerp(a.value, b.value, t), a.unit).to_value()
        }
        (Some(ParsedValue::Number(a)), Some(ParsedValue::Unit(b))) if a == 0.0 => {
            UnitValue::new(lerp(0.0, b.value, t), b.unit).to_value()
        }
        (Some(ParsedValue::Unit(a)), Some(ParsedValue::Number(b))) if b == 0.0 => {
            UnitValue::new(lerp(a.value, 0.0, t), a.unit).to_value()
        }
        (Some(ParsedValue::Color(a)), Some(ParsedValue::Color(b))) => {
            Color::lerp(&a, &b, t).to_value()
        }
        _ => {
            if t < 0.5 {
                from.clone()
            } else {
                to.clone()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_numbers_units_colors() {
        assert_eq!(
            parse_value(&Value::Number(3.0)),
            Some(ParsedValue::Number(3.0))
        );
        assert_eq!(
            parse_value(&"12.5px".into()),
            Some(ParsedValue::Unit(UnitValue::new(12.5, Unit::Px)))
        );
        assert_eq!(
            parse_value(&"-90deg".into()),
            Some(ParsedValue::Unit(UnitValue::new(-90.0, Unit::Deg)))
        );
        assert_eq!(
            parse_value(&"#fff".into()),
            Some(ParsedValue::Color(Color::rgb(1.0, 1.0, 1.0)))
        );
        assert_eq!(parse_value(&"none".into()), None);
    }

    #[test]
    fn rem_parses_before_em() {
        assert_eq!(
            parse_value(&"2rem".into()),
            Some(ParsedValue::Unit(UnitValue::new(2.0, Unit::Rem)))
        );
    }

    #[test]
    fn zero_like_keeps_unit() {
        assert_eq!(zero_like(&"100px".into()), Value::Text("0px".into()));
        assert_eq!(zero_like(&Value::Number(4.0)), Value::Number(0.0));
    }

    #[test]
    fn animatable_none_matches_target_shape() {
        assert_eq!(animatable_none(&"50%".into()), Value::Text("0%".into()));
        let none = animatable_none(&"#ff0000".into());
        assert_eq!(none, Value::Text("rgba(255, 0, 0, 0)".into()));
    }

    #[test]
    fn mixes_units_and_colors() {
        assert_eq!(
            mix_values(&"0px".into(), &"100px".into(), 0.25),
            Value::Text("25px".into())
        );
        assert_eq!(
            mix_values(&"#000".into(), &"#fff".into(), 1.0),
            Value::Text("rgba(255, 255, 255, 1)".into())
        );
    }

    #[test]
    fn zero_pairs_with_units() {
        assert!(values_animatable(&Value::Number(0.0), &"10px".into()));
        assert!(!values_animatable(&Value::Number(5.0), &"10px".into()));
        assert!(!values_animatable(&"10px".into(), &"10%".into()));
    }
}
