//! Kinetic core primitives
//!
//! Foundational types for the Kinetic animation layer:
//!
//! - **Shared values**: observable number/text payloads with velocity
//!   tracking, synchronous notification, and single-animation attachment
//! - **Value types**: classification and mixing of animatable payloads
//!   (numbers, unit strings, colors)
//! - **Scroll values**: viewport scroll offset/progress as shared values
//!
//! # Example
//!
//! ```rust
//! use kinetic_core::{SharedValue, Value};
//!
//! let x = SharedValue::new(0.0);
//! let sub = x.on_change(|v| println!("x is now {v}"));
//!
//! x.set(100.0);
//! assert_eq!(x.get(), Value::Number(100.0));
//! sub.unsubscribe();
//! ```

pub mod scroll;
pub mod value;
pub mod value_types;

pub use scroll::{global_scroll_values, ScrollMetrics, ScrollValues};
pub use value::{
    combine_values, Clock, ManualClock, SharedValue, Subscription, SystemClock, Value,
    WeakSharedValue,
};
pub use value_types::{
    animatable_none, is_none_value, is_zero, mix_values, parse_value, values_animatable,
    zero_like, Color, ParsedValue, Unit, UnitValue,
};
