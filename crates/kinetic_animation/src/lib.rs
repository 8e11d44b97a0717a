//! Kinetic animation system
//!
//! Frame scheduling and value animation for the Kinetic animation layer.
//!
//! # Features
//!
//! - **Frame Scheduler**: five ordered phases per tick (read, update,
//!   pre-render, render, post-render) with per-tick deduplication, driven by
//!   an injected tick source
//! - **Spring Physics**: RK4-integrated springs with configurable rest
//!   thresholds and velocity inheritance
//! - **Keyframes and Tweens**: duration-based sampling over resolved
//!   keyframe sequences, with wildcard and unit-zero resolution
//! - **Animation Engine**: category-aware generator defaults, cancellable
//!   handles, completion callbacks
//! - **Appear Store**: handoff registry for pre-hydration animations

pub mod animator;
pub mod appear;
pub mod easing;
pub mod error;
pub mod frames;
pub mod keyframes;
pub mod spring;

pub use animator::{
    start_animation, AnimationHandle, AnimationState, Transition, TransitionKind, ValueCategory,
};
pub use appear::{global_appear_store, AppearStore};
pub use easing::{compress, Easing};
pub use error::AnimationError;
pub use frames::{
    FrameCallback, FrameData, FrameScheduler, ManualTickDriver, Phase, SchedulerHandle,
    TickDriver,
};
pub use keyframes::{evenly_spaced_times, resolve_keyframes, AnimationTarget, InterpGenerator};
pub use spring::{SpringConfig, SpringGenerator};
