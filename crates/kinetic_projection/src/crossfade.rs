//! Shared-layout crossfade
//!
//! Opacity blending between a lead and a follow element projecting into the
//! same layout box. A single 0..1 progress value drives both sides: the lead
//! fades in over the first half of the progress range, the follow fades out
//! over the second half, and numeric corner radii and rotation are mixed
//! between the two elements' values so the pair reads as one surface.
//!
//! The blend is computed at most once per frame timestamp; both elements
//! read the same blended state within a tick.

use std::sync::{Arc, Mutex};

use rustc_hash::FxHashMap;

use kinetic_animation::easing::{compress, Easing};
use kinetic_animation::{
    start_animation, AnimationError, AnimationHandle, SchedulerHandle, Transition, ValueCategory,
};
use kinetic_core::{SharedValue, Value};

use crate::geometry::mix;
use crate::tree::{NodeId, TreeHandle};

/// Which elements a crossfade blends, and how.
#[derive(Clone, Copy, Debug, Default)]
pub struct CrossfadeOptions {
    pub lead: Option<NodeId>,
    pub follow: Option<NodeId>,
    /// Blend opacity between the two elements. Without this only radii and
    /// rotation are mixed.
    pub crossfade_opacity: bool,
    /// Keep the follow element at its own opacity instead of fading it out.
    pub preserve_follow_opacity: bool,
}

struct CrossfadeState {
    options: CrossfadeOptions,
    lead_state: FxHashMap<String, Value>,
    follow_state: FxHashMap<String, Value>,
    is_active: bool,
    /// Whether the frame after deactivation has been rendered. Recorded by
    /// the first element to observe that frame; the other element may read
    /// the state one frame stale on the way out.
    has_rendered_final: bool,
    prev_update_stamp: f64,
}

/// Crossfade controller for one lead/follow pair.
pub struct Crossfader {
    progress: SharedValue,
    state: Arc<Mutex<CrossfadeState>>,
    scheduler: SchedulerHandle,
    tree: TreeHandle,
}

fn ease_crossfade_in(p: f32) -> f32 {
    compress(0.0, 0.5, Easing::CircOut)(p)
}

fn ease_crossfade_out(p: f32) -> f32 {
    compress(0.5, 0.95, Easing::Linear)(p)
}

fn opacity_of(latest: &FxHashMap<String, Value>) -> f32 {
    latest
        .get("opacity")
        .map(Value::to_f32_lossy)
        .unwrap_or(1.0)
}

const CORNER_KEYS: [&str; 4] = [
    "borderTopLeftRadius",
    "borderTopRightRadius",
    "borderBottomLeftRadius",
    "borderBottomRightRadius",
];

fn radius_of(latest: &FxHashMap<String, Value>, corner: &str) -> Option<f32> {
    latest
        .get(corner)
        .or_else(|| latest.get("borderRadius"))
        .and_then(Value::as_number)
}

impl Crossfader {
    pub fn new(scheduler: SchedulerHandle, tree: TreeHandle) -> Self {
        Self {
            progress: SharedValue::new(1.0),
            state: Arc::new(Mutex::new(CrossfadeState {
                options: CrossfadeOptions::default(),
                lead_state: FxHashMap::default(),
                follow_state: FxHashMap::default(),
                is_active: false,
                has_rendered_final: true,
                prev_update_stamp: f64::NEG_INFINITY,
            })),
            scheduler,
            tree,
        }
    }

    /// Point the crossfade at a new lead/follow pair, resetting the blended
    /// state.
    pub fn set_options(&self, options: CrossfadeOptions) {
        let mut state = self.state.lock().unwrap();
        state.options = options;
        state.lead_state.clear();
        state.follow_state.clear();
    }

    /// Crossfade toward the lead element. An interrupted fade mirrors the
    /// progress so the blend continues from its current visual position.
    pub fn to(&self, transition: Transition) -> Result<AnimationHandle, AnimationError> {
        let current = self.progress.get().to_f32_lossy();
        self.progress.set(1.0 - current);
        self.start(1.0, transition)
    }

    /// Crossfade back toward the follow element.
    pub fn from(&self, transition: Transition) -> Result<AnimationHandle, AnimationError> {
        self.start(0.0, transition)
    }

    /// Snap the progress back to fully-lead.
    pub fn reset(&self) {
        self.progress.set(1.0);
    }

    /// Whether the blend still needs to be applied: either the progress
    /// animation is running, or it finished and the final frame has not been
    /// rendered yet.
    pub fn is_active(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.is_active || !state.has_rendered_final
    }

    /// The blended values for one of the pair. Computes the blend for the
    /// current frame on first call in a tick; both elements then read the
    /// same state.
    pub fn crossfade_state(&self, element: NodeId) -> FxHashMap<String, Value> {
        self.update_blend();
        let state = self.state.lock().unwrap();
        if state.options.lead == Some(element) {
            state.lead_state.clone()
        } else {
            state.follow_state.clone()
        }
    }

    fn start(
        &self,
        target: f32,
        transition: Transition,
    ) -> Result<AnimationHandle, AnimationError> {
        {
            let mut state = self.state.lock().unwrap();
            state.is_active = true;
            state.has_rendered_final = false;
        }

        // Each fade re-wires the single progress listener: every sample
        // re-renders both sides of the pair.
        self.progress.clear_listeners();
        let state = Arc::downgrade(&self.state);
        let tree = self.tree.clone();
        let _watch = self.progress.on_change(move |_| {
            let Some(state) = state.upgrade() else {
                return;
            };
            let options = state.lock().unwrap().options;
            if let Some(lead) = options.lead {
                tree.schedule_render(lead);
            }
            if let Some(follow) = options.follow {
                tree.schedule_render(follow);
            }
        });

        let handle = start_animation(
            &self.scheduler,
            &self.progress,
            ValueCategory::Blendable,
            target,
            transition,
        )?;
        let state = Arc::downgrade(&self.state);
        handle.on_complete(move || {
            if let Some(state) = state.upgrade() {
                state.lock().unwrap().is_active = false;
            }
        });
        Ok(handle)
    }

    fn update_blend(&self) {
        let timestamp = self.scheduler.frame_data().timestamp;
        let mut state = self.state.lock().unwrap();
        let Some(lead) = state.options.lead else {
            return;
        };
        if timestamp == state.prev_update_stamp {
            return;
        }
        state.prev_update_stamp = timestamp;

        let latest_lead = self.tree.latest_values(lead).unwrap_or_default();
        let latest_follow = state
            .options
            .follow
            .and_then(|follow| self.tree.latest_values(follow))
            .unwrap_or_default();
        for (key, value) in &latest_lead {
            state.lead_state.insert(key.clone(), value.clone());
        }
        if state.options.follow.is_some() {
            for (key, value) in &latest_follow {
                state.follow_state.insert(key.clone(), value.clone());
            }
        }

        if !state.is_active {
            state.has_rendered_final = true;
        }

        let p = self.progress.get().to_f32_lossy();

        if state.options.crossfade_opacity {
            let lead_target = opacity_of(&latest_lead);
            let follow_target = opacity_of(&latest_follow);
            if state.options.follow.is_some() {
                state.lead_state.insert(
                    "opacity".to_string(),
                    Value::Number(mix(0.0, lead_target, ease_crossfade_in(p))),
                );
                let follow_opacity = if state.options.preserve_follow_opacity {
                    follow_target
                } else {
                    mix(follow_target, 0.0, ease_crossfade_out(p))
                };
                state
                    .follow_state
                    .insert("opacity".to_string(), Value::Number(follow_opacity));
            } else {
                state.lead_state.insert(
                    "opacity".to_string(),
                    Value::Number(mix(follow_target, lead_target, p)),
                );
            }
        }

        // Numeric corner radii and rotation mix between the two elements so
        // the pair reads as one shape mid-fade.
        for corner in CORNER_KEYS {
            let lead_radius = radius_of(&latest_lead, corner);
            let follow_radius = radius_of(&latest_follow, corner);
            if lead_radius.is_none() && follow_radius.is_none() {
                continue;
            }
            let mixed = Value::Number(mix(
                follow_radius.unwrap_or(0.0),
                lead_radius.unwrap_or(0.0),
                p,
            ));
            state.lead_state.insert(corner.to_string(), mixed.clone());
            state.follow_state.insert(corner.to_string(), mixed);
        }

        let lead_rotate = latest_lead.get("rotate").map(Value::to_f32_lossy);
        let follow_rotate = latest_follow.get("rotate").map(Value::to_f32_lossy);
        if lead_rotate.is_some() || follow_rotate.is_some() {
            let mixed = Value::Number(mix(
                follow_rotate.unwrap_or(0.0),
                lead_rotate.unwrap_or(0.0),
                p,
            ));
            state.lead_state.insert("rotate".to_string(), mixed.clone());
            state.follow_state.insert("rotate".to_string(), mixed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::{RenderSink, StyleMap};
    use crate::tree::VisualTree;
    use kinetic_animation::{FrameScheduler, ManualTickDriver};

    struct NullSink;

    impl RenderSink for NullSink {
        fn apply_styles(&self, _node: NodeId, _styles: &StyleMap, _vars: &StyleMap) {}
    }

    struct Harness {
        scheduler: FrameScheduler,
        tree: VisualTree,
        crossfader: Crossfader,
        lead: NodeId,
        follow: NodeId,
    }

    fn harness(options: impl FnOnce(NodeId, NodeId) -> CrossfadeOptions) -> Harness {
        let scheduler = FrameScheduler::new(Arc::new(ManualTickDriver::new()));
        let tree = VisualTree::new(scheduler.handle(), Arc::new(NullSink));
        let lead = tree.create_node(None);
        let follow = tree.create_node(None);
        tree.set_value(lead, "opacity", 1.0);
        tree.set_value(follow, "opacity", 1.0);
        let crossfader = Crossfader::new(scheduler.handle(), tree.handle());
        crossfader.set_options(options(lead, follow));
        Harness {
            scheduler,
            tree,
            crossfader,
            lead,
            follow,
        }
    }

    fn pump(scheduler: &FrameScheduler, start_ms: f64, frames: usize) -> f64 {
        let mut t = start_ms;
        for _ in 0..frames {
            scheduler.tick(t);
            t += 1000.0 / 60.0;
        }
        t
    }

    fn opacity(state: &FxHashMap<String, Value>) -> f32 {
        state.get("opacity").unwrap().to_f32_lossy()
    }

    #[test]
    fn lead_fades_in_over_first_half_follow_out_over_second() {
        let h = harness(|lead, follow| CrossfadeOptions {
            lead: Some(lead),
            follow: Some(follow),
            crossfade_opacity: true,
            ..Default::default()
        });
        h.crossfader.to(Transition::tween(1000.0)).unwrap();

        // Fifteen 60fps frames is 250ms: progress 0.25.
        let t = pump(&h.scheduler, 0.0, 15);
        let lead_state = h.crossfader.crossfade_state(h.lead);
        let follow_state = h.crossfader.crossfade_state(h.follow);
        // CircOut over the [0, 0.5] window: sqrt(1 - (0.5-1)^2).
        assert!((opacity(&lead_state) - 0.866).abs() < 0.02);
        // The follow window has not opened yet.
        assert!((opacity(&follow_state) - 1.0).abs() < 1e-4);

        // Another 28 frames lands progress around 0.717, inside the follow
        // window.
        pump(&h.scheduler, t, 28);
        let lead_state = h.crossfader.crossfade_state(h.lead);
        let follow_state = h.crossfader.crossfade_state(h.follow);
        assert!((opacity(&lead_state) - 1.0).abs() < 1e-4);
        let follow_opacity = opacity(&follow_state);
        assert!(
            follow_opacity > 0.4 && follow_opacity < 0.6,
            "expected mid fade-out, got {follow_opacity}"
        );
    }

    #[test]
    fn preserve_follow_opacity_pins_the_follow() {
        let h = harness(|lead, follow| CrossfadeOptions {
            lead: Some(lead),
            follow: Some(follow),
            crossfade_opacity: true,
            preserve_follow_opacity: true,
        });
        let follow_value = h.tree.value(h.follow, "opacity").unwrap();
        follow_value.set(0.8);

        h.crossfader.to(Transition::tween(100.0)).unwrap();
        pump(&h.scheduler, 0.0, 5);
        let follow_state = h.crossfader.crossfade_state(h.follow);
        assert!((opacity(&follow_state) - 0.8).abs() < 1e-4);
    }

    #[test]
    fn missing_follow_blends_lead_directly() {
        let h = harness(|lead, _| CrossfadeOptions {
            lead: Some(lead),
            follow: None,
            crossfade_opacity: true,
            ..Default::default()
        });
        let lead_value = h.tree.value(h.lead, "opacity").unwrap();
        lead_value.set(0.5);

        h.crossfader.to(Transition::tween(1000.0)).unwrap();
        pump(&h.scheduler, 0.0, 30); // progress 0.5
        let lead_state = h.crossfader.crossfade_state(h.lead);
        // Straight mix from the default 1.0 toward the lead's 0.5.
        assert!((opacity(&lead_state) - 0.75).abs() < 0.02);
    }

    #[test]
    fn radii_and_rotation_mix_between_the_pair() {
        let h = harness(|lead, follow| CrossfadeOptions {
            lead: Some(lead),
            follow: Some(follow),
            ..Default::default()
        });
        h.tree.set_value(h.lead, "borderRadius", 16.0);
        h.tree.set_value(h.follow, "borderRadius", 4.0);
        h.tree.set_value(h.lead, "rotate", 90.0);

        h.crossfader.to(Transition::tween(1000.0)).unwrap();
        pump(&h.scheduler, 0.0, 15); // progress 0.25
        let lead_state = h.crossfader.crossfade_state(h.lead);
        let follow_state = h.crossfader.crossfade_state(h.follow);

        let radius = lead_state
            .get("borderTopLeftRadius")
            .unwrap()
            .to_f32_lossy();
        assert!((radius - 7.0).abs() < 0.2);
        assert_eq!(
            lead_state.get("borderTopLeftRadius"),
            follow_state.get("borderTopLeftRadius")
        );
        let rotate = lead_state.get("rotate").unwrap().to_f32_lossy();
        assert!((rotate - 22.5).abs() < 0.6);
    }

    #[test]
    fn final_frame_recorded_by_first_observer() {
        let h = harness(|lead, follow| CrossfadeOptions {
            lead: Some(lead),
            follow: Some(follow),
            crossfade_opacity: true,
            ..Default::default()
        });
        assert!(!h.crossfader.is_active());

        let animation = h.crossfader.to(Transition::tween(50.0)).unwrap();
        assert!(h.crossfader.is_active());
        pump(&h.scheduler, 0.0, 6);
        assert!(animation.is_finished());

        // The animation is done but the final blend has not been rendered:
        // still active until the first element observes the frame.
        assert!(h.crossfader.is_active());
        let _ = h.crossfader.crossfade_state(h.lead);
        assert!(!h.crossfader.is_active());
    }

    #[test]
    fn interrupting_to_mirrors_progress() {
        let h = harness(|lead, follow| CrossfadeOptions {
            lead: Some(lead),
            follow: Some(follow),
            crossfade_opacity: true,
            ..Default::default()
        });
        h.crossfader.to(Transition::tween(1000.0)).unwrap();
        let t = pump(&h.scheduler, 0.0, 15); // progress 0.25

        // Re-triggering mirrors to 0.75 before animating back toward 1, so
        // the lead is already fully eased in.
        h.crossfader.to(Transition::tween(1000.0)).unwrap();
        pump(&h.scheduler, t, 2);
        let lead_state = h.crossfader.crossfade_state(h.lead);
        assert!((opacity(&lead_state) - 1.0).abs() < 1e-4);
    }
}
