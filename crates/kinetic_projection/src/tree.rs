//! Visual element tree
//!
//! An arena of visual nodes addressed by stable [`NodeId`] keys. Each node
//! holds its measured box, the target box it should project into, the
//! per-frame deltas between them, and the animatable values declared on it.
//! Parent/child relations are keys into the arena, never owning pointers,
//! so destruction is an explicit, checkable key invalidation.
//!
//! Delta recomputation is strictly root-to-leaf: a node always brings its
//! full ancestor chain up to date before computing its own deltas, even when
//! the invalidation arrived leaf-up. Dirty nodes are re-rendered once per
//! `Render` phase through the host-supplied [`RenderSink`].
//!
//! Node-owned boxes and deltas are reused across frames. Accessors hand out
//! copies; never retain one across a frame boundary.

use std::sync::{Arc, Mutex, Weak};

use rustc_hash::FxHashMap;
use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;

use kinetic_animation::{
    start_animation, AnimationError, AnimationHandle, AnimationTarget, FrameCallback, Phase,
    SchedulerHandle, Transition, ValueCategory,
};
use kinetic_core::{Clock, SharedValue, Subscription, SystemClock, Value};

use crate::geometry::{
    apply_box_transforms, apply_tree_deltas, mix, remove_box_transforms, update_box_delta, Axis,
    AxisBox2D, AxisKind, BoxDelta, Point2D,
};
use crate::style::{build_plain_styles, build_projection_styles, RenderSink, StyleMap};

new_key_type! {
    /// Stable handle to a node in the visual tree.
    pub struct NodeId;
}

// ============================================================================
// Values
// ============================================================================

/// What the host hands the tree when declaring an animatable value: either a
/// literal payload (normalized into a fresh container) or a container that
/// already exists elsewhere.
pub enum ValueInput {
    Literal(Value),
    Shared(SharedValue),
}

impl From<Value> for ValueInput {
    fn from(v: Value) -> Self {
        Self::Literal(v)
    }
}

impl From<f32> for ValueInput {
    fn from(n: f32) -> Self {
        Self::Literal(Value::Number(n))
    }
}

impl From<&str> for ValueInput {
    fn from(s: &str) -> Self {
        Self::Literal(Value::Text(s.to_string()))
    }
}

impl From<SharedValue> for ValueInput {
    fn from(v: SharedValue) -> Self {
        Self::Shared(v)
    }
}

struct NodeValue {
    value: SharedValue,
    /// Computed once at declaration; drives generator defaults.
    category: ValueCategory,
    watch: Subscription,
}

// ============================================================================
// Nodes
// ============================================================================

type LayoutListener = Arc<Mutex<dyn FnMut(&AxisBox2D, &AxisBox2D) + Send>>;
type ViewportListener = Arc<Mutex<dyn FnMut(&AxisBox2D, &BoxDelta) + Send>>;

fn axis_index(axis: AxisKind) -> usize {
    match axis {
        AxisKind::X => 0,
        AxisKind::Y => 1,
    }
}

struct VisualNode {
    parent: Option<NodeId>,
    children: SmallVec<[NodeId; 4]>,
    depth: usize,

    /// Measured bounding box; `None` until the first `measure_layout`.
    box_: Option<AxisBox2D>,
    /// The measured box with all ancestor deltas applied, recomputed each
    /// frame the node is dirty.
    box_corrected: AxisBox2D,
    target_box: AxisBox2D,
    has_target_box: bool,
    /// `target_box` with the node's own transform values applied.
    target_box_final: AxisBox2D,
    /// Snapshot of the viewport box taken before a re-layout.
    prev_viewport_box: Option<AxisBox2D>,

    tree_scale: Point2D,
    /// `box_corrected` → `target_box`; drives scale-corrected styles.
    delta: BoxDelta,
    /// `box_corrected` → `target_box_final`; drives the projection transform.
    delta_final: BoxDelta,

    projection_enabled: bool,
    has_projecting_children: bool,
    has_viewport_box_updated: bool,
    render_dirty: bool,

    values: FxHashMap<String, NodeValue>,
    /// Latest resolved payload per declared value.
    latest: FxHashMap<String, Value>,

    layout_listeners: Vec<(u64, LayoutListener)>,
    viewport_listeners: Vec<(u64, ViewportListener)>,

    /// Per-axis 0..1 progress values driving layout axis animations.
    progress: [SharedValue; 2],
}

impl VisualNode {
    fn new(parent: Option<NodeId>, depth: usize, clock: &Arc<dyn Clock>) -> Self {
        Self {
            parent,
            children: SmallVec::new(),
            depth,
            box_: None,
            box_corrected: AxisBox2D::default(),
            target_box: AxisBox2D::default(),
            has_target_box: false,
            target_box_final: AxisBox2D::default(),
            prev_viewport_box: None,
            tree_scale: Point2D::unit(),
            delta: BoxDelta::default(),
            delta_final: BoxDelta::default(),
            projection_enabled: false,
            has_projecting_children: false,
            has_viewport_box_updated: false,
            render_dirty: false,
            values: FxHashMap::default(),
            latest: FxHashMap::default(),
            layout_listeners: Vec::new(),
            viewport_listeners: Vec::new(),
            progress: [
                SharedValue::with_clock(0.0, Arc::clone(clock)),
                SharedValue::with_clock(0.0, Arc::clone(clock)),
            ],
        }
    }

    fn is_axis_animating(&self) -> bool {
        self.progress.iter().any(SharedValue::has_animation)
    }
}

// ============================================================================
// Tree internals
// ============================================================================

/// A viewport-box update collected under the tree lock and fired after it is
/// released, so listeners never run while the arena is locked.
type ViewportEvent = (Vec<ViewportListener>, AxisBox2D, BoxDelta);

struct TreeInner {
    nodes: SlotMap<NodeId, VisualNode>,
    next_listener_id: u64,
}

impl TreeInner {
    /// Ancestor chain root-first, including `id` itself.
    fn chain_root_first(&self, id: NodeId) -> SmallVec<[NodeId; 8]> {
        let mut chain: SmallVec<[NodeId; 8]> = SmallVec::new();
        let mut cur = Some(id);
        while let Some(nid) = cur {
            chain.push(nid);
            cur = self.nodes.get(nid).and_then(|n| n.parent);
        }
        chain.reverse();
        chain
    }

    /// Recompute deltas for `id` after bringing its whole ancestor chain up
    /// to date, root-to-leaf.
    fn update_layout_deltas(
        &mut self,
        id: NodeId,
        is_synthetic_pass: bool,
        events: &mut Vec<ViewportEvent>,
    ) {
        let chain = self.chain_root_first(id);
        for i in 0..chain.len() {
            self.update_node_delta(&chain[..i], chain[i], is_synthetic_pass, events);
        }
    }

    fn update_node_delta(
        &mut self,
        ancestors: &[NodeId],
        id: NodeId,
        is_synthetic_pass: bool,
        events: &mut Vec<ViewportEvent>,
    ) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        // An unmeasured or non-projecting node has no meaningful projection.
        if !node.projection_enabled {
            return;
        }
        let Some(measured) = node.box_ else {
            return;
        };

        let chain_deltas: SmallVec<[BoxDelta; 8]> = ancestors
            .iter()
            .filter_map(|a| self.nodes.get(*a).map(|n| n.delta))
            .collect();

        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        node.box_corrected = measured;
        apply_tree_deltas(&mut node.box_corrected, &mut node.tree_scale, &chain_deltas);
        apply_box_transforms(&mut node.target_box_final, &node.target_box, &node.latest);
        update_box_delta(&mut node.delta, &node.box_corrected, &node.target_box);
        update_box_delta(&mut node.delta_final, &node.box_corrected, &node.target_box_final);

        if !is_synthetic_pass && node.has_viewport_box_updated {
            node.has_viewport_box_updated = false;
            if !node.viewport_listeners.is_empty() {
                let listeners = node
                    .viewport_listeners
                    .iter()
                    .map(|(_, l)| Arc::clone(l))
                    .collect();
                events.push((listeners, node.target_box, node.delta));
            }
        }
    }

    /// Update one target axis and flag the projecting subtree for re-render.
    /// Returns whether any node actually became dirty.
    fn set_axis_target(&mut self, id: NodeId, axis: AxisKind, min: f32, max: f32) -> bool {
        let Some(node) = self.nodes.get_mut(id) else {
            return false;
        };
        *node.target_box.axis_mut(axis) = Axis::new(min, max);
        node.has_target_box = true;
        node.has_viewport_box_updated = true;
        self.mark_projecting_subtree_dirty(id)
    }

    fn mark_projecting_subtree_dirty(&mut self, id: NodeId) -> bool {
        let Some(node) = self.nodes.get_mut(id) else {
            return false;
        };
        let mut any = false;
        if node.projection_enabled {
            node.render_dirty = true;
            any = true;
        }
        if node.has_projecting_children {
            let children = node.children.clone();
            for child in children {
                any |= self.mark_projecting_subtree_dirty(child);
            }
        }
        any
    }
}

fn fire_viewport_events(events: Vec<ViewportEvent>) {
    for (listeners, target_box, delta) in events {
        for listener in listeners {
            (listener.lock().unwrap())(&target_box, &delta);
        }
    }
}

// ============================================================================
// The tree
// ============================================================================

/// The visual element tree.
///
/// Owns the node arena and a `Render`-phase callback registered with the
/// frame scheduler; mutations mark nodes dirty and request a render, and the
/// render pass recomputes deltas ancestor-first, builds each dirty node's
/// styles and hands them to the [`RenderSink`] once per node per tick.
pub struct VisualTree {
    inner: Arc<Mutex<TreeInner>>,
    scheduler: SchedulerHandle,
    clock: Arc<dyn Clock>,
    render_cb: FrameCallback,
}

impl VisualTree {
    pub fn new(scheduler: SchedulerHandle, sink: Arc<dyn RenderSink>) -> Self {
        Self::with_clock(scheduler, sink, Arc::new(SystemClock))
    }

    pub fn with_clock(
        scheduler: SchedulerHandle,
        sink: Arc<dyn RenderSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let inner = Arc::new(Mutex::new(TreeInner {
            nodes: SlotMap::with_key(),
            next_listener_id: 0,
        }));
        let render_cb: FrameCallback = {
            let inner = Arc::downgrade(&inner);
            Arc::new(move |_frame| {
                if let Some(inner) = inner.upgrade() {
                    render_pass(&inner, &sink);
                }
            })
        };
        Self {
            inner,
            scheduler,
            clock,
            render_cb,
        }
    }

    // ------------------------------------------------------------------
    // Mount / unmount
    // ------------------------------------------------------------------

    /// Create a node, appended to the parent's child ordering.
    pub fn create_node(&self, parent: Option<NodeId>) -> NodeId {
        let mut tree = self.inner.lock().unwrap();
        let depth = parent
            .and_then(|p| tree.nodes.get(p))
            .map_or(0, |n| n.depth + 1);
        let id = tree.nodes.insert(VisualNode::new(parent, depth, &self.clock));
        if let Some(parent) = parent {
            if let Some(parent_node) = tree.nodes.get_mut(parent) {
                parent_node.children.push(id);
            }
        }
        tracing::debug!(?id, depth, "visual node created");
        id
    }

    /// Destroy a node synchronously: detach from the parent's child list,
    /// cancel its axis animations and value watches, drop its listeners.
    /// Children stay in the arena with their parent link cleared; the host
    /// destroys them on their own unmount.
    pub fn destroy_node(&self, id: NodeId) {
        let removed = {
            let mut tree = self.inner.lock().unwrap();
            let Some(node) = tree.nodes.remove(id) else {
                return;
            };
            if let Some(parent) = node.parent {
                if let Some(parent_node) = tree.nodes.get_mut(parent) {
                    parent_node.children.retain(|c| *c != id);
                }
            }
            for child in &node.children {
                if let Some(child_node) = tree.nodes.get_mut(*child) {
                    child_node.parent = None;
                }
            }
            node
        };

        // Cancellations run outside the arena lock; a mid-flight animation's
        // completion callback is simply skipped.
        for progress in &removed.progress {
            progress.stop_animation();
            progress.clear_listeners();
        }
        for (_, node_value) in removed.values {
            node_value.value.stop_animation();
            node_value.watch.unsubscribe();
        }
        tracing::debug!(?id, "visual node destroyed");
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.inner.lock().unwrap().nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().nodes.is_empty()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.inner.lock().unwrap().nodes.get(id)?.parent
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.inner
            .lock()
            .unwrap()
            .nodes
            .get(id)
            .map(|n| n.children.to_vec())
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // Measurement
    // ------------------------------------------------------------------

    /// Capture a host-measured box. The target box is initialized from the
    /// first measurement only.
    pub fn measure_layout(&self, id: NodeId, measured: AxisBox2D) {
        let mut tree = self.inner.lock().unwrap();
        let Some(node) = tree.nodes.get_mut(id) else {
            return;
        };
        node.box_ = Some(measured);
        node.box_corrected = measured;
        if !node.has_target_box {
            node.target_box = measured;
            node.target_box_final = measured;
            node.has_target_box = true;
        }
    }

    /// Record the pre-relayout viewport box from a host measurement, undoing
    /// the node's own transform values first. Unless an axis animation is
    /// mid-flight, the target box follows the snapshot so it stays aligned
    /// with what is on screen.
    pub fn snapshot_box(&self, id: NodeId, measured: AxisBox2D) {
        let mut tree = self.inner.lock().unwrap();
        let Some(node) = tree.nodes.get_mut(id) else {
            return;
        };
        let mut without_transforms = measured;
        remove_box_transforms(&mut without_transforms, &node.latest);
        node.prev_viewport_box = Some(without_transforms);
        if !node.is_axis_animating() {
            node.target_box = without_transforms;
            node.has_target_box = true;
        }
    }

    /// Notify layout listeners that every box in the tree has been re-read.
    /// Listeners receive the new box and the snapshot taken before relayout.
    pub fn layout_ready(&self, id: NodeId) {
        let fired = {
            let tree = self.inner.lock().unwrap();
            let Some(node) = tree.nodes.get(id) else {
                return;
            };
            let Some(new_box) = node.box_ else {
                return;
            };
            let prev = node.prev_viewport_box.unwrap_or(new_box);
            let listeners: Vec<LayoutListener> = node
                .layout_listeners
                .iter()
                .map(|(_, l)| Arc::clone(l))
                .collect();
            (listeners, new_box, prev)
        };
        for listener in fired.0 {
            (listener.lock().unwrap())(&fired.1, &fired.2);
        }
    }

    // ------------------------------------------------------------------
    // Projection
    // ------------------------------------------------------------------

    /// Opt this node into layout projection. One-directional: there is no
    /// disable path. Every ancestor is flagged as having projecting children
    /// so ancestor-chain delta updates are never skipped.
    pub fn enable_layout_projection(&self, id: NodeId) {
        let mut tree = self.inner.lock().unwrap();
        let Some(node) = tree.nodes.get_mut(id) else {
            return;
        };
        node.projection_enabled = true;
        let mut cur = node.parent;
        while let Some(pid) = cur {
            let Some(parent) = tree.nodes.get_mut(pid) else {
                break;
            };
            parent.has_projecting_children = true;
            cur = parent.parent;
        }
    }

    /// Update one axis of the node's target box and flag every projecting
    /// descendant for re-render.
    pub fn set_axis_target(&self, id: NodeId, axis: AxisKind, min: f32, max: f32) {
        let dirty = self
            .inner
            .lock()
            .unwrap()
            .set_axis_target(id, axis, min, max);
        if dirty {
            self.request_render();
        }
    }

    /// Recompute this node's deltas, ancestors first. A synthetic pass (one
    /// not driven by the render loop) skips viewport-box notifications.
    pub fn update_layout_deltas(&self, id: NodeId, is_synthetic_pass: bool) {
        let mut events = Vec::new();
        self.inner
            .lock()
            .unwrap()
            .update_layout_deltas(id, is_synthetic_pass, &mut events);
        fire_viewport_events(events);
    }

    /// Animate one axis of the target box toward `target` by driving the
    /// node's 0..1 progress value; each progress sample mixes the captured
    /// origin axis toward `target` and writes it back as the axis target.
    ///
    /// The progress value is written to its start value twice before
    /// sampling begins, hard-resetting its velocity. A destroyed node yields
    /// an already-cancelled handle.
    pub fn start_layout_axis_animation(
        &self,
        id: NodeId,
        axis: AxisKind,
        target: Axis,
        transition: Transition,
    ) -> Result<AnimationHandle, AnimationError> {
        let looked_up = {
            let tree = self.inner.lock().unwrap();
            tree.nodes
                .get(id)
                .map(|n| (n.progress[axis_index(axis)].clone(), n.target_box.axis(axis)))
        };
        let Some((progress, origin)) = looked_up else {
            let orphan = SharedValue::with_clock(0.0, Arc::clone(&self.clock));
            let handle =
                start_animation(&self.scheduler, &orphan, ValueCategory::Positional, 1.0, transition)?;
            handle.cancel();
            return Ok(handle);
        };

        progress.clear_listeners();
        progress.set(0.0);
        progress.set(0.0);

        let inner = Arc::downgrade(&self.inner);
        let scheduler = self.scheduler.clone();
        let render_cb = Arc::clone(&self.render_cb);
        let _watch = progress.on_change(move |v| {
            let p = v.to_f32_lossy();
            let min = mix(origin.min, target.min, p);
            let max = mix(origin.max, target.max, p);
            let Some(inner) = inner.upgrade() else {
                return;
            };
            let dirty = inner.lock().unwrap().set_axis_target(id, axis, min, max);
            if dirty {
                scheduler.schedule(Phase::Render, Arc::clone(&render_cb), false, false);
            }
        });

        start_animation(&self.scheduler, &progress, ValueCategory::Positional, 1.0, transition)
    }

    /// Stop the layout animations on both axes, leaving the target box
    /// wherever the last sample put it.
    pub fn stop_layout_animation(&self, id: NodeId) {
        let progress = {
            let tree = self.inner.lock().unwrap();
            tree.nodes.get(id).map(|n| n.progress.clone())
        };
        if let Some(progress) = progress {
            for p in &progress {
                p.stop_animation();
            }
        }
    }

    // ------------------------------------------------------------------
    // Values
    // ------------------------------------------------------------------

    /// Declare an animatable value on a node. Literals are normalized into
    /// fresh containers; shared containers are watched as-is. The value's
    /// semantic category is computed here, once. Returns the container, or
    /// `None` for a destroyed node.
    pub fn set_value(
        &self,
        id: NodeId,
        name: &str,
        input: impl Into<ValueInput>,
    ) -> Option<SharedValue> {
        let value = match input.into() {
            ValueInput::Literal(v) => SharedValue::with_clock(v, Arc::clone(&self.clock)),
            ValueInput::Shared(v) => v,
        };
        let category = ValueCategory::of(name);

        let watch = {
            let inner = Arc::downgrade(&self.inner);
            let scheduler = self.scheduler.clone();
            let render_cb = Arc::clone(&self.render_cb);
            let name = name.to_string();
            value.on_change(move |v| {
                let Some(inner) = inner.upgrade() else {
                    return;
                };
                {
                    let mut tree = inner.lock().unwrap();
                    let Some(node) = tree.nodes.get_mut(id) else {
                        return;
                    };
                    node.latest.insert(name.clone(), v.clone());
                    node.render_dirty = true;
                }
                scheduler.schedule(Phase::Render, Arc::clone(&render_cb), false, false);
            })
        };

        let displaced = {
            let mut tree = self.inner.lock().unwrap();
            let node = tree.nodes.get_mut(id)?;
            node.latest.insert(name.to_string(), value.get());
            node.render_dirty = true;
            node.values.insert(
                name.to_string(),
                NodeValue {
                    value: value.clone(),
                    category,
                    watch,
                },
            )
        };
        if let Some(displaced) = displaced {
            displaced.watch.unsubscribe();
            displaced.value.stop_animation();
        }
        self.request_render();
        Some(value)
    }

    /// The container declared for a value name, if any.
    pub fn value(&self, id: NodeId, name: &str) -> Option<SharedValue> {
        let tree = self.inner.lock().unwrap();
        Some(tree.nodes.get(id)?.values.get(name)?.value.clone())
    }

    pub fn value_category(&self, id: NodeId, name: &str) -> Option<ValueCategory> {
        let tree = self.inner.lock().unwrap();
        Some(tree.nodes.get(id)?.values.get(name)?.category)
    }

    /// Animate a declared value toward `target` with the defaults of the
    /// category computed at declaration. `None` when the node or value does
    /// not exist.
    pub fn animate_value(
        &self,
        id: NodeId,
        name: &str,
        target: impl Into<AnimationTarget>,
        transition: Transition,
    ) -> Option<Result<AnimationHandle, AnimationError>> {
        let (value, category) = {
            let tree = self.inner.lock().unwrap();
            let node_value = tree.nodes.get(id)?.values.get(name)?;
            (node_value.value.clone(), node_value.category)
        };
        Some(start_animation(
            &self.scheduler,
            &value,
            category,
            target,
            transition,
        ))
    }

    /// Copy of the latest resolved value payloads for a node.
    pub fn latest_values(&self, id: NodeId) -> Option<FxHashMap<String, Value>> {
        let tree = self.inner.lock().unwrap();
        Some(tree.nodes.get(id)?.latest.clone())
    }

    // ------------------------------------------------------------------
    // Listeners
    // ------------------------------------------------------------------

    /// Subscribe to layout updates, fired by [`layout_ready`](Self::layout_ready)
    /// with the new and previous boxes.
    pub fn on_layout_update(
        &self,
        id: NodeId,
        f: impl FnMut(&AxisBox2D, &AxisBox2D) + Send + 'static,
    ) -> TreeSubscription {
        let mut tree = self.inner.lock().unwrap();
        let listener_id = tree.next_listener_id;
        tree.next_listener_id += 1;
        if let Some(node) = tree.nodes.get_mut(id) {
            node.layout_listeners
                .push((listener_id, Arc::new(Mutex::new(f))));
        }
        TreeSubscription {
            id: listener_id,
            node: id,
            kind: ListenerKind::Layout,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Subscribe to target-box updates, fired during non-synthetic delta
    /// passes after [`set_axis_target`](Self::set_axis_target) changed the box.
    pub fn on_viewport_box_update(
        &self,
        id: NodeId,
        f: impl FnMut(&AxisBox2D, &BoxDelta) + Send + 'static,
    ) -> TreeSubscription {
        let mut tree = self.inner.lock().unwrap();
        let listener_id = tree.next_listener_id;
        tree.next_listener_id += 1;
        if let Some(node) = tree.nodes.get_mut(id) {
            node.viewport_listeners
                .push((listener_id, Arc::new(Mutex::new(f))));
        }
        TreeSubscription {
            id: listener_id,
            node: id,
            kind: ListenerKind::Viewport,
            inner: Arc::downgrade(&self.inner),
        }
    }

    // ------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------

    /// Flag a node for re-render in the next `Render` phase.
    pub fn schedule_render(&self, id: NodeId) {
        {
            let mut tree = self.inner.lock().unwrap();
            let Some(node) = tree.nodes.get_mut(id) else {
                return;
            };
            node.render_dirty = true;
        }
        self.request_render();
    }

    fn request_render(&self) {
        self.scheduler
            .schedule(Phase::Render, Arc::clone(&self.render_cb), false, false);
    }

    /// Weak handle for collaborators (crossfaders, host bindings) that need
    /// to reach back into the tree from long-lived callbacks. All operations
    /// no-op once the tree is gone.
    pub fn handle(&self) -> TreeHandle {
        TreeHandle {
            inner: Arc::downgrade(&self.inner),
            scheduler: self.scheduler.clone(),
            render_cb: Arc::clone(&self.render_cb),
        }
    }

    // ------------------------------------------------------------------
    // Copy-out accessors (never retain across a frame boundary)
    // ------------------------------------------------------------------

    pub fn measured_box(&self, id: NodeId) -> Option<AxisBox2D> {
        self.inner.lock().unwrap().nodes.get(id)?.box_
    }

    pub fn corrected_box(&self, id: NodeId) -> Option<AxisBox2D> {
        Some(self.inner.lock().unwrap().nodes.get(id)?.box_corrected)
    }

    pub fn target_box(&self, id: NodeId) -> Option<AxisBox2D> {
        Some(self.inner.lock().unwrap().nodes.get(id)?.target_box)
    }

    pub fn delta(&self, id: NodeId) -> Option<BoxDelta> {
        Some(self.inner.lock().unwrap().nodes.get(id)?.delta)
    }

    pub fn delta_final(&self, id: NodeId) -> Option<BoxDelta> {
        Some(self.inner.lock().unwrap().nodes.get(id)?.delta_final)
    }

    pub fn tree_scale(&self, id: NodeId) -> Option<Point2D> {
        Some(self.inner.lock().unwrap().nodes.get(id)?.tree_scale)
    }

    pub fn is_projection_enabled(&self, id: NodeId) -> bool {
        self.inner
            .lock()
            .unwrap()
            .nodes
            .get(id)
            .is_some_and(|n| n.projection_enabled)
    }

    pub fn has_projecting_children(&self, id: NodeId) -> bool {
        self.inner
            .lock()
            .unwrap()
            .nodes
            .get(id)
            .is_some_and(|n| n.has_projecting_children)
    }
}

fn render_pass(inner: &Arc<Mutex<TreeInner>>, sink: &Arc<dyn RenderSink>) {
    // Drain the dirty set ancestor-first so a parent's fresh deltas are in
    // place before its children project against them.
    let dirty: Vec<NodeId> = {
        let mut tree = inner.lock().unwrap();
        let mut dirty: Vec<(usize, NodeId)> = tree
            .nodes
            .iter()
            .filter(|(_, n)| n.render_dirty)
            .map(|(id, n)| (n.depth, id))
            .collect();
        dirty.sort_by_key(|(depth, _)| *depth);
        for (_, id) in &dirty {
            tree.nodes[*id].render_dirty = false;
        }
        dirty.into_iter().map(|(_, id)| id).collect()
    };

    for id in dirty {
        let mut events = Vec::new();
        let built = {
            let mut tree = inner.lock().unwrap();
            tree.update_layout_deltas(id, false, &mut events);
            tree.nodes.get(id).map(|node| {
                let mut styles = StyleMap::default();
                let mut vars = StyleMap::default();
                if node.projection_enabled && node.box_.is_some() {
                    build_projection_styles(
                        &node.latest,
                        &node.delta,
                        &node.delta_final,
                        node.tree_scale,
                        &node.target_box_final,
                        &mut styles,
                        &mut vars,
                    );
                } else {
                    build_plain_styles(&node.latest, &mut styles, &mut vars);
                }
                (styles, vars)
            })
        };
        fire_viewport_events(events);
        if let Some((styles, vars)) = built {
            sink.apply_styles(id, &styles, &vars);
        }
    }
}

/// Weak counterpart to [`VisualTree`], produced by [`VisualTree::handle`].
#[derive(Clone)]
pub struct TreeHandle {
    inner: Weak<Mutex<TreeInner>>,
    scheduler: SchedulerHandle,
    render_cb: FrameCallback,
}

impl TreeHandle {
    pub fn schedule_render(&self, id: NodeId) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        {
            let mut tree = inner.lock().unwrap();
            let Some(node) = tree.nodes.get_mut(id) else {
                return;
            };
            node.render_dirty = true;
        }
        self.scheduler
            .schedule(Phase::Render, Arc::clone(&self.render_cb), false, false);
    }

    pub fn latest_values(&self, id: NodeId) -> Option<FxHashMap<String, Value>> {
        let inner = self.inner.upgrade()?;
        let tree = inner.lock().unwrap();
        Some(tree.nodes.get(id)?.latest.clone())
    }

    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }
}

// ============================================================================
// Subscriptions
// ============================================================================

#[derive(Clone, Copy)]
enum ListenerKind {
    Layout,
    Viewport,
}

/// Handle to a tree listener; unsubscribing is explicit and idempotent.
pub struct TreeSubscription {
    id: u64,
    node: NodeId,
    kind: ListenerKind,
    inner: Weak<Mutex<TreeInner>>,
}

impl TreeSubscription {
    pub fn unsubscribe(&self) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let mut tree = inner.lock().unwrap();
        let Some(node) = tree.nodes.get_mut(self.node) else {
            return;
        };
        match self.kind {
            ListenerKind::Layout => node.layout_listeners.retain(|(id, _)| *id != self.id),
            ListenerKind::Viewport => node.viewport_listeners.retain(|(id, _)| *id != self.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kinetic_animation::{AnimationState, FrameScheduler, ManualTickDriver};

    #[derive(Default)]
    struct RecordingSink {
        calls: Mutex<Vec<(NodeId, StyleMap, StyleMap)>>,
    }

    impl RecordingSink {
        fn calls_for(&self, id: NodeId) -> Vec<(StyleMap, StyleMap)> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(node, _, _)| *node == id)
                .map(|(_, s, v)| (s.clone(), v.clone()))
                .collect()
        }
    }

    impl RenderSink for RecordingSink {
        fn apply_styles(&self, node: NodeId, styles: &StyleMap, vars: &StyleMap) {
            self.calls
                .lock()
                .unwrap()
                .push((node, styles.clone(), vars.clone()));
        }
    }

    struct Harness {
        scheduler: FrameScheduler,
        sink: Arc<RecordingSink>,
        tree: VisualTree,
    }

    fn harness() -> Harness {
        let scheduler = FrameScheduler::new(Arc::new(ManualTickDriver::new()));
        let sink = Arc::new(RecordingSink::default());
        let tree = VisualTree::new(scheduler.handle(), sink.clone());
        Harness {
            scheduler,
            sink,
            tree,
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

    fn square(min: f32, max: f32) -> AxisBox2D {
        AxisBox2D::from_bounds(min, max, min, max)
    }

    #[test]
    fn parent_delta_applies_before_child_delta() {
        let h = harness();
        let parent = h.tree.create_node(None);
        let child = h.tree.create_node(Some(parent));
        h.tree.enable_layout_projection(parent);
        h.tree.enable_layout_projection(child);
        h.tree.measure_layout(parent, square(0.0, 100.0));
        h.tree.measure_layout(child, square(0.0, 50.0));

        h.tree.set_axis_target(parent, AxisKind::X, 50.0, 150.0);
        h.tree.update_layout_deltas(child, false);

        // Parent projects x [0,100] -> [50,150]: pure translate of 50.
        let parent_delta = h.tree.delta(parent).unwrap();
        assert_eq!(parent_delta.x.translate, 50.0);
        assert_eq!(parent_delta.x.scale, 1.0);

        // The child's corrected box reflects the parent's delta before the
        // child's own delta is computed against it.
        let corrected = h.tree.corrected_box(child).unwrap();
        assert_eq!(corrected.x, Axis::new(50.0, 100.0));
        let child_delta = h.tree.delta(child).unwrap();
        assert_eq!(child_delta.x.translate, -50.0);
    }

    #[test]
    fn unmeasured_node_is_a_no_op() {
        let h = harness();
        let node = h.tree.create_node(None);
        h.tree.enable_layout_projection(node);
        h.tree.update_layout_deltas(node, false);
        assert_eq!(h.tree.delta(node).unwrap(), BoxDelta::default());
    }

    #[test]
    fn disabled_projection_short_circuits() {
        let h = harness();
        let node = h.tree.create_node(None);
        h.tree.measure_layout(node, square(0.0, 100.0));
        h.tree.set_axis_target(node, AxisKind::X, 40.0, 140.0);
        h.tree.update_layout_deltas(node, false);
        assert_eq!(h.tree.delta(node).unwrap(), BoxDelta::default());
    }

    #[test]
    fn target_box_initialized_on_first_measurement_only() {
        let h = harness();
        let node = h.tree.create_node(None);
        h.tree.measure_layout(node, square(0.0, 100.0));
        assert_eq!(h.tree.target_box(node).unwrap(), square(0.0, 100.0));

        h.tree.set_axis_target(node, AxisKind::Y, 10.0, 60.0);
        h.tree.measure_layout(node, square(0.0, 80.0));
        // Remeasuring must not clobber the live target.
        assert_eq!(h.tree.target_box(node).unwrap().y, Axis::new(10.0, 60.0));
    }

    #[test]
    fn enabling_projection_marks_every_ancestor() {
        let h = harness();
        let root = h.tree.create_node(None);
        let mid = h.tree.create_node(Some(root));
        let leaf = h.tree.create_node(Some(mid));
        h.tree.enable_layout_projection(leaf);
        assert!(h.tree.has_projecting_children(root));
        assert!(h.tree.has_projecting_children(mid));
        assert!(!h.tree.has_projecting_children(leaf));
    }

    #[test]
    fn destroy_detaches_and_cancels_axis_animation() {
        let h = harness();
        let parent = h.tree.create_node(None);
        let child = h.tree.create_node(Some(parent));
        h.tree.enable_layout_projection(child);
        h.tree.measure_layout(child, square(0.0, 50.0));

        let animation = h
            .tree
            .start_layout_axis_animation(
                child,
                AxisKind::X,
                Axis::new(100.0, 150.0),
                Transition::tween(1000.0),
            )
            .unwrap();
        pump(&h.scheduler, 0.0, 2);
        assert_eq!(animation.state(), AnimationState::Running);

        h.tree.destroy_node(child);
        assert_eq!(animation.state(), AnimationState::Cancelled);
        assert!(!h.tree.contains(child));
        assert!(h.tree.children(parent).is_empty());
    }

    #[test]
    fn destroying_missing_node_is_a_no_op() {
        let h = harness();
        let node = h.tree.create_node(None);
        h.tree.destroy_node(node);
        h.tree.destroy_node(node);
    }

    #[test]
    fn axis_animation_drives_target_box_to_completion() {
        let h = harness();
        let node = h.tree.create_node(None);
        h.tree.enable_layout_projection(node);
        h.tree.measure_layout(node, square(0.0, 100.0));

        let animation = h
            .tree
            .start_layout_axis_animation(
                node,
                AxisKind::X,
                Axis::new(100.0, 200.0),
                Transition::tween(100.0),
            )
            .unwrap();
        pump(&h.scheduler, 0.0, 12);

        assert_eq!(animation.state(), AnimationState::Completed);
        let target = h.tree.target_box(node).unwrap();
        assert_eq!(target.x, Axis::new(100.0, 200.0));
        // The y axis was never animated.
        assert_eq!(target.y, Axis::new(0.0, 100.0));
    }

    #[test]
    fn mid_flight_axis_animation_moves_through_mixed_targets() {
        let h = harness();
        let node = h.tree.create_node(None);
        h.tree.enable_layout_projection(node);
        h.tree.measure_layout(node, square(0.0, 100.0));

        h.tree
            .start_layout_axis_animation(
                node,
                AxisKind::X,
                Axis::new(100.0, 200.0),
                Transition::tween(100.0),
            )
            .unwrap();
        // Three 60fps frames: 100ms tween is half done at 50ms.
        pump(&h.scheduler, 0.0, 4);
        let target = h.tree.target_box(node).unwrap();
        assert!(
            target.x.min > 0.0 && target.x.min < 100.0,
            "expected a mixed axis, got {:?}",
            target.x
        );
        // The interval length mixes from 100 toward 100: constant here.
        assert!((target.x.length() - 100.0).abs() < 1.0);
    }

    #[test]
    fn layout_ready_reports_previous_snapshot() {
        let h = harness();
        let node = h.tree.create_node(None);
        h.tree.measure_layout(node, square(0.0, 100.0));
        h.tree.snapshot_box(node, square(0.0, 100.0));
        h.tree.measure_layout(node, square(50.0, 150.0));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let sub = h.tree.on_layout_update(node, move |new_box, prev| {
            sink.lock().unwrap().push((*new_box, *prev));
        });
        h.tree.layout_ready(node);

        let seen_boxes = seen.lock().unwrap().clone();
        assert_eq!(seen_boxes, vec![(square(50.0, 150.0), square(0.0, 100.0))]);
        sub.unsubscribe();
        sub.unsubscribe();
    }

    #[test]
    fn viewport_listener_fires_on_render_pass_only() {
        let h = harness();
        let node = h.tree.create_node(None);
        h.tree.enable_layout_projection(node);
        h.tree.measure_layout(node, square(0.0, 100.0));

        let count = Arc::new(Mutex::new(0));
        let c = count.clone();
        let _sub = h.tree.on_viewport_box_update(node, move |_, _| {
            *c.lock().unwrap() += 1;
        });

        h.tree.set_axis_target(node, AxisKind::X, 20.0, 120.0);
        // A synthetic pass consumes nothing.
        h.tree.update_layout_deltas(node, true);
        assert_eq!(*count.lock().unwrap(), 0);
        h.tree.update_layout_deltas(node, false);
        assert_eq!(*count.lock().unwrap(), 1);
        // Flag consumed; a second pass stays quiet.
        h.tree.update_layout_deltas(node, false);
        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn set_axis_target_renders_projecting_descendants_once_per_tick() {
        let h = harness();
        let parent = h.tree.create_node(None);
        let child = h.tree.create_node(Some(parent));
        h.tree.enable_layout_projection(parent);
        h.tree.enable_layout_projection(child);
        h.tree.measure_layout(parent, square(0.0, 100.0));
        h.tree.measure_layout(child, square(0.0, 50.0));
        h.scheduler.tick(0.0);
        let before_parent = h.sink.calls_for(parent).len();
        let before_child = h.sink.calls_for(child).len();

        h.tree.set_axis_target(parent, AxisKind::X, 50.0, 150.0);
        h.tree.set_axis_target(parent, AxisKind::Y, 50.0, 150.0);
        h.scheduler.tick(16.0);

        assert_eq!(h.sink.calls_for(parent).len(), before_parent + 1);
        assert_eq!(h.sink.calls_for(child).len(), before_child + 1);
        let (styles, _) = h.sink.calls_for(parent).pop().unwrap();
        assert!(styles.get("transform").unwrap().contains("translate3d"));
    }

    #[test]
    fn set_value_normalizes_literals_and_tracks_latest() {
        let h = harness();
        let node = h.tree.create_node(None);
        let opacity = h.tree.set_value(node, "opacity", 1.0).unwrap();
        assert_eq!(opacity.get(), Value::Number(1.0));

        opacity.set(0.5);
        assert_eq!(
            h.tree.latest_values(node).unwrap().get("opacity"),
            Some(&Value::Number(0.5))
        );

        h.scheduler.tick(0.0);
        let (styles, _) = h.sink.calls_for(node).pop().unwrap();
        assert_eq!(styles.get("opacity").map(String::as_str), Some("0.5"));
    }

    #[test]
    fn set_value_accepts_existing_containers() {
        let h = harness();
        let node = h.tree.create_node(None);
        let shared = SharedValue::new(10.0);
        h.tree.set_value(node, "x", shared.clone());
        shared.set(25.0);
        assert_eq!(
            h.tree.latest_values(node).unwrap().get("x"),
            Some(&Value::Number(25.0))
        );
        assert_eq!(
            h.tree.value_category(node, "x"),
            Some(ValueCategory::Positional)
        );
    }

    #[test]
    fn animate_value_completes_with_declared_category_defaults() {
        let h = harness();
        let node = h.tree.create_node(None);
        h.tree.set_value(node, "opacity", 0.0);

        let animation = h
            .tree
            .animate_value(node, "opacity", 1.0, Transition::default())
            .unwrap()
            .unwrap();
        // Blendable default: 300ms linear tween.
        pump(&h.scheduler, 0.0, 25);
        assert_eq!(animation.state(), AnimationState::Completed);
        assert_eq!(
            h.tree.value(node, "opacity").unwrap().get(),
            Value::Number(1.0)
        );
        assert!(h.tree.animate_value(node, "missing", 1.0, Transition::default()).is_none());
    }

    #[test]
    fn axis_animation_on_destroyed_node_settles_cancelled() {
        let h = harness();
        let node = h.tree.create_node(None);
        h.tree.destroy_node(node);
        let handle = h
            .tree
            .start_layout_axis_animation(
                node,
                AxisKind::X,
                Axis::new(0.0, 10.0),
                Transition::default(),
            )
            .unwrap();
        assert_eq!(handle.state(), AnimationState::Cancelled);
    }
}
