//! Geometry and delta calculus
//!
//! Axis-aligned boxes and the translate+scale deltas that map one box onto
//! another. A [`BoxDelta`] computed by [`update_box_delta`] satisfies
//! `apply(delta, source) == target` within floating rounding; deltas compose
//! down an ancestor chain with [`apply_tree_deltas`], which accumulates the
//! tree scale as it goes.
//!
//! Everything here is pure and never panics: degenerate inputs (zero-length
//! axes, vanishing scales) are clamped instead. Near-identity magnitudes
//! snap to exact identity so floating error cannot feed back into animated
//! deltas and oscillate.

use rustc_hash::FxHashMap;

use kinetic_core::Value;

// ============================================================================
// Boxes
// ============================================================================

/// One screen axis as a min/max interval.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Axis {
    pub min: f32,
    pub max: f32,
}

impl Axis {
    pub fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    pub fn length(&self) -> f32 {
        self.max - self.min
    }
}

/// Which screen axis an operation applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AxisKind {
    X,
    Y,
}

impl AxisKind {
    pub const BOTH: [AxisKind; 2] = [AxisKind::X, AxisKind::Y];
}

/// An element's bounding rectangle as independent x and y intervals.
///
/// A value type: always copied across frames, never aliased.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AxisBox2D {
    pub x: Axis,
    pub y: Axis,
}

impl AxisBox2D {
    pub fn new(x: Axis, y: Axis) -> Self {
        Self { x, y }
    }

    pub fn from_bounds(x_min: f32, x_max: f32, y_min: f32, y_max: f32) -> Self {
        Self {
            x: Axis::new(x_min, x_max),
            y: Axis::new(y_min, y_max),
        }
    }

    pub fn axis(&self, kind: AxisKind) -> Axis {
        match kind {
            AxisKind::X => self.x,
            AxisKind::Y => self.y,
        }
    }

    pub fn axis_mut(&mut self, kind: AxisKind) -> &mut Axis {
        match kind {
            AxisKind::X => &mut self.x,
            AxisKind::Y => &mut self.y,
        }
    }
}

/// A 2D point, also used for per-axis accumulated scale.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Point2D {
    pub x: f32,
    pub y: f32,
}

impl Point2D {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// The identity tree scale.
    pub fn unit() -> Self {
        Self { x: 1.0, y: 1.0 }
    }
}

// ============================================================================
// Deltas
// ============================================================================

/// The translate+scale transform mapping one axis interval onto another.
///
/// `origin` is normalized over the source interval; `origin_point` is that
/// origin in absolute coordinates. Node-owned delta fields are reused across
/// frames; consumers copy out, never hold a reference across a frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AxisDelta {
    pub translate: f32,
    pub scale: f32,
    pub origin: f32,
    pub origin_point: f32,
}

impl Default for AxisDelta {
    fn default() -> Self {
        Self {
            translate: 0.0,
            scale: 1.0,
            origin: 0.5,
            origin_point: 0.0,
        }
    }
}

/// Per-axis deltas for a box.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BoxDelta {
    pub x: AxisDelta,
    pub y: AxisDelta,
}

impl BoxDelta {
    pub fn axis(&self, kind: AxisKind) -> AxisDelta {
        match kind {
            AxisKind::X => self.x,
            AxisKind::Y => self.y,
        }
    }
}

// ============================================================================
// Delta calculation
// ============================================================================

/// Scales within this distance of 1 snap to exactly 1.
const SCALE_SNAP: f32 = 1e-4;
/// Translates within this distance of 0 snap to exactly 0.
const TRANSLATE_SNAP: f32 = 0.01;

pub fn mix(from: f32, to: f32, t: f32) -> f32 {
    from + (to - from) * t
}

fn progress(from: f32, to: f32, value: f32) -> f32 {
    let range = to - from;
    if range.abs() <= f32::EPSILON {
        0.5
    } else {
        (value - from) / range
    }
}

/// The normalized origin about which `source` scales onto `target`.
///
/// Chosen so the portion of the two intervals that does not overlap maps
/// correctly: growing intervals anchor on where the source sits inside the
/// target, shrinking intervals the reverse. Equal lengths use the midpoint.
pub fn calc_origin(source: Axis, target: Axis) -> f32 {
    let source_length = source.length();
    let target_length = target.length();

    let origin = if target_length > source_length {
        progress(target.min, target.max - source_length, source.min)
    } else if source_length > target_length {
        progress(source.min, source.max - target_length, target.min)
    } else {
        0.5
    };
    origin.clamp(0.0, 1.0)
}

/// Compute the delta mapping `source` onto `target`, writing into `delta`.
///
/// Pass an explicit `origin` to override the computed one (used when a
/// caller needs several deltas to share an anchor).
pub fn update_axis_delta(delta: &mut AxisDelta, source: Axis, target: Axis, origin: Option<f32>) {
    delta.origin = origin.unwrap_or_else(|| calc_origin(source, target));
    delta.origin_point = mix(source.min, source.max, delta.origin);

    let source_length = source.length();
    delta.scale = if source_length.abs() <= f32::EPSILON {
        1.0
    } else {
        target.length() / source_length
    };
    if (delta.scale - 1.0).abs() < SCALE_SNAP {
        delta.scale = 1.0;
    }

    delta.translate = mix(target.min, target.max, delta.origin) - delta.origin_point;
    if delta.translate.abs() < TRANSLATE_SNAP {
        delta.translate = 0.0;
    }
}

/// Compute both axis deltas mapping `source` onto `target`.
pub fn update_box_delta(delta: &mut BoxDelta, source: &AxisBox2D, target: &AxisBox2D) {
    update_axis_delta(&mut delta.x, source.x, target.x, None);
    update_axis_delta(&mut delta.y, source.y, target.y, None);
}

// ============================================================================
// Delta application
// ============================================================================

/// Scale `point` about `origin_point`.
pub fn scale_point(point: f32, scale: f32, origin_point: f32) -> f32 {
    origin_point + (point - origin_point) * scale
}

fn apply_point_delta(
    point: f32,
    translate: f32,
    scale: f32,
    origin_point: f32,
    box_scale: Option<f32>,
) -> f32 {
    let point = match box_scale {
        Some(box_scale) => scale_point(point, box_scale, origin_point),
        None => point,
    };
    scale_point(point, scale, origin_point) + translate
}

/// Transform an axis in place by a translate+scale about an origin point.
/// `box_scale` applies an additional whole-box scale about the same origin.
pub fn apply_axis_delta(
    axis: &mut Axis,
    translate: f32,
    scale: f32,
    origin_point: f32,
    box_scale: Option<f32>,
) {
    axis.min = apply_point_delta(axis.min, translate, scale, origin_point, box_scale);
    axis.max = apply_point_delta(axis.max, translate, scale, origin_point, box_scale);
}

/// Transform a box in place by a [`BoxDelta`].
pub fn apply_box_delta(box_: &mut AxisBox2D, delta: &BoxDelta) {
    apply_axis_delta(
        &mut box_.x,
        delta.x.translate,
        delta.x.scale,
        delta.x.origin_point,
        None,
    );
    apply_axis_delta(
        &mut box_.y,
        delta.y.translate,
        delta.y.scale,
        delta.y.origin_point,
        None,
    );
}

/// Apply an ancestor chain of deltas to a box in place, strictly
/// root-to-leaf, accumulating the overall tree scale.
pub fn apply_tree_deltas(box_: &mut AxisBox2D, tree_scale: &mut Point2D, chain: &[BoxDelta]) {
    tree_scale.x = 1.0;
    tree_scale.y = 1.0;
    for delta in chain {
        apply_box_delta(box_, delta);
        tree_scale.x *= delta.x.scale;
        tree_scale.y *= delta.y.scale;
    }
}

// ============================================================================
// Delta composition
// ============================================================================

/// An axis delta as the affine map `p ↦ a·p + b`.
fn to_affine(delta: &AxisDelta) -> (f32, f32) {
    let a = delta.scale;
    let b = delta.origin_point * (1.0 - delta.scale) + delta.translate;
    (a, b)
}

/// Combine a parent delta with a child delta into one delta equivalent to
/// applying the parent first, then the child (root-to-leaf order).
///
/// Scale combines multiplicatively; translate additively with scale
/// adjustment. The composed delta keeps the child's origin. Composition is
/// associative, so an ancestor chain folds to the same result whether it is
/// combined incrementally or all at once.
pub fn compose_axis_delta(parent: &AxisDelta, child: &AxisDelta) -> AxisDelta {
    let (pa, pb) = to_affine(parent);
    let (ca, cb) = to_affine(child);
    // child ∘ parent
    let a = ca * pa;
    let b = ca * pb + cb;

    AxisDelta {
        scale: a,
        origin: child.origin,
        origin_point: child.origin_point,
        translate: b - child.origin_point * (1.0 - a),
    }
}

/// Per-axis [`compose_axis_delta`].
pub fn compose_box_delta(parent: &BoxDelta, child: &BoxDelta) -> BoxDelta {
    BoxDelta {
        x: compose_axis_delta(&parent.x, &child.x),
        y: compose_axis_delta(&parent.y, &child.y),
    }
}

// ============================================================================
// User transforms
// ============================================================================

fn latest_num(latest: &FxHashMap<String, Value>, key: &str) -> Option<f32> {
    latest.get(key).and_then(|v| match v {
        Value::Number(n) => Some(*n),
        Value::Text(_) => Some(v.to_f32_lossy()),
    })
}

fn apply_axis_transforms(
    out: &mut Axis,
    axis: Axis,
    latest: &FxHashMap<String, Value>,
    translate_key: &str,
    scale_key: &str,
    origin_key: &str,
    box_scale: Option<f32>,
) {
    *out = axis;
    let origin = latest_num(latest, origin_key).unwrap_or(0.5);
    let origin_point = mix(axis.min, axis.max, origin);
    let translate = latest_num(latest, translate_key).unwrap_or(0.0);
    let scale = latest_num(latest, scale_key).unwrap_or(1.0);
    apply_axis_delta(out, translate, scale, origin_point, box_scale);
}

/// Apply the user-set transform values (`x`/`y`, `scale`/`scaleX`/`scaleY`,
/// `originX`/`originY`) from `latest` to `box_`, writing the result into
/// `out` without touching `box_`.
pub fn apply_box_transforms(
    out: &mut AxisBox2D,
    box_: &AxisBox2D,
    latest: &FxHashMap<String, Value>,
) {
    let box_scale = latest_num(latest, "scale");
    apply_axis_transforms(&mut out.x, box_.x, latest, "x", "scaleX", "originX", box_scale);
    apply_axis_transforms(&mut out.y, box_.y, latest, "y", "scaleY", "originY", box_scale);
}

fn remove_point_delta(
    point: f32,
    translate: f32,
    scale: f32,
    origin_point: f32,
    box_scale: Option<f32>,
) -> f32 {
    let safe = |s: f32| if s.abs() <= f32::EPSILON { 1.0 } else { s };
    let point = scale_point(point - translate, 1.0 / safe(scale), origin_point);
    match box_scale {
        Some(box_scale) => scale_point(point, 1.0 / safe(box_scale), origin_point),
        None => point,
    }
}

fn remove_axis_transforms(
    axis: &mut Axis,
    latest: &FxHashMap<String, Value>,
    translate_key: &str,
    scale_key: &str,
    origin_key: &str,
    box_scale: Option<f32>,
) {
    let origin = latest_num(latest, origin_key).unwrap_or(0.5);
    let origin_point = mix(axis.min, axis.max, origin);
    let translate = latest_num(latest, translate_key).unwrap_or(0.0);
    let scale = latest_num(latest, scale_key).unwrap_or(1.0);
    axis.min = remove_point_delta(axis.min, translate, scale, origin_point, box_scale);
    axis.max = remove_point_delta(axis.max, translate, scale, origin_point, box_scale);
}

/// Undo the user-set transform values on a measured box in place, recovering
/// the box as it would be laid out with no transforms applied.
pub fn remove_box_transforms(box_: &mut AxisBox2D, latest: &FxHashMap<String, Value>) {
    let box_scale = latest_num(latest, "scale");
    remove_axis_transforms(&mut box_.x, latest, "x", "scaleX", "originX", box_scale);
    remove_axis_transforms(&mut box_.y, latest, "y", "scaleY", "originY", box_scale);
}
