//! Style and transform projection
//!
//! The thin boundary between the delta calculus and the host surface:
//! converts a node's resolved values and frame deltas into the renderable
//! property map handed to the host's [`RenderSink`] once per `Render` phase
//! per dirty node.
//!
//! Property order in the output map is semantic (transforms compose in
//! order), so the maps are insertion-ordered.

use indexmap::IndexMap;
use rustc_hash::FxHashMap;

use kinetic_core::Value;

use crate::geometry::{AxisBox2D, BoxDelta, Point2D};
use crate::tree::NodeId;

/// Insertion-ordered property map.
pub type StyleMap = IndexMap<String, String>;

/// Host render output. Called with the final styles and CSS-variable map for
/// one node; implementations write them to the surface and must not retain
/// the borrowed maps.
pub trait RenderSink: Send + Sync {
    fn apply_styles(&self, node: NodeId, styles: &StyleMap, vars: &StyleMap);
}

/// Transform values are baked into the projection transform (or the plain
/// transform string) rather than passed through as properties.
const TRANSFORM_KEYS: [&str; 14] = [
    "x", "y", "z", "scale", "scaleX", "scaleY", "scaleZ", "originX", "originY", "originZ",
    "rotate", "rotateX", "rotateY", "rotateZ",
];

const CORNERS: [(&str, &str); 4] = [
    ("borderTopLeftRadius", "border-top-left-radius"),
    ("borderTopRightRadius", "border-top-right-radius"),
    ("borderBottomLeftRadius", "border-bottom-left-radius"),
    ("borderBottomRightRadius", "border-bottom-right-radius"),
];

fn is_transform_key(key: &str) -> bool {
    TRANSFORM_KEYS.contains(&key)
}

fn is_corner_key(key: &str) -> bool {
    key == "borderRadius" || CORNERS.iter().any(|(camel, _)| *camel == key)
}

/// camelCase property names become kebab-case for the surface.
fn css_name(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 2);
    for c in key.chars() {
        if c.is_ascii_uppercase() {
            out.push('-');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn num(latest: &FxHashMap<String, Value>, key: &str) -> Option<f32> {
    latest.get(key).map(Value::to_f32_lossy)
}

fn safe_scale(scale: f32) -> f32 {
    if scale.abs() <= f32::EPSILON {
        1.0
    } else {
        scale
    }
}

/// Build the full projection style set for a dirty node: the delta-derived
/// transform, its origin, scale-corrected border radii and box shadow, and a
/// pass-through of the remaining resolved values. Declared CSS variables
/// (keys starting `--`) land in `vars`.
pub fn build_projection_styles(
    latest: &FxHashMap<String, Value>,
    delta: &BoxDelta,
    delta_final: &BoxDelta,
    tree_scale: Point2D,
    target_box_final: &AxisBox2D,
    styles: &mut StyleMap,
    vars: &mut StyleMap,
) {
    styles.clear();
    vars.clear();

    // Projection transform: translate in screen pixels (so divided back out
    // by the accumulated tree scale) then the per-axis scale.
    let tx = delta_final.x.translate / safe_scale(tree_scale.x);
    let ty = delta_final.y.translate / safe_scale(tree_scale.y);
    let is_identity =
        tx == 0.0 && ty == 0.0 && delta_final.x.scale == 1.0 && delta_final.y.scale == 1.0;
    let transform = if is_identity {
        "none".to_string()
    } else {
        format!(
            "translate3d({tx}px, {ty}px, 0) scale({}, {})",
            delta_final.x.scale, delta_final.y.scale
        )
    };
    styles.insert("transform".to_string(), transform);
    styles.insert(
        "transform-origin".to_string(),
        format!(
            "{}% {}% 0",
            delta_final.x.origin * 100.0,
            delta_final.y.origin * 100.0
        ),
    );

    build_corrected_corners(latest, delta, tree_scale, target_box_final, styles);
    if let Some(shadow) = latest.get("boxShadow") {
        styles.insert(
            "box-shadow".to_string(),
            correct_box_shadow(&shadow.to_string(), delta, tree_scale),
        );
    }

    pass_through(latest, styles, vars);
}

/// Style set for a node without layout projection: user transforms become a
/// plain transform string and everything else passes through.
pub fn build_plain_styles(
    latest: &FxHashMap<String, Value>,
    styles: &mut StyleMap,
    vars: &mut StyleMap,
) {
    styles.clear();
    vars.clear();

    let mut transform = String::new();
    let x = num(latest, "x").unwrap_or(0.0);
    let y = num(latest, "y").unwrap_or(0.0);
    if x != 0.0 || y != 0.0 {
        transform.push_str(&format!("translate3d({x}px, {y}px, 0)"));
    }
    if let Some(rotate) = latest.get("rotate") {
        let degrees = rotate.to_f32_lossy();
        if degrees != 0.0 {
            if !transform.is_empty() {
                transform.push(' ');
            }
            transform.push_str(&format!("rotate({degrees}deg)"));
        }
    }
    let scale_x = num(latest, "scaleX").or_else(|| num(latest, "scale"));
    let scale_y = num(latest, "scaleY").or_else(|| num(latest, "scale"));
    if scale_x.is_some() || scale_y.is_some() {
        if !transform.is_empty() {
            transform.push(' ');
        }
        transform.push_str(&format!(
            "scale({}, {})",
            scale_x.unwrap_or(1.0),
            scale_y.unwrap_or(1.0)
        ));
    }
    if !transform.is_empty() {
        styles.insert("transform".to_string(), transform);
    }

    for (key, value) in latest {
        if is_transform_key(key) {
            continue;
        }
        if let Some(var_key) = key.strip_prefix("--") {
            vars.insert(format!("--{var_key}"), value.to_string());
        } else {
            styles.insert(css_name(key), value.to_string());
        }
    }
}

fn pass_through(latest: &FxHashMap<String, Value>, styles: &mut StyleMap, vars: &mut StyleMap) {
    for (key, value) in latest {
        if is_transform_key(key) || is_corner_key(key) || key == "boxShadow" {
            continue;
        }
        if let Some(var_key) = key.strip_prefix("--") {
            vars.insert(format!("--{var_key}"), value.to_string());
        } else {
            styles.insert(css_name(key), value.to_string());
        }
    }
}

/// A radius payload in pixels, resolving percentages against the axis
/// length of the final target box.
fn resolve_radius(value: &Value, axis_length: f32) -> f32 {
    match value {
        Value::Number(n) => *n,
        Value::Text(s) => {
            let n = value.to_f32_lossy();
            if s.trim().ends_with('%') {
                n / 100.0 * axis_length
            } else {
                n
            }
        }
    }
}

fn build_corrected_corners(
    latest: &FxHashMap<String, Value>,
    delta: &BoxDelta,
    tree_scale: Point2D,
    target_box_final: &AxisBox2D,
    styles: &mut StyleMap,
) {
    let fallback = latest.get("borderRadius");
    for (camel, css) in CORNERS {
        let Some(radius) = latest.get(camel).or(fallback) else {
            continue;
        };
        let x = resolve_radius(radius, target_box_final.x.length());
        let y = resolve_radius(radius, target_box_final.y.length());
        // Divide the visual scaling back out so the corner renders at its
        // declared size.
        let corrected_x = x / safe_scale(tree_scale.x * delta.x.scale);
        let corrected_y = y / safe_scale(tree_scale.y * delta.y.scale);
        styles.insert(css.to_string(), format!("{corrected_x}px {corrected_y}px"));
    }
}

/// Scale-correct a box shadow: x offset by the horizontal scale, y offset by
/// the vertical, blur and spread by their average. Non-length tokens (the
/// color) pass through untouched.
fn correct_box_shadow(shadow: &str, delta: &BoxDelta, tree_scale: Point2D) -> String {
    let x_scale = safe_scale(tree_scale.x * delta.x.scale);
    let y_scale = safe_scale(tree_scale.y * delta.y.scale);
    let average = (x_scale + y_scale) / 2.0;

    let mut length_index = 0;
    let corrected: Vec<String> = shadow
        .split_whitespace()
        .map(|token| {
            let Some(px) = token
                .strip_suffix("px")
                .and_then(|n| n.parse::<f32>().ok())
            else {
                return token.to_string();
            };
            let divisor = match length_index {
                0 => x_scale,
                1 => y_scale,
                _ => average,
            };
            length_index += 1;
            format!("{}px", px / divisor)
        })
        .collect();
    corrected.join(" ")
}
