//! Kinetic layout projection
//!
//! Projects tree-structured visual elements between layout states without
//! mutating layout-triggering properties. The host measures elements and
//! feeds the boxes in; the tree computes per-frame translate+scale deltas
//! from each element's measured box to its animated target box, composes
//! them down the ancestor chain, and renders the result as transform styles
//! through a host-supplied sink.
//!
//! # Features
//!
//! - **Geometry**: axis boxes, box deltas, delta composition and tree-scale
//!   accumulation
//! - **Visual Tree**: slotmap arena of nodes with measured/target/corrected
//!   boxes, per-value containers, and root-to-leaf delta propagation
//! - **Style Projection**: delta-derived transforms with scale-corrected
//!   border radii and box shadows
//! - **Crossfade**: opacity blending between shared-layout lead/follow pairs

pub mod crossfade;
pub mod geometry;
pub mod style;
pub mod tree;

pub use crossfade::{CrossfadeOptions, Crossfader};
pub use geometry::{
    apply_axis_delta, apply_box_delta, apply_box_transforms, apply_tree_deltas, calc_origin,
    compose_axis_delta, compose_box_delta, mix, remove_box_transforms, scale_point,
    update_axis_delta, update_box_delta, Axis, AxisBox2D, AxisDelta, AxisKind, BoxDelta, Point2D,
};
pub use style::{build_plain_styles, build_projection_styles, RenderSink, StyleMap};
pub use tree::{NodeId, TreeHandle, TreeSubscription, ValueInput, VisualTree};
