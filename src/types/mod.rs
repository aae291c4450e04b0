//! Core types for ALICE-Mesh
//!
//! Defines the implicit-field expression tree consumed by the octree
//! builder, plus shared geometric containers.
//!
//! Author: Moroya Sakamoto

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

mod constructors;
mod containers;

pub use containers::Aabb;

/// Implicit field expression node
///
/// Represents a node in the field expression tree. Each node is:
/// - A primitive shape (sphere, box, gyroid, etc.)
/// - An operation combining two sub-fields (union, intersection, etc.)
/// - A spatial transform applied to a child node
///
/// Children are `Arc`-shared so subtrees can be reused cheaply; the
/// tree itself is immutable after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SdfNode {
    // === Primitives ===
    /// Sphere centered at origin
    Sphere {
        /// Sphere radius
        radius: f32,
    },

    /// Axis-aligned box centered at origin
    Box3d {
        /// Half-size along each axis
        half_extents: Vec3,
    },

    /// Cylinder along the Y-axis
    Cylinder {
        /// Cylinder radius
        radius: f32,
        /// Half the cylinder height
        half_height: f32,
    },

    /// Torus in the XZ plane
    Torus {
        /// Distance from center to tube center-line
        major_radius: f32,
        /// Tube radius
        minor_radius: f32,
    },

    /// Infinite half-space: `dot(p, normal) - distance`
    Plane {
        /// Plane normal (unit length)
        normal: Vec3,
        /// Distance from origin along the normal
        distance: f32,
    },

    /// Gyroid triply-periodic minimal surface shell
    Gyroid {
        /// Spatial frequency
        scale: f32,
        /// Shell half-thickness
        thickness: f32,
    },

    // === Operations ===
    /// Union: `min(a, b)`
    Union {
        /// First operand
        a: Arc<SdfNode>,
        /// Second operand
        b: Arc<SdfNode>,
    },

    /// Intersection: `max(a, b)`
    Intersection {
        /// First operand
        a: Arc<SdfNode>,
        /// Second operand
        b: Arc<SdfNode>,
    },

    /// Subtraction: `max(a, -b)`
    Subtraction {
        /// Base shape
        a: Arc<SdfNode>,
        /// Shape to remove
        b: Arc<SdfNode>,
    },

    /// Polynomial smooth union
    SmoothUnion {
        /// First operand
        a: Arc<SdfNode>,
        /// Second operand
        b: Arc<SdfNode>,
        /// Blending radius
        k: f32,
    },

    // === Transforms ===
    /// Translation
    Translate {
        /// Child node
        child: Arc<SdfNode>,
        /// Translation offset
        offset: Vec3,
    },

    /// Rotation (quaternion)
    Rotate {
        /// Child node
        child: Arc<SdfNode>,
        /// Rotation to apply
        rotation: Quat,
    },

    /// Uniform scale
    Scale {
        /// Child node
        child: Arc<SdfNode>,
        /// Scale factor (non-zero)
        factor: f32,
    },
}

impl SdfNode {
    /// Total number of nodes in this subtree
    pub fn node_count(&self) -> u32 {
        match self {
            SdfNode::Sphere { .. }
            | SdfNode::Box3d { .. }
            | SdfNode::Cylinder { .. }
            | SdfNode::Torus { .. }
            | SdfNode::Plane { .. }
            | SdfNode::Gyroid { .. } => 1,

            SdfNode::Union { a, b }
            | SdfNode::Intersection { a, b }
            | SdfNode::Subtraction { a, b }
            | SdfNode::SmoothUnion { a, b, .. } => 1 + a.node_count() + b.node_count(),

            SdfNode::Translate { child, .. }
            | SdfNode::Rotate { child, .. }
            | SdfNode::Scale { child, .. } => 1 + child.node_count(),
        }
    }

    /// Maximum depth of the expression tree (a single primitive is 1)
    pub fn depth(&self) -> u32 {
        match self {
            SdfNode::Sphere { .. }
            | SdfNode::Box3d { .. }
            | SdfNode::Cylinder { .. }
            | SdfNode::Torus { .. }
            | SdfNode::Plane { .. }
            | SdfNode::Gyroid { .. } => 1,

            SdfNode::Union { a, b }
            | SdfNode::Intersection { a, b }
            | SdfNode::Subtraction { a, b }
            | SdfNode::SmoothUnion { a, b, .. } => 1 + a.depth().max(b.depth()),

            SdfNode::Translate { child, .. }
            | SdfNode::Rotate { child, .. }
            | SdfNode::Scale { child, .. } => 1 + child.depth(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_count() {
        let shape = SdfNode::sphere(1.0)
            .union(SdfNode::box3d(1.0, 1.0, 1.0))
            .translate(0.5, 0.0, 0.0);
        assert_eq!(shape.node_count(), 4);
        assert_eq!(shape.depth(), 3);
    }

    #[test]
    fn test_shared_subtree_counted_per_use() {
        let lattice = Arc::new(SdfNode::gyroid(2.0, 0.1));
        let shape = SdfNode::Union {
            a: lattice.clone(),
            b: Arc::new(SdfNode::Intersection {
                a: lattice,
                b: Arc::new(SdfNode::sphere(1.5)),
            }),
        };
        assert_eq!(shape.node_count(), 5);
    }
}
