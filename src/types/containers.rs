//! Geometric containers shared across the crate
//!
//! Author: Moroya Sakamoto

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    /// Minimum corner
    pub min: Vec3,
    /// Maximum corner
    pub max: Vec3,
}

impl Aabb {
    /// Create a new AABB
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Aabb { min, max }
    }

    /// The AABB covering all of space
    pub const EVERYTHING: Self = Aabb {
        min: Vec3::splat(f32::NEG_INFINITY),
        max: Vec3::splat(f32::INFINITY),
    };

    /// Create from center and half-extents
    pub fn from_center_extents(center: Vec3, half_extents: Vec3) -> Self {
        Aabb {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    /// Get center point
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Get size
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Check if a point is inside
    pub fn contains(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    /// Check if another AABB lies entirely inside this one, with a
    /// relative tolerance along each axis.
    ///
    /// Infinite bounds contain everything. The tolerance absorbs the
    /// floating-point drift of reconstructing a parent region from one
    /// of its children.
    pub fn contains_aabb(&self, other: &Aabb, relative_eps: f32) -> bool {
        if self.min.x == f32::NEG_INFINITY {
            return true;
        }
        let slack = (other.max - other.min).max(Vec3::splat(1e-12)) * relative_eps;
        (other.min + slack).cmpge(self.min).all() && (other.max - slack).cmple(self.max).all()
    }

    /// Smallest AABB containing both
    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }
}
