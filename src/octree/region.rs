//! Region and subdivision arithmetic
//!
//! An axis-aligned box tagged with an integer subdivision level.
//! `level == 0` means leaf-sized: no further subdivision is legal.
//!
//! Author: Moroya Sakamoto

use crate::types::Aabb;
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Levels beyond this overflow the tick budget (8^21 > 2^63) and are
/// far past any practical resolution.
pub const MAX_LEVEL: u32 = 20;

/// An axis-aligned region of space with a subdivision level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region3 {
    /// Minimum corner
    pub lower: Vec3,
    /// Maximum corner
    pub upper: Vec3,
    /// Remaining subdivision levels (0 = leaf-sized)
    pub level: u32,
}

impl Region3 {
    /// Create a region with an explicit level
    pub fn new(lower: Vec3, upper: Vec3, level: u32) -> Self {
        Region3 {
            lower,
            upper,
            level,
        }
    }

    /// Create a level-0 region from box corners
    pub fn from_bounds(lower: Vec3, upper: Vec3) -> Self {
        Region3 {
            lower,
            upper,
            level: 0,
        }
    }

    /// Choose the level so that leaf cells measure at most
    /// `min_feature` along the region's longest axis.
    pub fn with_resolution(&self, min_feature: f32) -> Self {
        assert!(min_feature > 0.0, "min_feature must be positive");
        let longest = (self.upper - self.lower).max_element();
        let mut level = 0u32;
        while longest / (1u64 << level) as f32 > min_feature && level < MAX_LEVEL {
            level += 1;
        }
        Region3 {
            lower: self.lower,
            upper: self.upper,
            level,
        }
    }

    /// Center point
    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.lower + self.upper) * 0.5
    }

    /// Size along each axis
    #[inline]
    pub fn size(&self) -> Vec3 {
        self.upper - self.lower
    }

    /// Corner `i`, indexed by the bit tuple (x = bit 0, y = bit 1,
    /// z = bit 2); bit set selects the upper side.
    #[inline]
    pub fn corner(&self, i: u8) -> Vec3 {
        Vec3::new(
            if i & 1 == 0 { self.lower.x } else { self.upper.x },
            if i & 2 == 0 { self.lower.y } else { self.upper.y },
            if i & 4 == 0 { self.lower.z } else { self.upper.z },
        )
    }

    /// The region as a plain AABB
    #[inline]
    pub fn aabb(&self) -> Aabb {
        Aabb::new(self.lower, self.upper)
    }

    /// Split into eight children, indexed like [`corner`](Self::corner).
    /// Child level is one less than the parent's.
    pub fn subdivide(&self) -> [Region3; 8] {
        debug_assert!(self.level > 0, "subdividing a leaf-level region");
        let center = self.center();
        let level = self.level - 1;
        std::array::from_fn(|i| {
            let i = i as u8;
            let lower = Vec3::new(
                if i & 1 == 0 { self.lower.x } else { center.x },
                if i & 2 == 0 { self.lower.y } else { center.y },
                if i & 4 == 0 { self.lower.z } else { center.z },
            );
            let upper = Vec3::new(
                if i & 1 == 0 { center.x } else { self.upper.x },
                if i & 2 == 0 { center.y } else { self.upper.y },
                if i & 4 == 0 { center.z } else { self.upper.z },
            );
            Region3 {
                lower,
                upper,
                level,
            }
        })
    }

    /// Reconstruct the enclosing region this one was subdivided from,
    /// given which child it is. Inverse of [`subdivide`](Self::subdivide)
    /// up to floating-point rounding.
    pub fn parent_region(&self, child_index: u8) -> Region3 {
        let size = self.size();
        let lower = Vec3::new(
            if child_index & 1 == 0 {
                self.lower.x
            } else {
                self.lower.x - size.x
            },
            if child_index & 2 == 0 {
                self.lower.y
            } else {
                self.lower.y - size.y
            },
            if child_index & 4 == 0 {
                self.lower.z
            } else {
                self.lower.z - size.z
            },
        );
        let upper = Vec3::new(
            if child_index & 1 == 0 {
                self.upper.x + size.x
            } else {
                self.upper.x
            },
            if child_index & 2 == 0 {
                self.upper.y + size.y
            } else {
                self.upper.y
            },
            if child_index & 4 == 0 {
                self.upper.z + size.z
            } else {
                self.upper.z
            },
        );
        Region3 {
            lower,
            upper,
            level: self.level + 1,
        }
    }
}
