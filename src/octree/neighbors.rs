//! Neighbor descriptor passed down the subdivision recursion
//!
//! An immutable value holding the six face neighbors of a cell (where
//! they exist). `push` derives the descriptor for one child purely from
//! its arguments: a child's face neighbor is either a sibling, a
//! descent into the parent neighbor's published children, or the
//! parent's (coarser) neighbor itself.
//!
//! Leaf evaluation uses the descriptor to reuse corner samples that a
//! same-level face neighbor has already published. Because narrowed
//! tapes evaluate bit-identically to their ancestors inside their
//! region, a reused sample always equals what a fresh evaluation would
//! produce — the lookup is a pure optimization and never perturbs the
//! result.
//!
//! Author: Moroya Sakamoto

use super::cell::Cell;
use std::sync::Arc;

/// Face neighbors of a cell, indexed `axis * 2 + positive`
#[derive(Clone, Default)]
pub struct Neighbors {
    faces: [Option<Arc<Cell>>; 6],
}

impl Neighbors {
    /// Descriptor with no known neighbors (the root)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Derive the descriptor for child `child_index`, given the eight
    /// siblings it was created alongside. Pure: depends only on the
    /// arguments.
    pub fn push(&self, child_index: u8, siblings: &[Arc<Cell>; 8]) -> Neighbors {
        let mut faces: [Option<Arc<Cell>>; 6] = Default::default();
        for axis in 0..3u8 {
            let bit = 1u8 << axis;
            for positive in 0..2u8 {
                let slot = (axis * 2 + positive) as usize;
                let towards_upper = positive == 1;
                let child_on_upper = child_index & bit != 0;
                faces[slot] = if towards_upper != child_on_upper {
                    // Neighbor in that direction stays inside the parent
                    Some(siblings[(child_index ^ bit) as usize].clone())
                } else {
                    // Cross the parent boundary through its own neighbor
                    self.faces[slot].as_ref().map(|n| match n.children() {
                        Some(nb_children) => nb_children[(child_index ^ bit) as usize].clone(),
                        None => n.clone(),
                    })
                };
            }
        }
        Neighbors { faces }
    }

    /// Look up a corner sample already published by a same-level face
    /// neighbor sharing corner `corner`, if any.
    pub fn corner_sample(&self, level: u32, corner: u8) -> Option<f32> {
        for axis in 0..3u8 {
            let bit = 1u8 << axis;
            // The neighbor across the face the corner lies on
            let positive = corner & bit != 0;
            let slot = (axis * 2 + positive as u8) as usize;
            if let Some(n) = &self.faces[slot] {
                if n.region().level == level {
                    if let Some(value) = n.published_corner(corner ^ bit) {
                        return Some(value);
                    }
                }
            }
        }
        None
    }

    /// Neighbor across the given face, if known
    pub fn face(&self, axis: u8, positive: bool) -> Option<&Arc<Cell>> {
        self.faces[(axis * 2 + positive as u8) as usize].as_ref()
    }
}
