//! Triangle mesh output and the dual-walk meshing stage
//!
//! The octree builder hands a finished cell tree to [`dual_walk`],
//! which emits one vertex per surface leaf and stitches quads around
//! every minimal sign-changing edge. [`adaptive_mesh`] wraps the whole
//! pipeline (build, walk, release) behind one call with shared
//! progress reporting.
//!
//! Author: Moroya Sakamoto

mod dual_walk;
pub mod qef;

pub use dual_walk::{adaptive_mesh, adaptive_mesh_with, count_active_cells, dual_walk};
pub use qef::{Qef, QefSolution};

use glam::Vec3;
use rayon::prelude::*;
use std::collections::HashMap;

/// Vertex with position and normal
#[derive(Debug, Clone, Copy)]
pub struct Vertex {
    /// Position in 3D space
    pub position: Vec3,
    /// Surface normal
    pub normal: Vec3,
}

impl Vertex {
    /// Create a new vertex
    pub fn new(position: Vec3, normal: Vec3) -> Self {
        Vertex { position, normal }
    }
}

/// Indexed triangle mesh
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    /// Vertex buffer
    pub vertices: Vec<Vertex>,
    /// Triangle indices, three per face
    pub indices: Vec<u32>,
}

impl Mesh {
    /// Number of vertices
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Number of triangles
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// True when the mesh has no triangles
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Indices of triangle `i`
    pub fn triangle(&self, i: usize) -> [u32; 3] {
        [
            self.indices[i * 3],
            self.indices[i * 3 + 1],
            self.indices[i * 3 + 2],
        ]
    }

    /// Geometric (face) normal of triangle `i`
    pub fn triangle_normal(&self, i: usize) -> Vec3 {
        let [a, b, c] = self.triangle(i);
        let pa = self.vertices[a as usize].position;
        let pb = self.vertices[b as usize].position;
        let pc = self.vertices[c as usize].position;
        (pb - pa).cross(pc - pa).normalize_or_zero()
    }

    /// Centroid of triangle `i`
    pub fn triangle_centroid(&self, i: usize) -> Vec3 {
        let [a, b, c] = self.triangle(i);
        (self.vertices[a as usize].position
            + self.vertices[b as usize].position
            + self.vertices[c as usize].position)
            / 3.0
    }

    /// Bounding box of all vertices; `None` for an empty mesh
    pub fn compute_aabb(&self) -> Option<(Vec3, Vec3)> {
        if self.vertices.is_empty() {
            return None;
        }
        let init = (Vec3::splat(f32::INFINITY), Vec3::splat(f32::NEG_INFINITY));
        let (min, max) = self
            .vertices
            .par_iter()
            .map(|v| (v.position, v.position))
            .reduce(|| init, |a, b| (a.0.min(b.0), a.1.max(b.1)));
        Some((min, max))
    }

    /// Total surface area
    pub fn surface_area(&self) -> f32 {
        (0..self.triangle_count())
            .into_par_iter()
            .map(|i| {
                let [a, b, c] = self.triangle(i);
                let pa = self.vertices[a as usize].position;
                let pb = self.vertices[b as usize].position;
                let pc = self.vertices[c as usize].position;
                (pb - pa).cross(pc - pa).length() * 0.5
            })
            .sum()
    }

    /// True if any triangle repeats a vertex index
    pub fn has_degenerate_triangles(&self) -> bool {
        (0..self.triangle_count()).any(|i| {
            let [a, b, c] = self.triangle(i);
            a == b || b == c || a == c
        })
    }

    /// Watertightness and orientation check: every directed edge must
    /// appear exactly once, paired with its reverse.
    pub fn edge_pairing_ok(&self) -> bool {
        let mut counts: HashMap<(u32, u32), u32> = HashMap::new();
        for i in 0..self.triangle_count() {
            let [a, b, c] = self.triangle(i);
            for (s, e) in [(a, b), (b, c), (c, a)] {
                *counts.entry((s, e)).or_insert(0) += 1;
            }
        }
        counts
            .iter()
            .all(|(&(s, e), &n)| n == 1 && counts.get(&(e, s)) == Some(&1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_quad() -> Mesh {
        // Two triangles forming a unit square in the XY plane
        Mesh {
            vertices: vec![
                Vertex::new(Vec3::ZERO, Vec3::Z),
                Vertex::new(Vec3::X, Vec3::Z),
                Vertex::new(Vec3::new(1.0, 1.0, 0.0), Vec3::Z),
                Vertex::new(Vec3::Y, Vec3::Z),
            ],
            indices: vec![0, 1, 2, 0, 2, 3],
        }
    }

    #[test]
    fn test_counts_and_normal() {
        let mesh = unit_quad();
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.triangle_count(), 2);
        assert!((mesh.triangle_normal(0) - Vec3::Z).length() < 1e-6);
    }

    #[test]
    fn test_surface_area_of_quad() {
        let mesh = unit_quad();
        assert!((mesh.surface_area() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_degenerate_detection() {
        let mut mesh = unit_quad();
        assert!(!mesh.has_degenerate_triangles());
        mesh.indices.extend_from_slice(&[0, 0, 1]);
        assert!(mesh.has_degenerate_triangles());
    }

    #[test]
    fn test_open_mesh_fails_edge_pairing() {
        let mesh = unit_quad();
        // A flat open square: boundary edges have no reverse partner
        assert!(!mesh.edge_pairing_ok());
    }

    #[test]
    fn test_tetrahedron_passes_edge_pairing() {
        let mesh = Mesh {
            vertices: vec![
                Vertex::new(Vec3::ZERO, Vec3::ONE),
                Vertex::new(Vec3::X, Vec3::ONE),
                Vertex::new(Vec3::Y, Vec3::ONE),
                Vertex::new(Vec3::Z, Vec3::ONE),
            ],
            // Consistently outward-wound tetrahedron
            indices: vec![0, 2, 1, 0, 1, 3, 0, 3, 2, 1, 2, 3],
        };
        assert!(mesh.edge_pairing_ok());
    }
}
