//! Dual walk: adaptive octree → triangle mesh
//!
//! Standard octree dual contouring recursion (cell / face / edge
//! procedures). Every minimal edge of the tree is visited exactly once
//! with the four cells around it; if the field changes sign along the
//! edge, the four cells' dual vertices are stitched into a quad wound
//! to face outward. Cells of different sizes meet without cracks
//! because vertices are shared per cell, and quads that touch a coarser
//! cell twice simply drop their degenerate triangle.
//!
//! Author: Moroya Sakamoto

use crate::mesh::{Mesh, Vertex};
use crate::octree::{
    build_with_evaluators, make_evaluators, BuildConfig, Cell, ProgressCallback, ProgressHandler,
    Region3,
};
use crate::tape::Tape;
use crate::types::SdfNode;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Number of cells a dual walk will visit (branch cells and their
/// subtrees; merged subtrees count as one).
pub fn count_active_cells(cell: &Arc<Cell>) -> u64 {
    let mut count = 1;
    if cell.is_branch() {
        if let Some(children) = cell.children() {
            for child in children {
                count += count_active_cells(child);
            }
        }
    }
    count
}

/// Walk a finished tree into a mesh.
///
/// `ticks` (if given) is incremented once per visited cell for progress
/// reporting; `cancel` aborts the walk, returning `None`.
pub fn dual_walk(
    root: &Arc<Cell>,
    ticks: Option<&AtomicU64>,
    cancel: Option<&AtomicBool>,
) -> Option<Mesh> {
    let mut walker = Walker {
        mesh: Mesh::default(),
        indices: HashMap::new(),
        ticks,
        cancel,
        cancelled: false,
    };
    walker.cell_proc(root);
    if walker.cancelled {
        None
    } else {
        Some(walker.mesh)
    }
}

struct Walker<'a> {
    mesh: Mesh,
    indices: HashMap<*const Cell, u32>,
    ticks: Option<&'a AtomicU64>,
    cancel: Option<&'a AtomicBool>,
    cancelled: bool,
}

impl Walker<'_> {
    /// Dual vertex index of a leaf cell; `None` for homogeneous leaves
    fn vertex_index(&mut self, cell: &Arc<Cell>) -> Option<u32> {
        let leaf = cell.leaf()?;
        let key = Arc::as_ptr(cell);
        if let Some(&idx) = self.indices.get(&key) {
            return Some(idx);
        }
        let idx = self.mesh.vertices.len() as u32;
        self.mesh.vertices.push(Vertex::new(leaf.vertex, leaf.normal));
        self.indices.insert(key, idx);
        Some(idx)
    }

    fn cell_proc(&mut self, cell: &Arc<Cell>) {
        if self.cancelled {
            return;
        }
        if let Some(cancel) = self.cancel {
            if cancel.load(Ordering::Relaxed) {
                self.cancelled = true;
                return;
            }
        }
        if let Some(ticks) = self.ticks {
            ticks.fetch_add(1, Ordering::Relaxed);
        }

        if !cell.is_branch() {
            return;
        }
        let ch = cell.children().expect("branch cell has children");

        for child in ch {
            self.cell_proc(child);
        }

        for axis in 0..3usize {
            let t = 1usize << axis;
            let u = 1usize << ((axis + 1) % 3);
            let v = 1usize << ((axis + 2) % 3);

            // Interior faces between child pairs along this axis
            for i in 0..8usize {
                if i & t == 0 {
                    self.face_proc([&ch[i], &ch[i | t]], axis);
                }
            }

            // The two interior edges along this axis, each shared by
            // four children.
            for e in [0, t] {
                self.edge_proc([&ch[e], &ch[e | u], &ch[e | v], &ch[e | u | v]], axis);
            }
        }
    }

    /// `cells = [lower, upper]` across a face normal to `axis`
    fn face_proc(&mut self, cells: [&Arc<Cell>; 2], axis: usize) {
        if self.cancelled {
            return;
        }
        let [a, b] = cells;
        if !(a.is_branch() || b.is_branch()) {
            return;
        }

        let t = 1usize << axis;
        let u = 1usize << ((axis + 1) % 3);
        let v = 1usize << ((axis + 2) % 3);

        // Sub-faces between facing children
        for bits in [0, u, v, u | v] {
            self.face_proc([descend(a, t | bits), descend(b, bits)], axis);
        }

        // Face-interior edges along the (axis+1) direction. Around such
        // an edge the four cells are ordered by (position along
        // axis+2, position along axis).
        let axis_u = (axis + 1) % 3;
        for h in [0, u] {
            self.edge_proc(
                [
                    descend(a, t | h),
                    descend(a, t | h | v),
                    descend(b, h),
                    descend(b, h | v),
                ],
                axis_u,
            );
        }

        // Face-interior edges along the (axis+2) direction, ordered by
        // (position along axis, position along axis+1).
        let axis_v = (axis + 2) % 3;
        for h in [0, v] {
            self.edge_proc(
                [
                    descend(a, t | h),
                    descend(b, h),
                    descend(a, t | h | u),
                    descend(b, h | u),
                ],
                axis_v,
            );
        }
    }

    /// `cells[j]` sits at position `(j & 1, j >> 1)` along the two
    /// cross axes `(axis+1, axis+2)` relative to the shared edge.
    fn edge_proc(&mut self, cells: [&Arc<Cell>; 4], axis: usize) {
        if self.cancelled {
            return;
        }
        if cells.iter().any(|c| c.is_branch()) {
            let t = 1usize << axis;
            let u = 1usize << ((axis + 1) % 3);
            let v = 1usize << ((axis + 2) % 3);
            // Each cell's child adjacent to the edge sits on the
            // opposite side of the cell from the cell's own position.
            for e in [0, t] {
                self.edge_proc(
                    [
                        descend(cells[0], e | u | v),
                        descend(cells[1], e | v),
                        descend(cells[2], e | u),
                        descend(cells[3], e),
                    ],
                    axis,
                );
            }
            return;
        }
        self.emit_edge(cells, axis);
    }

    /// All four cells are leaves: emit a quad if the field changes sign
    /// along the shared (minimal) edge.
    fn emit_edge(&mut self, cells: [&Arc<Cell>; 4], axis: usize) {
        let t = 1u8 << axis;
        let u_bit = 1u8 << ((axis + 1) % 3);
        let v_bit = 1u8 << ((axis + 2) % 3);

        // The minimal edge belongs to the deepest cell. Among equally
        // deep cells any corner data is interchangeable (samples at a
        // shared point are identical), so take the first that has some.
        let min_level = cells.iter().map(|c| c.region().level).min().unwrap();
        let mut source = None;
        for (j, cell) in cells.iter().enumerate() {
            if cell.region().level == min_level {
                if let Some(leaf) = cell.leaf() {
                    source = Some((j, leaf));
                    break;
                }
            }
        }
        // Deepest cells homogeneous: no crossing on their boundary
        let Some((j, leaf)) = source else { return };

        let uj = (j & 1) as u8;
        let vj = ((j >> 1) & 1) as u8;
        let corner0 = (1 - uj) * u_bit + (1 - vj) * v_bit;
        let corner1 = corner0 | t;

        let inside0 = leaf.corners[corner0 as usize] < 0.0;
        let inside1 = leaf.corners[corner1 as usize] < 0.0;
        if inside0 == inside1 {
            return;
        }

        // Quad in counter-clockwise order viewed from the +axis side
        let (Some(q0), Some(q1), Some(q2), Some(q3)) = (
            self.vertex_index(cells[0]),
            self.vertex_index(cells[1]),
            self.vertex_index(cells[3]),
            self.vertex_index(cells[2]),
        ) else {
            return;
        };

        // Wind so the normal points from inside to outside
        let quad = if inside1 {
            [q0, q3, q2, q1]
        } else {
            [q0, q1, q2, q3]
        };

        for tri in [[quad[0], quad[1], quad[2]], [quad[0], quad[2], quad[3]]] {
            // Coarser neighbors can appear twice around the edge;
            // drop the collapsed triangle.
            if tri[0] != tri[1] && tri[1] != tri[2] && tri[0] != tri[2] {
                self.mesh.indices.extend_from_slice(&tri);
            }
        }
    }
}

/// Step into the child at `bits`, or stay on a leaf
#[inline]
fn descend<'a>(cell: &'a Arc<Cell>, bits: usize) -> &'a Arc<Cell> {
    if cell.is_branch() {
        &cell.children().expect("branch cell has children")[bits]
    } else {
        cell
    }
}

// ── Full pipeline ───────────────────────────────────────────────────

/// Build an adaptive octree of the field and mesh it.
///
/// Equivalent to [`adaptive_mesh_with`] without cancellation or
/// progress reporting.
pub fn adaptive_mesh(node: &SdfNode, region: Region3, config: &BuildConfig) -> Mesh {
    let cancel = Arc::new(AtomicBool::new(false));
    adaptive_mesh_with(node, region, config, &cancel, None)
}

/// Full three-phase pipeline: octree build, dual walk, tree release.
///
/// All phases report through one shared progress handler, so a
/// complete run delivers a strictly increasing sequence from `0.0` to
/// `3.0`. Cancellation at any point yields an empty mesh.
pub fn adaptive_mesh_with(
    node: &SdfNode,
    region: Region3,
    config: &BuildConfig,
    cancel: &Arc<AtomicBool>,
    progress: Option<ProgressCallback>,
) -> Mesh {
    let handler = progress.map(ProgressHandler::new);

    // Phase 0: build
    let tape = Tape::compile(node);
    let mut evaluators = make_evaluators(tape, config.workers);
    let root = build_with_evaluators(
        &mut evaluators,
        region,
        config,
        cancel,
        handler.as_ref(),
        0.0,
        None,
    );
    if root.is_empty() {
        return Mesh::default();
    }

    // Phase 1: dual walk
    let mesh = {
        let root_cell = root.cell().expect("non-cancelled build has a root");
        let total = count_active_cells(root_cell);
        let ticks = Arc::new(AtomicU64::new(0));
        let watcher = handler
            .as_ref()
            .map(|h| h.watch(ticks.clone(), total, 1.0, cancel));
        let mesh = dual_walk(root_cell, Some(&ticks), Some(cancel));
        if let Some(watcher) = watcher {
            watcher.finish();
        }
        match mesh {
            Some(mesh) => mesh,
            None => return Mesh::default(),
        }
    };

    // Phase 2: release the tree
    let ticks = Arc::new(AtomicU64::new(0));
    let watcher = handler
        .as_ref()
        .map(|h| h.watch(ticks.clone(), 1, 2.0, cancel));
    drop(root);
    ticks.store(1, Ordering::Release);
    if let Some(watcher) = watcher {
        watcher.finish();
    }

    mesh
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::octree::build;
    use glam::Vec3;

    #[test]
    fn test_sphere_walk_produces_closed_mesh() {
        let shape = SdfNode::sphere(0.6);
        let region = Region3::from_bounds(Vec3::splat(-1.0), Vec3::splat(1.0));
        let config = BuildConfig {
            min_feature: 0.2,
            workers: 2,
            ..Default::default()
        };
        let root = build(&shape, region, &config);
        let mesh = dual_walk(root.cell().unwrap(), None, None).unwrap();

        assert!(mesh.triangle_count() > 8);
        assert!(!mesh.has_degenerate_triangles());
        assert!(mesh.edge_pairing_ok(), "sphere mesh must be watertight");
    }

    #[test]
    fn test_empty_field_gives_empty_mesh() {
        let shape = SdfNode::sphere(0.1).translate(10.0, 0.0, 0.0);
        let region = Region3::from_bounds(Vec3::splat(-1.0), Vec3::splat(1.0));
        let config = BuildConfig {
            min_feature: 0.25,
            workers: 1,
            ..Default::default()
        };
        let mesh = adaptive_mesh(&shape, region, &config);
        assert!(mesh.is_empty());
    }

    #[test]
    fn test_walk_tick_count_matches_active_cells() {
        let shape = SdfNode::sphere(0.6);
        let region = Region3::from_bounds(Vec3::splat(-1.0), Vec3::splat(1.0));
        let config = BuildConfig {
            min_feature: 0.25,
            workers: 2,
            ..Default::default()
        };
        let root = build(&shape, region, &config);
        let root_cell = root.cell().unwrap();
        let expected = count_active_cells(root_cell);
        let ticks = AtomicU64::new(0);
        dual_walk(root_cell, Some(&ticks), None).unwrap();
        assert_eq!(ticks.load(Ordering::Relaxed), expected);
    }
}
