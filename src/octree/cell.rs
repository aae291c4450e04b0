//! Adaptive octree cells and the per-cell evaluation protocol
//!
//! A cell is created `Unknown`, classified exactly once (interval
//! evaluation above level 0, corner sampling at level 0), and only
//! `Ambiguous` non-leaf cells ever grow children. Parents own their
//! children through the published array; children point back through a
//! weak reference used solely for bubbling completion upward.
//!
//! Sibling completion is coordinated by a single atomic counter: each
//! finishing child decrements it (release), and the worker that drives
//! it to zero (acquire) performs the one and only merge for that
//! parent. Merged children are never mutated afterwards.
//!
//! Author: Moroya Sakamoto

use super::neighbors::Neighbors;
use super::region::Region3;
use super::BuildConfig;
use crate::mesh::qef::Qef;
use crate::tape::{FieldEvaluator, Tape};
use glam::Vec3;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock, Weak};

/// Classification of a cell against the field surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CellKind {
    /// Not yet classified; never present in a completed tree
    Unknown = 0,
    /// Entirely outside the surface
    Empty = 1,
    /// Entirely inside the surface
    Filled = 2,
    /// The surface may cross this cell
    Ambiguous = 3,
}

impl CellKind {
    fn from_u8(v: u8) -> CellKind {
        match v {
            1 => CellKind::Empty,
            2 => CellKind::Filled,
            3 => CellKind::Ambiguous,
            _ => CellKind::Unknown,
        }
    }
}

/// Surface payload of an ambiguous leaf (or merged subtree)
#[derive(Debug, Clone)]
pub struct LeafCell {
    /// Field samples at the eight cell corners
    pub corners: [f32; 8],
    /// Bitmask of corners inside the surface
    pub mask: u8,
    /// Accumulated hermite constraints (merged upward on collapse)
    pub qef: Qef,
    /// Dual vertex placed by the QEF solve, inside the cell
    pub vertex: Vec3,
    /// Average surface normal of the hermite samples
    pub normal: Vec3,
    /// QEF residual at the vertex
    pub error: f32,
}

/// The twelve cell edges as corner index pairs `(c, c | axis_bit)`
pub const CELL_EDGES: [(u8, u8); 12] = [
    (0, 1),
    (2, 3),
    (4, 5),
    (6, 7),
    (0, 2),
    (1, 3),
    (4, 6),
    (5, 7),
    (0, 4),
    (1, 5),
    (2, 6),
    (3, 7),
];

/// One node of the adaptive octree
pub struct Cell {
    parent: Weak<Cell>,
    parent_index: u8,
    region: Region3,
    kind: AtomicU8,
    pending: AtomicU8,
    children: OnceLock<[Arc<Cell>; 8]>,
    collapsed: AtomicBool,
    leaf: OnceLock<LeafCell>,
}

impl Cell {
    /// Create the root cell of a build
    pub fn new_root(region: Region3) -> Arc<Cell> {
        Arc::new(Cell {
            parent: Weak::new(),
            parent_index: 0,
            region,
            kind: AtomicU8::new(CellKind::Unknown as u8),
            pending: AtomicU8::new(8),
            children: OnceLock::new(),
            collapsed: AtomicBool::new(false),
            leaf: OnceLock::new(),
        })
    }

    /// Create a child cell (normally through the worker's pool)
    pub fn new_child(parent: &Arc<Cell>, parent_index: u8, region: Region3) -> Arc<Cell> {
        Arc::new(Cell {
            parent: Arc::downgrade(parent),
            parent_index,
            region,
            kind: AtomicU8::new(CellKind::Unknown as u8),
            pending: AtomicU8::new(8),
            children: OnceLock::new(),
            collapsed: AtomicBool::new(false),
            leaf: OnceLock::new(),
        })
    }

    /// Current classification
    #[inline]
    pub fn kind(&self) -> CellKind {
        CellKind::from_u8(self.kind.load(Ordering::Acquire))
    }

    /// Which child of the parent this cell is (meaningless at root)
    #[inline]
    pub fn parent_index(&self) -> u8 {
        self.parent_index
    }

    /// Upgraded parent reference; `None` at the root
    #[inline]
    pub fn parent_arc(&self) -> Option<Arc<Cell>> {
        self.parent.upgrade()
    }

    /// Spatial extent of this cell
    #[inline]
    pub fn region(&self) -> &Region3 {
        &self.region
    }

    /// Published children, if this cell ever subdivided
    #[inline]
    pub fn children(&self) -> Option<&[Arc<Cell>; 8]> {
        self.children.get()
    }

    /// Publish the eight children. Must happen before any child task is
    /// queued; the array is never replaced afterwards.
    pub fn set_children(&self, children: [Arc<Cell>; 8]) {
        self.children
            .set(children)
            .unwrap_or_else(|_| unreachable!("children published twice"));
    }

    /// True when the cell behaves as a leaf: it never subdivided, or
    /// its subtree was merged back into it.
    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.children.get().is_none() || self.collapsed.load(Ordering::Acquire)
    }

    /// True when the cell has live (unmerged) children
    #[inline]
    pub fn is_branch(&self) -> bool {
        self.children.get().is_some() && !self.collapsed.load(Ordering::Acquire)
    }

    /// True when this cell's subtree was merged into it
    #[inline]
    pub fn is_collapsed(&self) -> bool {
        self.collapsed.load(Ordering::Acquire)
    }

    /// Surface payload, present on ambiguous leaves
    #[inline]
    pub fn leaf(&self) -> Option<&LeafCell> {
        self.leaf.get()
    }

    /// Corner sample already published by this cell, if any
    pub fn published_corner(&self, corner: u8) -> Option<f32> {
        self.leaf.get().map(|l| l.corners[corner as usize])
    }

    /// Whether corner `corner` of this cell lies inside the surface.
    /// Falls back to evaluating the tape for homogeneous cells, which
    /// carry no samples.
    fn corner_inside(&self, corner: u8, eval: &FieldEvaluator, tape: &Tape) -> bool {
        match self.kind() {
            CellKind::Empty => false,
            CellKind::Filled => true,
            _ => match self.published_corner(corner) {
                Some(d) => d < 0.0,
                None => eval.point(tape, self.region.corner(corner)) < 0.0,
            },
        }
    }

    /// Corner sample of this cell, evaluating on demand for
    /// homogeneous cells.
    fn corner_value(&self, corner: u8, eval: &FieldEvaluator, tape: &Tape) -> f32 {
        match self.published_corner(corner) {
            Some(d) => d,
            None => eval.point(tape, self.region.corner(corner)),
        }
    }

    // ── Evaluation protocol ─────────────────────────────────────────

    /// Interval evaluation: classify this cell over its region and
    /// return the tape narrowed to it. Post-condition: the kind is
    /// never `Unknown`.
    pub fn eval_interval(
        &self,
        eval: &mut FieldEvaluator,
        tape: &Arc<Tape>,
        region: &Region3,
    ) -> Arc<Tape> {
        let (bounds, narrowed) = eval.interval(tape, &region.aabb());
        let kind = if bounds.is_positive() {
            CellKind::Empty
        } else if bounds.is_negative() {
            CellKind::Filled
        } else {
            CellKind::Ambiguous
        };
        self.kind.store(kind as u8, Ordering::Release);
        narrowed
    }

    /// Leaf evaluation at level 0: sample the corners (reusing
    /// neighbor samples where published), classify, and extract the
    /// hermite payload for ambiguous cells.
    pub fn eval_leaf(
        &self,
        eval: &FieldEvaluator,
        tape: &Arc<Tape>,
        region: &Region3,
        neighbors: &Neighbors,
        config: &BuildConfig,
    ) {
        debug_assert_eq!(region.level, 0);

        let mut corners = [0.0f32; 8];
        let mut mask = 0u8;
        for c in 0..8u8 {
            let d = neighbors
                .corner_sample(region.level, c)
                .unwrap_or_else(|| eval.point(tape, region.corner(c)));
            corners[c as usize] = d;
            if d < 0.0 {
                mask |= 1 << c;
            }
        }

        if mask == 0 {
            self.kind.store(CellKind::Empty as u8, Ordering::Release);
            return;
        }
        if mask == 0xff {
            self.kind.store(CellKind::Filled as u8, Ordering::Release);
            return;
        }

        let mut qef = Qef::default();
        for &(c0, c1) in &CELL_EDGES {
            let d0 = corners[c0 as usize];
            let d1 = corners[c1 as usize];
            if (d0 < 0.0) == (d1 < 0.0) {
                continue;
            }
            let p0 = region.corner(c0);
            let p1 = region.corner(c1);
            let crossing = bisect_edge(eval, tape, p0, p1, d0, d1, config.bisection_iterations);
            let normal = gradient_cd(eval, tape, crossing, config.gradient_epsilon);
            qef.add(crossing, normal);
        }

        let solution = qef.solve(region.lower, region.upper);
        let _ = self.leaf.set(LeafCell {
            corners,
            mask,
            qef,
            vertex: solution.vertex,
            normal: solution.normal,
            error: solution.error,
        });
        self.kind
            .store(CellKind::Ambiguous as u8, Ordering::Release);
    }

    /// Parent collection: called by each worker that finishes one of
    /// this cell's children. Returns `true` exactly once per parent —
    /// to the worker that completed the last outstanding child, which
    /// then performs the merge and keeps bubbling. Earlier callers get
    /// `false` and stop.
    pub fn collect_children(
        &self,
        eval: &FieldEvaluator,
        tape: &Arc<Tape>,
        region: &Region3,
        config: &BuildConfig,
    ) -> bool {
        if self.pending.fetch_sub(1, Ordering::AcqRel) != 1 {
            return false;
        }

        let children = self
            .children
            .get()
            .expect("collecting a parent without published children");

        let kinds: [CellKind; 8] = std::array::from_fn(|i| children[i].kind());
        debug_assert!(kinds.iter().all(|&k| k != CellKind::Unknown));

        if kinds.iter().all(|&k| k == CellKind::Empty) {
            self.kind.store(CellKind::Empty as u8, Ordering::Release);
            self.collapsed.store(true, Ordering::Release);
            return true;
        }
        if kinds.iter().all(|&k| k == CellKind::Filled) {
            self.kind.store(CellKind::Filled as u8, Ordering::Release);
            self.collapsed.store(true, Ordering::Release);
            return true;
        }

        // Mixed contents: try to merge the subtree into a single leaf.
        // Only when every child is itself leaf-like; a surviving branch
        // below pins the whole ancestor chain open.
        if children.iter().all(|c| c.is_leaf()) && self.merge_is_safe(children, eval, tape) {
            let mut qef = Qef::default();
            for child in children.iter() {
                if let Some(l) = child.leaf() {
                    qef.merge(&l.qef);
                }
            }
            if !qef.is_empty() {
                let solution = qef.solve(region.lower, region.upper);
                if solution.error <= config.max_err {
                    let mut corners = [0.0f32; 8];
                    let mut mask = 0u8;
                    for c in 0..8u8 {
                        let d = children[c as usize].corner_value(c, eval, tape);
                        corners[c as usize] = d;
                        if d < 0.0 {
                            mask |= 1 << c;
                        }
                    }
                    let _ = self.leaf.set(LeafCell {
                        corners,
                        mask,
                        qef,
                        vertex: solution.vertex,
                        normal: solution.normal,
                        error: solution.error,
                    });
                    self.collapsed.store(true, Ordering::Release);
                }
            }
        }

        true
    }

    /// Collapse safety: every edge of the merged cell may cross the
    /// surface at most once. The midpoint of a parent edge is a corner
    /// shared by the two children along it, so a double crossing shows
    /// up as matching end signs with a flipped midpoint.
    fn merge_is_safe(
        &self,
        children: &[Arc<Cell>; 8],
        eval: &FieldEvaluator,
        tape: &Tape,
    ) -> bool {
        for &(c0, c1) in &CELL_EDGES {
            let end0 = children[c0 as usize].corner_inside(c0, eval, tape);
            let end1 = children[c1 as usize].corner_inside(c1, eval, tape);
            let mid = children[c0 as usize].corner_inside(c1, eval, tape);
            if end0 == end1 && mid != end0 {
                return false;
            }
        }
        true
    }
}

/// Locate the surface crossing along an edge by bisection, seeded with
/// the linear estimate. Exact for fields that are linear along the
/// edge.
fn bisect_edge(
    eval: &FieldEvaluator,
    tape: &Tape,
    a: Vec3,
    b: Vec3,
    da: f32,
    db: f32,
    iterations: u32,
) -> Vec3 {
    let mut lo = a;
    let mut hi = b;
    let mut dlo = da;
    let mut dhi = db;

    for _ in 0..iterations {
        let t = dlo / (dlo - dhi);
        let mid = lo.lerp(hi, t.clamp(0.0, 1.0));
        let dm = eval.point(tape, mid);

        if dm.abs() < 1e-6 {
            return mid;
        }
        if (dlo > 0.0) == (dm > 0.0) {
            lo = mid;
            dlo = dm;
        } else {
            hi = mid;
            dhi = dm;
        }
    }

    let t = dlo / (dlo - dhi);
    lo.lerp(hi, t.clamp(0.0, 1.0))
}

/// Surface normal by central differences on the tape
fn gradient_cd(eval: &FieldEvaluator, tape: &Tape, p: Vec3, eps: f32) -> Vec3 {
    let g = Vec3::new(
        eval.point(tape, p + Vec3::X * eps) - eval.point(tape, p - Vec3::X * eps),
        eval.point(tape, p + Vec3::Y * eps) - eval.point(tape, p - Vec3::Y * eps),
        eval.point(tape, p + Vec3::Z * eps) - eval.point(tape, p - Vec3::Z * eps),
    );
    let len_sq = g.length_squared();
    if len_sq < 1e-20 {
        return Vec3::Y;
    }
    g / len_sq.sqrt()
}
