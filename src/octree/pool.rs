//! Thread-local cell pools and the shared build root
//!
//! Every worker allocates cells from its own pool; no locking on the
//! hot path. When a worker exits, its pool is claimed into the `Root`
//! under a single mutex, which then owns every cell for the rest of its
//! lifetime. An empty root is the cancellation signal.
//!
//! Author: Moroya Sakamoto

use super::cell::Cell;
use super::region::Region3;
use std::sync::Arc;

/// Thread-local arena of cells
#[derive(Default)]
pub struct CellPool {
    cells: Vec<Arc<Cell>>,
}

impl CellPool {
    /// Create an empty pool
    pub fn new() -> Self {
        CellPool {
            cells: Vec::with_capacity(256),
        }
    }

    /// Allocate a child cell, recording it in this pool
    pub fn alloc(&mut self, parent: &Arc<Cell>, parent_index: u8, region: Region3) -> Arc<Cell> {
        let cell = Cell::new_child(parent, parent_index, region);
        self.cells.push(cell.clone());
        cell
    }

    /// Number of cells allocated from this pool
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// True when nothing has been allocated
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Cells allocated from this pool
    pub fn cells(&self) -> &[Arc<Cell>] {
        &self.cells
    }
}

/// Aggregate statistics of a completed build
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildStats {
    /// Total cells in the tree (including the root)
    pub cell_count: usize,
    /// Cells behaving as leaves (never subdivided, or merged)
    pub leaf_count: usize,
    /// Cells with live children
    pub branch_count: usize,
    /// Cells whose subtree was merged back into them
    pub collapsed_count: usize,
    /// Progress ticks emitted during the build
    pub ticks_emitted: u64,
    /// Precomputed tick budget for the root level
    pub ticks_total: u64,
}

/// Owner of a finished octree: the root cell plus every per-worker
/// pool claimed at thread exit.
#[derive(Default)]
pub struct Root {
    cell: Option<Arc<Cell>>,
    pools: Vec<CellPool>,
    stats: BuildStats,
}

impl Root {
    /// Assemble a completed root
    pub(crate) fn assemble(cell: Arc<Cell>, pools: Vec<CellPool>, stats: BuildStats) -> Self {
        Root {
            cell: Some(cell),
            pools,
            stats,
        }
    }

    /// The empty root produced by a cancelled build
    pub fn empty() -> Self {
        Root::default()
    }

    /// True for the result of a cancelled build
    pub fn is_empty(&self) -> bool {
        self.cell.is_none()
    }

    /// The root cell, unless cancelled
    pub fn cell(&self) -> Option<&Arc<Cell>> {
        self.cell.as_ref()
    }

    /// Build statistics
    pub fn stats(&self) -> &BuildStats {
        &self.stats
    }

    /// Total number of cells owned (root included)
    pub fn cell_count(&self) -> usize {
        if self.cell.is_none() {
            return 0;
        }
        1 + self.pools.iter().map(CellPool::len).sum::<usize>()
    }

    /// Iterate over every owned cell, root first
    pub fn iter_cells(&self) -> impl Iterator<Item = &Arc<Cell>> {
        self.cell
            .iter()
            .chain(self.pools.iter().flat_map(|p| p.cells().iter()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_pool_alloc_records_cells() {
        let region = Region3::new(Vec3::splat(-1.0), Vec3::splat(1.0), 2);
        let root = Cell::new_root(region);
        let mut pool = CellPool::new();
        let regions = region.subdivide();
        for (i, r) in regions.iter().enumerate() {
            pool.alloc(&root, i as u8, *r);
        }
        assert_eq!(pool.len(), 8);
    }

    #[test]
    fn test_empty_root_signals_cancellation() {
        let root = Root::empty();
        assert!(root.is_empty());
        assert!(root.cell().is_none());
        assert_eq!(root.cell_count(), 0);
    }

    #[test]
    fn test_assembled_root_owns_cells() {
        let region = Region3::new(Vec3::splat(0.0), Vec3::splat(1.0), 1);
        let root_cell = Cell::new_root(region);
        let mut pool = CellPool::new();
        for (i, r) in region.subdivide().iter().enumerate() {
            pool.alloc(&root_cell, i as u8, *r);
        }
        let root = Root::assemble(root_cell, vec![pool], BuildStats::default());
        assert_eq!(root.cell_count(), 9);
        assert_eq!(root.iter_cells().count(), 9);
    }
}
