//! Parallel adaptive octree construction
//!
//! The engine at the heart of ALICE-Mesh: a worker pool that classifies
//! an implicit field over an axis-aligned region with interval
//! arithmetic, subdivides ambiguous cells through a lock-free bounded
//! task ring (overflowing to per-thread stacks), merges completed
//! subtrees on the way back up, reports monotone progress, and is
//! cooperatively cancellable. The finished [`Root`] feeds the dual-walk
//! mesher in [`crate::mesh`].
//!
//! ```rust
//! use alice_mesh::octree::{build, BuildConfig, Region3};
//! use alice_mesh::SdfNode;
//! use glam::Vec3;
//!
//! let shape = SdfNode::sphere(0.6);
//! let region = Region3::from_bounds(Vec3::splat(-1.0), Vec3::splat(1.0));
//! let root = build(&shape, region, &BuildConfig::default());
//! assert!(!root.is_empty());
//! ```
//!
//! Author: Moroya Sakamoto

pub mod cell;
pub mod neighbors;
pub mod pool;
pub mod progress;
pub mod queue;
pub mod region;
pub mod worker;

pub use cell::{Cell, CellKind, LeafCell};
pub use neighbors::Neighbors;
pub use pool::{BuildStats, CellPool, Root};
pub use progress::{subtree_ticks, ProgressCallback, ProgressHandler, ProgressWatcher};
pub use queue::TaskRing;
pub use region::Region3;
pub use worker::{
    build, build_cancellable, build_with_evaluators, make_evaluators, try_build, BuildConfig,
    FreeThreadHandler,
};
