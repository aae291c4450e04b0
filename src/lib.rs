//! # ALICE-Mesh
//!
//! **A.L.I.C.E. - Adaptive Lattice Isosurface Cell Extraction**
//!
//! A parallel adaptive meshing engine for implicit fields: an octree of
//! the signed-distance field is built by a worker pool with interval
//! arithmetic and compiled-tape narrowing, homogeneous subtrees are
//! collapsed on the way back up, and a dual walk turns the finished
//! tree into a triangle mesh suitable for downstream CAD use.
//!
//! ## Features
//!
//! - **Expressions**: sphere, box, cylinder, torus, plane, gyroid;
//!   CSG operations and transforms
//! - **Compiled tapes**: flat bytecode with region-narrowing interval
//!   evaluation
//! - **Parallel build**: lock-free bounded task ring, per-thread cell
//!   pools, atomic parent collection
//! - **Progress**: strictly monotone callback with cooperative
//!   cancellation
//! - **Meshing**: octree dual contouring with QEF vertex placement
//!
//! ## Example
//!
//! ```rust
//! use alice_mesh::prelude::*;
//!
//! // A sphere with a box carved out
//! let shape = SdfNode::sphere(1.0).subtract(SdfNode::box3d(1.5, 1.5, 1.5));
//!
//! // Mesh it over [-2, 2]^3
//! let region = Region3::from_bounds(Vec3::splat(-2.0), Vec3::splat(2.0));
//! let config = BuildConfig {
//!     min_feature: 0.1,
//!     ..Default::default()
//! };
//! let mesh = adaptive_mesh(&shape, region, &config);
//! assert!(mesh.triangle_count() > 0);
//! ```
//!
//! ## Author
//!
//! Moroya Sakamoto

#![warn(missing_docs)]

pub mod eval;
pub mod interval;
pub mod mesh;
pub mod octree;
pub mod tape;
pub mod types;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude - commonly used types and functions
pub mod prelude {
    pub use crate::eval::{eval, normal};
    pub use crate::interval::{Interval, Vec3Interval};
    pub use crate::mesh::{
        adaptive_mesh, adaptive_mesh_with, dual_walk, Mesh, Qef, QefSolution, Vertex,
    };
    pub use crate::octree::{
        build, build_cancellable, build_with_evaluators, make_evaluators, subtree_ticks,
        try_build, BuildConfig, BuildStats, Cell, CellKind, LeafCell, Neighbors,
        ProgressCallback, ProgressHandler, Region3, Root,
    };
    pub use crate::tape::{CompileError, FieldEvaluator, Tape};
    pub use crate::types::{Aabb, SdfNode};
    pub use glam::{Quat, Vec3};
}

// Re-exports for convenience
pub use mesh::{adaptive_mesh, Mesh};
pub use octree::{build, BuildConfig, Region3, Root};
pub use tape::Tape;
pub use types::SdfNode;
