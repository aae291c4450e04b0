//! Common test helpers for ALICE-Mesh integration tests
//!
//! Author: Moroya Sakamoto

#![allow(dead_code)]

use alice_mesh::prelude::*;

// ============================================================================
// Standard test shapes
// ============================================================================

/// Sphere of radius 0.5 at the origin
pub fn test_sphere() -> SdfNode {
    SdfNode::sphere(0.5)
}

/// Axis-aligned cube `max(|x|,|y|,|z|) <= 1.5`, written as the
/// intersection of six half-spaces so narrowing has real work to do
pub fn test_cube() -> SdfNode {
    let planes = [
        (Vec3::X, 1.5),
        (Vec3::NEG_X, 1.5),
        (Vec3::Y, 1.5),
        (Vec3::NEG_Y, 1.5),
        (Vec3::Z, 1.5),
        (Vec3::NEG_Z, 1.5),
    ];
    let mut shape = SdfNode::plane(planes[0].0, planes[0].1);
    for &(n, d) in &planes[1..] {
        shape = shape.intersection(SdfNode::plane(n, d));
    }
    shape
}

/// Rectangular prism `[0,4] x [0,1] x [0,0.25]` from six half-spaces
pub fn test_prism() -> SdfNode {
    let planes = [
        (Vec3::NEG_X, 0.0),
        (Vec3::X, 4.0),
        (Vec3::NEG_Y, 0.0),
        (Vec3::Y, 1.0),
        (Vec3::NEG_Z, 0.0),
        (Vec3::Z, 0.25),
    ];
    let mut shape = SdfNode::plane(planes[0].0, planes[0].1);
    for &(n, d) in &planes[1..] {
        shape = shape.intersection(SdfNode::plane(n, d));
    }
    shape
}

/// Sphere poking through the top of a thin box, meeting at z = 0.1
pub fn test_sphere_on_box() -> SdfNode {
    let sphere = SdfNode::sphere(0.7).translate(0.0, 0.0, 0.1);
    // Box spanning [-1,1] x [-1,1] x [-1,0.1]
    let slab = SdfNode::box3d(2.0, 2.0, 1.1).translate(0.0, 0.0, -0.45);
    sphere.union(slab)
}

/// Gyroid shell clipped to a sphere
pub fn test_sphere_gyroid() -> SdfNode {
    SdfNode::gyroid(2.0, 0.1).intersection(SdfNode::sphere(1.5))
}

// ============================================================================
// Tree inspection
// ============================================================================

/// Structural signature of a finished tree: preorder (level, kind,
/// collapsed, corner mask, vertex bits). Two identical builds must
/// produce identical signatures bit for bit.
pub fn tree_signature(root: &Root) -> Vec<(u32, u8, bool, u8, [u32; 3])> {
    let mut out = Vec::new();
    if let Some(cell) = root.cell() {
        signature_rec(cell, &mut out);
    }
    out
}

fn signature_rec(cell: &std::sync::Arc<Cell>, out: &mut Vec<(u32, u8, bool, u8, [u32; 3])>) {
    let (mask, vertex) = match cell.leaf() {
        Some(leaf) => (
            leaf.mask,
            [
                leaf.vertex.x.to_bits(),
                leaf.vertex.y.to_bits(),
                leaf.vertex.z.to_bits(),
            ],
        ),
        None => (0, [0; 3]),
    };
    out.push((
        cell.region().level,
        cell.kind() as u8,
        cell.is_collapsed(),
        mask,
        vertex,
    ));
    if let Some(children) = cell.children() {
        for child in children {
            signature_rec(child, out);
        }
    }
}

/// Walk every cell of the tree, failing on any structural invariant
/// violation. Returns the number of cells visited.
pub fn check_tree_invariants(root: &Root) -> usize {
    let mut count = 0;
    for cell in root.iter_cells() {
        count += 1;
        assert_ne!(
            cell.kind(),
            CellKind::Unknown,
            "no cell may remain unclassified"
        );
        if cell.is_branch() {
            assert_eq!(
                cell.kind(),
                CellKind::Ambiguous,
                "only ambiguous cells keep live children"
            );
            assert!(cell.region().level > 0, "leaf-level cells cannot subdivide");
        }
        if cell.kind() == CellKind::Ambiguous && cell.is_leaf() {
            assert!(
                cell.leaf().is_some(),
                "ambiguous leaves carry a surface payload"
            );
        }
    }
    count
}
