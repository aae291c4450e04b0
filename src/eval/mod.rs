//! Interpreted evaluation of field expression trees
//!
//! Walks the `SdfNode` tree directly. The octree builder runs on
//! compiled tapes instead (see [`crate::tape`]); the interpreted path
//! stays as the reference implementation the tape evaluator is checked
//! against, and for one-off queries where compilation isn't worth it.
//!
//! Author: Moroya Sakamoto

pub mod primitives;

use crate::types::SdfNode;
use glam::Vec3;
use primitives::*;

/// Evaluate a field expression at a single point
///
/// Recursively traverses the tree and computes the signed distance.
/// Marked `#[inline]` to encourage the compiler to flatten small trees.
#[inline]
pub fn eval(node: &SdfNode, point: Vec3) -> f32 {
    match node {
        // === Primitives ===
        SdfNode::Sphere { radius } => sphere_distance(point, *radius),
        SdfNode::Box3d { half_extents } => box_distance(point, *half_extents),
        SdfNode::Cylinder {
            radius,
            half_height,
        } => cylinder_distance(point, *radius, *half_height),
        SdfNode::Torus {
            major_radius,
            minor_radius,
        } => torus_distance(point, *major_radius, *minor_radius),
        SdfNode::Plane { normal, distance } => plane_distance(point, *normal, *distance),
        SdfNode::Gyroid { scale, thickness } => gyroid_distance(point, *scale, *thickness),

        // === Operations ===
        SdfNode::Union { a, b } => eval(a, point).min(eval(b, point)),
        SdfNode::Intersection { a, b } => eval(a, point).max(eval(b, point)),
        SdfNode::Subtraction { a, b } => eval(a, point).max(-eval(b, point)),
        SdfNode::SmoothUnion { a, b, k } => smooth_min(eval(a, point), eval(b, point), *k),

        // === Transforms ===
        SdfNode::Translate { child, offset } => eval(child, point - *offset),
        SdfNode::Rotate { child, rotation } => eval(child, rotation.inverse() * point),
        SdfNode::Scale { child, factor } => eval(child, point / *factor) * *factor,
    }
}

/// Surface normal via central differences
///
/// Returns a unit vector, or `Vec3::Y` when the gradient is degenerate
/// (e.g. exactly at a medial-axis point).
pub fn normal(node: &SdfNode, point: Vec3, epsilon: f32) -> Vec3 {
    let ex = Vec3::new(epsilon, 0.0, 0.0);
    let ey = Vec3::new(0.0, epsilon, 0.0);
    let ez = Vec3::new(0.0, 0.0, epsilon);

    let grad = Vec3::new(
        eval(node, point + ex) - eval(node, point - ex),
        eval(node, point + ey) - eval(node, point - ey),
        eval(node, point + ez) - eval(node, point - ez),
    );

    let len_sq = grad.length_squared();
    if len_sq < 1e-20 {
        return Vec3::Y;
    }
    grad / len_sq.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eval_translated_sphere() {
        let shape = SdfNode::sphere(1.0).translate(2.0, 0.0, 0.0);
        assert!(eval(&shape, Vec3::new(2.0, 0.0, 0.0)) < 0.0);
        assert!(eval(&shape, Vec3::ZERO) > 0.0);
    }

    #[test]
    fn test_eval_scaled_sphere_keeps_metric() {
        let shape = SdfNode::sphere(1.0).scale(2.0);
        // Scaled sphere has radius 2; distance at x=3 is 1
        assert!((eval(&shape, Vec3::new(3.0, 0.0, 0.0)) - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_eval_csg() {
        let shape = SdfNode::sphere(1.0).subtract(SdfNode::box3d(1.0, 1.0, 1.0));
        // Origin is carved out by the box
        assert!(eval(&shape, Vec3::ZERO) > 0.0);
    }

    #[test]
    fn test_normal_points_outward_on_sphere() {
        let shape = SdfNode::sphere(1.0);
        let n = normal(&shape, Vec3::new(0.0, 1.0, 0.0), 1e-3);
        assert!(n.dot(Vec3::Y) > 0.99);
    }

    #[test]
    fn test_rotated_box_surface() {
        let shape = SdfNode::box3d(2.0, 2.0, 2.0).rotate_euler(0.0, std::f32::consts::FRAC_PI_4, 0.0);
        // Rotation about Y: corner moves onto the X axis at sqrt(2)
        let d = eval(&shape, Vec3::new(2.0_f32.sqrt(), 0.0, 0.0));
        assert!(d.abs() < 1e-3);
    }
}
