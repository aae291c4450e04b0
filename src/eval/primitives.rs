//! Distance functions for the primitive field shapes
//!
//! Every primitive lives in its own local frame centered at the
//! origin; transforms reposition the evaluation point rather than the
//! shape. Negative means inside, so the surface is the zero crossing.
//!
//! The box-like shapes all follow the same split: measure how far the
//! point overshoots each constraint, take the Euclidean norm of the
//! positive overshoots for the exterior, and the least-violated
//! constraint for the interior.
//!
//! Author: Moroya Sakamoto

use glam::Vec3;

/// Signed distance to a sphere of the given radius
#[inline(always)]
pub fn sphere_distance(p: Vec3, radius: f32) -> f32 {
    p.length() - radius
}

/// Signed distance to an axis-aligned box
#[inline(always)]
pub fn box_distance(p: Vec3, half_extents: Vec3) -> f32 {
    // Per-axis overshoot beyond the half extents
    let excess = p.abs() - half_extents;
    let exterior = excess.max(Vec3::ZERO).length();
    let interior = excess.max_element().min(0.0);
    exterior + interior
}

/// Signed distance to a Y-axis cylinder
///
/// Two independent overshoots (radial in the XZ plane, axial along Y)
/// combined like a 2-D box.
#[inline(always)]
pub fn cylinder_distance(p: Vec3, radius: f32, half_height: f32) -> f32 {
    let radial = (p.x * p.x + p.z * p.z).sqrt() - radius;
    let axial = p.y.abs() - half_height;
    let er = radial.max(0.0);
    let ea = axial.max(0.0);
    (er * er + ea * ea).sqrt() + radial.max(axial).min(0.0)
}

/// Signed distance to a torus lying in the XZ plane
///
/// Distance from the ring center-line, minus the tube radius.
#[inline(always)]
pub fn torus_distance(p: Vec3, major_radius: f32, minor_radius: f32) -> f32 {
    let ring = (p.x * p.x + p.z * p.z).sqrt() - major_radius;
    (ring * ring + p.y * p.y).sqrt() - minor_radius
}

/// Signed distance to the half-space behind an oriented plane
#[inline(always)]
pub fn plane_distance(p: Vec3, normal: Vec3, offset: f32) -> f32 {
    normal.dot(p) - offset
}

/// Approximate signed distance to a gyroid shell
///
/// The implicit level of the triply periodic surface, rescaled to
/// world units and thickened into a shell.
#[inline(always)]
pub fn gyroid_distance(p: Vec3, scale: f32, thickness: f32) -> f32 {
    let (sx, cx) = (p.x * scale).sin_cos();
    let (sy, cy) = (p.y * scale).sin_cos();
    let (sz, cz) = (p.z * scale).sin_cos();
    let level = sx * cy + sy * cz + sz * cx;
    level.abs() / scale - thickness
}

/// Polynomial smooth minimum
///
/// Piecewise form of the quadratic blend: outside the blending band
/// the plain winner is returned exactly (the tape narrower relies on
/// this), inside it the two branches are interpolated with a bump of
/// depth `k/4` at the midpoint.
#[inline(always)]
pub fn smooth_min(a: f32, b: f32, k: f32) -> f32 {
    if k <= 0.0 {
        return a.min(b);
    }
    let h = 0.5 + 0.5 * (b - a) / k;
    if h <= 0.0 {
        b
    } else if h >= 1.0 {
        a
    } else {
        b + (a - b) * h - k * h * (1.0 - h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sphere_signs() {
        assert!((sphere_distance(Vec3::ZERO, 1.0) + 1.0).abs() < 1e-4);
        assert!(sphere_distance(Vec3::new(1.0, 0.0, 0.0), 1.0).abs() < 1e-4);
        assert!((sphere_distance(Vec3::new(2.0, 0.0, 0.0), 1.0) - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_box_face_and_interior() {
        let d = box_distance(Vec3::new(2.0, 0.0, 0.0), Vec3::ONE);
        assert!((d - 1.0).abs() < 1e-4);
        let inside = box_distance(Vec3::new(0.5, 0.0, 0.0), Vec3::ONE);
        assert!((inside + 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_box_corner_is_euclidean() {
        let d = box_distance(Vec3::splat(2.0), Vec3::ONE);
        assert!((d - 3.0_f32.sqrt()).abs() < 1e-4);
    }

    #[test]
    fn test_cylinder_cap_and_side() {
        // Directly above the cap
        let d = cylinder_distance(Vec3::new(0.0, 2.0, 0.0), 1.0, 1.0);
        assert!((d - 1.0).abs() < 1e-4);
        // Beside the wall
        let d = cylinder_distance(Vec3::new(3.0, 0.0, 0.0), 1.0, 1.0);
        assert!((d - 2.0).abs() < 1e-4);
    }

    #[test]
    fn test_torus_ring() {
        // On the ring center-line: one tube radius inside
        let d = torus_distance(Vec3::new(1.0, 0.0, 0.0), 1.0, 0.3);
        assert!((d + 0.3).abs() < 1e-4);
    }

    #[test]
    fn test_plane_half_space() {
        let d = plane_distance(Vec3::new(0.0, 2.0, 0.0), Vec3::Y, 0.5);
        assert!((d - 1.5).abs() < 1e-4);
    }

    #[test]
    fn test_gyroid_on_axis() {
        // At (PI/2, 0, 0) the gyroid level evaluates to 1
        let d = gyroid_distance(Vec3::new(std::f32::consts::FRAC_PI_2, 0.0, 0.0), 1.0, 0.5);
        assert!((d - 0.5).abs() < 0.01);
    }

    #[test]
    fn test_smooth_min_outside_band_is_exact() {
        assert_eq!(smooth_min(0.0, 10.0, 0.5), 0.0);
        assert_eq!(smooth_min(10.0, -3.0, 0.5), -3.0);
    }

    #[test]
    fn test_smooth_min_midpoint_depth() {
        // Equal inputs sit at the center of the band: depth k/4
        assert!((smooth_min(1.0, 1.0, 1.0) - 0.75).abs() < 1e-6);
        // Inside the band the blend undercuts the plain minimum
        assert!(smooth_min(0.1, 0.12, 0.5) < 0.1);
    }
}
