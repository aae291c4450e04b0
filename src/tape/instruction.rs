//! Instruction records for compiled field tapes
//!
//! Author: Moroya Sakamoto

use super::opcode::OpCode;
use glam::{Quat, Vec3};

/// A single instruction in the tape bytecode
///
/// Laid out for cache efficiency: 32-byte aligned, contiguous, no
/// pointers or indirection.
#[derive(Clone, Copy, Debug)]
#[repr(C, align(32))]
pub struct Instruction {
    /// Operation parameters
    /// - Primitives: dimensions (radius, half_extents, ...)
    /// - SmoothUnion: blending radius k
    /// - Transforms: offset / inverse quaternion / scale factor
    pub params: [f32; 6],

    /// The operation code
    pub opcode: OpCode,
}

impl Instruction {
    /// Create an instruction with zeroed parameters
    #[inline]
    pub fn new(opcode: OpCode) -> Self {
        Instruction {
            params: [0.0; 6],
            opcode,
        }
    }

    /// Sphere primitive
    #[inline]
    pub fn sphere(radius: f32) -> Self {
        let mut inst = Self::new(OpCode::Sphere);
        inst.params[0] = radius;
        inst
    }

    /// Box primitive
    #[inline]
    pub fn box3d(half_extents: Vec3) -> Self {
        let mut inst = Self::new(OpCode::Box3d);
        inst.params[0] = half_extents.x;
        inst.params[1] = half_extents.y;
        inst.params[2] = half_extents.z;
        inst
    }

    /// Cylinder primitive
    #[inline]
    pub fn cylinder(radius: f32, half_height: f32) -> Self {
        let mut inst = Self::new(OpCode::Cylinder);
        inst.params[0] = radius;
        inst.params[1] = half_height;
        inst
    }

    /// Torus primitive
    #[inline]
    pub fn torus(major_radius: f32, minor_radius: f32) -> Self {
        let mut inst = Self::new(OpCode::Torus);
        inst.params[0] = major_radius;
        inst.params[1] = minor_radius;
        inst
    }

    /// Half-space primitive
    #[inline]
    pub fn plane(normal: Vec3, distance: f32) -> Self {
        let mut inst = Self::new(OpCode::Plane);
        inst.params[0] = normal.x;
        inst.params[1] = normal.y;
        inst.params[2] = normal.z;
        inst.params[3] = distance;
        inst
    }

    /// Gyroid primitive
    #[inline]
    pub fn gyroid(scale: f32, thickness: f32) -> Self {
        let mut inst = Self::new(OpCode::Gyroid);
        inst.params[0] = scale;
        inst.params[1] = thickness;
        inst
    }

    /// Smooth union with blending radius `k`
    #[inline]
    pub fn smooth_union(k: f32) -> Self {
        let mut inst = Self::new(OpCode::SmoothUnion);
        inst.params[0] = k;
        inst
    }

    /// Translation frame push
    #[inline]
    pub fn translate(offset: Vec3) -> Self {
        let mut inst = Self::new(OpCode::Translate);
        inst.params[0] = offset.x;
        inst.params[1] = offset.y;
        inst.params[2] = offset.z;
        inst
    }

    /// Rotation frame push; stores the inverse quaternion so evaluation
    /// applies it directly.
    #[inline]
    pub fn rotate(rotation: Quat) -> Self {
        let inv = rotation.inverse();
        let mut inst = Self::new(OpCode::Rotate);
        inst.params[0] = inv.x;
        inst.params[1] = inv.y;
        inst.params[2] = inv.z;
        inst.params[3] = inv.w;
        inst
    }

    /// Uniform scale frame push
    #[inline]
    pub fn scale(factor: f32) -> Self {
        let mut inst = Self::new(OpCode::Scale);
        inst.params[0] = factor;
        inst
    }

    /// End-of-program marker
    #[inline]
    pub fn end() -> Self {
        Self::new(OpCode::End)
    }

    /// Offset parameters as a vector (Translate)
    #[inline]
    pub fn param_vec3(&self) -> Vec3 {
        Vec3::new(self.params[0], self.params[1], self.params[2])
    }

    /// Quaternion parameters (Rotate; already inverted)
    #[inline]
    pub fn param_quat(&self) -> Quat {
        Quat::from_xyzw(self.params[0], self.params[1], self.params[2], self.params[3])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instruction_size() {
        assert_eq!(std::mem::size_of::<Instruction>(), 32);
    }

    #[test]
    fn test_rotate_stores_inverse() {
        let q = Quat::from_rotation_y(0.5);
        let inst = Instruction::rotate(q);
        let stored = inst.param_quat();
        let p = Vec3::new(1.0, 2.0, 3.0);
        let expected = q.inverse() * p;
        assert!((stored * p - expected).length() < 1e-6);
    }
}
