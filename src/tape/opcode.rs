//! OpCode definitions for compiled field tapes
//!
//! Author: Moroya Sakamoto

/// Operation codes for the field virtual machine
///
/// Each opcode is either a primitive (pushes a distance to the value
/// stack), a binary operation (pops two, pushes one), or a transform
/// (pushes a coordinate frame undone by `PopTransform`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    // === Primitives (push distance to stack) ===
    /// Sphere: params[0] = radius
    Sphere = 0,
    /// Box3d: params[0..3] = half_extents
    Box3d = 1,
    /// Cylinder: params[0] = radius, params[1] = half_height
    Cylinder = 2,
    /// Torus: params[0] = major_radius, params[1] = minor_radius
    Torus = 3,
    /// Plane: params[0..3] = normal, params[3] = distance
    Plane = 4,
    /// Gyroid: params[0] = scale, params[1] = thickness
    Gyroid = 5,

    // === Binary operations (pop 2, push 1) ===
    /// Union: min(a, b)
    Union = 16,
    /// Intersection: max(a, b)
    Intersection = 17,
    /// Subtraction: max(a, -b)
    Subtraction = 18,
    /// SmoothUnion: params[0] = k
    SmoothUnion = 19,

    // === Transforms (push coordinate frame) ===
    /// Translate: params[0..3] = offset
    Translate = 32,
    /// Rotate: params[0..4] = inverse rotation quaternion
    Rotate = 33,
    /// Scale: params[0] = uniform factor
    Scale = 34,

    // === Control ===
    /// Pop the innermost coordinate frame
    PopTransform = 240,
    /// End of program
    End = 255,
}

impl OpCode {
    /// True if this opcode pushes a primitive distance
    #[inline]
    pub fn is_primitive(self) -> bool {
        (self as u8) < 16
    }

    /// True if this opcode pops two values and pushes one
    #[inline]
    pub fn is_binary_op(self) -> bool {
        let v = self as u8;
        (16..32).contains(&v)
    }

    /// True if this opcode pushes a coordinate frame
    #[inline]
    pub fn is_transform(self) -> bool {
        let v = self as u8;
        (32..48).contains(&v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(OpCode::Sphere.is_primitive());
        assert!(OpCode::Gyroid.is_primitive());
        assert!(OpCode::Union.is_binary_op());
        assert!(OpCode::SmoothUnion.is_binary_op());
        assert!(OpCode::Translate.is_transform());
        assert!(!OpCode::PopTransform.is_transform());
        assert!(!OpCode::End.is_primitive());
    }
}
