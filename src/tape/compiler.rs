//! Compiler: SdfNode tree → flat tape bytecode
//!
//! Converts the recursive Arc-based expression tree into a postfix
//! instruction array for cache-efficient, recursion-free evaluation.
//! Transforms compile to a frame push, the child program, and a
//! `PopTransform`.
//!
//! Author: Moroya Sakamoto

use super::instruction::Instruction;
use crate::types::SdfNode;

/// Maximum depth of the value stack during evaluation
pub const MAX_VALUE_STACK: usize = 64;
/// Maximum nesting of coordinate transforms
pub const MAX_COORD_STACK: usize = 32;

/// Error type for tape compilation failures.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    /// The expression tree is too deep for the fixed evaluation stacks.
    #[error("expression requires stack depth {required} but maximum is {limit} ({kind} stack)")]
    StackOverflow {
        /// Kind of stack that overflows ("value" or "coordinate")
        kind: &'static str,
        /// Required depth
        required: usize,
        /// Maximum allowed depth
        limit: usize,
    },
}

/// Compile an expression tree into a postfix instruction vector.
pub(super) fn compile_program(node: &SdfNode) -> Result<Vec<Instruction>, CompileError> {
    let (value_depth, coord_depth) = stack_depths(node);
    if value_depth > MAX_VALUE_STACK {
        return Err(CompileError::StackOverflow {
            kind: "value",
            required: value_depth,
            limit: MAX_VALUE_STACK,
        });
    }
    if coord_depth > MAX_COORD_STACK {
        return Err(CompileError::StackOverflow {
            kind: "coordinate",
            required: coord_depth,
            limit: MAX_COORD_STACK,
        });
    }

    let mut instructions = Vec::with_capacity(node.node_count() as usize * 2 + 1);
    compile_node(node, &mut instructions);
    instructions.push(Instruction::end());
    Ok(instructions)
}

/// Emit instructions for a single node (recursive, postfix for values)
fn compile_node(node: &SdfNode, out: &mut Vec<Instruction>) {
    match node {
        // === Primitives ===
        SdfNode::Sphere { radius } => out.push(Instruction::sphere(*radius)),
        SdfNode::Box3d { half_extents } => out.push(Instruction::box3d(*half_extents)),
        SdfNode::Cylinder {
            radius,
            half_height,
        } => out.push(Instruction::cylinder(*radius, *half_height)),
        SdfNode::Torus {
            major_radius,
            minor_radius,
        } => out.push(Instruction::torus(*major_radius, *minor_radius)),
        SdfNode::Plane { normal, distance } => out.push(Instruction::plane(*normal, *distance)),
        SdfNode::Gyroid { scale, thickness } => out.push(Instruction::gyroid(*scale, *thickness)),

        // === Operations: operands first, operator last ===
        SdfNode::Union { a, b } => {
            compile_node(a, out);
            compile_node(b, out);
            out.push(Instruction::new(super::OpCode::Union));
        }
        SdfNode::Intersection { a, b } => {
            compile_node(a, out);
            compile_node(b, out);
            out.push(Instruction::new(super::OpCode::Intersection));
        }
        SdfNode::Subtraction { a, b } => {
            compile_node(a, out);
            compile_node(b, out);
            out.push(Instruction::new(super::OpCode::Subtraction));
        }
        SdfNode::SmoothUnion { a, b, k } => {
            compile_node(a, out);
            compile_node(b, out);
            out.push(Instruction::smooth_union(*k));
        }

        // === Transforms: frame push, child, frame pop ===
        SdfNode::Translate { child, offset } => {
            out.push(Instruction::translate(*offset));
            compile_node(child, out);
            out.push(Instruction::new(super::OpCode::PopTransform));
        }
        SdfNode::Rotate { child, rotation } => {
            out.push(Instruction::rotate(*rotation));
            compile_node(child, out);
            out.push(Instruction::new(super::OpCode::PopTransform));
        }
        SdfNode::Scale { child, factor } => {
            out.push(Instruction::scale(*factor));
            compile_node(child, out);
            out.push(Instruction::new(super::OpCode::PopTransform));
        }
    }
}

/// Maximum (value, coordinate) stack depths needed to run this subtree
fn stack_depths(node: &SdfNode) -> (usize, usize) {
    match node {
        SdfNode::Sphere { .. }
        | SdfNode::Box3d { .. }
        | SdfNode::Cylinder { .. }
        | SdfNode::Torus { .. }
        | SdfNode::Plane { .. }
        | SdfNode::Gyroid { .. } => (1, 0),

        SdfNode::Union { a, b }
        | SdfNode::Intersection { a, b }
        | SdfNode::Subtraction { a, b }
        | SdfNode::SmoothUnion { a, b, .. } => {
            let (va, ca) = stack_depths(a);
            let (vb, cb) = stack_depths(b);
            // While b evaluates, a's result occupies one slot
            (va.max(vb + 1), ca.max(cb))
        }

        SdfNode::Translate { child, .. }
        | SdfNode::Rotate { child, .. }
        | SdfNode::Scale { child, .. } => {
            let (v, c) = stack_depths(child);
            (v, c + 1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tape::OpCode;

    #[test]
    fn test_postfix_layout() {
        let shape = SdfNode::sphere(1.0).union(SdfNode::box3d(1.0, 1.0, 1.0));
        let program = compile_program(&shape).unwrap();
        let ops: Vec<OpCode> = program.iter().map(|i| i.opcode).collect();
        assert_eq!(
            ops,
            vec![OpCode::Sphere, OpCode::Box3d, OpCode::Union, OpCode::End]
        );
    }

    #[test]
    fn test_transform_brackets_child() {
        let shape = SdfNode::sphere(1.0).translate(1.0, 0.0, 0.0);
        let program = compile_program(&shape).unwrap();
        let ops: Vec<OpCode> = program.iter().map(|i| i.opcode).collect();
        assert_eq!(
            ops,
            vec![
                OpCode::Translate,
                OpCode::Sphere,
                OpCode::PopTransform,
                OpCode::End
            ]
        );
    }

    #[test]
    fn test_deep_tree_overflows() {
        let mut shape = SdfNode::sphere(1.0);
        for _ in 0..(MAX_COORD_STACK + 1) {
            shape = shape.translate(0.1, 0.0, 0.0);
        }
        assert!(matches!(
            compile_program(&shape),
            Err(CompileError::StackOverflow {
                kind: "coordinate",
                ..
            })
        ));
    }

    #[test]
    fn test_value_depth_right_leaning_chain() {
        // Right-leaning union chain needs one extra slot per level
        let mut shape = SdfNode::sphere(1.0);
        for i in 0..10 {
            shape = SdfNode::sphere(1.0 + i as f32).union(shape);
        }
        let (v, c) = stack_depths(&shape);
        assert_eq!(c, 0);
        assert!(v >= 2);
        assert!(compile_program(&shape).is_ok());
    }
}
