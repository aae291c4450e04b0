//! Compiled field tapes
//!
//! A tape is an immutable, reference-counted snapshot of the field
//! program: a flat postfix instruction stream plus the region it is
//! valid over. Interval evaluation can *narrow* a tape — prove that one
//! side of a min/max never wins inside a sub-region and elide that whole
//! subtree — producing a shorter child tape linked back to its parent.
//! Walking back up the octree, [`Tape::get_base`] recovers the nearest
//! ancestor tape that is valid over the wider region.
//!
//! Author: Moroya Sakamoto

mod compiler;
mod eval;
mod instruction;
mod opcode;

pub use compiler::{CompileError, MAX_COORD_STACK, MAX_VALUE_STACK};
pub use eval::{eval_point, FieldEvaluator};
pub use instruction::Instruction;
pub use opcode::OpCode;

use crate::types::{Aabb, SdfNode};
use std::sync::Arc;

/// Relative tolerance for tape validity checks, absorbing the
/// floating-point drift of reconstructing parent regions.
const BOUNDS_EPS: f32 = 1e-4;

/// An immutable compiled field program
///
/// Shared by reference count between workers; narrowing produces new
/// tapes rather than mutating existing ones.
#[derive(Debug)]
pub struct Tape {
    instructions: Vec<Instruction>,
    bounds: Aabb,
    parent: Option<Arc<Tape>>,
}

impl Tape {
    /// Compile an expression tree into a root tape, valid everywhere.
    ///
    /// # Panics
    ///
    /// Panics if the tree is too deep for the fixed evaluation stacks.
    /// Use [`try_compile`](Self::try_compile) for a non-panicking
    /// alternative.
    pub fn compile(node: &SdfNode) -> Arc<Tape> {
        Self::try_compile(node).expect("Tape::compile() failed: expression too deep")
    }

    /// Compile an expression tree, returning an error on failure.
    pub fn try_compile(node: &SdfNode) -> Result<Arc<Tape>, CompileError> {
        let instructions = compiler::compile_program(node)?;
        Ok(Arc::new(Tape {
            instructions,
            bounds: Aabb::EVERYTHING,
            parent: None,
        }))
    }

    /// Construct a narrowed child tape (internal; used by interval
    /// evaluation).
    fn narrowed(parent: &Arc<Tape>, instructions: Vec<Instruction>, bounds: Aabb) -> Arc<Tape> {
        Arc::new(Tape {
            instructions,
            bounds,
            parent: Some(parent.clone()),
        })
    }

    /// The instruction stream
    #[inline]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Number of instructions (including the End marker)
    #[inline]
    pub fn instruction_count(&self) -> usize {
        self.instructions.len()
    }

    /// Region this tape is valid over
    #[inline]
    pub fn bounds(&self) -> &Aabb {
        &self.bounds
    }

    /// True for the un-narrowed root program
    #[inline]
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Widest-scope ancestor lookup: returns the nearest tape in the
    /// parent chain (starting from `tape` itself) whose validity region
    /// contains `region`. The root tape terminates the walk — it is
    /// valid everywhere.
    pub fn get_base(tape: &Arc<Tape>, region: &Aabb) -> Arc<Tape> {
        let mut current = tape;
        while let Some(parent) = &current.parent {
            if current.bounds.contains_aabb(region, BOUNDS_EPS) {
                break;
            }
            current = parent;
        }
        current.clone()
    }
}
