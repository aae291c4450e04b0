//! Stack-machine evaluation of compiled tapes
//!
//! Two evaluators share the instruction format:
//!
//! - [`eval_point`]: plain `f32` evaluation, used for corner sampling,
//!   edge bisection, and gradient estimation.
//! - [`FieldEvaluator::interval`]: conservative interval evaluation over
//!   a box, which simultaneously classifies the region and *narrows*
//!   the tape by eliding subtrees that provably never win a min/max
//!   inside it.
//!
//! Narrowing tracks, per value-stack slot, the instruction range that
//! produced it. When an operand loses for the whole region, its range
//! (plus the operator) is marked dead and skipped when the child tape is
//! assembled. Elision is exact: a pruned branch never influences the
//! result anywhere in the region, so point evaluation of the narrowed
//! tape matches the original bit for bit.
//!
//! Author: Moroya Sakamoto

use super::compiler::{MAX_COORD_STACK, MAX_VALUE_STACK};
use super::instruction::Instruction;
use super::opcode::OpCode;
use super::Tape;
use crate::eval::primitives::*;
use crate::interval::{Interval, Vec3Interval};
use crate::types::{Aabb, SdfNode};
use glam::Vec3;
use std::sync::Arc;

// ── Point evaluation ────────────────────────────────────────────────

/// Coordinate frame on the point-evaluation transform stack
#[derive(Clone, Copy)]
struct CoordFrame {
    point: Vec3,
    scale_correction: f32,
}

impl Default for CoordFrame {
    fn default() -> Self {
        CoordFrame {
            point: Vec3::ZERO,
            scale_correction: 1.0,
        }
    }
}

/// Evaluate a tape at a single point
#[inline]
pub fn eval_point(tape: &Tape, point: Vec3) -> f32 {
    let mut value_stack = [0.0f32; MAX_VALUE_STACK];
    let mut vsp = 0usize;

    let mut coord_stack = [CoordFrame::default(); MAX_COORD_STACK];
    let mut csp = 0usize;

    let mut p = point;
    let mut scale_correction = 1.0f32;

    for inst in tape.instructions() {
        match inst.opcode {
            // === Primitives ===
            OpCode::Sphere => {
                value_stack[vsp] = sphere_distance(p, inst.params[0]) * scale_correction;
                vsp += 1;
            }
            OpCode::Box3d => {
                value_stack[vsp] = box_distance(p, inst.param_vec3()) * scale_correction;
                vsp += 1;
            }
            OpCode::Cylinder => {
                value_stack[vsp] =
                    cylinder_distance(p, inst.params[0], inst.params[1]) * scale_correction;
                vsp += 1;
            }
            OpCode::Torus => {
                value_stack[vsp] =
                    torus_distance(p, inst.params[0], inst.params[1]) * scale_correction;
                vsp += 1;
            }
            OpCode::Plane => {
                value_stack[vsp] =
                    plane_distance(p, inst.param_vec3(), inst.params[3]) * scale_correction;
                vsp += 1;
            }
            OpCode::Gyroid => {
                value_stack[vsp] =
                    gyroid_distance(p, inst.params[0], inst.params[1]) * scale_correction;
                vsp += 1;
            }

            // === Binary operations ===
            OpCode::Union => {
                let b = value_stack[vsp - 1];
                let a = value_stack[vsp - 2];
                value_stack[vsp - 2] = a.min(b);
                vsp -= 1;
            }
            OpCode::Intersection => {
                let b = value_stack[vsp - 1];
                let a = value_stack[vsp - 2];
                value_stack[vsp - 2] = a.max(b);
                vsp -= 1;
            }
            OpCode::Subtraction => {
                let b = value_stack[vsp - 1];
                let a = value_stack[vsp - 2];
                value_stack[vsp - 2] = a.max(-b);
                vsp -= 1;
            }
            OpCode::SmoothUnion => {
                let b = value_stack[vsp - 1];
                let a = value_stack[vsp - 2];
                value_stack[vsp - 2] = smooth_min(a, b, inst.params[0] * scale_correction.abs());
                vsp -= 1;
            }

            // === Transforms ===
            OpCode::Translate => {
                coord_stack[csp] = CoordFrame {
                    point: p,
                    scale_correction,
                };
                csp += 1;
                p -= inst.param_vec3();
            }
            OpCode::Rotate => {
                coord_stack[csp] = CoordFrame {
                    point: p,
                    scale_correction,
                };
                csp += 1;
                p = inst.param_quat() * p;
            }
            OpCode::Scale => {
                coord_stack[csp] = CoordFrame {
                    point: p,
                    scale_correction,
                };
                csp += 1;
                p /= inst.params[0];
                scale_correction *= inst.params[0];
            }
            OpCode::PopTransform => {
                csp -= 1;
                p = coord_stack[csp].point;
                scale_correction = coord_stack[csp].scale_correction;
            }

            OpCode::End => break,
        }
    }

    debug_assert_eq!(vsp, 1);
    value_stack[0]
}

// ── Interval evaluation with narrowing ──────────────────────────────

/// Value-stack slot: the interval plus the index of the first
/// instruction of the subtree that produced it.
#[derive(Clone, Copy)]
struct IntervalSlot {
    value: Interval,
    start: u32,
}

/// Coordinate frame on the interval transform stack
#[derive(Clone, Copy)]
struct IntervalFrame {
    bounds: Vec3Interval,
    scale_correction: f32,
    inst_idx: u32,
}

/// Per-worker evaluator: the shared root tape plus reusable scratch for
/// interval evaluation, so the hot loop never allocates when nothing is
/// pruned.
pub struct FieldEvaluator {
    root: Arc<Tape>,
    values: Vec<IntervalSlot>,
    frames: Vec<IntervalFrame>,
    dead: Vec<(u32, u32)>,
}

impl FieldEvaluator {
    /// Compile an expression and wrap it in an evaluator.
    ///
    /// # Panics
    ///
    /// Panics if the tree is too deep for the fixed evaluation stacks
    /// (see [`Tape::try_compile`]).
    pub fn new(node: &SdfNode) -> Self {
        Self::from_tape(Tape::compile(node))
    }

    /// Wrap an already-compiled tape. Cheap; evaluators for a worker
    /// pool share one root tape through the `Arc`.
    pub fn from_tape(root: Arc<Tape>) -> Self {
        FieldEvaluator {
            root,
            values: Vec::with_capacity(MAX_VALUE_STACK),
            frames: Vec::with_capacity(MAX_COORD_STACK),
            dead: Vec::new(),
        }
    }

    /// The root (un-narrowed) tape
    #[inline]
    pub fn root_tape(&self) -> &Arc<Tape> {
        &self.root
    }

    /// Evaluate a tape at a single point
    #[inline]
    pub fn point(&self, tape: &Tape, p: Vec3) -> f32 {
        eval_point(tape, p)
    }

    /// Evaluate `tape` over `region`, returning the conservative value
    /// bounds and a tape narrowed to the region (the same tape when no
    /// subtree could be elided).
    pub fn interval(&mut self, tape: &Arc<Tape>, region: &Aabb) -> (Interval, Arc<Tape>) {
        self.values.clear();
        self.frames.clear();
        self.dead.clear();

        let mut bounds = Vec3Interval::from_bounds(region.min, region.max);
        let mut scale_correction = 1.0f32;

        for (idx, inst) in tape.instructions().iter().enumerate() {
            let idx = idx as u32;
            match inst.opcode {
                // === Primitives ===
                OpCode::Sphere
                | OpCode::Box3d
                | OpCode::Cylinder
                | OpCode::Torus
                | OpCode::Plane
                | OpCode::Gyroid => {
                    let value = primitive_interval(inst, bounds) * scale_correction;
                    self.values.push(IntervalSlot { value, start: idx });
                }

                // === Binary operations with pruning ===
                OpCode::Union => self.binary_op(idx, |a, b| {
                    if a.hi <= b.lo {
                        Decision::KeepA(a)
                    } else if b.hi <= a.lo {
                        Decision::KeepB(b)
                    } else {
                        Decision::Both(a.min(b))
                    }
                }),
                OpCode::Intersection => self.binary_op(idx, |a, b| {
                    if a.lo >= b.hi {
                        Decision::KeepA(a)
                    } else if b.lo >= a.hi {
                        Decision::KeepB(b)
                    } else {
                        Decision::Both(a.max(b))
                    }
                }),
                OpCode::Subtraction => self.binary_op(idx, |a, b| {
                    let nb = -b;
                    if a.lo >= nb.hi {
                        // `a` dominates everywhere; `-b` can go
                        Decision::KeepA(a)
                    } else {
                        // Keeping only `b` would lose the negation, so
                        // the operator must survive even when it always
                        // picks the `-b` side.
                        Decision::Both(a.max(nb))
                    }
                }),
                OpCode::SmoothUnion => {
                    let k = (inst.params[0] * scale_correction).abs();
                    self.binary_op(idx, move |a, b| {
                        if b.lo - a.hi >= k {
                            Decision::KeepA(a)
                        } else if a.lo - b.hi >= k {
                            Decision::KeepB(b)
                        } else {
                            let sharp = a.min(b);
                            Decision::Both(Interval::new(sharp.lo - k * 0.25, sharp.hi))
                        }
                    })
                }

                // === Transforms ===
                OpCode::Translate => {
                    self.frames.push(IntervalFrame {
                        bounds,
                        scale_correction,
                        inst_idx: idx,
                    });
                    bounds = bounds.translate(inst.param_vec3());
                }
                OpCode::Rotate => {
                    self.frames.push(IntervalFrame {
                        bounds,
                        scale_correction,
                        inst_idx: idx,
                    });
                    bounds = bounds.rotate(inst.param_quat());
                }
                OpCode::Scale => {
                    self.frames.push(IntervalFrame {
                        bounds,
                        scale_correction,
                        inst_idx: idx,
                    });
                    bounds = bounds.scale(1.0 / inst.params[0]);
                    scale_correction *= inst.params[0];
                }
                OpCode::PopTransform => {
                    let frame = self.frames.pop().expect("unbalanced PopTransform");
                    bounds = frame.bounds;
                    scale_correction = frame.scale_correction;
                    // The transform's whole bracket produced the current
                    // top value; its subtree starts at the frame push.
                    if let Some(top) = self.values.last_mut() {
                        top.start = frame.inst_idx;
                    }
                }

                OpCode::End => break,
            }
        }

        debug_assert_eq!(self.values.len(), 1);
        let result = self.values[0].value;

        if self.dead.is_empty() {
            return (result, tape.clone());
        }

        // Assemble the narrowed tape, skipping dead instruction ranges.
        let source = tape.instructions();
        let mut keep = vec![true; source.len()];
        for &(lo, hi) in &self.dead {
            for slot in keep.iter_mut().take(hi as usize).skip(lo as usize) {
                *slot = false;
            }
        }
        let instructions: Vec<Instruction> = source
            .iter()
            .zip(keep.iter())
            .filter_map(|(inst, &k)| if k { Some(*inst) } else { None })
            .collect();

        (result, Tape::narrowed(tape, instructions, *region))
    }

    /// Pop two slots, decide which side survives over the whole region,
    /// record dead ranges, push the result slot.
    #[inline]
    fn binary_op(&mut self, op_idx: u32, decide: impl FnOnce(Interval, Interval) -> Decision) {
        let b = self.values.pop().expect("missing rhs operand");
        let a = self.values.pop().expect("missing lhs operand");

        let value = match decide(a.value, b.value) {
            Decision::KeepA(v) => {
                // rhs subtree [b.start, op) and the operator die
                self.dead.push((b.start, op_idx));
                self.dead.push((op_idx, op_idx + 1));
                v
            }
            Decision::KeepB(v) => {
                self.dead.push((a.start, b.start));
                self.dead.push((op_idx, op_idx + 1));
                v
            }
            Decision::Both(v) => v,
        };

        self.values.push(IntervalSlot {
            value,
            start: a.start,
        });
    }
}

/// Outcome of a region-wide min/max decision
enum Decision {
    /// Left operand wins everywhere; right subtree is elided
    KeepA(Interval),
    /// Right operand wins everywhere; left subtree is elided
    KeepB(Interval),
    /// Undecided; both subtrees stay
    Both(Interval),
}

/// Interval bounds of a primitive over a box of points
///
/// The norms inside these shapes are monotone in each coordinate's
/// absolute value, so instead of chaining interval operations the
/// bounds are assembled from per-axis nearest/farthest endpoint
/// analysis ([`Interval::abs_range`]); the result is the same
/// tightness with the extremes made explicit.
fn primitive_interval(inst: &Instruction, bounds: Vec3Interval) -> Interval {
    match inst.opcode {
        OpCode::Sphere => bounds.norm_bounds() - Interval::point(inst.params[0]),

        OpCode::Box3d => {
            let half = inst.param_vec3();
            let ex = bounds.x.abs() - Interval::point(half.x);
            let ey = bounds.y.abs() - Interval::point(half.y);
            let ez = bounds.z.abs() - Interval::point(half.z);
            // The exterior norm grows with every non-negative excess,
            // so its bounds come straight from the excess endpoints.
            let px = ex.max(Interval::ZERO);
            let py = ey.max(Interval::ZERO);
            let pz = ez.max(Interval::ZERO);
            let exterior = Interval::new(norm3(px.lo, py.lo, pz.lo), norm3(px.hi, py.hi, pz.hi));
            let interior = ex.max(ey).max(ez).min(Interval::ZERO);
            exterior + interior
        }

        OpCode::Cylinder => {
            let radial = planar_norm_bounds(bounds.x, bounds.z) - Interval::point(inst.params[0]);
            let axial = bounds.y.abs() - Interval::point(inst.params[1]);
            let pr = radial.max(Interval::ZERO);
            let pa = axial.max(Interval::ZERO);
            let exterior = Interval::new(norm2(pr.lo, pa.lo), norm2(pr.hi, pa.hi));
            exterior + radial.max(axial).min(Interval::ZERO)
        }

        OpCode::Torus => {
            let ring = planar_norm_bounds(bounds.x, bounds.z) - Interval::point(inst.params[0]);
            // Distance from the ring center-line circle
            let (rn, rf) = ring.abs_range();
            let (yn, yf) = bounds.y.abs_range();
            Interval::new(norm2(rn, yn), norm2(rf, yf)) - Interval::point(inst.params[1])
        }

        OpCode::Plane => {
            // Linear in p: each axis contributes one of its interval
            // endpoints to each bound, picked by the normal's sign.
            let normal = inst.param_vec3();
            let mut lo = -inst.params[3];
            let mut hi = -inst.params[3];
            for (n, axis) in [
                (normal.x, bounds.x),
                (normal.y, bounds.y),
                (normal.z, bounds.z),
            ] {
                let at_lo = n * axis.lo;
                let at_hi = n * axis.hi;
                lo += at_lo.min(at_hi);
                hi += at_lo.max(at_hi);
            }
            Interval::new(lo, hi)
        }

        OpCode::Gyroid => {
            let scale = inst.params[0];
            let cell = bounds.scale(scale);
            let (sx, cx) = (cell.x.sin(), cell.x.cos());
            let (sy, cy) = (cell.y.sin(), cell.y.cos());
            let (sz, cz) = (cell.z.sin(), cell.z.cos());
            let level = sx * cy + sy * cz + sz * cx;
            level.abs() * (1.0 / scale) - Interval::point(inst.params[1])
        }

        _ => unreachable!("not a primitive opcode"),
    }
}

/// Euclidean norm of two non-negative components
#[inline(always)]
fn norm2(a: f32, b: f32) -> f32 {
    (a * a + b * b).sqrt()
}

/// Euclidean norm of three non-negative components
#[inline(always)]
fn norm3(a: f32, b: f32, c: f32) -> f32 {
    (a * a + b * b + c * c).sqrt()
}

/// Nearest/farthest XZ-plane radius over a rectangle of coordinates
#[inline(always)]
fn planar_norm_bounds(x: Interval, z: Interval) -> Interval {
    let (nx, fx) = x.abs_range();
    let (nz, fz) = z.abs_range();
    Interval::new(norm2(nx, nz), norm2(fx, fz))
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn check_points(tape: &Tape, node: &SdfNode, points: &[Vec3]) {
        for &p in points {
            let interp = crate::eval::eval(node, p);
            let compiled = eval_point(tape, p);
            assert!(
                (interp - compiled).abs() < 1e-3,
                "mismatch at {:?}: interp={}, compiled={}",
                p,
                interp,
                compiled
            );
        }
    }

    fn sample_points() -> Vec<Vec3> {
        vec![
            Vec3::ZERO,
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.5, 0.5, 0.5),
            Vec3::new(-1.0, -1.0, -1.0),
            Vec3::new(0.25, -0.75, 0.5),
            Vec3::new(2.0, 0.0, -1.5),
        ]
    }

    #[test]
    fn test_point_eval_matches_interpreter() {
        let shape = SdfNode::sphere(1.0)
            .smooth_union(
                SdfNode::cylinder(0.3, 1.5).rotate_euler(1.57, 0.0, 0.0),
                0.2,
            )
            .subtract(SdfNode::box3d(0.8, 0.8, 0.8))
            .translate(0.5, 0.0, 0.0);
        let tape = Tape::compile(&shape);
        check_points(&tape, &shape, &sample_points());
    }

    #[test]
    fn test_point_eval_scaled() {
        let shape = SdfNode::torus(1.0, 0.3).scale(2.0);
        let tape = Tape::compile(&shape);
        check_points(&tape, &shape, &sample_points());
    }

    #[test]
    fn test_interval_classifies_sphere_regions() {
        let shape = SdfNode::sphere(1.0);
        let tape = Tape::compile(&shape);
        let mut eval = FieldEvaluator::from_tape(tape.clone());

        // Far outside
        let (i, _) = eval.interval(&tape, &Aabb::new(Vec3::splat(2.0), Vec3::splat(3.0)));
        assert!(i.is_positive());
        // Around the center
        let (i, _) = eval.interval(&tape, &Aabb::new(Vec3::splat(-0.25), Vec3::splat(0.25)));
        assert!(i.is_negative());
        // Straddling the surface
        let (i, _) = eval.interval(&tape, &Aabb::new(Vec3::splat(0.0), Vec3::splat(1.5)));
        assert!(!i.is_positive() && !i.is_negative());
    }

    #[test]
    fn test_narrowing_prunes_far_union_branch() {
        // Two spheres far apart: near one of them, the other's subtree
        // must vanish from the tape.
        let shape = SdfNode::sphere(1.0).union(SdfNode::sphere(1.0).translate(10.0, 0.0, 0.0));
        let tape = Tape::compile(&shape);
        let mut eval = FieldEvaluator::from_tape(tape.clone());

        let near_first = Aabb::new(Vec3::splat(-1.5), Vec3::splat(1.5));
        let (_, narrowed) = eval.interval(&tape, &near_first);
        assert!(narrowed.instruction_count() < tape.instruction_count());

        // The narrowed tape still evaluates identically inside the region
        for &p in &[Vec3::ZERO, Vec3::new(1.0, 0.5, -0.5), Vec3::splat(0.7)] {
            assert_eq!(eval_point(&narrowed, p), eval_point(&tape, p));
        }
    }

    #[test]
    fn test_narrowing_returns_same_tape_when_undecided() {
        let shape = SdfNode::sphere(1.0).union(SdfNode::box3d(1.5, 1.5, 1.5));
        let tape = Tape::compile(&shape);
        let mut eval = FieldEvaluator::from_tape(tape.clone());
        // Region overlapping both shapes: nothing can be pruned
        let (_, narrowed) = eval.interval(&tape, &Aabb::new(Vec3::splat(-2.0), Vec3::splat(2.0)));
        assert!(Arc::ptr_eq(&narrowed, &tape));
    }

    #[test]
    fn test_narrowing_inside_transform_bracket() {
        // The union sits under a Translate; pruning must keep the
        // frame push/pop balanced.
        let shape = SdfNode::sphere(1.0)
            .union(SdfNode::sphere(1.0).translate(10.0, 0.0, 0.0))
            .translate(0.0, 5.0, 0.0);
        let tape = Tape::compile(&shape);
        let mut eval = FieldEvaluator::from_tape(tape.clone());

        let region = Aabb::new(Vec3::new(-1.0, 4.0, -1.0), Vec3::new(1.0, 6.0, 1.0));
        let (_, narrowed) = eval.interval(&tape, &region);
        assert!(narrowed.instruction_count() < tape.instruction_count());
        let p = Vec3::new(0.3, 5.2, -0.2);
        assert_eq!(eval_point(&narrowed, p), eval_point(&tape, p));
    }

    #[test]
    fn test_subtraction_keeps_negation() {
        // Region entirely inside the subtracted box: the result is
        // governed by -b, and the operator must survive narrowing.
        let shape = SdfNode::sphere(4.0).subtract(SdfNode::box3d(2.0, 2.0, 2.0));
        let tape = Tape::compile(&shape);
        let mut eval = FieldEvaluator::from_tape(tape.clone());
        let region = Aabb::new(Vec3::splat(-0.25), Vec3::splat(0.25));
        let (i, narrowed) = eval.interval(&tape, &region);
        assert!(i.is_positive(), "carved-out region reads as outside");
        let p = Vec3::new(0.1, 0.0, 0.1);
        assert_eq!(eval_point(&narrowed, p), eval_point(&tape, p));
    }

    #[test]
    fn test_gyroid_interval_classifies_far_cell() {
        // Thin gyroid shell: a small cell sitting between sheets must
        // classify as outside rather than ambiguous.
        let shape = SdfNode::gyroid(1.0, 0.05);
        let tape = Tape::compile(&shape);
        let mut eval = FieldEvaluator::from_tape(tape.clone());
        // Near (PI/2, 0, 0) the gyroid expression is ~1, far from the shell
        let c = Vec3::new(std::f32::consts::FRAC_PI_2, 0.0, 0.0);
        let (i, _) = eval.interval(&tape, &Aabb::new(c - Vec3::splat(0.05), c + Vec3::splat(0.05)));
        assert!(i.is_positive(), "got {:?}", i);
    }
}
