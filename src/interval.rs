//! Interval arithmetic for region classification
//!
//! Evaluates field programs over whole boxes instead of single points,
//! producing conservative distance bounds `[lo, hi]`:
//!
//! - `lo > 0`: the entire region is outside the surface
//! - `hi < 0`: the entire region is inside the surface
//! - otherwise: the surface may cross the region
//!
//! The octree builder classifies every cell through these bounds, so the
//! operations here must never under-report a range; over-reporting only
//! costs extra subdivision.
//!
//! Author: Moroya Sakamoto

use glam::{Quat, Vec3};
use std::f32::consts::{FRAC_PI_2, TAU};
use std::ops::{Add, Mul, Neg, Sub};

/// Outward padding applied to transcendental results, absorbing f32
/// rounding in `sin`/`cos`.
const TRIG_PAD: f32 = 1e-6;

/// A closed interval `[lo, hi]` of possible values
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Interval {
    /// Lower bound
    pub lo: f32,
    /// Upper bound
    pub hi: f32,
}

impl Interval {
    /// Create a new interval
    #[inline(always)]
    pub fn new(lo: f32, hi: f32) -> Self {
        debug_assert!(lo <= hi + 1e-6, "lo ({}) > hi ({})", lo, hi);
        Self { lo, hi }
    }

    /// Create a point interval `[v, v]`
    #[inline(always)]
    pub fn point(v: f32) -> Self {
        Self { lo: v, hi: v }
    }

    /// Zero interval
    pub const ZERO: Self = Self { lo: 0.0, hi: 0.0 };

    /// Interval width
    #[inline(always)]
    pub fn width(self) -> f32 {
        self.hi - self.lo
    }

    /// Entirely positive (region provably outside the surface)
    #[inline(always)]
    pub fn is_positive(self) -> bool {
        self.lo > 0.0
    }

    /// Entirely negative (region provably inside the surface)
    #[inline(always)]
    pub fn is_negative(self) -> bool {
        self.hi < 0.0
    }

    /// Absolute value of an interval
    #[inline(always)]
    pub fn abs(self) -> Self {
        if self.lo >= 0.0 {
            self
        } else if self.hi <= 0.0 {
            Self {
                lo: -self.hi,
                hi: -self.lo,
            }
        } else {
            Self {
                lo: 0.0,
                hi: self.hi.max(-self.lo),
            }
        }
    }

    /// Nearest and farthest absolute value attained over the interval
    ///
    /// The nearest is zero when the interval straddles the origin;
    /// otherwise both come from the endpoints.
    #[inline(always)]
    pub fn abs_range(self) -> (f32, f32) {
        let far = self.lo.abs().max(self.hi.abs());
        let near = if self.lo <= 0.0 && self.hi >= 0.0 {
            0.0
        } else {
            self.lo.abs().min(self.hi.abs())
        };
        (near, far)
    }

    /// Pointwise minimum of two intervals
    #[inline(always)]
    pub fn min(self, other: Self) -> Self {
        Self {
            lo: self.lo.min(other.lo),
            hi: self.hi.min(other.hi),
        }
    }

    /// Pointwise maximum of two intervals
    #[inline(always)]
    pub fn max(self, other: Self) -> Self {
        Self {
            lo: self.lo.max(other.lo),
            hi: self.hi.max(other.hi),
        }
    }

    /// Bounds of `sin` over the interval
    ///
    /// Detects whether a crest (`π/2 + 2πk`) or trough (`-π/2 + 2πk`)
    /// lies inside the interval; otherwise the extrema sit at the
    /// endpoints. Needed so gyroid cells classify instead of always
    /// reading as ambiguous.
    pub fn sin(self) -> Self {
        if !self.lo.is_finite() || !self.hi.is_finite() || self.width() >= TAU {
            return Self { lo: -1.0, hi: 1.0 };
        }

        let sa = self.lo.sin();
        let sb = self.hi.sin();
        let mut lo = sa.min(sb);
        let mut hi = sa.max(sb);

        // First crest at or after self.lo
        let crest = FRAC_PI_2 + ((self.lo - FRAC_PI_2) / TAU).ceil() * TAU;
        if crest <= self.hi {
            hi = 1.0;
        }
        let trough = -FRAC_PI_2 + ((self.lo + FRAC_PI_2) / TAU).ceil() * TAU;
        if trough <= self.hi {
            lo = -1.0;
        }

        Self {
            lo: (lo - TRIG_PAD).max(-1.0),
            hi: (hi + TRIG_PAD).min(1.0),
        }
    }

    /// Bounds of `cos` over the interval
    #[inline(always)]
    pub fn cos(self) -> Self {
        (self + Interval::point(FRAC_PI_2)).sin()
    }
}

impl Add for Interval {
    type Output = Interval;
    #[inline(always)]
    fn add(self, rhs: Self) -> Self {
        Self {
            lo: self.lo + rhs.lo,
            hi: self.hi + rhs.hi,
        }
    }
}

impl Sub for Interval {
    type Output = Interval;
    #[inline(always)]
    fn sub(self, rhs: Self) -> Self {
        Self {
            lo: self.lo - rhs.hi,
            hi: self.hi - rhs.lo,
        }
    }
}

impl Neg for Interval {
    type Output = Interval;
    #[inline(always)]
    fn neg(self) -> Self {
        Self {
            lo: -self.hi,
            hi: -self.lo,
        }
    }
}

impl Mul for Interval {
    type Output = Interval;
    #[inline(always)]
    fn mul(self, rhs: Self) -> Self {
        let a = self.lo * rhs.lo;
        let b = self.lo * rhs.hi;
        let c = self.hi * rhs.lo;
        let d = self.hi * rhs.hi;
        Self {
            lo: a.min(b).min(c.min(d)),
            hi: a.max(b).max(c.max(d)),
        }
    }
}

impl Mul<f32> for Interval {
    type Output = Interval;
    #[inline(always)]
    fn mul(self, rhs: f32) -> Self {
        if rhs >= 0.0 {
            Self {
                lo: self.lo * rhs,
                hi: self.hi * rhs,
            }
        } else {
            Self {
                lo: self.hi * rhs,
                hi: self.lo * rhs,
            }
        }
    }
}

/// An axis-aligned box of points, one interval per coordinate
#[derive(Clone, Copy, Debug)]
pub struct Vec3Interval {
    /// X range
    pub x: Interval,
    /// Y range
    pub y: Interval,
    /// Z range
    pub z: Interval,
}

impl Vec3Interval {
    /// Build from box corners
    #[inline(always)]
    pub fn from_bounds(min: Vec3, max: Vec3) -> Self {
        Self {
            x: Interval::new(min.x, max.x),
            y: Interval::new(min.y, max.y),
            z: Interval::new(min.z, max.z),
        }
    }

    /// Shift every point by `-offset` (undoing a Translate transform)
    #[inline(always)]
    pub fn translate(self, offset: Vec3) -> Self {
        Self {
            x: self.x - Interval::point(offset.x),
            y: self.y - Interval::point(offset.y),
            z: self.z - Interval::point(offset.z),
        }
    }

    /// Conservative hull of the box under a rotation
    ///
    /// Rotates all eight corners and re-boxes them. The result is a
    /// superset of the true rotated region, which is the safe direction
    /// for classification.
    pub fn rotate(self, rotation: Quat) -> Self {
        let mut min = Vec3::splat(f32::INFINITY);
        let mut max = Vec3::splat(f32::NEG_INFINITY);
        for i in 0..8 {
            let corner = Vec3::new(
                if i & 1 == 0 { self.x.lo } else { self.x.hi },
                if i & 2 == 0 { self.y.lo } else { self.y.hi },
                if i & 4 == 0 { self.z.lo } else { self.z.hi },
            );
            let r = rotation * corner;
            min = min.min(r);
            max = max.max(r);
        }
        Self::from_bounds(min, max)
    }

    /// Scale every coordinate by `factor`
    #[inline(always)]
    pub fn scale(self, factor: f32) -> Self {
        Self {
            x: self.x * factor,
            y: self.y * factor,
            z: self.z * factor,
        }
    }

    /// Bounds of the distance from the origin over the box
    ///
    /// The norm is monotone in each coordinate's absolute value, so
    /// the extremes come straight from the per-axis nearest/farthest
    /// points rather than from chained interval arithmetic: the lower
    /// bound is the distance to the closest point of the box, the
    /// upper bound the distance to its farthest corner.
    pub fn norm_bounds(self) -> Interval {
        let (nx, fx) = self.x.abs_range();
        let (ny, fy) = self.y.abs_range();
        let (nz, fz) = self.z.abs_range();
        Interval::new(
            (nx * nx + ny * ny + nz * nz).sqrt(),
            (fx * fx + fy * fy + fz * fz).sqrt(),
        )
    }
}
