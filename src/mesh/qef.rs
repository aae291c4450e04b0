//! Quadric Error Function accumulation and solving
//!
//! Each hermite sample (surface point `p`, unit normal `n`) contributes
//! the constraint plane `n · (v - p) = 0`. The accumulator keeps the
//! normal-equation sums `AᵀA`, `Aᵀb`, `bᵀb` plus a mass point, so cells
//! merge by plain addition and the residual of a fitted vertex is
//! available in closed form — that residual is what decides subtree
//! collapse against `max_err`.
//!
//! Sums are kept in double precision: the residual of an exactly
//! representable configuration (planes, edges, corners) must come out
//! near machine zero, and in `f32` the `bᵀb` cancellation noise alone
//! would swamp any practical collapse tolerance.
//!
//! The solver shifts to the mass point and applies a symmetric 3×3
//! Jacobi eigen-decomposition with relative truncation of small
//! eigenvalues, so under-constrained configurations (a single plane, a
//! straight edge) resolve to the minimum-norm solution instead of
//! drifting along the null space.
//!
//! Author: Moroya Sakamoto

use glam::{DVec3, Vec3};

/// Relative eigenvalue cutoff for the pseudo-inverse
const EIGENVALUE_CUTOFF: f64 = 1e-2;

/// Additive QEF accumulator
#[derive(Debug, Clone, Copy, Default)]
pub struct Qef {
    // Upper triangle of AᵀA: xx, xy, xz, yy, yz, zz
    ata: [f64; 6],
    atb: DVec3,
    btb: f64,
    point_sum: DVec3,
    normal_sum: DVec3,
    samples: u32,
}

/// Result of a QEF solve
#[derive(Debug, Clone, Copy)]
pub struct QefSolution {
    /// Fitted vertex position
    pub vertex: Vec3,
    /// Average sample normal (unit length)
    pub normal: Vec3,
    /// Residual Σ (n·(v−p))² at the returned vertex
    pub error: f32,
}

impl Qef {
    /// Accumulate one hermite sample
    pub fn add(&mut self, point: Vec3, normal: Vec3) {
        let p = point.as_dvec3();
        let n = normal.as_dvec3();
        let b = n.dot(p);

        self.ata[0] += n.x * n.x;
        self.ata[1] += n.x * n.y;
        self.ata[2] += n.x * n.z;
        self.ata[3] += n.y * n.y;
        self.ata[4] += n.y * n.z;
        self.ata[5] += n.z * n.z;
        self.atb += n * b;
        self.btb += b * b;
        self.point_sum += p;
        self.normal_sum += n;
        self.samples += 1;
    }

    /// Merge another accumulator into this one
    pub fn merge(&mut self, other: &Qef) {
        for i in 0..6 {
            self.ata[i] += other.ata[i];
        }
        self.atb += other.atb;
        self.btb += other.btb;
        self.point_sum += other.point_sum;
        self.normal_sum += other.normal_sum;
        self.samples += other.samples;
    }

    /// True when no samples have been accumulated
    pub fn is_empty(&self) -> bool {
        self.samples == 0
    }

    /// Number of accumulated samples
    pub fn sample_count(&self) -> u32 {
        self.samples
    }

    /// Residual Σ (n·(v−p))² at an arbitrary point
    pub fn error_at(&self, v: Vec3) -> f32 {
        let v = v.as_dvec3();
        let av = self.apply_ata(v);
        (v.dot(av) - 2.0 * v.dot(self.atb) + self.btb).max(0.0) as f32
    }

    /// Solve for the vertex minimizing the residual, clamped into the
    /// given cell bounds.
    pub fn solve(&self, cell_min: Vec3, cell_max: Vec3) -> QefSolution {
        let center = (cell_min + cell_max) * 0.5;
        if self.is_empty() {
            return QefSolution {
                vertex: center,
                normal: Vec3::Y,
                error: 0.0,
            };
        }

        let mass = self.point_sum / self.samples as f64;

        // Solve AᵀA x = Aᵀb - AᵀA·m for the offset x from the mass point
        let rhs = self.atb - self.apply_ata(mass);
        let offset = pseudo_solve(&self.ata, rhs);
        let mut vertex = (mass + offset).as_vec3();

        if !vertex.is_finite() {
            vertex = mass.as_vec3();
        }
        vertex = vertex.clamp(cell_min, cell_max);

        let normal_sum = self.normal_sum.as_vec3();
        let normal = if normal_sum.length_squared() > 1e-20 {
            normal_sum.normalize()
        } else {
            Vec3::Y
        };

        QefSolution {
            vertex,
            normal,
            error: self.error_at(vertex),
        }
    }

    #[inline]
    fn apply_ata(&self, v: DVec3) -> DVec3 {
        DVec3::new(
            self.ata[0] * v.x + self.ata[1] * v.y + self.ata[2] * v.z,
            self.ata[1] * v.x + self.ata[3] * v.y + self.ata[4] * v.z,
            self.ata[2] * v.x + self.ata[4] * v.y + self.ata[5] * v.z,
        )
    }
}

/// Minimum-norm solve of the symmetric system via eigen-decomposition
/// with relative truncation of near-null eigenvalues.
fn pseudo_solve(ata: &[f64; 6], rhs: DVec3) -> DVec3 {
    let (eigenvalues, eigenvectors) = jacobi_eigen(ata);

    let max_ev = eigenvalues
        .iter()
        .fold(0.0f64, |acc, &w| acc.max(w.abs()));
    if max_ev <= 0.0 {
        return DVec3::ZERO;
    }

    // x = V · diag(1/w) · Vᵀ · rhs, truncating small w
    let mut x = DVec3::ZERO;
    for i in 0..3 {
        let w = eigenvalues[i];
        if w.abs() > max_ev * EIGENVALUE_CUTOFF {
            let v = eigenvectors[i];
            x += v * (v.dot(rhs) / w);
        }
    }
    x
}

/// Eigen-decomposition of a symmetric 3×3 matrix by cyclic Jacobi
/// rotations. Returns (eigenvalues, eigenvectors), unordered.
fn jacobi_eigen(ata: &[f64; 6]) -> ([f64; 3], [DVec3; 3]) {
    let mut a = [
        [ata[0], ata[1], ata[2]],
        [ata[1], ata[3], ata[4]],
        [ata[2], ata[4], ata[5]],
    ];
    let mut v = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

    const PAIRS: [(usize, usize); 3] = [(0, 1), (0, 2), (1, 2)];
    for _sweep in 0..16 {
        let off = a[0][1] * a[0][1] + a[0][2] * a[0][2] + a[1][2] * a[1][2];
        if off < 1e-30 {
            break;
        }
        for &(p, q) in &PAIRS {
            if a[p][q].abs() < 1e-300 {
                continue;
            }
            // Classic Jacobi rotation annihilating a[p][q]
            let theta = (a[q][q] - a[p][p]) / (2.0 * a[p][q]);
            let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
            let c = 1.0 / (t * t + 1.0).sqrt();
            let s = t * c;

            for k in 0..3 {
                let akp = a[k][p];
                let akq = a[k][q];
                a[k][p] = c * akp - s * akq;
                a[k][q] = s * akp + c * akq;
            }
            for k in 0..3 {
                let apk = a[p][k];
                let aqk = a[q][k];
                a[p][k] = c * apk - s * aqk;
                a[q][k] = s * apk + c * aqk;
            }
            for row in &mut v {
                let vp = row[p];
                let vq = row[q];
                row[p] = c * vp - s * vq;
                row[q] = s * vp + c * vq;
            }
        }
    }

    (
        [a[0][0], a[1][1], a[2][2]],
        [
            DVec3::new(v[0][0], v[1][0], v[2][0]),
            DVec3::new(v[0][1], v[1][1], v[2][1]),
            DVec3::new(v[0][2], v[1][2], v[2][2]),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_three_orthogonal_planes_meet_at_corner() {
        let mut qef = Qef::default();
        qef.add(Vec3::new(0.25, 0.1, 0.3), Vec3::X);
        qef.add(Vec3::new(0.1, 0.25, 0.4), Vec3::Y);
        qef.add(Vec3::new(0.4, 0.3, 0.25), Vec3::Z);

        let s = qef.solve(Vec3::ZERO, Vec3::ONE);
        assert!((s.vertex - Vec3::splat(0.25)).length() < 1e-4, "{:?}", s);
        assert!(s.error < 1e-9);
    }

    #[test]
    fn test_single_plane_stays_on_plane() {
        let mut qef = Qef::default();
        for &(y, z) in &[(0.1, 0.1), (0.9, 0.2), (0.4, 0.8), (0.6, 0.5)] {
            qef.add(Vec3::new(0.5, y, z), Vec3::X);
        }
        let s = qef.solve(Vec3::ZERO, Vec3::ONE);
        assert!((s.vertex.x - 0.5).abs() < 1e-5);
        assert!(s.error < 1e-10);
    }

    #[test]
    fn test_straight_edge_minimum_norm() {
        // Two plane families meeting along the line x=0.5, y=0.5
        let mut qef = Qef::default();
        qef.add(Vec3::new(0.5, 0.2, 0.1), Vec3::X);
        qef.add(Vec3::new(0.5, 0.8, 0.9), Vec3::X);
        qef.add(Vec3::new(0.3, 0.5, 0.2), Vec3::Y);
        qef.add(Vec3::new(0.7, 0.5, 0.6), Vec3::Y);

        let s = qef.solve(Vec3::ZERO, Vec3::ONE);
        assert!((s.vertex.x - 0.5).abs() < 1e-5);
        assert!((s.vertex.y - 0.5).abs() < 1e-5);
        assert!(s.error < 1e-10, "edge fit should be exact, got {}", s.error);
    }

    #[test]
    fn test_parallel_planes_cannot_fit() {
        // Opposite faces of a slab: no point satisfies both
        let mut qef = Qef::default();
        qef.add(Vec3::new(0.0, 0.5, 0.5), Vec3::X);
        qef.add(Vec3::new(1.0, 0.5, 0.5), Vec3::NEG_X);
        let s = qef.solve(Vec3::ZERO, Vec3::ONE);
        assert!(s.error > 1e-3, "residual must expose the misfit");
    }

    #[test]
    fn test_merge_matches_bulk_add() {
        let samples = [
            (Vec3::new(0.2, 0.0, 0.0), Vec3::X),
            (Vec3::new(0.0, 0.3, 0.0), Vec3::Y),
            (Vec3::new(0.1, 0.1, 0.4), Vec3::Z),
            (Vec3::new(0.5, 0.2, 0.2), Vec3::new(0.577, 0.577, 0.577)),
        ];
        let mut bulk = Qef::default();
        let mut left = Qef::default();
        let mut right = Qef::default();
        for (i, &(p, n)) in samples.iter().enumerate() {
            bulk.add(p, n);
            if i % 2 == 0 {
                left.add(p, n);
            } else {
                right.add(p, n);
            }
        }
        left.merge(&right);
        let a = bulk.solve(Vec3::splat(-1.0), Vec3::splat(1.0));
        let b = left.solve(Vec3::splat(-1.0), Vec3::splat(1.0));
        assert!((a.vertex - b.vertex).length() < 1e-5);
        assert!((a.error - b.error).abs() < 1e-6);
    }

    #[test]
    fn test_empty_qef_centers() {
        let s = Qef::default().solve(Vec3::ZERO, Vec3::ONE);
        assert_eq!(s.vertex, Vec3::splat(0.5));
        assert_eq!(s.error, 0.0);
    }

    #[test]
    fn test_vertex_clamped_to_cell() {
        // Planes whose intersection lies outside the cell
        let mut qef = Qef::default();
        qef.add(Vec3::new(2.0, 0.1, 0.2), Vec3::X);
        qef.add(Vec3::new(2.1, 2.0, 0.3), Vec3::Y);
        qef.add(Vec3::new(1.9, 0.2, 2.0), Vec3::Z);
        let s = qef.solve(Vec3::ZERO, Vec3::ONE);
        assert!(s.vertex.cmple(Vec3::ONE).all());
        assert!(s.vertex.cmpge(Vec3::ZERO).all());
    }
}
