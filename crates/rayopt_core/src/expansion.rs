//! Third- and fifth-order surface sums fitted to exact ray fans.
//!
//! Fan rays leave the object with the paraxial marginal and chief rays as
//! their linear part and are traced exactly. After each surface a ray is
//! reduced to its height and slope on the vertex plane and paired with the
//! paraxial marginal ray through the Lagrange invariant. Twice the change of
//! that invariant across a surface is the surface's transverse aberration at
//! the paraxial image in the units of the Seidel sums, at every order.
//! Least-squares polynomials in the normalized pupil and field coordinates
//! separate the orders. Induced terms land on the surface where they arise.

use crate::aberration::{Seidel3, Seidel5};
use crate::paraxial::MARGINAL;
use crate::system::{OpticalSystem, OBJECT_INDEX};
use crate::traits::Surface;
use nalgebra::{DMatrix, DVector, Vector2, Vector3};

/// Half-width of the sampled square of pupil and field coordinates.
const EXTENT: f64 = 0.5;
const SAMPLES: usize = 11;
/// Highest odd degree in the fits.
const DEGREE: usize = 9;

/// Fitted sums of one element.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct FanExpansion {
    pub third: Seidel3,
    pub fifth: Seidel5,
}

/// Pupil exponent and field exponent of one fitted term.
type Monomial = (usize, usize);

fn monomials(keep: impl Fn(Monomial) -> bool) -> Vec<Monomial> {
    (1..=DEGREE)
        .step_by(2)
        .flat_map(|degree| (0..=degree).map(move |a| (a, degree - a)))
        .filter(|&m| keep(m))
        .collect()
}

struct Fit<'a> {
    monomials: &'a [Monomial],
    coefficients: DVector<f64>,
}

impl<'a> Fit<'a> {
    /// Samples are `(pupil, field, value)` with coordinates in `[-1, 1]`.
    fn new(samples: &[(f64, f64, f64)], monomials: &'a [Monomial]) -> Option<Self> {
        let design = DMatrix::from_fn(samples.len(), monomials.len(), |r, c| {
            let (p, h, _) = samples[r];
            let (a, b) = monomials[c];
            p.powi(a as i32) * h.powi(b as i32)
        });
        let values = DVector::from_iterator(samples.len(), samples.iter().map(|s| s.2));
        let coefficients = design.svd(true, true).solve(&values, 1e-12).ok()?;
        Some(Self {
            monomials,
            coefficients,
        })
    }

    /// Coefficient of `pupil^a field^b` in unscaled coordinates.
    fn get(&self, a: usize, b: usize) -> f64 {
        self.monomials
            .iter()
            .position(|&m| m == (a, b))
            .map_or(0.0, |i| {
                self.coefficients[i] / EXTENT.powi((a + b) as i32)
            })
    }
}

/// Twice the Lagrange invariant of an exact ray, given at a surface, with the
/// paraxial marginal ray `(ym, um)` in a medium of index `n`.
fn invariant(ym: f64, um: f64, n: f64, p: &Vector3<f64>, d: &Vector3<f64>) -> Vector2<f64> {
    let slope = Vector2::new(d.x / d.z, d.y / d.z);
    let height = p.xy() - slope * p.z;
    (height * um - slope * ym) * (2.0 * n)
}

/// Per-element change of the invariant along one fan ray. `None` when the
/// ray misses a surface or is totally reflected.
fn ray_contributions(
    system: &OpticalSystem,
    y: &[Vector2<f64>],
    u: &[Vector2<f64>],
    n: &[f64],
    pupil: Vector2<f64>,
    field: f64,
) -> Option<Vec<Vector2<f64>>> {
    let (y0, u0) = (&y[OBJECT_INDEX], &u[OBJECT_INDEX]);
    let height = Vector2::new(pupil.x * y0[0], pupil.y * y0[0] + field * y0[1]);
    let slope = Vector2::new(pupil.x * u0[0], pupil.y * u0[0] + field * u0[1]);
    let mut p = Vector3::new(height.x, height.y, 0.0);
    let mut d = Vector3::new(slope.x, slope.y, 1.0).normalize();
    let primary = system.band().primary;
    let mut index = system
        .element(OBJECT_INDEX)
        .refractive_index(primary, 1.0);

    let mut out = vec![Vector2::zeros(); y.len()];
    let mut previous = invariant(y0[MARGINAL], u0[MARGINAL], n[OBJECT_INDEX], &p, &d);
    for i in 1..y.len() {
        let step = system
            .element(i)
            .transformed_ray(&p, &d, index, primary, false);
        let current = invariant(y[i][MARGINAL], u[i][MARGINAL], n[i], &step.y, &step.u);
        if !(current.x.is_finite() && current.y.is_finite()) {
            return None;
        }
        out[i] = current - previous;
        previous = current;
        p = step.y;
        d = step.u;
        index = step.n;
    }
    Some(out)
}

/// Fits the sums of elements `0..y.len()` from the paraxial rows `y`, `u`
/// and `n` of a trace. Element 0 stays zero.
pub(crate) fn expand(
    system: &OpticalSystem,
    y: &[Vector2<f64>],
    u: &[Vector2<f64>],
    n: &[f64],
) -> Option<Vec<FanExpansion>> {
    let length = y.len();
    let grid: Vec<f64> = (0..SAMPLES)
        .map(|k| 2.0 * k as f64 / (SAMPLES - 1) as f64 - 1.0)
        .collect();
    let mut tangential = vec![Vec::with_capacity(SAMPLES * SAMPLES); length];
    let mut sagittal_x = tangential.clone();
    let mut sagittal_y = tangential.clone();
    for &p in &grid {
        for &h in &grid {
            let (rho, field) = (p * EXTENT, h * EXTENT);
            let t = ray_contributions(system, y, u, n, Vector2::new(0.0, rho), field)?;
            let s = ray_contributions(system, y, u, n, Vector2::new(rho, 0.0), field)?;
            for i in 0..length {
                tangential[i].push((p, h, t[i].y));
                sagittal_x[i].push((p, h, s[i].x));
                sagittal_y[i].push((p, h, s[i].y));
            }
        }
    }

    // The sagittal fan is odd in the pupil across the meridional plane and
    // even along it.
    let all = monomials(|_| true);
    let odd = monomials(|(a, _)| a % 2 == 1);
    let even = monomials(|(a, _)| a % 2 == 0);
    let mut out = vec![FanExpansion::default(); length];
    for i in 1..length {
        let t = Fit::new(&tangential[i], &all)?;
        let sx = Fit::new(&sagittal_x[i], &odd)?;
        let sy = Fit::new(&sagittal_y[i], &even)?;
        let (t3, s3) = (t.get(1, 2), sx.get(1, 2));
        let (t5, s5) = (t.get(1, 4), sx.get(1, 4));
        out[i] = FanExpansion {
            third: Seidel3 {
                spherical: t.get(3, 0),
                coma: sy.get(2, 1),
                astigmatism: (t3 - s3) / 2.0,
                petzval: (3.0 * s3 - t3) / 2.0,
                distortion: t.get(0, 3),
            },
            fifth: Seidel5 {
                spherical: t.get(5, 0),
                coma: sy.get(4, 1),
                tangential_oblique_spherical: t.get(3, 2),
                sagittal_oblique_spherical: sx.get(3, 2),
                tangential_elliptical_coma: t.get(2, 3),
                sagittal_elliptical_coma: sy.get(2, 3),
                astigmatism: (t5 - s5) / 2.0,
                petzval: (3.0 * s5 - t5) / 2.0,
                distortion: t.get(0, 5),
            },
        };
    }
    Some(out)
}
