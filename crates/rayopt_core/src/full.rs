//! Exact (real) ray trace through a sequential system.
//!
//! Rays are stored per element in that element's local frame: `z` is measured
//! from the element vertex, and [`FullTrace::z`] holds the vertex positions
//! along the axis.

use crate::error::{Result, TraceError};
use crate::format::format_g;
use crate::paraxial::{sinarctan, tanarcsin, ParaxialTrace, CHIEF, MARGINAL};
use crate::pupil::{linspace, sample_with_rng, PupilDistribution};
use crate::system::{OpticalSystem, OBJECT_INDEX};
use crate::traits::{Surface, Trace};
use log::{debug, trace};
use nalgebra::{DMatrix, Vector2, Vector3};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pupil sampling of a single field point.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FanSettings {
    pub distribution: PupilDistribution,
    pub rays: usize,
    /// Relative pupil offset of the differential rays in an object scan.
    pub epsilon: f64,
}

impl Default for FanSettings {
    fn default() -> Self {
        Self {
            distribution: PupilDistribution::Hexapolar,
            rays: 100,
            epsilon: 1e-6,
        }
    }
}

/// Centroid and RMS radius of the valid rays on one element.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Spot {
    pub centroid: Vector2<f64>,
    pub rms: f64,
    pub count: usize,
}

/// Cumulative fraction of all rays inside each radius about the centroid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EncircledEnergy {
    pub radius: Vec<f64>,
    pub fraction: Vec<f64>,
}

/// Image-space curves from an object scan, one entry per scanned height.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldCurves {
    /// Real chief ray height on the image.
    pub height: Vec<f64>,
    /// Real minus paraxial chief ray height.
    pub distortion: Vec<f64>,
    /// Axial distance from the image plane to the tangential focus.
    pub tangential: Vec<f64>,
    /// Axial distance from the image plane to the sagittal focus.
    pub sagittal: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct FullTrace {
    system: OpticalSystem,
    /// `[element][ray]` positions.
    y: Vec<Vec<Vector3<f64>>>,
    /// `[element][ray]` unit directions.
    u: Vec<Vec<Vector3<f64>>>,
    l: Vec<f64>,
    z: Vec<f64>,
    n: Vec<Vec<f64>>,
    t: Vec<Vec<f64>>,
    /// Heights per layer when the bundle was built by `rays_for_object`.
    object_scan: Option<usize>,
}

impl FullTrace {
    pub fn new(system: OpticalSystem, nrays: usize) -> Self {
        let mut trace = Self {
            system,
            y: Vec::new(),
            u: Vec::new(),
            l: Vec::new(),
            z: Vec::new(),
            n: Vec::new(),
            t: Vec::new(),
            object_scan: None,
        };
        trace.allocate(nrays);
        trace
    }

    /// A two-ray trace seeded with the marginal and chief rays of `paraxial`.
    pub fn like_paraxial(paraxial: &ParaxialTrace) -> Self {
        let mut trace = Self::new(paraxial.system().clone(), 2);
        trace.rays_like_paraxial(paraxial);
        trace
    }

    pub fn allocate(&mut self, nrays: usize) {
        let length = self.system.len();
        self.y = vec![vec![Vector3::zeros(); nrays]; length];
        self.u = vec![vec![Vector3::zeros(); nrays]; length];
        self.l = vec![0.0; nrays];
        self.z = vec![0.0; length];
        self.n = vec![vec![0.0; nrays]; length];
        self.t = vec![vec![0.0; nrays]; length];
        self.object_scan = None;
    }

    pub fn system(&self) -> &OpticalSystem {
        &self.system
    }

    pub fn nrays(&self) -> usize {
        self.l.len()
    }

    pub fn y(&self) -> &[Vec<Vector3<f64>>] {
        &self.y
    }

    pub fn u(&self) -> &[Vec<Vector3<f64>>] {
        &self.u
    }

    /// Wavelength per ray.
    pub fn l(&self) -> &[f64] {
        &self.l
    }

    pub fn z(&self) -> &[f64] {
        &self.z
    }

    pub fn n(&self) -> &[Vec<f64>] {
        &self.n
    }

    /// Geometric distance travelled from the previous element.
    pub fn t(&self) -> &[Vec<f64>] {
        &self.t
    }

    /// Traces the object-space rays through every element. With `clip`, rays
    /// outside a clear aperture become NaN from that element on.
    pub fn propagate(&mut self, clip: bool) {
        let length = self.system.len();
        let object = self.system.element(OBJECT_INDEX);
        for (r, &wavelength) in self.l.iter().enumerate() {
            self.n[OBJECT_INDEX][r] = object.refractive_index(wavelength, 1.0);
            self.t[OBJECT_INDEX][r] = 0.0;
        }
        let mut z = object.thickness();
        self.z[OBJECT_INDEX] = z;

        for i in 1..length {
            let element = self.system.element(i);
            for r in 0..self.l.len() {
                let step = element.transformed_ray(
                    &self.y[i - 1][r],
                    &self.u[i - 1][r],
                    self.n[i - 1][r],
                    self.l[r],
                    clip,
                );
                self.y[i][r] = step.y;
                self.u[i][r] = step.u;
                self.n[i][r] = step.n;
                self.t[i][r] = step.t;
            }
            z += element.thickness();
            self.z[i] = z;
            trace!(
                "full trace element {}: {} of {} rays valid",
                i,
                self.valid(i),
                self.l.len()
            );
        }
        debug!(
            "full trace: {} of {} rays invalid on the image",
            self.l.len() - self.valid(length - 1),
            self.l.len()
        );
    }

    /// Number of rays with a finite position on element `i`.
    pub fn valid(&self, i: usize) -> usize {
        self.y[i].iter().filter(|y| is_valid(y)).count()
    }

    /// Seeds the marginal and chief rays of `paraxial` at its primary
    /// wavelength.
    pub fn rays_like_paraxial(&mut self, paraxial: &ParaxialTrace) {
        self.allocate(2);
        let wavelength = paraxial.wavelengths().primary;
        for (r, ray) in [MARGINAL, CHIEF].into_iter().enumerate() {
            let p = sinarctan(paraxial.u()[OBJECT_INDEX][ray]);
            self.l[r] = wavelength;
            self.y[OBJECT_INDEX][r] = Vector3::new(paraxial.y()[OBJECT_INDEX][ray], 0.0, 0.0);
            self.u[OBJECT_INDEX][r] = Vector3::new(p, 0.0, (1.0 - p * p).sqrt());
        }
    }

    /// Fills the entrance pupil with about `n` rays from the field point
    /// `height`, given as fractions of the object radius.
    pub fn rays_for_point(
        &mut self,
        paraxial: &ParaxialTrace,
        height: (f64, f64),
        wavelength: f64,
        n: usize,
        distribution: PupilDistribution,
    ) {
        self.rays_for_point_with_rng(
            paraxial,
            height,
            wavelength,
            n,
            distribution,
            &mut rand::thread_rng(),
        )
    }

    pub fn rays_for_point_with_rng<R: Rng + ?Sized>(
        &mut self,
        paraxial: &ParaxialTrace,
        height: (f64, f64),
        wavelength: f64,
        n: usize,
        distribution: PupilDistribution,
        rng: &mut R,
    ) {
        let pupil = sample_with_rng(distribution, n, rng);
        let (hp, rp) = entrance_pupil(paraxial);
        let object = self.system.object();
        let rays: Vec<(Vector3<f64>, Vector3<f64>)> = pupil
            .x
            .iter()
            .zip(pupil.y.iter())
            .map(|(&xp, &yp)| {
                if object.is_finite() {
                    let (a, b) = (height.0 * object.radius, height.1 * object.radius);
                    let p = sinarctan((xp * rp - a) / hp);
                    let q = sinarctan((yp * rp - b) / hp);
                    object_ray(a, b, p, q)
                } else {
                    let r = sinarctan(object.radius);
                    let (p, q) = (height.0 * r, height.1 * r);
                    let a = xp * rp - hp * tanarcsin(p);
                    let b = yp * rp - hp * tanarcsin(q);
                    object_ray(a, b, p, q)
                }
            })
            .collect();
        self.seed(rays, wavelength);
    }

    /// Scans the field along x from the axis to the object edge with `n`
    /// heights, in three layers: chief rays, rays offset by `eps` times the
    /// pupil radius in x, and the same offset in y.
    pub fn rays_for_object(
        &mut self,
        paraxial: &ParaxialTrace,
        wavelength: f64,
        n: usize,
        eps: f64,
    ) {
        let (hp, rp) = entrance_pupil(paraxial);
        let object = self.system.object();
        let finite = object.is_finite();
        let edge = if finite {
            object.radius
        } else {
            sinarctan(object.radius)
        };
        let heights = linspace(0.0, edge, n);
        let offsets = [(0.0, 0.0), (eps * rp, 0.0), (0.0, eps * rp)];
        let mut rays = Vec::with_capacity(3 * n);
        for &(xp, yp) in &offsets {
            for &xi in &heights {
                rays.push(if finite {
                    object_ray(xi, 0.0, sinarctan((xp - xi) / hp), sinarctan(yp / hp))
                } else {
                    object_ray(xp - hp * tanarcsin(xi), yp, xi, 0.0)
                });
            }
        }
        self.seed(rays, wavelength);
        self.object_scan = Some(n);
    }

    fn seed(&mut self, rays: Vec<(Vector3<f64>, Vector3<f64>)>, wavelength: f64) {
        self.allocate(rays.len());
        self.l.fill(wavelength);
        for (r, (y, u)) in rays.into_iter().enumerate() {
            self.y[OBJECT_INDEX][r] = y;
            self.u[OBJECT_INDEX][r] = u;
        }
    }

    /// Centroid and RMS radius on element `i`, or `None` when no ray reaches it.
    pub fn spot(&self, i: usize) -> Option<Spot> {
        let points: Vec<Vector2<f64>> = self.y[i]
            .iter()
            .filter(|y| is_valid(y))
            .map(|y| y.xy())
            .collect();
        if points.is_empty() {
            return None;
        }
        let count = points.len();
        let centroid = points.iter().sum::<Vector2<f64>>() / count as f64;
        let rms = (points
            .iter()
            .map(|p| (p - centroid).norm_squared())
            .sum::<f64>()
            / count as f64)
            .sqrt();
        Some(Spot {
            centroid,
            rms,
            count,
        })
    }

    /// Encircled energy on element `i` sampled at `bins + 1` radii from zero to
    /// the outermost valid ray. Fractions are relative to all rays traced.
    pub fn encircled_energy(&self, i: usize, bins: usize) -> EncircledEnergy {
        let spot = match self.spot(i) {
            Some(spot) => spot,
            None => return EncircledEnergy::default(),
        };
        let radii: Vec<f64> = self.y[i]
            .iter()
            .filter(|y| is_valid(y))
            .map(|y| (y.xy() - spot.centroid).norm())
            .collect();
        let max = radii.iter().cloned().fold(0.0, f64::max);
        let mut counts = vec![0usize; bins + 1];
        for r in radii {
            let bin = if max > 0.0 {
                ((r * bins as f64 / max) as usize).min(bins)
            } else {
                0
            };
            counts[bin] += 1;
        }
        let total = self.nrays() as f64;
        let mut cumulative = 0;
        let fraction = counts
            .into_iter()
            .map(|c| {
                cumulative += c;
                cumulative as f64 / total
            })
            .collect();
        EncircledEnergy {
            radius: linspace(0.0, max, bins + 1),
            fraction,
        }
    }

    /// Distortion and focus curves from a propagated
    /// [`FullTrace::rays_for_object`] bundle.
    pub fn field_curves(&self, paraxial: &ParaxialTrace) -> Result<FieldCurves> {
        let n = self.object_scan.ok_or_else(|| {
            TraceError::Configuration(
                "field curves need a bundle built by rays_for_object".to_string(),
            )
        })?;
        let image = self.system.image_index();
        let (y, u) = (&self.y[image], &self.u[image]);
        let paraxial_height = linspace(0.0, paraxial.height().1, n);
        let mut curves = FieldCurves::default();
        for k in 0..n {
            let (chief, tangential, sagittal) = (k, n + k, 2 * n + k);
            curves.height.push(y[chief].x);
            curves.distortion.push(y[chief].x - paraxial_height[k]);
            curves.tangential.push(
                -(y[tangential].x - y[chief].x)
                    / (tanarcsin(u[tangential].x) - tanarcsin(u[chief].x)),
            );
            curves.sagittal.push(
                -(y[sagittal].y - y[chief].y) / (tanarcsin(u[sagittal].y) - tanarcsin(u[chief].y)),
            );
        }
        Ok(curves)
    }

    /// One table per ray: index, axial vertex position, cumulative path length,
    /// position and direction on every element.
    pub fn print_trace(&self) -> Vec<String> {
        let labels = [
            "n",
            "track z",
            "path len",
            "height x",
            "height y",
            "height z",
            "angle x",
            "angle y",
            "angle z",
        ];
        let mut lines = Vec::new();
        for r in 0..self.nrays() {
            lines.push(format!("ray {}, {} nm", r, format_g(self.l[r] / 1e-9, 3)));
            let table = DMatrix::from_fn(self.y.len(), labels.len(), |i, j| match j {
                0 => self.n[i][r],
                1 => self.z[i],
                2 => self.t[..=i].iter().map(|t| t[r]).sum::<f64>(),
                3..=5 => self.y[i][r][j - 3],
                _ => self.u[i][r][j - 6],
            });
            lines.extend(self.print_coeffs(&table, &labels, false));
            lines.push(String::new());
        }
        lines
    }
}

/// Entrance pupil distance from the object plane and entrance pupil radius.
fn entrance_pupil(paraxial: &ParaxialTrace) -> (f64, f64) {
    (
        paraxial.z()[1] + paraxial.pupil_position().0,
        paraxial.pupil_height().0,
    )
}

fn object_ray(a: f64, b: f64, p: f64, q: f64) -> (Vector3<f64>, Vector3<f64>) {
    (
        Vector3::new(a, b, 0.0),
        Vector3::new(p, q, (1.0 - p * p - q * q).sqrt()),
    )
}

fn is_valid(y: &Vector3<f64>) -> bool {
    y.x.is_finite() && y.y.is_finite()
}

impl Trace for FullTrace {
    fn system(&self) -> &OpticalSystem {
        &self.system
    }
}

impl fmt::Display for FullTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.print_trace().join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::Material;
    use crate::pupil::PupilPoints;
    use crate::surfaces::{Element, Planar, Spherical, Stop};
    use crate::system::ObjectSpec;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const LAMBDA: f64 = 587.56e-9;

    fn assert_err_contains<T: std::fmt::Debug>(result: Result<T>, needle: &str) {
        let err = result.expect_err("expected error");
        let message = format!("{err}");
        assert!(
            message.contains(needle),
            "expected error to contain \"{needle}\", got \"{message}\""
        );
    }

    fn singlet_surfaces(stop: f64, stop_radius: f64, lens_radius: f64) -> Vec<Element> {
        vec![
            Stop::new(stop, stop_radius).into(),
            Spherical::new(5.0, 0.01, lens_radius, Material::Constant { index: 1.5 }).into(),
            Spherical::new(4.0, -0.01, lens_radius, Material::Air).into(),
            Planar::new(95.0, 0.0, Material::Air).into(),
        ]
    }

    fn infinite_singlet() -> OpticalSystem {
        OpticalSystem::new(
            ObjectSpec::infinite(0.05, vec![LAMBDA]),
            singlet_surfaces(10.0, 10.0, 12.0),
            1,
        )
        .unwrap()
    }

    fn finite_singlet() -> OpticalSystem {
        OpticalSystem::new(
            ObjectSpec::finite(5.0, vec![LAMBDA]),
            singlet_surfaces(200.0, 10.0, 12.0),
            1,
        )
        .unwrap()
    }

    fn focused(system: OpticalSystem) -> ParaxialTrace {
        let mut paraxial = ParaxialTrace::trace(system).unwrap();
        paraxial.focal_plane_solve().unwrap();
        paraxial.propagate(0, None).unwrap();
        paraxial
    }

    fn hexapolar(n: usize) -> PupilPoints {
        sample_with_rng(PupilDistribution::Hexapolar, n, &mut StdRng::seed_from_u64(0))
    }

    #[test]
    fn small_rays_follow_the_paraxial_trace() {
        let system = OpticalSystem::new(
            ObjectSpec::infinite(1e-3, vec![LAMBDA]),
            singlet_surfaces(10.0, 0.1, 12.0),
            1,
        )
        .unwrap();
        let paraxial = ParaxialTrace::trace(system).unwrap();
        let mut full = FullTrace::like_paraxial(&paraxial);
        full.propagate(true);
        assert_eq!(full.nrays(), 2);
        assert_eq!(full.z(), paraxial.z());
        for i in 1..full.system().len() {
            for (r, ray) in [MARGINAL, CHIEF].into_iter().enumerate() {
                let real = full.y()[i][r];
                assert!((real.x - paraxial.y()[i][ray]).abs() < 1e-6);
                assert_eq!(real.y, 0.0);
                assert!((full.u()[i][r].norm() - 1.0).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn point_bundles_fill_the_stop() {
        for system in [infinite_singlet(), finite_singlet()] {
            let paraxial = ParaxialTrace::trace(system.clone()).unwrap();
            let mut full = FullTrace::new(system, 0);
            full.rays_for_point_with_rng(
                &paraxial,
                (0.0, 1.0),
                LAMBDA,
                37,
                PupilDistribution::Hexapolar,
                &mut StdRng::seed_from_u64(0),
            );
            full.propagate(true);
            let pupil = hexapolar(37);
            assert_eq!(full.nrays(), pupil.len());
            for r in 0..full.nrays() {
                let at_stop = full.y()[1][r];
                assert!((at_stop.x - 10.0 * pupil.x[r]).abs() < 1e-9);
                assert!((at_stop.y - 10.0 * pupil.y[r]).abs() < 1e-9);
                assert!((full.u()[0][r].norm() - 1.0).abs() < 1e-12);
                assert_eq!(full.l()[r], LAMBDA);
            }
            assert_eq!(full.valid(full.system().image_index()), 37);
        }
    }

    #[test]
    fn rays_aimed_at_the_stop_rim_are_not_clipped() {
        let system = OpticalSystem::new(
            ObjectSpec::finite(5.0, vec![LAMBDA]),
            singlet_surfaces(100.0, 1.0, 12.0),
            1,
        )
        .unwrap();
        let paraxial = ParaxialTrace::trace(system.clone()).unwrap();
        let image = system.image_index();
        for height in [(0.0, 0.0), (0.0, 1.0), (0.7, 0.0)] {
            let mut full = FullTrace::new(system.clone(), 0);
            full.rays_for_point(&paraxial, height, LAMBDA, 37, PupilDistribution::Hexapolar);
            full.propagate(true);
            assert_eq!(full.valid(image), 37, "field point {height:?}");
        }

        let mut full = FullTrace::like_paraxial(&paraxial);
        full.propagate(true);
        assert_eq!(full.valid(image), 2);
    }

    #[test]
    fn clipping_marks_rays_invalid() {
        let system = OpticalSystem::new(
            ObjectSpec::infinite(0.05, vec![LAMBDA]),
            singlet_surfaces(10.0, 10.0, 6.0),
            1,
        )
        .unwrap();
        let paraxial = ParaxialTrace::trace(system.clone()).unwrap();
        let mut full = FullTrace::new(system, 0);
        full.rays_for_point(&paraxial, (0.0, 0.0), LAMBDA, 37, PupilDistribution::Hexapolar);
        let image = full.system().image_index();

        full.propagate(false);
        assert_eq!(full.valid(image), 37);

        full.propagate(true);
        assert_eq!(full.nrays(), 37);
        assert_eq!(full.valid(2), 7);
        assert_eq!(full.valid(image), 7);
        assert!(full.t()[image][36].is_nan());
        assert!(full.t()[image][0].is_finite());
        assert_eq!(full.spot(image).unwrap().count, 7);
    }

    #[test]
    fn on_axis_spot_is_centered() {
        let paraxial = focused(infinite_singlet());
        let mut full = FullTrace::new(paraxial.system().clone(), 0);
        full.rays_for_point(&paraxial, (0.0, 0.0), LAMBDA, 61, PupilDistribution::Hexapolar);
        full.propagate(false);
        let image = full.system().image_index();
        let spot = full.spot(image).unwrap();
        assert_eq!(spot.count, full.nrays());
        assert!(spot.centroid.norm() < 1e-9);
        assert!(spot.rms > 0.0);

        let energy = full.encircled_energy(image, 10);
        assert_eq!(energy.radius.len(), 11);
        assert_eq!(energy.fraction.len(), 11);
        assert_eq!(energy.radius[0], 0.0);
        assert!(energy.fraction.windows(2).all(|w| w[0] <= w[1]));
        assert!((energy.fraction[10] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn spot_without_rays_is_none() {
        let full = FullTrace::new(infinite_singlet(), 0);
        assert!(full.spot(0).is_none());
        assert!(full.encircled_energy(0, 5).radius.is_empty());
    }

    #[test]
    fn object_scan_field_curves() {
        let paraxial = focused(infinite_singlet());
        let mut full = FullTrace::new(paraxial.system().clone(), 0);
        full.rays_for_object(&paraxial, LAMBDA, 5, 1e-6);
        assert_eq!(full.nrays(), 15);
        full.propagate(false);
        let curves = full.field_curves(&paraxial).unwrap();
        assert_eq!(curves.height.len(), 5);
        assert!(curves.distortion[0].abs() < 1e-12);
        assert!(curves.tangential[0].abs() < 1e-3);
        assert!((curves.tangential[0] - curves.sagittal[0]).abs() < 1e-9);
        let edge = paraxial.height().1;
        assert!((curves.height[4] - edge).abs() < 0.1 * edge.abs());
        assert!(curves.tangential.iter().all(|v| v.is_finite()));
        assert!(curves.sagittal.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn field_curves_need_an_object_scan() {
        let paraxial = ParaxialTrace::trace(infinite_singlet()).unwrap();
        let mut full = FullTrace::like_paraxial(&paraxial);
        full.propagate(true);
        assert_err_contains(full.field_curves(&paraxial), "rays_for_object");
    }

    #[test]
    fn ray_report_has_one_table_per_ray() {
        let paraxial = ParaxialTrace::trace(infinite_singlet()).unwrap();
        let mut full = FullTrace::like_paraxial(&paraxial);
        full.propagate(true);
        let lines = full.print_trace();
        assert_eq!(lines.len(), 2 * (3 + full.system().len()));
        assert_eq!(lines[0], "ray 0, 588 nm");
        assert!(lines[1].contains("path len"));
        assert!(lines[2].starts_with(" 0 O"));
        assert_eq!(full.to_string(), lines.join("\n"));
    }
}
