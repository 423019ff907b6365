//! First-order (paraxial) trace with third- and fifth-order aberration sums.

use crate::aberration::{AberrationTensor, Chromatic, Seidel3, Seidel5};
use crate::error::{Result, TraceError};
use crate::expansion;
use crate::system::{OpticalSystem, Wavelengths, OBJECT_INDEX};
use crate::traits::{BandIndices, RayPair, Surface, Trace};
use log::{debug, trace};
use nalgebra::{DMatrix, Matrix2, Vector2};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const MARGINAL: usize = 0;
pub const CHIEF: usize = 1;

/// Slope to direction sine.
pub fn sinarctan(u: f64) -> f64 {
    u / (1.0 + u * u).sqrt()
}

/// Direction sine to slope.
pub fn tanarcsin(u: f64) -> f64 {
    u / (1.0 - u * u).sqrt()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ParaxialSettings {
    /// Size of each exponent axis of the aberration tensors. Three is the
    /// minimum that holds the fifth-order entries.
    pub aberration_order: usize,
}

impl Default for ParaxialSettings {
    fn default() -> Self {
        Self {
            aberration_order: 4,
        }
    }
}

/// Paraxial marginal/chief ray trace bound to a snapshot of a system.
///
/// Row `i` of every array describes the state after element `i`; row 0 is
/// object space. The arrays are sized once and overwritten by each
/// [`ParaxialTrace::propagate`].
#[derive(Debug, Clone)]
pub struct ParaxialTrace {
    system: OpticalSystem,
    band: Wavelengths,
    order: usize,
    image: usize,
    last_optical: usize,
    y: Vec<Vector2<f64>>,
    u: Vec<Vector2<f64>>,
    z: Vec<f64>,
    n: Vec<f64>,
    v: Vec<f64>,
    band_n: Vec<BandIndices>,
    c: Vec<AberrationTensor>,
    d: Vec<AberrationTensor>,
}

impl ParaxialTrace {
    /// Allocates the state and solves the object-space rays. Call
    /// [`ParaxialTrace::propagate`] to fill the remaining rows.
    pub fn new(system: OpticalSystem, settings: ParaxialSettings) -> Result<Self> {
        if settings.aberration_order < 3 {
            return Err(TraceError::Configuration(format!(
                "aberration order must be at least 3, got {}",
                settings.aberration_order
            )));
        }
        let band = *system.band();
        let image = system.image_index();
        let last_optical = system.last_optical_index();
        let mut trace = Self {
            system,
            band,
            order: 0,
            image,
            last_optical,
            y: Vec::new(),
            u: Vec::new(),
            z: Vec::new(),
            n: Vec::new(),
            v: Vec::new(),
            band_n: Vec::new(),
            c: Vec::new(),
            d: Vec::new(),
        };
        trace.allocate(settings.aberration_order);
        trace.find_rays()?;
        Ok(trace)
    }

    /// Solves and propagates through the whole system with default settings.
    pub fn trace(system: OpticalSystem) -> Result<Self> {
        let mut trace = Self::new(system, ParaxialSettings::default())?;
        trace.propagate(0, None)?;
        Ok(trace)
    }

    fn allocate(&mut self, order: usize) {
        let length = self.system.len();
        self.order = order;
        self.y = vec![Vector2::zeros(); length];
        self.u = vec![Vector2::zeros(); length];
        self.z = vec![0.0; length];
        self.n = vec![0.0; length];
        self.v = vec![0.0; length];
        self.band_n = vec![BandIndices::zeros(); length];
        self.c = vec![AberrationTensor::zeros(order); length];
        self.d = vec![AberrationTensor::zeros(order); length];
    }

    fn pair(&self, i: usize) -> RayPair {
        Matrix2::new(
            self.y[i][MARGINAL],
            self.y[i][CHIEF],
            self.u[i][MARGINAL],
            self.u[i][CHIEF],
        )
    }

    /// Traces elements `start..stop` (default: to the end), threading the state
    /// of element `start - 1` forward.
    pub fn propagate(&mut self, start: usize, stop: Option<usize>) -> Result<()> {
        let length = self.system.len();
        let stop = stop.unwrap_or(length);
        if start >= stop || stop > length {
            return Err(TraceError::Configuration(format!(
                "invalid propagation range {}..{} for {} elements",
                start, stop, length
            )));
        }
        let (mut yu0, mut n0, mut z) = if start == OBJECT_INDEX {
            (self.pair(OBJECT_INDEX), None, 0.0)
        } else {
            (
                self.pair(start - 1),
                Some(self.band_n[start - 1]),
                self.z[start - 1],
            )
        };

        for i in start..stop {
            let element = self.system.element(i);
            if i > OBJECT_INDEX {
                z += element.thickness();
            }
            let (yu, n) = element.propagate_paraxial(&yu0, n0.as_ref(), &self.band);
            self.y[i] = Vector2::new(yu[(0, MARGINAL)], yu[(0, CHIEF)]);
            self.u[i] = Vector2::new(yu[(1, MARGINAL)], yu[(1, CHIEF)]);
            self.n[i] = n[0];
            self.band_n[i] = n;
            self.z[i] = z;
            match n0 {
                Some(n0) => {
                    let u0 = Vector2::new(yu0[(1, MARGINAL)], yu0[(1, CHIEF)]);
                    let (mono, chroma) = element.aberration(&self.y[i], &u0, &n0, &n, self.order);
                    self.c[i].copy_from(&mono);
                    self.d[i].copy_from(&chroma);
                }
                None => {
                    self.c[i].clear();
                    self.d[i].clear();
                }
            }
            self.v[i] = element.dispersion(&self.band);
            trace!(
                "paraxial surface {}: y = ({:.6}, {:.6}), u = ({:.6}, {:.6}), n = {:.6}",
                i,
                self.y[i][MARGINAL],
                self.y[i][CHIEF],
                self.u[i][MARGINAL],
                self.u[i][CHIEF],
                self.n[i]
            );
            yu0 = yu;
            n0 = Some(n);
        }
        self.add_fifth_order(start, stop);
        Ok(())
    }

    /// Adds the fifth-order sums of elements `start..stop`, fitted to exact
    /// ray fans from the object. They stay zero when a fan ray fails.
    fn add_fifth_order(&mut self, start: usize, stop: usize) {
        let fitted = match expansion::expand(
            &self.system,
            &self.y[..stop],
            &self.u[..stop],
            &self.n[..stop],
        ) {
            Some(fitted) => fitted,
            None => {
                debug!("fifth-order sums skipped: a fan ray fails before element {}", stop);
                return;
            }
        };
        for i in start.max(1)..stop {
            self.c[i].add_seidel5(&fitted[i].fifth);
            trace!(
                "surface {}: fitted SA3 {:.6e} against {:.6e}",
                i,
                fitted[i].third.spherical,
                self.c[i].seidel3().spherical
            );
        }
    }

    /// Solves the object-space marginal and chief rays from the aperture stop
    /// radius and the object radius.
    ///
    /// With an infinite conjugate the marginal ray enters parallel to the axis
    /// and the chief ray slope is the field; with a finite one the marginal ray
    /// leaves the axial object point and the chief ray the field edge. Either
    /// way the marginal ray grazes the stop edge and the chief ray crosses its
    /// center.
    pub fn find_rays(&mut self) -> Result<()> {
        let ai = self.system.aperture_index();
        let m = self.system.paraxial_matrix(OBJECT_INDEX, ai + 1);
        let mi = m.try_inverse().ok_or_else(|| {
            TraceError::Domain("paraxial matrix up to the aperture stop is singular".to_string())
        })?;
        let finite = self.system.object().is_finite();
        let m = if finite {
            Matrix2::new(mi[(1, 0)], mi[(1, 1)], mi[(0, 0)], mi[(0, 1)])
        } else {
            mi
        };
        if m[(1, 1)] == 0.0 {
            return Err(TraceError::Domain(format!(
                "stop at element {} admits no {} conjugate solution",
                ai,
                if finite { "finite" } else { "infinite" }
            )));
        }
        let r = self.system.aperture().radius();
        let c = self.system.object().radius;
        let marginal = r * m[(0, 0)] - r * m[(0, 1)] * m[(1, 0)] / m[(1, 1)];
        let chief = c * m[(0, 1)] / m[(1, 1)];
        if finite {
            self.y[OBJECT_INDEX] = Vector2::new(0.0, c);
            self.u[OBJECT_INDEX] = Vector2::new(marginal, chief);
        } else {
            self.y[OBJECT_INDEX] = Vector2::new(marginal, chief);
            self.u[OBJECT_INDEX] = Vector2::new(0.0, c);
        }
        debug!(
            "object-space rays: y = {:?}, u = {:?}",
            self.y[OBJECT_INDEX], self.u[OBJECT_INDEX]
        );
        Ok(())
    }

    pub fn system(&self) -> &OpticalSystem {
        &self.system
    }

    pub(crate) fn system_mut(&mut self) -> &mut OpticalSystem {
        &mut self.system
    }

    pub fn into_system(self) -> OpticalSystem {
        self.system
    }

    pub fn wavelengths(&self) -> &Wavelengths {
        &self.band
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn image_index(&self) -> usize {
        self.image
    }

    pub fn last_optical_index(&self) -> usize {
        self.last_optical
    }

    /// Heights `[marginal, chief]` per element.
    pub fn y(&self) -> &[Vector2<f64>] {
        &self.y
    }

    /// Slopes `[marginal, chief]` per element.
    pub fn u(&self) -> &[Vector2<f64>] {
        &self.u
    }

    pub fn z(&self) -> &[f64] {
        &self.z
    }

    pub fn n(&self) -> &[f64] {
        &self.n
    }

    pub fn v(&self) -> &[f64] {
        &self.v
    }

    pub fn c(&self) -> &[AberrationTensor] {
        &self.c
    }

    pub fn d(&self) -> &[AberrationTensor] {
        &self.d
    }

    /// `n (u_m y_c - u_c y_m)` evaluated after element `i`.
    pub fn lagrange_at(&self, i: usize) -> f64 {
        self.n[i] * (self.u[i][MARGINAL] * self.y[i][CHIEF] - self.u[i][CHIEF] * self.y[i][MARGINAL])
    }

    pub fn lagrange(&self) -> f64 {
        self.lagrange_at(OBJECT_INDEX)
    }

    pub fn track(&self) -> f64 {
        self.z[self.last_optical] - self.z[1]
    }

    pub fn focal_length(&self) -> f64 {
        let (o, l) = (OBJECT_INDEX, self.last_optical);
        -self.lagrange()
            / self.n[o]
            / (self.u[o][MARGINAL] * self.u[l][CHIEF] - self.u[o][CHIEF] * self.u[l][MARGINAL])
    }

    /// Object and image chief ray heights.
    pub fn height(&self) -> (f64, f64) {
        (self.y[OBJECT_INDEX][CHIEF], self.y[self.image][CHIEF])
    }

    /// Front and back focal distances from the first and last surfaces.
    pub fn focal_distance(&self) -> (f64, f64) {
        let l = self.last_optical;
        (
            -self.y[1][MARGINAL] / self.u[OBJECT_INDEX][MARGINAL],
            -self.y[l][MARGINAL] / self.u[l][MARGINAL],
        )
    }

    pub fn numerical_aperture(&self) -> (f64, f64) {
        let l = self.last_optical;
        (
            (self.n[OBJECT_INDEX] * sinarctan(self.u[OBJECT_INDEX][MARGINAL])).abs(),
            (self.n[l] * sinarctan(self.u[l][MARGINAL])).abs(),
        )
    }

    /// Entrance pupil position relative to the first surface and exit pupil
    /// position relative to the last one.
    pub fn pupil_position(&self) -> (f64, f64) {
        let l = self.last_optical;
        (
            -self.y[1][CHIEF] / self.u[OBJECT_INDEX][CHIEF],
            -self.y[l][CHIEF] / self.u[l][CHIEF],
        )
    }

    pub fn pupil_height(&self) -> (f64, f64) {
        let (p0, p1) = self.pupil_position();
        let l = self.last_optical;
        (
            self.y[1][MARGINAL] + p0 * self.u[OBJECT_INDEX][MARGINAL],
            self.y[l][MARGINAL] + p1 * self.u[l][MARGINAL],
        )
    }

    pub fn f_number(&self) -> (f64, f64) {
        let (na0, na1) = self.numerical_aperture();
        (1.0 / (2.0 * na0), 1.0 / (2.0 * na1))
    }

    pub fn airy_radius(&self) -> (f64, f64) {
        let (na0, na1) = self.numerical_aperture();
        let l = self.band.primary;
        (1.22 * l / (2.0 * na0), 1.22 * l / (2.0 * na1))
    }

    /// Transverse and angular magnification.
    pub fn magnification(&self) -> (f64, f64) {
        let (o, l) = (OBJECT_INDEX, self.last_optical);
        (
            (self.n[o] * self.u[o][MARGINAL]) / (self.n[l] * self.u[l][MARGINAL]),
            (self.n[l] * self.u[l][CHIEF]) / (self.n[o] * self.u[o][CHIEF]),
        )
    }

    /// Converts tensor sums into transverse image-space aberrations.
    fn aberration_scale(&self) -> f64 {
        self.height().1 / 2.0 / self.lagrange()
    }

    /// Per-surface third-order transverse aberrations.
    pub fn seidel3(&self) -> Vec<Seidel3> {
        let scale = self.aberration_scale();
        self.c.iter().map(|c| c.seidel3().scaled(scale)).collect()
    }

    /// Per-surface fifth-order transverse aberrations.
    pub fn seidel5(&self) -> Vec<Seidel5> {
        let scale = self.aberration_scale();
        self.c
            .iter()
            .zip(self.d.iter())
            .map(|(c, d)| (c + d).seidel5().scaled(scale))
            .collect()
    }

    /// Per-surface primary colour.
    pub fn chromatic(&self) -> Vec<Chromatic> {
        let scale = self.aberration_scale();
        self.d.iter().map(|d| d.chromatic().scaled(scale)).collect()
    }

    pub fn seidel3_total(&self) -> Seidel3 {
        self.seidel3().iter().fold(Seidel3::default(), |acc, s| Seidel3 {
            spherical: acc.spherical + s.spherical,
            coma: acc.coma + s.coma,
            astigmatism: acc.astigmatism + s.astigmatism,
            petzval: acc.petzval + s.petzval,
            distortion: acc.distortion + s.distortion,
        })
    }

    pub fn seidel5_total(&self) -> Seidel5 {
        let sums = self
            .seidel5()
            .iter()
            .fold([0.0; 9], |mut acc, s| {
                acc.iter_mut().zip(s.to_array()).for_each(|(a, v)| *a += v);
                acc
            });
        let [a, b, c, d, e, f, g, h, i] = sums;
        Seidel5 {
            spherical: a,
            coma: b,
            tangential_oblique_spherical: c,
            sagittal_oblique_spherical: d,
            tangential_elliptical_coma: e,
            sagittal_elliptical_coma: f,
            astigmatism: g,
            petzval: h,
            distortion: i,
        }
    }

    pub fn print_params(&self) -> Vec<String> {
        let g = |v: f64| crate::format::format_g(v, 5);
        let pair = |(a, b): (f64, f64)| format!("{}, {}", g(a), g(b));
        vec![
            format!("lagrange: {}", g(self.lagrange())),
            format!("track length: {}", g(self.track())),
            format!("focal length: {}", g(self.focal_length())),
            format!("object, image height: {}", pair(self.height())),
            format!("front, back focal distance: {}", pair(self.focal_distance())),
            format!("entry, exit pupil position: {}", pair(self.pupil_position())),
            format!("entry, exit pupil height: {}", pair(self.pupil_height())),
            format!("front, back numerical aperture: {}", pair(self.numerical_aperture())),
            format!("front, back working f number: {}", pair(self.f_number())),
            format!("front, back airy radius: {}", pair(self.airy_radius())),
            format!("transverse, angular magnification: {}", pair(self.magnification())),
        ]
    }

    pub fn print_trace(&self) -> Vec<String> {
        let table = DMatrix::from_fn(self.y.len(), 4, |i, j| match j {
            0 => self.y[i][MARGINAL],
            1 => self.u[i][MARGINAL],
            2 => self.y[i][CHIEF],
            _ => self.u[i][CHIEF],
        });
        self.print_coeffs(&table, &["marg y", "marg u", "chief y", "chief u"], false)
    }

    pub fn print_c3(&self) -> Vec<String> {
        let rows = self.seidel3();
        let table = DMatrix::from_fn(rows.len(), 5, |i, j| rows[i].to_array()[j]);
        self.print_coeffs(&table, &Seidel3::LABELS, true)
    }

    pub fn print_c5(&self) -> Vec<String> {
        let rows = self.seidel5();
        let table = DMatrix::from_fn(rows.len(), 9, |i, j| rows[i].to_array()[j]);
        self.print_coeffs(&table, &Seidel5::LABELS, true)
    }

    pub fn print_chromatic(&self) -> Vec<String> {
        let rows = self.chromatic();
        let table = DMatrix::from_fn(rows.len(), 2, |i, j| rows[i].to_array()[j]);
        self.print_coeffs(&table, &Chromatic::LABELS, true)
    }
}

impl Trace for ParaxialTrace {
    fn system(&self) -> &OpticalSystem {
        &self.system
    }
}

impl fmt::Display for ParaxialTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sections = [
            self.print_params(),
            self.print_trace(),
            self.print_c3(),
            self.print_c5(),
            self.print_chromatic(),
        ];
        let text = sections
            .iter()
            .map(|lines| lines.join("\n"))
            .collect::<Vec<_>>()
            .join("\n\n");
        f.write_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::{Material, LAMBDA_C, LAMBDA_D, LAMBDA_F};
    use crate::surfaces::{Element, Planar, Spherical, Stop};
    use crate::system::ObjectSpec;

    const LAMBDA: f64 = 587.56e-9;

    fn assert_err_contains<T: std::fmt::Debug>(result: Result<T>, needle: &str) {
        let err = result.expect_err("expected error");
        let message = format!("{err}");
        assert!(
            message.contains(needle),
            "expected error to contain \"{needle}\", got \"{message}\""
        );
    }

    /// Stop in front of a biconvex singlet, image plane 95 behind it.
    fn singlet_surfaces() -> Vec<Element> {
        vec![
            Stop::new(10.0, 10.0).into(),
            Spherical::new(5.0, 0.01, 12.0, Material::Constant { index: 1.5 }).into(),
            Spherical::new(4.0, -0.01, 12.0, Material::Air).into(),
            Planar::new(95.0, 0.0, Material::Air).into(),
        ]
    }

    fn infinite_singlet() -> OpticalSystem {
        OpticalSystem::new(ObjectSpec::infinite(0.05, vec![LAMBDA]), singlet_surfaces(), 1)
            .unwrap()
    }

    fn finite_singlet() -> OpticalSystem {
        let mut surfaces = singlet_surfaces();
        surfaces[0] = Stop::new(200.0, 10.0).into();
        OpticalSystem::new(ObjectSpec::finite(5.0, vec![LAMBDA]), surfaces, 1).unwrap()
    }

    #[test]
    fn rejects_small_aberration_order() {
        assert_err_contains(
            ParaxialTrace::new(
                infinite_singlet(),
                ParaxialSettings {
                    aberration_order: 2,
                },
            ),
            "aberration order",
        );
    }

    #[test]
    fn rejects_invalid_range() {
        let mut trace = ParaxialTrace::trace(infinite_singlet()).unwrap();
        assert_err_contains(trace.propagate(3, Some(3)), "invalid propagation range");
        assert_err_contains(trace.propagate(0, Some(9)), "invalid propagation range");
    }

    #[test]
    fn infinite_conjugate_rays_hit_stop_edge_and_center() {
        let trace = ParaxialTrace::trace(infinite_singlet()).unwrap();
        assert_eq!(trace.u()[0][MARGINAL], 0.0);
        assert_eq!(trace.u()[0][CHIEF], 0.05);
        let stop = trace.system().aperture_index();
        assert!((trace.y()[stop][MARGINAL] - 10.0).abs() < 1e-12);
        assert!(trace.y()[stop][CHIEF].abs() < 1e-12);
    }

    #[test]
    fn finite_conjugate_rays_hit_stop_edge_and_center() {
        let trace = ParaxialTrace::trace(finite_singlet()).unwrap();
        assert_eq!(trace.y()[0][MARGINAL], 0.0);
        assert_eq!(trace.y()[0][CHIEF], 5.0);
        let m = trace.system().paraxial_matrix(0, 2);
        let at_stop = m * trace.pair(0);
        assert!((at_stop[(0, MARGINAL)] - 10.0).abs() < 1e-12);
        assert!(at_stop[(0, CHIEF)].abs() < 1e-12);
        assert!((trace.u()[0][MARGINAL] - 10.0 / 200.0).abs() < 1e-12);
    }

    #[test]
    fn stop_on_object_plane_is_degenerate() {
        let mut surfaces = singlet_surfaces();
        surfaces[0] = Stop::new(0.0, 10.0).into();
        let system =
            OpticalSystem::new(ObjectSpec::finite(5.0, vec![LAMBDA]), surfaces, 1).unwrap();
        assert_err_contains(
            ParaxialTrace::new(system, ParaxialSettings::default()),
            "degenerate paraxial system",
        );
    }

    #[test]
    fn lagrange_invariant_is_conserved() {
        for system in [infinite_singlet(), finite_singlet()] {
            let trace = ParaxialTrace::trace(system).unwrap();
            let h = trace.lagrange();
            assert!(h.abs() > 0.0);
            for i in 0..trace.system().len() {
                assert!((trace.lagrange_at(i) - h).abs() < 1e-12 * h.abs().max(1.0));
            }
        }
    }

    #[test]
    fn thick_lens_focal_length_matches_lensmaker() {
        let trace = ParaxialTrace::trace(infinite_singlet()).unwrap();
        // 1/f = (n-1)(c1 - c2) + (n-1)^2 t c1 c2 / n
        let (n, c1, c2, t) = (1.5, 0.01, -0.01, 4.0);
        let power = (n - 1.0) * (c1 - c2) + (n - 1.0) * (n - 1.0) * t * c1 * c2 / n;
        assert!((trace.focal_length() - 1.0 / power).abs() < 1e-9);
        let slope = 10.0 / trace.focal_length();
        assert!((trace.f_number().1 - 1.0 / (2.0 * sinarctan(slope))).abs() < 1e-9);
        assert!((trace.track() - 9.0).abs() < 1e-12);
    }

    #[test]
    fn pupils_of_front_stop() {
        let trace = ParaxialTrace::trace(infinite_singlet()).unwrap();
        let (entrance, _) = trace.pupil_position();
        let (entrance_height, _) = trace.pupil_height();
        // The stop is element 1 and therefore its own entrance pupil.
        assert!(entrance.abs() < 1e-12);
        assert!((entrance_height - 10.0).abs() < 1e-12);
        let (na0, _) = trace.numerical_aperture();
        assert_eq!(na0, 0.0);
    }

    #[test]
    fn partial_propagation_matches_full() {
        let full = ParaxialTrace::trace(infinite_singlet()).unwrap();
        let mut partial = ParaxialTrace::new(infinite_singlet(), ParaxialSettings::default()).unwrap();
        partial.propagate(0, Some(3)).unwrap();
        partial.propagate(3, None).unwrap();
        for i in 0..full.system().len() {
            assert!((full.y()[i] - partial.y()[i]).norm() < 1e-15);
            assert!((full.z()[i] - partial.z()[i]).abs() < 1e-15);
        }
        assert_eq!(full.seidel3(), partial.seidel3());
        assert_eq!(full.seidel5(), partial.seidel5());
    }

    #[test]
    fn seidel_sums_of_stop_and_planes_vanish() {
        let trace = ParaxialTrace::trace(infinite_singlet()).unwrap();
        let rows = trace.seidel3();
        for i in [0, 1, 4] {
            assert_eq!(rows[i], Seidel3::default());
        }
        let total = trace.seidel3_total();
        assert!(total.spherical != 0.0);
        assert!(total.petzval != 0.0);
        assert_eq!(trace.chromatic()[2], Chromatic::default());
    }

    #[test]
    fn fifth_order_sums_are_filled_for_curved_surfaces() {
        let trace = ParaxialTrace::trace(infinite_singlet()).unwrap();
        let rows = trace.seidel5();
        assert_eq!(rows[0], Seidel5::default());
        for i in [2, 3] {
            assert!(rows[i].spherical != 0.0);
            assert!(rows[i].distortion != 0.0);
        }
        let total = trace.seidel5_total();
        let sum: f64 = rows.iter().map(|r| r.spherical).sum();
        assert!((total.spherical - sum).abs() < 1e-15);
    }

    #[test]
    fn petzval_sum_matches_closed_form() {
        let trace = ParaxialTrace::trace(infinite_singlet()).unwrap();
        let h = trace.lagrange();
        let raw: f64 = trace.c().iter().map(|c| c.seidel3().petzval).sum();
        // S_IV = -H² Σ c Δ(1/n)
        let expected = -h * h * (0.01 * (1.0 / 1.5 - 1.0) + (-0.01) * (1.0 - 1.0 / 1.5));
        assert!((raw - expected).abs() < 1e-12);
    }

    #[test]
    fn glass_adds_axial_colour() {
        let mut surfaces = singlet_surfaces();
        let glass = Material::Abbe {
            nd: 1.5168,
            vd: 64.17,
        };
        surfaces[1] = Spherical::new(5.0, 0.01, 12.0, glass).into();
        let object = ObjectSpec::infinite(0.05, vec![LAMBDA_D, LAMBDA_F, LAMBDA_C]);
        let trace = ParaxialTrace::trace(OpticalSystem::new(object, surfaces, 1).unwrap()).unwrap();
        let colour: f64 = trace.chromatic().iter().map(|c| c.axial).sum();
        assert!(colour != 0.0);
        assert!((trace.v()[2] - 64.17).abs() < 1e-6);
        assert!(trace.v()[3].is_infinite());
    }

    #[test]
    fn report_sections_are_rendered() {
        let trace = ParaxialTrace::trace(infinite_singlet()).unwrap();
        assert_eq!(trace.print_trace().len(), 1 + 5);
        assert_eq!(trace.print_c3().len(), 1 + 5 + 1);
        assert_eq!(trace.print_c5().len(), 1 + 5 + 1);
        let text = trace.to_string();
        assert!(text.starts_with("lagrange: "));
        assert!(text.contains("SA3"));
        assert!(text.contains("TOBSA5"));
        assert!(text.contains("PLC"));
    }

    #[test]
    fn angle_converters_are_inverse() {
        for u in [-0.7, -0.1, 0.0, 0.3, 2.0] {
            assert!((tanarcsin(sinarctan(u)) - u).abs() < 1e-12);
        }
    }
}
