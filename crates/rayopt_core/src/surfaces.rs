//! Concrete surface variants and the tagged [`Element`] used by
//! [`OpticalSystem`](crate::system::OpticalSystem).

use crate::error::{Result, TraceError};
use crate::material::Material;
use crate::traits::Surface;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

const NEWTON_STEPS: usize = 32;
const NEWTON_TOLERANCE: f64 = 1e-13;

/// Nearest intersection of a ray with the conic `c(x²+y²+(1+k)z²) = 2z`.
///
/// The ray is first moved to the vertex tangent plane; the remaining quadratic
/// is solved in the cancellation-free form.
pub fn conic_intersect(c: f64, k: f64, p: &Vector3<f64>, d: &Vector3<f64>) -> Option<f64> {
    if d.z == 0.0 {
        return None;
    }
    let s0 = -p.z / d.z;
    if c == 0.0 {
        return Some(s0);
    }
    let q = p + d * s0;
    let a = c * (d.x * d.x + d.y * d.y + (1.0 + k) * d.z * d.z);
    let h = c * (q.x * d.x + q.y * d.y) - d.z;
    let f = c * (q.x * q.x + q.y * q.y);
    let disc = h * h - a * f;
    if disc < 0.0 {
        return None;
    }
    let den = h + h.signum() * disc.sqrt();
    if den == 0.0 {
        return None;
    }
    Some(s0 - f / den)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spherical {
    pub thickness: f64,
    pub curvature: f64,
    #[serde(default)]
    pub radius: f64,
    #[serde(default)]
    pub material: Material,
}

impl Spherical {
    pub fn new(thickness: f64, curvature: f64, radius: f64, material: Material) -> Self {
        Self {
            thickness,
            curvature,
            radius,
            material,
        }
    }
}

impl Surface for Spherical {
    fn type_code(&self) -> &'static str {
        "S"
    }

    fn thickness(&self) -> f64 {
        self.thickness
    }

    fn radius(&self) -> f64 {
        self.radius
    }

    fn material(&self) -> &Material {
        &self.material
    }

    fn curvature(&self) -> f64 {
        self.curvature
    }
}

/// Flat refracting or reflecting surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Planar {
    pub thickness: f64,
    #[serde(default)]
    pub radius: f64,
    #[serde(default)]
    pub material: Material,
}

impl Planar {
    pub fn new(thickness: f64, radius: f64, material: Material) -> Self {
        Self {
            thickness,
            radius,
            material,
        }
    }
}

impl Surface for Planar {
    fn type_code(&self) -> &'static str {
        "P"
    }

    fn thickness(&self) -> f64 {
        self.thickness
    }

    fn radius(&self) -> f64 {
        self.radius
    }

    fn material(&self) -> &Material {
        &self.material
    }
}

/// Even asphere: a conic plus `coefficients[j] * r^(2j + 4)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aspheric {
    pub thickness: f64,
    pub curvature: f64,
    #[serde(default)]
    pub conic: f64,
    #[serde(default)]
    pub coefficients: Vec<f64>,
    #[serde(default)]
    pub radius: f64,
    #[serde(default)]
    pub material: Material,
}

impl Aspheric {
    fn polynomial(&self, r2: f64) -> (f64, f64) {
        let mut sag = 0.0;
        let mut slope = 0.0;
        let mut power = r2;
        for (j, a) in self.coefficients.iter().enumerate() {
            slope += (j as f64 + 2.0) * a * power;
            power *= r2;
            sag += a * power;
        }
        (sag, slope)
    }

    fn base_sag(&self, r2: f64) -> f64 {
        let c = self.curvature;
        c * r2 / (1.0 + (1.0 - (1.0 + self.conic) * c * c * r2).sqrt())
    }

    fn base_slope(&self, r2: f64) -> f64 {
        let c = self.curvature;
        c / (2.0 * (1.0 - (1.0 + self.conic) * c * c * r2).sqrt())
    }
}

impl Surface for Aspheric {
    fn type_code(&self) -> &'static str {
        "K"
    }

    fn thickness(&self) -> f64 {
        self.thickness
    }

    fn radius(&self) -> f64 {
        self.radius
    }

    fn material(&self) -> &Material {
        &self.material
    }

    fn curvature(&self) -> f64 {
        self.curvature
    }

    fn conic(&self) -> f64 {
        self.conic
    }

    fn departure(&self) -> f64 {
        let a4 = self.coefficients.first().copied().unwrap_or(0.0);
        self.conic * self.curvature.powi(3) / 8.0 + a4
    }

    fn sag(&self, r2: f64) -> f64 {
        self.base_sag(r2) + self.polynomial(r2).0
    }

    fn sag_slope(&self, r2: f64) -> f64 {
        self.base_slope(r2) + self.polynomial(r2).1
    }

    fn normal(&self, q: &Vector3<f64>) -> Vector3<f64> {
        let s = self.sag_slope(q.x * q.x + q.y * q.y);
        Vector3::new(-2.0 * s * q.x, -2.0 * s * q.y, 1.0).normalize()
    }

    fn intersect(&self, p: &Vector3<f64>, d: &Vector3<f64>) -> Option<f64> {
        let mut s = conic_intersect(self.curvature, self.conic, p, d)?;
        if self.coefficients.is_empty() {
            return Some(s);
        }
        for _ in 0..NEWTON_STEPS {
            let q = p + d * s;
            let r2 = q.x * q.x + q.y * q.y;
            let g = q.z - self.sag(r2);
            let dg = d.z - 2.0 * self.sag_slope(r2) * (q.x * d.x + q.y * d.y);
            if !g.is_finite() || !dg.is_finite() || dg == 0.0 {
                return None;
            }
            let step = g / dg;
            s -= step;
            if step.abs() <= NEWTON_TOLERANCE * (1.0 + s.abs()) {
                return Some(s);
            }
        }
        None
    }
}

/// Aperture stop. Optically a plane; its radius fixes the marginal ray.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    pub thickness: f64,
    pub radius: f64,
    #[serde(default)]
    pub material: Material,
}

impl Stop {
    pub fn new(thickness: f64, radius: f64) -> Self {
        Self {
            thickness,
            radius,
            material: Material::Air,
        }
    }
}

impl Surface for Stop {
    fn type_code(&self) -> &'static str {
        "A"
    }

    fn thickness(&self) -> f64 {
        self.thickness
    }

    fn radius(&self) -> f64 {
        self.radius
    }

    fn material(&self) -> &Material {
        &self.material
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Element {
    Spherical(Spherical),
    Planar(Planar),
    Aspheric(Aspheric),
    Stop(Stop),
}

impl Element {
    pub fn as_surface(&self) -> &dyn Surface {
        match self {
            Element::Spherical(s) => s,
            Element::Planar(s) => s,
            Element::Aspheric(s) => s,
            Element::Stop(s) => s,
        }
    }

    pub fn set_thickness(&mut self, thickness: f64) {
        match self {
            Element::Spherical(s) => s.thickness = thickness,
            Element::Planar(s) => s.thickness = thickness,
            Element::Aspheric(s) => s.thickness = thickness,
            Element::Stop(s) => s.thickness = thickness,
        }
    }

    pub fn set_radius(&mut self, radius: f64) {
        match self {
            Element::Spherical(s) => s.radius = radius,
            Element::Planar(s) => s.radius = radius,
            Element::Aspheric(s) => s.radius = radius,
            Element::Stop(s) => s.radius = radius,
        }
    }

    pub fn set_curvature(&mut self, curvature: f64) -> Result<()> {
        match self {
            Element::Spherical(s) => s.curvature = curvature,
            Element::Aspheric(s) => s.curvature = curvature,
            Element::Planar(_) | Element::Stop(_) => {
                return Err(TraceError::Configuration(format!(
                    "{} surface has no curvature to solve for",
                    self.type_code()
                )))
            }
        }
        Ok(())
    }
}

impl Surface for Element {
    fn type_code(&self) -> &'static str {
        self.as_surface().type_code()
    }

    fn thickness(&self) -> f64 {
        self.as_surface().thickness()
    }

    fn radius(&self) -> f64 {
        self.as_surface().radius()
    }

    fn material(&self) -> &Material {
        self.as_surface().material()
    }

    fn curvature(&self) -> f64 {
        self.as_surface().curvature()
    }

    fn conic(&self) -> f64 {
        self.as_surface().conic()
    }

    fn departure(&self) -> f64 {
        self.as_surface().departure()
    }

    fn sag(&self, r2: f64) -> f64 {
        self.as_surface().sag(r2)
    }

    fn sag_slope(&self, r2: f64) -> f64 {
        self.as_surface().sag_slope(r2)
    }

    fn intersect(&self, p: &Vector3<f64>, d: &Vector3<f64>) -> Option<f64> {
        self.as_surface().intersect(p, d)
    }

    fn normal(&self, q: &Vector3<f64>) -> Vector3<f64> {
        self.as_surface().normal(q)
    }
}

impl From<Spherical> for Element {
    fn from(value: Spherical) -> Self {
        Element::Spherical(value)
    }
}

impl From<Planar> for Element {
    fn from(value: Planar) -> Self {
        Element::Planar(value)
    }
}

impl From<Aspheric> for Element {
    fn from(value: Aspheric) -> Self {
        Element::Aspheric(value)
    }
}

impl From<Stop> for Element {
    fn from(value: Stop) -> Self {
        Element::Stop(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::BandIndices;
    use crate::system::Wavelengths;
    use nalgebra::Matrix2;

    #[test]
    fn conic_intersect_hits_sphere_on_axis_and_off_axis() {
        let d = Vector3::new(0.0, 0.0, 1.0);
        let s = conic_intersect(0.1, 0.0, &Vector3::new(0.0, 0.0, -5.0), &d).unwrap();
        assert!((s - 5.0).abs() < 1e-12);

        // Sphere of radius 10: sag at height 6 is 10 - 8 = 2.
        let s = conic_intersect(0.1, 0.0, &Vector3::new(6.0, 0.0, -5.0), &d).unwrap();
        assert!((s - 7.0).abs() < 1e-12);
    }

    #[test]
    fn conic_intersect_reports_miss() {
        let d = Vector3::new(0.0, 0.0, 1.0);
        assert!(conic_intersect(0.1, 0.0, &Vector3::new(20.0, 0.0, -5.0), &d).is_none());
        assert!(conic_intersect(0.1, 0.0, &Vector3::zeros(), &Vector3::new(1.0, 0.0, 0.0)).is_none());
    }

    #[test]
    fn aspheric_intersection_lands_on_sag() {
        let surface = Aspheric {
            thickness: 0.0,
            curvature: 0.05,
            conic: -0.5,
            coefficients: vec![1e-5, -2e-8],
            radius: 0.0,
            material: Material::Air,
        };
        let p = Vector3::new(3.0, 1.0, -2.0);
        let d = Vector3::new(0.05, -0.02, 1.0).normalize();
        let s = surface.intersect(&p, &d).unwrap();
        let q = p + d * s;
        assert!((q.z - surface.sag(q.x * q.x + q.y * q.y)).abs() < 1e-10);
    }

    #[test]
    fn aspheric_normal_matches_sphere_without_terms() {
        let asphere = Aspheric {
            thickness: 0.0,
            curvature: 0.02,
            conic: 0.0,
            coefficients: vec![],
            radius: 0.0,
            material: Material::Air,
        };
        let sphere = Spherical::new(0.0, 0.02, 0.0, Material::Air);
        let r2: f64 = 16.0 + 9.0;
        let q = Vector3::new(4.0, 3.0, sphere.sag(r2));
        assert!((asphere.normal(&q) - sphere.normal(&q)).norm() < 1e-12);
    }

    #[test]
    fn refraction_obeys_snell() {
        let surface = Planar::new(0.0, 0.0, Material::Constant { index: 1.5 });
        let d = Vector3::new(0.3f64.sin(), 0.0, 0.3f64.cos());
        let (_, u, _) = surface
            .propagate(&Vector3::new(0.0, 0.0, -1.0), &d, 1.0, 1.5, true)
            .unwrap();
        assert!((u.x * 1.5 - d.x).abs() < 1e-12);
        assert!((u.norm() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn total_internal_reflection_invalidates_ray() {
        let surface = Planar::new(0.0, 0.0, Material::Air);
        let d = Vector3::new(0.8, 0.0, 0.6);
        assert!(surface
            .propagate(&Vector3::new(0.0, 0.0, -1.0), &d, 1.5, 1.0, true)
            .is_none());
    }

    #[test]
    fn clear_aperture_clips_when_requested() {
        let surface = Planar::new(0.0, 1.0, Material::Air);
        let d = Vector3::new(0.0, 0.0, 1.0);
        let p = Vector3::new(2.0, 0.0, -1.0);
        assert!(surface.propagate(&p, &d, 1.0, 1.0, true).is_none());
        assert!(surface.propagate(&p, &d, 1.0, 1.0, false).is_some());
    }

    #[test]
    fn mirror_reverses_axial_direction() {
        let mirror = Spherical::new(0.0, -0.01, 0.0, Material::Mirror);
        let d = Vector3::new(0.0, 0.0, 1.0);
        let (_, u, _) = mirror
            .propagate(&Vector3::new(0.0, 0.0, -1.0), &d, 1.0, -1.0, true)
            .unwrap();
        assert!((u - Vector3::new(0.0, 0.0, -1.0)).norm() < 1e-12);

        let n0 = BandIndices::repeat(1.0);
        let band = Wavelengths::new(&[587.6e-9]).unwrap();
        let (_, n) = mirror.propagate_paraxial(&Matrix2::identity(), Some(&n0), &band);
        assert_eq!(n[0], -1.0);
    }

    #[test]
    fn curvature_solve_rejects_flat_surfaces() {
        let mut element: Element = Stop::new(1.0, 2.0).into();
        assert!(element.set_curvature(0.1).is_err());
        let mut element: Element = Spherical::new(1.0, 0.0, 2.0, Material::Air).into();
        element.set_curvature(0.1).unwrap();
        assert_eq!(element.curvature(), 0.1);
    }
}
