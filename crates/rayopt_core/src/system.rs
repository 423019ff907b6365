//! Sequential optical system description.
//!
//! Elements are indexed with the object plane at [`OBJECT_INDEX`], the image
//! plane last and the last optical surface just before it.

use crate::error::{Result, TraceError};
use crate::material::Material;
use crate::surfaces::{Element, Planar};
use crate::traits::Surface;
use nalgebra::Matrix2;
use serde::{Deserialize, Serialize};

pub const OBJECT_INDEX: usize = 0;

/// The trace band: the primary wavelength plus the extremes of the list.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Wavelengths {
    pub primary: f64,
    pub short: f64,
    pub long: f64,
}

impl Wavelengths {
    pub fn new(list: &[f64]) -> Result<Self> {
        let primary = *list.first().ok_or_else(|| {
            TraceError::Configuration("object needs at least one wavelength".to_string())
        })?;
        if list.iter().any(|l| !l.is_finite() || *l <= 0.0) {
            return Err(TraceError::Configuration(
                "wavelengths must be positive and finite".to_string(),
            ));
        }
        let short = list.iter().copied().fold(f64::INFINITY, f64::min);
        let long = list.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Ok(Self {
            primary,
            short,
            long,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Conjugate {
    Finite,
    Infinite,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectSpec {
    pub conjugate: Conjugate,
    /// Object height for a finite conjugate; slope of the edge-of-field chief
    /// ray (tangent of the half field angle) for an infinite one.
    pub radius: f64,
    /// Primary wavelength first.
    pub wavelengths: Vec<f64>,
    #[serde(default)]
    pub material: Material,
}

impl ObjectSpec {
    pub fn finite(radius: f64, wavelengths: Vec<f64>) -> Self {
        Self {
            conjugate: Conjugate::Finite,
            radius,
            wavelengths,
            material: Material::Air,
        }
    }

    pub fn infinite(radius: f64, wavelengths: Vec<f64>) -> Self {
        Self {
            conjugate: Conjugate::Infinite,
            radius,
            wavelengths,
            material: Material::Air,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.conjugate == Conjugate::Finite
    }

    pub fn refractive_index(&self, wavelength: f64) -> f64 {
        self.material.refractive_index(wavelength, 1.0)
    }
}

/// Serialized form of a system: `surfaces` lists everything after the object
/// plane, ending with the image plane. `aperture_index` counts the object
/// plane as element 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemDescription {
    pub object: ObjectSpec,
    pub surfaces: Vec<Element>,
    pub aperture_index: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "SystemDescription", into = "SystemDescription")]
pub struct OpticalSystem {
    object: ObjectSpec,
    elements: Vec<Element>,
    aperture_index: usize,
    band: Wavelengths,
}

impl OpticalSystem {
    pub fn new(object: ObjectSpec, surfaces: Vec<Element>, aperture_index: usize) -> Result<Self> {
        let band = Wavelengths::new(&object.wavelengths)?;
        if surfaces.len() < 2 {
            return Err(TraceError::Configuration(format!(
                "system needs an optical surface and an image plane, got {} surfaces",
                surfaces.len()
            )));
        }
        let length = surfaces.len() + 1;
        if aperture_index == OBJECT_INDEX || aperture_index >= length - 1 {
            return Err(TraceError::Configuration(format!(
                "aperture index {} must name an optical surface in 1..={}",
                aperture_index,
                length - 2
            )));
        }
        let plane_radius = if object.is_finite() { object.radius.abs() } else { 0.0 };
        let mut elements = Vec::with_capacity(length);
        elements.push(Element::Planar(Planar::new(
            0.0,
            plane_radius,
            object.material.clone(),
        )));
        elements.extend(surfaces);
        Ok(Self {
            object,
            elements,
            aperture_index,
            band,
        })
    }

    /// Number of elements including object and image planes.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn image_index(&self) -> usize {
        self.elements.len() - 1
    }

    pub fn last_optical_index(&self) -> usize {
        self.elements.len() - 2
    }

    pub fn object(&self) -> &ObjectSpec {
        &self.object
    }

    pub fn band(&self) -> &Wavelengths {
        &self.band
    }

    pub fn aperture_index(&self) -> usize {
        self.aperture_index
    }

    pub fn aperture(&self) -> &Element {
        &self.elements[self.aperture_index]
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn element(&self, index: usize) -> &Element {
        &self.elements[index]
    }

    pub(crate) fn element_mut(&mut self, index: usize) -> &mut Element {
        &mut self.elements[index]
    }

    pub fn type_codes(&self) -> Vec<&'static str> {
        let image = self.image_index();
        self.elements
            .iter()
            .enumerate()
            .map(|(i, e)| match i {
                OBJECT_INDEX => "O",
                i if i == image => "I",
                _ => e.type_code(),
            })
            .collect()
    }

    /// Paraxial matrix at the primary wavelength mapping `(y, u)` on the
    /// object plane to the state after element `stop - 1`, accumulating only
    /// elements in `start..stop`.
    pub fn paraxial_matrix(&self, start: usize, stop: usize) -> Matrix2<f64> {
        let primary = self.band.primary;
        let mut n = self.object.refractive_index(primary);
        let mut m = Matrix2::identity();
        for (i, element) in self.elements.iter().enumerate().take(stop).skip(1) {
            let n1 = element.refractive_index(primary, n);
            if i >= start {
                m = element.paraxial_matrix(n, n1) * m;
            }
            n = n1;
        }
        m
    }
}

impl TryFrom<SystemDescription> for OpticalSystem {
    type Error = TraceError;

    fn try_from(value: SystemDescription) -> Result<Self> {
        OpticalSystem::new(value.object, value.surfaces, value.aperture_index)
    }
}

impl From<OpticalSystem> for SystemDescription {
    fn from(value: OpticalSystem) -> Self {
        let OpticalSystem {
            object,
            mut elements,
            aperture_index,
            ..
        } = value;
        elements.remove(OBJECT_INDEX);
        SystemDescription {
            object,
            surfaces: elements,
            aperture_index,
        }
    }
}
