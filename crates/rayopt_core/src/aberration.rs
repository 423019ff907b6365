//! Aberration coefficient tensors and their named Seidel read-outs.
//!
//! A surface contribution is stored as `t[component][kind][i][j][k]`: the
//! transverse component, the kind of term (field-type `0`, aperture-type `1`),
//! and the exponents of the three rotational invariants. Only the fixed entries
//! read by [`Seidel3`], [`Seidel5`] and [`Chromatic`] carry meaning for the
//! built-in surfaces; everything else stays zero.

use serde::{Deserialize, Serialize};
use std::ops::Add;

const FIELD: usize = 0;
const APERTURE: usize = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct AberrationTensor {
    order: usize,
    data: Vec<f64>,
}

impl AberrationTensor {
    /// Tensor of shape `(2, 2, order, order, order)` filled with zeros.
    pub fn zeros(order: usize) -> Self {
        Self {
            order,
            data: vec![0.0; 4 * order * order * order],
        }
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    fn offset(&self, component: usize, kind: usize, exponents: [usize; 3]) -> usize {
        let k = self.order;
        debug_assert!(component < 2 && kind < 2);
        debug_assert!(exponents.iter().all(|&e| e < k));
        (((component * 2 + kind) * k + exponents[0]) * k + exponents[1]) * k + exponents[2]
    }

    pub fn get(&self, component: usize, kind: usize, exponents: [usize; 3]) -> f64 {
        self.data[self.offset(component, kind, exponents)]
    }

    pub fn set(&mut self, component: usize, kind: usize, exponents: [usize; 3], value: f64) {
        let idx = self.offset(component, kind, exponents);
        self.data[idx] = value;
    }

    /// Overwrites in place; `other` must have the same order.
    pub fn copy_from(&mut self, other: &AberrationTensor) {
        self.data.copy_from_slice(&other.data);
    }

    pub fn clear(&mut self) {
        self.data.iter_mut().for_each(|v| *v = 0.0);
    }

    fn at(&self, kind: usize, i: usize, j: usize, k: usize) -> f64 {
        self.get(0, kind, [i, j, k])
    }

    /// Third-order read-out. Each sum is a fixed combination of tensor entries.
    pub fn seidel3(&self) -> Seidel3 {
        Seidel3 {
            spherical: -2.0 * self.at(APERTURE, 1, 0, 0),
            coma: -self.at(APERTURE, 0, 1, 0),
            astigmatism: -self.at(FIELD, 0, 1, 0),
            petzval: self.at(FIELD, 0, 1, 0) - 2.0 * self.at(APERTURE, 0, 0, 1),
            distortion: -2.0 * self.at(FIELD, 0, 0, 1),
        }
    }

    /// Fifth-order read-out. Callers pass the sum of the monochromatic and
    /// chromatic tensors.
    pub fn seidel5(&self) -> Seidel5 {
        Seidel5 {
            spherical: -2.0 * self.at(APERTURE, 2, 0, 0),
            coma: -self.at(APERTURE, 1, 1, 0),
            tangential_oblique_spherical: -2.0 * self.at(FIELD, 1, 1, 0)
                - 2.0 * self.at(APERTURE, 1, 0, 1)
                + 2.0 * self.at(APERTURE, 0, 2, 0),
            sagittal_oblique_spherical: 2.0 * self.at(APERTURE, 1, 0, 1),
            tangential_elliptical_coma: -2.0 * self.at(FIELD, 1, 0, 1)
                - 2.0 * self.at(FIELD, 0, 2, 0)
                - 2.0 * self.at(APERTURE, 0, 1, 1),
            sagittal_elliptical_coma: -self.at(APERTURE, 0, 1, 1),
            astigmatism: -self.at(FIELD, 0, 1, 1) / 2.0,
            petzval: -2.0 * self.at(APERTURE, 0, 0, 2) + self.at(FIELD, 0, 1, 1) / 2.0,
            distortion: -2.0 * self.at(FIELD, 0, 0, 2),
        }
    }

    /// Primary axial and lateral colour, stored in the degree-zero entries.
    pub fn chromatic(&self) -> Chromatic {
        Chromatic {
            axial: self.at(APERTURE, 0, 0, 0),
            lateral: self.at(FIELD, 0, 0, 0),
        }
    }

    /// Adds a surface's Seidel sums so that [`AberrationTensor::seidel3`] reads
    /// them back unchanged.
    pub fn add_seidel3(&mut self, sums: &Seidel3) {
        self.accumulate(APERTURE, [1, 0, 0], -sums.spherical / 2.0);
        self.accumulate(APERTURE, [0, 1, 0], -sums.coma);
        self.accumulate(FIELD, [0, 1, 0], -sums.astigmatism);
        self.accumulate(
            APERTURE,
            [0, 0, 1],
            -(sums.astigmatism + sums.petzval) / 2.0,
        );
        self.accumulate(FIELD, [0, 0, 1], -sums.distortion / 2.0);
    }

    /// Adds fifth-order sums so that [`AberrationTensor::seidel5`] reads them
    /// back unchanged. The read-out has more entries than sums; the spare
    /// `A[0,2,0]` and `F[0,2,0]` entries stay untouched.
    pub fn add_seidel5(&mut self, sums: &Seidel5) {
        self.accumulate(APERTURE, [2, 0, 0], -sums.spherical / 2.0);
        self.accumulate(APERTURE, [1, 1, 0], -sums.coma);
        self.accumulate(APERTURE, [1, 0, 1], sums.sagittal_oblique_spherical / 2.0);
        self.accumulate(
            FIELD,
            [1, 1, 0],
            -(sums.tangential_oblique_spherical + sums.sagittal_oblique_spherical) / 2.0,
        );
        self.accumulate(APERTURE, [0, 1, 1], -sums.sagittal_elliptical_coma);
        self.accumulate(
            FIELD,
            [1, 0, 1],
            -(sums.tangential_elliptical_coma - 2.0 * sums.sagittal_elliptical_coma) / 2.0,
        );
        self.accumulate(FIELD, [0, 1, 1], -2.0 * sums.astigmatism);
        self.accumulate(
            APERTURE,
            [0, 0, 2],
            -(sums.petzval + sums.astigmatism) / 2.0,
        );
        self.accumulate(FIELD, [0, 0, 2], -sums.distortion / 2.0);
    }

    pub fn add_chromatic(&mut self, colour: &Chromatic) {
        self.accumulate(APERTURE, [0, 0, 0], colour.axial);
        self.accumulate(FIELD, [0, 0, 0], colour.lateral);
    }

    fn accumulate(&mut self, kind: usize, exponents: [usize; 3], value: f64) {
        let idx = self.offset(0, kind, exponents);
        self.data[idx] += value;
    }
}

/// Elementwise sum. Both tensors must have the same order; every tensor of a
/// [`crate::ParaxialTrace`] is allocated with the trace's order.
impl Add for &AberrationTensor {
    type Output = AberrationTensor;

    fn add(self, rhs: &AberrationTensor) -> AberrationTensor {
        debug_assert_eq!(self.order, rhs.order, "aberration tensor orders differ");
        AberrationTensor {
            order: self.order,
            data: self
                .data
                .iter()
                .zip(rhs.data.iter())
                .map(|(a, b)| a + b)
                .collect(),
        }
    }
}

/// Third-order Seidel sums.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Seidel3 {
    pub spherical: f64,
    pub coma: f64,
    pub astigmatism: f64,
    pub petzval: f64,
    pub distortion: f64,
}

impl Seidel3 {
    pub const LABELS: [&'static str; 5] = ["SA3", "CMA3", "AST3", "PTZ3", "DIS3"];

    pub fn to_array(&self) -> [f64; 5] {
        [
            self.spherical,
            self.coma,
            self.astigmatism,
            self.petzval,
            self.distortion,
        ]
    }

    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            spherical: self.spherical * factor,
            coma: self.coma * factor,
            astigmatism: self.astigmatism * factor,
            petzval: self.petzval * factor,
            distortion: self.distortion * factor,
        }
    }
}

/// Fifth-order sums (Buchdahl's nine terms).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Seidel5 {
    pub spherical: f64,
    pub coma: f64,
    pub tangential_oblique_spherical: f64,
    pub sagittal_oblique_spherical: f64,
    pub tangential_elliptical_coma: f64,
    pub sagittal_elliptical_coma: f64,
    pub astigmatism: f64,
    pub petzval: f64,
    pub distortion: f64,
}

impl Seidel5 {
    pub const LABELS: [&'static str; 9] = [
        "SA5", "CMA5", "TOBSA5", "SOBSA5", "TECMA5", "SECMA5", "AST5", "PTZ5", "DIS5",
    ];

    pub fn to_array(&self) -> [f64; 9] {
        [
            self.spherical,
            self.coma,
            self.tangential_oblique_spherical,
            self.sagittal_oblique_spherical,
            self.tangential_elliptical_coma,
            self.sagittal_elliptical_coma,
            self.astigmatism,
            self.petzval,
            self.distortion,
        ]
    }

    pub fn scaled(&self, factor: f64) -> Self {
        let [a, b, c, d, e, f, g, h, i] = self.to_array().map(|v| v * factor);
        Self {
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
}

/// Primary longitudinal and transverse colour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Chromatic {
    pub axial: f64,
    pub lateral: f64,
}

impl Chromatic {
    pub const LABELS: [&'static str; 2] = ["PLC", "PTC"];

    pub fn to_array(&self) -> [f64; 2] {
        [self.axial, self.lateral]
    }

    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            axial: self.axial * factor,
            lateral: self.lateral * factor,
        }
    }
}
