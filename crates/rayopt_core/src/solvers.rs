//! Curvature and thickness solves on top of a completed paraxial trace.
//!
//! Solves mutate the trace's system snapshot only; call
//! [`ParaxialTrace::propagate`] afterwards to refresh the arrays.

use crate::error::{Result, TraceError};
use crate::paraxial::{ParaxialTrace, CHIEF, MARGINAL};
use crate::system::OBJECT_INDEX;
use crate::traits::Surface;
use log::debug;

impl ParaxialTrace {
    /// Sets every element's clear radius to `|y_marginal| + |y_chief|`.
    pub fn size_elements(&mut self) {
        let radii: Vec<f64> = self
            .y()
            .iter()
            .map(|y| y[MARGINAL].abs() + y[CHIEF].abs())
            .collect();
        let system = self.system_mut();
        for (i, radius) in radii.into_iter().enumerate().skip(1) {
            system.element_mut(i).set_radius(radius);
        }
    }

    /// Solves the curvature of element `index` (default: the last optical
    /// surface) for an effective focal length `f`, returning the curvature.
    ///
    /// The target image-space marginal slope is `-y_marginal(object) / f`, so
    /// the result is exact only for the last optical surface of an infinite
    /// conjugate system.
    pub fn focal_length_solve(&mut self, f: f64, index: Option<usize>) -> Result<f64> {
        let last = self.last_optical_index();
        let i = index.unwrap_or(last);
        if i == OBJECT_INDEX || i > last {
            return Err(TraceError::Configuration(format!(
                "focal length solve needs an optical surface in 1..={}, got {}",
                last, i
            )));
        }
        let y = self.y()[i][MARGINAL];
        let u0 = self.u()[i - 1][MARGINAL];
        let u = -self.y()[OBJECT_INDEX][MARGINAL] / f;
        let (n0, n) = (self.n()[i - 1], self.n()[i]);
        if y == 0.0 || n == n0 {
            return Err(TraceError::Domain(format!(
                "element {} cannot bend the marginal ray (y = {}, n0 = {}, n = {})",
                i, y, n0, n
            )));
        }
        let curvature = (n0 * u0 - n * u) / (y * (n - n0));
        self.system_mut().element_mut(i).set_curvature(curvature)?;
        debug!("focal length solve: element {} curvature = {}", i, curvature);
        Ok(curvature)
    }

    /// Moves the image plane to the paraxial focus, returning its new
    /// thickness.
    pub fn focal_plane_solve(&mut self) -> Result<f64> {
        let image = self.image_index();
        let y = self.y()[image][MARGINAL];
        let u = self.u()[image][MARGINAL];
        if u == 0.0 {
            return Err(TraceError::Domain(
                "marginal ray is parallel to the axis in image space".to_string(),
            ));
        }
        let element = self.system_mut().element_mut(image);
        let thickness = element.thickness() - y / u;
        element.set_thickness(thickness);
        debug!("focal plane solve: image thickness = {}", thickness);
        Ok(thickness)
    }
}
