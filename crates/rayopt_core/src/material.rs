//! Optical media behind each surface.
//!
//! Wavelengths are in meters throughout the crate; surface geometry uses whatever
//! length unit the system description is written in.

use serde::{Deserialize, Serialize};

/// Helium d line, the reference wavelength for Abbe-number glasses.
pub const LAMBDA_D: f64 = 587.5618e-9;
/// Hydrogen F line.
pub const LAMBDA_F: f64 = 486.1327e-9;
/// Hydrogen C line.
pub const LAMBDA_C: f64 = 656.2725e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Material {
    Air,
    /// Non-dispersive medium.
    Constant { index: f64 },
    /// Glass given by its d-line index and Abbe number, modelled with a
    /// two-term Cauchy fit through the F and C lines.
    Abbe { nd: f64, vd: f64 },
    /// Reflecting surface. The outgoing index is the negated incoming one.
    Mirror,
}

impl Default for Material {
    fn default() -> Self {
        Material::Air
    }
}

impl Material {
    /// Refractive index at `wavelength` given the index `n0` of the medium in
    /// front of the surface (only mirrors depend on it).
    pub fn refractive_index(&self, wavelength: f64, n0: f64) -> f64 {
        match self {
            Material::Air => 1.0,
            Material::Constant { index } => *index,
            Material::Abbe { nd, vd } => {
                if !vd.is_finite() || *vd <= 0.0 {
                    return *nd;
                }
                let b = (nd - 1.0) / vd / (LAMBDA_F.powi(-2) - LAMBDA_C.powi(-2));
                nd + b * (wavelength.powi(-2) - LAMBDA_D.powi(-2))
            }
            Material::Mirror => -n0,
        }
    }

    pub fn is_mirror(&self) -> bool {
        matches!(self, Material::Mirror)
    }

    /// Abbe-style dispersion `(n(l0) - 1) / (n(lmin) - n(lmax))` over the trace
    /// band. Non-dispersive media and mirrors report infinity.
    pub fn dispersion(&self, primary: f64, short: f64, long: f64) -> f64 {
        if self.is_mirror() {
            return f64::INFINITY;
        }
        let n = self.refractive_index(primary, 1.0);
        let dn = self.refractive_index(short, 1.0) - self.refractive_index(long, 1.0);
        if dn == 0.0 {
            f64::INFINITY
        } else {
            (n - 1.0) / dn
        }
    }
}
