use crate::aberration::{AberrationTensor, Chromatic, Seidel3};
use crate::format::format_coefficients;
use crate::material::Material;
use crate::surfaces::conic_intersect;
use crate::system::{OpticalSystem, Wavelengths};
use nalgebra::{DMatrix, Matrix2, Vector2, Vector3};

/// Paraxial state of the marginal (column 0) and chief (column 1) rays.
/// Row 0 holds heights, row 1 slopes.
pub type RayPair = Matrix2<f64>;

/// Refractive index at the primary, shortest and longest trace wavelengths.
pub type BandIndices = Vector3<f64>;

/// Relative slack on the clear radius. Rays aimed at the rim of a stop land
/// on it only up to rounding.
pub const RIM_TOLERANCE: f64 = 1e-9;

/// Outcome of one surface for one exact ray, in the surface's local frame.
#[derive(Debug, Clone, Copy)]
pub struct RayStep {
    pub y: Vector3<f64>,
    pub u: Vector3<f64>,
    pub n: f64,
    pub t: f64,
}

impl RayStep {
    pub fn invalid(n: f64) -> Self {
        let nan = Vector3::repeat(f64::NAN);
        Self {
            y: nan,
            u: nan,
            n,
            t: f64::NAN,
        }
    }
}

/// A refracting or reflecting surface of a sequential system.
///
/// `thickness` is the axial gap from the previous surface's vertex and
/// `material` is the medium behind the surface. Geometry defaults describe a
/// conic of revolution; variants override what differs.
pub trait Surface {
    /// Single-letter code used in report tables.
    fn type_code(&self) -> &'static str;

    fn thickness(&self) -> f64;

    /// Clear semi-aperture. Non-positive values mean unbounded.
    fn radius(&self) -> f64;

    fn material(&self) -> &Material;

    fn curvature(&self) -> f64 {
        0.0
    }

    fn conic(&self) -> f64 {
        0.0
    }

    /// r^4 sag coefficient in excess of the base sphere.
    fn departure(&self) -> f64 {
        0.0
    }

    /// Sag at squared radial distance `r2`.
    fn sag(&self, r2: f64) -> f64 {
        let c = self.curvature();
        c * r2 / (1.0 + (1.0 - (1.0 + self.conic()) * c * c * r2).sqrt())
    }

    /// Derivative of the sag with respect to `r2`.
    fn sag_slope(&self, r2: f64) -> f64 {
        let c = self.curvature();
        c / (2.0 * (1.0 - (1.0 + self.conic()) * c * c * r2).sqrt())
    }

    fn refractive_index(&self, wavelength: f64, n0: f64) -> f64 {
        self.material().refractive_index(wavelength, n0)
    }

    fn indices(&self, band: &Wavelengths, n0: &BandIndices) -> BandIndices {
        BandIndices::new(
            self.refractive_index(band.primary, n0[0]),
            self.refractive_index(band.short, n0[1]),
            self.refractive_index(band.long, n0[2]),
        )
    }

    fn dispersion(&self, band: &Wavelengths) -> f64 {
        self.material()
            .dispersion(band.primary, band.short, band.long)
    }

    /// Transfer by `thickness` followed by refraction from `n0` into `n`.
    fn paraxial_matrix(&self, n0: f64, n: f64) -> Matrix2<f64> {
        let refract = Matrix2::new(1.0, 0.0, -self.curvature() * (n - n0) / n, n0 / n);
        let transfer = Matrix2::new(1.0, self.thickness(), 0.0, 1.0);
        refract * transfer
    }

    /// Propagates both paraxial rays through this surface. Without an incoming
    /// index the surface is the object plane: rays pass unchanged and the
    /// index of its medium is reported.
    fn propagate_paraxial(
        &self,
        yu0: &RayPair,
        n0: Option<&BandIndices>,
        band: &Wavelengths,
    ) -> (RayPair, BandIndices) {
        match n0 {
            None => (*yu0, self.indices(band, &BandIndices::repeat(1.0))),
            Some(n0) => {
                let n = self.indices(band, n0);
                (self.paraxial_matrix(n0[0], n[0]) * yu0, n)
            }
        }
    }

    /// Third-order and primary chromatic contributions of this surface from the
    /// ray heights `y` at the surface and the incoming slopes `u0`.
    /// Returns the monochromatic and the chromatic tensor.
    fn aberration(
        &self,
        y: &Vector2<f64>,
        u0: &Vector2<f64>,
        n0: &BandIndices,
        n: &BandIndices,
        order: usize,
    ) -> (AberrationTensor, AberrationTensor) {
        let (ym, yc) = (y[0], y[1]);
        let c = self.curvature();
        let (na, nb) = (n0[0], n[0]);
        // Refraction invariants of the marginal and chief rays.
        let a = na * (u0[0] + ym * c);
        let abar = na * (u0[1] + yc * c);
        let h = a * yc - abar * ym;
        let du = (a / nb - ym * c) / nb - u0[0] / na;
        let dinv = 1.0 / nb - 1.0 / na;
        let dinv2 = 1.0 / (nb * nb) - 1.0 / (na * na);

        let mut sums = Seidel3 {
            spherical: -a * a * ym * du,
            coma: -a * abar * ym * du,
            astigmatism: -abar * abar * ym * du,
            petzval: -h * h * c * dinv,
            distortion: -abar.powi(3) * ym * dinv2 - abar * yc * c * dinv * (h - abar * ym),
        };
        let b = self.departure();
        if b != 0.0 {
            let e = 8.0 * b * (nb - na);
            sums.spherical += e * ym.powi(4);
            sums.coma += e * ym.powi(3) * yc;
            sums.astigmatism += e * ym * ym * yc * yc;
            sums.distortion += e * ym * yc.powi(3);
        }

        let mut mono = AberrationTensor::zeros(order);
        mono.add_seidel3(&sums);

        let ddn = (n[1] - n[2]) / n[0] - (n0[1] - n0[2]) / n0[0];
        let mut chroma = AberrationTensor::zeros(order);
        chroma.add_chromatic(&Chromatic {
            axial: a * ym * ddn,
            lateral: abar * ym * ddn,
        });
        (mono, chroma)
    }

    /// Distance along `d` from `p` to the surface, both in the local frame.
    fn intersect(&self, p: &Vector3<f64>, d: &Vector3<f64>) -> Option<f64> {
        conic_intersect(self.curvature(), self.conic(), p, d)
    }

    /// Unit normal at a point on the surface, oriented along +z at the vertex.
    fn normal(&self, q: &Vector3<f64>) -> Vector3<f64> {
        let c = self.curvature();
        Vector3::new(-c * q.x, -c * q.y, 1.0 - c * (1.0 + self.conic()) * q.z).normalize()
    }

    /// Exact intersection followed by refraction or reflection. `None` marks a
    /// ray that misses, leaves the clear aperture, or is totally reflected.
    fn propagate(
        &self,
        p: &Vector3<f64>,
        d: &Vector3<f64>,
        n0: f64,
        n: f64,
        clip: bool,
    ) -> Option<(Vector3<f64>, Vector3<f64>, f64)> {
        let s = self.intersect(p, d)?;
        let q = p + d * s;
        let r = self.radius();
        if clip && r > 0.0 && q.x.hypot(q.y) > r * (1.0 + RIM_TOLERANCE) {
            return None;
        }
        let mut normal = self.normal(&q);
        let mut cos_i = d.dot(&normal);
        let u = if self.material().is_mirror() {
            d - normal * (2.0 * cos_i)
        } else {
            if cos_i < 0.0 {
                normal = -normal;
                cos_i = -cos_i;
            }
            let mu = n0.abs() / n.abs();
            let k = 1.0 - mu * mu * (1.0 - cos_i * cos_i);
            if k < 0.0 {
                return None;
            }
            d * mu + normal * (k.sqrt() - mu * cos_i)
        };
        Some((q, u, s))
    }

    /// Moves a ray given in the previous surface's frame into this surface's
    /// frame and propagates it.
    fn transformed_ray(
        &self,
        y0: &Vector3<f64>,
        u0: &Vector3<f64>,
        n0: f64,
        wavelength: f64,
        clip: bool,
    ) -> RayStep {
        let n = self.refractive_index(wavelength, n0);
        let p = y0 - Vector3::new(0.0, 0.0, self.thickness());
        match self.propagate(&p, u0, n0, n, clip) {
            Some((y, u, t)) => RayStep { y, u, n, t },
            None => RayStep::invalid(n),
        }
    }
}

/// Shared reporting over the system a trace is bound to.
pub trait Trace {
    fn system(&self) -> &OpticalSystem;

    /// One row per surface, labelled with its index and type code.
    fn print_coeffs(&self, coeff: &DMatrix<f64>, labels: &[&str], sum: bool) -> Vec<String> {
        let types = self.system().type_codes();
        format_coefficients(coeff, &types, labels, sum)
    }
}
