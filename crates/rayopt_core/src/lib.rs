//! The `rayopt_core` crate traces rays through sequential optical systems.
//!
//! Key components:
//! - **Traits**: `Surface` (paraxial transfer, aberration contributions, exact intersection) and `Trace` (shared reporting).
//! - **System**: surfaces, materials and the object description, loadable from JSON through serde.
//! - **Paraxial**: marginal/chief ray trace, first-order properties, third- and fifth-order aberration sums, and solves.
//! - **Full**: exact ray bundles sampled over the pupil, spot statistics and field curves.
pub mod aberration;
pub mod error;
mod expansion;
pub mod format;
pub mod full;
pub mod material;
pub mod paraxial;
pub mod pupil;
pub mod solvers;
pub mod surfaces;
pub mod system;
pub mod traits;

pub use error::{Result, TraceError};
pub use full::{EncircledEnergy, FanSettings, FieldCurves, FullTrace, Spot};
pub use material::Material;
pub use paraxial::{ParaxialSettings, ParaxialTrace};
pub use pupil::PupilDistribution;
pub use surfaces::{Aspheric, Element, Planar, Spherical, Stop};
pub use system::{Conjugate, ObjectSpec, OpticalSystem, SystemDescription, Wavelengths};
pub use traits::{Surface, Trace};
