use thiserror::Error;

/// Failures surfaced by the tracers. Rays that miss a surface or leave its clear
/// aperture are not errors; they are marked with NaN in the full-trace arrays.
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("unknown pupil distribution \"{0}\"")]
    UnknownDistribution(String),

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("degenerate paraxial system: {0}")]
    Domain(String),
}

pub type Result<T> = std::result::Result<T, TraceError>;
