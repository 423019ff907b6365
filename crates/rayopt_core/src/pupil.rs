//! Deterministic and random sampling of the normalized pupil (unit disk).

use crate::error::{Result, TraceError};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PupilDistribution {
    Random,
    Meridional,
    Sagittal,
    Square,
    Triangular,
    Hexapolar,
    Cross,
    Tee,
}

impl PupilDistribution {
    pub const ALL: [PupilDistribution; 8] = [
        PupilDistribution::Random,
        PupilDistribution::Meridional,
        PupilDistribution::Sagittal,
        PupilDistribution::Square,
        PupilDistribution::Triangular,
        PupilDistribution::Hexapolar,
        PupilDistribution::Cross,
        PupilDistribution::Tee,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PupilDistribution::Random => "random",
            PupilDistribution::Meridional => "meridional",
            PupilDistribution::Sagittal => "sagittal",
            PupilDistribution::Square => "square",
            PupilDistribution::Triangular => "triangular",
            PupilDistribution::Hexapolar => "hexapolar",
            PupilDistribution::Cross => "cross",
            PupilDistribution::Tee => "tee",
        }
    }
}

impl fmt::Display for PupilDistribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PupilDistribution {
    type Err = TraceError;

    fn from_str(s: &str) -> Result<Self> {
        PupilDistribution::ALL
            .iter()
            .copied()
            .find(|d| d.name() == s)
            .ok_or_else(|| TraceError::UnknownDistribution(s.to_string()))
    }
}

/// Pupil coordinates normalized to the unit disk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PupilPoints {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

impl PupilPoints {
    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    fn push(&mut self, x: f64, y: f64) {
        self.x.push(x);
        self.y.push(y);
    }
}

/// Evenly spaced values with both end points included (`[start]` for one).
pub fn linspace(start: f64, stop: f64, num: usize) -> Vec<f64> {
    match num {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (num - 1) as f64;
            let mut values: Vec<f64> = (0..num).map(|i| start + step * i as f64).collect();
            values[num - 1] = stop;
            values
        }
    }
}

/// Ring count for a hexapolar pattern of about `n = 3r² + 3r + 1` points.
pub fn hexapolar_rings(n: usize) -> usize {
    let r = ((n as f64 / 3.0 - 1.0 / 12.0).sqrt() - 0.5).round_ties_even();
    if r.is_finite() && r > 0.0 {
        r as usize
    } else {
        0
    }
}

/// Points per side of a square lattice with about `n` points inside the unit
/// disk. Rounds half to even, like [`hexapolar_rings`].
pub fn grid_side(n: usize) -> usize {
    (n as f64 * 4.0 / PI).sqrt().round_ties_even() as usize
}

pub fn sample(distribution: PupilDistribution, n: usize) -> PupilPoints {
    sample_with_rng(distribution, n, &mut rand::thread_rng())
}

pub fn sample_named(name: &str, n: usize) -> Result<PupilPoints> {
    Ok(sample(name.parse()?, n))
}

/// Samples `distribution` with roughly `n` points; only `random` uses `rng`.
/// Integer splits (`n/2`, `n/3`, `2n/3`) truncate.
pub fn sample_with_rng<R: Rng + ?Sized>(
    distribution: PupilDistribution,
    n: usize,
    rng: &mut R,
) -> PupilPoints {
    let mut points = PupilPoints::default();
    match distribution {
        PupilDistribution::Random => {
            let candidates = (n as f64 * 4.0 / PI).ceil() as usize;
            for _ in 0..candidates {
                let x = 2.0 * rng.gen::<f64>() - 1.0;
                let y = 2.0 * rng.gen::<f64>() - 1.0;
                if x * x + y * y <= 1.0 {
                    points.push(x, y);
                }
            }
        }
        PupilDistribution::Meridional => {
            for x in linspace(-1.0, 1.0, n) {
                points.push(x, 0.0);
            }
        }
        PupilDistribution::Sagittal => {
            for y in linspace(-1.0, 1.0, n) {
                points.push(0.0, y);
            }
        }
        // Triangular shares the square lattice.
        PupilDistribution::Square | PupilDistribution::Triangular => {
            let axis = linspace(-1.0, 1.0, grid_side(n));
            for &x in &axis {
                for &y in &axis {
                    if x * x + y * y <= 1.0 {
                        points.push(x, y);
                    }
                }
            }
        }
        PupilDistribution::Hexapolar => {
            let rings = hexapolar_rings(n);
            points.push(0.0, 0.0);
            for i in 1..=rings {
                let count = 6 * i;
                let scale = i as f64 / rings as f64;
                for k in 0..count {
                    let a = 2.0 * PI * k as f64 / count as f64;
                    points.push(scale * a.sin(), scale * a.cos());
                }
            }
        }
        PupilDistribution::Cross => {
            let half = n / 2;
            for x in linspace(-1.0, 1.0, half) {
                points.push(x, 0.0);
            }
            for y in linspace(-1.0, 1.0, half) {
                points.push(0.0, y);
            }
        }
        PupilDistribution::Tee => {
            for x in linspace(-1.0, 1.0, 2 * n / 3) {
                points.push(x, 0.0);
            }
            for y in linspace(0.0, 1.0, n / 3) {
                points.push(0.0, y);
            }
        }
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn inside_unit_disk(points: &PupilPoints) -> bool {
        points
            .x
            .iter()
            .zip(points.y.iter())
            .all(|(x, y)| x * x + y * y <= 1.0 + 1e-12)
    }

    #[test]
    fn names_round_trip_and_unknown_is_rejected() {
        for d in PupilDistribution::ALL {
            assert_eq!(d.name().parse::<PupilDistribution>().unwrap(), d);
        }
        let err = "spiral".parse::<PupilDistribution>().unwrap_err();
        assert!(matches!(err, TraceError::UnknownDistribution(ref s) if s == "spiral"));
        assert!(sample_named("spiral", 10).is_err());
    }

    #[test]
    fn hexapolar_has_full_rings() {
        for n in [1, 7, 19, 37, 50, 100, 500] {
            let rings = hexapolar_rings(n);
            let points = sample(PupilDistribution::Hexapolar, n);
            assert_eq!(points.len(), 1 + 6 * rings * (rings + 1) / 2);
            assert!(inside_unit_disk(&points));
        }
        assert_eq!(hexapolar_rings(37), 3);
        let points = sample(PupilDistribution::Hexapolar, 37);
        let outer = points.x[36].hypot(points.y[36]);
        assert!((outer - 1.0).abs() < 1e-12);
    }

    #[test]
    fn triangular_currently_equals_square() {
        for n in [10, 50, 121] {
            assert_eq!(
                sample(PupilDistribution::Square, n),
                sample(PupilDistribution::Triangular, n)
            );
        }
    }

    #[test]
    fn square_grid_is_clipped_to_disk() {
        let points = sample(PupilDistribution::Square, 100);
        let side = grid_side(100);
        assert_eq!(side, 11);
        assert!(points.len() < side * side);
        assert!(inside_unit_disk(&points));
        assert_eq!(grid_side(0), 0);
        assert_eq!(grid_side(1), 1);
        assert_eq!(grid_side(28), 6);
        let triangular = sample(PupilDistribution::Triangular, 28);
        assert_eq!(triangular.len(), sample(PupilDistribution::Square, 28).len());
        assert!(triangular.len() <= 36);
    }

    #[test]
    fn line_distributions_use_truncating_counts() {
        let meridional = sample(PupilDistribution::Meridional, 5);
        assert_eq!(meridional.x, vec![-1.0, -0.5, 0.0, 0.5, 1.0]);
        assert!(meridional.y.iter().all(|&y| y == 0.0));

        let sagittal = sample(PupilDistribution::Sagittal, 3);
        assert_eq!(sagittal.y, vec![-1.0, 0.0, 1.0]);

        assert_eq!(sample(PupilDistribution::Cross, 11).len(), 10);

        let tee = sample(PupilDistribution::Tee, 10);
        assert_eq!(tee.len(), 6 + 3);
        assert_eq!(&tee.y[6..], &[0.0, 0.5, 1.0]);
        assert!(tee.x[6..].iter().all(|&x| x == 0.0));
    }

    #[test]
    fn random_is_reproducible_and_inside_disk() {
        let a = sample_with_rng(PupilDistribution::Random, 200, &mut StdRng::seed_from_u64(7));
        let b = sample_with_rng(PupilDistribution::Random, 200, &mut StdRng::seed_from_u64(7));
        assert_eq!(a, b);
        assert!(inside_unit_disk(&a));
        assert!(a.len() <= (200.0 * 4.0 / PI).ceil() as usize);
        assert!(a.len() > 120);
    }

    #[test]
    fn linspace_matches_endpoints() {
        assert!(linspace(0.0, 1.0, 0).is_empty());
        assert_eq!(linspace(2.0, 5.0, 1), vec![2.0]);
        assert_eq!(linspace(0.0, 1.0, 3), vec![0.0, 0.5, 1.0]);
    }
}
