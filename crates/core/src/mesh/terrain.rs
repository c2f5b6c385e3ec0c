//! Terrain elevation grids used to build terrain-following meshes
//!
//! Elevation samples sit on a regular horizontal grid. Sample `(ix, iy)` is at
//! world position `(ix * resolution, iy * resolution)` and is stored row-major
//! as `iy * nx + ix`.

use crate::error::{Result, SolverError};
use serde::{Deserialize, Serialize};

/// Ground elevation on a regular horizontal grid
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Elevation {
    /// Grid resolution in meters per sample
    pub(crate) resolution: f64,
    /// Number of elevation samples in X direction
    pub(crate) nx: usize,
    /// Number of elevation samples in Y direction
    pub(crate) ny: usize,
    /// Elevation data in meters (row-major order: [y * nx + x])
    pub(crate) elevations: Vec<f64>,
    pub(crate) min_elevation: f64,
    pub(crate) max_elevation: f64,
}

impl Elevation {
    /// Create flat terrain at given elevation
    #[must_use]
    pub fn flat(width: f64, height: f64, resolution: f64, elevation: f64) -> Self {
        let nx = (width / resolution).ceil() as usize + 1;
        let ny = (height / resolution).ceil() as usize + 1;

        Elevation {
            resolution,
            nx,
            ny,
            elevations: vec![elevation; nx * ny],
            min_elevation: elevation,
            max_elevation: elevation,
        }
    }

    /// Create terrain with a single Gaussian hill in the middle of the domain
    #[must_use]
    pub fn single_hill(
        width: f64,
        height: f64,
        resolution: f64,
        base_elevation: f64,
        hill_height: f64,
        hill_radius: f64,
    ) -> Self {
        let nx = (width / resolution).ceil() as usize + 1;
        let ny = (height / resolution).ceil() as usize + 1;
        let center_x = width / 2.0;
        let center_y = height / 2.0;

        let mut elevations = Vec::with_capacity(nx * ny);
        for iy in 0..ny {
            for ix in 0..nx {
                let dx = ix as f64 * resolution - center_x;
                let dy = iy as f64 * resolution - center_y;
                let r2 = (dx * dx + dy * dy) / (hill_radius * hill_radius);
                elevations.push(base_elevation + hill_height * (-r2).exp());
            }
        }

        Self::from_samples(resolution, nx, ny, elevations)
    }

    /// Create terrain from raw elevation samples
    ///
    /// # Arguments
    /// * `resolution` - Sample spacing in meters (same in x and y)
    /// * `heights` - Elevations in meters, row-major `[iy * nx + ix]`
    /// * `nx` - Number of samples in X direction
    /// * `ny` - Number of samples in Y direction
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::SizeMismatch`] if `heights` does not hold `nx * ny`
    /// samples and [`SolverError::InvalidMesh`] if the grid has fewer than two
    /// samples in either direction.
    pub fn from_heightmap(resolution: f64, heights: Vec<f64>, nx: usize, ny: usize) -> Result<Self> {
        if heights.len() != nx * ny {
            return Err(SolverError::SizeMismatch {
                what: "heightmap",
                expected: nx * ny,
                found: heights.len(),
            });
        }
        if nx < 2 || ny < 2 {
            return Err(SolverError::InvalidMesh(format!(
                "heightmap needs at least 2x2 samples, got {nx}x{ny}"
            )));
        }
        if resolution <= 0.0 || !resolution.is_finite() {
            return Err(SolverError::InvalidMesh(format!(
                "heightmap resolution must be positive, got {resolution}"
            )));
        }

        Ok(Self::from_samples(resolution, nx, ny, heights))
    }

    fn from_samples(resolution: f64, nx: usize, ny: usize, elevations: Vec<f64>) -> Self {
        let (min_elevation, max_elevation) = elevations
            .iter()
            .fold((f64::MAX, f64::MIN), |(lo, hi), &e| (lo.min(e), hi.max(e)));

        Elevation {
            resolution,
            nx,
            ny,
            elevations,
            min_elevation,
            max_elevation,
        }
    }

    /// Elevation of the sample at grid position `(ix, iy)`
    #[inline]
    #[must_use]
    pub fn sample(&self, ix: usize, iy: usize) -> f64 {
        self.elevations[iy * self.nx + ix]
    }

    /// Number of samples in X direction
    #[must_use]
    pub fn nx(&self) -> usize {
        self.nx
    }

    /// Number of samples in Y direction
    #[must_use]
    pub fn ny(&self) -> usize {
        self.ny
    }

    /// Terrain resolution in meters
    #[must_use]
    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    /// Minimum elevation in meters
    #[must_use]
    pub fn min_elevation(&self) -> f64 {
        self.min_elevation
    }

    /// Maximum elevation in meters
    #[must_use]
    pub fn max_elevation(&self) -> f64 {
        self.max_elevation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_flat_terrain() {
        let terrain = Elevation::flat(100.0, 100.0, 5.0, 50.0);

        assert_eq!(terrain.nx(), 21);
        assert_eq!(terrain.ny(), 21);
        assert_eq!(terrain.sample(5, 5), 50.0);
        assert_eq!(terrain.sample(15, 15), 50.0);
    }

    #[test]
    fn test_single_hill() {
        let terrain = Elevation::single_hill(200.0, 200.0, 5.0, 50.0, 100.0, 50.0);

        let peak = terrain.sample(20, 20);
        assert_relative_eq!(peak, 150.0, epsilon = 1e-9);
        assert!(terrain.sample(2, 2) < 60.0);
        assert_relative_eq!(terrain.max_elevation(), 150.0, epsilon = 1e-9);
    }

    #[test]
    fn test_heightmap_layout() {
        let terrain = Elevation::from_heightmap(10.0, vec![0.0, 10.0, 20.0, 30.0], 2, 2).unwrap();

        assert_eq!(terrain.sample(1, 0), 10.0);
        assert_eq!(terrain.sample(0, 1), 20.0);
        assert_eq!(terrain.sample(1, 1), 30.0);
        assert_eq!(terrain.min_elevation(), 0.0);
        assert_eq!(terrain.max_elevation(), 30.0);
    }

    #[test]
    fn test_heightmap_size_mismatch() {
        let result = Elevation::from_heightmap(10.0, vec![0.0; 5], 2, 2);
        assert!(matches!(
            result,
            Err(SolverError::SizeMismatch { expected: 4, found: 5, .. })
        ));
    }
}
