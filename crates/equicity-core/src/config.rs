//! Pipeline configuration.
//!
//! Every default the model relies on lives here and is passed into the
//! pipeline explicitly.

use serde::{Deserialize, Serialize};
use std::env;

use crate::crs::Crs;
use crate::grid::{DEFAULT_CELL_SIZE_M, MAX_GRID_CELLS};
use crate::models::BoundingBox;
use crate::normalize::DEFAULT_FALLBACK_POINT;
use crate::scoring::ClassThresholds;

/// Region used when no boundary layer is available.
pub const DEFAULT_FALLBACK_BOUNDS: BoundingBox = BoundingBox::new(77.0, 10.8, 78.3, 11.2);

/// Cell count above which a run logs a resource warning.
pub const DEFAULT_LARGE_GRID_WARNING_CELLS: usize = 250_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Nominal cell edge length in meters
    pub cell_size_m: f64,
    /// System assumed for layers that do not declare one
    pub target_crs: Crs,
    pub fallback_bounds: BoundingBox,
    /// Location for rows without coordinates, as (lon, lat)
    pub fallback_point: (f64, f64),
    pub thresholds: ClassThresholds,
    /// Seed for the placeholder scorer; `None` draws from OS entropy
    pub seed: Option<u64>,
    pub large_grid_warning_cells: usize,
    /// Runs whose grid would exceed this many cells tessellate nothing
    pub max_grid_cells: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cell_size_m: DEFAULT_CELL_SIZE_M,
            target_crs: Crs::WGS84,
            fallback_bounds: DEFAULT_FALLBACK_BOUNDS,
            fallback_point: DEFAULT_FALLBACK_POINT,
            thresholds: ClassThresholds::default(),
            seed: None,
            large_grid_warning_cells: DEFAULT_LARGE_GRID_WARNING_CELLS,
            max_grid_cells: MAX_GRID_CELLS,
        }
    }
}

impl PipelineConfig {
    /// Defaults overridden by `EQUICITY_*` environment variables.
    /// Unparsable values are ignored.
    pub fn from_env() -> Self {
        Self::from_vars(|key| env::var(key).ok())
    }

    fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            cell_size_m: lookup("EQUICITY_CELL_SIZE_M")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.cell_size_m),
            target_crs: lookup("EQUICITY_TARGET_CRS")
                .map(|s| Crs::parse(&s))
                .unwrap_or(defaults.target_crs),
            seed: lookup("EQUICITY_SEED").and_then(|s| s.parse().ok()),
            large_grid_warning_cells: lookup("EQUICITY_MAX_CELLS_WARNING")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.large_grid_warning_cells),
            max_grid_cells: lookup("EQUICITY_MAX_GRID_CELLS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_grid_cells),
            ..defaults
        }
    }

    pub fn with_cell_size(mut self, cell_size_m: f64) -> Self {
        self.cell_size_m = cell_size_m;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_fallback_bounds(mut self, bounds: BoundingBox) -> Self {
        self.fallback_bounds = bounds;
        self
    }
}
