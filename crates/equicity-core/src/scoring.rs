//! Suitability scoring, classification and summary statistics.
//!
//! Scoring sits behind [`SuitabilityScorer`] so a weighted multi-criteria
//! model can replace the placeholder [`RandomScorer`] without touching
//! tessellation or clipping.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::models::{
    push_warning, GridRow, LayerHandle, SuitabilityCell, SuitabilityClass, Summary,
};

/// Inputs available to a scorer besides the cell itself.
#[derive(Debug, Clone, Copy)]
pub struct ScoringContext<'a> {
    /// Uploaded layers other than the boundary (roads, depots, DEM, ...)
    pub criteria_layers: &'a [&'a LayerHandle],
    pub config: &'a PipelineConfig,
}

/// Produces one suitability score per cell, expected in `[0, 1]`.
pub trait SuitabilityScorer {
    fn score(&mut self, cell: &GridRow, context: &ScoringContext<'_>) -> f64;
}

impl<F> SuitabilityScorer for F
where
    F: FnMut(&GridRow, &ScoringContext<'_>) -> f64,
{
    fn score(&mut self, cell: &GridRow, context: &ScoringContext<'_>) -> f64 {
        self(cell, context)
    }
}

/// Placeholder model: an independent uniform draw in `[0, 1)` per cell.
#[derive(Debug, Clone)]
pub struct RandomScorer {
    rng: StdRng,
}

impl RandomScorer {
    /// Seeded scorers are reproducible; unseeded ones draw from OS entropy.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self { rng }
    }
}

impl SuitabilityScorer for RandomScorer {
    fn score(&mut self, _cell: &GridRow, _context: &ScoringContext<'_>) -> f64 {
        self.rng.random::<f64>()
    }
}

// ========== CLASSIFICATION ==========

/// Upper edges of the Low and Medium bins. Bins are closed on the right.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassThresholds {
    pub low_max: f64,
    pub medium_max: f64,
}

impl Default for ClassThresholds {
    fn default() -> Self {
        Self {
            low_max: 0.33,
            medium_max: 0.66,
        }
    }
}

impl ClassThresholds {
    /// `index <= low_max` is Low, `index <= medium_max` is Medium, else High.
    pub fn classify(&self, index: f64) -> SuitabilityClass {
        if index <= self.low_max {
            SuitabilityClass::Low
        } else if index <= self.medium_max {
            SuitabilityClass::Medium
        } else {
            SuitabilityClass::High
        }
    }

    pub fn is_high(&self, index: f64) -> bool {
        index > self.medium_max
    }
}

/// Classify with the default thresholds.
pub fn classify(index: f64) -> SuitabilityClass {
    ClassThresholds::default().classify(index)
}

/// Bring a raw score into `[0, 1]`. Returns the corrected value when the
/// raw score was out of range or NaN.
fn checked_index(raw: f64) -> Result<f64, f64> {
    if raw.is_nan() {
        Err(0.0)
    } else if !(0.0..=1.0).contains(&raw) {
        Err(raw.clamp(0.0, 1.0))
    } else {
        Ok(raw)
    }
}

/// Score and classify every row, in order.
pub fn score_rows<S>(
    rows: Vec<GridRow>,
    scorer: &mut S,
    context: &ScoringContext<'_>,
    warnings: &mut Vec<String>,
) -> Vec<SuitabilityCell>
where
    S: SuitabilityScorer + ?Sized,
{
    let thresholds = context.config.thresholds;
    let mut corrected = 0usize;

    let cells = rows
        .into_iter()
        .map(|row| {
            let index = checked_index(scorer.score(&row, context)).unwrap_or_else(|fixed| {
                corrected += 1;
                fixed
            });
            SuitabilityCell {
                geometry: row.geometry,
                centroid: row.centroid,
                attributes: row.attributes,
                suitability_index: index,
                suitability_class: thresholds.classify(index),
            }
        })
        .collect();

    if corrected > 0 {
        push_warning(
            warnings,
            format!("{} scores fell outside [0, 1] and were clamped", corrected),
        );
    }
    cells
}

/// Mean index and High count. An empty grid has a mean of 0.
pub fn summarize(cells: &[SuitabilityCell], thresholds: &ClassThresholds) -> Summary {
    let cell_count = cells.len();
    let high_count = cells
        .iter()
        .filter(|cell| thresholds.is_high(cell.suitability_index))
        .count();
    let mean_suitability = if cell_count == 0 {
        0.0
    } else {
        cells.iter().map(|cell| cell.suitability_index).sum::<f64>() / cell_count as f64
    };
    Summary {
        mean_suitability,
        high_count,
        cell_count,
    }
}
