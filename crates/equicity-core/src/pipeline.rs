//! The suitability model run: boundary → bounds → grid → clip → score.
//!
//! Every stage degrades instead of failing. What degraded is reported in
//! [`ModelRun::warnings`] and summarised by [`ModelRun::quality`].

use chrono::Utc;

use crate::clip::clip_to_boundary;
use crate::config::PipelineConfig;
use crate::crs::Crs;
use crate::grid::{estimate_cell_count, tessellate_with_limit};
use crate::models::{
    push_warning, BoundingBox, GridQuality, GridRow, LayerHandle, ModelRun, SpatialTable,
    SuitabilityGrid, Summary, Tessellation,
};
use crate::normalize::Normalizer;
use crate::parse::{LayerParse, ParserChain};
use crate::scoring::{score_rows, summarize, RandomScorer, ScoringContext, SuitabilityScorer};
use crate::spatial::approx_extent_m;

const BOUNDARY_KEYWORDS: [&str; 2] = ["district", "boundary"];

/// Whether a layer name marks the study boundary.
pub fn is_boundary_layer(name: &str) -> bool {
    let lower = name.to_lowercase();
    BOUNDARY_KEYWORDS.iter().any(|keyword| lower.contains(keyword))
}

/// Index of the boundary layer. When several names match, the last wins.
pub fn locate_boundary(layers: &[LayerHandle]) -> Option<usize> {
    layers.iter().rposition(|layer| is_boundary_layer(&layer.name))
}

/// Run the model with default settings and the placeholder scorer.
pub fn run_model(layers: &[LayerHandle], cell_size_m: f64) -> (SuitabilityGrid, Summary) {
    let config = PipelineConfig::default().with_cell_size(cell_size_m);
    let run = SuitabilityPipeline::new(config).run(layers);
    (run.grid, run.summary)
}

pub struct SuitabilityPipeline<S = RandomScorer> {
    config: PipelineConfig,
    parsers: ParserChain,
    scorer: S,
}

impl SuitabilityPipeline<RandomScorer> {
    pub fn new(config: PipelineConfig) -> Self {
        let scorer = RandomScorer::new(config.seed);
        Self {
            config,
            parsers: ParserChain::default(),
            scorer,
        }
    }
}

impl<S: SuitabilityScorer> SuitabilityPipeline<S> {
    pub fn with_scorer<T: SuitabilityScorer>(self, scorer: T) -> SuitabilityPipeline<T> {
        SuitabilityPipeline {
            config: self.config,
            parsers: self.parsers,
            scorer,
        }
    }

    pub fn with_parsers(mut self, parsers: ParserChain) -> Self {
        self.parsers = parsers;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the whole model over one set of uploaded layers.
    pub fn run(&mut self, layers: &[LayerHandle]) -> ModelRun {
        let mut warnings = Vec::new();

        // 1. Locate and normalize the boundary.
        let boundary_index = locate_boundary(layers);
        let boundary = boundary_index
            .and_then(|index| self.load_boundary(&layers[index], &mut warnings));

        // 2. Bounds.
        let bounds = match &boundary {
            Some((table, bounds)) => {
                tracing::debug!(
                    "Boundary has {} features, bounds {}",
                    table.len(),
                    bounds
                );
                *bounds
            }
            None => {
                tracing::info!(
                    "No usable boundary layer; using fallback bounds {}",
                    self.config.fallback_bounds
                );
                self.config.fallback_bounds
            }
        };

        // 3. Tessellate.
        let estimated = estimate_cell_count(&bounds, self.config.cell_size_m);
        let grid = if estimated > self.config.max_grid_cells {
            push_warning(
                &mut warnings,
                format!(
                    "Grid of {} cells for bounds {} at {} m exceeds the limit of {}; nothing was tessellated",
                    estimated, bounds, self.config.cell_size_m, self.config.max_grid_cells
                ),
            );
            Tessellation {
                crs: Crs::WGS84,
                cells: Vec::new(),
            }
        } else {
            if estimated > self.config.large_grid_warning_cells {
                let (width_m, height_m) = approx_extent_m(&bounds);
                push_warning(
                    &mut warnings,
                    format!(
                        "Grid of {} cells ({:.1} x {:.1} km at {} m) exceeds {} cells; expect high memory use",
                        estimated,
                        width_m / 1000.0,
                        height_m / 1000.0,
                        self.config.cell_size_m,
                        self.config.large_grid_warning_cells
                    ),
                );
            }
            let grid =
                tessellate_with_limit(&bounds, self.config.cell_size_m, self.config.max_grid_cells);
            if grid.is_empty() {
                push_warning(
                    &mut warnings,
                    format!(
                        "Bounds {} with cell size {} m produced an empty grid",
                        bounds, self.config.cell_size_m
                    ),
                );
            }
            grid
        };
        tracing::debug!("Tessellated {} cells", grid.len());

        // 4. Clip.
        let (rows, quality) = match &boundary {
            Some((table, _)) => match clip_to_boundary(&grid, table) {
                Ok(rows) => {
                    tracing::debug!("Clipped grid to {} pieces", rows.len());
                    (rows, GridQuality::Clipped)
                }
                Err(err) => {
                    push_warning(
                        &mut warnings,
                        format!("Clip to boundary skipped, keeping unclipped grid: {}", err),
                    );
                    (unclipped(grid), GridQuality::Unclipped)
                }
            },
            None => (unclipped(grid), GridQuality::DefaultBounds),
        };

        // 5-6. Score and classify.
        let criteria_layers: Vec<&LayerHandle> = layers
            .iter()
            .enumerate()
            .filter(|(index, _)| Some(*index) != boundary_index)
            .map(|(_, layer)| layer)
            .collect();
        let context = ScoringContext {
            criteria_layers: &criteria_layers,
            config: &self.config,
        };
        let cells = score_rows(rows, &mut self.scorer, &context, &mut warnings);

        // 7. Summarize.
        let summary = summarize(&cells, &self.config.thresholds);
        tracing::info!(
            "Model run complete: {} cells, mean suitability {:.3}, {} high ({:?})",
            summary.cell_count,
            summary.mean_suitability,
            summary.high_count,
            quality
        );

        ModelRun {
            grid: SuitabilityGrid {
                crs: Crs::WGS84,
                cells,
            },
            summary,
            quality,
            warnings,
            generated_at: Utc::now(),
        }
    }

    /// Parse and normalize the boundary layer. `None` means the run falls
    /// back to the default bounds.
    fn load_boundary(
        &self,
        layer: &LayerHandle,
        warnings: &mut Vec<String>,
    ) -> Option<(SpatialTable, BoundingBox)> {
        let parsed = match self.parsers.parse(&layer.content) {
            LayerParse::Parsed(parsed) => parsed,
            LayerParse::Absent { failures } => {
                push_warning(
                    warnings,
                    format!(
                        "Boundary layer '{}' could not be parsed ({}); using fallback bounds",
                        layer.name,
                        failures.join("; ")
                    ),
                );
                return None;
            }
        };

        let normalizer = Normalizer {
            target_crs: self.config.target_crs.clone(),
            fallback_point: self.config.fallback_point,
        };
        let table =
            normalizer.normalize_with_warnings(Some(parsed.into()), &self.parsers, warnings)?;

        let projected = table.crs.as_ref().filter(|crs| !crs.is_wgs84());
        if let Some(crs) = projected {
            push_warning(
                warnings,
                format!(
                    "Boundary layer '{}' is still in {}; using fallback bounds",
                    layer.name, crs
                ),
            );
            return None;
        }

        match table.bounds() {
            Some(bounds) if !bounds.is_lon_lat() => {
                push_warning(
                    warnings,
                    format!(
                        "Boundary layer '{}' has bounds {} outside longitude/latitude range; using fallback bounds",
                        layer.name, bounds
                    ),
                );
                None
            }
            Some(bounds) => Some((table, bounds)),
            None => {
                push_warning(
                    warnings,
                    format!(
                        "Boundary layer '{}' has no geometry; using fallback bounds",
                        layer.name
                    ),
                );
                None
            }
        }
    }
}

fn unclipped(grid: Tessellation) -> Vec<GridRow> {
    grid.cells.into_iter().map(GridRow::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_names_match_case_insensitively() {
        assert!(is_boundary_layer("District_Boundary.geojson"));
        assert!(is_boundary_layer("COIMBATORE_DISTRICT.shp"));
        assert!(is_boundary_layer("study-boundary.json"));
        assert!(!is_boundary_layer("roads.geojson"));
        assert!(!is_boundary_layer("population.csv"));
    }

    #[test]
    fn last_matching_layer_is_the_boundary() {
        let layers = vec![
            LayerHandle::new("district_old.geojson", ""),
            LayerHandle::new("roads.geojson", ""),
            LayerHandle::new("boundary_2024.geojson", ""),
            LayerHandle::new("depots.csv", ""),
        ];
        assert_eq!(locate_boundary(&layers), Some(2));
        assert_eq!(locate_boundary(&layers[1..2]), None);
    }

    #[test]
    fn missing_boundary_uses_fallback_bounds() {
        let config = PipelineConfig::default().with_cell_size(5_000.0).with_seed(1);
        let run = SuitabilityPipeline::new(config.clone())
            .run(&[LayerHandle::new("roads.geojson", "{}")]);
        assert_eq!(run.quality, GridQuality::DefaultBounds);
        assert_eq!(
            run.grid.len(),
            estimate_cell_count(&config.fallback_bounds, config.cell_size_m)
        );
        assert!(!run.grid.is_empty());
    }

    #[test]
    fn fixed_scorer_drives_summary() {
        let config = PipelineConfig::default()
            .with_cell_size(55_500.0)
            .with_fallback_bounds(BoundingBox::new(0.0, 0.0, 1.0, 1.0));
        let mut values = vec![0.1, 0.5, 0.9, 0.2].into_iter();
        let run = SuitabilityPipeline::new(config)
            .with_scorer(move |_: &GridRow, _: &ScoringContext<'_>| values.next().unwrap_or(0.0))
            .run(&[]);
        assert_eq!(run.grid.len(), 4);
        assert_eq!(run.summary.high_count, 1);
        assert!((run.summary.mean_suitability - 0.425).abs() < 1e-12);
    }

    #[test]
    fn large_grid_is_warned_about() {
        let mut config = PipelineConfig::default().with_cell_size(5_000.0).with_seed(1);
        config.large_grid_warning_cells = 10;
        let run = SuitabilityPipeline::new(config).run(&[]);
        assert!(run.grid.len() > 10);
        assert!(
            run.warnings
                .iter()
                .any(|warning| warning.contains("exceeds 10 cells")),
            "{:?}",
            run.warnings
        );
    }

    #[test]
    fn grid_above_cell_limit_is_not_built() {
        let mut config = PipelineConfig::default().with_cell_size(5_000.0).with_seed(1);
        config.max_grid_cells = 10;
        let run = SuitabilityPipeline::new(config).run(&[]);
        assert!(run.grid.is_empty());
        assert_eq!(run.summary.cell_count, 0);
        assert_eq!(run.summary.mean_suitability, 0.0);
        assert!(run
            .warnings
            .iter()
            .any(|warning| warning.contains("exceeds the limit of 10")));
    }

    #[test]
    fn single_point_boundary_produces_empty_grid() {
        let layers = [LayerHandle::new(
            "district_hq.csv",
            "name,longitude,latitude\nCollectorate,77.0,10.8\n",
        )];
        let run = SuitabilityPipeline::new(PipelineConfig::default().with_seed(1)).run(&layers);
        assert!(run.grid.is_empty());
        assert_eq!(run.quality, GridQuality::Unclipped);
        assert_eq!(run.summary.cell_count, 0);
        assert!(run
            .warnings
            .iter()
            .any(|warning| warning.contains("produced an empty grid")));
    }

    #[test]
    fn boundary_left_in_unknown_crs_is_not_tessellated() {
        let boundary = r#"{
            "type": "FeatureCollection",
            "crs": {"type": "name", "properties": {"name": "LOCAL_CS[\"survey grid\"]"}},
            "features": [{
                "type": "Feature",
                "properties": {},
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[3500000, 1600000], [3540000, 1600000], [3540000, 1640000], [3500000, 1600000]]]
                }
            }]
        }"#;
        let config = PipelineConfig::default().with_seed(1);
        let fallback_cells = estimate_cell_count(&config.fallback_bounds, config.cell_size_m);
        let layers = [LayerHandle::new("district.geojson", boundary)];
        let run = SuitabilityPipeline::new(config).run(&layers);

        assert_eq!(run.quality, GridQuality::DefaultBounds);
        assert_eq!(run.grid.len(), fallback_cells);
        assert!(run
            .warnings
            .iter()
            .any(|warning| warning.contains("survey grid")));
    }

    #[test]
    fn out_of_range_bounds_fall_back() {
        // Declared WGS84 but carrying projected meters.
        let boundary = r#"{"type": "Polygon", "coordinates": [[[3500000, 1600000], [3540000, 1600000], [3540000, 1640000], [3500000, 1600000]]]}"#;
        let run = SuitabilityPipeline::new(PipelineConfig::default().with_seed(1))
            .run(&[LayerHandle::new("boundary.geojson", boundary)]);
        assert_eq!(run.quality, GridQuality::DefaultBounds);
        assert!(!run.grid.is_empty());
        assert!(run
            .warnings
            .iter()
            .any(|warning| warning.contains("outside longitude/latitude range")));
    }
}
