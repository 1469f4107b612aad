//! Equicity core - logistics-hub suitability grids for a district.
//!
//! Uploaded layers are normalized into WGS84, the district boundary is
//! tessellated into metric cells and clipped to its true shape, and every
//! surviving cell is scored and classified into Low/Medium/High tiers.

pub mod clip;
pub mod config;
pub mod crs;
pub mod export;
pub mod grid;
pub mod models;
pub mod normalize;
pub mod parse;
pub mod pipeline;
pub mod scoring;
pub mod spatial;

pub use clip::{clip_to_boundary, ClipError};
pub use config::PipelineConfig;
pub use crs::{reproject_to_wgs84, Crs, ReprojectError, Reprojector};
pub use export::{grid_to_feature_collection, grid_to_geojson_string};
pub use grid::{estimate_cell_count, tessellate, tessellate_with_limit, MAX_GRID_CELLS};
pub use models::{
    Attributes, BoundingBox, Feature, GridCell, GridQuality, GridRow, LayerHandle, ModelRun,
    SpatialTable, SuitabilityCell, SuitabilityClass, SuitabilityGrid, Summary, Table,
    Tessellation,
};
pub use normalize::{normalize, LayerInput, Normalizer};
pub use parse::{
    CsvParser, GeoJsonParser, LayerParse, LayerParser, ParseError, ParsedLayer, ParserChain,
    ShapefileParser,
};
pub use pipeline::{run_model, SuitabilityPipeline};
pub use scoring::{
    classify, summarize, ClassThresholds, RandomScorer, ScoringContext, SuitabilityScorer,
};
