//! Core data models for the suitability model.

use chrono::{DateTime, Utc};
use geo::{BoundingRect, Geometry, Point, Polygon};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::crs::Crs;

/// Scalar attributes attached to a row, keyed by column name.
pub type Attributes = BTreeMap<String, serde_json::Value>;

// ========== INPUT TABLES ==========

/// Axis-aligned bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub const fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// True when the box has no area to tessellate.
    pub fn is_empty(&self) -> bool {
        !(self.max_x > self.min_x && self.max_y > self.min_y)
    }

    pub fn is_finite(&self) -> bool {
        self.min_x.is_finite()
            && self.min_y.is_finite()
            && self.max_x.is_finite()
            && self.max_y.is_finite()
    }

    /// True when every edge is a valid longitude/latitude.
    pub fn is_lon_lat(&self) -> bool {
        self.is_finite()
            && (-180.0..=180.0).contains(&self.min_x)
            && (-180.0..=180.0).contains(&self.max_x)
            && (-90.0..=90.0).contains(&self.min_y)
            && (-90.0..=90.0).contains(&self.max_y)
    }

    /// Latitude at the vertical midpoint.
    pub fn mid_lat(&self) -> f64 {
        (self.min_y + self.max_y) / 2.0
    }

    fn union(self, other: BoundingBox) -> BoundingBox {
        BoundingBox {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    pub(crate) fn overlaps(&self, other: &BoundingBox) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }

    pub(crate) fn of_geometry(geometry: &Geometry<f64>) -> Option<BoundingBox> {
        let rect = geometry.bounding_rect()?;
        Some(BoundingBox::new(
            rect.min().x,
            rect.min().y,
            rect.max().x,
            rect.max().y,
        ))
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}, {})",
            self.min_x, self.min_y, self.max_x, self.max_y
        )
    }
}

/// One row of a spatial table.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub geometry: Geometry<f64>,
    pub attributes: Attributes,
}

impl Feature {
    pub fn new(geometry: impl Into<Geometry<f64>>) -> Self {
        Self {
            geometry: geometry.into(),
            attributes: Attributes::new(),
        }
    }

    pub fn with_attributes(geometry: impl Into<Geometry<f64>>, attributes: Attributes) -> Self {
        Self {
            geometry: geometry.into(),
            attributes,
        }
    }
}

/// Rows sharing one declared reference system.
///
/// `crs` is `None` when the source never declared one; the normalizer
/// assigns the target system in that case.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpatialTable {
    pub crs: Option<Crs>,
    pub features: Vec<Feature>,
}

impl SpatialTable {
    pub fn new(crs: Option<Crs>, features: Vec<Feature>) -> Self {
        Self { crs, features }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Total bounds over every geometry, or `None` when nothing has extent.
    pub fn bounds(&self) -> Option<BoundingBox> {
        self.features
            .iter()
            .filter_map(|feature| BoundingBox::of_geometry(&feature.geometry))
            .reduce(BoundingBox::union)
    }
}

/// Tabular input without geometry.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Attributes>,
}

impl Table {
    pub fn new(columns: Vec<String>, rows: Vec<Attributes>) -> Self {
        Self { columns, rows }
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|column| column == name)
    }
}

/// An uploaded layer: identifying name plus raw file bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerHandle {
    pub name: String,
    pub content: Vec<u8>,
}

impl LayerHandle {
    pub fn new(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    /// Read a layer from disk, using the file name as its identifier.
    pub fn from_path(path: impl AsRef<std::path::Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self { name, content })
    }
}

// ========== GRID MODELS ==========

/// One lattice cell before clipping.
#[derive(Debug, Clone, PartialEq)]
pub struct GridCell {
    pub geometry: Polygon<f64>,
    pub centroid: Point<f64>,
}

/// Output of the tessellator. Always WGS84.
#[derive(Debug, Clone, PartialEq)]
pub struct Tessellation {
    pub crs: Crs,
    pub cells: Vec<GridCell>,
}

impl Tessellation {
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// A grid cell after the optional clip.
///
/// `centroid` is the centroid of the unclipped lattice cell.
#[derive(Debug, Clone, PartialEq)]
pub struct GridRow {
    pub geometry: Geometry<f64>,
    pub centroid: Point<f64>,
    pub attributes: Attributes,
}

impl From<GridCell> for GridRow {
    fn from(cell: GridCell) -> Self {
        Self {
            geometry: Geometry::Polygon(cell.geometry),
            centroid: cell.centroid,
            attributes: Attributes::new(),
        }
    }
}

// ========== SUITABILITY ==========

/// Discrete suitability tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SuitabilityClass {
    Low,
    Medium,
    High,
}

impl SuitabilityClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuitabilityClass::Low => "Low",
            SuitabilityClass::Medium => "Medium",
            SuitabilityClass::High => "High",
        }
    }
}

impl fmt::Display for SuitabilityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scored, classified grid cell.
#[derive(Debug, Clone, PartialEq)]
pub struct SuitabilityCell {
    pub geometry: Geometry<f64>,
    pub centroid: Point<f64>,
    pub attributes: Attributes,
    /// Continuous score in `[0, 1]`
    pub suitability_index: f64,
    pub suitability_class: SuitabilityClass,
}

/// The scored grid of one model run.
#[derive(Debug, Clone, PartialEq)]
pub struct SuitabilityGrid {
    pub crs: Crs,
    pub cells: Vec<SuitabilityCell>,
}

impl SuitabilityGrid {
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn indices(&self) -> impl Iterator<Item = f64> + '_ {
        self.cells.iter().map(|cell| cell.suitability_index)
    }
}

/// Aggregate statistics for a grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// Arithmetic mean of all indices (0.0 for an empty grid)
    pub mean_suitability: f64,
    /// Cells whose index is above the Medium ceiling
    pub high_count: usize,
    pub cell_count: usize,
}

/// How faithfully the grid follows the district boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GridQuality {
    /// Boundary located and the grid was clipped to it
    Clipped,
    /// Boundary located but the clip failed; grid covers its bounding box
    Unclipped,
    /// No usable boundary; grid covers the fallback bounds
    DefaultBounds,
}

impl GridQuality {
    pub fn is_degraded(&self) -> bool {
        !matches!(self, GridQuality::Clipped)
    }
}

/// Everything one pipeline run produces.
#[derive(Debug, Clone)]
pub struct ModelRun {
    pub grid: SuitabilityGrid,
    pub summary: Summary,
    pub quality: GridQuality,
    /// Non-fatal degradations encountered during the run
    pub warnings: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

/// Log a degradation and keep it for the run report.
pub(crate) fn push_warning(warnings: &mut Vec<String>, message: String) {
    tracing::warn!("{}", message);
    warnings.push(message);
}
