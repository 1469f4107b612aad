//! Geometry normalizer: any supported input becomes a WGS84 spatial table.
//!
//! The normalizer never fails outward. Unreadable inputs become `None`,
//! tables without coordinates get a fallback point, and a reprojection
//! that cannot be performed leaves the table in its source system with a
//! warning.

use geo::{Geometry, Point};
use serde_json::Value;
use std::path::PathBuf;

use crate::crs::{Crs, Reprojector};
use crate::models::{push_warning, Feature, LayerHandle, SpatialTable, Table};
use crate::parse::{LayerParse, ParsedLayer, ParserChain};

/// Default coordinate given to rows that carry no location, as (lon, lat).
pub const DEFAULT_FALLBACK_POINT: (f64, f64) = (78.0, 11.0);

/// Anything the normalizer accepts.
#[derive(Debug, Clone)]
pub enum LayerInput {
    /// A vector or tabular file on disk
    Path(PathBuf),
    /// Uploaded bytes
    Upload(LayerHandle),
    /// A table without geometry
    Tabular(Table),
    /// An already-spatial table
    Spatial(SpatialTable),
}

impl From<LayerHandle> for LayerInput {
    fn from(handle: LayerHandle) -> Self {
        LayerInput::Upload(handle)
    }
}

impl From<Table> for LayerInput {
    fn from(table: Table) -> Self {
        LayerInput::Tabular(table)
    }
}

impl From<SpatialTable> for LayerInput {
    fn from(table: SpatialTable) -> Self {
        LayerInput::Spatial(table)
    }
}

impl From<ParsedLayer> for LayerInput {
    fn from(layer: ParsedLayer) -> Self {
        match layer {
            ParsedLayer::Spatial(table) => LayerInput::Spatial(table),
            ParsedLayer::Tabular(table) => LayerInput::Tabular(table),
        }
    }
}

/// Normalizer settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalizer {
    /// System assumed for undeclared inputs and for lon/lat columns
    pub target_crs: Crs,
    /// Location given to rows without coordinates, as (lon, lat)
    pub fallback_point: (f64, f64),
}

impl Default for Normalizer {
    fn default() -> Self {
        Self {
            target_crs: Crs::WGS84,
            fallback_point: DEFAULT_FALLBACK_POINT,
        }
    }
}

/// Normalize `input` into WGS84, assuming `target_crs` for undeclared data.
pub fn normalize(input: Option<LayerInput>, target_crs: &Crs) -> Option<SpatialTable> {
    let normalizer = Normalizer {
        target_crs: target_crs.clone(),
        ..Normalizer::default()
    };
    let mut warnings = Vec::new();
    normalizer.normalize_with_warnings(input, &ParserChain::default(), &mut warnings)
}

impl Normalizer {
    /// Normalize `input`, appending every degradation to `warnings`.
    pub fn normalize_with_warnings(
        &self,
        input: Option<LayerInput>,
        parsers: &ParserChain,
        warnings: &mut Vec<String>,
    ) -> Option<SpatialTable> {
        let layer = match input? {
            LayerInput::Path(path) => match std::fs::read(&path) {
                Ok(bytes) => self.parse_bytes(&path.display().to_string(), &bytes, parsers, warnings)?,
                Err(err) => {
                    push_warning(
                        warnings,
                        format!("Could not read {}: {}", path.display(), err),
                    );
                    return None;
                }
            },
            LayerInput::Upload(handle) => {
                self.parse_bytes(&handle.name, &handle.content, parsers, warnings)?
            }
            LayerInput::Tabular(table) => ParsedLayer::Tabular(table),
            LayerInput::Spatial(table) => ParsedLayer::Spatial(table),
        };

        let mut table = match layer {
            ParsedLayer::Spatial(table) => table,
            ParsedLayer::Tabular(table) => self.table_to_points(table, warnings),
        };

        if table.crs.is_none() {
            table.crs = Some(self.target_crs.clone());
        }

        Some(self.reproject(table, warnings))
    }

    fn parse_bytes(
        &self,
        name: &str,
        bytes: &[u8],
        parsers: &ParserChain,
        warnings: &mut Vec<String>,
    ) -> Option<ParsedLayer> {
        match parsers.parse(bytes) {
            LayerParse::Parsed(layer) => Some(layer),
            LayerParse::Absent { failures } => {
                push_warning(
                    warnings,
                    format!("Layer '{}' could not be parsed ({})", name, failures.join("; ")),
                );
                None
            }
        }
    }

    /// Build point geometry from `longitude`/`latitude` columns, or give
    /// every row the fallback point when those columns are missing.
    fn table_to_points(&self, table: Table, warnings: &mut Vec<String>) -> SpatialTable {
        let has_coordinates = table.has_column("longitude") && table.has_column("latitude");
        let fallback = Point::new(self.fallback_point.0, self.fallback_point.1);
        let mut unlocated = 0usize;

        let features = table
            .rows
            .into_iter()
            .map(|row| {
                let point = if has_coordinates {
                    row_point(&row).unwrap_or_else(|| {
                        unlocated += 1;
                        fallback
                    })
                } else {
                    fallback
                };
                Feature::with_attributes(point, row)
            })
            .collect();

        if unlocated > 0 {
            push_warning(
                warnings,
                format!(
                    "{} rows had unusable longitude/latitude and were placed at the fallback point",
                    unlocated
                ),
            );
        }

        SpatialTable::new(Some(self.target_crs.clone()), features)
    }

    fn reproject(&self, table: SpatialTable, warnings: &mut Vec<String>) -> SpatialTable {
        let source = table.crs.clone().unwrap_or_else(|| self.target_crs.clone());
        if source.is_wgs84() {
            return table;
        }

        let reprojected: Result<Vec<Geometry<f64>>, _> = Reprojector::new(&source)
            .and_then(|reprojector| {
                table
                    .features
                    .iter()
                    .map(|feature| reprojector.apply(&feature.geometry))
                    .collect()
            });

        match reprojected {
            Ok(geometries) => SpatialTable::new(
                Some(Crs::WGS84),
                table
                    .features
                    .into_iter()
                    .zip(geometries)
                    .map(|(feature, geometry)| Feature::with_attributes(geometry, feature.attributes))
                    .collect(),
            ),
            Err(err) => {
                push_warning(
                    warnings,
                    format!("Reprojection to EPSG:4326 failed, keeping {}: {}", source, err),
                );
                table
            }
        }
    }
}

fn row_point(row: &crate::models::Attributes) -> Option<Point<f64>> {
    let lon = coordinate(row.get("longitude")?)?;
    let lat = coordinate(row.get("latitude")?)?;
    Some(Point::new(lon, lat))
}

fn coordinate(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    number.is_finite().then_some(number)
}
