//! Overlay intersection of the grid with the district boundary.

use geo::{Area, BooleanOps, Geometry, MultiPolygon, Polygon};
use std::panic::{self, AssertUnwindSafe};
use thiserror::Error;

use crate::crs::has_non_finite;
use crate::models::{Attributes, BoundingBox, GridRow, SpatialTable, Tessellation};

/// Pieces smaller than this (in square degrees) are edge slivers.
const MIN_PIECE_AREA_DEG2: f64 = 1e-14;

#[derive(Debug, Error, PartialEq)]
pub enum ClipError {
    #[error("boundary has no polygon geometry to clip against")]
    NoPolygonalGeometry,
    #[error("boundary geometry has non-finite coordinates")]
    InvalidGeometry,
    #[error("overlay intersection failed: {0}")]
    Overlay(String),
}

struct ClipShape {
    shape: MultiPolygon<f64>,
    bounds: BoundingBox,
    attributes: Attributes,
}

/// Intersect every cell with every polygonal boundary feature.
///
/// Each non-empty piece becomes a row carrying the cell centroid and the
/// attributes of the boundary feature it came from; cells wholly outside
/// the boundary disappear. Non-polygonal boundary rows are ignored.
pub fn clip_to_boundary(
    grid: &Tessellation,
    boundary: &SpatialTable,
) -> Result<Vec<GridRow>, ClipError> {
    let shapes = clip_shapes(boundary)?;
    guard_overlay(|| overlay(grid, &shapes))
}

/// Run an overlay, turning a panic inside the boolean ops into an error.
fn guard_overlay<T>(op: impl FnOnce() -> T) -> Result<T, ClipError> {
    panic::catch_unwind(AssertUnwindSafe(op)).map_err(|payload| {
        let reason = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "boolean operation panicked".to_string());
        ClipError::Overlay(reason)
    })
}

fn clip_shapes(boundary: &SpatialTable) -> Result<Vec<ClipShape>, ClipError> {
    let mut shapes = Vec::new();
    for feature in &boundary.features {
        let polygons = polygons_of(&feature.geometry);
        if polygons.is_empty() {
            continue;
        }
        if has_non_finite(&feature.geometry) {
            return Err(ClipError::InvalidGeometry);
        }
        let shape = MultiPolygon::new(polygons);
        let Some(bounds) = BoundingBox::of_geometry(&Geometry::MultiPolygon(shape.clone())) else {
            continue;
        };
        shapes.push(ClipShape {
            shape,
            bounds,
            attributes: feature.attributes.clone(),
        });
    }

    if shapes.is_empty() {
        return Err(ClipError::NoPolygonalGeometry);
    }
    Ok(shapes)
}

fn polygons_of(geometry: &Geometry<f64>) -> Vec<Polygon<f64>> {
    match geometry {
        Geometry::Polygon(polygon) => vec![polygon.clone()],
        Geometry::MultiPolygon(multi) => multi.0.clone(),
        Geometry::Rect(rect) => vec![rect.to_polygon()],
        Geometry::Triangle(triangle) => vec![triangle.to_polygon()],
        Geometry::GeometryCollection(collection) => {
            collection.iter().flat_map(polygons_of).collect()
        }
        _ => Vec::new(),
    }
}

fn overlay(grid: &Tessellation, shapes: &[ClipShape]) -> Vec<GridRow> {
    let mut rows = Vec::new();
    for cell in &grid.cells {
        let cell_geometry = Geometry::Polygon(cell.geometry.clone());
        let Some(cell_bounds) = BoundingBox::of_geometry(&cell_geometry) else {
            continue;
        };
        let cell_shape = MultiPolygon::new(vec![cell.geometry.clone()]);

        for shape in shapes {
            if !cell_bounds.overlaps(&shape.bounds) {
                continue;
            }
            let piece = cell_shape.intersection(&shape.shape);
            if piece.unsigned_area() <= MIN_PIECE_AREA_DEG2 {
                continue;
            }
            let geometry = if piece.0.len() == 1 {
                Geometry::Polygon(piece.0[0].clone())
            } else {
                Geometry::MultiPolygon(piece)
            };
            rows.push(GridRow {
                geometry,
                centroid: cell.centroid,
                attributes: shape.attributes.clone(),
            });
        }
    }
    rows
}
