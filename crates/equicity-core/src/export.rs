//! GeoJSON export of a scored grid.
//!
//! The centroid is an internal helper and is never written out.

use geojson::{Feature, FeatureCollection, JsonObject};
use serde_json::Value;

use crate::models::{SuitabilityCell, SuitabilityGrid};

fn cell_properties(cell: &SuitabilityCell) -> JsonObject {
    let mut properties: JsonObject = cell
        .attributes
        .iter()
        .filter(|(key, _)| key.as_str() != "centroid")
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    properties.insert(
        "suitability_index".to_string(),
        Value::from(cell.suitability_index),
    );
    properties.insert(
        "suitability_class".to_string(),
        Value::from(cell.suitability_class.as_str()),
    );
    properties
}

/// One feature per cell, in grid order.
pub fn grid_to_feature_collection(grid: &SuitabilityGrid) -> FeatureCollection {
    let features = grid
        .cells
        .iter()
        .map(|cell| Feature {
            bbox: None,
            geometry: Some(geojson::Geometry::new(geojson::Value::from(&cell.geometry))),
            id: None,
            properties: Some(cell_properties(cell)),
            foreign_members: None,
        })
        .collect();

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

pub fn grid_to_geojson_string(grid: &SuitabilityGrid) -> serde_json::Result<String> {
    serde_json::to_string(&grid_to_feature_collection(grid))
}
