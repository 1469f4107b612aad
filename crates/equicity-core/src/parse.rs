//! Layer parsers tried in priority order.
//!
//! Uploaded bytes may be a vector file (GeoJSON or the `.shp` part of an
//! ESRI shapefile) or a plain table (CSV).
//! Each parser either succeeds or reports why it could not read the bytes;
//! the chain ends in an explicit [`LayerParse::Absent`] when none succeed.

use geo::Geometry;
use serde_json::{Number, Value};
use thiserror::Error;

use crate::crs::Crs;
use crate::models::{Attributes, Feature, SpatialTable, Table};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("layer is not valid UTF-8: {0}")]
    NotUtf8(#[from] std::str::Utf8Error),
    #[error("invalid GeoJSON: {0}")]
    GeoJson(#[from] geojson::Error),
    #[error("not a shapefile")]
    NotShapefile,
    #[error("invalid shapefile: {0}")]
    Shapefile(#[from] shapefile::Error),
    #[error("unsupported shapefile geometry: {0}")]
    ShapeGeometry(String),
    #[error("invalid CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("layer is empty")]
    Empty,
}

/// What a parser produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedLayer {
    Spatial(SpatialTable),
    Tabular(Table),
}

/// Result of running a [`ParserChain`].
#[derive(Debug, Clone, PartialEq)]
pub enum LayerParse {
    Parsed(ParsedLayer),
    /// Every parser failed; one reason per parser, in chain order
    Absent { failures: Vec<String> },
}

impl LayerParse {
    pub fn into_parsed(self) -> Option<ParsedLayer> {
        match self {
            LayerParse::Parsed(layer) => Some(layer),
            LayerParse::Absent { .. } => None,
        }
    }
}

/// One way of reading layer bytes.
pub trait LayerParser: Send + Sync {
    fn name(&self) -> &'static str;

    fn parse(&self, bytes: &[u8]) -> Result<ParsedLayer, ParseError>;
}

/// Ordered list of parsers; the first success wins.
pub struct ParserChain {
    parsers: Vec<Box<dyn LayerParser>>,
}

impl ParserChain {
    pub fn new(parsers: Vec<Box<dyn LayerParser>>) -> Self {
        Self { parsers }
    }

    pub fn parse(&self, bytes: &[u8]) -> LayerParse {
        let mut failures = Vec::with_capacity(self.parsers.len());
        for parser in &self.parsers {
            match parser.parse(bytes) {
                Ok(layer) => return LayerParse::Parsed(layer),
                Err(err) => {
                    tracing::debug!("{} parser rejected layer: {}", parser.name(), err);
                    failures.push(format!("{}: {}", parser.name(), err));
                }
            }
        }
        LayerParse::Absent { failures }
    }
}

impl Default for ParserChain {
    /// Spatial formats first, plain tables last.
    fn default() -> Self {
        Self::new(vec![
            Box::new(GeoJsonParser),
            Box::new(ShapefileParser),
            Box::new(CsvParser),
        ])
    }
}

// ========== GEOJSON ==========

#[derive(Debug, Clone, Copy, Default)]
pub struct GeoJsonParser;

impl LayerParser for GeoJsonParser {
    fn name(&self) -> &'static str {
        "geojson"
    }

    fn parse(&self, bytes: &[u8]) -> Result<ParsedLayer, ParseError> {
        let text = std::str::from_utf8(bytes)?;
        if text.trim().is_empty() {
            return Err(ParseError::Empty);
        }
        let geojson: geojson::GeoJson = text.parse()?;

        let (crs, raw_features) = match geojson {
            geojson::GeoJson::FeatureCollection(collection) => (
                declared_crs(collection.foreign_members.as_ref()),
                collection.features,
            ),
            geojson::GeoJson::Feature(feature) => {
                (declared_crs(feature.foreign_members.as_ref()), vec![feature])
            }
            geojson::GeoJson::Geometry(geometry) => {
                let crs = declared_crs(geometry.foreign_members.as_ref());
                let feature = geojson::Feature {
                    bbox: None,
                    geometry: Some(geometry),
                    id: None,
                    properties: None,
                    foreign_members: None,
                };
                (crs, vec![feature])
            }
        };

        let mut features = Vec::with_capacity(raw_features.len());
        let mut skipped = 0usize;
        for raw in raw_features {
            let Some(geometry) = raw.geometry else {
                skipped += 1;
                continue;
            };
            let geometry = Geometry::<f64>::try_from(geometry)?;
            let attributes: Attributes = raw
                .properties
                .map(|properties| properties.into_iter().collect())
                .unwrap_or_default();
            features.push(Feature::with_attributes(geometry, attributes));
        }
        if skipped > 0 {
            tracing::debug!("Skipped {} GeoJSON features without geometry", skipped);
        }

        Ok(ParsedLayer::Spatial(SpatialTable::new(crs, features)))
    }
}

/// Read a legacy `"crs": {"type": "name", "properties": {"name": ..}}` member.
fn declared_crs(members: Option<&geojson::JsonObject>) -> Option<Crs> {
    let name = members?
        .get("crs")?
        .get("properties")?
        .get("name")?
        .as_str()?;
    Some(Crs::parse(name))
}

// ========== SHAPEFILE ==========

/// Big-endian file code opening every `.shp` main file.
const SHAPEFILE_MAGIC: [u8; 4] = [0x00, 0x00, 0x27, 0x0a];
const SHAPEFILE_HEADER_LEN: usize = 100;

/// Reads the geometry of a `.shp` main file.
///
/// The `.dbf` and `.prj` sidecars are not part of an upload, so rows carry
/// no attributes and no declared CRS.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShapefileParser;

impl LayerParser for ShapefileParser {
    fn name(&self) -> &'static str {
        "shapefile"
    }

    fn parse(&self, bytes: &[u8]) -> Result<ParsedLayer, ParseError> {
        if bytes.len() < SHAPEFILE_HEADER_LEN || bytes[..4] != SHAPEFILE_MAGIC {
            return Err(ParseError::NotShapefile);
        }
        let reader = shapefile::ShapeReader::new(std::io::Cursor::new(bytes))?;
        let shapes = reader.read()?;

        let mut features = Vec::with_capacity(shapes.len());
        for shape in shapes {
            if matches!(shape, shapefile::Shape::NullShape) {
                continue;
            }
            let geometry = Geometry::<f64>::try_from(shape)
                .map_err(|err| ParseError::ShapeGeometry(err.to_string()))?;
            features.push(Feature::new(geometry));
        }

        Ok(ParsedLayer::Spatial(SpatialTable::new(None, features)))
    }
}

// ========== CSV ==========

#[derive(Debug, Clone, Copy, Default)]
pub struct CsvParser;

impl LayerParser for CsvParser {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn parse(&self, bytes: &[u8]) -> Result<ParsedLayer, ParseError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(bytes);

        let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        if columns.is_empty() || columns.iter().all(|column| column.is_empty()) {
            return Err(ParseError::Empty);
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let row: Attributes = columns
                .iter()
                .zip(record.iter())
                .map(|(column, cell)| (column.clone(), cell_value(cell)))
                .collect();
            rows.push(row);
        }

        Ok(ParsedLayer::Tabular(Table::new(columns, rows)))
    }
}

fn cell_value(cell: &str) -> Value {
    if cell.is_empty() {
        return Value::Null;
    }
    if let Ok(int) = cell.parse::<i64>() {
        return Value::from(int);
    }
    if let Some(number) = cell.parse::<f64>().ok().and_then(Number::from_f64) {
        return Value::Number(number);
    }
    Value::String(cell.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::point;

    const DISTRICT_GEOJSON: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": {"district": "Coimbatore", "code": 632},
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[77.0, 10.8], [77.5, 10.8], [77.5, 11.1], [77.0, 11.1], [77.0, 10.8]]]
                }
            },
            {"type": "Feature", "properties": {"note": "no geometry"}, "geometry": null}
        ]
    }"#;

    #[test]
    fn geojson_feature_collection_becomes_spatial_table() {
        let parsed = GeoJsonParser.parse(DISTRICT_GEOJSON.as_bytes()).unwrap();
        let ParsedLayer::Spatial(table) = parsed else {
            panic!("expected spatial layer");
        };
        assert_eq!(table.crs, None);
        assert_eq!(table.len(), 1, "null geometry rows are dropped");
        let feature = &table.features[0];
        assert!(matches!(feature.geometry, Geometry::Polygon(_)));
        assert_eq!(feature.attributes["district"], Value::from("Coimbatore"));
        assert_eq!(feature.attributes["code"], Value::from(632));
    }

    #[test]
    fn geojson_legacy_crs_member_is_read() {
        let text = r#"{
            "type": "FeatureCollection",
            "crs": {"type": "name", "properties": {"name": "urn:ogc:def:crs:EPSG::3857"}},
            "features": [{"type": "Feature", "properties": {}, "geometry": {"type": "Point", "coordinates": [0.0, 0.0]}}]
        }"#;
        let ParsedLayer::Spatial(table) = GeoJsonParser.parse(text.as_bytes()).unwrap() else {
            panic!("expected spatial layer");
        };
        assert_eq!(table.crs, Some(Crs::Epsg(3857)));
    }

    #[test]
    fn bare_geometry_is_one_row() {
        let text = r#"{"type": "Point", "coordinates": [78.0, 11.0]}"#;
        let ParsedLayer::Spatial(table) = GeoJsonParser.parse(text.as_bytes()).unwrap() else {
            panic!("expected spatial layer");
        };
        assert_eq!(table.len(), 1);
        assert_eq!(table.features[0].geometry, Geometry::Point(point!(x: 78.0, y: 11.0)));
    }

    #[test]
    fn geojson_rejects_csv_text() {
        assert!(GeoJsonParser.parse(b"name,longitude,latitude\nA,78,11\n").is_err());
        assert!(matches!(GeoJsonParser.parse(b"   "), Err(ParseError::Empty)));
    }

    /// `.shp` bytes holding one single-ring polygon record.
    fn polygon_shp(ring: &[(f64, f64)]) -> Vec<u8> {
        let xs = ring.iter().map(|p| p.0);
        let ys = ring.iter().map(|p| p.1);
        let bbox = [
            xs.clone().fold(f64::INFINITY, f64::min),
            ys.clone().fold(f64::INFINITY, f64::min),
            xs.fold(f64::NEG_INFINITY, f64::max),
            ys.fold(f64::NEG_INFINITY, f64::max),
        ];

        let mut content = Vec::new();
        content.extend_from_slice(&5i32.to_le_bytes());
        for value in bbox {
            content.extend_from_slice(&value.to_le_bytes());
        }
        content.extend_from_slice(&1i32.to_le_bytes());
        content.extend_from_slice(&(ring.len() as i32).to_le_bytes());
        content.extend_from_slice(&0i32.to_le_bytes());
        for (x, y) in ring {
            content.extend_from_slice(&x.to_le_bytes());
            content.extend_from_slice(&y.to_le_bytes());
        }

        let file_len = 100 + 8 + content.len();
        let mut bytes = Vec::with_capacity(file_len);
        bytes.extend_from_slice(&9994i32.to_be_bytes());
        bytes.extend_from_slice(&[0u8; 20]);
        bytes.extend_from_slice(&((file_len / 2) as i32).to_be_bytes());
        bytes.extend_from_slice(&1000i32.to_le_bytes());
        bytes.extend_from_slice(&5i32.to_le_bytes());
        for value in bbox {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        bytes.extend_from_slice(&[0u8; 32]);
        bytes.extend_from_slice(&1i32.to_be_bytes());
        bytes.extend_from_slice(&((content.len() / 2) as i32).to_be_bytes());
        bytes.extend_from_slice(&content);
        bytes
    }

    #[test]
    fn shapefile_polygon_becomes_spatial_table() {
        // Clockwise outer ring.
        let ring = [(77.0, 10.8), (77.0, 10.9), (77.1, 10.8), (77.0, 10.8)];
        let ParsedLayer::Spatial(table) = ShapefileParser.parse(&polygon_shp(&ring)).unwrap() else {
            panic!("expected spatial layer");
        };
        assert_eq!(table.crs, None);
        assert_eq!(table.len(), 1);
        assert!(table.features[0].attributes.is_empty());
        let bounds = table.bounds().unwrap();
        assert!((bounds.min_x - 77.0).abs() < 1e-12 && (bounds.max_x - 77.1).abs() < 1e-12);
        assert!((bounds.min_y - 10.8).abs() < 1e-12 && (bounds.max_y - 10.9).abs() < 1e-12);
    }

    #[test]
    fn shapefile_parser_rejects_other_formats() {
        assert!(matches!(
            ShapefileParser.parse(DISTRICT_GEOJSON.as_bytes()),
            Err(ParseError::NotShapefile)
        ));
        assert!(matches!(
            ShapefileParser.parse(&[0x00, 0x00, 0x27, 0x0a]),
            Err(ParseError::NotShapefile)
        ));
    }

    #[test]
    fn chain_reads_shapefile_before_csv() {
        let ring = [(0.0, 0.0), (0.0, 1.0), (1.0, 1.0), (1.0, 0.0), (0.0, 0.0)];
        assert!(matches!(
            ParserChain::default().parse(&polygon_shp(&ring)),
            LayerParse::Parsed(ParsedLayer::Spatial(_))
        ));
    }

    #[test]
    fn csv_values_are_typed() {
        let parsed = CsvParser
            .parse(b"name,longitude,latitude,capacity\nDepot A,77.9,11.02,\nDepot B,78.1,10.95,12\n")
            .unwrap();
        let ParsedLayer::Tabular(table) = parsed else {
            panic!("expected tabular layer");
        };
        assert_eq!(table.columns, vec!["name", "longitude", "latitude", "capacity"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0]["name"], Value::from("Depot A"));
        assert_eq!(table.rows[0]["longitude"].as_f64(), Some(77.9));
        assert_eq!(table.rows[0]["capacity"], Value::Null);
        assert_eq!(table.rows[1]["capacity"], Value::from(12));
    }

    #[test]
    fn csv_rejects_binary_and_empty_input() {
        assert!(CsvParser.parse(&[0x00, 0x00, 0x27, 0x0a, 0xff, 0xfe, 0x80]).is_err());
        assert!(matches!(CsvParser.parse(b""), Err(ParseError::Empty)));
    }

    #[test]
    fn chain_prefers_geojson_then_falls_back_to_csv() {
        let chain = ParserChain::default();
        assert!(matches!(
            chain.parse(DISTRICT_GEOJSON.as_bytes()),
            LayerParse::Parsed(ParsedLayer::Spatial(_))
        ));
        assert!(matches!(
            chain.parse(b"longitude,latitude\n78,11\n"),
            LayerParse::Parsed(ParsedLayer::Tabular(_))
        ));
    }

    #[test]
    fn chain_reports_absent_with_reasons() {
        let chain = ParserChain::default();
        match chain.parse(&[0xff, 0xfe, 0x00, 0x01]) {
            LayerParse::Absent { failures } => {
                assert_eq!(failures.len(), 3);
                assert!(failures[0].starts_with("geojson"));
                assert!(failures[1].starts_with("shapefile"));
                assert!(failures[2].starts_with("csv"));
            }
            other => panic!("expected absent, got {other:?}"),
        }
    }
}
