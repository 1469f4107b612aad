//! Coordinate reference systems and reprojection into WGS84.
//!
//! EPSG codes are resolved to proj definitions through `crs-definitions`
//! and evaluated with `proj4rs`. A raw `+proj=` string is accepted as well.

use geo::{Coord, CoordsIter, Geometry, MapCoords};
use proj4rs::Proj;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const WGS84_DEFINITION: &str = "+proj=longlat +datum=WGS84 +no_defs";

/// A named coordinate reference system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum Crs {
    Epsg(u32),
    /// A proj string or a declaration we could not interpret
    Named(String),
}

impl Crs {
    pub const WGS84: Crs = Crs::Epsg(4326);

    pub fn epsg(&self) -> Option<u32> {
        match self {
            Crs::Epsg(code) => Some(*code),
            Crs::Named(_) => None,
        }
    }

    pub fn is_wgs84(&self) -> bool {
        self.epsg() == Some(4326)
    }

    /// Parse any of the common spellings of a CRS identifier.
    pub fn parse(text: &str) -> Crs {
        let trimmed = text.trim();
        let upper = trimmed.to_ascii_uppercase();
        if upper == "CRS84" || upper.ends_with(":CRS84") {
            return Crs::WGS84;
        }
        let code = upper
            .strip_prefix("EPSG:")
            .or_else(|| upper.strip_prefix("URN:OGC:DEF:CRS:EPSG::"))
            .or_else(|| upper.strip_prefix("URN:OGC:DEF:CRS:EPSG:6.6:"))
            .unwrap_or(&upper);
        match code.parse::<u32>() {
            Ok(code) => Crs::Epsg(code),
            Err(_) => Crs::Named(trimmed.to_string()),
        }
    }
}

impl Default for Crs {
    fn default() -> Self {
        Crs::WGS84
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Crs::Epsg(code) => write!(f, "EPSG:{code}"),
            Crs::Named(name) => f.write_str(name),
        }
    }
}

impl FromStr for Crs {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Crs::parse(s))
    }
}

impl From<String> for Crs {
    fn from(value: String) -> Self {
        Crs::parse(&value)
    }
}

impl From<Crs> for String {
    fn from(value: Crs) -> Self {
        value.to_string()
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ReprojectError {
    #[error("unsupported reference system {0}")]
    Unsupported(Crs),
    #[error("invalid definition for {crs}: {reason}")]
    Definition { crs: Crs, reason: String },
    #[error("could not transform coordinates from {crs}: {reason}")]
    Transform { crs: Crs, reason: String },
    #[error("reprojection from {0} produced non-finite coordinates")]
    NonFinite(Crs),
}

/// Proj definition for `crs`, if one is known.
fn proj_definition(crs: &Crs) -> Option<&str> {
    let code = match crs {
        Crs::Named(text) if text.starts_with("+proj=") => return Some(text.as_str()),
        Crs::Named(_) => return None,
        // Web Mercator aliases outside the registry
        Crs::Epsg(900913 | 102100 | 102113 | 3785) => 3857,
        Crs::Epsg(code) => *code,
    };
    let code = u16::try_from(code).ok()?;
    crs_definitions::from_code(code).map(|def| def.proj4)
}

/// A prepared transformation from one system into WGS84 lon/lat.
pub struct Reprojector {
    source: Crs,
    from: Proj,
    to: Proj,
    /// proj4rs takes and returns angular coordinates in radians
    geographic_source: bool,
}

impl Reprojector {
    pub fn new(source: &Crs) -> Result<Self, ReprojectError> {
        let definition =
            proj_definition(source).ok_or_else(|| ReprojectError::Unsupported(source.clone()))?;
        let from = Proj::from_proj_string(definition).map_err(|err| ReprojectError::Definition {
            crs: source.clone(),
            reason: err.to_string(),
        })?;
        let to = Proj::from_proj_string(WGS84_DEFINITION).map_err(|err| {
            ReprojectError::Definition {
                crs: Crs::WGS84,
                reason: err.to_string(),
            }
        })?;
        let geographic_source =
            definition.contains("+proj=longlat") || definition.contains("+proj=latlong");

        Ok(Self {
            source: source.clone(),
            from,
            to,
            geographic_source,
        })
    }

    pub fn apply(&self, geometry: &Geometry<f64>) -> Result<Geometry<f64>, ReprojectError> {
        if self.source.is_wgs84() {
            return Ok(geometry.clone());
        }
        let projected = geometry.try_map_coords(|coord| self.to_lon_lat(coord))?;
        if has_non_finite(&projected) {
            return Err(ReprojectError::NonFinite(self.source.clone()));
        }
        Ok(projected)
    }

    fn to_lon_lat(&self, coord: Coord<f64>) -> Result<Coord<f64>, ReprojectError> {
        let mut point = if self.geographic_source {
            (coord.x.to_radians(), coord.y.to_radians(), 0.0)
        } else {
            (coord.x, coord.y, 0.0)
        };
        proj4rs::transform::transform(&self.from, &self.to, &mut point).map_err(|err| {
            ReprojectError::Transform {
                crs: self.source.clone(),
                reason: err.to_string(),
            }
        })?;
        Ok(Coord {
            x: point.0.to_degrees(),
            y: point.1.to_degrees(),
        })
    }
}

/// Reproject a geometry from `from` into WGS84 longitude/latitude.
pub fn reproject_to_wgs84(
    geometry: &Geometry<f64>,
    from: &Crs,
) -> Result<Geometry<f64>, ReprojectError> {
    Reprojector::new(from)?.apply(geometry)
}

pub(crate) fn has_non_finite(geometry: &Geometry<f64>) -> bool {
    geometry
        .coords_iter()
        .any(|coord| !coord.x.is_finite() || !coord.y.is_finite())
}
