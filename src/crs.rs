//! Coordinate reference systems and per-vertex reprojection.
//!
//! Definitions live in an immutable [`CrsRegistry`]: built once, read-only
//! afterwards. A process-wide registry with the built-in systems is exposed
//! through [`CrsRegistry::global`]; tests and embedders can construct their
//! own and use [`project_with`].

use crate::error::{Result, ShpError};
use std::collections::HashMap;
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};
use std::fmt;
use std::sync::OnceLock;

/// WGS84 semi-major axis (m), also the Web Mercator sphere radius.
const WGS84_A: f64 = 6378137.0;

/// GRS80 semi-minor axis (m), used by NAD83.
const GRS80_B: f64 = 6356752.31414036;

/// WGS84 semi-minor axis (m).
const WGS84_B: f64 = 6356752.314245;

/// Latitude limit beyond which Web Mercator is undefined.
const WEB_MERCATOR_MAX_LAT: f64 = 85.051128779;

/// A coordinate reference system identified by its EPSG code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Crs {
    pub code: u32,
}

impl Crs {
    pub fn epsg(code: u32) -> Self {
        Self { code }
    }

    /// Geographic WGS84 (EPSG:4326), the default target.
    pub fn wgs84() -> Self {
        Self::epsg(4326)
    }

    /// Geographic NAD83 (EPSG:4269).
    pub fn nad83() -> Self {
        Self::epsg(4269)
    }

    /// Spherical Web Mercator (EPSG:3857).
    pub fn web_mercator() -> Self {
        Self::epsg(3857)
    }
}

impl Default for Crs {
    fn default() -> Self {
        Self::wgs84()
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.code)
    }
}

/// How a CRS maps coordinates onto the plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionKind {
    /// Geographic longitude/latitude in degrees.
    LongLat,
    /// Spherical Web Mercator, meters.
    WebMercator,
}

/// Horizontal datum of a CRS.
///
/// WGS84 and NAD83 differ by well under a meter; like proj4's default
/// pipeline, the transform between them is a null shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Datum {
    Wgs84,
    Nad83,
}

/// Reference ellipsoid semi-axes in meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ellipsoid {
    pub semi_major: f64,
    pub semi_minor: f64,
}

/// Full definition of one reference system.
#[derive(Debug, Clone, PartialEq)]
pub struct CrsDefinition {
    pub title: &'static str,
    pub projection: ProjectionKind,
    pub ellipsoid: Ellipsoid,
    pub datum: Datum,
}

/// Immutable table of CRS definitions keyed by EPSG code.
#[derive(Debug, Clone)]
pub struct CrsRegistry {
    definitions: HashMap<u32, CrsDefinition>,
}

impl CrsRegistry {
    /// Registry with the built-in systems: EPSG:4326, EPSG:4269, EPSG:3857.
    pub fn with_builtin() -> Self {
        let wgs84 = Ellipsoid {
            semi_major: WGS84_A,
            semi_minor: WGS84_B,
        };
        let grs80 = Ellipsoid {
            semi_major: WGS84_A,
            semi_minor: GRS80_B,
        };

        let mut definitions = HashMap::new();
        definitions.insert(
            4326,
            CrsDefinition {
                title: "WGS 84 (long/lat)",
                projection: ProjectionKind::LongLat,
                ellipsoid: wgs84,
                datum: Datum::Wgs84,
            },
        );
        definitions.insert(
            4269,
            CrsDefinition {
                title: "NAD83 (long/lat)",
                projection: ProjectionKind::LongLat,
                ellipsoid: grs80,
                datum: Datum::Nad83,
            },
        );
        definitions.insert(
            3857,
            CrsDefinition {
                title: "WGS 84 / Pseudo-Mercator",
                projection: ProjectionKind::WebMercator,
                ellipsoid: wgs84,
                datum: Datum::Wgs84,
            },
        );

        Self { definitions }
    }

    /// The process-wide registry, built on first use.
    pub fn global() -> &'static CrsRegistry {
        static REGISTRY: OnceLock<CrsRegistry> = OnceLock::new();
        REGISTRY.get_or_init(CrsRegistry::with_builtin)
    }

    pub fn get(&self, crs: &Crs) -> Option<&CrsDefinition> {
        self.definitions.get(&crs.code)
    }

    /// Add or replace a definition. Only meaningful on a registry you own;
    /// the global registry is never mutated after construction.
    pub fn register(&mut self, code: u32, definition: CrsDefinition) {
        self.definitions.insert(code, definition);
    }
}

/// Reproject one coordinate pair using the global registry.
///
/// Non-finite input is an [`ShpError::InvalidCoordinate`]; a CRS without a
/// registered definition is an [`ShpError::UnknownCrs`]. An identity pair
/// returns the input unchanged.
pub fn project(x: f64, y: f64, from: &Crs, to: &Crs) -> Result<(f64, f64)> {
    project_with(CrsRegistry::global(), x, y, from, to)
}

/// Reproject one coordinate pair against an explicit registry.
pub fn project_with(
    registry: &CrsRegistry,
    x: f64,
    y: f64,
    from: &Crs,
    to: &Crs,
) -> Result<(f64, f64)> {
    if !x.is_finite() || !y.is_finite() {
        return Err(ShpError::InvalidCoordinate { x, y });
    }

    let from_def = registry
        .get(from)
        .ok_or_else(|| ShpError::UnknownCrs(from.to_string()))?;
    let to_def = registry
        .get(to)
        .ok_or_else(|| ShpError::UnknownCrs(to.to_string()))?;

    if from == to {
        return Ok((x, y));
    }

    // Route through geographic coordinates. The WGS84/NAD83 datum shift is a
    // null transform, so geographic values pass through unchanged.
    let (lon, lat) = match from_def.projection {
        ProjectionKind::LongLat => (x, y),
        ProjectionKind::WebMercator => mercator_inverse(x, y),
    };

    match to_def.projection {
        ProjectionKind::LongLat => Ok((lon, lat)),
        ProjectionKind::WebMercator => Ok(mercator_forward(lon, lat)),
    }
}

/// Spherical Web Mercator forward transform. Latitude is clamped to the
/// projection's defined range.
fn mercator_forward(lon: f64, lat: f64) -> (f64, f64) {
    let lat = lat.clamp(-WEB_MERCATOR_MAX_LAT, WEB_MERCATOR_MAX_LAT);
    let x = WGS84_A * lon.to_radians();
    let y = WGS84_A * (FRAC_PI_4 + lat.to_radians() / 2.0).tan().ln();
    (x, y)
}

fn mercator_inverse(x: f64, y: f64) -> (f64, f64) {
    let lon = (x / WGS84_A).to_degrees();
    let lat = (2.0 * (y / WGS84_A).exp().atan() - FRAC_PI_2).to_degrees();
    (lon, lat)
}
