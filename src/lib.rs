//! Shapefile (.shp/.dbf) decoding and GeoJSON conversion.
//!
//! This crate reads a shapefile geometry stream and its companion dBase
//! attribute table from in-memory byte buffers, reprojects coordinates
//! between registered reference systems and emits an RFC 7946
//! `FeatureCollection`. Loading the bytes (archive extraction, network
//! fetch) and rendering the result are the caller's concern.
//!
//! The decoders are tolerant by design: real-world shapefiles are often
//! truncated, and a corrupt trailing record should not discard the valid
//! geometry before it. Header-level corruption, encoding misalignment and
//! invalid coordinates are terminal errors.
//!
//! # Example
//!
//! ```
//! use shp2geojson::{shapefile_to_geojson, Crs};
//!
//! // Minimal point shapefile: header + one Point record at (10, 20).
//! let mut shp = Vec::new();
//! shp.extend_from_slice(&9994i32.to_be_bytes());
//! shp.extend_from_slice(&[0u8; 20]);
//! shp.extend_from_slice(&64i32.to_be_bytes());
//! shp.extend_from_slice(&1000i32.to_le_bytes());
//! shp.extend_from_slice(&1i32.to_le_bytes());
//! for v in [10.0f64, 20.0, 10.0, 20.0, 0.0, 0.0, 0.0, 0.0] {
//!     shp.extend_from_slice(&v.to_le_bytes());
//! }
//! shp.extend_from_slice(&1i32.to_be_bytes());
//! shp.extend_from_slice(&10i32.to_be_bytes());
//! shp.extend_from_slice(&1i32.to_le_bytes());
//! shp.extend_from_slice(&10.0f64.to_le_bytes());
//! shp.extend_from_slice(&20.0f64.to_le_bytes());
//!
//! let collection =
//!     shapefile_to_geojson(&shp, None, "utf-8", &Crs::wgs84(), &Crs::wgs84()).unwrap();
//! assert_eq!(collection.features.len(), 1);
//! assert_eq!(collection.bbox, [10.0, 20.0, 10.0, 20.0]);
//! ```

pub mod attributes;
pub mod convert;
pub mod crs;
pub mod error;
pub mod geometry;

pub use convert::{assemble, shapefile_to_geojson, Feature, FeatureCollection, GeoJsonGeometry};
pub use crs::{project, Crs, CrsRegistry};
pub use error::{Result, ShpError};
