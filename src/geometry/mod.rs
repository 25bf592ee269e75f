//! Shapefile geometry types and the .shp record decoder.
//!
//! A shapefile geometry stream is a 100-byte header followed by
//! variable-length records. The header mixes endianness by design: the file
//! code and length are big-endian, everything after them is little-endian.
//! Records carry their own little-endian shape-type tag, so a file may in
//! principle mix shape types even though the header declares one.

pub mod shp_parser;

pub use shp_parser::decode;

use geo_types::Coord;

/// Shape-type tags as stored on disk.
pub mod type_tags {
    pub const NULL: i32 = 0;
    pub const POINT: i32 = 1;
    pub const POLYLINE: i32 = 3;
    pub const POLYGON: i32 = 5;
    pub const MULTIPOINT: i32 = 8;
}

/// Human-readable name for a shape-type tag, if it is one this crate knows.
pub fn shape_type_name(tag: i32) -> Option<&'static str> {
    match tag {
        type_tags::NULL => Some("Null"),
        type_tags::POINT => Some("Point"),
        type_tags::POLYLINE => Some("Polyline"),
        type_tags::POLYGON => Some("Polygon"),
        type_tags::MULTIPOINT => Some("MultiPoint"),
        _ => None,
    }
}

/// Bounding box from the .shp header: x/y/z/m extents, little-endian f64 on
/// disk.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
    pub min_z: f64,
    pub max_z: f64,
    pub min_m: f64,
    pub max_m: f64,
}

/// The fixed 100-byte shapefile header. Immutable once parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapefileHeader {
    /// Magic number, always 9994.
    pub file_code: i32,
    /// Total file length in bytes, derived from the on-disk 16-bit-word count.
    pub byte_length: usize,
    pub version: i32,
    /// Shape type the file declares. Per-record tags take precedence.
    pub shape_type: i32,
    pub bbox: BoundingBox,
}

/// A multi-part polyline or polygon payload.
///
/// `parts` holds strictly increasing point-index offsets where each part (or
/// polygon ring) starts; the last part extends to `points.len()`. The format
/// stores polylines and polygons identically; the distinction is purely the
/// record tag.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiPartGeometry {
    /// minX, minY, maxX, maxY of this record.
    pub bbox: [f64; 4],
    pub parts: Vec<u32>,
    pub points: Vec<Coord<f64>>,
}

/// A multipoint payload: a bbox and a flat point set, no parts array.
#[derive(Debug, Clone, PartialEq)]
pub struct PointSet {
    pub bbox: [f64; 4],
    pub points: Vec<Coord<f64>>,
}

/// One decoded shape payload.
///
/// Unknown tags are carried explicitly as [`Shape::Unsupported`] rather than
/// coerced or dropped, so record numbering stays aligned with the attribute
/// table.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Null,
    Point { x: f64, y: f64 },
    Polyline(MultiPartGeometry),
    Polygon(MultiPartGeometry),
    MultiPoint(PointSet),
    Unsupported { type_tag: i32 },
}

impl Shape {
    /// Number of coordinate pairs this shape contributes to GeoJSON output.
    pub fn coordinate_count(&self) -> usize {
        match self {
            Shape::Null | Shape::Unsupported { .. } => 0,
            Shape::Point { .. } => 1,
            Shape::Polyline(g) | Shape::Polygon(g) => g.points.len(),
            Shape::MultiPoint(s) => s.points.len(),
        }
    }
}

/// One .shp record: the 1-based on-disk record number, the payload length in
/// bytes and the decoded shape.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryRecord {
    pub number: i32,
    pub content_length: usize,
    pub shape: Shape,
}

/// A fully decoded .shp stream.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedShapefile {
    /// Caller-supplied label for diagnostics (file name, URL, ...).
    pub source: String,
    pub header: ShapefileHeader,
    pub records: Vec<GeometryRecord>,
}
