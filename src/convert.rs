//! Feature assembly: geometry records + attribute rows → GeoJSON.
//!
//! The assembler is the single point where the two decoders meet. Records
//! are paired by position; every vertex is reprojected individually; the
//! collection bbox is the reprojected min/max corners of the shapefile
//! header's declared extent.

use crate::attributes::{self, AttributeRecord, AttributeValue, ParsedAttributeTable, TextEncoding};
use crate::crs::{project_with, Crs, CrsRegistry};
use crate::error::Result;
use crate::geometry::{self, MultiPartGeometry, ParsedShapefile, Shape};
use geo_types::Coord;
use serde::Serialize;
use serde_json::{Map, Value};

/// GeoJSON geometry, RFC 7946 shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum GeoJsonGeometry {
    Point { coordinates: [f64; 2] },
    LineString { coordinates: Vec<[f64; 2]> },
    MultiPoint { coordinates: Vec<[f64; 2]> },
    Polygon { coordinates: Vec<Vec<[f64; 2]>> },
}

/// A GeoJSON feature. `properties` is present only when an attribute table
/// was supplied and had a row for this record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Feature {
    #[serde(rename = "type")]
    kind: &'static str,
    pub geometry: GeoJsonGeometry,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<Map<String, Value>>,
}

impl Feature {
    pub fn new(geometry: GeoJsonGeometry, properties: Option<Map<String, Value>>) -> Self {
        Self {
            kind: "Feature",
            geometry,
            properties,
        }
    }
}

/// The assembled GeoJSON `FeatureCollection`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureCollection {
    #[serde(rename = "type")]
    kind: &'static str,
    /// Reprojected (minX, minY, maxX, maxY) of the shapefile header bbox.
    pub bbox: [f64; 4],
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new(bbox: [f64; 4], features: Vec<Feature>) -> Self {
        Self {
            kind: "FeatureCollection",
            bbox,
            features,
        }
    }
}

/// Assemble a `FeatureCollection` using the global CRS registry.
///
/// Geometry and attribute records pair by position. When the two sides
/// disagree on length, only the overlapping prefix carries properties and
/// the surplus on the longer side is ignored; this mirrors the behavior of
/// existing consumers and is logged. Records whose geometry produced zero
/// coordinates (null or unsupported shapes, empty point sets) are dropped.
pub fn assemble(
    shapes: &ParsedShapefile,
    attributes: Option<&ParsedAttributeTable>,
    from: &Crs,
    to: &Crs,
) -> Result<FeatureCollection> {
    assemble_with(CrsRegistry::global(), shapes, attributes, from, to)
}

/// [`assemble`] against an explicit CRS registry.
pub fn assemble_with(
    registry: &CrsRegistry,
    shapes: &ParsedShapefile,
    attributes: Option<&ParsedAttributeTable>,
    from: &Crs,
    to: &Crs,
) -> Result<FeatureCollection> {
    let reproject = |x: f64, y: f64| -> Result<[f64; 2]> {
        let (px, py) = project_with(registry, x, y, from, to)?;
        Ok([px, py])
    };

    let declared = &shapes.header.bbox;
    let min = reproject(declared.min_x, declared.min_y)?;
    let max = reproject(declared.max_x, declared.max_y)?;
    let bbox = [min[0], min[1], max[0], max[1]];

    if let Some(table) = attributes {
        if table.records.len() != shapes.records.len() {
            tracing::warn!(
                geometry_records = shapes.records.len(),
                attribute_records = table.records.len(),
                "record count mismatch, pairing the overlapping prefix only"
            );
        }
    }

    let mut features = Vec::with_capacity(shapes.records.len());
    for (index, record) in shapes.records.iter().enumerate() {
        let Some(geometry) = build_geometry(&record.shape, &reproject)? else {
            tracing::debug!(
                number = record.number,
                "record produced no coordinates, dropped"
            );
            continue;
        };

        let properties = attributes
            .and_then(|table| table.records.get(index))
            .map(record_properties);

        features.push(Feature::new(geometry, properties));
    }

    Ok(FeatureCollection::new(bbox, features))
}

/// One-call conversion mirroring the archive-loader entry point: decode the
/// .shp stream, optionally decode and align the .dbf table, and assemble.
///
/// `encoding_label` names the attribute charset (WHATWG label, e.g.
/// `"utf-8"`, `"big5"`); it is ignored when `dbf` is `None`.
pub fn shapefile_to_geojson(
    shp: &[u8],
    dbf: Option<&[u8]>,
    encoding_label: &str,
    from: &Crs,
    to: &Crs,
) -> Result<FeatureCollection> {
    let shapes = geometry::decode(shp, "shapefile")?;

    let table = match dbf {
        Some(raw) => {
            let text = attributes::decode_text(raw, encoding_label)?;
            let encoding = TextEncoding::from_label(encoding_label);
            Some(attributes::decode(raw, &text, encoding)?)
        }
        None => None,
    };

    assemble(&shapes, table.as_ref(), from, to)
}

fn build_geometry<F>(shape: &Shape, reproject: &F) -> Result<Option<GeoJsonGeometry>>
where
    F: Fn(f64, f64) -> Result<[f64; 2]>,
{
    match shape {
        Shape::Null | Shape::Unsupported { .. } => Ok(None),
        Shape::Point { x, y } => Ok(Some(GeoJsonGeometry::Point {
            coordinates: reproject(*x, *y)?,
        })),
        Shape::Polyline(geometry) => {
            // Parts are flattened into one line, matching how consumers of
            // this format have always read it.
            let coordinates = project_points(&geometry.points, reproject)?;
            if coordinates.is_empty() {
                return Ok(None);
            }
            Ok(Some(GeoJsonGeometry::LineString { coordinates }))
        }
        Shape::MultiPoint(set) => {
            let coordinates = project_points(&set.points, reproject)?;
            if coordinates.is_empty() {
                return Ok(None);
            }
            Ok(Some(GeoJsonGeometry::MultiPoint { coordinates }))
        }
        Shape::Polygon(geometry) => {
            let rings = polygon_rings(geometry, reproject)?;
            if rings.iter().map(Vec::len).sum::<usize>() == 0 {
                return Ok(None);
            }
            Ok(Some(GeoJsonGeometry::Polygon {
                coordinates: rings,
            }))
        }
    }
}

/// Slice the flattened point array into rings at the `parts` offsets; the
/// last ring extends to the end of the array. Out-of-range offsets clamp.
fn polygon_rings<F>(geometry: &MultiPartGeometry, reproject: &F) -> Result<Vec<Vec<[f64; 2]>>>
where
    F: Fn(f64, f64) -> Result<[f64; 2]>,
{
    let total = geometry.points.len();
    let mut rings = Vec::with_capacity(geometry.parts.len());

    for (i, &start) in geometry.parts.iter().enumerate() {
        let end = geometry
            .parts
            .get(i + 1)
            .map(|&next| next as usize)
            .unwrap_or(total)
            .min(total);
        let start = (start as usize).min(end);
        rings.push(project_points(&geometry.points[start..end], reproject)?);
    }

    Ok(rings)
}

fn project_points<F>(points: &[Coord<f64>], reproject: &F) -> Result<Vec<[f64; 2]>>
where
    F: Fn(f64, f64) -> Result<[f64; 2]>,
{
    points.iter().map(|c| reproject(c.x, c.y)).collect()
}

fn record_properties(record: &AttributeRecord) -> Map<String, Value> {
    let mut properties = Map::with_capacity(record.values.len());
    for (name, value) in &record.values {
        let json = match value {
            AttributeValue::Text(text) => Value::String(text.clone()),
            AttributeValue::Number(number) => Value::from(*number),
        };
        properties.insert(name.clone(), json);
    }
    properties
}
