//! Binary decoder for the .shp geometry stream.
//!
//! The format mandates mixed endianness: the file code and file length in
//! the header, and the record number / content length of every record, are
//! big-endian; shape payloads (type tag, bbox, counts, coordinates) are
//! little-endian.
//!
//! Parsing is deliberately tolerant of truncation. Partial shapefiles are
//! common in practice, and a corrupted trailing record should not discard
//! the valid geometry before it: decoding stops at the first record whose
//! payload cannot be read in full and returns everything parsed so far.

use crate::error::{Result, ShpError};
use crate::geometry::{
    type_tags, BoundingBox, GeometryRecord, MultiPartGeometry, ParsedShapefile, PointSet, Shape,
    ShapefileHeader,
};
use geo_types::Coord;
use std::io::{Cursor, Read};

/// Magic number at byte 0 of every shapefile.
const FILE_CODE: i32 = 9994;

/// Header is always exactly 100 bytes.
const HEADER_LEN: usize = 100;

/// Decode a .shp byte stream into a header and its geometry records.
///
/// `source` is a caller-supplied label (file name, URL) used in diagnostics.
///
/// Header-level corruption (short buffer, wrong magic, negative length) is a
/// terminal [`ShpError::CorruptHeader`]. Truncated trailing records and
/// unknown shape tags are tolerated; see the module docs.
///
/// # Example
/// ```
/// use shp2geojson::geometry::{decode, Shape};
///
/// let mut shp = Vec::new();
/// shp.extend_from_slice(&9994i32.to_be_bytes());
/// shp.extend_from_slice(&[0u8; 20]);
/// shp.extend_from_slice(&64i32.to_be_bytes()); // 64 words = 128 bytes
/// shp.extend_from_slice(&1000i32.to_le_bytes());
/// shp.extend_from_slice(&1i32.to_le_bytes());
/// shp.extend_from_slice(&[0u8; 64]);
/// // record #1: Point(3, 4)
/// shp.extend_from_slice(&1i32.to_be_bytes());
/// shp.extend_from_slice(&10i32.to_be_bytes()); // 10 words = 20 bytes
/// shp.extend_from_slice(&1i32.to_le_bytes());
/// shp.extend_from_slice(&3.0f64.to_le_bytes());
/// shp.extend_from_slice(&4.0f64.to_le_bytes());
///
/// let parsed = decode(&shp, "points.shp").unwrap();
/// assert_eq!(parsed.records.len(), 1);
/// assert_eq!(parsed.records[0].shape, Shape::Point { x: 3.0, y: 4.0 });
/// ```
pub fn decode(bytes: &[u8], source: &str) -> Result<ParsedShapefile> {
    let header = parse_header(bytes)?;

    let mut records = Vec::new();
    let mut pos = HEADER_LEN;
    let end = header.byte_length;

    while pos < end {
        // Record header: big-endian record number + content length in words.
        let Some(rec_header) = bytes.get(pos..pos + 8) else {
            tracing::warn!(
                source,
                offset = pos,
                "record header extends past buffer, stopping"
            );
            break;
        };
        let number = i32::from_be_bytes(rec_header[..4].try_into().expect("4-byte slice"));
        let length_words = i32::from_be_bytes(rec_header[4..].try_into().expect("4-byte slice"));
        if length_words < 0 {
            tracing::warn!(source, number, length_words, "negative content length");
            break;
        }
        pos += 8;

        let content_length = length_words as usize * 2;
        let Some(content) = bytes.get(pos..pos + content_length) else {
            tracing::warn!(
                source,
                number,
                content_length,
                remaining = bytes.len().saturating_sub(pos),
                "truncated record payload, keeping records parsed so far"
            );
            break;
        };

        match parse_shape(content) {
            Ok(shape) => records.push(GeometryRecord {
                number,
                content_length,
                shape,
            }),
            Err(ShpError::TruncatedRecord { .. }) => {
                tracing::warn!(source, number, "record payload shorter than declared");
                break;
            }
            Err(e) => return Err(e),
        }

        pos += content_length;
    }

    tracing::debug!(source, records = records.len(), "decoded shapefile");

    Ok(ParsedShapefile {
        source: source.to_string(),
        header,
        records,
    })
}

fn parse_header(bytes: &[u8]) -> Result<ShapefileHeader> {
    if bytes.len() < HEADER_LEN {
        return Err(ShpError::CorruptHeader(format!(
            "buffer is {} bytes, shapefile header needs {}",
            bytes.len(),
            HEADER_LEN
        )));
    }

    let file_code = i32::from_be_bytes(bytes[0..4].try_into().expect("4-byte slice"));
    if file_code != FILE_CODE {
        return Err(ShpError::CorruptHeader(format!(
            "file code {file_code}, expected {FILE_CODE}"
        )));
    }

    // Bytes 4..24 are unused. Byte 24: file length in 16-bit words, big-endian.
    let word_length = i32::from_be_bytes(bytes[24..28].try_into().expect("4-byte slice"));
    if word_length < (HEADER_LEN / 2) as i32 {
        return Err(ShpError::CorruptHeader(format!(
            "declared length {word_length} words is shorter than the header"
        )));
    }

    let version = i32::from_le_bytes(bytes[28..32].try_into().expect("4-byte slice"));
    let shape_type = i32::from_le_bytes(bytes[32..36].try_into().expect("4-byte slice"));

    let mut extents = [0f64; 8];
    for (i, v) in extents.iter_mut().enumerate() {
        let off = 36 + i * 8;
        *v = f64::from_le_bytes(bytes[off..off + 8].try_into().expect("8-byte slice"));
    }

    Ok(ShapefileHeader {
        file_code,
        byte_length: word_length as usize * 2,
        version,
        shape_type,
        bbox: BoundingBox {
            min_x: extents[0],
            min_y: extents[1],
            max_x: extents[2],
            max_y: extents[3],
            min_z: extents[4],
            max_z: extents[5],
            min_m: extents[6],
            max_m: extents[7],
        },
    })
}

/// Decode a single record payload.
///
/// Dispatch is on the little-endian tag at the start of the payload, not the
/// file-level declared type: mixed-type files are technically legal.
fn parse_shape(content: &[u8]) -> Result<Shape> {
    let mut cursor = Cursor::new(content);
    let type_tag = read_i32_le(&mut cursor)?;

    match type_tag {
        type_tags::NULL => Ok(Shape::Null),
        type_tags::POINT => {
            let x = read_f64_le(&mut cursor)?;
            let y = read_f64_le(&mut cursor)?;
            Ok(Shape::Point { x, y })
        }
        type_tags::POLYLINE => Ok(Shape::Polyline(parse_multi_part(&mut cursor)?)),
        type_tags::POLYGON => Ok(Shape::Polygon(parse_multi_part(&mut cursor)?)),
        type_tags::MULTIPOINT => Ok(Shape::MultiPoint(parse_point_set(&mut cursor)?)),
        other => {
            tracing::debug!(type_tag = other, "unsupported shape type, payload skipped");
            Ok(Shape::Unsupported { type_tag: other })
        }
    }
}

/// Polyline/polygon payload: bbox, part count, point count, part offsets,
/// then the flattened point array.
fn parse_multi_part(cursor: &mut Cursor<&[u8]>) -> Result<MultiPartGeometry> {
    let bbox = read_bbox(cursor)?;

    let part_count = read_count(cursor)?;
    let point_count = read_count(cursor)?;

    let mut parts = Vec::with_capacity(part_count);
    for _ in 0..part_count {
        let offset = read_i32_le(cursor)?;
        if offset < 0 {
            return Err(truncated(cursor));
        }
        parts.push(offset as u32);
    }

    let points = read_points(cursor, point_count)?;

    Ok(MultiPartGeometry {
        bbox,
        parts,
        points,
    })
}

/// MultiPoint payload: bbox, point count, points. Unlike polyline/polygon
/// there is no parts array.
fn parse_point_set(cursor: &mut Cursor<&[u8]>) -> Result<PointSet> {
    let bbox = read_bbox(cursor)?;
    let point_count = read_count(cursor)?;
    let points = read_points(cursor, point_count)?;
    Ok(PointSet { bbox, points })
}

fn read_bbox(cursor: &mut Cursor<&[u8]>) -> Result<[f64; 4]> {
    let mut bbox = [0f64; 4];
    for v in bbox.iter_mut() {
        *v = read_f64_le(cursor)?;
    }
    Ok(bbox)
}

fn read_count(cursor: &mut Cursor<&[u8]>) -> Result<usize> {
    let count = read_i32_le(cursor)?;
    if count < 0 {
        return Err(truncated(cursor));
    }
    Ok(count as usize)
}

fn read_points(cursor: &mut Cursor<&[u8]>, count: usize) -> Result<Vec<Coord<f64>>> {
    let mut points = Vec::with_capacity(count);
    for _ in 0..count {
        let x = read_f64_le(cursor)?;
        let y = read_f64_le(cursor)?;
        points.push(Coord { x, y });
    }
    Ok(points)
}

fn truncated(cursor: &Cursor<&[u8]>) -> ShpError {
    ShpError::TruncatedRecord {
        offset: cursor.position() as usize,
    }
}

fn read_i32_le(cursor: &mut Cursor<&[u8]>) -> Result<i32> {
    let mut buf = [0u8; 4];
    cursor
        .read_exact(&mut buf)
        .map_err(|_| truncated(cursor))?;
    Ok(i32::from_le_bytes(buf))
}

fn read_f64_le(cursor: &mut Cursor<&[u8]>) -> Result<f64> {
    let mut buf = [0u8; 8];
    cursor
        .read_exact(&mut buf)
        .map_err(|_| truncated(cursor))?;
    Ok(f64::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a header declaring `total_bytes` of file content.
    fn header_bytes(shape_type: i32, total_bytes: usize, bbox: [f64; 4]) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN);
        out.extend_from_slice(&FILE_CODE.to_be_bytes());
        out.extend_from_slice(&[0u8; 20]);
        out.extend_from_slice(&((total_bytes / 2) as i32).to_be_bytes());
        out.extend_from_slice(&1000i32.to_le_bytes());
        out.extend_from_slice(&shape_type.to_le_bytes());
        for v in bbox {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out.extend_from_slice(&[0u8; 32]); // z/m extents
        assert_eq!(out.len(), HEADER_LEN);
        out
    }

    fn point_record(number: i32, x: f64, y: f64) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&number.to_be_bytes());
        out.extend_from_slice(&10i32.to_be_bytes()); // 20 content bytes
        out.extend_from_slice(&type_tags::POINT.to_le_bytes());
        out.extend_from_slice(&x.to_le_bytes());
        out.extend_from_slice(&y.to_le_bytes());
        out
    }

    fn multi_part_record(number: i32, tag: i32, parts: &[i32], points: &[(f64, f64)]) -> Vec<u8> {
        let content_len = 4 + 32 + 8 + parts.len() * 4 + points.len() * 16;
        let mut out = Vec::new();
        out.extend_from_slice(&number.to_be_bytes());
        out.extend_from_slice(&((content_len / 2) as i32).to_be_bytes());
        out.extend_from_slice(&tag.to_le_bytes());
        for v in [0.0f64; 4] {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out.extend_from_slice(&(parts.len() as i32).to_le_bytes());
        out.extend_from_slice(&(points.len() as i32).to_le_bytes());
        for p in parts {
            out.extend_from_slice(&p.to_le_bytes());
        }
        for (x, y) in points {
            out.extend_from_slice(&x.to_le_bytes());
            out.extend_from_slice(&y.to_le_bytes());
        }
        out
    }

    #[test]
    fn test_header_round_trip() {
        let shp = header_bytes(type_tags::POINT, HEADER_LEN, [1.0, 2.0, 3.0, 4.0]);
        let parsed = decode(&shp, "empty.shp").unwrap();

        assert_eq!(parsed.header.file_code, FILE_CODE);
        assert_eq!(parsed.header.byte_length, HEADER_LEN);
        assert_eq!(parsed.header.shape_type, type_tags::POINT);
        assert_eq!(parsed.header.bbox.min_x, 1.0);
        assert_eq!(parsed.header.bbox.max_y, 4.0);
        assert!(parsed.records.is_empty());
    }

    #[test]
    fn test_short_buffer_is_corrupt_header() {
        let err = decode(&[0u8; 50], "short.shp").unwrap_err();
        assert!(matches!(err, ShpError::CorruptHeader(_)));
    }

    #[test]
    fn test_bad_file_code_is_corrupt_header() {
        let mut shp = header_bytes(type_tags::POINT, HEADER_LEN, [0.0; 4]);
        shp[0..4].copy_from_slice(&1234i32.to_be_bytes());
        let err = decode(&shp, "bad.shp").unwrap_err();
        assert!(matches!(err, ShpError::CorruptHeader(_)));
    }

    #[test]
    fn test_decode_point_records() {
        let rec1 = point_record(1, 10.0, 20.0);
        let rec2 = point_record(2, -5.5, 60.25);
        let total = HEADER_LEN + rec1.len() + rec2.len();
        let mut shp = header_bytes(type_tags::POINT, total, [-5.5, 20.0, 10.0, 60.25]);
        shp.extend_from_slice(&rec1);
        shp.extend_from_slice(&rec2);

        let parsed = decode(&shp, "points.shp").unwrap();
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.records[0].number, 1);
        assert_eq!(parsed.records[0].shape, Shape::Point { x: 10.0, y: 20.0 });
        assert_eq!(parsed.records[1].shape, Shape::Point { x: -5.5, y: 60.25 });
    }

    #[test]
    fn test_decode_polygon_parts_and_points() {
        let rec = multi_part_record(
            1,
            type_tags::POLYGON,
            &[0, 4],
            &[
                (0.0, 0.0),
                (1.0, 0.0),
                (1.0, 1.0),
                (0.0, 0.0),
                (5.0, 5.0),
                (6.0, 6.0),
            ],
        );
        let total = HEADER_LEN + rec.len();
        let mut shp = header_bytes(type_tags::POLYGON, total, [0.0, 0.0, 6.0, 6.0]);
        shp.extend_from_slice(&rec);

        let parsed = decode(&shp, "poly.shp").unwrap();
        assert_eq!(parsed.records.len(), 1);
        match &parsed.records[0].shape {
            Shape::Polygon(g) => {
                assert_eq!(g.parts, vec![0, 4]);
                assert_eq!(g.points.len(), 6);
                assert_eq!(g.points[4], Coord { x: 5.0, y: 5.0 });
            }
            other => panic!("expected Polygon, got {other:?}"),
        }
    }

    #[test]
    fn test_multipoint_has_no_parts_array() {
        // bbox + count + 2 points, official MultiPoint layout
        let content_len = 4 + 32 + 4 + 2 * 16;
        let mut rec = Vec::new();
        rec.extend_from_slice(&1i32.to_be_bytes());
        rec.extend_from_slice(&((content_len / 2) as i32).to_be_bytes());
        rec.extend_from_slice(&type_tags::MULTIPOINT.to_le_bytes());
        for v in [1.0f64, 2.0, 3.0, 4.0] {
            rec.extend_from_slice(&v.to_le_bytes());
        }
        rec.extend_from_slice(&2i32.to_le_bytes());
        for v in [1.0f64, 2.0, 3.0, 4.0] {
            rec.extend_from_slice(&v.to_le_bytes());
        }

        let total = HEADER_LEN + rec.len();
        let mut shp = header_bytes(type_tags::MULTIPOINT, total, [1.0, 2.0, 3.0, 4.0]);
        shp.extend_from_slice(&rec);

        let parsed = decode(&shp, "mp.shp").unwrap();
        match &parsed.records[0].shape {
            Shape::MultiPoint(s) => {
                assert_eq!(s.bbox, [1.0, 2.0, 3.0, 4.0]);
                assert_eq!(s.points, vec![Coord { x: 1.0, y: 2.0 }, Coord { x: 3.0, y: 4.0 }]);
            }
            other => panic!("expected MultiPoint, got {other:?}"),
        }
    }

    #[test]
    fn test_truncated_trailing_record_is_tolerated() {
        let rec = point_record(1, 10.0, 20.0);
        // Header declares room for a second record that is only garbage.
        let total = HEADER_LEN + rec.len() + 20;
        let mut shp = header_bytes(type_tags::POINT, total, [10.0, 20.0, 10.0, 20.0]);
        shp.extend_from_slice(&rec);
        shp.extend_from_slice(&[0xAB, 0xCD, 0xEF]); // 3 garbage bytes

        let parsed = decode(&shp, "truncated.shp").unwrap();
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.records[0].shape, Shape::Point { x: 10.0, y: 20.0 });
    }

    #[test]
    fn test_unsupported_tag_keeps_record() {
        let mut rec = Vec::new();
        rec.extend_from_slice(&1i32.to_be_bytes());
        rec.extend_from_slice(&2i32.to_be_bytes()); // 4 content bytes
        rec.extend_from_slice(&21i32.to_le_bytes()); // tag 21: not a shape type
        let rec2 = point_record(2, 1.0, 2.0);

        let total = HEADER_LEN + rec.len() + rec2.len();
        let mut shp = header_bytes(type_tags::POINT, total, [0.0; 4]);
        shp.extend_from_slice(&rec);
        shp.extend_from_slice(&rec2);

        let parsed = decode(&shp, "mixed.shp").unwrap();
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.records[0].shape, Shape::Unsupported { type_tag: 21 });
        assert_eq!(parsed.records[1].shape, Shape::Point { x: 1.0, y: 2.0 });
    }
}
