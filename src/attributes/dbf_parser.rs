//! Binary decoder for the .dbf attribute table.
//!
//! Numbers come from the raw little-endian bytes; names and values come from
//! the decoded text body, split into fixed-width columns by a
//! [`TextCursor`]. The two views walk the file in lockstep because one
//! visual column always corresponds to one on-disk byte.

use crate::attributes::columns::TextCursor;
use crate::attributes::{
    AttributeRecord, AttributeValue, DbfHeader, FieldDescriptor, FieldType, ParsedAttributeTable,
    TextEncoding,
};
use crate::error::{Result, ShpError};
use regex::Regex;
use std::sync::OnceLock;

/// Size of the fixed header and of each field descriptor block.
const BLOCK_LEN: usize = 32;

/// Marks the end of the field descriptor area.
const DESCRIPTOR_TERMINATOR: u8 = 0x0D;

/// Float values are stored as text in a fixed scientific form: one integer
/// digit, 11 fractional digits, a signed 3-digit exponent.
fn scientific_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d\.\d{11}e[+-]\d{3}$").expect("valid regex"))
}

/// Decode a .dbf byte stream plus its decoded text body into an attribute
/// table.
///
/// `text_body` must be the same bytes decoded with the charset named by
/// `encoding`; the caller usually obtains it via
/// [`crate::attributes::decode_text`].
///
/// Header-level corruption is a terminal [`ShpError::CorruptHeader`]. A
/// descriptor block or record row that cannot be read in full stops parsing
/// at that point and keeps what was already decoded, mirroring the geometry
/// decoder's truncation policy.
pub fn decode(
    raw: &[u8],
    text_body: &str,
    encoding: TextEncoding,
) -> Result<ParsedAttributeTable> {
    let header = parse_header(raw)?;

    let (mut fields, terminator_found) = parse_descriptor_blocks(raw);

    let mut cursor = TextCursor::new(text_body);
    // The decoded text starts with the 32 header bytes.
    cursor.consume_columns(&encoding, BLOCK_LEN);

    for field in fields.iter_mut() {
        // First 10 columns of each descriptor block are the name; the
        // remaining 22 hold the binary metadata already read from `raw`.
        let name = cursor.consume_columns(&encoding, 10);
        field.name = clean_value(name);
        cursor.consume_columns(&encoding, BLOCK_LEN - 10);
    }

    if terminator_found {
        let terminator = cursor.consume_columns(&encoding, 1);
        if terminator != "\r" {
            return Err(ShpError::EncodingMismatch(format!(
                "expected descriptor terminator after {} field blocks, found {:?}",
                fields.len(),
                terminator
            )));
        }
    }

    // Some writers pad the header area beyond the terminator.
    let consumed = BLOCK_LEN + fields.len() * BLOCK_LEN + usize::from(terminator_found);
    if (header.header_length as usize) > consumed {
        cursor.consume_columns(&encoding, header.header_length as usize - consumed);
    }

    let records = parse_records(&mut cursor, &encoding, &header, &fields);

    tracing::debug!(
        fields = fields.len(),
        records = records.len(),
        declared = header.record_count,
        "decoded attribute table"
    );

    Ok(ParsedAttributeTable {
        header,
        fields,
        records,
    })
}

fn parse_header(raw: &[u8]) -> Result<DbfHeader> {
    if raw.len() < BLOCK_LEN {
        return Err(ShpError::CorruptHeader(format!(
            "buffer is {} bytes, dBase header needs {}",
            raw.len(),
            BLOCK_LEN
        )));
    }

    let record_count = i32::from_le_bytes(raw[4..8].try_into().expect("4-byte slice"));
    if record_count < 0 {
        return Err(ShpError::CorruptHeader(format!(
            "negative record count {record_count}"
        )));
    }

    let header_length = i16::from_le_bytes(raw[8..10].try_into().expect("2-byte slice"));
    let record_length = i16::from_le_bytes(raw[10..12].try_into().expect("2-byte slice"));
    if header_length < 0 || record_length < 0 || (record_count > 0 && record_length == 0) {
        return Err(ShpError::CorruptHeader(format!(
            "implausible layout: header length {header_length}, record length {record_length}, \
             record count {record_count}"
        )));
    }

    Ok(DbfHeader {
        version: raw[0],
        year: 1900 + raw[1] as u16,
        month: raw[2],
        day: raw[3],
        record_count: record_count as u32,
        header_length: header_length as u16,
        record_length: record_length as u16,
        incomplete_transaction: raw[14],
        encryption_flag: raw[15],
        mdx_flag: raw[28],
        language_driver_id: raw[29],
    })
}

/// Read the binary halves of the descriptor blocks (type code and field
/// length); names are filled in from the text body afterwards.
///
/// Returns the descriptors plus whether the 0x0D terminator was seen. A
/// block that cannot be read in full ends descriptor parsing with whatever
/// was read so far.
fn parse_descriptor_blocks(raw: &[u8]) -> (Vec<FieldDescriptor>, bool) {
    let mut fields = Vec::new();
    let mut offset = BLOCK_LEN;

    loop {
        match raw.get(offset) {
            None => {
                tracing::warn!(offset, "descriptor area ran past buffer end");
                return (fields, false);
            }
            Some(&DESCRIPTOR_TERMINATOR) => return (fields, true),
            Some(_) => {}
        }

        let Some(block) = raw.get(offset..offset + BLOCK_LEN) else {
            tracing::warn!(
                offset,
                read = fields.len(),
                "truncated field descriptor block, keeping descriptors read so far"
            );
            return (fields, false);
        };

        fields.push(FieldDescriptor {
            name: String::new(),
            field_type: FieldType::from_code(block[11]),
            length: block[16],
        });
        offset += BLOCK_LEN;
    }
}

fn parse_records(
    cursor: &mut TextCursor<'_>,
    encoding: &TextEncoding,
    header: &DbfHeader,
    fields: &[FieldDescriptor],
) -> Vec<AttributeRecord> {
    let mut records = Vec::with_capacity(header.record_count as usize);

    for row in 0..header.record_count {
        if cursor.is_empty() {
            tracing::warn!(
                row,
                declared = header.record_count,
                "attribute text exhausted before declared record count"
            );
            break;
        }

        // Deletion flag byte.
        cursor.consume_columns(encoding, 1);

        let mut values = Vec::with_capacity(fields.len());
        for field in fields {
            let raw_value = cursor.consume_columns(encoding, field.length as usize);
            values.push((field.name.clone(), coerce_value(raw_value)));
        }
        records.push(AttributeRecord { values });
    }

    records
}

/// Strip embedded NULs and surrounding whitespace.
fn clean_value(raw: &str) -> String {
    raw.replace('\0', "").trim().to_string()
}

fn coerce_value(raw: &str) -> AttributeValue {
    let cleaned = clean_value(raw);
    if scientific_pattern().is_match(&cleaned) {
        if let Ok(number) = cleaned.parse::<f64>() {
            return AttributeValue::Number(number);
        }
    }
    AttributeValue::Text(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a .dbf byte buffer with the given fields and fixed-width rows.
    /// Returns the raw bytes; tests decode the text body from them.
    fn dbf_bytes(fields: &[(&str, u8, u8)], rows: &[&str]) -> Vec<u8> {
        let header_length = (BLOCK_LEN + fields.len() * BLOCK_LEN + 1) as i16;
        let record_length: i16 =
            1 + fields.iter().map(|(_, _, len)| *len as i16).sum::<i16>();

        let mut out = Vec::new();
        out.push(0x03); // dBase III
        out.extend_from_slice(&[124, 5, 17]); // 2024-05-17
        out.extend_from_slice(&(rows.len() as i32).to_le_bytes());
        out.extend_from_slice(&header_length.to_le_bytes());
        out.extend_from_slice(&record_length.to_le_bytes());
        out.extend_from_slice(&[0u8; 20]);
        assert_eq!(out.len(), BLOCK_LEN);

        for (name, type_code, length) in fields {
            let mut block = [0u8; BLOCK_LEN];
            block[..name.len()].copy_from_slice(name.as_bytes());
            block[11] = *type_code;
            block[16] = *length;
            out.extend_from_slice(&block);
        }
        out.push(DESCRIPTOR_TERMINATOR);

        for row in rows {
            out.push(b' '); // deletion flag: live record
            out.extend_from_slice(row.as_bytes());
        }
        out
    }

    fn decode_ascii(raw: &[u8]) -> ParsedAttributeTable {
        let text: String = raw.iter().map(|&b| b as char).collect();
        decode(raw, &text, TextEncoding::Utf8).unwrap()
    }

    #[test]
    fn test_header_fields() {
        let raw = dbf_bytes(&[("NAME", b'C', 6)], &["Berlin"]);
        let table = decode_ascii(&raw);

        assert_eq!(table.header.version, 0x03);
        assert_eq!(table.header.year, 2024);
        assert_eq!(table.header.month, 5);
        assert_eq!(table.header.day, 17);
        assert_eq!(table.header.record_count, 1);
        assert_eq!(table.header.record_length, 7);
    }

    #[test]
    fn test_field_descriptors_and_values() {
        let raw = dbf_bytes(
            &[("NAME", b'C', 6), ("KIND", b'C', 4)],
            &["Berlincity", "Paris town"],
        );
        let table = decode_ascii(&raw);

        assert_eq!(table.fields.len(), 2);
        assert_eq!(table.fields[0].name, "NAME");
        assert_eq!(table.fields[0].field_type, FieldType::Character);
        assert_eq!(table.fields[0].length, 6);
        assert_eq!(table.fields[1].name, "KIND");

        assert_eq!(table.records.len(), 2);
        assert_eq!(
            table.records[0].get("NAME"),
            Some(&AttributeValue::Text("Berlin".to_string()))
        );
        assert_eq!(
            table.records[1].get("NAME"),
            Some(&AttributeValue::Text("Paris".to_string()))
        );
        assert_eq!(
            table.records[1].get("KIND"),
            Some(&AttributeValue::Text("town".to_string()))
        );
    }

    #[test]
    fn test_zero_records_is_not_an_error() {
        let raw = dbf_bytes(&[("NAME", b'C', 6)], &[]);
        let table = decode_ascii(&raw);
        assert_eq!(table.header.record_count, 0);
        assert!(table.records.is_empty());
    }

    #[test]
    fn test_negative_record_count_is_corrupt() {
        let mut raw = dbf_bytes(&[("NAME", b'C', 6)], &[]);
        raw[4..8].copy_from_slice(&(-5i32).to_le_bytes());
        let text: String = raw.iter().map(|&b| b as char).collect();
        let err = decode(&raw, &text, TextEncoding::Utf8).unwrap_err();
        assert!(matches!(err, ShpError::CorruptHeader(_)));
    }

    #[test]
    fn test_scientific_notation_becomes_number() {
        let raw = dbf_bytes(&[("AREA", b'N', 20)], &["1.23456789012e+003  "]);
        let table = decode_ascii(&raw);
        match table.records[0].get("AREA") {
            Some(AttributeValue::Number(n)) => assert!((n - 1234.56789012).abs() < 1e-6),
            other => panic!("expected number, got {other:?}"),
        }
    }

    #[test]
    fn test_plain_numeric_text_stays_text() {
        // Only the exact scientific form is coerced.
        let raw = dbf_bytes(&[("AREA", b'N', 8)], &["  123.45"]);
        let table = decode_ascii(&raw);
        assert_eq!(
            table.records[0].get("AREA"),
            Some(&AttributeValue::Text("123.45".to_string()))
        );
    }

    #[test]
    fn test_truncated_descriptor_area_keeps_prefix() {
        let mut raw = dbf_bytes(&[("NAME", b'C', 6), ("KIND", b'C', 4)], &[]);
        // Cut the buffer in the middle of the second descriptor block.
        raw.truncate(BLOCK_LEN + BLOCK_LEN + 10);
        let text: String = raw.iter().map(|&b| b as char).collect();
        let table = decode(&raw, &text, TextEncoding::Utf8).unwrap();
        assert_eq!(table.fields.len(), 1);
        assert_eq!(table.fields[0].name, "NAME");
    }

    #[test]
    fn test_text_exhaustion_stops_rows_early() {
        let mut raw = dbf_bytes(&[("NAME", b'C', 6)], &["Berlin"]);
        // Claim three records while only one row of text exists.
        raw[4..8].copy_from_slice(&3i32.to_le_bytes());
        let text: String = raw.iter().map(|&b| b as char).collect();
        let table = decode(&raw, &text, TextEncoding::Utf8).unwrap();
        assert_eq!(table.records.len(), 1);
    }

    #[test]
    fn test_multibyte_names_and_values() {
        // Hand-built table with a Big5-style 2-byte-wide name and value.
        // '市' is charged 2 columns, so "台北市" spends 6 of the 10-column
        // name budget.
        let fields = [("NAME", b'C', 8u8)];
        let raw = dbf_bytes(&fields, &["12345678"]);

        // Recreate the decoded text with multi-byte content in the name and
        // value positions. Header portion first.
        let mut text: String = raw[..BLOCK_LEN].iter().map(|&b| b as char).collect();
        text.push_str("台北市名"); // 8 columns under Big5
        text.push_str("  "); // pad name to 10 columns
        text.push_str(&" ".repeat(22)); // rest of descriptor block
        text.push('\r');
        text.push(' '); // deletion flag
        text.push_str("台北1234"); // 8 columns: 2+2+4

        let table = decode(&raw, &text, TextEncoding::Big5).unwrap();
        assert_eq!(table.fields[0].name, "台北市名");
        assert_eq!(
            table.records[0].get("台北市名"),
            Some(&AttributeValue::Text("台北1234".to_string()))
        );
    }

    #[test]
    fn test_terminator_misalignment_is_encoding_mismatch() {
        let raw = dbf_bytes(&[("NAME", b'C', 6)], &["Berlin"]);
        // Pretend the text was decoded with a charset that shifts columns:
        // inject an extra char into the descriptor area.
        let mut text: String = raw.iter().map(|&b| b as char).collect();
        text.insert(40, 'X');
        let err = decode(&raw, &text, TextEncoding::Utf8).unwrap_err();
        assert!(matches!(err, ShpError::EncodingMismatch(_)));
    }
}
