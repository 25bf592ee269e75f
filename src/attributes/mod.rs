//! dBase (.dbf) attribute table types and decoder.
//!
//! A .dbf file is a 32-byte binary header, a run of 32-byte field
//! descriptors terminated by 0x0D, then fixed-width text records. Numeric
//! header fields are read from the raw bytes; field names and record values
//! are read from a separately decoded text body, because multi-byte charsets
//! cannot be sliced at fixed byte offsets in the binary buffer. See
//! [`columns::TextCursor`] for the re-chunking scheme.

pub mod columns;
pub mod dbf_parser;

pub use dbf_parser::decode;

use crate::error::{Result, ShpError};
use encoding::label::encoding_from_whatwg_label;
use encoding::DecoderTrap;
use serde::Serialize;

/// Declared charset of the attribute text.
///
/// The variants carry the on-disk width charged to multi-byte characters
/// when re-chunking decoded text into fixed-width columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    Iso8859_1,
    Big5,
    /// Any other label; treated with the default multi-byte width.
    Other(String),
}

impl TextEncoding {
    /// Map a WHATWG-style label (case-insensitive) to an encoding.
    pub fn from_label(label: &str) -> Self {
        match label.to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => TextEncoding::Utf8,
            "iso-8859-1" | "latin1" | "latin-1" => TextEncoding::Iso8859_1,
            "big5" => TextEncoding::Big5,
            other => TextEncoding::Other(other.to_string()),
        }
    }

    /// On-disk byte width charged to a character whose UTF-8 representation
    /// exceeds one byte.
    pub fn multibyte_width(&self) -> usize {
        match self {
            TextEncoding::Iso8859_1 => 1,
            TextEncoding::Big5 => 2,
            TextEncoding::Utf8 | TextEncoding::Other(_) => 3,
        }
    }

    /// The WHATWG label for this encoding.
    pub fn label(&self) -> &str {
        match self {
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Iso8859_1 => "iso-8859-1",
            TextEncoding::Big5 => "big5",
            TextEncoding::Other(label) => label,
        }
    }
}

/// Decode raw .dbf bytes into the text body the attribute decoder expects.
///
/// Unknown labels are an [`ShpError::EncodingMismatch`]; undecodable byte
/// sequences are replaced, matching what a lenient text loader does.
pub fn decode_text(raw: &[u8], label: &str) -> Result<String> {
    let enc = encoding_from_whatwg_label(label)
        .ok_or_else(|| ShpError::EncodingMismatch(format!("unknown encoding label {label:?}")))?;
    enc.decode(raw, DecoderTrap::Replace)
        .map_err(|e| ShpError::EncodingMismatch(e.into_owned()))
}

/// The fixed 32-byte dBase header.
#[derive(Debug, Clone, PartialEq)]
pub struct DbfHeader {
    pub version: u8,
    /// Last-update year (1900 + on-disk byte).
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub record_count: u32,
    pub header_length: u16,
    pub record_length: u16,
    pub incomplete_transaction: u8,
    pub encryption_flag: u8,
    pub mdx_flag: u8,
    pub language_driver_id: u8,
}

/// dBase field type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Character,
    Numeric,
    Date,
    Logical,
    Other(u8),
}

impl FieldType {
    pub fn from_code(code: u8) -> Self {
        match code {
            b'C' => FieldType::Character,
            b'N' => FieldType::Numeric,
            b'D' => FieldType::Date,
            b'L' => FieldType::Logical,
            other => FieldType::Other(other),
        }
    }
}

/// One column of the attribute table. Order defines column order in every
/// record.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    /// Up to 10 characters, NUL padding stripped.
    pub name: String,
    pub field_type: FieldType,
    /// Field width in bytes within a record.
    pub length: u8,
}

/// A decoded attribute value.
///
/// Values stay strings unless they match the scientific-notation pattern the
/// table writer emits for floats (see [`dbf_parser`]).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Text(String),
    Number(f64),
}

/// One attribute row: field name → value, in column order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AttributeRecord {
    pub values: Vec<(String, AttributeValue)>,
}

impl AttributeRecord {
    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.values
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }
}

/// A fully decoded .dbf attribute table.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedAttributeTable {
    pub header: DbfHeader,
    pub fields: Vec<FieldDescriptor>,
    pub records: Vec<AttributeRecord>,
}
