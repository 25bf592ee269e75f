//! Error types for shapefile decoding, attribute parsing and reprojection.

use thiserror::Error;

/// Errors surfaced by the decoders, the reprojector and the assembler.
///
/// Tolerant conditions (a truncated trailing record, an unknown shape tag)
/// are recovered locally by the decoders and never reach the caller; the
/// variants here are terminal for the conversion they occur in.
#[derive(Debug, Error)]
pub enum ShpError {
    /// Header fields are inconsistent or out of range.
    #[error("corrupt header: {0}")]
    CorruptHeader(String),

    /// A record payload could not be read in full.
    ///
    /// Decoders handle this internally by returning the records parsed so
    /// far; the variant exists for callers that parse single records.
    #[error("truncated record at byte offset {offset}")]
    TruncatedRecord { offset: usize },

    /// A record carried a shape-type tag this crate does not decode.
    #[error("unsupported shape type tag {0}")]
    UnsupportedShapeType(i32),

    /// Reprojection was given a non-finite coordinate.
    #[error("invalid coordinate ({x}, {y})")]
    InvalidCoordinate { x: f64, y: f64 },

    /// The declared text encoding cannot be aligned with the binary field
    /// layout, or the encoding label is unknown.
    #[error("encoding mismatch: {0}")]
    EncodingMismatch(String),

    /// The CRS is not present in the registry.
    #[error("unknown CRS: {0}")]
    UnknownCrs(String),
}

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ShpError>;
