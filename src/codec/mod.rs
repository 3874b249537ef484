//! Record codec
//!
//! Decoding and encoding of the flat YAFFS2 record stream: packed tags in the
//! spare area, fixed-layout object headers, the lazy record scanner, the
//! record writer used by save-as, and read-only extraction from an existing
//! image.

pub mod header;
pub mod scanner;
pub mod source;
pub mod tags;
pub mod writer;

pub use header::ObjectHeader;
pub use scanner::{DecodedRecord, RecordKind, RecordScanner};
pub use source::SourceImage;
pub use tags::PackedTags;
pub use writer::{ImageWriter, WrittenObject};

use crate::types::ImageGeometry;

#[inline]
pub(crate) fn read_le_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

#[inline]
pub(crate) fn write_le_u32(data: &mut [u8], offset: usize, value: u32) {
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// Decode a NUL-padded fixed-width string field.
///
/// Bytes that are not UTF-8 are an error rather than replaced, so a name
/// never changes between load and save.
pub(crate) fn trim_nul_padded(bytes: &[u8]) -> Result<String, std::str::Utf8Error> {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    std::str::from_utf8(&bytes[..end]).map(str::to_string)
}

/// Copy `value` into a NUL-padded field, always leaving room for the
/// terminator. Overlong values are cut at a char boundary.
pub(crate) fn copy_padded(field: &mut [u8], value: &str) {
    let mut len = value.len().min(field.len().saturating_sub(1));
    while !value.is_char_boundary(len) {
        len -= 1;
    }
    field[..len].copy_from_slice(&value.as_bytes()[..len]);
    field[len..].fill(0);
}

/// Build one on-disk record: page payload padded with 0xFF, followed by the
/// spare area carrying the packed tags.
pub fn encode_record(geometry: &ImageGeometry, tags: &PackedTags, payload: &[u8]) -> Vec<u8> {
    let page_size = geometry.page_size();
    let mut record = vec![0xFF_u8; geometry.record_size()];
    let len = payload.len().min(page_size);
    record[..len].copy_from_slice(&payload[..len]);
    tags.encode_into(&mut record[page_size..]);
    record
}
