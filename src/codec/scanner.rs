//! Record Scanner
//!
//! Lazily walks an image record by record and yields header/chunk events.
//! The sequence is finite and not restartable. A trailing partial record is
//! not an error: it ends the stream and is reported via `truncated_tail()`.

use super::tags::PackedTags;
use crate::error::ImageError;
use crate::types::{ImageGeometry, ObjectId};
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;
use tracing::{debug, warn};

/// What a record carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// Object header page; decode the payload with `ObjectHeader::decode`.
    Header,
    /// Data chunk `index` (1-based) with `len` valid payload bytes.
    Chunk { index: u32, len: u32 },
}

/// One decoded record.
#[derive(Debug, Clone)]
pub struct DecodedRecord {
    pub kind: RecordKind,
    pub object_id: ObjectId,
    /// Byte offset of the record's page in the image.
    pub position: u64,
    pub seq_number: u32,
    /// Page bytes; for chunks truncated to the valid length.
    pub payload: Vec<u8>,
}

/// Lazy record stream over any reader.
pub struct RecordScanner<R> {
    reader: R,
    geometry: ImageGeometry,
    position: u64,
    truncated_tail: bool,
    finished: bool,
}

impl RecordScanner<BufReader<File>> {
    /// Open an image file for scanning.
    pub fn open(path: &Path, geometry: ImageGeometry) -> Result<Self, ImageError> {
        let file = File::open(path).map_err(|e| ImageError::io(path, e))?;
        debug!(path = %path.display(), "Opened image for scanning");
        Ok(Self::from_reader(BufReader::new(file), geometry))
    }
}

impl<R: Read> RecordScanner<R> {
    pub fn from_reader(reader: R, geometry: ImageGeometry) -> Self {
        Self {
            reader,
            geometry,
            position: 0,
            truncated_tail: false,
            finished: false,
        }
    }

    /// True once the stream ended on a partial record.
    pub fn truncated_tail(&self) -> bool {
        self.truncated_tail
    }

    /// Fill `buf` as far as possible; returns the number of bytes read.
    fn read_record(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }
}

impl<R: Read> Iterator for RecordScanner<R> {
    type Item = Result<DecodedRecord, ImageError>;

    fn next(&mut self) -> Option<Self::Item> {
        let page_size = self.geometry.page_size();
        let mut buf = vec![0_u8; self.geometry.record_size()];

        while !self.finished {
            let filled = match self.read_record(&mut buf) {
                Ok(n) => n,
                Err(e) => {
                    self.finished = true;
                    return Some(Err(ImageError::Stream(e)));
                }
            };

            if filled == 0 {
                self.finished = true;
                break;
            }
            if filled < buf.len() {
                warn!(
                    offset = self.position,
                    bytes = filled,
                    "Incomplete record at end of image"
                );
                self.truncated_tail = true;
                self.finished = true;
                break;
            }

            let position = self.position;
            self.position += buf.len() as u64;

            let tags = PackedTags::decode(&buf[page_size..]);
            if tags.is_unused() {
                continue;
            }

            let (kind, payload) = if tags.is_header() {
                (RecordKind::Header, buf[..page_size].to_vec())
            } else {
                let len = (tags.n_bytes as usize).min(page_size);
                (
                    RecordKind::Chunk {
                        index: tags.chunk_index(),
                        len: len as u32,
                    },
                    buf[..len].to_vec(),
                )
            };

            return Some(Ok(DecodedRecord {
                kind,
                object_id: tags.object_id(),
                position,
                seq_number: tags.seq_number,
                payload,
            }));
        }
        None
    }
}
