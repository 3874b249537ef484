//! Read-only extraction of file contents from an existing image.
//!
//! Chunks of one object can sit anywhere in the image, so the first
//! extraction scans the image once and keeps a chunk location index. Every
//! extraction opens the image afresh and drops the handle before returning.

use super::scanner::{RecordKind, RecordScanner};
use super::{ObjectHeader, PackedTags};
use crate::error::ImageError;
use crate::types::{ImageGeometry, ObjectId, ObjectType};
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Copy)]
struct ChunkLocation {
    index: u32,
    seq_number: u32,
    position: u64,
    len: u32,
}

/// An image opened for file extraction.
pub struct SourceImage {
    path: PathBuf,
    geometry: ImageGeometry,
    chunks: Option<HashMap<ObjectId, Vec<ChunkLocation>>>,
}

impl SourceImage {
    pub fn new(path: impl Into<PathBuf>, geometry: ImageGeometry) -> Self {
        Self {
            path: path.into(),
            geometry,
            chunks: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the header page at `header_position`.
    pub fn read_header(&self, header_position: u64) -> Result<(ObjectId, ObjectHeader), ImageError> {
        let mut file = File::open(&self.path).map_err(|e| ImageError::io(&self.path, e))?;
        let mut record = vec![0_u8; self.geometry.record_size()];
        file.seek(SeekFrom::Start(header_position))
            .and_then(|_| file.read_exact(&mut record))
            .map_err(|e| ImageError::io(&self.path, e))?;

        let page_size = self.geometry.page_size();
        let tags = PackedTags::decode(&record[page_size..]);
        if tags.is_unused() || !tags.is_header() {
            return Err(ImageError::corrupt(
                header_position,
                "record is not an object header",
            ));
        }
        let header = ObjectHeader::decode(&record[..page_size], header_position)?;
        Ok((tags.object_id(), header))
    }

    /// Extract the complete contents of the file whose header sits at
    /// `header_position`.
    pub fn extract_file(&mut self, header_position: u64) -> Result<Vec<u8>, ImageError> {
        let (object_id, header) = self.read_header(header_position)?;
        if header.object_type != ObjectType::File {
            return Err(ImageError::Reference(format!(
                "object {} at offset {} is not a file",
                object_id, header_position
            )));
        }

        let size = usize::try_from(header.file_size).map_err(|_| {
            ImageError::corrupt(header_position, format!("file size {} too large", header.file_size))
        })?;
        if size == 0 {
            return Ok(Vec::new());
        }

        let page_size = self.geometry.page_size();
        let chunk_count = size.div_ceil(page_size);
        let latest = self.latest_chunks(object_id)?;

        let mut file = File::open(&self.path).map_err(|e| ImageError::io(&self.path, e))?;
        let mut data = Vec::with_capacity(size);
        for index in 1..=chunk_count as u32 {
            let location = latest.get(&index).ok_or_else(|| {
                ImageError::Reference(format!(
                    "object {} is missing data chunk {}",
                    object_id, index
                ))
            })?;
            let mut buf = vec![0_u8; location.len as usize];
            file.seek(SeekFrom::Start(location.position))
                .and_then(|_| file.read_exact(&mut buf))
                .map_err(|e| ImageError::io(&self.path, e))?;
            data.extend_from_slice(&buf);
        }

        if data.len() < size {
            return Err(ImageError::Reference(format!(
                "object {} has {} data bytes, header says {}",
                object_id,
                data.len(),
                size
            )));
        }
        data.truncate(size);
        debug!(object_id, bytes = size, "Extracted file from image");
        Ok(data)
    }

    /// Newest copy of every chunk of `object_id`, keyed by chunk index.
    fn latest_chunks(&mut self, object_id: ObjectId) -> Result<HashMap<u32, ChunkLocation>, ImageError> {
        if self.chunks.is_none() {
            self.chunks = Some(self.build_index()?);
        }
        let mut latest: HashMap<u32, ChunkLocation> = HashMap::new();
        let locations = self
            .chunks
            .as_ref()
            .and_then(|index| index.get(&object_id))
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        for location in locations {
            match latest.get(&location.index) {
                Some(existing) if existing.seq_number > location.seq_number => {}
                _ => {
                    latest.insert(location.index, *location);
                }
            }
        }
        Ok(latest)
    }

    fn build_index(&self) -> Result<HashMap<ObjectId, Vec<ChunkLocation>>, ImageError> {
        let mut index: HashMap<ObjectId, Vec<ChunkLocation>> = HashMap::new();
        for record in RecordScanner::open(&self.path, self.geometry)? {
            let record = record?;
            if let RecordKind::Chunk { index: chunk, len } = record.kind {
                index.entry(record.object_id).or_default().push(ChunkLocation {
                    index: chunk,
                    seq_number: record.seq_number,
                    position: record.position,
                    len,
                });
            }
        }
        debug!(path = %self.path.display(), objects = index.len(), "Indexed image chunks");
        Ok(index)
    }
}
