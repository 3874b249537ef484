//! Image Writer
//!
//! Appends header and data records to a new image. The writer owns object id
//! allocation: the root always gets id 1, every other object the next free id.
//! Sequence numbers advance once per erase block.

use super::{encode_record, ObjectHeader, PackedTags};
use crate::error::ImageError;
use crate::types::{
    ImageGeometry, ObjectId, ObjectType, FIRST_FREE_OBJECT_ID, LOWEST_SEQUENCE_NUMBER,
    OBJECT_ID_ROOT,
};
use std::io::Write;

/// Identity of an object after it has been written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WrittenObject {
    pub object_id: ObjectId,
    pub header_position: u64,
}

pub struct ImageWriter<W: Write> {
    inner: W,
    geometry: ImageGeometry,
    position: u64,
    records_written: usize,
    next_object_id: ObjectId,
}

impl<W: Write> ImageWriter<W> {
    pub fn new(inner: W, geometry: ImageGeometry) -> Self {
        Self {
            inner,
            geometry,
            position: 0,
            records_written: 0,
            next_object_id: FIRST_FREE_OBJECT_ID,
        }
    }

    /// Bytes written so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Write the root directory header under the reserved root id.
    pub fn add_root(&mut self, header: &ObjectHeader) -> Result<WrittenObject, ImageError> {
        let mut header = header.clone();
        header.object_type = ObjectType::Directory;
        header.parent_id = OBJECT_ID_ROOT;
        header.name.clear();
        let header_position = self.write_header(OBJECT_ID_ROOT, &header)?;
        Ok(WrittenObject {
            object_id: OBJECT_ID_ROOT,
            header_position,
        })
    }

    /// Write a header-only object (directory, symlink, hardlink, special).
    pub fn add_object(&mut self, header: &ObjectHeader) -> Result<WrittenObject, ImageError> {
        if header.object_type == ObjectType::File {
            return self.add_file(header, &[]);
        }
        let object_id = self.allocate_id();
        let header_position = self.write_header(object_id, header)?;
        Ok(WrittenObject {
            object_id,
            header_position,
        })
    }

    /// Write a file header followed by its data chunks.
    pub fn add_file(&mut self, header: &ObjectHeader, data: &[u8]) -> Result<WrittenObject, ImageError> {
        let mut header = header.clone();
        header.object_type = ObjectType::File;
        header.file_size = data.len() as u64;

        let object_id = self.allocate_id();
        let header_position = self.write_header(object_id, &header)?;

        for (i, chunk) in data.chunks(self.geometry.page_size()).enumerate() {
            let tags = PackedTags::data_chunk(
                self.sequence_number(),
                object_id,
                (i + 1) as u32,
                chunk.len() as u32,
            );
            self.write_record(&tags, chunk)?;
        }

        Ok(WrittenObject {
            object_id,
            header_position,
        })
    }

    /// Flush and hand back the underlying writer.
    pub fn finish(mut self) -> Result<W, ImageError> {
        self.inner.flush()?;
        Ok(self.inner)
    }

    fn allocate_id(&mut self) -> ObjectId {
        let id = self.next_object_id;
        self.next_object_id += 1;
        id
    }

    fn sequence_number(&self) -> u32 {
        LOWEST_SEQUENCE_NUMBER + (self.records_written / self.geometry.pages_per_block()) as u32
    }

    fn write_header(&mut self, object_id: ObjectId, header: &ObjectHeader) -> Result<u64, ImageError> {
        let tags = PackedTags::header(
            self.sequence_number(),
            object_id,
            header.object_type,
            header.parent_id,
            header.tag_extra(),
        );
        let page = header.encode(self.geometry.page_size());
        let position = self.position;
        self.write_record(&tags, &page)?;
        Ok(position)
    }

    fn write_record(&mut self, tags: &PackedTags, payload: &[u8]) -> Result<(), ImageError> {
        let record = encode_record(&self.geometry, tags, payload);
        self.inner.write_all(&record)?;
        self.position += record.len() as u64;
        self.records_written += 1;
        Ok(())
    }
}
