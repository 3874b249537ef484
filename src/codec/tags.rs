//! Packed tags stored at the start of every record's spare area.

use super::{read_le_u32, write_le_u32};
use crate::types::{ObjectId, ObjectType};

/// Header chunk carries object type/parent/size in the tags.
pub const EXTRA_HEADER_INFO_FLAG: u32 = 0x8000_0000;
pub const EXTRA_SHRINK_FLAG: u32 = 0x4000_0000;
pub const EXTRA_SHADOWS_FLAG: u32 = 0x2000_0000;
pub const ALL_EXTRA_FLAGS: u32 = 0xF000_0000;
pub const EXTRA_OBJECT_TYPE_SHIFT: u32 = 28;
pub const OBJECT_ID_MASK: u32 = 0x0FFF_FFFF;

/// Raw tags as they appear on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedTags {
    pub seq_number: u32,
    pub obj_id: u32,
    pub chunk_id: u32,
    pub n_bytes: u32,
}

impl PackedTags {
    /// Tags for data chunk `chunk_id` (1-based) of `object_id`.
    pub fn data_chunk(seq_number: u32, object_id: ObjectId, chunk_id: u32, n_bytes: u32) -> Self {
        Self {
            seq_number,
            obj_id: object_id,
            chunk_id,
            n_bytes,
        }
    }

    /// Tags for a header chunk, with the extra header info filled in.
    pub fn header(
        seq_number: u32,
        object_id: ObjectId,
        object_type: ObjectType,
        parent_id: ObjectId,
        extra: u32,
    ) -> Self {
        Self {
            seq_number,
            obj_id: (object_id & OBJECT_ID_MASK) | (object_type.code() << EXTRA_OBJECT_TYPE_SHIFT),
            chunk_id: EXTRA_HEADER_INFO_FLAG | (parent_id & OBJECT_ID_MASK),
            n_bytes: extra,
        }
    }

    pub fn decode(spare: &[u8]) -> Self {
        Self {
            seq_number: read_le_u32(spare, 0),
            obj_id: read_le_u32(spare, 4),
            chunk_id: read_le_u32(spare, 8),
            n_bytes: read_le_u32(spare, 12),
        }
    }

    /// Write the tags into the head of `spare`; the rest is left as is.
    pub fn encode_into(&self, spare: &mut [u8]) {
        write_le_u32(spare, 0, self.seq_number);
        write_le_u32(spare, 4, self.obj_id);
        write_le_u32(spare, 8, self.chunk_id);
        write_le_u32(spare, 12, self.n_bytes);
    }

    /// Erased pages read back as all ones; id 0 is never used.
    pub fn is_unused(&self) -> bool {
        let erased = self.seq_number == u32::MAX
            && self.obj_id == u32::MAX
            && self.chunk_id == u32::MAX
            && self.n_bytes == u32::MAX;
        erased || self.object_id() == 0
    }

    pub fn has_extra_header_info(&self) -> bool {
        self.chunk_id & EXTRA_HEADER_INFO_FLAG != 0
    }

    pub fn is_header(&self) -> bool {
        self.chunk_id == 0 || self.has_extra_header_info()
    }

    pub fn object_id(&self) -> ObjectId {
        if self.has_extra_header_info() {
            self.obj_id & OBJECT_ID_MASK
        } else {
            self.obj_id
        }
    }

    /// Data chunk index, meaningful only for non-header records.
    pub fn chunk_index(&self) -> u32 {
        self.chunk_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_tags_mask_type_out_of_object_id() {
        let tags = PackedTags::header(0x1000, 300, ObjectType::Directory, 1, 0);
        assert!(tags.is_header());
        assert_eq!(tags.object_id(), 300);
        assert_eq!(tags.obj_id >> EXTRA_OBJECT_TYPE_SHIFT, 3);
        assert_eq!(tags.chunk_id & OBJECT_ID_MASK, 1);
    }

    #[test]
    fn test_plain_header_and_data_tags() {
        let plain = PackedTags::data_chunk(0x1000, 42, 0, 0);
        assert!(plain.is_header());
        assert_eq!(plain.object_id(), 42);

        let data = PackedTags::data_chunk(0x1000, 42, 3, 100);
        assert!(!data.is_header());
        assert_eq!(data.chunk_index(), 3);
    }

    #[test]
    fn test_erased_page_is_unused() {
        let spare = [0xFF_u8; 16];
        assert!(PackedTags::decode(&spare).is_unused());
        assert!(PackedTags::data_chunk(0x1000, 0, 1, 10).is_unused());
    }
}
