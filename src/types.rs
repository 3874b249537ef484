//! Core types for the YAFFS2 image editor.

use crate::error::ImageError;
use serde::{Deserialize, Serialize};

/// ObjectId: identifier of one object inside an image. Unique per loaded image,
/// reassigned on save.
pub type ObjectId = u32;

/// Reserved id of the root directory.
pub const OBJECT_ID_ROOT: ObjectId = 1;
pub const OBJECT_ID_LOST_N_FOUND: ObjectId = 2;
pub const OBJECT_ID_UNLINKED: ObjectId = 3;
pub const OBJECT_ID_DELETED: ObjectId = 4;

/// First id handed out to regular objects by the writer.
pub const FIRST_FREE_OBJECT_ID: ObjectId = 257;

/// Sequence number of the first block written.
pub const LOWEST_SEQUENCE_NUMBER: u32 = 0x0000_1000;

pub const MAX_NAME_LENGTH: usize = 255;
pub const MAX_ALIAS_LENGTH: usize = 159;

/// Size of the fixed object header at the start of a header page.
pub const OBJECT_HEADER_SIZE: usize = 512;

/// Size of the packed tags at the start of the spare area.
pub const PACKED_TAGS_SIZE: usize = 16;

// File type bits carried in `mode` alongside the permission bits.
pub const S_IFMT: u32 = 0o170_000;
pub const S_IFREG: u32 = 0o100_000;
pub const S_IFDIR: u32 = 0o040_000;
pub const S_IFLNK: u32 = 0o120_000;
pub const PERMISSION_MASK: u32 = 0o7777;

/// Object type code stored in the first word of every header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectType {
    Unknown = 0,
    File = 1,
    SymLink = 2,
    Directory = 3,
    HardLink = 4,
    Special = 5,
}

impl ObjectType {
    /// Map a raw type code; `None` when the code is out of range.
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(ObjectType::Unknown),
            1 => Some(ObjectType::File),
            2 => Some(ObjectType::SymLink),
            3 => Some(ObjectType::Directory),
            4 => Some(ObjectType::HardLink),
            5 => Some(ObjectType::Special),
            _ => None,
        }
    }

    pub fn code(self) -> u32 {
        self as u32
    }
}

/// Page/spare/block layout of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageGeometry {
    page_size: usize,
    spare_size: usize,
    pages_per_block: usize,
}

impl ImageGeometry {
    /// Validated geometry: pages must hold a full object header, spares the
    /// packed tags.
    pub fn new(
        page_size: usize,
        spare_size: usize,
        pages_per_block: usize,
    ) -> Result<Self, ImageError> {
        if page_size < OBJECT_HEADER_SIZE {
            return Err(ImageError::ConfigError(format!(
                "page size {} is smaller than an object header ({} bytes)",
                page_size, OBJECT_HEADER_SIZE
            )));
        }
        if spare_size < PACKED_TAGS_SIZE {
            return Err(ImageError::ConfigError(format!(
                "spare size {} cannot hold packed tags ({} bytes)",
                spare_size, PACKED_TAGS_SIZE
            )));
        }
        if pages_per_block == 0 {
            return Err(ImageError::ConfigError(
                "pages per block must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            page_size,
            spare_size,
            pages_per_block,
        })
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn spare_size(&self) -> usize {
        self.spare_size
    }

    pub fn pages_per_block(&self) -> usize {
        self.pages_per_block
    }

    /// Bytes occupied by one record on disk (page plus spare).
    pub fn record_size(&self) -> usize {
        self.page_size + self.spare_size
    }
}

impl Default for ImageGeometry {
    /// 2k pages with 64-byte spares, 64 pages per block.
    fn default() -> Self {
        Self {
            page_size: 2048,
            spare_size: 64,
            pages_per_block: 64,
        }
    }
}
