//! Object header layout
//!
//! Every object in an image is described by one 512-byte header at the start
//! of a header page. Fields are little-endian; strings are NUL padded.
//! Windows timestamps, in-band shadowing and the reserved word are read past
//! and written as zero.

use super::{copy_padded, read_le_u32, trim_nul_padded, write_le_u32};
use crate::error::ImageError;
use crate::types::{ObjectId, ObjectType, MAX_ALIAS_LENGTH, MAX_NAME_LENGTH, OBJECT_HEADER_SIZE};

const OFF_TYPE: usize = 0;
const OFF_PARENT: usize = 4;
const OFF_CHECKSUM: usize = 8;
const OFF_NAME: usize = 10;
const OFF_MODE: usize = 268;
const OFF_UID: usize = 272;
const OFF_GID: usize = 276;
const OFF_ATIME: usize = 280;
const OFF_MTIME: usize = 284;
const OFF_CTIME: usize = 288;
const OFF_SIZE_LOW: usize = 292;
const OFF_EQUIV: usize = 296;
const OFF_ALIAS: usize = 300;
const OFF_RDEV: usize = 460;
const OFF_SIZE_HIGH: usize = 496;
const OFF_SHADOWS: usize = 504;
const OFF_IS_SHRINK: usize = 508;

/// Decoded object header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHeader {
    pub object_type: ObjectType,
    pub parent_id: ObjectId,
    pub name: String,
    /// File type bits plus permissions.
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub atime: u32,
    pub mtime: u32,
    pub ctime: u32,
    pub file_size: u64,
    pub equivalent_id: ObjectId,
    pub alias: String,
    pub rdev: u32,
    pub shadows: ObjectId,
    pub is_shrink: bool,
}

impl ObjectHeader {
    pub fn new(object_type: ObjectType, parent_id: ObjectId, name: impl Into<String>) -> Self {
        Self {
            object_type,
            parent_id,
            name: name.into(),
            mode: 0,
            uid: 0,
            gid: 0,
            atime: 0,
            mtime: 0,
            ctime: 0,
            file_size: 0,
            equivalent_id: 0,
            alias: String::new(),
            rdev: 0,
            shadows: 0,
            is_shrink: false,
        }
    }

    /// Decode a header page. `offset` is only used for error reporting.
    ///
    /// Fails with `CorruptHeader` when the page is too short, the type code
    /// is out of range, or the name or alias is not UTF-8. Unknown and
    /// reserved fields are ignored.
    pub fn decode(page: &[u8], offset: u64) -> Result<Self, ImageError> {
        if page.len() < OBJECT_HEADER_SIZE {
            return Err(ImageError::corrupt(
                offset,
                format!(
                    "header needs {} bytes, page has {}",
                    OBJECT_HEADER_SIZE,
                    page.len()
                ),
            ));
        }

        let type_code = read_le_u32(page, OFF_TYPE);
        let object_type = ObjectType::from_code(type_code)
            .ok_or_else(|| ImageError::corrupt(offset, format!("invalid object type {}", type_code)))?;

        let size_low = read_le_u32(page, OFF_SIZE_LOW);
        let size_high = match read_le_u32(page, OFF_SIZE_HIGH) {
            u32::MAX => 0,
            high => high,
        };

        let name = trim_nul_padded(&page[OFF_NAME..OFF_NAME + MAX_NAME_LENGTH + 1])
            .map_err(|err| ImageError::corrupt(offset, format!("name is not UTF-8: {}", err)))?;
        let alias = trim_nul_padded(&page[OFF_ALIAS..OFF_ALIAS + MAX_ALIAS_LENGTH + 1])
            .map_err(|err| ImageError::corrupt(offset, format!("alias is not UTF-8: {}", err)))?;

        Ok(Self {
            object_type,
            parent_id: read_le_u32(page, OFF_PARENT),
            name,
            mode: read_le_u32(page, OFF_MODE),
            uid: read_le_u32(page, OFF_UID),
            gid: read_le_u32(page, OFF_GID),
            atime: read_le_u32(page, OFF_ATIME),
            mtime: read_le_u32(page, OFF_MTIME),
            ctime: read_le_u32(page, OFF_CTIME),
            file_size: (u64::from(size_high) << 32) | u64::from(size_low),
            equivalent_id: positive_id(read_le_u32(page, OFF_EQUIV)),
            alias,
            rdev: read_le_u32(page, OFF_RDEV),
            shadows: positive_id(read_le_u32(page, OFF_SHADOWS)),
            is_shrink: read_le_u32(page, OFF_IS_SHRINK) != 0,
        })
    }

    /// Encode into a full page of `page_size` bytes, 0xFF past the header.
    pub fn encode(&self, page_size: usize) -> Vec<u8> {
        let mut page = vec![0xFF_u8; page_size.max(OBJECT_HEADER_SIZE)];
        page[..OBJECT_HEADER_SIZE].fill(0);

        write_le_u32(&mut page, OFF_TYPE, self.object_type.code());
        write_le_u32(&mut page, OFF_PARENT, self.parent_id);
        // sum_no_longer_used stays at 0xFFFF like the reference tools write it.
        page[OFF_CHECKSUM..OFF_CHECKSUM + 2].copy_from_slice(&[0xFF, 0xFF]);
        copy_padded(&mut page[OFF_NAME..OFF_NAME + MAX_NAME_LENGTH + 1], &self.name);
        write_le_u32(&mut page, OFF_MODE, self.mode);
        write_le_u32(&mut page, OFF_UID, self.uid);
        write_le_u32(&mut page, OFF_GID, self.gid);
        write_le_u32(&mut page, OFF_ATIME, self.atime);
        write_le_u32(&mut page, OFF_MTIME, self.mtime);
        write_le_u32(&mut page, OFF_CTIME, self.ctime);
        write_le_u32(&mut page, OFF_SIZE_LOW, self.file_size as u32);
        write_le_u32(&mut page, OFF_EQUIV, self.equivalent_id);
        copy_padded(&mut page[OFF_ALIAS..OFF_ALIAS + MAX_ALIAS_LENGTH + 1], &self.alias);
        write_le_u32(&mut page, OFF_RDEV, self.rdev);
        write_le_u32(&mut page, OFF_SIZE_HIGH, (self.file_size >> 32) as u32);
        write_le_u32(&mut page, OFF_SHADOWS, self.shadows);
        write_le_u32(&mut page, OFF_IS_SHRINK, u32::from(self.is_shrink));
        page
    }

    /// Value carried in the `n_bytes` tag field of a header chunk.
    pub fn tag_extra(&self) -> u32 {
        match self.object_type {
            ObjectType::File => self.file_size as u32,
            ObjectType::HardLink => self.equivalent_id,
            _ => 0,
        }
    }
}

/// Signed on disk; anything not strictly positive means "none".
fn positive_id(raw: u32) -> ObjectId {
    if (raw as i32) > 0 {
        raw
    } else {
        0
    }
}
