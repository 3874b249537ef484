//! Raw image synthesis for tests that need records in a specific order.

use std::fs;
use std::path::Path;

use yaffsedit::codec::{encode_record, ObjectHeader, PackedTags};
use yaffsedit::types::{
    ImageGeometry, ObjectId, ObjectType, LOWEST_SEQUENCE_NUMBER, OBJECT_ID_ROOT, S_IFDIR,
    S_IFLNK, S_IFREG,
};

pub fn geometry() -> ImageGeometry {
    ImageGeometry::default()
}

/// Appends records exactly in the order they are added.
pub struct RawImage {
    geometry: ImageGeometry,
    bytes: Vec<u8>,
}

impl RawImage {
    pub fn new() -> Self {
        Self {
            geometry: geometry(),
            bytes: Vec::new(),
        }
    }

    pub fn header(mut self, object_id: ObjectId, header: ObjectHeader) -> Self {
        let tags = PackedTags::header(
            LOWEST_SEQUENCE_NUMBER,
            object_id,
            header.object_type,
            header.parent_id,
            header.tag_extra(),
        );
        let page = header.encode(self.geometry.page_size());
        self.bytes
            .extend(encode_record(&self.geometry, &tags, &page));
        self
    }

    pub fn root(self) -> Self {
        self.header(OBJECT_ID_ROOT, dir_header(OBJECT_ID_ROOT, ""))
    }

    pub fn dir(self, object_id: ObjectId, parent: ObjectId, name: &str) -> Self {
        self.header(object_id, dir_header(parent, name))
    }

    pub fn symlink(self, object_id: ObjectId, parent: ObjectId, name: &str, alias: &str) -> Self {
        let mut header = ObjectHeader::new(ObjectType::SymLink, parent, name);
        header.mode = S_IFLNK | 0o777;
        header.alias = alias.to_string();
        self.header(object_id, header)
    }

    /// File header followed by its data chunks.
    pub fn file(mut self, object_id: ObjectId, parent: ObjectId, name: &str, data: &[u8]) -> Self {
        let mut header = ObjectHeader::new(ObjectType::File, parent, name);
        header.mode = S_IFREG | 0o644;
        header.uid = 1000;
        header.gid = 1000;
        header.mtime = 1_600_000_000;
        header.file_size = data.len() as u64;
        self = self.header(object_id, header);
        let page_size = self.geometry.page_size();
        for (i, chunk) in data.chunks(page_size).enumerate() {
            let tags = PackedTags::data_chunk(
                LOWEST_SEQUENCE_NUMBER,
                object_id,
                (i + 1) as u32,
                chunk.len() as u32,
            );
            self.bytes
                .extend(encode_record(&self.geometry, &tags, chunk));
        }
        self
    }

    /// Append bytes that do not form a whole record.
    pub fn partial_tail(mut self, len: usize) -> Self {
        self.bytes.extend(std::iter::repeat(0xAB).take(len));
        self
    }

    pub fn write_to(self, path: &Path) {
        fs::write(path, self.bytes).unwrap();
    }
}

fn dir_header(parent: ObjectId, name: &str) -> ObjectHeader {
    let mut header = ObjectHeader::new(ObjectType::Directory, parent, name);
    header.mode = S_IFDIR | 0o755;
    header
}

/// Snapshot of `(path, kind, mode, uid, gid, size)` for every node, in tree order.
pub type NodeTuple = (String, String, u32, u32, u32, u64, Option<String>);

pub fn tree_tuples(engine: &yaffsedit::Engine) -> Vec<NodeTuple> {
    let tree = engine.tree().unwrap();
    tree.descendants(tree.root())
        .into_iter()
        .map(|h| {
            let node = tree.node(h).unwrap();
            (
                tree.full_path(h).unwrap(),
                format!("{:?}", node.object_type()),
                node.mode(),
                node.uid(),
                node.gid(),
                node.file_size(),
                node.alias().map(str::to_string),
            )
        })
        .collect()
}
