use tempfile::TempDir;
use yaffsedit::tree::{Condition, TreeBuilder};
use yaffsedit::Engine;

use crate::integration::support::{geometry, RawImage};

#[test]
fn children_written_before_parents_are_attached() {
    let temp = TempDir::new().unwrap();
    let image = temp.path().join("out_of_order.img");
    RawImage::new()
        .file(300, 257, "build.prop", b"ro.build=1\n")
        .symlink(301, 257, "vendor", "/vendor")
        .dir(257, 1, "system")
        .root()
        .write_to(&image);

    let mut engine = Engine::default();
    let summary = engine.load_image(&image).unwrap();
    assert!(summary.success);
    assert_eq!(summary.files, 1);
    assert_eq!(summary.directories, 1);
    assert_eq!(summary.symlinks, 1);
    assert_eq!(summary.orphans, 0);

    let prop = engine.resolve("/system/build.prop").unwrap();
    let node = engine.node(prop).unwrap();
    assert_eq!(node.file_size(), 11);
    assert_eq!(node.uid(), 1000);
    assert_eq!(node.condition(), Condition::Clean);

    let link = engine.resolve("/system/vendor").unwrap();
    assert_eq!(engine.node(link).unwrap().alias(), Some("/vendor"));
    assert!(!engine.is_dirty());
}

#[test]
fn missing_root_is_synthesized() {
    let temp = TempDir::new().unwrap();
    let image = temp.path().join("rootless.img");
    RawImage::new()
        .dir(257, 1, "data")
        .file(258, 257, "a.bin", &[7u8; 5000])
        .write_to(&image);

    let loaded = TreeBuilder::load(&image, geometry()).unwrap();
    assert!(loaded.summary.success);
    let tree = loaded.tree.unwrap();
    let file = tree.resolve("/data/a.bin").unwrap();
    assert_eq!(tree.node(file).unwrap().file_size(), 5000);
    assert_eq!(loaded.summary.chunk_gaps, 0);
}

#[test]
fn dangling_parent_is_reported_as_orphan() {
    let temp = TempDir::new().unwrap();
    let image = temp.path().join("orphan.img");
    RawImage::new()
        .root()
        .dir(257, 1, "etc")
        .file(258, 999, "lost", b"x")
        .write_to(&image);

    let mut engine = Engine::default();
    let summary = engine.load_image(&image).unwrap();
    assert!(summary.success);
    assert_eq!(summary.orphans, 1);
    assert!(engine.resolve("/etc").is_ok());
    assert_eq!(engine.tree().unwrap().len(), 2);
}

#[test]
fn partial_trailing_record_is_flagged() {
    let temp = TempDir::new().unwrap();
    let image = temp.path().join("truncated.img");
    RawImage::new()
        .root()
        .dir(257, 1, "cache")
        .partial_tail(100)
        .write_to(&image);

    let mut engine = Engine::default();
    let summary = engine.load_image(&image).unwrap();
    assert!(summary.success);
    assert!(summary.truncated_tail);
    assert!(engine.resolve("/cache").is_ok());
}

#[test]
fn empty_image_loads_without_a_tree() {
    let temp = TempDir::new().unwrap();
    let image = temp.path().join("empty.img");
    std::fs::write(&image, b"").unwrap();

    let mut engine = Engine::default();
    let summary = engine.load_image(&image).unwrap();
    assert!(!summary.success);
    assert!(engine.tree().is_none());
    assert!(engine.image_path().is_none());
}

#[test]
fn missing_image_is_an_error() {
    let temp = TempDir::new().unwrap();
    let mut engine = Engine::default();
    assert!(engine.load_image(&temp.path().join("nope.img")).is_err());
}
