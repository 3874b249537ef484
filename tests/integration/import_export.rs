use std::fs;

use tempfile::TempDir;
use yaffsedit::tree::Condition;
use yaffsedit::{Engine, ImageError};

use crate::integration::support::RawImage;

fn host_tree(root: &std::path::Path) {
    fs::create_dir_all(root.join("overlay/etc")).unwrap();
    fs::write(root.join("overlay/etc/hosts"), b"127.0.0.1 localhost\n").unwrap();
    fs::write(root.join("overlay/readme"), vec![b'r'; 3000]).unwrap();
}

#[test]
fn imported_directory_round_trips_through_export() {
    let temp = TempDir::new().unwrap();
    host_tree(temp.path());
    let image = temp.path().join("new.img");

    let mut engine = Engine::default();
    let root = engine.new_empty_image("new.img");
    let overlay = engine
        .import_directory(root, &temp.path().join("overlay"))
        .unwrap();
    assert_eq!(engine.node(overlay).unwrap().condition(), Condition::New);
    // root, overlay, etc, hosts, readme
    assert_eq!(engine.pending_changes().new, 5);

    assert!(engine.save_as(&image).unwrap().success);
    let hosts = engine.resolve("/overlay/etc/hosts").unwrap();
    assert_eq!(engine.node(hosts).unwrap().condition(), Condition::Clean);
    assert!(engine.node(hosts).unwrap().header_position().is_some());

    let dest = temp.path().join("exported");
    fs::create_dir(&dest).unwrap();
    let overlay = engine.resolve("/overlay").unwrap();
    let summary = engine.export_selection(&[overlay], &dest).unwrap();
    assert_eq!(summary.files_exported, 2);
    assert_eq!(summary.directories_exported, 2);
    assert_eq!(summary.failures(), 0);
    assert_eq!(
        fs::read(dest.join("overlay/etc/hosts")).unwrap(),
        b"127.0.0.1 localhost\n"
    );
    assert_eq!(fs::read(dest.join("overlay/readme")).unwrap().len(), 3000);
}

#[test]
fn import_file_at_creates_parents_and_applies_attributes() {
    let temp = TempDir::new().unwrap();
    let host = temp.path().join("init.rc");
    fs::write(&host, b"on boot\n").unwrap();

    let mut engine = Engine::default();
    engine.new_empty_image("img");
    let handle = engine
        .import_file_at(&host, "/vendor/etc/init/init.rc", 1000, 2000, 0o640)
        .unwrap();
    let node = engine.node(handle).unwrap();
    assert_eq!(node.uid(), 1000);
    assert_eq!(node.gid(), 2000);
    assert_eq!(node.permissions(), 0o640);
    assert!(engine.resolve("/vendor/etc/init").is_ok());

    let err = engine
        .import_file_at(&host, "/vendor/etc/init/init.rc", 0, 0, 0o644)
        .unwrap_err();
    assert!(matches!(err, ImageError::DuplicateName { .. }));
}

#[test]
fn export_skips_links_and_nested_selection() {
    let temp = TempDir::new().unwrap();
    let image = temp.path().join("links.img");
    RawImage::new()
        .root()
        .dir(257, 1, "bin")
        .file(258, 257, "toybox", b"ELF")
        .symlink(259, 257, "ls", "toybox")
        .write_to(&image);

    let mut engine = Engine::default();
    engine.load_image(&image).unwrap();
    let bin = engine.resolve("/bin").unwrap();
    let toybox = engine.resolve("/bin/toybox").unwrap();

    let dest = temp.path().join("out");
    fs::create_dir(&dest).unwrap();
    let summary = engine.export_selection(&[bin, toybox], &dest).unwrap();
    assert_eq!(summary.files_exported, 1);
    assert_eq!(summary.directories_exported, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(fs::read(dest.join("bin/toybox")).unwrap(), b"ELF");
    assert!(!dest.join("bin/ls").exists());
}

#[test]
fn export_collision_is_reported_as_failure() {
    let temp = TempDir::new().unwrap();
    let image = temp.path().join("one.img");
    RawImage::new()
        .root()
        .file(257, 1, "a", b"a")
        .write_to(&image);

    let mut engine = Engine::default();
    engine.load_image(&image).unwrap();
    let a = engine.resolve("/a").unwrap();
    let dest = temp.path().join("out");
    fs::create_dir_all(dest.join("a")).unwrap();
    let summary = engine.export_selection(&[a], &dest).unwrap();
    assert_eq!(summary.files_exported, 0);
    assert_eq!(summary.failed_files.total, 1);
    assert_eq!(summary.failed_files.paths, vec!["/a".to_string()]);
}
