use std::fs;

use tempfile::TempDir;
use yaffsedit::tree::Condition;
use yaffsedit::{Engine, ImageError};

use crate::integration::support::{tree_tuples, RawImage};

fn sample_image(path: &std::path::Path) {
    RawImage::new()
        .root()
        .dir(257, 1, "system")
        .dir(258, 257, "bin")
        .file(259, 258, "sh", &vec![0x5A; 4500])
        .file(260, 257, "build.prop", b"ro.product=test\n")
        .symlink(261, 1, "sdcard", "/mnt/sdcard")
        .write_to(path);
}

#[test]
fn save_as_preserves_structure_and_contents() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("system.img");
    let target = temp.path().join("copy.img");
    sample_image(&source);

    let mut engine = Engine::default();
    let loaded = engine.load_image(&source).unwrap();
    let before = tree_tuples(&engine);
    assert!(before
        .iter()
        .any(|t| t.0 == "/sdcard" && t.6.as_deref() == Some("/mnt/sdcard")));

    let summary = engine.save_as(&target).unwrap();
    assert!(summary.success);
    assert_eq!(summary.files_saved, 2);
    assert_eq!(summary.directories_saved, 2);
    assert_eq!(summary.directories_saved, loaded.directories);
    assert_eq!(summary.files_saved, loaded.files);
    assert_eq!(summary.symlinks_saved, 1);
    assert_eq!(engine.image_path(), Some(target.as_path()));

    let mut reloaded = Engine::default();
    reloaded.load_image(&target).unwrap();
    assert_eq!(tree_tuples(&reloaded), before);

    let out = temp.path().join("out");
    fs::create_dir(&out).unwrap();
    let sh = reloaded.resolve("/system/bin/sh").unwrap();
    let export = reloaded.export_selection(&[sh], &out).unwrap();
    assert_eq!(export.files_exported, 1);
    assert_eq!(fs::read(out.join("sh")).unwrap(), vec![0x5A; 4500]);
}

#[test]
fn edits_survive_a_save() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("system.img");
    let target = temp.path().join("edited.img");
    sample_image(&source);

    let mut engine = Engine::default();
    engine.load_image(&source).unwrap();
    let prop = engine.resolve("/system/build.prop").unwrap();
    engine.set_name(prop, "default.prop").unwrap();
    engine.set_uid(prop, 0).unwrap();
    engine.set_permissions(prop, 0o600).unwrap();
    assert_eq!(engine.node(prop).unwrap().condition(), Condition::Dirty);
    assert_eq!(engine.pending_changes().dirty, 1);

    assert!(engine.save_as(&target).unwrap().success);
    assert!(!engine.is_dirty());
    let prop = engine.resolve("/system/default.prop").unwrap();
    assert_eq!(engine.node(prop).unwrap().condition(), Condition::Clean);

    let mut reloaded = Engine::default();
    reloaded.load_image(&target).unwrap();
    let prop = reloaded.resolve("/system/default.prop").unwrap();
    let node = reloaded.node(prop).unwrap();
    assert_eq!(node.uid(), 0);
    assert_eq!(node.permissions(), 0o600);
    assert_eq!(node.file_size(), 16);
    assert!(reloaded.resolve("/system/build.prop").is_err());
}

#[test]
fn retargeted_symlink_survives_a_save() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("system.img");
    let target = temp.path().join("edited.img");
    sample_image(&source);

    let mut engine = Engine::default();
    engine.load_image(&source).unwrap();
    let untouched = tree_tuples(&engine);
    let link = engine.resolve("/sdcard").unwrap();
    engine.set_alias(link, "/storage/emulated/0").unwrap();
    assert!(engine.save_as(&target).unwrap().success);

    let mut reloaded = Engine::default();
    reloaded.load_image(&target).unwrap();
    let after = tree_tuples(&reloaded);
    assert_ne!(after, untouched);
    let sdcard = after.iter().find(|t| t.0 == "/sdcard").unwrap();
    assert_eq!(sdcard.6.as_deref(), Some("/storage/emulated/0"));
}

#[test]
fn saving_over_the_open_image_is_refused() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("system.img");
    sample_image(&source);
    let original = fs::read(&source).unwrap();

    let mut engine = Engine::default();
    engine.load_image(&source).unwrap();
    let err = engine.save_as(&source).unwrap_err();
    assert!(matches!(err, ImageError::AlreadyOpenAsTarget(_)));
    assert_eq!(fs::read(&source).unwrap(), original);
}

#[test]
fn save_without_open_image_fails() {
    let temp = TempDir::new().unwrap();
    let mut engine = Engine::default();
    let err = engine.save_as(&temp.path().join("x.img")).unwrap_err();
    assert!(matches!(err, ImageError::NoImageOpen));
}
