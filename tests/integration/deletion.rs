use tempfile::TempDir;
use yaffsedit::Engine;

use crate::integration::support::RawImage;

fn wide_image(path: &std::path::Path) {
    let mut image = RawImage::new().root().dir(257, 1, "app");
    for i in 0..12u32 {
        image = image.file(300 + i, 257, &format!("f{:02}", i), &[i as u8; 10]);
    }
    image.dir(400, 1, "keep").file(401, 400, "x", b"x").write_to(path);
}

#[test]
fn scattered_selection_removes_exactly_the_selected_rows() {
    let temp = TempDir::new().unwrap();
    let image = temp.path().join("wide.img");
    wide_image(&image);

    let mut engine = Engine::default();
    engine.load_image(&image).unwrap();
    let selection: Vec<_> = [0, 1, 2, 5, 6, 11]
        .iter()
        .map(|i| engine.resolve(&format!("/app/f{:02}", i)).unwrap())
        .collect();

    let removed = engine.delete_selection(&selection).unwrap();
    assert_eq!(removed, 6);
    assert_eq!(engine.pending_changes().deleted, 6);

    let app = engine.resolve("/app").unwrap();
    let tree = engine.tree().unwrap();
    let names: Vec<String> = (0..tree.child_count(app))
        .map(|row| {
            let child = tree.child(app, row).unwrap();
            tree.node(child).unwrap().name().to_string()
        })
        .collect();
    assert_eq!(names, vec!["f03", "f04", "f07", "f08", "f09", "f10"]);
    assert!(engine.resolve("/keep/x").is_ok());
}

#[test]
fn deleting_a_directory_and_its_child_counts_each_node_once() {
    let temp = TempDir::new().unwrap();
    let image = temp.path().join("wide.img");
    wide_image(&image);

    let mut engine = Engine::default();
    engine.load_image(&image).unwrap();
    let app = engine.resolve("/app").unwrap();
    let f03 = engine.resolve("/app/f03").unwrap();

    let removed = engine.delete_selection(&[f03, app]).unwrap();
    assert_eq!(removed, 13);
    assert!(engine.resolve("/app").is_err());

    let target = temp.path().join("pruned.img");
    assert!(engine.save_as(&target).unwrap().success);
    let mut reloaded = Engine::default();
    let summary = reloaded.load_image(&target).unwrap();
    assert_eq!(summary.files, 1);
    assert_eq!(summary.directories, 1);
}

#[test]
fn root_in_selection_is_ignored() {
    let temp = TempDir::new().unwrap();
    let image = temp.path().join("wide.img");
    wide_image(&image);

    let mut engine = Engine::default();
    engine.load_image(&image).unwrap();
    let root = engine.tree().unwrap().root();
    let keep = engine.resolve("/keep").unwrap();

    let removed = engine.delete_selection(&[root, keep]).unwrap();
    assert_eq!(removed, 2);
    assert!(engine.resolve("/app/f00").is_ok());
}
