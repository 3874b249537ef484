use std::fs;
use std::path::Path;

use tempfile::TempDir;
use yaffsedit::config::YaffsConfig;
use yaffsedit::tooling::cli::{CliContext, Commands, OutputFormat};
use yaffsedit::{Engine, ImageError};

fn context(format: OutputFormat) -> CliContext {
    CliContext::with_config(YaffsConfig::default(), format).unwrap()
}

fn new_image(ctx: &CliContext, path: &Path) {
    ctx.execute(&Commands::New {
        output: path.to_path_buf(),
    })
    .unwrap();
}

#[test]
fn new_mkdir_symlink_and_ls() {
    let temp = TempDir::new().unwrap();
    let ctx = context(OutputFormat::Text);
    let blank = temp.path().join("blank.img");
    let with_dir = temp.path().join("dir.img");
    let with_link = temp.path().join("link.img");
    new_image(&ctx, &blank);

    ctx.execute(&Commands::Mkdir {
        image: blank.clone(),
        path: "/data/local/tmp".to_string(),
        output: with_dir.clone(),
        uid: 2000,
        gid: 2000,
        mode: Some(0o771),
    })
    .unwrap();
    ctx.execute(&Commands::Symlink {
        image: with_dir.clone(),
        path: "/sdcard".to_string(),
        alias: "/data/local/tmp".to_string(),
        output: with_link.clone(),
        uid: 0,
        gid: 0,
        mode: 0o777,
    })
    .unwrap();

    let listing = ctx
        .execute(&Commands::Ls {
            image: with_link.clone(),
            path: "/".to_string(),
            recursive: true,
        })
        .unwrap();
    assert!(listing.contains("/data/local/tmp"));
    assert!(listing.contains("/sdcard -> /data/local/tmp"));

    let mut engine = Engine::default();
    engine.load_image(&with_link).unwrap();
    let tmp = engine.resolve("/data/local/tmp").unwrap();
    let node = engine.node(tmp).unwrap();
    assert_eq!(node.uid(), 2000);
    assert_eq!(node.permissions(), 0o771);
}

#[test]
fn import_set_and_rm() {
    let temp = TempDir::new().unwrap();
    let ctx = context(OutputFormat::Text);
    let host = temp.path().join("hosts");
    fs::write(&host, b"127.0.0.1 localhost\n").unwrap();
    let blank = temp.path().join("blank.img");
    let imported = temp.path().join("imported.img");
    let renamed = temp.path().join("renamed.img");
    let removed = temp.path().join("removed.img");
    new_image(&ctx, &blank);

    let out = ctx
        .execute(&Commands::Import {
            image: blank,
            host,
            dest: "/system/etc".to_string(),
            output: imported.clone(),
            uid: 0,
            gid: 0,
            mode: Some(0o644),
        })
        .unwrap();
    assert!(out.contains("3 new"));

    ctx.execute(&Commands::Set {
        image: imported,
        path: "/system/etc/hosts".to_string(),
        output: renamed.clone(),
        name: Some("hosts.bak".to_string()),
        uid: Some(1000),
        gid: None,
        mode: None,
        alias: None,
    })
    .unwrap();

    let mut engine = Engine::default();
    engine.load_image(&renamed).unwrap();
    let bak = engine.resolve("/system/etc/hosts.bak").unwrap();
    assert_eq!(engine.node(bak).unwrap().uid(), 1000);
    assert_eq!(engine.node(bak).unwrap().file_size(), 20);

    ctx.execute(&Commands::Rm {
        image: renamed,
        paths: vec!["/system/etc".to_string()],
        output: removed.clone(),
    })
    .unwrap();
    engine.load_image(&removed).unwrap();
    assert!(engine.resolve("/system").is_ok());
    assert!(engine.resolve("/system/etc").is_err());
}

#[test]
fn info_reports_json_summary() {
    let temp = TempDir::new().unwrap();
    let image = temp.path().join("blank.img");
    new_image(&context(OutputFormat::Text), &image);

    let out = context(OutputFormat::Json)
        .execute(&Commands::Info { image })
        .unwrap();
    let value: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(value["summary"]["success"], true);
    assert_eq!(value["summary"]["directories"], 0);
}

#[test]
fn rm_of_unknown_path_fails_without_writing() {
    let temp = TempDir::new().unwrap();
    let ctx = context(OutputFormat::Text);
    let image = temp.path().join("blank.img");
    let output = temp.path().join("out.img");
    new_image(&ctx, &image);

    let result = ctx.execute(&Commands::Rm {
        image,
        paths: vec!["/nope".to_string()],
        output: output.clone(),
    });
    assert!(result.is_err());
    assert!(!output.exists());
}

#[test]
fn editing_commands_refuse_to_overwrite_their_input() {
    let temp = TempDir::new().unwrap();
    let ctx = context(OutputFormat::Text);
    let image = temp.path().join("blank.img");
    new_image(&ctx, &image);

    let err = ctx
        .execute(&Commands::Mkdir {
            image: image.clone(),
            path: "/x".to_string(),
            output: image,
            uid: 0,
            gid: 0,
            mode: None,
        })
        .unwrap_err();
    assert!(matches!(err, ImageError::AlreadyOpenAsTarget(_)));
}

#[test]
fn ls_of_empty_image_is_an_error() {
    let temp = TempDir::new().unwrap();
    let image = temp.path().join("zero.img");
    fs::write(&image, b"").unwrap();

    let err = context(OutputFormat::Text)
        .execute(&Commands::Ls {
            image,
            path: "/".to_string(),
            recursive: false,
        })
        .unwrap_err();
    assert!(matches!(err, ImageError::EmptyImage(_)));
}

#[test]
fn config_command_prints_toml() {
    let out = context(OutputFormat::Text)
        .execute(&Commands::Config)
        .unwrap();
    assert!(out.contains("page_size = 2048"));
    assert!(out.contains("failure_cap = 10"));
}
