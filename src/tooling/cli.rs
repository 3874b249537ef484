//! CLI Tooling
//!
//! Command-line interface over the engine. Read-only commands load the image
//! and report; editing commands load the input image, apply one edit and save
//! the result to `--output`, which must differ from the input.

use crate::config::{ConfigLoader, YaffsConfig};
use crate::engine::{Engine, EngineConfig, DEFAULT_DIR_PERMISSIONS, DEFAULT_FILE_PERMISSIONS};
use crate::error::ImageError;
use crate::logging::LoggingConfig;
use crate::tooling::format::{
    format_export_summary_text, format_listing_text, format_pending_changes_text,
    format_read_summary_text, format_save_summary_text, listing_rows,
};
use crate::tree::NodeHandle;
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// yaffsedit - inspect and edit YAFFS2 flash filesystem images
#[derive(Parser)]
#[command(name = "yaffsedit")]
#[command(about = "Inspect and edit YAFFS2 flash filesystem images")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file, file+stderr)
    #[arg(long, global = true)]
    pub log_output: Option<String>,

    /// Log file path (if output includes "file")
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    /// Apply logging flags on top of the configured logging settings.
    pub fn logging_config(&self, base: &LoggingConfig) -> LoggingConfig {
        let mut config = base.clone();
        if let Some(level) = &self.log_level {
            config.level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.format = format.clone();
        }
        if let Some(output) = &self.log_output {
            config.output = output.clone();
        }
        if let Some(file) = &self.log_file {
            config.file = Some(file.clone());
        }
        config
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load an image and print its summary
    Info {
        image: PathBuf,
    },
    /// List entries of an image
    Ls {
        image: PathBuf,
        /// Internal path to list
        #[arg(default_value = "/")]
        path: String,
        /// List everything below the path
        #[arg(short, long)]
        recursive: bool,
    },
    /// Create a new image holding only the root directory
    New {
        output: PathBuf,
    },
    /// Import a host file or directory
    Import {
        image: PathBuf,
        /// Host file or directory
        host: PathBuf,
        /// Internal directory receiving the import
        #[arg(default_value = "/")]
        dest: String,
        #[arg(long)]
        output: PathBuf,
        /// Owner of an imported file
        #[arg(long, default_value_t = 0)]
        uid: u32,
        /// Group of an imported file
        #[arg(long, default_value_t = 0)]
        gid: u32,
        /// Octal permissions of an imported file
        #[arg(long, value_parser = parse_mode)]
        mode: Option<u32>,
    },
    /// Create a directory, including missing parents
    Mkdir {
        image: PathBuf,
        path: String,
        #[arg(long)]
        output: PathBuf,
        #[arg(long, default_value_t = 0)]
        uid: u32,
        #[arg(long, default_value_t = 0)]
        gid: u32,
        #[arg(long, value_parser = parse_mode)]
        mode: Option<u32>,
    },
    /// Create a symbolic link
    Symlink {
        image: PathBuf,
        path: String,
        alias: String,
        #[arg(long)]
        output: PathBuf,
        #[arg(long, default_value_t = 0)]
        uid: u32,
        #[arg(long, default_value_t = 0)]
        gid: u32,
        #[arg(long, value_parser = parse_mode, default_value = "777")]
        mode: u32,
    },
    /// Change attributes of an entry
    Set {
        image: PathBuf,
        path: String,
        #[arg(long)]
        output: PathBuf,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        uid: Option<u32>,
        #[arg(long)]
        gid: Option<u32>,
        #[arg(long, value_parser = parse_mode)]
        mode: Option<u32>,
        /// New symlink target
        #[arg(long)]
        alias: Option<String>,
    },
    /// Remove entries and everything below them
    Rm {
        image: PathBuf,
        #[arg(required = true)]
        paths: Vec<String>,
        #[arg(long)]
        output: PathBuf,
    },
    /// Copy entries out of an image into a host directory
    Export {
        image: PathBuf,
        #[arg(required = true)]
        paths: Vec<String>,
        /// Host destination directory
        #[arg(long)]
        dest: PathBuf,
    },
    /// Print the effective configuration
    Config,
}

/// Parse an octal permission string such as `755` or `0644`.
pub fn parse_mode(value: &str) -> Result<u32, String> {
    u32::from_str_radix(value.trim_start_matches("0o"), 8)
        .map_err(|e| format!("invalid octal mode '{}': {}", value, e))
}

/// CLI context for command execution
pub struct CliContext {
    config: YaffsConfig,
    engine_config: EngineConfig,
    format: OutputFormat,
}

impl CliContext {
    /// Create a context from an optional configuration file.
    pub fn new(config_path: Option<&Path>, format: OutputFormat) -> Result<Self, ImageError> {
        let config = ConfigLoader::load(config_path)?;
        Self::with_config(config, format)
    }

    pub fn with_config(config: YaffsConfig, format: OutputFormat) -> Result<Self, ImageError> {
        let engine_config = config.engine_config()?;
        Ok(Self {
            config,
            engine_config,
            format,
        })
    }

    pub fn config(&self) -> &YaffsConfig {
        &self.config
    }

    /// Execute a command and return its rendered output.
    pub fn execute(&self, command: &Commands) -> Result<String, ImageError> {
        match command {
            Commands::Info { image } => self.handle_info(image),
            Commands::Ls {
                image,
                path,
                recursive,
            } => self.handle_ls(image, path, *recursive),
            Commands::New { output } => self.handle_new(output),
            Commands::Import {
                image,
                host,
                dest,
                output,
                uid,
                gid,
                mode,
            } => self.edit_and_save(image, output, |engine| {
                let meta = fs::metadata(host).map_err(|e| ImageError::io(host, e))?;
                if meta.is_dir() {
                    let parent = engine.resolve(dest)?;
                    engine.import_directory(parent, host)?;
                } else {
                    let name = host
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .ok_or_else(|| ImageError::InvalidName(host.display().to_string()))?;
                    let internal = format!("{}/{}", dest.trim_end_matches('/'), name);
                    engine.import_file_at(
                        host,
                        &internal,
                        *uid,
                        *gid,
                        mode.unwrap_or(DEFAULT_FILE_PERMISSIONS),
                    )?;
                }
                Ok(())
            }),
            Commands::Mkdir {
                image,
                path,
                output,
                uid,
                gid,
                mode,
            } => self.edit_and_save(image, output, |engine| {
                engine.create_directory(path, *uid, *gid, mode.unwrap_or(DEFAULT_DIR_PERMISSIONS))?;
                Ok(())
            }),
            Commands::Symlink {
                image,
                path,
                alias,
                output,
                uid,
                gid,
                mode,
            } => self.edit_and_save(image, output, |engine| {
                engine.create_symlink(path, alias, *uid, *gid, *mode)?;
                Ok(())
            }),
            Commands::Set {
                image,
                path,
                output,
                name,
                uid,
                gid,
                mode,
                alias,
            } => self.edit_and_save(image, output, |engine| {
                let handle = engine.resolve(path)?;
                if let Some(uid) = uid {
                    engine.set_uid(handle, *uid)?;
                }
                if let Some(gid) = gid {
                    engine.set_gid(handle, *gid)?;
                }
                if let Some(mode) = mode {
                    engine.set_permissions(handle, *mode)?;
                }
                if let Some(alias) = alias {
                    engine.set_alias(handle, alias)?;
                }
                if let Some(name) = name {
                    engine.set_name(handle, name)?;
                }
                Ok(())
            }),
            Commands::Rm {
                image,
                paths,
                output,
            } => self.edit_and_save(image, output, |engine| {
                let selection = resolve_all(engine, paths)?;
                engine.delete_selection(&selection)?;
                Ok(())
            }),
            Commands::Export { image, paths, dest } => self.handle_export(image, paths, dest),
            Commands::Config => toml::to_string_pretty(&self.config)
                .map_err(|e| ImageError::ConfigError(e.to_string())),
        }
    }

    fn load(&self, image: &Path) -> Result<Engine, ImageError> {
        let mut engine = Engine::new(self.engine_config);
        let summary = engine.load_image(image)?;
        if !summary.success {
            return Err(ImageError::EmptyImage(image.to_path_buf()));
        }
        Ok(engine)
    }

    fn handle_info(&self, image: &Path) -> Result<String, ImageError> {
        let mut engine = Engine::new(self.engine_config);
        let summary = engine.load_image(image)?;
        match self.format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(&json!({
                "image": image.display().to_string(),
                "summary": summary,
            }))?),
            OutputFormat::Text => Ok(format_read_summary_text(
                &image.display().to_string(),
                &summary,
            )),
        }
    }

    fn handle_ls(&self, image: &Path, path: &str, recursive: bool) -> Result<String, ImageError> {
        let engine = self.load(image)?;
        let handle = engine.resolve(path)?;
        let tree = engine.tree().ok_or(ImageError::NoImageOpen)?;
        let rows = listing_rows(tree, handle, recursive);
        match self.format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(&rows)?),
            OutputFormat::Text => Ok(format_listing_text(&rows)),
        }
    }

    fn handle_new(&self, output: &Path) -> Result<String, ImageError> {
        let mut engine = Engine::new(self.engine_config);
        let name = output
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        engine.new_empty_image(&name);
        self.save(&mut engine, output)
    }

    fn handle_export(&self, image: &Path, paths: &[String], dest: &Path) -> Result<String, ImageError> {
        let engine = self.load(image)?;
        let selection = resolve_all(&engine, paths)?;
        let summary = engine.export_selection(&selection, dest)?;
        match self.format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(&summary)?),
            OutputFormat::Text => Ok(format_export_summary_text(&summary)),
        }
    }

    /// Load `image`, apply `edit`, save to `output`.
    fn edit_and_save(
        &self,
        image: &Path,
        output: &Path,
        edit: impl FnOnce(&mut Engine) -> Result<(), ImageError>,
    ) -> Result<String, ImageError> {
        let mut engine = self.load(image)?;
        edit(&mut engine)?;
        let changes = engine.pending_changes();
        info!(new = changes.new, dirty = changes.dirty, deleted = changes.deleted, "Applied edit");
        let mut out = String::new();
        if self.format == OutputFormat::Text {
            out.push_str(&format_pending_changes_text(&changes));
        }
        out.push_str(&self.save(&mut engine, output)?);
        Ok(out)
    }

    fn save(&self, engine: &mut Engine, output: &Path) -> Result<String, ImageError> {
        let summary = engine.save_as(output)?;
        if !summary.success {
            return Err(ImageError::SaveFailed(summary.failures()));
        }
        match self.format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(&json!({
                "output": output.display().to_string(),
                "save": summary,
            }))?),
            OutputFormat::Text => Ok(format_save_summary_text(
                &output.display().to_string(),
                &summary,
            )),
        }
    }
}

fn resolve_all(engine: &Engine, paths: &[String]) -> Result<Vec<NodeHandle>, ImageError> {
    paths
        .iter()
        .map(|path| {
            engine
                .resolve(path)
                .map_err(|_| ImageError::InvalidAttribute(format!("no entry at {}", path)))
        })
        .collect()
}
