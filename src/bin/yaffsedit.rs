//! yaffsedit CLI Binary
//!
//! Command-line interface for inspecting and editing YAFFS2 images.

use clap::Parser;
use std::process;
use yaffsedit::logging::init_logging;
use yaffsedit::tooling::cli::{Cli, CliContext};

fn main() {
    let cli = Cli::parse();

    let context = match CliContext::new(cli.config.as_deref(), cli.format) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            process::exit(1);
        }
    };

    let logging = cli.logging_config(&context.config().logging);
    if let Err(e) = init_logging(Some(&logging)) {
        eprintln!("Warning: failed to initialize logging: {}", e);
    }

    match context.execute(&cli.command) {
        Ok(output) if output.ends_with('\n') => print!("{}", output),
        Ok(output) => println!("{}", output),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}
