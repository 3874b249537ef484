//! Integration tests for image loading, editing and saving

mod cli_commands;
mod deletion;
mod import_export;
mod load_tree;
mod save_roundtrip;
mod support;
