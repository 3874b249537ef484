//! Text rendering of summaries and listings for the command line.

use crate::engine::PendingChanges;
use crate::export::{ExportSummary, FailureList};
use crate::persist::SaveSummary;
use crate::tree::{Condition, NodeHandle, NodeKind, ReadSummary, Tree};
use crate::types::ObjectId;
use chrono::DateTime;
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use owo_colors::OwoColorize;
use serde::Serialize;

/// One row of a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListingRow {
    pub path: String,
    pub kind: String,
    pub object_id: ObjectId,
    pub size: u64,
    pub mode: String,
    pub uid: u32,
    pub gid: u32,
    pub modified: String,
    pub target: Option<String>,
    pub condition: Condition,
}

/// Format a section heading with bold/underline.
pub fn format_section_heading(title: &str) -> String {
    format!("{}", title.bold().underline())
}

/// Seconds since the epoch as a UTC date and time.
pub fn format_timestamp(seconds: u32) -> String {
    DateTime::from_timestamp(i64::from(seconds), 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Rows for `handle` and, when `recursive`, everything below it. A directory
/// that is not listed recursively contributes its direct children.
pub fn listing_rows(tree: &Tree, handle: NodeHandle, recursive: bool) -> Vec<ListingRow> {
    let handles = match tree.get(handle) {
        Some(_) if recursive => tree.descendants(handle),
        Some(node) if node.is_dir() => node.children().to_vec(),
        Some(_) => vec![handle],
        None => Vec::new(),
    };
    handles
        .into_iter()
        .filter_map(|h| {
            let node = tree.get(h)?;
            let (kind, target) = match node.kind() {
                NodeKind::Root | NodeKind::Directory => ("dir", None),
                NodeKind::File { .. } => ("file", None),
                NodeKind::SymLink { alias } => ("symlink", Some(alias.clone())),
                NodeKind::HardLink { equivalent_id } => {
                    ("hardlink", Some(format!("#{}", equivalent_id)))
                }
                NodeKind::Special { rdev } => ("special", Some(format!("rdev {:#x}", rdev))),
            };
            Some(ListingRow {
                path: tree.full_path(h).ok()?,
                kind: kind.to_string(),
                object_id: node.object_id(),
                size: node.file_size(),
                mode: format!("{:04o}", node.permissions()),
                uid: node.uid(),
                gid: node.gid(),
                modified: format_timestamp(node.mtime()),
                target,
                condition: node.condition(),
            })
        })
        .collect()
}

pub fn format_listing_text(rows: &[ListingRow]) -> String {
    if rows.is_empty() {
        return "(empty)\n".to_string();
    }
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Mode", "Uid", "Gid", "Size", "Modified", "Path"]);
    for row in rows {
        let path = match &row.target {
            Some(target) => format!("{} -> {}", row.path, target),
            None => row.path.clone(),
        };
        table.add_row(vec![
            row.mode.clone(),
            row.uid.to_string(),
            row.gid.to_string(),
            row.size.to_string(),
            row.modified.clone(),
            path,
        ]);
    }
    format!("{}\n", table)
}

pub fn format_read_summary_text(image: &str, summary: &ReadSummary) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}\n\n", format_section_heading("Image")));
    out.push_str(&format!("  Path: {}\n", image));
    out.push_str(&format!(
        "  Loaded: {}\n\n",
        if summary.success { "yes" } else { "no" }
    ));

    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Category", "Count"]);
    for (label, count) in [
        ("Files", summary.files),
        ("Directories", summary.directories),
        ("Symlinks", summary.symlinks),
        ("Hard links", summary.hardlinks),
        ("Specials", summary.specials),
        ("Unknown", summary.unknowns),
    ] {
        table.add_row(vec![label.to_string(), count.to_string()]);
    }
    out.push_str(&format!("{}\n\n", table));

    let problems = [
        ("Corrupt headers", summary.corrupt_headers),
        ("Orphans", summary.orphans),
        ("Duplicate headers", summary.duplicate_headers),
        ("Chunk gaps", summary.chunk_gaps),
    ];
    if problems.iter().any(|(_, n)| *n > 0) || summary.truncated_tail {
        out.push_str(&format!("{}\n\n", format_section_heading("Problems")));
        for (label, count) in problems.iter().filter(|(_, n)| *n > 0) {
            out.push_str(&format!("  {}: {}\n", label, count));
        }
        if summary.truncated_tail {
            out.push_str("  Image ends on a partial record\n");
        }
    }
    out
}

pub fn format_save_summary_text(target: &str, summary: &SaveSummary) -> String {
    let mut out = String::new();
    let status = if summary.success {
        format!("{}", "saved".green())
    } else {
        format!("{}", "failed".red())
    };
    out.push_str(&format!("{} {}\n\n", target, status));

    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Category", "Saved", "Failed"]);
    for (label, saved, failed) in [
        ("Files", summary.files_saved, summary.files_failed),
        ("Directories", summary.directories_saved, summary.directories_failed),
        ("Symlinks", summary.symlinks_saved, summary.symlinks_failed),
        ("Hard links", summary.hardlinks_saved, summary.hardlinks_failed),
        ("Specials", summary.specials_saved, summary.specials_failed),
    ] {
        table.add_row(vec![label.to_string(), saved.to_string(), failed.to_string()]);
    }
    out.push_str(&format!("{}\n", table));
    out
}

pub fn format_export_summary_text(summary: &ExportSummary) -> String {
    let mut out = format!(
        "Exported {} dir(s) and {} file(s).",
        summary.directories_exported, summary.files_exported
    );
    if summary.skipped > 0 {
        out.push_str(&format!(" Skipped {} link/special entr(ies).", summary.skipped));
    }
    out.push('\n');
    push_failures(&mut out, "Failed to export directories", &summary.failed_directories);
    push_failures(&mut out, "Failed to export files", &summary.failed_files);
    out
}

fn push_failures(out: &mut String, title: &str, failures: &FailureList) {
    if failures.total == 0 {
        return;
    }
    out.push_str(&format!("\n{}:\n", title.red()));
    for path in &failures.paths {
        out.push_str(&format!("  {}\n", path));
    }
    if failures.omitted() > 0 {
        out.push_str(&format!("  ... plus {} more\n", failures.omitted()));
    }
}

pub fn format_pending_changes_text(changes: &PendingChanges) -> String {
    format!(
        "{} new, {} modified, {} deleted\n",
        changes.new, changes.dirty, changes.deleted
    )
}
