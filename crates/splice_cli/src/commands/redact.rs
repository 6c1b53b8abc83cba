//! Redact command implementation.

use super::{display_paths, print_list, ProjectArgs};
use serde::Serialize;
use splice_core::Pipeline;
use std::path::PathBuf;

/// Files deleted by a redaction-only run.
#[derive(Debug, Serialize)]
pub struct RedactResult {
    /// Active segment names.
    pub segments: Vec<String>,
    /// Files deleted by the remove lists.
    pub removed: Vec<PathBuf>,
    /// Files deleted by opportunistic pruning.
    pub pruned: Vec<PathBuf>,
}

/// Runs redaction and opportunistic pruning.
pub fn run(args: &ProjectArgs) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = args.context()?;
    let report = Pipeline::new(&ctx).redact_only()?;
    let result = RedactResult {
        segments: report.segments,
        removed: report.removed,
        pruned: report.pruned,
    };

    if args.json() {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("Segments: {}", result.segments.join(", "));
        print_list("Removed", &display_paths(&result.removed));
        print_list("Pruned", &display_paths(&result.pruned));
    }
    Ok(())
}
