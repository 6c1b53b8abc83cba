//! Run command implementation.

use super::{display_paths, print_list, ProjectArgs};
use splice_core::{Pipeline, PipelineReport};

/// Runs every pipeline stage.
pub fn run(args: &ProjectArgs) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = args.context()?;
    let report = Pipeline::new(&ctx).run()?;

    if args.json() {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_text_output(&report);
    }
    Ok(())
}

fn print_text_output(report: &PipelineReport) {
    println!("Splice Pipeline");
    println!("===============");
    println!();
    println!("Segments:   {}", report.segments.join(", "));
    println!(
        "Checkpoint: {}",
        report.checkpoint.as_deref().unwrap_or("-")
    );
    println!("Source:     {:?}", report.source);
    println!();
    print_list("Removed", &display_paths(&report.removed));
    print_list("Pruned", &display_paths(&report.pruned));
    let woven: Vec<String> = report
        .woven
        .iter()
        .map(|m| format!("{}.{}{} ({} exits)", m.class, m.method, m.descriptor, m.exits))
        .collect();
    print_list("Woven", &woven);
    let merged: Vec<String> = report
        .merged
        .iter()
        .map(|m| format!("{} from {} keeping {}", m.class, m.archive, m.keep_method))
        .collect();
    print_list("Merged", &merged);
    print_list("Copied", &display_paths(&report.copied));
    println!("Manifests edited: {}", report.manifests_edited);
}
