//! Resolve command implementation.

use super::{display_paths, print_list, ProjectArgs};
use serde::Serialize;
use splice_core::redact::{opportunistic_classes, source_excludes};
use splice_core::{BuildContext, DependencyPlan, ResolutionSource, SpliceResult};

/// The active configuration and its effect on the host build.
#[derive(Debug, Serialize)]
pub struct ResolveResult {
    /// Active segment names.
    pub segments: Vec<String>,
    /// Selected checkpoint, if any.
    pub checkpoint: Option<String>,
    /// Where the active set came from.
    pub source: ResolutionSource,
    /// Classes the redaction stage deletes.
    pub remove_classes: Vec<String>,
    /// Source patterns the host compiler should skip.
    pub source_excludes: Vec<String>,
    /// Opportunistic classes the checkpoint permits.
    pub opportunistic_classes: Vec<String>,
    /// Classpath additions.
    pub dependencies: DependencyPlan,
}

/// Resolves the active segments without touching the output tree.
pub fn describe(ctx: &BuildContext) -> SpliceResult<ResolveResult> {
    let resolved = ctx.resolve()?;
    let remove_classes = resolved.remove_classes();
    let allowed = resolved
        .checkpoint()
        .and_then(|c| c.opportunistic_compile_classes());
    Ok(ResolveResult {
        segments: resolved.segment_names(),
        checkpoint: resolved.checkpoint().map(|c| c.name().to_string()),
        source: resolved.source(),
        source_excludes: source_excludes(&ctx.project().excluded_src_path, &remove_classes),
        remove_classes,
        opportunistic_classes: opportunistic_classes(
            &ctx.project().opportunistic_compile,
            allowed,
        ),
        dependencies: DependencyPlan::from_segments(resolved.segments(), &ctx.provided_dir()),
    })
}

/// Runs the resolve command.
pub fn run(args: &ProjectArgs) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = args.context()?;
    let result = describe(&ctx)?;

    if args.json() {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("Segments:   {}", result.segments.join(", "));
        println!(
            "Checkpoint: {}",
            result.checkpoint.as_deref().unwrap_or("-")
        );
        println!("Source:     {:?}", result.source);
        println!();
        print_list("Remove", &result.remove_classes);
        print_list("Source excludes", &result.source_excludes);
        print_list("Opportunistic", &result.opportunistic_classes);
        print_list("Jars", &display_paths(&result.dependencies.jars));
        print_list("Aars", &result.dependencies.aars);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use splice_core::{BuildConfig, CallbackRegistry, ProjectConfig};
    use std::path::{Path, PathBuf};

    const PROJECT: &str = r#"
excludedSrcPath: edu/example
opportunisticCompile:
  classes: [Extra1, Extra2]
segments:
  - name: seg1
    addJars: [solutions]
    removeClasses: [Secret]
  - name: seg2
    addAars: [support]
    removeClasses: [Hidden]
checkpoints:
  - name: mid
    segments: [seg1]
    opportunisticCompileClasses: [Extra1]
"#;

    fn context(build: BuildConfig) -> BuildContext {
        let project = ProjectConfig::from_yaml_str(PROJECT).unwrap();
        BuildContext::new(project, build, CallbackRegistry::new())
    }

    #[test]
    fn checkpoint_override_limits_opportunistic_classes() {
        let ctx = context(BuildConfig::new("/p", "/p/classes").checkpoint("mid"));
        let result = describe(&ctx).unwrap();
        assert_eq!(result.segments, vec!["seg1"]);
        assert_eq!(result.checkpoint.as_deref(), Some("mid"));
        assert_eq!(result.source, ResolutionSource::CheckpointOverride);
        assert_eq!(result.remove_classes, vec!["Secret"]);
        assert_eq!(result.source_excludes, vec!["edu/example/Secret.*"]);
        assert_eq!(result.opportunistic_classes, vec!["Extra1"]);
        assert_eq!(
            result.dependencies.jars,
            vec![PathBuf::from("/p/provided/solutions.jar")]
        );
    }

    #[test]
    fn replace_lists_every_named_segment() {
        let ctx = context(BuildConfig::new(Path::new("/p"), "/p/classes").replace("seg2,seg1"));
        let result = describe(&ctx).unwrap();
        assert_eq!(result.segments, vec!["seg1", "seg2"]);
        assert!(result.checkpoint.is_none());
        assert_eq!(result.remove_classes, vec!["Secret", "Hidden"]);
        assert_eq!(result.opportunistic_classes, vec!["Extra1", "Extra2"]);
        assert_eq!(result.dependencies.aars, vec!["support"]);
    }

    #[test]
    fn unknown_segment_is_reported() {
        let ctx = context(BuildConfig::new("/p", "/p/classes").replace("nope"));
        assert!(describe(&ctx).unwrap_err().is_configuration());
    }
}
