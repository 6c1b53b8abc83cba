//! Ordered execution of the transformation stages.

use crate::chimera::{chimerize, MergedClass};
use crate::context::BuildContext;
use crate::deps::DependencyPlan;
use crate::error::SpliceResult;
use crate::manifest::edit_manifest;
use crate::redact::{prune_opportunistic, redact};
use crate::resolve::{ResolutionSource, ResolvedConfiguration};
use crate::weave::{weave, WovenMethod};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

/// What a pipeline run did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineReport {
    /// Active segment names.
    pub segments: Vec<String>,
    /// Selected checkpoint, if any.
    pub checkpoint: Option<String>,
    /// Where the active set came from.
    pub source: ResolutionSource,
    /// Class files deleted by redaction, including nested chimera classes.
    pub removed: Vec<PathBuf>,
    /// Class files deleted by opportunistic pruning.
    pub pruned: Vec<PathBuf>,
    /// Methods that received hook calls.
    pub woven: Vec<WovenMethod>,
    /// Merged chimera classes.
    pub merged: Vec<MergedClass>,
    /// Auxiliary classes copied from provided archives.
    pub copied: Vec<PathBuf>,
    /// Number of manifests rewritten.
    pub manifests_edited: usize,
    /// Classpath additions for the host build tool.
    pub dependencies: DependencyPlan,
}

impl PipelineReport {
    fn new(ctx: &BuildContext, resolved: &ResolvedConfiguration) -> Self {
        Self {
            segments: resolved.segment_names(),
            checkpoint: resolved.checkpoint().map(|c| c.name().to_string()),
            source: resolved.source(),
            removed: Vec::new(),
            pruned: Vec::new(),
            woven: Vec::new(),
            merged: Vec::new(),
            copied: Vec::new(),
            manifests_edited: 0,
            dependencies: DependencyPlan::from_segments(resolved.segments(), &ctx.provided_dir()),
        }
    }
}

/// Runs the stages against one build context.
///
/// Stages run in order: resolve, redact, prune, weave, chimerize, edit
/// manifest. The first failure aborts the rest; output already written is
/// left for the host's clean rebuild.
#[derive(Debug)]
pub struct Pipeline<'a> {
    ctx: &'a BuildContext,
}

impl<'a> Pipeline<'a> {
    /// Creates a pipeline over `ctx`.
    pub fn new(ctx: &'a BuildContext) -> Self {
        Self { ctx }
    }

    /// Runs every stage.
    pub fn run(&self) -> SpliceResult<PipelineReport> {
        let resolved = self.ctx.resolve()?;
        let mut report = PipelineReport::new(self.ctx, resolved);
        info!(
            segments = ?report.segments,
            checkpoint = ?report.checkpoint,
            "running splice pipeline"
        );

        self.redact_stage(resolved, &mut report)?;
        self.weave_stage(resolved, &mut report)?;
        self.chimera_stage(resolved, &mut report)?;
        self.manifest_stage(resolved, &mut report)?;
        Ok(report)
    }

    /// Runs only redaction and opportunistic pruning.
    pub fn redact_only(&self) -> SpliceResult<PipelineReport> {
        let resolved = self.ctx.resolve()?;
        let mut report = PipelineReport::new(self.ctx, resolved);
        self.redact_stage(resolved, &mut report)?;
        Ok(report)
    }

    fn redact_stage(
        &self,
        resolved: &ResolvedConfiguration,
        report: &mut PipelineReport,
    ) -> SpliceResult<()> {
        let tree = self.ctx.tree();
        report.removed = redact(&tree, &resolved.remove_classes())?;
        info!(removed = report.removed.len(), "redaction finished");

        let allowed = resolved
            .checkpoint()
            .and_then(|c| c.opportunistic_compile_classes());
        report.pruned = prune_opportunistic(&tree, &self.ctx.project().opportunistic_compile, allowed)?;
        if !report.pruned.is_empty() {
            info!(pruned = report.pruned.len(), "pruned opportunistic classes");
        }
        Ok(())
    }

    fn weave_stage(
        &self,
        resolved: &ResolvedConfiguration,
        report: &mut PipelineReport,
    ) -> SpliceResult<()> {
        let injectors = resolved.injectors();
        if injectors.is_empty() {
            return Ok(());
        }
        report.woven = weave(&self.ctx.tree(), &injectors, &resolved.remove_classes())?;
        info!(methods = report.woven.len(), "weaving finished");
        Ok(())
    }

    fn chimera_stage(
        &self,
        resolved: &ResolvedConfiguration,
        report: &mut PipelineReport,
    ) -> SpliceResult<()> {
        let chimeras = resolved.chimeras();
        if chimeras.is_empty() {
            return Ok(());
        }
        let outcome = chimerize(
            &self.ctx.tree(),
            &self.ctx.provided_dir(),
            &chimeras,
            self.ctx.registry(),
        )?;
        report.removed.extend(outcome.deleted_nested);
        report.merged = outcome.merged;
        report.copied = outcome.copied;
        info!(
            merged = report.merged.len(),
            copied = report.copied.len(),
            "chimerization finished"
        );
        Ok(())
    }

    fn manifest_stage(
        &self,
        resolved: &ResolvedConfiguration,
        report: &mut PipelineReport,
    ) -> SpliceResult<()> {
        report.manifests_edited = edit_manifest(
            self.ctx.build().manifest_dir.as_deref(),
            &resolved.manifest_editors(),
            self.ctx.registry(),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::CallbackRegistry;
    use crate::config::{BuildConfig, ProjectConfig};
    use crate::segment::Segment;
    use std::fs;

    #[test]
    fn empty_selection_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let classes = dir.path().join("classes");
        fs::create_dir_all(&classes).unwrap();
        fs::write(classes.join("Secret.class"), b"\xCA\xFE\xBA\xBE").unwrap();

        let project =
            ProjectConfig::new().segment(Segment::builder("seg1").remove_class("Secret").build());
        let build = BuildConfig::new(dir.path(), &classes).replace("");
        let ctx = BuildContext::new(project, build, CallbackRegistry::new());

        let report = Pipeline::new(&ctx).run().unwrap();
        assert!(report.segments.is_empty());
        assert_eq!(report.source, ResolutionSource::Override);
        assert!(report.removed.is_empty());
        assert!(classes.join("Secret.class").exists());
    }

    #[test]
    fn redact_only_skips_later_stages() {
        let dir = tempfile::tempdir().unwrap();
        let classes = dir.path().join("classes");
        fs::create_dir_all(&classes).unwrap();
        fs::write(classes.join("Secret.class"), b"\xCA\xFE\xBA\xBE").unwrap();

        let project = ProjectConfig::new().segment(
            Segment::builder("seg1")
                .remove_class("Secret")
                .chimera("missing.jar", "Solver", "solve")
                .build(),
        );
        let build = BuildConfig::new(dir.path(), &classes).replace("seg1");
        let ctx = BuildContext::new(project, build, CallbackRegistry::new());

        let report = Pipeline::new(&ctx).redact_only().unwrap();
        assert_eq!(report.removed, vec![classes.join("Secret.class")]);
        assert!(report.merged.is_empty());
    }
}
