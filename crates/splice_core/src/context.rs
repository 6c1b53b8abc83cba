//! Per-invocation build context.

use crate::callbacks::CallbackRegistry;
use crate::config::{BuildConfig, ProjectConfig};
use crate::error::{SpliceError, SpliceResult};
use crate::resolve::{resolve, ResolvedConfiguration};
use crate::student::StudentConfig;
use crate::tree::ClassTree;
use std::cell::{Cell, OnceCell};
use std::path::PathBuf;

/// Everything one build invocation needs, owned in one place.
///
/// The resolved configuration is computed on first use and reused for the
/// rest of the invocation; the student file is read at most once, and a
/// failed resolution fails every later call the same way.
#[derive(Debug)]
pub struct BuildContext {
    project: ProjectConfig,
    build: BuildConfig,
    registry: CallbackRegistry,
    resolved: OnceCell<Result<ResolvedConfiguration, SpliceError>>,
    student_reads: Cell<usize>,
}

impl BuildContext {
    /// Creates a context.
    pub fn new(project: ProjectConfig, build: BuildConfig, registry: CallbackRegistry) -> Self {
        Self {
            project,
            build,
            registry,
            resolved: OnceCell::new(),
            student_reads: Cell::new(0),
        }
    }

    /// The project declaration.
    pub fn project(&self) -> &ProjectConfig {
        &self.project
    }

    /// The invocation paths and overrides.
    pub fn build(&self) -> &BuildConfig {
        &self.build
    }

    /// The callback registry.
    pub fn registry(&self) -> &CallbackRegistry {
        &self.registry
    }

    /// Resolves the active segments, once.
    ///
    /// The outcome is cached either way: after a failure, later calls
    /// return the same error without reading the student file again.
    pub fn resolve(&self) -> SpliceResult<&ResolvedConfiguration> {
        let outcome = self.resolved.get_or_init(|| {
            let path = self.student_config_path();
            resolve(&self.project, &self.build.overrides, || {
                self.student_reads.set(self.student_reads.get() + 1);
                StudentConfig::load(&path)
            })
        });
        outcome.as_ref().map_err(SpliceError::replay)
    }

    /// Number of times the student file has been read.
    pub fn student_file_reads(&self) -> usize {
        self.student_reads.get()
    }

    /// The affected part of the class output root.
    pub fn tree(&self) -> ClassTree {
        ClassTree::new(&self.build.classes_dir, &self.project.excluded_src_path)
    }

    /// Absolute provided-archive directory.
    pub fn provided_dir(&self) -> PathBuf {
        self.build.project_root.join(&self.project.provided_dir)
    }

    /// Absolute student file path.
    pub fn student_config_path(&self) -> PathBuf {
        self.build.project_root.join(&self.project.student_config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::{Checkpoint, Segment};
    use std::fs;

    fn context(root: &std::path::Path) -> BuildContext {
        let project = ProjectConfig::new()
            .segment(Segment::builder("seg1").remove_class("Secret").build())
            .checkpoint(Checkpoint::new("mid").segment("seg1"));
        let build = BuildConfig::new(root, root.join("classes"));
        BuildContext::new(project, build, CallbackRegistry::new())
    }

    #[test]
    fn resolution_is_memoised() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("config")).unwrap();
        fs::write(
            dir.path().join("config/splice.yaml"),
            "useProvided: true\ncheckpoint: mid\n",
        )
        .unwrap();

        let ctx = context(dir.path());
        let first = ctx.resolve().unwrap().segment_names();
        fs::remove_file(dir.path().join("config/splice.yaml")).unwrap();
        let second = ctx.resolve().unwrap().segment_names();
        assert_eq!(first, vec!["seg1"]);
        assert_eq!(first, second);
        assert_eq!(ctx.student_file_reads(), 1);
    }

    #[test]
    fn missing_student_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        assert!(ctx.resolve().unwrap_err().is_configuration());
        assert_eq!(ctx.student_file_reads(), 1);
    }

    #[test]
    fn failed_resolution_is_memoised() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        let first = ctx.resolve().unwrap_err();

        // a student file appearing later does not change this invocation
        fs::create_dir_all(dir.path().join("config")).unwrap();
        fs::write(
            dir.path().join("config/splice.yaml"),
            "useProvided: true\ncheckpoint: mid\n",
        )
        .unwrap();
        let second = ctx.resolve().unwrap_err();
        assert!(second.is_configuration());
        assert_eq!(first.to_string(), second.to_string());
        assert_eq!(ctx.student_file_reads(), 1);
    }

    #[test]
    fn paths_resolve_against_project_root() {
        let ctx = context(std::path::Path::new("/project"));
        assert_eq!(ctx.provided_dir(), PathBuf::from("/project/provided"));
        assert_eq!(
            ctx.student_config_path(),
            PathBuf::from("/project/config/splice.yaml")
        );
        assert_eq!(ctx.tree().root(), std::path::Path::new("/project/classes"));
    }
}
