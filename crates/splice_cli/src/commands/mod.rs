//! CLI command implementations.

pub mod inspect;
pub mod redact;
pub mod resolve;
pub mod run;

use clap::Args;
use splice_core::{
    BuildConfig, BuildContext, CallbackRegistry, Overrides, ProjectConfig, DEFAULT_PROJECT_FILE,
};
use std::path::PathBuf;
use tracing::debug;

/// Options shared by every command that works on a project.
#[derive(Debug, Clone, Args)]
pub struct ProjectArgs {
    /// Project root directory
    #[arg(short, long, default_value = ".")]
    pub project: PathBuf,

    /// Compiled class output root (defaults to <project>/build/classes)
    #[arg(long)]
    pub classes: Option<PathBuf>,

    /// Directory holding the merged AndroidManifest.xml
    #[arg(long)]
    pub manifest_dir: Option<PathBuf>,

    /// Comma-separated segment list, bypasses the student file
    #[arg(long, env = "SPLICE_REPLACE")]
    pub replace: Option<String>,

    /// Checkpoint name, bypasses the student file
    #[arg(long, env = "SPLICE_CHECKPOINT")]
    pub checkpoint: Option<String>,

    /// Project file, relative to the project root
    #[arg(short, long, default_value = DEFAULT_PROJECT_FILE)]
    pub config: PathBuf,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    pub format: String,
}

impl ProjectArgs {
    /// Builds the per-invocation configuration.
    pub fn build_config(&self) -> BuildConfig {
        let classes = self
            .classes
            .clone()
            .unwrap_or_else(|| self.project.join("build").join("classes"));
        let mut build = BuildConfig::new(&self.project, classes);
        build.manifest_dir = self.manifest_dir.clone();
        build.overrides = Overrides {
            replace: self.replace.clone(),
            checkpoint: self.checkpoint.clone(),
        };
        build
    }

    /// Loads the project file and assembles a build context.
    pub fn context(&self) -> Result<BuildContext, Box<dyn std::error::Error>> {
        let path = self.project.join(&self.config);
        debug!(path = %path.display(), "loading project file");
        let project = ProjectConfig::load(&path)?;
        Ok(BuildContext::new(
            project,
            self.build_config(),
            CallbackRegistry::with_builtins(),
        ))
    }

    /// Whether JSON output was requested.
    pub fn json(&self) -> bool {
        self.format == "json"
    }
}

fn print_list(title: &str, items: &[String]) {
    println!("{title}: {}", items.len());
    for item in items {
        println!("  {item}");
    }
}

fn display_paths(paths: &[PathBuf]) -> Vec<String> {
    paths.iter().map(|p| p.display().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn args(project: &Path) -> ProjectArgs {
        ProjectArgs {
            project: project.to_path_buf(),
            classes: None,
            manifest_dir: None,
            replace: None,
            checkpoint: None,
            config: PathBuf::from(DEFAULT_PROJECT_FILE),
            format: "text".into(),
        }
    }

    #[test]
    fn classes_default_under_project() {
        let build = args(Path::new("/work/app")).build_config();
        assert_eq!(build.classes_dir, PathBuf::from("/work/app/build/classes"));
        assert!(build.manifest_dir.is_none());
        assert_eq!(build.overrides, Overrides::default());
    }

    #[test]
    fn overrides_are_forwarded() {
        let mut args = args(Path::new("/work/app"));
        args.replace = Some("seg1,seg2".into());
        args.checkpoint = Some("mid".into());
        args.classes = Some(PathBuf::from("/out"));
        let build = args.build_config();
        assert_eq!(build.classes_dir, PathBuf::from("/out"));
        assert_eq!(build.overrides.replace.as_deref(), Some("seg1,seg2"));
        assert_eq!(build.overrides.checkpoint.as_deref(), Some("mid"));
    }

    #[test]
    fn missing_project_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(args(dir.path()).context().is_err());
    }
}
