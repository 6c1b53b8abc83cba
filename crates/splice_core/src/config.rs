//! Project and build configuration.

use crate::callbacks::CallbackRef;
use crate::error::{SpliceError, SpliceResult};
use crate::segment::{normalize_class_name, Checkpoint, Segment, DEFAULT_EDITOR_METHOD, DEFAULT_HOOK_METHOD};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Default project file name, relative to the project root.
pub const DEFAULT_PROJECT_FILE: &str = "splice.yaml";

/// Default student file, relative to the project root.
pub const DEFAULT_STUDENT_CONFIG: &str = "config/splice.yaml";

/// Default provided-archive directory, relative to the project root.
pub const DEFAULT_PROVIDED_DIR: &str = "provided";

/// The instructor's declaration of segments and checkpoints.
#[derive(Debug, Clone)]
pub struct ProjectConfig {
    /// Class-path scope of affected files (`""` is the whole output root).
    pub excluded_src_path: String,

    /// Whether active segments may direct the same edit at one class.
    pub allow_arbitrary_segment_combination: bool,

    /// Student file, relative to the project root.
    pub student_config: PathBuf,

    /// Provided-archive directory, relative to the project root.
    pub provided_dir: PathBuf,

    /// Universe of opportunistically compiled class stems.
    pub opportunistic_compile: Vec<String>,

    segments: Vec<Segment>,
    checkpoints: Vec<Checkpoint>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            excluded_src_path: String::new(),
            allow_arbitrary_segment_combination: false,
            student_config: PathBuf::from(DEFAULT_STUDENT_CONFIG),
            provided_dir: PathBuf::from(DEFAULT_PROVIDED_DIR),
            opportunistic_compile: Vec::new(),
            segments: Vec::new(),
            checkpoints: vec![Checkpoint::none()],
        }
    }
}

impl ProjectConfig {
    /// Creates an empty project with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the affected class-path scope.
    #[must_use]
    pub fn excluded_src_path(mut self, scope: &str) -> Self {
        self.excluded_src_path = normalize_class_name(scope).trim_matches('/').to_string();
        self
    }

    /// Sets whether conflicting directives are tolerated.
    #[must_use]
    pub fn allow_arbitrary_segment_combination(mut self, value: bool) -> Self {
        self.allow_arbitrary_segment_combination = value;
        self
    }

    /// Sets the student file path.
    #[must_use]
    pub fn student_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.student_config = path.into();
        self
    }

    /// Sets the provided-archive directory.
    #[must_use]
    pub fn provided_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.provided_dir = path.into();
        self
    }

    /// Declares the opportunistic compile universe.
    #[must_use]
    pub fn opportunistic_compile<I, S>(mut self, classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for class in classes {
            let class = normalize_class_name(class.as_ref());
            if !self.opportunistic_compile.contains(&class) {
                self.opportunistic_compile.push(class);
            }
        }
        self
    }

    /// Declares a segment.
    #[must_use]
    pub fn segment(mut self, segment: Segment) -> Self {
        self.segments.push(segment);
        self
    }

    /// Declares a checkpoint.
    #[must_use]
    pub fn checkpoint(mut self, checkpoint: Checkpoint) -> Self {
        self.checkpoints.push(checkpoint);
        self
    }

    /// Segments in declaration order.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Checkpoints in declaration order, starting with `none`.
    pub fn checkpoints(&self) -> &[Checkpoint] {
        &self.checkpoints
    }

    /// Finds a segment by name.
    pub fn find_segment(&self, name: &str) -> Option<&Segment> {
        self.segments.iter().find(|s| s.name() == name)
    }

    /// Finds a checkpoint by name.
    pub fn find_checkpoint(&self, name: &str) -> Option<&Checkpoint> {
        self.checkpoints.iter().find(|c| c.name() == name)
    }

    /// Checks names are unique and checkpoints only name declared segments.
    pub fn validate(&self) -> SpliceResult<()> {
        let mut seen = HashSet::new();
        for segment in &self.segments {
            if segment.name().trim().is_empty() {
                return Err(SpliceError::configuration("segment name must not be empty"));
            }
            if !seen.insert(segment.name()) {
                return Err(SpliceError::configuration(format!(
                    "segment {} is declared twice",
                    segment.name()
                )));
            }
        }

        let mut seen = HashSet::new();
        for checkpoint in &self.checkpoints {
            if !seen.insert(checkpoint.name()) {
                return Err(SpliceError::configuration(format!(
                    "checkpoint {} is declared twice",
                    checkpoint.name()
                )));
            }
            for name in checkpoint.segment_names() {
                if self.find_segment(name).is_none() {
                    return Err(SpliceError::unknown_segment(name.clone()));
                }
            }
        }
        Ok(())
    }

    /// Parses a YAML project file.
    pub fn from_yaml_str(text: &str) -> SpliceResult<Self> {
        let file: ProjectFile = serde_yaml::from_str(text)
            .map_err(|e| SpliceError::configuration(format!("invalid project file: {e}")))?;
        let config = file.into_config();
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a YAML project file.
    pub fn load(path: &Path) -> SpliceResult<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            SpliceError::configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&text)
    }
}

/// Per-invocation overrides that bypass the student file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    /// Comma-separated segment list.
    pub replace: Option<String>,
    /// Checkpoint name.
    pub checkpoint: Option<String>,
}

/// Paths and overrides for one build invocation.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Project root; relative project paths resolve against it.
    pub project_root: PathBuf,

    /// Root of the freshly compiled class files.
    pub classes_dir: PathBuf,

    /// Directory holding `AndroidManifest.xml`, if any.
    pub manifest_dir: Option<PathBuf>,

    /// Resolution overrides.
    pub overrides: Overrides,
}

impl BuildConfig {
    /// Creates a build configuration without overrides.
    #[must_use]
    pub fn new(project_root: impl Into<PathBuf>, classes_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            classes_dir: classes_dir.into(),
            manifest_dir: None,
            overrides: Overrides::default(),
        }
    }

    /// Sets the manifest directory.
    #[must_use]
    pub fn manifest_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.manifest_dir = Some(dir.into());
        self
    }

    /// Selects exactly the listed segments.
    #[must_use]
    pub fn replace(mut self, segments: impl Into<String>) -> Self {
        self.overrides.replace = Some(segments.into());
        self
    }

    /// Selects a checkpoint.
    #[must_use]
    pub fn checkpoint(mut self, name: impl Into<String>) -> Self {
        self.overrides.checkpoint = Some(name.into());
        self
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ProjectFile {
    #[serde(default)]
    excluded_src_path: String,
    #[serde(default)]
    allow_arbitrary_segment_combination: bool,
    student_config: Option<PathBuf>,
    provided_dir: Option<PathBuf>,
    opportunistic_compile: Option<OpportunisticFile>,
    #[serde(default)]
    segments: Vec<SegmentFile>,
    #[serde(default)]
    checkpoints: Vec<CheckpointFile>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct OpportunisticFile {
    #[serde(default)]
    classes: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct CheckpointFile {
    name: String,
    #[serde(default)]
    segments: Vec<String>,
    opportunistic_compile_classes: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct SegmentFile {
    name: String,
    #[serde(default)]
    add_jars: Vec<String>,
    #[serde(default)]
    add_aars: Vec<String>,
    #[serde(default)]
    remove_classes: Vec<String>,
    #[serde(default)]
    injectors: Vec<InjectorFile>,
    #[serde(default)]
    chimeras: Vec<ChimeraFile>,
    #[serde(default)]
    manifest_editors: Vec<CallbackFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct InjectorFile {
    target_class: String,
    target_method: String,
    hook_class: String,
    hook_method: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ChimeraFile {
    jar: String,
    target_class: String,
    keep_method: String,
    camouflage: Option<CamouflageFile>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CamouflageFile {
    file: String,
    class: String,
    method: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CallbackFile {
    file: String,
    class: String,
    method: Option<String>,
}

impl CallbackFile {
    fn into_ref(self, default_method: &str) -> CallbackRef {
        let method = self.method.unwrap_or_else(|| default_method.to_string());
        CallbackRef::new(self.file, self.class, method)
    }
}

impl ProjectFile {
    fn into_config(self) -> ProjectConfig {
        let mut config = ProjectConfig::new()
            .excluded_src_path(&self.excluded_src_path)
            .allow_arbitrary_segment_combination(self.allow_arbitrary_segment_combination);
        if let Some(path) = self.student_config {
            config = config.student_config(path);
        }
        if let Some(path) = self.provided_dir {
            config = config.provided_dir(path);
        }
        if let Some(opportunistic) = self.opportunistic_compile {
            config = config.opportunistic_compile(opportunistic.classes);
        }

        for file in self.segments {
            let mut builder = Segment::builder(file.name);
            for jar in file.add_jars {
                builder = builder.add_jar(jar);
            }
            for aar in file.add_aars {
                builder = builder.add_aar(aar);
            }
            for class in &file.remove_classes {
                builder = builder.remove_class(class);
            }
            for injector in file.injectors {
                let hook_method = injector.hook_method.as_deref().unwrap_or(DEFAULT_HOOK_METHOD);
                builder = builder.injector_with_method(
                    &injector.target_class,
                    &injector.target_method,
                    &injector.hook_class,
                    hook_method,
                );
            }
            for chimera in file.chimeras {
                builder = match chimera.camouflage {
                    Some(camouflage) => builder.chimera_with_camouflage(
                        &chimera.jar,
                        &chimera.target_class,
                        &chimera.keep_method,
                        CallbackRef::new(camouflage.file, camouflage.class, camouflage.method),
                    ),
                    None => builder.chimera(&chimera.jar, &chimera.target_class, &chimera.keep_method),
                };
            }
            for editor in file.manifest_editors {
                let editor = editor.into_ref(DEFAULT_EDITOR_METHOD);
                builder = builder.manifest_editor_with_method(&editor.archive, &editor.class, &editor.method);
            }
            config = config.segment(builder.build());
        }

        for file in self.checkpoints {
            let mut checkpoint = Checkpoint::new(file.name).segments(file.segments);
            if let Some(classes) = file.opportunistic_compile_classes {
                checkpoint = checkpoint.limit_opportunistic_compile(classes);
            }
            config = config.checkpoint(checkpoint);
        }
        config
    }
}
