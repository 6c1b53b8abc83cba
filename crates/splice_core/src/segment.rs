//! Segment and checkpoint model.
//!
//! A segment is a named bundle of directives that is switched on or off as
//! a unit. Checkpoints group segments into course milestones.

use crate::callbacks::CallbackRef;
use serde::Serialize;

/// Name of the checkpoint that always exists and selects nothing.
pub const NONE_CHECKPOINT: &str = "none";

/// Default hook method called by woven code.
pub const DEFAULT_HOOK_METHOD: &str = "inject";

/// Default manifest editor method.
pub const DEFAULT_EDITOR_METHOD: &str = "editManifest";

/// Normalises a configured class name to internal form (`a.b.C` -> `a/b/C`).
pub fn normalize_class_name(name: &str) -> String {
    name.trim().trim_end_matches(".class").replace('.', "/")
}

/// An external artifact added to the student's compile classpath.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "name", rename_all = "lowercase")]
pub enum Dependency {
    /// A jar under the provided directory, by base name.
    Jar(String),
    /// An Android archive reference.
    Aar(String),
}

/// Weaves a hook call into every normal exit of one method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Injector {
    /// Internal name of the class to rewrite.
    pub target_class: String,
    /// Name of the method to rewrite.
    pub target_method: String,
    /// Internal name of the class holding the hook.
    pub hook_class: String,
    /// Name of the static hook method.
    pub hook_method: String,
}

/// Merges a provided class with the student's class of the same name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chimera {
    /// Archive file name under the provided directory.
    pub provided_archive: String,
    /// Internal name of the class to merge.
    pub target_class: String,
    /// Method taken from the student's class.
    pub keep_method: String,
    /// Optional camouflage provider.
    pub camouflage: Option<CallbackRef>,
}

/// A named bundle of directives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Segment {
    name: String,
    dependencies: Vec<Dependency>,
    remove_classes: Vec<String>,
    injectors: Vec<Injector>,
    chimeras: Vec<Chimera>,
    manifest_editors: Vec<CallbackRef>,
}

impl Segment {
    /// Starts building a segment.
    pub fn builder(name: impl Into<String>) -> SegmentBuilder {
        SegmentBuilder {
            segment: Segment {
                name: name.into(),
                dependencies: Vec::new(),
                remove_classes: Vec::new(),
                injectors: Vec::new(),
                chimeras: Vec::new(),
                manifest_editors: Vec::new(),
            },
        }
    }

    /// Unique segment name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// External artifacts this segment adds.
    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    /// Classes this segment deletes.
    pub fn remove_classes(&self) -> &[String] {
        &self.remove_classes
    }

    /// Method instrumentation directives.
    pub fn injectors(&self) -> &[Injector] {
        &self.injectors
    }

    /// Class merge directives.
    pub fn chimeras(&self) -> &[Chimera] {
        &self.chimeras
    }

    /// Manifest editors, in application order.
    pub fn manifest_editors(&self) -> &[CallbackRef] {
        &self.manifest_editors
    }
}

/// Builder for [`Segment`].
#[derive(Debug, Clone)]
pub struct SegmentBuilder {
    segment: Segment,
}

impl SegmentBuilder {
    /// Adds a provided jar to the compile classpath.
    #[must_use]
    pub fn add_jar(mut self, name: impl Into<String>) -> Self {
        push_unique(&mut self.segment.dependencies, Dependency::Jar(name.into()));
        self
    }

    /// Adds an Android archive to the compile classpath.
    #[must_use]
    pub fn add_aar(mut self, name: impl Into<String>) -> Self {
        push_unique(&mut self.segment.dependencies, Dependency::Aar(name.into()));
        self
    }

    /// Deletes a class and its nested classes from the output.
    #[must_use]
    pub fn remove_class(mut self, class: &str) -> Self {
        push_unique(&mut self.segment.remove_classes, normalize_class_name(class));
        self
    }

    /// Weaves `hook_class.inject(this)` into `target_class.target_method`.
    #[must_use]
    pub fn injector(self, target_class: &str, target_method: &str, hook_class: &str) -> Self {
        self.injector_with_method(target_class, target_method, hook_class, DEFAULT_HOOK_METHOD)
    }

    /// Weaves `hook_class.hook_method(this)` into `target_class.target_method`.
    #[must_use]
    pub fn injector_with_method(
        mut self,
        target_class: &str,
        target_method: &str,
        hook_class: &str,
        hook_method: &str,
    ) -> Self {
        self.segment.injectors.push(Injector {
            target_class: normalize_class_name(target_class),
            target_method: target_method.to_string(),
            hook_class: normalize_class_name(hook_class),
            hook_method: hook_method.to_string(),
        });
        self
    }

    /// Merges `target_class` with its provided version, keeping `keep_method`.
    #[must_use]
    pub fn chimera(mut self, provided_archive: &str, target_class: &str, keep_method: &str) -> Self {
        self.segment.chimeras.push(Chimera {
            provided_archive: provided_archive.to_string(),
            target_class: normalize_class_name(target_class),
            keep_method: keep_method.to_string(),
            camouflage: None,
        });
        self
    }

    /// Like [`chimera`](Self::chimera), embedding fields from a camouflage provider.
    #[must_use]
    pub fn chimera_with_camouflage(
        mut self,
        provided_archive: &str,
        target_class: &str,
        keep_method: &str,
        camouflage: CallbackRef,
    ) -> Self {
        self.segment.chimeras.push(Chimera {
            provided_archive: provided_archive.to_string(),
            target_class: normalize_class_name(target_class),
            keep_method: keep_method.to_string(),
            camouflage: Some(camouflage),
        });
        self
    }

    /// Applies `archive:class.editManifest` to the manifest.
    #[must_use]
    pub fn manifest_editor(self, archive: &str, class: &str) -> Self {
        self.manifest_editor_with_method(archive, class, DEFAULT_EDITOR_METHOD)
    }

    /// Applies `archive:class.method` to the manifest.
    #[must_use]
    pub fn manifest_editor_with_method(mut self, archive: &str, class: &str, method: &str) -> Self {
        push_unique(
            &mut self.segment.manifest_editors,
            CallbackRef::new(archive, class, method),
        );
        self
    }

    /// Finishes the segment.
    pub fn build(self) -> Segment {
        self.segment
    }
}

/// A named milestone selecting a set of segments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Checkpoint {
    name: String,
    segments: Vec<String>,
    opportunistic_compile_classes: Option<Vec<String>>,
}

impl Checkpoint {
    /// Creates an empty checkpoint.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            segments: Vec::new(),
            opportunistic_compile_classes: None,
        }
    }

    /// The checkpoint that selects no segments.
    pub fn none() -> Self {
        Self::new(NONE_CHECKPOINT)
    }

    /// Adds a member segment.
    #[must_use]
    pub fn segment(mut self, name: impl Into<String>) -> Self {
        push_unique(&mut self.segments, name.into());
        self
    }

    /// Adds several member segments.
    #[must_use]
    pub fn segments<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            push_unique(&mut self.segments, name.into());
        }
        self
    }

    /// Limits opportunistic compilation to the given class stems.
    #[must_use]
    pub fn limit_opportunistic_compile<I, S>(mut self, classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut allowed = Vec::new();
        for class in classes {
            push_unique(&mut allowed, normalize_class_name(class.as_ref()));
        }
        self.opportunistic_compile_classes = Some(allowed);
        self
    }

    /// Unique checkpoint name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Member segment names.
    pub fn segment_names(&self) -> &[String] {
        &self.segments
    }

    /// Opportunistic allow-list, if limited.
    pub fn opportunistic_compile_classes(&self) -> Option<&[String]> {
        self.opportunistic_compile_classes.as_deref()
    }
}

fn push_unique<T: PartialEq>(items: &mut Vec<T>, item: T) {
    if !items.contains(&item) {
        items.push(item);
    }
}
