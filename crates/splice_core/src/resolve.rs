//! Active-segment resolution.
//!
//! Exactly one source decides which segments are active, in priority
//! order: an explicit segment list, an explicit checkpoint, then the
//! student file. Sources are never merged.

use crate::callbacks::CallbackRef;
use crate::config::{Overrides, ProjectConfig};
use crate::error::{SpliceError, SpliceResult};
use crate::segment::{Chimera, Checkpoint, Injector, Segment};
use crate::student::StudentConfig;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Where the active segment set came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    /// Explicit comma-separated segment list.
    Override,
    /// Explicit checkpoint name.
    CheckpointOverride,
    /// The student's declarative file.
    StudentFile,
}

/// The active segments for one build invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfiguration {
    segments: Vec<Segment>,
    checkpoint: Option<Checkpoint>,
    source: ResolutionSource,
}

impl ResolvedConfiguration {
    /// Active segments in order.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// The selected checkpoint, if any.
    pub fn checkpoint(&self) -> Option<&Checkpoint> {
        self.checkpoint.as_ref()
    }

    /// Which source decided the active set.
    pub fn source(&self) -> ResolutionSource {
        self.source
    }

    /// Names of the active segments.
    pub fn segment_names(&self) -> Vec<String> {
        self.segments.iter().map(|s| s.name().to_string()).collect()
    }

    /// Union of removed classes, first occurrence order.
    pub fn remove_classes(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.segments
            .iter()
            .flat_map(|s| s.remove_classes())
            .filter(|c| seen.insert(c.as_str()))
            .cloned()
            .collect()
    }

    /// All injectors, in segment order.
    pub fn injectors(&self) -> Vec<Injector> {
        self.segments.iter().flat_map(|s| s.injectors()).cloned().collect()
    }

    /// All chimera directives, in segment order.
    pub fn chimeras(&self) -> Vec<Chimera> {
        self.segments.iter().flat_map(|s| s.chimeras()).cloned().collect()
    }

    /// All manifest editors, in segment order.
    pub fn manifest_editors(&self) -> Vec<CallbackRef> {
        self.segments
            .iter()
            .flat_map(|s| s.manifest_editors())
            .cloned()
            .collect()
    }
}

/// Resolves the active segments.
///
/// `load_student` is only called when neither override is present.
pub fn resolve<F>(
    project: &ProjectConfig,
    overrides: &Overrides,
    load_student: F,
) -> SpliceResult<ResolvedConfiguration>
where
    F: FnOnce() -> SpliceResult<StudentConfig>,
{
    let resolved = if let Some(replace) = &overrides.replace {
        from_replace(project, replace)?
    } else if let Some(name) = &overrides.checkpoint {
        let checkpoint = checkpoint(project, name)?;
        ResolvedConfiguration {
            segments: checkpoint_segments(project, checkpoint)?,
            checkpoint: Some(checkpoint.clone()),
            source: ResolutionSource::CheckpointOverride,
        }
    } else {
        from_student(project, &load_student()?)?
    };

    debug!(
        source = ?resolved.source,
        segments = ?resolved.segment_names(),
        "resolved active segments"
    );
    validate_combination(project, &resolved)?;
    Ok(resolved)
}

fn from_replace(project: &ProjectConfig, replace: &str) -> SpliceResult<ResolvedConfiguration> {
    let requested: Vec<&str> = replace
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .collect();
    for name in &requested {
        if project.find_segment(name).is_none() {
            return Err(SpliceError::unknown_segment(*name));
        }
    }
    let segments = project
        .segments()
        .iter()
        .filter(|s| requested.contains(&s.name()))
        .cloned()
        .collect();
    Ok(ResolvedConfiguration {
        segments,
        checkpoint: None,
        source: ResolutionSource::Override,
    })
}

fn from_student(
    project: &ProjectConfig,
    student: &StudentConfig,
) -> SpliceResult<ResolvedConfiguration> {
    let checkpoint = match &student.checkpoint {
        Some(name) => Some(checkpoint(project, name)?),
        None => None,
    };
    if let Some(switches) = &student.segments {
        if let Some(name) = switches.keys().find(|n| project.find_segment(n).is_none()) {
            return Err(SpliceError::unknown_segment(name.clone()));
        }
    }

    let segments = if !student.use_provided {
        Vec::new()
    } else if let Some(switches) = &student.segments {
        project
            .segments()
            .iter()
            .filter(|s| switches.get(s.name()).copied().unwrap_or(false))
            .cloned()
            .collect()
    } else if let Some(checkpoint) = checkpoint {
        checkpoint_segments(project, checkpoint)?
    } else {
        Vec::new()
    };

    Ok(ResolvedConfiguration {
        segments,
        checkpoint: checkpoint.cloned(),
        source: ResolutionSource::StudentFile,
    })
}

fn checkpoint<'a>(project: &'a ProjectConfig, name: &str) -> SpliceResult<&'a Checkpoint> {
    project
        .find_checkpoint(name)
        .ok_or_else(|| SpliceError::unknown_checkpoint(name))
}

fn checkpoint_segments(project: &ProjectConfig, checkpoint: &Checkpoint) -> SpliceResult<Vec<Segment>> {
    checkpoint
        .segment_names()
        .iter()
        .map(|name| {
            project
                .find_segment(name)
                .cloned()
                .ok_or_else(|| SpliceError::unknown_segment(name.clone()))
        })
        .collect()
}

/// Rejects combinations that direct conflicting edits at one class.
fn validate_combination(
    project: &ProjectConfig,
    resolved: &ResolvedConfiguration,
) -> SpliceResult<()> {
    let mut removed: HashMap<&str, &str> = HashMap::new();
    let mut chimerized: HashMap<&str, &str> = HashMap::new();
    for segment in &resolved.segments {
        for class in segment.remove_classes() {
            if let Some(first) = removed.insert(class, segment.name()) {
                if !project.allow_arbitrary_segment_combination {
                    return Err(SpliceError::ambiguous(
                        class.clone(),
                        format!("removed by both {first} and {}", segment.name()),
                    ));
                }
            }
        }
        for chimera in segment.chimeras() {
            let class = chimera.target_class.as_str();
            if let Some(first) = chimerized.insert(class, segment.name()) {
                if !project.allow_arbitrary_segment_combination {
                    return Err(SpliceError::ambiguous(
                        class,
                        format!("chimerized by both {first} and {}", segment.name()),
                    ));
                }
            }
        }
    }
    for segment in &resolved.segments {
        for chimera in segment.chimeras() {
            if let Some(remover) = removed.get(chimera.target_class.as_str()) {
                return Err(SpliceError::ambiguous(
                    chimera.target_class.clone(),
                    format!(
                        "removed by {remover} and chimerized by {}",
                        segment.name()
                    ),
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::collections::BTreeMap;

    fn project() -> ProjectConfig {
        ProjectConfig::new()
            .segment(Segment::builder("seg1").remove_class("Secret").build())
            .segment(Segment::builder("seg2").chimera("a.jar", "Solver", "solve").build())
            .segment(Segment::builder("seg3").remove_class("Hint").build())
            .checkpoint(Checkpoint::new("mid").segment("seg1"))
            .checkpoint(Checkpoint::new("late").segments(["seg3", "seg2"]))
    }

    fn student(checkpoint: Option<&str>, use_provided: bool, segments: &[(&str, bool)]) -> StudentConfig {
        StudentConfig {
            checkpoint: checkpoint.map(str::to_string),
            use_provided,
            segments: if segments.is_empty() {
                None
            } else {
                Some(
                    segments
                        .iter()
                        .map(|(n, v)| (n.to_string(), *v))
                        .collect::<BTreeMap<_, _>>(),
                )
            },
        }
    }

    fn no_student() -> SpliceResult<StudentConfig> {
        panic!("student file must not be read")
    }

    #[test]
    fn replace_wins_and_follows_declaration_order() {
        let overrides = Overrides {
            replace: Some(" seg3 ,, seg1".into()),
            checkpoint: Some("late".into()),
        };
        let resolved = resolve(&project(), &overrides, no_student).unwrap();
        assert_eq!(resolved.segment_names(), vec!["seg1", "seg3"]);
        assert_eq!(resolved.source(), ResolutionSource::Override);
        assert!(resolved.checkpoint().is_none());
    }

    #[test]
    fn replace_with_unknown_segment_fails() {
        let overrides = Overrides {
            replace: Some("seg1,seg9".into()),
            checkpoint: None,
        };
        let err = resolve(&project(), &overrides, no_student).unwrap_err();
        assert!(matches!(err, SpliceError::UnknownSegment { ref name } if name == "seg9"));
    }

    #[test]
    fn checkpoint_override_records_checkpoint() {
        let overrides = Overrides {
            replace: None,
            checkpoint: Some("late".into()),
        };
        let resolved = resolve(&project(), &overrides, no_student).unwrap();
        assert_eq!(resolved.segment_names(), vec!["seg3", "seg2"]);
        assert_eq!(resolved.checkpoint().map(Checkpoint::name), Some("late"));
        assert_eq!(resolved.source(), ResolutionSource::CheckpointOverride);
    }

    #[test]
    fn unknown_checkpoint_override_fails() {
        let overrides = Overrides {
            replace: None,
            checkpoint: Some("final".into()),
        };
        let err = resolve(&project(), &overrides, no_student).unwrap_err();
        assert!(matches!(err, SpliceError::UnknownCheckpoint { ref name } if name == "final"));
    }

    #[test]
    fn student_file_rules() {
        let project = project();
        let none = Overrides::default();

        let resolved = resolve(&project, &none, || Ok(student(Some("mid"), false, &[]))).unwrap();
        assert!(resolved.segments().is_empty());
        assert_eq!(resolved.checkpoint().map(Checkpoint::name), Some("mid"));

        let resolved = resolve(&project, &none, || {
            Ok(student(Some("mid"), true, &[("seg3", true), ("seg1", false)]))
        })
        .unwrap();
        assert_eq!(resolved.segment_names(), vec!["seg3"]);
        assert_eq!(resolved.checkpoint().map(Checkpoint::name), Some("mid"));

        let resolved = resolve(&project, &none, || Ok(student(Some("mid"), true, &[]))).unwrap();
        assert_eq!(resolved.segment_names(), vec!["seg1"]);
        assert_eq!(resolved.source(), ResolutionSource::StudentFile);

        let resolved = resolve(&project, &none, || Ok(student(None, true, &[]))).unwrap();
        assert!(resolved.segments().is_empty());
        assert!(resolved.checkpoint().is_none());
    }

    #[test]
    fn student_file_names_are_checked() {
        let project = project();
        let none = Overrides::default();
        let err = resolve(&project, &none, || Ok(student(Some("final"), false, &[]))).unwrap_err();
        assert!(matches!(err, SpliceError::UnknownCheckpoint { .. }));

        let err = resolve(&project, &none, || Ok(student(None, true, &[("ghost", false)]))).unwrap_err();
        assert!(matches!(err, SpliceError::UnknownSegment { ref name } if name == "ghost"));
    }

    #[test]
    fn student_file_is_loaded_once_per_resolution() {
        let reads = Cell::new(0);
        let _ = resolve(&project(), &Overrides::default(), || {
            reads.set(reads.get() + 1);
            Ok(student(None, true, &[]))
        })
        .unwrap();
        assert_eq!(reads.get(), 1);
    }

    #[test]
    fn duplicate_removal_is_ambiguous() {
        let project = ProjectConfig::new()
            .segment(Segment::builder("a").remove_class("Secret").build())
            .segment(Segment::builder("b").remove_class("Secret").build());
        let overrides = Overrides {
            replace: Some("a,b".into()),
            checkpoint: None,
        };
        let err = resolve(&project, &overrides, no_student).unwrap_err();
        assert!(matches!(err, SpliceError::AmbiguousDirective { ref class, .. } if class == "Secret"));

        let project = project.allow_arbitrary_segment_combination(true);
        let resolved = resolve(&project, &overrides, no_student).unwrap();
        assert_eq!(resolved.remove_classes(), vec!["Secret"]);
    }

    #[test]
    fn removed_and_chimerized_is_always_an_error() {
        let project = ProjectConfig::new()
            .allow_arbitrary_segment_combination(true)
            .segment(Segment::builder("a").remove_class("Solver").build())
            .segment(Segment::builder("b").chimera("x.jar", "Solver", "solve").build());
        let overrides = Overrides {
            replace: Some("a,b".into()),
            checkpoint: None,
        };
        let err = resolve(&project, &overrides, no_student).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("Solver"));
    }
}
