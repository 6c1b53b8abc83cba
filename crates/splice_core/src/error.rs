//! Error types for Splice.

use splice_classfile::ClassFileError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for Splice operations.
pub type SpliceResult<T> = Result<T, SpliceError>;

/// Errors that can occur while resolving configuration or transforming output.
///
/// `Configuration`, `UnknownSegment`, `UnknownCheckpoint`,
/// `AmbiguousDirective`, and `StudentFile` are all configuration errors;
/// see [`SpliceError::is_configuration`].
#[derive(Debug, Error)]
pub enum SpliceError {
    /// Invalid project or build configuration.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the problem.
        message: String,
    },

    /// A segment name does not exist in the project.
    #[error("unknown segment: {name}")]
    UnknownSegment {
        /// The unknown name.
        name: String,
    },

    /// A checkpoint name does not exist in the project.
    #[error("unknown checkpoint: {name}")]
    UnknownCheckpoint {
        /// The unknown name.
        name: String,
    },

    /// Active segments direct conflicting edits at one class.
    #[error("ambiguous directives for class {class}: {message}")]
    AmbiguousDirective {
        /// The class targeted more than once.
        class: String,
        /// What conflicts.
        message: String,
    },

    /// The student file is missing or malformed.
    #[error("student file {}: {message}", path.display())]
    StudentFile {
        /// Path of the student file.
        path: PathBuf,
        /// Description of the problem.
        message: String,
    },

    /// A class or archive a directive needs does not exist.
    #[error("missing {artifact}: {}", path.display())]
    MissingArtifact {
        /// Kind of artifact.
        artifact: &'static str,
        /// Where it was expected.
        path: PathBuf,
    },

    /// A registered callback could not be loaded or failed.
    #[error("callback {reference} failed: {reason}")]
    ExternalCallback {
        /// The callback reference.
        reference: String,
        /// Why it failed.
        reason: String,
    },

    /// A compiled class could not be rewritten.
    #[error("cannot rewrite {class}.{method}: {message}")]
    BinaryRewrite {
        /// Internal class name.
        class: String,
        /// Method name (empty for class-level problems).
        method: String,
        /// Description of the problem.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Class-file structure error.
    #[error("class file error: {0}")]
    ClassFile(#[from] ClassFileError),

    /// Provided archive error.
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Manifest document error.
    #[error("manifest {}: {message}", path.display())]
    Xml {
        /// Path of the manifest.
        path: PathBuf,
        /// Description of the problem.
        message: String,
    },
}

impl SpliceError {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates an unknown-segment error.
    pub fn unknown_segment(name: impl Into<String>) -> Self {
        Self::UnknownSegment { name: name.into() }
    }

    /// Creates an unknown-checkpoint error.
    pub fn unknown_checkpoint(name: impl Into<String>) -> Self {
        Self::UnknownCheckpoint { name: name.into() }
    }

    /// Creates an ambiguous-directive error.
    pub fn ambiguous(class: impl Into<String>, message: impl Into<String>) -> Self {
        Self::AmbiguousDirective {
            class: class.into(),
            message: message.into(),
        }
    }

    /// Creates a missing-artifact error.
    pub fn missing_artifact(artifact: &'static str, path: impl Into<PathBuf>) -> Self {
        Self::MissingArtifact {
            artifact,
            path: path.into(),
        }
    }

    /// Creates a callback error.
    pub fn external_callback(reference: impl ToString, reason: impl ToString) -> Self {
        Self::ExternalCallback {
            reference: reference.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Creates a binary-rewrite error.
    pub fn binary_rewrite(
        class: impl Into<String>,
        method: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::BinaryRewrite {
            class: class.into(),
            method: method.into(),
            message: message.into(),
        }
    }

    /// Returns true for configuration errors.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Configuration { .. }
                | Self::UnknownSegment { .. }
                | Self::UnknownCheckpoint { .. }
                | Self::AmbiguousDirective { .. }
                | Self::StudentFile { .. }
        )
    }

    /// Rebuilds this error so a cached failure can be reported again.
    ///
    /// Wrapped I/O and archive errors keep their kind and message only.
    pub fn replay(&self) -> Self {
        match self {
            Self::Configuration { message } => Self::configuration(message.clone()),
            Self::UnknownSegment { name } => Self::unknown_segment(name.clone()),
            Self::UnknownCheckpoint { name } => Self::unknown_checkpoint(name.clone()),
            Self::AmbiguousDirective { class, message } => {
                Self::ambiguous(class.clone(), message.clone())
            }
            Self::StudentFile { path, message } => Self::StudentFile {
                path: path.clone(),
                message: message.clone(),
            },
            Self::MissingArtifact { artifact, path } => Self::missing_artifact(*artifact, path.clone()),
            Self::ExternalCallback { reference, reason } => {
                Self::external_callback(reference, reason)
            }
            Self::BinaryRewrite {
                class,
                method,
                message,
            } => Self::binary_rewrite(class.clone(), method.clone(), message.clone()),
            Self::Io(e) => Self::Io(io::Error::new(e.kind(), e.to_string())),
            Self::ClassFile(e) => Self::ClassFile(e.clone()),
            Self::Archive(e) => Self::Io(io::Error::other(e.to_string())),
            Self::Xml { path, message } => Self::Xml {
                path: path.clone(),
                message: message.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offender() {
        assert_eq!(
            SpliceError::unknown_segment("seg9").to_string(),
            "unknown segment: seg9"
        );
        assert_eq!(
            SpliceError::binary_rewrite("demo/Solver", "solve", "no code").to_string(),
            "cannot rewrite demo/Solver.solve: no code"
        );
    }

    #[test]
    fn configuration_family() {
        assert!(SpliceError::unknown_checkpoint("late").is_configuration());
        assert!(SpliceError::ambiguous("Foo", "removed twice").is_configuration());
        assert!(!SpliceError::missing_artifact("archive", "provided/a.jar").is_configuration());
    }

    #[test]
    fn replayed_errors_keep_kind_and_message() {
        let original = SpliceError::StudentFile {
            path: PathBuf::from("config/splice.yaml"),
            message: "missing field `useProvided`".into(),
        };
        let replayed = original.replay();
        assert!(replayed.is_configuration());
        assert_eq!(replayed.to_string(), original.to_string());

        let io = SpliceError::Io(io::Error::new(io::ErrorKind::NotFound, "gone"));
        match io.replay() {
            SpliceError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::NotFound),
            other => panic!("unexpected {other:?}"),
        }
    }
}
