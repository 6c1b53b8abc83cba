//! # Splice Core
//!
//! Post-compile transformation of JVM class files, driven by segments.
//!
//! This crate provides:
//! - The segment and checkpoint model, from a builder API or a YAML project file
//! - Resolution of the active segments (override, checkpoint, student file)
//! - Redaction of removed classes and stale opportunistic classes
//! - Weaving of hook calls before every normal method return
//! - Chimerization of provided and student-compiled classes
//! - Manifest editor dispatch through a callback registry
//!
//! ## Usage
//!
//! ```rust,no_run
//! use splice_core::{BuildConfig, BuildContext, CallbackRegistry, Pipeline, ProjectConfig};
//! use std::path::Path;
//!
//! # fn main() -> splice_core::SpliceResult<()> {
//! let project = ProjectConfig::load(Path::new("splice.yaml"))?;
//! let build = BuildConfig::new(".", "build/classes").checkpoint("mid");
//! let ctx = BuildContext::new(project, build, CallbackRegistry::with_builtins());
//! let report = Pipeline::new(&ctx).run()?;
//! println!("removed {} class files", report.removed.len());
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod callbacks;
pub mod chimera;
mod config;
mod context;
mod deps;
mod error;
pub mod manifest;
mod pipeline;
pub mod redact;
mod resolve;
mod segment;
mod student;
mod tree;
pub mod weave;

pub use callbacks::{CallbackError, CallbackRef, CallbackRegistry};
pub use chimera::{ChimeraReport, MergedClass};
pub use config::{
    BuildConfig, Overrides, ProjectConfig, DEFAULT_PROJECT_FILE, DEFAULT_PROVIDED_DIR,
    DEFAULT_STUDENT_CONFIG,
};
pub use context::BuildContext;
pub use deps::DependencyPlan;
pub use error::{SpliceError, SpliceResult};
pub use pipeline::{Pipeline, PipelineReport};
pub use resolve::{resolve, ResolutionSource, ResolvedConfiguration};
pub use segment::{
    normalize_class_name, Chimera, Checkpoint, Dependency, Injector, Segment, SegmentBuilder,
    NONE_CHECKPOINT,
};
pub use student::StudentConfig;
pub use tree::{ClassFileEntry, ClassTree};
pub use weave::WovenMethod;
