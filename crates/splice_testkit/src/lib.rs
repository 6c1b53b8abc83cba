//! # Splice Testkit
//!
//! Test utilities for Splice.
//!
//! This crate provides:
//! - A class-file builder for synthesising small, valid compiled classes
//! - Temporary project trees with the directory layout the pipeline expects
//! - Provided-archive (jar) writers
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use splice_testkit::prelude::*;
//!
//! #[test]
//! fn redacts_secret() {
//!     let project = TestProject::new();
//!     project.write_class("Secret", &ClassBuilder::new("Secret").bytes());
//!     // ... run a stage against project.classes_dir()
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod classes;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::classes::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use classes::*;
pub use fixtures::*;
pub use generators::*;
