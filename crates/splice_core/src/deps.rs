//! External artifacts the active segments add to the compile classpath.

use crate::segment::{Dependency, Segment};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Jars and Android archives for the host build tool to add.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DependencyPlan {
    /// Provided jars, as `<provided_dir>/<name>.jar`.
    pub jars: Vec<PathBuf>,
    /// Android archive references.
    pub aars: Vec<String>,
}

impl DependencyPlan {
    /// Collects dependencies from `segments` in order, without duplicates.
    pub fn from_segments(segments: &[Segment], provided_dir: &Path) -> Self {
        let mut plan = Self::default();
        for dependency in segments.iter().flat_map(Segment::dependencies) {
            match dependency {
                Dependency::Jar(name) => {
                    let path = provided_dir.join(format!("{name}.jar"));
                    if !plan.jars.contains(&path) {
                        plan.jars.push(path);
                    }
                }
                Dependency::Aar(name) => {
                    if !plan.aars.contains(name) {
                        plan.aars.push(name.clone());
                    }
                }
            }
        }
        plan
    }

    /// Whether nothing is added.
    pub fn is_empty(&self) -> bool {
        self.jars.is_empty() && self.aars.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_in_segment_order_without_duplicates() {
        let segments = vec![
            Segment::builder("seg1").add_jar("solutions").add_aar("support").build(),
            Segment::builder("seg2").add_jar("hooks").add_jar("solutions").build(),
        ];
        let plan = DependencyPlan::from_segments(&segments, Path::new("provided"));
        assert_eq!(
            plan.jars,
            vec![
                PathBuf::from("provided/solutions.jar"),
                PathBuf::from("provided/hooks.jar")
            ]
        );
        assert_eq!(plan.aars, vec!["support"]);
        assert!(!plan.is_empty());
        assert!(DependencyPlan::from_segments(&[], Path::new("provided")).is_empty());
    }
}
