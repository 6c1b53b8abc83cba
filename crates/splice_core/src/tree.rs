//! Discovery of compiled classes under the output root.

use crate::error::SpliceResult;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A compiled class file found in the output tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassFileEntry {
    /// Location on disk.
    pub path: PathBuf,
    /// Name relative to the affected scope, `/`-separated, no extension.
    pub name: String,
}

impl ClassFileEntry {
    /// Owning top-level class name (the name up to the first `$`).
    pub fn top_level(&self) -> &str {
        top_level(&self.name)
    }

    /// Whether this is a nested or inner class.
    pub fn is_nested(&self) -> bool {
        self.name.contains('$')
    }
}

/// Owning top-level name of a class name.
pub fn top_level(name: &str) -> &str {
    name.split('$').next().unwrap_or(name)
}

/// The affected part of a class output root.
#[derive(Debug, Clone)]
pub struct ClassTree {
    root: PathBuf,
    scope: String,
}

impl ClassTree {
    /// Creates a view of `root` limited to the `scope` package path.
    pub fn new(root: impl Into<PathBuf>, scope: &str) -> Self {
        Self {
            root: root.into(),
            scope: scope.trim_matches('/').to_string(),
        }
    }

    /// The class output root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The affected scope (`""` for the whole root).
    pub fn scope(&self) -> &str {
        &self.scope
    }

    fn scope_dir(&self) -> PathBuf {
        if self.scope.is_empty() {
            self.root.clone()
        } else {
            self.root.join(&self.scope)
        }
    }

    /// Lists affected class files in a stable order.
    ///
    /// A missing output root yields no files.
    pub fn class_files(&self) -> SpliceResult<Vec<ClassFileEntry>> {
        let dir = self.scope_dir();
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        for entry in WalkDir::new(&dir).sort_by_file_name() {
            let entry = entry.map_err(io::Error::from)?;
            if !entry.file_type().is_file() || !is_class_file(entry.path()) {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&dir) else {
                continue;
            };
            let name = relative
                .with_extension("")
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            entries.push(ClassFileEntry {
                path: entry.path().to_path_buf(),
                name,
            });
        }
        Ok(entries)
    }

    /// On-disk location of a class by name.
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.scope_dir().join(format!("{name}.class"))
    }

    /// Archive entry name of a class by name.
    pub fn archive_entry_name(&self, name: &str) -> String {
        if self.scope.is_empty() {
            format!("{name}.class")
        } else {
            format!("{}/{name}.class", self.scope)
        }
    }
}

fn is_class_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("class"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn lists_scoped_class_files() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "edu/example/Solver.class");
        touch(dir.path(), "edu/example/Solver$1.class");
        touch(dir.path(), "edu/example/util/Helper.CLASS");
        touch(dir.path(), "edu/example/notes.txt");
        touch(dir.path(), "other/Outside.class");

        let tree = ClassTree::new(dir.path(), "edu/example");
        let names: Vec<_> = tree
            .class_files()
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["Solver$1", "Solver", "util/Helper"]);
    }

    #[test]
    fn nested_names_share_top_level() {
        let entry = ClassFileEntry {
            path: PathBuf::from("Foo$Bar$1.class"),
            name: "Foo$Bar$1".into(),
        };
        assert_eq!(entry.top_level(), "Foo");
        assert!(entry.is_nested());
        assert_eq!(top_level("Foo"), "Foo");
    }

    #[test]
    fn missing_root_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let tree = ClassTree::new(dir.path().join("absent"), "");
        assert!(tree.class_files().unwrap().is_empty());
    }

    #[test]
    fn paths_and_entry_names() {
        let tree = ClassTree::new("/out", "edu/example/");
        assert_eq!(tree.path_for("Solver"), PathBuf::from("/out/edu/example/Solver.class"));
        assert_eq!(tree.archive_entry_name("Solver"), "edu/example/Solver.class");
        assert_eq!(ClassTree::new("/out", "").archive_entry_name("Solver"), "Solver.class");
    }
}
