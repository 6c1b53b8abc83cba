//! Temporary project trees.
//!
//! A [`TestProject`] mirrors the layout the pipeline expects:
//!
//! ```text
//! <root>/splice.yaml              project file
//! <root>/config/splice.yaml       student file
//! <root>/provided/*.jar           provided archives
//! <root>/build/classes/**.class   compiler output
//! <root>/build/manifest/AndroidManifest.xml
//! ```

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// A project root with automatic cleanup.
pub struct TestProject {
    dir: TempDir,
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

impl TestProject {
    /// Creates an empty project with an empty class output directory.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let project = Self { dir };
        fs::create_dir_all(project.classes_dir()).expect("Failed to create classes dir");
        project
    }

    /// The project root.
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// The class output root.
    pub fn classes_dir(&self) -> PathBuf {
        self.root().join("build").join("classes")
    }

    /// The provided-archive directory.
    pub fn provided_dir(&self) -> PathBuf {
        self.root().join("provided")
    }

    /// The manifest output directory.
    pub fn manifest_dir(&self) -> PathBuf {
        self.root().join("build").join("manifest")
    }

    /// Path of a compiled class by internal name.
    pub fn class_path(&self, name: &str) -> PathBuf {
        self.classes_dir().join(format!("{name}.class"))
    }

    /// Writes a compiled class into the output root.
    pub fn write_class(&self, name: &str, bytes: &[u8]) -> PathBuf {
        let path = self.class_path(name);
        write_file(&path, bytes);
        path
    }

    /// Reads a compiled class, if present.
    pub fn read_class(&self, name: &str) -> Option<Vec<u8>> {
        fs::read(self.class_path(name)).ok()
    }

    /// Returns true if the compiled class exists.
    pub fn has_class(&self, name: &str) -> bool {
        self.class_path(name).is_file()
    }

    /// Writes the project file (`splice.yaml`).
    pub fn write_project_file(&self, yaml: &str) -> PathBuf {
        let path = self.root().join("splice.yaml");
        write_file(&path, yaml.as_bytes());
        path
    }

    /// Writes the student file at its default location.
    pub fn write_student_file(&self, yaml: &str) -> PathBuf {
        let path = self.root().join("config").join("splice.yaml");
        write_file(&path, yaml.as_bytes());
        path
    }

    /// Writes `AndroidManifest.xml` into the manifest directory.
    pub fn write_manifest(&self, xml: &str) -> PathBuf {
        let path = self.manifest_dir().join("AndroidManifest.xml");
        write_file(&path, xml.as_bytes());
        path
    }

    /// Reads `AndroidManifest.xml` back.
    pub fn read_manifest(&self) -> String {
        fs::read_to_string(self.manifest_dir().join("AndroidManifest.xml"))
            .expect("Failed to read manifest")
    }

    /// Writes a provided archive of `(internal name, class bytes)` entries.
    pub fn write_provided_archive(&self, archive: &str, classes: &[(&str, Vec<u8>)]) -> PathBuf {
        let path = self.provided_dir().join(archive);
        let entries: Vec<(String, &[u8])> = classes
            .iter()
            .map(|(name, bytes)| (format!("{name}.class"), bytes.as_slice()))
            .collect();
        write_archive(&path, &entries);
        path
    }

    /// Lists every file under the class output root, relative and sorted.
    pub fn class_files(&self) -> Vec<String> {
        let mut found = Vec::new();
        collect_files(&self.classes_dir(), &self.classes_dir(), &mut found);
        found.sort();
        found
    }
}

/// Writes a zip archive with the given `(entry name, bytes)` pairs.
pub fn write_archive(path: &Path, entries: &[(String, &[u8])]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create archive dir");
    }
    let file = File::create(path).expect("Failed to create archive");
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, bytes) in entries {
        writer
            .start_file(name.as_str(), options)
            .expect("Failed to start archive entry");
        writer.write_all(bytes).expect("Failed to write archive entry");
    }
    writer.finish().expect("Failed to finish archive");
}

fn write_file(path: &Path, bytes: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create parent dir");
    }
    fs::write(path, bytes).expect("Failed to write file");
}

fn collect_files(base: &Path, dir: &Path, found: &mut Vec<String>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files(base, &path, found);
        } else if let Ok(relative) = path.strip_prefix(base) {
            found.push(relative.to_string_lossy().replace('\\', "/"));
        }
    }
}
