//! Chimerization: grafting one student method into a provided class.
//!
//! The provided class is the template. Its pool is kept as is, so every
//! provided member stays byte-identical. Members taken from the student's
//! class are imported into that pool with [`PoolImporter`].

use crate::callbacks::CallbackRegistry;
use crate::error::{SpliceError, SpliceResult};
use crate::segment::Chimera;
use crate::tree::ClassTree;
use serde::Serialize;
use splice_classfile::{access, Attribute, ClassFile, ClassFileError, MemberInfo, PoolImporter};
use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use zip::result::ZipError;
use zip::ZipArchive;

/// Name of the provenance field added to every merged class.
pub const PROVENANCE_FIELD: &str = "_SPLICE_CHIMERA";

const STRING_DESCRIPTOR: &str = "Ljava/lang/String;";

/// Text of the provenance field.
pub fn provenance_message(keep_method: &str) -> String {
    format!(
        "This chimeric class comes from provided code combined with your {keep_method} method."
    )
}

/// Summary of one merged class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergedClass {
    /// Internal class name.
    pub class: String,
    /// Archive the provided version came from.
    pub archive: String,
    /// Method taken from the student's class.
    pub keep_method: String,
    /// Field names in emitted order.
    pub fields: Vec<String>,
    /// Method `name+descriptor` signatures in emitted order.
    pub methods: Vec<String>,
    /// Camouflage field names.
    pub camouflage: Vec<String>,
}

/// What the chimera stage did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChimeraReport {
    /// Merged classes, in directive order.
    pub merged: Vec<MergedClass>,
    /// Auxiliary classes copied from provided archives.
    pub copied: Vec<PathBuf>,
    /// Nested student classes deleted before merging.
    pub deleted_nested: Vec<PathBuf>,
}

/// Fields and method signatures already emitted into a merged class.
#[derive(Debug, Default)]
struct EmittedMembers {
    fields: Vec<String>,
    methods: Vec<String>,
    field_names: HashSet<String>,
    signatures: HashSet<String>,
}

impl EmittedMembers {
    fn add_field(&mut self, name: String) -> bool {
        if self.field_names.insert(name.clone()) {
            self.fields.push(name);
            true
        } else {
            false
        }
    }

    fn add_method(&mut self, signature: String) -> bool {
        if self.signatures.insert(signature.clone()) {
            self.methods.push(signature);
            true
        } else {
            false
        }
    }
}

/// Runs every chimera directive against `tree`.
///
/// All targets are read before anything is written, so later directives
/// still see the student's original bodies.
pub fn chimerize(
    tree: &ClassTree,
    provided_dir: &Path,
    chimeras: &[Chimera],
    registry: &CallbackRegistry,
) -> SpliceResult<ChimeraReport> {
    let mut report = ChimeraReport::default();
    if chimeras.is_empty() {
        return Ok(report);
    }

    let targets: HashSet<&str> = chimeras.iter().map(|c| c.target_class.as_str()).collect();
    let mut originals: HashMap<&str, Vec<u8>> = HashMap::new();
    for chimera in chimeras {
        let target = chimera.target_class.as_str();
        if originals.contains_key(target) {
            continue;
        }
        let path = tree.path_for(target);
        if !path.is_file() {
            return Err(SpliceError::missing_artifact("target class", path));
        }
        originals.insert(target, fs::read(&path)?);
    }

    for entry in tree.class_files()? {
        if entry.is_nested() && targets.contains(entry.top_level()) {
            fs::remove_file(&entry.path)?;
            debug!(class = %entry.name, "deleted nested class of chimera target");
            report.deleted_nested.push(entry.path);
        }
    }

    let target_entries: HashSet<String> = targets
        .iter()
        .map(|target| tree.archive_entry_name(target))
        .collect();

    for chimera in chimeras {
        let target = chimera.target_class.as_str();
        let Some(original) = originals.get(target) else {
            continue;
        };
        let camouflage = match &chimera.camouflage {
            Some(reference) => registry.run_camouflage(reference, original)?,
            None => Vec::new(),
        };

        let archive_path = provided_dir.join(&chimera.provided_archive);
        if !archive_path.is_file() {
            return Err(SpliceError::missing_artifact("provided archive", archive_path));
        }
        let mut archive = ZipArchive::new(File::open(&archive_path)?)?;
        let entry_name = tree.archive_entry_name(target);
        let provided = read_entry(&mut archive, &entry_name, &archive_path)?;
        report
            .copied
            .extend(copy_auxiliaries(&mut archive, tree.root(), &target_entries)?);

        let (bytes, emitted) = graft(target, &provided, original, &chimera.keep_method, &camouflage)?;
        fs::write(tree.path_for(target), bytes)?;
        info!(
            class = target,
            archive = %chimera.provided_archive,
            keep = %chimera.keep_method,
            "merged chimera class"
        );
        report.merged.push(MergedClass {
            class: target.to_string(),
            archive: chimera.provided_archive.clone(),
            keep_method: chimera.keep_method.clone(),
            fields: emitted.fields,
            methods: emitted.methods,
            camouflage: camouflage.into_iter().map(|(name, _)| name).collect(),
        });
    }
    Ok(report)
}

fn read_entry(
    archive: &mut ZipArchive<File>,
    name: &str,
    archive_path: &Path,
) -> SpliceResult<Vec<u8>> {
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => {
            return Err(SpliceError::missing_artifact(
                "provided class",
                archive_path.join(name),
            ))
        }
        Err(e) => return Err(e.into()),
    };
    let mut bytes = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut bytes)?;
    Ok(bytes)
}

/// Copies every class entry except the chimera targets into `root`.
fn copy_auxiliaries(
    archive: &mut ZipArchive<File>,
    root: &Path,
    skip: &HashSet<String>,
) -> SpliceResult<Vec<PathBuf>> {
    let mut copied = Vec::new();
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if entry.is_dir() || !entry.name().ends_with(".class") || skip.contains(entry.name()) {
            continue;
        }
        let Some(relative) = entry.enclosed_name() else {
            warn!(entry = %entry.name(), "skipping archive entry outside the output root");
            continue;
        };
        let destination = root.join(relative);
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut bytes)?;
        fs::write(&destination, bytes)?;
        debug!(path = %destination.display(), "copied provided class");
        copied.push(destination);
    }
    Ok(copied)
}

/// Merges a provided class with the student's class, keeping `keep_method`.
///
/// `camouflage` entries become `private static final String` fields in
/// the given order.
pub fn merge(
    class: &str,
    provided: &[u8],
    original: &[u8],
    keep_method: &str,
    camouflage: &[(String, String)],
) -> SpliceResult<Vec<u8>> {
    graft(class, provided, original, keep_method, camouflage).map(|(bytes, _)| bytes)
}

fn graft(
    class: &str,
    provided: &[u8],
    original: &[u8],
    keep_method: &str,
    camouflage: &[(String, String)],
) -> SpliceResult<(Vec<u8>, EmittedMembers)> {
    let fail = |message: String| SpliceError::binary_rewrite(class, keep_method, message);
    let structure = |e: ClassFileError| fail(e.to_string());

    let provided = ClassFile::parse(provided).map_err(structure)?;
    let original = ClassFile::parse(original).map_err(structure)?;
    let provided_name = provided.name().map_err(structure)?;
    if provided_name != class {
        return Err(fail(format!("provided class is named {provided_name}")));
    }

    let mut merged = provided.clone();
    merged.fields.clear();
    merged.methods.clear();
    let mut emitted = EmittedMembers::default();

    for field in &provided.fields {
        emitted.add_field(field.name(&provided.constant_pool).map_err(structure)?);
        merged.fields.push(field.clone());
    }
    for method in &provided.methods {
        let name = method.name(&provided.constant_pool).map_err(structure)?;
        if name == keep_method {
            continue;
        }
        let descriptor = method.descriptor(&provided.constant_pool).map_err(structure)?;
        emitted.add_method(format!("{name}{descriptor}"));
        merged.methods.push(method.clone());
    }

    let provenance = provenance_message(keep_method);
    let metadata = std::iter::once((PROVENANCE_FIELD, provenance.as_str()))
        .chain(camouflage.iter().map(|(n, v)| (n.as_str(), v.as_str())));
    for (name, value) in metadata {
        if !emitted.add_field(name.to_string()) {
            return Err(fail(format!("metadata field {name} collides with an existing field")));
        }
        let field = string_constant(&mut merged, name, value).map_err(structure)?;
        merged.fields.push(field);
    }

    let bootstrap = merged.bootstrap_methods().map_err(structure)?;
    let mut importer =
        PoolImporter::new(&original, &mut merged.constant_pool, bootstrap).map_err(structure)?;
    for field in &original.fields {
        let name = field.name(&original.constant_pool).map_err(structure)?;
        if emitted.field_names.contains(&name) {
            continue;
        }
        merged.fields.push(importer.import_member(field).map_err(structure)?);
        emitted.add_field(name);
    }
    let mut kept = 0;
    for method in &original.methods {
        let name = method.name(&original.constant_pool).map_err(structure)?;
        if name != keep_method {
            continue;
        }
        let descriptor = method.descriptor(&original.constant_pool).map_err(structure)?;
        if !emitted.add_method(format!("{name}{descriptor}")) {
            continue;
        }
        merged.methods.push(importer.import_member(method).map_err(structure)?);
        kept += 1;
    }
    let bootstrap = importer.finish();
    if kept == 0 {
        return Err(fail("method not found in the student's class".to_string()));
    }
    merged.set_bootstrap_methods(&bootstrap).map_err(structure)?;

    let bytes = merged.to_bytes().map_err(structure)?;
    Ok((bytes, emitted))
}

fn string_constant(
    class: &mut ClassFile,
    name: &str,
    value: &str,
) -> Result<MemberInfo, ClassFileError> {
    let pool = &mut class.constant_pool;
    let name_index = pool.utf8_index(name)?;
    let descriptor_index = pool.utf8_index(STRING_DESCRIPTOR)?;
    let attribute_name = pool.utf8_index("ConstantValue")?;
    let value_index = pool.string_index(value)?;
    Ok(MemberInfo {
        access_flags: access::PRIVATE | access::STATIC | access::FINAL,
        name_index,
        descriptor_index,
        attributes: vec![Attribute {
            name_index: attribute_name,
            info: value_index.to_be_bytes().to_vec(),
        }],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use splice_classfile::{CodeAttribute, Constant};
    use splice_testkit::{ClassBuilder, Op};

    fn provided() -> Vec<u8> {
        ClassBuilder::new("T")
            .field(access::PRIVATE, "a", "I")
            .field(access::PRIVATE, "b", "I")
            .default_constructor()
            .method(access::PUBLIC, "f", "()I", vec![Op::Iconst(1), Op::Ireturn])
            .method(access::PUBLIC, "g", "()I", vec![Op::Iconst(2), Op::Ireturn])
            .bytes()
    }

    fn original() -> Vec<u8> {
        ClassBuilder::new("T")
            .field(access::PRIVATE, "a", "I")
            .field(access::PRIVATE, "c", "Ljava/lang/String;")
            .default_constructor()
            .method(
                access::PUBLIC,
                "f",
                "()I",
                vec![
                    Op::Aload(0),
                    Op::get_field("T", "a", "I"),
                    Op::Ldc("student".into()),
                    Op::Pop,
                    Op::Ireturn,
                ],
            )
            .method(access::PUBLIC, "h", "()V", vec![Op::Return])
            .bytes()
    }

    fn names(class: &ClassFile, members: &[MemberInfo]) -> Vec<String> {
        members
            .iter()
            .map(|m| m.name(&class.constant_pool).unwrap())
            .collect()
    }

    fn string_value(class: &ClassFile, field: &str) -> String {
        let field = class.field_named(field).unwrap();
        let attribute = field.attribute(&class.constant_pool, "ConstantValue").unwrap();
        let index = u16::from_be_bytes([attribute.info[0], attribute.info[1]]);
        match class.constant_pool.get(index).unwrap() {
            Constant::String(utf8) => class.constant_pool.utf8(*utf8).unwrap(),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn grafts_kept_method_into_provided_class() {
        let (bytes, emitted) = graft("T", &provided(), &original(), "f", &[]).unwrap();
        let merged = ClassFile::parse(&bytes).unwrap();

        assert_eq!(
            names(&merged, &merged.fields),
            vec!["a", "b", PROVENANCE_FIELD, "c"]
        );
        assert_eq!(names(&merged, &merged.methods), vec!["<init>", "g", "f"]);
        assert_eq!(emitted.methods, vec!["<init>()V", "g()I", "f()I"]);
        assert_eq!(string_value(&merged, PROVENANCE_FIELD), provenance_message("f"));

        // f is the student's body, re-homed into the provided pool
        let f = merged.method_named("f").unwrap();
        let code = CodeAttribute::parse(&f.attribute(&merged.constant_pool, "Code").unwrap().info)
            .unwrap();
        assert_eq!(code.code.len(), 8);
        let provided = ClassFile::parse(&provided()).unwrap();
        assert_eq!(merged.methods[1], provided.methods[2]);
    }

    #[test]
    fn camouflage_fields_follow_provider_order() {
        let camouflage = vec![
            ("k2".to_string(), "v2".to_string()),
            ("k1".to_string(), "v1".to_string()),
        ];
        let bytes = merge("T", &provided(), &original(), "f", &camouflage).unwrap();
        let merged = ClassFile::parse(&bytes).unwrap();
        assert_eq!(
            names(&merged, &merged.fields),
            vec!["a", "b", PROVENANCE_FIELD, "k2", "k1", "c"]
        );
        assert_eq!(string_value(&merged, "k1"), "v1");
        let k1 = merged.field_named("k1").unwrap();
        assert_eq!(
            k1.access_flags,
            access::PRIVATE | access::STATIC | access::FINAL
        );
    }

    #[test]
    fn colliding_camouflage_is_rejected() {
        let camouflage = vec![("b".to_string(), "x".to_string())];
        let err = merge("T", &provided(), &original(), "f", &camouflage).unwrap_err();
        assert!(matches!(err, SpliceError::BinaryRewrite { .. }));
    }

    #[test]
    fn missing_kept_method_is_rejected() {
        let err = merge("T", &provided(), &original(), "solve", &[]).unwrap_err();
        assert!(err.to_string().contains("T.solve"));
    }

    #[test]
    fn signature_comparison_is_case_sensitive() {
        let provided = ClassBuilder::new("T")
            .method(access::PUBLIC, "F", "()I", vec![Op::Iconst(1), Op::Ireturn])
            .bytes();
        let original = ClassBuilder::new("T")
            .method(access::PUBLIC, "f", "()I", vec![Op::Iconst(2), Op::Ireturn])
            .bytes();
        let (_, emitted) = graft("T", &provided, &original, "f", &[]).unwrap();
        assert_eq!(emitted.methods, vec!["F()I", "f()I"]);
    }

    #[test]
    fn merge_is_deterministic() {
        let first = merge("T", &provided(), &original(), "f", &[]).unwrap();
        let second = merge("T", &provided(), &original(), "f", &[]).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn mismatched_provided_class_is_rejected() {
        let other = ClassBuilder::new("U").bytes();
        let err = merge("T", &other, &original(), "f", &[]).unwrap_err();
        assert!(err.to_string().contains("provided class is named U"));
    }
}
