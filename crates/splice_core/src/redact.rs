//! Redaction of compiled classes.

use crate::error::SpliceResult;
use crate::tree::ClassTree;
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

/// Deletes every class file whose top-level owner is in `remove`.
///
/// Returns the deleted files in traversal order.
pub fn redact(tree: &ClassTree, remove: &[String]) -> SpliceResult<Vec<PathBuf>> {
    if remove.is_empty() {
        return Ok(Vec::new());
    }
    let remove: HashSet<&str> = remove.iter().map(String::as_str).collect();
    delete_owned_by(tree, |owner| remove.contains(owner))
}

/// Deletes opportunistically compiled classes the checkpoint does not allow.
///
/// `allowed` of `None` means no limit, so nothing is pruned.
pub fn prune_opportunistic(
    tree: &ClassTree,
    universe: &[String],
    allowed: Option<&[String]>,
) -> SpliceResult<Vec<PathBuf>> {
    let Some(allowed) = allowed else {
        return Ok(Vec::new());
    };
    let stale: HashSet<&str> = universe
        .iter()
        .filter(|class| !allowed.contains(class))
        .map(String::as_str)
        .collect();
    if stale.is_empty() {
        return Ok(Vec::new());
    }
    delete_owned_by(tree, |owner| stale.contains(owner))
}

/// Source patterns the host compiler should skip for removed classes.
pub fn source_excludes(scope: &str, remove: &[String]) -> Vec<String> {
    let scope = scope.trim_matches('/');
    remove
        .iter()
        .map(|class| {
            if scope.is_empty() {
                format!("{class}.*")
            } else {
                format!("{scope}/{class}.*")
            }
        })
        .collect()
}

/// Opportunistic classes the checkpoint permits, in universe order.
pub fn opportunistic_classes(universe: &[String], allowed: Option<&[String]>) -> Vec<String> {
    universe
        .iter()
        .filter(|class| allowed.map_or(true, |allowed| allowed.contains(class)))
        .cloned()
        .collect()
}

fn delete_owned_by<F>(tree: &ClassTree, doomed: F) -> SpliceResult<Vec<PathBuf>>
where
    F: Fn(&str) -> bool,
{
    let mut deleted = Vec::new();
    for entry in tree.class_files()? {
        if doomed(entry.top_level()) {
            fs::remove_file(&entry.path)?;
            debug!(class = %entry.name, "deleted class file");
            deleted.push(entry.path);
        }
    }
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"\xCA\xFE\xBA\xBE").unwrap();
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn removes_nested_classes_too() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "Foo.class");
        touch(dir.path(), "Foo$Bar.class");
        touch(dir.path(), "Foo$Bar$1.class");
        touch(dir.path(), "Foobar.class");

        let tree = ClassTree::new(dir.path(), "");
        let deleted = redact(&tree, &names(&["Foo"])).unwrap();
        assert_eq!(deleted.len(), 3);
        assert!(!dir.path().join("Foo.class").exists());
        assert!(!dir.path().join("Foo$Bar.class").exists());
        assert!(dir.path().join("Foobar.class").exists());
    }

    #[test]
    fn empty_set_and_no_match_are_no_ops() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "Keep.class");
        let tree = ClassTree::new(dir.path(), "");
        assert!(redact(&tree, &[]).unwrap().is_empty());
        assert!(redact(&tree, &names(&["Ghost"])).unwrap().is_empty());
        assert!(dir.path().join("Keep.class").exists());
    }

    #[test]
    fn only_the_affected_scope_is_touched() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "edu/example/Secret.class");
        touch(dir.path(), "lib/Secret.class");
        let tree = ClassTree::new(dir.path(), "edu/example");
        redact(&tree, &names(&["Secret"])).unwrap();
        assert!(!dir.path().join("edu/example/Secret.class").exists());
        assert!(dir.path().join("lib/Secret.class").exists());
    }

    #[test]
    fn prunes_stale_opportunistic_classes() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "Extra1.class");
        touch(dir.path(), "Extra2.class");
        touch(dir.path(), "Extra2$1.class");
        touch(dir.path(), "Main.class");
        let tree = ClassTree::new(dir.path(), "");
        let universe = names(&["Extra1", "Extra2"]);
        let allowed = names(&["Extra1"]);

        assert!(prune_opportunistic(&tree, &universe, None).unwrap().is_empty());
        let pruned = prune_opportunistic(&tree, &universe, Some(allowed.as_slice())).unwrap();
        assert_eq!(pruned.len(), 2);
        assert!(dir.path().join("Extra1.class").exists());
        assert!(!dir.path().join("Extra2.class").exists());
        assert!(dir.path().join("Main.class").exists());
    }

    #[test]
    fn excludes_and_opportunistic_plan() {
        assert_eq!(
            source_excludes("edu/example", &names(&["Secret"])),
            vec!["edu/example/Secret.*"]
        );
        assert_eq!(source_excludes("", &names(&["Secret"])), vec!["Secret.*"]);

        let universe = names(&["A", "B"]);
        let allowed = names(&["B"]);
        assert_eq!(opportunistic_classes(&universe, None), universe);
        assert_eq!(opportunistic_classes(&universe, Some(allowed.as_slice())), vec!["B"]);
    }
}
