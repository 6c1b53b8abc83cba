//! Property-based test generators using proptest.

use proptest::prelude::*;

/// Strategy for simple class names (`Solver`, `A1`, ...).
pub fn simple_class_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Z][A-Za-z0-9]{0,11}").expect("Invalid regex")
}

/// Strategy for internal class names with an optional package path.
pub fn class_name_strategy() -> impl Strategy<Value = String> {
    (
        prop::collection::vec(
            prop::string::string_regex("[a-z][a-z0-9]{0,5}").expect("Invalid regex"),
            0..3,
        ),
        simple_class_name_strategy(),
    )
        .prop_map(|(packages, name)| {
            let mut parts = packages;
            parts.push(name);
            parts.join("/")
        })
}

/// Strategy for nested-class suffixes (`$1`, `$Inner`, `$Inner$2`).
pub fn nested_suffix_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop::string::string_regex("[A-Z0-9][A-Za-z0-9]{0,6}").expect("Invalid regex"),
        1..3,
    )
    .prop_map(|parts| parts.iter().map(|p| format!("${p}")).collect())
}

/// Strategy for segment names.
pub fn segment_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_-]{0,11}")
        .expect("Invalid regex")
        .prop_filter("segment name must not be the sentinel", |s| s != "none")
}

/// Strategy for a set of distinct segment names.
pub fn segment_names_strategy(max: usize) -> impl Strategy<Value = Vec<String>> {
    prop::collection::btree_set(segment_name_strategy(), 1..=max.max(1))
        .prop_map(|names| names.into_iter().collect())
}
