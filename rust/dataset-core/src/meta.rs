// rust/dataset-core/src/meta.rs

//! Metadata resolution.
//!
//! Metadata comes from three places: what the caller passes in, what the
//! dataset variant declares as its defaults, and what the annotation file
//! itself declares. They are merged key-wise with a fixed priority:
//!
//! ```text
//! user_supplied > class_default > file_declared
//! ```
//!
//! Resolution is pure, so metadata can be produced before any annotation
//! file is opened.

use crate::value::Metadata;

/// Merges the three metadata sources by priority.
///
/// Every key present in any source appears in the result; its value comes
/// from the highest-priority source defining it.
pub fn resolve_metadata(
    user_supplied: &Metadata,
    class_default: &Metadata,
    file_declared: &Metadata,
) -> Metadata {
    let mut merged = file_declared.clone();
    merged.extend(class_default.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged.extend(user_supplied.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

/// Folds file-declared metadata into an already resolved mapping.
///
/// Keys already present win, so applying this after [`resolve_metadata`]
/// with an empty file source gives the same result as resolving all three
/// sources at once.
pub fn merge_file_declared(resolved: &mut Metadata, file_declared: &Metadata) {
    for (key, value) in file_declared {
        resolved
            .entry(key.clone())
            .or_insert_with(|| value.clone());
    }
}

/// Compares two metadata mappings, skipping `ignore_keys`.
///
/// Returns the first key whose presence or value differs.
pub fn first_mismatch<'a>(
    left: &'a Metadata,
    right: &'a Metadata,
    ignore_keys: &[String],
) -> Option<&'a str> {
    let ignored = |key: &str| ignore_keys.iter().any(|k| k == key);

    for (key, value) in left {
        if ignored(key) {
            continue;
        }
        if right.get(key) != Some(value) {
            return Some(key);
        }
    }
    right
        .keys()
        .find(|key| !ignored(key) && !left.contains_key(*key))
        .map(String::as_str)
}
