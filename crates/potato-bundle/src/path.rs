//! Entry path helpers
//!
//! Entry paths are plain strings split on a configurable separator. Stored
//! paths usually start with the separator (`\data\file.bin`); empty segments
//! are ignored when deriving folders.

/// Last segment of `path`
pub fn file_name(path: &str, separator: char) -> &str {
    path.rsplit(separator).next().unwrap_or(path)
}

/// Everything before the last separator, `None` if there is none
///
/// This is the raw prefix, leading separators included, used to build
/// sibling paths.
pub fn raw_parent(path: &str, separator: char) -> Option<&str> {
    path.rfind(separator).map(|index| &path[..index])
}

/// Path of a sibling entry called `name`
///
/// Always `parent + separator + name`; a path without a separator has an
/// empty parent, so its sibling lands in the root.
pub fn sibling(path: &str, name: &str, separator: char) -> String {
    let parent = raw_parent(path, separator).unwrap_or_default();
    format!("{parent}{separator}{name}")
}

/// Non-empty segments of `path`
pub fn segments(path: &str, separator: char) -> impl Iterator<Item = &str> {
    path.split(separator).filter(|segment| !segment.is_empty())
}

/// Non-empty segments of `path` joined by the separator
pub fn normalize(path: &str, separator: char) -> String {
    segments(path, separator)
        .collect::<Vec<_>>()
        .join(&separator.to_string())
}

/// Normalized folder of an entry: its non-empty segments except the last,
/// joined by the separator. Root entries have an empty folder.
pub fn folder(path: &str, separator: char) -> String {
    let parts: Vec<&str> = segments(path, separator).collect();
    match parts.split_last() {
        Some((_, dirs)) => dirs.join(&separator.to_string()),
        None => String::new(),
    }
}
