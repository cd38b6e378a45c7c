//! Canonical archive-entry path handling.
//!
//! Archive images resolve to a composite path `<archive-path>#<entry-path>`
//! with forward-slash entry separators. Consumers that might see a
//! non-canonical form (backslash separators, or none at all) must normalize
//! before use.

const SEPARATOR: char = '#';

/// Build the canonical composite path for an entry inside an archive.
pub fn compose(archive_path: &str, entry_path: &str) -> String {
    let entry = entry_path.replace('\\', "/");
    format!("{archive_path}{SEPARATOR}{entry}")
}

/// Normalize a possibly non-canonical archive path: backslashes in the
/// entry component become forward slashes, and the path is required to
/// contain exactly one `#` separator.
///
/// Returns `None` if the path is not archive-shaped (no separator) or is
/// ambiguous (more than one separator).
pub fn normalize(path: &str) -> Option<String> {
    let parts: Vec<&str> = path.split(SEPARATOR).collect();
    match parts.as_slice() {
        [archive, entry] => Some(compose(archive, entry)),
        _ => None,
    }
}

/// Split a canonical archive path into `(archive_path, entry_path)`.
pub fn split(path: &str) -> Option<(&str, &str)> {
    let mut parts = path.splitn(2, SEPARATOR);
    let archive = parts.next()?;
    let entry = parts.next()?;
    if entry.contains(SEPARATOR) {
        return None;
    }
    Some((archive, entry))
}

/// Whether a path is a composite archive-entry path.
pub fn is_archive_path(path: &str) -> bool {
    path.contains(SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composes_canonical_form() {
        assert_eq!(
            compose("/archives/summer.zip", "photos/a.jpg"),
            "/archives/summer.zip#photos/a.jpg"
        );
    }

    #[test]
    fn normalizes_backslash_entry_separators() {
        let normalized = normalize("/archives/summer.zip#photos\\a.jpg").unwrap();
        assert_eq!(normalized, "/archives/summer.zip#photos/a.jpg");
    }

    #[test]
    fn rejects_paths_with_no_separator() {
        assert!(normalize("/archives/summer.zip").is_none());
    }

    #[test]
    fn rejects_paths_with_multiple_separators() {
        assert!(normalize("/archives/summer.zip#a#b").is_none());
    }

    #[test]
    fn splits_canonical_path() {
        let (archive, entry) = split("/archives/summer.zip#photos/a.jpg").unwrap();
        assert_eq!(archive, "/archives/summer.zip");
        assert_eq!(entry, "photos/a.jpg");
    }
}
