//! Protocol paths and object keys
//!
//! SFTP clients speak in slash-separated paths; the bucket speaks in keys.
//! A cleaned path is absolute, has no `.`/`..` components and no trailing
//! separator. Its object key is the same text without the leading `/`.

use crate::storage::DELIMITER;

/// Normalize a client-supplied path: resolve `.` and `..`, collapse
/// repeated separators and anchor relative paths at the root
pub fn clean_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();

    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }

    format!("/{}", parts.join("/"))
}

/// Whether a cleaned path addresses the bucket root
pub fn is_root(path: &str) -> bool {
    path == "/"
}

/// Object key for a cleaned path
pub fn object_key(path: &str) -> &str {
    path.strip_prefix('/').unwrap_or(path)
}

/// Key of the directory marker object for a cleaned path
pub fn marker_key(path: &str) -> String {
    format!("{}{}", object_key(path), DELIMITER)
}

/// Listing prefix for a cleaned path: empty for the root, otherwise the
/// object key with exactly one trailing separator
pub fn listing_prefix(path: &str) -> String {
    let key = object_key(path);
    if key.is_empty() {
        String::new()
    } else {
        format!("{}{}", key, DELIMITER)
    }
}

/// Listing prefix of the directory containing `key`
pub fn parent_prefix(key: &str) -> &str {
    let trimmed = key.strip_suffix(DELIMITER).unwrap_or(key);
    match trimmed.rfind(DELIMITER) {
        Some(pos) => &trimmed[..pos + DELIMITER.len()],
        None => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_path() {
        assert_eq!(clean_path("/"), "/");
        assert_eq!(clean_path(""), "/");
        assert_eq!(clean_path("."), "/");
        assert_eq!(clean_path("a.txt"), "/a.txt");
        assert_eq!(clean_path("/dir/"), "/dir");
        assert_eq!(clean_path("//dir///b.txt"), "/dir/b.txt");
        assert_eq!(clean_path("/dir/./sub/../b.txt"), "/dir/b.txt");
        assert_eq!(clean_path("/../.."), "/");
    }

    #[test]
    fn test_keys_and_prefixes() {
        assert_eq!(object_key("/dir/b.txt"), "dir/b.txt");
        assert_eq!(object_key("/"), "");
        assert_eq!(marker_key("/dir"), "dir/");

        assert_eq!(listing_prefix("/"), "");
        assert_eq!(listing_prefix("/dir"), "dir/");
        assert_eq!(listing_prefix("/dir/sub"), "dir/sub/");
        assert!(is_root("/"));
        assert!(!is_root("/dir"));
    }

    #[test]
    fn test_parent_prefix() {
        assert_eq!(parent_prefix("a.txt"), "");
        assert_eq!(parent_prefix("dir/"), "");
        assert_eq!(parent_prefix("dir/b.txt"), "dir/");
        assert_eq!(parent_prefix("dir/sub/"), "dir/");
    }
}
