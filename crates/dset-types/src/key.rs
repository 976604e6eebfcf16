//! Dataset-relative keys.
//!
//! A key is a `/`-separated path relative to the revision directory. Keys for
//! directories end in `/`; keys for files never do.

use std::cmp::Ordering;
use std::path::{Component, Path};

use crate::error::TypeError;

/// Whether the key names a directory.
pub fn is_dir_key(key: &str) -> bool {
    key.ends_with('/')
}

/// Normalize a key to its directory form (`a/b` -> `a/b/`).
pub fn dir_key(key: &str) -> String {
    if is_dir_key(key) {
        key.to_string()
    } else {
        format!("{key}/")
    }
}

/// The parent directory key, or `None` for a top-level key.
///
/// ```
/// use dset_types::parent_key;
/// assert_eq!(parent_key("a/b/c.txt"), Some("a/b/".to_string()));
/// assert_eq!(parent_key("a/b/"), Some("a/".to_string()));
/// assert_eq!(parent_key("top.txt"), None);
/// ```
pub fn parent_key(key: &str) -> Option<String> {
    let trimmed = key.trim_end_matches('/');
    trimmed.rfind('/').map(|idx| trimmed[..=idx].to_string())
}

/// Build a key from a path relative to the revision directory.
///
/// Separators are normalized to `/`. Absolute paths and `..` components are
/// rejected so a key can never escape the revision directory.
pub fn key_from_relative(path: &Path, is_dir: bool) -> Result<String, TypeError> {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => {
                let part = part
                    .to_str()
                    .ok_or_else(|| TypeError::InvalidPath(path.display().to_string()))?;
                parts.push(part.to_string());
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(TypeError::InvalidPath(path.display().to_string()));
            }
        }
    }
    if parts.is_empty() {
        return Err(TypeError::InvalidPath(path.display().to_string()));
    }
    let mut key = parts.join("/");
    if is_dir {
        key.push('/');
    }
    Ok(key)
}

/// Compare two strings treating runs of ASCII digits as numbers.
///
/// `file2` sorts before `file10`. Ties between equal numeric values with a
/// different number of leading zeros are broken by the shorter run first,
/// then by plain byte order so the ordering stays total.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (ab, bb) = (a.as_bytes(), b.as_bytes());
    let (mut i, mut j) = (0, 0);

    while i < ab.len() && j < bb.len() {
        if ab[i].is_ascii_digit() && bb[j].is_ascii_digit() {
            let si = i;
            while i < ab.len() && ab[i].is_ascii_digit() {
                i += 1;
            }
            let sj = j;
            while j < bb.len() && bb[j].is_ascii_digit() {
                j += 1;
            }
            let na = trim_zeros(&ab[si..i]);
            let nb = trim_zeros(&bb[sj..j]);
            let ord = na
                .len()
                .cmp(&nb.len())
                .then_with(|| na.cmp(nb))
                .then_with(|| (i - si).cmp(&(j - sj)));
            if ord != Ordering::Equal {
                return ord;
            }
        } else {
            let ord = ab[i].cmp(&bb[j]);
            if ord != Ordering::Equal {
                return ord;
            }
            i += 1;
            j += 1;
        }
    }

    (ab.len() - i).cmp(&(bb.len() - j)).then_with(|| a.cmp(b))
}

fn trim_zeros(digits: &[u8]) -> &[u8] {
    let start = digits.iter().position(|&d| d != b'0').unwrap_or(digits.len());
    &digits[start..]
}

/// Natural-sort and de-duplicate a list of keys in place.
pub fn natural_sort_dedup(keys: &mut Vec<String>) {
    keys.sort_by(|a, b| natural_cmp(a, b));
    keys.dedup();
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::path::PathBuf;

    // ------------------------------------------------------------------
    // Key helpers
    // ------------------------------------------------------------------

    #[test]
    fn dir_key_is_idempotent() {
        assert_eq!(dir_key("a/b"), "a/b/");
        assert_eq!(dir_key("a/b/"), "a/b/");
        assert!(is_dir_key("x/"));
        assert!(!is_dir_key("x"));
    }

    #[test]
    fn parent_of_nested_and_top_level() {
        assert_eq!(parent_key("dir1/test2.txt"), Some("dir1/".into()));
        assert_eq!(parent_key("dir1/sub/"), Some("dir1/".into()));
        assert_eq!(parent_key("dir1/"), None);
        assert_eq!(parent_key("test1.txt"), None);
    }

    #[test]
    fn key_from_relative_normalizes() {
        let p = PathBuf::from("dir1").join("sub").join("f.txt");
        assert_eq!(key_from_relative(&p, false).unwrap(), "dir1/sub/f.txt");
        assert_eq!(key_from_relative(Path::new("./dir1"), true).unwrap(), "dir1/");
    }

    #[test]
    fn key_from_relative_rejects_escape() {
        assert!(key_from_relative(Path::new("../secret"), false).is_err());
        assert!(key_from_relative(Path::new("/etc/passwd"), false).is_err());
        assert!(key_from_relative(Path::new(""), false).is_err());
    }

    // ------------------------------------------------------------------
    // Natural sort
    // ------------------------------------------------------------------

    #[test]
    fn numbers_sort_by_value() {
        let mut keys = vec![
            "file10.txt".to_string(),
            "file2.txt".to_string(),
            "file1.txt".to_string(),
            "file2.txt".to_string(),
        ];
        natural_sort_dedup(&mut keys);
        assert_eq!(keys, vec!["file1.txt", "file2.txt", "file10.txt"]);
    }

    #[test]
    fn directory_sorts_before_its_children() {
        let mut keys = vec!["dir1/test2.txt".to_string(), "dir1/".to_string()];
        natural_sort_dedup(&mut keys);
        assert_eq!(keys, vec!["dir1/", "dir1/test2.txt"]);
    }

    #[test]
    fn leading_zeros_break_ties() {
        assert_eq!(natural_cmp("a01", "a1"), Ordering::Greater);
        assert_eq!(natural_cmp("a1", "a1"), Ordering::Equal);
    }

    proptest! {
        #[test]
        fn natural_cmp_is_antisymmetric(a in "[a-c0-9]{0,8}", b in "[a-c0-9]{0,8}") {
            prop_assert_eq!(natural_cmp(&a, &b), natural_cmp(&b, &a).reverse());
        }

        #[test]
        fn natural_cmp_equal_only_for_identical(a in "[a-c0-9]{0,8}", b in "[a-c0-9]{0,8}") {
            if natural_cmp(&a, &b) == Ordering::Equal {
                prop_assert_eq!(a, b);
            }
        }

        #[test]
        fn sort_dedup_yields_sorted_unique(mut keys in proptest::collection::vec("[a-c0-9/]{1,6}", 0..20)) {
            natural_sort_dedup(&mut keys);
            for pair in keys.windows(2) {
                prop_assert_eq!(natural_cmp(&pair[0], &pair[1]), Ordering::Less);
            }
        }
    }
}
