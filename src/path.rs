//! Path normalization helpers shared by the backend layer and the pair
//! builder: canonical slash-separated remote paths, a case-folding key
//! function, and the hidden/disallowed name filter that backends consult
//! when deciding whether an entry is storable.

use std::sync::OnceLock;

use regex::Regex;

/// Rewrite a platform path separator style to the canonical `/`-separated
/// remote form used everywhere above the backend layer.
pub fn to_remote_slashes(path: &str) -> String {
    path.replace('\\', "/")
}

/// Case-folding key used when comparing remote paths against a
/// case-insensitive backend.
pub fn fold_case(remote: &str) -> String {
    remote.to_lowercase()
}

/// Names a backend customarily refuses to store or that sync conventionally
/// treats as noise: dotfiles of the form used by desktop indexers, plus a
/// couple of well-known thumbnail caches. Not every backend applies this —
/// callers opt in by checking it against the leaf name.
pub fn hidden_name_filter() -> &'static Regex {
    static FILTER: OnceLock<Regex> = OnceLock::new();
    FILTER.get_or_init(|| Regex::new(r"^(\.DS_Store|Thumbs\.db|desktop\.ini)$").unwrap())
}

/// True if `name` (a single path component, not a full path) should be
/// treated as hidden for filtering purposes independent of any user filter
/// rule: a leading dot, same convention as most Unix tooling.
pub fn is_dotfile(name: &str) -> bool {
    name.starts_with('.') && name != "." && name != ".."
}

/// Join a remote-relative path onto a root, rejecting any component that
/// would escape the root (`..`) to keep adapters from writing outside their
/// declared tree.
pub fn join_relative(root: &str, remote: &str) -> Option<String> {
    if remote.split('/').any(|seg| seg == "..") {
        return None;
    }
    let root = root.trim_end_matches('/');
    let remote = remote.trim_start_matches('/');
    if root.is_empty() {
        Some(remote.to_string())
    } else {
        Some(format!("{root}/{remote}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hidden_name_filter_matches_known_sentinels() {
        assert!(hidden_name_filter().is_match(".DS_Store"));
        assert!(hidden_name_filter().is_match("Thumbs.db"));
        assert!(!hidden_name_filter().is_match("report.pdf"));
    }

    #[test]
    fn fold_case_lowercases() {
        assert_eq!(fold_case("Documents/Report.TXT"), "documents/report.txt");
    }

    #[test]
    fn join_relative_rejects_parent_escape() {
        assert_eq!(join_relative("/srv/data", "../etc/passwd"), None);
        assert_eq!(join_relative("/srv/data", "a/b.txt"), Some("/srv/data/a/b.txt".into()));
    }

    #[test]
    fn to_remote_slashes_normalizes_backslashes() {
        assert_eq!(to_remote_slashes(r"sub\nested.txt"), "sub/nested.txt");
    }
}
