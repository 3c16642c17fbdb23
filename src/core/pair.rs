//! The pair builder: buffers one side's listing keyed by remote path and
//! matches it against the other, producing ordered (src, dst) pairs plus
//! the leftover source-only and destination-only remainders.
//!
//! Builds a map of one tree, then probes it while walking the other, using
//! `path::fold_case` for destination case-insensitivity.

use std::collections::HashMap;

use crate::backend::types::Object;

/// One (possibly partial) correspondence between a source and destination
/// object sharing a remote path.
#[derive(Debug, Clone)]
pub struct Pair {
    /// The remote path this pair was matched on (source's casing when
    /// both sides are present).
    pub remote: String,
    pub src: Option<Object>,
    pub dst: Option<Object>,
}

/// Match `src_objects` against `dst_objects` by remote path, case-folded
/// when `case_insensitive` (the destination backend's declared folding).
/// Every source object yields exactly one pair;
/// leftover destination objects with no matching source become
/// destination-only pairs (deletion candidates upstream).
pub fn build_pairs(src_objects: Vec<Object>, dst_objects: Vec<Object>, case_insensitive: bool) -> Vec<Pair> {
    let key = |remote: &str| -> String {
        if case_insensitive {
            crate::path::fold_case(remote)
        } else {
            remote.to_string()
        }
    };

    let mut dst_by_key: HashMap<String, Object> =
        dst_objects.into_iter().map(|o| (key(&o.remote), o)).collect();

    let mut pairs = Vec::with_capacity(dst_by_key.len());

    for src in src_objects {
        let dst = dst_by_key.remove(&key(&src.remote));
        pairs.push(Pair {
            remote: src.remote.clone(),
            src: Some(src),
            dst,
        });
    }

    for (_, dst) in dst_by_key {
        pairs.push(Pair {
            remote: dst.remote.clone(),
            src: None,
            dst: Some(dst),
        });
    }

    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::types::ModTime;

    fn obj(remote: &str, size: i64) -> Object {
        Object::new(remote, size, ModTime::Unknown)
    }

    #[test]
    fn matches_objects_present_on_both_sides() {
        let pairs = build_pairs(vec![obj("a.txt", 1)], vec![obj("a.txt", 1)], false);
        assert_eq!(pairs.len(), 1);
        assert!(pairs[0].src.is_some());
        assert!(pairs[0].dst.is_some());
    }

    #[test]
    fn source_only_object_becomes_upload_candidate() {
        let pairs = build_pairs(vec![obj("new.txt", 5)], vec![], false);
        assert_eq!(pairs.len(), 1);
        assert!(pairs[0].src.is_some());
        assert!(pairs[0].dst.is_none());
    }

    #[test]
    fn destination_only_object_becomes_deletion_candidate() {
        let pairs = build_pairs(vec![], vec![obj("stale.txt", 5)], false);
        assert_eq!(pairs.len(), 1);
        assert!(pairs[0].src.is_none());
        assert!(pairs[0].dst.is_some());
    }

    #[test]
    fn case_insensitive_destination_folds_names_before_matching() {
        let pairs = build_pairs(vec![obj("Report.TXT", 1)], vec![obj("report.txt", 1)], true);
        assert_eq!(pairs.len(), 1);
        assert!(pairs[0].src.is_some());
        assert!(pairs[0].dst.is_some());
    }

    #[test]
    fn case_sensitive_destination_treats_different_casing_as_distinct() {
        let pairs = build_pairs(vec![obj("Report.TXT", 1)], vec![obj("report.txt", 1)], false);
        assert_eq!(pairs.len(), 2);
    }
}
