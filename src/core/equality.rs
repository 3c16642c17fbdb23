//! The equality oracle: decides whether a transfer is needed for a
//! source/destination object pair.
//!
//! Built on `backend::types::{ModTime, Precision}` and
//! `hash::HashSet::{intersect, preferred}`, following the general shape of
//! "compare two file descriptions, return a verdict" helpers.

use std::time::Duration;

use crate::backend::types::{ModTime, Object, Precision};
use crate::hash::HashKind;

/// Equality comparison mode, driven by CLI flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareMode {
    /// `--ignore-existing`: any existing destination object is equal.
    IgnoreExisting,
    /// `--size-only`: equal iff sizes match.
    SizeOnly,
    /// `--checksum`: prefer a common hash, falling back to size+mtime.
    Checksum,
    /// Default: size + modify-window comparison.
    Default,
}

/// Outcome of comparing a source/destination pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EqualityVerdict {
    /// No transfer needed.
    Equal,
    /// Objects differ in a way that requires a transfer.
    Transfer,
    /// Content is equal but mtimes disagree within mtime-supporting
    /// stores; the caller should call `SetModTime` on the destination
    /// instead of re-transferring.
    EqualFixModTime,
}

/// Decide whether `dst` needs to be brought in line with `src`. The
/// decision policy below is evaluated in order.
pub fn decide(
    src: &Object,
    dst: &Object,
    mode: CompareMode,
    src_precision: Precision,
    dst_precision: Precision,
    configured_window: Duration,
) -> EqualityVerdict {
    if mode == CompareMode::IgnoreExisting {
        return EqualityVerdict::Equal;
    }

    if mode == CompareMode::SizeOnly {
        return if src.size == dst.size {
            EqualityVerdict::Equal
        } else {
            EqualityVerdict::Transfer
        };
    }

    if mode == CompareMode::Checksum {
        let common = src_hashes(src).intersect(&dst_hashes(dst));
        if let Some(kind) = common.preferred() {
            return match (src.hash(kind), dst.hash(kind)) {
                (Some(a), Some(b)) if src.size == dst.size && a.eq_ignore_ascii_case(b) => {
                    EqualityVerdict::Equal
                }
                _ => EqualityVerdict::Transfer,
            };
        }
        // No common hash: fall back to size + mtime, without the mtime
        // repair path (checksum mode suppresses repair).
        return if sizes_and_mtimes_match(src, dst, src_precision, dst_precision, configured_window) {
            EqualityVerdict::Equal
        } else {
            EqualityVerdict::Transfer
        };
    }

    // Default branch.
    if !src.mod_time.is_known() || !dst.mod_time.is_known() {
        // Backends declaring no mtime support force the size-only branch.
        return if src.size == dst.size {
            EqualityVerdict::Equal
        } else {
            EqualityVerdict::Transfer
        };
    }

    if sizes_and_mtimes_match(src, dst, src_precision, dst_precision, configured_window) {
        return EqualityVerdict::Equal;
    }

    if src.size == dst.size {
        // Sizes match but mtimes don't: see whether a common hash confirms
        // content equality, in which case only the mtime needs repair.
        let common = src_hashes(src).intersect(&dst_hashes(dst));
        if let Some(kind) = common.preferred() {
            if let (Some(a), Some(b)) = (src.hash(kind), dst.hash(kind)) {
                if a.eq_ignore_ascii_case(b) {
                    return if dst_precision.is_supported() {
                        EqualityVerdict::EqualFixModTime
                    } else {
                        EqualityVerdict::Equal
                    };
                }
            }
        }
    }

    EqualityVerdict::Transfer
}

pub(crate) fn sizes_and_mtimes_match(
    src: &Object,
    dst: &Object,
    src_precision: Precision,
    dst_precision: Precision,
    configured_window: Duration,
) -> bool {
    if src.size != dst.size {
        return false;
    }
    let window = src_precision
        .as_duration()
        .max(dst_precision.as_duration())
        .max(configured_window);

    match src.mod_time.abs_diff(&dst.mod_time) {
        Some(diff) => diff.to_std().unwrap_or(Duration::MAX) <= window,
        None => false,
    }
}

fn src_hashes(obj: &Object) -> crate::hash::HashSet {
    obj.hashes.keys().copied().collect()
}

fn dst_hashes(obj: &Object) -> crate::hash::HashSet {
    obj.hashes.keys().copied().collect()
}
