/*!
 * Hash kinds and hash sets.
 *
 * A streaming hasher producing hex digests over the MD5/SHA1/NONE
 * vocabulary the equality oracle needs, plus the set algebra (`intersect`)
 * the pair builder consults to find a common hash between two backends.
 */

use std::collections::BTreeSet;
use std::fmt;
use std::io::Read;

use bytes::Bytes;
use futures::Stream;
use md5::{Digest as Md5Digest, Md5};
use sha1::Sha1;

/// A content-hash algorithm a backend may declare support for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HashKind {
    Md5,
    Sha1,
}

impl fmt::Display for HashKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashKind::Md5 => write!(f, "md5"),
            HashKind::Sha1 => write!(f, "sha1"),
        }
    }
}

impl HashKind {
    /// Compute this hash over a byte slice, returning a lowercase hex string.
    pub fn hex_of(self, data: &[u8]) -> String {
        match self {
            HashKind::Md5 => {
                let mut hasher = Md5::new();
                hasher.update(data);
                hex::encode(hasher.finalize())
            }
            HashKind::Sha1 => {
                let mut hasher = Sha1::new();
                hasher.update(data);
                hex::encode(hasher.finalize())
            }
        }
    }

    /// Compute this hash by streaming a reader in fixed-size chunks, for
    /// files too large to hold in memory at once.
    pub fn hex_of_reader<R: Read>(self, mut reader: R) -> std::io::Result<String> {
        let mut buffer = [0u8; 64 * 1024];
        match self {
            HashKind::Md5 => {
                let mut hasher = Md5::new();
                loop {
                    let n = reader.read(&mut buffer)?;
                    if n == 0 {
                        break;
                    }
                    hasher.update(&buffer[..n]);
                }
                Ok(hex::encode(hasher.finalize()))
            }
            HashKind::Sha1 => {
                let mut hasher = Sha1::new();
                loop {
                    let n = reader.read(&mut buffer)?;
                    if n == 0 {
                        break;
                    }
                    hasher.update(&buffer[..n]);
                }
                Ok(hex::encode(hasher.finalize()))
            }
        }
    }
}

/// Compute `kind` over an async byte stream, as returned by
/// `Backend::open`. Used by `md5sum`/`sha1sum` when a backend (like
/// `LocalBackend`) never attaches a hash during listing.
pub async fn hash_async_stream<S>(kind: HashKind, mut stream: S) -> std::io::Result<String>
where
    S: Stream<Item = std::io::Result<Bytes>> + Unpin,
{
    use futures::StreamExt;

    match kind {
        HashKind::Md5 => {
            let mut hasher = Md5::new();
            while let Some(chunk) = stream.next().await {
                hasher.update(&chunk?);
            }
            Ok(hex::encode(hasher.finalize()))
        }
        HashKind::Sha1 => {
            let mut hasher = Sha1::new();
            while let Some(chunk) = stream.next().await {
                hasher.update(&chunk?);
            }
            Ok(hex::encode(hasher.finalize()))
        }
    }
}

/// A set over `{MD5, SHA1, NONE}`. `NONE` is represented structurally as the
/// empty set rather than as a member, since an empty common set is exactly
/// the "hash-based equality unavailable" signal consumers care about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HashSet {
    kinds: BTreeSet<HashKind>,
}

impl HashSet {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn of(kinds: impl IntoIterator<Item = HashKind>) -> Self {
        Self {
            kinds: kinds.into_iter().collect(),
        }
    }

    pub fn contains(&self, kind: HashKind) -> bool {
        self.kinds.contains(&kind)
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = HashKind> + '_ {
        self.kinds.iter().copied()
    }

    /// The common hash set of `self` and `other`: their
    /// intersection, which is empty (never containing a synthetic NONE
    /// member) when either side declares no hashes at all.
    pub fn intersect(&self, other: &HashSet) -> HashSet {
        HashSet {
            kinds: self.kinds.intersection(&other.kinds).copied().collect(),
        }
    }

    /// Pick one representative kind from the common set, preferring the
    /// stronger algorithm when both are available.
    pub fn preferred(&self) -> Option<HashKind> {
        if self.kinds.contains(&HashKind::Sha1) {
            Some(HashKind::Sha1)
        } else {
            self.kinds.iter().next().copied()
        }
    }
}

impl FromIterator<HashKind> for HashSet {
    fn from_iter<T: IntoIterator<Item = HashKind>>(iter: T) -> Self {
        HashSet::of(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn md5_hex_of_known_vector() {
        assert_eq!(HashKind::Md5.hex_of(b""), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn sha1_hex_of_known_vector() {
        assert_eq!(
            HashKind::Sha1.hex_of(b"abc"),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
    }

    #[test]
    fn intersection_is_commutative_and_empty_when_disjoint() {
        let a = HashSet::of([HashKind::Md5]);
        let b = HashSet::of([HashKind::Sha1]);
        assert!(a.intersect(&b).is_empty());
        assert!(b.intersect(&a).is_empty());
    }

    #[test]
    fn intersection_finds_common_member() {
        let a = HashSet::of([HashKind::Md5, HashKind::Sha1]);
        let b = HashSet::of([HashKind::Sha1]);
        let common = a.intersect(&b);
        assert!(common.contains(HashKind::Sha1));
        assert!(!common.contains(HashKind::Md5));
    }

    #[test]
    fn preferred_favors_sha1() {
        let both = HashSet::of([HashKind::Md5, HashKind::Sha1]);
        assert_eq!(both.preferred(), Some(HashKind::Sha1));
    }

    #[test]
    fn empty_set_has_no_preference() {
        assert_eq!(HashSet::none().preferred(), None);
    }
}
