//! The Object/Directory/ListEntry data model: a flat object record keyed
//! by remote path, carrying whatever hashes the backend chose to compute
//! during listing.

use std::collections::BTreeMap;
use std::pin::Pin;

use bytes::Bytes;
use futures::Stream;

use crate::backend::error::BackendResult;
use crate::hash::HashKind;

/// Timestamp at a backend's native precision, or "unknown".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModTime {
    Known(chrono::DateTime<chrono::Utc>),
    Unknown,
}

impl ModTime {
    pub fn known(t: chrono::DateTime<chrono::Utc>) -> Self {
        ModTime::Known(t)
    }

    pub fn is_known(&self) -> bool {
        matches!(self, ModTime::Known(_))
    }

    /// Absolute difference between two known mod times; `None` if either is
    /// unknown.
    pub fn abs_diff(&self, other: &ModTime) -> Option<chrono::Duration> {
        match (self, other) {
            (ModTime::Known(a), ModTime::Known(b)) => {
                let d = *a - *b;
                Some(if d < chrono::Duration::zero() { -d } else { d })
            }
            _ => None,
        }
    }
}

/// Modification-time granularity a backend can represent, or `NotSupported`
/// if the backend cannot represent mtimes at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precision {
    NotSupported,
    Duration(std::time::Duration),
}

impl Precision {
    pub fn is_supported(&self) -> bool {
        !matches!(self, Precision::NotSupported)
    }

    /// `Duration::ZERO` for unsupported precision so `max()` composition in
    /// the equality oracle's modify-window calculation degrades gracefully.
    pub fn as_duration(&self) -> std::time::Duration {
        match self {
            Precision::NotSupported => std::time::Duration::ZERO,
            Precision::Duration(d) => *d,
        }
    }
}

/// The unit of transfer.
#[derive(Debug, Clone)]
pub struct Object {
    /// Path relative to the Backend's root, canonical slash-separated, no
    /// leading slash.
    pub remote: String,
    /// Non-negative byte count, or `-1` if unknown pre-transfer.
    pub size: i64,
    pub mod_time: ModTime,
    /// HashKind -> lowercase hex string. Possibly empty.
    pub hashes: BTreeMap<HashKind, String>,
    /// Whether the backend will accept this object on write; `false` for
    /// sentinel entries a backend refuses to round-trip.
    pub storable: bool,
}

impl Object {
    pub fn new(remote: impl Into<String>, size: i64, mod_time: ModTime) -> Self {
        Self {
            remote: remote.into(),
            size,
            mod_time,
            hashes: BTreeMap::new(),
            storable: true,
        }
    }

    pub fn with_hash(mut self, kind: HashKind, hex: impl Into<String>) -> Self {
        self.hashes.insert(kind, hex.into().to_lowercase());
        self
    }

    pub fn unstorable(mut self) -> Self {
        self.storable = false;
        self
    }

    /// Hash for `kind`, if this object carries one. Case already normalized
    /// to lowercase at construction so callers can compare case-insensitively.
    pub fn hash(&self, kind: HashKind) -> Option<&str> {
        self.hashes.get(&kind).map(|s| s.as_str())
    }
}

/// A weak entity representing a directory in a listing. Not an ownership
/// root for objects.
#[derive(Debug, Clone)]
pub struct Directory {
    pub name: String,
    pub when: Option<chrono::DateTime<chrono::Utc>>,
    pub bytes: i64,
    pub count: i64,
}

impl Directory {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            when: None,
            bytes: -1,
            count: -1,
        }
    }
}

/// An entry yielded by `Backend::list`: either a storable object or a
/// directory marker (only emitted when `ListOptions::directories` is set).
#[derive(Debug, Clone)]
pub enum ListEntry {
    Object(Object),
    Directory(Directory),
}

/// Options controlling a `Backend::list` call.
#[derive(Debug, Clone)]
pub struct ListOptions {
    pub recursive: bool,
    pub directories: bool,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            recursive: true,
            directories: false,
        }
    }
}

impl ListOptions {
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn with_directories(mut self, directories: bool) -> Self {
        self.directories = directories;
        self
    }
}

/// Lazy stream of listing entries, bounded in memory regardless of remote
/// size. Every adapter returns the same boxed stream type rather than
/// forcing a generic associated type through the whole call chain.
pub type ObjectStream = Pin<Box<dyn Stream<Item = BackendResult<ListEntry>> + Send>>;

/// Byte stream returned by `Backend::open`.
pub type ObjectReader = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;
