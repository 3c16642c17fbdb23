//! The backend abstraction: a capability-polymorphic adapter over one
//! storage system.
//!
//! Every adapter implements the required `Backend` methods below. Optional
//! capabilities (`Copier`, `Mover`, `Purge`) are advertised through
//! `as_copier`/`as_mover`/`purge`, each defaulting to "unsupported" so the
//! orchestrator can probe and fall back rather than every adapter being
//! forced to implement every method.

pub mod config;
pub mod error;
pub mod limited;
pub mod local;
pub mod registry;
pub mod types;

use async_trait::async_trait;
use tokio::io::AsyncRead;

pub use error::{BackendError, BackendResult};
pub use limited::LimitedBackend;
pub use local::LocalBackend;
pub use types::{Directory, ListEntry, ListOptions, ModTime, Object, ObjectReader, ObjectStream, Precision};

use crate::hash::HashSet;

/// The required contract every storage adapter implements.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Short identifying name, e.g. "local", "s3".
    fn name(&self) -> &str;

    /// The root path this backend was constructed against.
    fn root(&self) -> &str;

    /// Stable identity of the account/config-section this backend was
    /// built from, independent of `root`. Two backend instances sharing an
    /// identity name the same underlying storage account and can
    /// server-side copy/move between their respective roots even when
    /// those roots differ. `None` is the conservative default: a backend
    /// built from a bare path (no named remote) is never assumed to share
    /// an account with any other instance.
    fn identity(&self) -> Option<&str> {
        None
    }

    /// Whether this backend folds case when comparing remote paths.
    fn case_insensitive(&self) -> bool {
        false
    }

    /// Declared modification-time precision, or `NotSupported`.
    fn precision(&self) -> Precision;

    /// Declared hash set. Immutable for the run.
    fn hashes(&self) -> HashSet;

    /// Stream every storable object (and, if requested, directory marker)
    /// under `root`. A single set-error on the sink aborts the listing.
    async fn list(&self, opts: ListOptions) -> BackendResult<ObjectStream>;

    /// Resolve a single relative path to an `Object`, or `None` if it does
    /// not exist. Never raises for a missing object; only for a transport
    /// failure, which is returned as `Err`.
    async fn new_object(&self, remote: &str) -> BackendResult<Option<Object>>;

    /// Open a byte stream over an existing object.
    async fn open(&self, remote: &str) -> BackendResult<ObjectReader>;

    /// Write `reader` to `remote`. `size` is `-1` if unknown in advance.
    /// On failure the destination may hold a partial object; the caller
    /// decides whether to clean it up.
    async fn put(
        &self,
        reader: Box<dyn AsyncRead + Unpin + Send>,
        remote: &str,
        mod_time: ModTime,
        size: i64,
    ) -> BackendResult<Object>;

    /// Remove a single object.
    async fn remove(&self, remote: &str) -> BackendResult<()>;

    /// Best-effort mtime update. Callers gate on `precision().is_supported()`.
    async fn set_mod_time(&self, remote: &str, mod_time: ModTime) -> BackendResult<()>;

    /// Ensure the root container exists. Idempotent.
    async fn mkdir(&self) -> BackendResult<()>;

    /// Remove the root if it is empty. "not empty" and "not found" are
    /// distinct `BackendError` variants.
    async fn rmdir(&self) -> BackendResult<()>;

    /// Recursive delete of the whole root, used by sync for efficient
    /// wipes. Defaults to unsupported; backends that can do this natively
    /// (object stores with a bucket-prefix delete) should override it.
    async fn purge(&self) -> BackendResult<()> {
        Err(BackendError::Unsupported {
            backend: self.name().to_string(),
            operation: "purge".to_string(),
        })
    }

    /// Same-backend server-side copy, if this adapter implements `Copier`.
    fn as_copier(&self) -> Option<&dyn Copier> {
        None
    }

    /// Same-backend server-side move, if this adapter implements `Mover`.
    fn as_mover(&self) -> Option<&dyn Mover> {
        None
    }
}

/// Optional server-side copy capability. Only ever invoked when source and
/// destination share a backend `identity()`. `dst_root` carries the
/// destination's own root, since the two sides can resolve to different
/// roots under the same account.
#[async_trait]
pub trait Copier: Send + Sync {
    async fn copy(&self, src_remote: &str, dst_root: &str, dst_remote: &str) -> BackendResult<Object>;
}

/// Optional server-side move capability. Same cross-root contract as
/// `Copier`.
#[async_trait]
pub trait Mover: Send + Sync {
    async fn move_object(&self, src_remote: &str, dst_root: &str, dst_remote: &str) -> BackendResult<Object>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_case_insensitive_is_false() {
        struct Stub;
        #[async_trait]
        impl Backend for Stub {
            fn name(&self) -> &str {
                "stub"
            }
            fn root(&self) -> &str {
                ""
            }
            fn precision(&self) -> Precision {
                Precision::NotSupported
            }
            fn hashes(&self) -> HashSet {
                HashSet::none()
            }
            async fn list(&self, _opts: ListOptions) -> BackendResult<ObjectStream> {
                unimplemented!()
            }
            async fn new_object(&self, _remote: &str) -> BackendResult<Option<Object>> {
                Ok(None)
            }
            async fn open(&self, _remote: &str) -> BackendResult<ObjectReader> {
                unimplemented!()
            }
            async fn put(
                &self,
                _reader: Box<dyn AsyncRead + Unpin + Send>,
                _remote: &str,
                _mod_time: ModTime,
                _size: i64,
            ) -> BackendResult<Object> {
                unimplemented!()
            }
            async fn remove(&self, _remote: &str) -> BackendResult<()> {
                Ok(())
            }
            async fn set_mod_time(&self, _remote: &str, _mod_time: ModTime) -> BackendResult<()> {
                Ok(())
            }
            async fn mkdir(&self) -> BackendResult<()> {
                Ok(())
            }
            async fn rmdir(&self) -> BackendResult<()> {
                Ok(())
            }
        }

        let stub = Stub;
        assert!(!stub.case_insensitive());
        assert!(stub.as_copier().is_none());
    }
}
