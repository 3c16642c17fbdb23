//! The "limited" backend view: constructed when a `name:path` reference
//! names an existing single object rather than a container. Its listing
//! yields exactly that one object and its mutating operations target it,
//! so `copy source:file dest:dir/` drives the same pipeline as a
//! directory-to-directory copy instead of needing a special single-file
//! code path in the orchestrator.
//!
//! A decorator over an inner `Backend` that delegates everything and
//! overrides only `list`.

use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::backend::error::BackendResult;
use crate::backend::types::{ListEntry, ListOptions, ModTime, Object, ObjectReader, ObjectStream, Precision};
use crate::backend::{Backend, Copier, Mover};
use crate::hash::HashSet;

pub struct LimitedBackend {
    inner: Box<dyn Backend>,
    remote: String,
}

impl LimitedBackend {
    pub fn new(inner: Box<dyn Backend>, remote: impl Into<String>) -> Self {
        Self {
            inner,
            remote: remote.into(),
        }
    }
}

#[async_trait]
impl Backend for LimitedBackend {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn root(&self) -> &str {
        self.inner.root()
    }

    fn identity(&self) -> Option<&str> {
        self.inner.identity()
    }

    fn case_insensitive(&self) -> bool {
        self.inner.case_insensitive()
    }

    fn precision(&self) -> Precision {
        self.inner.precision()
    }

    fn hashes(&self) -> HashSet {
        self.inner.hashes()
    }

    /// Lists exactly the one wrapped object, or nothing if it has since
    /// disappeared — never the rest of the parent container.
    async fn list(&self, _opts: ListOptions) -> BackendResult<ObjectStream> {
        let entry = self.inner.new_object(&self.remote).await?;
        let entries: Vec<BackendResult<ListEntry>> = match entry {
            Some(obj) => vec![Ok(ListEntry::Object(obj))],
            None => Vec::new(),
        };
        Ok(Box::pin(futures::stream::iter(entries)))
    }

    async fn new_object(&self, remote: &str) -> BackendResult<Option<Object>> {
        self.inner.new_object(remote).await
    }

    async fn open(&self, remote: &str) -> BackendResult<ObjectReader> {
        self.inner.open(remote).await
    }

    async fn put(
        &self,
        reader: Box<dyn AsyncRead + Unpin + Send>,
        remote: &str,
        mod_time: ModTime,
        size: i64,
    ) -> BackendResult<Object> {
        self.inner.put(reader, remote, mod_time, size).await
    }

    async fn remove(&self, remote: &str) -> BackendResult<()> {
        self.inner.remove(remote).await
    }

    async fn set_mod_time(&self, remote: &str, mod_time: ModTime) -> BackendResult<()> {
        self.inner.set_mod_time(remote, mod_time).await
    }

    /// The wrapped object's parent container already exists (it holds the
    /// object); nothing to create.
    async fn mkdir(&self) -> BackendResult<()> {
        Ok(())
    }

    async fn rmdir(&self) -> BackendResult<()> {
        self.inner.remove(&self.remote).await
    }

    async fn purge(&self) -> BackendResult<()> {
        self.inner.remove(&self.remote).await
    }

    fn as_copier(&self) -> Option<&dyn Copier> {
        self.inner.as_copier()
    }

    fn as_mover(&self) -> Option<&dyn Mover> {
        self.inner.as_mover()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::local::LocalBackend;
    use futures::StreamExt;
    use tempfile::tempdir;

    #[tokio::test]
    async fn lists_exactly_the_wrapped_object() {
        let dir = tempdir().unwrap();
        tokio::fs::write(dir.path().join("a.txt"), b"hello").await.unwrap();
        tokio::fs::write(dir.path().join("b.txt"), b"other").await.unwrap();

        let inner = Box::new(LocalBackend::new(dir.path())) as Box<dyn Backend>;
        let limited = LimitedBackend::new(inner, "a.txt");

        let mut stream = limited.list(ListOptions::default()).await.unwrap();
        let mut seen = Vec::new();
        while let Some(entry) = stream.next().await {
            if let ListEntry::Object(obj) = entry.unwrap() {
                seen.push(obj.remote);
            }
        }
        assert_eq!(seen, vec!["a.txt".to_string()]);
    }

    #[tokio::test]
    async fn missing_wrapped_object_lists_nothing() {
        let dir = tempdir().unwrap();
        let inner = Box::new(LocalBackend::new(dir.path())) as Box<dyn Backend>;
        let limited = LimitedBackend::new(inner, "gone.txt");

        let mut stream = limited.list(ListOptions::default()).await.unwrap();
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn mkdir_is_a_noop_since_the_container_already_holds_the_object() {
        let dir = tempdir().unwrap();
        tokio::fs::write(dir.path().join("a.txt"), b"hello").await.unwrap();
        let inner = Box::new(LocalBackend::new(dir.path())) as Box<dyn Backend>;
        let limited = LimitedBackend::new(inner, "a.txt");
        limited.mkdir().await.unwrap();
    }
}
