//! Local filesystem backend.
//!
//! Path resolution under an optional root, `filetime` for mtime
//! round-tripping, and chunked streaming reads/writes. Implements `Copier`
//! and `Mover` over plain `tokio::fs` calls so same-backend server-side
//! copy/move has a real adapter to exercise.

use std::path::PathBuf;
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

use crate::backend::error::{BackendError, BackendResult};
use crate::backend::types::{
    Directory, ListEntry, ListOptions, ModTime, Object, ObjectReader, ObjectStream, Precision,
};
use crate::backend::{Backend, Copier, Mover};
use crate::hash::HashSet;
use crate::path::hidden_name_filter;

pub struct LocalBackend {
    root: PathBuf,
    identity: Option<String>,
}

impl LocalBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            identity: None,
        }
    }

    /// Tag this instance with the name of the remote-table entry it was
    /// built from, so a sibling instance built from the same entry (but a
    /// different subpath) is recognized as the same backend.
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    fn resolve(&self, remote: &str) -> PathBuf {
        self.root.join(remote.trim_start_matches('/'))
    }

    fn resolve_under(root: &str, remote: &str) -> PathBuf {
        PathBuf::from(root).join(remote.trim_start_matches('/'))
    }

    async fn preserve_mtime(src: &std::path::Path, dst: &std::path::Path) -> BackendResult<()> {
        let src_meta = tokio::fs::metadata(src).await.map_err(BackendError::from)?;
        let Ok(modified) = src_meta.modified() else {
            return Ok(());
        };
        let Ok(d) = modified.duration_since(UNIX_EPOCH) else {
            return Ok(());
        };
        let ft = filetime::FileTime::from_unix_time(d.as_secs() as i64, d.subsec_nanos());
        let dst = dst.to_path_buf();
        tokio::task::spawn_blocking(move || filetime::set_file_mtime(&dst, ft))
            .await
            .map_err(|e| BackendError::Other {
                backend: "local".into(),
                message: e.to_string(),
            })?
            .map_err(BackendError::from)
    }

    fn metadata_to_object(remote: String, meta: &std::fs::Metadata) -> Object {
        let mod_time = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| {
                ModTime::known(
                    chrono::DateTime::from_timestamp(d.as_secs() as i64, d.subsec_nanos())
                        .unwrap_or_default(),
                )
            })
            .unwrap_or(ModTime::Unknown);

        let leaf = remote.rsplit('/').next().unwrap_or(remote.as_str());
        let storable = !hidden_name_filter().is_match(leaf);

        Object {
            remote,
            size: meta.len() as i64,
            mod_time,
            hashes: Default::default(),
            storable,
        }
    }

    async fn walk(root: PathBuf, opts: ListOptions) -> BackendResult<Vec<ListEntry>> {
        let mut out = Vec::new();
        let mut stack = vec![root.clone()];

        while let Some(dir) = stack.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await.map_err(BackendError::from)?;
            while let Some(entry) = entries.next_entry().await.map_err(BackendError::from)? {
                let path = entry.path();
                let meta = entry.metadata().await.map_err(BackendError::from)?;
                let rel_os = path.strip_prefix(&root).unwrap_or(&path).as_os_str();
                if rel_os.to_str().is_none() {
                    tracing::warn!(
                        path = %rel_os.to_string_lossy(),
                        "path contains invalid UTF-8; remapping to replacement characters"
                    );
                }
                let rel = rel_os
                    .to_string_lossy()
                    .replace(std::path::MAIN_SEPARATOR, "/");

                if meta.is_dir() {
                    if opts.directories {
                        out.push(ListEntry::Directory(Directory::new(rel)));
                    }
                    if opts.recursive {
                        stack.push(path);
                    }
                } else if meta.is_file() {
                    out.push(ListEntry::Object(Self::metadata_to_object(rel, &meta)));
                }
            }
        }

        Ok(out)
    }
}

#[async_trait]
impl Backend for LocalBackend {
    fn name(&self) -> &str {
        "local"
    }

    fn root(&self) -> &str {
        self.root.to_str().unwrap_or("")
    }

    fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    fn precision(&self) -> Precision {
        // Most local filesystems (ext4, APFS, NTFS) represent mtimes at
        // sub-second granularity; 1s is the conservative floor used when
        // the exact filesystem isn't known.
        Precision::Duration(std::time::Duration::from_secs(1))
    }

    fn hashes(&self) -> HashSet {
        HashSet::of([crate::hash::HashKind::Md5, crate::hash::HashKind::Sha1])
    }

    async fn list(&self, opts: ListOptions) -> BackendResult<ObjectStream> {
        let entries = Self::walk(self.root.clone(), opts).await?;
        Ok(Box::pin(stream::iter(entries.into_iter().map(Ok))))
    }

    async fn new_object(&self, remote: &str) -> BackendResult<Option<Object>> {
        let path = self.resolve(remote);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => {
                Ok(Some(Self::metadata_to_object(remote.to_string(), &meta)))
            }
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BackendError::from(e)),
        }
    }

    async fn open(&self, remote: &str) -> BackendResult<ObjectReader> {
        let path = self.resolve(remote);
        let file = tokio::fs::File::open(&path).await.map_err(BackendError::from)?;
        let stream = stream::unfold(tokio::io::BufReader::new(file), |mut reader| async move {
            let mut buf = vec![0u8; 64 * 1024];
            match reader.read(&mut buf).await {
                Ok(0) => None,
                Ok(n) => {
                    buf.truncate(n);
                    Some((Ok(Bytes::from(buf)), reader))
                }
                Err(e) => Some((Err(e), reader)),
            }
        });
        Ok(Box::pin(stream))
    }

    async fn put(
        &self,
        mut reader: Box<dyn AsyncRead + Unpin + Send>,
        remote: &str,
        mod_time: ModTime,
        _size: i64,
    ) -> BackendResult<Object> {
        let path = self.resolve(remote);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(BackendError::from)?;
        }

        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(BackendError::from)?;
        let written = tokio::io::copy(&mut reader, &mut file)
            .await
            .map_err(BackendError::from)?;
        file.flush().await.map_err(BackendError::from)?;

        if let ModTime::Known(t) = mod_time {
            let ft = filetime::FileTime::from_unix_time(t.timestamp(), t.timestamp_subsec_nanos());
            let path = path.clone();
            tokio::task::spawn_blocking(move || filetime::set_file_mtime(&path, ft))
                .await
                .map_err(|e| BackendError::Other {
                    backend: "local".into(),
                    message: e.to_string(),
                })?
                .map_err(BackendError::from)?;
        }

        Ok(Object::new(remote.to_string(), written as i64, mod_time))
    }

    async fn remove(&self, remote: &str) -> BackendResult<()> {
        tokio::fs::remove_file(self.resolve(remote))
            .await
            .map_err(BackendError::from)
    }

    async fn set_mod_time(&self, remote: &str, mod_time: ModTime) -> BackendResult<()> {
        let ModTime::Known(t) = mod_time else {
            return Ok(());
        };
        let path = self.resolve(remote);
        let ft = filetime::FileTime::from_unix_time(t.timestamp(), t.timestamp_subsec_nanos());
        tokio::task::spawn_blocking(move || filetime::set_file_mtime(&path, ft))
            .await
            .map_err(|e| BackendError::Other {
                backend: "local".into(),
                message: e.to_string(),
            })?
            .map_err(BackendError::from)
    }

    async fn mkdir(&self) -> BackendResult<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(BackendError::from)
    }

    async fn rmdir(&self) -> BackendResult<()> {
        tokio::fs::remove_dir(&self.root).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::Other || e.raw_os_error() == Some(39) {
                BackendError::DirectoryNotEmpty {
                    path: self.root.display().to_string(),
                }
            } else {
                BackendError::from(e)
            }
        })
    }

    async fn purge(&self) -> BackendResult<()> {
        tokio::fs::remove_dir_all(&self.root)
            .await
            .map_err(BackendError::from)
    }

    fn as_copier(&self) -> Option<&dyn Copier> {
        Some(self)
    }

    fn as_mover(&self) -> Option<&dyn Mover> {
        Some(self)
    }
}

#[async_trait]
impl Copier for LocalBackend {
    async fn copy(&self, src_remote: &str, dst_root: &str, dst_remote: &str) -> BackendResult<Object> {
        let src = self.resolve(src_remote);
        let dst = Self::resolve_under(dst_root, dst_remote);
        if let Some(parent) = dst.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(BackendError::from)?;
        }
        tokio::fs::copy(&src, &dst).await.map_err(BackendError::from)?;
        Self::preserve_mtime(&src, &dst).await?;
        let meta = tokio::fs::metadata(&dst).await.map_err(BackendError::from)?;
        Ok(Self::metadata_to_object(dst_remote.to_string(), &meta))
    }
}

#[async_trait]
impl Mover for LocalBackend {
    async fn move_object(&self, src_remote: &str, dst_root: &str, dst_remote: &str) -> BackendResult<Object> {
        let src = self.resolve(src_remote);
        let dst = Self::resolve_under(dst_root, dst_remote);
        if let Some(parent) = dst.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(BackendError::from)?;
        }
        tokio::fs::rename(&src, &dst).await.map_err(BackendError::from)?;
        let meta = tokio::fs::metadata(&dst).await.map_err(BackendError::from)?;
        Ok(Self::metadata_to_object(dst_remote.to_string(), &meta))
    }
}
