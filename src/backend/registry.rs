//! Backend registry and factory.
//!
//! Resolves a parsed `name:path` reference into a constructed `Backend`.
//! `None` remote names always resolve to the local backend directly; named
//! remotes are looked up in the persisted `RemoteTable` and dispatched to
//! the factory registered for that section's `type`, keyed by
//! config-section type so adding a network backend later is a factory
//! registration, not a parser change.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;

use crate::backend::config::{ParsedRef, RemoteSection, RemoteTable};
use crate::backend::error::BackendError;
use crate::backend::limited::LimitedBackend;
use crate::backend::local::LocalBackend;
use crate::backend::Backend;
use crate::error::{RelayError, Result};

/// Factory function type for creating a named-remote backend from the
/// remote's own name, its config section, and the reference's path
/// component. The name is threaded through so factories can tag the
/// constructed backend with an `identity()` shared by every reference to
/// that remote, regardless of which subpath each reference names.
pub type BackendFactory = Arc<
    dyn Fn(&str, &RemoteSection, &str) -> BoxFuture<Result<Box<dyn Backend>>> + Send + Sync,
>;

pub type BoxFuture<T> = std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send>>;

pub struct BackendRegistry {
    factories: RwLock<HashMap<String, BackendFactory>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        let registry = Self {
            factories: RwLock::new(HashMap::new()),
        };
        registry.register_builtin();
        registry
    }

    fn register_builtin(&self) {
        self.register(
            "local",
            Arc::new(|name, section, path| {
                let root = section.param("root").unwrap_or(path).to_string();
                let identity = name.to_string();
                Box::pin(async move { build_local_backend(root, identity).await })
            }),
        );
    }

    /// Register a factory for a config-section `type` value. Lets future
    /// network backends (SSH, S3, ...) plug in without touching the
    /// resolver itself.
    pub fn register(&self, backend_type: impl Into<String>, factory: BackendFactory) {
        self.factories
            .write()
            .unwrap()
            .insert(backend_type.into(), factory);
    }

    pub fn is_registered(&self, backend_type: &str) -> bool {
        self.factories.read().unwrap().contains_key(backend_type)
    }

    pub fn list_backend_types(&self) -> Vec<String> {
        self.factories.read().unwrap().keys().cloned().collect()
    }

    /// Resolve a parsed reference against `table`, constructing the
    /// appropriate backend. A bare path (no remote name) always resolves to
    /// the local backend without consulting the table at all.
    pub async fn resolve(&self, parsed: &ParsedRef, table: &RemoteTable) -> Result<Box<dyn Backend>> {
        let Some(name) = &parsed.remote else {
            return Ok(Box::new(LocalBackend::new(parsed.path.clone())));
        };

        let section = table
            .get(name)
            .ok_or_else(|| RelayError::NotFoundInConfig(name.clone()))?;

        let factory = {
            let factories = self.factories.read().unwrap();
            factories.get(&section.backend_type).cloned()
        };

        match factory {
            Some(factory) => factory(name, section, &parsed.path).await,
            None => Err(RelayError::Backend(BackendError::InvalidConfig {
                backend: section.backend_type.clone(),
                message: format!("no factory registered for backend type '{}'", section.backend_type),
            })),
        }
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Construct a local backend rooted at `root`, wrapping it in a
/// `LimitedBackend` when `root` names an existing single file rather than a
/// directory. This lets `copy source:file dest:dir/` drive the same pair
/// builder as a directory-to-directory copy. `identity` is the remote-table
/// name this backend was resolved from; every reference to the same named
/// remote gets a backend tagged with it, so `copy backup:dir1 backup:dir2`
/// is recognized as same-account even though the two roots differ.
async fn build_local_backend(root: String, identity: String) -> Result<Box<dyn Backend>> {
    let path = std::path::PathBuf::from(&root);
    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_file() => {
            let parent = path
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| std::path::PathBuf::from("."));
            let leaf = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();
            let inner = Box::new(LocalBackend::new(parent).with_identity(identity)) as Box<dyn Backend>;
            Ok(Box::new(LimitedBackend::new(inner, leaf)) as Box<dyn Backend>)
        }
        _ => Ok(Box::new(LocalBackend::new(root).with_identity(identity)) as Box<dyn Backend>),
    }
}

static GLOBAL_REGISTRY: Lazy<BackendRegistry> = Lazy::new(BackendRegistry::new);

pub fn global_registry() -> &'static BackendRegistry {
    &GLOBAL_REGISTRY
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::config::parse_remote_ref;

    #[test]
    fn local_backend_type_is_preregistered() {
        let registry = BackendRegistry::new();
        assert!(registry.is_registered("local"));
    }

    #[tokio::test]
    async fn bare_path_resolves_without_table_lookup() {
        let registry = BackendRegistry::new();
        let table = RemoteTable::default();
        let parsed = parse_remote_ref("/tmp/somewhere");
        let backend = registry.resolve(&parsed, &table).await.unwrap();
        assert_eq!(backend.name(), "local");
    }

    #[tokio::test]
    async fn bare_path_naming_an_existing_file_resolves_to_a_limited_view() {
        use crate::backend::types::{ListEntry, ListOptions};
        use futures::StreamExt;

        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("only.txt"), b"solo").await.unwrap();

        let registry = BackendRegistry::new();
        let table = RemoteTable::default();
        let parsed = parse_remote_ref(dir.path().join("only.txt").to_str().unwrap());
        let backend = registry.resolve(&parsed, &table).await.unwrap();

        let mut stream = backend.list(ListOptions::default()).await.unwrap();
        let mut remotes = Vec::new();
        while let Some(entry) = stream.next().await {
            if let ListEntry::Object(obj) = entry.unwrap() {
                remotes.push(obj.remote);
            }
        }
        assert_eq!(remotes, vec!["only.txt".to_string()]);
    }

    #[tokio::test]
    async fn unknown_remote_name_is_not_found_in_config() {
        let registry = BackendRegistry::new();
        let table = RemoteTable::default();
        let parsed = parse_remote_ref("ghost:path");
        let err = registry.resolve(&parsed, &table).await.unwrap_err();
        assert!(matches!(err, RelayError::NotFoundInConfig(name) if name == "ghost"));
    }

    #[tokio::test]
    async fn named_local_remote_resolves_via_table() {
        let registry = BackendRegistry::new();
        let mut table = RemoteTable::default();
        let mut params = std::collections::BTreeMap::new();
        params.insert("root".to_string(), toml::Value::String("/srv/backup".to_string()));
        table.insert(
            "backup",
            RemoteSection {
                backend_type: "local".to_string(),
                params,
            },
        );

        let parsed = parse_remote_ref("backup:archive");
        let backend = registry.resolve(&parsed, &table).await.unwrap();
        assert_eq!(backend.root(), "/srv/backup");
    }
}
