//! Remote table and `name:path` reference parsing.
//!
//! A plain path is always the local backend; `name:path` looks `name` up in
//! a persisted TOML table of remote sections. Parses a reference into a
//! typed config section plus a path, keyed by config-section name rather
//! than URL scheme.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{RelayError, Result};

/// One named remote as stored in the config file: a backend `type` plus
/// whatever scalar parameters that backend needs (host, bucket, key path,
/// ...). Kept as a generic string map rather than an enum so adding a new
/// backend type never requires a config file migration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteSection {
    #[serde(rename = "type")]
    pub backend_type: String,
    #[serde(flatten)]
    pub params: BTreeMap<String, toml::Value>,
}

impl RemoteSection {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(|v| v.as_str())
    }
}

/// The persisted `[remote-name]` table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteTable {
    #[serde(flatten)]
    remotes: BTreeMap<String, RemoteSection>,
}

impl RemoteTable {
    pub fn get(&self, name: &str) -> Option<&RemoteSection> {
        self.remotes.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, section: RemoteSection) {
        self.remotes.insert(name.into(), section);
    }

    pub fn remove(&mut self, name: &str) -> Option<RemoteSection> {
        self.remotes.remove(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.remotes.keys().map(|s| s.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.remotes.is_empty()
    }

    /// Default config file location: `$XDG_CONFIG_HOME/relay/relay.toml`,
    /// falling back to `~/.config/relay/relay.toml`.
    pub fn default_path() -> PathBuf {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| dirs_home().map(|h| h.join(".config")))
            .unwrap_or_else(|| PathBuf::from("."));
        base.join("relay").join("relay.toml")
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| RelayError::Config(format!("reading {}: {}", path.display(), e)))?;
        toml::from_str(&text)
            .map_err(|e| RelayError::Config(format!("parsing {}: {}", path.display(), e)))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| RelayError::Config(format!("creating {}: {}", parent.display(), e)))?;
        }
        let text = toml::to_string_pretty(self)
            .map_err(|e| RelayError::Config(format!("serializing config: {}", e)))?;
        std::fs::write(path, text)
            .map_err(|e| RelayError::Config(format!("writing {}: {}", path.display(), e)))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            // The remote table can carry secrets (SSH passwords, API keys);
            // match rclone's 0600 on the config file.
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(path, perms)
                .map_err(|e| RelayError::Config(format!("chmod {}: {}", path.display(), e)))?;
        }

        Ok(())
    }
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}

/// A `name:path` reference resolved into a remote name (`None` for the
/// implicit local backend) and the path relative to that backend's root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRef {
    pub remote: Option<String>,
    pub path: String,
}

/// Parse a CLI-supplied source/destination argument. A bare path, or a
/// path with no `:` before the first
/// `/`, is the local backend. A single-letter prefix followed by `:` is
/// treated as a Windows drive letter, not a remote name, so `C:\data` still
/// resolves locally.
pub fn parse_remote_ref(raw: &str) -> ParsedRef {
    if let Some(idx) = raw.find(':') {
        let (prefix, rest) = raw.split_at(idx);
        let rest = &rest[1..];
        let looks_like_drive_letter = prefix.len() == 1
            && prefix.chars().next().map(|c| c.is_ascii_alphabetic()).unwrap_or(false);

        if !prefix.is_empty() && !looks_like_drive_letter && !prefix.contains(['/', '\\']) {
            return ParsedRef {
                remote: Some(prefix.to_string()),
                path: rest.to_string(),
            };
        }
    }

    ParsedRef {
        remote: None,
        path: raw.to_string(),
    }
}
