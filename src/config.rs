//! The ephemeral, per-invocation sync configuration: what `main.rs` builds
//! from parsed CLI flags and threads through the orchestrator. One struct
//! carrying every tunable; `Default` gives the out-of-the-box behavior.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::equality::CompareMode;

/// When destination-only deletions run relative to transfers
/// (`--delete-before|--delete-during|--delete-after`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeleteMode {
    Before,
    During,
    After,
}

impl Default for DeleteMode {
    fn default() -> Self {
        DeleteMode::During
    }
}

/// Every global flag a `copy`/`sync`/`move`/`check` invocation can carry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// `--bwlimit`: bytes/sec, `None` disables throttling.
    pub bwlimit: Option<u64>,
    /// `--checkers`: concurrent equality checks.
    pub checkers: usize,
    /// `--transfers`: concurrent uploads/deletes.
    pub transfers: usize,
    /// `--checksum`/`-c`.
    pub checksum: bool,
    /// `--size-only`.
    pub size_only: bool,
    /// `--ignore-existing`.
    pub ignore_existing: bool,
    /// `--config`: path to the remote table TOML file.
    pub config_path: Option<PathBuf>,
    /// `--contimeout`: per-connection dial timeout.
    pub contimeout: Duration,
    /// `--timeout`: per-operation idle timeout.
    pub timeout: Duration,
    /// `--dry-run`/`-n`.
    pub dry_run: bool,
    /// `--modify-window`: extra slack added to either side's declared
    /// mtime precision.
    pub modify_window: Duration,
    /// `--retries`: whole-run retry budget.
    pub retries: u32,
    /// `--stats`: periodic progress-report interval; zero disables it.
    pub stats_interval: Duration,
    /// `--delete-before|--delete-during|--delete-after`.
    pub delete_mode: DeleteMode,
    /// `--delete-excluded`: filtered-out destination entries become
    /// deletion candidates instead of being left alone.
    pub delete_excluded: bool,
    /// `--verbose`/`-v`.
    pub verbose: bool,
    /// `--quiet`/`-q`.
    pub quiet: bool,
    /// `--log-file`: write JSON logs here instead of stdout.
    pub log_file: Option<PathBuf>,
    /// `--no-check-certificate`.
    pub no_check_certificate: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            bwlimit: None,
            checkers: 8,
            transfers: 4,
            checksum: false,
            size_only: false,
            ignore_existing: false,
            config_path: None,
            contimeout: Duration::from_secs(60),
            timeout: Duration::from_secs(300),
            dry_run: false,
            modify_window: Duration::ZERO,
            retries: 3,
            stats_interval: Duration::from_secs(60),
            delete_mode: DeleteMode::During,
            delete_excluded: false,
            verbose: false,
            quiet: false,
            log_file: None,
            no_check_certificate: false,
        }
    }
}

impl SyncConfig {
    /// Resolve the active `CompareMode` from the mutually-overriding
    /// comparison flags, evaluated in this order: ignore-existing,
    /// size-only, checksum, default.
    pub fn compare_mode(&self) -> CompareMode {
        if self.ignore_existing {
            CompareMode::IgnoreExisting
        } else if self.size_only {
            CompareMode::SizeOnly
        } else if self.checksum {
            CompareMode::Checksum
        } else {
            CompareMode::Default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = SyncConfig::default();
        assert_eq!(config.checkers, 8);
        assert_eq!(config.transfers, 4);
        assert_eq!(config.retries, 3);
        assert_eq!(config.delete_mode, DeleteMode::During);
        assert!(!config.dry_run);
    }

    #[test]
    fn compare_mode_precedence_prefers_ignore_existing() {
        let mut config = SyncConfig {
            ignore_existing: true,
            checksum: true,
            size_only: true,
            ..Default::default()
        };
        assert_eq!(config.compare_mode(), CompareMode::IgnoreExisting);

        config.ignore_existing = false;
        assert_eq!(config.compare_mode(), CompareMode::SizeOnly);

        config.size_only = false;
        assert_eq!(config.compare_mode(), CompareMode::Checksum);

        config.checksum = false;
        assert_eq!(config.compare_mode(), CompareMode::Default);
    }

    #[test]
    fn roundtrips_through_toml() {
        let config = SyncConfig::default();
        let text = toml::to_string(&config).unwrap();
        let back: SyncConfig = toml::from_str(&text).unwrap();
        assert_eq!(back.checkers, config.checkers);
        assert_eq!(back.delete_mode, config.delete_mode);
    }
}
