use std::path::{Path, PathBuf};

use config::{Config, File};
use serde::{Deserialize, Serialize};

use crate::error::{Result, RoostError};

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "ROOST_DATA_DIR";

/// Canonical minimum Node.js major version for the dashboard.
pub const MIN_NODE_MAJOR: u64 = 18;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RoostConfig {
    /// Data directory holding the user database and install record.
    /// Defaults to `~/.roost`; `ROOST_DATA_DIR` takes precedence over both.
    #[serde(default)]
    pub data_dir: Option<String>,
    #[serde(default)]
    pub workspace: WorkspaceSection,
    #[serde(default)]
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub update: UpdateConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceSection {
    #[serde(default = "default_workspace_dir")]
    pub default_dir: String,
}

impl Default for WorkspaceSection {
    fn default() -> Self {
        Self {
            default_dir: default_workspace_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    #[serde(default = "default_repo_url")]
    pub repo_url: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Bounded readiness poll: attempts x interval is the total wait.
    #[serde(default = "default_readiness_attempts")]
    pub readiness_attempts: u32,
    #[serde(default = "default_readiness_interval_secs")]
    pub readiness_interval_secs: u64,
    /// Optional peer control-plane service. When set and unreachable, the
    /// installer proceeds only with explicit confirmation.
    #[serde(default)]
    pub peer_url: Option<String>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            repo_url: default_repo_url(),
            port: default_port(),
            readiness_attempts: default_readiness_attempts(),
            readiness_interval_secs: default_readiness_interval_secs(),
            peer_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateConfig {
    /// GitHub `owner/repo` queried for the latest dashboard release.
    #[serde(default = "default_update_repo")]
    pub repo: String,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            repo: default_update_repo(),
        }
    }
}

fn default_workspace_dir() -> String {
    "./roost-workspace".to_string()
}
fn default_repo_url() -> String {
    "https://github.com/roost-sh/roost-dashboard".to_string()
}
fn default_port() -> u16 {
    3000
}
fn default_readiness_attempts() -> u32 {
    30
}
fn default_readiness_interval_secs() -> u64 {
    1
}
fn default_update_repo() -> String {
    "roost-sh/roost-dashboard".to_string()
}

impl RoostConfig {
    /// Load configuration with a two-layer TOML merge:
    /// 1. `~/.config/roost/config.toml` (global)
    /// 2. `<workspace>/.roost/config.toml` (local)
    pub fn load(workspace_dir: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(global_path) = global_config_path() {
            if global_path.exists() {
                builder = builder.add_source(File::from(global_path).required(false));
            }
        }

        if let Some(dir) = workspace_dir {
            let local = dir.join(".roost").join("config.toml");
            if local.exists() {
                builder = builder.add_source(File::from(local).required(false));
            }
        }

        let config = builder
            .build()
            .map_err(|e| RoostError::Config(e.to_string()))?;

        let mut cfg: Self = config
            .try_deserialize()
            .map_err(|e| RoostError::Config(e.to_string()))?;

        for warning in cfg.validate() {
            tracing::warn!(%warning, "config value adjusted");
        }
        Ok(cfg)
    }

    /// Validate config values, clamping out-of-range values and collecting
    /// warnings. Lenient by design — fixes values rather than rejecting.
    pub fn validate(&mut self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.dashboard.readiness_attempts == 0 {
            warnings.push("dashboard.readiness_attempts = 0, using 1".to_string());
            self.dashboard.readiness_attempts = 1;
        }
        if self.dashboard.readiness_attempts > 120 {
            warnings.push(format!(
                "dashboard.readiness_attempts = {} too large, clamping to 120",
                self.dashboard.readiness_attempts
            ));
            self.dashboard.readiness_attempts = 120;
        }
        if self.dashboard.readiness_interval_secs == 0 {
            warnings.push("dashboard.readiness_interval_secs = 0, using 1".to_string());
            self.dashboard.readiness_interval_secs = 1;
        }
        if self.dashboard.port == 0 {
            warnings.push(format!("dashboard.port = 0, using {}", default_port()));
            self.dashboard.port = default_port();
        }
        if self.update.repo.split('/').count() != 2 {
            warnings.push(format!(
                "update.repo '{}' is not of the form owner/repo, using default",
                self.update.repo
            ));
            self.update.repo = default_update_repo();
        }

        warnings
    }
}

fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("roost").join("config.toml"))
}

/// Resolve the data directory: `ROOST_DATA_DIR` env, then the configured
/// value, then `~/.roost`.
pub fn resolve_data_dir(config: &RoostConfig) -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    if let Some(ref dir) = config.data_dir {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".roost")
}

// ---------------------------------------------------------------------------
// Install record — one per installation, written at the end of a successful
// install and read thereafter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LicenseTier {
    #[default]
    Free,
    Pro,
}

impl std::fmt::Display for LicenseTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Free => write!(f, "free"),
            Self::Pro => write!(f, "pro"),
        }
    }
}

/// Persisted metadata for one dashboard installation.
///
/// Absence of this record means "not installed" — the installer only writes
/// it after every fatal step has succeeded. The only later mutation is the
/// `tier` flip on license activation.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct InstallRecord {
    #[serde(default)]
    pub install_dir: String,
    /// RFC3339 timestamp of the install.
    #[serde(default)]
    pub installed_at: String,
    #[serde(default)]
    pub tier: LicenseTier,
    #[serde(default)]
    pub source_version: String,
}

impl InstallRecord {
    pub fn new(install_dir: &Path, source_version: String) -> Self {
        Self {
            install_dir: install_dir.display().to_string(),
            installed_at: chrono::Utc::now().to_rfc3339(),
            tier: LicenseTier::Free,
            source_version,
        }
    }

    /// Path to the record file: `<data_dir>/install.toml`
    pub fn path(data_dir: &Path) -> PathBuf {
        data_dir.join("install.toml")
    }

    /// Load from disk. `None` when the file is missing or unparseable —
    /// either way there is no usable installation.
    pub fn load(data_dir: &Path) -> Option<Self> {
        let contents = std::fs::read_to_string(Self::path(data_dir)).ok()?;
        toml::from_str(&contents).ok()
    }

    /// Save to disk, creating the data directory if needed.
    pub fn save(&self, data_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(data_dir)
            .map_err(|e| RoostError::Config(format!("failed to create data dir: {e}")))?;
        let toml_str = toml::to_string_pretty(self)
            .map_err(|e| RoostError::Config(format!("failed to serialize install record: {e}")))?;
        std::fs::write(Self::path(data_dir), toml_str)
            .map_err(|e| RoostError::Config(format!("failed to write install record: {e}")))?;
        Ok(())
    }

    /// Remove the record (explicit user wipe only).
    pub fn delete(data_dir: &Path) -> Result<()> {
        match std::fs::remove_file(Self::path(data_dir)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("roost-config-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn defaults_are_sane() {
        let config = RoostConfig::default();
        assert_eq!(config.dashboard.port, 3000);
        assert_eq!(config.dashboard.readiness_attempts, 30);
        assert_eq!(config.dashboard.readiness_interval_secs, 1);
        assert!(config.dashboard.peer_url.is_none());
    }

    #[test]
    fn validate_clamps_out_of_range() {
        let mut config = RoostConfig::default();
        config.dashboard.readiness_attempts = 0;
        config.dashboard.readiness_interval_secs = 0;
        config.dashboard.port = 0;
        config.update.repo = "not-a-repo".to_string();

        let warnings = config.validate();
        assert_eq!(warnings.len(), 4);
        assert_eq!(config.dashboard.readiness_attempts, 1);
        assert_eq!(config.dashboard.readiness_interval_secs, 1);
        assert_eq!(config.dashboard.port, 3000);
        assert_eq!(config.update.repo, "roost-sh/roost-dashboard");
    }

    #[test]
    fn validate_accepts_defaults_silently() {
        let mut config = RoostConfig::default();
        assert!(config.validate().is_empty());
    }

    #[test]
    fn install_record_roundtrip() {
        let dir = scratch_dir();
        assert!(InstallRecord::load(&dir).is_none());

        let record = InstallRecord::new(Path::new("/opt/roost/dashboard"), "1.4.0".to_string());
        record.save(&dir).unwrap();

        let loaded = InstallRecord::load(&dir).expect("record should load");
        assert_eq!(loaded, record);
        assert_eq!(loaded.tier, LicenseTier::Free);

        InstallRecord::delete(&dir).unwrap();
        assert!(InstallRecord::load(&dir).is_none());
        // Deleting again is a no-op.
        InstallRecord::delete(&dir).unwrap();

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn corrupt_local_config_is_an_error() {
        let dir = scratch_dir();
        let local = dir.join(".roost");
        std::fs::create_dir_all(&local).unwrap();
        std::fs::write(local.join("config.toml"), "dashboard = [not toml").unwrap();

        assert!(matches!(
            RoostConfig::load(Some(&dir)),
            Err(RoostError::Config(_))
        ));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn unparseable_record_means_not_installed() {
        let dir = scratch_dir();
        std::fs::write(InstallRecord::path(&dir), "not valid toml [[[").unwrap();
        assert!(InstallRecord::load(&dir).is_none());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn resolve_data_dir_prefers_config_value() {
        let config = RoostConfig {
            data_dir: Some("/tmp/roost-data".to_string()),
            ..Default::default()
        };
        // Only meaningful when the env override is absent.
        if std::env::var(DATA_DIR_ENV).is_err() {
            assert_eq!(resolve_data_dir(&config), PathBuf::from("/tmp/roost-data"));
        }
    }
}
