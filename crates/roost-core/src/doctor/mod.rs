//! Read-only health checks over the workspace, system tools, and data
//! directory. The single exception to "read-only" is a write+delete probe
//! file, which is removed unconditionally.

use std::fmt;
use std::path::Path;

use serde::Serialize;

use crate::config::{InstallRecord, MIN_NODE_MAJOR};
use crate::install::{self, ToolRunner};
use crate::users::UserStore;
use crate::workspace::{self, WorkspaceConfig};

const PROBE_FILE: &str = ".roost-doctor-probe";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Critical => write!(f, "critical"),
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Issue {
    pub severity: Severity,
    pub category: String,
    pub description: String,
    pub remediation: String,
}

impl Issue {
    fn new(severity: Severity, category: &str, description: String, remediation: &str) -> Self {
        Self {
            severity,
            category: category.to_string(),
            description,
            remediation: remediation.to_string(),
        }
    }
}

#[derive(Debug, Default, Serialize)]
pub struct Report {
    pub issues: Vec<Issue>,
}

impl Report {
    pub fn count(&self, severity: Severity) -> usize {
        self.issues.iter().filter(|i| i.severity == severity).count()
    }

    /// Any critical finding means the setup is unusable as-is.
    pub fn action_required(&self) -> bool {
        self.count(Severity::Critical) > 0
    }

    pub fn healthy(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Workspace document checks. A missing `roost.json` yields exactly one
/// critical issue; the checks that depend on its contents are skipped
/// rather than cascading.
pub fn run_workspace_checks(workspace_dir: &Path) -> Vec<Issue> {
    let mut issues = Vec::new();

    let config_path = WorkspaceConfig::path(workspace_dir);
    if !config_path.is_file() {
        issues.push(Issue::new(
            Severity::Critical,
            "workspace",
            format!("{} not found", config_path.display()),
            "Run `roost init` to create the workspace.",
        ));
        return issues;
    }

    match WorkspaceConfig::load(workspace_dir) {
        Err(_) => {
            issues.push(Issue::new(
                Severity::Critical,
                "workspace",
                "roost.json is not valid JSON".to_string(),
                "Restore it from a backup or re-run `roost init`.",
            ));
        }
        Ok(config) => {
            if config.ai.name.is_empty() || config.user.name.is_empty() {
                issues.push(Issue::new(
                    Severity::Warning,
                    "workspace",
                    "roost.json has empty identity fields".to_string(),
                    "Run `roost persona` to fill them in.",
                ));
            }
            if config.channels.is_empty() {
                issues.push(Issue::new(
                    Severity::Info,
                    "channels",
                    "no channels configured".to_string(),
                    "Channels can be added from the dashboard.",
                ));
            }
        }
    }

    for (file, label) in [
        (workspace::PERSONA_FILE, "identity document"),
        (workspace::PROFILE_FILE, "profile document"),
        (workspace::MEMORY_FILE, "memory document"),
    ] {
        if !workspace_dir.join(file).is_file() {
            issues.push(Issue::new(
                Severity::Critical,
                "workspace",
                format!("{file} ({label}) is missing"),
                "Re-run `roost init` to regenerate it.",
            ));
        }
    }

    let persona_path = workspace_dir.join(workspace::PERSONA_FILE);
    if let Ok(contents) = std::fs::read_to_string(&persona_path) {
        if workspace::templates::has_placeholders(&contents) {
            issues.push(Issue::new(
                Severity::Warning,
                "workspace",
                format!("{} still contains template placeholders", workspace::PERSONA_FILE),
                "Run `roost persona` to complete it.",
            ));
        }
    }

    let memory_dir = workspace_dir.join(workspace::MEMORY_DIR);
    if !memory_dir.is_dir() {
        issues.push(Issue::new(
            Severity::Warning,
            "memory",
            "memory/ directory is missing".to_string(),
            "Create it or re-run `roost init`.",
        ));
    } else {
        let daily_files = std::fs::read_dir(&memory_dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_name().to_string_lossy().ends_with(".md"))
                    .count()
            })
            .unwrap_or(0);
        if daily_files == 0 {
            issues.push(Issue::new(
                Severity::Info,
                "memory",
                "no daily memory files yet".to_string(),
                "Daily notes appear as the companion runs.",
            ));
        }
    }

    // Writability probe. The probe file is removed whether or not the
    // write succeeded.
    let probe = workspace_dir.join(PROBE_FILE);
    let write_result = std::fs::write(&probe, "probe");
    let _ = std::fs::remove_file(&probe);
    if write_result.is_err() {
        issues.push(Issue::new(
            Severity::Critical,
            "workspace",
            "workspace directory is not writable".to_string(),
            "Fix the directory permissions.",
        ));
    }

    issues
}

/// Required tool checks: git, npm, node ≥ 18.
pub fn run_system_checks(runner: &dyn ToolRunner) -> Vec<Issue> {
    let mut issues = Vec::new();

    for tool in ["git", "npm"] {
        if which::which(tool).is_err() {
            issues.push(Issue::new(
                Severity::Error,
                "system",
                format!("{tool} not found on PATH"),
                "Install it with your package manager.",
            ));
        }
    }

    if which::which("node").is_err() {
        issues.push(Issue::new(
            Severity::Critical,
            "system",
            "node not found on PATH".to_string(),
            "Install Node.js 18 or newer.",
        ));
    } else {
        match runner
            .capture("node", &["--version"])
            .ok()
            .and_then(|raw| install::parse_node_version(&raw))
        {
            Some(version) if version.major < MIN_NODE_MAJOR => {
                issues.push(Issue::new(
                    Severity::Critical,
                    "system",
                    format!("Node.js {version} is older than {MIN_NODE_MAJOR}"),
                    "Upgrade Node.js.",
                ));
            }
            Some(_) => {}
            None => {
                issues.push(Issue::new(
                    Severity::Warning,
                    "system",
                    "could not determine the node version".to_string(),
                    "Check that `node --version` works.",
                ));
            }
        }
    }

    issues
}

/// Data directory checks. Absence of either artifact is informational —
/// a fresh machine is healthy, just not set up.
pub fn run_data_checks(data_dir: &Path) -> Vec<Issue> {
    let mut issues = Vec::new();

    if !UserStore::db_path(data_dir).is_file() {
        issues.push(Issue::new(
            Severity::Info,
            "data",
            "user database not created yet".to_string(),
            "Run `roost setup` to create the first admin.",
        ));
    }
    if InstallRecord::load(data_dir).is_none() {
        issues.push(Issue::new(
            Severity::Info,
            "data",
            "dashboard is not installed".to_string(),
            "Run `roost setup` to install it.",
        ));
    }

    issues
}

pub fn run_all(workspace_dir: &Path, data_dir: &Path, runner: &dyn ToolRunner) -> Report {
    let mut issues = run_workspace_checks(workspace_dir);
    issues.extend(run_system_checks(runner));
    issues.extend(run_data_checks(data_dir));
    Report { issues }
}
