//! Dashboard installation: prerequisite checks and the
//! clone → deps → build → record sequence.

use std::path::{Path, PathBuf};
use std::time::Duration;

use semver::Version;
use tracing::{info, warn};

use crate::config::{InstallRecord, LicenseTier, MIN_NODE_MAJOR};
use crate::error::{Result, RoostError};

/// Runs external tools. Injected so step-failure semantics can be exercised
/// with a scripted fake.
pub trait ToolRunner {
    /// Run a program to completion with inherited stdio. `Err` carries a
    /// human-readable reason (non-zero exit, spawn failure).
    fn run(&self, program: &str, args: &[&str], cwd: Option<&Path>) -> std::result::Result<(), String>;

    /// Run a program and capture stdout.
    fn capture(&self, program: &str, args: &[&str]) -> std::result::Result<String, String>;
}

/// Real process execution via `std::process::Command`.
pub struct SystemRunner;

impl ToolRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str], cwd: Option<&Path>) -> std::result::Result<(), String> {
        let mut cmd = std::process::Command::new(program);
        cmd.args(args);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        let status = cmd
            .status()
            .map_err(|e| format!("failed to run {program}: {e}"))?;
        if status.success() {
            Ok(())
        } else {
            Err(format!("{program} exited with {status}"))
        }
    }

    fn capture(&self, program: &str, args: &[&str]) -> std::result::Result<String, String> {
        let output = std::process::Command::new(program)
            .args(args)
            .output()
            .map_err(|e| format!("failed to run {program}: {e}"))?;
        if !output.status.success() {
            return Err(format!("{program} exited with {}", output.status));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Parse `node --version` output (`v20.11.1`) into a semver version.
pub fn parse_node_version(raw: &str) -> Option<Version> {
    Version::parse(raw.trim().trim_start_matches('v')).ok()
}

/// Verify git, npm, and node ≥ 18 are available. Each missing piece is a
/// distinct error so the caller can print an actionable message.
pub fn check_prerequisites(runner: &dyn ToolRunner) -> Result<Version> {
    for tool in ["git", "npm"] {
        if which::which(tool).is_err() {
            return Err(RoostError::Precondition(format!(
                "{tool} not found on PATH. Install it and retry."
            )));
        }
    }
    if which::which("node").is_err() {
        return Err(RoostError::Precondition(
            "node not found on PATH. Install Node.js 18 or newer.".to_string(),
        ));
    }

    let raw = runner
        .capture("node", &["--version"])
        .map_err(RoostError::Precondition)?;
    let version = parse_node_version(&raw).ok_or_else(|| {
        RoostError::Precondition(format!("could not parse node version from '{raw}'"))
    })?;
    if version.major < MIN_NODE_MAJOR {
        return Err(RoostError::Precondition(format!(
            "Node.js {version} is too old. Version {MIN_NODE_MAJOR} or newer is required."
        )));
    }
    Ok(version)
}

/// Probe the optional peer control-plane service. `Ok(true)` means it
/// answered; `Ok(false)` means unreachable — the caller decides whether to
/// proceed in degraded mode.
pub async fn check_peer_service(url: &str) -> Result<bool> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(3))
        .build()?;
    Ok(client.get(url).send().await.is_ok())
}

#[derive(Debug, Clone)]
pub struct InstallOptions {
    pub repo_url: String,
    /// Remove an existing non-empty target first. Confirmed upstream; this
    /// is the only destructive step in the sequence.
    pub clear_existing: bool,
}

#[derive(Debug)]
pub struct InstallOutcome {
    pub install_dir: PathBuf,
    pub version: String,
    /// False when `npm run build` failed. The install is still usable in
    /// dev mode, so this is reported rather than raised.
    pub build_ok: bool,
    pub record: InstallRecord,
}

/// Run the install sequence into `target_dir` and persist the record under
/// `data_dir`. No record is written unless clone and dependency install both
/// succeeded.
pub fn install(
    target_dir: &Path,
    data_dir: &Path,
    options: &InstallOptions,
    runner: &dyn ToolRunner,
) -> Result<InstallOutcome> {
    if target_dir.exists() && target_dir.read_dir()?.next().is_some() {
        if !options.clear_existing {
            return Err(RoostError::Precondition(format!(
                "{} already exists and is not empty",
                target_dir.display()
            )));
        }
        info!(dir = %target_dir.display(), "clearing existing install directory");
        std::fs::remove_dir_all(target_dir)?;
    }
    if let Some(parent) = target_dir.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let target = target_dir.display().to_string();
    info!(repo = %options.repo_url, "cloning dashboard");
    runner
        .run("git", &["clone", &options.repo_url, &target], None)
        .map_err(RoostError::Acquire)?;

    info!("installing dashboard dependencies");
    runner
        .run("npm", &["install"], Some(target_dir))
        .map_err(RoostError::Dependencies)?;

    info!("building dashboard");
    let build_ok = match runner.run("npm", &["run", "build"], Some(target_dir)) {
        Ok(()) => true,
        Err(reason) => {
            warn!(%reason, "dashboard build failed; dev mode still available");
            false
        }
    };

    let version = read_package_version(target_dir).unwrap_or_else(|| "unknown".to_string());
    let record = InstallRecord::new(target_dir, version.clone());
    record.save(data_dir)?;

    Ok(InstallOutcome {
        install_dir: target_dir.to_path_buf(),
        version,
        build_ok,
        record,
    })
}

/// Best-effort read of the installed dashboard's `package.json` version.
fn read_package_version(install_dir: &Path) -> Option<String> {
    let contents = std::fs::read_to_string(install_dir.join("package.json")).ok()?;
    let pkg: serde_json::Value = serde_json::from_str(&contents).ok()?;
    pkg.get("version")?.as_str().map(|s| s.to_string())
}

/// License keys are at least 20 characters of `[A-Za-z0-9-]`. Format check
/// only; there is no remote validation.
pub fn valid_license_key(key: &str) -> bool {
    key.len() >= 20 && key.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
}

/// Flip the install record to the pro tier.
pub fn activate_license(data_dir: &Path, key: &str) -> Result<InstallRecord> {
    if !valid_license_key(key) {
        return Err(RoostError::InvalidInput(
            "license key must be at least 20 characters of letters, digits, or dashes".to_string(),
        ));
    }
    let mut record = InstallRecord::load(data_dir).ok_or_else(|| {
        RoostError::Precondition("no installation found. Run `roost setup` first.".to_string())
    })?;
    record.tier = LicenseTier::Pro;
    record.save(data_dir)?;
    Ok(record)
}
