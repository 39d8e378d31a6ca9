//! Release lookup and in-place dashboard update.

use std::path::Path;

use semver::Version;
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::InstallRecord;
use crate::error::{Result, RoostError};
use crate::install::ToolRunner;

#[derive(Debug, Clone)]
pub struct ReleaseInfo {
    pub version: Version,
    pub tag: String,
}

#[derive(Debug, Deserialize)]
struct GithubRelease {
    tag_name: String,
}

/// Parse a release tag (`v1.4.0` or `1.4.0`) into a semver version.
pub fn parse_tag(tag: &str) -> Option<Version> {
    Version::parse(tag.trim().trim_start_matches('v')).ok()
}

/// Query GitHub's `releases/latest` endpoint for `owner/repo`.
pub async fn latest_release(repo: &str) -> Result<ReleaseInfo> {
    let url = format!("https://api.github.com/repos/{repo}/releases/latest");
    let client = reqwest::Client::builder()
        .user_agent("roost-cli")
        .timeout(std::time::Duration::from_secs(10))
        .build()?;

    let release: GithubRelease = client
        .get(&url)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    let version = parse_tag(&release.tag_name).ok_or_else(|| {
        RoostError::Config(format!(
            "release tag '{}' is not a semver version",
            release.tag_name
        ))
    })?;
    Ok(ReleaseInfo {
        version,
        tag: release.tag_name,
    })
}

/// How the installed dashboard compares to the latest published release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DashboardFreshness {
    NotInstalled,
    UpToDate { current: Version },
    Outdated { current: Version, latest: Version },
    /// Installed version is unknown or unparseable; can't compare.
    Unknown,
}

pub fn compare(record: Option<&InstallRecord>, latest: &Version) -> DashboardFreshness {
    let Some(record) = record else {
        return DashboardFreshness::NotInstalled;
    };
    let Some(current) = parse_tag(&record.source_version) else {
        return DashboardFreshness::Unknown;
    };
    if current < *latest {
        DashboardFreshness::Outdated {
            current,
            latest: latest.clone(),
        }
    } else {
        DashboardFreshness::UpToDate { current }
    }
}

/// Update the installed dashboard in place: `git pull`, `npm install`,
/// `npm run build`. Build failure is a soft-fail, same as install; the
/// returned flag reports it.
pub fn update_dashboard(install_dir: &Path, runner: &dyn ToolRunner) -> Result<bool> {
    if !install_dir.is_dir() {
        return Err(RoostError::Precondition(format!(
            "install directory {} does not exist",
            install_dir.display()
        )));
    }

    info!(dir = %install_dir.display(), "pulling latest dashboard");
    runner
        .run("git", &["pull", "--ff-only"], Some(install_dir))
        .map_err(RoostError::Acquire)?;

    runner
        .run("npm", &["install"], Some(install_dir))
        .map_err(RoostError::Dependencies)?;

    match runner.run("npm", &["run", "build"], Some(install_dir)) {
        Ok(()) => Ok(true),
        Err(reason) => {
            warn!(%reason, "dashboard rebuild failed; dev mode still available");
            Ok(false)
        }
    }
}
