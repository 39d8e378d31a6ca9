//! Workspace layout: the rendered document set plus `roost.json`.

pub mod templates;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, RoostError};

pub const CONFIG_FILE: &str = "roost.json";
pub const PERSONA_FILE: &str = "PERSONA.md";
pub const PROFILE_FILE: &str = "PROFILE.md";
pub const MEMORY_FILE: &str = "MEMORY.md";
pub const MEMORY_DIR: &str = "memory";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AiIdentity {
    pub name: String,
    pub personality: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserIdentity {
    pub name: String,
    pub role: String,
    pub timezone: String,
}

/// The workspace configuration document, `roost.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkspaceConfig {
    pub version: String,
    /// RFC3339 creation timestamp.
    pub created: String,
    pub backend: String,
    pub workspace: String,
    pub ai: AiIdentity,
    pub user: UserIdentity,
    #[serde(default)]
    pub channels: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub modules: Vec<String>,
}

impl WorkspaceConfig {
    pub fn path(dir: &Path) -> PathBuf {
        dir.join(CONFIG_FILE)
    }

    /// Strict parse: any missing required field or malformed JSON is an error,
    /// not a default.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = Self::path(dir);
        let contents = std::fs::read_to_string(&path).map_err(|e| {
            RoostError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        serde_json::from_str(&contents)
            .map_err(|e| RoostError::Config(format!("invalid {}: {e}", path.display())))
    }

    /// Whole-file write via temp file + rename so a crash mid-write never
    /// leaves a truncated `roost.json` behind.
    pub fn save(&self, dir: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| RoostError::Config(format!("failed to serialize workspace config: {e}")))?;
        let path = Self::path(dir);
        let tmp = dir.join(format!(".{CONFIG_FILE}.tmp"));
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// Answers collected by the interactive `init` flow.
#[derive(Debug, Clone)]
pub struct InitAnswers {
    pub ai_name: String,
    pub personality: String,
    pub communication_style: String,
    pub special_instructions: String,
    pub user_name: String,
    pub user_role: String,
    pub user_timezone: String,
    pub user_preferences: String,
}

impl Default for InitAnswers {
    fn default() -> Self {
        Self {
            ai_name: "Roost".to_string(),
            personality: "helpful, pragmatic".to_string(),
            communication_style: "Clear and concise.".to_string(),
            special_instructions: "None.".to_string(),
            user_name: "Operator".to_string(),
            user_role: "owner".to_string(),
            user_timezone: "UTC".to_string(),
            user_preferences: "None recorded yet.".to_string(),
        }
    }
}

/// True when the directory exists and contains any entry. Callers must
/// confirm before initializing into a non-empty directory.
pub fn dir_is_nonempty(dir: &Path) -> Result<bool> {
    if !dir.exists() {
        return Ok(false);
    }
    Ok(std::fs::read_dir(dir)?.next().is_some())
}

/// Create the workspace file set: the three rendered documents, the memory
/// directory with today's daily note, and `roost.json`.
pub fn init_workspace(dir: &Path, answers: &InitAnswers) -> Result<WorkspaceConfig> {
    std::fs::create_dir_all(dir)?;
    std::fs::create_dir_all(dir.join(MEMORY_DIR))?;

    write_persona(dir, answers)?;

    let profile = templates::render(
        templates::PROFILE_TEMPLATE,
        &[
            ("USER_NAME", answers.user_name.as_str()),
            ("USER_ROLE", answers.user_role.as_str()),
            ("USER_TIMEZONE", answers.user_timezone.as_str()),
            ("USER_PREFERENCES", answers.user_preferences.as_str()),
        ],
    );
    std::fs::write(dir.join(PROFILE_FILE), profile)?;
    std::fs::write(dir.join(MEMORY_FILE), templates::MEMORY_TEMPLATE)?;

    let today = chrono::Utc::now().format("%Y-%m-%d");
    let daily = dir.join(MEMORY_DIR).join(format!("{today}.md"));
    if !daily.exists() {
        std::fs::write(&daily, format!("# {today}\n\nWorkspace created.\n"))?;
    }

    let config = WorkspaceConfig {
        version: "1".to_string(),
        created: chrono::Utc::now().to_rfc3339(),
        backend: "dashboard".to_string(),
        workspace: dir.display().to_string(),
        ai: AiIdentity {
            name: answers.ai_name.clone(),
            personality: answers.personality.clone(),
        },
        user: UserIdentity {
            name: answers.user_name.clone(),
            role: answers.user_role.clone(),
            timezone: answers.user_timezone.clone(),
        },
        channels: BTreeMap::new(),
        modules: vec!["memory".to_string()],
    };
    config.save(dir)?;
    Ok(config)
}

/// Rewrite `PERSONA.md` wholesale from the identity answers. Used by both
/// init and the persona reconfiguration command.
pub fn write_persona(dir: &Path, answers: &InitAnswers) -> Result<()> {
    let persona = templates::render(
        templates::PERSONA_TEMPLATE,
        &[
            ("AI_NAME", answers.ai_name.as_str()),
            ("PERSONALITY_TYPE", answers.personality.as_str()),
            ("COMMUNICATION_STYLE", answers.communication_style.as_str()),
            ("SPECIAL_INSTRUCTIONS", answers.special_instructions.as_str()),
        ],
    );
    std::fs::write(dir.join(PERSONA_FILE), persona)?;
    Ok(())
}

/// Walk upward from `start` to the first directory containing `roost.json`.
pub fn find_workspace(start: &Path) -> Option<PathBuf> {
    let mut dir = start.to_path_buf();
    loop {
        if WorkspaceConfig::path(&dir).is_file() {
            return Some(dir);
        }
        if !dir.pop() {
            return None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir() -> PathBuf {
        let dir =
            std::env::temp_dir().join(format!("roost-workspace-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn init_creates_full_file_set() {
        let dir = scratch_dir();
        let ws = dir.join("roost-workspace");

        let answers = InitAnswers {
            ai_name: "Wren".to_string(),
            user_name: "Sam".to_string(),
            ..Default::default()
        };
        let config = init_workspace(&ws, &answers).unwrap();

        for file in [CONFIG_FILE, PERSONA_FILE, PROFILE_FILE, MEMORY_FILE] {
            assert!(ws.join(file).is_file(), "missing {file}");
        }
        let persona = std::fs::read_to_string(ws.join(PERSONA_FILE)).unwrap();
        assert!(persona.contains("# Wren"));
        assert!(!templates::has_placeholders(&persona));

        // One seeded daily note.
        let daily_count = std::fs::read_dir(ws.join(MEMORY_DIR)).unwrap().count();
        assert_eq!(daily_count, 1);

        assert_eq!(config.ai.name, "Wren");
        assert_eq!(config.user.name, "Sam");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn config_roundtrip_and_strict_load() {
        let dir = scratch_dir();
        let config = init_workspace(&dir.join("ws"), &InitAnswers::default()).unwrap();

        let loaded = WorkspaceConfig::load(&dir.join("ws")).unwrap();
        assert_eq!(loaded, config);

        // Corruption is an error, never a silent default.
        std::fs::write(WorkspaceConfig::path(&dir.join("ws")), "{ not json").unwrap();
        assert!(matches!(
            WorkspaceConfig::load(&dir.join("ws")),
            Err(RoostError::Config(_))
        ));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn save_leaves_no_temp_file() {
        let dir = scratch_dir();
        init_workspace(&dir.join("ws"), &InitAnswers::default()).unwrap();
        let leftovers: Vec<_> = std::fs::read_dir(dir.join("ws"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn find_workspace_walks_upward() {
        let dir = scratch_dir();
        let ws = dir.join("ws");
        init_workspace(&ws, &InitAnswers::default()).unwrap();

        let nested = ws.join("memory");
        assert_eq!(find_workspace(&nested), Some(ws.clone()));
        assert_eq!(find_workspace(&ws), Some(ws.clone()));

        let outside = scratch_dir();
        assert_eq!(find_workspace(&outside), None);
        let _ = std::fs::remove_dir_all(&dir);
        let _ = std::fs::remove_dir_all(&outside);
    }

    #[test]
    fn nonempty_detection() {
        let dir = scratch_dir();
        assert!(!dir_is_nonempty(&dir.join("missing")).unwrap());
        assert!(!dir_is_nonempty(&dir).unwrap());
        std::fs::write(dir.join("file"), "x").unwrap();
        assert!(dir_is_nonempty(&dir).unwrap());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn persona_rewrite_replaces_whole_file() {
        let dir = scratch_dir();
        let ws = dir.join("ws");
        init_workspace(&ws, &InitAnswers::default()).unwrap();

        let answers = InitAnswers {
            ai_name: "Nyx".to_string(),
            ..Default::default()
        };
        write_persona(&ws, &answers).unwrap();

        let persona = std::fs::read_to_string(ws.join(PERSONA_FILE)).unwrap();
        assert!(persona.contains("# Nyx"));
        assert!(!persona.contains("# Roost"));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
