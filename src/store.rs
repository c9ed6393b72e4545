use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use crate::error::StoreError;
use crate::server_utils::sanitize_team_name;
use crate::types::{GameSettings, StoredSettings, TeamRecord};

const STORE_VERSION: u8 = 1;

#[async_trait]
pub trait TeamStore: Send + Sync {
    async fn create(&self, name: &str) -> Result<TeamRecord, StoreError>;
    async fn list(&self) -> Result<Vec<TeamRecord>, StoreError>;
    async fn update_score(&self, id: &str, new_score: u32) -> Result<TeamRecord, StoreError>;
    async fn delete(&self, id: &str) -> Result<(), StoreError>;
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Stored settings merged over the defaults.
    async fn get(&self) -> Result<GameSettings, StoreError>;
    async fn set(&self, settings: GameSettings) -> Result<(), StoreError>;
}

#[derive(Clone, Debug, Serialize)]
struct StoreFile<'a> {
    version: u8,
    teams: &'a HashMap<String, TeamRecord>,
    #[serde(rename = "gameSettings")]
    game_settings: &'a StoredSettings,
}

#[derive(Clone, Debug, Deserialize)]
struct StoreFileRaw {
    version: u8,
    #[serde(default)]
    teams: HashMap<String, serde_json::Value>,
    #[serde(rename = "gameSettings", default)]
    game_settings: Option<serde_json::Value>,
}

#[derive(Clone, Debug, Default)]
struct StoreData {
    teams: HashMap<String, TeamRecord>,
    settings: StoredSettings,
}

/// Teams and settings kept in one JSON document.
///
/// Every mutation is staged on a copy, written out, and only then committed
/// to memory, so a failed write leaves both the file and the in-memory view
/// untouched.
pub struct JsonFileStore {
    file_path: Option<PathBuf>,
    data: Mutex<StoreData>,
}

impl JsonFileStore {
    pub fn open(file_path: PathBuf) -> Self {
        let data = load_document(&file_path);
        Self {
            file_path: Some(file_path),
            data: Mutex::new(data),
        }
    }

    /// Store that never touches the filesystem.
    pub fn in_memory() -> Self {
        Self {
            file_path: None,
            data: Mutex::new(StoreData::default()),
        }
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    async fn persist(&self, data: &StoreData) -> Result<(), StoreError> {
        let Some(path) = self.file_path.as_ref() else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|error| {
                    StoreError::Unavailable(format!(
                        "failed to create parent dir {}: {error}",
                        parent.display()
                    ))
                })?;
            }
        }

        let payload = StoreFile {
            version: STORE_VERSION,
            teams: &data.teams,
            game_settings: &data.settings,
        };
        let text = serde_json::to_string_pretty(&payload)?;
        tokio::fs::write(path, text).await.map_err(|error| {
            StoreError::Unavailable(format!("failed to write {}: {error}", path.display()))
        })
    }
}

#[async_trait]
impl TeamStore for JsonFileStore {
    async fn create(&self, name: &str) -> Result<TeamRecord, StoreError> {
        let name = sanitize_team_name(name)
            .ok_or_else(|| StoreError::Validation("team name is required".to_string()))?;
        let now = now_iso();
        let record = TeamRecord {
            id: Uuid::new_v4().to_string(),
            name,
            score: 0,
            created_at: now.clone(),
            updated_at: now,
        };

        let mut guard = self.data.lock().await;
        let mut staged = guard.clone();
        staged.teams.insert(record.id.clone(), record.clone());
        self.persist(&staged).await?;
        *guard = staged;
        Ok(record)
    }

    async fn list(&self) -> Result<Vec<TeamRecord>, StoreError> {
        let guard = self.data.lock().await;
        let mut teams: Vec<TeamRecord> = guard.teams.values().cloned().collect();
        teams.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(teams)
    }

    async fn update_score(&self, id: &str, new_score: u32) -> Result<TeamRecord, StoreError> {
        let mut guard = self.data.lock().await;
        let mut staged = guard.clone();
        let record = staged
            .teams
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("team {id}")))?;
        record.score = new_score;
        record.updated_at = now_iso();
        let updated = record.clone();
        self.persist(&staged).await?;
        *guard = staged;
        Ok(updated)
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let mut guard = self.data.lock().await;
        if !guard.teams.contains_key(id) {
            return Err(StoreError::NotFound(format!("team {id}")));
        }
        let mut staged = guard.clone();
        staged.teams.remove(id);
        self.persist(&staged).await?;
        *guard = staged;
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for JsonFileStore {
    async fn get(&self) -> Result<GameSettings, StoreError> {
        let guard = self.data.lock().await;
        Ok(guard.settings.merged_over_defaults())
    }

    async fn set(&self, settings: GameSettings) -> Result<(), StoreError> {
        settings.validate()?;
        let mut guard = self.data.lock().await;
        let mut staged = guard.clone();
        staged.settings = settings.into();
        self.persist(&staged).await?;
        *guard = staged;
        Ok(())
    }
}

fn load_document(path: &Path) -> StoreData {
    let text = match fs::read_to_string(path) {
        Ok(value) => value,
        Err(error) => {
            if error.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), %error, "failed to read store file");
            }
            return StoreData::default();
        }
    };
    let parsed = match serde_json::from_str::<StoreFileRaw>(&text) {
        Ok(value) if value.version == STORE_VERSION => value,
        Ok(value) => {
            warn!(
                path = %path.display(),
                version = value.version,
                "unsupported store version"
            );
            return StoreData::default();
        }
        Err(error) => {
            warn!(path = %path.display(), %error, "failed to parse store file");
            return StoreData::default();
        }
    };

    let mut teams = HashMap::<String, TeamRecord>::new();
    for (team_key, raw_value) in parsed.teams {
        let record: TeamRecord = match serde_json::from_value(raw_value) {
            Ok(record) => record,
            Err(error) => {
                warn!(team = %team_key, %error, "skipping malformed team entry");
                continue;
            }
        };
        let Some(record) = sanitize_stored_team(&team_key, record) else {
            continue;
        };
        teams.insert(record.id.clone(), record);
    }

    let settings = match parsed.game_settings {
        None => StoredSettings::default(),
        Some(raw) => match serde_json::from_value::<StoredSettings>(raw) {
            Ok(settings) => sanitize_stored_settings(settings),
            Err(error) => {
                warn!(%error, "ignoring malformed stored settings");
                StoredSettings::default()
            }
        },
    };

    StoreData { teams, settings }
}

fn sanitize_stored_team(key: &str, record: TeamRecord) -> Option<TeamRecord> {
    let name = sanitize_team_name(&record.name)?;
    let id = if record.id.trim().is_empty() {
        key.to_string()
    } else {
        record.id
    };
    Some(TeamRecord { id, name, ..record })
}

fn sanitize_stored_settings(value: StoredSettings) -> StoredSettings {
    let positive = |field: Option<u32>| field.filter(|value| *value > 0);
    StoredSettings {
        total_players: positive(value.total_players),
        timer_duration: positive(value.timer_duration),
        number_of_teams: positive(value.number_of_teams),
    }
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
