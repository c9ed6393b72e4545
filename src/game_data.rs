use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::types::GameData;

#[async_trait]
pub trait GameDataStore: Send + Sync {
    async fn fetch(&self) -> Result<GameData, StoreError>;
}

/// Catalog read from a JSON file shaped `{ "characters": [...], "actions": [...] }`.
pub struct FileGameDataStore {
    path: PathBuf,
}

impl FileGameDataStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl GameDataStore for FileGameDataStore {
    async fn fetch(&self) -> Result<GameData, StoreError> {
        let text = tokio::fs::read_to_string(&self.path).await?;
        let data: GameData = serde_json::from_str(&text)?;
        Ok(normalize(data))
    }
}

/// Catalog compiled into the binary.
#[derive(Clone, Debug, Default)]
pub struct BuiltinGameData;

#[async_trait]
impl GameDataStore for BuiltinGameData {
    async fn fetch(&self) -> Result<GameData, StoreError> {
        Ok(builtin_catalog())
    }
}

pub fn builtin_catalog() -> GameData {
    const CHARACTERS: [&str; 14] = [
        "A pirate",
        "A grandmother",
        "A robot",
        "A ballerina",
        "A chef",
        "A vampire",
        "A cowboy",
        "An astronaut",
        "A toddler",
        "A magician",
        "A firefighter",
        "A penguin",
        "A rock star",
        "A detective",
    ];
    const ACTIONS: [&str; 14] = [
        "brushing their teeth",
        "assembling furniture",
        "surfing a big wave",
        "losing the car keys",
        "baking a cake",
        "walking a stubborn dog",
        "changing a flat tyre",
        "taking a selfie",
        "stuck in an elevator",
        "learning to ski",
        "catching a fish",
        "dancing at a wedding",
        "hiding from the rain",
        "opening a jar",
    ];
    GameData {
        characters: CHARACTERS.iter().map(|value| value.to_string()).collect(),
        actions: ACTIONS.iter().map(|value| value.to_string()).collect(),
    }
}

fn normalize(data: GameData) -> GameData {
    let clean = |values: Vec<String>| -> Vec<String> {
        values
            .into_iter()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .collect()
    };
    GameData {
        characters: clean(data.characters),
        actions: clean(data.actions),
    }
}
