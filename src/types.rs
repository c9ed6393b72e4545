use serde::{Deserialize, Serialize};

use crate::constants::default_settings;
use crate::error::StoreError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: String,
    pub name: String,
    pub score: u32,
    #[serde(rename = "currentPlayer")]
    pub current_player: u32,
}

/// Team as persisted by a [`crate::store::TeamStore`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamRecord {
    pub id: String,
    pub name: String,
    pub score: u32,
    #[serde(rename = "createdAt", alias = "created_at")]
    pub created_at: String,
    #[serde(rename = "updatedAt", alias = "updated_at")]
    pub updated_at: String,
}

impl TeamRecord {
    pub fn to_match_team(&self) -> Team {
        Team {
            id: self.id.clone(),
            name: self.name.clone(),
            score: 0,
            current_player: 1,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    pub character: String,
    pub action: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameData {
    #[serde(default)]
    pub characters: Vec<String>,
    #[serde(default)]
    pub actions: Vec<String>,
}

impl GameData {
    pub fn is_usable(&self) -> bool {
        !self.characters.is_empty() && !self.actions.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSettings {
    #[serde(rename = "totalPlayers")]
    pub total_players: u32,
    #[serde(rename = "timerDuration")]
    pub timer_duration: u32,
    #[serde(rename = "numberOfTeams")]
    pub number_of_teams: u32,
}

impl Default for GameSettings {
    fn default() -> Self {
        default_settings()
    }
}

impl GameSettings {
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.total_players == 0 {
            return Err(StoreError::Validation(
                "totalPlayers must be at least 1".to_string(),
            ));
        }
        if self.timer_duration == 0 {
            return Err(StoreError::Validation(
                "timerDuration must be at least 1".to_string(),
            ));
        }
        if self.number_of_teams == 0 {
            return Err(StoreError::Validation(
                "numberOfTeams must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Settings as found in the store; missing fields fall back to defaults.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSettings {
    #[serde(rename = "totalPlayers", skip_serializing_if = "Option::is_none")]
    pub total_players: Option<u32>,
    #[serde(rename = "timerDuration", skip_serializing_if = "Option::is_none")]
    pub timer_duration: Option<u32>,
    #[serde(rename = "numberOfTeams", skip_serializing_if = "Option::is_none")]
    pub number_of_teams: Option<u32>,
}

impl StoredSettings {
    pub fn merged_over_defaults(&self) -> GameSettings {
        let defaults = default_settings();
        GameSettings {
            total_players: self.total_players.unwrap_or(defaults.total_players),
            timer_duration: self.timer_duration.unwrap_or(defaults.timer_duration),
            number_of_teams: self.number_of_teams.unwrap_or(defaults.number_of_teams),
        }
    }
}

impl From<GameSettings> for StoredSettings {
    fn from(value: GameSettings) -> Self {
        Self {
            total_players: Some(value.total_players),
            timer_duration: Some(value.timer_duration),
            number_of_teams: Some(value.number_of_teams),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchPhase {
    Waiting {
        #[serde(rename = "teamIndex")]
        team_index: usize,
    },
    Active,
    GameOver,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchOutcome {
    Winner {
        #[serde(rename = "teamId")]
        team_id: String,
        score: u32,
    },
    Tie {
        #[serde(rename = "teamIds")]
        team_ids: Vec<String>,
        score: u32,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MatchEvent {
    TurnStarted {
        #[serde(rename = "teamId")]
        team_id: String,
        round: u32,
    },
    CorrectGuess {
        #[serde(rename = "teamId")]
        team_id: String,
        score: u32,
    },
    PromptSkipped {
        #[serde(rename = "teamId")]
        team_id: String,
    },
    TurnEnded {
        #[serde(rename = "teamId")]
        team_id: String,
    },
    RoundCompleted {
        round: u32,
    },
    GameOver,
    ScoresSaved {
        saved: usize,
        failed: usize,
    },
}

#[derive(Clone, Debug, Serialize)]
pub struct MatchSnapshot {
    #[serde(rename = "matchId")]
    pub match_id: String,
    pub phase: MatchPhase,
    pub teams: Vec<Team>,
    #[serde(rename = "currentTeamIndex")]
    pub current_team_index: usize,
    #[serde(rename = "currentRound")]
    pub current_round: u32,
    #[serde(rename = "playersPerTeam")]
    pub players_per_team: u32,
    #[serde(rename = "timeLeft")]
    pub time_left: u32,
    #[serde(rename = "timerDuration")]
    pub timer_duration: u32,
    pub progress: f32,
    #[serde(rename = "smoothedProgress")]
    pub smoothed_progress: f32,
    pub prompt: Option<Prompt>,
    #[serde(rename = "isSaving")]
    pub is_saving: bool,
    #[serde(rename = "canRestart")]
    pub can_restart: bool,
    pub outcome: Option<MatchOutcome>,
    pub events: Vec<MatchEvent>,
}
