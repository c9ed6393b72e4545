use serde_json::Value;

use crate::error::StoreError;
use crate::types::GameSettings;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchAction {
    Ready,
    Correct,
    Skip,
    Restart,
}

impl MatchAction {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ready" => Some(Self::Ready),
            "correct" => Some(Self::Correct),
            "skip" => Some(Self::Skip),
            "restart" => Some(Self::Restart),
            _ => None,
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum ParsedClientMessage {
    Action(MatchAction),
    Ping { t: f64 },
}

pub fn parse_client_message(raw: &str) -> Option<ParsedClientMessage> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let object = value.as_object()?;
    let message_type = object.get("type")?.as_str()?;

    match message_type {
        "ping" => {
            let t = object.get("t")?.as_f64()?;
            if !t.is_finite() {
                return None;
            }
            Some(ParsedClientMessage::Ping { t })
        }
        other => MatchAction::parse(other).map(ParsedClientMessage::Action),
    }
}

/// Settings update body. Every field must be present and an integer; the
/// range check is left to [`GameSettings::validate`].
pub fn parse_settings_payload(value: &Value) -> Result<GameSettings, StoreError> {
    let object = value
        .as_object()
        .ok_or_else(|| StoreError::Validation("settings must be an object".to_string()))?;
    let total_players = require_u32(object.get("totalPlayers"), "totalPlayers")?;
    let timer_duration = require_u32(object.get("timerDuration"), "timerDuration")?;
    let number_of_teams = require_u32(object.get("numberOfTeams"), "numberOfTeams")?;
    let settings = GameSettings {
        total_players,
        timer_duration,
        number_of_teams,
    };
    settings.validate()?;
    Ok(settings)
}

pub fn parse_team_names(value: &Value) -> Option<Vec<String>> {
    let names = value.as_object()?.get("teamNames")?.as_array()?;
    names
        .iter()
        .map(|name| name.as_str().map(str::to_string))
        .collect()
}

pub fn parse_new_score(value: &Value) -> Option<u32> {
    let raw = value.as_object()?.get("newScore")?;
    let score = parse_optional_i64(Some(raw))??;
    u32::try_from(score).ok()
}

fn require_u32(value: Option<&Value>, field: &str) -> Result<u32, StoreError> {
    let invalid = || StoreError::Validation(format!("{field} must be a non-negative integer"));
    let Some(value) = value else {
        return Err(StoreError::Validation(format!("{field} is required")));
    };
    let number = match value.as_f64() {
        Some(number) if number.fract() == 0.0 => parse_optional_i64(Some(value)),
        _ => None,
    };
    let Some(Some(number)) = number else {
        return Err(invalid());
    };
    u32::try_from(number).map_err(|_| invalid())
}

fn parse_optional_i64(value: Option<&Value>) -> Option<Option<i64>> {
    const MAX_SAFE_INTEGER_F64: f64 = 9_007_199_254_740_991.0;

    let Some(value) = value else {
        return Some(None);
    };
    if let Some(number) = value.as_i64() {
        return Some(Some(number));
    }
    if let Some(number) = value.as_u64() {
        return i64::try_from(number).ok().map(Some);
    }
    if let Some(number) = value.as_f64() {
        if number.is_finite() {
            let floored = number.floor();
            if floored.abs() > MAX_SAFE_INTEGER_F64 {
                return None;
            }
            return Some(Some(floored as i64));
        }
    }
    None
}
