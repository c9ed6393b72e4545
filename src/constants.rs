use crate::types::GameSettings;

pub const TICK_RATE: u32 = 10;
pub const TICK_MS: u64 = 1000 / TICK_RATE as u64;

pub const TIMER_SECOND_MS: u64 = 1_000;
pub const PROGRESS_DAMPING: f32 = 0.1;

pub const RECENT_WINDOW_SIZE: usize = 10;
pub const MAX_DRAW_ATTEMPTS: usize = 100;

pub const RESTART_GRACE_MS: u64 = 2_000;

pub const DEFAULT_TOTAL_PLAYERS: u32 = 6;
pub const DEFAULT_TIMER_DURATION: u32 = 60;
pub const DEFAULT_NUMBER_OF_TEAMS: u32 = 2;

pub const MAX_TEAM_NAME_LEN: usize = 32;

pub const FALLBACK_CHARACTERS: [&str; 2] = ["DefaultCharacter1", "DefaultCharacter2"];
pub const FALLBACK_ACTIONS: [&str; 2] = ["DefaultAction1", "DefaultAction2"];

pub fn default_settings() -> GameSettings {
    GameSettings {
        total_players: DEFAULT_TOTAL_PLAYERS,
        timer_duration: DEFAULT_TIMER_DURATION,
        number_of_teams: DEFAULT_NUMBER_OF_TEAMS,
    }
}

pub fn get_players_per_team(total_players: u32, team_count: usize) -> u32 {
    if team_count == 0 {
        return 0;
    }
    total_players.div_ceil(team_count as u32)
}
