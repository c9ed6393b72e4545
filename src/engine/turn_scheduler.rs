use crate::constants::get_players_per_team;
use crate::types::Team;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchState {
    pub teams: Vec<Team>,
    pub current_team_index: usize,
    pub current_round: u32,
    pub is_waiting: bool,
    pub is_game_over: bool,
    pub time_left: u32,
}

impl MatchState {
    pub fn new(teams: Vec<Team>, time_left: u32) -> Self {
        let teams = teams
            .into_iter()
            .map(|team| Team {
                score: 0,
                current_player: 1,
                ..team
            })
            .collect();
        Self {
            teams,
            current_team_index: 0,
            current_round: 1,
            is_waiting: true,
            is_game_over: false,
            time_left,
        }
    }

    pub fn current_team(&self) -> Option<&Team> {
        self.teams.get(self.current_team_index)
    }
}

/// Round-robin rotation over N teams.
///
/// `players_per_team` is the number of rounds played before the match ends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TurnScheduler {
    players_per_team: u32,
}

impl TurnScheduler {
    pub fn new(total_players: u32, team_count: usize) -> Self {
        Self {
            players_per_team: get_players_per_team(total_players, team_count),
        }
    }

    pub fn players_per_team(&self) -> u32 {
        self.players_per_team
    }

    /// Applies a turn timeout. Once the state is over it is returned as is.
    pub fn advance_turn(&self, mut state: MatchState) -> MatchState {
        if state.is_game_over || state.teams.is_empty() {
            return state;
        }

        let team_count = state.teams.len();
        let next_index = (state.current_team_index + 1) % team_count;
        if state.current_team_index + 1 >= team_count {
            state.current_round += 1;
        }

        if state.current_round > self.players_per_team {
            state.is_game_over = true;
            state.is_waiting = false;
            return state;
        }

        state.current_team_index = next_index;
        state.teams[next_index].current_player = state.current_round;
        state.is_waiting = true;
        state
    }

    pub fn record_correct_guess(&self, mut state: MatchState) -> MatchState {
        if state.is_game_over {
            return state;
        }
        if let Some(team) = state.teams.get_mut(state.current_team_index) {
            team.score += 1;
        }
        state
    }

    /// Number of timeouts a full match takes.
    pub fn total_turns(&self, team_count: usize) -> u32 {
        self.players_per_team * team_count as u32
    }
}
