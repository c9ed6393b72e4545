use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::future::{join_all, try_join_all};
use tracing::{debug, info, warn};

use crate::constants::RESTART_GRACE_MS;
use crate::error::MatchError;
use crate::game_data::GameDataStore;
use crate::rng::Rng;
use crate::server_utils::sanitize_team_name;
use crate::store::TeamStore;
use crate::types::{
    GameSettings, MatchEvent, MatchOutcome, MatchPhase, MatchSnapshot, Prompt, Team,
};

mod prompt_selector;
mod round_timer;
mod turn_scheduler;

pub use self::prompt_selector::{fallback_game_data, Combination, PromptSelector};
pub use self::round_timer::{RoundTimer, TimerTick};
pub use self::turn_scheduler::{MatchState, TurnScheduler};

static NEXT_MATCH_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, Default)]
pub struct MatchOptions {
    pub seed: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FinalScore {
    pub team_id: String,
    pub score: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SaveReport {
    pub saved: usize,
    pub failed: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StepOutcome {
    pub turn_ended: bool,
    pub game_over: bool,
}

/// Drives one match: waiting for a team, its timed turn, the rotation to the
/// next team and the final save.
#[derive(Clone, Debug)]
pub struct GameOrchestrator {
    match_id: String,
    settings: GameSettings,
    scheduler: TurnScheduler,
    selector: PromptSelector,
    timer: RoundTimer,
    state: MatchState,
    roster: Vec<Team>,
    prompt: Option<Prompt>,
    saving: bool,
    game_over_elapsed_ms: Option<u64>,
    events: Vec<MatchEvent>,
}

impl GameOrchestrator {
    /// Creates the teams through `team_store` and loads a fresh prompt
    /// catalog. The match begins waiting for the first team.
    pub async fn start(
        team_store: &dyn TeamStore,
        game_data: &dyn GameDataStore,
        settings: GameSettings,
        team_names: &[String],
        options: MatchOptions,
    ) -> Result<Self, MatchError> {
        settings.validate()?;
        let names: Vec<String> = team_names
            .iter()
            .map(|name| sanitize_team_name(name))
            .collect::<Option<_>>()
            .ok_or_else(|| MatchError::InvalidTeams("team names must not be empty".to_string()))?;
        if names.len() != settings.number_of_teams as usize {
            return Err(MatchError::InvalidTeams(format!(
                "expected {} team names, got {}",
                settings.number_of_teams,
                names.len()
            )));
        }

        let records = try_join_all(names.iter().map(|name| team_store.create(name))).await?;
        let rng = options.seed.map(Rng::new).unwrap_or_else(Rng::from_entropy);
        let selector = PromptSelector::load(game_data, rng).await;
        let teams = records.iter().map(|record| record.to_match_team()).collect();
        Self::new(teams, settings, selector)
    }

    pub fn new(
        teams: Vec<Team>,
        settings: GameSettings,
        selector: PromptSelector,
    ) -> Result<Self, MatchError> {
        if teams.is_empty() {
            return Err(MatchError::InvalidTeams(
                "a match needs at least one team".to_string(),
            ));
        }
        let scheduler = TurnScheduler::new(settings.total_players, teams.len());
        let state = MatchState::new(teams, settings.timer_duration);
        let match_id = next_match_id();
        info!(
            match_id = %match_id,
            teams = state.teams.len(),
            players_per_team = scheduler.players_per_team(),
            timer = settings.timer_duration,
            "match created"
        );
        Ok(Self {
            match_id,
            settings,
            scheduler,
            selector,
            timer: RoundTimer::new(settings.timer_duration),
            roster: state.teams.clone(),
            state,
            prompt: None,
            saving: false,
            game_over_elapsed_ms: None,
            events: Vec::new(),
        })
    }

    pub fn match_id(&self) -> &str {
        &self.match_id
    }

    pub fn settings(&self) -> &GameSettings {
        &self.settings
    }

    pub fn state(&self) -> &MatchState {
        &self.state
    }

    pub fn prompt(&self) -> Option<&Prompt> {
        self.prompt.as_ref()
    }

    pub fn players_per_team(&self) -> u32 {
        self.scheduler.players_per_team()
    }

    pub fn is_saving(&self) -> bool {
        self.saving
    }

    pub fn is_game_over(&self) -> bool {
        self.state.is_game_over
    }

    pub fn phase(&self) -> MatchPhase {
        if self.state.is_game_over {
            MatchPhase::GameOver
        } else if self.state.is_waiting {
            MatchPhase::Waiting {
                team_index: self.state.current_team_index,
            }
        } else {
            MatchPhase::Active
        }
    }

    /// The waiting team signals it is ready: its turn starts.
    pub fn ready(&mut self) -> Result<(), MatchError> {
        if !matches!(self.phase(), MatchPhase::Waiting { .. }) {
            return Err(self.invalid_phase("ready"));
        }
        self.state.is_waiting = false;
        self.timer.start(self.settings.timer_duration);
        self.state.time_left = self.timer.time_left();
        self.prompt = Some(self.selector.next_prompt());
        if let Some(team) = self.state.current_team() {
            self.events.push(MatchEvent::TurnStarted {
                team_id: team.id.clone(),
                round: self.state.current_round,
            });
        }
        Ok(())
    }

    pub fn correct(&mut self) -> Result<(), MatchError> {
        if self.phase() != MatchPhase::Active {
            return Err(self.invalid_phase("correct"));
        }
        self.state = self.scheduler.record_correct_guess(self.state.clone());
        if let Some(team) = self.state.current_team() {
            self.events.push(MatchEvent::CorrectGuess {
                team_id: team.id.clone(),
                score: team.score,
            });
        }
        self.prompt = Some(self.selector.next_prompt());
        Ok(())
    }

    pub fn skip(&mut self) -> Result<(), MatchError> {
        if self.phase() != MatchPhase::Active {
            return Err(self.invalid_phase("skip"));
        }
        if let Some(team) = self.state.current_team() {
            self.events.push(MatchEvent::PromptSkipped {
                team_id: team.id.clone(),
            });
        }
        self.prompt = Some(self.selector.next_prompt());
        Ok(())
    }

    pub fn step(&mut self, dt_ms: u64) -> StepOutcome {
        if let Some(elapsed) = self.game_over_elapsed_ms.as_mut() {
            *elapsed = elapsed.saturating_add(dt_ms);
            return StepOutcome::default();
        }
        match self.timer.step(dt_ms) {
            TimerTick::Idle => StepOutcome::default(),
            TimerTick::Running { time_left } => {
                self.state.time_left = time_left;
                StepOutcome::default()
            }
            TimerTick::Expired => self.end_turn(),
        }
    }

    fn end_turn(&mut self) -> StepOutcome {
        let ending_team_id = self
            .state
            .current_team()
            .map(|team| team.id.clone())
            .unwrap_or_default();
        let round_before = self.state.current_round;

        self.state.time_left = 0;
        self.state = self.scheduler.advance_turn(self.state.clone());
        self.prompt = None;
        self.events.push(MatchEvent::TurnEnded {
            team_id: ending_team_id,
        });
        if self.state.current_round > round_before {
            self.events.push(MatchEvent::RoundCompleted {
                round: round_before,
            });
        }

        if !self.state.is_game_over {
            debug!(
                match_id = %self.match_id,
                next_team = self.state.current_team_index,
                round = self.state.current_round,
                "turn ended"
            );
            return StepOutcome {
                turn_ended: true,
                game_over: false,
            };
        }

        self.timer.cancel();
        self.saving = true;
        self.game_over_elapsed_ms = Some(0);
        self.events.push(MatchEvent::GameOver);
        info!(match_id = %self.match_id, outcome = ?self.outcome(), "match over");
        StepOutcome {
            turn_ended: true,
            game_over: true,
        }
    }

    pub fn final_scores(&self) -> Vec<FinalScore> {
        self.state
            .teams
            .iter()
            .map(|team| FinalScore {
                team_id: team.id.clone(),
                score: team.score,
            })
            .collect()
    }

    pub fn finish_final_save(&mut self, report: SaveReport) {
        self.saving = false;
        self.events.push(MatchEvent::ScoresSaved {
            saved: report.saved,
            failed: report.failed,
        });
    }

    /// Persists the final scores and clears the saving flag.
    pub async fn save_final_scores(&mut self, store: &dyn TeamStore) -> SaveReport {
        let report = persist_final_scores(store, &self.final_scores()).await;
        self.finish_final_save(report);
        report
    }

    pub fn can_restart(&self) -> bool {
        self.state.is_game_over
            && !self.saving
            && self
                .game_over_elapsed_ms
                .map(|elapsed| elapsed >= RESTART_GRACE_MS)
                .unwrap_or(false)
    }

    /// Same teams, zeroed scores, empty prompt window.
    pub fn restart(&mut self) -> Result<(), MatchError> {
        if !self.can_restart() {
            return Err(MatchError::RestartLocked);
        }
        self.match_id = next_match_id();
        self.state = MatchState::new(self.roster.clone(), self.settings.timer_duration);
        self.timer.reset(self.settings.timer_duration);
        self.selector.reset();
        self.prompt = None;
        self.game_over_elapsed_ms = None;
        self.events.clear();
        info!(match_id = %self.match_id, "match restarted");
        Ok(())
    }

    pub fn outcome(&self) -> Option<MatchOutcome> {
        if !self.state.is_game_over {
            return None;
        }
        let best = self.state.teams.iter().map(|team| team.score).max()?;
        let mut leaders: Vec<&Team> = self
            .state
            .teams
            .iter()
            .filter(|team| team.score == best)
            .collect();
        if leaders.len() == 1 {
            let winner = leaders.remove(0);
            return Some(MatchOutcome::Winner {
                team_id: winner.id.clone(),
                score: best,
            });
        }
        Some(MatchOutcome::Tie {
            team_ids: leaders.iter().map(|team| team.id.clone()).collect(),
            score: best,
        })
    }

    pub fn build_snapshot(&mut self, include_events: bool) -> MatchSnapshot {
        let events = if include_events {
            std::mem::take(&mut self.events)
        } else {
            Vec::new()
        };
        MatchSnapshot {
            match_id: self.match_id.clone(),
            phase: self.phase(),
            teams: self.state.teams.clone(),
            current_team_index: self.state.current_team_index,
            current_round: self.state.current_round,
            players_per_team: self.scheduler.players_per_team(),
            time_left: self.state.time_left,
            timer_duration: self.timer.duration(),
            progress: self.timer.progress(),
            smoothed_progress: self.timer.smoothed_progress(),
            prompt: self.prompt.clone(),
            is_saving: self.saving,
            can_restart: self.can_restart(),
            outcome: self.outcome(),
            events,
        }
    }

    fn invalid_phase(&self, action: &'static str) -> MatchError {
        let phase = match self.phase() {
            MatchPhase::Waiting { .. } => "waiting",
            MatchPhase::Active => "active",
            MatchPhase::GameOver => "game over",
        };
        MatchError::InvalidPhase { action, phase }
    }
}

/// One `update_score` call per team, all in flight together. Failures are
/// logged and counted, never propagated.
pub async fn persist_final_scores(store: &dyn TeamStore, scores: &[FinalScore]) -> SaveReport {
    let results = join_all(scores.iter().map(|entry| async move {
        (entry, store.update_score(&entry.team_id, entry.score).await)
    }))
    .await;

    let mut report = SaveReport::default();
    for (entry, result) in results {
        match result {
            Ok(_) => report.saved += 1,
            Err(error) => {
                warn!(team_id = %entry.team_id, %error, "failed to save final score");
                report.failed += 1;
            }
        }
    }
    report
}

fn next_match_id() -> String {
    format!("match_{}", NEXT_MATCH_ID.fetch_add(1, Ordering::Relaxed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::game_data::BuiltinGameData;
    use crate::store::JsonFileStore;
    use crate::types::{GameData, TeamRecord};
    use async_trait::async_trait;

    struct OfflineTeamStore;

    #[async_trait]
    impl TeamStore for OfflineTeamStore {
        async fn create(&self, _name: &str) -> Result<TeamRecord, StoreError> {
            Err(StoreError::Unavailable("offline".to_string()))
        }

        async fn list(&self) -> Result<Vec<TeamRecord>, StoreError> {
            Err(StoreError::Unavailable("offline".to_string()))
        }

        async fn update_score(&self, _id: &str, _new_score: u32) -> Result<TeamRecord, StoreError> {
            Err(StoreError::Unavailable("offline".to_string()))
        }

        async fn delete(&self, _id: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("offline".to_string()))
        }
    }

    fn settings(total_players: u32, timer_duration: u32, number_of_teams: u32) -> GameSettings {
        GameSettings {
            total_players,
            timer_duration,
            number_of_teams,
        }
    }

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    fn make_match(team_count: usize, total_players: u32, timer: u32) -> GameOrchestrator {
        let teams = (0..team_count)
            .map(|idx| Team {
                id: format!("team_{idx}"),
                name: format!("Team {idx}"),
                score: 0,
                current_player: 1,
            })
            .collect();
        let data = GameData {
            characters: (0..20).map(|i| format!("c{i}")).collect(),
            actions: (0..20).map(|i| format!("a{i}")).collect(),
        };
        GameOrchestrator::new(
            teams,
            settings(total_players, timer, team_count as u32),
            PromptSelector::new(data, Rng::new(11)),
        )
        .expect("match should build")
    }

    fn play_turn(game: &mut GameOrchestrator) -> StepOutcome {
        game.ready().expect("team should be waiting");
        game.step(game.settings().timer_duration as u64 * 1_000)
    }

    #[tokio::test]
    async fn start_creates_teams_and_waits_for_first_team() {
        let store = JsonFileStore::in_memory();
        let mut game = GameOrchestrator::start(
            &store,
            &BuiltinGameData,
            settings(6, 60, 2),
            &names(&["Rouge", "Bleu"]),
            MatchOptions { seed: Some(9) },
        )
        .await
        .expect("match should start");

        let stored = store.list().await.expect("list teams");
        assert_eq!(stored.len(), 2);
        assert_eq!(game.phase(), MatchPhase::Waiting { team_index: 0 });
        assert_eq!(game.state().current_round, 1);
        assert!(game.prompt().is_none());

        let snapshot = game.build_snapshot(true);
        assert_eq!(snapshot.teams.len(), 2);
        assert!(snapshot.teams.iter().all(|team| team.score == 0));
        assert_eq!(snapshot.players_per_team, 3);
    }

    #[tokio::test]
    async fn start_rejects_blank_names_and_wrong_count() {
        let store = JsonFileStore::in_memory();
        let blank = GameOrchestrator::start(
            &store,
            &BuiltinGameData,
            settings(6, 60, 2),
            &names(&["Rouge", "  "]),
            MatchOptions::default(),
        )
        .await;
        assert!(matches!(blank, Err(MatchError::InvalidTeams(_))));

        let wrong_count = GameOrchestrator::start(
            &store,
            &BuiltinGameData,
            settings(6, 60, 3),
            &names(&["Rouge", "Bleu"]),
            MatchOptions::default(),
        )
        .await;
        assert!(matches!(wrong_count, Err(MatchError::InvalidTeams(_))));
        assert!(store.list().await.expect("list teams").is_empty());
    }

    #[tokio::test]
    async fn start_surfaces_store_failure() {
        let result = GameOrchestrator::start(
            &OfflineTeamStore,
            &BuiltinGameData,
            settings(6, 60, 2),
            &names(&["Rouge", "Bleu"]),
            MatchOptions::default(),
        )
        .await;
        assert!(matches!(
            result,
            Err(MatchError::Store(StoreError::Unavailable(_)))
        ));
    }

    #[test]
    fn actions_require_matching_phase() {
        let mut game = make_match(2, 6, 10);
        assert!(matches!(
            game.correct(),
            Err(MatchError::InvalidPhase { action: "correct", .. })
        ));
        assert!(game.skip().is_err());

        game.ready().expect("ready while waiting");
        assert!(game.prompt().is_some());
        assert!(matches!(
            game.ready(),
            Err(MatchError::InvalidPhase { phase: "active", .. })
        ));
        assert!(matches!(game.restart(), Err(MatchError::RestartLocked)));
    }

    #[test]
    fn correct_scores_current_team_and_draws_new_prompt() {
        let mut game = make_match(2, 6, 10);
        game.ready().expect("ready");
        let first = game.prompt().cloned().expect("prompt drawn");
        game.correct().expect("correct");
        let second = game.prompt().cloned().expect("prompt drawn");
        assert_ne!(first, second);
        assert_eq!(game.state().teams[0].score, 1);
        assert_eq!(game.state().teams[1].score, 0);
        assert_eq!(game.phase(), MatchPhase::Active);

        game.skip().expect("skip");
        assert_eq!(game.state().teams[0].score, 1);
    }

    #[test]
    fn expiry_moves_to_next_team_and_stops_ticking() {
        let mut game = make_match(2, 6, 3);
        game.ready().expect("ready");
        assert_eq!(game.step(1_000), StepOutcome::default());
        assert_eq!(game.state().time_left, 2);

        let outcome = game.step(2_000);
        assert!(outcome.turn_ended);
        assert!(!outcome.game_over);
        assert_eq!(game.phase(), MatchPhase::Waiting { team_index: 1 });
        assert!(game.prompt().is_none());

        let before = game.state().clone();
        assert_eq!(game.step(10_000), StepOutcome::default());
        assert_eq!(game.state(), &before);
    }

    #[test]
    fn two_teams_six_players_take_six_turns() {
        let mut game = make_match(2, 6, 2);
        let mut turns = 0;
        while !game.is_game_over() {
            let outcome = play_turn(&mut game);
            assert!(outcome.turn_ended);
            turns += 1;
            assert!(turns <= 6);
        }
        assert_eq!(turns, 6);
        assert_eq!(game.phase(), MatchPhase::GameOver);
        assert!(game.is_saving());
    }

    #[tokio::test]
    async fn restart_waits_for_save_and_grace_period() {
        let store = JsonFileStore::in_memory();
        let mut game = GameOrchestrator::start(
            &store,
            &BuiltinGameData,
            settings(2, 1, 2),
            &names(&["Rouge", "Bleu"]),
            MatchOptions { seed: Some(4) },
        )
        .await
        .expect("match should start");

        game.ready().expect("ready");
        game.correct().expect("correct");
        game.correct().expect("correct");
        play_turn_after_ready(&mut game);
        play_turn(&mut game);
        assert!(game.is_game_over());

        game.step(5_000);
        assert!(!game.can_restart(), "saving must block restart");

        let report = game.save_final_scores(&store).await;
        assert_eq!(report, SaveReport { saved: 2, failed: 0 });
        assert!(game.can_restart());

        let stored = store.list().await.expect("list teams");
        let rouge = stored
            .iter()
            .find(|team| team.name == "Rouge")
            .expect("rouge stored");
        assert_eq!(rouge.score, 2);

        let old_id = game.match_id().to_string();
        game.restart().expect("restart");
        assert_ne!(game.match_id(), old_id);
        assert_eq!(game.phase(), MatchPhase::Waiting { team_index: 0 });
        assert_eq!(game.state().current_round, 1);
        assert!(game.state().teams.iter().all(|team| team.score == 0));
        assert_eq!(game.selector.recent_combinations().count(), 0);

        let snapshot = game.build_snapshot(false);
        assert_eq!(snapshot.time_left, 1);
        assert_eq!(snapshot.progress, 0.0);
        assert_eq!(snapshot.smoothed_progress, 0.0);
    }

    fn play_turn_after_ready(game: &mut GameOrchestrator) {
        let outcome = game.step(game.settings().timer_duration as u64 * 1_000);
        assert!(outcome.turn_ended);
    }

    #[tokio::test]
    async fn grace_period_applies_even_when_save_is_instant() {
        let store = JsonFileStore::in_memory();
        let mut game = make_match(1, 1, 1);
        play_turn(&mut game);
        assert!(game.is_game_over());

        let report = game.save_final_scores(&store).await;
        assert_eq!(report, SaveReport { saved: 0, failed: 1 });
        assert!(!game.can_restart());
        game.step(1_999);
        assert!(!game.can_restart());
        game.step(1);
        assert!(game.can_restart());
    }

    #[tokio::test]
    async fn failed_saves_are_reported_not_fatal() {
        let mut game = make_match(2, 2, 1);
        play_turn(&mut game);
        play_turn(&mut game);
        assert!(game.is_game_over());

        let report = game.save_final_scores(&OfflineTeamStore).await;
        assert_eq!(report, SaveReport { saved: 0, failed: 2 });
        assert!(!game.is_saving());

        let snapshot = game.build_snapshot(true);
        assert!(snapshot
            .events
            .contains(&MatchEvent::ScoresSaved { saved: 0, failed: 2 }));
    }

    #[test]
    fn outcome_reports_winner_or_tie() {
        let mut game = make_match(2, 2, 1);
        game.ready().expect("ready");
        game.correct().expect("correct");
        play_turn_after_ready(&mut game);
        play_turn(&mut game);
        assert_eq!(
            game.outcome(),
            Some(MatchOutcome::Winner {
                team_id: "team_0".to_string(),
                score: 1,
            })
        );

        let mut tied = make_match(2, 2, 1);
        play_turn(&mut tied);
        play_turn(&mut tied);
        assert_eq!(
            tied.outcome(),
            Some(MatchOutcome::Tie {
                team_ids: vec!["team_0".to_string(), "team_1".to_string()],
                score: 0,
            })
        );
    }

    #[test]
    fn snapshot_drains_events_when_requested() {
        let mut game = make_match(2, 6, 5);
        game.ready().expect("ready");
        game.skip().expect("skip");

        let peek = game.build_snapshot(false);
        assert!(peek.events.is_empty());

        let drained = game.build_snapshot(true);
        assert_eq!(drained.events.len(), 2);
        assert!(matches!(drained.events[0], MatchEvent::TurnStarted { .. }));
        assert!(game.build_snapshot(true).events.is_empty());
    }

    #[test]
    fn round_completed_is_emitted_after_last_team() {
        let mut game = make_match(2, 6, 1);
        play_turn(&mut game);
        play_turn(&mut game);
        let events = game.build_snapshot(true).events;
        assert!(events.contains(&MatchEvent::RoundCompleted { round: 1 }));
        assert_eq!(game.state().teams[0].current_player, 2);
    }
}
