use charades_rust_server::engine::{GameOrchestrator, MatchOptions, SaveReport};
use charades_rust_server::error::MatchError;
use charades_rust_server::game_data::BuiltinGameData;
use charades_rust_server::rng::Rng;
use charades_rust_server::server_utils::normalize_guess_rate;
use charades_rust_server::store::{JsonFileStore, TeamStore};
use charades_rust_server::types::{GameSettings, MatchOutcome, MatchPhase};
use clap::Parser;
use serde::Serialize;
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

const STEP_MS: u64 = 1_000;
const SKIP_EVERY_SECONDS: u32 = 5;

#[derive(Parser, Debug)]
#[command(author, version, about = "Plays a charades match headless")]
struct Cli {
    /// Team name; repeat once per team.
    #[arg(long = "team")]
    teams: Vec<String>,
    #[arg(long, default_value_t = 6)]
    total_players: u32,
    #[arg(long, default_value_t = 60)]
    timer_seconds: u32,
    /// Chance of a correct guess each second.
    #[arg(long, default_value_t = 0.5)]
    guess_rate: f32,
    #[arg(long)]
    seed: Option<u32>,
    #[arg(long)]
    summary_out: Option<PathBuf>,
}

#[derive(Clone, Debug)]
struct Scenario {
    team_names: Vec<String>,
    settings: GameSettings,
    guess_rate: f32,
    seed: u32,
}

#[derive(Clone, Debug, Serialize)]
struct TeamLine {
    id: String,
    name: String,
    score: u32,
}

#[derive(Clone, Debug, Serialize)]
struct AnomalyRecord {
    turn: u32,
    message: String,
}

#[derive(Clone, Debug, Serialize)]
struct RunSummary {
    #[serde(rename = "matchId")]
    match_id: String,
    seed: u32,
    #[serde(rename = "playersPerTeam")]
    players_per_team: u32,
    #[serde(rename = "timerSeconds")]
    timer_seconds: u32,
    #[serde(rename = "guessRate")]
    guess_rate: f32,
    teams: Vec<TeamLine>,
    outcome: Option<MatchOutcome>,
    turns: u32,
    #[serde(rename = "expectedTurns")]
    expected_turns: u32,
    #[serde(rename = "promptsDrawn")]
    prompts_drawn: u32,
    #[serde(rename = "correctGuesses")]
    correct_guesses: u32,
    skips: u32,
    #[serde(rename = "savedScores")]
    saved_scores: usize,
    #[serde(rename = "failedScores")]
    failed_scores: usize,
    anomalies: Vec<String>,
    #[serde(rename = "anomalyRecords")]
    anomaly_records: Vec<AnomalyRecord>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .json()
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let scenario = resolve_scenario(&cli);
    info!(
        seed = scenario.seed,
        teams = scenario.team_names.len(),
        total_players = scenario.settings.total_players,
        timer = scenario.settings.timer_duration,
        guess_rate = scenario.guess_rate,
        "simulation started"
    );

    let summary = match run_simulation(&scenario).await {
        Ok(summary) => summary,
        Err(err) => {
            error!(error = %err, "simulation could not start");
            std::process::exit(2);
        }
    };

    for anomaly in &summary.anomaly_records {
        warn!(turn = anomaly.turn, message = %anomaly.message, "anomaly detected");
    }

    match serde_json::to_string(&summary) {
        Ok(line) => println!("{line}"),
        Err(err) => {
            error!(error = %err, "summary serialization failed");
            std::process::exit(2);
        }
    }

    let mut summary_out_written: Option<String> = None;
    if let Some(path) = cli.summary_out.as_ref() {
        if let Err(err) = write_summary(path, &summary) {
            error!(path = %path.display(), error = %err, "summary write failed");
            std::process::exit(2);
        }
        summary_out_written = Some(path.to_string_lossy().to_string());
    }

    info!(
        match_id = %summary.match_id,
        turns = summary.turns,
        prompts = summary.prompts_drawn,
        anomalies = summary.anomalies.len(),
        summary_out = ?summary_out_written,
        "simulation finished"
    );

    if !summary.anomalies.is_empty() {
        std::process::exit(1);
    }
}

fn resolve_scenario(cli: &Cli) -> Scenario {
    let team_names = if cli.teams.is_empty() {
        vec!["Team A".to_string(), "Team B".to_string()]
    } else {
        cli.teams.clone()
    };
    Scenario {
        settings: GameSettings {
            total_players: cli.total_players,
            timer_duration: cli.timer_seconds,
            number_of_teams: team_names.len() as u32,
        },
        team_names,
        guess_rate: normalize_guess_rate(cli.guess_rate),
        seed: cli.seed.unwrap_or_else(rand::random::<u32>),
    }
}

async fn run_simulation(scenario: &Scenario) -> Result<RunSummary, MatchError> {
    let store = JsonFileStore::in_memory();
    let mut game = GameOrchestrator::start(
        &store,
        &BuiltinGameData,
        scenario.settings,
        &scenario.team_names,
        MatchOptions {
            seed: Some(scenario.seed),
        },
    )
    .await?;

    let team_count = game.state().teams.len();
    let expected_turns = game.players_per_team() * team_count as u32;
    let mut guesses = Rng::new(scenario.seed ^ 0x9e37_79b9);
    let mut anomalies = Vec::new();
    let mut anomaly_records = Vec::new();
    let mut anomaly_seen = HashSet::new();
    let mut turns = 0u32;
    let mut prompts_drawn = 0u32;
    let mut correct_guesses = 0u32;
    let mut skips = 0u32;

    while !game.is_game_over() {
        if turns > expected_turns {
            push_anomaly(
                &mut anomalies,
                &mut anomaly_records,
                &mut anomaly_seen,
                turns,
                "turn safety limit exceeded".to_string(),
            );
            break;
        }
        if !matches!(game.phase(), MatchPhase::Waiting { .. }) {
            push_anomaly(
                &mut anomalies,
                &mut anomaly_records,
                &mut anomaly_seen,
                turns,
                format!("turn boundary in unexpected phase {:?}", game.phase()),
            );
            break;
        }

        let round_before = game.state().current_round;
        game.ready()?;
        turns += 1;
        prompts_drawn += 1;

        let mut second = 0u32;
        loop {
            second += 1;
            if guesses.chance(scenario.guess_rate) {
                game.correct()?;
                correct_guesses += 1;
                prompts_drawn += 1;
            } else if second % SKIP_EVERY_SECONDS == 0 {
                game.skip()?;
                skips += 1;
                prompts_drawn += 1;
            }
            if game.step(STEP_MS).turn_ended {
                break;
            }
        }

        let state = game.state();
        if state.current_team_index >= team_count {
            push_anomaly(
                &mut anomalies,
                &mut anomaly_records,
                &mut anomaly_seen,
                turns,
                format!("team index out of range: {}", state.current_team_index),
            );
        }
        if state.current_round < round_before {
            push_anomaly(
                &mut anomalies,
                &mut anomaly_records,
                &mut anomaly_seen,
                turns,
                format!(
                    "round regressed from {round_before} to {}",
                    state.current_round
                ),
            );
        }
    }

    if turns != expected_turns {
        push_anomaly(
            &mut anomalies,
            &mut anomaly_records,
            &mut anomaly_seen,
            turns,
            format!("played {turns} turns, expected {expected_turns}"),
        );
    }

    let report = game.save_final_scores(&store).await;
    check_saved_scores(
        &store,
        &game,
        report,
        turns,
        &mut anomalies,
        &mut anomaly_records,
        &mut anomaly_seen,
    )
    .await;

    let teams = game
        .state()
        .teams
        .iter()
        .map(|team| TeamLine {
            id: team.id.clone(),
            name: team.name.clone(),
            score: team.score,
        })
        .collect();

    Ok(RunSummary {
        match_id: game.match_id().to_string(),
        seed: scenario.seed,
        players_per_team: game.players_per_team(),
        timer_seconds: scenario.settings.timer_duration,
        guess_rate: scenario.guess_rate,
        teams,
        outcome: game.outcome(),
        turns,
        expected_turns,
        prompts_drawn,
        correct_guesses,
        skips,
        saved_scores: report.saved,
        failed_scores: report.failed,
        anomalies,
        anomaly_records,
    })
}

async fn check_saved_scores(
    store: &JsonFileStore,
    game: &GameOrchestrator,
    report: SaveReport,
    turn: u32,
    anomalies: &mut Vec<String>,
    anomaly_records: &mut Vec<AnomalyRecord>,
    anomaly_seen: &mut HashSet<String>,
) {
    if report.failed > 0 {
        push_anomaly(
            anomalies,
            anomaly_records,
            anomaly_seen,
            turn,
            format!("{} final scores failed to save", report.failed),
        );
    }
    let stored = match store.list().await {
        Ok(stored) => stored,
        Err(err) => {
            push_anomaly(
                anomalies,
                anomaly_records,
                anomaly_seen,
                turn,
                format!("stored teams unreadable: {err}"),
            );
            return;
        }
    };
    for team in &game.state().teams {
        let persisted = stored.iter().find(|record| record.id == team.id);
        if persisted.map(|record| record.score) != Some(team.score) {
            push_anomaly(
                anomalies,
                anomaly_records,
                anomaly_seen,
                turn,
                format!("stored score mismatch for {}", team.id),
            );
        }
    }
}

fn push_anomaly(
    anomalies: &mut Vec<String>,
    anomaly_records: &mut Vec<AnomalyRecord>,
    anomaly_seen: &mut HashSet<String>,
    turn: u32,
    message: String,
) {
    anomaly_records.push(AnomalyRecord {
        turn,
        message: message.clone(),
    });
    if anomaly_seen.insert(message.clone()) {
        anomalies.push(message);
    }
}

fn write_summary(path: &Path, summary: &RunSummary) -> io::Result<()> {
    let summary_text = serde_json::to_string_pretty(summary).map_err(io::Error::other)?;
    std::fs::write(path, summary_text)
}
