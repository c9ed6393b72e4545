use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use charades_rust_server::config::ServerConfig;
use charades_rust_server::constants::TICK_MS;
use charades_rust_server::engine::{
    fallback_game_data, persist_final_scores, FinalScore, GameOrchestrator, MatchOptions,
};
use charades_rust_server::error::{MatchError, StoreError};
use charades_rust_server::game_data::{BuiltinGameData, FileGameDataStore, GameDataStore};
use charades_rust_server::server_protocol::{
    parse_client_message, parse_new_score, parse_settings_payload, parse_team_names, MatchAction,
    ParsedClientMessage,
};
use charades_rust_server::server_utils::is_admin;
use charades_rust_server::store::{JsonFileStore, SettingsStore, TeamStore};
use charades_rust_server::types::{GameData, GameSettings, MatchSnapshot, TeamRecord};
use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};
use tower_http::services::{ServeDir, ServeFile};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone)]
struct AppState {
    server: Arc<Mutex<ServerState>>,
    store: Arc<JsonFileStore>,
    game_data: Arc<dyn GameDataStore>,
    admin_token: Arc<str>,
    match_seed: Option<u32>,
}

impl AppState {
    fn new(
        store: JsonFileStore,
        game_data: Arc<dyn GameDataStore>,
        admin_token: &str,
        match_seed: Option<u32>,
    ) -> Self {
        Self {
            server: Arc::new(Mutex::new(ServerState::default())),
            store: Arc::new(store),
            game_data,
            admin_token: Arc::from(admin_token),
            match_seed,
        }
    }
}

#[derive(Clone)]
struct ClientContext {
    tx: mpsc::Sender<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum QueuePolicy {
    DropOnFull,
    DisconnectOnFull,
}

#[derive(Default)]
struct ServerState {
    clients: HashMap<String, ClientContext>,
    game: Option<GameOrchestrator>,
}

#[derive(Debug, thiserror::Error)]
enum ApiError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Match(#[from] MatchError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Store(error) => store_status(error),
            ApiError::Match(MatchError::InvalidTeams(_)) => StatusCode::BAD_REQUEST,
            ApiError::Match(MatchError::InvalidPhase { .. })
            | ApiError::Match(MatchError::RestartLocked) => StatusCode::CONFLICT,
            ApiError::Match(MatchError::Store(error)) => store_status(error),
        }
    }
}

fn store_status(error: &StoreError) -> StatusCode {
    match error {
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::Validation(_) => StatusCode::BAD_REQUEST,
        StoreError::Unavailable(_) | StoreError::Serialization(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::parse();
    if config.uses_default_admin_token() {
        warn!("ADMIN_TOKEN not set, settings updates accept the default token");
    }

    let game_data: Arc<dyn GameDataStore> = match config.game_data_path.clone() {
        Some(path) => {
            info!(path = %path.display(), "loading game data from file");
            Arc::new(FileGameDataStore::new(path))
        }
        None => Arc::new(BuiltinGameData),
    };
    info!(path = %config.data_path.display(), "opening store");
    let app_state = AppState::new(
        JsonFileStore::open(config.data_path.clone()),
        game_data,
        &config.admin_token,
        config.match_seed,
    );
    start_tick_loop(app_state.clone());

    let app = build_router(app_state);
    let app = if let Some(static_dir) = config.resolve_static_dir() {
        let index_file = static_dir.join("index.html");
        info!(path = %static_dir.display(), "serving static files");
        app.fallback_service(
            ServeDir::new(static_dir).not_found_service(ServeFile::new(index_file)),
        )
    } else {
        warn!("static file root not found, serving the API only");
        app
    };

    let bind_addr = format!("0.0.0.0:{}", config.port);
    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(addr = %bind_addr, error = %err, "failed to bind server socket");
            std::process::exit(1);
        }
    };

    info!(port = config.port, "listening");
    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = %err, "server runtime failed");
        std::process::exit(1);
    }
    info!("server stopped");
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route(
            "/api/game-settings",
            get(get_settings_handler).put(put_settings_handler),
        )
        .route("/api/game-data", get(game_data_handler))
        .route("/api/teams", get(list_teams_handler).post(create_team_handler))
        .route("/api/teams/{id}", delete(delete_team_handler))
        .route("/api/teams/{id}/score", put(update_score_handler))
        .route(
            "/api/match",
            get(get_match_handler).post(start_match_handler),
        )
        .route("/api/match/{action}", post(match_action_handler))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

async fn get_settings_handler(State(app): State<AppState>) -> Result<Json<GameSettings>, ApiError> {
    Ok(Json(app.store.get().await?))
}

async fn put_settings_handler(
    State(app): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let authorization = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    if !is_admin(authorization, &app.admin_token) {
        return Err(ApiError::Unauthorized);
    }
    let settings = parse_settings_payload(&body)?;
    app.store.set(settings).await?;
    info!(
        total_players = settings.total_players,
        timer = settings.timer_duration,
        teams = settings.number_of_teams,
        "game settings updated"
    );
    Ok(Json(json!({ "success": true })))
}

async fn game_data_handler(State(app): State<AppState>) -> Json<GameData> {
    match app.game_data.fetch().await {
        Ok(data) if data.is_usable() => Json(data),
        Ok(_) => Json(fallback_game_data()),
        Err(err) => {
            warn!(error = %err, "failed to fetch game data, serving fallback");
            Json(fallback_game_data())
        }
    }
}

async fn list_teams_handler(State(app): State<AppState>) -> Result<Json<Vec<TeamRecord>>, ApiError> {
    Ok(Json(app.store.list().await?))
}

async fn create_team_handler(
    State(app): State<AppState>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<TeamRecord>), ApiError> {
    let name = body
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let record = app.store.create(name).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn update_score_handler(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<TeamRecord>, ApiError> {
    let new_score = parse_new_score(&body).ok_or_else(|| {
        ApiError::BadRequest("newScore must be a non-negative integer".to_string())
    })?;
    Ok(Json(app.store.update_score(&id, new_score).await?))
}

async fn delete_team_handler(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    app.store.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn start_match_handler(
    State(app): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<MatchSnapshot>, ApiError> {
    let team_names = parse_team_names(&body)
        .ok_or_else(|| ApiError::BadRequest("teamNames must be a list of names".to_string()))?;

    {
        let guard = app.server.lock().await;
        ensure_match_replaceable(&guard)?;
    }

    let settings = app.store.get().await?;
    let game = GameOrchestrator::start(
        app.store.as_ref(),
        app.game_data.as_ref(),
        settings,
        &team_names,
        MatchOptions {
            seed: app.match_seed,
        },
    )
    .await?;
    Ok(Json(install_match(&app, game).await?))
}

/// Swaps `game` in as the current match. The running match is re-checked
/// under the lock; a loser of a concurrent start drops the teams it created.
async fn install_match(app: &AppState, game: GameOrchestrator) -> Result<MatchSnapshot, ApiError> {
    let mut guard = app.server.lock().await;
    if let Err(err) = ensure_match_replaceable(&guard) {
        drop(guard);
        discard_match_teams(app, &game).await;
        return Err(err);
    }
    let game = guard.game.insert(game);
    let snapshot = game.build_snapshot(false);
    broadcast_state(&mut guard);
    Ok(snapshot)
}

fn ensure_match_replaceable(state: &ServerState) -> Result<(), ApiError> {
    match state.game.as_ref() {
        Some(game) if !game.can_restart() => {
            Err(ApiError::Conflict("a match is already running".to_string()))
        }
        _ => Ok(()),
    }
}

async fn discard_match_teams(app: &AppState, game: &GameOrchestrator) {
    for team in &game.state().teams {
        if let Err(err) = app.store.delete(&team.id).await {
            warn!(team_id = %team.id, error = %err, "failed to discard team of a superseded match");
        }
    }
}

async fn get_match_handler(State(app): State<AppState>) -> Result<Json<MatchSnapshot>, ApiError> {
    let mut guard = app.server.lock().await;
    guard
        .game
        .as_mut()
        .map(|game| Json(game.build_snapshot(false)))
        .ok_or_else(|| ApiError::NotFound("no match".to_string()))
}

async fn match_action_handler(
    State(app): State<AppState>,
    Path(action): Path<String>,
) -> Result<Json<MatchSnapshot>, ApiError> {
    let action = MatchAction::parse(&action)
        .ok_or_else(|| ApiError::NotFound(format!("unknown match action '{action}'")))?;
    let mut guard = app.server.lock().await;
    apply_match_action(&mut guard, action)?;
    broadcast_state(&mut guard);
    guard
        .game
        .as_mut()
        .map(|game| Json(game.build_snapshot(false)))
        .ok_or_else(|| ApiError::NotFound("no match".to_string()))
}

fn apply_match_action(state: &mut ServerState, action: MatchAction) -> Result<(), ApiError> {
    let game = state
        .game
        .as_mut()
        .ok_or_else(|| ApiError::NotFound("no match".to_string()))?;
    match action {
        MatchAction::Ready => game.ready()?,
        MatchAction::Correct => game.correct()?,
        MatchAction::Skip => game.skip()?,
        MatchAction::Restart => game.restart()?,
    }
    Ok(())
}

async fn ws_handler(ws: WebSocketUpgrade, State(app): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(app, socket))
}

async fn handle_socket(app: AppState, socket: WebSocket) {
    let client_id = make_id("client");
    let (tx, mut rx) = mpsc::channel::<String>(256);

    {
        let mut guard = app.server.lock().await;
        guard
            .clients
            .insert(client_id.clone(), ClientContext { tx });
        let initial = match guard.game.as_mut() {
            Some(game) => json!({
                "type": "state",
                "snapshot": game.build_snapshot(false),
            }),
            None => json!({ "type": "idle" }),
        };
        send_to_client(&mut guard, &client_id, &initial, QueuePolicy::DisconnectOnFull);
    }

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let writer = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if ws_sender.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(received) = ws_receiver.next().await {
        let Ok(message) = received else {
            break;
        };

        match message {
            Message::Text(raw) => {
                handle_client_message(&app, &client_id, raw.as_str()).await;
            }
            Message::Binary(raw) => match std::str::from_utf8(&raw) {
                Ok(text) => handle_client_message(&app, &client_id, text).await,
                Err(_) => send_error_to_client(&app, &client_id, "invalid utf8 message").await,
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    {
        let mut guard = app.server.lock().await;
        guard.clients.remove(&client_id);
    }
    let _ = writer.await;
}

async fn handle_client_message(app: &AppState, client_id: &str, raw: &str) {
    let Some(message) = parse_client_message(raw) else {
        send_error_to_client(app, client_id, "invalid message").await;
        return;
    };

    let mut guard = app.server.lock().await;
    match message {
        ParsedClientMessage::Ping { t } => {
            send_to_client(
                &mut guard,
                client_id,
                &json!({
                    "type": "pong",
                    "t": t,
                }),
                QueuePolicy::DisconnectOnFull,
            );
        }
        ParsedClientMessage::Action(action) => match apply_match_action(&mut guard, action) {
            Ok(()) => broadcast_state(&mut guard),
            Err(err) => send_to_client(
                &mut guard,
                client_id,
                &json!({
                    "type": "error",
                    "message": err.to_string(),
                }),
                QueuePolicy::DisconnectOnFull,
            ),
        },
    }
}

fn start_tick_loop(app: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(TICK_MS));
        loop {
            interval.tick().await;
            let mut guard = app.server.lock().await;
            tick_game(&app, &mut guard);
        }
    });
}

fn tick_game(app: &AppState, state: &mut ServerState) {
    let finished = {
        let Some(game) = state.game.as_mut() else {
            return;
        };
        let outcome = game.step(TICK_MS);
        if outcome.game_over {
            Some((game.match_id().to_string(), game.final_scores()))
        } else {
            None
        }
    };

    if let Some((match_id, scores)) = finished {
        spawn_final_save(app.clone(), match_id, scores);
    }
    broadcast_state(state);
}

fn spawn_final_save(app: AppState, match_id: String, scores: Vec<FinalScore>) {
    tokio::spawn(async move {
        let report = persist_final_scores(app.store.as_ref(), &scores).await;
        info!(
            match_id = %match_id,
            saved = report.saved,
            failed = report.failed,
            "final scores persisted"
        );
        let mut guard = app.server.lock().await;
        let applied = match guard.game.as_mut() {
            Some(game) if game.match_id() == match_id => {
                game.finish_final_save(report);
                true
            }
            _ => false,
        };
        if applied {
            broadcast_state(&mut guard);
        } else {
            warn!(match_id = %match_id, "final save finished after the match was replaced");
        }
    });
}

fn broadcast_state(state: &mut ServerState) {
    let Some(game) = state.game.as_mut() else {
        return;
    };
    let snapshot = game.build_snapshot(true);
    let policy = if snapshot.events.is_empty() {
        QueuePolicy::DropOnFull
    } else {
        QueuePolicy::DisconnectOnFull
    };
    broadcast(
        state,
        &json!({
            "type": "state",
            "snapshot": snapshot,
        }),
        policy,
    );
}

fn send_to_client(state: &mut ServerState, client_id: &str, message: &Value, policy: QueuePolicy) {
    let send_failed = if let Some(client) = state.clients.get(client_id) {
        client
            .tx
            .try_send(message.to_string())
            .is_err()
    } else {
        false
    };
    if send_failed && policy == QueuePolicy::DisconnectOnFull {
        drop_client(state, client_id);
    }
}

fn broadcast(state: &mut ServerState, message: &Value, policy: QueuePolicy) {
    let payload = message.to_string();
    let mut failed_clients = Vec::new();
    for (client_id, client) in &state.clients {
        if client
            .tx
            .try_send(payload.clone())
            .is_err()
            && policy == QueuePolicy::DisconnectOnFull
        {
            failed_clients.push(client_id.clone());
        }
    }
    for client_id in failed_clients {
        drop_client(state, &client_id);
    }
}

fn drop_client(state: &mut ServerState, client_id: &str) {
    if state.clients.remove(client_id).is_some() {
        warn!(client_id, "dropping client with a full or closed queue");
    }
}

async fn send_error_to_client(app: &AppState, client_id: &str, message: &str) {
    let mut guard = app.server.lock().await;
    send_to_client(
        &mut guard,
        client_id,
        &json!({
            "type": "error",
            "message": message,
        }),
        QueuePolicy::DisconnectOnFull,
    );
}

fn make_id(prefix: &str) -> String {
    let seq = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}_{seq}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use charades_rust_server::types::MatchPhase;

    fn test_state() -> AppState {
        AppState::new(
            JsonFileStore::in_memory(),
            Arc::new(BuiltinGameData),
            "s3cret",
            Some(7),
        )
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            format!("Bearer {token}").parse().expect("valid header"),
        );
        headers
    }

    #[tokio::test]
    async fn settings_default_when_nothing_stored() {
        let app = test_state();
        let Json(settings) = get_settings_handler(State(app))
            .await
            .expect("settings load");
        assert_eq!(
            settings,
            GameSettings {
                total_players: 6,
                timer_duration: 60,
                number_of_teams: 2,
            }
        );
    }

    #[tokio::test]
    async fn settings_update_requires_admin_token() {
        let app = test_state();
        let body = json!({"totalPlayers": 8, "timerDuration": 30, "numberOfTeams": 2});

        let denied =
            put_settings_handler(State(app.clone()), bearer("wrong"), Json(body.clone())).await;
        assert!(matches!(denied, Err(ApiError::Unauthorized)));

        put_settings_handler(State(app.clone()), bearer("s3cret"), Json(body))
            .await
            .expect("admin update");
        let Json(settings) = get_settings_handler(State(app)).await.expect("settings");
        assert_eq!(settings.total_players, 8);
        assert_eq!(settings.timer_duration, 30);
    }

    #[tokio::test]
    async fn invalid_settings_payload_is_bad_request() {
        let app = test_state();
        let result = put_settings_handler(
            State(app.clone()),
            bearer("s3cret"),
            Json(json!({"totalPlayers": "eight", "timerDuration": 30, "numberOfTeams": 2})),
        )
        .await;
        let err = result.expect_err("payload must be rejected");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let Json(settings) = get_settings_handler(State(app)).await.expect("settings");
        assert_eq!(settings.total_players, 6);
    }

    #[tokio::test]
    async fn team_crud_round_trip() {
        let app = test_state();
        let (status, Json(created)) =
            create_team_handler(State(app.clone()), Json(json!({"name": "Rouge"})))
                .await
                .expect("create team");
        assert_eq!(status, StatusCode::CREATED);

        let Json(updated) = update_score_handler(
            State(app.clone()),
            Path(created.id.clone()),
            Json(json!({"newScore": 5})),
        )
        .await
        .expect("update score");
        assert_eq!(updated.score, 5);

        let status = delete_team_handler(State(app.clone()), Path(created.id.clone()))
            .await
            .expect("delete team");
        assert_eq!(status, StatusCode::NO_CONTENT);

        let missing = delete_team_handler(State(app.clone()), Path(created.id)).await;
        assert_eq!(
            missing.expect_err("second delete").status(),
            StatusCode::NOT_FOUND
        );
        let Json(teams) = list_teams_handler(State(app)).await.expect("list");
        assert!(teams.is_empty());
    }

    #[tokio::test]
    async fn empty_team_name_is_rejected() {
        let app = test_state();
        let result = create_team_handler(State(app.clone()), Json(json!({"name": " "}))).await;
        assert_eq!(
            result.expect_err("empty name").status(),
            StatusCode::BAD_REQUEST
        );
        let missing = create_team_handler(State(app.clone()), Json(json!({}))).await;
        assert_eq!(
            missing.expect_err("missing name").status(),
            StatusCode::BAD_REQUEST
        );
        let Json(teams) = list_teams_handler(State(app)).await.expect("list");
        assert!(teams.is_empty());
    }

    #[tokio::test]
    async fn bad_score_payload_is_rejected() {
        let app = test_state();
        let result = update_score_handler(
            State(app),
            Path("any".to_string()),
            Json(json!({"newScore": "ten"})),
        )
        .await;
        assert_eq!(
            result.expect_err("bad score").status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[tokio::test]
    async fn match_lifecycle_through_handlers() {
        let app = test_state();
        let missing = get_match_handler(State(app.clone())).await;
        assert_eq!(
            missing.expect_err("no match yet").status(),
            StatusCode::NOT_FOUND
        );

        let Json(snapshot) = start_match_handler(
            State(app.clone()),
            Json(json!({"teamNames": ["Rouge", "Bleu"]})),
        )
        .await
        .expect("start match");
        assert_eq!(snapshot.phase, MatchPhase::Waiting { team_index: 0 });

        let again = start_match_handler(
            State(app.clone()),
            Json(json!({"teamNames": ["Vert", "Jaune"]})),
        )
        .await;
        assert_eq!(
            again.expect_err("match running").status(),
            StatusCode::CONFLICT
        );

        let Json(active) = match_action_handler(State(app.clone()), Path("ready".to_string()))
            .await
            .expect("ready");
        assert_eq!(active.phase, MatchPhase::Active);
        assert!(active.prompt.is_some());

        let Json(scored) = match_action_handler(State(app.clone()), Path("correct".to_string()))
            .await
            .expect("correct");
        assert_eq!(scored.teams[0].score, 1);

        let locked = match_action_handler(State(app.clone()), Path("restart".to_string())).await;
        assert_eq!(
            locked.expect_err("restart locked").status(),
            StatusCode::CONFLICT
        );

        let unknown = match_action_handler(State(app), Path("dance".to_string())).await;
        assert_eq!(
            unknown.expect_err("unknown action").status(),
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn losing_concurrent_start_discards_its_teams() {
        let app = test_state();
        start_match_handler(
            State(app.clone()),
            Json(json!({"teamNames": ["Rouge", "Bleu"]})),
        )
        .await
        .expect("first match starts");

        let late = GameOrchestrator::start(
            app.store.as_ref(),
            app.game_data.as_ref(),
            GameSettings::default(),
            &["Vert".to_string(), "Jaune".to_string()],
            MatchOptions { seed: Some(1) },
        )
        .await
        .expect("second match builds");
        assert_eq!(app.store.list().await.expect("list").len(), 4);

        let result = install_match(&app, late).await;
        assert_eq!(
            result.expect_err("running match wins").status(),
            StatusCode::CONFLICT
        );
        let names: Vec<String> = app
            .store
            .list()
            .await
            .expect("list")
            .into_iter()
            .map(|team| team.name)
            .collect();
        assert_eq!(names.len(), 2);
        assert!(names.iter().all(|name| name == "Rouge" || name == "Bleu"));

        let guard = app.server.lock().await;
        let current = guard.game.as_ref().expect("match kept");
        assert_eq!(current.state().teams[0].name, "Rouge");
    }

    #[tokio::test]
    async fn start_match_validates_team_names() {
        let app = test_state();
        let result =
            start_match_handler(State(app.clone()), Json(json!({"teamNames": ["Solo"]}))).await;
        assert_eq!(
            result.expect_err("wrong team count").status(),
            StatusCode::BAD_REQUEST
        );
        let result = start_match_handler(State(app), Json(json!({"names": []}))).await;
        assert_eq!(
            result.expect_err("missing names").status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[tokio::test]
    async fn tick_drives_expiry_and_final_save() {
        let app = test_state();
        app.store
            .set(GameSettings {
                total_players: 1,
                timer_duration: 1,
                number_of_teams: 1,
            })
            .await
            .expect("settings");
        start_match_handler(State(app.clone()), Json(json!({"teamNames": ["Solo"]})))
            .await
            .expect("start match");
        match_action_handler(State(app.clone()), Path("ready".to_string()))
            .await
            .expect("ready");
        match_action_handler(State(app.clone()), Path("correct".to_string()))
            .await
            .expect("correct");

        {
            let mut guard = app.server.lock().await;
            for _ in 0..(1_000 / TICK_MS) {
                tick_game(&app, &mut guard);
            }
            let game = guard.game.as_ref().expect("match exists");
            assert!(game.is_game_over());
        }

        let mut saved = false;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let guard = app.server.lock().await;
            if guard.game.as_ref().map(|game| !game.is_saving()).unwrap_or(false) {
                saved = true;
                break;
            }
        }
        assert!(saved, "final save should complete");

        let teams = app.store.list().await.expect("list");
        assert_eq!(teams.len(), 1);
        assert_eq!(teams[0].score, 1);
    }

    #[test]
    fn api_error_status_mapping() {
        assert_eq!(
            ApiError::from(StoreError::Unavailable("x".to_string())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::from(MatchError::RestartLocked).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(MatchError::Store(StoreError::NotFound("t".to_string()))).status(),
            StatusCode::NOT_FOUND
        );
    }
}
