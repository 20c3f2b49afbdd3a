//! In-process backend substitute for the integration tests. Speaks the same
//! JSON wire shapes as the real service and supports fault injection so the
//! client's error classification can be exercised.

use std::{
    collections::HashMap,
    sync::Arc,
    time::Duration,
};

use axum::{
    Json,
    Router,
    extract::{
        Path,
        State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{
        get,
        post,
    },
};
use serde_json::{
    Value,
    json,
};
use tokio::sync::Mutex;
use uuid::Uuid;

use fable_tui::types::{
    DiceRoll,
    GameMode,
    GameSession,
    NewPlayer,
    Player,
    RoleDefinition,
    Scenario,
    TurnOption,
    TurnRecord,
};

#[derive(Clone, Default)]
pub struct Faults {
    /// Drop the narration field from action responses.
    pub omit_narration: bool,
    /// Drop the options field from action responses.
    pub omit_options: bool,
    /// Respond to actions with this status and a structured detail body.
    pub action_status: Option<u16>,
    /// Respond to actions with a 200 whose body carries an error field.
    pub error_in_body: bool,
    /// Sleep before answering actions, to trip client deadlines.
    pub action_delay: Option<Duration>,
    /// Answer last-roll lookups with a 500.
    pub roll_unavailable: bool,
}

pub struct BackendState {
    pub scenarios: Vec<Scenario>,
    pub games: HashMap<String, GameSession>,
    pub last_rolls: HashMap<String, DiceRoll>,
    pub model_exists: bool,
    pub provision_calls: usize,
    pub faults: Faults,
}

pub type SharedState = Arc<Mutex<BackendState>>;

pub fn sample_scenario(id: &str) -> Scenario {
    let mut roles = HashMap::new();
    roles.insert(
        String::from("Hunter"),
        RoleDefinition {
            name: String::from("Hunter"),
            stats: HashMap::from([
                (String::from("force"), 18),
                (String::from("agility"), 12),
            ]),
            description: Some(String::from("Strong and direct")),
        },
    );
    Scenario {
        id: id.to_string(),
        name: String::from("The Lost Valley"),
        description: String::from("A valley where no expedition has returned from"),
        objectives: String::from("Find the way out"),
        mode: GameMode::PvE,
        max_players: 4,
        roles,
        context: String::from("Dense jungle, distant roars"),
    }
}

pub fn default_options() -> Vec<TurnOption> {
    vec![
        TurnOption {
            id: 1,
            description: String::from("Climb the ridge for a better view"),
            success_rate: 0.7,
            health_point_change: -0.1,
            mana_point_change: 0.0,
            related_stat: String::from("agility"),
        },
        TurnOption {
            id: 2,
            description: String::from("Force your way through the undergrowth"),
            success_rate: 0.3,
            health_point_change: -0.3,
            mana_point_change: 0.1,
            related_stat: String::from("force"),
        },
    ]
}

pub fn new_state() -> SharedState {
    Arc::new(Mutex::new(BackendState {
        scenarios: vec![sample_scenario("S1")],
        games: HashMap::new(),
        last_rolls: HashMap::new(),
        model_exists: true,
        provision_calls: 0,
        faults: Faults::default(),
    }))
}

/// Bind the substitute backend to an ephemeral port and serve it on a
/// background task. Returns the base URL to point the client at.
pub async fn launch(state: SharedState) -> String {
    let app = Router::new()
        .route("/scenarios", get(list_scenarios))
        .route("/games", post(create_game))
        .route("/games/{id}/join", post(join_game))
        .route("/games/{id}/action", post(submit_action))
        .route("/games/{id}/choose", post(choose_option))
        .route("/games/{id}/history", get(fetch_history))
        .route("/games/{id}/last_roll", get(fetch_last_roll))
        .route("/config/get_model", get(model_status))
        .route("/config/set_model", post(provision_model))
        .with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test backend");
    let addr = listener.local_addr().expect("test backend addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve test backend");
    });
    format!("http://{}", addr)
}

fn timestamp() -> String {
    chrono::Utc::now().naive_utc().format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

fn not_found() -> (StatusCode, Json<Value>) {
    (StatusCode::NOT_FOUND, Json(json!({"detail": "Not found"})))
}

async fn list_scenarios(State(state): State<SharedState>) -> impl IntoResponse {
    let state = state.lock().await;
    Json(state.scenarios.clone())
}

async fn create_game(
    State(state): State<SharedState>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let mut state = state.lock().await;
    let scenario_id = body
        .get("scenario_id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    if !state.scenarios.iter().any(|s| s.id == scenario_id) {
        return not_found().into_response();
    }
    let session = GameSession {
        id: Uuid::new_v4().to_string(),
        scenario_id,
        players: Vec::new(),
        turn: 0,
        history: Vec::new(),
        active: true,
    };
    state.games.insert(session.id.clone(), session.clone());
    Json(session).into_response()
}

async fn join_game(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(player): Json<NewPlayer>,
) -> impl IntoResponse {
    let mut state = state.lock().await;
    let Some(session) = state.games.get_mut(&id) else {
        return not_found().into_response();
    };
    session.players.push(Player {
        id: Uuid::new_v4().to_string(),
        player_id: player.player_id,
        display_name: player.display_name,
        role: player.role,
        stats: player.stats,
        hp: player.hp,
        mp: player.mp,
        position: None,
    });
    Json(session.clone()).into_response()
}

async fn submit_action(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let faults = state.lock().await.faults.clone();
    if let Some(delay) = faults.action_delay {
        tokio::time::sleep(delay).await;
    }
    if let Some(status) = faults.action_status {
        return (
            StatusCode::from_u16(status).unwrap(),
            Json(json!({"detail": "the game master is unavailable"})),
        )
            .into_response();
    }
    if faults.error_in_body {
        return Json(json!({"error": "the narration model returned garbage"}))
            .into_response();
    }
    let mut state = state.lock().await;
    let options = default_options();
    let narration = "A humid wind carries the smell of wet moss as you take stock.";
    let player_id = body
        .get("player_id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let action = body
        .get("action")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let Some(session) = state.games.get_mut(&id) else {
        return not_found().into_response();
    };
    session.history.push(TurnRecord {
        timestamp: timestamp(),
        actor: player_id.clone(),
        action,
        ai_narration: Some(narration.to_string()),
        options: Some(options.clone()),
        chosen_option: None,
    });
    state.last_rolls.insert(
        id,
        DiceRoll {
            player_id: Some(player_id),
            die: String::from("d20"),
            result: 14,
        },
    );
    let mut response = json!({});
    if !faults.omit_narration {
        response["narration"] = json!(narration);
    }
    if !faults.omit_options {
        response["options"] = json!(options);
    }
    Json(response).into_response()
}

async fn choose_option(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let mut state = state.lock().await;
    let option_id = body.get("option_id").and_then(Value::as_i64);
    let Some(session) = state.games.get_mut(&id) else {
        return not_found().into_response();
    };
    let Some(entry) = session.history.last_mut() else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"detail": "no pending turn"})),
        )
            .into_response();
    };
    entry.chosen_option = option_id;
    session.turn += 1;
    Json(session.clone()).into_response()
}

async fn fetch_history(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let state = state.lock().await;
    match state.games.get(&id) {
        Some(session) => Json(session.history.clone()).into_response(),
        None => not_found().into_response(),
    }
}

async fn fetch_last_roll(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let state = state.lock().await;
    if state.faults.roll_unavailable {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"detail": "dice service down"})),
        )
            .into_response();
    }
    match state.last_rolls.get(&id) {
        Some(roll) => Json(roll.clone()).into_response(),
        None => not_found().into_response(),
    }
}

async fn model_status(State(state): State<SharedState>) -> impl IntoResponse {
    let state = state.lock().await;
    Json(json!({"model_exists": state.model_exists}))
}

async fn provision_model(State(state): State<SharedState>) -> impl IntoResponse {
    let mut state = state.lock().await;
    state.model_exists = true;
    state.provision_calls += 1;
    Json(json!({"status": "created"}))
}
