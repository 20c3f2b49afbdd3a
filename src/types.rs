use std::collections::HashMap;

use serde::{
    Deserialize,
    Serialize,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum GameMode {
    #[serde(rename = "PvE")]
    PvE,
    #[serde(rename = "PvP")]
    PvP,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoleDefinition {
    pub name: String,
    pub stats: HashMap<String, i64>,
    #[serde(default)]
    pub description: Option<String>,
}

/// A story template as published by the backend catalog. Immutable for the
/// whole session once fetched.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub objectives: String,
    pub mode: GameMode,
    pub max_players: u32,
    pub roles: HashMap<String, RoleDefinition>,
    #[serde(default)]
    pub context: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Player {
    #[serde(default)]
    pub id: String,
    pub player_id: String,
    pub display_name: String,
    pub role: String,
    pub stats: HashMap<String, i64>,
    pub hp: f64,
    pub mp: f64,
    #[serde(default)]
    pub position: Option<String>,
}

/// Join payload: a player record without the server-assigned `id`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewPlayer {
    pub player_id: String,
    pub display_name: String,
    pub role: String,
    pub stats: HashMap<String, i64>,
    pub hp: f64,
    pub mp: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub timestamp: String,
    pub actor: String,
    pub action: String,
    #[serde(default)]
    pub ai_narration: Option<String>,
    #[serde(default)]
    pub options: Option<Vec<TurnOption>>,
    #[serde(default)]
    pub chosen_option: Option<i64>,
}

/// One running playthrough. The turn counter and history are owned by the
/// server; the client only ever replaces this snapshot wholesale.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameSession {
    pub id: String,
    pub scenario_id: String,
    #[serde(default)]
    pub players: Vec<Player>,
    #[serde(default)]
    pub turn: u64,
    #[serde(default)]
    pub history: Vec<TurnRecord>,
    #[serde(default)]
    pub active: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TurnOption {
    pub id: i64,
    pub description: String,
    pub success_rate: f64,
    pub health_point_change: f64,
    pub mana_point_change: f64,
    pub related_stat: String,
}

/// Narration plus the not-yet-resolved option set for the current turn.
/// Exists only between an action request and the player's choice.
#[derive(Clone, Debug, PartialEq)]
pub struct AiTurn {
    pub narration: String,
    pub options: Vec<TurnOption>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiceRoll {
    #[serde(default)]
    pub player_id: Option<String>,
    pub die: String,
    pub result: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelStatus {
    pub model_exists: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProvisionStatus {
    pub status: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateGameRequest {
    pub scenario_id: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActionRequest {
    pub player_id: String,
    pub action: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChooseRequest {
    pub player_id: String,
    pub option_id: i64,
}
