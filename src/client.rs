use std::time::Duration;

use color_eyre::eyre::Result;
use tracing::{
    error,
    info,
    warn,
};

use crate::{
    backend_client::{
        BackendClient,
        BackendError,
    },
    types::{
        AiTurn,
        DiceRoll,
        GameSession,
        NewPlayer,
        Player,
        Scenario,
        TurnOption,
        TurnRecord,
    },
    ui,
};

pub const DEFAULT_SERVER_URL: &str = "http://localhost:8000";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_PLAYER_ID: &str = "player-1";
pub const DEFAULT_DISPLAY_NAME: &str = "Explorer";

const DEFAULT_FIRST_ACTION: &str =
    "Look around carefully to assess the situation and spot anything useful.";
const CONTINUATION_PREFIX: &str = "[Continuing the previous action]";
const DEFAULT_HP: f64 = 100.0;
const DEFAULT_MP: f64 = 50.0;
const ERROR_HISTORY_DEPTH: usize = 50;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_url: String,
    pub player_id: String,
    pub display_name: String,
    pub role: Option<String>,
    pub request_timeout: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            server_url: String::from(DEFAULT_SERVER_URL),
            player_id: String::from(DEFAULT_PLAYER_ID),
            display_name: String::from(DEFAULT_DISPLAY_NAME),
            role: None,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

/// View-state machine phases. Network transitions pass through a
/// `Submitting*` phase and land on an awaiting phase, or on `Failed`, from
/// which a user-triggered retry re-runs the whole failed transition.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Phase {
    Uninitialized,
    Initializing,
    ScenarioSelect,
    StartingSession,
    AwaitingAction,
    SubmittingAction,
    AwaitingChoice,
    SubmittingChoice,
    Failed,
}

#[derive(Clone, Debug)]
enum RetryAction {
    Initialize,
    StartSession { scenario_index: usize },
    SubmitAction { action: String },
    ChooseOption { option_id: i64 },
    LoadHistory,
}

/// Immutable view of the controller state, rebuilt for every draw.
#[derive(Clone, Debug)]
pub struct AppSnapshot {
    pub phase: Phase,
    pub scenarios: Vec<Scenario>,
    pub selected_scenario: usize,
    pub session: Option<GameSession>,
    pub player: Option<Player>,
    pub pending_turn: Option<AiTurn>,
    pub selected_option: usize,
    pub chosen_option: Option<TurnOption>,
    pub last_roll: Option<DiceRoll>,
    pub action_draft: String,
    pub history_view: Option<Vec<TurnRecord>>,
    pub status: String,
    pub errors: Vec<String>,
    pub loading: bool,
}

pub struct AppController {
    client: BackendClient,
    config: AppConfig,
    phase: Phase,
    resume_phase: Phase,
    scenarios: Vec<Scenario>,
    selected_scenario: usize,
    session: Option<GameSession>,
    pending_turn: Option<AiTurn>,
    selected_option: usize,
    chosen_option: Option<TurnOption>,
    last_roll: Option<DiceRoll>,
    action_draft: String,
    history_view: Option<Vec<TurnRecord>>,
    status: String,
    errors: Vec<String>,
    loading: bool,
    retry: Option<RetryAction>,
}

impl AppController {
    pub fn new(config: AppConfig) -> Result<Self, BackendError> {
        let client = BackendClient::new(&config.server_url, config.request_timeout)?;
        Ok(Self {
            client,
            config,
            phase: Phase::Uninitialized,
            resume_phase: Phase::Uninitialized,
            scenarios: Vec::new(),
            selected_scenario: 0,
            session: None,
            pending_turn: None,
            selected_option: 0,
            chosen_option: None,
            last_roll: None,
            action_draft: String::from(DEFAULT_FIRST_ACTION),
            history_view: None,
            status: String::from("Ready"),
            errors: Vec::new(),
            loading: false,
            retry: None,
        })
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn session(&self) -> Option<&GameSession> {
        self.session.as_ref()
    }

    pub fn pending_turn(&self) -> Option<&AiTurn> {
        self.pending_turn.as_ref()
    }

    pub fn snapshot(&self) -> AppSnapshot {
        let player = self.session.as_ref().and_then(|session| {
            session
                .players
                .iter()
                .find(|p| p.player_id == self.config.player_id)
                .cloned()
        });
        AppSnapshot {
            phase: self.phase.clone(),
            scenarios: self.scenarios.clone(),
            selected_scenario: self.selected_scenario,
            session: self.session.clone(),
            player,
            pending_turn: self.pending_turn.clone(),
            selected_option: self.selected_option,
            chosen_option: self.chosen_option.clone(),
            last_roll: self.last_roll.clone(),
            action_draft: self.action_draft.clone(),
            history_view: self.history_view.clone(),
            status: self.status.clone(),
            errors: self.errors.iter().rev().take(5).cloned().collect(),
            loading: self.loading,
        }
    }

    /// Verify the narration model is available (provisioning it when absent),
    /// then load the scenario catalog. A failure at any sub-step halts at
    /// `Failed` without surfacing partial state.
    pub async fn initialize(&mut self) {
        if !self.begin("Checking the narration model...") {
            return;
        }
        let prev = self.phase.clone();
        self.phase = Phase::Initializing;
        let result = self.initialize_inner().await;
        self.loading = false;
        match result {
            Ok(()) => {
                self.phase = Phase::ScenarioSelect;
                self.retry = None;
                let count = self.scenarios.len();
                self.set_status(format!(
                    "Connected to {} | {} scenario(s) available",
                    self.client, count
                ));
            }
            Err(e) => self.fail("initialization", e, RetryAction::Initialize, prev),
        }
    }

    async fn initialize_inner(&mut self) -> Result<(), BackendError> {
        let status = self.client.model_status().await?;
        if !status.model_exists {
            let provisioned = self.client.provision_model().await?;
            info!(status = %provisioned.status, "narration model provisioned");
        }
        self.scenarios = self.client.list_scenarios().await?;
        Ok(())
    }

    /// Create a game for the selected scenario, join it, and submit a default
    /// first action. Strictly sequential, each call consuming identifiers the
    /// previous one returned; a failure at call N aborts the rest and leaves
    /// already-completed server-side effects in place.
    pub async fn start_session(&mut self) {
        let Some(scenario) = self.scenarios.get(self.selected_scenario).cloned() else {
            self.push_errors(vec![String::from("no scenario selected")]);
            return;
        };
        if !self.begin(format!("Starting '{}'...", scenario.name)) {
            return;
        }
        let prev = self.phase.clone();
        self.phase = Phase::StartingSession;
        let scenario_index = self.selected_scenario;
        let result = self.start_session_inner(&scenario).await;
        self.loading = false;
        match result {
            Ok(()) => {
                self.phase = Phase::AwaitingChoice;
                self.retry = None;
                self.set_status(format!("'{}' has begun", scenario.name));
            }
            Err(e) => self.fail(
                "starting the session",
                e,
                RetryAction::StartSession { scenario_index },
                prev,
            ),
        }
    }

    async fn start_session_inner(
        &mut self,
        scenario: &Scenario,
    ) -> Result<(), BackendError> {
        let session = self.client.create_game(&scenario.id).await?;
        let player = self.build_player(scenario);
        let session = self.client.join_game(&session.id, &player).await?;
        let game_id = session.id.clone();
        self.session = Some(session);
        self.action_draft = String::from(DEFAULT_FIRST_ACTION);
        self.request_turn(&game_id, DEFAULT_FIRST_ACTION).await
    }

    /// Send the current free-text draft for the tracked player and store the
    /// returned narration and options as the pending turn.
    pub async fn submit_action(&mut self) {
        let Some(game_id) = self.session.as_ref().map(|s| s.id.clone()) else {
            self.push_errors(vec![String::from("no session to act in")]);
            return;
        };
        let action = self.action_draft.clone();
        if !self.begin("Sending the action to the game master...") {
            return;
        }
        let prev = self.phase.clone();
        self.phase = Phase::SubmittingAction;
        let result = self.request_turn(&game_id, &action).await;
        self.loading = false;
        match result {
            Ok(()) => {
                self.phase = Phase::AwaitingChoice;
                self.retry = None;
                self.set_status("The game master has responded");
            }
            Err(e) => self.fail(
                "sending the action",
                e,
                RetryAction::SubmitAction { action },
                prev,
            ),
        }
    }

    async fn request_turn(
        &mut self,
        game_id: &str,
        action: &str,
    ) -> Result<(), BackendError> {
        let turn = self
            .client
            .submit_action(game_id, &self.config.player_id, action)
            .await?;
        self.pending_turn = Some(turn);
        self.chosen_option = None;
        self.selected_option = 0;
        self.refresh_last_roll(game_id).await;
        Ok(())
    }

    /// The roll display is decorative; a failed lookup keeps the previous
    /// value rather than failing the transition that triggered it.
    async fn refresh_last_roll(&mut self, game_id: &str) {
        match self.client.fetch_last_roll(game_id).await {
            Ok(roll) => self.last_roll = roll,
            Err(e) => warn!(error = %e, "could not refresh the last roll"),
        }
    }

    pub async fn choose_selected_option(&mut self) {
        let Some(option) = self
            .pending_turn
            .as_ref()
            .and_then(|turn| turn.options.get(self.selected_option))
            .cloned()
        else {
            self.push_errors(vec![String::from("no option selected")]);
            return;
        };
        self.choose_option(option).await;
    }

    /// Resolve the pending turn with the chosen option. The server returns a
    /// full session snapshot which replaces ours wholesale; the pending turn
    /// is cleared and the next action draft is derived from the latest
    /// history entry.
    pub async fn choose_option(&mut self, option: TurnOption) {
        let Some(game_id) = self.session.as_ref().map(|s| s.id.clone()) else {
            self.push_errors(vec![String::from("no session to act in")]);
            return;
        };
        if !self.begin(format!("Resolving '{}'...", option.description)) {
            return;
        }
        let prev = self.phase.clone();
        self.phase = Phase::SubmittingChoice;
        let result = self.resolve_choice(&game_id, option.id).await;
        self.loading = false;
        match result {
            Ok(()) => {
                self.chosen_option = Some(option);
                self.phase = Phase::AwaitingAction;
                self.retry = None;
                self.set_status("Turn resolved");
            }
            Err(e) => self.fail(
                "choosing the option",
                e,
                RetryAction::ChooseOption { option_id: option.id },
                prev,
            ),
        }
    }

    async fn resolve_choice(
        &mut self,
        game_id: &str,
        option_id: i64,
    ) -> Result<(), BackendError> {
        let session = self
            .client
            .choose_option(game_id, &self.config.player_id, option_id)
            .await?;
        self.action_draft = derive_next_action(session.history.last());
        self.session = Some(session);
        self.pending_turn = None;
        self.refresh_last_roll(game_id).await;
        Ok(())
    }

    pub async fn load_history(&mut self) {
        let Some(game_id) = self.session.as_ref().map(|s| s.id.clone()) else {
            self.push_errors(vec![String::from("no session to act in")]);
            return;
        };
        if !self.begin("Loading the history...") {
            return;
        }
        let prev = self.phase.clone();
        let result = self.client.fetch_history(&game_id).await;
        self.loading = false;
        match result {
            Ok(history) => {
                self.retry = None;
                self.set_status(format!("{} turn(s) on record", history.len()));
                self.history_view = Some(history);
            }
            Err(e) => self.fail("loading the history", e, RetryAction::LoadHistory, prev),
        }
    }

    /// Re-run the whole failed transition from scratch. There is no automatic
    /// retry, and server-side state a previous attempt already created is not
    /// rolled back.
    pub async fn retry(&mut self) {
        let Some(action) = self.retry.take() else {
            return;
        };
        self.phase = self.resume_phase.clone();
        match action {
            RetryAction::Initialize => self.initialize().await,
            RetryAction::StartSession { scenario_index } => {
                self.selected_scenario = scenario_index;
                self.start_session().await;
            }
            RetryAction::SubmitAction { action } => {
                self.action_draft = action;
                self.submit_action().await;
            }
            RetryAction::ChooseOption { option_id } => {
                let found = self
                    .pending_turn
                    .as_ref()
                    .and_then(|turn| turn.options.iter().find(|o| o.id == option_id))
                    .cloned();
                match found {
                    Some(option) => self.choose_option(option).await,
                    None => {
                        self.push_errors(vec![String::from(
                            "the chosen option is no longer offered",
                        )]);
                    }
                }
            }
            RetryAction::LoadHistory => self.load_history().await,
        }
    }

    pub fn select_next_scenario(&mut self) {
        if !self.scenarios.is_empty() {
            self.selected_scenario = (self.selected_scenario + 1) % self.scenarios.len();
        }
    }

    pub fn select_prev_scenario(&mut self) {
        if !self.scenarios.is_empty() {
            let len = self.scenarios.len();
            self.selected_scenario = (self.selected_scenario + len - 1) % len;
        }
    }

    pub fn select_next_option(&mut self) {
        if let Some(turn) = &self.pending_turn {
            if !turn.options.is_empty() {
                self.selected_option = (self.selected_option + 1) % turn.options.len();
            }
        }
    }

    pub fn select_prev_option(&mut self) {
        if let Some(turn) = &self.pending_turn {
            if !turn.options.is_empty() {
                let len = turn.options.len();
                self.selected_option = (self.selected_option + len - 1) % len;
            }
        }
    }

    pub fn set_action_draft(&mut self, draft: String) {
        self.action_draft = draft;
    }

    pub fn close_history(&mut self) {
        self.history_view = None;
    }

    /// Single-slot request guard: a transition requested while another is
    /// outstanding is rejected without touching any state.
    fn begin(&mut self, status: impl Into<String>) -> bool {
        if self.loading {
            self.push_errors(vec![String::from(
                "another request is already in flight",
            )]);
            return false;
        }
        self.loading = true;
        self.set_status(status);
        true
    }

    fn fail(
        &mut self,
        label: &'static str,
        err: BackendError,
        retry: RetryAction,
        resume_phase: Phase,
    ) {
        error!(error = %err, context = label, "transition failed");
        self.resume_phase = resume_phase;
        self.phase = Phase::Failed;
        self.retry = Some(retry);
        self.status = format!("{} failed, press r to retry", label);
        self.push_errors(vec![format!("Error while {}: {}", label, err)]);
    }

    fn set_status(&mut self, message: impl Into<String>) {
        self.status = message.into();
        self.errors.clear();
    }

    fn push_errors(&mut self, mut items: Vec<String>) {
        if items.is_empty() {
            return;
        }
        for item in &items {
            error!("{}", item);
        }
        self.errors.append(&mut items);
        if self.errors.len() > ERROR_HISTORY_DEPTH {
            let drain = self.errors.len() - ERROR_HISTORY_DEPTH;
            self.errors.drain(0..drain);
        }
    }

    fn build_player(&self, scenario: &Scenario) -> NewPlayer {
        let role_name = self
            .config
            .role
            .clone()
            .or_else(|| {
                let mut names: Vec<&String> = scenario.roles.keys().collect();
                names.sort();
                names.first().map(|n| (*n).clone())
            })
            .unwrap_or_default();
        let stats = scenario
            .roles
            .get(&role_name)
            .map(|role| role.stats.clone())
            .unwrap_or_default();
        NewPlayer {
            player_id: self.config.player_id.clone(),
            display_name: self.config.display_name.clone(),
            role: role_name,
            stats,
            hp: DEFAULT_HP,
            mp: DEFAULT_MP,
        }
    }
}

fn derive_next_action(last_entry: Option<&TurnRecord>) -> String {
    match last_entry {
        Some(entry) => format!("{} {}", CONTINUATION_PREFIX, entry.action),
        None => String::from(DEFAULT_FIRST_ACTION),
    }
}

pub async fn run_app(config: AppConfig) -> Result<()> {
    let mut controller = AppController::new(config)?;
    let mut ui_state = ui::UiState::default();

    ui::terminal_enter(&mut ui_state)?;
    let res = run_loop(&mut controller, &mut ui_state).await;
    ui::terminal_exit()?;
    res
}

async fn run_loop(
    controller: &mut AppController,
    ui_state: &mut ui::UiState,
) -> Result<()> {
    controller.initialize().await;
    ui::draw(ui_state, &controller.snapshot())?;
    loop {
        match ui::next_event(ui_state).await? {
            ui::UserEvent::Quit => break,
            ui::UserEvent::NextItem => match controller.phase() {
                Phase::ScenarioSelect => controller.select_next_scenario(),
                _ => controller.select_next_option(),
            },
            ui::UserEvent::PrevItem => match controller.phase() {
                Phase::ScenarioSelect => controller.select_prev_scenario(),
                _ => controller.select_prev_option(),
            },
            ui::UserEvent::StartSession => controller.start_session().await,
            ui::UserEvent::SubmitAction => controller.submit_action().await,
            ui::UserEvent::ConfirmAction(draft) => {
                controller.set_action_draft(draft);
                controller.submit_action().await;
            }
            ui::UserEvent::ChooseOption => controller.choose_selected_option().await,
            ui::UserEvent::ShowHistory => controller.load_history().await,
            ui::UserEvent::CloseHistory => controller.close_history(),
            ui::UserEvent::Retry => controller.retry().await,
            ui::UserEvent::Redraw => {}
        }
        ui::draw(ui_state, &controller.snapshot())?;
    }
    Ok(())
}
