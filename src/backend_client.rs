use std::{
    fmt,
    time::Duration,
};

use reqwest::StatusCode;
use serde::{
    Serialize,
    de::DeserializeOwned,
};
use serde_json::Value;
use thiserror::Error;

use crate::types::{
    ActionRequest,
    AiTurn,
    ChooseRequest,
    CreateGameRequest,
    DiceRoll,
    GameSession,
    ModelStatus,
    NewPlayer,
    ProvisionStatus,
    Scenario,
    TurnOption,
    TurnRecord,
};

/// Every failure mode of a backend call, normalized into one channel. The
/// `context` names the operation for user-facing messages.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("{context}: server responded with {status}: {detail}")]
    Status {
        context: &'static str,
        status: u16,
        detail: Value,
    },
    #[error("{context}: malformed response: {reason}")]
    Malformed {
        context: &'static str,
        reason: String,
    },
    #[error("{context}: server reported an error: {message}")]
    Application {
        context: &'static str,
        message: String,
    },
    #[error("{context}: request timed out")]
    Timeout { context: &'static str },
    #[error("{context}: transport failure: {source}")]
    Transport {
        context: &'static str,
        source: reqwest::Error,
    },
}

impl BackendError {
    pub fn context(&self) -> &'static str {
        match self {
            BackendError::Status { context, .. }
            | BackendError::Malformed { context, .. }
            | BackendError::Application { context, .. }
            | BackendError::Timeout { context }
            | BackendError::Transport { context, .. } => context,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            BackendError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct BackendClient {
    base_url: String,
    http: reqwest::Client,
}

impl BackendClient {
    /// Every request carries the same bounded deadline; expiry surfaces as
    /// `BackendError::Timeout` rather than hanging the calling transition.
    pub fn new(
        base_url: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, BackendError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|source| BackendError::Transport {
                context: "building the HTTP client",
                source,
            })?;
        Ok(Self { base_url, http })
    }

    pub async fn list_scenarios(&self) -> Result<Vec<Scenario>, BackendError> {
        let url = format!("{}/scenarios", self.base_url);
        self.get_json("listing the scenarios", url).await
    }

    pub async fn create_game(
        &self,
        scenario_id: &str,
    ) -> Result<GameSession, BackendError> {
        let url = format!("{}/games", self.base_url);
        let body = CreateGameRequest {
            scenario_id: scenario_id.to_string(),
        };
        self.post_json("creating the game", url, &body).await
    }

    pub async fn join_game(
        &self,
        game_id: &str,
        player: &NewPlayer,
    ) -> Result<GameSession, BackendError> {
        let url = format!("{}/games/{}/join", self.base_url, game_id);
        self.post_json("joining the game", url, player).await
    }

    /// A syntactically valid but semantically empty action response is
    /// indistinguishable from success on status alone, so presence of both
    /// `narration` and `options` is checked here.
    pub async fn submit_action(
        &self,
        game_id: &str,
        player_id: &str,
        action: &str,
    ) -> Result<AiTurn, BackendError> {
        const CONTEXT: &str = "sending the action";
        let url = format!("{}/games/{}/action", self.base_url, game_id);
        let body = ActionRequest {
            player_id: player_id.to_string(),
            action: action.to_string(),
        };
        let dto: ActionResponseDto = self.post_json(CONTEXT, url, &body).await?;
        let narration = dto.narration.ok_or_else(|| BackendError::Malformed {
            context: CONTEXT,
            reason: String::from("response is missing the narration field"),
        })?;
        let options = dto.options.ok_or_else(|| BackendError::Malformed {
            context: CONTEXT,
            reason: String::from("response is missing the options field"),
        })?;
        Ok(AiTurn { narration, options })
    }

    pub async fn choose_option(
        &self,
        game_id: &str,
        player_id: &str,
        option_id: i64,
    ) -> Result<GameSession, BackendError> {
        let url = format!("{}/games/{}/choose", self.base_url, game_id);
        let body = ChooseRequest {
            player_id: player_id.to_string(),
            option_id,
        };
        self.post_json("choosing the option", url, &body).await
    }

    pub async fn fetch_history(
        &self,
        game_id: &str,
    ) -> Result<Vec<TurnRecord>, BackendError> {
        let url = format!("{}/games/{}/history", self.base_url, game_id);
        self.get_json("loading the history", url).await
    }

    /// A 404 means no roll has happened yet, which is a valid empty result,
    /// not a failure.
    pub async fn fetch_last_roll(
        &self,
        game_id: &str,
    ) -> Result<Option<DiceRoll>, BackendError> {
        const CONTEXT: &str = "fetching the last roll";
        let url = format!("{}/games/{}/last_roll", self.base_url, game_id);
        let res = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| Self::classify_send(CONTEXT, e))?;
        if res.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(Self::decode(CONTEXT, res).await?))
    }

    pub async fn model_status(&self) -> Result<ModelStatus, BackendError> {
        let url = format!("{}/config/get_model", self.base_url);
        self.get_json("checking the narration model", url).await
    }

    pub async fn provision_model(&self) -> Result<ProvisionStatus, BackendError> {
        const CONTEXT: &str = "provisioning the narration model";
        let url = format!("{}/config/set_model", self.base_url);
        let res = self
            .http
            .post(url)
            .send()
            .await
            .map_err(|e| Self::classify_send(CONTEXT, e))?;
        Self::decode(CONTEXT, res).await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        context: &'static str,
        url: String,
    ) -> Result<T, BackendError> {
        let res = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| Self::classify_send(context, e))?;
        Self::decode(context, res).await
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        context: &'static str,
        url: String,
        body: &B,
    ) -> Result<T, BackendError> {
        let res = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| Self::classify_send(context, e))?;
        Self::decode(context, res).await
    }

    async fn decode<T: DeserializeOwned>(
        context: &'static str,
        res: reqwest::Response,
    ) -> Result<T, BackendError> {
        let status = res.status();
        let bytes = res
            .bytes()
            .await
            .map_err(|source| BackendError::Transport { context, source })?;
        if !status.is_success() {
            // Non-2xx bodies optionally carry structured JSON; assume an
            // empty object when they do not.
            let detail: Value =
                serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::Object(Default::default()));
            return Err(BackendError::Status {
                context,
                status: status.as_u16(),
                detail,
            });
        }
        let value: Value =
            serde_json::from_slice(&bytes).map_err(|e| BackendError::Malformed {
                context,
                reason: e.to_string(),
            })?;
        if let Some(message) = value.as_object().and_then(|obj| obj.get("error")) {
            return Err(BackendError::Application {
                context,
                message: message.to_string(),
            });
        }
        serde_json::from_value(value).map_err(|e| BackendError::Malformed {
            context,
            reason: e.to_string(),
        })
    }

    fn classify_send(context: &'static str, err: reqwest::Error) -> BackendError {
        if err.is_timeout() {
            BackendError::Timeout { context }
        } else {
            BackendError::Transport {
                context,
                source: err,
            }
        }
    }
}

#[derive(serde::Deserialize)]
struct ActionResponseDto {
    #[serde(default)]
    narration: Option<String>,
    #[serde(default)]
    options: Option<Vec<TurnOption>>,
}

impl fmt::Display for BackendClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.base_url)
    }
}
