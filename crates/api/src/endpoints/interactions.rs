//! Slack interactivity endpoint.
//!
//! Button clicks arrive as `block_actions`, the submission modal as
//! `view_submission`. Both are posted as a form with one `payload` field.

use std::collections::HashMap;

use axum::{
    Form, Json, Router,
    extract::State,
    response::{IntoResponse, Response},
    routing::post,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, info, warn};
use tunepoll_common::{AppError, AppResult, Rejection};
use tunepoll_core::projector::actions;

use super::refresh_home;
use crate::middleware::AppState;
use crate::views;

#[derive(Debug, Deserialize)]
struct InteractionForm {
    payload: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Interaction {
    BlockActions {
        user: Actor,
        #[serde(default)]
        team: Option<Team>,
        #[serde(default)]
        trigger_id: Option<String>,
        #[serde(default)]
        actions: Vec<BlockAction>,
    },
    ViewSubmission {
        user: Actor,
        #[serde(default)]
        team: Option<Team>,
        view: SubmittedView,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct Actor {
    id: String,
    #[serde(default)]
    team_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Team {
    id: String,
}

#[derive(Debug, Deserialize)]
struct BlockAction {
    action_id: String,
    #[serde(default)]
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SubmittedView {
    #[serde(default)]
    callback_id: String,
    #[serde(default)]
    state: ViewState,
}

#[derive(Debug, Default, Deserialize)]
struct ViewState {
    #[serde(default)]
    values: HashMap<String, HashMap<String, InputValue>>,
}

#[derive(Debug, Deserialize)]
struct InputValue {
    #[serde(default)]
    value: Option<String>,
}

impl SubmittedView {
    fn input(&self, block_id: &str, action_id: &str) -> Option<&str> {
        self.state
            .values
            .get(block_id)?
            .get(action_id)?
            .value
            .as_deref()
    }
}

fn team_of(team: Option<&Team>, user: &Actor) -> AppResult<String> {
    team.map(|t| t.id.clone())
        .or_else(|| user.team_id.clone())
        .ok_or_else(|| AppError::BadRequest("Interaction without team".to_string()))
}

/// Message shown to the actor when an action fails.
fn failure_message(err: &AppError) -> String {
    match err.rejection() {
        Some(rejection) => rejection.to_string(),
        None => "Something went wrong. Please try again in a moment.".to_string(),
    }
}

fn log_failure(team_id: &str, user_id: &str, action_id: &str, err: &AppError) {
    if let Some(rejection) = err.rejection() {
        info!(
            team_id = %team_id,
            user_id = %user_id,
            action_id,
            code = rejection.code(),
            "Action rejected"
        );
    } else if err.is_server_error() {
        error!(team_id = %team_id, user_id = %user_id, action_id, error = %err, "Action failed");
    } else {
        warn!(team_id = %team_id, user_id = %user_id, action_id, error = %err, "Action failed");
    }
}

async fn handle_interaction(
    State(state): State<AppState>,
    Form(form): Form<InteractionForm>,
) -> AppResult<Response> {
    let interaction: Interaction = serde_json::from_str(&form.payload)
        .map_err(|e| AppError::BadRequest(format!("Invalid interaction payload: {e}")))?;

    match interaction {
        Interaction::BlockActions {
            user,
            team,
            trigger_id,
            actions,
        } => {
            let team_id = team_of(team.as_ref(), &user)?;
            for action in &actions {
                block_action(&state, &team_id, &user.id, trigger_id.as_deref(), action).await;
            }
            Ok(().into_response())
        }
        Interaction::ViewSubmission { user, team, view } => {
            let team_id = team_of(team.as_ref(), &user)?;
            Ok(view_submission(&state, &team_id, &user.id, &view).await)
        }
        Interaction::Other => Ok(().into_response()),
    }
}

async fn block_action(
    state: &AppState,
    team_id: &str,
    user_id: &str,
    trigger_id: Option<&str>,
    action: &BlockAction,
) {
    let action_id = action.action_id.as_str();
    debug!(team_id = %team_id, user_id = %user_id, action_id, "Block action");

    let polls = &state.poll_service;
    let outcome = match action_id {
        actions::SUBMIT_SONG => {
            let Some(trigger_id) = trigger_id else {
                warn!(team_id = %team_id, user_id = %user_id, "Submit clicked without trigger id");
                return;
            };
            if let Err(e) = state
                .chat
                .open_modal(team_id, trigger_id, views::submit_modal())
                .await
            {
                log_failure(team_id, user_id, action_id, &e);
            }
            return;
        }
        actions::UNSUBMIT_SONG => polls.unsubmit(team_id, user_id).await,
        actions::VOTE_SONG => match action.value.as_deref() {
            Some(track_id) => polls.vote(team_id, user_id, track_id).await,
            None => Err(Rejection::UnknownSong.into()),
        },
        actions::UNVOTE_SONG => polls.unvote(team_id, user_id).await,
        actions::ADVANCE_POLL => polls.advance(team_id, user_id).await,
        // Link buttons still report a click; the browser handles the rest.
        views::CONNECT_SPOTIFY => return,
        other => {
            debug!(team_id = %team_id, action_id = other, "Ignoring unknown action");
            return;
        }
    };

    if let Err(e) = outcome {
        log_failure(team_id, user_id, action_id, &e);
        if let Some(trigger_id) = trigger_id {
            let modal = views::info_modal(&failure_message(&e));
            if let Err(notify_err) = state.chat.open_modal(team_id, trigger_id, modal).await {
                warn!(team_id = %team_id, user_id = %user_id, error = %notify_err, "Failed to report action failure");
            }
        }
    }

    refresh_home(state, team_id, user_id).await;
}

async fn view_submission(
    state: &AppState,
    team_id: &str,
    user_id: &str,
    view: &SubmittedView,
) -> Response {
    if view.callback_id != actions::SUBMIT_SONG_MODAL {
        debug!(team_id = %team_id, callback_id = %view.callback_id, "Ignoring view submission");
        return ().into_response();
    }

    let link = view
        .input(actions::SONG_LINK_BLOCK, actions::SONG_LINK_INPUT)
        .unwrap_or_default();

    match state.poll_service.submit(team_id, user_id, link).await {
        Ok(_) => {
            refresh_home(state, team_id, user_id).await;
            ().into_response()
        }
        Err(e) => {
            log_failure(team_id, user_id, actions::SUBMIT_SONG_MODAL, &e);
            if e.rejection() == Some(Rejection::InvalidLink) {
                let mut errors = serde_json::Map::new();
                errors.insert(actions::SONG_LINK_BLOCK.to_string(), json!(e.to_string()));
                return Json(json!({ "response_action": "errors", "errors": errors }))
                    .into_response();
            }
            Json(json!({
                "response_action": "update",
                "view": views::info_modal(&failure_message(&e)),
            }))
            .into_response()
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new().route("/slack/interactions", post(handle_interaction))
}
