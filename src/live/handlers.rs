use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tracing::{debug, error, instrument, warn};

use super::{dto::LivingResponse, repo_types::HistoryEntry};
use crate::{
    auth::jwt::Caller,
    error::{reject, UserError},
    state::AppState,
    users::repo_types::Lookup,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/living/:n", get(living))
        .route("/user/live", post(go_live).delete(go_offline))
        .route("/user/watch/:username", post(watch))
        .route("/user/history", get(history))
        .route("/stream/key/:username", get(stream_key))
}

#[instrument(skip(state))]
pub async fn living(
    State(state): State<AppState>,
    Path(n): Path<i64>,
) -> Result<Json<LivingResponse>, (StatusCode, String)> {
    let names = state.directory.list_living(n).await.map_err(reject)?;
    let mut users = Vec::with_capacity(names.len());
    for name in names {
        match state.directory.public_user(&name).await {
            Ok(user) => users.push(user),
            Err(UserError::NotFound) => debug!(%name, "live room without a user"),
            Err(e) => return Err(reject(e)),
        }
    }
    Ok(Json(LivingResponse {
        total: users.len(),
        users,
    }))
}

#[instrument(skip(state))]
pub async fn go_live(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<StatusCode, (StatusCode, String)> {
    state
        .directory
        .mark_live(&caller.username)
        .await
        .map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn go_offline(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<StatusCode, (StatusCode, String)> {
    state
        .directory
        .mark_offline(&caller.username)
        .await
        .map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Records a watch of an existing user's room.
#[instrument(skip(state))]
pub async fn watch(
    State(state): State<AppState>,
    caller: Caller,
    Path(username): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    let room = state
        .directory
        .resolve(Lookup::Username(username))
        .await
        .map_err(reject)?;
    state
        .directory
        .record_watch(caller.id, &room.username)
        .await
        .map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn history(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<Vec<HistoryEntry>>, (StatusCode, String)> {
    let entries = state.directory.history(caller.id).await.map_err(reject)?;
    Ok(Json(entries))
}

/// The publish key of the caller's own room.
#[instrument(skip(state))]
pub async fn stream_key(
    State(state): State<AppState>,
    caller: Caller,
    Path(username): Path<String>,
) -> Result<Json<Value>, (StatusCode, String)> {
    if caller.username != username {
        warn!(caller = %caller.username, %username, "stream key for another user");
        return Err((StatusCode::FORBIDDEN, "token does not match user".into()));
    }
    let key = state.stream_keys.fetch(&username).await.map_err(|e| {
        error!(error = %e, "stream key fetch failed");
        (StatusCode::BAD_GATEWAY, "live server unavailable".to_string())
    })?;
    Ok(Json(json!({ "key": key })))
}
