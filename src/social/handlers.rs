use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use crate::{auth::jwt::Caller, error::reject, state::AppState, users::dto::PublicUser};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/user/follow/:username", post(follow))
        .route("/user/unfollow/:username", post(unfollow))
        .route("/followers/:username", get(followers))
        .route("/followings/:username", get(followings))
}

#[instrument(skip(state))]
pub async fn follow(
    State(state): State<AppState>,
    caller: Caller,
    Path(username): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    state
        .directory
        .follow(&caller.username, &username)
        .await
        .map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn unfollow(
    State(state): State<AppState>,
    caller: Caller,
    Path(username): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    state
        .directory
        .unfollow(&caller.username, &username)
        .await
        .map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn followers(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<Vec<PublicUser>>, (StatusCode, String)> {
    let users = state
        .directory
        .list_followers(&username)
        .await
        .map_err(reject)?;
    Ok(Json(users))
}

#[instrument(skip(state))]
pub async fn followings(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<Vec<PublicUser>>, (StatusCode, String)> {
    let users = state
        .directory
        .list_followings(&username)
        .await
        .map_err(reject)?;
    Ok(Json(users))
}
