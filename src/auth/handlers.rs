use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use tracing::{error, info, instrument, warn};

use super::{
    dto::{AuthResponse, LoginRequest, RefreshRequest},
    jwt::{Caller, JwtKeys},
    password::digests_match,
};
use crate::{
    error::{reject, UserError},
    state::AppState,
    users::{dto::PrivateUser, repo_types::{Lookup, User}},
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
}

fn token_pair(keys: &JwtKeys, user: User) -> Result<Json<AuthResponse>, (StatusCode, String)> {
    let access_token = keys.sign_access(user.id, &user.username).map_err(|e| {
        error!(error = %e, "jwt sign access failed");
        (StatusCode::INTERNAL_SERVER_ERROR, "Server error".to_string())
    })?;
    let refresh_token = keys.sign_refresh(user.id, &user.username).map_err(|e| {
        error!(error = %e, "jwt sign refresh failed");
        (StatusCode::INTERNAL_SERVER_ERROR, "Server error".to_string())
    })?;
    Ok(Json(AuthResponse {
        access_token,
        refresh_token,
        user: PrivateUser::from(user),
    }))
}

fn invalid_credentials() -> (StatusCode, String) {
    (StatusCode::UNAUTHORIZED, "Invalid credentials".into())
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, (StatusCode, String)> {
    let lookup = payload.lookup().ok_or((
        StatusCode::BAD_REQUEST,
        "username, email or phone required".to_string(),
    ))?;
    let user = match state.directory.resolve(lookup.clone()).await {
        Ok(u) => u,
        Err(UserError::NotFound) => {
            warn!(%lookup, "login unknown user");
            return Err(invalid_credentials());
        }
        Err(e) => return Err(reject(e)),
    };

    if !digests_match(&payload.password, &user.password) {
        warn!(user_id = user.id, "login invalid password");
        return Err(invalid_credentials());
    }

    info!(user_id = user.id, username = %user.username, "user logged in");
    token_pair(&JwtKeys::from_ref(&state), user)
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<AuthResponse>, (StatusCode, String)> {
    let keys = JwtKeys::from_ref(&state);
    let claims = keys
        .verify_refresh(&payload.refresh_token)
        .map_err(|e| (StatusCode::UNAUTHORIZED, e.to_string()))?;

    let user = match state.directory.resolve(Lookup::Id(claims.sub)).await {
        Ok(u) => u,
        Err(UserError::NotFound) => {
            return Err((StatusCode::UNAUTHORIZED, "User not found".into()));
        }
        Err(e) => return Err(reject(e)),
    };
    token_pair(&keys, user)
}

/// Tokens are stateless, so there is nothing to revoke. The client drops them.
#[instrument(skip_all, fields(user_id = caller.id))]
pub async fn logout(caller: Caller) -> StatusCode {
    info!("user logged out");
    StatusCode::NO_CONTENT
}
