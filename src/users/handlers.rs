use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};

use super::{
    dto::{PasswordRequest, PrivateUser, ProfileRequest, PublicUser, RegisterRequest, RegisterResponse},
    repo_types::{Lookup, NewUser},
};
use crate::{
    auth::{jwt::Caller, password::digests_match},
    error::reject,
    state::AppState,
};

pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/profile/:username", get(public_profile))
}

pub fn caller_routes() -> Router<AppState> {
    Router::new()
        .route("/user/me", get(me))
        .route("/user/profile", post(update_profile))
        .route("/user/password", post(change_password))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), (StatusCode, String)> {
    let new = NewUser::from(payload);
    let username = new.username.clone();
    let id = state.directory.create_user(new).await.map_err(reject)?;
    info!(user_id = id, %username, "user registered");
    Ok((StatusCode::CREATED, Json(RegisterResponse { id, username })))
}

#[instrument(skip(state))]
pub async fn me(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<PrivateUser>, (StatusCode, String)> {
    let user = state
        .directory
        .resolve(Lookup::Id(caller.id))
        .await
        .map_err(reject)?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, payload))]
pub async fn update_profile(
    State(state): State<AppState>,
    caller: Caller,
    Json(payload): Json<ProfileRequest>,
) -> Result<Json<PrivateUser>, (StatusCode, String)> {
    let user = state
        .directory
        .update_profile(caller.id, payload.into())
        .await
        .map_err(reject)?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, payload))]
pub async fn change_password(
    State(state): State<AppState>,
    caller: Caller,
    Json(payload): Json<PasswordRequest>,
) -> Result<StatusCode, (StatusCode, String)> {
    let user = state
        .directory
        .resolve(Lookup::Id(caller.id))
        .await
        .map_err(reject)?;
    if !digests_match(&payload.old_password, &user.password) {
        warn!(user_id = caller.id, "password change with wrong old password");
        return Err((StatusCode::UNAUTHORIZED, "Invalid credentials".into()));
    }
    state
        .directory
        .change_password(caller.id, &payload.new_password)
        .await
        .map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn public_profile(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<PublicUser>, (StatusCode, String)> {
    let user = state.directory.public_user(&username).await.map_err(reject)?;
    Ok(Json(user))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::testing::digest;

    fn registration(username: &str, email: Option<&str>) -> Json<RegisterRequest> {
        Json(RegisterRequest {
            username: username.into(),
            password: digest('a'),
            email: email.map(Into::into),
            phone: None,
        })
    }

    async fn registered(state: &AppState, username: &str) -> Caller {
        let (_, Json(res)) = register(State(state.clone()), registration(username, None))
            .await
            .unwrap();
        Caller {
            id: res.id,
            username: res.username,
        }
    }

    #[tokio::test]
    async fn register_then_fetch_me() {
        let state = AppState::fake();
        let (status, Json(res)) = register(State(state.clone()), registration("alice", Some("a@x.com")))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::CREATED);

        let caller = Caller {
            id: res.id,
            username: res.username,
        };
        let Json(me) = me(State(state), caller).await.unwrap();
        assert_eq!(me.username, "alice");
        assert_eq!(me.email.as_deref(), Some("a@x.com"));
    }

    #[tokio::test]
    async fn duplicate_registration_is_conflict() {
        let state = AppState::fake();
        registered(&state, "alice").await;
        let (status, msg) = register(State(state), registration("alice", None))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(msg.contains("username"));
    }

    #[tokio::test]
    async fn invalid_registration_is_bad_request() {
        let state = AppState::fake();
        let (status, _) = register(State(state), registration("not valid!", None))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn profile_update_shows_on_public_profile() {
        let state = AppState::fake();
        let caller = registered(&state, "bob").await;
        let req = ProfileRequest {
            live_name: Some("bob plays".into()),
            ..Default::default()
        };
        update_profile(State(state.clone()), caller, Json(req))
            .await
            .unwrap();

        let Json(public) = public_profile(State(state.clone()), Path("bob".into()))
            .await
            .unwrap();
        assert_eq!(public.live_name.as_deref(), Some("bob plays"));
        assert!(!public.living);

        let (status, _) = public_profile(State(state), Path("nobody".into()))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn password_change_checks_the_old_digest() {
        let state = AppState::fake();
        let caller = registered(&state, "carl").await;

        let wrong = PasswordRequest {
            old_password: digest('b'),
            new_password: digest('c'),
        };
        let (status, _) = change_password(State(state.clone()), caller.clone(), Json(wrong))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let right = PasswordRequest {
            old_password: digest('a'),
            new_password: digest('c'),
        };
        let status = change_password(State(state.clone()), caller.clone(), Json(right))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);

        let user = state.directory.resolve(Lookup::Id(caller.id)).await.unwrap();
        assert_eq!(user.password, digest('c'));
    }
}
