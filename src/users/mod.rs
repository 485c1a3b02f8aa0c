pub mod dto;
pub mod handlers;
pub mod repo_types;
mod resolver;
mod services;
pub mod validate;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::public_routes())
        .merge(handlers::caller_routes())
}
