//! Live presence and watch history. Both live in the Fast Cache only.

mod dto;
pub mod handlers;
pub mod repo_types;
mod services;
pub mod stream_key;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    handlers::routes()
}
