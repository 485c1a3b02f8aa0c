use std::{fmt, time::Duration};

use axum::http::StatusCode;

/// Which side of the dual-tier store a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Cache,
    Durable,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Cache => f.write_str("cache"),
            Tier::Durable => f.write_str("durable"),
        }
    }
}

/// User attributes that can be rejected or collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Username,
    Password,
    Email,
    Phone,
    RoomName,
    RoomIntro,
    Limit,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Field::Username => "username",
            Field::Password => "password",
            Field::Email => "email",
            Field::Phone => "phone",
            Field::RoomName => "live_name",
            Field::RoomIntro => "live_intro",
            Field::Limit => "limit",
        };
        f.write_str(name)
    }
}

/// Transport-level failure of a single tier call.
#[derive(Debug, thiserror::Error)]
pub enum TierError {
    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt cached record: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("timestamp format: {0}")]
    Format(#[from] time::error::Format),

    #[error("timestamp parse: {0}")]
    Parse(#[from] time::error::Parse),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("unavailable: {0}")]
    Unavailable(String),
}

/// Outcome of a durable write that may hit a unique constraint.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("{0} already taken")]
    Conflict(Field),

    #[error(transparent)]
    Tier(#[from] TierError),
}

impl From<sqlx::Error> for WriteError {
    fn from(err: sqlx::Error) -> Self {
        match unique_violation(&err) {
            Some(field) => WriteError::Conflict(field),
            None => WriteError::Tier(TierError::Database(err)),
        }
    }
}

fn unique_violation(err: &sqlx::Error) -> Option<Field> {
    let db = err.as_database_error()?;
    if !db.is_unique_violation() {
        return None;
    }
    match db.constraint() {
        Some("users_email_key") => Some(Field::Email),
        Some("users_phone_key") => Some(Field::Phone),
        _ => Some(Field::Username),
    }
}

/// Error signals of the identity core.
#[derive(Debug, thiserror::Error)]
pub enum UserError {
    #[error("user not found")]
    NotFound,

    #[error("{0} already taken")]
    Conflict(Field),

    #[error("invalid {field}: {reason}")]
    Validation { field: Field, reason: &'static str },

    #[error("{tier} store failed during {op}: {source}")]
    Store {
        tier: Tier,
        op: &'static str,
        #[source]
        source: TierError,
    },

    #[error("cannot follow yourself")]
    SelfFollow,
}

impl UserError {
    pub fn invalid(field: Field, reason: &'static str) -> Self {
        UserError::Validation { field, reason }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            UserError::NotFound => StatusCode::NOT_FOUND,
            UserError::Conflict(_) => StatusCode::CONFLICT,
            UserError::Validation { .. } | UserError::SelfFollow => StatusCode::BAD_REQUEST,
            UserError::Store { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Translate a core error into the handler rejection shape.
///
/// Store failures are already logged with their context where they happened,
/// so the client only sees a generic message.
pub fn reject(err: UserError) -> (StatusCode, String) {
    let status = err.status();
    match err {
        UserError::Store { .. } => (status, "Server error".into()),
        other => (status, other.to_string()),
    }
}
