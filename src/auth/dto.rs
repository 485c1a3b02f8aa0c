use serde::{Deserialize, Serialize};

use crate::users::{dto::PrivateUser, repo_types::Lookup};

/// Request body for login. Any one identifier is enough; `login` may hold
/// a username, an email or a phone. When several are sent the first present
/// one in field order wins.
#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub login: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    pub password: String,
}

fn given(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl LoginRequest {
    /// `None` when no identifier was sent.
    pub fn lookup(&self) -> Option<Lookup> {
        if let Some(login) = given(&self.login) {
            return Some(if login.contains('@') {
                Lookup::Email(login.to_owned())
            } else if login.starts_with('+') {
                Lookup::Phone(login.to_owned())
            } else {
                Lookup::Username(login.to_owned())
            });
        }
        given(&self.username)
            .map(|v| Lookup::Username(v.to_owned()))
            .or_else(|| given(&self.email).map(|v| Lookup::Email(v.to_owned())))
            .or_else(|| given(&self.phone).map(|v| Lookup::Phone(v.to_owned())))
    }
}

/// Request body for token refresh.
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Response returned after login or refresh.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: PrivateUser,
}
