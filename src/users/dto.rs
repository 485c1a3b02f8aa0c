use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::repo_types::{FieldChange, NewUser, ProfileChange, User};

/// Request body for registration. `password` is the client-side digest.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

impl From<RegisterRequest> for NewUser {
    fn from(r: RegisterRequest) -> Self {
        // Empty optional fields are treated as not given.
        let present = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        Self {
            username: r.username,
            password: r.password,
            email: present(r.email),
            phone: present(r.phone),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub id: i64,
    pub username: String,
}

/// Absent keeps a field, an empty string clears it.
#[derive(Debug, Default, Deserialize)]
pub struct ProfileRequest {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub live_name: Option<String>,
    pub live_intro: Option<String>,
}

impl From<ProfileRequest> for ProfileChange {
    fn from(r: ProfileRequest) -> Self {
        Self {
            email: FieldChange::from_request(r.email),
            phone: FieldChange::from_request(r.phone),
            room_name: FieldChange::from_request(r.live_name),
            room_intro: FieldChange::from_request(r.live_intro),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

/// The caller's own record, minus the password digest.
#[derive(Debug, Serialize)]
pub struct PrivateUser {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub live_name: Option<String>,
    pub live_intro: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<User> for PrivateUser {
    fn from(u: User) -> Self {
        let (live_name, live_intro) = match u.room {
            Some(room) => (room.name, room.intro),
            None => (None, None),
        };
        Self {
            id: u.id,
            username: u.username,
            email: u.email,
            phone: u.phone,
            live_name,
            live_intro,
            created_at: u.created_at,
            updated_at: u.updated_at,
        }
    }
}

/// What anyone may see about a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicUser {
    pub username: String,
    pub live_name: Option<String>,
    pub live_intro: Option<String>,
    pub living: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub living_since: Option<OffsetDateTime>,
    pub followers: u64,
    pub followings: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn private_user_never_serializes_the_digest() {
        let user = User {
            id: 1,
            username: "alice".into(),
            password: "f".repeat(64),
            email: Some("a@x.com".into()),
            phone: None,
            room: None,
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: OffsetDateTime::UNIX_EPOCH,
            deleted_at: None,
        };
        let json = serde_json::to_string(&PrivateUser::from(user)).unwrap();
        assert!(json.contains("a@x.com"));
        assert!(!json.contains(&"f".repeat(64)));
    }

    #[test]
    fn public_user_has_no_private_fields() {
        let user = PublicUser {
            username: "bob".into(),
            live_name: Some("bob's room".into()),
            live_intro: None,
            living: false,
            living_since: None,
            followers: 2,
            followings: 0,
        };
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("email").is_none());
        assert!(json.get("phone").is_none());
        assert!(json.get("password").is_none());
        assert_eq!(json["followers"], 2);
    }

    #[test]
    fn register_request_drops_empty_optionals() {
        let req: RegisterRequest = serde_json::from_str(
            r#"{"username":"carl","password":"x","email":"","phone":"+15550100"}"#,
        )
        .unwrap();
        let new = NewUser::from(req);
        assert_eq!(new.email, None);
        assert_eq!(new.phone.as_deref(), Some("+15550100"));
    }
}
