use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// User record as stored in both tiers.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password: String, // 64-char hex digest, never exposed
    pub email: Option<String>,
    pub phone: Option<String>,
    #[serde(default)]
    pub room: Option<Room>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub deleted_at: Option<OffsetDateTime>,
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("email", &self.email)
            .field("phone", &self.phone)
            .field("room", &self.room)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

impl User {
    /// Secondary identifiers currently pointing at this user.
    pub fn index_keys(&self) -> Vec<Lookup> {
        let mut keys = vec![Lookup::Username(self.username.clone())];
        if let Some(email) = &self.email {
            keys.push(Lookup::Email(email.clone()));
        }
        if let Some(phone) = &self.phone {
            keys.push(Lookup::Phone(phone.clone()));
        }
        keys
    }

    /// Whether this record still carries the identifier `lookup` names.
    pub fn holds(&self, lookup: &Lookup) -> bool {
        match lookup {
            Lookup::Id(id) => self.id == *id,
            Lookup::Username(v) => &self.username == v,
            Lookup::Email(v) => self.email.as_ref() == Some(v),
            Lookup::Phone(v) => self.phone.as_ref() == Some(v),
        }
    }

    pub fn room_name(&self) -> Option<&str> {
        self.room.as_ref().and_then(|r| r.name.as_deref())
    }

    pub fn room_intro(&self) -> Option<&str> {
        self.room.as_ref().and_then(|r| r.intro.as_deref())
    }
}

/// Live room attached 1:1 to a user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub name: Option<String>,
    pub intro: Option<String>,
}

/// One of the four ways to identify a user.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Lookup {
    Id(i64),
    Username(String),
    Email(String),
    Phone(String),
}

impl fmt::Display for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lookup::Id(id) => write!(f, "id:{id}"),
            Lookup::Username(v) => write!(f, "username:{v}"),
            Lookup::Email(v) => write!(f, "email:{v}"),
            Lookup::Phone(v) => write!(f, "phone:{v}"),
        }
    }
}

/// Fields accepted at registration.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Requested change to a single optional field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FieldChange {
    #[default]
    Keep,
    Clear,
    Set(String),
}

impl FieldChange {
    /// Absent keeps the value, an empty string clears it.
    pub fn from_request(value: Option<String>) -> Self {
        match value {
            None => FieldChange::Keep,
            Some(v) if v.trim().is_empty() => FieldChange::Clear,
            Some(v) => FieldChange::Set(v),
        }
    }

    pub fn apply(&self, current: Option<&str>) -> Option<String> {
        match self {
            FieldChange::Keep => current.map(str::to_owned),
            FieldChange::Clear => None,
            FieldChange::Set(v) => Some(v.clone()),
        }
    }

    pub fn is_keep(&self) -> bool {
        matches!(self, FieldChange::Keep)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProfileChange {
    pub email: FieldChange,
    pub phone: FieldChange,
    pub room_name: FieldChange,
    pub room_intro: FieldChange,
}

/// Full set of settable profile values after a change is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub room: Option<Room>,
}

impl Profile {
    pub fn of(user: &User) -> Self {
        Self {
            email: user.email.clone(),
            phone: user.phone.clone(),
            room: user.room.clone(),
        }
    }

    /// The room row is only created once a room field is touched.
    pub fn apply(user: &User, change: &ProfileChange) -> Self {
        let room = if user.room.is_some()
            || !change.room_name.is_keep()
            || !change.room_intro.is_keep()
        {
            Some(Room {
                name: change.room_name.apply(user.room_name()),
                intro: change.room_intro.apply(user.room_intro()),
            })
        } else {
            None
        };
        Self {
            email: change.email.apply(user.email.as_deref()),
            phone: change.phone.apply(user.phone.as_deref()),
            room,
        }
    }

    /// Index entries of `user` that would dangle once this profile is written.
    pub fn stale_indexes(&self, user: &User) -> Vec<Lookup> {
        let mut stale = Vec::new();
        if let Some(old) = &user.email {
            if self.email.as_ref() != Some(old) {
                stale.push(Lookup::Email(old.clone()));
            }
        }
        if let Some(old) = &user.phone {
            if self.phone.as_ref() != Some(old) {
                stale.push(Lookup::Phone(old.clone()));
            }
        }
        stale
    }
}
