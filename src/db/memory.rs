//! Durable Store double for tests, enforcing the same unique constraints.

use std::collections::BTreeMap;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use async_trait::async_trait;
use time::{Duration, OffsetDateTime};
use tokio::sync::RwLock;

use super::UserStore;
use crate::error::{Field, TierError, WriteError};
use crate::users::repo_types::{Lookup, NewUser, Profile, User};

#[derive(Default)]
struct State {
    users: BTreeMap<i64, User>,
    next_id: i64,
}

impl State {
    fn taken(&self, field: Field, value: Option<&str>, except: Option<i64>) -> bool {
        let Some(value) = value else { return false };
        self.users.values().any(|u| {
            Some(u.id) != except
                && match field {
                    Field::Username => u.username == value,
                    Field::Email => u.email.as_deref() == Some(value),
                    Field::Phone => u.phone.as_deref() == Some(value),
                    _ => false,
                }
        })
    }
}

/// Row updates of one user are serialized, so their timestamps strictly grow.
fn touched(previous: OffsetDateTime) -> OffsetDateTime {
    OffsetDateTime::now_utc().max(previous + Duration::microseconds(1))
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<State>>,
    failing: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), TierError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(TierError::Unavailable("memory store switched off".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find(&self, lookup: &Lookup) -> Result<Option<User>, TierError> {
        self.check()?;
        let state = self.state.read().await;
        let found = state.users.values().find(|u| u.holds(lookup));
        Ok(found.filter(|u| u.deleted_at.is_none()).cloned())
    }

    async fn insert(&self, new: &NewUser) -> Result<User, WriteError> {
        self.check()?;
        let mut state = self.state.write().await;
        for (field, value) in [
            (Field::Username, Some(new.username.as_str())),
            (Field::Email, new.email.as_deref()),
            (Field::Phone, new.phone.as_deref()),
        ] {
            if state.taken(field, value, None) {
                return Err(WriteError::Conflict(field));
            }
        }
        state.next_id += 1;
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: state.next_id,
            username: new.username.clone(),
            password: new.password.clone(),
            email: new.email.clone(),
            phone: new.phone.clone(),
            room: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_profile(&self, id: i64, profile: &Profile) -> Result<Option<User>, WriteError> {
        self.check()?;
        let mut state = self.state.write().await;
        for (field, value) in [
            (Field::Email, profile.email.as_deref()),
            (Field::Phone, profile.phone.as_deref()),
        ] {
            if state.taken(field, value, Some(id)) {
                return Err(WriteError::Conflict(field));
            }
        }
        let Some(user) = state.users.get_mut(&id).filter(|u| u.deleted_at.is_none()) else {
            return Ok(None);
        };
        user.email = profile.email.clone();
        user.phone = profile.phone.clone();
        if profile.room.is_some() {
            user.room = profile.room.clone();
        }
        user.updated_at = touched(user.updated_at);
        Ok(Some(user.clone()))
    }

    async fn update_password(&self, id: i64, digest: &str) -> Result<Option<User>, TierError> {
        self.check()?;
        let mut state = self.state.write().await;
        let Some(user) = state.users.get_mut(&id).filter(|u| u.deleted_at.is_none()) else {
            return Ok(None);
        };
        user.password = digest.to_owned();
        user.updated_at = touched(user.updated_at);
        Ok(Some(user.clone()))
    }
}
