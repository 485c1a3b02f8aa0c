//! Durable Store tier: the authoritative user and room records.

#[cfg(test)]
pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::error::{TierError, WriteError};
use crate::users::repo_types::{Lookup, NewUser, Profile, User};

pub use self::postgres::PgUserStore;

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Soft-deleted users are never returned.
    async fn find(&self, lookup: &Lookup) -> Result<Option<User>, TierError>;

    /// Assigns the id.
    async fn insert(&self, user: &NewUser) -> Result<User, WriteError>;

    /// Writes the user row and the room row in one transaction.
    /// `Ok(None)` when no such user exists.
    async fn update_profile(&self, id: i64, profile: &Profile) -> Result<Option<User>, WriteError>;

    async fn update_password(&self, id: i64, digest: &str) -> Result<Option<User>, TierError>;
}
