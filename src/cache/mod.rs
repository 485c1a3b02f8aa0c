//! Fast Cache tier.
//!
//! Holds the serialized user records and their secondary indexes, the
//! follow sets, live presence and the per-viewer watch history. Only the
//! user records have a durable counterpart; everything else lives here alone.

pub mod keys;
pub mod memory;
pub mod redis_cache;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::error::TierError;
use crate::live::repo_types::HistoryEntry;
use crate::users::repo_types::{Lookup, User};

pub use self::memory::MemoryCache;
pub use self::redis_cache::RedisCache;

/// Direction of a follow set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Edge {
    /// Users following the set owner.
    Followers,
    /// Users the set owner follows.
    Followings,
}

/// Order of record versions: the durable `updated_at` in microseconds.
pub fn version(user: &User) -> i64 {
    (user.updated_at.unix_timestamp_nanos() / 1_000) as i64
}

#[async_trait]
pub trait FastCache: Send + Sync {
    /// `Ok(None)` when the index entry or the record is absent. An index
    /// entry whose record no longer carries the looked-up value is dropped
    /// and reported as a miss.
    async fn find_user(&self, lookup: &Lookup) -> Result<Option<User>, TierError>;

    /// Atomically replaces the record and its indexes, unless the cached
    /// record has a newer [`version`]. The index entries of the replaced
    /// record and `stale` are dropped, each only while it still points at
    /// this user.
    async fn write_user(&self, user: &User, stale: &[Lookup]) -> Result<(), TierError>;

    /// Same bundle as [`FastCache::write_user`], applied only while the record
    /// key is absent. Returns whether anything was written.
    async fn fill_user(&self, user: &User) -> Result<bool, TierError>;

    async fn evict_user(&self, id: i64, indexes: &[Lookup]) -> Result<(), TierError>;

    /// Adds the edge to both follow sets in one transaction.
    async fn link(&self, follower: &str, followee: &str) -> Result<(), TierError>;
    async fn unlink(&self, follower: &str, followee: &str) -> Result<(), TierError>;
    async fn members(&self, edge: Edge, username: &str) -> Result<Vec<String>, TierError>;
    async fn count(&self, edge: Edge, username: &str) -> Result<u64, TierError>;

    async fn set_live(&self, username: &str, since: OffsetDateTime) -> Result<(), TierError>;
    async fn clear_live(&self, username: &str) -> Result<(), TierError>;
    async fn is_live(&self, username: &str) -> Result<bool, TierError>;
    async fn live_since(&self, username: &str) -> Result<Option<OffsetDateTime>, TierError>;
    /// Up to `count` distinct live usernames in random order.
    async fn sample_live(&self, count: usize) -> Result<Vec<String>, TierError>;

    /// Appends to the viewer's log, keeping the newest `retain` entries
    /// (`0` keeps everything).
    async fn push_history(
        &self,
        viewer: i64,
        entry: &HistoryEntry,
        retain: usize,
    ) -> Result<(), TierError>;
    /// Newest first.
    async fn recent_history(&self, viewer: i64, limit: usize)
        -> Result<Vec<HistoryEntry>, TierError>;
}
