//! In-process Fast Cache.
//!
//! Used when no Redis is configured (single instance, nothing survives a
//! restart) and as the cache double in tests. Every operation takes one lock,
//! which gives the same all-or-nothing behaviour as `MULTI/EXEC`.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use async_trait::async_trait;
use rand::seq::IteratorRandom;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::debug;

use super::{version, Edge, FastCache};
use crate::error::TierError;
use crate::live::repo_types::HistoryEntry;
use crate::users::repo_types::{Lookup, User};

#[derive(Default)]
struct State {
    records: HashMap<i64, String>,
    indexes: HashMap<Lookup, i64>,
    edges: HashMap<(Edge, String), BTreeSet<String>>,
    living: HashSet<String>,
    living_since: HashMap<String, OffsetDateTime>,
    // (unix seconds, insertion sequence, username)
    history: HashMap<i64, Vec<(i64, u64, String)>>,
    seq: u64,
}

impl State {
    fn record(&self, id: i64) -> Result<Option<User>, TierError> {
        match self.records.get(&id) {
            Some(json) => Ok(Some(serde_json::from_str(json)?)),
            None => Ok(None),
        }
    }

    /// Removes `index` only while it still points at `id`.
    fn drop_index(&mut self, index: &Lookup, id: i64) {
        if self.indexes.get(index) == Some(&id) {
            self.indexes.remove(index);
        }
    }

    fn put_bundle(&mut self, user: &User, json: String) {
        self.records.insert(user.id, json);
        for index in user.index_keys() {
            self.indexes.insert(index, user.id);
        }
    }
}

#[derive(Clone, Default)]
pub struct MemoryCache {
    state: Arc<RwLock<State>>,
    failing: Arc<AtomicBool>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every call fails as if the cache were unreachable.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), TierError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(TierError::Unavailable("memory cache switched off".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl FastCache for MemoryCache {
    async fn find_user(&self, lookup: &Lookup) -> Result<Option<User>, TierError> {
        self.check()?;
        let (id, user) = {
            let state = self.state.read().await;
            let id = match lookup {
                Lookup::Id(id) => *id,
                index => match state.indexes.get(index) {
                    Some(id) => *id,
                    None => return Ok(None),
                },
            };
            match state.record(id)? {
                Some(user) => (id, user),
                None => return Ok(None),
            }
        };
        if user.holds(lookup) {
            return Ok(Some(user));
        }
        debug!(%lookup, id, "dropping dangling index entry");
        self.state.write().await.drop_index(lookup, id);
        Ok(None)
    }

    async fn write_user(&self, user: &User, stale: &[Lookup]) -> Result<(), TierError> {
        self.check()?;
        let json = serde_json::to_string(user)?;
        let mut state = self.state.write().await;
        if let Some(replaced) = state.record(user.id)? {
            if version(&replaced) > version(user) {
                return Ok(());
            }
            for index in replaced.index_keys() {
                state.drop_index(&index, user.id);
            }
        }
        for index in stale {
            state.drop_index(index, user.id);
        }
        state.put_bundle(user, json);
        Ok(())
    }

    async fn fill_user(&self, user: &User) -> Result<bool, TierError> {
        self.check()?;
        let json = serde_json::to_string(user)?;
        let mut state = self.state.write().await;
        if state.records.contains_key(&user.id) {
            return Ok(false);
        }
        state.put_bundle(user, json);
        Ok(true)
    }

    async fn evict_user(&self, id: i64, indexes: &[Lookup]) -> Result<(), TierError> {
        self.check()?;
        let mut state = self.state.write().await;
        state.records.remove(&id);
        for index in indexes {
            state.indexes.remove(index);
        }
        Ok(())
    }

    async fn link(&self, follower: &str, followee: &str) -> Result<(), TierError> {
        self.check()?;
        let mut state = self.state.write().await;
        state
            .edges
            .entry((Edge::Followers, followee.to_owned()))
            .or_default()
            .insert(follower.to_owned());
        state
            .edges
            .entry((Edge::Followings, follower.to_owned()))
            .or_default()
            .insert(followee.to_owned());
        Ok(())
    }

    async fn unlink(&self, follower: &str, followee: &str) -> Result<(), TierError> {
        self.check()?;
        let mut state = self.state.write().await;
        if let Some(set) = state.edges.get_mut(&(Edge::Followers, followee.to_owned())) {
            set.remove(follower);
        }
        if let Some(set) = state.edges.get_mut(&(Edge::Followings, follower.to_owned())) {
            set.remove(followee);
        }
        Ok(())
    }

    async fn members(&self, edge: Edge, username: &str) -> Result<Vec<String>, TierError> {
        self.check()?;
        let state = self.state.read().await;
        Ok(state
            .edges
            .get(&(edge, username.to_owned()))
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn count(&self, edge: Edge, username: &str) -> Result<u64, TierError> {
        self.check()?;
        let state = self.state.read().await;
        Ok(state
            .edges
            .get(&(edge, username.to_owned()))
            .map_or(0, |set| set.len() as u64))
    }

    async fn set_live(&self, username: &str, since: OffsetDateTime) -> Result<(), TierError> {
        self.check()?;
        let mut state = self.state.write().await;
        state.living.insert(username.to_owned());
        state.living_since.insert(username.to_owned(), since);
        Ok(())
    }

    async fn clear_live(&self, username: &str) -> Result<(), TierError> {
        self.check()?;
        let mut state = self.state.write().await;
        state.living.remove(username);
        state.living_since.remove(username);
        Ok(())
    }

    async fn is_live(&self, username: &str) -> Result<bool, TierError> {
        self.check()?;
        Ok(self.state.read().await.living.contains(username))
    }

    async fn live_since(&self, username: &str) -> Result<Option<OffsetDateTime>, TierError> {
        self.check()?;
        Ok(self.state.read().await.living_since.get(username).copied())
    }

    async fn sample_live(&self, count: usize) -> Result<Vec<String>, TierError> {
        self.check()?;
        let state = self.state.read().await;
        let mut rng = rand::thread_rng();
        Ok(state.living.iter().cloned().choose_multiple(&mut rng, count))
    }

    async fn push_history(
        &self,
        viewer: i64,
        entry: &HistoryEntry,
        retain: usize,
    ) -> Result<(), TierError> {
        self.check()?;
        let mut state = self.state.write().await;
        state.seq += 1;
        let seq = state.seq;
        let log = state.history.entry(viewer).or_default();
        log.push((entry.watched_at.unix_timestamp(), seq, entry.username.clone()));
        if retain > 0 && log.len() > retain {
            log.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)));
            log.truncate(retain);
        }
        Ok(())
    }

    async fn recent_history(
        &self,
        viewer: i64,
        limit: usize,
    ) -> Result<Vec<HistoryEntry>, TierError> {
        self.check()?;
        let state = self.state.read().await;
        let Some(log) = state.history.get(&viewer) else {
            return Ok(Vec::new());
        };
        let mut ordered: Vec<_> = log.iter().collect();
        ordered.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)));
        Ok(ordered
            .into_iter()
            .take(limit)
            .filter_map(|(score, _, username)| {
                OffsetDateTime::from_unix_timestamp(*score)
                    .ok()
                    .map(|watched_at| HistoryEntry {
                        username: username.clone(),
                        watched_at,
                    })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: i64, username: &str) -> User {
        User {
            id,
            username: username.into(),
            password: "0".repeat(64),
            email: Some(format!("{username}@x.com")),
            phone: None,
            room: None,
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: OffsetDateTime::UNIX_EPOCH,
            deleted_at: None,
        }
    }

    #[tokio::test]
    async fn fill_never_overwrites_a_present_record() {
        let cache = MemoryCache::new();
        let mut newer = user(1, "alice");
        newer.email = Some("new@x.com".into());
        cache.write_user(&newer, &[]).await.unwrap();

        let older = user(1, "alice");
        assert!(!cache.fill_user(&older).await.unwrap());

        let found = cache.find_user(&Lookup::Id(1)).await.unwrap().unwrap();
        assert_eq!(found.email.as_deref(), Some("new@x.com"));
    }

    #[tokio::test]
    async fn write_drops_stale_indexes() {
        let cache = MemoryCache::new();
        let old = user(1, "alice");
        cache.write_user(&old, &[]).await.unwrap();

        let mut new = old.clone();
        new.email = None;
        cache
            .write_user(&new, &[Lookup::Email("alice@x.com".into())])
            .await
            .unwrap();
        assert!(cache
            .find_user(&Lookup::Email("alice@x.com".into()))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn index_without_record_is_a_miss() {
        let cache = MemoryCache::new();
        let u = user(3, "carl");
        cache.write_user(&u, &[]).await.unwrap();
        cache.evict_user(3, &[]).await.unwrap();
        assert!(cache
            .find_user(&Lookup::Username("carl".into()))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn dangling_index_is_a_miss_and_dropped() {
        let cache = MemoryCache::new();
        let mut moved = user(1, "alice");
        moved.email = Some("new@x.com".into());
        cache.write_user(&moved, &[]).await.unwrap();
        let old = Lookup::Email("alice@x.com".into());
        cache.state.write().await.indexes.insert(old.clone(), 1);

        assert!(cache.find_user(&old).await.unwrap().is_none());
        assert!(!cache.state.read().await.indexes.contains_key(&old));
        assert!(cache
            .find_user(&Lookup::Email("new@x.com".into()))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn write_drops_the_replaced_records_indexes() {
        let cache = MemoryCache::new();
        let first = user(1, "alice");
        cache.write_user(&first, &[]).await.unwrap();

        // No stale list given: the cached record itself says what to drop.
        let mut second = first.clone();
        second.email = Some("z@x.com".into());
        second.updated_at += time::Duration::seconds(1);
        cache.write_user(&second, &[]).await.unwrap();

        let state = cache.state.read().await;
        assert!(!state.indexes.contains_key(&Lookup::Email("alice@x.com".into())));
        assert_eq!(state.indexes.get(&Lookup::Email("z@x.com".into())), Some(&1));
    }

    #[tokio::test]
    async fn older_version_never_replaces_a_newer_one() {
        let cache = MemoryCache::new();
        let older = user(1, "alice");
        let mut newer = older.clone();
        newer.email = Some("new@x.com".into());
        newer.updated_at += time::Duration::seconds(1);

        cache.write_user(&newer, &[]).await.unwrap();
        cache.write_user(&older, &[]).await.unwrap();

        let found = cache.find_user(&Lookup::Id(1)).await.unwrap().unwrap();
        assert_eq!(found, newer);
        assert!(cache
            .find_user(&Lookup::Email("alice@x.com".into()))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn stale_index_owned_by_another_user_is_kept() {
        let cache = MemoryCache::new();
        let bob = user(2, "bob");
        cache.write_user(&bob, &[]).await.unwrap();

        let alice = user(1, "alice");
        cache
            .write_user(&alice, &[Lookup::Email("bob@x.com".into())])
            .await
            .unwrap();
        let found = cache
            .find_user(&Lookup::Email("bob@x.com".into()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, 2);
    }

    #[tokio::test]
    async fn failing_cache_reports_unavailable() {
        let cache = MemoryCache::new();
        cache.set_failing(true);
        let err = cache.is_live("bob").await.unwrap_err();
        assert!(matches!(err, TierError::Unavailable(_)));
    }

    #[tokio::test]
    async fn history_is_trimmed_to_retain() {
        let cache = MemoryCache::new();
        for t in 0..5 {
            let entry = HistoryEntry {
                username: format!("u{t}"),
                watched_at: OffsetDateTime::from_unix_timestamp(100 + t).unwrap(),
            };
            cache.push_history(1, &entry, 3).await.unwrap();
        }
        let recent = cache.recent_history(1, 10).await.unwrap();
        let names: Vec<_> = recent.iter().map(|e| e.username.as_str()).collect();
        assert_eq!(names, ["u4", "u3", "u2"]);
    }
}
