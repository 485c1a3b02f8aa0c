use time::OffsetDateTime;
use tracing::{info, instrument};

use super::repo_types::HistoryEntry;
use crate::cache::keys;
use crate::directory::Directory;
use crate::error::{Field, UserError};

impl Directory {
    pub async fn mark_live(&self, username: &str) -> Result<(), UserError> {
        self.mark_live_at(username, OffsetDateTime::now_utc()).await
    }

    #[instrument(skip(self))]
    pub async fn mark_live_at(&self, username: &str, since: OffsetDateTime) -> Result<(), UserError> {
        let key = keys::living_since(username);
        self.on_cache("mark_live", &key, self.cache.set_live(username, since))
            .await?;
        info!("room live");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn mark_offline(&self, username: &str) -> Result<(), UserError> {
        let key = keys::living_since(username);
        self.on_cache("mark_offline", &key, self.cache.clear_live(username))
            .await?;
        info!("room offline");
        Ok(())
    }

    pub async fn is_live(&self, username: &str) -> Result<bool, UserError> {
        self.on_cache("is_live", keys::LIVING, self.cache.is_live(username))
            .await
    }

    pub async fn living_since(&self, username: &str) -> Result<Option<OffsetDateTime>, UserError> {
        let key = keys::living_since(username);
        self.on_cache("living_since", &key, self.cache.live_since(username))
            .await
    }

    /// A random sample of live usernames, at most `living_max` long.
    pub async fn list_living(&self, n: i64) -> Result<Vec<String>, UserError> {
        if n <= 0 {
            return Err(UserError::invalid(Field::Limit, "must be positive"));
        }
        let count = usize::try_from(n)
            .unwrap_or(usize::MAX)
            .min(self.limits.living_max);
        self.on_cache("list_living", keys::LIVING, self.cache.sample_live(count))
            .await
    }

    pub async fn record_watch(&self, viewer: i64, username: &str) -> Result<(), UserError> {
        self.record_watch_at(viewer, username, OffsetDateTime::now_utc())
            .await
    }

    #[instrument(skip(self))]
    pub async fn record_watch_at(
        &self,
        viewer: i64,
        username: &str,
        at: OffsetDateTime,
    ) -> Result<(), UserError> {
        let entry = HistoryEntry {
            username: username.to_owned(),
            watched_at: at,
        };
        let key = keys::history(viewer);
        let retain = self.limits.history_retain;
        self.on_cache("record_watch", &key, self.cache.push_history(viewer, &entry, retain))
            .await
    }

    /// Most recent entries first, repeats included.
    pub async fn history(&self, viewer: i64) -> Result<Vec<HistoryEntry>, UserError> {
        let key = keys::history(viewer);
        let limit = self.limits.history_len;
        self.on_cache("history", &key, self.cache.recent_history(viewer, limit))
            .await
    }
}
