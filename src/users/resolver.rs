use std::sync::Arc;

use tracing::{debug, instrument, warn};

use super::repo_types::{Lookup, User};
use crate::cache::keys;
use crate::directory::{bounded, Directory};
use crate::error::{Field, UserError};

impl Directory {
    /// Cache-aside read of a user by any of its identifiers.
    ///
    /// A cache hit is returned as is. On a miss the durable store answers and
    /// the cache is repaired in the background. A cache that cannot be reached
    /// is logged and skipped; `NotFound` is only ever reported once the
    /// durable store has answered that the user does not exist.
    #[instrument(skip_all, fields(%lookup))]
    pub async fn resolve(&self, lookup: Lookup) -> Result<User, UserError> {
        let key = keys::user(&lookup);
        let cache_ok = match self.on_cache("resolve", &key, self.cache.find_user(&lookup)).await {
            Ok(Some(user)) => {
                debug!(user_id = user.id, "cache hit");
                return Ok(user);
            }
            Ok(None) => true,
            Err(e) => {
                warn!(error = %e, "cache unavailable, reading durable store");
                false
            }
        };

        let user = self
            .on_store("resolve", &key, self.store.find(&lookup))
            .await?
            .ok_or(UserError::NotFound)?;
        debug!(user_id = user.id, "durable hit");

        if cache_ok {
            self.spawn_repair(user.clone());
        }
        Ok(user)
    }

    /// Fire-and-forget backfill. The caller never waits on it and its failure
    /// is only logged.
    fn spawn_repair(&self, user: User) {
        let cache = Arc::clone(&self.cache);
        let limit = self.limits.repair_timeout;
        tokio::spawn(async move {
            match bounded(limit, cache.fill_user(&user)).await {
                Ok(true) => debug!(user_id = user.id, "cache repaired"),
                Ok(false) => debug!(user_id = user.id, "record already cached, repair skipped"),
                Err(e) => warn!(user_id = user.id, error = %e, "cache repair failed"),
            }
        });
    }

    /// `Ok` when no user other than `owner` holds `lookup`.
    pub(crate) async fn ensure_unused(
        &self,
        lookup: Lookup,
        field: Field,
        owner: Option<i64>,
    ) -> Result<(), UserError> {
        match self.resolve(lookup).await {
            Ok(existing) if Some(existing.id) == owner => Ok(()),
            Ok(_) => Err(UserError::Conflict(field)),
            Err(UserError::NotFound) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
