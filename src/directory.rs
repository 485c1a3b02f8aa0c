//! The identity core: one handle over both tiers.
//!
//! Operations are spread over the feature modules (`users`, `social`, `live`)
//! as `impl Directory` blocks. The handle is cheap to clone and holds no
//! mutable state of its own.

use std::{future::Future, sync::Arc, time::Duration};

use tracing::error;

use crate::cache::FastCache;
use crate::db::UserStore;
use crate::error::{Tier, TierError, UserError, WriteError};

#[derive(Debug, Clone)]
pub struct Limits {
    /// Bound for every individual tier call.
    pub call_timeout: Duration,
    /// Bound for the background cache repair after a durable hit.
    pub repair_timeout: Duration,
    pub living_max: usize,
    pub history_len: usize,
    pub history_retain: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_millis(400),
            repair_timeout: Duration::from_millis(800),
            living_max: 50,
            history_len: 32,
            history_retain: 256,
        }
    }
}

#[derive(Clone)]
pub struct Directory {
    pub(crate) cache: Arc<dyn FastCache>,
    pub(crate) store: Arc<dyn UserStore>,
    pub(crate) limits: Limits,
}

impl Directory {
    pub fn new(cache: Arc<dyn FastCache>, store: Arc<dyn UserStore>, limits: Limits) -> Self {
        Self {
            cache,
            store,
            limits,
        }
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Runs a cache call under the call timeout and tags any failure.
    pub(crate) async fn on_cache<T, F>(
        &self,
        op: &'static str,
        key: &str,
        call: F,
    ) -> Result<T, UserError>
    where
        F: Future<Output = Result<T, TierError>>,
    {
        bounded(self.limits.call_timeout, call)
            .await
            .map_err(|source| store_failure(Tier::Cache, op, key, source))
    }

    pub(crate) async fn on_store<T, F>(
        &self,
        op: &'static str,
        key: &str,
        call: F,
    ) -> Result<T, UserError>
    where
        F: Future<Output = Result<T, TierError>>,
    {
        bounded(self.limits.call_timeout, call)
            .await
            .map_err(|source| store_failure(Tier::Durable, op, key, source))
    }

    /// Durable write where a unique-constraint violation is an expected outcome.
    pub(crate) async fn write_store<T, F>(
        &self,
        op: &'static str,
        key: &str,
        call: F,
    ) -> Result<T, UserError>
    where
        F: Future<Output = Result<T, WriteError>>,
    {
        match bounded(self.limits.call_timeout, call).await {
            Ok(v) => Ok(v),
            Err(WriteError::Conflict(field)) => Err(UserError::Conflict(field)),
            Err(WriteError::Tier(source)) => Err(store_failure(Tier::Durable, op, key, source)),
        }
    }
}

/// A timeout is a tier failure like any other, never an absent value.
pub(crate) async fn bounded<T, E, F>(limit: Duration, call: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: From<TierError>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(TierError::Timeout(limit).into()),
    }
}

pub(crate) fn store_failure(tier: Tier, op: &'static str, key: &str, source: TierError) -> UserError {
    error!(op, %tier, key, error = %source, "tier call failed");
    UserError::Store { tier, op, source }
}
