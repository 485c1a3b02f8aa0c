use tracing::{error, info, instrument, warn};

use super::repo_types::{FieldChange, Lookup, NewUser, Profile, ProfileChange, User};
use super::validate;
use crate::cache::keys;
use crate::directory::{bounded, store_failure, Directory};
use crate::error::{Field, Tier, UserError};

impl Directory {
    /// Registers a user: durable insert first, then the cache bundle.
    ///
    /// A failed cache write leaves the user cold in the cache; the next
    /// `resolve` repairs it.
    #[instrument(skip_all, fields(username = %new.username))]
    pub async fn create_user(&self, new: NewUser) -> Result<i64, UserError> {
        validate::new_user(&new)?;

        self.ensure_unused(Lookup::Username(new.username.clone()), Field::Username, None)
            .await?;
        if let Some(email) = &new.email {
            self.ensure_unused(Lookup::Email(email.clone()), Field::Email, None)
                .await?;
        }
        if let Some(phone) = &new.phone {
            self.ensure_unused(Lookup::Phone(phone.clone()), Field::Phone, None)
                .await?;
        }

        let key = keys::user(&Lookup::Username(new.username.clone()));
        let user = self
            .write_store("create_user", &key, self.store.insert(&new))
            .await?;

        if let Err(e) = bounded(self.limits.call_timeout, self.cache.write_user(&user, &[])).await {
            warn!(user_id = user.id, error = %e, "user stored durably but not cached");
        }

        info!(user_id = user.id, "user created");
        Ok(user.id)
    }

    /// Applies a partial profile update and returns the new record.
    #[instrument(skip(self, change))]
    pub async fn update_profile(&self, id: i64, change: ProfileChange) -> Result<User, UserError> {
        validate::profile_change(&change)?;

        let current = self.resolve(Lookup::Id(id)).await?;
        let next = Profile::apply(&current, &change);
        if next == Profile::of(&current) {
            return Ok(current);
        }

        if let (FieldChange::Set(email), true) = (&change.email, next.email != current.email) {
            self.ensure_unused(Lookup::Email(email.clone()), Field::Email, Some(id))
                .await?;
        }
        if let (FieldChange::Set(phone), true) = (&change.phone, next.phone != current.phone) {
            self.ensure_unused(Lookup::Phone(phone.clone()), Field::Phone, Some(id))
                .await?;
        }

        let stale = next.stale_indexes(&current);
        let updated = self
            .write_store("update_profile", &keys::record(id), self.store.update_profile(id, &next))
            .await?
            .ok_or(UserError::NotFound)?;

        self.write_through("update_profile", &current, &updated, &stale)
            .await?;
        info!(user_id = id, dropped_indexes = stale.len(), "profile updated");
        Ok(updated)
    }

    /// Replaces the stored digest. The old one has been checked by the caller.
    #[instrument(skip(self, digest))]
    pub async fn change_password(&self, id: i64, digest: &str) -> Result<(), UserError> {
        validate::password(digest)?;

        let updated = self
            .on_store(
                "change_password",
                &keys::record(id),
                self.store.update_password(id, digest),
            )
            .await?
            .ok_or(UserError::NotFound)?;

        self.write_through("change_password", &updated, &updated, &[])
            .await?;
        info!(user_id = id, "password changed");
        Ok(())
    }

    /// Mirrors a completed durable write into the cache.
    ///
    /// If the bundle cannot be written the record and every index of both
    /// versions are evicted, so the next read repairs from the durable store
    /// instead of serving the old record.
    async fn write_through(
        &self,
        op: &'static str,
        previous: &User,
        updated: &User,
        stale: &[Lookup],
    ) -> Result<(), UserError> {
        let limit = self.limits.call_timeout;
        let Err(source) = bounded(limit, self.cache.write_user(updated, stale)).await else {
            return Ok(());
        };

        let mut indexes = previous.index_keys();
        for index in updated.index_keys() {
            if !indexes.contains(&index) {
                indexes.push(index);
            }
        }
        if let Err(e) = bounded(limit, self.cache.evict_user(updated.id, &indexes)).await {
            error!(user_id = updated.id, error = %e, "eviction after failed cache write also failed");
        }
        Err(store_failure(Tier::Cache, op, &keys::record(updated.id), source))
    }
}
