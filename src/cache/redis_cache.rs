use async_trait::async_trait;
use lazy_static::lazy_static;
use redis::{aio::ConnectionManager, AsyncCommands};
use serde::{Deserialize, Serialize};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::{debug, warn};

use super::{keys, version, Edge, FastCache};
use crate::error::TierError;
use crate::live::repo_types::HistoryEntry;
use crate::users::repo_types::{Lookup, User};

lazy_static! {
    /// KEYS[1] is the record key, the remaining keys are the new index
    /// entries. ARGV[1] is the envelope, ARGV[2] the user id, ARGV[3] its
    /// version, ARGV[4..] caller-known stale index keys.
    static ref WRITE_USER: redis::Script = redis::Script::new(
        r#"
        local id = ARGV[2]
        local function drop(key)
            if redis.call('GET', key) == id then
                redis.call('DEL', key)
            end
        end
        local cached = redis.call('GET', KEYS[1])
        if cached then
            local replaced = cjson.decode(cached)
            if tonumber(replaced.v) > tonumber(ARGV[3]) then
                return 0
            end
            for _, kind in ipairs({'username', 'email', 'phone'}) do
                local value = replaced.user[kind]
                if type(value) == 'string' then
                    drop('user:' .. kind .. ':' .. value)
                end
            end
        end
        for i = 4, #ARGV do
            drop(ARGV[i])
        end
        redis.call('SET', KEYS[1], ARGV[1])
        for i = 2, #KEYS do
            redis.call('SET', KEYS[i], id)
        end
        return 1
        "#,
    );

    /// Same layout as WRITE_USER without the stale keys, applied only while
    /// the record key is absent.
    static ref FILL_USER: redis::Script = redis::Script::new(
        r#"
        if redis.call('EXISTS', KEYS[1]) == 1 then
            return 0
        end
        redis.call('SET', KEYS[1], ARGV[1])
        for i = 2, #KEYS do
            redis.call('SET', KEYS[i], ARGV[2])
        end
        return 1
        "#,
    );

    /// Deletes KEYS[1] only while it still holds ARGV[1].
    static ref DROP_INDEX: redis::Script = redis::Script::new(
        r#"
        if redis.call('GET', KEYS[1]) == ARGV[1] then
            return redis.call('DEL', KEYS[1])
        end
        return 0
        "#,
    );
}

/// What is stored under `user:id:<id>`. The version sits beside the record
/// so the write script can compare it without parsing timestamps.
#[derive(Serialize)]
struct EnvelopeRef<'a> {
    v: i64,
    user: &'a User,
}

#[derive(Deserialize)]
struct Envelope {
    user: User,
}

fn envelope(user: &User) -> Result<String, TierError> {
    Ok(serde_json::to_string(&EnvelopeRef {
        v: version(user),
        user,
    })?)
}

/// Keys of a record bundle: the record first, then every present index.
fn bundle_keys(user: &User) -> Vec<String> {
    let mut keys_ = vec![keys::record(user.id)];
    keys_.extend(user.index_keys().iter().map(keys::user));
    keys_
}

/// `ZREMRANGEBYRANK` bounds that keep the newest `retain` members of a
/// score-ascending set. `None` keeps everything.
fn trim_range(retain: usize) -> Option<(isize, isize)> {
    (retain > 0).then(|| (0, -(retain as isize) - 1))
}

/// Redis-backed Fast Cache. Record writes are Lua scripts, the other
/// multi-key writes go through `MULTI/EXEC`.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    pub async fn connect(url: &str) -> Result<Self, TierError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<(), TierError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

#[async_trait]
impl FastCache for RedisCache {
    async fn find_user(&self, lookup: &Lookup) -> Result<Option<User>, TierError> {
        let mut conn = self.conn.clone();
        let id = match lookup {
            Lookup::Id(id) => *id,
            index => match conn.get::<_, Option<i64>>(keys::user(index)).await? {
                Some(id) => id,
                None => return Ok(None),
            },
        };
        let raw: Option<String> = conn.get(keys::record(id)).await?;
        let Some(json) = raw else {
            if !matches!(lookup, Lookup::Id(_)) {
                debug!(%lookup, id, "index entry without record");
            }
            return Ok(None);
        };
        let Envelope { user } = serde_json::from_str(&json)?;
        if user.holds(lookup) {
            return Ok(Some(user));
        }
        debug!(%lookup, id, "dropping dangling index entry");
        let _: i64 = DROP_INDEX
            .key(keys::user(lookup))
            .arg(id)
            .invoke_async(&mut conn)
            .await?;
        Ok(None)
    }

    async fn write_user(&self, user: &User, stale: &[Lookup]) -> Result<(), TierError> {
        let mut invocation = WRITE_USER.prepare_invoke();
        for key in bundle_keys(user) {
            invocation.key(key);
        }
        invocation.arg(envelope(user)?).arg(user.id).arg(version(user));
        for index in stale {
            invocation.arg(keys::user(index));
        }
        let mut conn = self.conn.clone();
        let written: i64 = invocation.invoke_async(&mut conn).await?;
        if written == 0 {
            debug!(user_id = user.id, "newer record already cached, write skipped");
        }
        Ok(())
    }

    async fn fill_user(&self, user: &User) -> Result<bool, TierError> {
        let mut invocation = FILL_USER.prepare_invoke();
        for key in bundle_keys(user) {
            invocation.key(key);
        }
        invocation.arg(envelope(user)?).arg(user.id);
        let mut conn = self.conn.clone();
        let written: i64 = invocation.invoke_async(&mut conn).await?;
        Ok(written == 1)
    }

    async fn evict_user(&self, id: i64, indexes: &[Lookup]) -> Result<(), TierError> {
        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.del(keys::record(id)).ignore();
        for index in indexes {
            pipe.del(keys::user(index)).ignore();
        }
        let mut conn = self.conn.clone();
        let () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn link(&self, follower: &str, followee: &str) -> Result<(), TierError> {
        let mut pipe = redis::pipe();
        pipe.atomic()
            .sadd(keys::edge(Edge::Followers, followee), follower)
            .ignore()
            .sadd(keys::edge(Edge::Followings, follower), followee)
            .ignore();
        let mut conn = self.conn.clone();
        let () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn unlink(&self, follower: &str, followee: &str) -> Result<(), TierError> {
        let mut pipe = redis::pipe();
        pipe.atomic()
            .srem(keys::edge(Edge::Followers, followee), follower)
            .ignore()
            .srem(keys::edge(Edge::Followings, follower), followee)
            .ignore();
        let mut conn = self.conn.clone();
        let () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn members(&self, edge: Edge, username: &str) -> Result<Vec<String>, TierError> {
        let mut conn = self.conn.clone();
        Ok(conn.smembers(keys::edge(edge, username)).await?)
    }

    async fn count(&self, edge: Edge, username: &str) -> Result<u64, TierError> {
        let mut conn = self.conn.clone();
        Ok(conn.scard(keys::edge(edge, username)).await?)
    }

    async fn set_live(&self, username: &str, since: OffsetDateTime) -> Result<(), TierError> {
        let since = since.format(&Rfc3339)?;
        let mut pipe = redis::pipe();
        pipe.atomic()
            .sadd(keys::LIVING, username)
            .ignore()
            .set(keys::living_since(username), since)
            .ignore();
        let mut conn = self.conn.clone();
        let () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn clear_live(&self, username: &str) -> Result<(), TierError> {
        let mut pipe = redis::pipe();
        pipe.atomic()
            .srem(keys::LIVING, username)
            .ignore()
            .del(keys::living_since(username))
            .ignore();
        let mut conn = self.conn.clone();
        let () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn is_live(&self, username: &str) -> Result<bool, TierError> {
        let mut conn = self.conn.clone();
        Ok(conn.sismember(keys::LIVING, username).await?)
    }

    async fn live_since(&self, username: &str) -> Result<Option<OffsetDateTime>, TierError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(keys::living_since(username)).await?;
        match raw {
            Some(s) => Ok(Some(OffsetDateTime::parse(&s, &Rfc3339)?)),
            None => Ok(None),
        }
    }

    async fn sample_live(&self, count: usize) -> Result<Vec<String>, TierError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let members: Vec<String> = redis::cmd("SRANDMEMBER")
            .arg(keys::LIVING)
            .arg(count)
            .query_async(&mut conn)
            .await?;
        Ok(members)
    }

    async fn push_history(
        &self,
        viewer: i64,
        entry: &HistoryEntry,
        retain: usize,
    ) -> Result<(), TierError> {
        let key = keys::history(viewer);
        let mut pipe = redis::pipe();
        pipe.atomic()
            .zadd(
                &key,
                keys::history_member(&entry.username),
                entry.watched_at.unix_timestamp(),
            )
            .ignore();
        if let Some((start, stop)) = trim_range(retain) {
            pipe.zremrangebyrank(&key, start, stop).ignore();
        }
        let mut conn = self.conn.clone();
        let () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn recent_history(
        &self,
        viewer: i64,
        limit: usize,
    ) -> Result<Vec<HistoryEntry>, TierError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let rows: Vec<(String, i64)> = conn
            .zrevrange_withscores(keys::history(viewer), 0, limit as isize - 1)
            .await?;
        let entries = rows
            .into_iter()
            .filter_map(|(member, score)| {
                let username = keys::history_username(&member)?;
                match OffsetDateTime::from_unix_timestamp(score) {
                    Ok(watched_at) => Some(HistoryEntry {
                        username: username.to_owned(),
                        watched_at,
                    }),
                    Err(e) => {
                        warn!(viewer, %member, error = %e, "skipping history entry with bad score");
                        None
                    }
                }
            })
            .collect();
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trim_keeps_the_newest_retain_members() {
        assert_eq!(trim_range(0), None);
        assert_eq!(trim_range(1), Some((0, -2)));
        assert_eq!(trim_range(256), Some((0, -257)));
    }

    #[test]
    fn envelope_carries_the_version() {
        let user = User {
            id: 3,
            username: "carl".into(),
            password: "0".repeat(64),
            email: None,
            phone: Some("+15550100".into()),
            room: None,
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: OffsetDateTime::from_unix_timestamp(2).unwrap(),
            deleted_at: None,
        };
        let value: serde_json::Value = serde_json::from_str(&envelope(&user).unwrap()).unwrap();
        assert_eq!(value["v"], 2_000_000);
        assert_eq!(value["user"]["phone"], "+15550100");
        assert!(value["user"]["email"].is_null());
        assert_eq!(
            bundle_keys(&user),
            ["user:id:3", "user:username:carl", "user:phone:+15550100"]
        );
    }

    /// Needs a disposable Redis, e.g. `REDIS_URL=redis://127.0.0.1:6379/15`.
    #[tokio::test]
    #[ignore]
    async fn against_a_live_redis() {
        // Ids and names far from anything a dev database would hold.
        let url = std::env::var("REDIS_URL").expect("REDIS_URL");
        let cache = RedisCache::connect(&url).await.unwrap();
        cache.ping().await.unwrap();

        let id = 9_000_000 + i64::from(rand::random::<u16>());
        let name = format!("itest{id}");
        let mut first = User {
            id,
            username: name.clone(),
            password: "0".repeat(64),
            email: Some(format!("{name}@x.com")),
            phone: None,
            room: None,
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: OffsetDateTime::from_unix_timestamp(10).unwrap(),
            deleted_at: None,
        };
        let email = Lookup::Email(format!("{name}@x.com"));
        cache.evict_user(id, &first.index_keys()).await.unwrap();

        assert!(cache.fill_user(&first).await.unwrap());
        assert!(!cache.fill_user(&first).await.unwrap());
        assert_eq!(cache.find_user(&email).await.unwrap(), Some(first.clone()));

        // A newer version moves the email and drops the old index.
        let mut second = first.clone();
        second.email = Some(format!("{name}@y.com"));
        second.updated_at = OffsetDateTime::from_unix_timestamp(11).unwrap();
        cache.write_user(&second, &[]).await.unwrap();
        assert_eq!(cache.find_user(&email).await.unwrap(), None);
        let mut conn = cache.conn.clone();
        let left: Option<i64> = conn.get(keys::user(&email)).await.unwrap();
        assert_eq!(left, None);

        // An older version is refused.
        first.phone = Some("+15550199".into());
        cache.write_user(&first, &[]).await.unwrap();
        assert_eq!(cache.find_user(&Lookup::Id(id)).await.unwrap(), Some(second.clone()));

        // A dangling index entry is a miss and is dropped.
        let () = conn.set(keys::user(&email), id).await.unwrap();
        assert_eq!(cache.find_user(&email).await.unwrap(), None);
        let left: Option<i64> = conn.get(keys::user(&email)).await.unwrap();
        assert_eq!(left, None);

        let viewer = -id;
        let at = |secs| HistoryEntry {
            username: name.clone(),
            watched_at: OffsetDateTime::from_unix_timestamp(secs).unwrap(),
        };
        for secs in 0..5 {
            cache.push_history(viewer, &at(secs), 3).await.unwrap();
        }
        let history = cache.recent_history(viewer, 10).await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].watched_at.unix_timestamp(), 4);

        cache.set_live(&name, OffsetDateTime::UNIX_EPOCH).await.unwrap();
        assert!(cache.sample_live(1_000).await.unwrap().contains(&name));
        cache.clear_live(&name).await.unwrap();
        assert!(!cache.is_live(&name).await.unwrap());

        cache.evict_user(id, &second.index_keys()).await.unwrap();
        let () = conn.del(keys::history(viewer)).await.unwrap();
    }
}
