use async_trait::async_trait;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use time::OffsetDateTime;

use super::UserStore;
use crate::error::{TierError, WriteError};
use crate::users::repo_types::{Lookup, NewUser, Profile, Room, User};

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

/// Joined `users` + `rooms` row.
#[derive(Debug, FromRow)]
struct UserRow {
    id: i64,
    username: String,
    password: String,
    email: Option<String>,
    phone: Option<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
    deleted_at: Option<OffsetDateTime>,
    has_room: bool,
    room_name: Option<String>,
    room_intro: Option<String>,
}

impl From<UserRow> for User {
    fn from(r: UserRow) -> Self {
        let room = r.has_room.then(|| Room {
            name: r.room_name,
            intro: r.room_intro,
        });
        Self {
            id: r.id,
            username: r.username,
            password: r.password,
            email: r.email,
            phone: r.phone,
            room,
            created_at: r.created_at,
            updated_at: r.updated_at,
            deleted_at: r.deleted_at,
        }
    }
}

fn select_where(column: &str) -> String {
    format!(
        r#"
        SELECT u.id, u.username, u.password, u.email, u.phone,
               u.created_at, u.updated_at, u.deleted_at,
               (r.user_id IS NOT NULL) AS has_room,
               r.name AS room_name, r.intro AS room_intro
          FROM users u
          LEFT JOIN rooms r ON r.user_id = u.id
         WHERE u.deleted_at IS NULL AND {column} = $1
        "#
    )
}

fn column(lookup: &Lookup) -> &'static str {
    match lookup {
        Lookup::Id(_) => "u.id",
        Lookup::Username(_) => "u.username",
        Lookup::Email(_) => "u.email",
        Lookup::Phone(_) => "u.phone",
    }
}

async fn fetch_by_id_tx(
    tx: &mut Transaction<'_, Postgres>,
    id: i64,
) -> Result<User, sqlx::Error> {
    let row = sqlx::query_as::<_, UserRow>(&select_where("u.id"))
        .bind(id)
        .fetch_one(&mut **tx)
        .await?;
    Ok(row.into())
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find(&self, lookup: &Lookup) -> Result<Option<User>, TierError> {
        let sql = select_where(column(lookup));
        let query = sqlx::query_as::<_, UserRow>(&sql);
        let query = match lookup {
            Lookup::Id(id) => query.bind(*id),
            Lookup::Username(v) | Lookup::Email(v) | Lookup::Phone(v) => query.bind(v.as_str()),
        };
        let row = query.fetch_optional(&self.db).await?;
        Ok(row.map(User::from))
    }

    async fn insert(&self, user: &NewUser) -> Result<User, WriteError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (username, password, email, phone)
            VALUES ($1, $2, $3, $4)
            RETURNING id, username, password, email, phone,
                      created_at, updated_at, deleted_at,
                      FALSE AS has_room,
                      NULL::VARCHAR AS room_name, NULL::VARCHAR AS room_intro
            "#,
        )
        .bind(&user.username)
        .bind(&user.password)
        .bind(user.email.as_deref())
        .bind(user.phone.as_deref())
        .fetch_one(&self.db)
        .await?;
        Ok(row.into())
    }

    async fn update_profile(&self, id: i64, profile: &Profile) -> Result<Option<User>, WriteError> {
        let mut tx = self.db.begin().await?;

        // Read after the row lock is taken, so `updated_at` orders the writes
        // to one row. The cache relies on that to refuse older records.
        let updated = sqlx::query(
            r#"
            UPDATE users
               SET email = $2, phone = $3, updated_at = clock_timestamp()
             WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .bind(profile.email.as_deref())
        .bind(profile.phone.as_deref())
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        if let Some(room) = &profile.room {
            sqlx::query(
                r#"
                INSERT INTO rooms (user_id, name, intro)
                VALUES ($1, $2, $3)
                ON CONFLICT (user_id)
                DO UPDATE SET name = EXCLUDED.name, intro = EXCLUDED.intro, updated_at = now()
                "#,
            )
            .bind(id)
            .bind(room.name.as_deref())
            .bind(room.intro.as_deref())
            .execute(&mut *tx)
            .await?;
        }

        let user = fetch_by_id_tx(&mut tx, id).await?;
        tx.commit().await?;
        Ok(Some(user))
    }

    async fn update_password(&self, id: i64, digest: &str) -> Result<Option<User>, TierError> {
        let mut tx = self.db.begin().await?;
        let updated = sqlx::query(
            r#"
            UPDATE users
               SET password = $2, updated_at = clock_timestamp()
             WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .bind(digest)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }
        let user = fetch_by_id_tx(&mut tx, id).await?;
        tx.commit().await?;
        Ok(Some(user))
    }
}
