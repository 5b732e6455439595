use std::str::FromStr;
use std::time::Duration;

use chrono::Utc;
use nanoid::nanoid;
use sqlx::query::QueryAs;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Sqlite;
use tracing::info;

use crate::error::AppError;
use crate::filter::{Fragment, Predicate, SqlValue, contains_pattern};
use crate::models::{User, UserSearch};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        username TEXT NOT NULL UNIQUE,
        display_name TEXT NOT NULL,
        avatar TEXT,
        is_verified BOOLEAN NOT NULL DEFAULT 0,
        is_admin BOOLEAN NOT NULL DEFAULT 0,
        created_at DATETIME NOT NULL
    );",
    "CREATE TABLE IF NOT EXISTS locations (
        id TEXT PRIMARY KEY,
        address TEXT,
        city TEXT NOT NULL,
        place_name TEXT,
        search_city TEXT NOT NULL,
        search_address TEXT,
        longitude REAL NOT NULL,
        latitude REAL NOT NULL,
        created_at DATETIME NOT NULL,
        updated_at DATETIME NOT NULL
    );",
    "CREATE TABLE IF NOT EXISTS events (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        description TEXT NOT NULL,
        search_title TEXT NOT NULL,
        search_description TEXT NOT NULL,
        start_time DATETIME NOT NULL,
        end_time DATETIME,
        photo_urls TEXT NOT NULL DEFAULT '[]',
        event_type TEXT NOT NULL,
        event_properties TEXT NOT NULL DEFAULT '[]',
        payment_type TEXT NOT NULL,
        price REAL,
        currency TEXT,
        posted_date DATETIME NOT NULL,
        is_verified BOOLEAN NOT NULL DEFAULT 0,
        is_private BOOLEAN NOT NULL DEFAULT 0,
        max_participants INTEGER,
        tags TEXT NOT NULL DEFAULT '[]',
        status TEXT NOT NULL,
        age_restriction INTEGER,
        location_id TEXT NOT NULL REFERENCES locations (id),
        organizer_id TEXT NOT NULL REFERENCES users (id) ON DELETE CASCADE,
        created_at DATETIME NOT NULL,
        updated_at DATETIME NOT NULL
    );",
    "CREATE INDEX IF NOT EXISTS idx_events_start_time ON events (start_time);",
    "CREATE INDEX IF NOT EXISTS idx_events_organizer ON events (organizer_id);",
    "CREATE TABLE IF NOT EXISTS event_participants (
        event_id TEXT NOT NULL REFERENCES events (id) ON DELETE CASCADE,
        user_id TEXT NOT NULL REFERENCES users (id) ON DELETE CASCADE,
        PRIMARY KEY (event_id, user_id)
    );",
    "CREATE TABLE IF NOT EXISTS event_favorites (
        event_id TEXT NOT NULL REFERENCES events (id) ON DELETE CASCADE,
        user_id TEXT NOT NULL REFERENCES users (id) ON DELETE CASCADE,
        PRIMARY KEY (event_id, user_id)
    );",
];

pub async fn connect(database_url: &str, max_connections: u32) -> Result<SqlitePool, AppError> {
    let connect_options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(connect_options)
        .await?;
    Ok(pool)
}

pub async fn init_schema(pool: &SqlitePool) -> Result<(), AppError> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

/// Binds predicate parameters onto a query, in placeholder order.
pub fn bind_params<'q, O>(
    mut query: QueryAs<'q, Sqlite, O, SqliteArguments<'q>>,
    params: &[SqlValue],
) -> QueryAs<'q, Sqlite, O, SqliteArguments<'q>> {
    for value in params {
        query = match value {
            SqlValue::Text(v) => query.bind(v.clone()),
            SqlValue::Real(v) => query.bind(*v),
            SqlValue::Integer(v) => query.bind(*v),
            SqlValue::Bool(v) => query.bind(*v),
            SqlValue::Timestamp(v) => query.bind(*v),
        };
    }
    query
}

/// Maps a foreign key failure on an insert to a missing user.
fn missing_user(err: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_foreign_key_violation() {
            return AppError::not_found("user");
        }
    }
    AppError::Store(err)
}

pub struct NewUser<'a> {
    pub username: &'a str,
    pub display_name: &'a str,
    pub avatar: Option<&'a str>,
    pub is_admin: bool,
}

pub async fn create_user(pool: &SqlitePool, user: NewUser<'_>) -> Result<User, AppError> {
    sqlx::query_as(
        "INSERT INTO users (id, username, display_name, avatar, is_verified, is_admin, created_at)
         VALUES (?, ?, ?, ?, 0, ?, ?) RETURNING *",
    )
    .bind(nanoid!())
    .bind(user.username)
    .bind(user.display_name)
    .bind(user.avatar)
    .bind(user.is_admin)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
    .map_err(|err| {
        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() {
                return AppError::Conflict(format!("username `{}` is already taken", user.username));
            }
        }
        AppError::Store(err)
    })
}

pub async fn find_user(pool: &SqlitePool, id: &str) -> Result<Option<User>, AppError> {
    sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::from)
}

pub async fn find_user_by_name(pool: &SqlitePool, username: &str) -> Result<Option<User>, AppError> {
    sqlx::query_as("SELECT * FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(pool)
        .await
        .map_err(AppError::from)
}

pub async fn promote_admin(pool: &SqlitePool, id: &str) -> Result<(), AppError> {
    sqlx::query("UPDATE users SET is_admin = 1 WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_user_verified(
    pool: &SqlitePool,
    id: &str,
    is_verified: bool,
) -> Result<Option<User>, AppError> {
    sqlx::query_as("UPDATE users SET is_verified = ? WHERE id = ? RETURNING *")
        .bind(is_verified)
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::from)
}

pub const MAX_PAGE_SIZE: i64 = 100;

pub async fn search_users(pool: &SqlitePool, search: &UserSearch) -> Result<Vec<User>, AppError> {
    let mut predicate = Predicate::default();
    if let Some(username) = search.username.as_deref().filter(|u| !u.trim().is_empty()) {
        predicate.and(
            Fragment::new("username LIKE ")
                .bind(contains_pattern(username.trim()))
                .push(" ESCAPE '\\'"),
        );
    }
    if let Some(is_verified) = search.is_verified {
        predicate.and(Fragment::new("is_verified = ").bind(is_verified));
    }

    let take = search.take.unwrap_or(10).clamp(1, MAX_PAGE_SIZE);
    let skip = search.skip.unwrap_or(0).max(0);
    let sql = format!(
        "SELECT * FROM users{} ORDER BY created_at DESC, id LIMIT ? OFFSET ?",
        predicate.where_clause()
    );

    bind_params(sqlx::query_as(&sql), predicate.params())
        .bind(take)
        .bind(skip)
        .fetch_all(pool)
        .await
        .map_err(AppError::from)
}

pub async fn event_exists(pool: &SqlitePool, event_id: &str) -> Result<bool, AppError> {
    let found: Option<(String,)> = sqlx::query_as("SELECT id FROM events WHERE id = ?")
        .bind(event_id)
        .fetch_optional(pool)
        .await?;
    Ok(found.is_some())
}

/// Returns `false` when the pair was already present.
pub async fn insert_favorite(pool: &SqlitePool, event_id: &str, user_id: &str) -> Result<bool, AppError> {
    let result = sqlx::query("INSERT OR IGNORE INTO event_favorites (event_id, user_id) VALUES (?, ?)")
        .bind(event_id)
        .bind(user_id)
        .execute(pool)
        .await
        .map_err(missing_user)?;
    Ok(result.rows_affected() == 1)
}

pub async fn delete_favorite(pool: &SqlitePool, event_id: &str, user_id: &str) -> Result<bool, AppError> {
    let result = sqlx::query("DELETE FROM event_favorites WHERE event_id = ? AND user_id = ?")
        .bind(event_id)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() == 1)
}

#[derive(Debug, sqlx::FromRow)]
pub struct Attendance {
    pub max_participants: Option<i64>,
    pub participant_count: i64,
    pub is_participant: bool,
}

pub enum JoinOutcome {
    Joined,
    AlreadyJoined,
    Full,
    MissingEvent,
}

/// Checks capacity and membership and inserts in one transaction. The write
/// lock is taken up front, so concurrent joins wait on the busy timeout.
pub async fn join_event(pool: &SqlitePool, event_id: &str, user_id: &str) -> Result<JoinOutcome, AppError> {
    let mut tx = pool.begin_with("BEGIN IMMEDIATE").await?;

    let attendance: Option<Attendance> = sqlx::query_as(
        "SELECT e.max_participants,
                (SELECT COUNT(*) FROM event_participants WHERE event_id = e.id) AS participant_count,
                EXISTS (SELECT 1 FROM event_participants WHERE event_id = e.id AND user_id = ?) AS is_participant
         FROM events e WHERE e.id = ?",
    )
    .bind(user_id)
    .bind(event_id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(attendance) = attendance else {
        return Ok(JoinOutcome::MissingEvent);
    };
    if attendance.is_participant {
        return Ok(JoinOutcome::AlreadyJoined);
    }
    if attendance
        .max_participants
        .is_some_and(|max| attendance.participant_count >= max)
    {
        return Ok(JoinOutcome::Full);
    }

    sqlx::query("INSERT INTO event_participants (event_id, user_id) VALUES (?, ?)")
        .bind(event_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .map_err(missing_user)?;
    tx.commit().await?;
    Ok(JoinOutcome::Joined)
}

pub async fn leave_event(pool: &SqlitePool, event_id: &str, user_id: &str) -> Result<bool, AppError> {
    let result = sqlx::query("DELETE FROM event_participants WHERE event_id = ? AND user_id = ?")
        .bind(event_id)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() == 1)
}

/// Creates the configured admin account, or promotes it if it already exists.
pub async fn seed_admin(pool: &SqlitePool, username: &str) -> Result<(), AppError> {
    match find_user_by_name(pool, username).await? {
        Some(user) if user.is_admin => {}
        Some(user) => {
            promote_admin(pool, &user.id).await?;
            info!(username, "promoted existing user to admin");
        }
        None => {
            create_user(
                pool,
                NewUser {
                    username,
                    display_name: username,
                    avatar: None,
                    is_admin: true,
                },
            )
            .await?;
            info!(username, "created admin user");
        }
    }
    Ok(())
}
