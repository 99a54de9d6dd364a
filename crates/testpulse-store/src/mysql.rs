//! MySQL-backed store.
//!
//! All queries are parameterized through `sqlx`. The pool is fixed-size:
//! callers wait up to `acquire_timeout` for a connection and then get
//! [`StoreError::PoolTimeout`].

use std::time::Duration;

use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use tracing::{debug, info};

use crate::{Analytics, AnalyticsReader, StoreError, User, UserId, UserProfile, UserStore};

/// Pool sizing for [`MySqlStore::connect`].
#[derive(Debug, Clone)]
pub struct MySqlStoreOptions {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for MySqlStoreOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS teams (
        id INT AUTO_INCREMENT PRIMARY KEY,
        name VARCHAR(100) NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS users (
        id INT AUTO_INCREMENT PRIMARY KEY,
        username VARCHAR(50) UNIQUE NOT NULL,
        password VARCHAR(100) NOT NULL,
        team_id INT,
        avatar_url VARCHAR(255)
    )",
    "CREATE TABLE IF NOT EXISTS tests (
        id INT AUTO_INCREMENT PRIMARY KEY,
        user_id INT NOT NULL,
        status ENUM('passed', 'failed') NOT NULL,
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP
    )",
    "CREATE TABLE IF NOT EXISTS devices (
        id INT AUTO_INCREMENT PRIMARY KEY,
        name VARCHAR(100) NOT NULL,
        online BOOLEAN DEFAULT false
    )",
];

// MySQL returns SUM() as DECIMAL and INT columns as i32; the casts keep
// every column a BIGINT so rows decode into i64 uniformly.
const GLOBAL_SNAPSHOT: &str = "
    SELECT
        CAST(COUNT(*) AS SIGNED),
        CAST(COALESCE(SUM(status = 'passed'), 0) AS SIGNED),
        CAST(COALESCE(SUM(status = 'failed'), 0) AS SIGNED),
        (SELECT CAST(COUNT(*) AS SIGNED) FROM devices WHERE online = true)
    FROM tests";

const USER_SNAPSHOT: &str = "
    SELECT
        CAST(COUNT(*) AS SIGNED),
        CAST(COALESCE(SUM(status = 'passed'), 0) AS SIGNED),
        CAST(COALESCE(SUM(status = 'failed'), 0) AS SIGNED),
        (SELECT CAST(COUNT(*) AS SIGNED) FROM devices WHERE online = true)
    FROM tests
    WHERE user_id = ?";

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    username: String,
    password: String,
    team_id: Option<i64>,
    avatar_url: Option<String>,
}

#[derive(sqlx::FromRow)]
struct ProfileRow {
    id: i64,
    username: String,
    team_name: Option<String>,
    avatar_url: Option<String>,
}

/// A [`UserStore`] + [`AnalyticsReader`] over a MySQL connection pool.
#[derive(Debug, Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    /// Opens the pool and pings the database once, so an unreachable
    /// store fails at startup instead of on the first request.
    pub async fn connect(url: &str, options: &MySqlStoreOptions) -> Result<Self, StoreError> {
        let pool = MySqlPoolOptions::new()
            .max_connections(options.max_connections)
            .acquire_timeout(options.acquire_timeout)
            .connect(url)
            .await?;

        sqlx::query("SELECT 1").execute(&pool).await?;
        info!(
            max_connections = options.max_connections,
            "connected to MySQL"
        );
        Ok(Self { pool })
    }

    /// Wraps an existing pool.
    pub fn from_pool(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Creates the `teams`, `users`, `tests` and `devices` tables if they
    /// don't exist yet.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        info!(tables = SCHEMA.len(), "schema ensured");
        Ok(())
    }

    /// Closes every pooled connection. Used on shutdown.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn to_analytics((total, passed, failed, online): (i64, i64, i64, i64)) -> Analytics {
    let count = |n: i64| u64::try_from(n).unwrap_or(0);
    Analytics {
        total_tests: count(total),
        passed: count(passed),
        failed: count(failed),
        devices_online: count(online),
    }
}

impl UserStore for MySqlStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT CAST(id AS SIGNED) AS id, username, password,
                    CAST(team_id AS SIGNED) AS team_id, avatar_url
             FROM users
             WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| User {
            id: UserId(r.id),
            username: r.username,
            password_hash: r.password,
            team_id: r.team_id,
            avatar_url: r.avatar_url,
        }))
    }

    async fn profile(&self, id: UserId) -> Result<Option<UserProfile>, StoreError> {
        let row: Option<ProfileRow> = sqlx::query_as(
            "SELECT CAST(u.id AS SIGNED) AS id, u.username, t.name AS team_name, u.avatar_url
             FROM users u
             LEFT JOIN teams t ON u.team_id = t.id
             WHERE u.id = ?",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| UserProfile {
            id: UserId(r.id),
            username: r.username,
            team_name: r.team_name,
            avatar_url: r.avatar_url,
        }))
    }
}

impl AnalyticsReader for MySqlStore {
    async fn global_snapshot(&self) -> Result<Analytics, StoreError> {
        let row: (i64, i64, i64, i64) = sqlx::query_as(GLOBAL_SNAPSHOT)
            .fetch_one(&self.pool)
            .await?;
        debug!(total = row.0, "global snapshot");
        Ok(to_analytics(row))
    }

    async fn user_snapshot(&self, id: UserId) -> Result<Analytics, StoreError> {
        let row: (i64, i64, i64, i64) = sqlx::query_as(USER_SNAPSHOT)
            .bind(id.0)
            .fetch_one(&self.pool)
            .await?;
        debug!(%id, total = row.0, "user snapshot");
        Ok(to_analytics(row))
    }
}
