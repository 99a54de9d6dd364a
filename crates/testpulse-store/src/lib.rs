//! Storage seam for Testpulse.
//!
//! Two traits describe everything the server reads from its database:
//!
//! - [`UserStore`]: credential lookup by username and profile lookup by id.
//! - [`AnalyticsReader`]: aggregate test/device counts.
//!
//! Both are implemented by [`MySqlStore`] (production, behind the `mysql`
//! feature) and [`MemoryStore`] (tests and local development).
//!
//! Nothing here caches. Every snapshot is one fresh aggregate read.

mod error;
mod memory;
#[cfg(feature = "mysql")]
mod mysql;

use std::fmt;
use std::future::Future;

pub use error::StoreError;
pub use memory::MemoryStore;
#[cfg(feature = "mysql")]
pub use mysql::{MySqlStore, MySqlStoreOptions};
pub use testpulse_protocol::{Analytics, UserData, UserId};

/// A row of the `users` table.
#[derive(Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    /// bcrypt hash, as stored.
    pub password_hash: String,
    pub team_id: Option<i64>,
    pub avatar_url: Option<String>,
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("team_id", &self.team_id)
            .field("avatar_url", &self.avatar_url)
            .finish_non_exhaustive()
    }
}

/// A user joined with their team, ready to be shown to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub id: UserId,
    pub username: String,
    pub team_name: Option<String>,
    pub avatar_url: Option<String>,
}

impl From<UserProfile> for UserData {
    fn from(profile: UserProfile) -> Self {
        Self {
            id: profile.id,
            username: profile.username,
            team_name: profile.team_name.unwrap_or_default(),
            avatar_url: profile.avatar_url.unwrap_or_default(),
        }
    }
}

/// Outcome of a recorded test run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestOutcome {
    Passed,
    Failed,
}

impl TestOutcome {
    /// The value stored in the `tests.status` column.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
        }
    }
}

/// Looks up users.
///
/// `Send + Sync + 'static` so one store can be shared through an `Arc`
/// by every session on the server.
pub trait UserStore: Send + Sync + 'static {
    /// Returns the user with this exact username, or `None`.
    fn find_by_username(
        &self,
        username: &str,
    ) -> impl Future<Output = Result<Option<User>, StoreError>> + Send;

    /// Returns the user's profile (team name resolved), or `None`.
    fn profile(
        &self,
        id: UserId,
    ) -> impl Future<Output = Result<Option<UserProfile>, StoreError>> + Send;
}

/// Computes analytics snapshots.
pub trait AnalyticsReader: Send + Sync + 'static {
    /// Counts over every test in the store.
    fn global_snapshot(&self) -> impl Future<Output = Result<Analytics, StoreError>> + Send;

    /// Counts over the tests of one user. `devices_online` stays global
    /// because devices aren't owned by users.
    fn user_snapshot(
        &self,
        id: UserId,
    ) -> impl Future<Output = Result<Analytics, StoreError>> + Send;
}
