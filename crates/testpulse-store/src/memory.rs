//! In-memory store used by tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::RwLock;

use crate::{Analytics, AnalyticsReader, StoreError, TestOutcome, User, UserId, UserProfile, UserStore};

#[derive(Debug, Default)]
struct Tables {
    teams: HashMap<i64, String>,
    users: Vec<User>,
    tests: Vec<(UserId, TestOutcome)>,
    devices: Vec<(String, bool)>,
}

/// A [`UserStore`] + [`AnalyticsReader`] backed by plain collections.
///
/// Mirrors the MySQL semantics: usernames are unique, a missing team
/// reads as no team, and the snapshot counts only online devices.
/// [`set_unavailable`](Self::set_unavailable) makes every read fail, to
/// exercise error paths.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a user and returns their id. Ids start at 1.
    ///
    /// Replaces an existing user with the same username, keeping the
    /// unique-username rule.
    pub async fn insert_user(&self, username: &str, password_hash: &str) -> UserId {
        let mut tables = self.tables.write().await;
        tables.users.retain(|u| u.username != username);
        let next = tables.users.iter().map(|u| u.id.0).max().unwrap_or(0) + 1;
        let id = UserId(next);
        tables.users.push(User {
            id,
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            team_id: None,
            avatar_url: None,
        });
        id
    }

    /// Adds a team and returns its id.
    pub async fn add_team(&self, name: &str) -> i64 {
        let mut tables = self.tables.write().await;
        let id = tables.teams.keys().max().copied().unwrap_or(0) + 1;
        tables.teams.insert(id, name.to_string());
        id
    }

    /// Sets a user's team and avatar. Unknown users are ignored.
    pub async fn update_profile(&self, user: UserId, team_id: Option<i64>, avatar_url: Option<&str>) {
        let mut tables = self.tables.write().await;
        if let Some(u) = tables.users.iter_mut().find(|u| u.id == user) {
            u.team_id = team_id;
            u.avatar_url = avatar_url.map(str::to_string);
        }
    }

    pub async fn record_test(&self, user: UserId, outcome: TestOutcome) {
        self.tables.write().await.tests.push((user, outcome));
    }

    pub async fn add_device(&self, name: &str, online: bool) {
        self.tables.write().await.devices.push((name.to_string(), online));
    }

    /// While set, every read returns [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store switched off".into()));
        }
        Ok(())
    }

    async fn snapshot(&self, user: Option<UserId>) -> Result<Analytics, StoreError> {
        self.check_available()?;
        let tables = self.tables.read().await;

        let mut analytics = Analytics::default();
        for (_, outcome) in tables
            .tests
            .iter()
            .filter(|(owner, _)| user.is_none_or(|u| u == *owner))
        {
            analytics.total_tests += 1;
            match outcome {
                TestOutcome::Passed => analytics.passed += 1,
                TestOutcome::Failed => analytics.failed += 1,
            }
        }
        analytics.devices_online = tables.devices.iter().filter(|(_, online)| *online).count() as u64;
        Ok(analytics)
    }
}

impl UserStore for MemoryStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        self.check_available()?;
        let tables = self.tables.read().await;
        Ok(tables.users.iter().find(|u| u.username == username).cloned())
    }

    async fn profile(&self, id: UserId) -> Result<Option<UserProfile>, StoreError> {
        self.check_available()?;
        let tables = self.tables.read().await;
        Ok(tables.users.iter().find(|u| u.id == id).map(|u| UserProfile {
            id: u.id,
            username: u.username.clone(),
            team_name: u.team_id.and_then(|t| tables.teams.get(&t).cloned()),
            avatar_url: u.avatar_url.clone(),
        }))
    }
}

impl AnalyticsReader for MemoryStore {
    async fn global_snapshot(&self) -> Result<Analytics, StoreError> {
        self.snapshot(None).await
    }

    async fn user_snapshot(&self, id: UserId) -> Result<Analytics, StoreError> {
        self.snapshot(Some(id)).await
    }
}
