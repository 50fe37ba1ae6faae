//! Session and role store.
//!
//! Identity lives in key-value storage under `sibim_user` (plus an opaque
//! token under `sibim_token`). Nothing here is enforced server-side: the
//! inactivity timeout and page gating are client-side conveniences.

use crate::api::UserDirectory;
use crate::clock::Clock;
use crate::error::Result;
use crate::models::SessionUser;
use crate::roles::{Permission, RoleTable};
use crate::storage::{KeyValueStore, THEME_KEY, TOKEN_KEY, USER_KEY};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterCredentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub inactivity_timeout: Duration,
    pub master: Option<MasterCredentials>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            inactivity_timeout: Duration::from_secs(10 * 60),
            master: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionStatus {
    Anonymous,
    Active(SessionUser),
    Expired,
}

pub struct SessionManager {
    store: Arc<dyn KeyValueStore>,
    directory: Arc<dyn UserDirectory>,
    clock: Arc<dyn Clock>,
    roles: RoleTable,
    settings: SessionSettings,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        directory: Arc<dyn UserDirectory>,
        clock: Arc<dyn Clock>,
        roles: RoleTable,
        settings: SessionSettings,
    ) -> Self {
        Self {
            store,
            directory,
            clock,
            roles,
            settings,
        }
    }

    /// Check credentials against the master override, then the users sheet.
    /// Any failure along the way is a plain `false`.
    pub async fn login(&self, username: &str, password: &str) -> bool {
        tracing::info!("Login attempt for {}", username);

        if let Some(master) = &self.settings.master {
            if master.username == username && master.password == password {
                tracing::warn!("🔑 Master credentials used");
                return self.start_session("Admin Maestro", "Admin");
            }
        }

        let users = self.directory.list_users().await;
        if users.is_empty() {
            tracing::warn!("No users could be retrieved; only master access is possible");
            return false;
        }

        let found = users.iter().find(|user| {
            user.username.as_deref() == Some(username) && user.password.as_deref() == Some(password)
        });

        match found {
            Some(user) => {
                let name = user.username.as_deref().unwrap_or(username);
                let role = user.role.as_deref().unwrap_or("User");
                self.start_session(name, role)
            }
            None => {
                tracing::info!("Rejected credentials for {}", username);
                false
            }
        }
    }

    fn start_session(&self, username: &str, role: &str) -> bool {
        let now = self.clock.now();
        let user = SessionUser {
            username: username.to_string(),
            role: role.to_string(),
            login_time: now,
            last_activity: now,
        };

        match self.save_user(&user).and_then(|_| {
            self.store
                .set(TOKEN_KEY, &uuid::Uuid::new_v4().to_string())
        }) {
            Ok(()) => {
                tracing::info!("✅ Session opened for {} ({})", user.username, user.role);
                true
            }
            Err(e) => {
                tracing::error!("Could not persist session: {}", e);
                false
            }
        }
    }

    fn save_user(&self, user: &SessionUser) -> Result<()> {
        let json = serde_json::to_string(user)?;
        self.store.set(USER_KEY, &json)
    }

    pub fn logout(&self) -> Result<()> {
        if let Some(user) = self.current_user() {
            tracing::info!("Session closed for {}", user.username);
        }
        self.store.remove(USER_KEY)?;
        self.store.remove(TOKEN_KEY)
    }

    pub fn current_user(&self) -> Option<SessionUser> {
        let raw = self.store.get(USER_KEY)?;
        match serde_json::from_str(&raw) {
            Ok(user) => Some(user),
            Err(e) => {
                tracing::warn!("Ignoring unreadable session: {}", e);
                None
            }
        }
    }

    pub fn token(&self) -> Option<String> {
        self.store.get(TOKEN_KEY)
    }

    pub fn is_authenticated(&self) -> bool {
        self.current_user().is_some()
    }

    pub fn is_admin(&self) -> bool {
        self.current_user()
            .map_or(false, |user| self.roles.is_admin(&user.role))
    }

    /// Whether the current user may open `page`. Anonymous users may open nothing.
    pub fn is_page_allowed(&self, page: &str) -> bool {
        self.current_user()
            .map_or(false, |user| self.roles.is_page_allowed(&user.role, page))
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.current_user()
            .map_or(false, |user| self.roles.has_permission(&user.role, permission))
    }

    /// Record user activity, pushing the inactivity deadline out.
    pub fn touch(&self) -> Result<()> {
        if let Some(mut user) = self.current_user() {
            user.last_activity = self.clock.now();
            self.save_user(&user)?;
        }
        Ok(())
    }

    /// Close the session when it has been idle for the configured timeout.
    pub fn check_timeout(&self) -> Result<SessionStatus> {
        let Some(user) = self.current_user() else {
            return Ok(SessionStatus::Anonymous);
        };

        let idle = self.clock.now() - user.last_activity;
        let limit = chrono::Duration::from_std(self.settings.inactivity_timeout)
            .unwrap_or_else(|_| chrono::Duration::max_value());
        if idle >= limit {
            tracing::info!("⏰ Session expired for {} after {}s idle", user.username, idle.num_seconds());
            self.logout()?;
            return Ok(SessionStatus::Expired);
        }
        Ok(SessionStatus::Active(user))
    }

    pub fn apply_theme(&self, theme: Option<&str>) -> Result<()> {
        match theme.filter(|t| !t.is_empty()) {
            Some(theme) => self.store.set(THEME_KEY, theme),
            None => self.store.remove(THEME_KEY),
        }
    }

    pub fn saved_theme(&self) -> Option<String> {
        self.store.get(THEME_KEY)
    }
}
