//! Data layer for the SIBIM municipal inventory system.
//!
//! A spreadsheet is the system of record; this crate reads it through a
//! [`gateway::SheetGateway`], normalizes whatever headers the humans typed,
//! caches the results in a key-value store and tracks a client-side session.

pub mod api;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod gateway;
pub mod models;
pub mod normalizer;
pub mod roles;
pub mod sample;
pub mod session;
pub mod sheets;
pub mod storage;

pub use api::{ApiSettings, SibimApi, UserDirectory};
pub use cache::ResponseCache;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, Transport};
pub use error::{Result, SibimError};
pub use gateway::{Action, AppsScriptGateway, ConnectionReport, SheetGateway, SheetStatus};
pub use models::{
    ConfigEntry, Dashboard, Department, InventoryItem, InventoryStats, SessionUser, UserRecord, WriteReceipt,
};
pub use roles::{Permission, RoleTable};
pub use session::{MasterCredentials, SessionManager, SessionSettings, SessionStatus};
pub use sheets::SheetsValuesGateway;
pub use storage::{KeyValueStore, MemoryStore, RedbStore};

use std::sync::Arc;
use std::time::Duration;

/// Everything a front end needs, wired from one [`Config`].
pub struct Sibim {
    pub api: Arc<SibimApi>,
    pub session: SessionManager,
}

impl Sibim {
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let store: Arc<dyn KeyValueStore> = Arc::new(RedbStore::open(&config.storage.path)?);
        let gateway = build_gateway(config)?;
        Ok(Self::assemble(config, gateway, store, Arc::new(SystemClock)))
    }

    /// Wire the services around explicit seams; used by tests and by
    /// `from_config` once the gateway and store exist.
    pub fn assemble(
        config: &Config,
        gateway: Arc<dyn SheetGateway>,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cache = ResponseCache::new(store.clone(), clock.clone(), config.cache.ttl());
        let api = Arc::new(SibimApi::new(
            gateway,
            cache,
            ApiSettings {
                write_settle: config.cache.write_settle(),
                max_rows_per_fetch: config.cache.max_rows_per_fetch,
                use_sample_data: config.cache.use_sample_data,
            },
        ));

        let master = match (&config.session.master_username, &config.session.master_password) {
            (Some(username), Some(password)) => Some(MasterCredentials {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => None,
        };
        let session = SessionManager::new(
            store,
            api.clone(),
            clock,
            RoleTable::standard(),
            SessionSettings {
                inactivity_timeout: config.session.inactivity_timeout(),
                master,
            },
        );

        Self { api, session }
    }
}

pub fn build_gateway(config: &Config) -> Result<Arc<dyn SheetGateway>> {
    let remote = &config.remote;
    let timeout = remote.request_timeout_seconds.map(Duration::from_secs);
    let gateway: Arc<dyn SheetGateway> = match remote.transport {
        Transport::AppsScript => {
            let url = remote
                .script_url
                .as_deref()
                .ok_or_else(|| SibimError::Config("remote.script_url is not set".to_string()))?;
            Arc::new(AppsScriptGateway::new(url, timeout)?)
        }
        Transport::SheetsApi => {
            let id = remote
                .spreadsheet_id
                .as_deref()
                .ok_or_else(|| SibimError::Config("remote.spreadsheet_id is not set".to_string()))?;
            Arc::new(SheetsValuesGateway::new(
                &remote.sheets_base_url,
                id,
                remote.api_key.clone(),
                remote.access_token.clone(),
                timeout,
            )?)
        }
    };
    tracing::info!("🔌 Using {} transport", gateway.transport_name());
    Ok(gateway)
}
