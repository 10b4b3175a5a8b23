//! Shared application state.
//!
//! `CoreState` owns the document store and everything built on it. It is
//! wrapped in `Arc` at startup and handed to the HTTP layer.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::backend::{
    AuthService, ConnectionController, DocumentStore, MemoryStore, RetryPolicy, SqliteStore,
    StoreError,
};
use crate::clinic::Clinic;
use crate::config::{AppConfig, ConfigError};

pub struct CoreState {
    pub config: AppConfig,
    store: Arc<dyn DocumentStore>,
    pub auth: AuthService,
    pub connection: ConnectionController,
    pub clinic: Clinic,
    pub retry_policy: RetryPolicy,
    started_at: Instant,
}

impl CoreState {
    /// Open the store selected by the configuration: the in-memory emulator
    /// when `use_emulator` is set, the SQLite file otherwise.
    pub fn open(config: AppConfig) -> Result<Self, CoreError> {
        let store: Arc<dyn DocumentStore> = if config.backend.use_emulator {
            tracing::info!("Using in-memory document store emulator");
            Arc::new(MemoryStore::new())
        } else {
            let path = config.database_path();
            tracing::info!(path = %path.display(), "Opening document store");
            Arc::new(SqliteStore::open(&path)?)
        };
        Ok(Self::with_store(config, store))
    }

    pub fn with_store(config: AppConfig, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            auth: AuthService::new(store.clone()),
            connection: ConnectionController::new(store.clone()),
            clinic: Clinic::new(store.clone()),
            retry_policy: RetryPolicy::default(),
            store,
            config,
            started_at: Instant::now(),
        }
    }

    /// State with no backoff waits and a cheap password hash.
    #[cfg(test)]
    pub fn for_tests(config: AppConfig, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            auth: AuthService::with_iterations(store.clone(), 10),
            connection: ConnectionController::with_base_delay(store.clone(), Duration::ZERO),
            clinic: Clinic::new(store.clone()),
            retry_policy: RetryPolicy::immediate(),
            store,
            config,
            started_at: Instant::now(),
        }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Errors from CoreState operations.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Document store error: {0}")]
    Store(#[from] StoreError),
    #[error("Server error: {0}")]
    Server(String),
}
