//! Startup-time mapping from (provider, entity) to a provider constructor
//!
//! Backends add their constructors through their module's `register`
//! function while the application is being composed; afterwards the
//! registry is only read.

use crate::core::error::{StoreError, StoreResult};
use crate::core::provider::Provider;
use crate::core::transaction::TransactionManager;
use crate::storage::in_memory::{InMemoryStore, InMemoryTransactions};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Provider name of the in-memory backend
pub const MEMORY: &str = "memory";

/// Provider name of the PostgreSQL backend
pub const POSTGRES: &str = "postgres";

/// Provider name of the MongoDB backend
pub const MONGODB: &str = "mongodb";

/// Builds a provider for one table from a backend connection
pub type ProviderConstructor =
    Arc<dyn Fn(&Connection, &str) -> StoreResult<Arc<dyn Provider>> + Send + Sync>;

/// Backend connection handed to provider constructors
#[derive(Clone)]
pub enum Connection {
    InMemory(InMemoryStore),

    #[cfg(feature = "postgres")]
    Postgres(sqlx::PgPool),

    #[cfg(feature = "mongodb_backend")]
    Mongo(mongodb::Database),
}

impl Connection {
    /// Provider name matching this connection
    pub fn provider_name(&self) -> &'static str {
        match self {
            Connection::InMemory(_) => MEMORY,
            #[cfg(feature = "postgres")]
            Connection::Postgres(_) => POSTGRES,
            #[cfg(feature = "mongodb_backend")]
            Connection::Mongo(_) => MONGODB,
        }
    }

    /// Transaction manager for this backend
    ///
    /// MongoDB runs without transactions and gets the no-op manager.
    pub fn transaction_manager(&self) -> TransactionManager {
        match self {
            Connection::InMemory(store) => {
                TransactionManager::new(Arc::new(InMemoryTransactions::new(store.clone())))
            }
            #[cfg(feature = "postgres")]
            Connection::Postgres(pool) => TransactionManager::new(Arc::new(
                crate::storage::postgres::PostgresTransactions::new(pool.clone()),
            )),
            #[cfg(feature = "mongodb_backend")]
            Connection::Mongo(_) => TransactionManager::noop(),
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Connection({})", self.provider_name())
    }
}

/// Explicit table of provider constructors
#[derive(Default)]
pub struct ProviderRegistry {
    constructors: BTreeMap<(String, String), ProviderConstructor>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the constructor for `(provider, entity)`.
    ///
    /// Fails with `AlreadyRegistered` if the pair is taken, so a doubly
    /// wired backend fails composition instead of silently winning.
    pub fn register(
        &mut self,
        provider: &str,
        entity: &str,
        constructor: ProviderConstructor,
    ) -> StoreResult<()> {
        let key = (provider.trim().to_string(), entity.trim().to_string());
        if self.constructors.contains_key(&key) {
            return Err(StoreError::AlreadyRegistered {
                provider: key.0,
                entity: key.1,
            });
        }
        tracing::debug!(provider = %key.0, entity = %key.1, "provider registered");
        self.constructors.insert(key, constructor);
        Ok(())
    }

    /// Build the provider registered for `(provider, entity)`, bound to `table`
    pub fn resolve(
        &self,
        provider: &str,
        entity: &str,
        connection: &Connection,
        table: &str,
    ) -> StoreResult<Arc<dyn Provider>> {
        let key = (provider.trim().to_string(), entity.trim().to_string());
        let constructor = self
            .constructors
            .get(&key)
            .ok_or_else(|| StoreError::ProviderNotRegistered {
                provider: key.0.clone(),
                entity: key.1.clone(),
            })?;
        constructor(connection, table)
    }

    pub fn contains(&self, provider: &str, entity: &str) -> bool {
        self.constructors
            .contains_key(&(provider.trim().to_string(), entity.trim().to_string()))
    }

    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }

    /// Registered pairs, sorted
    pub fn registrations(&self) -> Vec<(String, String)> {
        self.constructors.keys().cloned().collect()
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("registrations", &self.registrations())
            .finish()
    }
}
