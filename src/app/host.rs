//! Composed application state

use crate::config::AppConfig;
use crate::core::error::{StoreError, StoreResult};
use crate::core::provider::Provider;
use crate::core::repository::Repository;
use crate::core::transaction::TransactionManager;
use crate::storage::registry::Connection;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;

/// Providers and transaction manager for every configured entity
///
/// # Example
///
/// ```rust,ignore
/// let host = AppBuilder::new(AppConfig::from_yaml_file("bizstore.yaml")?)
///     .build()
///     .await?;
///
/// let courses = host.repository::<Course>("course")?;
/// let created = host
///     .transactions()
///     .execute_in_transaction(&ctx, |ctx| async move { courses.create(&ctx, &course).await })
///     .await?;
/// ```
pub struct AppHost {
    pub config: Arc<AppConfig>,
    connection: Connection,
    providers: HashMap<String, Arc<dyn Provider>>,
    transactions: TransactionManager,
}

impl AppHost {
    pub(crate) fn new(
        config: AppConfig,
        connection: Connection,
        providers: HashMap<String, Arc<dyn Provider>>,
        transactions: TransactionManager,
    ) -> Self {
        Self {
            config: Arc::new(config),
            connection,
            providers,
            transactions,
        }
    }

    /// Provider bound to `entity`'s table
    pub fn provider(&self, entity: &str) -> StoreResult<Arc<dyn Provider>> {
        self.providers
            .get(entity)
            .cloned()
            .ok_or_else(|| StoreError::ProviderNotRegistered {
                provider: self.connection.provider_name().to_string(),
                entity: entity.to_string(),
            })
    }

    pub fn repository<T>(&self, entity: &str) -> StoreResult<Repository<T>>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
    {
        Ok(Repository::new(self.provider(entity)?))
    }

    pub fn transactions(&self) -> &TransactionManager {
        &self.transactions
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Configured entity names, sorted
    pub fn entity_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn default_page_size(&self) -> i32 {
        self.config.default_page_size
    }
}

impl std::fmt::Debug for AppHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppHost")
            .field("connection", &self.connection)
            .field("entities", &self.entity_names())
            .field("transactions", &self.transactions)
            .finish()
    }
}
