//! AppBuilder for composing providers from configuration

use super::host::AppHost;
use crate::config::{AppConfig, DatabaseProvider};
use crate::core::provider::Provider;
use crate::storage::in_memory::{self, InMemoryStore};
use crate::storage::registry::{Connection, ProviderConstructor, ProviderRegistry};
use anyhow::{Result, anyhow};
use std::collections::HashMap;
use std::sync::Arc;

/// Builder wiring configuration, registry and backend into an [`AppHost`]
///
/// # Example
///
/// ```ignore
/// let host = AppBuilder::new(config)
///     .with_connection(Connection::InMemory(InMemoryStore::new()))
///     .build()
///     .await?;
/// ```
pub struct AppBuilder {
    config: AppConfig,
    registry: ProviderRegistry,
    connection: Option<Connection>,
    provider_name: Option<String>,
}

impl AppBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            registry: ProviderRegistry::new(),
            connection: None,
            provider_name: None,
        }
    }

    /// Use an already-open connection instead of connecting from config
    pub fn with_connection(mut self, connection: Connection) -> Self {
        self.connection = Some(connection);
        self
    }

    /// Resolve providers under this name instead of the configured backend's
    ///
    /// Pair with [`AppBuilder::register_provider`] to plug custom providers.
    pub fn with_provider_name(mut self, name: impl Into<String>) -> Self {
        self.provider_name = Some(name.into());
        self
    }

    /// Register a constructor before the built-in backends are registered
    pub fn register_provider(
        mut self,
        provider: &str,
        entity: &str,
        constructor: ProviderConstructor,
    ) -> Result<Self> {
        self.registry.register(provider, entity, constructor)?;
        Ok(self)
    }

    /// Connect, register and resolve one provider per configured entity
    pub async fn build(mut self) -> Result<AppHost> {
        let connection = match self.connection.take() {
            Some(connection) => connection,
            None => connect(&self.config).await?,
        };
        let provider_name = self
            .provider_name
            .take()
            .unwrap_or_else(|| connection.provider_name().to_string());

        // Built-in providers fill whatever custom registrations left open
        let missing: Vec<String> = self
            .config
            .entities
            .iter()
            .filter(|e| !self.registry.contains(connection.provider_name(), &e.name))
            .map(|e| e.name.clone())
            .collect();
        register_builtin(&mut self.registry, &connection, &missing)?;

        let mut providers: HashMap<String, Arc<dyn Provider>> = HashMap::new();
        for entity in &self.config.entities {
            let provider = self.registry.resolve(
                &provider_name,
                &entity.name,
                &connection,
                entity.table_name(),
            )?;
            tracing::info!(
                entity = %entity.name,
                table = %entity.table_name(),
                provider = %provider_name,
                "provider resolved"
            );
            providers.insert(entity.name.clone(), provider);
        }

        let transactions = connection.transaction_manager();
        tracing::info!(
            provider = %provider_name,
            entities = providers.len(),
            transactional = !transactions.is_noop(),
            "application composed"
        );

        Ok(AppHost::new(self.config, connection, providers, transactions))
    }
}

fn register_builtin(
    registry: &mut ProviderRegistry,
    connection: &Connection,
    entities: &[String],
) -> Result<()> {
    match connection {
        Connection::InMemory(_) => in_memory::register(registry, entities)?,
        #[cfg(feature = "postgres")]
        Connection::Postgres(_) => crate::storage::postgres::register(registry, entities)?,
        #[cfg(feature = "mongodb_backend")]
        Connection::Mongo(_) => crate::storage::mongodb::register(registry, entities)?,
    }
    Ok(())
}

/// Open the connection described by the configuration
pub async fn connect(config: &AppConfig) -> Result<Connection> {
    let database = &config.database;
    match database.provider {
        DatabaseProvider::Memory => Ok(Connection::InMemory(InMemoryStore::new())),

        #[cfg(feature = "postgres")]
        DatabaseProvider::Postgres => {
            let url = database
                .url
                .as_deref()
                .ok_or_else(|| anyhow!("postgres requires database.url"))?;
            let pool = crate::storage::postgres::connect(url).await?;
            crate::storage::postgres::ensure_schema(&pool).await?;
            Ok(Connection::Postgres(pool))
        }

        #[cfg(feature = "mongodb_backend")]
        DatabaseProvider::Mongodb => {
            let url = database
                .url
                .as_deref()
                .ok_or_else(|| anyhow!("mongodb requires database.url"))?;
            let name = database.name.as_deref().unwrap_or("bizstore");
            Ok(Connection::Mongo(crate::storage::mongodb::connect(url, name).await?))
        }

        #[allow(unreachable_patterns)]
        other => Err(anyhow!(
            "Database provider '{}' is not compiled in; enable its cargo feature",
            other
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EntityConfig;
    use crate::core::context::CallContext;
    use crate::core::entity::Record;
    use crate::core::error::StoreError;
    use crate::storage::in_memory::InMemoryProvider;
    use crate::storage::registry::MEMORY;

    fn config() -> AppConfig {
        AppConfig::default()
            .with_entity(EntityConfig::new("course").with_table("courses"))
            .with_entity(EntityConfig::new("invoice"))
    }

    #[tokio::test]
    async fn test_build_resolves_every_entity() {
        let host = AppBuilder::new(config()).build().await.unwrap();

        assert_eq!(host.entity_names(), vec!["course", "invoice"]);
        assert_eq!(host.provider("course").unwrap().table(), "courses");
        assert_eq!(host.provider("course").unwrap().backend(), MEMORY);
        assert!(!host.transactions().is_noop());
    }

    #[tokio::test]
    async fn test_unknown_entity_is_not_registered() {
        let host = AppBuilder::new(config()).build().await.unwrap();
        assert!(matches!(
            host.provider("gadget"),
            Err(StoreError::ProviderNotRegistered { .. })
        ));
    }

    #[tokio::test]
    async fn test_custom_provider_name() {
        let ctor: ProviderConstructor =
            Arc::new(|connection: &Connection, table: &str| match connection {
                Connection::InMemory(store) => {
                    Ok(Arc::new(InMemoryProvider::new(store.clone(), table)) as Arc<dyn Provider>)
                }
                #[allow(unreachable_patterns)]
                _ => Err(StoreError::Internal("unexpected connection".into())),
            });
        let config = AppConfig::default().with_entity(EntityConfig::new("widget"));

        let host = AppBuilder::new(config)
            .with_provider_name("mock")
            .register_provider("mock", "widget", ctor)
            .unwrap()
            .build()
            .await
            .unwrap();

        let ctx = CallContext::new("acme");
        let widgets = host.provider("widget").unwrap();
        widgets.create(&ctx, Record::new("w-1")).await.unwrap();
        assert_eq!(widgets.read(&ctx, "w-1").await.unwrap().id, "w-1");
    }

    #[tokio::test]
    async fn test_shared_connection_shares_data() {
        let store = InMemoryStore::new();
        let host = AppBuilder::new(config())
            .with_connection(Connection::InMemory(store.clone()))
            .build()
            .await
            .unwrap();

        let ctx = CallContext::new("acme");
        host.provider("invoice")
            .unwrap()
            .create(&ctx, Record::new("i-1"))
            .await
            .unwrap();
        assert_eq!(store.count(&ctx.tenant, "invoice").unwrap(), 1);
    }
}
