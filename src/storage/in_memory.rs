//! In-memory provider for testing and development
//!
//! Records live in `tenant -> table -> id -> record` maps behind a single
//! `RwLock` per store. Transactions keep an undo journal that is replayed
//! in reverse on rollback; they give atomicity, not isolation.

use crate::core::context::CallContext;
use crate::core::entity::{Record, TenantId};
use crate::core::error::{StoreError, StoreResult};
use crate::core::provider::{Patch, Provider};
use crate::core::query::{ListParams, ListResult, execute};
use crate::core::transaction::{TransactionBackend, TransactionHandle};
use crate::storage::registry::{Connection, MEMORY, ProviderRegistry};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

type Tables = HashMap<TenantId, HashMap<String, HashMap<String, Record>>>;

/// Shared in-memory data, cloned cheaply into every provider
#[derive(Clone, Default)]
pub struct InMemoryStore {
    data: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Tables>> {
        self.data
            .read()
            .map_err(|e| StoreError::Internal(format!("Failed to acquire read lock: {}", e)))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Tables>> {
        self.data
            .write()
            .map_err(|e| StoreError::Internal(format!("Failed to acquire write lock: {}", e)))
    }

    /// Copy of every record in one tenant's table
    pub fn snapshot(&self, tenant: &TenantId, table: &str) -> StoreResult<Vec<Record>> {
        let data = self.read()?;
        Ok(data
            .get(tenant)
            .and_then(|tables| tables.get(table))
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default())
    }

    /// Number of records in one tenant's table
    pub fn count(&self, tenant: &TenantId, table: &str) -> StoreResult<usize> {
        let data = self.read()?;
        Ok(data
            .get(tenant)
            .and_then(|tables| tables.get(table))
            .map_or(0, HashMap::len))
    }
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("InMemoryStore")
    }
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

/// Previous state of one key, restored on rollback
#[derive(Debug)]
struct UndoEntry {
    tenant: TenantId,
    table: String,
    id: String,
    previous: Option<Record>,
}

/// Handle state of an in-memory transaction
#[derive(Debug, Default)]
pub struct InMemoryJournal {
    entries: Mutex<Vec<UndoEntry>>,
}

impl InMemoryJournal {
    fn record(
        &self,
        tenant: &TenantId,
        table: &str,
        id: &str,
        previous: Option<Record>,
    ) -> StoreResult<()> {
        self.entries
            .lock()
            .map_err(|e| StoreError::Internal(format!("Failed to acquire journal lock: {}", e)))?
            .push(UndoEntry {
                tenant: tenant.clone(),
                table: table.to_string(),
                id: id.to_string(),
                previous,
            });
        Ok(())
    }

    fn take(&self) -> StoreResult<Vec<UndoEntry>> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| StoreError::Internal(format!("Failed to acquire journal lock: {}", e)))?;
        Ok(std::mem::take(&mut *entries))
    }
}

/// Transaction backend over an [`InMemoryStore`]
#[derive(Debug, Clone)]
pub struct InMemoryTransactions {
    store: InMemoryStore,
}

impl InMemoryTransactions {
    pub fn new(store: InMemoryStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl TransactionBackend for InMemoryTransactions {
    fn name(&self) -> &'static str {
        MEMORY
    }

    async fn begin(&self, _ctx: &CallContext) -> StoreResult<TransactionHandle> {
        Ok(TransactionHandle::new(MEMORY, InMemoryJournal::default()))
    }

    async fn commit(&self, handle: TransactionHandle) -> StoreResult<()> {
        handle.state_for::<InMemoryJournal>(MEMORY)?.take()?;
        Ok(())
    }

    async fn rollback(&self, handle: TransactionHandle) -> StoreResult<()> {
        let entries = handle.state_for::<InMemoryJournal>(MEMORY)?.take()?;
        let mut data = self.store.write()?;

        for entry in entries.into_iter().rev() {
            let records = data
                .entry(entry.tenant)
                .or_default()
                .entry(entry.table)
                .or_default();
            match entry.previous {
                Some(record) => {
                    records.insert(entry.id, record);
                }
                None => {
                    records.remove(&entry.id);
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// In-memory provider bound to one table
#[derive(Debug, Clone)]
pub struct InMemoryProvider {
    store: InMemoryStore,
    table: String,
}

impl InMemoryProvider {
    pub fn new(store: InMemoryStore, table: impl Into<String>) -> Self {
        Self {
            store,
            table: table.into(),
        }
    }

    fn journal<'a>(&self, ctx: &'a CallContext) -> StoreResult<Option<&'a InMemoryJournal>> {
        ctx.transaction
            .as_ref()
            .map(|handle| handle.state_for::<InMemoryJournal>(MEMORY))
            .transpose()
    }
}

#[async_trait]
impl Provider for InMemoryProvider {
    fn table(&self) -> &str {
        &self.table
    }

    fn backend(&self) -> &'static str {
        MEMORY
    }

    async fn create(&self, ctx: &CallContext, mut record: Record) -> StoreResult<Record> {
        if record.id.trim().is_empty() {
            record.id = Uuid::new_v4().to_string();
        }
        record.touch();

        let journal = self.journal(ctx)?;
        let mut data = self.store.write()?;
        let records = data
            .entry(ctx.tenant.clone())
            .or_default()
            .entry(self.table.clone())
            .or_default();

        if records.contains_key(&record.id) {
            return Err(StoreError::AlreadyExists {
                table: self.table.clone(),
                id: record.id,
            });
        }
        if let Some(journal) = journal {
            journal.record(&ctx.tenant, &self.table, &record.id, None)?;
        }
        records.insert(record.id.clone(), record.clone());

        tracing::debug!(
            table = %self.table,
            tenant = %ctx.tenant,
            id = %record.id,
            "record created"
        );
        Ok(record)
    }

    async fn read(&self, ctx: &CallContext, id: &str) -> StoreResult<Record> {
        let data = self.store.read()?;
        data.get(&ctx.tenant)
            .and_then(|tables| tables.get(&self.table))
            .and_then(|records| records.get(id))
            .cloned()
            .ok_or_else(|| StoreError::not_found(&self.table, id))
    }

    async fn update(&self, ctx: &CallContext, id: &str, patch: Patch) -> StoreResult<Record> {
        let journal = self.journal(ctx)?;
        let mut data = self.store.write()?;
        let record = data
            .get_mut(&ctx.tenant)
            .and_then(|tables| tables.get_mut(&self.table))
            .and_then(|records| records.get_mut(id))
            .ok_or_else(|| StoreError::not_found(&self.table, id))?;

        if let Some(journal) = journal {
            journal.record(&ctx.tenant, &self.table, id, Some(record.clone()))?;
        }
        record.merge(patch);
        record.touch();

        tracing::debug!(table = %self.table, tenant = %ctx.tenant, id, "record updated");
        Ok(record.clone())
    }

    async fn delete(&self, ctx: &CallContext, id: &str) -> StoreResult<()> {
        let journal = self.journal(ctx)?;
        let mut data = self.store.write()?;
        let removed = data
            .get_mut(&ctx.tenant)
            .and_then(|tables| tables.get_mut(&self.table))
            .and_then(|records| records.remove(id))
            .ok_or_else(|| StoreError::not_found(&self.table, id))?;

        if let Some(journal) = journal {
            journal.record(&ctx.tenant, &self.table, id, Some(removed))?;
        }

        tracing::debug!(table = %self.table, tenant = %ctx.tenant, id, "record deleted");
        Ok(())
    }

    async fn list(&self, ctx: &CallContext, params: &ListParams) -> StoreResult<ListResult> {
        params.validate()?;
        // The lock is released before any engine work.
        let records = self.store.snapshot(&ctx.tenant, &self.table)?;
        let result = execute(records, params);

        tracing::debug!(
            table = %self.table,
            tenant = %ctx.tenant,
            total = result.total,
            returned = result.records.len(),
            "records listed"
        );
        Ok(result)
    }

    /// `statement` is a JSON object of field equalities; `params` are unused
    async fn query(
        &self,
        ctx: &CallContext,
        statement: &str,
        _params: &[Value],
    ) -> StoreResult<Vec<Value>> {
        let filter: Value = serde_json::from_str(statement).map_err(|e| {
            StoreError::invalid_query(format!("in-memory query must be a JSON object: {}", e))
        })?;
        let Value::Object(filter) = filter else {
            return Err(StoreError::invalid_query("in-memory query must be a JSON object"));
        };

        let mut records = self.store.snapshot(&ctx.tenant, &self.table)?;
        records.sort_by(|a, b| a.id.cmp(&b.id));

        Ok(records
            .iter()
            .map(Record::to_json)
            .filter(|row| {
                filter.iter().all(|(field, expected)| {
                    row.get(field).is_some_and(|actual| actual == expected)
                })
            })
            .collect())
    }
}

/// Register the in-memory provider for each entity
pub fn register<I>(registry: &mut ProviderRegistry, entities: I) -> StoreResult<()>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    for entity in entities {
        registry.register(
            MEMORY,
            entity.as_ref(),
            Arc::new(|connection: &Connection, table: &str| match connection {
                Connection::InMemory(store) => {
                    Ok(Arc::new(InMemoryProvider::new(store.clone(), table)) as Arc<dyn Provider>)
                }
                #[allow(unreachable_patterns)]
                other => Err(StoreError::Internal(format!(
                    "in-memory provider cannot use {:?}",
                    other
                ))),
            }),
        )?;
    }
    Ok(())
}
