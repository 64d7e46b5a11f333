//! The persistence contract every backend implements

use crate::core::context::CallContext;
use crate::core::entity::Record;
use crate::core::error::StoreResult;
use crate::core::field::FieldValue;
use crate::core::query::{ListParams, ListResult};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;

/// Partial field map applied by [`Provider::update`]
///
/// A `Null` value removes the field.
pub type Patch = IndexMap<String, FieldValue>;

/// Backend-specific implementation of record persistence
///
/// A provider is bound to one table (or collection) when it is built.
/// Every call is scoped to `ctx.tenant` and joins `ctx.transaction` when
/// the backend supports transactions.
///
/// The storage mechanism is invisible to callers: `list` returns the same
/// records in the same order whatever the backend.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Table or collection this provider is bound to
    fn table(&self) -> &str;

    /// Backend name, e.g. `memory` or `postgres`
    fn backend(&self) -> &'static str;

    /// Insert a new record
    ///
    /// An empty id is replaced by a generated UUID. Fails with
    /// `AlreadyExists` if the id is taken.
    async fn create(&self, ctx: &CallContext, record: Record) -> StoreResult<Record>;

    /// Fetch a record by id, `NotFound` if absent
    async fn read(&self, ctx: &CallContext, id: &str) -> StoreResult<Record>;

    /// Merge `patch` into an existing record and return the result
    async fn update(&self, ctx: &CallContext, id: &str, patch: Patch) -> StoreResult<Record>;

    /// Remove a record, `NotFound` if absent
    async fn delete(&self, ctx: &CallContext, id: &str) -> StoreResult<()>;

    /// Filter, search, sort and paginate the tenant's records
    async fn list(&self, ctx: &CallContext, params: &ListParams) -> StoreResult<ListResult>;

    /// Run a backend-native statement and return rows as JSON objects
    async fn query(
        &self,
        ctx: &CallContext,
        statement: &str,
        params: &[Value],
    ) -> StoreResult<Vec<Value>>;

    /// First row of [`Provider::query`], if any
    async fn query_one(
        &self,
        ctx: &CallContext,
        statement: &str,
        params: &[Value],
    ) -> StoreResult<Option<Value>> {
        Ok(self.query(ctx, statement, params).await?.into_iter().next())
    }
}
