//! PostgreSQL provider using sqlx.
//!
//! # Feature flag
//!
//! This module is gated behind the `postgres` feature flag:
//! ```toml
//! [dependencies]
//! bizstore = { version = "0.1", features = ["postgres"] }
//! ```
//!
//! # Schema
//!
//! Every table lives in one shared `records` table keyed by
//! `(tenant_id, table_name, id)`, with the fields in a JSONB `data` column.
//!
//! # Lists
//!
//! Filters are always translated to SQL. When the request has no search,
//! no sort and only numeric/boolean filters, ordering and pagination run
//! in SQL too (`ORDER BY id`, `LIMIT/OFFSET`, `COUNT(*) OVER()`).
//! Otherwise the filtered rows are fetched and the list-query engine
//! finishes the job, so results match the in-memory provider exactly.

use crate::core::context::CallContext;
use crate::core::entity::{CREATED_AT, Record, TenantId, UPDATED_AT};
use crate::core::field::FieldValue;
use crate::core::error::{StoreError, StoreResult, TransactionError};
use crate::core::provider::{Patch, Provider};
use crate::core::query::{
    FilterCondition, ListParams, ListResult, NumericOperator, PaginationResponse, StringOperator,
    TypedFilter, execute,
};
use crate::core::transaction::{TransactionBackend, TransactionHandle};
use crate::storage::registry::{Connection, POSTGRES, ProviderRegistry};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::pool::PoolConnection;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder, Row};
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Schema management
// ---------------------------------------------------------------------------

/// Open a connection pool
pub async fn connect(url: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(url)
        .await
        .map_err(|e| anyhow!("Failed to connect to PostgreSQL: {}", e))
}

/// Create the `records` table and its indexes (idempotent).
///
/// Safe to call on every startup.
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS records (
            tenant_id TEXT NOT NULL,
            table_name TEXT NOT NULL,
            id TEXT NOT NULL,
            data JSONB NOT NULL DEFAULT '{}'::jsonb,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL,
            PRIMARY KEY (tenant_id, table_name, id)
        )",
    )
    .execute(pool)
    .await
    .map_err(|e| anyhow!("Failed to create records table: {}", e))?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_data ON records USING GIN (data)")
        .execute(pool)
        .await
        .map_err(|e| anyhow!("Failed to create records data index: {}", e))?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Conversion helpers
// ---------------------------------------------------------------------------

fn map_sqlx_error(operation: &str, table: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => StoreError::unavailable(POSTGRES, err),
        other => StoreError::backend(POSTGRES, operation, table, other),
    }
}

/// JSONB payload of a record: every field except the identifier
fn record_data(record: &Record) -> Value {
    let mut json = record.to_json();
    if let Value::Object(map) = &mut json {
        map.remove("id");
    }
    json
}

fn row_to_record(id: String, data: Value) -> StoreResult<Record> {
    let mut record = Record::from_json(data).ok_or_else(|| StoreError::Serialization {
        message: format!("record '{}' data is not a JSON object", id),
    })?;
    record.id = id;
    Ok(record)
}

fn timestamp(record: &Record, field: &str) -> DateTime<Utc> {
    record
        .get(field)
        .and_then(|v| match v {
            FieldValue::DateTime(dt) => Some(*dt),
            FieldValue::String(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            _ => None,
        })
        .unwrap_or_else(Utc::now)
}

async fn with_deadline<T>(
    ctx: &CallContext,
    fut: impl Future<Output = StoreResult<T>>,
) -> StoreResult<T> {
    match ctx.timeout {
        Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
            StoreError::unavailable(POSTGRES, format!("deadline of {:?} exceeded", limit))
        })?,
        None => fut.await,
    }
}

// ---------------------------------------------------------------------------
// Filter translation
// ---------------------------------------------------------------------------

/// Closes a `push_value` expression as its unquoted text
const AS_TEXT: &str = " #>> '{}')";

/// JSONB expression holding the field's value
fn push_value(qb: &mut QueryBuilder<'_, Postgres>, field: &str) {
    if field == "id" {
        qb.push("to_jsonb(id)");
    } else {
        qb.push("(data -> ").push_bind(field.to_string()).push(")");
    }
}

/// Append one filter as a type-guarded SQL predicate.
///
/// A missing field makes `jsonb_typeof` NULL, so the row never matches.
/// Neither does a value of another kind. Case-insensitive string filters
/// only push the type guard: SQL `lower()` folds by the database collation,
/// so the engine does the folding on the fetched rows.
fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &TypedFilter) {
    let field = filter.field.as_str();
    match &filter.condition {
        FilterCondition::String {
            operator,
            value,
            case_insensitive,
        } => {
            qb.push("(jsonb_typeof(");
            push_value(qb, field);
            qb.push(") = 'string'");
            if *case_insensitive {
                qb.push(")");
                return;
            }

            let value = value.clone();
            qb.push(" AND ");
            match operator {
                StringOperator::Equals | StringOperator::NotEquals => {
                    qb.push("(");
                    push_value(qb, field);
                    qb.push(AS_TEXT);
                    qb.push(if *operator == StringOperator::Equals { " = " } else { " <> " });
                    qb.push_bind(value);
                }
                StringOperator::Contains => {
                    qb.push("strpos(").push("(");
                    push_value(qb, field);
                    qb.push(AS_TEXT).push(", ").push_bind(value).push(") > 0");
                }
                StringOperator::Prefix | StringOperator::Suffix => {
                    let side = if *operator == StringOperator::Prefix { "left(" } else { "right(" };
                    qb.push(side).push("(");
                    push_value(qb, field);
                    qb.push(AS_TEXT)
                        .push(", char_length(")
                        .push_bind(value.clone())
                        .push(")) = ")
                        .push_bind(value);
                }
            }
            qb.push(")");
        }
        FilterCondition::Numeric { operator } => {
            // CASE keeps the cast from ever seeing a non-number.
            qb.push("(CASE WHEN jsonb_typeof(");
            push_value(qb, field);
            qb.push(") = 'number' THEN (");
            push_value(qb, field);
            qb.push(")::float8");
            match *operator {
                NumericOperator::Equals(v) => qb.push(" = ").push_bind(v),
                NumericOperator::GreaterThan(v) => qb.push(" > ").push_bind(v),
                NumericOperator::LessThan(v) => qb.push(" < ").push_bind(v),
                NumericOperator::GreaterOrEqual(v) => qb.push(" >= ").push_bind(v),
                NumericOperator::LessOrEqual(v) => qb.push(" <= ").push_bind(v),
                NumericOperator::Between { low, high } => qb
                    .push(" BETWEEN ")
                    .push_bind(low)
                    .push(" AND ")
                    .push_bind(high),
            };
            qb.push(" ELSE false END)");
        }
        FilterCondition::Boolean { value, .. } => {
            qb.push("(CASE WHEN jsonb_typeof(");
            push_value(qb, field);
            qb.push(") = 'boolean' THEN (");
            push_value(qb, field);
            qb.push(")::boolean = ")
                .push_bind(*value)
                .push(" ELSE false END)");
        }
    }
}

fn push_scope(
    qb: &mut QueryBuilder<'_, Postgres>,
    tenant: &TenantId,
    table: &str,
    params: &ListParams,
) {
    qb.push(" FROM records WHERE tenant_id = ")
        .push_bind(tenant.as_str().to_string())
        .push(" AND table_name = ")
        .push_bind(table.to_string());
    for filter in params.filters.iter() {
        qb.push(" AND ");
        push_filter(qb, filter);
    }
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

/// Handle state of a PostgreSQL transaction
pub struct PostgresTransactionState {
    tx: tokio::sync::Mutex<Option<sqlx::Transaction<'static, Postgres>>>,
}

/// Transaction backend over a PostgreSQL pool
#[derive(Clone, Debug)]
pub struct PostgresTransactions {
    pool: PgPool,
}

impl PostgresTransactions {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn take(handle: &TransactionHandle) -> StoreResult<sqlx::Transaction<'static, Postgres>> {
        let state = handle.state_for::<PostgresTransactionState>(POSTGRES)?;
        state.tx.lock().await.take().ok_or_else(|| {
            TransactionError::InvalidHandle {
                message: format!("transaction {} is already closed", handle.id()),
            }
            .into()
        })
    }
}

#[async_trait]
impl TransactionBackend for PostgresTransactions {
    fn name(&self) -> &'static str {
        POSTGRES
    }

    async fn begin(&self, _ctx: &CallContext) -> StoreResult<TransactionHandle> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", "records", e))?;
        Ok(TransactionHandle::new(
            POSTGRES,
            PostgresTransactionState {
                tx: tokio::sync::Mutex::new(Some(tx)),
            },
        ))
    }

    async fn commit(&self, handle: TransactionHandle) -> StoreResult<()> {
        Self::take(&handle)
            .await?
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit", "records", e))
    }

    async fn rollback(&self, handle: TransactionHandle) -> StoreResult<()> {
        Self::take(&handle)
            .await?
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", "records", e))
    }
}

/// Connection for one call: pooled, or the open transaction's
enum PgConn<'a> {
    Pooled(PoolConnection<Postgres>),
    Tx(tokio::sync::MutexGuard<'a, Option<sqlx::Transaction<'static, Postgres>>>),
}

impl PgConn<'_> {
    fn get(&mut self) -> StoreResult<&mut PgConnection> {
        match self {
            PgConn::Pooled(conn) => Ok(&mut **conn),
            PgConn::Tx(guard) => match (**guard).as_mut() {
                Some(tx) => Ok(&mut **tx),
                None => Err(TransactionError::InvalidHandle {
                    message: "transaction is already closed".to_string(),
                }
                .into()),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// PostgresProvider
// ---------------------------------------------------------------------------

/// PostgreSQL provider bound to one logical table
#[derive(Clone, Debug)]
pub struct PostgresProvider {
    pool: PgPool,
    table: String,
}

impl PostgresProvider {
    pub fn new(pool: PgPool, table: impl Into<String>) -> Self {
        Self {
            pool,
            table: table.into(),
        }
    }

    async fn conn<'a>(&self, ctx: &'a CallContext) -> StoreResult<PgConn<'a>> {
        match &ctx.transaction {
            Some(handle) => {
                let state = handle.state_for::<PostgresTransactionState>(POSTGRES)?;
                Ok(PgConn::Tx(state.tx.lock().await))
            }
            None => self
                .pool
                .acquire()
                .await
                .map(PgConn::Pooled)
                .map_err(|e| map_sqlx_error("acquire", &self.table, e)),
        }
    }

    async fn fetch_record(
        &self,
        conn: &mut PgConnection,
        tenant: &TenantId,
        id: &str,
    ) -> StoreResult<Option<Record>> {
        let row: Option<(String, Value)> = sqlx::query_as(
            "SELECT id, data FROM records WHERE tenant_id = $1 AND table_name = $2 AND id = $3",
        )
        .bind(tenant.as_str())
        .bind(&self.table)
        .bind(id)
        .fetch_optional(conn)
        .await
        .map_err(|e| map_sqlx_error("read", &self.table, e))?;

        row.map(|(id, data)| row_to_record(id, data)).transpose()
    }

    async fn list_in_sql(
        &self,
        conn: &mut PgConnection,
        ctx: &CallContext,
        params: &ListParams,
    ) -> StoreResult<ListResult> {
        let paging = params.pagination;
        let mut qb = QueryBuilder::<Postgres>::new("SELECT id, data, COUNT(*) OVER() AS total");
        push_scope(&mut qb, &ctx.tenant, &self.table, params);
        qb.push(" ORDER BY id COLLATE \"C\"");
        if paging.is_paged() {
            qb.push(" LIMIT ")
                .push_bind(i64::from(paging.limit))
                .push(" OFFSET ")
                .push_bind(i64::try_from(paging.offset()).unwrap_or(i64::MAX));
        }

        let rows = qb
            .build()
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("list", &self.table, e))?;

        let mut total = match rows.first() {
            Some(row) => row
                .try_get::<i64, _>("total")
                .map_err(|e| map_sqlx_error("list", &self.table, e))? as u64,
            None => 0,
        };
        if rows.is_empty() && paging.offset() > 0 {
            // Past the last page: the window count has no row to ride on.
            let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*)");
            push_scope(&mut count, &ctx.tenant, &self.table, params);
            let n: i64 = count
                .build_query_scalar::<i64>()
                .fetch_one(&mut *conn)
                .await
                .map_err(|e| map_sqlx_error("list", &self.table, e))?;
            total = n as u64;
        }

        let records = rows
            .into_iter()
            .map(|row| {
                let id: String = row
                    .try_get("id")
                    .map_err(|e| map_sqlx_error("list", &self.table, e))?;
                let data: Value = row
                    .try_get("data")
                    .map_err(|e| map_sqlx_error("list", &self.table, e))?;
                row_to_record(id, data)
            })
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(ListResult {
            records,
            total,
            pagination: PaginationResponse::new(&paging, total),
            search_results: Vec::new(),
        })
    }

    async fn fetch_candidates(
        &self,
        conn: &mut PgConnection,
        ctx: &CallContext,
        params: &ListParams,
    ) -> StoreResult<Vec<Record>> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT id, data");
        push_scope(&mut qb, &ctx.tenant, &self.table, params);

        let rows: Vec<(String, Value)> = qb
            .build_query_as()
            .fetch_all(conn)
            .await
            .map_err(|e| map_sqlx_error("list", &self.table, e))?;

        rows.into_iter()
            .map(|(id, data)| row_to_record(id, data))
            .collect()
    }
}

#[async_trait]
impl Provider for PostgresProvider {
    fn table(&self) -> &str {
        &self.table
    }

    fn backend(&self) -> &'static str {
        POSTGRES
    }

    async fn create(&self, ctx: &CallContext, mut record: Record) -> StoreResult<Record> {
        if record.id.trim().is_empty() {
            record.id = Uuid::new_v4().to_string();
        }
        record.touch();

        with_deadline(ctx, async {
            let mut conn = self.conn(ctx).await?;
            sqlx::query(
                "INSERT INTO records (tenant_id, table_name, id, data, created_at, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(ctx.tenant.as_str())
            .bind(&self.table)
            .bind(&record.id)
            .bind(record_data(&record))
            .bind(timestamp(&record, CREATED_AT))
            .bind(timestamp(&record, UPDATED_AT))
            .execute(conn.get()?)
            .await
            .map_err(|e| {
                if e.as_database_error().is_some_and(|db| db.is_unique_violation()) {
                    StoreError::AlreadyExists {
                        table: self.table.clone(),
                        id: record.id.clone(),
                    }
                } else {
                    map_sqlx_error("create", &self.table, e)
                }
            })?;
            Ok(())
        })
        .await?;

        tracing::debug!(
            table = %self.table,
            tenant = %ctx.tenant,
            id = %record.id,
            "record created"
        );
        Ok(record)
    }

    async fn read(&self, ctx: &CallContext, id: &str) -> StoreResult<Record> {
        with_deadline(ctx, async {
            let mut conn = self.conn(ctx).await?;
            self.fetch_record(conn.get()?, &ctx.tenant, id)
                .await?
                .ok_or_else(|| StoreError::not_found(&self.table, id))
        })
        .await
    }

    async fn update(&self, ctx: &CallContext, id: &str, patch: Patch) -> StoreResult<Record> {
        let record = with_deadline(ctx, async {
            let mut conn = self.conn(ctx).await?;
            let conn = conn.get()?;
            let mut record = self
                .fetch_record(&mut *conn, &ctx.tenant, id)
                .await?
                .ok_or_else(|| StoreError::not_found(&self.table, id))?;
            record.merge(patch);
            record.touch();

            let result = sqlx::query(
                "UPDATE records SET data = $4, updated_at = $5
                 WHERE tenant_id = $1 AND table_name = $2 AND id = $3",
            )
            .bind(ctx.tenant.as_str())
            .bind(&self.table)
            .bind(id)
            .bind(record_data(&record))
            .bind(timestamp(&record, UPDATED_AT))
            .execute(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("update", &self.table, e))?;

            if result.rows_affected() == 0 {
                return Err(StoreError::not_found(&self.table, id));
            }
            Ok(record)
        })
        .await?;

        tracing::debug!(table = %self.table, tenant = %ctx.tenant, id, "record updated");
        Ok(record)
    }

    async fn delete(&self, ctx: &CallContext, id: &str) -> StoreResult<()> {
        with_deadline(ctx, async {
            let mut conn = self.conn(ctx).await?;
            let result = sqlx::query(
                "DELETE FROM records WHERE tenant_id = $1 AND table_name = $2 AND id = $3",
            )
            .bind(ctx.tenant.as_str())
            .bind(&self.table)
            .bind(id)
            .execute(conn.get()?)
            .await
            .map_err(|e| map_sqlx_error("delete", &self.table, e))?;

            if result.rows_affected() == 0 {
                return Err(StoreError::not_found(&self.table, id));
            }
            Ok(())
        })
        .await?;

        tracing::debug!(table = %self.table, tenant = %ctx.tenant, id, "record deleted");
        Ok(())
    }

    async fn list(&self, ctx: &CallContext, params: &ListParams) -> StoreResult<ListResult> {
        params.validate()?;

        let result = with_deadline(ctx, async {
            let mut conn = self.conn(ctx).await?;
            let conn = conn.get()?;
            if params.can_page_natively() {
                self.list_in_sql(conn, ctx, params).await
            } else {
                let candidates = self.fetch_candidates(conn, ctx, params).await?;
                Ok(execute(candidates, params))
            }
        })
        .await?;

        tracing::debug!(
            table = %self.table,
            tenant = %ctx.tenant,
            total = result.total,
            returned = result.records.len(),
            "records listed"
        );
        Ok(result)
    }

    /// Run `statement` with `params` bound positionally, one JSON object per row.
    ///
    /// The statement is not scoped to the caller's tenant.
    async fn query(
        &self,
        ctx: &CallContext,
        statement: &str,
        params: &[Value],
    ) -> StoreResult<Vec<Value>> {
        let sql = format!("SELECT row_to_json(q) FROM ({}) AS q", statement);

        with_deadline(ctx, async {
            let mut conn = self.conn(ctx).await?;
            let mut query = sqlx::query_scalar::<_, Value>(&sql);
            // Scalars bind as their SQL type, arrays and objects as JSONB.
            for param in params {
                query = match param {
                    Value::Null => query.bind(None::<String>),
                    Value::Bool(b) => query.bind(*b),
                    Value::Number(n) => match n.as_i64() {
                        Some(i) => query.bind(i),
                        None => query.bind(n.as_f64()),
                    },
                    Value::String(s) => query.bind(s.clone()),
                    other => query.bind(other.clone()),
                };
            }
            query
                .fetch_all(conn.get()?)
                .await
                .map_err(|e| map_sqlx_error("query", &self.table, e))
        })
        .await
    }
}

/// Register the PostgreSQL provider for each entity
pub fn register<I>(registry: &mut ProviderRegistry, entities: I) -> StoreResult<()>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    for entity in entities {
        registry.register(
            POSTGRES,
            entity.as_ref(),
            Arc::new(|connection: &Connection, table: &str| match connection {
                Connection::Postgres(pool) => {
                    Ok(Arc::new(PostgresProvider::new(pool.clone(), table)) as Arc<dyn Provider>)
                }
                #[allow(unreachable_patterns)]
                other => Err(StoreError::Internal(format!(
                    "postgres provider cannot use {:?}",
                    other
                ))),
            }),
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sql_for(filter: TypedFilter) -> String {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT id");
        push_filter(&mut qb, &filter);
        qb.sql().to_string()
    }

    #[test]
    fn test_string_filter_is_type_guarded() {
        let sql = sql_for(TypedFilter::string("name", StringOperator::Contains, "math"));
        assert!(sql.contains("jsonb_typeof((data -> $1)) = 'string'"));
        assert!(sql.contains("strpos("));
    }

    #[test]
    fn test_case_insensitive_pushes_only_type_guard() {
        let sql = sql_for(TypedFilter::string_ci("name", StringOperator::Equals, "Émile"));
        assert!(sql.ends_with("(jsonb_typeof((data -> $1)) = 'string')"));
        assert!(!sql.contains("lower("));
    }

    #[test]
    fn test_numeric_between() {
        let sql = sql_for(TypedFilter::numeric(
            "amount",
            NumericOperator::Between { low: 1.0, high: 2.0 },
        ));
        assert!(sql.contains("CASE WHEN jsonb_typeof((data -> $1)) = 'number'"));
        assert!(sql.contains("::float8 BETWEEN"));
    }

    #[test]
    fn test_id_filter_uses_column() {
        let sql = sql_for(TypedFilter::string("id", StringOperator::Prefix, "o-"));
        assert!(sql.contains("to_jsonb(id)"));
        assert!(sql.contains("left("));
    }

    #[test]
    fn test_record_data_omits_id() {
        let record = Record::new("o-1").with("amount", 5);
        let data = record_data(&record);
        assert!(data.get("id").is_none());
        assert_eq!(data["amount"], 5);
        let back = row_to_record("o-1".to_string(), data).unwrap();
        assert_eq!(back, record);
    }
}
