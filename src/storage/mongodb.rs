//! MongoDB provider using the official MongoDB async driver.
//!
//! # Feature flag
//!
//! This module is gated behind the `mongodb_backend` feature flag:
//! ```toml
//! [dependencies]
//! bizstore = { version = "0.1", features = ["mongodb_backend"] }
//! ```
//!
//! # Storage model
//!
//! One collection per table. Each record is stored as
//! `{_id: "<tenant>:<id>", tenant_id, id, fields: {...}}`, so identifiers
//! only need to be unique per tenant.
//!
//! Filters are translated to BSON with `$type` guards, so missing or
//! mistyped fields never match. Pagination follows the same policy as the
//! PostgreSQL provider (see [`ListParams::can_page_natively`]).
//!
//! MongoDB runs without transactions here: pair it with
//! `TransactionManager::noop()`.

use crate::core::context::CallContext;
use crate::core::entity::{CREATED_AT, Record, UPDATED_AT};
use crate::core::error::{StoreError, StoreResult};
use crate::core::field::FieldValue;
use crate::core::provider::{Patch, Provider};
use crate::core::query::{
    FilterCondition, ListParams, ListResult, NumericOperator, PaginationResponse, StringOperator,
    TypedFilter, execute,
};
use crate::storage::registry::{Connection, MONGODB, ProviderRegistry};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::bson::{Bson, Document, doc};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::ReturnDocument;
use mongodb::{Client, Collection, Database};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

const DUPLICATE_KEY: i32 = 11000;

/// Connect and select the database
pub async fn connect(url: &str, database: &str) -> Result<Database> {
    let client = Client::with_uri_str(url)
        .await
        .map_err(|e| anyhow!("Failed to connect to MongoDB: {}", e))?;
    Ok(client.database(database))
}

// ---------------------------------------------------------------------------
// Conversion helpers
// ---------------------------------------------------------------------------

fn document_id(ctx: &CallContext, id: &str) -> String {
    format!("{}:{}", ctx.tenant, id)
}

fn record_to_document(ctx: &CallContext, record: &Record) -> StoreResult<Document> {
    let mut fields = record.to_json();
    if let Value::Object(map) = &mut fields {
        map.remove("id");
    }
    let fields = match mongodb::bson::to_bson(&fields) {
        Ok(Bson::Document(d)) => d,
        Ok(_) => {
            return Err(StoreError::Serialization {
                message: "record fields did not convert to a BSON document".to_string(),
            });
        }
        Err(e) => {
            return Err(StoreError::Serialization {
                message: format!("Failed to convert record to BSON: {}", e),
            });
        }
    };

    Ok(doc! {
        "_id": document_id(ctx, &record.id),
        "tenant_id": ctx.tenant.as_str(),
        "id": record.id.as_str(),
        "fields": fields,
    })
}

fn document_to_record(doc: Document) -> StoreResult<Record> {
    let id = doc
        .get_str("id")
        .map_err(|e| StoreError::Serialization {
            message: format!("document has no string id: {}", e),
        })?
        .to_string();
    let fields = match doc.get("fields") {
        Some(Bson::Document(fields)) => Bson::Document(fields.clone()).into_relaxed_extjson(),
        _ => Value::Object(Default::default()),
    };

    let mut record = Record::from_json(fields).ok_or_else(|| StoreError::Serialization {
        message: format!("document '{}' fields are not an object", id),
    })?;
    record.id = id;
    Ok(record)
}

fn field_to_bson(value: &FieldValue) -> StoreResult<Bson> {
    mongodb::bson::to_bson(&value.to_json()).map_err(|e| StoreError::Serialization {
        message: format!("Failed to convert field to BSON: {}", e),
    })
}

/// Build a `$set`/`$unset` update applying `patch` with merge-patch
/// semantics and refreshing `updated_at` to `now`.
fn update_document(patch: Patch, now: &str) -> StoreResult<Document> {
    let mut set = Document::new();
    let mut unset = Document::new();
    for (field, value) in patch {
        if field == "id" || field == UPDATED_AT {
            continue;
        }
        let path = format!("fields.{}", field);
        if !value.is_null() {
            set.insert(path, field_to_bson(&value)?);
        } else if field == CREATED_AT {
            // Removing the creation stamp re-stamps it, as a fresh write would.
            set.insert(path, now);
        } else {
            unset.insert(path, "");
        }
    }
    set.insert(format!("fields.{}", UPDATED_AT), now);

    let mut update = doc! { "$set": set };
    if !unset.is_empty() {
        update.insert("$unset", unset);
    }
    Ok(update)
}

fn map_mongo_error(operation: &str, table: &str, err: mongodb::error::Error) -> StoreError {
    match *err.kind {
        ErrorKind::Io(_)
        | ErrorKind::ServerSelection { .. }
        | ErrorKind::ConnectionPoolCleared { .. } => StoreError::unavailable(MONGODB, err),
        _ => StoreError::backend(MONGODB, operation, table, err),
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        &*err.kind,
        ErrorKind::Write(WriteFailure::WriteError(e)) if e.code == DUPLICATE_KEY
    )
}

async fn with_deadline<T>(
    ctx: &CallContext,
    fut: impl Future<Output = StoreResult<T>>,
) -> StoreResult<T> {
    match ctx.timeout {
        Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
            StoreError::unavailable(MONGODB, format!("deadline of {:?} exceeded", limit))
        })?,
        None => fut.await,
    }
}

// ---------------------------------------------------------------------------
// Filter translation
// ---------------------------------------------------------------------------

fn field_path(field: &str) -> String {
    if field == "id" {
        "id".to_string()
    } else {
        format!("fields.{}", field)
    }
}

fn text_regex(pattern: String, case_insensitive: bool) -> Document {
    if case_insensitive {
        doc! { "$regex": pattern, "$options": "i" }
    } else {
        doc! { "$regex": pattern }
    }
}

/// One filter as a BSON condition on the field's path
fn filter_document(filter: &TypedFilter) -> Document {
    let path = field_path(&filter.field);
    let condition = match &filter.condition {
        FilterCondition::String {
            operator,
            value,
            case_insensitive,
        } => {
            let escaped = regex::escape(value);
            let mut condition = doc! { "$type": "string" };
            match (operator, *case_insensitive) {
                (StringOperator::Equals, false) => {
                    condition.insert("$eq", value.as_str());
                }
                (StringOperator::NotEquals, false) => {
                    condition.insert("$ne", value.as_str());
                }
                (StringOperator::Equals, true) => {
                    condition.extend(text_regex(format!(r"\A{}\z", escaped), true));
                }
                (StringOperator::NotEquals, true) => {
                    condition.insert("$not", text_regex(format!(r"\A{}\z", escaped), true));
                }
                (StringOperator::Contains, ci) => {
                    condition.extend(text_regex(escaped, ci));
                }
                (StringOperator::Prefix, ci) => {
                    condition.extend(text_regex(format!(r"\A{}", escaped), ci));
                }
                (StringOperator::Suffix, ci) => {
                    condition.extend(text_regex(format!(r"{}\z", escaped), ci));
                }
            }
            condition
        }
        FilterCondition::Numeric { operator } => {
            let mut condition = doc! { "$type": "number" };
            match *operator {
                NumericOperator::Equals(v) => condition.insert("$eq", v),
                NumericOperator::GreaterThan(v) => condition.insert("$gt", v),
                NumericOperator::LessThan(v) => condition.insert("$lt", v),
                NumericOperator::GreaterOrEqual(v) => condition.insert("$gte", v),
                NumericOperator::LessOrEqual(v) => condition.insert("$lte", v),
                NumericOperator::Between { low, high } => {
                    condition.insert("$gte", low);
                    condition.insert("$lte", high)
                }
            };
            condition
        }
        FilterCondition::Boolean { value, .. } => doc! { "$type": "bool", "$eq": *value },
    };
    doc! { path: condition }
}

fn scope_document(ctx: &CallContext, params: &ListParams) -> Document {
    let mut scope = doc! { "tenant_id": ctx.tenant.as_str() };
    if !params.filters.is_empty() {
        let conditions: Vec<Document> = params.filters.iter().map(filter_document).collect();
        scope.insert("$and", conditions);
    }
    scope
}

// ---------------------------------------------------------------------------
// MongoProvider
// ---------------------------------------------------------------------------

/// MongoDB provider bound to one collection
#[derive(Clone, Debug)]
pub struct MongoProvider {
    database: Database,
    table: String,
}

impl MongoProvider {
    pub fn new(database: Database, table: impl Into<String>) -> Self {
        Self {
            database,
            table: table.into(),
        }
    }

    fn collection(&self) -> Collection<Document> {
        self.database.collection(&self.table)
    }

    fn reject_transaction(&self, ctx: &CallContext) -> StoreResult<()> {
        match &ctx.transaction {
            Some(_) => Err(StoreError::Unsupported {
                backend: MONGODB.to_string(),
                operation: "transactions".to_string(),
            }),
            None => Ok(()),
        }
    }

    async fn find_one(&self, ctx: &CallContext, id: &str) -> StoreResult<Option<Record>> {
        self.collection()
            .find_one(doc! { "_id": document_id(ctx, id) })
            .await
            .map_err(|e| map_mongo_error("read", &self.table, e))?
            .map(document_to_record)
            .transpose()
    }

    async fn collect(
        &self,
        filter: Document,
        paging: Option<(u64, i64)>,
    ) -> StoreResult<Vec<Record>> {
        let collection = self.collection();
        let mut find = collection.find(filter).sort(doc! { "id": 1 });
        if let Some((skip, limit)) = paging {
            find = find.skip(skip).limit(limit);
        }
        let docs: Vec<Document> = find
            .await
            .map_err(|e| map_mongo_error("list", &self.table, e))?
            .try_collect()
            .await
            .map_err(|e| map_mongo_error("list", &self.table, e))?;

        docs.into_iter().map(document_to_record).collect()
    }
}

#[async_trait]
impl Provider for MongoProvider {
    fn table(&self) -> &str {
        &self.table
    }

    fn backend(&self) -> &'static str {
        MONGODB
    }

    async fn create(&self, ctx: &CallContext, mut record: Record) -> StoreResult<Record> {
        self.reject_transaction(ctx)?;
        if record.id.trim().is_empty() {
            record.id = Uuid::new_v4().to_string();
        }
        record.touch();
        let document = record_to_document(ctx, &record)?;

        with_deadline(ctx, async {
            self.collection()
                .insert_one(document)
                .await
                .map_err(|e| {
                    if is_duplicate_key(&e) {
                        StoreError::AlreadyExists {
                            table: self.table.clone(),
                            id: record.id.clone(),
                        }
                    } else {
                        map_mongo_error("create", &self.table, e)
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
        self.reject_transaction(ctx)?;
        with_deadline(ctx, async {
            self.find_one(ctx, id)
                .await?
                .ok_or_else(|| StoreError::not_found(&self.table, id))
        })
        .await
    }

    async fn update(&self, ctx: &CallContext, id: &str, patch: Patch) -> StoreResult<Record> {
        self.reject_transaction(ctx)?;
        let update = update_document(patch, &Utc::now().to_rfc3339())?;
        let record = with_deadline(ctx, async {
            let updated = self
                .collection()
                .find_one_and_update(doc! { "_id": document_id(ctx, id) }, update)
                .return_document(ReturnDocument::After)
                .await
                .map_err(|e| map_mongo_error("update", &self.table, e))?
                .ok_or_else(|| StoreError::not_found(&self.table, id))?;
            document_to_record(updated)
        })
        .await?;

        tracing::debug!(table = %self.table, tenant = %ctx.tenant, id, "record updated");
        Ok(record)
    }

    async fn delete(&self, ctx: &CallContext, id: &str) -> StoreResult<()> {
        self.reject_transaction(ctx)?;
        with_deadline(ctx, async {
            let result = self
                .collection()
                .delete_one(doc! { "_id": document_id(ctx, id) })
                .await
                .map_err(|e| map_mongo_error("delete", &self.table, e))?;
            if result.deleted_count == 0 {
                return Err(StoreError::not_found(&self.table, id));
            }
            Ok(())
        })
        .await?;

        tracing::debug!(table = %self.table, tenant = %ctx.tenant, id, "record deleted");
        Ok(())
    }

    async fn list(&self, ctx: &CallContext, params: &ListParams) -> StoreResult<ListResult> {
        self.reject_transaction(ctx)?;
        params.validate()?;
        let scope = scope_document(ctx, params);

        let result = with_deadline(ctx, async {
            if !params.can_page_natively() {
                let candidates = self.collect(scope, None).await?;
                return Ok(execute(candidates, params));
            }

            let paging = params.pagination;
            let total = self
                .collection()
                .count_documents(scope.clone())
                .await
                .map_err(|e| map_mongo_error("list", &self.table, e))?;
            let window = paging
                .is_paged()
                .then(|| (paging.offset(), i64::from(paging.limit)));
            let records = self.collect(scope, window).await?;

            Ok(ListResult {
                records,
                total,
                pagination: PaginationResponse::new(&paging, total),
                search_results: Vec::new(),
            })
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

    /// `statement` is a JSON filter document, scoped to the caller's tenant.
    /// Record fields live under `fields.`; `params` are unused.
    async fn query(
        &self,
        ctx: &CallContext,
        statement: &str,
        _params: &[Value],
    ) -> StoreResult<Vec<Value>> {
        self.reject_transaction(ctx)?;
        let filter: Value = serde_json::from_str(statement).map_err(|e| {
            StoreError::invalid_query(format!("MongoDB query must be a JSON object: {}", e))
        })?;
        let mut filter = match mongodb::bson::to_bson(&filter) {
            Ok(Bson::Document(d)) => d,
            _ => return Err(StoreError::invalid_query("MongoDB query must be a JSON object")),
        };
        filter.insert("tenant_id", ctx.tenant.as_str());

        with_deadline(ctx, async {
            let records = self.collect(filter, None).await?;
            Ok(records.iter().map(Record::to_json).collect())
        })
        .await
    }
}

/// Register the MongoDB provider for each entity
pub fn register<I>(registry: &mut ProviderRegistry, entities: I) -> StoreResult<()>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    for entity in entities {
        registry.register(
            MONGODB,
            entity.as_ref(),
            Arc::new(|connection: &Connection, table: &str| match connection {
                Connection::Mongo(database) => {
                    Ok(Arc::new(MongoProvider::new(database.clone(), table)) as Arc<dyn Provider>)
                }
                #[allow(unreachable_patterns)]
                other => Err(StoreError::Internal(format!(
                    "mongodb provider cannot use {:?}",
                    other
                ))),
            }),
        )?;
    }
    Ok(())
}
