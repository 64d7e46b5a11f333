//! Typed access to a record-level provider
//!
//! Entity types only need `Serialize + DeserializeOwned`; records cross the
//! boundary as flat JSON objects, with `id` as the identifier member.

use crate::core::context::CallContext;
use crate::core::entity::Record;
use crate::core::error::{StoreError, StoreResult};
use crate::core::field::FieldValue;
use crate::core::provider::{Patch, Provider};
use crate::core::query::{ListParams, ListResult};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;

/// Typed wrapper around a [`Provider`]
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Serialize, Deserialize)]
/// struct Course { id: String, name: String, credits: i64 }
///
/// let courses: Repository<Course> = Repository::new(host.provider("course")?);
/// let course = courses.get(&ctx, "c-1").await?;
/// ```
pub struct Repository<T> {
    provider: Arc<dyn Provider>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            provider: self.provider.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> Repository<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            provider,
            _marker: PhantomData,
        }
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    pub async fn create(&self, ctx: &CallContext, entity: &T) -> StoreResult<T> {
        let record = to_record(entity)?;
        from_record(self.provider.create(ctx, record).await?)
    }

    pub async fn get(&self, ctx: &CallContext, id: &str) -> StoreResult<T> {
        from_record(self.provider.read(ctx, id).await?)
    }

    /// Apply a JSON merge patch; `null` members remove fields
    pub async fn update(&self, ctx: &CallContext, id: &str, patch: Value) -> StoreResult<T> {
        let patch = patch_from_json(patch)?;
        from_record(self.provider.update(ctx, id, patch).await?)
    }

    pub async fn delete(&self, ctx: &CallContext, id: &str) -> StoreResult<()> {
        self.provider.delete(ctx, id).await
    }

    pub async fn list(&self, ctx: &CallContext, params: &ListParams) -> StoreResult<ListResult<T>> {
        self.provider.list(ctx, params).await?.try_map(from_record::<T>)
    }
}

fn to_record<T: Serialize>(entity: &T) -> StoreResult<Record> {
    Record::from_json(serde_json::to_value(entity)?).ok_or_else(|| StoreError::Serialization {
        message: "entity must serialize to a JSON object".to_string(),
    })
}

fn from_record<T: DeserializeOwned>(record: Record) -> StoreResult<T> {
    Ok(serde_json::from_value(record.to_json())?)
}

fn patch_from_json(patch: Value) -> StoreResult<Patch> {
    match patch {
        Value::Object(map) => Ok(map
            .into_iter()
            .map(|(k, v)| (k, FieldValue::from_json(v)))
            .collect()),
        _ => Err(StoreError::Serialization {
            message: "patch must be a JSON object".to_string(),
        }),
    }
}
