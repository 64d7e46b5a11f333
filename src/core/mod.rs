//! Core module containing the record model, the list-query engine and the
//! persistence contracts

pub mod context;
pub mod entity;
pub mod error;
pub mod field;
pub mod provider;
pub mod query;
pub mod repository;
pub mod transaction;

pub use context::CallContext;
pub use entity::{CREATED_AT, Entity, Record, TenantId, UPDATED_AT};
pub use error::{StoreError, StoreResult, TransactionError};
pub use field::FieldValue;
pub use provider::{Patch, Provider};
pub use query::{ListParams, ListQuery, ListResult};
pub use repository::Repository;
pub use transaction::{TransactionBackend, TransactionHandle, TransactionManager};
