//! # bizstore
//!
//! A generic list-query engine and a pluggable persistence layer for
//! multi-tenant business backends.
//!
//! ## Features
//!
//! - **Uniform list queries**: typed filters, relevance search, multi-key
//!   sorting and page-based pagination over any entity
//! - **One engine, many backends**: in-memory, PostgreSQL (`postgres`
//!   feature) and MongoDB (`mongodb_backend` feature) providers return the
//!   same results for the same `ListParams`
//! - **Explicit registry**: providers are wired per (provider, entity) pair
//!   at startup, never discovered at runtime
//! - **Units of work**: `TransactionManager` reuses an open transaction for
//!   nested calls and rolls back on failure
//! - **Tenant isolation**: every operation is scoped by the `CallContext`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use bizstore::prelude::*;
//!
//! #[derive(Serialize, Deserialize)]
//! struct Invoice { id: String, amount: f64, status: String }
//!
//! let config = AppConfig::default().with_entity(EntityConfig::new("invoice"));
//! let host = AppBuilder::new(config).build().await?;
//! let invoices = host.repository::<Invoice>("invoice")?;
//!
//! let ctx = CallContext::new("acme");
//! let params = ListParams::new()
//!     .with_filters(FilterSet::new().with(TypedFilter::numeric(
//!         "amount",
//!         NumericOperator::GreaterThan(50.0),
//!     )))
//!     .with_sort(SortSpec::parse("amount:desc")?)
//!     .with_pagination(1, 10);
//!
//! let page = invoices.list(&ctx, &params).await?;
//! println!("{} of {}", page.records.len(), page.total);
//! ```

pub mod app;
pub mod config;
pub mod core;
pub mod storage;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Core ===
    pub use crate::core::{
        CallContext, Entity, FieldValue, Patch, Provider, Record, Repository, StoreError,
        StoreResult, TenantId, TransactionError, TransactionHandle, TransactionManager,
    };

    // === Query ===
    pub use crate::core::query::{
        FilterSet, ListParams, ListQuery, ListResult, NumericOperator, PaginationRequest,
        PaginationResponse, SearchResult, SearchSpec, SortDirection, SortField, SortSpec,
        StringOperator, TypedFilter,
    };

    // === Storage ===
    pub use crate::storage::{Connection, InMemoryProvider, InMemoryStore, ProviderRegistry};
    #[cfg(feature = "mongodb_backend")]
    pub use crate::storage::MongoProvider;
    #[cfg(feature = "postgres")]
    pub use crate::storage::PostgresProvider;

    // === Config / composition ===
    pub use crate::app::{AppBuilder, AppHost, init_tracing};
    pub use crate::config::{AppConfig, DatabaseProvider, EntityConfig};

    // === External dependencies ===
    pub use anyhow::Result;
    pub use async_trait::async_trait;
    pub use serde::{Deserialize, Serialize};
}
