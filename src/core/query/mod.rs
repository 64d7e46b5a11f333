//! Backend-independent list queries
//!
//! The models (filters, sort, search, pagination) describe a request; the
//! [`engine`] evaluates them over an in-memory collection.

pub mod engine;
pub mod filter;
pub mod pagination;
pub mod params;
pub mod search;
pub mod sort;

pub use engine::{ListParams, ListResult, execute, finish};
pub use filter::{
    BooleanOperator, FilterCondition, FilterKind, FilterSet, NumericOperator, StringOperator,
    TypedFilter,
};
pub use pagination::{PaginationRequest, PaginationResponse, paginate};
pub use params::{ListQuery, parse_filter_object};
pub use search::{EXACT_SCORE, PREFIX_SCORE, SUBSTRING_SCORE, SearchResult, SearchSpec, search};
pub use sort::{RELEVANCE_SORT_KEY, SortDirection, SortField, SortSpec, sort_records};
