//! The list-query engine: filter, search, sort, paginate
//!
//! Every provider's `list` ends here, either directly (in-memory) or after
//! pushing part of the work down to its backend. Keeping one implementation
//! is what makes backends interchangeable from the caller's side.

use super::filter::{FilterKind, FilterSet};
use super::pagination::{PaginationRequest, PaginationResponse, paginate};
use super::search::{SearchResult, SearchSpec, search};
use super::sort::{SortSpec, sort_records};
use crate::core::entity::{Entity, Record};
use crate::core::error::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The single request shape passed to a provider's `list`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub filters: FilterSet,

    #[serde(default)]
    pub sort: SortSpec,

    #[serde(default)]
    pub search: Option<SearchSpec>,

    #[serde(default)]
    pub pagination: PaginationRequest,
}

impl ListParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filters(mut self, filters: FilterSet) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_sort(mut self, sort: SortSpec) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_search(mut self, search: SearchSpec) -> Self {
        self.search = Some(search);
        self
    }

    pub fn with_pagination(mut self, page: i32, limit: i32) -> Self {
        self.pagination = PaginationRequest::new(page, limit);
        self
    }

    /// Active search spec, if any
    pub fn active_search(&self) -> Option<&SearchSpec> {
        self.search.as_ref().filter(|s| s.is_active())
    }

    /// Whether a backend that evaluates numeric and boolean filters exactly
    /// can also order by id and paginate without the engine.
    ///
    /// String filters are excluded: timestamps stored as text are strings
    /// to a backend but timestamps to the engine.
    pub fn can_page_natively(&self) -> bool {
        self.active_search().is_none()
            && self.sort.is_empty()
            && self.filters.iter().all(|f| f.kind() != FilterKind::String)
    }

    /// Reject malformed parameters before any backend is queried.
    pub fn validate(&self) -> StoreResult<()> {
        self.filters.validate()?;
        self.pagination.validate()?;

        if let Some(search) = self.active_search()
            && search.fields.is_empty()
        {
            return Err(StoreError::invalid_query(
                "search query given without any field to search",
            ));
        }

        if self.sort.iter().any(|s| s.field.trim().is_empty()) {
            return Err(StoreError::invalid_query("sort field name is empty"));
        }

        Ok(())
    }
}

/// The uniform shape returned by every provider's `list`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListResult<T = Record> {
    pub records: Vec<T>,

    /// Matches after filters and search, before pagination
    pub total: u64,

    pub pagination: PaginationResponse,

    /// Relevance metadata for the returned page, in page order
    pub search_results: Vec<SearchResult>,
}

impl<T> ListResult<T> {
    pub fn empty(pagination: &PaginationRequest) -> Self {
        Self {
            records: Vec::new(),
            total: 0,
            pagination: PaginationResponse::new(pagination, 0),
            search_results: Vec::new(),
        }
    }

    /// Convert the records while keeping the metadata
    pub fn try_map<U, E>(self, f: impl FnMut(T) -> Result<U, E>) -> Result<ListResult<U>, E> {
        Ok(ListResult {
            records: self.records.into_iter().map(f).collect::<Result<_, _>>()?,
            total: self.total,
            pagination: self.pagination,
            search_results: self.search_results,
        })
    }
}

/// Run the full pipeline over an in-memory snapshot.
///
/// Pure and infallible: malformed pagination values are clamped, not
/// rejected (see [`ListParams::validate`] for the boundary check).
pub fn execute<E: Entity>(records: Vec<E>, params: &ListParams) -> ListResult<E> {
    let filtered = params.filters.apply(records);
    finish(filtered, params)
}

/// Search, sort and paginate records that already passed the filters.
///
/// Backends that push filters down to their native query call this on the
/// candidate rows they fetched.
pub fn finish<E: Entity>(filtered: Vec<E>, params: &ListParams) -> ListResult<E> {
    let (mut records, scores) = match params.active_search() {
        Some(spec) => {
            let results = search(&filtered, spec);
            let scores: HashMap<String, SearchResult> = results
                .into_iter()
                .map(|r| (r.record_id.clone(), r))
                .collect();
            let matched = filtered
                .into_iter()
                .filter(|r| scores.contains_key(r.id()))
                .collect();
            (matched, scores)
        }
        None => (filtered, HashMap::new()),
    };

    let relevance: HashMap<String, f64> = scores
        .iter()
        .map(|(id, r)| (id.clone(), r.score))
        .collect();
    sort_records(&mut records, &params.sort, &relevance);

    let total = records.len() as u64;
    let (page, pagination) = paginate(records, &params.pagination);

    let mut scores = scores;
    let search_results = page
        .iter()
        .filter_map(|r| scores.remove(r.id()))
        .collect();

    ListResult {
        records: page,
        total,
        pagination,
        search_results,
    }
}
