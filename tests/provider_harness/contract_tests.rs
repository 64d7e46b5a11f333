//! Macro-generated test suite for `Provider` contract validation.
//!
//! The `provider_contract_tests!` macro generates a test module that checks
//! any `Arc<dyn Provider>` against the record contract and the list-query
//! semantics every backend must share with the in-memory engine.
//!
//! # Usage
//!
//! ```rust,ignore
//! #[macro_use]
//! mod provider_harness;
//!
//! use provider_harness::*;
//!
//! provider_contract_tests!(memory_provider("invoices"));
//! ```
//!
//! Each test runs under a fresh tenant, so the factory may hand out
//! providers over shared storage.

/// Generate a full `Provider` conformance test suite.
///
/// `$factory` must evaluate to an `Arc<dyn Provider>`. It is re-evaluated
/// for each test.
#[macro_export]
macro_rules! provider_contract_tests {
    ($factory:expr) => {
        mod provider_contract_tests {
            use super::*;
            use bizstore::core::error::StoreError;
            use bizstore::core::field::FieldValue;
            use bizstore::core::provider::Patch;
            use bizstore::core::query::{
                FilterSet, ListParams, NumericOperator, RELEVANCE_SORT_KEY, SearchSpec, SortField,
                SortSpec, StringOperator, TypedFilter,
            };
            use bizstore::core::{CREATED_AT, Record, UPDATED_AT};

            // ==================================================================
            // CRUD
            // ==================================================================

            #[tokio::test]
            async fn test_create_and_read() {
                let provider = $factory;
                let ctx = fresh_ctx();

                let created = provider
                    .create(&ctx, invoice("inv-1", 100.0, "open", false))
                    .await
                    .unwrap();
                assert_eq!(created.id, "inv-1");
                assert!(created.get(CREATED_AT).is_some());
                assert!(created.get(UPDATED_AT).is_some());

                let read = provider.read(&ctx, "inv-1").await.unwrap();
                assert_eq!(read.id, "inv-1");
                assert_field_float(&read, "amount", 100.0);
                assert_field_string(&read, "status", "open");
                assert_eq!(read.get("paid"), Some(&FieldValue::Boolean(false)));
            }

            #[tokio::test]
            async fn test_create_assigns_missing_id() {
                let provider = $factory;
                let ctx = fresh_ctx();

                let created = provider.create(&ctx, Record::new("")).await.unwrap();
                assert!(!created.id.is_empty());
                assert!(provider.read(&ctx, &created.id).await.is_ok());
            }

            #[tokio::test]
            async fn test_create_duplicate_id() {
                let provider = $factory;
                let ctx = fresh_ctx();

                provider.create(&ctx, Record::new("dup")).await.unwrap();
                let err = provider.create(&ctx, Record::new("dup")).await.unwrap_err();
                assert!(
                    matches!(err, StoreError::AlreadyExists { .. }),
                    "expected AlreadyExists, got {:?}",
                    err
                );
            }

            #[tokio::test]
            async fn test_read_missing_is_not_found() {
                let provider = $factory;
                let ctx = fresh_ctx();

                let err = provider.read(&ctx, "missing").await.unwrap_err();
                assert!(err.is_not_found());
                assert_eq!(err.error_code(), "NOT_FOUND");
            }

            #[tokio::test]
            async fn test_read_is_idempotent() {
                let provider = $factory;
                let ctx = fresh_ctx();
                provider
                    .create(&ctx, invoice("inv-1", 42.5, "open", true))
                    .await
                    .unwrap();

                let first = provider.read(&ctx, "inv-1").await.unwrap();
                let second = provider.read(&ctx, "inv-1").await.unwrap();
                assert_eq!(first, second);
            }

            #[tokio::test]
            async fn test_timestamp_text_is_kept_verbatim() {
                let provider = $factory;
                let ctx = fresh_ctx();
                seed(
                    provider.as_ref(),
                    &ctx,
                    vec![
                        Record::new("l1").with("slot", "2024-05-01T10:00:00Z"),
                        Record::new("l2").with("slot", "2024-06-01T09:30:00Z"),
                    ],
                )
                .await;

                let read = provider.read(&ctx, "l1").await.unwrap();
                assert_field_string(&read, "slot", "2024-05-01T10:00:00Z");

                let params = ListParams::new().with_filters(FilterSet::new().with(
                    TypedFilter::string("slot", StringOperator::Prefix, "2024-05"),
                ));
                let result = provider.list(&ctx, &params).await.unwrap();
                assert_eq!(ids(&result.records), vec!["l1"]);
            }

            #[tokio::test]
            async fn test_update_merges_fields() {
                let provider = $factory;
                let ctx = fresh_ctx();
                provider
                    .create(&ctx, invoice("inv-1", 100.0, "open", false))
                    .await
                    .unwrap();

                let mut patch = Patch::new();
                patch.insert("status".to_string(), FieldValue::from("paid"));
                patch.insert("paid".to_string(), FieldValue::Null);
                let updated = provider.update(&ctx, "inv-1", patch).await.unwrap();

                assert_field_string(&updated, "status", "paid");
                assert!(updated.get("paid").is_none());
                assert_field_float(&updated, "amount", 100.0);

                let read = provider.read(&ctx, "inv-1").await.unwrap();
                assert_field_string(&read, "status", "paid");
                assert!(read.get("paid").is_none());
            }

            #[tokio::test]
            async fn test_update_missing_is_not_found() {
                let provider = $factory;
                let ctx = fresh_ctx();

                let err = provider
                    .update(&ctx, "missing", Patch::new())
                    .await
                    .unwrap_err();
                assert!(err.is_not_found());
            }

            #[tokio::test]
            async fn test_delete() {
                let provider = $factory;
                let ctx = fresh_ctx();
                provider.create(&ctx, Record::new("gone")).await.unwrap();

                provider.delete(&ctx, "gone").await.unwrap();
                assert!(provider.read(&ctx, "gone").await.unwrap_err().is_not_found());
                assert!(provider.delete(&ctx, "gone").await.unwrap_err().is_not_found());
            }

            #[tokio::test]
            async fn test_tenants_are_isolated() {
                let provider = $factory;
                let acme = fresh_ctx();
                let globex = fresh_ctx();

                provider.create(&acme, Record::new("shared-id")).await.unwrap();
                assert!(provider.read(&globex, "shared-id").await.unwrap_err().is_not_found());
                provider.create(&globex, Record::new("shared-id")).await.unwrap();

                let listed = provider.list(&acme, &ListParams::new()).await.unwrap();
                assert_eq!(listed.total, 1);
            }

            // ==================================================================
            // List: pagination
            // ==================================================================

            #[tokio::test]
            async fn test_list_empty() {
                let provider = $factory;
                let ctx = fresh_ctx();

                let result = provider.list(&ctx, &ListParams::new()).await.unwrap();
                assert!(result.records.is_empty());
                assert_eq!(result.total, 0);
            }

            #[tokio::test]
            async fn test_list_unpaged_orders_by_id() {
                let provider = $factory;
                let ctx = fresh_ctx();
                let mut records = numbered(5);
                records.reverse();
                seed(provider.as_ref(), &ctx, records).await;

                let result = provider.list(&ctx, &ListParams::new()).await.unwrap();
                assert_eq!(ids(&result.records), vec!["r000", "r001", "r002", "r003", "r004"]);
                assert_eq!(result.pagination.total_pages, None);
            }

            #[tokio::test]
            async fn test_list_pages() {
                let provider = $factory;
                let ctx = fresh_ctx();
                seed(provider.as_ref(), &ctx, numbered(23)).await;

                let page = provider
                    .list(&ctx, &ListParams::new().with_pagination(3, 10))
                    .await
                    .unwrap();
                assert_eq!(ids(&page.records), vec!["r020", "r021", "r022"]);
                assert_eq!(page.total, 23);
                assert_eq!(page.pagination.total_pages, Some(3));
                assert_eq!(page.pagination.current_page, Some(3));
                assert!(!page.pagination.has_next);
                assert!(page.pagination.has_prev);

                let first = provider
                    .list(&ctx, &ListParams::new().with_pagination(1, 10))
                    .await
                    .unwrap();
                assert_eq!(first.records.len(), 10);
                assert!(first.pagination.has_next);
            }

            #[tokio::test]
            async fn test_list_page_past_end() {
                let provider = $factory;
                let ctx = fresh_ctx();
                seed(provider.as_ref(), &ctx, numbered(23)).await;

                let page = provider
                    .list(&ctx, &ListParams::new().with_pagination(9, 10))
                    .await
                    .unwrap();
                assert!(page.records.is_empty());
                assert_eq!(page.total, 23);
                assert!(!page.pagination.has_next);
            }

            #[tokio::test]
            async fn test_list_rejects_invalid_pagination() {
                let provider = $factory;
                let ctx = fresh_ctx();

                let err = provider
                    .list(&ctx, &ListParams::new().with_pagination(0, 10))
                    .await
                    .unwrap_err();
                assert!(matches!(err, StoreError::InvalidQuery { .. }));
            }

            #[tokio::test]
            async fn test_list_is_idempotent() {
                let provider = $factory;
                let ctx = fresh_ctx();
                seed(provider.as_ref(), &ctx, amount_scenario()).await;
                seed(
                    provider.as_ref(),
                    &ctx,
                    vec![
                        invoice("e", 60.0, "open", false).with("memo", "open balance"),
                        invoice("f", 90.0, "overdue", false).with("memo", "opening fee"),
                    ],
                )
                .await;

                let params = ListParams::new()
                    .with_filters(
                        FilterSet::new()
                            .with(TypedFilter::numeric(
                                "amount",
                                NumericOperator::GreaterOrEqual(50.0),
                            ))
                            .with(TypedFilter::boolean("paid", false)),
                    )
                    .with_search(SearchSpec::new("open", &["status", "memo"]))
                    .with_sort(
                        SortSpec::new()
                            .by(SortField::desc(RELEVANCE_SORT_KEY))
                            .by(SortField::asc("amount")),
                    )
                    .with_pagination(1, 2);

                let first = provider.list(&ctx, &params).await.unwrap();
                let second = provider.list(&ctx, &params).await.unwrap();

                assert_eq!(first.records, second.records);
                assert_eq!(first.total, second.total);
                assert_eq!(first.pagination, second.pagination);
                assert_eq!(first.search_results, second.search_results);
                assert_eq!(first.total, 3);
                assert_eq!(ids(&first.records), vec!["e", "a"]);
            }

            // ==================================================================
            // List: filters and sorting
            // ==================================================================

            #[tokio::test]
            async fn test_numeric_filter_and_sort() {
                let provider = $factory;
                let ctx = fresh_ctx();
                seed(provider.as_ref(), &ctx, amount_scenario()).await;

                let params = ListParams::new()
                    .with_filters(FilterSet::new().with(TypedFilter::numeric(
                        "amount",
                        NumericOperator::GreaterThan(50.0),
                    )))
                    .with_sort(SortSpec::new().by(SortField::desc("amount")));

                let result = provider.list(&ctx, &params).await.unwrap();
                assert_eq!(ids(&result.records), vec!["c", "a", "d"]);
                assert_eq!(result.total, 3);
            }

            #[tokio::test]
            async fn test_numeric_filter_pages_natively() {
                let provider = $factory;
                let ctx = fresh_ctx();
                seed(provider.as_ref(), &ctx, numbered(23)).await;

                let params = ListParams::new()
                    .with_filters(FilterSet::new().with(TypedFilter::numeric(
                        "seq",
                        NumericOperator::Between { low: 5.0, high: 14.0 },
                    )))
                    .with_pagination(2, 4);

                let result = provider.list(&ctx, &params).await.unwrap();
                assert_eq!(ids(&result.records), vec!["r009", "r010", "r011", "r012"]);
                assert_eq!(result.total, 10);
                assert_eq!(result.pagination.total_pages, Some(3));
            }

            #[tokio::test]
            async fn test_string_filters() {
                let provider = $factory;
                let ctx = fresh_ctx();
                seed(provider.as_ref(), &ctx, amount_scenario()).await;

                let exact = ListParams::new().with_filters(FilterSet::new().with(
                    TypedFilter::string("status", StringOperator::Equals, "open"),
                ));
                let result = provider.list(&ctx, &exact).await.unwrap();
                assert_eq!(ids(&result.records), vec!["a", "b"]);

                let insensitive = ListParams::new().with_filters(FilterSet::new().with(
                    TypedFilter::string_ci("status", StringOperator::Equals, "OPEN"),
                ));
                let result = provider.list(&ctx, &insensitive).await.unwrap();
                assert_eq!(ids(&result.records), vec!["a", "b", "d"]);

                let suffix = ListParams::new().with_filters(FilterSet::new().with(
                    TypedFilter::string("status", StringOperator::Suffix, "due"),
                ));
                let result = provider.list(&ctx, &suffix).await.unwrap();
                assert_eq!(ids(&result.records), vec!["c"]);
            }

            #[tokio::test]
            async fn test_filters_combine_with_and() {
                let provider = $factory;
                let ctx = fresh_ctx();
                seed(provider.as_ref(), &ctx, amount_scenario()).await;

                let params = ListParams::new().with_filters(
                    FilterSet::new()
                        .with(TypedFilter::boolean("paid", true))
                        .with(TypedFilter::numeric("amount", NumericOperator::LessOrEqual(50.0))),
                );
                let result = provider.list(&ctx, &params).await.unwrap();
                assert_eq!(ids(&result.records), vec!["b"]);
            }

            #[tokio::test]
            async fn test_missing_or_mistyped_field_never_matches() {
                let provider = $factory;
                let ctx = fresh_ctx();
                seed(
                    provider.as_ref(),
                    &ctx,
                    vec![
                        Record::new("x1").with("amount", 80.0),
                        Record::new("x2").with("amount", "80"),
                        Record::new("x3"),
                    ],
                )
                .await;

                let numeric = ListParams::new().with_filters(FilterSet::new().with(
                    TypedFilter::numeric("amount", NumericOperator::GreaterThan(10.0)),
                ));
                let result = provider.list(&ctx, &numeric).await.unwrap();
                assert_eq!(ids(&result.records), vec!["x1"]);

                let not_equals = ListParams::new().with_filters(FilterSet::new().with(
                    TypedFilter::string("amount", StringOperator::NotEquals, "90"),
                ));
                let result = provider.list(&ctx, &not_equals).await.unwrap();
                assert_eq!(ids(&result.records), vec!["x2"]);
            }

            #[tokio::test]
            async fn test_sort_puts_missing_values_first() {
                let provider = $factory;
                let ctx = fresh_ctx();
                seed(
                    provider.as_ref(),
                    &ctx,
                    vec![
                        Record::new("p1").with("rank", 2),
                        Record::new("p2"),
                        Record::new("p3").with("rank", 1),
                    ],
                )
                .await;

                let params =
                    ListParams::new().with_sort(SortSpec::new().by(SortField::asc("rank")));
                let result = provider.list(&ctx, &params).await.unwrap();
                assert_eq!(ids(&result.records), vec!["p2", "p3", "p1"]);
            }

            // ==================================================================
            // List: search
            // ==================================================================

            #[tokio::test]
            async fn test_search_scores() {
                let provider = $factory;
                let ctx = fresh_ctx();
                seed(
                    provider.as_ref(),
                    &ctx,
                    vec![
                        course("c1", "Advanced Mathematics"),
                        course("c2", "Physics"),
                        course("c3", "Aftermath"),
                    ],
                )
                .await;

                let params = ListParams::new().with_search(SearchSpec::new("Math", &["name"]));
                let result = provider.list(&ctx, &params).await.unwrap();
                assert_eq!(ids(&result.records), vec!["c1", "c3"]);
                assert_eq!(result.total, 2);
                assert_eq!(result.search_results[0].record_id, "c1");
                assert_eq!(result.search_results[0].score, 0.8);
                assert_eq!(result.search_results[0].highlights, vec!["Math".to_string()]);
                assert_eq!(result.search_results[1].score, 0.5);
            }

            #[tokio::test]
            async fn test_search_sorted_by_relevance_and_paged() {
                let provider = $factory;
                let ctx = fresh_ctx();
                seed(
                    provider.as_ref(),
                    &ctx,
                    vec![
                        course("c1", "Advanced Mathematics"),
                        course("c2", "Aftermath"),
                        course("c3", "math"),
                        course("c4", "History"),
                    ],
                )
                .await;

                let params = ListParams::new()
                    .with_search(SearchSpec::new("math", &["name"]))
                    .with_sort(SortSpec::new().by(SortField::desc(RELEVANCE_SORT_KEY)))
                    .with_pagination(1, 2);
                let result = provider.list(&ctx, &params).await.unwrap();

                assert_eq!(ids(&result.records), vec!["c3", "c1"]);
                assert_eq!(result.total, 3);
                let scored: Vec<&str> = result
                    .search_results
                    .iter()
                    .map(|r| r.record_id.as_str())
                    .collect();
                assert_eq!(scored, vec!["c3", "c1"]);
            }

            // ==================================================================
            // Concurrency
            // ==================================================================

            #[tokio::test]
            async fn test_concurrent_creates() {
                let provider = $factory;
                let ctx = fresh_ctx();

                let mut handles = Vec::new();
                for i in 0..10 {
                    let provider = provider.clone();
                    let ctx = ctx.clone();
                    handles.push(tokio::spawn(async move {
                        provider
                            .create(&ctx, Record::new(format!("job-{:02}", i)))
                            .await
                    }));
                }
                for handle in handles {
                    handle.await.unwrap().unwrap();
                }

                let result = provider.list(&ctx, &ListParams::new()).await.unwrap();
                assert_eq!(result.total, 10);
            }
        }
    };
}
