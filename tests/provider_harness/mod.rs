//! Shared test harness for provider backend testing
//!
//! Provides record builders, a fresh-tenant context helper and the
//! `provider_contract_tests!` macro.
//!
//! # Usage
//!
//! From any integration test file in `tests/`:
//! ```rust,ignore
//! #[macro_use]
//! mod provider_harness;
//! use provider_harness::*;
//! ```

#![allow(dead_code)]

#[macro_use]
pub mod contract_tests;

use bizstore::core::context::CallContext;
use bizstore::core::entity::Record;
use bizstore::core::field::FieldValue;
use bizstore::core::provider::Provider;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Contexts
// ---------------------------------------------------------------------------

/// Context bound to a tenant nobody else uses.
///
/// Backends shared across tests stay isolated without truncating tables.
pub fn fresh_ctx() -> CallContext {
    CallContext::new(format!("tenant-{}", Uuid::new_v4()))
}

// ---------------------------------------------------------------------------
// Record builders
// ---------------------------------------------------------------------------

/// An invoice-like record covering string, numeric and boolean fields
pub fn invoice(id: &str, amount: f64, status: &str, paid: bool) -> Record {
    Record::new(id)
        .with("amount", amount)
        .with("status", status)
        .with("paid", paid)
}

/// The four invoices of the "amount > 50, newest amount first" scenario
pub fn amount_scenario() -> Vec<Record> {
    vec![
        invoice("a", 100.0, "open", false),
        invoice("b", 20.0, "open", true),
        invoice("c", 250.0, "overdue", false),
        invoice("d", 75.0, "Open", true),
    ]
}

pub fn course(id: &str, name: &str) -> Record {
    Record::new(id).with("name", name)
}

/// `n` records with zero-padded ids so id order equals creation order
pub fn numbered(n: usize) -> Vec<Record> {
    (0..n)
        .map(|i| {
            Record::new(format!("r{:03}", i))
                .with("seq", i as i64)
                .with("even", i % 2 == 0)
        })
        .collect()
}

pub async fn seed(provider: &dyn Provider, ctx: &CallContext, records: Vec<Record>) {
    for record in records {
        provider
            .create(ctx, record)
            .await
            .expect("Failed to seed record");
    }
}

// ---------------------------------------------------------------------------
// Assertion helpers
// ---------------------------------------------------------------------------

pub fn ids(records: &[Record]) -> Vec<&str> {
    records.iter().map(|r| r.id.as_str()).collect()
}

pub fn assert_field_float(record: &Record, field: &str, expected: f64) {
    match record.get(field) {
        Some(v) => {
            let actual = v
                .as_f64()
                .unwrap_or_else(|| panic!("Expected a number in '{}', got {:?}", field, v));
            assert!(
                (actual - expected).abs() < f64::EPSILON,
                "Expected {} = {}, got {}",
                field,
                expected,
                actual
            );
        }
        None => panic!("Expected field '{}' on record {}", field, record.id),
    }
}

pub fn assert_field_string(record: &Record, field: &str, expected: &str) {
    match record.get(field) {
        Some(FieldValue::String(s)) => assert_eq!(s, expected),
        other => panic!("Expected FieldValue::String(\"{}\"), got {:?}", expected, other),
    }
}
