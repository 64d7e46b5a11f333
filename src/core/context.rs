//! Per-call context threaded through every persistence operation

use crate::core::entity::TenantId;
use crate::core::transaction::TransactionHandle;
use std::time::Duration;

/// Who is calling, inside which unit of work, and how long they will wait
///
/// Passed explicitly to every provider call. Cloning is cheap: the
/// transaction handle is reference-counted.
#[derive(Debug, Clone)]
pub struct CallContext {
    pub tenant: TenantId,

    /// Open unit of work, `None` outside a transaction
    pub transaction: Option<TransactionHandle>,

    /// Deadline for each backend round-trip
    pub timeout: Option<Duration>,
}

impl CallContext {
    pub fn new(tenant: impl Into<TenantId>) -> Self {
        Self {
            tenant: tenant.into(),
            transaction: None,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Copy of this context bound to `handle`
    pub fn with_transaction(&self, handle: TransactionHandle) -> Self {
        Self {
            tenant: self.tenant.clone(),
            transaction: Some(handle),
            timeout: self.timeout,
        }
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }
}
