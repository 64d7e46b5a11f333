//! Unit-of-work management
//!
//! A [`TransactionManager`] wraps a closure in a transaction opened by its
//! [`TransactionBackend`]. The open transaction travels explicitly in
//! [`CallContext::transaction`]; a nested `execute_in_transaction` sees the
//! handle and reuses it instead of opening a second one, so only the
//! outermost call ever commits or rolls back.
//!
//! # Example
//!
//! ```rust,ignore
//! let order = manager
//!     .execute_in_transaction(&ctx, |ctx| async move {
//!         let order = orders.create(&ctx, order).await?;
//!         lines.create(&ctx, line).await?;
//!         Ok(order)
//!     })
//!     .await?;
//! ```

use crate::core::context::CallContext;
use crate::core::error::{StoreResult, TransactionError};
use async_trait::async_trait;
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

/// Opaque marker of an open unit of work
///
/// Clones share the same transaction. The backend that opened it keeps
/// its own state inside (a connection, an undo journal) and gets it back
/// through [`TransactionHandle::state`].
#[derive(Clone)]
pub struct TransactionHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    id: String,
    backend: &'static str,
    rollback_only: AtomicBool,
    state: Box<dyn Any + Send + Sync>,
}

impl TransactionHandle {
    pub fn new<S: Any + Send + Sync>(backend: &'static str, state: S) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                id: Uuid::new_v4().to_string(),
                backend,
                rollback_only: AtomicBool::new(false),
                state: Box::new(state),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Name of the backend that opened this transaction
    pub fn backend(&self) -> &'static str {
        self.inner.backend
    }

    /// Backend state, if this handle was opened by a backend storing `S`
    pub fn state<S: Any>(&self) -> Option<&S> {
        self.inner.state.downcast_ref::<S>()
    }

    /// Backend state, or `InvalidHandle` when the handle belongs elsewhere
    pub fn state_for<S: Any>(&self, backend: &str) -> StoreResult<&S> {
        self.state::<S>().ok_or_else(|| {
            TransactionError::InvalidHandle {
                message: format!(
                    "transaction {} was opened by '{}', not '{}'",
                    self.id(),
                    self.backend(),
                    backend
                ),
            }
            .into()
        })
    }

    /// Forbid the outermost call from committing
    pub fn mark_rollback_only(&self) {
        self.inner.rollback_only.store(true, Ordering::SeqCst);
    }

    pub fn is_rollback_only(&self) -> bool {
        self.inner.rollback_only.load(Ordering::SeqCst)
    }

    /// Whether both handles refer to the same transaction
    pub fn same_as(&self, other: &TransactionHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for TransactionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionHandle")
            .field("id", &self.inner.id)
            .field("backend", &self.inner.backend)
            .field("rollback_only", &self.is_rollback_only())
            .finish()
    }
}

/// Backend side of a transaction: open, commit, roll back
#[async_trait]
pub trait TransactionBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn begin(&self, ctx: &CallContext) -> StoreResult<TransactionHandle>;

    async fn commit(&self, handle: TransactionHandle) -> StoreResult<()>;

    async fn rollback(&self, handle: TransactionHandle) -> StoreResult<()>;
}

/// Runs closures as units of work
///
/// Built with [`TransactionManager::new`] for transactional backends or
/// [`TransactionManager::noop`] for backends without transactions.
#[derive(Clone)]
pub struct TransactionManager {
    backend: Option<Arc<dyn TransactionBackend>>,
}

impl fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionManager")
            .field("backend", &self.backend.as_ref().map(|b| b.name()))
            .finish()
    }
}

impl TransactionManager {
    pub fn new(backend: Arc<dyn TransactionBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    /// Manager that runs every closure directly, without a handle
    pub fn noop() -> Self {
        Self { backend: None }
    }

    pub fn is_noop(&self) -> bool {
        self.backend.is_none()
    }

    /// Run `f` inside a unit of work.
    ///
    /// - `ctx` already carries a handle: `f` runs with it and nothing is
    ///   committed here; an error marks the handle rollback-only.
    /// - Otherwise a transaction is opened, `f` runs with a context bound
    ///   to it, and the transaction commits if `f` succeeded and nothing
    ///   nested failed. Errors, panics and rollback-only handles roll back.
    pub async fn execute_in_transaction<T, F, Fut>(&self, ctx: &CallContext, f: F) -> StoreResult<T>
    where
        F: FnOnce(CallContext) -> Fut + Send,
        Fut: Future<Output = StoreResult<T>> + Send,
        T: Send,
    {
        let Some(backend) = &self.backend else {
            return f(ctx.clone()).await;
        };

        if let Some(handle) = &ctx.transaction {
            let result = f(ctx.clone()).await;
            if result.is_err() {
                tracing::debug!(
                    transaction = %handle.id(),
                    "nested unit of work failed, marking rollback-only"
                );
                handle.mark_rollback_only();
            }
            return result;
        }

        let handle = backend
            .begin(ctx)
            .await
            .map_err(|e| TransactionError::BeginFailed {
                message: e.to_string(),
            })?;
        let id = handle.id().to_string();
        tracing::debug!(transaction = %id, backend = backend.name(), "transaction opened");

        let outcome = AssertUnwindSafe(f(ctx.with_transaction(handle.clone())))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(value)) if !handle.is_rollback_only() => {
                backend
                    .commit(handle)
                    .await
                    .map_err(|e| TransactionError::CommitFailed {
                        id: id.clone(),
                        message: e.to_string(),
                    })?;
                tracing::debug!(transaction = %id, "transaction committed");
                Ok(value)
            }
            Ok(Ok(_)) => {
                Self::roll_back(backend.as_ref(), handle, "nested operation failed").await;
                Err(TransactionError::RollbackOnly { id }.into())
            }
            Ok(Err(cause)) => {
                Self::roll_back(backend.as_ref(), handle, &cause.to_string()).await;
                Err(TransactionError::RolledBack {
                    id,
                    cause: Box::new(cause),
                }
                .into())
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                Self::roll_back(backend.as_ref(), handle, &message).await;
                Err(TransactionError::Aborted { id, message }.into())
            }
        }
    }

    async fn roll_back(backend: &dyn TransactionBackend, handle: TransactionHandle, reason: &str) {
        let id = handle.id().to_string();
        tracing::warn!(transaction = %id, reason, "rolling back transaction");
        if let Err(e) = backend.rollback(handle).await {
            tracing::warn!(transaction = %id, error = %e, "rollback failed");
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unit of work panicked".to_string()
    }
}
