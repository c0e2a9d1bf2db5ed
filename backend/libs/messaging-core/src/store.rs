//! The store adapter (C1): a pooled connection plus a transactional
//! scope that collects after-commit callbacks.
//!
//! This replaces the framework-managed-transaction-with-post-commit-hook
//! pattern (thread-local ambient transactions, `@TransactionalEventListener`
//! and friends) with an explicit scope object. Callbacks registered via
//! [`TxScope::after_commit`] only run once the surrounding transaction has
//! actually committed; if the closure passed to [`Store::transaction`]
//! returns an error, or the commit itself fails, none of them run.

use std::future::Future;
use std::pin::Pin;

use sqlx::{PgPool, Postgres, Transaction};
use tracing::{error, warn};

/// A boxed post-commit callback. Callbacks are synchronous — the one
/// consumer in this codebase (the fast-path notifier registration) is a
/// fire-and-forget enqueue, so there's no need for an async hook here.
type AfterCommitHook = Box<dyn FnOnce() + Send>;

/// A transaction in progress plus the post-commit hooks registered
/// against it so far.
pub struct TxScope<'c> {
    pub tx: Transaction<'c, Postgres>,
    hooks: Vec<AfterCommitHook>,
}

impl<'c> TxScope<'c> {
    fn new(tx: Transaction<'c, Postgres>) -> Self {
        Self {
            tx,
            hooks: Vec::new(),
        }
    }

    /// Register a callback to run after this transaction commits
    /// successfully. If no transaction is active — which cannot happen
    /// through this API, since a `TxScope` only exists inside one — the
    /// registration would be a no-op; that guarantee is enforced by
    /// construction rather than checked at the call site.
    pub fn after_commit<F>(&mut self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.hooks.push(Box::new(hook));
    }

    fn take_hooks(&mut self) -> Vec<AfterCommitHook> {
        std::mem::take(&mut self.hooks)
    }
}

/// Thin wrapper over a `PgPool` providing the one operation every
/// repository in this workspace needs: a transactional scope with
/// after-commit hooks.
#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run `f` inside a transaction. On `Ok`, commits and then fires
    /// every hook registered via [`TxScope::after_commit`], in
    /// registration order. On `Err`, rolls back (via `Transaction::drop`)
    /// and runs no hooks.
    pub async fn transaction<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: for<'c> FnOnce(
            &'c mut TxScope<'_>,
        ) -> Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'c>>,
        E: From<sqlx::Error>,
    {
        let tx = self.pool.begin().await?;
        let mut scope = TxScope::new(tx);

        let result = f(&mut scope).await;

        match result {
            Ok(value) => {
                let hooks = scope.take_hooks();
                scope.tx.commit().await?;
                for hook in hooks {
                    hook();
                }
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = scope.tx.rollback().await {
                    warn!(error = ?rollback_err, "rollback after failed transaction also failed");
                }
                Err(e)
            }
        }
    }
}

/// Log-and-swallow an after-commit hook failure. Hooks registered via
/// `after_commit` are plain `FnOnce()` and cannot themselves fail, but
/// notifier registration (the one caller) wraps fallible work in this
/// helper so a Redis hiccup never surfaces through the hook boundary.
pub fn swallow_hook_error<E: std::fmt::Display>(context: &str, result: Result<(), E>) {
    if let Err(e) = result {
        error!(context, error = %e, "after-commit hook failed; sweeper will recover");
    }
}
