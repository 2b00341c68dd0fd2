//! Context-local current-tenant state and scoped switching.
//!
//! One `TenantContext` per logical execution context (task, request). The
//! current tenant is never process-global: concurrent contexts each own their
//! state, so no cross-context synchronization is needed beyond the in-use
//! refcounts that guard `drop`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::BoxFuture;
use tracing::{debug, error};

use tenement_core::TenantName;

use crate::adapter::TenantAdapter;
use crate::connection::{Namespace, TenantConnection};
use crate::error::TenancyError;

/// Refcounts of tenants held by live contexts (current connection or a
/// stacked frame). `drop_tenant` refuses any tenant with a nonzero count.
#[derive(Debug, Default)]
pub(crate) struct UsageMap {
    counts: Mutex<HashMap<TenantName, usize>>,
}

impl UsageMap {
    fn lock(&self) -> MutexGuard<'_, HashMap<TenantName, usize>> {
        self.counts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn retain(&self, tenant: Option<&TenantName>) {
        if let Some(t) = tenant {
            *self.lock().entry(t.clone()).or_insert(0) += 1;
        }
    }

    pub(crate) fn release(&self, tenant: Option<&TenantName>) {
        if let Some(t) = tenant {
            let mut counts = self.lock();
            if let Some(count) = counts.get_mut(t) {
                *count -= 1;
                if *count == 0 {
                    counts.remove(t);
                }
            }
        }
    }

    pub(crate) fn is_in_use(&self, tenant: &TenantName) -> bool {
        self.lock().contains_key(tenant)
    }
}

/// Context-local tenant state: the live connection, the current tenant, and
/// the LIFO stack of frames pushed by scoped switches.
///
/// Obtained from [`TenantManager::context`](crate::manager::TenantManager::context),
/// starting at the default namespace.
pub struct TenantContext {
    adapter: Arc<dyn TenantAdapter>,
    in_use: Arc<UsageMap>,
    conn: TenantConnection,
    stack: Vec<Option<TenantName>>,
}

impl TenantContext {
    pub(crate) fn new(
        adapter: Arc<dyn TenantAdapter>,
        in_use: Arc<UsageMap>,
        conn: TenantConnection,
    ) -> Self {
        in_use.retain(conn.tenant());
        Self {
            adapter,
            in_use,
            conn,
            stack: Vec::new(),
        }
    }

    /// The active tenant, or `None` when bound to the default namespace.
    ///
    /// Under the `fallback` policy this reports the namespace actually bound,
    /// not the one that was requested.
    pub fn current(&self) -> Option<&TenantName> {
        self.conn.tenant()
    }

    pub fn namespace(&self) -> &Namespace {
        self.conn.namespace()
    }

    /// Depth of the scoped-switch stack.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// The live connection, bound to the current namespace.
    pub fn connection(&mut self) -> &mut TenantConnection {
        &mut self.conn
    }

    /// Unscoped switch: replace the current tenant without pushing a frame.
    pub async fn switch(&mut self, tenant: &TenantName) -> Result<(), TenancyError> {
        self.switch_to(Some(tenant)).await
    }

    /// Return to the default namespace without pushing a frame.
    ///
    /// Fails only if the default namespace itself is unreachable — the same
    /// fatal condition described on [`TenancyError::RestoreFailed`].
    pub async fn reset(&mut self) -> Result<(), TenancyError> {
        self.switch_to(None).await
    }

    /// Switch to `target` (`None` = default namespace).
    pub async fn switch_to(&mut self, target: Option<&TenantName>) -> Result<(), TenancyError> {
        let conn = self.adapter.connect(target).await?;
        let previous = self.conn.tenant().cloned();
        self.in_use.retain(conn.tenant());
        self.in_use.release(previous.as_ref());
        debug!(
            from = %self.conn.namespace(),
            to = %conn.namespace(),
            "switched namespace"
        );
        self.conn = conn;
        Ok(())
    }

    /// Scoped switch: enter `tenant`, run `body`, restore the previous frame
    /// on every exit path.
    ///
    /// If the switch itself fails, `body` never runs and nothing is pushed.
    /// Nested calls unwind strictly LIFO. A restoration failure is surfaced
    /// as [`TenancyError::RestoreFailed`] even when it masks the body's own
    /// error — a context bound to the wrong namespace must not keep running.
    ///
    /// The body is a boxed async closure; move its captures in so the future
    /// only borrows the context:
    ///
    /// ```ignore
    /// ctx.with_tenant(&tenant, move |ctx| Box::pin(async move {
    ///     let conn = ctx.connection();
    ///     // ... work against the tenant's namespace ...
    ///     Ok(())
    /// }))
    /// .await?;
    /// ```
    pub async fn with_tenant<T, F>(
        &mut self,
        tenant: &TenantName,
        body: F,
    ) -> Result<T, TenancyError>
    where
        F: for<'a> FnOnce(&'a mut TenantContext) -> BoxFuture<'a, Result<T, TenancyError>>,
    {
        let previous = self.current().cloned();

        // The frame keeps its own refcount while it sits on the stack, so
        // `drop_tenant` can't pull a tenant out from under a pending restore.
        self.in_use.retain(previous.as_ref());
        if let Err(err) = self.switch_to(Some(tenant)).await {
            self.in_use.release(previous.as_ref());
            return Err(err);
        }
        self.stack.push(previous);

        let result = body(self).await;

        let previous = self.stack.pop().unwrap_or(None);
        let restored = self.switch_to(previous.as_ref()).await;
        self.in_use.release(previous.as_ref());

        match restored {
            Ok(()) => result,
            Err(err) => {
                if let Err(body_err) = &result {
                    error!(error = %body_err, "body error masked by restore failure");
                }
                Err(TenancyError::RestoreFailed {
                    tenant: previous,
                    source: Box::new(err),
                })
            }
        }
    }
}

impl Drop for TenantContext {
    fn drop(&mut self) {
        self.in_use.release(self.conn.tenant());
        for frame in self.stack.drain(..) {
            self.in_use.release(frame.as_ref());
        }
    }
}

impl core::fmt::Debug for TenantContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TenantContext")
            .field("namespace", self.conn.namespace())
            .field("depth", &self.stack.len())
            .finish()
    }
}
