//! Bulk operations across all tenants.
//!
//! One sequential pass over the tenant list, one scoped switch per tenant, no
//! retries at this layer. Per-tenant failures are collected and surfaced as a
//! single aggregate error at the end; the `halt` policy stops the pass after
//! the first failure instead.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use tenement_core::TenantName;

use crate::context::TenantContext;
use crate::error::{TenancyError, TenantFailure};
use crate::hooks::{MigrationHook, SeedHook};
use crate::manager::TenantManager;
use crate::registry::BulkFailurePolicy;

/// The operation applied to every tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkOperation {
    Migrate,
    Rollback,
    Seed,
}

impl BulkOperation {
    fn hook_name(self) -> &'static str {
        match self {
            Self::Migrate => "migrate",
            Self::Rollback => "rollback",
            Self::Seed => "seed",
        }
    }
}

impl core::fmt::Display for BulkOperation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.hook_name())
    }
}

/// Outcome of a fully successful bulk run.
#[derive(Debug, Clone, Serialize)]
pub struct BulkReport {
    pub operation: BulkOperation,
    pub succeeded: Vec<TenantName>,
}

/// Applies migrate/rollback/seed across all tenants from the name source.
///
/// The tenant list is re-evaluated on every run and processed in source
/// order. Cancellation is only meaningful between tenants; once a tenant's
/// hook has been invoked it runs to completion.
pub struct BulkRunner {
    manager: Arc<TenantManager>,
    migrator: Option<Arc<dyn MigrationHook>>,
    seeder: Option<Arc<dyn SeedHook>>,
}

impl BulkRunner {
    pub fn new(manager: Arc<TenantManager>) -> Self {
        let seeder = manager.seeder();
        Self {
            manager,
            migrator: None,
            seeder,
        }
    }

    pub fn with_migrator(mut self, migrator: Arc<dyn MigrationHook>) -> Self {
        self.migrator = Some(migrator);
        self
    }

    pub fn with_seeder(mut self, seeder: Arc<dyn SeedHook>) -> Self {
        self.seeder = Some(seeder);
        self
    }

    /// Run `operation` once per tenant, each invocation with that tenant
    /// current.
    ///
    /// Returns a [`BulkReport`] only if every tenant succeeded; otherwise
    /// [`TenancyError::AggregateBulk`] with every `(tenant, error)` pair. A
    /// [`TenancyError::RestoreFailed`] aborts the run immediately — the
    /// context can no longer be trusted to switch correctly.
    #[instrument(skip(self), fields(operation = %operation))]
    pub async fn run(&self, operation: BulkOperation) -> Result<BulkReport, TenancyError> {
        let tenants = self.manager.tenant_names().await?;
        let policy = self.manager.registry().bulk_failure_policy();
        let mut ctx = self.manager.context().await?;

        let mut succeeded = Vec::with_capacity(tenants.len());
        let mut failures: Vec<TenantFailure> = Vec::new();

        info!(tenant_count = tenants.len(), "starting bulk run");

        for tenant in tenants {
            debug!(tenant = %tenant, state = "switching", "tenant run");

            let migrator = self.migrator.clone();
            let seeder = self.seeder.clone();
            let scoped_tenant = tenant.clone();
            let result = ctx
                .with_tenant(&tenant, move |ctx| {
                    Box::pin(async move {
                        debug!(tenant = %scoped_tenant, state = "applying", "tenant run");
                        apply(operation, migrator, seeder, scoped_tenant, ctx).await
                    })
                })
                .await;

            match result {
                Ok(()) => {
                    debug!(tenant = %tenant, state = "succeeded", "tenant run");
                    succeeded.push(tenant);
                }
                Err(err @ TenancyError::RestoreFailed { .. }) => return Err(err),
                Err(err) => {
                    warn!(tenant = %tenant, error = %err, state = "failed", "tenant run");
                    failures.push(TenantFailure { tenant, error: err });
                    if policy == BulkFailurePolicy::Halt {
                        break;
                    }
                }
            }
        }

        if failures.is_empty() {
            info!(succeeded = succeeded.len(), "bulk run complete");
            Ok(BulkReport {
                operation,
                succeeded,
            })
        } else {
            Err(TenancyError::AggregateBulk {
                operation,
                failures,
            })
        }
    }
}

/// Invoke the hook for `operation` against the context's current connection.
async fn apply(
    operation: BulkOperation,
    migrator: Option<Arc<dyn MigrationHook>>,
    seeder: Option<Arc<dyn SeedHook>>,
    tenant: TenantName,
    ctx: &mut TenantContext,
) -> Result<(), TenancyError> {
    let conn = ctx.connection();
    match operation {
        BulkOperation::Migrate => {
            let migrator = migrator.ok_or(TenancyError::MissingHook("migrate"))?;
            let applied = migrator
                .migrate(conn)
                .await
                .map_err(|e| TenancyError::hook("migrate", Some(&tenant), e))?;
            debug!(tenant = %tenant, applied, "migrations applied");
            Ok(())
        }
        BulkOperation::Rollback => {
            let migrator = migrator.ok_or(TenancyError::MissingHook("rollback"))?;
            migrator
                .rollback(conn)
                .await
                .map_err(|e| TenancyError::hook("rollback", Some(&tenant), e))
        }
        BulkOperation::Seed => {
            let seeder = seeder.ok_or(TenancyError::MissingHook("seed"))?;
            seeder
                .seed(&tenant, conn)
                .await
                .map_err(|e| TenancyError::hook("seed", Some(&tenant), e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::InMemoryAdapter;
    use crate::hooks::VecSource;
    use crate::registry::{TenancyConfig, TenantRegistry};
    use crate::test_support::RecordingHook;

    fn name(s: &str) -> TenantName {
        TenantName::new(s).unwrap()
    }

    async fn setup(
        config: TenancyConfig,
        tenants: &[&str],
    ) -> (Arc<TenantManager>, Arc<VecSource>, Arc<RecordingHook>) {
        let registry = Arc::new(TenantRegistry::new(config));
        let adapter = Arc::new(InMemoryAdapter::new(registry.clone()));
        let source = Arc::new(VecSource::default());
        let manager = Arc::new(TenantManager::new(adapter, registry, source.clone()));
        for t in tenants {
            manager.create(t).await.unwrap();
            source.push(name(t));
        }
        (manager, source, RecordingHook::new())
    }

    fn runner(manager: Arc<TenantManager>, hook: Arc<RecordingHook>) -> BulkRunner {
        BulkRunner::new(manager)
            .with_migrator(hook.clone())
            .with_seeder(hook)
    }

    #[tokio::test]
    async fn migrate_invokes_hook_once_per_tenant_with_tenant_current() {
        let (manager, _, hook) = setup(TenancyConfig::new(), &["acme", "beta", "gamma"]).await;
        let report = runner(manager, hook.clone())
            .run(BulkOperation::Migrate)
            .await
            .unwrap();

        assert_eq!(
            report.succeeded,
            vec![name("acme"), name("beta"), name("gamma")]
        );
        assert_eq!(
            hook.calls(),
            vec![
                ("migrate".to_string(), Some(name("acme"))),
                ("migrate".to_string(), Some(name("beta"))),
                ("migrate".to_string(), Some(name("gamma"))),
            ]
        );
    }

    #[tokio::test]
    async fn seed_runs_in_source_order() {
        let (manager, _, hook) = setup(TenancyConfig::new(), &["acme", "beta"]).await;
        runner(manager, hook.clone())
            .run(BulkOperation::Seed)
            .await
            .unwrap();

        assert_eq!(
            hook.calls(),
            vec![
                ("seed".to_string(), Some(name("acme"))),
                ("seed".to_string(), Some(name("beta"))),
            ]
        );
    }

    #[tokio::test]
    async fn one_failing_tenant_does_not_stop_the_others() {
        let (manager, _, hook) = setup(TenancyConfig::new(), &["acme", "beta"]).await;
        hook.fail_for("beta");

        let err = runner(manager, hook.clone())
            .run(BulkOperation::Migrate)
            .await
            .unwrap_err();

        // acme was still migrated.
        assert_eq!(
            hook.calls(),
            vec![
                ("migrate".to_string(), Some(name("acme"))),
                ("migrate".to_string(), Some(name("beta"))),
            ]
        );

        match err {
            TenancyError::AggregateBulk {
                operation,
                failures,
            } => {
                assert_eq!(operation, BulkOperation::Migrate);
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].tenant, name("beta"));
                assert!(matches!(failures[0].error, TenancyError::Hook { .. }));
            }
            other => panic!("expected AggregateBulk, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn halt_policy_stops_after_first_failure() {
        let config =
            TenancyConfig::new().with_bulk_failure_policy(crate::registry::BulkFailurePolicy::Halt);
        let (manager, _, hook) = setup(config, &["acme", "beta", "gamma"]).await;
        hook.fail_for("acme");

        let err = runner(manager, hook.clone())
            .run(BulkOperation::Migrate)
            .await
            .unwrap_err();

        // Only the failing tenant was attempted.
        assert_eq!(hook.calls().len(), 1);
        assert!(matches!(
            err,
            TenancyError::AggregateBulk { failures, .. } if failures.len() == 1
        ));
    }

    #[tokio::test]
    async fn tenant_list_is_reevaluated_per_run() {
        let (manager, source, hook) = setup(TenancyConfig::new(), &["acme"]).await;
        let runner = runner(manager.clone(), hook.clone());

        runner.run(BulkOperation::Migrate).await.unwrap();
        assert_eq!(hook.calls().len(), 1);

        // A tenant created between runs is picked up without rebuilding
        // anything.
        manager.create("beta").await.unwrap();
        source.push(name("beta"));

        runner.run(BulkOperation::Migrate).await.unwrap();
        assert_eq!(hook.calls().len(), 3);
    }

    #[tokio::test]
    async fn missing_hook_is_reported_per_tenant() {
        let (manager, _, _) = setup(TenancyConfig::new(), &["acme"]).await;
        let runner = BulkRunner::new(manager);

        let err = runner.run(BulkOperation::Migrate).await.unwrap_err();
        match err {
            TenancyError::AggregateBulk { failures, .. } => {
                assert!(matches!(failures[0].error, TenancyError::MissingHook("migrate")));
            }
            other => panic!("expected AggregateBulk, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn rollback_uses_the_migration_hook() {
        let (manager, _, hook) = setup(TenancyConfig::new(), &["acme"]).await;
        runner(manager, hook.clone())
            .run(BulkOperation::Rollback)
            .await
            .unwrap();

        assert_eq!(
            hook.calls(),
            vec![("rollback".to_string(), Some(name("acme")))]
        );
    }
}
