//! Orchestration façade over the configured adapter.
//!
//! The manager is where raw caller input turns into validated tenant names,
//! where in-use accounting guards `drop`, and where execution contexts are
//! opened. It is cheap to share behind an `Arc`; the per-context state lives
//! in [`TenantContext`], not here.

use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{info, instrument, warn};

use tenement_core::TenantName;

use crate::adapter::TenantAdapter;
use crate::context::{TenantContext, UsageMap};
use crate::error::TenancyError;
use crate::hooks::{SeedHook, TenantNameSource};
use crate::registry::TenantRegistry;

/// Façade exposing tenant lifecycle and context acquisition.
pub struct TenantManager {
    adapter: Arc<dyn TenantAdapter>,
    registry: Arc<TenantRegistry>,
    source: Arc<dyn TenantNameSource>,
    seeder: Option<Arc<dyn SeedHook>>,
    in_use: Arc<UsageMap>,
}

impl TenantManager {
    pub fn new(
        adapter: Arc<dyn TenantAdapter>,
        registry: Arc<TenantRegistry>,
        source: Arc<dyn TenantNameSource>,
    ) -> Self {
        Self {
            adapter,
            registry,
            source,
            seeder: None,
            in_use: Arc::new(UsageMap::default()),
        }
    }

    /// Attach the seed hook used by `seed_after_create` and bulk seeding.
    pub fn with_seeder(mut self, seeder: Arc<dyn SeedHook>) -> Self {
        self.seeder = Some(seeder);
        self
    }

    pub fn registry(&self) -> &TenantRegistry {
        &self.registry
    }

    pub(crate) fn seeder(&self) -> Option<Arc<dyn SeedHook>> {
        self.seeder.clone()
    }

    /// Create a tenant's namespace; optionally seeds it (`seed_after_create`).
    ///
    /// The raw name is validated before anything reaches the adapter.
    #[instrument(skip(self))]
    pub async fn create(&self, name: &str) -> Result<TenantName, TenancyError> {
        let tenant = TenantName::new(name)?;
        self.adapter.create(&tenant).await?;

        if self.registry.seed_after_create() {
            match &self.seeder {
                Some(seeder) => {
                    let mut conn = self.adapter.connect(Some(&tenant)).await?;
                    seeder
                        .seed(&tenant, &mut conn)
                        .await
                        .map_err(|e| TenancyError::hook("seed", Some(&tenant), e))?;
                }
                None => {
                    warn!(tenant = %tenant, "seed_after_create is set but no seed hook is configured")
                }
            }
        }

        info!(tenant = %tenant, "tenant created");
        Ok(tenant)
    }

    /// Drop a tenant's namespace.
    ///
    /// Refused with `TenantInUse` while any live context opened by this
    /// manager holds the tenant — as its current namespace or as a stacked
    /// frame awaiting restoration.
    #[instrument(skip(self))]
    pub async fn drop_tenant(&self, name: &str) -> Result<(), TenancyError> {
        let tenant = TenantName::new(name)?;
        if self.in_use.is_in_use(&tenant) {
            return Err(TenancyError::TenantInUse(tenant));
        }
        self.adapter.drop_tenant(&tenant).await?;
        info!(tenant = %tenant, "tenant dropped");
        Ok(())
    }

    pub async fn tenant_exists(&self, name: &str) -> Result<bool, TenancyError> {
        let tenant = TenantName::new(name)?;
        self.adapter.tenant_exists(&tenant).await
    }

    /// All known tenants, freshly evaluated from the name source.
    pub async fn tenant_names(&self) -> Result<Vec<TenantName>, TenancyError> {
        self.source
            .tenant_names()
            .await
            .map_err(TenancyError::NameSource)
    }

    /// Open an execution context bound to the default namespace.
    pub async fn context(&self) -> Result<TenantContext, TenancyError> {
        let conn = self.adapter.connect(None).await?;
        Ok(TenantContext::new(
            self.adapter.clone(),
            self.in_use.clone(),
            conn,
        ))
    }

    /// Run `body` once per tenant from the name source, scoped into each.
    ///
    /// Propagates the first failure; bulk operations that collect per-tenant
    /// failures live in [`BulkRunner`](crate::bulk::BulkRunner).
    pub async fn each_tenant<T, F>(&self, mut body: F) -> Result<Vec<T>, TenancyError>
    where
        F: for<'a> FnMut(&'a mut TenantContext) -> BoxFuture<'a, Result<T, TenancyError>>,
    {
        let names = self.tenant_names().await?;
        let mut ctx = self.context().await?;
        let mut out = Vec::with_capacity(names.len());
        for tenant in names {
            out.push(ctx.with_tenant(&tenant, &mut body).await?);
        }
        Ok(out)
    }
}

impl core::fmt::Debug for TenantManager {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TenantManager")
            .field("strategy", &self.registry.strategy())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::InMemoryAdapter;
    use crate::hooks::VecSource;
    use crate::registry::TenancyConfig;
    use crate::test_support::RecordingHook;

    fn name(s: &str) -> TenantName {
        TenantName::new(s).unwrap()
    }

    fn manager_with(config: TenancyConfig) -> (TenantManager, Arc<RecordingHook>) {
        let registry = Arc::new(TenantRegistry::new(config));
        let adapter = Arc::new(InMemoryAdapter::new(registry.clone()));
        let hook = RecordingHook::new();
        let manager = TenantManager::new(
            adapter,
            registry,
            Arc::new(VecSource::default()),
        )
        .with_seeder(hook.clone());
        (manager, hook)
    }

    #[tokio::test]
    async fn invalid_name_fails_fast_without_reaching_the_adapter() {
        let (manager, _) = manager_with(TenancyConfig::new());

        let err = manager.create("acme; DROP SCHEMA public").await.unwrap_err();
        assert!(matches!(err, TenancyError::InvalidTenantName(_)));

        let err = manager.drop_tenant("").await.unwrap_err();
        assert!(matches!(err, TenancyError::InvalidTenantName(_)));
    }

    #[tokio::test]
    async fn create_then_drop_round_trip() {
        let (manager, _) = manager_with(TenancyConfig::new());

        manager.create("acme").await.unwrap();
        assert!(manager.tenant_exists("acme").await.unwrap());

        manager.drop_tenant("acme").await.unwrap();
        assert!(!manager.tenant_exists("acme").await.unwrap());
    }

    #[tokio::test]
    async fn drop_refuses_tenant_held_by_live_context() {
        let (manager, _) = manager_with(TenancyConfig::new());
        let acme = manager.create("acme").await.unwrap();

        let mut ctx = manager.context().await.unwrap();
        ctx.switch(&acme).await.unwrap();

        let err = manager.drop_tenant("acme").await.unwrap_err();
        assert!(matches!(err, TenancyError::TenantInUse(t) if t == acme));

        // Released once the context lets go.
        ctx.reset().await.unwrap();
        manager.drop_tenant("acme").await.unwrap();
    }

    #[tokio::test]
    async fn drop_refuses_tenant_parked_on_a_scope_stack() {
        let (manager, _) = manager_with(TenancyConfig::new());
        let manager = Arc::new(manager);
        let acme = manager.create("acme").await.unwrap();
        manager.create("beta").await.unwrap();

        let mut ctx = manager.context().await.unwrap();
        ctx.switch(&acme).await.unwrap();

        let beta = name("beta");
        let mgr = manager.clone();
        ctx.with_tenant(&beta, move |_ctx| {
            Box::pin(async move {
                // acme awaits restoration on the stack; dropping it now would
                // strand the unwind.
                let err = mgr.drop_tenant("acme").await.unwrap_err();
                assert!(matches!(err, TenancyError::TenantInUse(_)));
                Ok(())
            })
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn seed_after_create_runs_seeder_inside_new_tenant() {
        let (manager, hook) = manager_with(TenancyConfig::new().with_seed_after_create(true));
        let acme = manager.create("acme").await.unwrap();

        let calls = hook.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], ("seed".to_string(), Some(acme)));
    }

    #[tokio::test]
    async fn create_without_seed_flag_does_not_seed() {
        let (manager, hook) = manager_with(TenancyConfig::new());
        manager.create("acme").await.unwrap();
        assert!(hook.calls().is_empty());
    }

    #[tokio::test]
    async fn each_tenant_visits_all_tenants_in_source_order() {
        let registry = Arc::new(TenantRegistry::new(TenancyConfig::new()));
        let adapter = Arc::new(InMemoryAdapter::new(registry.clone()));
        let source = Arc::new(VecSource::new(vec![name("acme"), name("beta")]));
        let manager = TenantManager::new(adapter, registry, source);
        manager.create("acme").await.unwrap();
        manager.create("beta").await.unwrap();

        let visited = manager
            .each_tenant(|ctx| Box::pin(async move { Ok(ctx.current().cloned()) }))
            .await
            .unwrap();

        assert_eq!(visited, vec![Some(name("acme")), Some(name("beta"))]);
    }
}
