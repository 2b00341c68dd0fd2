//! Database-based adapter: one physical Postgres database per tenant.
//!
//! Switching acquires a connection from a per-tenant pool rather than
//! altering a search_path. Pools are created lazily on first switch and kept
//! for reuse; `drop_tenant` closes the tenant's pool before dropping the
//! database so no live connections block the DROP.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{AssertSqlSafe, PgPool};
use tracing::{info, instrument};

use tenement_core::TenantName;

use super::{acquire_with_timeout, TenantAdapter};
use crate::connection::{Namespace, TenantConnection};
use crate::error::TenancyError;
use crate::hooks::MigrationHook;
use crate::registry::TenantRegistry;

/// Tenant adapter over physical databases and per-database pools.
pub struct DatabaseAdapter {
    /// Pool for the default database; also where CREATE/DROP DATABASE runs.
    default_pool: PgPool,
    /// Server-level options; the database name is swapped per tenant.
    connect_options: PgConnectOptions,
    registry: Arc<TenantRegistry>,
    migrator: Option<Arc<dyn MigrationHook>>,
    pools: Mutex<HashMap<TenantName, PgPool>>,
}

impl DatabaseAdapter {
    pub fn new(
        default_pool: PgPool,
        connect_options: PgConnectOptions,
        registry: Arc<TenantRegistry>,
    ) -> Self {
        Self {
            default_pool,
            connect_options,
            registry,
            migrator: None,
            pools: Mutex::new(HashMap::new()),
        }
    }

    /// Build from a connection URL; the URL's database becomes the default.
    pub fn from_url(url: &str, registry: Arc<TenantRegistry>) -> Result<Self, TenancyError> {
        let options = PgConnectOptions::from_str(url)
            .map_err(|e| TenancyError::database("parse database url", None, e))?;
        let default_pool = PgPoolOptions::new().connect_lazy_with(options.clone());
        Ok(Self::new(default_pool, options, registry))
    }

    /// Attach the migration hook run inside a freshly created database.
    pub fn with_migrator(mut self, migrator: Arc<dyn MigrationHook>) -> Self {
        self.migrator = Some(migrator);
        self
    }

    fn pools(&self) -> MutexGuard<'_, HashMap<TenantName, PgPool>> {
        self.pools.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pool for a tenant's database, created lazily on first use.
    fn tenant_pool(&self, tenant: &TenantName) -> PgPool {
        self.pools()
            .entry(tenant.clone())
            .or_insert_with(|| {
                let options = self.connect_options.clone().database(tenant.as_str());
                PgPoolOptions::new()
                    .acquire_timeout(self.registry.connect_timeout())
                    .connect_lazy_with(options)
            })
            .clone()
    }

    fn forget_pool(&self, tenant: &TenantName) -> Option<PgPool> {
        self.pools().remove(tenant)
    }
}

#[async_trait]
impl TenantAdapter for DatabaseAdapter {
    #[instrument(skip(self), fields(tenant = %tenant))]
    async fn create(&self, tenant: &TenantName) -> Result<(), TenancyError> {
        if self.tenant_exists(tenant).await? {
            return Err(TenancyError::TenantExists(tenant.clone()));
        }

        // CREATE DATABASE cannot run inside a transaction; a pool-level
        // execute issues it as a single statement.
        sqlx::query(AssertSqlSafe(format!("CREATE DATABASE {}", tenant.quoted())))
            .execute(&self.default_pool)
            .await
            .map_err(|e| TenancyError::database("create database", Some(tenant), e))?;

        if let Some(migrator) = &self.migrator {
            let mut conn = self.connect(Some(tenant)).await?;
            migrator
                .migrate(&mut conn)
                .await
                .map_err(|e| TenancyError::hook("migrate", Some(tenant), e))?;
        }

        info!(tenant = %tenant, "created tenant database");
        Ok(())
    }

    #[instrument(skip(self), fields(tenant = %tenant))]
    async fn drop_tenant(&self, tenant: &TenantName) -> Result<(), TenancyError> {
        if !self.tenant_exists(tenant).await? {
            return Err(TenancyError::TenantNotFound(tenant.clone()));
        }

        // Close our own connections first; DROP DATABASE fails while any
        // session is attached.
        if let Some(pool) = self.forget_pool(tenant) {
            pool.close().await;
        }

        sqlx::query(AssertSqlSafe(format!("DROP DATABASE {}", tenant.quoted())))
            .execute(&self.default_pool)
            .await
            .map_err(|e| TenancyError::database("drop database", Some(tenant), e))?;

        info!(tenant = %tenant, "dropped tenant database");
        Ok(())
    }

    async fn tenant_exists(&self, tenant: &TenantName) -> Result<bool, TenancyError> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
            .bind(tenant.as_str())
            .fetch_one(&self.default_pool)
            .await
            .map_err(|e| TenancyError::database("database existence check", Some(tenant), e))
    }

    async fn connect(&self, tenant: Option<&TenantName>) -> Result<TenantConnection, TenancyError> {
        let target = self
            .resolve_target(tenant, self.registry.tenant_not_found_policy())
            .await?;

        let pool = match &target {
            None => self.default_pool.clone(),
            Some(t) => self.tenant_pool(t),
        };

        let conn =
            acquire_with_timeout(&pool, self.registry.connect_timeout(), target.as_ref()).await?;

        Ok(TenantConnection::postgres(
            Namespace::from_tenant(target.as_ref()),
            conn,
        ))
    }
}
