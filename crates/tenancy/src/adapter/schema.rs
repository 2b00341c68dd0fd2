//! Schema-based adapter: one Postgres schema per tenant.
//!
//! Switching sets the connection's `search_path` to the tenant's schema (plus
//! any persistent schemas). The default schema is never part of a tenant's
//! search_path; shared tables are addressed through
//! [`TenantRegistry::shared_table`](crate::registry::TenantRegistry::shared_table).

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{AssertSqlSafe, PgPool};
use tracing::{info, instrument};

use tenement_core::TenantName;

use super::{acquire_with_timeout, TenantAdapter};
use crate::connection::{Namespace, TenantConnection};
use crate::error::TenancyError;
use crate::hooks::MigrationHook;
use crate::registry::TenantRegistry;

/// Tenant adapter over Postgres schemas and `search_path`.
///
/// All tenants share one connection pool. `search_path` is set on every
/// `connect`, so a connection returned to the pool with a stale path is
/// always rebound before the next use.
pub struct SchemaAdapter {
    pool: PgPool,
    registry: Arc<TenantRegistry>,
    migrator: Option<Arc<dyn MigrationHook>>,
}

impl SchemaAdapter {
    pub fn new(pool: PgPool, registry: Arc<TenantRegistry>) -> Self {
        Self {
            pool,
            registry,
            migrator: None,
        }
    }

    /// Attach the migration hook run inside a freshly created schema.
    pub fn with_migrator(mut self, migrator: Arc<dyn MigrationHook>) -> Self {
        self.migrator = Some(migrator);
        self
    }
}

#[async_trait]
impl TenantAdapter for SchemaAdapter {
    #[instrument(skip(self), fields(tenant = %tenant))]
    async fn create(&self, tenant: &TenantName) -> Result<(), TenancyError> {
        if self.tenant_exists(tenant).await? {
            return Err(TenancyError::TenantExists(tenant.clone()));
        }

        // Identifier, not a bind parameter: pre-validated and quoted.
        sqlx::query(AssertSqlSafe(format!("CREATE SCHEMA {}", tenant.quoted())))
            .execute(&self.pool)
            .await
            .map_err(|e| TenancyError::database("create schema", Some(tenant), e))?;

        if let Some(migrator) = &self.migrator {
            let mut conn = self.connect(Some(tenant)).await?;
            migrator
                .migrate(&mut conn)
                .await
                .map_err(|e| TenancyError::hook("migrate", Some(tenant), e))?;
        }

        info!(tenant = %tenant, "created tenant schema");
        Ok(())
    }

    #[instrument(skip(self), fields(tenant = %tenant))]
    async fn drop_tenant(&self, tenant: &TenantName) -> Result<(), TenancyError> {
        if !self.tenant_exists(tenant).await? {
            return Err(TenancyError::TenantNotFound(tenant.clone()));
        }

        sqlx::query(AssertSqlSafe(format!("DROP SCHEMA {} CASCADE", tenant.quoted())))
            .execute(&self.pool)
            .await
            .map_err(|e| TenancyError::database("drop schema", Some(tenant), e))?;

        info!(tenant = %tenant, "dropped tenant schema");
        Ok(())
    }

    async fn tenant_exists(&self, tenant: &TenantName) -> Result<bool, TenancyError> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM information_schema.schemata WHERE schema_name = $1)",
        )
        .bind(tenant.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| TenancyError::database("schema existence check", Some(tenant), e))
    }

    async fn connect(&self, tenant: Option<&TenantName>) -> Result<TenantConnection, TenancyError> {
        let target = self
            .resolve_target(tenant, self.registry.tenant_not_found_policy())
            .await?;

        let mut conn = acquire_with_timeout(
            &self.pool,
            self.registry.connect_timeout(),
            target.as_ref(),
        )
        .await?;

        let search_path = self.registry.search_path(target.as_ref());
        sqlx::query(AssertSqlSafe(format!("SET search_path TO {search_path}")))
            .execute(&mut *conn)
            .await
            .map_err(|e| TenancyError::database("set search_path", target.as_ref(), e))?;

        Ok(TenantConnection::postgres(
            Namespace::from_tenant(target.as_ref()),
            conn,
        ))
    }
}
