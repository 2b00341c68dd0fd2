//! Tenant adapter boundary.
//!
//! This module defines the low-level contract for creating, dropping, and
//! switching tenant namespaces without making storage assumptions. Two
//! Postgres variants (schema-based and database-based) and an in-memory
//! implementation share the contract; the variant is selected once at
//! configuration time.

pub mod database;
pub mod in_memory;
pub mod schema;

pub use database::DatabaseAdapter;
pub use in_memory::InMemoryAdapter;
pub use schema::SchemaAdapter;

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::{PgPool, Postgres};
use std::time::Duration;
use tracing::warn;

use tenement_core::TenantName;

use crate::connection::TenantConnection;
use crate::error::TenancyError;
use crate::registry::TenantNotFoundPolicy;

/// Low-level tenant namespace operations.
///
/// Names reaching an adapter have already passed the naming policy; adapters
/// may embed them in DDL identifiers (double-quoted) without further checks.
#[async_trait]
pub trait TenantAdapter: Send + Sync {
    /// Create the tenant's namespace and apply the base structure.
    ///
    /// Not idempotent: fails with `TenantExists` if the namespace is already
    /// there.
    async fn create(&self, tenant: &TenantName) -> Result<(), TenancyError>;

    /// Remove the namespace and everything in it.
    ///
    /// Not idempotent: fails with `TenantNotFound` if absent, including on a
    /// second call.
    async fn drop_tenant(&self, tenant: &TenantName) -> Result<(), TenancyError>;

    /// Authoritative existence check against the database; never cached.
    async fn tenant_exists(&self, tenant: &TenantName) -> Result<bool, TenancyError>;

    /// Produce a connection bound to the tenant's namespace (`None` = the
    /// default namespace).
    ///
    /// A missing tenant fails with `TenantNotFound` or silently binds to the
    /// default namespace, per the configured policy. Waiting for a pool slot
    /// is bounded by the configured timeout (`ConnectionTimeout`).
    async fn connect(&self, tenant: Option<&TenantName>) -> Result<TenantConnection, TenancyError>;

    /// Apply the not-found policy to a switch target, returning the namespace
    /// actually bound.
    async fn resolve_target(
        &self,
        tenant: Option<&TenantName>,
        policy: TenantNotFoundPolicy,
    ) -> Result<Option<TenantName>, TenancyError> {
        match tenant {
            None => Ok(None),
            Some(t) => {
                if self.tenant_exists(t).await? {
                    Ok(Some(t.clone()))
                } else {
                    match policy {
                        TenantNotFoundPolicy::Raise => Err(TenancyError::TenantNotFound(t.clone())),
                        TenantNotFoundPolicy::Fallback => {
                            warn!(tenant = %t, "tenant not found; falling back to default namespace");
                            Ok(None)
                        }
                    }
                }
            }
        }
    }
}

/// Acquire a pooled connection, bounding the wait.
///
/// `sqlx` applies its own pool timeout as well; both surface as
/// `ConnectionTimeout` so callers see one error for "no slot became free".
pub(crate) async fn acquire_with_timeout(
    pool: &PgPool,
    timeout: Duration,
    tenant: Option<&TenantName>,
) -> Result<PoolConnection<Postgres>, TenancyError> {
    match tokio::time::timeout(timeout, pool.acquire()).await {
        Err(_) => Err(TenancyError::ConnectionTimeout {
            tenant: tenant.cloned(),
        }),
        Ok(Err(sqlx::Error::PoolTimedOut)) => Err(TenancyError::ConnectionTimeout {
            tenant: tenant.cloned(),
        }),
        Ok(Err(source)) => Err(TenancyError::database("acquire connection", tenant, source)),
        Ok(Ok(conn)) => Ok(conn),
    }
}
