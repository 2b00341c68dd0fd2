//! Integration boundary: hooks supplied by the host, consumed by the engine.
//!
//! The engine knows how to put the right namespace under a connection; what
//! runs inside that namespace (migrations, seeds) and where the tenant list
//! comes from are the host's business. Hooks are anyhow-valued — the engine
//! wraps their failures with the tenant that was current.

use std::sync::RwLock;

use async_trait::async_trait;
use sqlx::PgPool;

use tenement_core::TenantName;

use crate::connection::TenantConnection;

/// Applies and reverts schema migrations on a tenant-bound connection.
#[async_trait]
pub trait MigrationHook: Send + Sync {
    /// Apply pending migrations. Idempotent when nothing is pending; returns
    /// the number applied.
    async fn migrate(&self, conn: &mut TenantConnection) -> anyhow::Result<u64>;

    /// Revert the most recent migration batch.
    async fn rollback(&self, conn: &mut TenantConnection) -> anyhow::Result<()>;
}

/// Loads fixture/seed data into a tenant.
#[async_trait]
pub trait SeedHook: Send + Sync {
    async fn seed(&self, tenant: &TenantName, conn: &mut TenantConnection) -> anyhow::Result<()>;
}

/// Produces the full set of known tenant identifiers.
///
/// Deliberately a deferred producer: bulk operations re-invoke it on every
/// run, never memoizing, so tenants created or dropped between runs are
/// always reflected.
#[async_trait]
pub trait TenantNameSource: Send + Sync {
    async fn tenant_names(&self) -> anyhow::Result<Vec<TenantName>>;
}

/// Name source backed by a control-table query, re-run on every call.
///
/// The query must return a single text column of tenant names; names that
/// fail the naming policy fail the whole listing (a bad row in the control
/// table is a configuration error, not a tenant to skip).
pub struct SqlNameSource {
    pool: PgPool,
    query: String,
}

impl SqlNameSource {
    pub const DEFAULT_QUERY: &'static str = "SELECT name FROM tenants ORDER BY name";

    pub fn new(pool: PgPool, query: impl Into<String>) -> Self {
        Self {
            pool,
            query: query.into(),
        }
    }
}

#[async_trait]
impl TenantNameSource for SqlNameSource {
    async fn tenant_names(&self) -> anyhow::Result<Vec<TenantName>> {
        let rows: Vec<String> = sqlx::query_scalar(sqlx::AssertSqlSafe(self.query.as_str()))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|name| TenantName::new(name).map_err(Into::into))
            .collect()
    }
}

/// Fixed-list name source for tests and dev setups.
///
/// Interior mutability keeps the deferred-evaluation contract observable:
/// mutate the list between bulk runs and the next run sees the change.
#[derive(Debug, Default)]
pub struct VecSource {
    names: RwLock<Vec<TenantName>>,
}

impl VecSource {
    pub fn new(names: Vec<TenantName>) -> Self {
        Self {
            names: RwLock::new(names),
        }
    }

    pub fn set(&self, names: Vec<TenantName>) {
        *self
            .names
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = names;
    }

    pub fn push(&self, name: TenantName) {
        self.names
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(name);
    }
}

#[async_trait]
impl TenantNameSource for VecSource {
    async fn tenant_names(&self) -> anyhow::Result<Vec<TenantName>> {
        Ok(self
            .names
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone())
    }
}

/// Adapts a plain closure into a [`TenantNameSource`].
pub struct FnSource<F>(pub F);

#[async_trait]
impl<F> TenantNameSource for FnSource<F>
where
    F: Fn() -> anyhow::Result<Vec<TenantName>> + Send + Sync,
{
    async fn tenant_names(&self) -> anyhow::Result<Vec<TenantName>> {
        (self.0)()
    }
}
