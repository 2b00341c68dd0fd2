//! Engine error model.
//!
//! Adapter-level database errors are wrapped, never swallowed, and carry the
//! tenant that was active when they occurred. Per-tenant failures in bulk
//! operations are collected and surfaced at the end as [`TenancyError::AggregateBulk`].

use thiserror::Error;

use tenement_core::{InvalidTenantName, TenantName};

use crate::bulk::BulkOperation;

/// Error raised by the tenancy engine.
#[derive(Debug, Error)]
pub enum TenancyError {
    /// `create` targeted a tenant whose namespace already exists.
    #[error("tenant already exists: {0}")]
    TenantExists(TenantName),

    /// The tenant's namespace does not exist in the database.
    #[error("tenant not found: {0}")]
    TenantNotFound(TenantName),

    /// `drop` targeted a tenant currently held by a live switch context.
    #[error("tenant is held by an active context: {0}")]
    TenantInUse(TenantName),

    /// The identifier failed the naming policy before reaching the database.
    #[error(transparent)]
    InvalidTenantName(#[from] InvalidTenantName),

    /// Pool exhaustion: no connection became free within the configured timeout.
    #[error("timed out acquiring a connection (tenant: {tenant:?})")]
    ConnectionTimeout { tenant: Option<TenantName> },

    /// A database operation failed. `tenant` is the namespace that was active.
    #[error("database error during {operation} (tenant: {tenant:?})")]
    Database {
        operation: &'static str,
        tenant: Option<TenantName>,
        #[source]
        source: sqlx::Error,
    },

    /// An external hook (migrate/rollback/seed) failed.
    #[error("{operation} hook failed (tenant: {tenant:?})")]
    Hook {
        operation: &'static str,
        tenant: Option<TenantName>,
        #[source]
        source: anyhow::Error,
    },

    /// The tenant name source could not produce the tenant list.
    #[error("tenant name source failed")]
    NameSource(#[source] anyhow::Error),

    /// A bulk operation was requested but the matching hook was never configured.
    #[error("no {0} hook configured")]
    MissingHook(&'static str),

    /// Restoring the previous namespace after a scoped switch failed.
    ///
    /// This is fatal: the context's connection no longer points where its
    /// callers believe it does, so the context must be discarded. It is
    /// surfaced even when it masks an error raised by the scoped body.
    #[error("failed to restore the previous namespace (tenant: {tenant:?}); discard this context")]
    RestoreFailed {
        tenant: Option<TenantName>,
        #[source]
        source: Box<TenancyError>,
    },

    /// One or more tenants failed during a bulk operation.
    #[error("bulk {operation} failed for {} tenant(s)", failures.len())]
    AggregateBulk {
        operation: BulkOperation,
        failures: Vec<TenantFailure>,
    },
}

impl TenancyError {
    pub fn database(
        operation: &'static str,
        tenant: Option<&TenantName>,
        source: sqlx::Error,
    ) -> Self {
        Self::Database {
            operation,
            tenant: tenant.cloned(),
            source,
        }
    }

    pub fn hook(
        operation: &'static str,
        tenant: Option<&TenantName>,
        source: anyhow::Error,
    ) -> Self {
        Self::Hook {
            operation,
            tenant: tenant.cloned(),
            source,
        }
    }
}

/// A single tenant's failure within a bulk operation.
#[derive(Debug)]
pub struct TenantFailure {
    pub tenant: TenantName,
    pub error: TenancyError,
}

impl core::fmt::Display for TenantFailure {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}: {}", self.tenant, self.error)
    }
}
