//! `tenement-tenancy` — tenant resolution and connection-switching engine.
//!
//! Routes each unit of work to one of many isolated tenant namespaces
//! (Postgres schemas or databases), switching the active connection
//! transparently so application code need not be tenant-aware.
//!
//! The moving parts, leaf to root:
//!
//! - [`registry::TenantRegistry`] — process-wide configuration: switching
//!   strategy, excluded (shared) tables, policies.
//! - [`adapter::TenantAdapter`] — performs the low-level create/drop/switch
//!   against the database. Schema-based, database-based, and in-memory
//!   implementations share one contract.
//! - [`manager::TenantManager`] — orchestration façade: validates names,
//!   enforces in-use accounting, opens switch contexts.
//! - [`context::TenantContext`] — context-local current-tenant state with
//!   scoped switching that restores the previous namespace on every exit path.
//! - [`bulk::BulkRunner`] — applies migrate/rollback/seed across all tenants,
//!   collecting per-tenant failures.

pub mod adapter;
pub mod bulk;
pub mod connection;
pub mod context;
pub mod error;
pub mod hooks;
pub mod manager;
pub mod registry;

#[cfg(test)]
mod integration_tests;
#[cfg(test)]
pub(crate) mod test_support;

pub use adapter::{DatabaseAdapter, InMemoryAdapter, SchemaAdapter, TenantAdapter};
pub use bulk::{BulkOperation, BulkReport, BulkRunner};
pub use connection::{Namespace, TenantConnection};
pub use context::TenantContext;
pub use error::{TenancyError, TenantFailure};
pub use hooks::{FnSource, MigrationHook, SeedHook, SqlNameSource, TenantNameSource, VecSource};
pub use manager::TenantManager;
pub use registry::{
    BulkFailurePolicy, SwitchStrategy, TenancyConfig, TenantNotFoundPolicy, TenantRegistry,
};
pub use tenement_core::{InvalidTenantName, TenantName};
