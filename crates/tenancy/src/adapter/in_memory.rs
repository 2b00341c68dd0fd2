//! In-memory tenant adapter.
//!
//! Intended for tests/dev. Namespaces are map entries; "writes" are rows in a
//! per-namespace log so isolation properties can be asserted directly.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use tenement_core::TenantName;

use super::TenantAdapter;
use crate::connection::{Namespace, TenantConnection};
use crate::error::TenancyError;
use crate::hooks::MigrationHook;
use crate::registry::TenantRegistry;

/// A logged write: which table, what value.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggedRow {
    pub table: String,
    pub value: JsonValue,
}

/// Shared namespace/write-log state behind the in-memory adapter.
#[derive(Debug, Default)]
pub struct InMemoryState {
    namespaces: RwLock<HashMap<Namespace, Vec<LoggedRow>>>,
}

impl InMemoryState {
    pub fn new() -> Self {
        let state = Self::default();
        state.write().insert(Namespace::Default, Vec::new());
        state
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<Namespace, Vec<LoggedRow>>> {
        self.namespaces
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<Namespace, Vec<LoggedRow>>> {
        self.namespaces
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn contains(&self, tenant: &TenantName) -> bool {
        self.read().contains_key(&Namespace::Tenant(tenant.clone()))
    }

    /// Rows written to `table` inside `namespace`.
    pub fn rows(&self, namespace: &Namespace, table: &str) -> Vec<JsonValue> {
        self.read()
            .get(namespace)
            .map(|log| {
                log.iter()
                    .filter(|row| row.table == table)
                    .map(|row| row.value.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Remove a tenant's namespace behind the adapter's back.
    ///
    /// Lets tests simulate a namespace disappearing between a switch and its
    /// restoration (e.g. dropped by another process).
    pub fn remove_namespace(&self, tenant: &TenantName) -> bool {
        self.write()
            .remove(&Namespace::Tenant(tenant.clone()))
            .is_some()
    }

    fn insert_row(&self, namespace: Namespace, row: LoggedRow) {
        self.write().entry(namespace).or_default().push(row);
    }
}

/// Handle bound to one namespace, handed out by [`InMemoryAdapter::connect`].
///
/// Writes against excluded tables are routed to the default namespace, the
/// same resolution the Postgres adapters get from qualified shared-table
/// names.
#[derive(Debug, Clone)]
pub struct InMemoryHandle {
    namespace: Namespace,
    registry: Arc<TenantRegistry>,
    state: Arc<InMemoryState>,
}

impl InMemoryHandle {
    fn target(&self, table: &str) -> Namespace {
        if self.registry.is_excluded(table) {
            Namespace::Default
        } else {
            self.namespace.clone()
        }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Record a write against `table`, routed by the excluded-table rules.
    pub fn insert(&self, table: &str, value: JsonValue) {
        self.state.insert_row(
            self.target(table),
            LoggedRow {
                table: table.to_string(),
                value,
            },
        );
    }

    /// Read back `table` through the same routing as [`insert`](Self::insert).
    pub fn rows(&self, table: &str) -> Vec<JsonValue> {
        self.state.rows(&self.target(table), table)
    }
}

/// In-memory tenant adapter for tests/dev.
pub struct InMemoryAdapter {
    state: Arc<InMemoryState>,
    registry: Arc<TenantRegistry>,
    migrator: Option<Arc<dyn MigrationHook>>,
}

impl InMemoryAdapter {
    pub fn new(registry: Arc<TenantRegistry>) -> Self {
        Self {
            state: Arc::new(InMemoryState::new()),
            registry,
            migrator: None,
        }
    }

    pub fn with_migrator(mut self, migrator: Arc<dyn MigrationHook>) -> Self {
        self.migrator = Some(migrator);
        self
    }

    /// The shared state, for assertions across namespaces.
    pub fn state(&self) -> Arc<InMemoryState> {
        self.state.clone()
    }
}

#[async_trait]
impl TenantAdapter for InMemoryAdapter {
    async fn create(&self, tenant: &TenantName) -> Result<(), TenancyError> {
        {
            let mut namespaces = self.state.write();
            let key = Namespace::Tenant(tenant.clone());
            if namespaces.contains_key(&key) {
                return Err(TenancyError::TenantExists(tenant.clone()));
            }
            namespaces.insert(key, Vec::new());
        }

        if let Some(migrator) = &self.migrator {
            let mut conn = self.connect(Some(tenant)).await?;
            migrator
                .migrate(&mut conn)
                .await
                .map_err(|e| TenancyError::hook("migrate", Some(tenant), e))?;
        }

        Ok(())
    }

    async fn drop_tenant(&self, tenant: &TenantName) -> Result<(), TenancyError> {
        if self.state.remove_namespace(tenant) {
            Ok(())
        } else {
            Err(TenancyError::TenantNotFound(tenant.clone()))
        }
    }

    async fn tenant_exists(&self, tenant: &TenantName) -> Result<bool, TenancyError> {
        Ok(self.state.contains(tenant))
    }

    async fn connect(&self, tenant: Option<&TenantName>) -> Result<TenantConnection, TenancyError> {
        let target = self
            .resolve_target(tenant, self.registry.tenant_not_found_policy())
            .await?;

        let namespace = Namespace::from_tenant(target.as_ref());
        let handle = InMemoryHandle {
            namespace: namespace.clone(),
            registry: self.registry.clone(),
            state: self.state.clone(),
        };
        Ok(TenantConnection::in_memory(namespace, handle))
    }
}
