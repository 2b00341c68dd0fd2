//! Shared test doubles.

use std::sync::{Arc, Mutex, PoisonError};

use anyhow::bail;
use async_trait::async_trait;

use tenement_core::TenantName;

use crate::connection::TenantConnection;
use crate::hooks::{MigrationHook, SeedHook};

/// Hook that records every invocation with the namespace current at the time,
/// and can be told to fail for one tenant.
#[derive(Debug, Default)]
pub(crate) struct RecordingHook {
    calls: Mutex<Vec<(String, Option<TenantName>)>>,
    fail_tenant: Mutex<Option<TenantName>>,
}

impl RecordingHook {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn fail_for(&self, tenant: &str) {
        *self
            .fail_tenant
            .lock()
            .unwrap_or_else(PoisonError::into_inner) =
            Some(TenantName::new(tenant).expect("valid tenant name"));
    }

    pub(crate) fn calls(&self) -> Vec<(String, Option<TenantName>)> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, op: &str, conn: &TenantConnection) -> anyhow::Result<()> {
        let current = conn.tenant().cloned();
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((op.to_string(), current.clone()));

        let fail = self
            .fail_tenant
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if fail.is_some() && fail == current {
            bail!("{op} hook told to fail for this tenant");
        }
        Ok(())
    }
}

#[async_trait]
impl MigrationHook for RecordingHook {
    async fn migrate(&self, conn: &mut TenantConnection) -> anyhow::Result<u64> {
        self.record("migrate", conn)?;
        Ok(1)
    }

    async fn rollback(&self, conn: &mut TenantConnection) -> anyhow::Result<()> {
        self.record("rollback", conn)
    }
}

#[async_trait]
impl SeedHook for RecordingHook {
    async fn seed(&self, _tenant: &TenantName, conn: &mut TenantConnection) -> anyhow::Result<()> {
        self.record("seed", conn)
    }
}
