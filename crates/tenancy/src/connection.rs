//! A connection bound to a tenant namespace.

use sqlx::pool::PoolConnection;
use sqlx::Postgres;

use tenement_core::TenantName;

use crate::adapter::in_memory::InMemoryHandle;

/// The namespace a connection is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// The shared/default namespace ("no tenant").
    Default,
    Tenant(TenantName),
}

impl Namespace {
    pub fn from_tenant(tenant: Option<&TenantName>) -> Self {
        match tenant {
            Some(t) => Self::Tenant(t.clone()),
            None => Self::Default,
        }
    }

    pub fn tenant(&self) -> Option<&TenantName> {
        match self {
            Self::Default => None,
            Self::Tenant(t) => Some(t),
        }
    }
}

impl core::fmt::Display for Namespace {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Default => f.write_str("<default>"),
            Self::Tenant(t) => core::fmt::Display::fmt(t, f),
        }
    }
}

/// A live connection whose operations resolve against one namespace.
///
/// Produced by an adapter's `connect`; every statement issued through it lands
/// in the namespace it was bound to, until the owning context switches again.
pub struct TenantConnection {
    namespace: Namespace,
    inner: ConnectionInner,
}

enum ConnectionInner {
    Postgres(PoolConnection<Postgres>),
    InMemory(InMemoryHandle),
}

impl TenantConnection {
    pub(crate) fn postgres(namespace: Namespace, conn: PoolConnection<Postgres>) -> Self {
        Self {
            namespace,
            inner: ConnectionInner::Postgres(conn),
        }
    }

    pub(crate) fn in_memory(namespace: Namespace, handle: InMemoryHandle) -> Self {
        Self {
            namespace,
            inner: ConnectionInner::InMemory(handle),
        }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// The tenant this connection is bound to, or `None` for the default
    /// namespace.
    pub fn tenant(&self) -> Option<&TenantName> {
        self.namespace.tenant()
    }

    /// The underlying pooled Postgres connection, for hook implementations.
    ///
    /// This is the owned pool handle, not a bare `PgConnection`: sqlx's
    /// `Acquire`/`Executor` impls require a concrete connection lifetime,
    /// which a reborrow inside a boxed trait future cannot provide.
    pub fn as_postgres(&mut self) -> Option<&mut PoolConnection<Postgres>> {
        match &mut self.inner {
            ConnectionInner::Postgres(conn) => Some(conn),
            ConnectionInner::InMemory(_) => None,
        }
    }

    /// The in-memory handle, for tests and dev setups.
    pub fn as_in_memory(&self) -> Option<&InMemoryHandle> {
        match &self.inner {
            ConnectionInner::Postgres(_) => None,
            ConnectionInner::InMemory(handle) => Some(handle),
        }
    }
}

impl core::fmt::Debug for TenantConnection {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let backend = match self.inner {
            ConnectionInner::Postgres(_) => "postgres",
            ConnectionInner::InMemory(_) => "in_memory",
        };
        f.debug_struct("TenantConnection")
            .field("namespace", &self.namespace)
            .field("backend", &backend)
            .finish()
    }
}
