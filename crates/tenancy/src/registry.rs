//! Process-wide tenancy configuration.
//!
//! Built once at startup and read-only thereafter. The registry answers the
//! questions every other component asks: which strategy switches namespaces,
//! which tables are shared, what happens when a tenant is missing, and how a
//! bulk run treats per-tenant failures.

use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use tenement_core::TenantName;

/// How the engine isolates tenants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchStrategy {
    /// One Postgres schema per tenant, switched via `search_path`.
    #[default]
    Schema,
    /// One physical database per tenant, switched via per-database pools.
    Database,
}

impl FromStr for SwitchStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "schema" => Ok(Self::Schema),
            "database" => Ok(Self::Database),
            other => Err(format!("unknown switching strategy {other:?}")),
        }
    }
}

/// What `switch` does when the target tenant's namespace does not exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantNotFoundPolicy {
    /// Fail with `TenantNotFound`.
    #[default]
    Raise,
    /// Silently bind to the default namespace instead.
    Fallback,
}

impl FromStr for TenantNotFoundPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "raise" => Ok(Self::Raise),
            "fallback" => Ok(Self::Fallback),
            other => Err(format!("unknown tenant-not-found policy {other:?}")),
        }
    }
}

/// How a bulk run treats a single tenant's failure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkFailurePolicy {
    /// Record the failure and keep going; aggregate at the end.
    #[default]
    Continue,
    /// Stop after the first failing tenant.
    Halt,
}

impl FromStr for BulkFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "continue" => Ok(Self::Continue),
            "halt" => Ok(Self::Halt),
            other => Err(format!("unknown bulk failure policy {other:?}")),
        }
    }
}

/// Tenancy engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TenancyConfig {
    pub switching_strategy: SwitchStrategy,
    /// Connection URL for the default database (also the control database
    /// under the database strategy).
    pub database_url: Option<String>,
    /// Schema holding shared tables; the namespace of "no tenant".
    pub default_schema: String,
    /// Schemas kept visible in every tenant's search_path (extensions,
    /// shared lookup schemas). The default schema itself is never appended
    /// to a tenant's search_path.
    pub persistent_schemas: Vec<String>,
    /// Tables that always resolve against the default namespace, whatever
    /// tenant is current.
    pub excluded_tables: HashSet<String>,
    pub tenant_not_found_policy: TenantNotFoundPolicy,
    pub bulk_failure_policy: BulkFailurePolicy,
    /// Run the seed hook inside a tenant right after `create`.
    pub seed_after_create: bool,
    /// Upper bound on waiting for a pool slot when switching.
    pub connect_timeout_ms: u64,
}

impl Default for TenancyConfig {
    fn default() -> Self {
        Self {
            switching_strategy: SwitchStrategy::Schema,
            database_url: None,
            default_schema: "public".to_string(),
            persistent_schemas: Vec::new(),
            excluded_tables: HashSet::new(),
            tenant_not_found_policy: TenantNotFoundPolicy::Raise,
            bulk_failure_policy: BulkFailurePolicy::Continue,
            seed_after_create: false,
            connect_timeout_ms: 5_000,
        }
    }
}

impl TenancyConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read configuration from `TENEMENT_*` environment variables (and
    /// `DATABASE_URL`). Unknown values keep the default and log a warning.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        config.database_url = std::env::var("DATABASE_URL").ok();

        if let Ok(raw) = std::env::var("TENEMENT_STRATEGY") {
            match raw.parse() {
                Ok(v) => config.switching_strategy = v,
                Err(e) => warn!("TENEMENT_STRATEGY: {e}; keeping default"),
            }
        }
        if let Ok(raw) = std::env::var("TENEMENT_DEFAULT_SCHEMA") {
            config.default_schema = raw;
        }
        if let Ok(raw) = std::env::var("TENEMENT_PERSISTENT_SCHEMAS") {
            config.persistent_schemas = split_csv(&raw);
        }
        if let Ok(raw) = std::env::var("TENEMENT_EXCLUDED_TABLES") {
            config.excluded_tables = split_csv(&raw).into_iter().collect();
        }
        if let Ok(raw) = std::env::var("TENEMENT_TENANT_NOT_FOUND") {
            match raw.parse() {
                Ok(v) => config.tenant_not_found_policy = v,
                Err(e) => warn!("TENEMENT_TENANT_NOT_FOUND: {e}; keeping default"),
            }
        }
        if let Ok(raw) = std::env::var("TENEMENT_BULK_FAILURE") {
            match raw.parse() {
                Ok(v) => config.bulk_failure_policy = v,
                Err(e) => warn!("TENEMENT_BULK_FAILURE: {e}; keeping default"),
            }
        }
        if let Ok(raw) = std::env::var("TENEMENT_SEED_AFTER_CREATE") {
            config.seed_after_create = raw == "1" || raw.eq_ignore_ascii_case("true");
        }
        if let Ok(raw) = std::env::var("TENEMENT_CONNECT_TIMEOUT_MS") {
            match raw.parse() {
                Ok(v) => config.connect_timeout_ms = v,
                Err(_) => warn!("TENEMENT_CONNECT_TIMEOUT_MS is not a number; keeping default"),
            }
        }

        config
    }

    pub fn with_strategy(mut self, strategy: SwitchStrategy) -> Self {
        self.switching_strategy = strategy;
        self
    }

    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    pub fn with_default_schema(mut self, schema: impl Into<String>) -> Self {
        self.default_schema = schema.into();
        self
    }

    pub fn with_persistent_schema(mut self, schema: impl Into<String>) -> Self {
        self.persistent_schemas.push(schema.into());
        self
    }

    pub fn with_excluded_table(mut self, table: impl Into<String>) -> Self {
        self.excluded_tables.insert(table.into());
        self
    }

    pub fn with_tenant_not_found_policy(mut self, policy: TenantNotFoundPolicy) -> Self {
        self.tenant_not_found_policy = policy;
        self
    }

    pub fn with_bulk_failure_policy(mut self, policy: BulkFailurePolicy) -> Self {
        self.bulk_failure_policy = policy;
        self
    }

    pub fn with_seed_after_create(mut self, seed: bool) -> Self {
        self.seed_after_create = seed;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Read-only view over [`TenancyConfig`], shared by every component.
#[derive(Debug)]
pub struct TenantRegistry {
    config: TenancyConfig,
}

impl TenantRegistry {
    pub fn new(config: TenancyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TenancyConfig {
        &self.config
    }

    pub fn strategy(&self) -> SwitchStrategy {
        self.config.switching_strategy
    }

    pub fn default_schema(&self) -> &str {
        &self.config.default_schema
    }

    pub fn tenant_not_found_policy(&self) -> TenantNotFoundPolicy {
        self.config.tenant_not_found_policy
    }

    pub fn bulk_failure_policy(&self) -> BulkFailurePolicy {
        self.config.bulk_failure_policy
    }

    pub fn seed_after_create(&self) -> bool {
        self.config.seed_after_create
    }

    pub fn connect_timeout(&self) -> Duration {
        self.config.connect_timeout()
    }

    /// Whether `table` is shared and must always resolve against the default
    /// namespace, regardless of the current tenant.
    pub fn is_excluded(&self, table: &str) -> bool {
        self.config.excluded_tables.contains(table)
    }

    /// Default-schema-qualified name for a shared table, e.g.
    /// `"public"."companies"`. Excluded models address shared data through
    /// this, never through the tenant search_path.
    pub fn shared_table(&self, table: &str) -> String {
        format!(
            "{}.{}",
            quote_ident(&self.config.default_schema),
            quote_ident(table)
        )
    }

    /// The `search_path` value for a namespace under the schema strategy.
    ///
    /// A switched tenant sees its own schema plus any persistent schemas; it
    /// never sees the default schema, which is what keeps tenant writes out
    /// of shared territory.
    pub(crate) fn search_path(&self, tenant: Option<&TenantName>) -> String {
        let mut parts = Vec::with_capacity(1 + self.config.persistent_schemas.len());
        match tenant {
            Some(t) => parts.push(t.quoted()),
            None => parts.push(quote_ident(&self.config.default_schema)),
        }
        for schema in &self.config.persistent_schemas {
            parts.push(quote_ident(schema));
        }
        parts.join(", ")
    }
}

/// Double-quote an identifier, escaping embedded quotes.
fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> TenantRegistry {
        TenantRegistry::new(
            TenancyConfig::new()
                .with_excluded_table("companies")
                .with_persistent_schema("extensions"),
        )
    }

    #[test]
    fn default_config_is_schema_strategy_continue_on_error() {
        let config = TenancyConfig::default();
        assert_eq!(config.switching_strategy, SwitchStrategy::Schema);
        assert_eq!(config.tenant_not_found_policy, TenantNotFoundPolicy::Raise);
        assert_eq!(config.bulk_failure_policy, BulkFailurePolicy::Continue);
        assert_eq!(config.default_schema, "public");
        assert!(!config.seed_after_create);
    }

    #[test]
    fn excluded_tables_resolve_to_default_schema() {
        let registry = registry();
        assert!(registry.is_excluded("companies"));
        assert!(!registry.is_excluded("orders"));
        assert_eq!(registry.shared_table("companies"), "\"public\".\"companies\"");
    }

    #[test]
    fn tenant_search_path_excludes_default_schema() {
        let registry = registry();
        let tenant = TenantName::new("acme").unwrap();
        assert_eq!(
            registry.search_path(Some(&tenant)),
            "\"acme\", \"extensions\""
        );
    }

    #[test]
    fn default_search_path_starts_with_default_schema() {
        let registry = registry();
        assert_eq!(registry.search_path(None), "\"public\", \"extensions\"");
    }

    #[test]
    fn policy_enums_parse_from_str() {
        assert_eq!("schema".parse(), Ok(SwitchStrategy::Schema));
        assert_eq!("database".parse(), Ok(SwitchStrategy::Database));
        assert_eq!("raise".parse(), Ok(TenantNotFoundPolicy::Raise));
        assert_eq!("fallback".parse(), Ok(TenantNotFoundPolicy::Fallback));
        assert_eq!("continue".parse(), Ok(BulkFailurePolicy::Continue));
        assert_eq!("halt".parse(), Ok(BulkFailurePolicy::Halt));
        assert!("other".parse::<SwitchStrategy>().is_err());
    }

    #[test]
    fn quote_ident_escapes_embedded_quotes() {
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }
}
