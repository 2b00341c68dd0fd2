//! Tenant lifecycle task surface.
//!
//! `tenement tenant:migrate | tenant:rollback | tenant:seed` — each iterates
//! every known tenant, switching into it before invoking the hook. Exit code
//! 0 only when every tenant succeeded.
//!
//! Configuration comes from `DATABASE_URL` and the `TENEMENT_*` environment
//! variables; `TENEMENT_LOG` sets the default log level when `RUST_LOG` is
//! unset.

mod hooks;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info};

use tenement_tenancy::{
    BulkOperation, BulkRunner, DatabaseAdapter, SchemaAdapter, SqlNameSource, SwitchStrategy,
    TenancyConfig, TenancyError, TenantAdapter, TenantManager, TenantRegistry,
};

use hooks::{DirMigrationHook, SqlFileSeedHook};

#[derive(Parser)]
#[command(name = "tenement", about = "Tenant lifecycle tasks", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply pending migrations in every tenant.
    #[command(name = "tenant:migrate")]
    Migrate,
    /// Revert the most recent migration in every tenant.
    #[command(name = "tenant:rollback")]
    Rollback,
    /// Load seed data into every tenant.
    #[command(name = "tenant:seed")]
    Seed,
}

impl Command {
    fn operation(&self) -> BulkOperation {
        match self {
            Self::Migrate => BulkOperation::Migrate,
            Self::Rollback => BulkOperation::Rollback,
            Self::Seed => BulkOperation::Seed,
        }
    }
}

#[tokio::main]
async fn main() {
    tenement_observability::init();
    let cli = Cli::parse();
    let operation = cli.command.operation();

    match run(operation).await {
        Ok(succeeded) => {
            info!(%operation, tenants = succeeded, "all tenants succeeded");
        }
        Err(err) => {
            report_failure(&err);
            std::process::exit(1);
        }
    }
}

async fn run(operation: BulkOperation) -> anyhow::Result<usize> {
    let config = TenancyConfig::from_env();
    let database_url = config
        .database_url
        .clone()
        .context("DATABASE_URL must be set")?;
    let registry = Arc::new(TenantRegistry::new(config));

    let pool = sqlx::postgres::PgPoolOptions::new()
        .acquire_timeout(registry.connect_timeout())
        .connect_lazy(&database_url)
        .context("invalid DATABASE_URL")?;

    let migrations_dir: PathBuf = std::env::var("TENEMENT_MIGRATIONS_DIR")
        .unwrap_or_else(|_| "./migrations".to_string())
        .into();
    let migrator = Arc::new(DirMigrationHook::load(&migrations_dir).await?);

    let seed_file =
        std::env::var("TENEMENT_SEED_FILE").unwrap_or_else(|_| "./seeds.sql".to_string());
    let seeder = Arc::new(SqlFileSeedHook::new(seed_file));

    let tenants_query = std::env::var("TENEMENT_TENANTS_QUERY")
        .unwrap_or_else(|_| SqlNameSource::DEFAULT_QUERY.to_string());
    let source = Arc::new(SqlNameSource::new(pool.clone(), tenants_query));

    let adapter: Arc<dyn TenantAdapter> = match registry.strategy() {
        SwitchStrategy::Schema => Arc::new(
            SchemaAdapter::new(pool, registry.clone()).with_migrator(migrator.clone()),
        ),
        SwitchStrategy::Database => Arc::new(
            DatabaseAdapter::from_url(&database_url, registry.clone())?
                .with_migrator(migrator.clone()),
        ),
    };

    let manager = Arc::new(
        TenantManager::new(adapter, registry, source).with_seeder(seeder.clone()),
    );
    let runner = BulkRunner::new(manager)
        .with_migrator(migrator)
        .with_seeder(seeder);

    let report = runner.run(operation).await?;
    Ok(report.succeeded.len())
}

fn report_failure(err: &anyhow::Error) {
    if let Some(TenancyError::AggregateBulk {
        operation,
        failures,
    }) = err.downcast_ref::<TenancyError>()
    {
        error!(%operation, failed = failures.len(), "bulk run failed");
        for failure in failures {
            error!(tenant = %failure.tenant, error = %failure.error, "tenant failed");
        }
    } else {
        error!("task failed: {err:#}");
    }
}
