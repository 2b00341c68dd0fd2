//! Postgres-side hook implementations consumed by the engine.
//!
//! The engine deliberately does not know how migrations or seeds are
//! expressed; these adapters bridge to sqlx's migration runner and plain SQL
//! seed files.

use std::future::Future;
use std::ops::Deref;
use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use sqlx::migrate::{Migrate, MigrateError, Migrator};
use sqlx::pool::PoolConnection;
use sqlx::{Acquire, AssertSqlSafe, Postgres};
use tracing::debug;

use tenement_tenancy::{MigrationHook, SeedHook, TenantConnection, TenantName};

/// Migration hook over a directory of sqlx migrations, loaded at startup.
pub struct DirMigrationHook {
    migrator: Migrator,
}

impl DirMigrationHook {
    pub async fn load(dir: &Path) -> anyhow::Result<Self> {
        let migrator = Migrator::new(dir)
            .await
            .with_context(|| format!("loading migrations from {}", dir.display()))?;
        Ok(Self { migrator })
    }
}

// The sqlx calls below live in plain async fns over a concrete
// `&mut PoolConnection<Postgres>`: their `Acquire`/`Executor` obligations
// must resolve at a concrete lifetime, which the boxed trait futures the
// hook traits hand out do not provide.

// Generic adapters over `Acquire` so the `Send` proof for the migrator
// futures resolves from where-clauses; calling `Migrator::run`/`undo` on a
// concrete `&mut PoolConnection` trips "implementation of `sqlx::Acquire`
// is not general enough" (the workaround documented on `sqlx::Acquire`).

fn migrator_run<'a, 'c, A>(
    migrator: &'a Migrator,
    conn: A,
) -> impl Future<Output = Result<(), MigrateError>> + Send + 'a
where
    A: Acquire<'c, Database = Postgres> + Send + 'a,
    <A::Connection as Deref>::Target: Migrate,
{
    async move { migrator.run(conn).await }
}

fn migrator_undo<'a, 'c, A>(
    migrator: &'a Migrator,
    conn: A,
    target: i64,
) -> impl Future<Output = Result<(), MigrateError>> + Send + 'a
where
    A: Acquire<'c, Database = Postgres> + Send + 'a,
    <A::Connection as Deref>::Target: Migrate,
{
    async move { migrator.undo(conn, target).await }
}

/// Versions recorded in the namespace's `_sqlx_migrations` table. Empty when
/// the table does not exist yet (nothing ever applied); any other database
/// failure propagates.
async fn applied_versions(conn: &mut PoolConnection<Postgres>) -> anyhow::Result<Vec<i64>> {
    match sqlx::query_scalar::<_, i64>("SELECT version FROM _sqlx_migrations ORDER BY version")
        .fetch_all(&mut **conn)
        .await
    {
        Ok(versions) => Ok(versions),
        Err(err) if is_undefined_table(&err) => Ok(Vec::new()),
        Err(err) => Err(err).context("querying applied migration versions"),
    }
}

/// SQLSTATE 42P01: the relation does not exist.
fn is_undefined_table(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("42P01"))
}

/// The version to undo down to when reverting the most recent migration:
/// the second-latest applied version, or 0 when only one is applied.
fn rollback_target(versions: &[i64]) -> Option<i64> {
    match versions {
        [] => None,
        [_only] => Some(0),
        [.., previous, _latest] => Some(*previous),
    }
}

async fn run_pending(migrator: &Migrator, conn: &mut PoolConnection<Postgres>) -> anyhow::Result<u64> {
    let before = applied_versions(&mut *conn).await?.len() as u64;
    migrator_run(migrator, &mut *conn).await?;
    let after = applied_versions(&mut *conn).await?.len() as u64;
    Ok(after.saturating_sub(before))
}

async fn undo_latest(migrator: &Migrator, conn: &mut PoolConnection<Postgres>) -> anyhow::Result<()> {
    let versions = applied_versions(&mut *conn).await?;
    match rollback_target(&versions) {
        None => {
            debug!("no applied migrations; nothing to roll back");
            Ok(())
        }
        Some(target) => {
            migrator_undo(migrator, &mut *conn, target).await?;
            Ok(())
        }
    }
}

async fn apply_sql(sql: &str, conn: &mut PoolConnection<Postgres>) -> sqlx::Result<()> {
    sqlx::raw_sql(sql).execute(&mut **conn).await?;
    Ok(())
}

#[async_trait]
impl MigrationHook for DirMigrationHook {
    async fn migrate(&self, conn: &mut TenantConnection) -> anyhow::Result<u64> {
        let pg = conn
            .as_postgres()
            .context("migrations require a postgres connection")?;
        run_pending(&self.migrator, pg).await
    }

    async fn rollback(&self, conn: &mut TenantConnection) -> anyhow::Result<()> {
        let pg = conn
            .as_postgres()
            .context("rollback requires a postgres connection")?;
        undo_latest(&self.migrator, pg).await
    }
}

/// Seed hook that replays a SQL file inside the current namespace.
pub struct SqlFileSeedHook {
    path: PathBuf,
}

impl SqlFileSeedHook {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SeedHook for SqlFileSeedHook {
    async fn seed(&self, tenant: &TenantName, conn: &mut TenantConnection) -> anyhow::Result<()> {
        let sql = std::fs::read_to_string(&self.path)
            .with_context(|| format!("reading seed file {}", self.path.display()))?;
        let pg = conn
            .as_postgres()
            .context("seeding requires a postgres connection")?;

        apply_sql(&sql, pg)
            .await
            .with_context(|| format!("applying seed file {}", self.path.display()))?;
        debug!(tenant = %tenant, "seed file applied");
        Ok(())
    }
}
