//! Integration tests for the full switching pipeline.
//!
//! Wires registry → in-memory adapter → manager → context → bulk runner and
//! verifies the end-to-end isolation and restoration properties:
//!
//! - a write issued while switched is observable only in that tenant's
//!   namespace
//! - excluded tables resolve to the default namespace no matter how often the
//!   context switches
//! - bulk runs drive the hooks with the right tenant current, in order

use std::sync::Arc;

use serde_json::json;

use tenement_core::TenantName;

use crate::adapter::InMemoryAdapter;
use crate::bulk::{BulkOperation, BulkRunner};
use crate::connection::Namespace;
use crate::hooks::VecSource;
use crate::manager::TenantManager;
use crate::registry::{TenancyConfig, TenantRegistry};
use crate::test_support::RecordingHook;

fn name(s: &str) -> TenantName {
    TenantName::new(s).unwrap()
}

struct Harness {
    manager: Arc<TenantManager>,
    source: Arc<VecSource>,
    adapter_state: Arc<crate::adapter::in_memory::InMemoryState>,
    hook: Arc<RecordingHook>,
}

async fn harness(config: TenancyConfig, tenants: &[&str]) -> Harness {
    let registry = Arc::new(TenantRegistry::new(config));
    let adapter = Arc::new(InMemoryAdapter::new(registry.clone()));
    let adapter_state = adapter.state();
    let source = Arc::new(VecSource::default());
    let hook = RecordingHook::new();
    let manager = Arc::new(
        TenantManager::new(adapter, registry, source.clone()).with_seeder(hook.clone()),
    );
    for t in tenants {
        manager.create(t).await.unwrap();
        source.push(name(t));
    }
    Harness {
        manager,
        source,
        adapter_state,
        hook,
    }
}

#[tokio::test]
async fn writes_are_visible_only_in_the_switched_tenant() {
    let h = harness(TenancyConfig::new(), &["acme", "beta"]).await;
    let acme = name("acme");
    let beta = name("beta");

    let mut ctx = h.manager.context().await.unwrap();
    ctx.with_tenant(&acme, |ctx| {
        Box::pin(async move {
            ctx.connection()
                .as_in_memory()
                .unwrap()
                .insert("orders", json!({"id": 1}));
            Ok(())
        })
    })
    .await
    .unwrap();

    let state = &h.adapter_state;
    assert_eq!(
        state.rows(&Namespace::Tenant(acme.clone()), "orders"),
        vec![json!({"id": 1})]
    );
    assert!(state.rows(&Namespace::Tenant(beta), "orders").is_empty());
    assert!(state.rows(&Namespace::Default, "orders").is_empty());
}

#[tokio::test]
async fn excluded_tables_hit_default_namespace_across_many_switches() {
    let config = TenancyConfig::new().with_excluded_table("companies");
    let h = harness(config, &["acme", "beta", "gamma"]).await;
    let tenants = [name("acme"), name("beta"), name("gamma")];

    let mut ctx = h.manager.context().await.unwrap();
    for round in 0..4u64 {
        for tenant in &tenants {
            let row = json!({"round": round, "tenant": tenant.as_str()});
            ctx.with_tenant(tenant, move |ctx| {
                Box::pin(async move {
                    ctx.connection()
                        .as_in_memory()
                        .unwrap()
                        .insert("companies", row);
                    Ok(())
                })
            })
            .await
            .unwrap();
        }
    }

    let state = &h.adapter_state;
    assert_eq!(state.rows(&Namespace::Default, "companies").len(), 12);
    for tenant in tenants {
        assert!(state
            .rows(&Namespace::Tenant(tenant), "companies")
            .is_empty());
    }
}

#[tokio::test]
async fn bulk_seed_scenario_acme_then_beta() {
    let h = harness(TenancyConfig::new(), &["acme", "beta"]).await;
    let runner = BulkRunner::new(h.manager.clone());

    let report = runner.run(BulkOperation::Seed).await.unwrap();
    assert_eq!(report.succeeded, vec![name("acme"), name("beta")]);
    assert_eq!(
        h.hook.calls(),
        vec![
            ("seed".to_string(), Some(name("acme"))),
            ("seed".to_string(), Some(name("beta"))),
        ]
    );
}

#[tokio::test]
async fn bulk_migrate_partial_failure_still_migrates_the_rest() {
    let h = harness(TenancyConfig::new(), &["acme", "beta"]).await;
    h.hook.fail_for("beta");
    let runner = BulkRunner::new(h.manager.clone()).with_migrator(h.hook.clone());

    let err = runner.run(BulkOperation::Migrate).await.unwrap_err();

    match err {
        crate::error::TenancyError::AggregateBulk { failures, .. } => {
            let failed: Vec<_> = failures.iter().map(|f| f.tenant.clone()).collect();
            assert_eq!(failed, vec![name("beta")]);
        }
        other => panic!("expected AggregateBulk, got {other:?}"),
    }

    // acme's migrate ran with acme current before beta failed.
    assert_eq!(
        h.hook.calls()[0],
        ("migrate".to_string(), Some(name("acme")))
    );
}

#[tokio::test]
async fn dropped_tenant_disappears_from_the_next_bulk_run() {
    let h = harness(TenancyConfig::new(), &["acme", "beta"]).await;
    let runner = BulkRunner::new(h.manager.clone()).with_migrator(h.hook.clone());

    runner.run(BulkOperation::Migrate).await.unwrap();
    assert_eq!(h.hook.calls().len(), 2);

    h.manager.drop_tenant("beta").await.unwrap();
    h.source.set(vec![name("acme")]);

    runner.run(BulkOperation::Migrate).await.unwrap();
    assert_eq!(h.hook.calls().len(), 3);
}

#[tokio::test]
async fn create_switch_write_drop_lifecycle() {
    let h = harness(TenancyConfig::new(), &[]).await;
    let acme = h.manager.create("acme").await.unwrap();

    let mut ctx = h.manager.context().await.unwrap();
    ctx.switch(&acme).await.unwrap();
    ctx.connection()
        .as_in_memory()
        .unwrap()
        .insert("orders", json!({"id": 7}));
    ctx.reset().await.unwrap();
    drop(ctx);

    h.manager.drop_tenant("acme").await.unwrap();

    // Dropping removed the namespace and its data.
    assert!(h
        .adapter_state
        .rows(&Namespace::Tenant(acme), "orders")
        .is_empty());
}
