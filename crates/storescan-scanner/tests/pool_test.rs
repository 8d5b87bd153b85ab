mod common;

use common::*;
use std::sync::Arc;
use storescan_core::{LocationCode, MemoryStore};
use storescan_scanner::{AgentPool, AgentStatus, ScanError, SessionContext, TokenManager};

struct Harness {
    browser: Arc<FakeBrowser>,
    tokens: TokenManager,
    ctx: Arc<SessionContext>,
}

fn harness(script: SiteScript) -> Harness {
    let ctx = Arc::new(SessionContext::new(
        test_config(3),
        Arc::new(MemoryStore::new()),
    ));
    let tokens = TokenManager::new(Arc::clone(&ctx)).expect("token manager");
    Harness {
        browser: FakeBrowser::new(script),
        tokens,
        ctx,
    }
}

async fn pool_of(h: &Harness, n: usize) -> AgentPool {
    AgentPool::initialize(h.browser.clone(), n, &h.tokens, &h.ctx)
        .await
        .expect("pool initializes")
}

fn code(location: &str) -> LocationCode {
    LocationCode::new(location).expect("valid location")
}

#[tokio::test]
async fn test_new_agents_start_unassigned_and_idle() {
    let h = harness(SiteScript::with_entry(BARE_ENTRY));
    let pool = pool_of(&h, 3).await;

    assert_eq!(pool.size(), 3);
    assert!(pool.creation_failures().is_empty());
    assert_eq!(pool.control().id(), 0);
    assert_eq!(
        pool.status(),
        (0..3)
            .map(|id| AgentStatus {
                id,
                assigned_location: None,
                busy: false,
            })
            .collect::<Vec<_>>()
    );

    // Every agent loaded the entry page once.
    assert_eq!(h.browser.log().navigations.len(), 3);
}

#[tokio::test]
async fn test_reassign_is_bookkeeping_only() {
    let h = harness(SiteScript::with_entry(BARE_ENTRY));
    let pool = pool_of(&h, 2).await;
    let opened = h.browser.opened_count();
    let navigations = h.browser.log().navigations.len();

    pool.reassign(1, &code("SEA"));
    let status = pool.status();
    assert_eq!(status[0].assigned_location, None);
    assert_eq!(status[1].assigned_location, Some(code("SEA")));

    pool.reassign_all(&code("PDX"));
    assert!(pool
        .status()
        .iter()
        .all(|s| s.assigned_location == Some(code("PDX"))));

    // Unknown agents are ignored.
    pool.reassign(9, &code("SEA"));
    assert_eq!(pool.status().len(), 2);

    assert_eq!(h.browser.opened_count(), opened, "no new tab for a reassignment");
    assert_eq!(h.browser.log().navigations.len(), navigations);
    assert!(h.browser.log().closed.is_empty());
}

#[tokio::test]
async fn test_busy_flag_toggles_per_agent() {
    let h = harness(SiteScript::with_entry(BARE_ENTRY));
    let pool = pool_of(&h, 2).await;

    pool.set_busy(0, true);
    let busy: Vec<_> = pool.status().iter().map(|s| s.busy).collect();
    assert_eq!(busy, vec![true, false]);

    pool.set_busy(1, true);
    pool.set_busy(0, false);
    let busy: Vec<_> = pool.status().iter().map(|s| s.busy).collect();
    assert_eq!(busy, vec![false, true]);
}

#[tokio::test]
async fn test_degraded_pool_keeps_surviving_ids() {
    let mut script = SiteScript::with_entry(BARE_ENTRY);
    script.open_failures = 1;
    let h = harness(script);
    let pool = pool_of(&h, 3).await;

    let ids: Vec<_> = pool.agents().iter().map(|a| a.id()).collect();
    assert_eq!(ids, vec![1, 2]);
    assert_eq!(pool.size(), 2);
    assert_eq!(pool.control().id(), 1);

    let failures = pool.creation_failures();
    assert_eq!(failures.len(), 1);
    assert!(matches!(
        &failures[0],
        ScanError::AgentCreation { agent_id: 0, reason } if reason.contains("tab refused")
    ));
    let status_ids: Vec<_> = pool.status().iter().map(|s| s.id).collect();
    assert_eq!(status_ids, vec![1, 2]);
}

#[tokio::test]
async fn test_entry_failure_closes_the_tab() {
    let mut script = SiteScript::with_entry(BARE_ENTRY);
    script.failing_urls.insert(ENTRY_URL.to_string());
    let h = harness(script);

    let err = AgentPool::initialize(h.browser.clone(), 2, &h.tokens, &h.ctx)
        .await
        .err()
        .expect("no agent can load the entry page");
    assert!(matches!(err, ScanError::CapabilityUnavailable(_)));
    assert_eq!(h.browser.log().closed.len(), 2);
    assert_eq!(h.browser.shutdown_count(), 1);
}

#[tokio::test]
async fn test_teardown_closes_every_tab() {
    let h = harness(SiteScript::with_entry(BARE_ENTRY));
    let pool = pool_of(&h, 3).await;

    pool.teardown(&h.ctx).await;
    let mut closed = h.browser.log().closed.clone();
    closed.sort_unstable();
    assert_eq!(closed, vec![0, 1, 2]);
    assert_eq!(h.browser.shutdown_count(), 1);
    assert_eq!(h.ctx.active_observers(), 0);
}
