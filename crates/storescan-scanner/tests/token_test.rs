mod common;

use chrono::{Duration as ChronoDuration, Utc};
use common::*;
use std::sync::Arc;
use storescan_browser::PageSession;
use storescan_core::{KeyValueStore, MemoryStore, SessionToken, TokenSource};
use storescan_scanner::{
    AttemptOutcome, SessionContext, TokenManager, TOKEN_CACHE_KEY, USE_FALLBACK_KEY,
};

fn manager_with(
    store: Arc<dyn KeyValueStore>,
    configure: impl FnOnce(&mut storescan_core::AppConfig),
) -> (TokenManager, Arc<SessionContext>) {
    let mut config = test_config(1);
    configure(&mut config);
    let ctx = Arc::new(SessionContext::new(config, store));
    let manager = TokenManager::new(Arc::clone(&ctx)).expect("token manager");
    (manager, ctx)
}

async fn seed_cache(store: &MemoryStore, value: &str, age_hours: i64) {
    let token = SessionToken {
        value: value.to_string(),
        captured_at: Utc::now() - ChronoDuration::hours(age_hours),
        source: TokenSource::DocumentScan,
    };
    store
        .set(TOKEN_CACHE_KEY, serde_json::to_value(token).expect("serialize"))
        .await
        .expect("seed cache");
}

#[tokio::test]
async fn test_fresh_cache_skips_every_strategy() {
    let store = Arc::new(MemoryStore::new());
    seed_cache(&store, "cached-token", 23).await;
    let (manager, _ctx) = manager_with(store.clone(), |_| {});

    let browser = FakeBrowser::new(SiteScript::with_entry(entry_page_with_meta("meta-token")));
    let page = browser.page();

    let acquisition = manager.acquire(&*page).await;
    let token = acquisition.token.clone().expect("token");
    assert_eq!(token.value, "cached-token");
    assert_eq!(token.source, TokenSource::Cache);
    assert_eq!(acquisition.attempted(), vec!["cache"]);
    assert_eq!(browser.log().dom_interactions(), 0);
}

#[tokio::test]
async fn test_stale_cache_runs_document_strategies_in_order() {
    let store = Arc::new(MemoryStore::new());
    seed_cache(&store, "old-token", 24).await;
    let (manager, _ctx) = manager_with(store.clone(), |_| {});

    let browser = FakeBrowser::new(SiteScript::with_entry(
        r#"<html><body><form><input type="hidden" name="csrfToken" value="hidden-token"></form></body></html>"#,
    ));
    let page = browser.page();
    page.navigate(ENTRY_URL).await.expect("navigate");

    let acquisition = manager.acquire(&*page).await;
    assert_eq!(
        acquisition.attempted(),
        vec![
            "cache",
            "passive-observation",
            "provoked-interaction",
            "document-scan",
            "document-scan/meta-tag",
            "document-scan/inline-script",
            "document-scan/data-attribute",
            "document-scan/global-state",
            "document-scan/hidden-field",
        ]
    );
    let token = acquisition.token.expect("token");
    assert_eq!(token.value, "hidden-token");
    assert_eq!(token.source, TokenSource::DocumentScan);
    assert!(matches!(
        acquisition.attempts[2].outcome,
        AttemptOutcome::Failed(_)
    ));

    // The new capture replaced the stale cache entry.
    let cached = manager.cached().await.expect("fresh cache");
    assert_eq!(cached.value, "hidden-token");
}

#[tokio::test]
async fn test_persisted_token_round_trip() {
    let store = Arc::new(MemoryStore::new());
    let (manager, _ctx) = manager_with(store.clone(), |_| {});
    let browser = FakeBrowser::new(SiteScript::with_entry(entry_page_with_meta("meta-token")));
    let page = browser.page();

    let first = manager.get_token(&*page).await.expect("token");
    assert_eq!(first.value, "meta-token");
    let interactions = browser.log().dom_interactions();

    let second = manager.get_token(&*page).await.expect("token");
    assert_eq!(second.value, first.value);
    assert_eq!(second.source, TokenSource::Cache);
    assert_eq!(
        browser.log().dom_interactions(),
        interactions,
        "cache hit must not re-acquire"
    );
}

#[tokio::test]
async fn test_passive_observation_captures_first_token() {
    let (manager, ctx) = manager_with(Arc::new(MemoryStore::new()), |_| {});
    let mut script = SiteScript::with_entry(BARE_ENTRY);
    script.passive_token = Some("passive-token".to_string());
    let browser = FakeBrowser::new(script);
    let page = browser.page();

    manager.observe_passively(&*page);
    page.navigate(ENTRY_URL).await.expect("navigate");

    for _ in 0..100 {
        if ctx.passive_token().is_some() {
            break;
        }
        tokio::task::yield_now().await;
    }

    let token = manager.get_token(&*page).await.expect("token");
    assert_eq!(token.value, "passive-token");
    assert_eq!(token.source, TokenSource::PassiveObservation);
    assert_eq!(browser.log().dom_interactions(), 0);
}

#[tokio::test]
async fn test_provoked_interaction_captures_confirm_request() {
    let (manager, _ctx) = manager_with(Arc::new(MemoryStore::new()), |_| {});
    let mut script = SiteScript::with_entry(BARE_ENTRY);
    script.provoked_token = Some("provoked-token".to_string());
    script.selectors.insert("#location-selector-link".to_string());
    script.selectors.insert("#location-selector-confirm".to_string());
    let browser = FakeBrowser::new(script);
    let page = browser.page();

    let token = manager.get_token(&*page).await.expect("token");
    assert_eq!(token.value, "provoked-token");
    assert_eq!(token.source, TokenSource::ProvokedInteraction);
    assert_eq!(
        browser.log().clicks,
        vec!["#location-selector-link", "#location-selector-confirm"]
    );
}

#[tokio::test]
async fn test_global_state_lookup() {
    let (manager, _ctx) = manager_with(Arc::new(MemoryStore::new()), |_| {});
    let mut script = SiteScript::with_entry(BARE_ENTRY);
    script
        .globals
        .insert("window.csrfToken".to_string(), "global-token".to_string());
    let browser = FakeBrowser::new(script);

    let acquisition = manager.acquire(&*browser.page()).await;
    assert_eq!(acquisition.token.map(|t| t.value).as_deref(), Some("global-token"));
    assert_eq!(
        acquisition.attempts.last().map(|a| a.strategy.as_str()),
        Some("document-scan/global-state")
    );
}

#[tokio::test]
async fn test_fallback_disabled_returns_none() {
    let (manager, _ctx) = manager_with(Arc::new(MemoryStore::new()), |config| {
        config.token.fallback_token = Some("static-token".to_string());
    });
    let browser = FakeBrowser::new(SiteScript::with_entry(BARE_ENTRY));

    let acquisition = manager.acquire(&*browser.page()).await;
    assert!(acquisition.token.is_none());
    let last = acquisition.attempts.last().expect("attempts");
    assert_eq!(last.strategy, "static-fallback");
    assert_eq!(last.outcome, AttemptOutcome::Miss);
}

#[tokio::test]
async fn test_fallback_enabled_by_config_or_storage() {
    let (manager, _ctx) = manager_with(Arc::new(MemoryStore::new()), |config| {
        config.token.use_fallback = true;
        config.token.fallback_token = Some("static-token".to_string());
    });
    let browser = FakeBrowser::new(SiteScript::with_entry(BARE_ENTRY));
    let token = manager.get_token(&*browser.page()).await.expect("token");
    assert_eq!(token.value, "static-token");
    assert_eq!(token.source, TokenSource::StaticFallback);

    // A stored override wins over the config flag.
    let store = Arc::new(MemoryStore::new());
    store
        .set(USE_FALLBACK_KEY, serde_json::json!(false))
        .await
        .expect("set override");
    let (manager, _ctx) = manager_with(store, |config| {
        config.token.use_fallback = true;
        config.token.fallback_token = Some("static-token".to_string());
    });
    assert!(manager.get_token(&*browser.page()).await.is_none());
}

#[tokio::test]
async fn test_invalidate_forces_reacquisition() {
    let store = Arc::new(MemoryStore::new());
    seed_cache(&store, "cached-token", 1).await;
    let (manager, _ctx) = manager_with(store.clone(), |_| {});

    manager.invalidate().await;
    assert!(store.get(TOKEN_CACHE_KEY).await.expect("read").is_none());
    assert!(manager.cached().await.is_none());
}

#[tokio::test]
async fn test_storage_errors_never_escape() {
    let (manager, _ctx) = manager_with(Arc::new(FailingStore), |_| {});
    let browser = FakeBrowser::new(SiteScript::with_entry(entry_page_with_meta("meta-token")));
    let token = manager.get_token(&*browser.page()).await.expect("token");
    assert_eq!(token.value, "meta-token");
}
