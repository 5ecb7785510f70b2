//! Provider failover search tests
//!
//! Multi-word searches through the ranked provider chain: rate-limit pacing,
//! fallback queries and failover when the primary provider is down.

mod helpers;

use helpers::*;
use lexi_curator::error::CurationError;
use lexi_curator::services::query_builder::build_query;
use lexi_curator::services::{
    ProviderFailoverSearch, RankedProvider, SearchProvider, SlidingWindowLimiter,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn limited(provider: Arc<dyn SearchProvider>, priority: u32, max_requests: usize, window: Duration) -> RankedProvider {
    let limiter = SlidingWindowLimiter::new(provider.name(), max_requests, window);
    RankedProvider::new(priority, provider, limiter)
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_paces_searches_across_words() {
    let provider = FakeProvider::new("pixabay", 3);
    let search = ProviderFailoverSearch::new(vec![limited(
        provider.clone(),
        1,
        2,
        Duration::from_secs(60),
    )]);

    let start = Instant::now();
    for translation in ["one", "two"] {
        search.search_for_word(translation, None, 3, None).await.unwrap();
    }
    assert!(start.elapsed() < Duration::from_secs(1), "budget not yet spent");

    search.search_for_word("three", None, 3, None).await.unwrap();
    assert!(start.elapsed() >= Duration::from_secs(60), "third request waits for the window");
    assert_eq!(provider.query_count(), 3);
}

#[tokio::test]
async fn test_primary_answering_keeps_secondary_idle() {
    let primary = FakeProvider::new("pexels", 5);
    let secondary = FakeProvider::new("pixabay", 5);
    let search = failover(vec![primary.clone() as Arc<dyn SearchProvider>, secondary.clone()]);

    let found = search.search_for_word("three", Some("numbers"), 5, None).await.unwrap();

    assert_eq!(found.candidates.len(), 5);
    assert!(found.candidates.iter().all(|c| c.provider == "pexels"));
    assert_eq!(found.query, build_query("three", Some("numbers")));
    assert_eq!(secondary.query_count(), 0);
}

#[tokio::test]
async fn test_secondary_tops_up_short_primary() {
    let primary = FakeProvider::new("pexels", 2);
    let secondary = FakeProvider::new("openverse", 5);
    let search = failover(vec![primary as Arc<dyn SearchProvider>, secondary.clone()]);

    let found = search.search_for_word("cat", None, 5, None).await.unwrap();

    let providers: Vec<_> = found.candidates.iter().map(|c| c.provider.as_str()).collect();
    assert_eq!(providers, vec!["pexels", "pexels", "openverse", "openverse", "openverse"]);
    assert_eq!(secondary.query_count(), 1);
}

#[tokio::test]
async fn test_failover_when_primary_is_down_for_every_word() {
    let primary = FailingProvider::new("pexels");
    let secondary = FakeProvider::new("pixabay", 4);
    let search = failover(vec![primary.clone() as Arc<dyn SearchProvider>, secondary.clone()]);

    for translation in ["one", "two", "three"] {
        let found = search.search_for_word(translation, None, 4, None).await.unwrap();
        assert_eq!(found.candidates[0].provider, "pixabay");
    }
    assert_eq!(primary.calls.load(Ordering::SeqCst), 3);
    assert_eq!(secondary.query_count(), 3);
}

#[tokio::test]
async fn test_fallback_query_finds_results() {
    struct OnlyPlain(Arc<FakeProvider>);

    #[async_trait::async_trait]
    impl SearchProvider for OnlyPlain {
        fn name(&self) -> &str {
            "openverse"
        }

        async fn search(
            &self,
            query: &str,
            count: usize,
        ) -> Result<Vec<lexi_curator::models::Candidate>, lexi_curator::services::ProviderError> {
            // Answers only the bare translation
            if query == "hello" {
                self.0.search(query, count).await
            } else {
                self.0.queries.lock().unwrap().push(query.to_string());
                Ok(Vec::new())
            }
        }
    }

    let inner = FakeProvider::new("openverse", 3);
    let search = failover(vec![Arc::new(OnlyPlain(inner.clone())) as Arc<dyn SearchProvider>]);

    let found = search.search_for_word("hello", Some("greetings"), 3, None).await.unwrap();

    assert_eq!(found.query, "hello");
    assert_eq!(found.candidates.len(), 3);
    let queries = inner.queries.lock().unwrap().clone();
    assert_eq!(queries.last().map(String::as_str), Some("hello"));
    assert!(queries.len() >= 2, "primary query tried first");
}

#[tokio::test]
async fn test_allowed_list_restricts_providers() {
    let pexels = FakeProvider::new("pexels", 3);
    let pixabay = FakeProvider::new("pixabay", 3);
    let search = failover(vec![pexels.clone() as Arc<dyn SearchProvider>, pixabay.clone()]);

    let allowed = vec!["pixabay".to_string()];
    let found = search
        .search_for_word("dog", None, 3, Some(allowed.as_slice()))
        .await
        .unwrap();

    assert!(found.candidates.iter().all(|c| c.provider == "pixabay"));
    assert_eq!(pexels.query_count(), 0);
}

#[tokio::test]
async fn test_mixed_failure_and_empty_is_exhausted() {
    let search = failover(vec![
        FailingProvider::new("pexels") as Arc<dyn SearchProvider>,
        FakeProvider::empty("pixabay"),
    ]);

    let err = search.search_for_word("xyzzy", None, 3, None).await.unwrap_err();
    assert!(matches!(err, CurationError::ExhaustedSearch(ref t) if t == "xyzzy"));
}

#[tokio::test]
async fn test_every_provider_down_is_transient() {
    let search = failover(vec![
        FailingProvider::new("pexels") as Arc<dyn SearchProvider>,
        FailingProvider::new("pixabay"),
    ]);

    let err = search.search_for_word("cat", None, 3, None).await.unwrap_err();
    match err {
        CurationError::TransientProvider { provider, .. } => assert_eq!(provider, "pixabay"),
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn test_empty_chain() {
    let search = failover(Vec::new());
    assert!(search.is_empty());
    let outcome = search.search("cat", 3, None).await;
    assert!(outcome.candidates.is_empty());
    assert_eq!(outcome.answered, 0);
}
