//! Priority-ordered search across providers
//!
//! Providers are queried one at a time in ascending priority, each behind its
//! own rate limiter. A failing provider is logged and skipped. Results
//! accumulate until `count` is reached and are then truncated.

use std::sync::Arc;
use std::time::Duration;

use crate::config::ProviderConfig;
use crate::error::CurationError;
use crate::models::Candidate;
use crate::services::providers::{ProviderError, SearchProvider};
use crate::services::query_builder::{build_query, fallback_queries};
use crate::services::rate_limiter::SlidingWindowLimiter;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A provider with its priority and request budget
#[derive(Clone)]
pub struct RankedProvider {
    /// Lower runs first
    pub priority: u32,
    pub provider: Arc<dyn SearchProvider>,
    pub limiter: Arc<SlidingWindowLimiter>,
}

impl RankedProvider {
    pub fn new(priority: u32, provider: Arc<dyn SearchProvider>, limiter: SlidingWindowLimiter) -> Self {
        Self {
            priority,
            provider,
            limiter: Arc::new(limiter),
        }
    }

    /// Build from provider settings (priority and sliding-window budget)
    pub fn from_config(config: &ProviderConfig, provider: Arc<dyn SearchProvider>) -> Self {
        let limiter = SlidingWindowLimiter::new(
            provider.name(),
            config.max_requests,
            Duration::from_secs(config.window_seconds),
        );
        Self::new(config.priority, provider, limiter)
    }

    pub fn name(&self) -> &str {
        self.provider.name()
    }
}

/// Result of one query across all allowed providers
#[derive(Debug, Default)]
pub struct SearchOutcome {
    pub candidates: Vec<Candidate>,
    /// (provider, error) for every provider call that failed
    pub failures: Vec<(String, String)>,
    /// Providers that answered, even with zero results
    pub answered: usize,
}

/// Candidates found for a word and the query that found them
#[derive(Debug)]
pub struct WordSearch {
    pub query: String,
    pub candidates: Vec<Candidate>,
}

pub struct ProviderFailoverSearch {
    providers: Vec<RankedProvider>,
    request_timeout: Duration,
}

impl ProviderFailoverSearch {
    /// Providers are ordered by priority; equal priorities keep their given order
    pub fn new(mut providers: Vec<RankedProvider>) -> Self {
        providers.sort_by_key(|p| p.priority);
        Self {
            providers,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn from_configured(configured: Vec<(ProviderConfig, Arc<dyn SearchProvider>)>) -> Self {
        Self::new(
            configured
                .into_iter()
                .map(|(config, provider)| RankedProvider::from_config(&config, provider))
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Provider names in query order
    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    /// Query providers in priority order until `count` candidates are gathered
    ///
    /// `allowed` restricts the run to the named providers. Never fails;
    /// provider errors are reported in the outcome.
    pub async fn search(&self, query: &str, count: usize, allowed: Option<&[String]>) -> SearchOutcome {
        let mut outcome = SearchOutcome::default();
        if count == 0 {
            return outcome;
        }

        for ranked in &self.providers {
            if outcome.candidates.len() >= count {
                break;
            }
            let name = ranked.name();
            if let Some(allowed) = allowed {
                if !allowed.iter().any(|a| a == name) {
                    continue;
                }
            }

            ranked.limiter.acquire().await;

            let wanted = count - outcome.candidates.len();
            let result = match tokio::time::timeout(self.request_timeout, ranked.provider.search(query, wanted)).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout(self.request_timeout)),
            };

            match result {
                Ok(found) => {
                    tracing::debug!(provider = name, query, results = found.len(), "Provider answered");
                    outcome.answered += 1;
                    outcome.candidates.extend(found);
                }
                Err(e) => {
                    tracing::warn!(provider = name, query, "Provider search failed: {}", e);
                    outcome.failures.push((name.to_string(), e.to_string()));
                }
            }
        }

        outcome.candidates.truncate(count);
        outcome
    }

    /// Search for a vocabulary word, walking the fallback queries if needed
    ///
    /// Errors with `ExhaustedSearch` when every query came back empty, or
    /// `TransientProvider` when no provider answered at all.
    pub async fn search_for_word(
        &self,
        translation: &str,
        category: Option<&str>,
        count: usize,
        allowed: Option<&[String]>,
    ) -> Result<WordSearch, CurationError> {
        let mut queries = vec![build_query(translation, category)];
        for fallback in fallback_queries(translation, category) {
            if !queries.contains(&fallback) {
                queries.push(fallback);
            }
        }

        let mut answered = 0;
        let mut last_failure = None;

        for (attempt, query) in queries.into_iter().enumerate() {
            if attempt > 0 {
                tracing::info!(translation, query = %query, "Trying fallback query");
            }

            let outcome = self.search(&query, count, allowed).await;
            answered += outcome.answered;
            if let Some(failure) = outcome.failures.into_iter().last() {
                last_failure = Some(failure);
            }

            if !outcome.candidates.is_empty() {
                return Ok(WordSearch {
                    query,
                    candidates: outcome.candidates,
                });
            }
        }

        match (answered, last_failure) {
            (0, Some((provider, message))) => Err(CurationError::TransientProvider { provider, message }),
            _ => Err(CurationError::ExhaustedSearch(translation.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct StaticProvider {
        name: &'static str,
        results: usize,
        queries: Mutex<Vec<String>>,
    }

    impl StaticProvider {
        fn new(name: &'static str, results: usize) -> Arc<Self> {
            Arc::new(Self {
                name,
                results,
                queries: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl SearchProvider for StaticProvider {
        fn name(&self) -> &str {
            self.name
        }

        async fn search(&self, query: &str, count: usize) -> Result<Vec<Candidate>, ProviderError> {
            self.queries.lock().unwrap().push(query.to_string());
            Ok((0..self.results.min(count))
                .map(|i| Candidate::new(format!("{}_{}", self.name, i), self.name, format!("https://{}/{}", self.name, i)))
                .collect())
        }
    }

    struct BrokenProvider;

    #[async_trait]
    impl SearchProvider for BrokenProvider {
        fn name(&self) -> &str {
            "broken"
        }

        async fn search(&self, _query: &str, _count: usize) -> Result<Vec<Candidate>, ProviderError> {
            Err(ProviderError::Api(500, "boom".to_string()))
        }
    }

    fn ranked(priority: u32, provider: Arc<dyn SearchProvider>) -> RankedProvider {
        let limiter = SlidingWindowLimiter::new(provider.name(), 100, Duration::from_secs(60));
        RankedProvider::new(priority, provider, limiter)
    }

    #[tokio::test]
    async fn test_priority_order_and_truncation() {
        let a = StaticProvider::new("a", 3);
        let b = StaticProvider::new("b", 3);
        let search = ProviderFailoverSearch::new(vec![ranked(2, b.clone()), ranked(1, a.clone())]);
        assert_eq!(search.provider_names(), vec!["a", "b"]);

        let outcome = search.search("q", 4, None).await;
        let ids: Vec<_> = outcome.candidates.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a_0", "a_1", "a_2", "b_0"]);
    }

    #[tokio::test]
    async fn test_stops_once_count_reached() {
        let a = StaticProvider::new("a", 5);
        let b = StaticProvider::new("b", 5);
        let search = ProviderFailoverSearch::new(vec![ranked(1, a.clone()), ranked(2, b.clone())]);

        let outcome = search.search("q", 3, None).await;
        assert_eq!(outcome.candidates.len(), 3);
        assert!(b.queries.lock().unwrap().is_empty(), "second provider never queried");
    }

    #[tokio::test]
    async fn test_failing_provider_is_skipped() {
        let good = StaticProvider::new("good", 2);
        let search = ProviderFailoverSearch::new(vec![ranked(1, Arc::new(BrokenProvider)), ranked(2, good)]);

        let outcome = search.search("q", 5, None).await;
        assert_eq!(outcome.candidates.len(), 2);
        assert!(outcome.candidates.iter().all(|c| c.provider == "good"));
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].0, "broken");
    }

    #[tokio::test]
    async fn test_allowed_providers_filter() {
        let a = StaticProvider::new("a", 2);
        let b = StaticProvider::new("b", 2);
        let search = ProviderFailoverSearch::new(vec![ranked(1, a.clone()), ranked(2, b.clone())]);

        let allowed = vec!["b".to_string()];
        let outcome = search.search("q", 5, Some(&allowed)).await;
        assert!(outcome.candidates.iter().all(|c| c.provider == "b"));
        assert!(a.queries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fallback_queries_walked_until_exhausted() {
        let empty = StaticProvider::new("empty", 0);
        let search = ProviderFailoverSearch::new(vec![ranked(1, empty.clone())]);

        let err = search
            .search_for_word("twelve", Some("numbers"), 3, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CurationError::ExhaustedSearch(_)));
        assert_eq!(
            *empty.queries.lock().unwrap(),
            vec![
                "twelve number counting quantity clear",
                "twelve",
                "twelve illustration",
                "twelve concept",
                "counting numbers education",
            ]
        );
    }

    #[tokio::test]
    async fn test_all_providers_failing_is_transient() {
        let search = ProviderFailoverSearch::new(vec![ranked(1, Arc::new(BrokenProvider))]);
        let err = search.search_for_word("cat", None, 3, None).await.unwrap_err();
        assert!(matches!(err, CurationError::TransientProvider { ref provider, .. } if provider == "broken"));
    }
}
