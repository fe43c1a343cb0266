use crate::config::HarvestConfig;
use crate::rate::{RateController, RateState};
use crate::transport::Transport;
use crate::types::FetchOutcome;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// The `Fetcher` issues rate-controlled requests against one logical target.
///
/// Every call waits for the controller's delay, performs exactly one attempt,
/// classifies the response and feeds the outcome back into the controller.
pub struct Fetcher {
    /// Name of the target, e.g. a host name or `discovery:pubmed`.
    target: String,
    transport: Arc<dyn Transport>,
    controller: RateController,
    user_agents: Arc<[String]>,
    throttle_statuses: Arc<[u16]>,
    next_agent: AtomicUsize,
    attempts: AtomicUsize,
}

impl Fetcher {
    pub fn new(
        target: impl Into<String>,
        transport: Arc<dyn Transport>,
        controller: RateController,
        user_agents: Arc<[String]>,
        throttle_statuses: Arc<[u16]>,
    ) -> Self {
        Self {
            target: target.into(),
            transport,
            controller,
            user_agents,
            throttle_statuses,
            next_agent: AtomicUsize::new(0),
            attempts: AtomicUsize::new(0),
        }
    }

    /// Builds a fetcher for `target` using the limits and pools of `config`.
    pub fn from_config(
        target: impl Into<String>,
        transport: Arc<dyn Transport>,
        config: &HarvestConfig,
    ) -> Self {
        Self::new(
            target,
            transport,
            RateController::new(&config.rate_limit),
            config.user_agents.clone().into(),
            config.throttle_statuses.clone().into(),
        )
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn is_exhausted(&self) -> bool {
        self.controller.is_exhausted()
    }

    pub fn rate_state(&self) -> RateState {
        self.controller.state()
    }

    /// Number of requests issued so far.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Fetches `url` once.
    ///
    /// # Returns
    ///
    /// `Success` with the body for 2xx, `Throttled` for a configured rate-limit status,
    /// and `Failed` for any other status or transport error.
    pub async fn fetch(&self, url: &str) -> FetchOutcome {
        self.controller.wait().await;
        self.attempts.fetch_add(1, Ordering::Relaxed);

        let headers = self.headers();
        debug!(site = %self.target, url, "Fetching");

        let outcome = match self.transport.get(url, &headers).await {
            Ok(response) if self.throttle_statuses.contains(&response.status) => {
                warn!(site = %self.target, url, status = response.status, "Throttled");
                FetchOutcome::Throttled
            }
            Ok(response) if (200..300).contains(&response.status) => {
                FetchOutcome::Success(response.body)
            }
            Ok(response) => FetchOutcome::Failed(format!("unexpected status {}", response.status)),
            Err(e) => FetchOutcome::Failed(e.to_string()),
        };

        self.controller.observe(&outcome);
        outcome
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
        if let Some(agent) = self.next_user_agent() {
            if let Ok(value) = HeaderValue::from_str(agent) {
                headers.insert(USER_AGENT, value);
            }
        }
        headers
    }

    /// Round-robin over the configured pool.
    fn next_user_agent(&self) -> Option<&str> {
        if self.user_agents.is_empty() {
            return None;
        }
        let index = self.next_agent.fetch_add(1, Ordering::Relaxed) % self.user_agents.len();
        Some(&self.user_agents[index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimit;
    use crate::transport::HttpResponse;
    use crate::{HarvestError, Result};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replays canned responses and records the user agent of every request.
    struct Replay {
        responses: Mutex<Vec<Result<HttpResponse>>>,
        agents: Mutex<Vec<String>>,
    }

    impl Replay {
        fn new(mut responses: Vec<Result<HttpResponse>>) -> Arc<Self> {
            responses.reverse();
            Arc::new(Self {
                responses: Mutex::new(responses),
                agents: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Transport for Replay {
        async fn get(&self, _url: &str, headers: &HeaderMap) -> Result<HttpResponse> {
            let agent = headers
                .get(USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            self.agents.lock().unwrap().push(agent);
            self.responses
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(HarvestError::Transport("no response queued".into())))
        }
    }

    fn fetcher(transport: Arc<Replay>) -> Fetcher {
        let limits = RateLimit {
            floor_ms: 1,
            ceiling_ms: 50,
            initial_ms: 1,
            failure_threshold: 3,
            failure_budget: 3,
            failure_factor: 1.0,
        };
        Fetcher::new(
            "example.edu",
            transport,
            RateController::new(&limits),
            vec!["agent-a".to_string(), "agent-b".to_string()].into(),
            vec![429u16].into(),
        )
    }

    #[tokio::test]
    async fn test_classifies_responses() {
        let transport = Replay::new(vec![
            Ok(HttpResponse::new(200, "hello")),
            Ok(HttpResponse::new(429, "")),
            Ok(HttpResponse::new(404, "")),
            Err(HarvestError::Transport("timed out".into())),
        ]);
        let fetcher = fetcher(transport);

        assert_eq!(fetcher.fetch("https://example.edu/a").await, FetchOutcome::Success("hello".into()));
        assert_eq!(fetcher.fetch("https://example.edu/b").await, FetchOutcome::Throttled);
        assert!(matches!(fetcher.fetch("https://example.edu/c").await, FetchOutcome::Failed(_)));
        assert!(matches!(fetcher.fetch("https://example.edu/d").await, FetchOutcome::Failed(_)));
        assert_eq!(fetcher.attempts(), 4);
    }

    #[tokio::test]
    async fn test_outcome_is_fed_to_controller() {
        let transport = Replay::new(vec![
            Ok(HttpResponse::new(429, "")),
            Ok(HttpResponse::new(429, "")),
        ]);
        let fetcher = fetcher(transport);

        fetcher.fetch("https://example.edu/a").await;
        fetcher.fetch("https://example.edu/a").await;

        let state = fetcher.rate_state();
        assert_eq!(state.delay, Duration::from_millis(4));
        assert_eq!(state.consecutive_failures, 2);
    }

    #[tokio::test]
    async fn test_rotates_user_agents() {
        let transport = Replay::new(vec![
            Ok(HttpResponse::new(200, "")),
            Ok(HttpResponse::new(200, "")),
            Ok(HttpResponse::new(200, "")),
        ]);
        let fetcher = fetcher(transport.clone());

        for _ in 0..3 {
            fetcher.fetch("https://example.edu/").await;
        }

        let agents = transport.agents.lock().unwrap().clone();
        assert_eq!(agents, vec!["agent-a", "agent-b", "agent-a"]);
    }
}
