//! Research pipeline — ordered strategy chain with progressive fallback
//!
//! Runs strategies in sequence until one yields an acceptable result. Every
//! strategy gets a hard deadline so a hung provider call cannot stall the
//! chain; an exhausted chain degrades to a valid "not enough information"
//! result instead of an error.

use crate::api::chat::ChatClient;
use crate::normalize::FALLBACK_OVERVIEW;
use crate::strategies::{ResearchStrategy, StrategyError};
use crate::types::{ResearchRequest, ResearchResult};
use chrono::Utc;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

const STRATEGY_TIMEOUT_SECS: u64 = 45;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResearchStatus {
    Idle,
    Running,
    Succeeded,
    Exhausted,
    Cancelled,
}

/// One tried-and-failed strategy, kept for diagnostics only
#[derive(Debug, Clone, Serialize)]
pub struct StrategyAttempt {
    pub strategy: String,
    pub error: String,
}

/// Shared progress/state for a research run (same pattern as the server's
/// other polled long-running jobs)
pub struct ResearchProgress {
    pub status: RwLock<ResearchStatus>,
    pub cancelled: AtomicBool,
    percent: AtomicU32,
    pub label: RwLock<String>,
    pub current_strategy: RwLock<Option<String>>,
    pub attempts: RwLock<Vec<StrategyAttempt>>,
    pub result: RwLock<Option<ResearchResult>>,
    pub subject: RwLock<Option<String>>,
    pub started_at: RwLock<Option<String>>,
}

impl ResearchProgress {
    pub fn new() -> Self {
        Self {
            status: RwLock::new(ResearchStatus::Idle),
            cancelled: AtomicBool::new(false),
            percent: AtomicU32::new(0),
            label: RwLock::new(String::new()),
            current_strategy: RwLock::new(None),
            attempts: RwLock::new(Vec::new()),
            result: RwLock::new(None),
            subject: RwLock::new(None),
            started_at: RwLock::new(None),
        }
    }

    pub fn reset(&self, subject: &str) {
        *self.status.write().unwrap() = ResearchStatus::Running;
        self.clear(subject);
    }

    /// Claim the progress slot for a new run. Returns false if a run is
    /// already in flight; the check and the status flip happen under one
    /// lock so two concurrent callers cannot both win.
    pub fn try_start(&self, subject: &str) -> bool {
        {
            let mut status = self.status.write().unwrap();
            if *status == ResearchStatus::Running {
                return false;
            }
            *status = ResearchStatus::Running;
        }
        self.clear(subject);
        true
    }

    fn clear(&self, subject: &str) {
        self.cancelled.store(false, Ordering::Relaxed);
        self.percent.store(0, Ordering::Relaxed);
        *self.label.write().unwrap() = String::new();
        *self.current_strategy.write().unwrap() = None;
        *self.attempts.write().unwrap() = Vec::new();
        *self.result.write().unwrap() = None;
        *self.subject.write().unwrap() = Some(subject.to_string());
        *self.started_at.write().unwrap() = Some(Utc::now().to_rfc3339());
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.status.read().unwrap(), ResearchStatus::Running)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn percent(&self) -> u32 {
        self.percent.load(Ordering::Relaxed)
    }

    /// Advisory progress. Never regresses: a multi-call strategy resetting
    /// between sub-phases must not walk the displayed value backwards.
    pub fn report(&self, percent: u32, label: &str) {
        self.percent.fetch_max(percent.min(100), Ordering::Relaxed);
        *self.label.write().unwrap() = label.to_string();
    }

    fn push_attempt(&self, strategy: &str, error: String) {
        self.attempts.write().unwrap().push(StrategyAttempt {
            strategy: strategy.to_string(),
            error,
        });
    }
}

impl Default for ResearchProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// The degraded result an exhausted chain returns instead of an error
pub fn fallback_result() -> ResearchResult {
    ResearchResult {
        overview: FALLBACK_OVERVIEW.to_string(),
        ..Default::default()
    }
}

/// Run the strategy chain to completion.
///
/// First success wins and later strategies never start. A failed strategy
/// (error or deadline) is logged as an attempt and the chain advances. All
/// strategies failing yields `fallback_result()`, not an error — research
/// must never crash its caller.
pub async fn run_research(
    request: ResearchRequest,
    client: ChatClient,
    strategies: Vec<Box<dyn ResearchStrategy>>,
    progress: Arc<ResearchProgress>,
) -> ResearchResult {
    info!(subject = %request.subject_name, "Research pipeline starting");
    progress.report(5, "Starting research");

    for strategy in &strategies {
        if progress.is_cancelled() {
            break;
        }

        *progress.current_strategy.write().unwrap() = Some(strategy.name().to_string());
        info!(strategy = strategy.name(), "Trying research strategy");

        let deadline = std::time::Duration::from_secs(STRATEGY_TIMEOUT_SECS);
        let outcome = tokio::select! {
            outcome = tokio::time::timeout(deadline, strategy.run(&client, &request, &progress)) => outcome,
            _ = cancelled_signal(&progress) => {
                info!(strategy = strategy.name(), "Research cancelled, dropping in-flight call");
                break;
            }
        };

        match outcome {
            Ok(Ok(result)) => {
                // A result that lands after cancel is discarded, not committed
                if progress.is_cancelled() {
                    break;
                }
                info!(strategy = strategy.name(), "Research strategy succeeded");
                progress.report(100, "Research complete");
                *progress.result.write().unwrap() = Some(result.clone());
                *progress.status.write().unwrap() = ResearchStatus::Succeeded;
                return result;
            }
            Ok(Err(StrategyError::Cancelled)) => break,
            Ok(Err(e)) => {
                warn!(strategy = strategy.name(), error = %e, "Research strategy failed");
                progress.push_attempt(strategy.name(), e.to_string());
            }
            Err(_) => {
                warn!(
                    strategy = strategy.name(),
                    timeout_secs = STRATEGY_TIMEOUT_SECS,
                    "Research strategy timed out"
                );
                progress.push_attempt(
                    strategy.name(),
                    format!("timed out after {STRATEGY_TIMEOUT_SECS}s"),
                );
            }
        }
    }

    if progress.is_cancelled() {
        info!("Research pipeline cancelled");
        *progress.status.write().unwrap() = ResearchStatus::Cancelled;
        return fallback_result();
    }

    warn!(
        attempts = progress.attempts.read().unwrap().len(),
        "All research strategies exhausted, returning degraded result"
    );
    let result = fallback_result();
    progress.report(100, "Research complete");
    *progress.result.write().unwrap() = Some(result.clone());
    *progress.status.write().unwrap() = ResearchStatus::Exhausted;
    result
}

/// Resolves once cancellation is requested, so a `select!` against a
/// strategy future tears the in-flight provider call down promptly
/// instead of waiting out the full deadline.
async fn cancelled_signal(progress: &ResearchProgress) {
    while !progress.is_cancelled() {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::chat::{ChatTransport, ProviderConfig};
    use crate::normalize::FALLBACK_OVERVIEW;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::AtomicUsize;

    /// Transport that must never be reached
    struct UnreachableTransport;

    #[async_trait]
    impl ChatTransport for UnreachableTransport {
        async fn send(
            &self,
            _config: &ProviderConfig,
            _messages: &[crate::api::chat::ChatMessage],
            _temperature: f64,
        ) -> anyhow::Result<Value> {
            panic!("transport should not be called by stub strategies");
        }
    }

    fn stub_client() -> ChatClient {
        ChatClient::with_transport(
            ProviderConfig {
                base_url: "http://fake".into(),
                api_key: "test".into(),
                model: "test-model".into(),
            },
            Arc::new(UnreachableTransport),
        )
    }

    fn request() -> ResearchRequest {
        ResearchRequest {
            subject_name: "Uniswap".into(),
            ..Default::default()
        }
    }

    struct Failing {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ResearchStrategy for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn run(
            &self,
            _client: &ChatClient,
            _request: &ResearchRequest,
            _progress: &ResearchProgress,
        ) -> Result<ResearchResult, StrategyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(StrategyError::Provider("boom".into()))
        }
    }

    struct Succeeding {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ResearchStrategy for Succeeding {
        fn name(&self) -> &'static str {
            "succeeding"
        }

        async fn run(
            &self,
            _client: &ChatClient,
            _request: &ResearchRequest,
            _progress: &ResearchProgress,
        ) -> Result<ResearchResult, StrategyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ResearchResult {
                overview: "found it".into(),
                ..Default::default()
            })
        }
    }

    #[tokio::test]
    async fn test_first_success_stops_the_chain() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let progress = Arc::new(ResearchProgress::new());
        progress.reset("Uniswap");

        let result = run_research(
            request(),
            stub_client(),
            vec![
                Box::new(Succeeding {
                    calls: first.clone(),
                }),
                Box::new(Succeeding {
                    calls: second.clone(),
                }),
            ],
            progress.clone(),
        )
        .await;

        assert_eq!(result.overview, "found it");
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 0);
        assert_eq!(*progress.status.read().unwrap(), ResearchStatus::Succeeded);
        assert_eq!(progress.percent(), 100);
    }

    #[tokio::test]
    async fn test_failure_advances_to_next_strategy() {
        let failing = Arc::new(AtomicUsize::new(0));
        let succeeding = Arc::new(AtomicUsize::new(0));
        let progress = Arc::new(ResearchProgress::new());
        progress.reset("Uniswap");

        let result = run_research(
            request(),
            stub_client(),
            vec![
                Box::new(Failing {
                    calls: failing.clone(),
                }),
                Box::new(Succeeding {
                    calls: succeeding.clone(),
                }),
            ],
            progress.clone(),
        )
        .await;

        assert_eq!(result.overview, "found it");
        assert_eq!(failing.load(Ordering::SeqCst), 1);
        assert_eq!(succeeding.load(Ordering::SeqCst), 1);

        let attempts = progress.attempts.read().unwrap();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].strategy, "failing");
    }

    #[tokio::test]
    async fn test_exhausted_chain_degrades_without_error() {
        let progress = Arc::new(ResearchProgress::new());
        progress.reset("Uniswap");

        let result = run_research(
            request(),
            stub_client(),
            vec![
                Box::new(Failing {
                    calls: Arc::new(AtomicUsize::new(0)),
                }),
                Box::new(Failing {
                    calls: Arc::new(AtomicUsize::new(0)),
                }),
                Box::new(Failing {
                    calls: Arc::new(AtomicUsize::new(0)),
                }),
            ],
            progress.clone(),
        )
        .await;

        assert_eq!(result.overview, FALLBACK_OVERVIEW);
        assert!(result.features.is_empty());
        assert_eq!(*progress.status.read().unwrap(), ResearchStatus::Exhausted);
        assert_eq!(progress.attempts.read().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_cancellation_skips_remaining_strategies() {
        struct CancelsItself;

        #[async_trait]
        impl ResearchStrategy for CancelsItself {
            fn name(&self) -> &'static str {
                "cancels"
            }

            async fn run(
                &self,
                _client: &ChatClient,
                _request: &ResearchRequest,
                progress: &ResearchProgress,
            ) -> Result<ResearchResult, StrategyError> {
                // Simulates the UI tearing the request down mid-strategy
                progress.cancel();
                Err(StrategyError::Cancelled)
            }
        }

        let never_runs = Arc::new(AtomicUsize::new(0));
        let progress = Arc::new(ResearchProgress::new());
        progress.reset("Uniswap");

        run_research(
            request(),
            stub_client(),
            vec![
                Box::new(CancelsItself),
                Box::new(Succeeding {
                    calls: never_runs.clone(),
                }),
            ],
            progress.clone(),
        )
        .await;

        assert_eq!(never_runs.load(Ordering::SeqCst), 0);
        assert_eq!(*progress.status.read().unwrap(), ResearchStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_progress_never_regresses() {
        let progress = ResearchProgress::new();
        progress.reset("Uniswap");
        progress.report(40, "phase one");
        progress.report(20, "phase two resets low");
        assert_eq!(progress.percent(), 40);
        progress.report(60, "phase three");
        assert_eq!(progress.percent(), 60);
    }

    #[tokio::test]
    async fn test_success_arriving_after_cancel_is_discarded() {
        struct CancelsThenSucceeds;

        #[async_trait]
        impl ResearchStrategy for CancelsThenSucceeds {
            fn name(&self) -> &'static str {
                "late"
            }

            async fn run(
                &self,
                _client: &ChatClient,
                _request: &ResearchRequest,
                progress: &ResearchProgress,
            ) -> Result<ResearchResult, StrategyError> {
                // Cancel lands while the provider call is still in flight,
                // then the call resolves anyway
                progress.cancel();
                Ok(ResearchResult {
                    overview: "late success".into(),
                    ..Default::default()
                })
            }
        }

        let progress = Arc::new(ResearchProgress::new());
        progress.reset("Uniswap");

        let result = run_research(
            request(),
            stub_client(),
            vec![Box::new(CancelsThenSucceeds)],
            progress.clone(),
        )
        .await;

        assert_eq!(*progress.status.read().unwrap(), ResearchStatus::Cancelled);
        assert!(progress.result.read().unwrap().is_none());
        assert_eq!(result.overview, FALLBACK_OVERVIEW);
    }

    #[tokio::test]
    async fn test_cancel_tears_down_a_hung_strategy() {
        struct Hangs;

        #[async_trait]
        impl ResearchStrategy for Hangs {
            fn name(&self) -> &'static str {
                "hangs"
            }

            async fn run(
                &self,
                _client: &ChatClient,
                _request: &ResearchRequest,
                _progress: &ResearchProgress,
            ) -> Result<ResearchResult, StrategyError> {
                std::future::pending().await
            }
        }

        tokio::time::pause();

        let never_runs = Arc::new(AtomicUsize::new(0));
        let progress = Arc::new(ResearchProgress::new());
        progress.reset("Uniswap");

        let handle = tokio::spawn(run_research(
            request(),
            stub_client(),
            vec![
                Box::new(Hangs),
                Box::new(Succeeding {
                    calls: never_runs.clone(),
                }),
            ],
            progress.clone(),
        ));

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        progress.cancel();

        // Must finish well before the per-strategy deadline would fire
        let result = tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result.overview, FALLBACK_OVERVIEW);
        assert_eq!(*progress.status.read().unwrap(), ResearchStatus::Cancelled);
        assert_eq!(never_runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_try_start_refuses_while_running() {
        let progress = ResearchProgress::new();
        assert!(!progress.is_running());
        assert!(progress.try_start("Uniswap"));
        assert!(progress.is_running());
        assert!(!progress.try_start("Aave"));
        // The losing call must not clobber the in-flight run's subject
        assert_eq!(
            progress.subject.read().unwrap().as_deref(),
            Some("Uniswap")
        );

        *progress.status.write().unwrap() = ResearchStatus::Succeeded;
        assert!(progress.try_start("Aave"));
        assert_eq!(progress.subject.read().unwrap().as_deref(), Some("Aave"));
    }

    #[tokio::test]
    async fn test_hung_strategy_times_out_and_chain_advances() {
        struct Hangs;

        #[async_trait]
        impl ResearchStrategy for Hangs {
            fn name(&self) -> &'static str {
                "hangs"
            }

            async fn run(
                &self,
                _client: &ChatClient,
                _request: &ResearchRequest,
                _progress: &ResearchProgress,
            ) -> Result<ResearchResult, StrategyError> {
                std::future::pending().await
            }
        }

        tokio::time::pause();

        let succeeding = Arc::new(AtomicUsize::new(0));
        let progress = Arc::new(ResearchProgress::new());
        progress.reset("Uniswap");

        let chain = run_research(
            request(),
            stub_client(),
            vec![
                Box::new(Hangs),
                Box::new(Succeeding {
                    calls: succeeding.clone(),
                }),
            ],
            progress.clone(),
        );

        let result = chain.await;
        assert_eq!(result.overview, "found it");
        assert_eq!(succeeding.load(Ordering::SeqCst), 1);

        let attempts = progress.attempts.read().unwrap();
        assert_eq!(attempts[0].strategy, "hangs");
        assert!(attempts[0].error.contains("timed out"));
    }
}
