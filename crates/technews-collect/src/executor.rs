//! Tiered retrying execution of fetch requests.
//!
//! Tier 1 sources are guaranteed a retry floor of 3, tier 2 of 1, tier 3 of
//! none; a configured `max_retries` can only raise that. Each attempt runs
//! under its own deadline, and an expired deadline is reported as an
//! abort-style timeout so the auto-disable pass can see it.

use std::time::Duration;

use technews_core::EffectiveRate;

use crate::error::SourceError;
use crate::fetcher::{AgentFetcher, FetchOptions};

/// What to ask the agent for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind<'a> {
    Direct { url: &'a str },
    Search { query: &'a str },
}

/// Minimum retries by tier: high-trust sources get the full budget before
/// lower tiers spend anything.
#[must_use]
pub fn tier_retry_floor(tier: u8) -> u32 {
    match tier {
        1 => 3,
        2 => 1,
        _ => 0,
    }
}

pub struct FetchExecutor<'a> {
    fetcher: &'a dyn AgentFetcher,
}

impl<'a> FetchExecutor<'a> {
    #[must_use]
    pub fn new(fetcher: &'a dyn AgentFetcher) -> Self {
        Self { fetcher }
    }

    /// Run one fetch with the tiered retry policy: up to
    /// `max(rate.max_retries, tier floor)` retries, a fixed wait between
    /// attempts, and a per-attempt deadline of `rate.timeout_secs`.
    ///
    /// # Errors
    ///
    /// Returns the final [`SourceError`] once the retry budget is exhausted,
    /// carrying the number of retries actually used.
    pub async fn execute(
        &self,
        source_id: &str,
        tier: u8,
        kind: FetchKind<'_>,
        prompt: &str,
        opts: &FetchOptions,
        rate: EffectiveRate,
    ) -> Result<String, SourceError> {
        let max_retries = rate.max_retries.max(tier_retry_floor(tier));
        let mut attempt = 0u32;

        loop {
            match self.attempt_once(kind, prompt, opts, rate.timeout_secs).await {
                Ok(content) => return Ok(content),
                Err(message) => {
                    if attempt >= max_retries {
                        let error = SourceError::new(source_id, attempt, message);
                        tracing::error!(
                            source = source_id,
                            tier,
                            kind = %error.kind,
                            retries = attempt,
                            "fetch failed, budget exhausted"
                        );
                        return Err(error);
                    }
                    attempt += 1;
                    tracing::warn!(
                        source = source_id,
                        tier,
                        attempt,
                        max_retries,
                        error = %message,
                        "fetch attempt failed — retrying after interval"
                    );
                    tokio::time::sleep(Duration::from_secs(rate.retry_interval_secs)).await;
                }
            }
        }
    }

    /// A single attempt under its own deadline, with no retry. Also used by
    /// the strict-JSON repair path, which is allowed exactly one extra fetch.
    pub(crate) async fn attempt_once(
        &self,
        kind: FetchKind<'_>,
        prompt: &str,
        opts: &FetchOptions,
        timeout_secs: u64,
    ) -> Result<String, String> {
        let deadline = Duration::from_secs(timeout_secs);
        let call = async {
            match kind {
                FetchKind::Direct { url } => self.fetcher.execute_direct(url, prompt, opts).await,
                FetchKind::Search { query } => {
                    self.fetcher.execute_search(query, prompt, opts).await
                }
            }
        };

        match tokio::time::timeout(deadline, call).await {
            Ok(Ok(content)) => Ok(content),
            Ok(Err(e)) => Err(format!("{e:#}")),
            Err(_) => Err(format!(
                "timeout after {timeout_secs}s: operation aborted"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use anyhow::Result;

    use super::*;
    use crate::error::ErrorKind;

    /// Fetcher that fails a scripted number of times before succeeding.
    struct FlakyFetcher {
        calls: Arc<AtomicU32>,
        failures: u32,
        error: String,
        delay_ms: u64,
    }

    #[async_trait::async_trait]
    impl AgentFetcher for FlakyFetcher {
        async fn execute_direct(
            &self,
            _url: &str,
            _prompt: &str,
            _opts: &FetchOptions,
        ) -> Result<String> {
            if self.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            }
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                anyhow::bail!("{}", self.error.clone())
            }
            Ok("{\"articles\": []}".to_string())
        }

        async fn execute_search(
            &self,
            query: &str,
            prompt: &str,
            opts: &FetchOptions,
        ) -> Result<String> {
            self.execute_direct(query, prompt, opts).await
        }
    }

    fn rate(max_retries: u32) -> EffectiveRate {
        EffectiveRate {
            timeout_secs: 5,
            retry_interval_secs: 0,
            max_retries,
        }
    }

    #[test]
    fn tier_floors_are_3_1_0() {
        assert_eq!(tier_retry_floor(1), 3);
        assert_eq!(tier_retry_floor(2), 1);
        assert_eq!(tier_retry_floor(3), 0);
    }

    #[tokio::test]
    async fn succeeds_without_retry() {
        let calls = Arc::new(AtomicU32::new(0));
        let fetcher = FlakyFetcher {
            calls: Arc::clone(&calls),
            failures: 0,
            error: String::new(),
            delay_ms: 0,
        };
        let executor = FetchExecutor::new(&fetcher);
        let result = executor
            .execute(
                "hn",
                3,
                FetchKind::Direct { url: "https://example.com" },
                "p",
                &FetchOptions::default(),
                rate(0),
            )
            .await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn tier_floor_raises_configured_retries() {
        // Configured 0 retries, but tier 1 floors at 3: 2 failures then ok.
        let calls = Arc::new(AtomicU32::new(0));
        let fetcher = FlakyFetcher {
            calls: Arc::clone(&calls),
            failures: 2,
            error: "network down".to_string(),
            delay_ms: 0,
        };
        let executor = FetchExecutor::new(&fetcher);
        let result = executor
            .execute(
                "hn",
                1,
                FetchKind::Direct { url: "https://example.com" },
                "p",
                &FetchOptions::default(),
                rate(0),
            )
            .await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn tier3_does_not_retry() {
        let calls = Arc::new(AtomicU32::new(0));
        let fetcher = FlakyFetcher {
            calls: Arc::clone(&calls),
            failures: 10,
            error: "network down".to_string(),
            delay_ms: 0,
        };
        let executor = FetchExecutor::new(&fetcher);
        let error = executor
            .execute(
                "besteffort",
                3,
                FetchKind::Direct { url: "https://example.com" },
                "p",
                &FetchOptions::default(),
                rate(0),
            )
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(error.retry_count, 0);
        assert_eq!(error.kind, ErrorKind::Network);
    }

    #[tokio::test]
    async fn exhausted_budget_reports_retry_count() {
        let calls = Arc::new(AtomicU32::new(0));
        let fetcher = FlakyFetcher {
            calls: Arc::clone(&calls),
            failures: 10,
            error: "process aborted by user".to_string(),
            delay_ms: 0,
        };
        let executor = FetchExecutor::new(&fetcher);
        let error = executor
            .execute(
                "flaky",
                1,
                FetchKind::Direct { url: "https://example.com" },
                "p",
                &FetchOptions::default(),
                rate(0),
            )
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 4, "1 try + 3 tier-1 retries");
        assert_eq!(error.retry_count, 3);
        assert!(error.is_abort_heavy());
        assert_eq!(error.kind, ErrorKind::Timeout);
    }

    #[tokio::test]
    async fn attempt_deadline_becomes_abort_style_timeout() {
        let calls = Arc::new(AtomicU32::new(0));
        let fetcher = FlakyFetcher {
            calls: Arc::clone(&calls),
            failures: 0,
            error: String::new(),
            delay_ms: 5_000,
        };
        let executor = FetchExecutor::new(&fetcher);
        let slow = EffectiveRate {
            timeout_secs: 0,
            retry_interval_secs: 0,
            max_retries: 0,
        };
        let error = executor
            .execute(
                "slow",
                3,
                FetchKind::Direct { url: "https://example.com" },
                "p",
                &FetchOptions::default(),
                slow,
            )
            .await
            .unwrap_err();
        assert_eq!(error.kind, ErrorKind::Timeout);
        assert!(error.message.contains("operation aborted"));
    }
}
