//! The agent-fetch boundary.
//!
//! The pipeline never speaks to the web directly; it asks an LLM-backed
//! fetch agent to read a page or run a search and return text that usually
//! contains fenced JSON. [`AgentFetcher`] is the seam; [`HttpAgentFetcher`]
//! is the bundled implementation that talks to an agent gateway over HTTP.

use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;
use serde_json::json;

/// Per-request options passed through to the agent.
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchOptions {
    /// Restrict search results to the last N days, when the agent supports it.
    pub within_days: Option<u32>,
}

#[async_trait::async_trait]
pub trait AgentFetcher: Send + Sync {
    /// Fetch a fixed page and return the agent's raw response text.
    async fn execute_direct(&self, url: &str, prompt: &str, opts: &FetchOptions)
        -> Result<String>;

    /// Run a web/social search and return the agent's raw response text.
    async fn execute_search(
        &self,
        query: &str,
        prompt: &str,
        opts: &FetchOptions,
    ) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct AgentResponse {
    content: String,
}

/// HTTP implementation of the fetch boundary: POSTs the request to a
/// configured agent gateway endpoint.
pub struct HttpAgentFetcher {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpAgentFetcher {
    /// Build a client with the given request timeout.
    ///
    /// The timeout here is a transport-level backstop; per-attempt deadlines
    /// are enforced by the fetch executor on top of it.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying `reqwest::Client` cannot be built.
    pub fn new(endpoint: &str, request_timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(request_timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }

    async fn post(&self, mode: &str, target: &str, prompt: &str, opts: &FetchOptions) -> Result<String> {
        let body = json!({
            "mode": mode,
            "target": target,
            "prompt": prompt,
            "within_days": opts.within_days,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("agent gateway returned HTTP {status}");
        }

        let text = response.text().await?;
        // The gateway wraps its output in {"content": ...}; tolerate agents
        // that reply with bare text.
        match serde_json::from_str::<AgentResponse>(&text) {
            Ok(wrapped) => Ok(wrapped.content),
            Err(_) => Ok(text),
        }
    }
}

#[async_trait::async_trait]
impl AgentFetcher for HttpAgentFetcher {
    async fn execute_direct(
        &self,
        url: &str,
        prompt: &str,
        opts: &FetchOptions,
    ) -> Result<String> {
        self.post("direct", url, prompt, opts).await
    }

    async fn execute_search(
        &self,
        query: &str,
        prompt: &str,
        opts: &FetchOptions,
    ) -> Result<String> {
        self.post("search", query, prompt, opts).await
    }
}
