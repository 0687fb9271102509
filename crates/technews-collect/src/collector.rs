//! Per-tier collection orchestration.
//!
//! Tiers run serially (tier 1 drains its retry budget before tier 2 starts);
//! within a tier, tasks run concurrently under the configured bound with
//! all-settled semantics — one source failing never cancels its siblings.
//! Results are reassembled in task order so output is deterministic.

use std::collections::BTreeMap;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use technews_core::sources::CollectMethod;
use technews_core::{EffectiveRate, RawArticle, SourceConfig, SourcesFile};

use crate::error::{ErrorKind, SourceError};
use crate::executor::{FetchExecutor, FetchKind};
use crate::extract;
use crate::fetcher::{AgentFetcher, FetchOptions};
use crate::prompts;
use crate::querygen::{allocate_for_source, WeightedQuery};

/// How a task reaches its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskMethod {
    Direct { url: String },
    Search { query: String },
}

/// A fully-resolved unit of fetch work for one source.
#[derive(Debug, Clone)]
pub struct FetchTask {
    pub source_id: String,
    pub source_name: String,
    pub tier: u8,
    pub method: TaskMethod,
    pub prompt: String,
    pub max_articles: usize,
    pub repair_json: bool,
    pub rate: EffectiveRate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceStatus {
    Success,
    Partial,
    Failed,
}

impl std::fmt::Display for SourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceStatus::Success => write!(f, "success"),
            SourceStatus::Partial => write!(f, "partial"),
            SourceStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Per-source outcome of one collection run.
#[derive(Debug, Clone)]
pub struct SourceReport {
    pub source_id: String,
    pub tier: u8,
    pub status: SourceStatus,
    pub article_count: usize,
    pub error: Option<SourceError>,
    /// Whitespace-collapsed prefix of unparseable content, for diagnostics.
    pub raw_preview: Option<String>,
}

/// Aggregate outcome counts for one tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TierCounts {
    pub success: usize,
    pub partial: usize,
    pub failed: usize,
}

#[derive(Debug)]
pub struct CollectionResult {
    /// Articles in tier order, task order within a tier.
    pub articles: Vec<RawArticle>,
    pub reports: Vec<SourceReport>,
    pub tier_counts: BTreeMap<u8, TierCounts>,
}

impl CollectionResult {
    /// Source ids whose errors mark them abort-heavy, in report order.
    #[must_use]
    pub fn abort_heavy_sources(&self) -> Vec<String> {
        self.reports
            .iter()
            .filter(|report| {
                report
                    .error
                    .as_ref()
                    .is_some_and(SourceError::is_abort_heavy)
            })
            .map(|report| report.source_id.clone())
            .collect()
    }
}

pub struct Collector<'a> {
    fetcher: &'a dyn AgentFetcher,
    sources: &'a SourcesFile,
    /// Ranked query pool; each source draws its allocation from this.
    queries: &'a [WeightedQuery],
    max_per_source: usize,
    fetch_options: FetchOptions,
}

impl<'a> Collector<'a> {
    #[must_use]
    pub fn new(
        fetcher: &'a dyn AgentFetcher,
        sources: &'a SourcesFile,
        queries: &'a [WeightedQuery],
        max_per_source: usize,
        fetch_options: FetchOptions,
    ) -> Self {
        Self {
            fetcher,
            sources,
            queries,
            max_per_source,
            fetch_options,
        }
    }

    /// Build the fetch tasks for every enabled source without contacting the
    /// fetcher. This is the whole of a dry run.
    #[must_use]
    pub fn build_tasks(&self) -> Vec<FetchTask> {
        self.sources
            .enabled()
            .into_iter()
            .map(|source| self.build_task(source))
            .collect()
    }

    fn build_task(&self, source: &SourceConfig) -> FetchTask {
        let allocated = allocate_for_source(self.queries, self.max_per_source);
        let keywords: Vec<&str> = allocated.iter().map(|q| q.text.as_str()).collect();

        let (method, prompt) = match &source.method {
            CollectMethod::DirectFetch { url } => (
                TaskMethod::Direct { url: url.clone() },
                prompts::direct_fetch(&source.name, url, source.max_articles),
            ),
            CollectMethod::Search { query, accounts } if !accounts.is_empty() => {
                let from = accounts
                    .iter()
                    .map(|account| format!("from:{account}"))
                    .collect::<Vec<_>>()
                    .join(" OR ");
                let query = if keywords.is_empty() {
                    format!("({from})")
                } else {
                    format!("({from}) ({})", keywords.join(" OR "))
                };
                let prompt = prompts::twitter_search(&query, source.max_articles);
                (TaskMethod::Search { query }, prompt)
            }
            CollectMethod::Search { query, .. } => {
                let base = query.as_deref().unwrap_or_default();
                let query = if keywords.is_empty() {
                    base.to_string()
                } else {
                    format!("{base} {}", keywords.join(" ")).trim().to_string()
                };
                let prompt = prompts::search(&query, source.max_articles);
                (TaskMethod::Search { query }, prompt)
            }
        };

        FetchTask {
            source_id: source.id.clone(),
            source_name: source.name.clone(),
            tier: source.tier,
            method,
            prompt,
            max_articles: source.max_articles,
            repair_json: source.repair_json,
            rate: self.sources.rate_control.for_source(&source.id),
        }
    }

    /// Run collection: tier by tier, bounded concurrency within a tier,
    /// all-settled.
    pub async fn run(&self) -> CollectionResult {
        let mut by_tier: BTreeMap<u8, Vec<FetchTask>> = BTreeMap::new();
        for task in self.build_tasks() {
            by_tier.entry(task.tier).or_default().push(task);
        }

        let bound = self.sources.rate_control.max_concurrency.max(1);
        let mut articles = Vec::new();
        let mut reports = Vec::new();
        let mut tier_counts: BTreeMap<u8, TierCounts> = BTreeMap::new();

        for (tier, tasks) in by_tier {
            tracing::info!(tier, tasks = tasks.len(), "collecting tier");

            let mut settled: Vec<(usize, (Vec<RawArticle>, SourceReport))> =
                stream::iter(tasks.into_iter().enumerate())
                    .map(|(index, task)| async move { (index, self.run_task(task).await) })
                    .buffer_unordered(bound)
                    .collect()
                    .await;
            settled.sort_by_key(|(index, _)| *index);

            let counts = tier_counts.entry(tier).or_default();
            for (_, (mut task_articles, report)) in settled {
                match report.status {
                    SourceStatus::Success => counts.success += 1,
                    SourceStatus::Partial => counts.partial += 1,
                    SourceStatus::Failed => counts.failed += 1,
                }
                articles.append(&mut task_articles);
                reports.push(report);
            }
        }

        CollectionResult {
            articles,
            reports,
            tier_counts,
        }
    }

    async fn run_task(&self, task: FetchTask) -> (Vec<RawArticle>, SourceReport) {
        let executor = FetchExecutor::new(self.fetcher);
        let kind = match &task.method {
            TaskMethod::Direct { url } => FetchKind::Direct { url: url.as_str() },
            TaskMethod::Search { query } => FetchKind::Search {
                query: query.as_str(),
            },
        };

        let content = match executor
            .execute(
                &task.source_id,
                task.tier,
                kind,
                &task.prompt,
                &self.fetch_options,
                task.rate,
            )
            .await
        {
            Ok(content) => content,
            Err(error) => {
                let report = SourceReport {
                    source_id: task.source_id.clone(),
                    tier: task.tier,
                    status: SourceStatus::Failed,
                    article_count: 0,
                    error: Some(error),
                    raw_preview: None,
                };
                return (Vec::new(), report);
            }
        };

        self.parse_content(&task, &executor, content).await
    }

    /// JSON extraction with the optional one-shot strict repair. Repair is
    /// limited to opted-in direct-fetch sources.
    async fn parse_content(
        &self,
        task: &FetchTask,
        executor: &FetchExecutor<'_>,
        content: String,
    ) -> (Vec<RawArticle>, SourceReport) {
        let collected_at = Utc::now();

        if let Some(values) = extract::extract_articles(&content) {
            let mut articles =
                extract::normalize_articles(values, &task.source_id, collected_at);
            if !articles.is_empty() {
                articles.truncate(task.max_articles);
                let report = SourceReport {
                    source_id: task.source_id.clone(),
                    tier: task.tier,
                    status: SourceStatus::Success,
                    article_count: articles.len(),
                    error: None,
                    raw_preview: None,
                };
                return (articles, report);
            }
        }

        if task.repair_json {
            if let TaskMethod::Direct { url } = &task.method {
                tracing::info!(source = %task.source_id, "parse failed — attempting strict-JSON repair");
                let prompt = prompts::strict_json(&content);
                if let Ok(repaired) = executor
                    .attempt_once(
                        FetchKind::Direct { url: url.as_str() },
                        &prompt,
                        &self.fetch_options,
                        task.rate.timeout_secs,
                    )
                    .await
                {
                    if let Some(values) = extract::extract_articles(&repaired) {
                        let mut articles =
                            extract::normalize_articles(values, &task.source_id, collected_at);
                        if !articles.is_empty() {
                            articles.truncate(task.max_articles);
                            // Recovered, but a parse error did surface.
                            let error = SourceError {
                                kind: ErrorKind::Parse,
                                source_id: task.source_id.clone(),
                                retry_count: 0,
                                timestamp: collected_at,
                                message: "initial response was not parseable JSON; recovered via strict repair".to_string(),
                            };
                            let report = SourceReport {
                                source_id: task.source_id.clone(),
                                tier: task.tier,
                                status: SourceStatus::Partial,
                                article_count: articles.len(),
                                error: Some(error),
                                raw_preview: Some(extract::raw_preview(&content)),
                            };
                            return (articles, report);
                        }
                    }
                }
            }
        }

        let error = SourceError {
            kind: ErrorKind::Parse,
            source_id: task.source_id.clone(),
            retry_count: 0,
            timestamp: collected_at,
            message: "no articles JSON found in fetch response".to_string(),
        };
        let report = SourceReport {
            source_id: task.source_id.clone(),
            tier: task.tier,
            status: SourceStatus::Failed,
            article_count: 0,
            error: Some(error),
            raw_preview: Some(extract::raw_preview(&content)),
        };
        (Vec::new(), report)
    }
}
