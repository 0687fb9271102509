//! The single-invocation pipeline: load configs, generate queries, collect
//! by tier, auto-disable abort-heavy sources (optionally re-running once),
//! deduplicate, render the digest, then persist run state and prune history.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use technews_collect::{
    AgentFetcher, CollectionResult, Collector, FetchOptions, HttpAgentFetcher, QueryGenerator,
    TaskMethod, WeightedQuery,
};
use technews_core::{
    load_app, load_queries, load_sources, load_tag_synonyms, load_thresholds, save_sources,
    AppFile, QueriesFile, SourcesFile, TagSynonyms,
};
use technews_dedup::pipeline::SourceDateHints;
use technews_dedup::{window_start, Deduplicator, NormalizeOptions};
use technews_history::HistoryStore;

use crate::{report, state};

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub config_dir: PathBuf,
    pub dry_run: bool,
    pub simple: bool,
    pub date: Option<NaiveDate>,
    pub auto_disable: bool,
    pub rerun: bool,
}

struct ConfigPaths {
    sources: PathBuf,
    queries: PathBuf,
    synonyms: PathBuf,
    thresholds: PathBuf,
    app: PathBuf,
}

impl ConfigPaths {
    fn new(dir: &Path) -> Self {
        Self {
            sources: dir.join("sources.yaml"),
            queries: dir.join("queries.yaml"),
            synonyms: dir.join("tag-synonyms.yaml"),
            thresholds: dir.join("dedup-thresholds.yaml"),
            app: dir.join("app.yaml"),
        }
    }

    fn ensure_exist(&self) -> anyhow::Result<()> {
        for path in [
            &self.sources,
            &self.queries,
            &self.synonyms,
            &self.thresholds,
            &self.app,
        ] {
            if !path.exists() {
                anyhow::bail!("missing config file: {}", path.display());
            }
        }
        Ok(())
    }
}

/// Entry point for `technews run`: builds the HTTP agent fetcher and runs
/// the pipeline.
pub async fn run(opts: RunOptions) -> anyhow::Result<()> {
    let paths = ConfigPaths::new(&opts.config_dir);
    paths.ensure_exist()?;
    let app = load_app(&paths.app)?;
    let fetcher = HttpAgentFetcher::new(&app.agent.endpoint, app.agent.request_timeout_secs)?;
    run_pipeline(&opts, &paths, &app, &fetcher).await
}

/// The pipeline proper, generic over the fetch boundary so tests can script
/// it.
async fn run_pipeline(
    opts: &RunOptions,
    paths: &ConfigPaths,
    app: &AppFile,
    fetcher: &dyn AgentFetcher,
) -> anyhow::Result<()> {
    let mut sources = load_sources(&paths.sources)?;
    let queries_cfg = load_queries(&paths.queries)?;
    let synonyms = load_tag_synonyms(&paths.synonyms)?;
    let thresholds = load_thresholds(&paths.thresholds)?;

    let now = effective_now(opts.date);
    let state_path = state_file_path(app);
    let last_success = state::load_last_success(&state_path);
    tracing::info!(
        now = %now,
        last_success = ?last_success,
        "starting run"
    );

    // History store failures are fatal: dedup correctness depends on it.
    let history = HistoryStore::open(&app.history.path)
        .await
        .context("opening history store")?;

    let queries = generate_queries(&queries_cfg, &synonyms, &history, now, app).await?;
    let fetch_options = FetchOptions {
        within_days: queries_cfg
            .date_restriction
            .enabled
            .then_some(queries_cfg.date_restriction.within_days),
    };
    let max_per_source = queries_cfg.selection.max_per_source;

    if opts.dry_run {
        let collector =
            Collector::new(fetcher, &sources, &queries, max_per_source, fetch_options);
        print_tasks(&collector.build_tasks());
        history.close().await;
        return Ok(());
    }

    let mut result = {
        let collector =
            Collector::new(fetcher, &sources, &queries, max_per_source, fetch_options);
        collector.run().await
    };

    // Auto-disable pass: persist `enabled: false` for abort-heavy sources,
    // then optionally reload everything and collect once more.
    let abort_heavy = result.abort_heavy_sources();
    if opts.auto_disable && !abort_heavy.is_empty() {
        tracing::warn!(sources = ?abort_heavy, "disabling abort-heavy sources");
        disable_sources(&mut sources, &abort_heavy);
        save_sources(&paths.sources, &sources)?;

        if opts.rerun {
            sources = load_sources(&paths.sources)?;
            let queries = generate_queries(&queries_cfg, &synonyms, &history, now, app).await?;
            let collector =
                Collector::new(fetcher, &sources, &queries, max_per_source, fetch_options);
            tracing::info!("re-running collection without disabled sources");
            result = collector.run().await;
        }
    }

    let CollectionResult {
        articles,
        reports,
        tier_counts,
    } = result;

    let date_hints: HashMap<String, SourceDateHints> = sources
        .sources
        .iter()
        .map(|source| {
            (
                source.id.clone(),
                SourceDateHints {
                    method: source.date_method,
                    pattern: source.date_pattern.clone(),
                },
            )
        })
        .collect();
    let deduplicator = Deduplicator::new(
        &history,
        &thresholds,
        NormalizeOptions::from(&app.url_normalization),
        date_hints,
        window_start(last_success, now),
        now,
    );
    let outcome = deduplicator.run(articles).await?;

    report::write_digest(
        &app.output.dir,
        now,
        &outcome.articles,
        &outcome.stats,
        &reports,
        &tier_counts,
        opts.simple,
    )?;

    state::save_last_success(&state_path, now)?;

    let horizon = now - Duration::days(i64::from(app.history.retention_days));
    history.cleanup(Some(horizon)).await?;
    history.close().await;

    Ok(())
}

/// `--date` pins the run to noon UTC of that day so freshness windows are
/// reproducible; otherwise the wall clock is used.
fn effective_now(date: Option<NaiveDate>) -> DateTime<Utc> {
    match date {
        Some(date) => {
            let noon = date.and_hms_opt(12, 0, 0).expect("noon is valid");
            DateTime::from_naive_utc_and_offset(noon, Utc)
        }
        None => Utc::now(),
    }
}

fn state_file_path(app: &AppFile) -> PathBuf {
    match app.history.path.parent() {
        Some(parent) => parent.join("last_success.json"),
        None => PathBuf::from("last_success.json"),
    }
}

/// Query scoring corpora come from history: titles first seen in the last
/// week (recent) and over the whole retention horizon (all-time).
async fn generate_queries(
    queries_cfg: &QueriesFile,
    synonyms: &TagSynonyms,
    history: &HistoryStore,
    now: DateTime<Utc>,
    app: &AppFile,
) -> anyhow::Result<Vec<WeightedQuery>> {
    let recent_titles: Vec<String> = history
        .find_by_date_range(now - Duration::days(7), None)
        .await?
        .into_iter()
        .map(|row| row.title)
        .collect();
    let all_titles: Vec<String> = history
        .find_by_date_range(
            now - Duration::days(i64::from(app.history.retention_days)),
            None,
        )
        .await?
        .into_iter()
        .map(|row| row.title)
        .collect();

    Ok(QueryGenerator::new(queries_cfg, synonyms).generate(&recent_titles, &all_titles))
}

fn disable_sources(sources: &mut SourcesFile, ids: &[String]) {
    for source in &mut sources.sources {
        if ids.contains(&source.id) {
            source.enabled = false;
        }
    }
}

fn print_tasks(tasks: &[technews_collect::FetchTask]) {
    println!("dry run: {} task(s)", tasks.len());
    for task in tasks {
        let target = match &task.method {
            TaskMethod::Direct { url } => format!("direct  {url}"),
            TaskMethod::Search { query } => format!("search  {query}"),
        };
        println!(
            "  [tier {}] {:<20} {} (max {} articles)",
            task.tier, task.source_id, target, task.max_articles
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use anyhow::Result;

    use super::*;

    /// Fetcher that aborts for one source's URL and answers everything else
    /// with a valid articles payload.
    struct AbortingFetcher {
        abort_url: String,
        calls: Arc<AtomicU32>,
        abort_calls: Arc<AtomicU32>,
    }

    #[async_trait::async_trait]
    impl AgentFetcher for AbortingFetcher {
        async fn execute_direct(
            &self,
            url: &str,
            _prompt: &str,
            _opts: &FetchOptions,
        ) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if url == self.abort_url {
                self.abort_calls.fetch_add(1, Ordering::SeqCst);
                anyhow::bail!("Claude Code process aborted by user");
            }
            Ok(format!(
                "```json\n{{\"articles\": [{{\"title\": \"From {url}\", \"url\": \"{url}article\"}}]}}\n```"
            ))
        }

        async fn execute_search(
            &self,
            _query: &str,
            _prompt: &str,
            _opts: &FetchOptions,
        ) -> Result<String> {
            anyhow::bail!("unexpected search")
        }
    }

    fn write_config_dir(root: &Path) {
        std::fs::create_dir_all(root).unwrap();
        std::fs::write(
            root.join("sources.yaml"),
            r"
sources:
  - id: flaky
    name: Flaky Source
    tier: 1
    collect_method: direct_fetch
    url: https://flaky.example.com/
  - id: steady
    name: Steady Source
    tier: 1
    collect_method: direct_fetch
    url: https://steady.example.com/
rate_control:
  max_concurrency: 2
  default_timeout_secs: 5
  default_retry_interval_secs: 0
  default_max_retries: 0
",
        )
        .unwrap();
        std::fs::write(
            root.join("queries.yaml"),
            r"
query_groups:
  - id: llm
    name: LLM
    keywords: [LLM]
    weight: 1.0
selection:
  top_n: 5
  max_per_source: 2
",
        )
        .unwrap();
        std::fs::write(root.join("tag-synonyms.yaml"), "llm: [GPT]\n").unwrap();
        std::fs::write(
            root.join("dedup-thresholds.yaml"),
            r"
thresholds:
  default:
    jaccard_gte: 0.7
    levenshtein_lte: 0.3
",
        )
        .unwrap();
        let history_path = root.join("data").join("history.db");
        let out_dir = root.join("out");
        std::fs::write(
            root.join("app.yaml"),
            format!(
                "agent:\n  endpoint: http://localhost:1/unused\nhistory:\n  path: {}\noutput:\n  dir: {}\n",
                history_path.display(),
                out_dir.display()
            ),
        )
        .unwrap();
    }

    fn temp_root(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("technews-run-{}-{name}", std::process::id()))
    }

    #[tokio::test]
    async fn abort_heavy_source_is_disabled_and_rerun_succeeds() {
        let root = temp_root("auto-disable");
        let _ = std::fs::remove_dir_all(&root);
        write_config_dir(&root);

        let paths = ConfigPaths::new(&root);
        let app = load_app(&paths.app).unwrap();
        let calls = Arc::new(AtomicU32::new(0));
        let abort_calls = Arc::new(AtomicU32::new(0));
        let fetcher = AbortingFetcher {
            abort_url: "https://flaky.example.com/".to_string(),
            calls: Arc::clone(&calls),
            abort_calls: Arc::clone(&abort_calls),
        };
        let opts = RunOptions {
            config_dir: root.clone(),
            dry_run: false,
            simple: true,
            date: Some(NaiveDate::from_ymd_opt(2024, 1, 16).unwrap()),
            auto_disable: true,
            rerun: true,
        };

        run_pipeline(&opts, &paths, &app, &fetcher).await.unwrap();

        // Tier 1 retries three times: four abort attempts, first phase only.
        assert_eq!(abort_calls.load(Ordering::SeqCst), 4);

        // The config file now carries enabled: false for the flaky source.
        let reloaded = load_sources(&paths.sources).unwrap();
        let flaky = reloaded.sources.iter().find(|s| s.id == "flaky").unwrap();
        assert!(!flaky.enabled);
        let steady = reloaded.sources.iter().find(|s| s.id == "steady").unwrap();
        assert!(steady.enabled);

        // A digest was written and run state persisted.
        assert!(root.join("out").join("digest-2024-01-16.md").exists());
        assert!(root.join("data").join("last_success.json").exists());

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn no_auto_disable_leaves_config_untouched() {
        let root = temp_root("no-disable");
        let _ = std::fs::remove_dir_all(&root);
        write_config_dir(&root);

        let paths = ConfigPaths::new(&root);
        let app = load_app(&paths.app).unwrap();
        let fetcher = AbortingFetcher {
            abort_url: "https://flaky.example.com/".to_string(),
            calls: Arc::new(AtomicU32::new(0)),
            abort_calls: Arc::new(AtomicU32::new(0)),
        };
        let opts = RunOptions {
            config_dir: root.clone(),
            dry_run: false,
            simple: true,
            date: Some(NaiveDate::from_ymd_opt(2024, 1, 16).unwrap()),
            auto_disable: false,
            rerun: false,
        };

        run_pipeline(&opts, &paths, &app, &fetcher).await.unwrap();

        let reloaded = load_sources(&paths.sources).unwrap();
        assert!(reloaded.sources.iter().all(|s| s.enabled));

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn dry_run_touches_nothing() {
        let root = temp_root("dry-run");
        let _ = std::fs::remove_dir_all(&root);
        write_config_dir(&root);

        let paths = ConfigPaths::new(&root);
        let app = load_app(&paths.app).unwrap();
        let calls = Arc::new(AtomicU32::new(0));
        let fetcher = AbortingFetcher {
            abort_url: String::new(),
            calls: Arc::clone(&calls),
            abort_calls: Arc::new(AtomicU32::new(0)),
        };
        let opts = RunOptions {
            config_dir: root.clone(),
            dry_run: true,
            simple: false,
            date: None,
            auto_disable: true,
            rerun: true,
        };

        run_pipeline(&opts, &paths, &app, &fetcher).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!root.join("out").exists());
        assert!(!root.join("data").join("last_success.json").exists());

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn missing_config_file_is_fatal() {
        let root = temp_root("missing-config");
        let _ = std::fs::remove_dir_all(&root);
        std::fs::create_dir_all(&root).unwrap();
        let paths = ConfigPaths::new(&root);
        let err = paths.ensure_exist().unwrap_err();
        assert!(err.to_string().contains("missing config file"));
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn date_override_pins_noon_utc() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let now = effective_now(Some(date));
        assert_eq!(now.to_rfc3339(), "2024-01-15T12:00:00+00:00");
    }
}
