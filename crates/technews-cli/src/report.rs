//! Markdown digest rendering.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use technews_collect::{SourceReport, TierCounts};
use technews_core::{FilteredArticle, FreshnessPriority};
use technews_dedup::pipeline::DedupStats;
use technews_dedup::similarity;

/// Render the digest and write it as `digest-YYYY-MM-DD.md` under `out_dir`.
/// Returns the written path.
///
/// # Errors
///
/// Returns an error if the output directory cannot be created or the file
/// cannot be written.
pub fn write_digest(
    out_dir: &Path,
    now: DateTime<Utc>,
    articles: &[FilteredArticle],
    stats: &DedupStats,
    reports: &[SourceReport],
    tier_counts: &BTreeMap<u8, TierCounts>,
    simple: bool,
) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("creating {}", out_dir.display()))?;
    let path = out_dir.join(format!("digest-{}.md", now.format("%Y-%m-%d")));
    let content = render(now, articles, stats, reports, tier_counts, simple);
    std::fs::write(&path, content).with_context(|| format!("writing {}", path.display()))?;
    tracing::info!(path = %path.display(), articles = articles.len(), "digest written");
    Ok(path)
}

fn render(
    now: DateTime<Utc>,
    articles: &[FilteredArticle],
    stats: &DedupStats,
    reports: &[SourceReport],
    tier_counts: &BTreeMap<u8, TierCounts>,
    simple: bool,
) -> String {
    let mut md = String::new();
    md.push_str(&format!("# Tech News Digest — {}\n\n", now.format("%Y-%m-%d")));

    md.push_str("## Run summary\n\n");
    md.push_str(&format!(
        "- Collected: {} → after URL dedup: {} → after history: {} → after similarity: {} → fresh: {}\n",
        stats.total_input,
        stats.after_url_dedup,
        stats.after_history_dedup,
        stats.after_similarity_dedup,
        stats.fresh_count,
    ));
    for (tier, counts) in tier_counts {
        md.push_str(&format!(
            "- Tier {tier}: {} ok, {} partial, {} failed\n",
            counts.success, counts.partial, counts.failed
        ));
    }
    md.push('\n');

    md.push_str("## Sources\n\n");
    md.push_str("| Source | Tier | Status | Articles | Note |\n");
    md.push_str("|--------|------|--------|----------|------|\n");
    for report in reports {
        let note = report
            .error
            .as_ref()
            .map(|e| format!("{}: {}", e.kind, e.message))
            .unwrap_or_default();
        md.push_str(&format!(
            "| {} | {} | {} | {} | {} |\n",
            report.source_id, report.tier, report.status, report.article_count, note
        ));
    }
    md.push('\n');

    md.push_str(&format!("## Articles ({})\n\n", articles.len()));
    if simple {
        for article in articles {
            md.push_str(&render_line(article));
        }
    } else {
        let mut by_category: BTreeMap<&str, Vec<&FilteredArticle>> = BTreeMap::new();
        for article in articles {
            let category =
                similarity::detect_category(&article.article.source, &article.normalized_url);
            by_category.entry(category).or_default().push(article);
        }
        for (category, items) in by_category {
            md.push_str(&format!("### {category}\n\n"));
            for article in items {
                md.push_str(&render_line(article));
            }
            md.push('\n');
        }
    }

    md
}

fn render_line(article: &FilteredArticle) -> String {
    let marker = match article.freshness_priority {
        FreshnessPriority::High => "",
        FreshnessPriority::Normal => "",
        FreshnessPriority::Low => " _(date unconfirmed)_",
    };
    let summary = article
        .article
        .summary
        .as_deref()
        .map(|s| format!(" — {s}"))
        .unwrap_or_default();
    format!(
        "- [{}]({}) · {}{marker}{summary}\n",
        article.article.title, article.article.url, article.article.source
    )
}
