use std::fmt::Write as _;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::errors::{AppError, EnrichmentError};
use crate::models::{
    AggregationResult, AuthorCount, ChartSet, Granularity, Kpis, NormalizationStats,
    NormalizerOptions, Report, ReportId,
};
use crate::services::aggregation_service::aggregate;
use crate::services::chart_service::render_charts;
use crate::services::enrichment_service::{keyword_counts, summary_input, WordCloudRenderer};
use crate::services::ingest_service::{self, Submission};
use crate::services::normalizer_service::normalize_records;
use crate::services::report_store::StoredReport;
use crate::state::AppState;

/// Everything that goes into the HTML document
#[derive(Debug, Clone)]
pub struct ReportContent {
    pub granularity: Granularity,
    pub kpis: Kpis,
    pub stats: NormalizationStats,
    pub charts: ChartSet,
    pub table_html: String,
    pub summary: Option<String>,
    pub word_cloud: Option<String>,
}

/// Output of the CPU-bound half of the pipeline
#[derive(Debug, Clone)]
pub struct ReportParts {
    pub granularity: Granularity,
    pub stats: NormalizationStats,
    pub aggregation: AggregationResult,
    pub charts: ChartSet,
    pub word_cloud: Option<String>,
    pub word_cloud_failed: bool,
    pub summary_input: String,
}

/// Content hash of everything that influences the generated report
pub fn report_id(submission: &Submission, options: &NormalizerOptions) -> ReportId {
    let mut hasher = Sha256::new();
    hasher.update(submission.format.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(&submission.payload);
    hasher.update([0u8]);
    hasher.update(submission.granularity.as_deref().unwrap_or("").trim().as_bytes());
    hasher.update([0u8]);
    hasher.update(options.missing_text.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(options.unmatched_sentiment.as_str().as_bytes());

    let digest = hasher.finalize();
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(hex, "{:02x}", byte);
    }
    ReportId::from_digest(hex)
}

/// Decode, normalize, aggregate and render. Blocking; run it off the runtime.
pub fn build_report_parts(
    submission: &Submission,
    options: &NormalizerOptions,
    word_cloud: Option<&dyn WordCloudRenderer>,
) -> Result<ReportParts, AppError> {
    let (raw, embedded_granularity) =
        ingest_service::decode(submission.format, &submission.payload)?;
    let granularity = submission
        .granularity
        .as_deref()
        .filter(|g| !g.trim().is_empty())
        .or(embedded_granularity.as_deref())
        .map(Granularity::from_label)
        .unwrap_or_default();

    let batch = normalize_records(&raw, options)?;
    let aggregation = aggregate(&batch.records, granularity);
    let charts = render_charts(&aggregation, granularity)?;

    let mut word_cloud_failed = false;
    let word_cloud = word_cloud.and_then(|renderer| {
        match renderer.render(&keyword_counts(&batch.records)) {
            Ok(png) => Some(STANDARD.encode(png)),
            Err(EnrichmentError::NoInput) => None,
            Err(e) => {
                warn!("Word cloud skipped: {}", e);
                word_cloud_failed = true;
                None
            }
        }
    });

    Ok(ReportParts {
        granularity,
        stats: batch.stats,
        summary_input: summary_input(&batch.records),
        aggregation,
        charts,
        word_cloud,
        word_cloud_failed,
    })
}

/// Run the whole pipeline for one submission and persist the result.
///
/// A submission identical to one already handled by this process returns the
/// stored report, which becomes the latest again. Reports missing an
/// enrichment because it failed are regenerated instead.
pub async fn generate_report(
    state: &AppState,
    submission: Submission,
) -> Result<StoredReport, AppError> {
    let options = state.config.normalizer_options();
    let id = report_id(&submission, &options);

    if let Some(stored) = state.reports.load(&id).await? {
        info!("Report {} already generated, reusing it", id);
        state.reports.promote(&stored).await?;
        return Ok(stored);
    }

    let word_cloud: Option<Arc<dyn WordCloudRenderer>> = state.word_cloud.clone();
    let parts = tokio::task::spawn_blocking(move || {
        build_report_parts(&submission, &options, word_cloud.as_deref())
    })
    .await
    .map_err(|e| AppError::Internal(format!("Report generation task failed: {}", e)))??;

    let mut summary_failed = false;
    let summary = match &state.summarizer {
        Some(summarizer) if !parts.summary_input.is_empty() => {
            match summarizer.summarize(&parts.summary_input).await {
                Ok(summary) => Some(summary),
                Err(e) => {
                    warn!("Summary skipped: {}", e);
                    summary_failed = true;
                    None
                }
            }
        }
        _ => None,
    };

    let content = ReportContent {
        granularity: parts.granularity,
        kpis: parts.aggregation.kpis,
        stats: parts.stats,
        charts: parts.charts,
        table_html: render_author_table(&parts.aggregation.top_authors),
        summary,
        word_cloud: parts.word_cloud,
    };

    let report = Report {
        id,
        granularity: content.granularity,
        kpis: content.kpis,
        stats: content.stats.clone(),
        html: render_html(&content),
        charts: content.charts,
        table_html: content.table_html,
        summary: content.summary,
        word_cloud: content.word_cloud,
        generated_at: Utc::now(),
        degraded: summary_failed || parts.word_cloud_failed,
    };

    state.reports.save(&report).await
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Ranked author table, most prolific first
pub fn render_author_table(authors: &[AuthorCount]) -> String {
    if authors.is_empty() {
        return r#"<p class="empty">Aucun auteur à afficher.</p>"#.to_string();
    }

    let mut rows = String::new();
    for (rank, author) in authors.iter().enumerate() {
        let _ = write!(
            rows,
            "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
            rank + 1,
            escape_html(&author.author),
            author.count
        );
    }
    format!(
        r#"<table class="authors"><thead><tr><th>Rang</th><th>Auteur</th><th>Articles</th></tr></thead><tbody>{}</tbody></table>"#,
        rows
    )
}

const REPORT_CSS: &str = r#"
body { font-family: "Helvetica Neue", Arial, sans-serif; margin: 0; background: #f4f6f8; color: #16425B; }
main { max-width: 1080px; margin: 0 auto; padding: 32px 24px; }
h1 { margin-bottom: 4px; }
h2 { border-bottom: 2px solid #81C3D7; padding-bottom: 6px; margin-top: 40px; }
.subtitle { color: #2F6690; margin-top: 0; }
.kpis { display: flex; gap: 16px; list-style: none; padding: 0; }
.kpis li { flex: 1; background: #fff; border-radius: 8px; padding: 16px; box-shadow: 0 1px 3px rgba(0,0,0,0.1); }
.kpis .value { display: block; font-size: 2em; font-weight: bold; }
.chart { background: #fff; border-radius: 8px; padding: 12px; margin-bottom: 24px; }
.chart img { max-width: 100%; height: auto; display: block; margin: 0 auto; }
table.authors { width: 100%; border-collapse: collapse; background: #fff; }
table.authors th, table.authors td { padding: 8px 12px; border-bottom: 1px solid #D9DCD6; text-align: left; }
table.authors th { background: #2F6690; color: #fff; }
.summary { background: #fff; border-left: 4px solid #219ebc; padding: 12px 16px; white-space: pre-wrap; }
.empty { color: #777; font-style: italic; }
footer { margin-top: 48px; font-size: 0.85em; color: #777; }
"#;

fn kpi_item(label: &str, value: usize) -> String {
    format!(
        r#"<li><span class="value">{}</span><span class="label">{}</span></li>"#,
        value, label
    )
}

fn chart_figure(title: &str, base64_png: &str) -> String {
    format!(
        r#"<div class="chart"><img src="data:image/png;base64,{}" alt="{}"></div>"#,
        base64_png,
        escape_html(title)
    )
}

/// Self-contained HTML report. Contains no timestamps, so identical content
/// renders to identical bytes.
pub fn render_html(content: &ReportContent) -> String {
    let kpis = [
        kpi_item("Mentions totales", content.kpis.total_mentions),
        kpi_item("Positives", content.kpis.positive),
        kpi_item("Négatives", content.kpis.negative),
        kpi_item("Neutres", content.kpis.neutral),
    ]
    .join("");

    let summary = content
        .summary
        .as_deref()
        .map(|summary| {
            format!(
                r#"<section><h2>Synthèse</h2><div class="summary">{}</div></section>"#,
                escape_html(summary)
            )
        })
        .unwrap_or_default();

    let word_cloud = content
        .word_cloud
        .as_deref()
        .map(|png| {
            format!(
                "<section><h2>Mots-clés</h2>{}</section>",
                chart_figure("Nuage de mots-clés", png)
            )
        })
        .unwrap_or_default();

    format!(
        r#"<!DOCTYPE html>
<html lang="fr">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Rapport de veille médiatique</title>
<style>{css}</style>
</head>
<body>
<main>
<h1>Rapport de veille médiatique</h1>
<p class="subtitle">Granularité : {granularity}</p>
<section><h2>Indicateurs clés</h2><ul class="kpis">{kpis}</ul></section>
{summary}
<section><h2>Évolution des mentions</h2>{timeline}</section>
<section><h2>Répartition des sentiments</h2>{histogram}</section>
<section><h2>Sentiment par auteur</h2>{authors}</section>
<section><h2>Top 10 des auteurs</h2>{table}</section>
{word_cloud}
<footer>Rapport généré automatiquement à partir de {retained} articles retenus sur {received} reçus.</footer>
</main>
</body>
</html>
"#,
        css = REPORT_CSS,
        granularity = escape_html(content.granularity.label()),
        kpis = kpis,
        summary = summary,
        timeline = chart_figure("Évolution des mentions", &content.charts.mentions_over_time),
        histogram = chart_figure(
            "Répartition des sentiments",
            &content.charts.sentiment_distribution
        ),
        authors = chart_figure("Sentiment par auteur", &content.charts.author_sentiment),
        table = content.table_html,
        word_cloud = word_cloud,
        retained = content.stats.retained,
        received = content.stats.received,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::config::AppConfig;
    use crate::models::{MissingTextPolicy, UnmatchedSentimentPolicy};
    use crate::services::enrichment_service::{KeywordCloud, Summarizer};
    use crate::services::ingest_service::InputFormat;

    /// Fails its first call, then answers
    #[derive(Default)]
    struct FlakySummarizer {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Summarizer for FlakySummarizer {
        async fn summarize(&self, _text: &str) -> Result<String, EnrichmentError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(EnrichmentError::Status(503))
            } else {
                Ok("Résumé du lot".to_string())
            }
        }
    }

    /// Always fails
    struct BrokenCloud;

    impl WordCloudRenderer for BrokenCloud {
        fn render(&self, _keywords: &[(String, usize)]) -> Result<Vec<u8>, EnrichmentError> {
            Err(EnrichmentError::Render("no canvas".to_string()))
        }
    }

    fn state_in(dir: &std::path::Path) -> AppState {
        let config = AppConfig {
            report_dir: dir.to_path_buf(),
            word_cloud_enabled: false,
            ..Default::default()
        };
        AppState::from_config(config).unwrap()
    }

    const THREE_RECORDS: &str = r#"[
        {"author": "A", "createdAt": "2023-10-14T10:00:00Z", "sentiment": "Positive ", "keywords": ["énergie"]},
        {"author": "A", "createdAt": "2023-11-14T10:00:00Z", "sentiment": "negative", "keywords": "énergie, climat"},
        {"author": "B", "createdAt": "2023-11-20T10:00:00Z", "sentiment": "neutral"}
    ]"#;

    const WITH_TEXT: &str = r#"[
        {"author": "A", "createdAt": "2023-10-14T10:00:00Z", "sentiment": "positive", "title": "Hausse", "description": "Les prix montent"},
        {"author": "B", "createdAt": "2023-11-14T10:00:00Z", "sentiment": "neutral", "title": "Stable"}
    ]"#;

    fn submission(payload: &str, granularity: Option<&str>) -> Submission {
        Submission {
            format: InputFormat::Json,
            payload: payload.as_bytes().to_vec(),
            granularity: granularity.map(str::to_string),
        }
    }

    fn content(summary: Option<&str>) -> ReportContent {
        ReportContent {
            granularity: Granularity::Month,
            kpis: Kpis {
                total_mentions: 3,
                positive: 1,
                negative: 1,
                neutral: 1,
            },
            stats: NormalizationStats::default(),
            charts: ChartSet {
                mentions_over_time: "AAAA".to_string(),
                sentiment_distribution: "BBBB".to_string(),
                author_sentiment: "CCCC".to_string(),
            },
            table_html: render_author_table(&[]),
            summary: summary.map(str::to_string),
            word_cloud: None,
        }
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<b>"O'Neil" & co</b>"#),
            "&lt;b&gt;&quot;O&#39;Neil&quot; &amp; co&lt;/b&gt;"
        );
    }

    #[test]
    fn test_author_table_escapes_and_ranks() {
        let table = render_author_table(&[
            AuthorCount { author: "<script>".to_string(), count: 2 },
            AuthorCount { author: "B".to_string(), count: 1 },
        ]);
        assert!(table.contains("<td>1</td><td>&lt;script&gt;</td><td>2</td>"));
        assert!(table.contains("<td>2</td><td>B</td><td>1</td>"));
    }

    #[test]
    fn test_render_html_embeds_charts_and_optional_sections() {
        let html = render_html(&content(None));
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains(r#"<html lang="fr">"#));
        assert!(html.contains("data:image/png;base64,AAAA"));
        assert!(html.contains("data:image/png;base64,BBBB"));
        assert!(html.contains("data:image/png;base64,CCCC"));
        assert!(!html.contains("Synthèse"));

        let html = render_html(&content(Some("Résumé <court>")));
        assert!(html.contains("Synthèse"));
        assert!(html.contains("Résumé &lt;court&gt;"));
    }

    #[test]
    fn test_report_id_depends_on_inputs() {
        let options = NormalizerOptions::default();
        let base = report_id(&submission(THREE_RECORDS, None), &options);

        assert_eq!(base, report_id(&submission(THREE_RECORDS, None), &options));
        assert_ne!(base, report_id(&submission(THREE_RECORDS, Some("Par jour")), &options));
        assert_ne!(
            base,
            report_id(
                &submission(THREE_RECORDS, None),
                &NormalizerOptions {
                    missing_text: MissingTextPolicy::Drop,
                    unmatched_sentiment: UnmatchedSentimentPolicy::Other,
                }
            )
        );
        assert!(ReportId::parse(base.as_str()).is_some());
    }

    #[test]
    fn test_build_report_parts_three_records() {
        let cloud = KeywordCloud::default();
        let parts = build_report_parts(
            &submission(THREE_RECORDS, None),
            &NormalizerOptions::default(),
            Some(&cloud),
        )
        .unwrap();

        assert_eq!(parts.granularity, Granularity::Month);
        assert_eq!(parts.aggregation.kpis.total_mentions, 3);
        assert_eq!(parts.aggregation.mentions_over_time.len(), 2);
        assert_eq!(parts.aggregation.top_authors[0].author, "A");
        assert!(parts.word_cloud.is_some());
        assert_eq!(parts.stats.retained, 3);
    }

    #[test]
    fn test_build_report_parts_is_deterministic() {
        let options = NormalizerOptions::default();
        let first = build_report_parts(&submission(THREE_RECORDS, Some("Par semaine")), &options, None)
            .unwrap();
        let second = build_report_parts(&submission(THREE_RECORDS, Some("Par semaine")), &options, None)
            .unwrap();

        assert_eq!(first.granularity, Granularity::Week);
        assert_eq!(first.charts, second.charts);
        assert_eq!(first.aggregation, second.aggregation);
    }

    #[test]
    fn test_embedded_granularity_is_used_when_request_has_none() {
        let payload = format!(r#"{{"granularity": "Par année", "articles": {}}}"#, THREE_RECORDS);
        let parts =
            build_report_parts(&submission(&payload, Some("  ")), &NormalizerOptions::default(), None)
                .unwrap();
        assert_eq!(parts.granularity, Granularity::Year);
        assert_eq!(parts.aggregation.mentions_over_time.len(), 1);
    }

    #[test]
    fn test_empty_batch_builds_empty_report() {
        let parts =
            build_report_parts(&submission("[]", None), &NormalizerOptions::default(), None)
                .unwrap();
        assert_eq!(parts.aggregation.kpis, Kpis::default());
        assert!(parts.summary_input.is_empty());
    }

    #[test]
    fn test_word_cloud_failure_is_flagged() {
        let parts = build_report_parts(
            &submission(THREE_RECORDS, None),
            &NormalizerOptions::default(),
            Some(&BrokenCloud),
        )
        .unwrap();
        assert!(parts.word_cloud.is_none());
        assert!(parts.word_cloud_failed);
    }

    #[tokio::test]
    async fn test_failed_summary_is_retried_on_resubmission() {
        let dir = tempfile::tempdir().unwrap();
        let summarizer = Arc::new(FlakySummarizer::default());
        let mut state = state_in(dir.path());
        state.summarizer = Some(summarizer.clone());

        let first = generate_report(&state, submission(WITH_TEXT, None)).await.unwrap();
        assert!(!first.html.contains("Synthèse"));

        let second = generate_report(&state, submission(WITH_TEXT, None)).await.unwrap();
        assert_eq!(first.id, second.id);
        assert!(second.html.contains("Résumé du lot"));
        assert_eq!(summarizer.calls.load(Ordering::SeqCst), 2);

        // Complete now, so the third submission reuses it
        let third = generate_report(&state, submission(WITH_TEXT, None)).await.unwrap();
        assert_eq!(third.html, second.html);
        assert_eq!(summarizer.calls.load(Ordering::SeqCst), 2);
        assert_eq!(state.reports.latest_html().await.unwrap(), &*second.html);
    }

    #[tokio::test]
    async fn test_failed_word_cloud_is_not_reused() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = state_in(dir.path());
        state.word_cloud = Some(Arc::new(BrokenCloud));

        let report = generate_report(&state, submission(THREE_RECORDS, None)).await.unwrap();
        assert!(!state.reports.is_indexed(&report.id));
        assert_eq!(state.reports.read_html(&report.id).await.unwrap(), &*report.html);
    }
}
