use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use plotters::prelude::*;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::errors::EnrichmentError;
use crate::models::ArticleRecord;
use crate::services::chart_service::{render_png, SENTIMENT_PALETTE, TIMELINE_COLOR};

/// Upper bound on the text sent to the summarizer, in characters
pub const MAX_SUMMARY_INPUT_CHARS: usize = 12_000;

/// Produces a short digest of the batch's article text
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, text: &str) -> Result<String, EnrichmentError>;
}

/// Renders keyword frequencies as a PNG image
pub trait WordCloudRenderer: Send + Sync {
    fn render(&self, keywords: &[(String, usize)]) -> Result<Vec<u8>, EnrichmentError>;
}

#[derive(Debug, Serialize)]
struct SummaryRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct SummaryResponse {
    summary: String,
}

/// Summarizer backed by an HTTP service taking `{"text"}` and answering `{"summary"}`
pub struct HttpSummarizer {
    client: Client,
    endpoint: Url,
}

impl HttpSummarizer {
    pub fn new(endpoint: Url) -> Result<Self, EnrichmentError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl Summarizer for HttpSummarizer {
    async fn summarize(&self, text: &str) -> Result<String, EnrichmentError> {
        if text.trim().is_empty() {
            return Err(EnrichmentError::NoInput);
        }

        debug!("Requesting summary for {} chars from {}", text.len(), self.endpoint);
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&SummaryRequest { text })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(EnrichmentError::Status(response.status().as_u16()));
        }

        let body: SummaryResponse = response.json().await?;
        let summary = body.summary.trim().to_string();
        if summary.is_empty() {
            return Err(EnrichmentError::EmptySummary);
        }
        info!("Received summary ({} chars)", summary.len());
        Ok(summary)
    }
}

/// Concatenated article text for the summarizer, cut at a char boundary
pub fn summary_input(records: &[ArticleRecord]) -> String {
    let mut text = String::new();
    for record in records {
        let parts = [&record.title, &record.description, &record.body];
        for part in parts.into_iter().flatten() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(part);
        }
    }
    match text.char_indices().nth(MAX_SUMMARY_INPUT_CHARS) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text,
    }
}

/// Keyword frequencies, most frequent first, ties by keyword.
/// Keywords are compared case-insensitively.
pub fn keyword_counts(records: &[ArticleRecord]) -> Vec<(String, usize)> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for keyword in records.iter().flat_map(|r| r.keywords.iter()) {
        let keyword = keyword.trim().to_lowercase();
        if !keyword.is_empty() {
            *counts.entry(keyword).or_insert(0) += 1;
        }
    }
    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked
}

/// Built-in word cloud: words laid out in rows, sized by frequency
#[derive(Debug, Clone)]
pub struct KeywordCloud {
    pub max_words: usize,
    pub size: (u32, u32),
    pub min_font: u32,
    pub max_font: u32,
}

impl Default for KeywordCloud {
    fn default() -> Self {
        Self {
            max_words: 40,
            size: (800, 400),
            min_font: 14,
            max_font: 48,
        }
    }
}

impl KeywordCloud {
    fn font_size(&self, count: usize, min: usize, max: usize) -> u32 {
        if max <= min {
            return (self.min_font + self.max_font) / 2;
        }
        let ratio = (count - min) as f64 / (max - min) as f64;
        self.min_font + ((self.max_font - self.min_font) as f64 * ratio).round() as u32
    }
}

impl WordCloudRenderer for KeywordCloud {
    fn render(&self, keywords: &[(String, usize)]) -> Result<Vec<u8>, EnrichmentError> {
        let words: Vec<&(String, usize)> = keywords.iter().take(self.max_words).collect();
        if words.is_empty() {
            return Err(EnrichmentError::NoInput);
        }

        let max = words.iter().map(|(_, c)| *c).max().unwrap_or(0);
        let min = words.iter().map(|(_, c)| *c).min().unwrap_or(0);
        let colors: Vec<RGBColor> = SENTIMENT_PALETTE
            .iter()
            .map(|(_, color)| *color)
            .filter(|color| *color != RGBColor(0xD9, 0xDC, 0xD6))
            .chain(std::iter::once(TIMELINE_COLOR))
            .collect();

        let png = render_png(self.size, |root| {
            let (width, height) = root.dim_in_pixel();
            let padding = 12i32;
            let mut x = padding;
            let mut y = padding;
            let mut row_height = 0i32;

            for (i, (word, count)) in words.iter().enumerate() {
                let style = ("sans-serif", self.font_size(*count, min, max))
                    .into_font()
                    .color(&colors[i % colors.len()]);
                let (w, h) = root.estimate_text_size(word, &style)?;
                let (w, h) = (w as i32, h as i32);

                if x + w > width as i32 - padding && x > padding {
                    x = padding;
                    y += row_height + padding / 2;
                    row_height = 0;
                }
                if y + h > height as i32 - padding {
                    break;
                }

                root.draw(&Text::new(word.clone(), (x, y), style))?;
                x += w + padding;
                row_height = row_height.max(h);
            }
            Ok(())
        })?;

        debug!("Rendered word cloud with up to {} keywords", words.len());
        Ok(png)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SentimentLabel;
    use axum::{routing::post, Json, Router};
    use chrono::Utc;
    use serde_json::{json, Value};

    fn article(keywords: &[&str], title: &str) -> ArticleRecord {
        ArticleRecord {
            author: "A".to_string(),
            created_at: Utc::now(),
            sentiment: SentimentLabel::parse("neutral"),
            title: Some(title.to_string()),
            description: None,
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            body: Some("body".to_string()),
        }
    }

    async fn spawn_summarizer(app: Router) -> Url {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Url::parse(&format!("http://{}/summarize", addr)).unwrap()
    }

    #[test]
    fn test_keyword_counts_are_case_insensitive_and_ranked() {
        let records = vec![
            article(&["Energy", "climate"], "t"),
            article(&["energy", "budget"], "t"),
        ];
        let counts = keyword_counts(&records);
        assert_eq!(counts[0], ("energy".to_string(), 2));
        assert_eq!(counts[1], ("budget".to_string(), 1));
        assert_eq!(counts[2], ("climate".to_string(), 1));
    }

    #[test]
    fn test_summary_input_is_truncated_on_char_boundary() {
        let long_title = "é".repeat(MAX_SUMMARY_INPUT_CHARS + 10);
        let text = summary_input(&[article(&[], &long_title)]);
        assert_eq!(text.chars().count(), MAX_SUMMARY_INPUT_CHARS);
    }

    #[test]
    fn test_word_cloud_renders_png() {
        let cloud = KeywordCloud::default();
        let keywords: Vec<(String, usize)> = (0..60)
            .map(|i| (format!("keyword{}", i), 60 - i))
            .collect();
        let png = cloud.render(&keywords).unwrap();
        assert!(png.starts_with(&[0x89, b'P', b'N', b'G']));
    }

    #[test]
    fn test_word_cloud_without_keywords() {
        let result = KeywordCloud::default().render(&[]);
        assert!(matches!(result, Err(EnrichmentError::NoInput)));
    }

    #[tokio::test]
    async fn test_http_summarizer_returns_summary() {
        let app = Router::new().route(
            "/summarize",
            post(|Json(body): Json<Value>| async move {
                let text = body["text"].as_str().unwrap_or_default().to_string();
                Json(json!({ "summary": format!("{} chars", text.len()) }))
            }),
        );
        let summarizer = HttpSummarizer::new(spawn_summarizer(app).await).unwrap();

        let summary = summarizer.summarize("hello").await.unwrap();
        assert_eq!(summary, "5 chars");
    }

    #[tokio::test]
    async fn test_http_summarizer_reports_error_status() {
        let app = Router::new().route(
            "/summarize",
            post(|| async { axum::http::StatusCode::SERVICE_UNAVAILABLE }),
        );
        let summarizer = HttpSummarizer::new(spawn_summarizer(app).await).unwrap();

        let result = summarizer.summarize("hello").await;
        assert!(matches!(result, Err(EnrichmentError::Status(503))));
    }

    #[tokio::test]
    async fn test_http_summarizer_rejects_empty_text() {
        let summarizer =
            HttpSummarizer::new(Url::parse("http://127.0.0.1:9/summarize").unwrap()).unwrap();
        let result = summarizer.summarize("   ").await;
        assert!(matches!(result, Err(EnrichmentError::NoInput)));
    }
}
