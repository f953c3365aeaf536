use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Serialize, Serializer};

use super::article::{NormalizationStats, SentimentBucket, SentimentCategory};

/// Time-bucket width for the mentions-over-time series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Granularity {
    Day,
    Week,
    #[default]
    Month,
    Year,
}

impl Granularity {
    /// Parse the form label sent by the front-end. Unknown labels fall back to month.
    pub fn from_label(label: &str) -> Self {
        match label.trim() {
            "Par jour" => Granularity::Day,
            "Par semaine" => Granularity::Week,
            "Par mois" => Granularity::Month,
            "Par année" => Granularity::Year,
            _ => Granularity::Month,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Granularity::Day => "Par jour",
            Granularity::Week => "Par semaine",
            Granularity::Month => "Par mois",
            Granularity::Year => "Par année",
        }
    }

    /// Lowercase form used in chart titles
    pub fn title_suffix(&self) -> &'static str {
        match self {
            Granularity::Day => "par jour",
            Granularity::Week => "par semaine",
            Granularity::Month => "par mois",
            Granularity::Year => "par année",
        }
    }

    pub fn period_of(&self, at: DateTime<Utc>) -> Period {
        let date = at.date_naive();
        match self {
            Granularity::Day => Period::Day(date),
            Granularity::Week => {
                let offset = date.weekday().num_days_from_monday() as i64;
                Period::Week(date - Duration::days(offset))
            }
            Granularity::Month => Period::Month {
                year: date.year(),
                month: date.month(),
            },
            Granularity::Year => Period::Year(date.year()),
        }
    }
}

/// A coarsened timestamp. Only periods of the same granularity are ever compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Period {
    Day(NaiveDate),
    /// ISO week, keyed by its Monday
    Week(NaiveDate),
    Month { year: i32, month: u32 },
    Year(i32),
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Period::Day(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            Period::Week(monday) => {
                let sunday = *monday + Duration::days(6);
                write!(f, "{}/{}", monday.format("%Y-%m-%d"), sunday.format("%Y-%m-%d"))
            }
            Period::Month { year, month } => write!(f, "{:04}-{:02}", year, month),
            Period::Year(year) => write!(f, "{:04}", year),
        }
    }
}

impl Serialize for Period {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Headline counts shown at the top of the report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Kpis {
    pub total_mentions: usize,
    pub positive: usize,
    pub negative: usize,
    pub neutral: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeriodCount {
    pub period: Period,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    pub category: SentimentCategory,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorCount {
    pub author: String,
    pub count: usize,
}

/// One author's counts, aligned with `AuthorSentimentMatrix::columns`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorSentimentRow {
    pub author: String,
    pub counts: Vec<usize>,
}

impl AuthorSentimentRow {
    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }
}

/// Top authors broken down by sentiment bucket.
///
/// Rows are in display order: ascending total, so the largest author is the
/// last row and ends up at the top of a horizontal bar chart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuthorSentimentMatrix {
    pub columns: Vec<SentimentBucket>,
    pub rows: Vec<AuthorSentimentRow>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregationResult {
    pub kpis: Kpis,
    pub mentions_over_time: Vec<PeriodCount>,
    pub sentiment_histogram: Vec<CategoryCount>,
    pub author_sentiment: AuthorSentimentMatrix,
    pub top_authors: Vec<AuthorCount>,
}

/// Content hash identifying a generated report
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ReportId(String);

impl ReportId {
    pub fn from_digest(hex: String) -> Self {
        ReportId(hex)
    }

    /// Accepts only well-formed ids (64 lowercase hex chars)
    pub fn parse(raw: &str) -> Option<Self> {
        let valid = raw.len() == 64
            && raw
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        valid.then(|| ReportId(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ReportId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Base64-encoded PNG charts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartSet {
    pub mentions_over_time: String,
    pub sentiment_distribution: String,
    pub author_sentiment: String,
}

/// A fully assembled report
#[derive(Debug, Clone)]
pub struct Report {
    pub id: ReportId,
    pub granularity: Granularity,
    pub kpis: Kpis,
    pub stats: NormalizationStats,
    pub charts: ChartSet,
    pub table_html: String,
    pub summary: Option<String>,
    pub word_cloud: Option<String>,
    pub html: String,
    pub generated_at: DateTime<Utc>,
    /// An enrichment step failed, so the summary or word cloud is missing
    pub degraded: bool,
}
