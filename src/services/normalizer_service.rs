use std::collections::BTreeSet;
use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::errors::AppError;
use crate::models::{
    ArticleRecord, MissingTextPolicy, NormalizationStats, NormalizerOptions, SentimentLabel,
    UnmatchedSentimentPolicy, UNKNOWN_AUTHOR,
};
use crate::services::ingest_service::RawRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Author,
    CreatedAt,
    Sentiment,
    Title,
    Description,
    Keywords,
    Body,
}

impl Field {
    fn name(&self) -> &'static str {
        match self {
            Field::Author => "author",
            Field::CreatedAt => "created_at",
            Field::Sentiment => "sentiment",
            Field::Title => "title",
            Field::Description => "description",
            Field::Keywords => "keywords",
            Field::Body => "body",
        }
    }

    fn aliases(&self) -> &'static [&'static str] {
        match self {
            Field::Author => &["author", "authorName", "author_name"],
            Field::CreatedAt => &[
                "createdAt",
                "created_at",
                "articleCreatedDate",
                "published_at",
                "publishedAt",
                "date",
            ],
            Field::Sentiment => &["sentiment", "sentiment_label", "sentimentHumanReadable"],
            Field::Title => &["title", "articleTitle"],
            Field::Description => &[
                "description",
                "articleDescription",
                "articleCleanDescription",
            ],
            Field::Keywords => &["keywords"],
            Field::Body => &["body", "content", "articleContent"],
        }
    }

    /// First non-null value under any alias
    fn lookup<'a>(&self, record: &'a RawRecord) -> Option<&'a Value> {
        self.aliases()
            .iter()
            .filter_map(|alias| record.get(*alias))
            .find(|value| !value.is_null())
    }

    fn present_in(&self, record: &RawRecord) -> bool {
        self.aliases().iter().any(|alias| record.contains_key(*alias))
    }
}

/// Export columns that carry no analytical value
const AUXILIARY_COLUMNS: [&str; 12] = [
    "articleJSON",
    "mainCategoryID",
    "processingCost",
    "publisher",
    "totalTokens",
    "outputTokens",
    "inputTokens",
    "videoType",
    "videoURL",
    "typesenseID",
    "typesenseCollection",
    "__v",
];

fn is_auxiliary_column(name: &str) -> bool {
    static INDEXED_KEYWORD: OnceLock<Option<Regex>> = OnceLock::new();
    if AUXILIARY_COLUMNS.contains(&name) {
        return true;
    }
    INDEXED_KEYWORD
        .get_or_init(|| Regex::new(r"^keywords\[\d+\]$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(name))
}

/// Why a single record was left out of the batch
#[derive(Debug, Error)]
enum RecordRejection {
    #[error("unparseable timestamp {0}")]
    Timestamp(String),
    #[error("missing {0}")]
    MissingText(&'static str),
    #[error("unmatched sentiment '{0}'")]
    UnmatchedSentiment(String),
}

#[derive(Debug, Clone)]
pub struct NormalizedBatch {
    pub records: Vec<ArticleRecord>,
    pub stats: NormalizationStats,
}

/// Map heterogeneous raw rows onto `ArticleRecord`.
///
/// Fails only when a required field is missing from the whole batch; bad
/// individual records are counted in the stats and skipped.
pub fn normalize_records(
    raw: &[RawRecord],
    options: &NormalizerOptions,
) -> Result<NormalizedBatch, AppError> {
    check_schema(raw, options)?;

    let mut stats = NormalizationStats {
        received: raw.len(),
        ..Default::default()
    };

    let stripped: BTreeSet<&str> = raw
        .iter()
        .flat_map(|record| record.keys())
        .map(String::as_str)
        .filter(|key| is_auxiliary_column(key))
        .collect();
    stats.stripped_columns = stripped.into_iter().map(str::to_string).collect();

    let mut records = Vec::with_capacity(raw.len());
    for (index, record) in raw.iter().enumerate() {
        match normalize_record(record, options) {
            Ok(article) => records.push(article),
            Err(rejection) => {
                debug!("Skipping record {}: {}", index, rejection);
                match rejection {
                    RecordRejection::Timestamp(_) => stats.dropped_bad_timestamp += 1,
                    RecordRejection::MissingText(_) => stats.dropped_missing_text += 1,
                    RecordRejection::UnmatchedSentiment(_) => {
                        stats.dropped_unmatched_sentiment += 1
                    }
                }
            }
        }
    }
    stats.retained = records.len();

    info!(
        "Normalized {} of {} records ({} bad timestamps, {} missing text, {} unmatched sentiment)",
        stats.retained,
        stats.received,
        stats.dropped_bad_timestamp,
        stats.dropped_missing_text,
        stats.dropped_unmatched_sentiment
    );

    Ok(NormalizedBatch { records, stats })
}

fn check_schema(raw: &[RawRecord], options: &NormalizerOptions) -> Result<(), AppError> {
    if raw.is_empty() {
        return Ok(());
    }

    let mut required = vec![Field::CreatedAt, Field::Sentiment];
    if options.missing_text == MissingTextPolicy::Drop {
        required.extend([Field::Title, Field::Description]);
    }

    for field in required {
        if !raw.iter().any(|record| field.present_in(record)) {
            return Err(AppError::Schema(format!(
                "Missing required field '{}' (accepted names: {})",
                field.name(),
                field.aliases().join(", ")
            )));
        }
    }
    Ok(())
}

fn normalize_record(
    record: &RawRecord,
    options: &NormalizerOptions,
) -> Result<ArticleRecord, RecordRejection> {
    let created_at_raw = Field::CreatedAt.lookup(record);
    let created_at = created_at_raw
        .and_then(parse_timestamp)
        .ok_or_else(|| {
            RecordRejection::Timestamp(
                created_at_raw.map_or_else(|| "null".to_string(), Value::to_string),
            )
        })?;

    let sentiment = SentimentLabel::parse(
        &Field::Sentiment
            .lookup(record)
            .and_then(text_of)
            .unwrap_or_default(),
    );
    if let SentimentLabel::Other(raw) = &sentiment {
        if options.unmatched_sentiment == UnmatchedSentimentPolicy::Drop {
            return Err(RecordRejection::UnmatchedSentiment(raw.clone()));
        }
    }

    let title = Field::Title.lookup(record).and_then(text_of);
    let description = Field::Description.lookup(record).and_then(text_of);
    if options.missing_text == MissingTextPolicy::Drop {
        if title.is_none() {
            return Err(RecordRejection::MissingText("title"));
        }
        if description.is_none() {
            return Err(RecordRejection::MissingText("description"));
        }
    }

    let author = Field::Author
        .lookup(record)
        .and_then(text_of)
        .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string());

    Ok(ArticleRecord {
        author,
        created_at,
        sentiment,
        title,
        description,
        keywords: Field::Keywords
            .lookup(record)
            .map(parse_keywords)
            .unwrap_or_default(),
        body: Field::Body.lookup(record).and_then(text_of),
    })
}

/// Trimmed, non-empty text form of a scalar value
fn text_of(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// Parse a timestamp given as epoch seconds (number or numeric string) or as
/// one of the accepted date formats. Naive values are taken as UTC.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => match n.as_i64() {
            Some(secs) => DateTime::from_timestamp(secs, 0),
            None => n.as_f64().and_then(from_epoch_float),
        },
        Value::String(s) => parse_timestamp_str(s.trim()),
        _ => None,
    }
}

fn parse_timestamp_str(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        return None;
    }
    if let Ok(secs) = s.parse::<i64>() {
        return DateTime::from_timestamp(secs, 0);
    }
    if let Ok(secs) = s.parse::<f64>() {
        return from_epoch_float(secs);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    for format in ["%Y-%m-%d", "%d/%m/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
        }
    }
    None
}

fn from_epoch_float(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1_000_000_000.0) as u32;
    DateTime::from_timestamp(whole as i64, nanos.min(999_999_999))
}

/// Keywords arrive as an array, a JSON-array string, a Python-style list
/// string or a `,`/`;` separated string.
fn parse_keywords(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(text_of).collect(),
        Value::String(s) => {
            let s = s.trim();
            if s.starts_with('[') {
                if let Ok(items) = serde_json::from_str::<Vec<Value>>(s) {
                    return items.iter().filter_map(text_of).collect();
                }
            }
            s.trim_start_matches('[')
                .trim_end_matches(']')
                .split([',', ';'])
                .map(|k| k.trim().trim_matches(|c| c == '\'' || c == '"').trim())
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect()
        }
        _ => Vec::new(),
    }
}
