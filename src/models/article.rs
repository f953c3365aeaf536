use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

/// Author assigned to records that carry no usable author value
pub const UNKNOWN_AUTHOR: &str = "Unknown";

/// The five sentiment labels used for chart ordering and colouring.
///
/// Declaration order is the display order; `Ord` follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SentimentCategory {
    StronglyPositive,
    Positive,
    Neutral,
    Negative,
    StronglyNegative,
}

impl SentimentCategory {
    pub const ORDERED: [SentimentCategory; 5] = [
        SentimentCategory::StronglyPositive,
        SentimentCategory::Positive,
        SentimentCategory::Neutral,
        SentimentCategory::Negative,
        SentimentCategory::StronglyNegative,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            SentimentCategory::StronglyPositive => "strongly positive",
            SentimentCategory::Positive => "positive",
            SentimentCategory::Neutral => "neutral",
            SentimentCategory::Negative => "negative",
            SentimentCategory::StronglyNegative => "strongly negative",
        }
    }

    /// Match an already trimmed and lowercased label
    pub fn from_normalized(label: &str) -> Option<Self> {
        match label {
            "strongly positive" | "strongly_positive" => Some(SentimentCategory::StronglyPositive),
            "positive" => Some(SentimentCategory::Positive),
            "neutral" => Some(SentimentCategory::Neutral),
            "negative" => Some(SentimentCategory::Negative),
            "strongly negative" | "strongly_negative" => Some(SentimentCategory::StronglyNegative),
            _ => None,
        }
    }
}

impl std::fmt::Display for SentimentCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl Serialize for SentimentCategory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// A normalized sentiment value: either one of the closed categories or the
/// raw (trimmed, lowercased) string that matched none of them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SentimentLabel {
    Category(SentimentCategory),
    Other(String),
}

impl SentimentLabel {
    pub fn parse(raw: &str) -> Self {
        let normalized = raw.trim().to_lowercase();
        match SentimentCategory::from_normalized(&normalized) {
            Some(category) => SentimentLabel::Category(category),
            None => SentimentLabel::Other(normalized),
        }
    }

    pub fn category(&self) -> Option<SentimentCategory> {
        match self {
            SentimentLabel::Category(category) => Some(*category),
            SentimentLabel::Other(_) => None,
        }
    }

    pub fn bucket(&self) -> SentimentBucket {
        match self {
            SentimentLabel::Category(category) => SentimentBucket::Category(*category),
            SentimentLabel::Other(_) => SentimentBucket::Other,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            SentimentLabel::Category(category) => category.label(),
            SentimentLabel::Other(raw) => raw,
        }
    }
}

impl Serialize for SentimentLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Grouping key for per-author breakdowns: unmatched labels share one bucket,
/// ordered after the five categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SentimentBucket {
    Category(SentimentCategory),
    Other,
}

impl SentimentBucket {
    pub fn label(&self) -> &'static str {
        match self {
            SentimentBucket::Category(category) => category.label(),
            SentimentBucket::Other => "other",
        }
    }
}

impl Serialize for SentimentBucket {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// A news article after schema normalization
#[derive(Debug, Clone, Serialize)]
pub struct ArticleRecord {
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub sentiment: SentimentLabel,
    pub title: Option<String>,
    pub description: Option<String>,
    pub keywords: Vec<String>,
    pub body: Option<String>,
}

/// What the normalizer kept and dropped for one batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NormalizationStats {
    pub received: usize,
    pub retained: usize,
    pub dropped_bad_timestamp: usize,
    pub dropped_missing_text: usize,
    pub dropped_unmatched_sentiment: usize,
    pub stripped_columns: Vec<String>,
}
