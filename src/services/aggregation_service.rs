use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::debug;

use crate::models::{
    AggregationResult, ArticleRecord, AuthorCount, AuthorSentimentMatrix, AuthorSentimentRow,
    CategoryCount, Granularity, Kpis, PeriodCount, SentimentBucket, SentimentCategory,
};

/// Number of authors in the table and the per-author chart
pub const TOP_AUTHORS: usize = 10;

pub fn aggregate(records: &[ArticleRecord], granularity: Granularity) -> AggregationResult {
    let result = AggregationResult {
        kpis: compute_kpis(records),
        mentions_over_time: mentions_over_time(records, granularity),
        sentiment_histogram: sentiment_histogram(records),
        author_sentiment: author_sentiment_matrix(records),
        top_authors: top_authors(records),
    };
    debug!(
        "Aggregated {} records into {} periods and {} authors",
        records.len(),
        result.mentions_over_time.len(),
        result.top_authors.len()
    );
    result
}

/// Headline counts. Only exact matches count: strongly-* labels are excluded.
pub fn compute_kpis(records: &[ArticleRecord]) -> Kpis {
    let count = |category: SentimentCategory| {
        records
            .iter()
            .filter(|r| r.sentiment.category() == Some(category))
            .count()
    };
    Kpis {
        total_mentions: records.len(),
        positive: count(SentimentCategory::Positive),
        negative: count(SentimentCategory::Negative),
        neutral: count(SentimentCategory::Neutral),
    }
}

/// Mentions per period, ascending. Periods without records are omitted.
pub fn mentions_over_time(records: &[ArticleRecord], granularity: Granularity) -> Vec<PeriodCount> {
    let mut counts = BTreeMap::new();
    for record in records {
        *counts.entry(granularity.period_of(record.created_at)).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .map(|(period, count)| PeriodCount { period, count })
        .collect()
}

/// Counts for all five categories in display order, including zeros
pub fn sentiment_histogram(records: &[ArticleRecord]) -> Vec<CategoryCount> {
    SentimentCategory::ORDERED
        .iter()
        .map(|&category| CategoryCount {
            category,
            count: records
                .iter()
                .filter(|r| r.sentiment.category() == Some(category))
                .count(),
        })
        .collect()
}

pub fn top_authors(records: &[ArticleRecord]) -> Vec<AuthorCount> {
    rank_authors(records)
        .into_iter()
        .take(TOP_AUTHORS)
        .map(|(author, count)| AuthorCount {
            author: author.to_string(),
            count,
        })
        .collect()
}

/// Sentiment breakdown of the top authors.
///
/// Columns are the buckets that occur among those authors; rows run from the
/// smallest to the largest author.
pub fn author_sentiment_matrix(records: &[ArticleRecord]) -> AuthorSentimentMatrix {
    let top: Vec<&str> = rank_authors(records)
        .into_iter()
        .take(TOP_AUTHORS)
        .map(|(author, _)| author)
        .collect();

    let mut cells: HashMap<(&str, SentimentBucket), usize> = HashMap::new();
    let mut columns = BTreeSet::new();
    for record in records {
        let author = record.author.as_str();
        if !top.contains(&author) {
            continue;
        }
        let bucket = record.sentiment.bucket();
        columns.insert(bucket);
        *cells.entry((author, bucket)).or_insert(0) += 1;
    }
    let columns: Vec<SentimentBucket> = columns.into_iter().collect();

    let rows = top
        .iter()
        .rev()
        .map(|&author| AuthorSentimentRow {
            author: author.to_string(),
            counts: columns
                .iter()
                .map(|&bucket| cells.get(&(author, bucket)).copied().unwrap_or(0))
                .collect(),
        })
        .collect();

    AuthorSentimentMatrix { columns, rows }
}

/// All authors by record count, descending, ties broken by name
fn rank_authors(records: &[ArticleRecord]) -> Vec<(&str, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for record in records {
        *counts.entry(record.author.as_str()).or_insert(0) += 1;
    }
    let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked
}
