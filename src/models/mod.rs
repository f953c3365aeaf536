mod article;
mod policy;
mod report;

pub use article::{
    ArticleRecord, NormalizationStats, SentimentBucket, SentimentCategory, SentimentLabel,
    UNKNOWN_AUTHOR,
};
pub use policy::{MissingTextPolicy, NormalizerOptions, UnmatchedSentimentPolicy};
pub use report::{
    AggregationResult, AuthorCount, AuthorSentimentMatrix, AuthorSentimentRow, CategoryCount,
    ChartSet, Granularity, Kpis, Period, PeriodCount, Report, ReportId,
};
