use std::str::FromStr;

/// What to do with records that lack a title or description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingTextPolicy {
    #[default]
    Keep,
    Drop,
}

/// What to do with sentiment labels outside the five known categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnmatchedSentimentPolicy {
    /// Keep the record; it counts toward totals and the "other" author bucket
    #[default]
    Other,
    Drop,
}

impl MissingTextPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MissingTextPolicy::Keep => "keep",
            MissingTextPolicy::Drop => "drop",
        }
    }
}

impl UnmatchedSentimentPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnmatchedSentimentPolicy::Other => "other",
            UnmatchedSentimentPolicy::Drop => "drop",
        }
    }
}

impl FromStr for MissingTextPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "keep" => Ok(MissingTextPolicy::Keep),
            "drop" => Ok(MissingTextPolicy::Drop),
            other => Err(format!(
                "Invalid MISSING_TEXT_POLICY: {}. Must be 'keep' or 'drop'",
                other
            )),
        }
    }
}

impl FromStr for UnmatchedSentimentPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "other" => Ok(UnmatchedSentimentPolicy::Other),
            "drop" => Ok(UnmatchedSentimentPolicy::Drop),
            other => Err(format!(
                "Invalid UNMATCHED_SENTIMENT_POLICY: {}. Must be 'other' or 'drop'",
                other
            )),
        }
    }
}

/// Normalizer settings, taken from `AppConfig`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NormalizerOptions {
    pub missing_text: MissingTextPolicy,
    pub unmatched_sentiment: UnmatchedSentimentPolicy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policies_parse_case_insensitively() {
        assert_eq!("DROP".parse::<MissingTextPolicy>().unwrap(), MissingTextPolicy::Drop);
        assert_eq!(
            " other ".parse::<UnmatchedSentimentPolicy>().unwrap(),
            UnmatchedSentimentPolicy::Other
        );
        assert!("maybe".parse::<MissingTextPolicy>().is_err());
    }
}
