use std::net::SocketAddr;
use std::path::PathBuf;

use url::Url;

use crate::models::{MissingTextPolicy, NormalizerOptions, UnmatchedSentimentPolicy};

const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub report_dir: PathBuf,
    pub missing_text_policy: MissingTextPolicy,
    pub unmatched_sentiment_policy: UnmatchedSentimentPolicy,
    pub summarizer_url: Option<String>,
    pub word_cloud_enabled: bool,
    pub max_upload_bytes: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            report_dir: PathBuf::from("static"),
            missing_text_policy: MissingTextPolicy::default(),
            unmatched_sentiment_policy: UnmatchedSentimentPolicy::default(),
            summarizer_url: None,
            word_cloud_enabled: true,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

/// Strict `true`/`false`, so a typo never flips a feature on
pub(crate) fn parse_flag(name: &str, value: &str) -> Result<bool, String> {
    value
        .parse::<bool>()
        .map_err(|e| format!("Invalid {} '{}': {}", name, value, e))
}

pub(crate) fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

impl AppConfig {
    pub fn from_env() -> Result<Self, String> {
        let defaults = Self::default();

        let bind_addr = match env_var("BIND_ADDR") {
            Some(addr) => addr
                .parse()
                .map_err(|e| format!("Invalid BIND_ADDR '{}': {}", addr, e))?,
            None => defaults.bind_addr,
        };

        let max_upload_bytes = match env_var("MAX_UPLOAD_BYTES") {
            Some(bytes) => bytes
                .parse()
                .map_err(|e| format!("Invalid MAX_UPLOAD_BYTES '{}': {}", bytes, e))?,
            None => defaults.max_upload_bytes,
        };

        let word_cloud_enabled = match env_var("WORD_CLOUD_ENABLED") {
            Some(flag) => parse_flag("WORD_CLOUD_ENABLED", &flag)?,
            None => defaults.word_cloud_enabled,
        };

        Ok(Self {
            bind_addr,
            report_dir: env_var("REPORT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.report_dir),
            missing_text_policy: env_var("MISSING_TEXT_POLICY")
                .map(|p| p.parse::<MissingTextPolicy>())
                .transpose()?
                .unwrap_or_default(),
            unmatched_sentiment_policy: env_var("UNMATCHED_SENTIMENT_POLICY")
                .map(|p| p.parse::<UnmatchedSentimentPolicy>())
                .transpose()?
                .unwrap_or_default(),
            summarizer_url: env_var("SUMMARIZER_URL"),
            word_cloud_enabled,
            max_upload_bytes,
        })
    }

    pub fn validate(&self) -> Result<(), String> {
        if let Some(url) = &self.summarizer_url {
            Url::parse(url).map_err(|e| format!("Invalid SUMMARIZER_URL '{}': {}", url, e))?;
        }
        if self.max_upload_bytes == 0 {
            return Err("MAX_UPLOAD_BYTES must be greater than zero".to_string());
        }
        Ok(())
    }

    pub fn normalizer_options(&self) -> NormalizerOptions {
        NormalizerOptions {
            missing_text: self.missing_text_policy,
            unmatched_sentiment: self.unmatched_sentiment_policy,
        }
    }
}
