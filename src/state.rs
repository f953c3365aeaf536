use std::sync::Arc;

use url::Url;

use crate::config::AppConfig;
use crate::errors::EnrichmentError;
use crate::services::enrichment_service::{
    HttpSummarizer, KeywordCloud, Summarizer, WordCloudRenderer,
};
use crate::services::report_store::ReportStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub reports: ReportStore,
    pub summarizer: Option<Arc<dyn Summarizer>>,
    pub word_cloud: Option<Arc<dyn WordCloudRenderer>>,
}

impl AppState {
    /// Wire the optional enrichment capabilities from configuration
    pub fn from_config(config: AppConfig) -> Result<Self, EnrichmentError> {
        let summarizer: Option<Arc<dyn Summarizer>> = match &config.summarizer_url {
            Some(url) => {
                let endpoint =
                    Url::parse(url).map_err(|e| EnrichmentError::InvalidEndpoint(e.to_string()))?;
                tracing::info!("📝 Summaries enabled via {}", endpoint);
                Some(Arc::new(HttpSummarizer::new(endpoint)?))
            }
            None => None,
        };

        let word_cloud: Option<Arc<dyn WordCloudRenderer>> = if config.word_cloud_enabled {
            Some(Arc::new(KeywordCloud::default()))
        } else {
            None
        };

        Ok(Self {
            reports: ReportStore::new(config.report_dir.clone()),
            config: Arc::new(config),
            summarizer,
            word_cloud,
        })
    }
}
