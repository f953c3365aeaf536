use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{env_var, parse_flag};

const DEFAULT_FILTER: &str = "info,tower_http=warn";

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub loki_url: Option<String>,
    pub loki_enabled: bool,
    pub service_name: String,
    pub environment: String,
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            loki_url: None,
            loki_enabled: false,
            service_name: "mediawatch".to_string(),
            environment: "development".to_string(),
            filter: DEFAULT_FILTER.to_string(),
        }
    }
}

impl LoggingConfig {
    /// Read `LOKI_ENABLED`, `LOKI_URL`, `SERVICE_NAME`, `ENVIRONMENT` and `RUST_LOG`
    pub fn from_env() -> Result<Self, String> {
        let defaults = Self::default();
        let loki_enabled = match env_var("LOKI_ENABLED") {
            Some(flag) => parse_flag("LOKI_ENABLED", &flag)?,
            None => defaults.loki_enabled,
        };

        Ok(Self {
            loki_url: env_var("LOKI_URL"),
            loki_enabled,
            service_name: env_var("SERVICE_NAME").unwrap_or(defaults.service_name),
            environment: env_var("ENVIRONMENT").unwrap_or(defaults.environment),
            filter: env_var("RUST_LOG").unwrap_or(defaults.filter),
        })
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.loki_enabled && self.loki_url.is_none() {
            return Err("LOKI_ENABLED is true but LOKI_URL is not set".to_string());
        }
        if let Some(url) = &self.loki_url {
            url::Url::parse(url).map_err(|e| format!("Invalid LOKI_URL '{}': {}", url, e))?;
        }
        EnvFilter::try_new(&self.filter)
            .map_err(|e| format!("Invalid RUST_LOG '{}': {}", self.filter, e))?;
        Ok(())
    }

    fn env_filter(&self) -> Result<EnvFilter, Box<dyn std::error::Error>> {
        Ok(EnvFilter::try_new(&self.filter)?)
    }
}

/// Install the global subscriber: console output, plus Loki shipping when the
/// `loki` feature is built in and enabled. Loki needs a running tokio runtime.
pub fn init_logging(config: LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;

    #[cfg(feature = "loki")]
    {
        if config.loki_enabled {
            if let Some(loki_url) = config.loki_url.as_deref() {
                return init_with_loki(&config, loki_url);
            }
        }
    }

    tracing_subscriber::registry()
        .with(config.env_filter()?)
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;
    tracing::info!(
        "📊 Console logging for {} ({})",
        config.service_name,
        config.environment
    );

    #[cfg(not(feature = "loki"))]
    {
        if config.loki_enabled {
            tracing::warn!("LOKI_ENABLED is set but this build has no `loki` feature");
        }
    }
    Ok(())
}

#[cfg(feature = "loki")]
fn init_with_loki(config: &LoggingConfig, loki_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let (loki_layer, task) = tracing_loki::builder()
        .label("service", &config.service_name)?
        .label("environment", &config.environment)?
        .build_url(url::Url::parse(loki_url)?)?;

    // Ships buffered events to Loki
    tokio::spawn(task);

    tracing_subscriber::registry()
        .with(config.env_filter()?)
        .with(tracing_subscriber::fmt::layer())
        .with(loki_layer)
        .try_init()?;

    tracing::info!("✅ Logging for {} shipped to Loki at {}", config.service_name, loki_url);
    Ok(())
}
