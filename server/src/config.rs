use anyhow::{Context, Result};
use platform_db::DatabaseSettings;
use products_crm::PipelineConfig;
use products_crm::config::{DEFAULT_CURRENCY, DEFAULT_FORECAST_MONTHS};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseSettings,
    pub pipeline: PipelineConfig,
    pub otlp_endpoint: Option<String>,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let currency =
            std::env::var("PIPELINE_CURRENCY").unwrap_or_else(|_| DEFAULT_CURRENCY.into());
        let forecast_months = match std::env::var("PIPELINE_FORECAST_MONTHS") {
            Ok(raw) => raw
                .trim()
                .parse::<u32>()
                .with_context(|| format!("invalid PIPELINE_FORECAST_MONTHS `{raw}`"))?,
            Err(_) => DEFAULT_FORECAST_MONTHS,
        };
        let pipeline = PipelineConfig::new(&currency, forecast_months)
            .context("invalid pipeline configuration")?;

        let otlp_endpoint = std::env::var("OTLP_ENDPOINT")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        Ok(Self {
            database: DatabaseSettings::from_env(),
            pipeline,
            otlp_endpoint,
        })
    }
}
