use entity::deals::CURRENCY_CHARS;

use crate::error::{PipelineError, PipelineResult};

pub const DEFAULT_CURRENCY: &str = "NOK";
pub const DEFAULT_FORECAST_MONTHS: u32 = 3;
pub const MAX_FORECAST_MONTHS: u32 = 12;
pub const MAX_FORECAST_DAYS: u32 = 3_660;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineConfig {
    pub default_currency: String,
    pub default_forecast_months: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_currency: DEFAULT_CURRENCY.into(),
            default_forecast_months: DEFAULT_FORECAST_MONTHS,
        }
    }
}

impl PipelineConfig {
    /// Validates raw settings. The currency must be a three-letter code.
    pub fn new(currency: &str, forecast_months: u32) -> PipelineResult<Self> {
        let currency = currency_code(currency)?;
        if !(1..=MAX_FORECAST_MONTHS).contains(&forecast_months) {
            return Err(PipelineError::validation(format!(
                "forecast months must be between 1 and {MAX_FORECAST_MONTHS}"
            )));
        }
        Ok(Self {
            default_currency: currency,
            default_forecast_months: forecast_months,
        })
    }

    /// Resolves a requested month horizon: `0` means the configured default.
    pub fn forecast_months(&self, requested: u32) -> u32 {
        match requested {
            0 => self.default_forecast_months,
            n => n.clamp(1, MAX_FORECAST_MONTHS),
        }
    }
}

/// Normalizes an ISO 4217 style code: three ASCII letters, upper-cased.
pub(crate) fn currency_code(raw: &str) -> PipelineResult<String> {
    let code = raw.trim().to_ascii_uppercase();
    if code.len() != CURRENCY_CHARS as usize || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(PipelineError::validation(format!(
            "currency `{code}` is not a three-letter code"
        )));
    }
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.default_currency, "NOK");
        assert_eq!(config.forecast_months(0), 3);
        assert_eq!(config.forecast_months(40), 12);
        assert_eq!(config.forecast_months(6), 6);
    }

    #[test]
    fn rejects_bad_settings() {
        assert!(PipelineConfig::new("kroner", 3).is_err());
        assert!(PipelineConfig::new("EUR", 0).is_err());
        assert!(PipelineConfig::new("EUR", 13).is_err());
        assert_eq!(PipelineConfig::new(" eur ", 6).unwrap().default_currency, "EUR");
    }

    #[test]
    fn currency_code_is_three_letters() {
        assert_eq!(currency_code("usd").unwrap(), "USD");
        for bad in ["EURO", "EU", "E1R", "", "ÆØÅ"] {
            assert!(matches!(currency_code(bad), Err(PipelineError::Validation(_))));
        }
    }
}
