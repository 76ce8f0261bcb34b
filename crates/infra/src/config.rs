//! Service configuration.

use serde::Deserialize;

use stocktransfer_transfers::OverReceiptPolicy;

use crate::error::TransferError;

/// Shipment service configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TransferConfig {
    /// What to do with received quantities above the sent quantity.
    #[serde(default)]
    pub over_receipt: OverReceiptPolicy,
    /// Page size used when a query asks for 0 items per page.
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,
    /// Upper bound for any requested page size.
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_page_size() -> u32 {
    10
}

fn default_max_page_size() -> u32 {
    100
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            over_receipt: OverReceiptPolicy::default(),
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            log_filter: default_log_filter(),
        }
    }
}

impl TransferConfig {
    /// Loads configuration from `config/default`, `config/{RUN_MODE}` and
    /// `STOCKTRANSFER__*` environment variables, in that order of precedence.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be read or the result is invalid.
    pub fn load() -> Result<Self, TransferError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(config::Environment::with_prefix("STOCKTRANSFER").separator("__"))
            .build()
            .map_err(|e| TransferError::Config(e.to_string()))?;

        Self::from_config(config)
    }

    fn from_config(config: config::Config) -> Result<Self, TransferError> {
        let loaded: Self = config
            .try_deserialize()
            .map_err(|e| TransferError::Config(e.to_string()))?;
        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> Result<(), TransferError> {
        if self.default_page_size == 0 {
            return Err(TransferError::Config(
                "default_page_size must be positive".to_string(),
            ));
        }
        if self.default_page_size > self.max_page_size {
            return Err(TransferError::Config(format!(
                "default_page_size ({}) exceeds max_page_size ({})",
                self.default_page_size, self.max_page_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_toml(source: &str) -> Result<TransferConfig, TransferError> {
        let config = config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()
            .map_err(|e| TransferError::Config(e.to_string()))?;
        TransferConfig::from_config(config)
    }

    #[test]
    fn defaults_clamp_over_receipt_and_page_by_ten() {
        let config = TransferConfig::default();
        assert_eq!(config.over_receipt, OverReceiptPolicy::Clamp);
        assert_eq!(config.default_page_size, 10);
        assert_eq!(config.max_page_size, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let config = from_toml("over_receipt = \"reject\"").unwrap();
        assert_eq!(config.over_receipt, OverReceiptPolicy::Reject);
        assert_eq!(config.default_page_size, 10);
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn inconsistent_page_sizes_are_rejected() {
        let err = from_toml("default_page_size = 50\nmax_page_size = 20").unwrap_err();
        assert!(matches!(err, TransferError::Config(msg) if msg.contains("exceeds")));

        let err = from_toml("default_page_size = 0").unwrap_err();
        assert!(matches!(err, TransferError::Config(_)));
    }
}
