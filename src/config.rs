use crate::error::{ProfileError, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Names of the collections and stored fields the engine reads and writes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(default)]
pub struct CollectionNames {
    pub users: String,
    pub accounts: String,
    pub transactions: String,
    pub profiles: String,

    #[schemars(description = "Field carrying the upstream identifier on raw source records.")]
    pub source_id_field: String,

    #[schemars(description = "Field the upstream identifier is renamed to once stored.")]
    pub external_id_field: String,

    #[schemars(description = "Field linking stored accounts and transactions to their customer.")]
    pub customer_ref_field: String,
}

impl Default for CollectionNames {
    fn default() -> Self {
        Self {
            users: "users".to_string(),
            accounts: "accounts".to_string(),
            transactions: "transactions".to_string(),
            profiles: "financial_profiles".to_string(),
            source_id_field: "_id".to_string(),
            external_id_field: "nessie_id".to_string(),
            customer_ref_field: "customer_firestore_id".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(default)]
pub struct EngineConfig {
    #[schemars(description = "EWMA span; the smoothing factor is 2 / (span + 1).")]
    pub ewma_span: u32,

    #[schemars(description = "Number of months a current-month outlier is spread across.")]
    pub amortization_months: u32,

    #[schemars(description = "IQR multiplier used to place the upper outlier fence.")]
    pub iqr_multiplier: f64,

    #[schemars(
        description = "Largest number of accounts joined in a single transaction lookup. Customers above it are skipped."
    )]
    pub max_accounts_per_lookup: usize,

    #[schemars(description = "Completed months required before a profile is produced.")]
    pub min_history_months: usize,

    pub request_timeout_secs: u64,

    #[schemars(description = "Upper bound on accounts fetched from the source at once.")]
    pub max_concurrent_fetches: usize,

    pub collections: CollectionNames,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ewma_span: 3,
            amortization_months: 3,
            iqr_multiplier: 1.5,
            max_accounts_per_lookup: 30,
            min_history_months: 2,
            request_timeout_secs: 15,
            max_concurrent_fetches: 4,
            collections: CollectionNames::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ewma_span == 0 {
            return Err(ProfileError::InvalidConfig(
                "ewma_span must be at least 1".to_string(),
            ));
        }
        if self.amortization_months == 0 {
            return Err(ProfileError::InvalidConfig(
                "amortization_months must be at least 1".to_string(),
            ));
        }
        if self.iqr_multiplier.is_nan() || self.iqr_multiplier < 0.0 {
            return Err(ProfileError::InvalidConfig(format!(
                "iqr_multiplier must be non-negative (got {})",
                self.iqr_multiplier
            )));
        }
        if self.max_accounts_per_lookup == 0 {
            return Err(ProfileError::InvalidConfig(
                "max_accounts_per_lookup must be at least 1".to_string(),
            ));
        }
        if self.min_history_months < 2 {
            return Err(ProfileError::InvalidConfig(format!(
                "min_history_months must be at least 2 (got {})",
                self.min_history_months
            )));
        }
        if self.max_concurrent_fetches == 0 {
            return Err(ProfileError::InvalidConfig(
                "max_concurrent_fetches must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Smoothing factor derived from the configured span.
    pub fn ewma_alpha(&self) -> f64 {
        2.0 / (self.ewma_span as f64 + 1.0)
    }
}
