//! # Cash Flow Profile
//!
//! A library for turning a customer's synced income and expense records into a
//! forward-looking free cash flow (FCF) profile used to gate affordability
//! decisions.
//!
//! ## Core Concepts
//!
//! - **Idempotent Ingestion**: Upstream records are stored at most once per upstream id
//! - **Monthly Series**: Transactions are bucketed into a contiguous run of calendar months
//! - **Baseline Forecast**: An EWMA (span 3) over completed months, with mean and population std dev
//! - **Outlier Adjustment**: Current-month expenses above the historical IQR fence are amortized
//!   over the next three months
//! - **Publishing**: One profile document per customer, overwritten on every run
//!
//! ## Example
//!
//! ```rust,ignore
//! use cash_flow_profile::*;
//! use chrono::Utc;
//!
//! let store = InMemoryStore::new();
//! let config = EngineConfig::default();
//!
//! // ... ingest accounts and transactions with `Ingestor` or `sync_customer` ...
//!
//! let engine = ProfileEngine::new(&store, &config)?;
//! let report = engine.run_batch(["customer-internal-id"], Utc::now());
//! println!("{} published, {} skipped", report.succeeded, report.failed);
//! ```

pub mod aggregator;
pub mod config;
pub mod engine;
pub mod error;
pub mod forecast;
pub mod ingestion;
pub mod outliers;
pub mod publisher;
pub mod repository;
pub mod schema;
pub mod source;
pub mod store;
pub mod sync;
pub mod synthetic;
pub mod utils;

#[cfg(feature = "remote")]
pub mod http_source;

pub use aggregator::{
    current_month_transactions, Aggregation, DateFieldChain, HistoricalSeries, MonthlyAggregator,
    MonthlySeries,
};
pub use config::{CollectionNames, EngineConfig};
pub use engine::{
    run_nightly_job, sync_and_profile_customer, BatchReport, ProfileEngine, ProfileOutcome,
};
pub use error::{ProfileError, Result};
pub use forecast::{ewma, mean_and_population_std_dev, BaselineForecaster};
pub use ingestion::Ingestor;
pub use outliers::{quantile, OutlierAdjuster};
pub use publisher::ProfilePublisher;
pub use repository::TransactionRepository;
pub use schema::*;
pub use source::TransactionSource;
pub use store::{DocumentStore, InMemoryStore, UniqueInsert};
pub use sync::{sync_customer, sync_known_customers, SyncSummary};
pub use synthetic::{HistoryGenerator, SyntheticHistory};
pub use utils::*;

#[cfg(feature = "remote")]
pub use http_source::HttpTransactionSource;

use chrono::Utc;

/// Profiles a single stored customer as of now.
pub fn process_customer<S: DocumentStore>(
    store: &S,
    config: &EngineConfig,
    customer_internal_id: &str,
) -> Result<ProfileOutcome> {
    Ok(ProfileEngine::new(store, config)?.process_customer(customer_internal_id, Utc::now()))
}

/// Profiles every customer in the users collection as of now.
pub fn process_all_customers<S: DocumentStore>(store: &S, config: &EngineConfig) -> Result<BatchReport> {
    let engine = ProfileEngine::new(store, config)?;
    let customer_ids: Vec<String> = store
        .scan(&config.collections.users)?
        .into_iter()
        .map(|record| record.key)
        .collect();
    Ok(engine.run_batch(&customer_ids, Utc::now()))
}
