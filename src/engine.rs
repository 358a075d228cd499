use crate::aggregator::{current_month_transactions, Aggregation, MonthlyAggregator};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::forecast::BaselineForecaster;
use crate::outliers::OutlierAdjuster;
use crate::publisher::ProfilePublisher;
use crate::repository::TransactionRepository;
use crate::schema::{FinancialProfile, PublishedProfile, Transaction};
use crate::source::TransactionSource;
use crate::store::DocumentStore;
use crate::sync::{sync_customer, sync_known_customers};
use chrono::{DateTime, NaiveDate, Utc};
use log::{error, info};

/// What happened to one customer in a profiling run.
#[derive(Debug, Clone, PartialEq)]
pub enum ProfileOutcome {
    Published(PublishedProfile),
    NoTransactions,
    InsufficientData { months_available: usize },
    PublishFailed(String),
}

impl ProfileOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ProfileOutcome::Published(_))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub succeeded: usize,
    /// Customers skipped for missing data plus those whose publish failed.
    pub failed: usize,
    pub outcomes: Vec<(String, ProfileOutcome)>,
}

impl BatchReport {
    fn record(&mut self, customer_internal_id: String, outcome: ProfileOutcome) {
        if outcome.is_success() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.outcomes.push((customer_internal_id, outcome));
    }
}

/// Runs repository, aggregation, forecasting, outlier adjustment and
/// publishing for customers already present in the store.
pub struct ProfileEngine<'a, S: DocumentStore> {
    store: &'a S,
    config: &'a EngineConfig,
    aggregator: MonthlyAggregator,
    forecaster: BaselineForecaster,
    adjuster: OutlierAdjuster,
}

impl<'a, S: DocumentStore> ProfileEngine<'a, S> {
    /// Fails with `InvalidConfig` when `config` does not validate.
    pub fn new(store: &'a S, config: &'a EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            config,
            aggregator: MonthlyAggregator::from_config(config),
            forecaster: BaselineForecaster::from_config(config),
            adjuster: OutlierAdjuster::new(config.iqr_multiplier, config.amortization_months),
        })
    }

    pub fn with_aggregator(mut self, aggregator: MonthlyAggregator) -> Self {
        self.aggregator = aggregator;
        self
    }

    /// Builds a profile from resolved transactions without touching the store.
    pub fn analyze(
        &self,
        transactions: &[Transaction],
        today: NaiveDate,
    ) -> std::result::Result<FinancialProfile, ProfileOutcome> {
        let series = match self.aggregator.aggregate(transactions, today) {
            Aggregation::Ready(series) => series,
            Aggregation::InsufficientData { months_available } => {
                return Err(ProfileOutcome::InsufficientData { months_available })
            }
        };

        let baseline = self
            .forecaster
            .forecast_series(&series)
            .ok_or(ProfileOutcome::InsufficientData {
                months_available: series.len(),
            })?;

        let current = current_month_transactions(transactions, today);
        Ok(self
            .adjuster
            .adjust(&current, &series.expense_series(), &baseline))
    }

    pub fn process_customer(&self, customer_internal_id: &str, now: DateTime<Utc>) -> ProfileOutcome {
        info!("Analyzing customer {}", customer_internal_id);

        let records = TransactionRepository::new(self.store, self.config)
            .transactions_for(customer_internal_id);
        if records.is_empty() {
            info!("No transactions found for {}", customer_internal_id);
            return ProfileOutcome::NoTransactions;
        }

        let transactions = self.aggregator.resolve(&records);
        let profile = match self.analyze(&transactions, now.date_naive()) {
            Ok(profile) => profile,
            Err(outcome) => {
                info!(
                    "Not enough historical data to create a profile for {}",
                    customer_internal_id
                );
                return outcome;
            }
        };

        let publisher = ProfilePublisher::new(self.store, &self.config.collections.profiles);
        match publisher.publish(customer_internal_id, &profile, now) {
            Ok(published) => ProfileOutcome::Published(published),
            Err(e) => {
                error!(
                    "Could not save profile for {}: {}",
                    customer_internal_id, e
                );
                ProfileOutcome::PublishFailed(e.to_string())
            }
        }
    }

    /// The published affordability figure for a request-time decision.
    ///
    /// Unlike the batch path this lookup is strict: an unknown customer is
    /// `CustomerNotFound` and one over the account cap is
    /// `AccountCapExceeded`. `Ok(None)` means the customer has no accounts
    /// or no profile yet.
    pub fn approval_fcf(&self, customer_internal_id: &str) -> Result<Option<f64>> {
        let accounts = TransactionRepository::new(self.store, self.config)
            .customer_accounts(customer_internal_id)?;
        if accounts.is_empty() {
            info!("Customer {} has no accounts", customer_internal_id);
            return Ok(None);
        }

        ProfilePublisher::new(self.store, &self.config.collections.profiles)
            .final_adjusted_fcf_for(customer_internal_id)
    }

    /// Processes each customer in turn; a failure never stops the rest.
    pub fn run_batch<I>(&self, customer_ids: I, now: DateTime<Utc>) -> BatchReport
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut report = BatchReport::default();
        for customer_id in customer_ids {
            let customer_id = customer_id.as_ref();
            let outcome = self.process_customer(customer_id, now);
            report.record(customer_id.to_string(), outcome);
        }

        info!(
            "Job complete. Successfully analyzed: {} | Failed or skipped: {}",
            report.succeeded, report.failed
        );
        report
    }
}

/// Syncs every known customer from the source, then profiles each of them.
pub async fn run_nightly_job<T, S>(
    source: &T,
    store: &S,
    config: &EngineConfig,
    now: DateTime<Utc>,
) -> Result<BatchReport>
where
    T: TransactionSource,
    S: DocumentStore,
{
    info!("Starting nightly job at {}", now);
    let engine = ProfileEngine::new(store, config)?;
    let customer_ids = sync_known_customers(source, store, config).await?;
    if customer_ids.is_empty() {
        info!("No customers to process after sync");
        return Ok(BatchReport::default());
    }

    Ok(engine.run_batch(&customer_ids, now))
}

/// On-demand path: syncs one upstream customer and refreshes their profile.
/// `Ok(None)` when the source does not know the customer.
pub async fn sync_and_profile_customer<T, S>(
    source: &T,
    store: &S,
    config: &EngineConfig,
    external_customer_id: &str,
    now: DateTime<Utc>,
) -> Result<Option<(String, ProfileOutcome)>>
where
    T: TransactionSource,
    S: DocumentStore,
{
    let engine = ProfileEngine::new(store, config)?;
    let Some(summary) = sync_customer(source, store, config, external_customer_id).await? else {
        return Ok(None);
    };

    let outcome = engine.process_customer(&summary.customer_internal_id, now);
    Ok(Some((summary.customer_internal_id, outcome)))
}
