//! Batch runner: syncs customers from the upstream source and refreshes
//! their financial profiles.
//!
//! Usage:
//!   nightly_job                     nightly run over the customers in FCF_CUSTOMERS
//!   nightly_job customer <id>...    on-demand sync + profile for upstream ids
//!   nightly_job demo                profile a generated year of activity

use cash_flow_profile::http_source::DEFAULT_SOURCE_URL;
use cash_flow_profile::{
    run_nightly_job, sync_and_profile_customer, Document, DocumentStore, EngineConfig,
    HistoryGenerator, HttpTransactionSource, InMemoryStore, Ingestor, ProfileEngine,
    ProfileOutcome, TransactionRepository, TransactionSource,
};
use chrono::Utc;
use log::{error, info};
use std::env;
use std::time::Duration;

const RECENT_WINDOW_MONTHS: u32 = 3;

fn load_config() -> cash_flow_profile::Result<EngineConfig> {
    match env::var("FCF_CONFIG") {
        Ok(path) => EngineConfig::from_json_file(path),
        Err(_) => Ok(EngineConfig::default()),
    }
}

fn describe(customer: &str, outcome: &ProfileOutcome) {
    match outcome {
        ProfileOutcome::Published(profile) => println!(
            "{}: final adjusted FCF {:.2} (EWMA {:.2}, outlier impact {:.2}, {} months)",
            customer,
            profile.final_adjusted_fcf,
            profile.ewma_predicted_fcf,
            profile.current_month_outlier_impact,
            profile.months_analyzed
        ),
        ProfileOutcome::NoTransactions => println!("{}: no transactions found", customer),
        ProfileOutcome::InsufficientData { months_available } => println!(
            "{}: not enough history ({} completed months)",
            customer, months_available
        ),
        ProfileOutcome::PublishFailed(reason) => {
            println!("{}: profile could not be saved: {}", customer, reason)
        }
    }
}

async fn on_demand<T: TransactionSource, S: DocumentStore>(
    source: &T,
    store: &S,
    config: &EngineConfig,
    customer_ids: &[String],
) {
    for external_id in customer_ids {
        match sync_and_profile_customer(source, store, config, external_id, Utc::now()).await {
            Ok(Some((internal_id, outcome))) => describe(&internal_id, &outcome),
            Ok(None) => println!("{}: not found upstream", external_id),
            Err(e) => error!("Sync failed for {}: {}", external_id, e),
        }
    }
}

async fn nightly<T: TransactionSource, S: DocumentStore>(
    source: &T,
    store: &S,
    config: &EngineConfig,
) -> cash_flow_profile::Result<()> {
    // The store is process-local, so register the customers to track first.
    let ingestor = Ingestor::new(store, &config.collections);
    let tracked: Vec<String> = env::var("FCF_CUSTOMERS")
        .map(|s| {
            s.split(',')
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty())
                .collect()
        })
        .unwrap_or_default();

    for external_id in &tracked {
        match source.customer(external_id).await? {
            Some(customer) => {
                ingestor.sync(&config.collections.users, &customer, &Document::new())?;
            }
            None => info!("Tracked customer {} not found upstream", external_id),
        }
    }

    let report = run_nightly_job(source, store, config, Utc::now()).await?;
    for (customer, outcome) in &report.outcomes {
        describe(customer, outcome);
    }
    println!(
        "Successfully analyzed: {} | Failed or skipped: {}",
        report.succeeded, report.failed
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    env_logger::init();

    let config = load_config()?;
    config.validate()?;
    let store = InMemoryStore::new();
    let args: Vec<String> = env::args().skip(1).collect();

    if args.first().map(String::as_str) == Some("demo") {
        let history = HistoryGenerator::new().generate(Utc::now().date_naive());
        info!(
            "Generated {} synthetic transactions for {}",
            history.transaction_count(),
            history.customer_id()
        );
        on_demand(&history, &store, &config, &[history.customer_id().to_string()]).await;

        let engine = ProfileEngine::new(&store, &config)?;
        if let Some(record) = store.scan(&config.collections.users)?.first() {
            if let Some(fcf) = engine.approval_fcf(&record.key)? {
                println!("Affordability figure for {}: {:.2}", record.key, fcf);
            }
            let recent = TransactionRepository::new(&store, &config).recent_transactions(
                &record.key,
                Utc::now().date_naive(),
                RECENT_WINDOW_MONTHS,
            )?;
            println!(
                "{} transactions in the last {} months",
                recent.len(),
                RECENT_WINDOW_MONTHS
            );
        }
        return Ok(());
    }

    let base_url =
        env::var("TRANSACTION_SOURCE_URL").unwrap_or_else(|_| DEFAULT_SOURCE_URL.to_string());
    let api_key = env::var("TRANSACTION_SOURCE_KEY")?;
    let source = HttpTransactionSource::new(
        base_url,
        api_key,
        Duration::from_secs(config.request_timeout_secs),
    )?;

    match args.first().map(String::as_str) {
        Some("customer") => on_demand(&source, &store, &config, &args[1..]).await,
        _ => nightly(&source, &store, &config).await?,
    }

    Ok(())
}
