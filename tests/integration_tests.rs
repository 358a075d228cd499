use anyhow::Result;
use cash_flow_profile::*;
use chrono::{NaiveDate, TimeZone, Utc};
use serde_json::{json, Value};

fn doc(value: Value) -> Document {
    value.as_object().unwrap().clone()
}

fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Registers a customer with `accounts` accounts and the given
/// `(type, amount, date)` transactions, returning the internal customer id.
fn seed_customer(
    store: &InMemoryStore,
    config: &EngineConfig,
    external_id: &str,
    accounts: usize,
    transactions: &[(&str, f64, &str)],
) -> Result<String> {
    let names = &config.collections;
    let ingestor = Ingestor::new(store, names);
    let customer = ingestor.sync(&names.users, &doc(json!({ "_id": external_id })), &Document::new())?;
    let owner = ingestor.owner_fields(&customer);

    for i in 0..accounts {
        ingestor.sync(
            &names.accounts,
            &doc(json!({ "_id": format!("{}-acct-{}", external_id, i) })),
            &owner,
        )?;
    }

    for (i, (kind, amount, date)) in transactions.iter().enumerate() {
        let date_field = if *kind == "purchase" {
            "purchase_date"
        } else {
            "transaction_date"
        };
        let mut record = doc(json!({
            "_id": format!("{}-txn-{}", external_id, i),
            "type": kind,
            "amount": amount
        }));
        record.insert(date_field.to_string(), json!(date));
        ingestor.sync(&names.transactions, &record, &owner)?;
    }

    Ok(customer)
}

#[test]
fn test_ingestion_idempotence() -> Result<()> {
    let store = InMemoryStore::new();
    let names = CollectionNames::default();
    let ingestor = Ingestor::new(&store, &names);
    let record = doc(json!({ "_id": "txn-42", "type": "deposit", "amount": 10.0 }));

    let first = ingestor.sync("transactions", &record, &Document::new())?;
    let second = ingestor.sync("transactions", &record, &Document::new())?;

    assert_eq!(first, second);
    assert_eq!(store.len("transactions"), 1);
    Ok(())
}

#[test]
fn test_monthly_contiguity() {
    let aggregator = MonthlyAggregator::new(DateFieldChain::default(), 2);
    let records: Vec<StoredRecord> = [
        ("deposit", "2023-01-15"),
        ("purchase", "2023-06-02"),
        ("withdrawal", "2023-09-30"),
    ]
    .iter()
    .enumerate()
    .map(|(i, (kind, date))| StoredRecord {
        key: format!("k{}", i),
        document: doc(json!({ "type": kind, "amount": 10.0, "transaction_date": date })),
    })
    .collect();

    let transactions = aggregator.resolve(&records);
    let series = aggregator.bucket(&transactions);

    assert_eq!(series.len(), 9);
    let months: Vec<NaiveDate> = series.keys().copied().collect();
    for pair in months.windows(2) {
        assert_eq!(next_month_end(pair[0]), pair[1]);
    }
    assert_eq!(series[&ymd(2023, 3, 31)].income_total, 0.0);
    assert_eq!(series[&ymd(2023, 3, 31)].expense_total, 0.0);
}

#[test]
fn test_constant_cash_flow_profile() -> Result<()> {
    let store = InMemoryStore::new();
    let config = EngineConfig::default();
    let customer = seed_customer(
        &store,
        &config,
        "steady",
        1,
        &[
            ("deposit", 1000.0, "2024-01-02"),
            ("purchase", 800.0, "2024-01-12"),
            ("deposit", 1000.0, "2024-02-02"),
            ("purchase", 800.0, "2024-02-12"),
            ("deposit", 1000.0, "2024-03-02"),
            ("withdrawal", 800.0, "2024-03-12"),
        ],
    )?;

    let now = Utc.with_ymd_and_hms(2024, 4, 20, 2, 0, 0).unwrap();
    let outcome = ProfileEngine::new(&store, &config)?.process_customer(&customer, now);

    let ProfileOutcome::Published(profile) = outcome else {
        panic!("expected a published profile, got {:?}", outcome);
    };
    assert_eq!(profile.ewma_predicted_fcf, 200.0);
    assert_eq!(profile.mean_free_cash_flow, 200.0);
    assert_eq!(profile.std_dev_free_cash_flow, 0.0);
    assert_eq!(profile.months_analyzed, 3);
    assert_eq!(profile.current_month_outlier_impact, 0.0);
    assert_eq!(profile.final_adjusted_fcf, 200.0);
    assert_eq!(profile.last_updated_utc, now);
    Ok(())
}

#[test]
fn test_current_month_never_counts_as_history() -> Result<()> {
    let store = InMemoryStore::new();
    let config = EngineConfig::default();
    let customer = seed_customer(
        &store,
        &config,
        "partial",
        1,
        &[
            ("deposit", 1000.0, "2024-02-02"),
            ("deposit", 1000.0, "2024-03-02"),
            ("deposit", 1000.0, "2024-04-02"),
            ("purchase", 10.0, "2024-04-03"),
        ],
    )?;

    let now = Utc.with_ymd_and_hms(2024, 4, 20, 2, 0, 0).unwrap();
    let outcome = ProfileEngine::new(&store, &config)?.process_customer(&customer, now);
    let ProfileOutcome::Published(profile) = outcome else {
        panic!("expected a published profile, got {:?}", outcome);
    };
    assert_eq!(profile.months_analyzed, 2);
    Ok(())
}

#[test]
fn test_outlier_amortization_end_to_end() -> Result<()> {
    let store = InMemoryStore::new();
    let config = EngineConfig::default();
    let customer = seed_customer(
        &store,
        &config,
        "spender",
        2,
        &[
            ("deposit", 1000.0, "2024-01-01"),
            ("purchase", 500.0, "2024-01-15"),
            ("deposit", 1000.0, "2024-02-01"),
            ("purchase", 520.0, "2024-02-15"),
            ("deposit", 1000.0, "2024-03-01"),
            ("purchase", 480.0, "2024-03-15"),
            ("deposit", 1000.0, "2024-04-01"),
            ("withdrawal", 510.0, "2024-04-15"),
            ("purchase", 1000.0, "2024-05-03"),
        ],
    )?;

    let now = Utc.with_ymd_and_hms(2024, 5, 10, 2, 0, 0).unwrap();
    let engine = ProfileEngine::new(&store, &config)?;
    let ProfileOutcome::Published(profile) = engine.process_customer(&customer, now) else {
        panic!("expected a published profile");
    };

    // fcf = [500, 480, 520, 490]; ewma(span 3) = 497.5
    assert_eq!(profile.ewma_predicted_fcf, 497.5);
    assert_eq!(profile.current_month_outlier_impact, 333.33);
    assert_eq!(profile.final_adjusted_fcf, 164.17);
    assert_eq!(profile.months_analyzed, 4);

    let publisher = ProfilePublisher::new(&store, &config.collections.profiles);
    assert_eq!(publisher.final_adjusted_fcf_for(&customer)?, Some(164.17));
    Ok(())
}

#[test]
fn test_no_outlier_passthrough() -> Result<()> {
    let store = InMemoryStore::new();
    let config = EngineConfig::default();
    let customer = seed_customer(
        &store,
        &config,
        "frugal",
        1,
        &[
            ("deposit", 1000.0, "2024-01-01"),
            ("purchase", 500.0, "2024-01-15"),
            ("deposit", 1000.0, "2024-02-01"),
            ("purchase", 520.0, "2024-02-15"),
            ("deposit", 1000.0, "2024-03-01"),
            ("purchase", 480.0, "2024-03-15"),
            ("purchase", 530.0, "2024-04-02"),
        ],
    )?;

    let now = Utc.with_ymd_and_hms(2024, 4, 10, 2, 0, 0).unwrap();
    let ProfileOutcome::Published(profile) =
        ProfileEngine::new(&store, &config)?.process_customer(&customer, now)
    else {
        panic!("expected a published profile");
    };
    assert_eq!(profile.current_month_outlier_impact, 0.0);
    assert_eq!(profile.final_adjusted_fcf, profile.ewma_predicted_fcf);
    Ok(())
}

#[test]
fn test_only_current_month_produces_no_profile() -> Result<()> {
    let store = InMemoryStore::new();
    let config = EngineConfig::default();
    let customer = seed_customer(
        &store,
        &config,
        "brand-new",
        1,
        &[("deposit", 1000.0, "2024-04-02"), ("purchase", 5000.0, "2024-04-05")],
    )?;

    let now = Utc.with_ymd_and_hms(2024, 4, 10, 2, 0, 0).unwrap();
    let outcome = ProfileEngine::new(&store, &config)?.process_customer(&customer, now);

    assert_eq!(outcome, ProfileOutcome::InsufficientData { months_available: 0 });
    assert!(store.is_empty(&config.collections.profiles));
    Ok(())
}

#[test]
fn test_account_cap_boundary() -> Result<()> {
    let store = InMemoryStore::new();
    let config = EngineConfig::default();
    let history = [
        ("deposit", 900.0, "2024-01-02"),
        ("deposit", 900.0, "2024-02-02"),
    ];
    let at_cap = seed_customer(&store, &config, "thirty", 30, &history)?;
    let over_cap = seed_customer(&store, &config, "thirty-one", 31, &history)?;

    let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    let report = ProfileEngine::new(&store, &config)?.run_batch([&at_cap, &over_cap], now);

    assert!(report.outcomes[0].1.is_success());
    assert_eq!(report.outcomes[1].1, ProfileOutcome::NoTransactions);
    assert_eq!((report.succeeded, report.failed), (1, 1));
    Ok(())
}

#[test]
fn test_configurable_account_cap() -> Result<()> {
    let store = InMemoryStore::new();
    let config = EngineConfig::from_json_str(r#"{ "max_accounts_per_lookup": 40 }"#)?;
    let customer = seed_customer(
        &store,
        &config,
        "many",
        31,
        &[("deposit", 1.0, "2024-01-02"), ("deposit", 1.0, "2024-02-02")],
    )?;

    let repo = TransactionRepository::new(&store, &config);
    assert_eq!(repo.transactions_for(&customer).len(), 2);
    Ok(())
}

#[test]
fn test_unrecognized_kinds_still_stretch_the_history() -> Result<()> {
    let store = InMemoryStore::new();
    let config = EngineConfig::default();
    let customer = seed_customer(
        &store,
        &config,
        "mover",
        1,
        &[
            ("deposit", 1000.0, "2024-01-05"),
            ("deposit", 1000.0, "2024-02-05"),
            ("transfer", 400.0, "2024-03-05"),
        ],
    )?;

    let now = Utc.with_ymd_and_hms(2024, 5, 10, 2, 0, 0).unwrap();
    let ProfileOutcome::Published(profile) =
        ProfileEngine::new(&store, &config)?.process_customer(&customer, now)
    else {
        panic!("expected a published profile");
    };

    // fcf = [1000, 1000, 0]
    assert_eq!(profile.months_analyzed, 3);
    assert_eq!(profile.ewma_predicted_fcf, 500.0);
    assert_eq!(profile.mean_free_cash_flow, 666.67);
    Ok(())
}

#[test]
fn test_request_time_lookups() -> Result<()> {
    let store = InMemoryStore::new();
    let config = EngineConfig::default();
    let customer = seed_customer(
        &store,
        &config,
        "regular",
        2,
        &[
            ("deposit", 1000.0, "2024-01-02"),
            ("purchase", 300.0, "2024-01-20"),
            ("deposit", 1000.0, "2024-02-02"),
            ("purchase", 300.0, "2024-02-20"),
            ("deposit", 1000.0, "2024-03-02"),
            ("purchase", 300.0, "2024-03-20"),
            ("purchase", 42.0, "2024-04-03"),
        ],
    )?;
    let crowded = seed_customer(&store, &config, "crowded", 31, &[])?;

    let now = Utc.with_ymd_and_hms(2024, 4, 10, 2, 0, 0).unwrap();
    let engine = ProfileEngine::new(&store, &config)?;
    assert_eq!(engine.approval_fcf(&customer)?, None);
    assert!(engine.process_customer(&customer, now).is_success());
    assert_eq!(engine.approval_fcf(&customer)?, Some(700.0));

    let repo = TransactionRepository::new(&store, &config);
    let recent = repo.recent_transactions(&customer, now.date_naive(), 1)?;
    let amounts: Vec<f64> = recent
        .iter()
        .filter_map(|r| r.document["amount"].as_f64())
        .collect();
    assert_eq!(amounts, vec![300.0, 42.0]);

    assert!(matches!(
        engine.approval_fcf("nobody"),
        Err(ProfileError::CustomerNotFound(_))
    ));
    assert!(matches!(
        repo.recent_transactions(&crowded, now.date_naive(), 3),
        Err(ProfileError::AccountCapExceeded { .. })
    ));
    Ok(())
}

#[tokio::test]
async fn test_synthetic_year_end_to_end() -> Result<()> {
    let today = ymd(2024, 6, 15);
    let history = HistoryGenerator::seeded(42).generate(today);
    let store = InMemoryStore::new();
    let config = EngineConfig::default();
    let now = Utc.from_utc_datetime(&today.and_hms_opt(6, 0, 0).unwrap());

    let (customer, outcome) =
        sync_and_profile_customer(&history, &store, &config, history.customer_id(), now)
            .await?
            .expect("the synthetic customer exists upstream");

    assert_eq!(store.len(&config.collections.transactions), history.transaction_count());
    let ProfileOutcome::Published(profile) = outcome else {
        panic!("expected a published profile, got {:?}", outcome);
    };
    assert!(profile.months_analyzed >= 12);
    assert!(profile.std_dev_free_cash_flow > 0.0);
    assert!(profile.final_adjusted_fcf <= profile.ewma_predicted_fcf);

    // A second run syncs nothing new and republishes the same figures.
    let (again, outcome) =
        sync_and_profile_customer(&history, &store, &config, history.customer_id(), now)
            .await?
            .expect("the synthetic customer exists upstream");
    assert_eq!(customer, again);
    assert_eq!(store.len(&config.collections.transactions), history.transaction_count());
    assert_eq!(outcome, ProfileOutcome::Published(profile));
    Ok(())
}

#[tokio::test]
async fn test_nightly_job_only_profiles_known_customers() -> Result<()> {
    let today = ymd(2024, 6, 15);
    let history = HistoryGenerator::seeded(9).generate(today);
    let store = InMemoryStore::new();
    let config = EngineConfig::default();
    let now = Utc.from_utc_datetime(&today.and_hms_opt(1, 0, 0).unwrap());

    let empty = run_nightly_job(&history, &store, &config, now).await?;
    assert_eq!(empty, BatchReport::default());
    assert!(store.is_empty(&config.collections.transactions));

    let ingestor = Ingestor::new(&store, &config.collections);
    let customer = ingestor.sync(&config.collections.users, &history.customer, &Document::new())?;

    let report = run_nightly_job(&history, &store, &config, now).await?;
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.outcomes[0].0, customer);
    assert!(store.get(&config.collections.profiles, &customer)?.is_some());
    Ok(())
}
