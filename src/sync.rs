use crate::config::EngineConfig;
use crate::error::{ProfileError, Result};
use crate::ingestion::Ingestor;
use crate::schema::Document;
use crate::source::TransactionSource;
use crate::store::DocumentStore;
use futures::stream::{self, StreamExt};
use log::{debug, error, info, warn};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub customer_internal_id: String,
    pub accounts_synced: usize,
    pub transactions_synced: usize,
    /// Records dropped because they carried no upstream id.
    pub records_skipped: usize,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct AccountTally {
    transactions: usize,
    skipped: usize,
}

/// Pulls one customer, their accounts and every transaction from the source
/// into the store. Returns `Ok(None)` when the source has no such customer.
pub async fn sync_customer<T, S>(
    source: &T,
    store: &S,
    config: &EngineConfig,
    external_customer_id: &str,
) -> Result<Option<SyncSummary>>
where
    T: TransactionSource,
    S: DocumentStore,
{
    info!("Starting targeted sync for upstream customer {}", external_customer_id);
    let names = &config.collections;
    let ingestor = Ingestor::new(store, names);

    let Some(customer) = source.customer(external_customer_id).await? else {
        warn!("Customer {} not found upstream", external_customer_id);
        return Ok(None);
    };
    let customer_internal_id = ingestor.sync(&names.users, &customer, &Document::new())?;

    let mut summary = SyncSummary {
        customer_internal_id: customer_internal_id.clone(),
        ..SyncSummary::default()
    };

    let accounts = source
        .customer_accounts(external_customer_id)
        .await?
        .unwrap_or_default();
    if accounts.is_empty() {
        info!("No accounts found for customer {}", external_customer_id);
        return Ok(Some(summary));
    }

    let fetched = fetch_account_transactions(source, config, accounts).await;
    for (account, transactions) in fetched {
        let tally = ingest_account(&ingestor, config, &account, transactions?, &customer_internal_id)?;
        summary.accounts_synced += 1;
        summary.transactions_synced += tally.transactions;
        summary.records_skipped += tally.skipped;
    }

    info!(
        "Targeted sync complete for {}: {} accounts, {} transactions",
        external_customer_id, summary.accounts_synced, summary.transactions_synced
    );
    Ok(Some(summary))
}

/// Syncs every upstream account whose owner is already a known customer.
///
/// Returns the internal ids of the customers touched. An account whose
/// transactions cannot be fetched or stored is logged and skipped.
pub async fn sync_known_customers<T, S>(
    source: &T,
    store: &S,
    config: &EngineConfig,
) -> Result<Vec<String>>
where
    T: TransactionSource,
    S: DocumentStore,
{
    let names = &config.collections;
    let ingestor = Ingestor::new(store, names);

    let known: HashMap<String, String> = store
        .scan(&names.users)?
        .into_iter()
        .filter_map(|record| {
            let external = record
                .document
                .get(&names.external_id_field)
                .and_then(Value::as_str)?
                .to_string();
            Some((external, record.key))
        })
        .collect();

    if known.is_empty() {
        info!("No existing customers found; nothing to sync");
        return Ok(Vec::new());
    }
    info!("Found {} existing customers to process", known.len());

    let Some(all_accounts) = source.accounts().await? else {
        warn!("Could not fetch accounts from the source; nothing to sync");
        return Ok(Vec::new());
    };

    let accounts: Vec<Document> = all_accounts
        .into_iter()
        .filter(|account| {
            account
                .get("customer_id")
                .and_then(Value::as_str)
                .is_some_and(|owner| known.contains_key(owner))
        })
        .collect();
    info!("Found {} accounts belonging to existing customers", accounts.len());

    let mut touched = BTreeSet::new();
    let fetched = fetch_account_transactions(source, config, accounts).await;
    for (account, transactions) in fetched {
        let Some(customer_internal_id) = account
            .get("customer_id")
            .and_then(Value::as_str)
            .and_then(|owner| known.get(owner))
        else {
            continue;
        };
        touched.insert(customer_internal_id.clone());

        let outcome = transactions.and_then(|transactions| {
            ingest_account(&ingestor, config, &account, transactions, customer_internal_id)
        });
        if let Err(e) = outcome {
            error!(
                "Could not sync account {} for customer {}: {}",
                account_label(&account, config),
                customer_internal_id,
                e
            );
        }
    }

    info!("Controlled sync complete for {} customers", touched.len());
    Ok(touched.into_iter().collect())
}

/// Fetches each account's transactions, at most `max_concurrent_fetches`
/// requests in flight, preserving account order.
async fn fetch_account_transactions<T: TransactionSource>(
    source: &T,
    config: &EngineConfig,
    accounts: Vec<Document>,
) -> Vec<(Document, Result<Vec<Document>>)> {
    let id_field = config.collections.source_id_field.as_str();
    stream::iter(accounts)
        .map(|account| async move {
            let transactions = match account.get(id_field).and_then(Value::as_str) {
                Some(account_id) => source.tagged_transactions(account_id).await,
                None => Err(ProfileError::MissingKey {
                    collection: config.collections.accounts.clone(),
                    field: id_field.to_string(),
                }),
            };
            (account, transactions)
        })
        .buffered(config.max_concurrent_fetches.max(1))
        .collect()
        .await
}

fn ingest_account<S: DocumentStore>(
    ingestor: &Ingestor<'_, S>,
    config: &EngineConfig,
    account: &Document,
    transactions: Vec<Document>,
    customer_internal_id: &str,
) -> Result<AccountTally> {
    let names = &config.collections;
    let owner = ingestor.owner_fields(customer_internal_id);
    ingestor.sync(&names.accounts, account, &owner)?;

    debug!(
        "Syncing {} transactions for account {}",
        transactions.len(),
        account_label(account, config)
    );

    let mut tally = AccountTally::default();
    for transaction in &transactions {
        match ingestor.sync(&names.transactions, transaction, &owner) {
            Ok(_) => tally.transactions += 1,
            Err(ProfileError::MissingKey { .. }) => {
                warn!("Skipping transaction without an upstream id");
                tally.skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(tally)
}

fn account_label(account: &Document, config: &EngineConfig) -> String {
    account
        .get(&config.collections.source_id_field)
        .and_then(Value::as_str)
        .unwrap_or("<unknown>")
        .to_string()
}
