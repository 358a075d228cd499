use crate::aggregator::DateFieldChain;
use crate::config::EngineConfig;
use crate::error::{ProfileError, Result};
use crate::schema::StoredRecord;
use crate::store::DocumentStore;
use crate::utils::months_before;
use chrono::NaiveDate;
use log::{debug, error, warn};
use serde_json::Value;

/// Read-only view over a customer's stored transactions.
pub struct TransactionRepository<'a, S: DocumentStore> {
    store: &'a S,
    config: &'a EngineConfig,
    date_chain: DateFieldChain,
}

impl<'a, S: DocumentStore> TransactionRepository<'a, S> {
    pub fn new(store: &'a S, config: &'a EngineConfig) -> Self {
        Self {
            store,
            config,
            date_chain: DateFieldChain::default(),
        }
    }

    /// Every stored transaction of the customer, across all their accounts.
    ///
    /// Fails open: no accounts, too many accounts, and store errors all
    /// yield an empty list, so "empty" can also mean "lookup failed".
    pub fn transactions_for(&self, customer_internal_id: &str) -> Vec<StoredRecord> {
        match self.try_transactions_for(customer_internal_id) {
            Ok(records) => records,
            Err(e) => {
                error!(
                    "Could not fetch transactions for {}: {}",
                    customer_internal_id, e
                );
                Vec::new()
            }
        }
    }

    fn try_transactions_for(&self, customer_internal_id: &str) -> Result<Vec<StoredRecord>> {
        let accounts = self.accounts_of(customer_internal_id)?;
        if accounts.is_empty() {
            return Ok(Vec::new());
        }

        let cap = self.config.max_accounts_per_lookup;
        if accounts.len() > cap {
            warn!(
                "Customer {} has {} accounts, more than the {} a single lookup supports. Skipping.",
                customer_internal_id,
                accounts.len(),
                cap
            );
            return Ok(Vec::new());
        }

        self.owned_transactions(customer_internal_id)
    }

    /// The customer's accounts, for request-time lookups that must not fail
    /// open. An unknown customer is `CustomerNotFound`; more accounts than
    /// `max_accounts_per_lookup` is `AccountCapExceeded`.
    pub fn customer_accounts(&self, customer_internal_id: &str) -> Result<Vec<StoredRecord>> {
        let users = &self.config.collections.users;
        if self.store.get(users, customer_internal_id)?.is_none() {
            return Err(ProfileError::CustomerNotFound(
                customer_internal_id.to_string(),
            ));
        }

        let accounts = self.accounts_of(customer_internal_id)?;
        let cap = self.config.max_accounts_per_lookup;
        if accounts.len() > cap {
            return Err(ProfileError::AccountCapExceeded {
                customer: customer_internal_id.to_string(),
                accounts: accounts.len(),
                cap,
            });
        }
        Ok(accounts)
    }

    /// Transactions dated on or after the same day `months` months before
    /// `today`, oldest first. Checks the customer like `customer_accounts`;
    /// a customer without accounts has no recent transactions.
    pub fn recent_transactions(
        &self,
        customer_internal_id: &str,
        today: NaiveDate,
        months: u32,
    ) -> Result<Vec<StoredRecord>> {
        if self.customer_accounts(customer_internal_id)?.is_empty() {
            return Ok(Vec::new());
        }

        let since = months_before(today, months);
        let mut dated: Vec<(NaiveDate, StoredRecord)> = self
            .owned_transactions(customer_internal_id)?
            .into_iter()
            .filter_map(|record| {
                let occurred_on = self.date_chain.resolve(&record.document)?;
                (occurred_on >= since).then_some((occurred_on, record))
            })
            .collect();
        dated.sort_by_key(|(occurred_on, _)| *occurred_on);

        debug!(
            "{} transactions for {} since {}",
            dated.len(),
            customer_internal_id,
            since
        );
        Ok(dated.into_iter().map(|(_, record)| record).collect())
    }

    fn accounts_of(&self, customer_internal_id: &str) -> Result<Vec<StoredRecord>> {
        let names = &self.config.collections;
        self.store.find_by_field(
            &names.accounts,
            &names.customer_ref_field,
            &Value::String(customer_internal_id.to_string()),
        )
    }

    fn owned_transactions(&self, customer_internal_id: &str) -> Result<Vec<StoredRecord>> {
        let names = &self.config.collections;
        self.store.find_by_field(
            &names.transactions,
            &names.customer_ref_field,
            &Value::String(customer_internal_id.to_string()),
        )
    }
}
