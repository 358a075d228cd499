use crate::config::{CollectionNames, EngineConfig};
use crate::schema::{Document, MonthlyBucket, StoredRecord, Transaction, TransactionKind};
use crate::utils::{get_month_ends_in_period, is_same_month, month_end, parse_flexible_date};
use chrono::NaiveDate;
use log::{debug, info};
use serde_json::Value;
use std::collections::BTreeMap;

pub type MonthlySeries = BTreeMap<NaiveDate, MonthlyBucket>;

/// Ordered date fields tried on each record; the first one that parses wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateFieldChain {
    fields: Vec<String>,
}

impl Default for DateFieldChain {
    fn default() -> Self {
        Self::new(["purchase_date", "transaction_date", "payment_date"])
    }
}

impl DateFieldChain {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn resolve(&self, document: &Document) -> Option<NaiveDate> {
        self.fields.iter().find_map(|field| {
            document
                .get(field)
                .and_then(Value::as_str)
                .and_then(parse_flexible_date)
        })
    }
}

/// Completed months handed to the forecaster, plus the partial current
/// month when it was cut off the end of the series.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalSeries {
    pub buckets: Vec<MonthlyBucket>,
    pub excluded_current: Option<MonthlyBucket>,
}

impl HistoricalSeries {
    pub fn income_series(&self) -> Vec<f64> {
        self.buckets.iter().map(|b| b.income_total).collect()
    }

    pub fn expense_series(&self) -> Vec<f64> {
        self.buckets.iter().map(|b| b.expense_total).collect()
    }

    pub fn fcf_series(&self) -> Vec<f64> {
        self.buckets.iter().map(MonthlyBucket::free_cash_flow).collect()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Aggregation {
    Ready(HistoricalSeries),
    /// Fewer completed months than a forecast needs.
    InsufficientData { months_available: usize },
}

pub struct MonthlyAggregator {
    date_chain: DateFieldChain,
    min_history_months: usize,
    names: CollectionNames,
}

impl MonthlyAggregator {
    pub fn new(date_chain: DateFieldChain, min_history_months: usize) -> Self {
        Self {
            date_chain,
            min_history_months,
            names: CollectionNames::default(),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            date_chain: DateFieldChain::default(),
            min_history_months: config.min_history_months,
            names: config.collections.clone(),
        }
    }

    pub fn with_date_chain(mut self, date_chain: DateFieldChain) -> Self {
        self.date_chain = date_chain;
        self
    }

    /// Turns stored documents into typed transactions. Records without a
    /// parsable date are skipped. A dated record with an unknown `type` or
    /// an unusable amount is kept as `TransactionKind::Other`.
    pub fn resolve(&self, records: &[StoredRecord]) -> Vec<Transaction> {
        let resolved: Vec<Transaction> = records
            .iter()
            .filter_map(|record| self.resolve_one(record))
            .collect();

        if resolved.len() < records.len() {
            debug!(
                "Dropped {} of {} records that could not be resolved",
                records.len() - resolved.len(),
                records.len()
            );
        }
        resolved
    }

    fn resolve_one(&self, record: &StoredRecord) -> Option<Transaction> {
        let doc = &record.document;
        let occurred_on = self.date_chain.resolve(doc)?;
        let kind = doc
            .get("type")
            .and_then(Value::as_str)
            .and_then(TransactionKind::from_source_type);
        let (kind, amount) = match (kind, parse_amount(doc.get("amount"))) {
            (Some(kind), Some(amount)) => (kind, amount),
            (_, amount) => (TransactionKind::Other, amount.unwrap_or(0.0)),
        };

        Some(Transaction {
            internal_id: record.key.clone(),
            external_id: doc
                .get(&self.names.external_id_field)
                .and_then(Value::as_str)
                .map(str::to_string),
            customer_internal_id: doc
                .get(&self.names.customer_ref_field)
                .and_then(Value::as_str)
                .map(str::to_string),
            kind,
            amount,
            occurred_on,
        })
    }

    /// Buckets transactions by month, zero-filling every month between the
    /// earliest and latest transaction of any kind.
    pub fn bucket(&self, transactions: &[Transaction]) -> MonthlySeries {
        let (Some(start), Some(end)) = (
            transactions.iter().map(|t| t.occurred_on).min(),
            transactions.iter().map(|t| t.occurred_on).max(),
        ) else {
            return BTreeMap::new();
        };

        let mut series: MonthlySeries = get_month_ends_in_period(start, end)
            .into_iter()
            .map(|month| (month, MonthlyBucket::empty(month)))
            .collect();

        for txn in transactions {
            if let Some(bucket) = series.get_mut(&month_end(txn.occurred_on)) {
                match txn.kind {
                    TransactionKind::Income => bucket.income_total += txn.amount,
                    TransactionKind::Expense => bucket.expense_total += txn.amount,
                    TransactionKind::Other => {}
                }
            }
        }

        series
    }

    /// Buckets `transactions` and drops the trailing bucket when it is the
    /// month containing `today`.
    pub fn aggregate(&self, transactions: &[Transaction], today: NaiveDate) -> Aggregation {
        let mut buckets: Vec<MonthlyBucket> = self.bucket(transactions).into_values().collect();

        let excluded_current = match buckets.last() {
            Some(last) if is_same_month(last.month, today) => {
                info!(
                    "Excluding partial data for {} from historical analysis",
                    today.format("%Y-%m")
                );
                buckets.pop()
            }
            _ => None,
        };

        if buckets.len() < self.min_history_months {
            return Aggregation::InsufficientData {
                months_available: buckets.len(),
            };
        }

        Aggregation::Ready(HistoricalSeries {
            buckets,
            excluded_current,
        })
    }
}

/// Transactions dated in the calendar month containing `today`.
pub fn current_month_transactions(
    transactions: &[Transaction],
    today: NaiveDate,
) -> Vec<&Transaction> {
    transactions
        .iter()
        .filter(|t| is_same_month(t.occurred_on, today))
        .collect()
}

fn parse_amount(value: Option<&Value>) -> Option<f64> {
    let amount = match value {
        None | Some(Value::Null) => 0.0,
        Some(Value::Number(n)) => n.as_f64()?,
        Some(Value::String(s)) => s.trim().parse::<f64>().ok()?,
        Some(_) => return None,
    };
    (amount.is_finite() && amount >= 0.0).then_some(amount)
}
