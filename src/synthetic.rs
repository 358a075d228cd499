//! Generates a believable year of upstream records for one customer, for
//! demos and tests that should not depend on a live source.

use crate::error::Result;
use crate::schema::{round_cents, Document, SourceFeed};
use crate::source::TransactionSource;
use chrono::{Datelike, Days, Months, NaiveDate, Weekday};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal, Uniform};
use serde_json::{json, Value};
use std::collections::HashMap;

const MERCHANTS: [&str; 6] = [
    "57cf75cea73e494d8675ec49",
    "57cf75cea73e494d8675ec4a",
    "57cf75cea73e494d8675ec4b",
    "57cf75cea73e494d8675ec4c",
    "57cf75cea73e494d8675ec4d",
    "57cf75cea73e494d8675ec4e",
];

const DISCRETIONARY: [&str; 9] = [
    "Gas",
    "Dinner Out",
    "Online Shopping",
    "Coffee",
    "Movie Tickets",
    "Lunch with Friends",
    "Clothing",
    "Pharmacy",
    "Convenience Store",
];

#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticHistory {
    pub customer: Document,
    pub account: Document,
    pub feeds: HashMap<SourceFeed, Vec<Document>>,
}

impl SyntheticHistory {
    pub fn customer_id(&self) -> &str {
        self.customer.get("_id").and_then(Value::as_str).unwrap_or_default()
    }

    pub fn account_id(&self) -> &str {
        self.account.get("_id").and_then(Value::as_str).unwrap_or_default()
    }

    pub fn transaction_count(&self) -> usize {
        self.feeds.values().map(Vec::len).sum()
    }
}

impl TransactionSource for SyntheticHistory {
    async fn customer(&self, customer_id: &str) -> Result<Option<Document>> {
        Ok((customer_id == self.customer_id()).then(|| self.customer.clone()))
    }

    async fn customer_accounts(&self, customer_id: &str) -> Result<Option<Vec<Document>>> {
        Ok((customer_id == self.customer_id()).then(|| vec![self.account.clone()]))
    }

    async fn accounts(&self) -> Result<Option<Vec<Document>>> {
        Ok(Some(vec![self.account.clone()]))
    }

    async fn account_feed(&self, account_id: &str, feed: SourceFeed) -> Result<Option<Vec<Document>>> {
        if account_id != self.account_id() {
            return Ok(None);
        }
        Ok(Some(self.feeds.get(&feed).cloned().unwrap_or_default()))
    }
}

pub struct HistoryGenerator {
    rng: StdRng,
    hourly_wage: f64,
    tax_rate: f64,
    discretionary_purchases: usize,
    next_id: u64,
}

impl HistoryGenerator {
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    pub fn seeded(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            rng,
            hourly_wage: 20.0,
            tax_rate: 0.22,
            discretionary_purchases: 80,
            next_id: 0,
        }
    }

    pub fn with_hourly_wage(mut self, hourly_wage: f64) -> Self {
        self.hourly_wage = hourly_wage;
        self
    }

    fn id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{:05}", prefix, self.next_id)
    }

    /// One year of activity ending on `end`.
    pub fn generate(&mut self, end: NaiveDate) -> SyntheticHistory {
        let start = end.checked_sub_months(Months::new(12)).unwrap_or(end);
        let customer_id = self.id("cust");
        let account_id = self.id("acct");

        let customer = to_document(json!({
            "_id": customer_id,
            "first_name": "Jane",
            "last_name": "Smith",
            "address": { "city": "Smalltown", "state": "TX", "zip": "67890" }
        }));
        let account = to_document(json!({
            "_id": account_id,
            "customer_id": customer_id,
            "type": "Checking",
            "nickname": "Main Checking",
            "balance": 1000,
            "rewards": 0
        }));

        let mut feeds: HashMap<SourceFeed, Vec<Document>> = HashMap::new();
        for (feed, record) in self.paychecks(start, end) {
            feeds.entry(feed).or_default().push(record);
        }
        for (feed, record) in self.monthly_bills(start, end) {
            feeds.entry(feed).or_default().push(record);
        }
        for (feed, record) in self.groceries(start, end) {
            feeds.entry(feed).or_default().push(record);
        }
        for (feed, record) in self.discretionary(start, end) {
            feeds.entry(feed).or_default().push(record);
        }

        SyntheticHistory {
            customer,
            account,
            feeds,
        }
    }

    /// Biweekly net pay for two weeks of variable hours, every other Friday.
    fn paychecks(&mut self, start: NaiveDate, end: NaiveDate) -> Vec<(SourceFeed, Document)> {
        let hours = Uniform::new_inclusive(33.0, 50.0);
        let mut records = Vec::new();
        let mut date = next_weekday(start, Weekday::Fri);
        while date <= end {
            let gross = (hours.sample(&mut self.rng) + hours.sample(&mut self.rng)) * self.hourly_wage;
            let net = round_cents(gross * (1.0 - self.tax_rate));
            let id = self.id("dep");
            records.push(self.record(SourceFeed::Deposit, id, net, "Paycheck Deposit", date));
            date = match date.checked_add_days(Days::new(14)) {
                Some(next) => next,
                None => break,
            };
        }
        records
    }

    fn monthly_bills(&mut self, start: NaiveDate, end: NaiveDate) -> Vec<(SourceFeed, Document)> {
        let utilities = Normal::<f64>::new(175.0, 35.0).ok();
        let mut records = Vec::new();

        for offset in 0..=12 {
            let Some(month) = start.checked_add_months(Months::new(offset)) else {
                continue;
            };
            let on_day = |day: u32| month.with_day(day).filter(|d| *d >= start && *d <= end);

            if let Some(date) = on_day(1) {
                let id = self.id("wdr");
                records.push(self.record(SourceFeed::Withdrawal, id, 1200.0, "Monthly Rent Payment", date));
            }
            if let Some(date) = on_day(5) {
                let id = self.id("wdr");
                records.push(self.record(SourceFeed::Withdrawal, id, 485.75, "Auto Loan Payment", date));
            }
            if let Some(date) = on_day(10) {
                let id = self.id("pur");
                records.push(self.record(SourceFeed::Purchase, id, 155.25, "Car Insurance", date));
            }
            if let Some(date) = on_day(15) {
                for (service, amount) in [("Netflix", 15.49), ("Spotify Premium", 10.99)] {
                    let id = self.id("pur");
                    let description = format!("{} Subscription", service);
                    records.push(self.record(SourceFeed::Purchase, id, amount, &description, date));
                }
            }
            if let Some(date) = on_day(20) {
                let amount = utilities
                    .map(|dist| dist.sample(&mut self.rng))
                    .unwrap_or(175.0)
                    .clamp(100.0, 250.0);
                let id = self.id("pur");
                records.push(self.record(SourceFeed::Purchase, id, round_cents(amount), "Gas & Electric Bill", date));
            }
        }
        records
    }

    fn groceries(&mut self, start: NaiveDate, end: NaiveDate) -> Vec<(SourceFeed, Document)> {
        let spend = Uniform::new_inclusive(70.0, 150.0);
        let mut records = Vec::new();
        let mut date = next_weekday(start, Weekday::Sun);
        while date <= end {
            let amount = round_cents(spend.sample(&mut self.rng));
            let id = self.id("pur");
            records.push(self.record(SourceFeed::Purchase, id, amount, "Groceries", date));
            date = match date.checked_add_days(Days::new(7)) {
                Some(next) => next,
                None => break,
            };
        }
        records
    }

    fn discretionary(&mut self, start: NaiveDate, end: NaiveDate) -> Vec<(SourceFeed, Document)> {
        let span_days = (end - start).num_days().max(0) as u64;
        let spend = Uniform::new_inclusive(5.0, 150.0);
        let mut records = Vec::new();

        for _ in 0..self.discretionary_purchases {
            let Some(date) = start.checked_add_days(Days::new(self.rng.gen_range(0..=span_days))) else {
                continue;
            };
            let amount = round_cents(spend.sample(&mut self.rng));
            let description = DISCRETIONARY.choose(&mut self.rng).copied().unwrap_or("Shopping");
            let id = self.id("pur");
            records.push(self.record(SourceFeed::Purchase, id, amount, description, date));
        }
        records
    }

    fn record(
        &mut self,
        feed: SourceFeed,
        id: String,
        amount: f64,
        description: &str,
        date: NaiveDate,
    ) -> (SourceFeed, Document) {
        let date = date.format("%Y-%m-%d").to_string();
        let mut record = to_document(json!({
            "_id": id,
            "medium": "balance",
            "amount": amount,
            "description": description,
            "status": "executed"
        }));
        match feed {
            SourceFeed::Purchase => {
                let merchant = MERCHANTS.choose(&mut self.rng).copied().unwrap_or(MERCHANTS[0]);
                record.insert("merchant_id".to_string(), json!(merchant));
                record.insert("purchase_date".to_string(), json!(date));
            }
            SourceFeed::Deposit | SourceFeed::Withdrawal => {
                record.insert("transaction_date".to_string(), json!(date));
            }
        }
        (feed, record)
    }
}

impl Default for HistoryGenerator {
    fn default() -> Self {
        Self::new()
    }
}

fn next_weekday(from: NaiveDate, weekday: Weekday) -> NaiveDate {
    let ahead = (7 + weekday.num_days_from_monday() - from.weekday().num_days_from_monday()) % 7;
    from.checked_add_days(Days::new(ahead as u64)).unwrap_or(from)
}

fn to_document(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        _ => Document::new(),
    }
}
