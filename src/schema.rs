use chrono::{DateTime, NaiveDate, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A schemaless record as stored in, or fetched for, a document collection.
pub type Document = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Income,
    Expense,
    /// A dated record that counts toward neither series but still widens
    /// the month range.
    Other,
}

impl TransactionKind {
    /// Maps the source's transaction category onto a kind.
    /// Unknown categories yield `None`.
    pub fn from_source_type(source_type: &str) -> Option<Self> {
        match source_type.trim().to_ascii_lowercase().as_str() {
            "deposit" => Some(TransactionKind::Income),
            "purchase" | "withdrawal" => Some(TransactionKind::Expense),
            _ => None,
        }
    }
}

/// The transaction feeds the upstream source exposes per account.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SourceFeed {
    Deposit,
    Purchase,
    Withdrawal,
}

impl SourceFeed {
    pub const ALL: [SourceFeed; 3] = [
        SourceFeed::Deposit,
        SourceFeed::Purchase,
        SourceFeed::Withdrawal,
    ];

    /// Value written to the record's `type` field when it is ingested.
    pub fn type_tag(&self) -> &'static str {
        match self {
            SourceFeed::Deposit => "deposit",
            SourceFeed::Purchase => "purchase",
            SourceFeed::Withdrawal => "withdrawal",
        }
    }

    /// Path segment of the feed under `/accounts/{id}/`.
    pub fn endpoint(&self) -> &'static str {
        match self {
            SourceFeed::Deposit => "deposits",
            SourceFeed::Purchase => "purchases",
            SourceFeed::Withdrawal => "withdrawals",
        }
    }
}

/// A document together with the key the store assigned to it.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub key: String,
    pub document: Document,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub internal_id: String,
    pub external_id: Option<String>,
    pub customer_internal_id: Option<String>,
    pub kind: TransactionKind,
    pub amount: f64,
    /// Effective date used for monthly bucketing
    pub occurred_on: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonthlyBucket {
    /// Last calendar day of the month this bucket covers
    pub month: NaiveDate,
    pub income_total: f64,
    pub expense_total: f64,
}

impl MonthlyBucket {
    pub fn empty(month: NaiveDate) -> Self {
        Self {
            month,
            income_total: 0.0,
            expense_total: 0.0,
        }
    }

    pub fn free_cash_flow(&self) -> f64 {
        self.income_total - self.expense_total
    }
}

/// Forecast built from completed months only, before outlier adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaselineProfile {
    pub smoothed_fcf: f64,
    pub mean_fcf: f64,
    pub stddev_fcf: f64,
    pub months_analyzed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FinancialProfile {
    pub smoothed_fcf: f64,
    pub mean_fcf: f64,
    pub stddev_fcf: f64,
    pub months_analyzed: usize,
    pub outlier_impact: f64,
    pub final_adjusted_fcf: f64,
}

impl FinancialProfile {
    /// A profile whose forecast is the baseline, untouched.
    pub fn from_baseline(baseline: &BaselineProfile) -> Self {
        Self {
            smoothed_fcf: baseline.smoothed_fcf,
            mean_fcf: baseline.mean_fcf,
            stddev_fcf: baseline.stddev_fcf,
            months_analyzed: baseline.months_analyzed,
            outlier_impact: 0.0,
            final_adjusted_fcf: baseline.smoothed_fcf,
        }
    }
}

/// The document downstream consumers read from the profiles collection.
/// Field names and two-decimal rounding are a compatibility contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PublishedProfile {
    #[schemars(description = "Exponentially weighted (span 3) estimate of next month's free cash flow.")]
    pub ewma_predicted_fcf: f64,

    #[schemars(description = "Arithmetic mean of monthly free cash flow over completed months.")]
    pub mean_free_cash_flow: f64,

    #[schemars(description = "Population standard deviation of monthly free cash flow.")]
    pub std_dev_free_cash_flow: f64,

    #[schemars(description = "Number of completed months the statistics were computed over.")]
    pub months_analyzed: usize,

    #[schemars(description = "Monthly amortized cost of abnormal current-month expenses.")]
    pub current_month_outlier_impact: f64,

    #[schemars(description = "Forecast after subtracting the outlier impact.")]
    pub final_adjusted_fcf: f64,

    pub last_updated_utc: DateTime<Utc>,
}

impl PublishedProfile {
    pub fn new(profile: &FinancialProfile, last_updated_utc: DateTime<Utc>) -> Self {
        Self {
            ewma_predicted_fcf: round_cents(profile.smoothed_fcf),
            mean_free_cash_flow: round_cents(profile.mean_fcf),
            std_dev_free_cash_flow: round_cents(profile.stddev_fcf),
            months_analyzed: profile.months_analyzed,
            current_month_outlier_impact: round_cents(profile.outlier_impact),
            final_adjusted_fcf: round_cents(profile.final_adjusted_fcf),
            last_updated_utc,
        }
    }
}

/// Rounds a monetary value to two decimal places.
pub fn round_cents(value: f64) -> f64 {
    let rounded = (value * 100.0).round() / 100.0;
    // Avoid publishing "-0.0"
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

pub fn published_profile_schema() -> schemars::schema::RootSchema {
    schemars::schema_for!(PublishedProfile)
}
