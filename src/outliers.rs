use crate::schema::{BaselineProfile, FinancialProfile, Transaction, TransactionKind};
use log::info;

/// Spreads abnormal current-month expenses across the forecast horizon.
pub struct OutlierAdjuster {
    iqr_multiplier: f64,
    amortization_months: u32,
}

impl OutlierAdjuster {
    pub fn new(iqr_multiplier: f64, amortization_months: u32) -> Self {
        Self {
            iqr_multiplier,
            amortization_months: amortization_months.max(1),
        }
    }

    /// Upper fence `Q3 + k * IQR` over the pooled historical monthly expenses.
    pub fn fence(&self, historical_expenses: &[f64]) -> Option<f64> {
        let q1 = quantile(historical_expenses, 0.25)?;
        let q3 = quantile(historical_expenses, 0.75)?;
        Some(q3 + self.iqr_multiplier * (q3 - q1))
    }

    /// Expenses in `current` whose amount lies strictly above `fence`.
    pub fn outliers<'t>(&self, current: &[&'t Transaction], fence: f64) -> Vec<&'t Transaction> {
        current
            .iter()
            .copied()
            .filter(|t| t.kind == TransactionKind::Expense && t.amount > fence)
            .collect()
    }

    pub fn adjust(
        &self,
        current: &[&Transaction],
        historical_expenses: &[f64],
        baseline: &BaselineProfile,
    ) -> FinancialProfile {
        let passthrough = FinancialProfile::from_baseline(baseline);
        if current.is_empty() {
            return passthrough;
        }
        let Some(fence) = self.fence(historical_expenses) else {
            return passthrough;
        };

        let total: f64 = self.outliers(current, fence).iter().map(|t| t.amount).sum();
        if total <= 0.0 {
            return passthrough;
        }

        let monthly_impact = total / self.amortization_months as f64;
        info!(
            "Found ${:.2} in current-month outliers above ${:.2}; adjusting forecast by ${:.2}/month",
            total, fence, monthly_impact
        );

        FinancialProfile {
            outlier_impact: monthly_impact,
            final_adjusted_fcf: baseline.smoothed_fcf - monthly_impact,
            ..passthrough
        }
    }
}

/// Quantile with linear interpolation between closest ranks.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() || !(0.0..=1.0).contains(&q) {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    Some(sorted[lower] + fraction * (sorted[upper] - sorted[lower]))
}
