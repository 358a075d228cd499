use crate::aggregator::HistoricalSeries;
use crate::config::EngineConfig;
use crate::schema::BaselineProfile;
use log::debug;

/// Smoothed free-cash-flow forecast over completed months.
pub struct BaselineForecaster {
    alpha: f64,
    min_history_months: usize,
}

impl BaselineForecaster {
    pub fn new(alpha: f64, min_history_months: usize) -> Self {
        Self {
            alpha,
            min_history_months: min_history_months.max(2),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.ewma_alpha(), config.min_history_months)
    }

    /// Returns `None` when fewer than the minimum number of months are given;
    /// a profile is never produced from too little history.
    pub fn forecast(&self, income: &[f64], expenses: &[f64]) -> Option<BaselineProfile> {
        let fcf: Vec<f64> = income
            .iter()
            .zip(expenses)
            .map(|(inc, exp)| inc - exp)
            .collect();
        self.forecast_fcf(&fcf)
    }

    pub fn forecast_series(&self, series: &HistoricalSeries) -> Option<BaselineProfile> {
        self.forecast_fcf(&series.fcf_series())
    }

    fn forecast_fcf(&self, fcf: &[f64]) -> Option<BaselineProfile> {
        if fcf.len() < self.min_history_months {
            debug!(
                "Only {} months of history; at least {} required",
                fcf.len(),
                self.min_history_months
            );
            return None;
        }

        let smoothed_fcf = ewma(fcf, self.alpha)?;
        let (mean_fcf, stddev_fcf) = mean_and_population_std_dev(fcf)?;

        Some(BaselineProfile {
            smoothed_fcf,
            mean_fcf,
            stddev_fcf,
            months_analyzed: fcf.len(),
        })
    }
}

/// Recursive EWMA seeded with the first observation; returns the final value.
pub fn ewma(values: &[f64], alpha: f64) -> Option<f64> {
    let (first, rest) = values.split_first()?;
    Some(
        rest.iter()
            .fold(*first, |prev, value| alpha * value + (1.0 - alpha) * prev),
    )
}

/// Arithmetic mean and standard deviation with divisor N.
pub fn mean_and_population_std_dev(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some((mean, variance.sqrt()))
}
