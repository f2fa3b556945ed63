use std::str::FromStr;

use crate::quote::{QuoteBar, QuoteHistory};

pub const NO_DATA: &str = "無資料";

/// Where the previous close comes from.
///
/// The two sources can disagree after a halt or a non-trading gap, so the bot
/// commits to one of them per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PreviousClosePolicy {
    /// Close of the bar before the latest one.
    #[default]
    PriorBar,
    /// Reference close reported by the market data provider.
    ProviderReference,
}

impl FromStr for PreviousClosePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prior-bar" | "prior_bar" | "bar" => Ok(PreviousClosePolicy::PriorBar),
            "provider" | "reference" => Ok(PreviousClosePolicy::ProviderReference),
            other => Err(format!("unknown previous close policy: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DerivedMetrics {
    pub latest: QuoteBar,
    pub previous_close: Option<f64>,
    pub change: Option<f64>,
    pub percent_change: Option<f64>,
}

impl DerivedMetrics {
    /// Returns None for an empty history.
    pub fn compute(history: &QuoteHistory, policy: PreviousClosePolicy) -> Option<Self> {
        let latest = history.latest()?.clone();

        let previous_close = match policy {
            PreviousClosePolicy::PriorBar => history
                .bars
                .len()
                .checked_sub(2)
                .map(|i| history.bars[i].close),
            PreviousClosePolicy::ProviderReference => history.meta.reference_close,
        }
        .filter(|p| p.is_finite() && *p != 0.0);

        let change = previous_close.map(|p| latest.close - p);
        let percent_change = previous_close
            .zip(change)
            .map(|(p, c)| c / p * 100.0);

        Some(Self {
            latest,
            previous_close,
            change,
            percent_change,
        })
    }

    pub fn latest_close(&self) -> f64 {
        self.latest.close
    }

    /// e.g. `+15.00 元 (+1.50%)`
    pub fn change_label(&self) -> String {
        match (self.change, self.percent_change) {
            (Some(c), Some(p)) => format!("{c:+.2} 元 ({p:+.2}%)"),
            _ => NO_DATA.to_string(),
        }
    }

    pub fn previous_close_label(&self) -> String {
        self.previous_close
            .map(|p| format!("{p:.2}"))
            .unwrap_or_else(|| NO_DATA.to_string())
    }
}
