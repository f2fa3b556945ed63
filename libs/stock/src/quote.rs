use chrono::{Duration, NaiveDate};

pub const UNKNOWN_COMPANY: &str = "未知公司";

/// One trading day.
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SecurityMeta {
    pub symbol: String,
    pub long_name: Option<String>,
    pub short_name: Option<String>,
    /// Reference close reported by the provider for the session before the window.
    pub reference_close: Option<f64>,
}

impl SecurityMeta {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            ..Default::default()
        }
    }

    pub fn has_name(&self) -> bool {
        self.name().is_some()
    }

    fn name(&self) -> Option<&str> {
        [self.long_name.as_deref(), self.short_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|s| !s.is_empty())
    }

    /// longName, then shortName, then the placeholder.
    pub fn display_name(&self) -> &str {
        self.name().unwrap_or(UNKNOWN_COMPANY)
    }
}

/// Bars ascending by date. Empty means the symbol is unknown or had no trading in the window.
#[derive(Debug, Clone, Default)]
pub struct QuoteHistory {
    pub meta: SecurityMeta,
    pub bars: Vec<QuoteBar>,
}

impl QuoteHistory {
    pub fn empty(symbol: impl Into<String>) -> Self {
        Self {
            meta: SecurityMeta::new(symbol),
            bars: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn latest(&self) -> Option<&QuoteBar> {
        self.bars.last()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }
}

/// Date window requested from the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookback {
    Rolling(Duration),
    Between { start: NaiveDate, end: NaiveDate },
}

impl Lookback {
    pub fn days(days: i64) -> Self {
        Lookback::Rolling(Duration::days(days))
    }

    /// Chinese caption used in chart titles.
    pub fn caption(&self) -> String {
        match self {
            Lookback::Rolling(d) if d.num_days() >= 28 && d.num_days() <= 31 => "近一月".to_string(),
            Lookback::Rolling(d) => format!("近 {} 日", d.num_days()),
            Lookback::Between { start, end } => format!("{start} ~ {end}"),
        }
    }
}

impl Default for Lookback {
    fn default() -> Self {
        Lookback::days(30)
    }
}
