use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::{Asia::Taipei, Tz};
use reqwest::{
    Client, StatusCode,
    header::{HeaderMap, HeaderValue, USER_AGENT},
};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::quote::{Lookback, QuoteBar, QuoteHistory, SecurityMeta};

pub const DEFAULT_BASE_API: &str = "https://query1.finance.yahoo.com";
const BROWSER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("market data provider returned {status}: {body}")]
    Upstream { status: StatusCode, body: String },

    #[error("market data provider error {code}: {description}")]
    Provider { code: String, description: String },
}

/// Source of daily bars and security metadata.
///
/// An unknown symbol is not an error: implementations return an empty history.
#[async_trait]
pub trait MarketData: Send + Sync {
    async fn history(&self, symbol: &str, window: &Lookback)
    -> Result<QuoteHistory, GatewayError>;
}

#[derive(Clone)]
pub struct PriceClient {
    client: Client,
    base_api: String,
}

impl PriceClient {
    pub fn new(base_api: impl Into<String>) -> Result<Self, GatewayError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_AGENT));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(StdDuration::from_secs(TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_api: base_api.into(),
        })
    }

    fn endpoint(&self, path: &str, symbol: &str) -> String {
        format!("{}/{}/{}", self.base_api.trim_end_matches('/'), path, symbol)
    }

    async fn fetch_chart(
        &self,
        symbol: &str,
        window: &Lookback,
    ) -> Result<QuoteHistory, GatewayError> {
        let (period1, period2) = period_bounds(window, Utc::now());

        let res = self
            .client
            .get(self.endpoint("v8/finance/chart", symbol))
            .query(&[
                ("period1", period1.to_string()),
                ("period2", period2.to_string()),
                ("interval", "1d".to_string()),
                ("events", "history".to_string()),
            ])
            .send()
            .await?;

        let status = res.status();
        if status == StatusCode::NOT_FOUND {
            debug!("provider reported 404");
            return Ok(QuoteHistory::empty(symbol));
        }
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(GatewayError::Upstream { status, body });
        }

        let envelope: ChartEnvelope = res.json().await?;
        interpret_chart(symbol, envelope)
    }

    /// Slow path for the company name.
    async fn fetch_names(
        &self,
        symbol: &str,
    ) -> Result<(Option<String>, Option<String>), GatewayError> {
        let res: SummaryEnvelope = self
            .client
            .get(self.endpoint("v10/finance/quoteSummary", symbol))
            .query(&[("modules", "price")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let price = res
            .quote_summary
            .result
            .into_iter()
            .flatten()
            .find_map(|r| r.price);

        Ok(price
            .map(|p| (p.long_name, p.short_name))
            .unwrap_or_default())
    }
}

#[async_trait]
impl MarketData for PriceClient {
    #[instrument(name = "market_history", skip(self, symbol, window), fields(symbol = %symbol))]
    async fn history(
        &self,
        symbol: &str,
        window: &Lookback,
    ) -> Result<QuoteHistory, GatewayError> {
        if !is_plausible_symbol(symbol) {
            debug!("symbol rejected before request");
            return Ok(QuoteHistory::empty(symbol));
        }

        let mut history = self.fetch_chart(symbol, window).await?;
        info!(bars = history.bars.len(), "fetched daily bars");

        if !history.is_empty() && !history.meta.has_name() {
            match self.fetch_names(symbol).await {
                Ok((long_name, short_name)) => {
                    history.meta.long_name = long_name;
                    history.meta.short_name = short_name;
                }
                Err(e) => warn!(error = %e, "quote summary lookup failed"),
            }
        }

        Ok(history)
    }
}

fn is_plausible_symbol(symbol: &str) -> bool {
    !symbol.is_empty()
        && symbol
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '^' | '=' | '-'))
}

fn period_bounds(window: &Lookback, now: DateTime<Utc>) -> (i64, i64) {
    match window {
        // Out-of-range windows clamp to the epoch rather than overflow.
        Lookback::Rolling(d) => (
            now.checked_sub_signed(*d).map_or(0, |t| t.timestamp().max(0)),
            now.timestamp(),
        ),
        Lookback::Between { start, end } => (
            session_open(*start),
            session_open(end.succ_opt().unwrap_or(*end)),
        ),
    }
}

fn session_open(date: NaiveDate) -> i64 {
    let midnight = date.and_time(NaiveTime::MIN);
    Taipei
        .from_local_datetime(&midnight)
        .earliest()
        .map(|t| t.timestamp())
        .unwrap_or_else(|| midnight.and_utc().timestamp())
}

fn interpret_chart(symbol: &str, envelope: ChartEnvelope) -> Result<QuoteHistory, GatewayError> {
    if let Some(err) = envelope.chart.error {
        if err.code == "Not Found" {
            return Ok(QuoteHistory::empty(symbol));
        }
        return Err(GatewayError::Provider {
            code: err.code,
            description: err.description,
        });
    }

    match envelope.chart.result.into_iter().flatten().next() {
        Some(result) => Ok(into_history(symbol, result)),
        None => Ok(QuoteHistory::empty(symbol)),
    }
}

fn into_history(symbol: &str, result: ChartResult) -> QuoteHistory {
    let meta = result.meta;
    let tz: Tz = meta
        .exchange_timezone_name
        .as_deref()
        .and_then(|name| name.parse().ok())
        .unwrap_or(Taipei);

    let mut bars = Vec::with_capacity(result.timestamp.len());

    if let Some(q) = result.indicators.quote.into_iter().next() {
        for (i, ts) in result.timestamp.iter().enumerate() {
            // rows with holes are partial sessions or halts
            let (Some(open), Some(high), Some(low), Some(close)) = (
                cell(&q.open, i),
                cell(&q.high, i),
                cell(&q.low, i),
                cell(&q.close, i),
            )
            else {
                continue;
            };
            let Some(time) = DateTime::from_timestamp(*ts, 0) else {
                continue;
            };

            bars.push(QuoteBar {
                date: time.with_timezone(&tz).date_naive(),
                open,
                high,
                low,
                close,
                volume: cell(&q.volume, i).unwrap_or(0.0).max(0.0) as u64,
            });
        }
    }

    bars.sort_by_key(|b| b.date);

    QuoteHistory {
        meta: SecurityMeta {
            symbol: meta.symbol.unwrap_or_else(|| symbol.to_string()),
            long_name: meta.long_name,
            short_name: meta.short_name,
            reference_close: meta.chart_previous_close.or(meta.previous_close),
        },
        bars,
    }
}

fn cell(column: &[Option<f64>], i: usize) -> Option<f64> {
    column.get(i).copied().flatten()
}

//
// Yahoo Finance chart / quoteSummary JSON
//
#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ProviderError>,
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    code: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    #[serde(default)]
    indicators: Indicators,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    symbol: Option<String>,
    long_name: Option<String>,
    short_name: Option<String>,
    chart_previous_close: Option<f64>,
    previous_close: Option<f64>,
    exchange_timezone_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteColumns>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteColumns {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct SummaryEnvelope {
    #[serde(rename = "quoteSummary")]
    quote_summary: SummaryBody,
}

#[derive(Debug, Deserialize)]
struct SummaryBody {
    #[serde(default)]
    result: Option<Vec<SummaryResult>>,
}

#[derive(Debug, Deserialize)]
struct SummaryResult {
    #[serde(default)]
    price: Option<SummaryPrice>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryPrice {
    long_name: Option<String>,
    short_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<QuoteHistory, GatewayError> {
        let envelope: ChartEnvelope = serde_json::from_str(json).unwrap();
        interpret_chart("2330.TW", envelope)
    }

    #[test]
    fn chart_rows_become_bars() {
        let history = parse(
            r#"{"chart":{"result":[{
                "meta":{"symbol":"2330.TW","shortName":"TSMC","chartPreviousClose":990.0,
                        "exchangeTimezoneName":"Asia/Taipei"},
                "timestamp":[1717376400,1717462800,1717549200],
                "indicators":{"quote":[{
                    "open":[995.0,1001.0,null],
                    "high":[1005.0,1020.0,null],
                    "low":[990.0,998.0,null],
                    "close":[1000.0,1015.0,null],
                    "volume":[31000000,28000000,null]
                }]}
            }],"error":null}}"#,
        )
        .unwrap();

        assert_eq!(history.bars.len(), 2);
        assert_eq!(history.meta.display_name(), "TSMC");
        assert_eq!(history.meta.reference_close, Some(990.0));

        let first = &history.bars[0];
        assert_eq!(first.date, NaiveDate::from_ymd_opt(2024, 6, 3).unwrap());
        assert_eq!(first.volume, 31_000_000);
        assert_eq!(history.latest().unwrap().close, 1015.0);
    }

    #[test]
    fn bar_dates_use_exchange_timezone() {
        // 2024-06-03T17:00Z is already the 4th in Taipei
        let history = parse(
            r#"{"chart":{"result":[{
                "meta":{"exchangeTimezoneName":"Asia/Taipei"},
                "timestamp":[1717434000],
                "indicators":{"quote":[{"open":[1.0],"high":[1.0],"low":[1.0],"close":[1.0],"volume":[null]}]}
            }]}}"#,
        )
        .unwrap();

        assert_eq!(
            history.bars[0].date,
            NaiveDate::from_ymd_opt(2024, 6, 4).unwrap()
        );
        assert_eq!(history.bars[0].volume, 0);
        assert_eq!(history.meta.symbol, "2330.TW");
    }

    #[test]
    fn not_found_error_is_empty_history() {
        let history = parse(
            r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#,
        )
        .unwrap();
        assert!(history.is_empty());
    }

    #[test]
    fn no_trading_in_window_is_empty_history() {
        let history = parse(
            r#"{"chart":{"result":[{"meta":{"symbol":"2330.TW"},"indicators":{"quote":[{}]}}],"error":null}}"#,
        )
        .unwrap();
        assert!(history.is_empty());
    }

    #[test]
    fn other_provider_errors_propagate() {
        let err = parse(
            r#"{"chart":{"result":null,"error":{"code":"Bad Request","description":"Invalid input"}}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, GatewayError::Provider { ref code, .. } if code == "Bad Request"));
        assert!(err.to_string().contains("Invalid input"));
    }

    #[test]
    fn summary_names_parse() {
        let env: SummaryEnvelope = serde_json::from_str(
            r#"{"quoteSummary":{"result":[{"price":{"longName":"United Microelectronics Corporation","shortName":"UMC"}}],"error":null}}"#,
        )
        .unwrap();
        let price = env.quote_summary.result.unwrap().remove(0).price.unwrap();
        assert_eq!(price.short_name.as_deref(), Some("UMC"));
    }

    #[test]
    fn implausible_symbols_are_rejected() {
        assert!(is_plausible_symbol("2330.TW"));
        assert!(is_plausible_symbol("^TWII"));
        assert!(!is_plausible_symbol(""));
        assert!(!is_plausible_symbol("../etc.TW"));
        assert!(!is_plausible_symbol("台積電.TW"));
    }

    #[test]
    fn explicit_window_covers_end_date() {
        let start = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 6, 4).unwrap();
        let (p1, p2) = period_bounds(&Lookback::Between { start, end }, Utc::now());

        // Taipei midnight is 16:00Z the previous day
        assert_eq!(p1, 1717372800 - 8 * 3600);
        assert_eq!(p2 - p1, 2 * 86400);
    }

    #[test]
    fn oversized_rolling_window_clamps_to_epoch() {
        let now = DateTime::from_timestamp(1717376400, 0).unwrap();
        let (p1, p2) = period_bounds(&Lookback::Rolling(chrono::TimeDelta::MAX), now);
        assert_eq!(p1, 0);
        assert_eq!(p2, 1717376400);
    }

    #[test]
    fn rolling_window_ends_now() {
        let now = DateTime::from_timestamp(1717376400, 0).unwrap();
        let (p1, p2) = period_bounds(&Lookback::days(30), now);
        assert_eq!(p2, 1717376400);
        assert_eq!(p2 - p1, 30 * 86400);
    }
}
