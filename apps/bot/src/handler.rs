use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use analyst::{AnalysisError, Analyst};
use stock::{
    ChartError, ChartRenderer, ChartRequest, DerivedMetrics, GatewayError, Lookback, MarketData,
    PreviousClosePolicy, QuoteHistory,
};
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn};
use tracing_futures::Instrument;
use uuid::Uuid;

use crate::{
    reply::ChatReply,
    report::{self, Snapshot},
};

#[derive(Debug, Clone)]
pub struct Settings {
    /// Literal prefix; the ticker follows after whitespace.
    pub trigger_prefix: String,
    pub market_suffix: String,
    pub lookback: Lookback,
    pub previous_close: PreviousClosePolicy,
    pub chart_dir: PathBuf,
}

/// An inbound chat message as the handler sees it.
#[derive(Debug, Clone, Copy)]
pub struct Inbound<'a> {
    pub from_self: bool,
    pub content: &'a str,
}

/// Why a quote could not be delivered. Displays as the upstream description.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    MarketData(#[from] GatewayError),

    #[error(transparent)]
    Chart(#[from] ChartError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Chat(anyhow::Error),
}

impl PipelineError {
    pub fn origin(&self) -> &'static str {
        match self {
            PipelineError::MarketData(_) => "market_data",
            PipelineError::Chart(_) => "chart",
            PipelineError::Analysis(_) => "analysis",
            PipelineError::Chat(_) => "chat",
        }
    }
}

/// What one invocation produced.
#[derive(Debug)]
pub enum Outcome {
    /// Not a trigger; nothing was sent.
    Ignored,
    /// The not-found message was sent.
    NotFound,
    /// Full reply and chart were sent.
    Replied,
    /// The diagnostic message was sent.
    Failed(PipelineError),
}

enum Delivery {
    Sent,
    NotFound,
}

pub struct QuoteHandler {
    market: Arc<dyn MarketData>,
    charts: Arc<dyn ChartRenderer>,
    analyst: Arc<dyn Analyst>,
    settings: Settings,
}

impl QuoteHandler {
    pub fn new(
        market: Arc<dyn MarketData>,
        charts: Arc<dyn ChartRenderer>,
        analyst: Arc<dyn Analyst>,
        settings: Settings,
    ) -> Self {
        Self {
            market,
            charts,
            analyst,
            settings,
        }
    }

    /// Entry point for every chat message.
    pub async fn handle(&self, inbound: Inbound<'_>, reply: &dyn ChatReply) -> Outcome {
        if inbound.from_self {
            return Outcome::Ignored;
        }

        match parse_ticker(&self.settings.trigger_prefix, inbound.content) {
            Some(ticker) => self.quote(ticker, reply).await,
            None => Outcome::Ignored,
        }
    }

    /// Runs the whole pipeline for one ticker and reports the result to `reply`.
    pub async fn quote(&self, ticker: &str, reply: &dyn ChatReply) -> Outcome {
        let invocation = Uuid::new_v4();
        let span = info_span!("quote", ticker = %ticker, invocation = %invocation);

        async move {
            info!("quote requested");

            match self.run(ticker, invocation, reply).await {
                Ok(Delivery::Sent) => {
                    info!("quote delivered");
                    Outcome::Replied
                }
                Ok(Delivery::NotFound) => {
                    info!("no history for ticker");
                    if let Err(e) = reply.say(report::not_found(ticker)).await {
                        warn!(error = ?e, "sending not-found reply failed");
                    }
                    Outcome::NotFound
                }
                Err(e) => {
                    error!(origin = e.origin(), error = %e, "quote failed");
                    if let Err(send_err) = reply.say(report::failure(&e)).await {
                        warn!(error = ?send_err, "sending diagnostic failed");
                    }
                    Outcome::Failed(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run(
        &self,
        ticker: &str,
        invocation: Uuid,
        reply: &dyn ChatReply,
    ) -> Result<Delivery, PipelineError> {
        let symbol = format!("{ticker}{}", self.settings.market_suffix);
        let history = self.market.history(&symbol, &self.settings.lookback).await?;

        let Some(metrics) = DerivedMetrics::compute(&history, self.settings.previous_close) else {
            return Ok(Delivery::NotFound);
        };
        debug!(bars = history.bars.len(), latest_close = metrics.latest_close(), "metrics computed");

        let snapshot = Snapshot::new(
            ticker,
            history.meta.display_name(),
            self.settings.lookback.caption(),
            metrics,
        );

        let stem = file_stem(ticker);
        let path = self
            .settings
            .chart_dir
            .join(format!("{stem}-{invocation}.png"));
        let filename = format!("{stem}_chart.png");

        let delivered = self
            .deliver(&snapshot, &history, &path, &filename, reply)
            .await;
        remove_chart(&path).await;

        delivered.map(|()| Delivery::Sent)
    }

    async fn deliver(
        &self,
        snapshot: &Snapshot,
        history: &QuoteHistory,
        path: &Path,
        filename: &str,
        reply: &dyn ChatReply,
    ) -> Result<(), PipelineError> {
        let request = ChartRequest::close_series(snapshot.chart_title(), history);
        self.charts.render(&request, path).await?;
        // Loaded up front so a local read failure cannot follow the text reply.
        let chart = tokio::fs::read(path).await.map_err(ChartError::from)?;

        let analysis = self.analyst.analyze(&snapshot.prompt()).await?;

        reply
            .say(snapshot.reply(&analysis))
            .await
            .map_err(PipelineError::Chat)?;
        reply
            .attach(chart, filename)
            .await
            .map_err(PipelineError::Chat)?;

        Ok(())
    }
}

/// `"<prefix> <TICKER> ..."` -> `TICKER`. Only the first token is used.
pub fn parse_ticker<'a>(prefix: &str, content: &'a str) -> Option<&'a str> {
    let rest = content.strip_prefix(prefix)?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    rest.split_whitespace().next()
}

/// Filesystem-safe form of a user supplied ticker.
fn file_stem(ticker: &str) -> String {
    let stem: String = ticker
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();

    if stem.is_empty() {
        "chart".to_string()
    } else {
        stem
    }
}

async fn remove_chart(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "chart removed"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "chart cleanup failed"),
    }
}
