use std::path::Path;

use async_trait::async_trait;
use charming::{
    Chart, ImageFormat, ImageRenderer,
    component::{Axis, Title},
    element::{AxisLabel, AxisType, LineStyle, SplitLine, Symbol, TextStyle},
    series::Line,
};
use chrono::NaiveDate;
use thiserror::Error;
use tracing::debug;

use crate::quote::QuoteHistory;

const WIDTH: u32 = 1000;
const HEIGHT: u32 = 400;

#[derive(Debug, Error)]
pub enum ChartError {
    #[error("invalid chart input: {0}")]
    InvalidInput(String),

    #[error("chart rendering failed: {0}")]
    Render(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChartRequest {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub dates: Vec<NaiveDate>,
    pub closes: Vec<f64>,
}

impl ChartRequest {
    /// Close prices of `history`, labelled for a TWSE listing.
    pub fn close_series(title: impl Into<String>, history: &QuoteHistory) -> Self {
        Self {
            title: title.into(),
            x_label: "日期".to_string(),
            y_label: "收盤價 (元)".to_string(),
            dates: history.bars.iter().map(|b| b.date).collect(),
            closes: history.closes(),
        }
    }
}

/// Renders a line chart to an image file at `path`.
#[async_trait]
pub trait ChartRenderer: Send + Sync {
    async fn render(&self, request: &ChartRequest, path: &Path) -> Result<(), ChartError>;
}

#[derive(Debug, Clone, Copy)]
pub struct CharmingRenderer {
    width: u32,
    height: u32,
}

impl CharmingRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for CharmingRenderer {
    fn default() -> Self {
        Self::new(WIDTH, HEIGHT)
    }
}

#[async_trait]
impl ChartRenderer for CharmingRenderer {
    async fn render(&self, request: &ChartRequest, path: &Path) -> Result<(), ChartError> {
        let request = request.clone();
        let (width, height) = (self.width, self.height);

        let png = tokio::task::spawn_blocking(move || render_png(&request, width, height))
            .await
            .map_err(|e| ChartError::Render(e.to_string()))??;

        tokio::fs::write(path, &png).await?;
        debug!(bytes = png.len(), path = %path.display(), "chart written");
        Ok(())
    }
}

pub fn tick_label(date: NaiveDate) -> String {
    date.format("%m/%d").to_string()
}

/// Each call builds its own chart and renderer; nothing is shared between requests.
pub fn render_png(request: &ChartRequest, width: u32, height: u32) -> Result<Vec<u8>, ChartError> {
    let chart = build_chart(request)?;
    let mut renderer = ImageRenderer::new(width, height);
    renderer
        .render_format(ImageFormat::Png, &chart)
        .map_err(|e| ChartError::Render(format!("{e:?}")))
}

pub fn build_chart(request: &ChartRequest) -> Result<Chart, ChartError> {
    if request.closes.is_empty() {
        return Err(ChartError::InvalidInput("closes is empty".to_string()));
    }
    if request.closes.len() != request.dates.len() {
        return Err(ChartError::InvalidInput(format!(
            "length mismatch: closes={}, dates={}",
            request.closes.len(),
            request.dates.len()
        )));
    }

    let labels: Vec<String> = request.dates.iter().copied().map(tick_label).collect();

    let chart = Chart::new()
        .background_color("#0b0c17")
        .title(
            Title::new()
                .text(request.title.clone())
                .left("center")
                .top("2%")
                .text_style(TextStyle::new().color("#ffffff").font_size(14)),
        )
        .x_axis(
            Axis::new()
                .type_(AxisType::Category)
                .name(request.x_label.clone())
                .data(labels)
                .axis_label(AxisLabel::new().rotate(45).color("#a0a0a0"))
                .split_line(
                    SplitLine::new()
                        .show(true)
                        .line_style(LineStyle::new().color("#2d2f45")),
                ),
        )
        .y_axis(
            Axis::new()
                .type_(AxisType::Value)
                .name(request.y_label.clone())
                .scale(true)
                .axis_label(AxisLabel::new().color("#a0a0a0"))
                .split_line(
                    SplitLine::new()
                        .show(true)
                        .line_style(LineStyle::new().color("#2d2f45")),
                ),
        )
        .series(
            Line::new()
                .name("Close")
                .data(request.closes.clone())
                .symbol(Symbol::Circle)
                .line_style(LineStyle::new().width(2).color("#00d084")),
        );

    Ok(chart)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quote::{QuoteBar, SecurityMeta};

    fn request(n: usize) -> ChartRequest {
        let start = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        ChartRequest {
            title: "台積電 (2330) 近一月股價走勢".to_string(),
            x_label: "日期".to_string(),
            y_label: "收盤價 (元)".to_string(),
            dates: (0..n)
                .map(|i| start + chrono::Duration::days(i as i64))
                .collect(),
            closes: (0..n).map(|i| 900.0 + i as f64).collect(),
        }
    }

    #[test]
    fn ticks_are_month_day() {
        let d = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        assert_eq!(tick_label(d), "06/03");
    }

    #[test]
    fn empty_series_is_rejected() {
        let err = build_chart(&request(0)).unwrap_err();
        assert!(matches!(err, ChartError::InvalidInput(_)));
    }

    #[test]
    fn mismatched_series_is_rejected() {
        let mut req = request(5);
        req.dates.pop();
        let err = build_chart(&req).unwrap_err();
        assert!(err.to_string().contains("closes=5, dates=4"));
    }

    #[test]
    fn typical_window_builds() {
        assert!(build_chart(&request(22)).is_ok());
        assert!(build_chart(&request(130)).is_ok());
    }

    #[test]
    fn close_series_follows_history() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        let history = QuoteHistory {
            meta: SecurityMeta::new("2330.TW"),
            bars: vec![QuoteBar {
                date,
                open: 1.0,
                high: 2.0,
                low: 0.5,
                close: 1.5,
                volume: 10,
            }],
        };

        let req = ChartRequest::close_series("t", &history);
        assert_eq!(req.dates, vec![date]);
        assert_eq!(req.closes, vec![1.5]);
        assert_eq!(req.y_label, "收盤價 (元)");
    }
}
