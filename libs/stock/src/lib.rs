mod price_client;
mod quote;

pub mod chart;
pub mod metrics;

pub use chart::{CharmingRenderer, ChartError, ChartRenderer, ChartRequest};
pub use metrics::{DerivedMetrics, PreviousClosePolicy};
pub use price_client::{DEFAULT_BASE_API, GatewayError, MarketData, PriceClient};
pub use quote::{Lookback, QuoteBar, QuoteHistory, SecurityMeta, UNKNOWN_COMPANY};
