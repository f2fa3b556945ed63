use std::fmt::Display;

use stock::DerivedMetrics;

/// Shares per board lot on TWSE.
const LOT_SIZE: f64 = 1000.0;

pub fn not_found(code: &str) -> String {
    format!("❌ 查無此股票代碼：{code}")
}

pub fn failure(err: &impl Display) -> String {
    format!("⚠️ 查詢時發生錯誤：{err}")
}

/// Everything one reply is built from. Lives only for a single invocation.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub code: String,
    pub name: String,
    pub period: String,
    pub metrics: DerivedMetrics,
}

impl Snapshot {
    pub fn new(
        code: impl Into<String>,
        name: impl Into<String>,
        period: impl Into<String>,
        metrics: DerivedMetrics,
    ) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            period: period.into(),
            metrics,
        }
    }

    pub fn chart_title(&self) -> String {
        format!("{} ({}) {}股價走勢", self.name, self.code, self.period)
    }

    fn lots(&self) -> String {
        format!("{:.0}", self.metrics.latest.volume as f64 / LOT_SIZE)
    }

    pub fn prompt(&self) -> String {
        let bar = &self.metrics.latest;
        format!(
            "請你以專業投資分析師身分，分析台股代碼 {code}（{name}）{period}的股價走勢，並依序說明：\n\
             1. 趨勢判斷\n\
             2. 技術面解讀\n\
             3. 風險因素\n\
             4. 具體的投資建議（例如：是否買入、賣出或觀望，以及原因）\n\
             \n\
             以下是最新的股票資訊：\n\
             日期：{date}\n\
             開盤價：{open:.2} 元\n\
             收盤價：{close:.2} 元\n\
             最高價：{high:.2} 元\n\
             最低價：{low:.2} 元\n\
             成交量：{lots} 張\n\
             昨收：{prev} 元\n\
             漲跌幅：{change}\n\
             \n\
             請用中文回覆，格式分段清晰。",
            code = self.code,
            name = self.name,
            period = self.period,
            date = bar.date,
            open = bar.open,
            close = bar.close,
            high = bar.high,
            low = bar.low,
            lots = self.lots(),
            prev = self.metrics.previous_close_label(),
            change = self.metrics.change_label(),
        )
    }

    pub fn reply(&self, analysis: &str) -> String {
        let bar = &self.metrics.latest;
        format!(
            "📊 **{name} ({code}) 台股資訊**\n\
             日期：{date}\n\
             開盤：{open:.2} 元\n\
             收盤：{close:.2} 元\n\
             最高：{high:.2} 元\n\
             最低：{low:.2} 元\n\
             成交量：{lots} 張\n\
             昨收：{prev} 元\n\
             漲跌幅：{change}\n\
             \n\
             📈 **GPT 分析建議：**\n\
             {analysis}",
            name = self.name,
            code = self.code,
            date = bar.date,
            open = bar.open,
            close = bar.close,
            high = bar.high,
            low = bar.low,
            lots = self.lots(),
            prev = self.metrics.previous_close_label(),
            change = self.metrics.change_label(),
        )
    }
}
