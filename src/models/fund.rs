//! 基金数据模型
//!
//! 定义 LOF 基金溢价计算相关的数据结构，包括：
//! - 基金列表记录与筛选后的基金
//! - 净值 / 收盘价时间序列
//! - 溢价计算结果及最终报告

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// 基金列表接口返回的原始记录
///
/// 价格可能缺失（上游以 "-" 表示），筛选前不做保证
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FundRecord {
    /// 基金代码
    pub code: String,
    /// 基金名称
    pub name: String,
    /// 最新价
    pub price: Option<f64>,
    /// 涨跌幅（百分比）
    pub change_percent: Option<f64>,
}

/// 基金列表单页数据
#[derive(Debug, Clone, Default)]
pub struct FundListPage {
    pub records: Vec<FundRecord>,
    /// 上游报告的记录总数
    pub total: usize,
}

/// 进入流水线的基金
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Fund {
    /// 基金代码
    pub code: String,
    /// 基金名称
    pub name: String,
    /// 场内最新价
    pub market_price: f64,
    /// 当日涨跌幅（百分比）
    pub change_percent: f64,
}

/// 单位净值序列中的一个点
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct NavPoint {
    pub date: NaiveDate,
    pub nav: f64,
}

/// 基金最新估值
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct Valuation {
    /// 单位净值
    pub nav: f64,
    /// 净值日期（UTC+8）
    pub nav_date: NaiveDate,
}

impl From<NavPoint> for Valuation {
    fn from(p: NavPoint) -> Self {
        Self {
            nav: p.nav,
            nav_date: p.date,
        }
    }
}

/// 日K线记录（date,open,close,high,low）
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub open: f64,
    pub close: f64,
    pub high: f64,
    pub low: f64,
}

/// 基金分类
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FundType {
    /// 投资海外市场的基金
    Qdii,
    /// 商品类基金（黄金、原油等）
    Commodity,
    Normal,
}

impl FundType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FundType::Qdii => "qdii",
            FundType::Commodity => "commodity",
            FundType::Normal => "normal",
        }
    }
}

/// 某一交易日的溢价率
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DailyPremium {
    pub date: NaiveDate,
    pub nav: f64,
    pub price: f64,
    /// 溢价率（百分比，保留2位小数）
    pub premium_rate: f64,
}

/// 带溢价计算结果的基金
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FundWithPremium {
    pub code: String,
    pub name: String,
    /// 场内最新价
    pub market_price: f64,
    /// 当日涨跌幅（百分比）
    pub change_percent: f64,
    /// 单位净值
    pub nav: f64,
    /// 净值日期
    pub nav_date: NaiveDate,
    /// 与净值同日的收盘价，溢价率基于此计算
    pub close_price: f64,
    pub fund_type: FundType,
    /// 溢价率（百分比）
    pub premium_rate: f64,
    /// 净值延迟天数（北京时间今日 - 净值日期）
    pub nav_delay_days: i64,
    /// 扣除套利成本后的净收益（百分比）
    pub net_profit: f64,
    /// 近期溢价历史，仅 Top 基金有
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub premium_history: Option<Vec<DailyPremium>>,
}

/// 套利成本（百分比）
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct ArbitrageCosts {
    /// 溢价套利成本：场外申购 + 场内卖出
    pub premium: f64,
    /// 折价套利成本：场内买入 + 场外赎回
    pub discount: f64,
}

/// 特别关注基金的状态
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WatchStatus {
    /// 在溢价排行中
    Premium,
    /// 有数据但为折价（或平价）
    Discount,
    /// 未获取到可比数据
    Missing,
}

/// 特别关注基金
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct WatchFund {
    pub code: String,
    pub status: WatchStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fund: Option<FundWithPremium>,
}

/// 一次完整计算的结果快照
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CalculationResult {
    /// 计算完成时间（北京时间 ISO 8601）
    pub execution_time: String,
    /// 成功获取净值和同日价格的基金数
    pub success_count: usize,
    /// 跳过 / 获取失败的基金数
    pub failed_count: usize,
    /// 溢价率 > 0 的可比基金数
    pub premium_fund_count: usize,
    /// 参考净值日期（出现次数最多的净值日期）
    pub most_common_nav_date: Option<NaiveDate>,
    /// 因净值日期与参考日期不一致而排除的基金数
    pub excluded_count: usize,
    pub arbitrage_costs: ArbitrageCosts,
    /// 判定存在套利机会的净收益阈值
    pub arbitrage_threshold: f64,
    /// 净收益达到阈值的可比基金数
    pub arbitrage_count: usize,
    /// 按溢价率降序排列的溢价基金
    pub top_premium_funds: Vec<FundWithPremium>,
    pub watch_funds: Vec<WatchFund>,
    /// 全部可比基金（发现顺序）
    pub all_funds: Vec<FundWithPremium>,
}
