//! 溢价率计算
//!
//! 纯函数：基金分类、溢价率、套利净收益、净值延迟天数，
//! 以及进入流水线前的基金筛选和优先级排序。

use chrono::{DateTime, NaiveDate, Utc};

use crate::config::PremiumConfig;
use crate::models::{ArbitrageCosts, Fund, FundRecord, FundType, FundWithPremium, Valuation};
use crate::services::sources::common::beijing_date;

/// 溢价套利成本（场外申购费 + 场内卖出佣金，百分比）
pub const PREMIUM_ARBITRAGE_COST: f64 = 0.16;
/// 折价套利成本（场内买入佣金 + 场外赎回费，百分比）
pub const DISCOUNT_ARBITRAGE_COST: f64 = 0.51;

pub const ARBITRAGE_COSTS: ArbitrageCosts = ArbitrageCosts {
    premium: PREMIUM_ARBITRAGE_COST,
    discount: DISCOUNT_ARBITRAGE_COST,
};

/// 分类规则：名称包含任一关键字即命中
#[derive(Debug)]
pub struct ClassificationRule {
    pub fund_type: FundType,
    pub keywords: &'static [&'static str],
}

/// 分类规则表，按顺序匹配，先命中者生效（QDII 优先于商品）
pub const CLASSIFICATION_RULES: &[ClassificationRule] = &[
    ClassificationRule {
        fund_type: FundType::Qdii,
        keywords: &[
            "QDII", "海外", "港股", "美股", "全球", "纳斯达克", "纳指", "标普", "恒生", "日经",
            "德国", "法国", "印度", "越南", "亚太", "新兴市场",
        ],
    },
    ClassificationRule {
        fund_type: FundType::Commodity,
        keywords: &["黄金", "白银", "原油", "石油", "商品", "贵金属", "有色", "豆粕", "能源化工"],
    },
];

/// 债券 / 货币类基金关键字，这类基金几乎没有溢价
const BOND_KEYWORDS: &[&str] = &[
    "债券", "货币", "短债", "纯债", "中债", "国债", "信用债", "可转债", "企业债", "政府债", "同业存单",
];

/// 货币 ETF 代码前缀
const MONEY_ETF_PREFIX: &str = "511";

/// 优先处理的基金关键字（更可能出现溢价）
const PRIORITY_KEYWORDS: &[&str] = &[
    "原油", "黄金", "商品", "海外", "港股", "美股", "QDII", "石油", "贵金属", "有色", "煤炭", "钢铁",
];

/// 四舍五入保留 2 位小数
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// 按名称分类基金
pub fn classify(name: &str) -> FundType {
    CLASSIFICATION_RULES
        .iter()
        .find(|rule| rule.keywords.iter().any(|k| name.contains(k)))
        .map(|rule| rule.fund_type)
        .unwrap_or(FundType::Normal)
}

/// 溢价率（百分比）= (价格 - 净值) / 净值 * 100
///
/// 净值 <= 0 时返回 0
pub fn premium_rate(price: f64, nav: f64) -> f64 {
    if nav <= 0.0 {
        return 0.0;
    }
    round2((price - nav) / nav * 100.0)
}

/// 扣除套利成本后的净收益（百分比）
///
/// 溢价时做溢价套利，否则按折价套利计算。结果可能为负，表示无利可图。
pub fn net_profit(premium_rate: f64) -> f64 {
    if premium_rate > 0.0 {
        round2(premium_rate - PREMIUM_ARBITRAGE_COST)
    } else {
        round2(premium_rate.abs() - DISCOUNT_ARBITRAGE_COST)
    }
}

/// 净值延迟天数：北京时间今日与净值日期相差的日历天数
pub fn nav_delay_days(nav_date: NaiveDate, now: DateTime<Utc>) -> i64 {
    (beijing_date(now) - nav_date).num_days()
}

/// 是否达到套利机会阈值
pub fn is_arbitrage_opportunity(net_profit: f64, threshold: f64) -> bool {
    net_profit >= threshold
}

/// 基金被跳过的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// 价格缺失、非正或超出合理范围
    AbnormalPrice,
    /// 价格低于下限，多为数据问题
    LowPrice,
    /// 债券 / 货币类基金
    BondOrMoney,
    /// 货币 ETF
    MoneyEtf,
}

impl SkipReason {
    pub fn label(&self) -> &'static str {
        match self {
            SkipReason::AbnormalPrice => "价格异常",
            SkipReason::LowPrice => "价格过低",
            SkipReason::BondOrMoney => "债券/货币类基金",
            SkipReason::MoneyEtf => "货币ETF",
        }
    }
}

/// 筛选基金列表记录，通过则转为 `Fund`
pub fn screen_fund(record: &FundRecord, config: &PremiumConfig) -> Result<Fund, SkipReason> {
    let price = match record.price {
        Some(p) if p > 0.0 && p <= config.max_price => p,
        _ => return Err(SkipReason::AbnormalPrice),
    };
    if BOND_KEYWORDS.iter().any(|k| record.name.contains(k)) {
        return Err(SkipReason::BondOrMoney);
    }
    if record.code.starts_with(MONEY_ETF_PREFIX) {
        return Err(SkipReason::MoneyEtf);
    }
    if price < config.min_price {
        return Err(SkipReason::LowPrice);
    }

    Ok(Fund {
        code: record.code.clone(),
        name: record.name.clone(),
        market_price: price,
        change_percent: record.change_percent.unwrap_or(0.0),
    })
}

/// 优先级排序：名称含优先关键字的基金排在前面，组内保持原顺序
pub fn prioritize(funds: Vec<Fund>) -> Vec<Fund> {
    let (mut priority, normal): (Vec<Fund>, Vec<Fund>) = funds
        .into_iter()
        .partition(|f| PRIORITY_KEYWORDS.iter().any(|k| f.name.contains(k)));
    priority.extend(normal);
    priority
}

/// 组合基金、估值与同日收盘价，计算全部字段
pub fn build_fund_with_premium(
    fund: &Fund,
    valuation: Valuation,
    close_price: f64,
    now: DateTime<Utc>,
) -> FundWithPremium {
    let rate = premium_rate(close_price, valuation.nav);
    FundWithPremium {
        code: fund.code.clone(),
        name: fund.name.clone(),
        market_price: fund.market_price,
        change_percent: fund.change_percent,
        nav: valuation.nav,
        nav_date: valuation.nav_date,
        close_price,
        fund_type: classify(&fund.name),
        premium_rate: rate,
        nav_delay_days: nav_delay_days(valuation.nav_date, now),
        net_profit: net_profit(rate),
        premium_history: None,
    }
}
