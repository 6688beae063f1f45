//! 上游数据源
//!
//! ## 数据源
//! - 基金列表：东方财富 LOF 实时行情（分页）
//! - 单位净值：天天基金 pingzhongdata（整段历史）
//! - 日K线：东方财富 push2his（整段历史）
//!
//! 上游限流时通常返回空数据而不是报错，调用方不能把"请求成功"当作"数据新鲜"。

pub mod common;
mod fund_list;
mod kline;
mod nav;

pub use fund_list::fetch_all_funds;

use async_trait::async_trait;
use reqwest::Client;

use crate::config::ApiConfig;
use crate::error::Result;
use crate::models::{FundListPage, NavPoint, PricePoint};

/// 分页的基金列表
#[async_trait]
pub trait FundListSource: Send + Sync {
    /// 获取第 `page` 页（从 1 开始）
    async fn fetch_page(&self, page: usize, page_size: usize) -> Result<FundListPage>;
}

/// 单只基金的单位净值历史，按日期升序
#[async_trait]
pub trait NavSource: Send + Sync {
    async fn fetch_nav_history(&self, code: &str) -> Result<Vec<NavPoint>>;
}

/// 单只基金的日K线历史，按日期升序
#[async_trait]
pub trait PriceHistorySource: Send + Sync {
    async fn fetch_price_history(&self, code: &str) -> Result<Vec<PricePoint>>;
}

/// 东方财富 / 天天基金数据服务
///
/// 同时实现三个数据源 trait
#[derive(Debug, Clone)]
pub struct EastmoneyService {
    client: Client,
}

impl EastmoneyService {
    pub fn new(api: &ApiConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: common::build_client(api)?,
        })
    }
}
