//! 限速抓取编排
//!
//! 上游对请求频率有未公开的限制，超限后返回空数据而不是报错。
//! 这里统一控制请求节奏：
//! - 净值请求按小组并发，组间休眠
//! - 价格请求串行，每次请求间隔固定时长
//! - Top 基金历史补充按小组并发，组间休眠
//!
//! 每个实例自带本次调用内的缓存（代码 → 整段历史），同一基金只请求一次。
//! 实例随调用创建、随调用丢弃，不跨调用共享。

use chrono::NaiveDate;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::PremiumConfig;
use crate::error::Result;
use crate::models::{DailyPremium, NavPoint, PricePoint, Valuation};
use crate::services::premium::calculator::premium_rate;
use crate::services::sources::{NavSource, PriceHistorySource};

/// 限速参数
#[derive(Debug, Clone, Copy)]
pub struct RatePolicy {
    pub nav_concurrency: usize,
    pub nav_group_delay: Duration,
    pub price_delay: Duration,
    pub history_concurrency: usize,
    pub history_group_delay: Duration,
}

impl From<&PremiumConfig> for RatePolicy {
    fn from(config: &PremiumConfig) -> Self {
        Self {
            nav_concurrency: config.nav_concurrency.clamp(1, 10),
            nav_group_delay: Duration::from_millis(config.nav_group_delay_ms),
            price_delay: Duration::from_millis(config.price_delay_ms),
            history_concurrency: config.history_concurrency.clamp(1, 10),
            history_group_delay: Duration::from_millis(config.history_group_delay_ms),
        }
    }
}

async fn pause(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}

pub struct FetchOrchestrator {
    nav_source: Arc<dyn NavSource>,
    price_source: Arc<dyn PriceHistorySource>,
    policy: RatePolicy,
    nav_cache: HashMap<String, Vec<NavPoint>>,
    price_cache: HashMap<String, Vec<PricePoint>>,
    /// 是否已发出过价格请求（首个请求前不休眠）
    price_requested: bool,
}

impl FetchOrchestrator {
    pub fn new(
        nav_source: Arc<dyn NavSource>,
        price_source: Arc<dyn PriceHistorySource>,
        policy: RatePolicy,
    ) -> Self {
        Self {
            nav_source,
            price_source,
            policy,
            nav_cache: HashMap::new(),
            price_cache: HashMap::new(),
            price_requested: false,
        }
    }

    /// 分组并发预取净值历史
    ///
    /// 返回获取失败的代码及错误；成功的结果写入缓存（空历史也缓存）
    pub async fn prefetch_nav(&mut self, codes: &[String]) -> Vec<(String, crate::error::PremiumError)> {
        let pending: Vec<&String> = codes
            .iter()
            .filter(|c| !self.nav_cache.contains_key(c.as_str()))
            .collect();

        let mut failures = Vec::new();
        for (i, group) in pending.chunks(self.policy.nav_concurrency).enumerate() {
            if i > 0 {
                pause(self.policy.nav_group_delay).await;
            }
            let source = self.nav_source.clone();
            let results = join_all(group.iter().map(|code| {
                let source = source.clone();
                async move { source.fetch_nav_history(code).await }
            }))
            .await;

            for (code, result) in group.iter().zip(results) {
                match result {
                    Ok(points) => {
                        self.nav_cache.insert((*code).clone(), points);
                    }
                    Err(e) => failures.push(((*code).clone(), e)),
                }
            }
        }
        failures
    }

    /// 完整净值历史（优先读缓存）
    pub async fn nav_history(&mut self, code: &str) -> Result<&[NavPoint]> {
        if !self.nav_cache.contains_key(code) {
            let points = self.nav_source.fetch_nav_history(code).await?;
            self.nav_cache.insert(code.to_string(), points);
        }
        Ok(self.nav_cache.get(code).map(|v| v.as_slice()).unwrap_or(&[]))
    }

    /// 最新估值；历史为空返回 None
    pub async fn latest_valuation(&mut self, code: &str) -> Result<Option<Valuation>> {
        Ok(self.nav_history(code).await?.last().copied().map(Valuation::from))
    }

    /// 完整日K线历史（优先读缓存），串行请求之间固定间隔
    pub async fn price_history(&mut self, code: &str) -> Result<&[PricePoint]> {
        if !self.price_cache.contains_key(code) {
            if self.price_requested {
                pause(self.policy.price_delay).await;
            }
            self.price_requested = true;
            let points = self.price_source.fetch_price_history(code).await?;
            self.price_cache.insert(code.to_string(), points);
        }
        Ok(self.price_cache.get(code).map(|v| v.as_slice()).unwrap_or(&[]))
    }

    /// 指定日期的收盘价；当日无记录返回 None
    pub async fn close_on(&mut self, code: &str, date: NaiveDate) -> Result<Option<f64>> {
        Ok(self
            .price_history(code)
            .await?
            .iter()
            .find(|p| p.date == date)
            .map(|p| p.close))
    }

    /// 为多只基金获取近 `days` 个对齐交易日的溢价历史
    ///
    /// 分组并发，组间休眠；结果与输入顺序一致。
    /// 已缓存的历史直接复用，不再请求。
    pub async fn premium_histories(
        &mut self,
        codes: &[String],
        days: usize,
    ) -> Vec<(String, Result<Vec<DailyPremium>>)> {
        let mut out = Vec::with_capacity(codes.len());

        for (i, group) in codes.chunks(self.policy.history_concurrency).enumerate() {
            if i > 0 {
                pause(self.policy.history_group_delay).await;
            }

            let fetches = group.iter().map(|code| {
                let nav_source = self.nav_source.clone();
                let price_source = self.price_source.clone();
                let cached_nav = self.nav_cache.get(code).cloned();
                let cached_price = self.price_cache.get(code).cloned();
                async move {
                    let nav = match cached_nav {
                        Some(points) => points,
                        None => nav_source.fetch_nav_history(code).await?,
                    };
                    let prices = match cached_price {
                        Some(points) => points,
                        None => price_source.fetch_price_history(code).await?,
                    };
                    Ok::<_, crate::error::PremiumError>((nav, prices))
                }
            });
            let results = join_all(fetches).await;

            for (code, result) in group.iter().zip(results) {
                let history = result.map(|(nav, prices)| {
                    let history = merge_premium_history(&nav, &prices, days);
                    self.nav_cache.insert(code.clone(), nav);
                    self.price_cache.insert(code.clone(), prices);
                    history
                });
                out.push((code.clone(), history));
            }
        }
        out
    }
}

/// 按日期对齐净值与收盘价，取最近 `days` 个交易日，日期升序
pub fn merge_premium_history(nav: &[NavPoint], prices: &[PricePoint], days: usize) -> Vec<DailyPremium> {
    let nav_by_date: HashMap<NaiveDate, f64> = nav.iter().map(|p| (p.date, p.nav)).collect();

    let mut merged: Vec<DailyPremium> = prices
        .iter()
        .filter_map(|p| {
            let nav = *nav_by_date.get(&p.date)?;
            Some(DailyPremium {
                date: p.date,
                nav,
                price: p.close,
                premium_rate: premium_rate(p.close, nav),
            })
        })
        .collect();

    merged.sort_by_key(|d| d.date);
    let skip = merged.len().saturating_sub(days);
    merged.split_off(skip)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PremiumError;
    use crate::services::testing::{date, price_point, MockNav, MockPrices};

    fn nav_point(date: NaiveDate, nav: f64) -> NavPoint {
        NavPoint { date, nav }
    }

    fn orchestrator(nav: Arc<MockNav>, prices: Arc<MockPrices>) -> FetchOrchestrator {
        FetchOrchestrator::new(nav, prices, RatePolicy::from(&PremiumConfig::without_delays()))
    }

    #[test]
    fn test_rate_policy_clamps_concurrency() {
        let config = PremiumConfig {
            nav_concurrency: 50,
            history_concurrency: 0,
            ..PremiumConfig::default()
        };
        let policy = RatePolicy::from(&config);
        assert_eq!(policy.nav_concurrency, 10);
        assert_eq!(policy.history_concurrency, 1);
        assert_eq!(policy.price_delay, Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_latest_valuation_is_cached() {
        let nav = Arc::new(MockNav::new().with_series(
            "161226",
            vec![nav_point(date(2024, 3, 13), 0.99), nav_point(date(2024, 3, 14), 1.0)],
        ));
        let prices = Arc::new(MockPrices::new());
        let mut orch = orchestrator(nav.clone(), prices);

        let v = orch.latest_valuation("161226").await.unwrap().unwrap();
        assert_eq!(v.nav_date, date(2024, 3, 14));
        assert_eq!(v.nav, 1.0);

        orch.latest_valuation("161226").await.unwrap();
        orch.nav_history("161226").await.unwrap();
        assert_eq!(nav.calls("161226"), 1);
    }

    #[tokio::test]
    async fn test_empty_history_is_a_miss() {
        let nav = Arc::new(MockNav::new());
        let prices = Arc::new(MockPrices::new());
        let mut orch = orchestrator(nav, prices);

        assert_eq!(orch.latest_valuation("000001").await.unwrap(), None);
        assert_eq!(orch.close_on("000001", date(2024, 3, 14)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_prefetch_nav_reports_failures_and_skips_cached() {
        let nav = Arc::new(
            MockNav::new()
                .with_series("a", vec![nav_point(date(2024, 3, 14), 1.0)])
                .with_series("c", vec![nav_point(date(2024, 3, 14), 2.0)])
                .failing("b"),
        );
        let mut orch = orchestrator(nav.clone(), Arc::new(MockPrices::new()));
        let codes: Vec<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();

        let failures = orch.prefetch_nav(&codes).await;
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "b");
        assert!(failures[0].1.is_recoverable());

        orch.prefetch_nav(&codes).await;
        assert_eq!(nav.calls("a"), 1);
        assert_eq!(nav.calls("b"), 2);
        assert_eq!(nav.calls("d"), 1);

        let v = orch.latest_valuation("c").await.unwrap().unwrap();
        assert_eq!(v.nav, 2.0);
        assert_eq!(nav.calls("c"), 1);
    }

    #[tokio::test]
    async fn test_close_on_same_date_only() {
        let prices = Arc::new(MockPrices::new().with_series(
            "161226",
            vec![price_point(date(2024, 3, 13), 1.01), price_point(date(2024, 3, 14), 1.05)],
        ));
        let mut orch = orchestrator(Arc::new(MockNav::new()), prices.clone());

        assert_eq!(orch.close_on("161226", date(2024, 3, 14)).await.unwrap(), Some(1.05));
        assert_eq!(orch.close_on("161226", date(2024, 3, 15)).await.unwrap(), None);
        assert_eq!(prices.calls("161226"), 1);
    }

    #[tokio::test]
    async fn test_price_fetch_error_propagates() {
        let prices = Arc::new(MockPrices::new().failing("161226"));
        let mut orch = orchestrator(Arc::new(MockNav::new()), prices);
        assert!(matches!(
            orch.close_on("161226", date(2024, 3, 14)).await,
            Err(PremiumError::PerFundFetch { .. })
        ));
    }

    #[test]
    fn test_merge_premium_history_aligns_and_trims() {
        let nav: Vec<NavPoint> = (10..=14).map(|d| nav_point(date(2024, 3, d), 1.0)).collect();
        let prices = vec![
            price_point(date(2024, 3, 11), 1.01),
            price_point(date(2024, 3, 12), 1.02),
            price_point(date(2024, 3, 14), 1.04),
            price_point(date(2024, 3, 15), 1.05),
        ];

        let history = merge_premium_history(&nav, &prices, 2);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].date, date(2024, 3, 12));
        assert_eq!(history[0].premium_rate, 2.0);
        assert_eq!(history[1].date, date(2024, 3, 14));
        assert_eq!(history[1].price, 1.04);

        assert_eq!(merge_premium_history(&nav, &prices, 10).len(), 3);
    }

    #[tokio::test]
    async fn test_premium_histories_reuses_cache_and_keeps_order() {
        let nav = Arc::new(
            MockNav::new()
                .with_series("a", vec![nav_point(date(2024, 3, 14), 1.0)])
                .with_series("c", vec![nav_point(date(2024, 3, 14), 2.0)]),
        );
        let prices = Arc::new(
            MockPrices::new()
                .with_series("a", vec![price_point(date(2024, 3, 14), 1.1)])
                .with_series("c", vec![price_point(date(2024, 3, 14), 2.2)])
                .failing("b"),
        );
        let mut orch = orchestrator(nav.clone(), prices.clone());
        orch.latest_valuation("a").await.unwrap();
        orch.close_on("a", date(2024, 3, 14)).await.unwrap();

        let codes: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        let histories = orch.premium_histories(&codes, 10).await;

        let order: Vec<&str> = histories.iter().map(|(c, _)| c.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
        assert_eq!(histories[0].1.as_ref().unwrap()[0].premium_rate, 10.0);
        assert!(histories[1].1.is_err());
        assert_eq!(histories[2].1.as_ref().unwrap()[0].premium_rate, 10.0);

        assert_eq!(nav.calls("a"), 1);
        assert_eq!(prices.calls("a"), 1);
    }

    fn default_paced(nav: Arc<MockNav>, prices: Arc<MockPrices>) -> FetchOrchestrator {
        FetchOrchestrator::new(nav, prices, RatePolicy::from(&PremiumConfig::default()))
    }

    fn assert_elapsed(begin: tokio::time::Instant, expected_ms: u64) {
        let elapsed = begin.elapsed();
        assert!(elapsed >= Duration::from_millis(expected_ms), "{:?}", elapsed);
        assert!(elapsed < Duration::from_millis(expected_ms + 20), "{:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_nav_groups_are_spaced() {
        let nav = Arc::new(MockNav::new());
        let mut orch = default_paced(nav.clone(), Arc::new(MockPrices::new()));
        let codes: Vec<String> = (0..7).map(|i| format!("16000{}", i)).collect();

        let begin = tokio::time::Instant::now();
        orch.prefetch_nav(&codes).await;
        // 3 + 3 + 1，两次组间休眠
        assert_elapsed(begin, 400);
        assert_eq!(nav.total_calls(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_price_requests_are_serial_with_delay() {
        let prices = Arc::new(MockPrices::new());
        let mut orch = default_paced(Arc::new(MockNav::new()), prices.clone());

        let begin = tokio::time::Instant::now();
        for code in ["160001", "160002", "160003"] {
            orch.close_on(code, date(2024, 3, 14)).await.unwrap();
        }
        assert_elapsed(begin, 100);

        // 命中缓存不再休眠
        let begin = tokio::time::Instant::now();
        orch.close_on("160001", date(2024, 3, 13)).await.unwrap();
        assert_elapsed(begin, 0);
        assert_eq!(prices.total_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_history_groups_are_spaced() {
        let mut orch = default_paced(Arc::new(MockNav::new()), Arc::new(MockPrices::new()));
        let codes: Vec<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();

        let begin = tokio::time::Instant::now();
        let histories = orch.premium_histories(&codes, 10).await;
        assert_elapsed(begin, 300);
        assert_eq!(histories.len(), 4);
    }
}
