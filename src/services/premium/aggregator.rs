//! 结果汇总
//!
//! 全部批次完成后，把累积的单基金结果整理为最终报告：
//! 1. 选出参考净值日期（所有成功取得的估值中出现次数最多的净值日期，
//!    包括之后因缺少同日收盘价而跳过的基金）
//! 2. 剔除净值日期与参考日期不一致的基金
//! 3. 溢价基金按溢价率降序排名
//! 4. 为排名靠前的基金补充近期溢价历史（失败不影响整体）
//! 5. 整理特别关注基金，写入缓存

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::PremiumConfig;
use crate::error::Result;
use crate::models::{BatchAccumulator, CalculationResult, FundWithPremium, WatchFund, WatchStatus};
use crate::services::cache::{put_json, CacheStore, REPORT_KEY};
use crate::services::premium::calculator::{is_arbitrage_opportunity, ARBITRAGE_COSTS};
use crate::services::premium::orchestrator::FetchOrchestrator;
use crate::services::sources::common::format_beijing;

/// 出现次数最多的净值日期，次数相同时取最先出现的
pub fn most_common_nav_date(dates: &[NaiveDate]) -> Option<NaiveDate> {
    let mut counts: HashMap<NaiveDate, usize> = HashMap::new();
    let mut order: Vec<NaiveDate> = Vec::new();
    for &date in dates {
        let count = counts.entry(date).or_insert(0);
        if *count == 0 {
            order.push(date);
        }
        *count += 1;
    }

    let mut best: Option<(NaiveDate, usize)> = None;
    for date in order {
        let count = counts[&date];
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((date, count));
        }
    }
    best.map(|(date, _)| date)
}

/// 溢价率 > 0 的基金按溢价率降序，相同溢价率保持原顺序
pub fn rank_premium(funds: &[FundWithPremium]) -> Vec<FundWithPremium> {
    let mut ranked: Vec<FundWithPremium> = funds
        .iter()
        .filter(|f| f.premium_rate > 0.0)
        .cloned()
        .collect();
    ranked.sort_by(|a, b| b.premium_rate.total_cmp(&a.premium_rate));
    ranked
}

/// 特别关注基金的状态
pub fn watch_funds(
    watch_list: &[String],
    ranked: &[FundWithPremium],
    comparable: &[FundWithPremium],
) -> Vec<WatchFund> {
    watch_list
        .iter()
        .map(|code| {
            if let Some(fund) = ranked.iter().find(|f| &f.code == code) {
                return WatchFund {
                    code: code.clone(),
                    status: WatchStatus::Premium,
                    fund: Some(fund.clone()),
                };
            }
            match comparable.iter().find(|f| &f.code == code) {
                Some(fund) => WatchFund {
                    code: code.clone(),
                    status: WatchStatus::Discount,
                    fund: Some(fund.clone()),
                },
                None => WatchFund {
                    code: code.clone(),
                    status: WatchStatus::Missing,
                    fund: None,
                },
            }
        })
        .collect()
}

pub struct ResultAggregator {
    store: Arc<dyn CacheStore>,
    config: PremiumConfig,
}

impl ResultAggregator {
    pub fn new(store: Arc<dyn CacheStore>, config: PremiumConfig) -> Self {
        Self { store, config }
    }

    /// 生成最终报告并写入缓存
    ///
    /// `total_funds` 为本轮基金总数，未成功的都计入失败数
    pub async fn finalize(
        &self,
        accumulator: BatchAccumulator,
        total_funds: usize,
        orchestrator: &mut FetchOrchestrator,
        now: DateTime<Utc>,
    ) -> Result<CalculationResult> {
        let BatchAccumulator { results, nav_dates } = accumulator;
        let success_count = results.len();
        let reference_date = most_common_nav_date(&nav_dates);

        let comparable: Vec<FundWithPremium> = results
            .into_iter()
            .filter(|f| Some(f.nav_date) == reference_date)
            .collect();
        let excluded_count = success_count - comparable.len();
        if excluded_count > 0 {
            log::info!(
                "📅 参考净值日期 {:?}，剔除 {} 只净值日期不一致的基金",
                reference_date,
                excluded_count
            );
        }

        let mut ranked = rank_premium(&comparable);
        self.enrich_top(&mut ranked, orchestrator).await;

        let arbitrage_count = comparable
            .iter()
            .filter(|f| is_arbitrage_opportunity(f.net_profit, self.config.arbitrage_threshold))
            .count();

        let result = CalculationResult {
            execution_time: format_beijing(now),
            success_count,
            failed_count: total_funds.saturating_sub(success_count),
            premium_fund_count: ranked.len(),
            most_common_nav_date: reference_date,
            excluded_count,
            arbitrage_costs: ARBITRAGE_COSTS,
            arbitrage_threshold: self.config.arbitrage_threshold,
            arbitrage_count,
            watch_funds: watch_funds(&self.config.watch_list, &ranked, &comparable),
            top_premium_funds: ranked,
            all_funds: comparable,
        };

        put_json(self.store.as_ref(), REPORT_KEY, &result, self.config.report_ttl_secs).await?;
        log::info!(
            "✅ 生成报告完成：成功 {} 只，失败 {} 只，溢价 {} 只，套利机会 {} 只",
            result.success_count,
            result.failed_count,
            result.premium_fund_count,
            result.arbitrage_count
        );
        Ok(result)
    }

    /// 为排名前 N 的基金补充溢价历史，单只失败只记录日志
    async fn enrich_top(&self, ranked: &mut [FundWithPremium], orchestrator: &mut FetchOrchestrator) {
        let top_n = self.config.enrich_top_n.min(ranked.len());
        if top_n == 0 {
            return;
        }
        let codes: Vec<String> = ranked[..top_n].iter().map(|f| f.code.clone()).collect();
        let histories = orchestrator
            .premium_histories(&codes, self.config.history_days)
            .await;

        for (fund, (code, history)) in ranked.iter_mut().zip(histories) {
            match history {
                Ok(history) if !history.is_empty() => fund.premium_history = Some(history),
                Ok(_) => log::warn!("⚠️ {} 没有可对齐的溢价历史", code),
                Err(e) => log::warn!("⚠️ {} 溢价历史获取失败: {}", code, e),
            }
        }
    }
}
