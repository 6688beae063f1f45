//! 批处理调度（进度状态机）
//!
//! 状态流转：idle → running → completed | error，只有 reset() 能回到 idle。
//!
//! 调用约定：先调用一次 start()，然后反复调用 next_batch() 直到状态不再是 running。
//! 每批结束时先写累积结果再写进度，持久化的进度是断点续跑的唯一依据。
//!
//! 同一轮运行的 next_batch() 不做并发保护，调用方需保证同一时刻只有一个驱动者
//! （一个定时任务或一个手动触发循环）。

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::PremiumConfig;
use crate::error::{PremiumError, Result};
use crate::models::{BatchAccumulator, BatchProgress, CalculationResult, Fund};
use crate::services::cache::{
    get_json, put_json, CacheStore, BATCH_RESULTS_KEY, FUND_LIST_KEY, PROGRESS_KEY, REPORT_KEY,
};
use crate::services::premium::aggregator::ResultAggregator;
use crate::services::premium::calculator::{build_fund_with_premium, prioritize, screen_fund, SkipReason};
use crate::services::premium::orchestrator::{FetchOrchestrator, RatePolicy};
use crate::services::sources::{fetch_all_funds, FundListSource, NavSource, PriceHistorySource};

/// 当前时间来源
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub struct BatchScheduler {
    fund_list: Arc<dyn FundListSource>,
    nav_source: Arc<dyn NavSource>,
    price_source: Arc<dyn PriceHistorySource>,
    store: Arc<dyn CacheStore>,
    config: PremiumConfig,
    clock: Clock,
}

impl BatchScheduler {
    pub fn new(
        fund_list: Arc<dyn FundListSource>,
        nav_source: Arc<dyn NavSource>,
        price_source: Arc<dyn PriceHistorySource>,
        store: Arc<dyn CacheStore>,
        config: PremiumConfig,
    ) -> Self {
        Self {
            fund_list,
            nav_source,
            price_source,
            store,
            config,
            clock: Arc::new(Utc::now),
        }
    }

    /// 替换时间来源
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    fn batch_size(&self) -> usize {
        self.config.batch_size.max(1)
    }

    /// 当前持久化的进度，不存在视为 idle
    pub async fn progress(&self) -> Result<BatchProgress> {
        Ok(get_json(self.store.as_ref(), PROGRESS_KEY)
            .await?
            .unwrap_or_else(BatchProgress::idle))
    }

    /// 最近一次完成计算的报告
    pub async fn cached_result(&self) -> Result<Option<CalculationResult>> {
        get_json(self.store.as_ref(), REPORT_KEY).await
    }

    /// 开始新一轮计算
    ///
    /// 获取并筛选基金列表，初始化累积结果与进度。
    /// 列表获取失败时返回 `ListFetch`，不改动已有状态。
    pub async fn start(&self) -> Result<BatchProgress> {
        let previous = self.progress().await?;
        if previous.is_running() {
            log::warn!(
                "⚠️ 上一轮计算仍在进行（第 {}/{} 批），重新开始",
                previous.current_batch,
                previous.total_batches
            );
        }

        let funds = self.fetch_universe().await?;
        let ttl = self.config.state_ttl_secs;
        let progress = BatchProgress::running(funds.len(), self.batch_size(), (self.clock)());

        put_json(self.store.as_ref(), FUND_LIST_KEY, &funds, ttl).await?;
        put_json(self.store.as_ref(), BATCH_RESULTS_KEY, &BatchAccumulator::default(), ttl).await?;
        put_json(self.store.as_ref(), PROGRESS_KEY, &progress, ttl).await?;

        log::info!(
            "🚀 开始计算：{} 只基金，每批 {} 只，共 {} 批",
            progress.total_funds,
            self.batch_size(),
            progress.total_batches
        );
        Ok(progress)
    }

    /// 处理下一批基金
    ///
    /// 非 running 状态直接返回当前进度；基金全部处理完后生成最终报告。
    pub async fn next_batch(&self) -> Result<BatchProgress> {
        let mut progress = self.progress().await?;
        if !progress.is_running() {
            return Ok(progress);
        }

        let funds: Option<Vec<Fund>> = get_json(self.store.as_ref(), FUND_LIST_KEY).await?;
        let accumulator: Option<BatchAccumulator> =
            get_json(self.store.as_ref(), BATCH_RESULTS_KEY).await?;
        let (funds, mut accumulator) = match (funds, accumulator) {
            (Some(funds), Some(accumulator)) => (funds, accumulator),
            (funds, _) => {
                let missing = if funds.is_none() { "基金列表" } else { "累积结果" };
                let error = PremiumError::StateCorruption(format!("{}缺失", missing));
                return self.mark_error(progress, error).await;
            }
        };

        let batch_size = self.batch_size();
        let start = progress.current_batch * batch_size;
        let batch: Vec<&Fund> = funds.iter().skip(start).take(batch_size).collect();
        let now = (self.clock)();
        let mut orchestrator = FetchOrchestrator::new(
            self.nav_source.clone(),
            self.price_source.clone(),
            RatePolicy::from(&self.config),
        );

        if batch.is_empty() {
            progress.complete(now);
            let aggregator = ResultAggregator::new(self.store.clone(), self.config.clone());
            if let Err(e) = aggregator
                .finalize(accumulator, progress.total_funds, &mut orchestrator, now)
                .await
            {
                return self.mark_error(progress, e).await;
            }
            put_json(self.store.as_ref(), PROGRESS_KEY, &progress, self.config.state_ttl_secs).await?;
            log::info!("🏁 全部 {} 批处理完成", progress.total_batches);
            return Ok(progress);
        }

        let codes: Vec<String> = batch.iter().map(|f| f.code.clone()).collect();
        let failures: HashMap<String, PremiumError> =
            orchestrator.prefetch_nav(&codes).await.into_iter().collect();

        let mut succeeded = 0;
        for fund in batch {
            if let Some(e) = failures.get(&fund.code) {
                log::warn!("✗ {} {}: {}", fund.code, fund.name, e);
                continue;
            }
            match self.process_fund(&mut orchestrator, fund, &mut accumulator, now).await {
                Ok(true) => succeeded += 1,
                Ok(false) => {}
                Err(e) if e.is_recoverable() => log::warn!("✗ {} {}: {}", fund.code, fund.name, e),
                Err(e) => return Err(e),
            }
        }

        let ttl = self.config.state_ttl_secs;
        put_json(self.store.as_ref(), BATCH_RESULTS_KEY, &accumulator, ttl).await?;
        progress.advance(batch_size, accumulator.results.len());
        put_json(self.store.as_ref(), PROGRESS_KEY, &progress, ttl).await?;

        log::info!(
            "📦 第 {}/{} 批完成：本批成功 {}/{}，累计 {}/{}",
            progress.current_batch,
            progress.total_batches,
            succeeded,
            codes.len(),
            progress.processed_funds,
            progress.total_funds
        );
        Ok(progress)
    }

    /// 清除本轮运行的全部中间状态，可重复调用
    pub async fn reset(&self) -> Result<()> {
        for key in [FUND_LIST_KEY, BATCH_RESULTS_KEY, PROGRESS_KEY] {
            self.store.delete(key).await?;
        }
        log::info!("🔄 已重置计算状态");
        Ok(())
    }

    /// 单只基金，算出溢价率时返回 true
    ///
    /// 取得估值即记录净值日期；净值缺失或同日价格缺失都跳过
    async fn process_fund(
        &self,
        orchestrator: &mut FetchOrchestrator,
        fund: &Fund,
        accumulator: &mut BatchAccumulator,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let Some(valuation) = orchestrator.latest_valuation(&fund.code).await? else {
            log::warn!("✗ {} {}: 净值数据为空", fund.code, fund.name);
            return Ok(false);
        };
        accumulator.nav_dates.push(valuation.nav_date);

        let Some(close) = orchestrator.close_on(&fund.code, valuation.nav_date).await? else {
            log::warn!(
                "✗ {} {}: 缺少 {} 的收盘价",
                fund.code,
                fund.name,
                valuation.nav_date
            );
            return Ok(false);
        };

        let item = build_fund_with_premium(fund, valuation, close, now);
        log::debug!(
            "✓ {} {}: 价格={:.4}, 净值={:.4}({}), 溢价率={:.2}%",
            item.code,
            item.name,
            item.close_price,
            item.nav,
            item.nav_date,
            item.premium_rate
        );
        accumulator.results.push(item);
        Ok(true)
    }

    /// 获取、筛选并排序基金列表；列表获取按配置重试
    async fn fetch_universe(&self) -> Result<Vec<Fund>> {
        let retries = self.config.list_retries;
        let mut attempt = 0;
        let records = loop {
            let error = match fetch_all_funds(self.fund_list.as_ref(), self.config.page_size).await {
                Ok(records) if !records.is_empty() => break records,
                Ok(_) => "上游未返回任何基金记录".to_string(),
                Err(e) => e.to_string(),
            };
            if attempt >= retries {
                log::error!("❌ 获取 LOF 基金列表失败（已重试 {} 次）: {}", retries, error);
                return Err(PremiumError::ListFetch(error));
            }
            attempt += 1;
            log::warn!(
                "⚠️ 获取基金列表失败（第 {} 次尝试），{} 毫秒后重试: {}",
                attempt,
                self.config.list_retry_delay_ms,
                error
            );
            if self.config.list_retry_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.list_retry_delay_ms)).await;
            }
        };

        let original_count = records.len();
        let mut skipped: HashMap<SkipReason, usize> = HashMap::new();
        let funds: Vec<Fund> = records
            .iter()
            .filter_map(|record| match screen_fund(record, &self.config) {
                Ok(fund) => Some(fund),
                Err(reason) => {
                    *skipped.entry(reason).or_insert(0) += 1;
                    None
                }
            })
            .collect();

        log::info!("预筛选完成: {} -> {} 只基金", original_count, funds.len());
        for (reason, count) in &skipped {
            log::info!("  跳过原因 - {}: {} 只", reason.label(), count);
        }

        if funds.is_empty() {
            return Err(PremiumError::ListFetch("筛选后无有效基金".to_string()));
        }
        Ok(prioritize(funds))
    }

    /// 进度置为 error 并持久化
    async fn mark_error(&self, mut progress: BatchProgress, error: PremiumError) -> Result<BatchProgress> {
        log::error!("❌ 批处理中止: {}", error);
        progress.fail(error.to_string());
        put_json(self.store.as_ref(), PROGRESS_KEY, &progress, self.config.state_ttl_secs).await?;
        Ok(progress)
    }
}
