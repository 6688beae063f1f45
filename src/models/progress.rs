//! 批处理进度模型

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::fund::FundWithPremium;

/// 批处理状态
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Error,
}

/// 一次运行的批处理进度
///
/// 每批处理完成后持久化，是断点续跑的唯一依据
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct BatchProgress {
    pub status: BatchStatus,
    pub total_funds: usize,
    pub processed_funds: usize,
    pub current_batch: usize,
    pub total_batches: usize,
    pub success_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 一次运行的累积结果，与进度一起持久化
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct BatchAccumulator {
    /// 成功计算出溢价率的基金
    pub results: Vec<FundWithPremium>,
    /// 每只成功取得估值的基金的净值日期（按处理顺序），
    /// 同日收盘价缺失的基金也计入，用于选出参考净值日期
    pub nav_dates: Vec<NaiveDate>,
}

impl BatchProgress {
    pub fn idle() -> Self {
        Self::default()
    }

    /// 新一轮运行的初始进度
    pub fn running(total_funds: usize, batch_size: usize, started_at: DateTime<Utc>) -> Self {
        Self {
            status: BatchStatus::Running,
            total_funds,
            processed_funds: 0,
            current_batch: 0,
            total_batches: total_funds.div_ceil(batch_size.max(1)),
            success_count: 0,
            started_at: Some(started_at),
            completed_at: None,
            error: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == BatchStatus::Running
    }

    /// 推进一批
    pub fn advance(&mut self, batch_size: usize, success_count: usize) {
        self.current_batch += 1;
        self.processed_funds = (self.current_batch * batch_size).min(self.total_funds);
        self.success_count = success_count;
    }

    pub fn complete(&mut self, at: DateTime<Utc>) {
        self.status = BatchStatus::Completed;
        self.completed_at = Some(at);
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = BatchStatus::Error;
        self.error = Some(message.into());
    }
}
