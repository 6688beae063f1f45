//! 错误类型
//!
//! 溢价计算流水线的错误分类：
//! - `ListFetch`：基金列表获取失败，`start()` 直接中止
//! - `PerFundFetch` / `Parse`：单只基金获取或解析失败，跳过该基金
//! - `StateCorruption`：持久化状态缺失，进度置为 error
//! - `Cache`：存储读写或序列化失败

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PremiumError {
    #[error("获取基金列表失败: {0}")]
    ListFetch(String),

    #[error("获取基金 {code} 数据失败: {message}")]
    PerFundFetch { code: String, message: String },

    #[error("解析 {context} 失败: {message}")]
    Parse { context: String, message: String },

    #[error("持久化状态损坏: {0}")]
    StateCorruption(String),

    #[error("缓存存储错误: {0}")]
    Cache(String),
}

impl PremiumError {
    pub fn per_fund(code: &str, message: impl ToString) -> Self {
        PremiumError::PerFundFetch {
            code: code.to_string(),
            message: message.to_string(),
        }
    }

    pub fn parse(context: impl ToString, message: impl ToString) -> Self {
        PremiumError::Parse {
            context: context.to_string(),
            message: message.to_string(),
        }
    }

    /// 单只基金级别的错误，可跳过继续处理
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PremiumError::PerFundFetch { .. } | PremiumError::Parse { .. }
        )
    }
}

impl From<serde_json::Error> for PremiumError {
    fn from(e: serde_json::Error) -> Self {
        PremiumError::Cache(format!("序列化失败: {}", e))
    }
}

impl From<std::io::Error> for PremiumError {
    fn from(e: std::io::Error) -> Self {
        PremiumError::Cache(format!("IO 错误: {}", e))
    }
}

pub type Result<T> = std::result::Result<T, PremiumError>;
