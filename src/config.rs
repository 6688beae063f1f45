//! 配置模块
//!
//! 支持从 JSON 文件加载系统配置，缺省字段使用默认值

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    #[serde(default = "default_host")]
    pub host: String,
    /// 监听端口
    #[serde(default = "default_port")]
    pub port: u16,
    /// 工作线程数（0 表示使用 CPU 核心数）
    #[serde(default)]
    pub workers: usize,
}

/// 上游接口配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// 请求超时时间（秒）
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// 连接超时时间（秒）
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 日志级别: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// 缓存存储后端
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// 进程内存（重启丢失）
    Memory,
    /// 目录下的 JSON 文件
    File,
}

/// 缓存配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_backend")]
    pub backend: CacheBackend,
    /// file 后端的存储目录
    #[serde(default = "default_cache_dir")]
    pub dir: String,
}

/// 溢价计算配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PremiumConfig {
    /// 每批处理的基金数
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// 基金列表分页大小
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// 净值并发分组大小
    #[serde(default = "default_nav_concurrency")]
    pub nav_concurrency: usize,
    /// 净值分组间隔（毫秒）
    #[serde(default = "default_nav_group_delay")]
    pub nav_group_delay_ms: u64,
    /// 串行价格请求间隔（毫秒）
    #[serde(default = "default_price_delay")]
    pub price_delay_ms: u64,
    /// Top 基金历史补充的并发分组大小
    #[serde(default = "default_history_concurrency")]
    pub history_concurrency: usize,
    #[serde(default = "default_history_group_delay")]
    pub history_group_delay_ms: u64,
    /// 溢价历史保留天数
    #[serde(default = "default_history_days")]
    pub history_days: usize,
    /// 补充溢价历史的 Top 基金数
    #[serde(default = "default_enrich_top_n")]
    pub enrich_top_n: usize,
    /// 判定存在套利机会的净收益阈值（百分比）
    #[serde(default = "default_arbitrage_threshold")]
    pub arbitrage_threshold: f64,
    /// 运行中间状态的 TTL（秒）
    #[serde(default = "default_state_ttl")]
    pub state_ttl_secs: u64,
    /// 最终报告的 TTL（秒）
    #[serde(default = "default_report_ttl")]
    pub report_ttl_secs: u64,
    /// 基金列表获取失败时的重试次数
    #[serde(default = "default_list_retries")]
    pub list_retries: u32,
    #[serde(default = "default_list_retry_delay")]
    pub list_retry_delay_ms: u64,
    /// 价格高于此值视为异常
    #[serde(default = "default_max_price")]
    pub max_price: f64,
    /// 价格低于此值视为异常
    #[serde(default = "default_min_price")]
    pub min_price: f64,
    /// 特别关注的基金代码
    #[serde(default = "default_watch_list")]
    pub watch_list: Vec<String>,
}

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub premium: PremiumConfig,
}

// 默认值函数
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_timeout() -> u64 { 30 }
fn default_connect_timeout() -> u64 { 10 }
fn default_log_level() -> String { "info".to_string() }
fn default_cache_backend() -> CacheBackend { CacheBackend::File }
fn default_cache_dir() -> String { "data/cache".to_string() }
fn default_batch_size() -> usize { 10 }
fn default_page_size() -> usize { 100 }
fn default_nav_concurrency() -> usize { 3 }
fn default_nav_group_delay() -> u64 { 200 }
fn default_price_delay() -> u64 { 50 }
fn default_history_concurrency() -> usize { 3 }
fn default_history_group_delay() -> u64 { 300 }
fn default_history_days() -> usize { 10 }
fn default_enrich_top_n() -> usize { 10 }
fn default_arbitrage_threshold() -> f64 { 0.5 }
fn default_state_ttl() -> u64 { 24 * 3600 }
fn default_report_ttl() -> u64 { 24 * 3600 }
fn default_list_retries() -> u32 { 3 }
fn default_list_retry_delay() -> u64 { 2000 }
fn default_max_price() -> f64 { 100.0 }
fn default_min_price() -> f64 { 0.5 }
fn default_watch_list() -> Vec<String> {
    vec!["161116".to_string(), "160723".to_string(), "161129".to_string()]
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: 0,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: default_cache_backend(),
            dir: default_cache_dir(),
        }
    }
}

impl Default for PremiumConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            page_size: default_page_size(),
            nav_concurrency: default_nav_concurrency(),
            nav_group_delay_ms: default_nav_group_delay(),
            price_delay_ms: default_price_delay(),
            history_concurrency: default_history_concurrency(),
            history_group_delay_ms: default_history_group_delay(),
            history_days: default_history_days(),
            enrich_top_n: default_enrich_top_n(),
            arbitrage_threshold: default_arbitrage_threshold(),
            state_ttl_secs: default_state_ttl(),
            report_ttl_secs: default_report_ttl(),
            list_retries: default_list_retries(),
            list_retry_delay_ms: default_list_retry_delay(),
            max_price: default_max_price(),
            min_price: default_min_price(),
            watch_list: default_watch_list(),
        }
    }
}

impl PremiumConfig {
    /// 不做任何限速的配置，测试使用
    #[cfg(test)]
    pub fn without_delays() -> Self {
        Self {
            nav_group_delay_ms: 0,
            price_delay_ms: 0,
            history_group_delay_ms: 0,
            list_retry_delay_ms: 0,
            ..Self::default()
        }
    }
}

/// 配置的加载结果
#[derive(Debug, Default)]
pub struct ConfigOrigin {
    /// 生效的配置文件，None 表示使用默认配置
    pub path: Option<String>,
    /// 存在但无法解析的配置文件
    pub failures: Vec<String>,
}

impl ConfigOrigin {
    pub fn log(&self) {
        for failure in &self.failures {
            log::warn!("加载配置文件失败 {}", failure);
        }
        match &self.path {
            Some(path) => log::info!("从 {} 加载配置成功", path),
            None => log::info!("使用默认配置"),
        }
    }
}

impl AppConfig {
    /// 从 JSON 文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// 加载配置，优先从文件，失败则使用默认值
    ///
    /// 加载时日志尚未初始化，来源和失败原因由 `ConfigOrigin::log` 在初始化后输出
    pub fn load() -> (Self, ConfigOrigin) {
        Self::load_from(&["config.json", "config/config.json"])
    }

    /// 依次尝试给定路径，第一个能解析的文件生效
    pub fn load_from<P: AsRef<Path>>(paths: &[P]) -> (Self, ConfigOrigin) {
        let mut origin = ConfigOrigin::default();

        for path in paths {
            let path = path.as_ref();
            if !path.exists() {
                continue;
            }
            match Self::from_file(path) {
                Ok(config) => {
                    origin.path = Some(path.display().to_string());
                    return (config, origin);
                }
                Err(e) => origin.failures.push(format!("{}: {}", path.display(), e)),
            }
        }

        (Self::default(), origin)
    }

    /// 获取服务器绑定地址
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
