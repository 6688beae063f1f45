//! 公共常量和辅助函数

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Asia::Shanghai;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, REFERER};
use reqwest::Client;

use crate::config::ApiConfig;

// ==================== 东方财富 API 常量 ====================

/// 东方财富行情列表 API（LOF 实时行情）
pub const EM_CLIST_API: &str = "https://88.push2.eastmoney.com/api/qt/clist/get";
/// LOF 板块过滤参数
pub const EM_LOF_FS: &str = "b:MK0404,b:MK0405,b:MK0406,b:MK0407";
/// 天天基金净值走势 JS（pingzhongdata）
pub const EM_PINGZHONG_URL: &str = "https://fund.eastmoney.com/pingzhongdata";
/// 东方财富日K线 API
pub const EM_KLINE_API: &str = "https://push2his.eastmoney.com/api/qt/stock/kline/get";
/// 东方财富公开 ut 参数
pub const EM_UT: &str = "fa5fd1943c7b386f172d6893dbfba10b";

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36";

/// UTC+8 偏移（小时）
const BEIJING_OFFSET_HOURS: i64 = 8;

/// 将任意时刻格式化为北京时间字符串
pub fn format_beijing(at: DateTime<Utc>) -> String {
    at.with_timezone(&Shanghai).to_rfc3339()
}

/// 给定时刻在 UTC+8 下的日历日期
pub fn beijing_date(at: DateTime<Utc>) -> NaiveDate {
    (at + Duration::hours(BEIJING_OFFSET_HOURS)).date_naive()
}

/// 净值时间戳（毫秒）转日期
///
/// 上游时间戳为北京时间零点，先加 8 小时再截断为日期
pub fn nav_date_from_millis(ms: i64) -> Option<NaiveDate> {
    let ts = Utc.timestamp_millis_opt(ms).single()?;
    Some((ts + Duration::hours(BEIJING_OFFSET_HOURS)).date_naive())
}

/// 根据基金代码首位选择交易所前缀：5/6 开头为上交所，其余为深交所
pub fn exchange_secid(code: &str) -> String {
    match code.chars().next() {
        Some('5') | Some('6') => format!("1.{}", code),
        _ => format!("0.{}", code),
    }
}

/// 提取 JSONP 回调中的 JSON
pub fn extract_jsonp_payload(text: &str) -> Option<&str> {
    let text = text.trim();
    let open = text.find('(')?;
    let close = text.rfind(')')?;
    if close <= open {
        return None;
    }
    let payload = text[open + 1..close].trim();
    if payload.is_empty() {
        None
    } else {
        Some(payload)
    }
}

/// 解析上游数值字段，"-" 或空值视为缺失
pub fn parse_number(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

/// 构建访问东方财富的 HTTP 客户端
pub fn build_client(api: &ApiConfig) -> anyhow::Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("zh-CN,zh;q=0.9,en;q=0.8"));
    headers.insert(REFERER, HeaderValue::from_static("https://fund.eastmoney.com/"));

    Client::builder()
        .timeout(std::time::Duration::from_secs(api.timeout_secs))
        .connect_timeout(std::time::Duration::from_secs(api.connect_timeout_secs))
        .user_agent(USER_AGENT)
        .default_headers(headers)
        .build()
        .map_err(|e| anyhow::anyhow!("创建 HTTP 客户端失败: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nav_date_adds_eight_hours() {
        // 2024-03-15 00:00 +08:00 == 2024-03-14 16:00 UTC
        let ms = Utc.with_ymd_and_hms(2024, 3, 14, 16, 0, 0).unwrap().timestamp_millis();
        assert_eq!(nav_date_from_millis(ms), NaiveDate::from_ymd_opt(2024, 3, 15));
    }

    #[test]
    fn test_beijing_date_crosses_midnight() {
        let late_utc = Utc.with_ymd_and_hms(2024, 3, 14, 17, 30, 0).unwrap();
        assert_eq!(beijing_date(late_utc), NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());
        let early_utc = Utc.with_ymd_and_hms(2024, 3, 14, 15, 59, 0).unwrap();
        assert_eq!(beijing_date(early_utc), NaiveDate::from_ymd_opt(2024, 3, 14).unwrap());
    }

    #[test]
    fn test_exchange_secid() {
        assert_eq!(exchange_secid("501018"), "1.501018");
        assert_eq!(exchange_secid("600000"), "1.600000");
        assert_eq!(exchange_secid("161226"), "0.161226");
        assert_eq!(exchange_secid("160723"), "0.160723");
    }

    #[test]
    fn test_extract_jsonp_payload() {
        assert_eq!(extract_jsonp_payload("cb({\"a\":1});"), Some("{\"a\":1}"));
        assert_eq!(extract_jsonp_payload("  cb() "), None);
        assert_eq!(extract_jsonp_payload("{\"a\":1}"), None);
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number(&serde_json::json!(1.25)), Some(1.25));
        assert_eq!(parse_number(&serde_json::json!("0.987")), Some(0.987));
        assert_eq!(parse_number(&serde_json::json!("-")), None);
        assert_eq!(parse_number(&serde_json::Value::Null), None);
    }
}
