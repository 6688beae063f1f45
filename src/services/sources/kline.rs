//! 场内日K线
//!
//! 对应 akshare 的 fund_lof_hist_em() 函数

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;

use super::common::{exchange_secid, extract_jsonp_payload, EM_KLINE_API, EM_UT};
use super::{EastmoneyService, PriceHistorySource};
use crate::error::{PremiumError, Result};
use crate::models::PricePoint;

#[async_trait]
impl PriceHistorySource for EastmoneyService {
    async fn fetch_price_history(&self, code: &str) -> Result<Vec<PricePoint>> {
        let secid = exchange_secid(code);
        log::debug!("📡 请求日K线 URL: {}?secid={}", EM_KLINE_API, secid);

        let response = self
            .client
            .get(EM_KLINE_API)
            .query(&[
                ("secid", secid.as_str()),
                ("ut", EM_UT),
                ("fields1", "f1,f2,f3,f4,f5"),
                ("fields2", "f51,f52,f53,f54,f55"),
                ("klt", "101"),
                ("fqt", "0"),
                ("beg", "0"),
                ("end", "20500101"),
            ])
            .send()
            .await
            .map_err(|e| PremiumError::per_fund(code, e))?;

        if !response.status().is_success() {
            return Err(PremiumError::per_fund(
                code,
                format!("K线接口返回 {}", response.status()),
            ));
        }

        let text = response
            .text()
            .await
            .map_err(|e| PremiumError::per_fund(code, e))?;
        parse_kline_payload(&text, code)
    }
}

/// 解析日K线响应
///
/// 格式: {"data":{"code":"161226","klines":["2024-03-14,1.001,1.005,1.010,0.998",...]}}
/// 每条记录为 date,open,close,high,low；格式不对的行跳过
/// 只有不以 `{` 开头时才按 JSONP 剥离回调，名称里常带括号，如 "嘉实原油(QDII-LOF)"
pub(crate) fn parse_kline_payload(text: &str, code: &str) -> Result<Vec<PricePoint>> {
    let text = text.trim();
    let payload = if text.starts_with('{') {
        text
    } else {
        extract_jsonp_payload(text).unwrap_or(text)
    };
    let json: Value = serde_json::from_str(payload)
        .map_err(|e| PremiumError::parse(format!("{} 日K线", code), e))?;

    let klines = json
        .get("data")
        .and_then(|d| d.get("klines"))
        .and_then(|k| k.as_array())
        .cloned()
        .unwrap_or_default();

    let mut points: Vec<PricePoint> = klines
        .iter()
        .filter_map(|item| parse_kline_row(item.as_str()?))
        .collect();

    points.sort_by_key(|p| p.date);
    Ok(points)
}

fn parse_kline_row(row: &str) -> Option<PricePoint> {
    let parts: Vec<&str> = row.split(',').map(|s| s.trim()).collect();
    if parts.len() < 5 {
        return None;
    }
    Some(PricePoint {
        date: NaiveDate::parse_from_str(parts[0], "%Y-%m-%d").ok()?,
        open: parts[1].parse().ok()?,
        close: parts[2].parse().ok()?,
        high: parts[3].parse().ok()?,
        low: parts[4].parse().ok()?,
    })
}
