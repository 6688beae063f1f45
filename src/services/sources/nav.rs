//! 单位净值走势
//!
//! 对应 akshare 的 fund_open_fund_info_em(indicator="单位净值走势")

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use super::common::{nav_date_from_millis, parse_number, EM_PINGZHONG_URL};
use super::{EastmoneyService, NavSource};
use crate::error::{PremiumError, Result};
use crate::models::NavPoint;

#[async_trait]
impl NavSource for EastmoneyService {
    async fn fetch_nav_history(&self, code: &str) -> Result<Vec<NavPoint>> {
        let url = format!("{}/{}.js", EM_PINGZHONG_URL, code);
        log::debug!("📡 请求净值走势 URL: {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| PremiumError::per_fund(code, e))?;

        if !response.status().is_success() {
            return Err(PremiumError::per_fund(
                code,
                format!("净值接口返回 {}", response.status()),
            ));
        }

        let text = response
            .text()
            .await
            .map_err(|e| PremiumError::per_fund(code, e))?;
        parse_net_worth_trend(&text, code)
    }
}

/// 解析 pingzhongdata 中的 Data_netWorthTrend
///
/// 格式: var Data_netWorthTrend = [{"x":1710432000000,"y":1.0234,"equityReturn":0.12,"unitMoney":""},...];
/// 变量缺失视为空历史（上游限流时常见）
pub(crate) fn parse_net_worth_trend(text: &str, code: &str) -> Result<Vec<NavPoint>> {
    let re = Regex::new(r"(?s)var\s+Data_netWorthTrend\s*=\s*(\[.*?\]);")
        .map_err(|e| PremiumError::parse("净值正则", e))?;

    let Some(json_str) = re.captures(text).and_then(|c| c.get(1)) else {
        return Ok(Vec::new());
    };

    let data: Value = serde_json::from_str(json_str.as_str())
        .map_err(|e| PremiumError::parse(format!("{} 净值走势", code), e))?;
    let Some(items) = data.as_array() else {
        return Err(PremiumError::parse(format!("{} 净值走势", code), "不是数组"));
    };

    let mut points: Vec<NavPoint> = items
        .iter()
        .filter_map(|item| {
            let date = nav_date_from_millis(item.get("x")?.as_i64()?)?;
            let nav = parse_number(item.get("y")?)?;
            Some(NavPoint { date, nav })
        })
        .collect();

    points.sort_by_key(|p| p.date);
    Ok(points)
}
