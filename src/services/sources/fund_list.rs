//! LOF 基金列表
//!
//! 对应 akshare 的 fund_lof_spot_em() 函数

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::Value;
use std::collections::HashSet;

use super::common::{parse_number, EM_CLIST_API, EM_LOF_FS, EM_UT};
use super::{EastmoneyService, FundListSource};
use crate::error::{PremiumError, Result};
use crate::models::{FundListPage, FundRecord};

/// 后续页面并发请求数
const PAGE_CONCURRENCY: usize = 4;
/// 最多请求的页数，上游 total 异常时不会无限翻页
const MAX_PAGES: usize = 50;

#[async_trait]
impl FundListSource for EastmoneyService {
    async fn fetch_page(&self, page: usize, page_size: usize) -> Result<FundListPage> {
        log::debug!("📡 请求 LOF 列表第 {} 页 URL: {}", page, EM_CLIST_API);

        let response = self
            .client
            .get(EM_CLIST_API)
            .query(&[
                ("pn", page.to_string().as_str()),
                ("pz", page_size.to_string().as_str()),
                ("po", "1"),
                ("np", "1"),
                ("ut", EM_UT),
                ("fltt", "2"),
                ("invt", "2"),
                ("fid", "f3"),
                ("fs", EM_LOF_FS),
                ("fields", "f2,f3,f12,f14"),
            ])
            .send()
            .await
            .map_err(|e| PremiumError::ListFetch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PremiumError::ListFetch(format!(
                "第 {} 页返回 {}",
                page,
                response.status()
            )));
        }

        let text = response
            .text()
            .await
            .map_err(|e| PremiumError::ListFetch(e.to_string()))?;
        parse_fund_list_page(&text)
    }
}

/// 解析 clist 响应
///
/// 格式: {"data":{"total":350,"diff":[{"f2":1.234,"f3":0.5,"f12":"161226","f14":"..."}]}}
/// data 为 null 表示没有数据（或被限流）
pub(crate) fn parse_fund_list_page(text: &str) -> Result<FundListPage> {
    let json: Value = serde_json::from_str(text).map_err(|e| PremiumError::parse("基金列表", e))?;

    let Some(data) = json.get("data").filter(|d| !d.is_null()) else {
        return Ok(FundListPage::default());
    };

    let total = data.get("total").and_then(|t| t.as_u64()).unwrap_or(0) as usize;

    // np=1 时 diff 为数组，否则为 {"0": {...}, "1": {...}}
    let items: Vec<&Value> = match data.get("diff") {
        Some(Value::Array(arr)) => arr.iter().collect(),
        Some(Value::Object(map)) => map.values().collect(),
        _ => Vec::new(),
    };

    let records = items
        .into_iter()
        .filter_map(|item| {
            let code = item.get("f12").and_then(|v| v.as_str())?.trim().to_string();
            let name = item.get("f14").and_then(|v| v.as_str())?.trim().to_string();
            if code.is_empty() || name.is_empty() {
                return None;
            }
            Some(FundRecord {
                code,
                name,
                price: item.get("f2").and_then(parse_number),
                change_percent: item.get("f3").and_then(parse_number),
            })
        })
        .collect();

    Ok(FundListPage { records, total })
}

/// 获取全部基金列表
///
/// 第 1 页确定总页数，后续页面分组并发获取。
/// 第 1 页失败直接返回错误；后续页失败只记录警告。
pub async fn fetch_all_funds(source: &dyn FundListSource, page_size: usize) -> Result<Vec<FundRecord>> {
    let page_size = page_size.max(1);
    let first = source.fetch_page(1, page_size).await?;
    let reported_pages = first.total.div_ceil(page_size).max(1);
    let total_pages = reported_pages.min(MAX_PAGES);
    if reported_pages > MAX_PAGES {
        log::warn!(
            "⚠️ 上游报告 {} 条记录（{} 页），只请求前 {} 页",
            first.total,
            reported_pages,
            MAX_PAGES
        );
    }

    log::info!(
        "📊 基金列表共 {} 条，{} 页（每页 {}）",
        first.total,
        total_pages,
        page_size
    );

    let mut seen = HashSet::new();
    let mut records = Vec::new();
    let mut push_unique = |page_records: Vec<FundRecord>| {
        for record in page_records {
            if seen.insert(record.code.clone()) {
                records.push(record);
            }
        }
    };
    push_unique(first.records);

    let remaining: Vec<usize> = (2..=total_pages).collect();
    for group in remaining.chunks(PAGE_CONCURRENCY) {
        let pages = join_all(group.iter().map(|&page| source.fetch_page(page, page_size))).await;
        for (page, result) in group.iter().zip(pages) {
            match result {
                Ok(page_data) => push_unique(page_data.records),
                Err(e) => log::warn!("⚠️ 基金列表第 {} 页获取失败: {}", page, e),
            }
        }
    }

    Ok(records)
}
