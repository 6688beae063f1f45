//! 测试用数据源替身

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::error::{PremiumError, Result};
use crate::models::{FundListPage, FundRecord, NavPoint, PricePoint};
use crate::services::sources::{FundListSource, NavSource, PriceHistorySource};

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn record(code: &str, name: &str, price: f64) -> FundRecord {
    FundRecord {
        code: code.to_string(),
        name: name.to_string(),
        price: Some(price),
        change_percent: Some(0.5),
    }
}

pub fn price_point(date: NaiveDate, close: f64) -> PricePoint {
    PricePoint {
        date,
        open: close,
        close,
        high: close,
        low: close,
    }
}

#[derive(Default)]
pub struct MockFundList {
    records: Vec<FundRecord>,
    failing_pages: HashSet<usize>,
    /// 覆盖上游报告的总数
    reported_total: Option<usize>,
    requested: Mutex<Vec<usize>>,
}

impl MockFundList {
    pub fn from_records(records: Vec<FundRecord>) -> Self {
        Self {
            records,
            ..Self::default()
        }
    }

    /// 代码 100000.. 的普通基金，价格 1.0
    pub fn with_funds(count: usize) -> Self {
        Self::from_records(
            (0..count)
                .map(|i| record(&format!("{}", 100000 + i), &format!("测试指数LOF{}", i), 1.0))
                .collect(),
        )
    }

    pub fn failing_page(mut self, page: usize) -> Self {
        self.failing_pages.insert(page);
        self
    }

    pub fn with_reported_total(mut self, total: usize) -> Self {
        self.reported_total = Some(total);
        self
    }

    pub fn pages_requested(&self) -> Vec<usize> {
        let mut pages = self.requested.lock().unwrap().clone();
        pages.sort();
        pages
    }
}

#[async_trait]
impl FundListSource for MockFundList {
    async fn fetch_page(&self, page: usize, page_size: usize) -> Result<FundListPage> {
        self.requested.lock().unwrap().push(page);
        if self.failing_pages.contains(&page) {
            return Err(PremiumError::ListFetch(format!("第 {} 页失败", page)));
        }
        let records = self
            .records
            .iter()
            .skip((page - 1) * page_size)
            .take(page_size)
            .cloned()
            .collect();
        Ok(FundListPage {
            records,
            total: self.reported_total.unwrap_or(self.records.len()),
        })
    }
}

/// 按代码返回固定序列的数据源，记录每个代码的请求次数
pub struct MockSeries<T> {
    series: HashMap<String, Vec<T>>,
    failing: HashSet<String>,
    calls: Mutex<HashMap<String, usize>>,
}

impl<T> Default for MockSeries<T> {
    fn default() -> Self {
        Self {
            series: HashMap::new(),
            failing: HashSet::new(),
            calls: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Clone> MockSeries<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(mut self, code: &str, points: Vec<T>) -> Self {
        self.series.insert(code.to_string(), points);
        self
    }

    pub fn failing(mut self, code: &str) -> Self {
        self.failing.insert(code.to_string());
        self
    }

    pub fn calls(&self, code: &str) -> usize {
        self.calls.lock().unwrap().get(code).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    fn lookup(&self, code: &str) -> Result<Vec<T>> {
        *self.calls.lock().unwrap().entry(code.to_string()).or_insert(0) += 1;
        if self.failing.contains(code) {
            return Err(PremiumError::per_fund(code, "mock failure"));
        }
        Ok(self.series.get(code).cloned().unwrap_or_default())
    }
}

pub type MockNav = MockSeries<NavPoint>;
pub type MockPrices = MockSeries<PricePoint>;

#[async_trait]
impl NavSource for MockSeries<NavPoint> {
    async fn fetch_nav_history(&self, code: &str) -> Result<Vec<NavPoint>> {
        self.lookup(code)
    }
}

#[async_trait]
impl PriceHistorySource for MockSeries<PricePoint> {
    async fn fetch_price_history(&self, code: &str) -> Result<Vec<PricePoint>> {
        self.lookup(code)
    }
}
