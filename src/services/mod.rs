//! 业务逻辑服务模块
//!
//! 封装数据获取、溢价计算和状态存储

pub mod cache;    // 键值缓存存储
pub mod premium;  // 溢价率计算流水线
pub mod sources;  // 上游数据源

#[cfg(test)]
pub mod testing;
