//! LOF 溢价率计算
//!
//! - `calculator`：纯计算函数
//! - `orchestrator`：限速抓取与调用内缓存
//! - `scheduler`：分批处理状态机
//! - `aggregator`：最终报告汇总

pub mod aggregator;
pub mod calculator;
pub mod orchestrator;
pub mod scheduler;

pub use scheduler::BatchScheduler;
