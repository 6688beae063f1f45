//! 应用共享状态

use tokio::sync::Mutex;

use crate::services::premium::BatchScheduler;

/// 通过 `web::Data` 注入各个处理器
///
/// 调度器放在互斥锁里，同一进程内的 start / next / reset 调用依次执行
pub struct AppState {
    pub scheduler: Mutex<BatchScheduler>,
}

impl AppState {
    pub fn new(scheduler: BatchScheduler) -> Self {
        Self {
            scheduler: Mutex::new(scheduler),
        }
    }
}
