use actix_web::{web, HttpResponse, Result};
use serde::Serialize;

use crate::models::{ApiResponse, BatchStatus};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub service: &'static str,
    pub version: &'static str,
    /// 当前计算状态；存储不可读时为 None
    pub batch_status: Option<BatchStatus>,
}

pub async fn health_check(state: web::Data<AppState>) -> Result<HttpResponse> {
    let batch_status = match state.scheduler.try_lock() {
        Ok(scheduler) => scheduler.progress().await.ok().map(|p| p.status),
        // 正在处理批次
        Err(_) => Some(BatchStatus::Running),
    };

    let response = ApiResponse::with_message(
        HealthStatus {
            service: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            batch_status,
        },
        "Service is healthy",
    );
    Ok(HttpResponse::Ok().json(response))
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check));
}
