use actix_web::{web, HttpResponse, Result};
use serde::Deserialize;

use crate::error::PremiumError;
use crate::models::{ApiResponse, BatchProgress, CalculationResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RunQuery {
    /// 最多处理的批数，缺省时一直处理到结束
    pub max_batches: Option<usize>,
}

fn error_response(e: PremiumError) -> HttpResponse {
    let response = ApiResponse::<BatchProgress>::error(e.to_string());
    match e {
        PremiumError::ListFetch(_) => HttpResponse::BadGateway().json(response),
        _ => HttpResponse::InternalServerError().json(response),
    }
}

pub async fn start(state: web::Data<AppState>) -> Result<HttpResponse> {
    let scheduler = state.scheduler.lock().await;

    match scheduler.start().await {
        Ok(progress) => {
            let response = ApiResponse::with_message(progress, "计算已开始");
            Ok(HttpResponse::Ok().json(response))
        }
        Err(e) => Ok(error_response(e)),
    }
}

pub async fn next_batch(state: web::Data<AppState>) -> Result<HttpResponse> {
    let scheduler = state.scheduler.lock().await;

    match scheduler.next_batch().await {
        Ok(progress) => Ok(HttpResponse::Ok().json(ApiResponse::success(progress))),
        Err(e) => Ok(error_response(e)),
    }
}

pub async fn reset(state: web::Data<AppState>) -> Result<HttpResponse> {
    let scheduler = state.scheduler.lock().await;

    match scheduler.reset().await {
        Ok(()) => {
            let response = ApiResponse::with_message(BatchProgress::idle(), "状态已重置");
            Ok(HttpResponse::Ok().json(response))
        }
        Err(e) => Ok(error_response(e)),
    }
}

/// 驱动整轮计算：未在运行时先 start，然后连续调用 next_batch
pub async fn run(state: web::Data<AppState>, query: web::Query<RunQuery>) -> Result<HttpResponse> {
    let scheduler = state.scheduler.lock().await;

    let mut progress = match scheduler.progress().await {
        Ok(p) if p.is_running() => p,
        Ok(_) => match scheduler.start().await {
            Ok(p) => p,
            Err(e) => return Ok(error_response(e)),
        },
        Err(e) => return Ok(error_response(e)),
    };

    let mut batches = 0;
    while progress.is_running() && query.max_batches.map_or(true, |max| batches < max) {
        progress = match scheduler.next_batch().await {
            Ok(p) => p,
            Err(e) => return Ok(error_response(e)),
        };
        batches += 1;
    }

    log::info!("本次共处理 {} 批，当前状态 {:?}", batches, progress.status);
    Ok(HttpResponse::Ok().json(ApiResponse::success(progress)))
}

pub async fn progress(state: web::Data<AppState>) -> Result<HttpResponse> {
    let scheduler = state.scheduler.lock().await;

    match scheduler.progress().await {
        Ok(progress) => Ok(HttpResponse::Ok().json(ApiResponse::success(progress))),
        Err(e) => Ok(error_response(e)),
    }
}

pub async fn result(state: web::Data<AppState>) -> Result<HttpResponse> {
    let scheduler = state.scheduler.lock().await;

    match scheduler.cached_result().await {
        Ok(Some(result)) => Ok(HttpResponse::Ok().json(ApiResponse::success(result))),
        Ok(None) => {
            let response = ApiResponse::<CalculationResult>::error("暂无计算结果".to_string());
            Ok(HttpResponse::NotFound().json(response))
        }
        Err(e) => Ok(error_response(e)),
    }
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/premium")
            .route("/start", web::post().to(start))
            .route("/next", web::post().to(next_batch))
            .route("/reset", web::post().to(reset))
            .route("/run", web::post().to(run))
            .route("/progress", web::get().to(progress))
            .route("/result", web::get().to(result))
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{http::StatusCode, test, App};
    use std::sync::Arc;

    use crate::config::PremiumConfig;
    use crate::models::{BatchStatus, NavPoint};
    use crate::services::cache::MemoryCacheStore;
    use crate::services::premium::BatchScheduler;
    use crate::services::testing::{date, price_point, MockFundList, MockNav, MockPrices};

    fn app_state(list: MockFundList, funds: usize) -> web::Data<AppState> {
        let d = date(2024, 3, 14);
        let mut nav = MockNav::new();
        let mut prices = MockPrices::new();
        for i in 0..funds {
            let code = format!("{}", 100000 + i);
            nav = nav.with_series(&code, vec![NavPoint { date: d, nav: 1.0 }]);
            prices = prices.with_series(&code, vec![price_point(d, 1.01)]);
        }
        let scheduler = BatchScheduler::new(
            Arc::new(list),
            Arc::new(nav),
            Arc::new(prices),
            Arc::new(MemoryCacheStore::new()),
            PremiumConfig::without_delays(),
        );
        web::Data::new(AppState::new(scheduler))
    }

    #[actix_web::test]
    async fn test_run_and_fetch_result() {
        let state = app_state(MockFundList::with_funds(12), 12);
        let app = test::init_service(
            App::new().app_data(state.clone()).service(web::scope("/api/v1").configure(config)),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/v1/premium/result").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::post().uri("/api/v1/premium/run?max_batches=1").to_request();
        let body: ApiResponse<BatchProgress> = test::call_and_read_body_json(&app, req).await;
        let progress = body.data.unwrap();
        assert_eq!(progress.status, BatchStatus::Running);
        assert_eq!(progress.processed_funds, 10);

        let req = test::TestRequest::post().uri("/api/v1/premium/run").to_request();
        let body: ApiResponse<BatchProgress> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.data.unwrap().status, BatchStatus::Completed);

        let req = test::TestRequest::get().uri("/api/v1/premium/result").to_request();
        let body: ApiResponse<CalculationResult> = test::call_and_read_body_json(&app, req).await;
        let result = body.data.unwrap();
        assert_eq!(result.success_count, 12);
        assert_eq!(result.premium_fund_count, 12);
    }

    #[actix_web::test]
    async fn test_start_list_failure_is_bad_gateway() {
        let state = app_state(MockFundList::with_funds(3).failing_page(1), 3);
        let app = test::init_service(
            App::new().app_data(state).service(web::scope("/api/v1").configure(config)),
        )
        .await;

        let req = test::TestRequest::post().uri("/api/v1/premium/start").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);

        let req = test::TestRequest::get().uri("/api/v1/premium/progress").to_request();
        let body: ApiResponse<BatchProgress> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.data.unwrap().status, BatchStatus::Idle);
    }
}
