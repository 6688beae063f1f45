//! LOF 溢价率计算后端服务
//!
//! 分批计算全部 LOF 基金的场内溢价率，结果缓存后通过 RESTful API 提供
//! 数据来源：东方财富、天天基金

mod config;     // 配置
mod error;      // 错误类型
mod handlers;   // HTTP 请求处理器
mod models;     // 数据模型定义
mod services;   // 业务逻辑服务
mod state;      // 共享状态

use actix_web::{middleware::Logger, web, App, HttpServer};
use env_logger::Env;
use std::sync::Arc;

use crate::config::{AppConfig, CacheBackend};
use crate::services::cache::{CacheStore, FileCacheStore, MemoryCacheStore};
use crate::services::premium::BatchScheduler;
use crate::services::sources::EastmoneyService;
use crate::state::AppState;

/// 应用程序入口
#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let (config, origin) = AppConfig::load();

    // 初始化日志系统，默认级别取自配置
    env_logger::init_from_env(Env::default().default_filter_or(config.log.level.as_str()));
    origin.log();

    log::info!("启动 LOF 溢价率计算服务");

    let store: Arc<dyn CacheStore> = match config.cache.backend {
        CacheBackend::Memory => Arc::new(MemoryCacheStore::new()),
        CacheBackend::File => Arc::new(FileCacheStore::open(&config.cache.dir).await?),
    };
    log::info!("缓存后端: {:?}", config.cache.backend);

    let eastmoney = Arc::new(EastmoneyService::new(&config.api)?);
    let scheduler = BatchScheduler::new(
        eastmoney.clone(),
        eastmoney.clone(),
        eastmoney,
        store,
        config.premium.clone(),
    );
    let state = web::Data::new(AppState::new(scheduler));

    let bind_addr = config.bind_addr();
    log::info!("监听地址: {}", bind_addr);

    // 创建并启动 HTTP 服务器
    let mut server = HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())  // 添加请求日志中间件
            .app_data(state.clone())
            .configure(handlers::config)  // 配置路由
    });
    if config.server.workers > 0 {
        server = server.workers(config.server.workers);
    }

    server.bind(bind_addr)?.run().await?;
    Ok(())
}
