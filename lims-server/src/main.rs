//! LIMS同步命令行程序
//!
//! 对指定参考日期执行一轮转诊订单同步或结果拉取。

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::Parser;
use lims_core::NoopNotifier;
use lims_sync::{
    AuthenticationConfig, HttpOrderSource, HttpReferenceLabClient, SyncCoordinator,
    TransportConfig,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// 同步程序命令行参数
#[derive(Parser, Debug)]
#[command(name = "lims-server")]
#[command(about = "实验室订单与外部参考实验室的同步引擎")]
struct Args {
    /// 参考实验室接口地址
    #[arg(long, default_value = "http://localhost:8080/reference-lab")]
    lab_endpoint: String,

    /// 订单管理API地址
    #[arg(long, default_value = "http://localhost:8080/ws/rest/v1")]
    orders_endpoint: String,

    /// 参考实验室API密钥
    #[arg(long)]
    api_key: Option<String>,

    /// 参考日期 (YYYY-MM-DD，默认今天)
    #[arg(long)]
    reference_date: Option<NaiveDate>,

    /// 拉取结果而不是推送同步
    #[arg(long)]
    fetch_results: bool,

    /// 远程请求超时（秒）
    #[arg(long, default_value = "30")]
    timeout_secs: u64,

    /// 配置文件路径（覆盖以上连接参数）
    #[arg(short, long)]
    config: Option<String>,

    /// 日志级别
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

/// 连接配置
#[derive(Debug, Deserialize)]
struct ServerConfig {
    lab_endpoint: String,
    orders_endpoint: String,
    api_key: Option<String>,
    request_timeout_secs: u64,
}

impl ServerConfig {
    /// 从配置文件与 LIMS_ 前缀环境变量加载
    fn load(path: &str) -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .set_default("request_timeout_secs", 30i64)?
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("LIMS"))
            .build()
            .with_context(|| format!("failed to load config from {}", path))?;
        Ok(settings.try_deserialize()?)
    }

    fn from_args(args: &Args) -> Self {
        Self {
            lab_endpoint: args.lab_endpoint.clone(),
            orders_endpoint: args.orders_endpoint.clone(),
            api_key: args.api_key.clone(),
            request_timeout_secs: args.timeout_secs,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(&args.log_level)
        .init();

    let cfg = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::from_args(&args),
    };

    info!("LIMS同步引擎配置:");
    info!("  参考实验室: {}", cfg.lab_endpoint);
    info!("  订单源: {}", cfg.orders_endpoint);
    info!("  请求超时: {}s", cfg.request_timeout_secs);

    let authentication = match cfg.api_key.clone() {
        Some(key) => AuthenticationConfig::ApiKey { key, header: None },
        None => AuthenticationConfig::None,
    };

    let transport = Arc::new(HttpReferenceLabClient::new(TransportConfig {
        endpoint: cfg.lab_endpoint.clone(),
        authentication: authentication.clone(),
    }));
    let orders = Arc::new(HttpOrderSource::new(TransportConfig {
        endpoint: cfg.orders_endpoint.clone(),
        authentication,
    }));

    let coordinator = SyncCoordinator::new(
        transport,
        orders,
        Arc::new(NoopNotifier),
        Duration::from_secs(cfg.request_timeout_secs),
    );

    let reference_date = args.reference_date.unwrap_or_else(|| Utc::now().date_naive());

    let outcome = if args.fetch_results {
        info!("拉取 {} 的转诊订单结果...", reference_date);
        coordinator.fetch_results_all(reference_date).await?
    } else {
        info!("同步 {} 的转诊订单...", reference_date);
        coordinator.sync_all(reference_date).await?
    };

    info!(
        "完成: {} 成功, {} 失败",
        outcome.succeeded_ids.len(),
        outcome.failed.len()
    );
    for failure in &outcome.failed {
        warn!("  订单 {}: {}", failure.order_id, failure.message);
    }

    Ok(())
}
