//! 订单源HTTP实现
//!
//! 从订单管理API按参考日期拉取订单快照。摄入边界在这里：
//! 遗留的转诊哨兵文本在反序列化后立即被提升为显式标志，
//! 下游分类逻辑不再接触魔法字符串。

use crate::coordinator::OrderSource;
use crate::transport::{AuthenticationConfig, TransportConfig};
use async_trait::async_trait;
use chrono::NaiveDate;
use lims_core::{FulfillerStatus, LimsError, Order, Result};
use serde::Deserialize;
use tracing::debug;

/// 订单API响应体
#[derive(Debug, Deserialize)]
struct OrderListBody {
    #[serde(default)]
    results: Vec<Order>,
}

/// 基于HTTP的订单源
pub struct HttpOrderSource {
    client: reqwest::Client,
    config: TransportConfig,
}

impl HttpOrderSource {
    pub fn new(config: TransportConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl OrderSource for HttpOrderSource {
    async fn fetch_orders(
        &self,
        reference_date: NaiveDate,
        status_filter: Option<FulfillerStatus>,
    ) -> Result<Vec<Order>> {
        let mut url = format!(
            "{}/order?activatedOnOrAfterDate={}",
            self.config.endpoint.trim_end_matches('/'),
            reference_date
        );
        if let Some(status) = status_filter {
            url.push_str(&format!("&fulfillerStatus={}", status.as_str()));
        }
        debug!("Fetching order snapshot from {}", url);

        let request = self.client.get(&url);
        let request = match &self.config.authentication {
            AuthenticationConfig::None => request,
            AuthenticationConfig::BasicAuth { username, password } => {
                request.basic_auth(username, Some(password))
            }
            AuthenticationConfig::ApiKey { key, header } => {
                request.header(header.as_deref().unwrap_or("X-API-Key"), key)
            }
            AuthenticationConfig::BearerToken { token } => request.bearer_auth(token),
        };

        let response = request
            .send()
            .await
            .map_err(|e| LimsError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LimsError::Transport(format!(
                "order source returned HTTP {}",
                response.status().as_u16()
            )));
        }

        let body: OrderListBody = response
            .json()
            .await
            .map_err(|e| LimsError::Transport(e.to_string()))?;

        // 摄入时规范化：哨兵文本 → referral_requested 标志
        Ok(body
            .results
            .into_iter()
            .map(Order::normalized)
            .collect())
    }
}
