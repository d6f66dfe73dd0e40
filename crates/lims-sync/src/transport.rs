//! 参考实验室传输层
//!
//! 定义与外部参考实验室系统交互的批量接口，并提供基于HTTP的
//! 默认实现。批量响应携带逐项结果列表，单项失败不影响兄弟项。

use async_trait::async_trait;
use lims_core::{LimsError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// 认证配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AuthenticationConfig {
    None,
    BasicAuth { username: String, password: String },
    ApiKey { key: String, header: Option<String> },
    BearerToken { token: String },
}

/// 传输层配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    pub endpoint: String,
    pub authentication: AuthenticationConfig,
}

/// 批量响应中的单项结果
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemResponse {
    pub order_id: Uuid,
    pub success: bool,
    pub response_message: Option<String>,
    pub remote_reference_id: Option<String>,
}

/// 批量请求响应
#[derive(Debug, Clone)]
pub struct BatchResponse {
    pub http_status: u16,
    pub response_list: Vec<ItemResponse>,
}

/// 远端响应体（逐项列表）
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchResponseBody {
    #[serde(default)]
    response_list: Vec<ItemResponse>,
}

/// 参考实验室传输接口
#[async_trait]
pub trait ReferenceLabTransport: Send + Sync {
    /// 推送一批订单的同步请求
    async fn post_sync_batch(&self, order_ids: &[Uuid]) -> Result<BatchResponse>;

    /// 拉取一批订单的检验结果
    async fn post_result_fetch_batch(&self, order_ids: &[Uuid]) -> Result<BatchResponse>;
}

/// 基于HTTP的参考实验室客户端
pub struct HttpReferenceLabClient {
    client: reqwest::Client,
    config: TransportConfig,
}

impl HttpReferenceLabClient {
    pub fn new(config: TransportConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// 添加认证头
    fn add_auth_headers(
        request: reqwest::RequestBuilder,
        auth: &AuthenticationConfig,
    ) -> reqwest::RequestBuilder {
        match auth {
            AuthenticationConfig::None => request,
            AuthenticationConfig::BasicAuth { username, password } => {
                request.basic_auth(username, Some(password))
            }
            AuthenticationConfig::ApiKey { key, header } => {
                let header_name = header.as_deref().unwrap_or("X-API-Key");
                request.header(header_name, key)
            }
            AuthenticationConfig::BearerToken { token } => request.bearer_auth(token),
        }
    }

    async fn post_batch(&self, path: &str, order_ids: &[Uuid]) -> Result<BatchResponse> {
        let url = format!("{}/{}", self.config.endpoint.trim_end_matches('/'), path);
        debug!("Posting batch of {} orders to {}", order_ids.len(), url);

        let request = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "orderIds": order_ids }));
        let request = Self::add_auth_headers(request, &self.config.authentication);

        let response = request
            .send()
            .await
            .map_err(|e| LimsError::Transport(e.to_string()))?;

        let http_status = response.status().as_u16();
        let response_list = if response.status().is_success() {
            response
                .json::<BatchResponseBody>()
                .await
                .map_err(|e| LimsError::Transport(e.to_string()))?
                .response_list
        } else {
            Vec::new()
        };

        Ok(BatchResponse {
            http_status,
            response_list,
        })
    }
}

#[async_trait]
impl ReferenceLabTransport for HttpReferenceLabClient {
    async fn post_sync_batch(&self, order_ids: &[Uuid]) -> Result<BatchResponse> {
        self.post_batch("labrequest/sync", order_ids).await
    }

    async fn post_result_fetch_batch(&self, order_ids: &[Uuid]) -> Result<BatchResponse> {
        self.post_batch("labrequest/results", order_ids).await
    }
}
