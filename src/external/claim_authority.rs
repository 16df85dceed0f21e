use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::RemoteEnvelope;
use crate::config::ClaimAuthorityConfig;
use crate::error::{AppError, AppResult};

/// 领取请求: 客户端乐观地选定一个兑换码，由远端完成 Unclaimed -> Claimed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClaimRequest {
    pub offer_id: String,
    pub code_id: String,
    pub user_id: String,
    /// 同一次 play 的幂等键
    pub play_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimVerdict {
    Claimed,
    OfferExhausted,
    AlreadyClaimedByOther,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimResponse {
    pub result: ClaimVerdict,
    #[serde(default)]
    pub code: Option<String>,
}

/// 兑换码领取的唯一权威。
///
/// 实现必须保证同一个码只会被一个用户从 Unclaimed 转出，且不可逆；
/// 客户端侧的任何串行化只是体验优化，不能替代这里的保证。
#[async_trait]
pub trait ClaimAuthority: Send + Sync {
    async fn claim(&self, request: &ClaimRequest) -> AppResult<ClaimResponse>;
}

#[derive(Clone)]
pub struct HttpClaimAuthority {
    client: Client,
    config: ClaimAuthorityConfig,
}

impl HttpClaimAuthority {
    pub fn new(config: ClaimAuthorityConfig) -> AppResult<Self> {
        let client = Client::builder()
            .user_agent("kkss-rewards/claims")
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::ConfigError(format!("claim http client: {e}")))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl ClaimAuthority for HttpClaimAuthority {
    async fn claim(&self, request: &ClaimRequest) -> AppResult<ClaimResponse> {
        let url = format!(
            "{}/promotions/offers/{}/claims",
            self.config.base_url.trim_end_matches('/'),
            request.offer_id
        );

        let mut builder = self
            .client
            .post(&url)
            .header("Idempotency-Key", &request.play_id)
            .json(request);
        if !self.config.api_key.is_empty() {
            builder = builder.bearer_auth(&self.config.api_key);
        }

        let response = builder.send().await?;
        let status = response.status();

        // 409 携带冲突结果（已被抢 / 已领完），其余非 2xx 视为远端故障
        if !status.is_success() && status != StatusCode::CONFLICT {
            return Err(AppError::RemoteError(format!(
                "claim request failed: HTTP {}",
                status.as_u16()
            )));
        }

        let envelope: RemoteEnvelope<ClaimResponse> = response.json().await?;
        envelope.into_data("claim")
    }
}

/// 成功必须带回兑换码，绝不在本地伪造
pub(crate) fn validate_claim_response(body: ClaimResponse) -> AppResult<ClaimResponse> {
    match (&body.result, &body.code) {
        (ClaimVerdict::Claimed, None) => Err(AppError::RemoteError(
            "authority confirmed claim without a code".into(),
        )),
        (ClaimVerdict::Claimed, Some(code)) if code.trim().is_empty() => Err(
            AppError::RemoteError("authority confirmed claim with an empty code".into()),
        ),
        _ => Ok(body),
    }
}
