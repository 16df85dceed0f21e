use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use super::RemoteEnvelope;
use crate::config::CatalogConfig;
use crate::error::{AppError, AppResult};
use crate::models::Offer;

/// 优惠目录提供方（外部），每次打开奖励页面拉取一次快照
#[async_trait]
pub trait OfferCatalog: Send + Sync {
    async fn fetch_offers(&self) -> AppResult<Vec<Offer>>;
}

#[derive(Clone)]
pub struct HttpOfferCatalog {
    client: Client,
    config: CatalogConfig,
}

impl HttpOfferCatalog {
    pub fn new(config: CatalogConfig) -> AppResult<Self> {
        let client = Client::builder()
            .user_agent("kkss-rewards/catalog")
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::ConfigError(format!("catalog http client: {e}")))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl OfferCatalog for HttpOfferCatalog {
    async fn fetch_offers(&self) -> AppResult<Vec<Offer>> {
        let url = format!("{}/promotions/offers", self.config.base_url.trim_end_matches('/'));

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::RemoteError(format!(
                "catalog fetch failed: HTTP {}",
                status.as_u16()
            )));
        }

        let envelope: RemoteEnvelope<Vec<Offer>> = response.json().await?;
        let offers = envelope.into_data("catalog fetch")?;
        log::debug!("Fetched {} offers from catalog", offers.len());
        Ok(offers)
    }
}
