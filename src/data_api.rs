//! Client for the public Polymarket data API
//!
//! Read-only and unauthenticated. Each method issues exactly one request;
//! pacing and retries are applied by the collector around these calls.

use crate::config::{Config, DataApi};
use crate::services::api_errors::DataApiError;
use crate::types::{RawActivity, RawClosedPosition, RawPosition, RawTrade};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// Query for one page of activity, newest first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivityQuery {
    pub limit: u32,
    /// Unix seconds, inclusive lower bound
    pub start: Option<i64>,
    /// Unix seconds, inclusive upper bound (pagination cursor)
    pub end: Option<i64>,
    /// Records to skip below `end`; those at the cursor second already seen
    pub offset: u32,
}

/// The upstream endpoints the collector consumes
#[async_trait]
pub trait DataApiSource: Send + Sync {
    /// One page of the public trades feed
    async fn fetch_trades(&self, limit: u32, offset: u32) -> Result<Vec<RawTrade>, DataApiError>;

    /// Open positions of an address
    async fn fetch_positions(&self, address: &str) -> Result<Vec<RawPosition>, DataApiError>;

    /// Settled positions of an address
    async fn fetch_closed_positions(&self, address: &str)
        -> Result<Vec<RawClosedPosition>, DataApiError>;

    /// One page of an address's activity
    async fn fetch_activity(
        &self,
        address: &str,
        query: ActivityQuery,
    ) -> Result<Vec<RawActivity>, DataApiError>;
}

/// reqwest-backed data API client
#[derive(Clone)]
pub struct DataApiClient {
    client: Client,
    base_url: String,
    positions_limit: u32,
}

impl DataApiClient {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(concat!("trader-scout/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: config.data_api_url.clone(),
            positions_limit: config.collector.positions_limit,
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, DataApiError> {
        debug!("GET {} {:?}", url, query);

        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| DataApiError::from_network_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DataApiError::from_response(status.as_u16(), &body));
        }

        let body = response
            .text()
            .await
            .map_err(|e| DataApiError::from_network_error(&e))?;

        serde_json::from_str(&body).map_err(|e| DataApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl DataApiSource for DataApiClient {
    async fn fetch_trades(&self, limit: u32, offset: u32) -> Result<Vec<RawTrade>, DataApiError> {
        let query = [("limit", limit.to_string()), ("offset", offset.to_string())];
        self.get_json(&DataApi::trades_url(&self.base_url), &query).await
    }

    async fn fetch_positions(&self, address: &str) -> Result<Vec<RawPosition>, DataApiError> {
        let query = [
            ("user", address.to_string()),
            ("limit", self.positions_limit.to_string()),
            ("sizeThreshold", "0".to_string()),
        ];
        self.get_json(&DataApi::positions_url(&self.base_url), &query).await
    }

    async fn fetch_closed_positions(
        &self,
        address: &str,
    ) -> Result<Vec<RawClosedPosition>, DataApiError> {
        let query = [
            ("user", address.to_string()),
            ("limit", self.positions_limit.to_string()),
        ];
        self.get_json(&DataApi::closed_positions_url(&self.base_url), &query)
            .await
    }

    async fn fetch_activity(
        &self,
        address: &str,
        query: ActivityQuery,
    ) -> Result<Vec<RawActivity>, DataApiError> {
        let mut params = vec![
            ("user", address.to_string()),
            ("limit", query.limit.to_string()),
            ("type", "TRADE".to_string()),
            ("sortBy", "TIMESTAMP".to_string()),
            ("sortDirection", "DESC".to_string()),
        ];
        if let Some(start) = query.start {
            params.push(("start", start.to_string()));
        }
        if let Some(end) = query.end {
            params.push(("end", end.to_string()));
        }
        if query.offset > 0 {
            params.push(("offset", query.offset.to_string()));
        }
        self.get_json(&DataApi::activity_url(&self.base_url), &params).await
    }
}
