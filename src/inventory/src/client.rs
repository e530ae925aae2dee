//! HTTP client for the bare-metal inventory API.

use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::api::Inventory;
use crate::error::InventoryError;
use crate::model::{Ip, IpAllocateRequest, IpFindRequest, IpUpdateRequest};

/// Inventory API client.
pub struct InventoryClient {
    client: Client,
    base_url: String,
    token: String,
}

impl InventoryClient {
    pub fn new(base_url: String, token: String) -> Result<Self, InventoryError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(InventoryError::Http)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.base_url, path)
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, InventoryError> {
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            let body = response.text().await.unwrap_or_default();
            return Err(InventoryError::NotFound(body));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(InventoryError::Api(format!("{status} - {body}")));
        }
        response.json::<T>().await.map_err(InventoryError::Http)
    }
}

#[async_trait::async_trait]
impl Inventory for InventoryClient {
    async fn find_ips(&self, req: &IpFindRequest) -> Result<Vec<Ip>, InventoryError> {
        tracing::debug!(project=?req.project, tags=?req.tags, "Find IPs");
        let response = self
            .client
            .post(self.url("ip/find"))
            .header("Authorization", format!("Token {}", self.token))
            .json(req)
            .send()
            .await
            .map_err(InventoryError::Http)?;
        Self::decode(response).await
    }

    async fn get_ip(&self, address: &str) -> Result<Ip, InventoryError> {
        let response = self
            .client
            .get(self.url(&format!("ip/{address}")))
            .header("Authorization", format!("Token {}", self.token))
            .send()
            .await
            .map_err(InventoryError::Http)?;
        Self::decode(response).await
    }

    async fn allocate_ip(&self, req: IpAllocateRequest) -> Result<Ip, InventoryError> {
        tracing::debug!(network = req.network, project = req.project, "Allocate IP");
        let response = self
            .client
            .post(self.url("ip/allocate"))
            .header("Authorization", format!("Token {}", self.token))
            .json(&req)
            .send()
            .await
            .map_err(InventoryError::Http)?;
        Self::decode(response).await
    }

    async fn update_ip(&self, req: IpUpdateRequest) -> Result<Ip, InventoryError> {
        tracing::debug!(address = req.address, tags=?req.tags, "Update IP tags");
        let response = self
            .client
            .post(self.url("ip"))
            .header("Authorization", format!("Token {}", self.token))
            .json(&req)
            .send()
            .await
            .map_err(InventoryError::Http)?;
        Self::decode(response).await
    }

    async fn free_ip(&self, address: &str) -> Result<(), InventoryError> {
        tracing::debug!(address = address, "Free IP");
        let response = self
            .client
            .post(self.url(&format!("ip/free/{address}")))
            .header("Authorization", format!("Token {}", self.token))
            .send()
            .await
            .map_err(InventoryError::Http)?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            let body = response.text().await.unwrap_or_default();
            return Err(InventoryError::NotFound(body));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(InventoryError::Api(format!("{status} - {body}")));
        }
        Ok(())
    }
}
