use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use serde::de::DeserializeOwned;

use crate::error::UpstreamError;
use crate::types::{OrdersPage, SellerId, ShipmentRecord, UserProfile};

/// Default upstream base URL.
pub const API_BASE_URL: &str = "https://api.mercadolibre.com";

const USER_AGENT: &str = concat!("meli-proxy/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const PDF_TIMEOUT: Duration = Duration::from_secs(30);

/// Query for one `/orders/search` page.
#[derive(Debug, Clone)]
pub struct OrdersQuery {
    pub seller: SellerId,
    pub status: String,
    pub sort: String,
    pub limit: u32,
    pub offset: u32,
    pub from: String,
    pub to: String,
}

impl OrdersQuery {
    fn params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("seller", self.seller.0.clone()),
            ("order.status", self.status.clone()),
            ("sort", self.sort.clone()),
            ("limit", self.limit.to_string()),
            ("offset", self.offset.to_string()),
            ("order.date_created.from", self.from.clone()),
            ("order.date_created.to", self.to.clone()),
        ]
    }
}

/// Upstream operations the report pipeline depends on.
///
/// A seam for tests: the fetcher and the enrichment pipeline are written
/// against this trait, with [`MeliClient`] as the production impl.
#[async_trait]
pub trait OrdersApi: Send + Sync {
    async fn search_orders(&self, query: &OrdersQuery) -> Result<OrdersPage, UpstreamError>;
    async fn get_shipment(&self, shipment_id: i64) -> Result<ShipmentRecord, UpstreamError>;
}

/// Authenticated MercadoLibre API client.
///
/// One client is constructed per report request from the caller-supplied
/// bearer token; nothing is shared across requests.
pub struct MeliClient {
    http: reqwest::Client,
    base_url: String,
}

impl MeliClient {
    pub fn new(access_token: &str, base_url: impl Into<String>) -> Result<Self, UpstreamError> {
        let mut auth = HeaderValue::from_str(&format!("Bearer {access_token}"))
            .map_err(|_| UpstreamError::Decode("access token is not a valid header".to_string()))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, UpstreamError> {
        let response = self
            .http
            .get(format!("{}{path}", self.base_url))
            .query(params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.ok();
            return Err(UpstreamError::Status { status, body });
        }

        response
            .json()
            .await
            .map_err(|err| UpstreamError::Decode(err.to_string()))
    }

    /// Resolve the identity behind the access token.
    pub async fn users_me(&self) -> Result<UserProfile, UpstreamError> {
        self.get_json("/users/me", &[]).await
    }

    /// Fetch the shipping-label PDF for a shipment. The response body is
    /// streamed; callers pipe `bytes_stream()` straight through.
    pub async fn label_pdf(&self, shipment_id: &str) -> Result<reqwest::Response, UpstreamError> {
        let response = self
            .http
            .get(format!(
                "{}/marketplace/shipments/{shipment_id}/labels",
                self.base_url
            ))
            .header(ACCEPT, HeaderValue::from_static("application/pdf"))
            .timeout(PDF_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.ok();
            return Err(UpstreamError::Status { status, body });
        }

        Ok(response)
    }
}

#[async_trait]
impl OrdersApi for MeliClient {
    async fn search_orders(&self, query: &OrdersQuery) -> Result<OrdersPage, UpstreamError> {
        self.get_json("/orders/search", &query.params()).await
    }

    async fn get_shipment(&self, shipment_id: i64) -> Result<ShipmentRecord, UpstreamError> {
        self.get_json(&format!("/shipments/{shipment_id}"), &[])
            .await
    }
}
