use async_trait::async_trait;
use std::time::Duration;
use tracing::warn;

use crate::vnpay::{RefundRequest, RefundResponse};
use crate::GatewayError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Outbound refund call to the payment gateway.
#[async_trait]
pub trait RefundClient: Send + Sync {
    async fn refund(&self, request: &RefundRequest) -> Result<RefundResponse, GatewayError>;
}

/// Posts refund requests to the merchant web API.
pub struct HttpRefundClient {
    client: reqwest::Client,
    api_url: String,
}

impl HttpRefundClient {
    pub fn new(api_url: impl Into<String>) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            api_url: api_url.into(),
        })
    }
}

#[async_trait]
impl RefundClient for HttpRefundClient {
    async fn refund(&self, request: &RefundRequest) -> Result<RefundResponse, GatewayError> {
        let response = self.client.post(&self.api_url).json(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            warn!("Refund for {} returned HTTP {}", request.txn_ref, status);
            return Err(GatewayError::HttpStatus(status.as_u16()));
        }
        Ok(response.json::<RefundResponse>().await?)
    }
}
