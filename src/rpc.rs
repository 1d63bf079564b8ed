use axum::http::StatusCode;
use serde_json::Value;
use std::time::Duration;

use crate::error::ServiceError;

/// Relays arbitrary JSON-RPC bodies to the configured upstream endpoint.
/// Upstream status and body pass through verbatim; transport failures are
/// translated into the gateway error taxonomy.
pub struct RpcForwarder {
    client: reqwest::Client,
    upstream_url: Option<String>,
    timeout: Duration,
}

impl RpcForwarder {
    pub fn new(upstream_url: Option<String>, timeout: Duration) -> Self {
        if upstream_url.is_none() {
            tracing::info!("RPC_UPSTREAM_URL not set; /rpc forwarding disabled");
        }
        Self {
            client: reqwest::Client::new(),
            upstream_url,
            timeout,
        }
    }

    #[tracing::instrument(skip(self, payload))]
    pub async fn forward(&self, payload: Value) -> Result<(StatusCode, Value), ServiceError> {
        let Some(upstream_url) = &self.upstream_url else {
            return Err(ServiceError::NotConfigured("RPC upstream"));
        };

        let response = self
            .client
            .post(upstream_url)
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await
            .map_err(transport_error)?;

        // reqwest and axum can sit on different `http` versions; re-derive the
        // status instead of assuming the types line up.
        let status = StatusCode::from_u16(response.status().as_u16())
            .map_err(|err| ServiceError::Upstream(err.into()))?;
        let body: Value = response.json().await.map_err(transport_error)?;

        tracing::debug!(%status, "rpc response relayed");
        Ok((status, body))
    }
}

fn transport_error(err: reqwest::Error) -> ServiceError {
    if err.is_timeout() {
        ServiceError::UpstreamTimeout
    } else {
        ServiceError::Upstream(err.into())
    }
}
