//! `ResourceService` over the platform's HTTP API.
//!
//! Every call goes to `{server}/api/{endpoint}` with the token in
//! `x-api-key`. GET requests carry the payload as query parameters, the
//! other methods as a JSON body.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::debug;

use dokctl_core::error::ServiceError;
use dokctl_core::service::{ ApiRequest, Method, ResourceService };

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpResourceService {
    name: String,
    base_url: String,
    api_token: String,
    client: reqwest::Client,
}

impl HttpResourceService {
    pub fn new(alias: &str, server_url: &str, api_token: &str) -> Result<Self, ServiceError> {
        if server_url.trim().is_empty() || api_token.trim().is_empty() {
            return Err(ServiceError::NotAuthenticated);
        }
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("dokctl/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ServiceError::Transport(e.to_string()))?;
        Ok(Self {
            name: alias.to_string(),
            base_url: server_url.trim_end_matches('/').to_string(),
            api_token: api_token.to_string(),
            client,
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/api/{}", self.base_url, endpoint.trim_start_matches('/'))
    }
}

/// Flattens a payload object into query parameters. Strings are sent
/// as-is, other scalars in their JSON form, nulls are dropped.
pub fn query_pairs(payload: &Value) -> Vec<(String, String)> {
    let Value::Object(map) = payload else {
        return Vec::new();
    };
    map.iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| {
            let value = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), value)
        })
        .collect()
}

/// The server's `message` if the body carries one, else a generic line.
pub fn error_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(String::from))
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| {
            format!(
                "API request failed: {} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or_default()
            )
        })
}

/// An empty body decodes to `{}`.
pub fn decode_body(body: &str) -> Result<Value, ServiceError> {
    if body.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    Ok(serde_json::from_str(body)?)
}

#[async_trait]
impl ResourceService for HttpResourceService {
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, request: ApiRequest) -> Result<Value, ServiceError> {
        let url = self.url(&request.endpoint);
        let builder = match request.method {
            Method::Get => self.client.get(&url).query(&query_pairs(&request.payload)),
            Method::Post => self.client.post(&url).json(&request.payload),
            Method::Delete => self.client.delete(&url).json(&request.payload),
        };
        debug!(method = ?request.method, endpoint = %request.endpoint, "api request");

        let response = builder
            .header("x-api-key", &self.api_token)
            .send().await
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| ServiceError::Transport(e.to_string()))?;
        if !status.is_success() {
            debug!(status = status.as_u16(), endpoint = %request.endpoint, "api error");
            return Err(ServiceError::status(status.as_u16(), error_message(status, &body)));
        }
        decode_body(&body)
    }
}
