//! services/client/src/adapters/http.rs
//!
//! This module contains the adapter that talks to the prescription service over
//! HTTP. It implements the `HttpTransport` port from the `core` crate using `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use mediauth_core::ports::{
    ApiRequest, ApiResponse, HttpMethod, HttpTransport, PortError, PortResult, RequestBody,
};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method};
use serde_json::Value;
use tracing::debug;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `HttpTransport` port with a pooled `reqwest` client.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
    base_url: String,
}

impl ReqwestTransport {
    /// Creates a transport for `base_url`, e.g. `http://127.0.0.1:8000/api`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> PortResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PortError::Unexpected(format!("could not build HTTP client: {e}")))?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

fn method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Delete => Method::DELETE,
    }
}

/// Empty bodies become `Null`, anything that is not JSON a plain string.
fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

//=========================================================================================
// `HttpTransport` Trait Implementation
//=========================================================================================

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &ApiRequest) -> PortResult<ApiResponse> {
        let mut builder = self
            .client
            .request(method(request.method), self.url(&request.path));

        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }

        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(body) => builder.json(body),
            RequestBody::Multipart { field, file } => {
                let part = Part::bytes(file.bytes.to_vec())
                    .file_name(file.file_name.clone())
                    .mime_str(&file.media_type)
                    .map_err(|e| PortError::Unexpected(format!("invalid media type: {e}")))?;
                builder.multipart(Form::new().part(field.clone(), part))
            }
        };

        let response = builder
            .send()
            .await
            .map_err(|e| PortError::Network(e.to_string()))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| PortError::Network(e.to_string()))?;

        debug!(status, bytes = text.len(), "response received");
        Ok(ApiResponse::new(status, parse_body(&text)))
    }
}
