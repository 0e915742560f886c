//! crates/mediauth_core/src/ports.rs
//!
//! Defines the service contracts (traits) the client core depends on.
//! The session manager and workflow clients only ever talk to the network and
//! to credential storage through these traits, so both can be swapped for
//! scripted fakes in tests.

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;

use crate::domain::{CredentialPair, UploadFile};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Network failure: {0}")]
    Network(String),
    #[error("Credential storage failure: {0}")]
    Storage(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// HTTP Request/Response Model
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpMethod::Get => write!(f, "GET"),
            HttpMethod::Post => write!(f, "POST"),
            HttpMethod::Put => write!(f, "PUT"),
            HttpMethod::Delete => write!(f, "DELETE"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(Value),
    /// A single file part under the given form field name.
    Multipart { field: String, file: UploadFile },
}

/// A request relative to the API base URL, e.g. `/prescriptions/7/issue/`.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: HttpMethod,
    pub path: String,
    pub body: RequestBody,
    /// Access token to present as `Authorization: Bearer <token>`.
    pub bearer: Option<String>,
}

impl ApiRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: RequestBody::Empty,
            bearer: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Put, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    pub fn with_json(mut self, body: Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    pub fn with_file(mut self, field: impl Into<String>, file: UploadFile) -> Self {
        self.body = RequestBody::Multipart {
            field: field.into(),
            file,
        };
        self
    }

    pub fn with_bearer(mut self, token: Option<String>) -> Self {
        self.bearer = token;
        self
    }
}

/// A response as seen by the core: the status code and the decoded body.
/// Empty bodies decode to `Value::Null`, non-JSON bodies to `Value::String`.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    /// The server-reported message, from `detail` or `error`, or a bare string body.
    pub fn message(&self) -> Option<String> {
        match &self.body {
            Value::Object(map) => map
                .get("detail")
                .or_else(|| map.get("error"))
                .and_then(Value::as_str)
                .map(str::to_string),
            Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
            _ => None,
        }
    }
}

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Sends one request and returns whatever the server answered.
    /// Only transport-level failures are errors; every HTTP status is a response.
    async fn send(&self, request: &ApiRequest) -> PortResult<ApiResponse>;
}

/// Persistent home of the credential pair.
pub trait TokenStore: Send + Sync {
    fn load(&self) -> PortResult<Option<CredentialPair>>;

    fn save(&self, pair: &CredentialPair) -> PortResult<()>;

    /// Swaps in a new access token, but only if the stored pair still carries
    /// `refresh`. Returns `false` when the pair is gone or was replaced.
    fn replace_access(&self, refresh: &str, access: &str) -> PortResult<bool>;

    fn clear(&self) -> PortResult<()>;
}
