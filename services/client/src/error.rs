//! services/client/src/error.rs
//!
//! Defines the primary error type for the whole client.

use std::collections::BTreeMap;

use crate::config::ConfigError;
use mediauth_core::intake::{FileRejection, ValidationError};
use mediauth_core::ports::{ApiResponse, PortError};
use mediauth_core::workflow::ActionDenied;
use serde_json::Value;

/// The primary error type for the `client` service.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The session could not be renewed; the user must sign in again.
    #[error("Your session has expired, please sign in again")]
    AuthExpired,

    /// A gated action was attempted with nobody signed in.
    #[error("Not signed in")]
    NotSignedIn,

    /// A form field failed local validation before anything was sent.
    #[error("Invalid input for {}: {}", .0.field, .0.message)]
    Validation(#[from] ValidationError),

    /// Field-level errors reported by the server, keyed by field name.
    #[error("The server rejected the submitted fields: {}", describe_fields(.0))]
    FieldErrors(BTreeMap<String, String>),

    /// The selected file never left the client.
    #[error("File rejected: {0}")]
    File(#[from] FileRejection),

    /// The client refused an action the viewer's role or the entity's status forbids.
    #[error("Action not allowed: {0}")]
    Denied(#[from] ActionDenied),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    Forbidden(String),

    /// Any other non-success answer from the server.
    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The request never got an answer. The user may retry the action.
    #[error("Network failure: {0}")]
    Network(String),

    /// The view that issued the request was closed before it finished.
    #[error("Request cancelled")]
    Cancelled,

    #[error("Credential storage error: {0}")]
    Storage(String),

    /// The server answered with a body of an unexpected shape.
    #[error("Unexpected response body: {0}")]
    Decode(String),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

/// A convenience type alias for `Result<T, ClientError>`.
pub type ClientResult<T> = Result<T, ClientError>;

impl From<PortError> for ClientError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::Network(msg) => ClientError::Network(msg),
            PortError::Storage(msg) => ClientError::Storage(msg),
            PortError::Unexpected(msg) => ClientError::Internal(msg),
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Decode(err.to_string())
    }
}

impl ClientError {
    /// Maps a non-success response onto the error taxonomy.
    pub fn from_response(response: &ApiResponse) -> Self {
        let message = response
            .message()
            .unwrap_or_else(|| format!("request failed with status {}", response.status));
        match response.status {
            401 => ClientError::AuthExpired,
            403 => ClientError::Forbidden(message),
            404 => ClientError::NotFound(message),
            400 if response.message().is_none() => match field_errors(&response.body) {
                Some(fields) => ClientError::FieldErrors(fields),
                None => ClientError::Rejected {
                    status: response.status,
                    message,
                },
            },
            status => ClientError::Rejected { status, message },
        }
    }

    /// Failures the user may simply retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, ClientError::Network(_))
            || matches!(self, ClientError::Rejected { status, .. } if *status >= 500)
    }
}

/// Flattens a `{field: [messages]}` body into one message per field.
/// Returns `None` when the body is not a non-empty JSON object.
pub(crate) fn field_errors(body: &Value) -> Option<BTreeMap<String, String>> {
    let map = body.as_object().filter(|map| !map.is_empty())?;
    Some(
        map.iter()
            .map(|(field, value)| (field.clone(), flatten_message(value)))
            .collect(),
    )
}

fn flatten_message(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Array(items) => items
            .iter()
            .map(flatten_message)
            .collect::<Vec<_>>()
            .join(" "),
        Value::Object(_) => field_errors(value)
            .map(|nested| describe_fields(&nested))
            .unwrap_or_default(),
        other => other.to_string(),
    }
}

fn describe_fields(fields: &BTreeMap<String, String>) -> String {
    fields
        .iter()
        .map(|(field, message)| format!("{field}: {message}"))
        .collect::<Vec<_>>()
        .join("; ")
}
