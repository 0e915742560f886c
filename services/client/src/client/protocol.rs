//! services/client/src/client/protocol.rs
//!
//! The wire contract with the prescription service: endpoint paths, the token
//! payloads and the helpers that turn responses into domain types.

use mediauth_core::domain::{PrescriptionId, UploadId};
use mediauth_core::ports::ApiResponse;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{ClientError, ClientResult};

//=========================================================================================
// Endpoints
//=========================================================================================

pub const REGISTER_PATH: &str = "/users/register/";
pub const LOGIN_PATH: &str = "/users/login/";
pub const PROFILE_PATH: &str = "/users/profile/";
pub const REFRESH_PATH: &str = "/users/token/refresh/";
pub const PRESCRIPTIONS_PATH: &str = "/prescriptions/";
pub const PATIENTS_PATH: &str = "/prescriptions/patients/";
pub const UPLOADS_PATH: &str = "/ocr/upload/";

/// Multipart field the server reads the image from.
pub const UPLOAD_FIELD: &str = "image";

pub fn prescription_path(id: PrescriptionId) -> String {
    format!("/prescriptions/{id}/")
}

pub fn issue_path(id: PrescriptionId) -> String {
    format!("/prescriptions/{id}/issue/")
}

pub fn fill_path(id: PrescriptionId) -> String {
    format!("/prescriptions/{id}/fill/")
}

pub fn upload_path(id: UploadId) -> String {
    format!("/ocr/upload/{id}/")
}

pub fn reprocess_path(id: UploadId) -> String {
    format!("/ocr/upload/{id}/reprocess/")
}

//=========================================================================================
// Token Payloads
//=========================================================================================

/// Returned by the login endpoint.
#[derive(Deserialize, Debug)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Returned by the refresh endpoint.
#[derive(Deserialize, Debug)]
pub struct AccessToken {
    pub access: String,
}

//=========================================================================================
// Response Decoding
//=========================================================================================

/// Passes success responses through and maps everything else to an error.
pub fn ensure_success(response: ApiResponse) -> ClientResult<ApiResponse> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(ClientError::from_response(&response))
    }
}

/// Decodes the body of a success response.
pub fn decode<T: DeserializeOwned>(response: ApiResponse) -> ClientResult<T> {
    let response = ensure_success(response)?;
    Ok(serde_json::from_value(response.body)?)
}

/// Decodes a list body, which is either a bare array or a paginated
/// `{results: [...]}` envelope. Item errors surface as they are.
pub fn decode_list<T: DeserializeOwned>(response: ApiResponse) -> ClientResult<Vec<T>> {
    let response = ensure_success(response)?;
    let items = match response.body {
        Value::Object(mut page) => page
            .remove("results")
            .ok_or_else(|| ClientError::Decode("list response has no `results`".to_string()))?,
        other => other,
    };
    Ok(serde_json::from_value(items)?)
}
