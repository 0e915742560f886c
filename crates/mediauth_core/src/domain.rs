//! crates/mediauth_core/src/domain.rs
//!
//! Defines the core data structures mirrored from the prescription service.
//! The shapes follow the server's JSON representation so they can be
//! deserialized directly from responses.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

pub type UserId = i64;
pub type PrescriptionId = i64;
pub type UploadId = i64;

//=========================================================================================
// Users and Credentials
//=========================================================================================

/// The three roles a MediAuth account can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Patient,
    Doctor,
    Pharmacist,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Patient => write!(f, "patient"),
            Role::Doctor => write!(f, "doctor"),
            Role::Pharmacist => write!(f, "pharmacist"),
        }
    }
}

/// An access/refresh token pair. The store only ever holds both or neither.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialPair {
    pub access: String,
    pub refresh: String,
}

impl CredentialPair {
    pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            access: access.into(),
            refresh: refresh.into(),
        }
    }
}

// Tokens must never end up in logs.
impl fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPair")
            .field("access", &"<redacted>")
            .field("refresh", &"<redacted>")
            .finish()
    }
}

/// The signed-in account, as returned by the profile endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(rename = "user_type")]
    pub role: Role,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub license_number: Option<String>,
}

impl SessionUser {
    /// "First Last" when a name is on file, otherwise the username.
    pub fn display_name(&self) -> String {
        display_name(&self.first_name, &self.last_name, &self.username)
    }
}

/// The reduced user shape embedded in prescriptions and returned by the
/// patients lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(rename = "user_type")]
    pub role: Role,
}

impl UserSummary {
    pub fn display_name(&self) -> String {
        display_name(&self.first_name, &self.last_name, &self.username)
    }
}

fn display_name(first: &str, last: &str, username: &str) -> String {
    let full = format!("{} {}", first.trim(), last.trim());
    let full = full.trim();
    if full.is_empty() {
        username.to_string()
    } else {
        full.to_string()
    }
}

/// Login payload.
#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Account registration payload. Registration never signs the user in.
#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
    pub password_confirm: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(rename = "user_type")]
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_number: Option<String>,
}

/// Partial profile update; absent fields are left untouched by the server.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
}

//=========================================================================================
// Prescriptions
//=========================================================================================

/// Lifecycle status of a prescription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrescriptionStatus {
    Draft,
    Issued,
    Filled,
    Cancelled,
}

impl fmt::Display for PrescriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrescriptionStatus::Draft => write!(f, "draft"),
            PrescriptionStatus::Issued => write!(f, "issued"),
            PrescriptionStatus::Filled => write!(f, "filled"),
            PrescriptionStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A fully specified medicine line on a prescription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicineItem {
    pub medicine_name: String,
    pub dosage: String,
    pub frequency: String,
    pub duration: String,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prescription {
    pub id: PrescriptionId,
    /// Human readable identifier, e.g. `RX20240501`.
    #[serde(rename = "prescription_id", default)]
    pub reference: String,
    pub patient: UserSummary,
    pub doctor: UserSummary,
    pub diagnosis: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub items: Vec<MedicineItem>,
    pub status: PrescriptionStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(rename = "issued_date", default)]
    pub issued_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub filled_by: Option<UserSummary>,
    #[serde(rename = "filled_date", default)]
    pub filled_at: Option<DateTime<Utc>>,
}

/// A medicine line as typed into the prescription form. Any field may still
/// be blank; see [`crate::intake::PrescriptionDraft::validate`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MedicineDraft {
    pub medicine_name: String,
    pub dosage: String,
    pub frequency: String,
    pub duration: String,
    pub quantity: Option<u32>,
    pub instructions: String,
}

/// The validated payload sent to create or update a prescription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewPrescription {
    pub patient_id: UserId,
    pub diagnosis: String,
    pub notes: String,
    pub items: Vec<MedicineItem>,
}

//=========================================================================================
// OCR Uploads
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Processing,
    Completed,
    Failed,
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadStatus::Processing => write!(f, "processing"),
            UploadStatus::Completed => write!(f, "completed"),
            UploadStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One medicine line recovered from an image. The extraction engine may emit
/// `null` for anything it could not read; those fields come back empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedMedicine {
    #[serde(default, deserialize_with = "null_as_default")]
    pub medicine_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub dosage: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub frequency: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub duration: String,
    #[serde(default)]
    pub instructions: Option<String>,
}

/// Structured data the extraction engine recovered from an image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedPrescription {
    #[serde(default)]
    pub patient_name: Option<String>,
    #[serde(default)]
    pub doctor_name: Option<String>,
    #[serde(default)]
    pub diagnosis: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub medicines: Vec<ParsedMedicine>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrUpload {
    pub id: UploadId,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub original_filename: String,
    pub status: UploadStatus,
    #[serde(default, deserialize_with = "null_as_default")]
    pub extracted_text: String,
    /// `None` when nothing was extracted or the payload has an unusable shape.
    #[serde(default, deserialize_with = "lenient_parsed")]
    pub parsed_data: Option<ParsedPrescription>,
    pub uploaded_at: DateTime<Utc>,
    #[serde(default)]
    pub processed_at: Option<DateTime<Utc>>,
}

impl OcrUpload {
    /// The parsed payload, only once extraction has completed.
    pub fn parsed(&self) -> Option<&ParsedPrescription> {
        match self.status {
            UploadStatus::Completed => self.parsed_data.as_ref(),
            _ => None,
        }
    }
}

/// A file the user picked for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub file_name: String,
    /// MIME type, e.g. `image/png`.
    pub media_type: String,
    pub bytes: Bytes,
}

impl UploadFile {
    pub fn new(file_name: impl Into<String>, media_type: impl Into<String>, bytes: Bytes) -> Self {
        Self {
            file_name: file_name.into(),
            media_type: media_type.into(),
            bytes,
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

//=========================================================================================
// Lenient Decoding
//=========================================================================================

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Extraction output is model-generated; a malformed payload must not make the
/// whole upload record unreadable.
fn lenient_parsed<'de, D>(deserializer: D) -> Result<Option<ParsedPrescription>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| serde_json::from_value(value).ok()))
}
