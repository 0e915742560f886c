//! crates/mediauth_core/src/intake.rs
//!
//! Pure checks applied to user input before anything touches the network:
//! the prescription form and the OCR file picker.

use crate::domain::{MedicineDraft, MedicineItem, NewPrescription, UploadFile, UserId};

/// Largest image accepted for OCR upload: 10 MiB.
pub const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// A field-scoped input error. The user is re-prompted; it is never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Why a selected file was refused before upload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FileRejection {
    #[error("'{media_type}' is not an image; please select an image file")]
    InvalidFileType { media_type: String },
    #[error("file is {size} bytes; the limit is {limit} bytes")]
    FileTooLarge { size: u64, limit: u64 },
}

/// Checks a picked file: it must be `image/*` and at most [`MAX_UPLOAD_BYTES`].
pub fn validate_selection(file: &UploadFile) -> Result<(), FileRejection> {
    let is_image = file
        .media_type
        .split_once('/')
        .is_some_and(|(kind, _)| kind.trim().eq_ignore_ascii_case("image"));
    if !is_image {
        return Err(FileRejection::InvalidFileType {
            media_type: file.media_type.clone(),
        });
    }
    if file.size() > MAX_UPLOAD_BYTES {
        return Err(FileRejection::FileTooLarge {
            size: file.size(),
            limit: MAX_UPLOAD_BYTES,
        });
    }
    Ok(())
}

//=========================================================================================
// Prescription Form
//=========================================================================================

/// The prescription form as the doctor filled it in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrescriptionDraft {
    pub patient_id: Option<UserId>,
    pub diagnosis: String,
    pub notes: String,
    pub items: Vec<MedicineDraft>,
}

impl MedicineDraft {
    /// The first required field left blank, if any.
    fn first_missing(&self) -> Option<&'static str> {
        if self.medicine_name.trim().is_empty() {
            Some("medicine_name")
        } else if self.dosage.trim().is_empty() {
            Some("dosage")
        } else if self.frequency.trim().is_empty() {
            Some("frequency")
        } else if self.duration.trim().is_empty() {
            Some("duration")
        } else if !matches!(self.quantity, Some(q) if q > 0) {
            Some("quantity")
        } else {
            None
        }
    }

    fn to_item(&self) -> Option<MedicineItem> {
        if self.first_missing().is_some() {
            return None;
        }
        let instructions = self.instructions.trim();
        Some(MedicineItem {
            medicine_name: self.medicine_name.trim().to_string(),
            dosage: self.dosage.trim().to_string(),
            frequency: self.frequency.trim().to_string(),
            duration: self.duration.trim().to_string(),
            quantity: self.quantity?,
            instructions: (!instructions.is_empty()).then(|| instructions.to_string()),
        })
    }
}

impl PrescriptionDraft {
    /// Produces the payload to submit.
    ///
    /// Incomplete medicine lines are dropped rather than sent partially. If no
    /// complete line remains the error names the first offending field.
    pub fn validate(&self) -> Result<NewPrescription, ValidationError> {
        let patient_id = self
            .patient_id
            .ok_or_else(|| ValidationError::new("patient_id", "Please select a patient"))?;

        if self.diagnosis.trim().is_empty() {
            return Err(ValidationError::new("diagnosis", "Please enter a diagnosis"));
        }

        let items: Vec<MedicineItem> = self.items.iter().filter_map(MedicineDraft::to_item).collect();
        if items.is_empty() {
            let field = self
                .items
                .iter()
                .enumerate()
                .find_map(|(idx, item)| item.first_missing().map(|f| format!("items[{idx}].{f}")))
                .unwrap_or_else(|| "items".to_string());
            return Err(ValidationError::new(
                field,
                "Please add at least one complete medicine item",
            ));
        }

        Ok(NewPrescription {
            patient_id,
            diagnosis: self.diagnosis.trim().to_string(),
            notes: self.notes.trim().to_string(),
            items,
        })
    }
}
