//! services/client/src/client/state.rs
//!
//! Defines the observable client state: the process-wide session and the
//! per-screen view models. Each lives in a `tokio::sync::watch` cell owned by
//! exactly one writer; the UI holds receivers.

use mediauth_core::domain::{
    OcrUpload, Prescription, PrescriptionId, Role, SessionUser, UploadId, UploadStatus,
};

//=========================================================================================
// AuthState (Shared Across the Whole Process)
//=========================================================================================

/// Why nobody is signed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignOutReason {
    /// Fresh start, or a stored session could not be restored.
    Initial,
    /// The user asked to sign out.
    LoggedOut,
    /// Credentials could not be renewed; the UI should redirect to login.
    SessionExpired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    /// A stored token is being checked against the profile endpoint.
    Restoring,
    SignedOut(SignOutReason),
    SignedIn(SessionUser),
}

impl AuthState {
    pub fn user(&self) -> Option<&SessionUser> {
        match self {
            AuthState::SignedIn(user) => Some(user),
            _ => None,
        }
    }

    pub fn role(&self) -> Option<Role> {
        self.user().map(|user| user.role)
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::SignedIn(_))
    }
}

//=========================================================================================
// PrescriptionBoard (The Prescriptions Screen)
//=========================================================================================

/// The locally mirrored prescriptions, exactly as the server last returned them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrescriptionBoard {
    pub prescriptions: Vec<Prescription>,
}

impl PrescriptionBoard {
    pub fn find(&self, id: PrescriptionId) -> Option<&Prescription> {
        self.prescriptions.iter().find(|p| p.id == id)
    }

    /// Replaces the local copy wholesale, or adds it at the top when new.
    pub(crate) fn upsert(&mut self, prescription: Prescription) {
        match self.prescriptions.iter_mut().find(|p| p.id == prescription.id) {
            Some(slot) => *slot = prescription,
            None => self.prescriptions.insert(0, prescription),
        }
    }

    /// Replaces the local copy only if one is shown.
    pub(crate) fn replace(&mut self, prescription: Prescription) -> bool {
        match self.prescriptions.iter_mut().find(|p| p.id == prescription.id) {
            Some(slot) => {
                *slot = prescription;
                true
            }
            None => false,
        }
    }

    pub(crate) fn remove(&mut self, id: PrescriptionId) -> bool {
        let before = self.prescriptions.len();
        self.prescriptions.retain(|p| p.id != id);
        before != self.prescriptions.len()
    }
}

//=========================================================================================
// UploadInbox (The OCR Screen)
//=========================================================================================

/// The user's uploads plus the one open in the detail view, if any.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadInbox {
    pub uploads: Vec<OcrUpload>,
    pub detail: Option<OcrUpload>,
}

impl UploadInbox {
    pub fn find(&self, id: UploadId) -> Option<&OcrUpload> {
        self.uploads.iter().find(|u| u.id == id)
    }

    pub fn detail_id(&self) -> Option<UploadId> {
        self.detail.as_ref().map(|u| u.id)
    }

    /// Applies a server representation to the list and to an open detail view.
    pub(crate) fn apply(&mut self, upload: OcrUpload) {
        if self.detail_id() == Some(upload.id) {
            self.detail = Some(upload.clone());
        }
        match self.uploads.iter_mut().find(|u| u.id == upload.id) {
            Some(slot) => *slot = upload,
            None => self.uploads.insert(0, upload),
        }
    }

    /// Swaps in a fresh listing. An open detail view follows its record, and
    /// closes if the record is gone.
    pub(crate) fn replace_all(&mut self, uploads: Vec<OcrUpload>) {
        if let Some(id) = self.detail_id() {
            self.detail = uploads.iter().find(|u| u.id == id).cloned();
        }
        self.uploads = uploads;
    }

    /// Marks a record as processing and returns what it looked like before.
    pub(crate) fn mark_processing(&mut self, id: UploadId) -> Option<OcrUpload> {
        let slot = self.uploads.iter_mut().find(|u| u.id == id)?;
        let previous = slot.clone();
        slot.status = UploadStatus::Processing;
        if let Some(detail) = self.detail.as_mut().filter(|d| d.id == id) {
            detail.status = UploadStatus::Processing;
        }
        Some(previous)
    }

    pub(crate) fn remove(&mut self, id: UploadId) {
        self.uploads.retain(|u| u.id != id);
        if self.detail_id() == Some(id) {
            self.detail = None;
        }
    }
}
