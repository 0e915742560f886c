//! crates/mediauth_core/src/workflow.rs
//!
//! The prescription state machine and the role gates for every user-facing
//! action. These rules mirror the server's; they decide what the client offers
//! and refuses to send, but the server's answer always wins.

use std::fmt;

use crate::domain::{PrescriptionStatus, Role};

/// Every gated action a signed-in user can trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkflowAction {
    CreatePrescription,
    EditPrescription,
    DeletePrescription,
    IssuePrescription,
    FillPrescription,
    ListPatients,
    UploadImage,
    ReprocessUpload,
    DeleteUpload,
}

impl fmt::Display for WorkflowAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkflowAction::CreatePrescription => "create prescription",
            WorkflowAction::EditPrescription => "edit prescription",
            WorkflowAction::DeletePrescription => "delete prescription",
            WorkflowAction::IssuePrescription => "issue prescription",
            WorkflowAction::FillPrescription => "fill prescription",
            WorkflowAction::ListPatients => "list patients",
            WorkflowAction::UploadImage => "upload prescription image",
            WorkflowAction::ReprocessUpload => "reprocess upload",
            WorkflowAction::DeleteUpload => "delete upload",
        };
        f.write_str(name)
    }
}

impl WorkflowAction {
    /// The only role allowed to perform this action.
    pub fn permitted_role(self) -> Role {
        match self {
            WorkflowAction::CreatePrescription
            | WorkflowAction::EditPrescription
            | WorkflowAction::DeletePrescription
            | WorkflowAction::IssuePrescription
            | WorkflowAction::ListPatients => Role::Doctor,
            WorkflowAction::FillPrescription => Role::Pharmacist,
            WorkflowAction::UploadImage
            | WorkflowAction::ReprocessUpload
            | WorkflowAction::DeleteUpload => Role::Patient,
        }
    }

    /// The prescription status this action starts from, if it acts on one.
    pub fn required_status(self) -> Option<PrescriptionStatus> {
        match self {
            WorkflowAction::EditPrescription
            | WorkflowAction::DeletePrescription
            | WorkflowAction::IssuePrescription => Some(PrescriptionStatus::Draft),
            WorkflowAction::FillPrescription => Some(PrescriptionStatus::Issued),
            _ => None,
        }
    }

    /// The status the prescription moves to when the server accepts the action.
    pub fn resulting_status(self) -> Option<PrescriptionStatus> {
        match self {
            WorkflowAction::CreatePrescription => Some(PrescriptionStatus::Draft),
            WorkflowAction::IssuePrescription => Some(PrescriptionStatus::Issued),
            WorkflowAction::FillPrescription => Some(PrescriptionStatus::Filled),
            _ => None,
        }
    }
}

/// Why the client refused to send an action.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionDenied {
    #[error("a {role} cannot {action}")]
    WrongRole { action: WorkflowAction, role: Role },
    #[error("cannot {action} a {status} prescription")]
    WrongStatus {
        action: WorkflowAction,
        status: PrescriptionStatus,
    },
}

impl PrescriptionStatus {
    /// `cancelled` and `filled` absorb; nothing leaves them.
    pub fn is_terminal(self) -> bool {
        matches!(self, PrescriptionStatus::Filled | PrescriptionStatus::Cancelled)
    }

    /// Whether the lifecycle allows moving from `self` straight to `next`.
    pub fn can_become(self, next: PrescriptionStatus) -> bool {
        use PrescriptionStatus::{Cancelled, Draft, Filled, Issued};
        matches!(
            (self, next),
            (Draft, Issued) | (Issued, Filled) | (Draft, Cancelled) | (Issued, Cancelled)
        )
    }
}

/// Checks `action` for a viewer holding `role`.
///
/// `current` is the locally mirrored status of the target prescription. When it
/// is unknown the status gate is skipped and the server decides.
pub fn authorize(
    role: Role,
    action: WorkflowAction,
    current: Option<PrescriptionStatus>,
) -> Result<(), ActionDenied> {
    if action.permitted_role() != role {
        return Err(ActionDenied::WrongRole { action, role });
    }
    if let (Some(required), Some(status)) = (action.required_status(), current) {
        if required != status {
            return Err(ActionDenied::WrongStatus { action, status });
        }
    }
    Ok(())
}

/// Whether `after`, the status the server answered with, is what `action`
/// should have produced from `before` (when the previous status is known).
pub fn confirms_transition(
    action: WorkflowAction,
    before: Option<PrescriptionStatus>,
    after: PrescriptionStatus,
) -> bool {
    action.resulting_status() == Some(after) && before.map_or(true, |b| b.can_become(after))
}

/// The prescription actions to offer `role` for a prescription in `status`.
pub fn available_actions(role: Role, status: PrescriptionStatus) -> Vec<WorkflowAction> {
    if status.is_terminal() {
        return Vec::new();
    }
    [
        WorkflowAction::IssuePrescription,
        WorkflowAction::FillPrescription,
        WorkflowAction::EditPrescription,
        WorkflowAction::DeletePrescription,
    ]
    .into_iter()
    .filter(|action| authorize(role, *action, Some(status)).is_ok())
    .collect()
}
