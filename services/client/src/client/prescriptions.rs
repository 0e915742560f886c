//! services/client/src/client/prescriptions.rs
//!
//! Typed operations over prescriptions, and the board that mirrors them.
//!
//! Role and status gates run before anything is sent, but they only decide
//! what the client is willing to ask for. Every accepted mutation replaces the
//! local copy with the server's representation; a rejected one leaves it alone.

use mediauth_core::domain::{Prescription, PrescriptionId, PrescriptionStatus, UserSummary};
use mediauth_core::intake::PrescriptionDraft;
use mediauth_core::ports::ApiRequest;
use mediauth_core::workflow::{authorize, available_actions, confirms_transition, WorkflowAction};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::client::protocol::{
    decode, decode_list, ensure_success, fill_path, issue_path, prescription_path,
    PATIENTS_PATH, PRESCRIPTIONS_PATH,
};
use crate::client::session::SessionManager;
use crate::client::state::PrescriptionBoard;
use crate::client::tracker::{RequestTracker, ResourceKey, Ticket};
use crate::error::{ClientError, ClientResult};

/// How a settled response touches the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    /// Replace the local copy, adding it if it is not shown yet.
    Upsert,
    /// Replace the local copy only if it is shown.
    ReplaceShown,
}

pub struct PrescriptionClient {
    session: SessionManager,
    board: watch::Sender<PrescriptionBoard>,
    tracker: RequestTracker<ResourceKey>,
}

impl PrescriptionClient {
    pub fn new(session: SessionManager) -> Self {
        let (board, _) = watch::channel(PrescriptionBoard::default());
        Self {
            session,
            board,
            tracker: RequestTracker::new(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<PrescriptionBoard> {
        self.board.subscribe()
    }

    /// A snapshot of the board.
    pub fn board(&self) -> PrescriptionBoard {
        self.board.borrow().clone()
    }

    /// The actions to offer the signed-in user for a shown prescription.
    pub fn actions_for(&self, id: PrescriptionId) -> Vec<WorkflowAction> {
        let Ok(role) = self.session.require_role() else {
            return Vec::new();
        };
        let status = self.board.borrow().find(id).map(|p| p.status);
        status
            .map(|status| available_actions(role, status))
            .unwrap_or_default()
    }

    //=====================================================================================
    // Queries
    //=====================================================================================

    /// Everything the server lets this viewer see.
    pub async fn list(&self) -> ClientResult<Vec<Prescription>> {
        let ticket = self.tracker.begin(ResourceKey::Collection);
        let response = self.session.call(ApiRequest::get(PRESCRIPTIONS_PATH)).await?;
        let prescriptions: Vec<Prescription> = decode_list(response)?;
        if self.tracker.is_current(&ticket) {
            let shown = prescriptions.clone();
            self.board.send_modify(|board| board.prescriptions = shown);
        } else {
            debug!("discarding superseded prescription listing");
        }
        Ok(prescriptions)
    }

    pub async fn get(&self, id: PrescriptionId) -> ClientResult<Prescription> {
        let ticket = self.tracker.begin(ResourceKey::Item(id));
        let result = self.fetch(ApiRequest::get(prescription_path(id))).await;
        self.settle(&ticket, id, result, Placement::ReplaceShown)
    }

    /// Patients a doctor can write prescriptions for.
    pub async fn patients(&self) -> ClientResult<Vec<UserSummary>> {
        let role = self.session.require_role()?;
        authorize(role, WorkflowAction::ListPatients, None)?;
        decode_list(self.session.call(ApiRequest::get(PATIENTS_PATH)).await?)
    }

    //=====================================================================================
    // Mutations
    //=====================================================================================

    /// Creates a draft prescription from the form.
    ///
    /// Returns the created prescription when the server echoes it. When it only
    /// acknowledges, the board is re-listed instead and `None` is returned.
    pub async fn create(&self, draft: &PrescriptionDraft) -> ClientResult<Option<Prescription>> {
        let role = self.session.require_role()?;
        authorize(role, WorkflowAction::CreatePrescription, None)?;
        let payload = draft.validate()?;

        let request = ApiRequest::post(PRESCRIPTIONS_PATH).with_json(serde_json::to_value(&payload)?);
        let response = ensure_success(self.session.call(request).await?)?;
        match serde_json::from_value::<Prescription>(response.body) {
            Ok(created) => {
                info!(id = created.id, reference = %created.reference, "prescription created");
                let shown = created.clone();
                self.board.send_modify(|board| board.upsert(shown));
                Ok(Some(created))
            }
            Err(_) => {
                info!(patient_id = payload.patient_id, "prescription created, refreshing listing");
                self.list().await?;
                Ok(None)
            }
        }
    }

    /// Replaces a draft's content.
    pub async fn update(&self, id: PrescriptionId, draft: &PrescriptionDraft) -> ClientResult<Prescription> {
        self.gate(id, WorkflowAction::EditPrescription)?;
        let payload = draft.validate()?;
        let request =
            ApiRequest::put(prescription_path(id)).with_json(serde_json::to_value(&payload)?);

        let ticket = self.tracker.begin(ResourceKey::Item(id));
        let result = self.fetch(request).await;
        self.settle(&ticket, id, result, Placement::Upsert)
    }

    /// draft → issued. Doctors only.
    pub async fn issue(&self, id: PrescriptionId) -> ClientResult<Prescription> {
        self.transition(id, WorkflowAction::IssuePrescription, ApiRequest::post(issue_path(id)))
            .await
    }

    /// issued → filled. Pharmacists only.
    pub async fn fill(&self, id: PrescriptionId) -> ClientResult<Prescription> {
        self.transition(id, WorkflowAction::FillPrescription, ApiRequest::post(fill_path(id)))
            .await
    }

    /// Deletes a draft. A prescription that is already gone counts as deleted.
    pub async fn delete(&self, id: PrescriptionId) -> ClientResult<()> {
        self.gate(id, WorkflowAction::DeletePrescription)?;
        self.retire(id);

        let response = self.session.call(ApiRequest::delete(prescription_path(id))).await?;
        if response.is_success() || response.is_not_found() {
            // Anything that started while the delete was in flight is stale too.
            self.retire(id);
            self.board.send_if_modified(|board| board.remove(id));
            info!(id, "prescription deleted");
            Ok(())
        } else {
            Err(ClientError::from_response(&response))
        }
    }

    //=====================================================================================
    // Internals
    //=====================================================================================

    async fn transition(
        &self,
        id: PrescriptionId,
        action: WorkflowAction,
        request: ApiRequest,
    ) -> ClientResult<Prescription> {
        let before = self.gate(id, action)?;
        let ticket = self.tracker.begin(ResourceKey::Item(id));
        let result = self.fetch(request).await;
        match &result {
            Ok(prescription) if confirms_transition(action, before, prescription.status) => {
                info!(id, %action, status = %prescription.status, "transition accepted");
            }
            // The server is the authority; its answer is still shown.
            Ok(prescription) => {
                warn!(
                    id,
                    %action,
                    status = %prescription.status,
                    "server answered with an unexpected status"
                );
            }
            Err(e) => warn!(id, %action, "transition failed: {}", e),
        }
        self.settle(&ticket, id, result, Placement::Upsert)
    }

    fn retire(&self, id: PrescriptionId) {
        self.tracker.retire(&ResourceKey::Item(id));
        self.tracker.retire(&ResourceKey::Collection);
    }

    /// Client-side role and status gate against the mirrored copy. Returns the
    /// mirrored status, if one is shown.
    fn gate(
        &self,
        id: PrescriptionId,
        action: WorkflowAction,
    ) -> ClientResult<Option<PrescriptionStatus>> {
        let role = self.session.require_role()?;
        let current = self.board.borrow().find(id).map(|p| p.status);
        authorize(role, action, current).map_err(|denied| {
            warn!(id, %action, "refusing to send: {}", denied);
            ClientError::from(denied)
        })?;
        Ok(current)
    }

    async fn fetch(&self, request: ApiRequest) -> ClientResult<Prescription> {
        decode(self.session.call(request).await?)
    }

    /// Applies a finished request to the board unless it was superseded.
    fn settle(
        &self,
        ticket: &Ticket<ResourceKey>,
        id: PrescriptionId,
        result: ClientResult<Prescription>,
        placement: Placement,
    ) -> ClientResult<Prescription> {
        if !self.tracker.is_current(ticket) {
            debug!(key = ?ticket.key(), "discarding superseded prescription response");
            return result;
        }
        match &result {
            Ok(prescription) => {
                let shown = prescription.clone();
                self.board.send_if_modified(|board| match placement {
                    Placement::Upsert => {
                        board.upsert(shown);
                        true
                    }
                    Placement::ReplaceShown => board.replace(shown),
                });
            }
            Err(ClientError::NotFound(_)) => {
                self.board.send_if_modified(|board| board.remove(id));
            }
            Err(_) => {}
        }
        result
    }
}
