//! services/client/src/client/ocr.rs
//!
//! Image uploads for OCR, the patient's upload inbox and its detail view.

use std::sync::{Mutex, PoisonError};

use mediauth_core::domain::{OcrUpload, UploadFile, UploadId};
use mediauth_core::intake;
use mediauth_core::ports::ApiRequest;
use mediauth_core::workflow::{authorize, WorkflowAction};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::protocol::{
    decode, decode_list, ensure_success, reprocess_path, upload_path, UPLOADS_PATH, UPLOAD_FIELD,
};
use crate::client::session::SessionManager;
use crate::client::state::UploadInbox;
use crate::client::tracker::{run_scoped, RequestTracker, ResourceKey};
use crate::error::{ClientError, ClientResult};

/// The upload shown in the detail view, and the scope its loading runs in.
struct DetailScope {
    id: UploadId,
    cancel: CancellationToken,
}

pub struct OcrClient {
    session: SessionManager,
    inbox: watch::Sender<UploadInbox>,
    tracker: RequestTracker<ResourceKey>,
    detail: Mutex<Option<DetailScope>>,
}

impl OcrClient {
    pub fn new(session: SessionManager) -> Self {
        let (inbox, _) = watch::channel(UploadInbox::default());
        Self {
            session,
            inbox,
            tracker: RequestTracker::new(),
            detail: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<UploadInbox> {
        self.inbox.subscribe()
    }

    /// A snapshot of the inbox.
    pub fn inbox(&self) -> UploadInbox {
        self.inbox.borrow().clone()
    }

    /// Checks a picked file before anything is sent.
    pub fn validate_selection(file: &UploadFile) -> ClientResult<()> {
        Ok(intake::validate_selection(file)?)
    }

    //=====================================================================================
    // Uploading
    //=====================================================================================

    /// Uploads an image. Processing happens on the server; the returned record is
    /// usually still `processing`.
    ///
    /// When the server only acknowledges the upload the inbox is re-listed and
    /// `None` is returned.
    pub async fn upload(&self, file: UploadFile) -> ClientResult<Option<OcrUpload>> {
        Self::validate_selection(&file)?;
        let role = self.session.require_role()?;
        authorize(role, WorkflowAction::UploadImage, None)?;

        info!(file = %file.file_name, size = file.size(), "uploading prescription image");
        let request = ApiRequest::post(UPLOADS_PATH).with_file(UPLOAD_FIELD, file);
        let response = ensure_success(self.session.call(request).await?)?;

        match serde_json::from_value::<OcrUpload>(response.body) {
            Ok(upload) => {
                info!(id = upload.id, status = %upload.status, "upload accepted");
                let shown = upload.clone();
                self.inbox.send_modify(|inbox| inbox.apply(shown));
                Ok(Some(upload))
            }
            Err(_) => {
                info!("upload accepted, refreshing inbox");
                self.list().await?;
                Ok(None)
            }
        }
    }

    //=====================================================================================
    // Queries
    //=====================================================================================

    pub async fn list(&self) -> ClientResult<Vec<OcrUpload>> {
        let ticket = self.tracker.begin(ResourceKey::Collection);
        let uploads: Vec<OcrUpload> =
            decode_list(self.session.call(ApiRequest::get(UPLOADS_PATH)).await?)?;
        if self.tracker.is_current(&ticket) {
            let shown = uploads.clone();
            self.inbox.send_modify(|inbox| inbox.replace_all(shown));
            if let Some(id) = self.detail_target() {
                if self.inbox.borrow().find(id).is_none() {
                    self.drop_scope(id);
                }
            }
        } else {
            debug!("discarding superseded upload listing");
        }
        Ok(uploads)
    }

    pub async fn get(&self, id: UploadId) -> ClientResult<OcrUpload> {
        let ticket = self.tracker.begin(ResourceKey::Item(id));
        let result = self.fetch(id).await;
        if self.tracker.is_current(&ticket) {
            self.absorb(id, &result);
        } else {
            debug!(id, "discarding superseded upload response");
        }
        result
    }

    //=====================================================================================
    // Detail View
    //=====================================================================================

    /// Opens the detail view for `id`, abandoning whatever the view was loading.
    pub async fn open_detail(&self, id: UploadId) -> ClientResult<OcrUpload> {
        let cancel = CancellationToken::new();
        {
            let mut scope = self.detail.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(previous) = scope.replace(DetailScope {
                id,
                cancel: cancel.clone(),
            }) {
                previous.cancel.cancel();
            }
        }
        // Show the cached copy until the fresh one arrives.
        self.inbox
            .send_modify(|inbox| inbox.detail = inbox.find(id).cloned());

        let ticket = self.tracker.begin(ResourceKey::Item(id));
        let result = run_scoped(&cancel, self.fetch(id)).await;
        if matches!(result, Err(ClientError::Cancelled)) {
            debug!(id, "detail view moved on before loading finished");
            return result;
        }
        if !self.tracker.is_current(&ticket) || self.detail_target() != Some(id) {
            debug!(id, "discarding superseded detail response");
            return result;
        }

        match &result {
            Ok(upload) => {
                let shown = upload.clone();
                self.inbox.send_modify(|inbox| {
                    inbox.detail = Some(shown.clone());
                    inbox.apply(shown);
                });
            }
            Err(ClientError::NotFound(_)) => self.forget(id),
            Err(_) => {}
        }
        result
    }

    /// Closes the detail view and abandons its loading.
    pub fn close_detail(&self) {
        let scope = self.detail.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(scope) = scope {
            scope.cancel.cancel();
        }
        self.inbox.send_if_modified(|inbox| inbox.detail.take().is_some());
    }

    /// The upload the detail view is showing or loading.
    pub fn detail_target(&self) -> Option<UploadId> {
        self.detail
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|scope| scope.id)
    }

    //=====================================================================================
    // Mutations
    //=====================================================================================

    /// Asks the server to run OCR again. The record shows `processing` at once
    /// and falls back to its previous state if the request fails.
    pub async fn reprocess(&self, id: UploadId) -> ClientResult<Option<OcrUpload>> {
        let role = self.session.require_role()?;
        authorize(role, WorkflowAction::ReprocessUpload, None)?;

        let mut previous = None;
        self.inbox
            .send_modify(|inbox| previous = inbox.mark_processing(id));

        let ticket = self.tracker.begin(ResourceKey::Item(id));
        let result = match self.session.call(ApiRequest::post(reprocess_path(id))).await {
            Ok(response) => ensure_success(response),
            Err(e) => Err(e),
        };
        let current = self.tracker.is_current(&ticket);

        match result {
            Ok(response) => {
                info!(id, "reprocessing requested");
                let upload = serde_json::from_value::<OcrUpload>(response.body).ok();
                if let (Some(upload), true) = (&upload, current) {
                    let shown = upload.clone();
                    self.inbox.send_modify(|inbox| inbox.apply(shown));
                }
                Ok(upload)
            }
            Err(ClientError::NotFound(message)) => {
                warn!(id, "upload vanished before reprocessing");
                if current {
                    self.forget(id);
                }
                Err(ClientError::NotFound(message))
            }
            Err(e) => {
                warn!(id, "reprocessing failed: {}", e);
                if let (Some(previous), true) = (previous, current) {
                    self.inbox.send_modify(|inbox| inbox.apply(previous));
                }
                Err(e)
            }
        }
    }

    /// Deletes an upload. One that is already gone counts as deleted.
    pub async fn delete(&self, id: UploadId) -> ClientResult<()> {
        let role = self.session.require_role()?;
        authorize(role, WorkflowAction::DeleteUpload, None)?;

        // Nothing started before the delete may bring the record back.
        self.tracker.retire(&ResourceKey::Item(id));
        self.tracker.retire(&ResourceKey::Collection);

        let response = self.session.call(ApiRequest::delete(upload_path(id))).await?;
        if response.is_success() || response.is_not_found() {
            self.forget(id);
            info!(id, "upload deleted");
            Ok(())
        } else {
            Err(ClientError::from_response(&response))
        }
    }

    //=====================================================================================
    // Internals
    //=====================================================================================

    async fn fetch(&self, id: UploadId) -> ClientResult<OcrUpload> {
        decode(self.session.call(ApiRequest::get(upload_path(id))).await?)
    }

    /// Folds a current single-record result into the inbox.
    fn absorb(&self, id: UploadId, result: &ClientResult<OcrUpload>) {
        match result {
            Ok(upload) => {
                let shown = upload.clone();
                self.inbox.send_modify(|inbox| inbox.apply(shown));
            }
            Err(ClientError::NotFound(_)) => self.forget(id),
            Err(_) => {}
        }
    }

    /// Removes a record locally and closes the detail view if it shows it.
    /// Requests started before this point can no longer bring it back.
    fn forget(&self, id: UploadId) {
        self.tracker.retire(&ResourceKey::Item(id));
        self.tracker.retire(&ResourceKey::Collection);
        self.inbox.send_modify(|inbox| inbox.remove(id));
        self.drop_scope(id);
    }

    fn drop_scope(&self, id: UploadId) {
        let mut scope = self.detail.lock().unwrap_or_else(PoisonError::into_inner);
        if scope.as_ref().is_some_and(|s| s.id == id) {
            if let Some(scope) = scope.take() {
                scope.cancel.cancel();
            }
        }
    }
}
