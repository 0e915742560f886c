//! services/client/src/client/mod.rs
//!
//! The client core: one session manager shared by the workflow clients.

pub mod ocr;
pub mod prescriptions;
pub mod protocol;
pub mod session;
pub mod state;
pub mod tracker;

use std::sync::Arc;

use mediauth_core::ports::{HttpTransport, TokenStore};

use crate::adapters::{FileTokenStore, MemoryTokenStore, ReqwestTransport};
use crate::config::Config;
use crate::error::ClientResult;

pub use ocr::OcrClient;
pub use prescriptions::PrescriptionClient;
pub use session::SessionManager;
pub use state::{AuthState, PrescriptionBoard, SignOutReason, UploadInbox};

//=========================================================================================
// AppClient (Shared by Every Screen)
//=========================================================================================

/// Everything a front end needs, created once at startup.
pub struct AppClient {
    pub config: Arc<Config>,
    pub session: SessionManager,
    pub prescriptions: PrescriptionClient,
    pub ocr: OcrClient,
}

impl AppClient {
    /// Wires the client to arbitrary adapters.
    pub fn new(
        config: Arc<Config>,
        transport: Arc<dyn HttpTransport>,
        tokens: Arc<dyn TokenStore>,
    ) -> Self {
        let session = SessionManager::new(transport, tokens);
        Self {
            config,
            prescriptions: PrescriptionClient::new(session.clone()),
            ocr: OcrClient::new(session.clone()),
            session,
        }
    }

    /// Wires the client to the real HTTP transport and the configured token store.
    pub fn from_config(config: Arc<Config>) -> ClientResult<Self> {
        let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new(
            config.api_base_url.clone(),
            config.http_timeout,
        )?);
        let tokens: Arc<dyn TokenStore> = match &config.token_path {
            Some(path) => Arc::new(FileTokenStore::new(path.clone())),
            None => Arc::new(MemoryTokenStore::new()),
        };
        Ok(Self::new(config, transport, tokens))
    }
}
