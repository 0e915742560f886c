//! services/client/src/client/session.rs
//!
//! The session manager: the single gateway for every API call.
//!
//! It attaches the current access token, renews it once when the server answers
//! 401, and ends the session when renewal is impossible. It is also the sole
//! writer of the credential pair and of the published [`AuthState`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use mediauth_core::domain::{CredentialPair, Credentials, ProfileUpdate, Registration, Role, SessionUser};
use mediauth_core::ports::{ApiRequest, ApiResponse, HttpTransport, TokenStore};
use serde_json::json;
use tokio::sync::watch;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::client::protocol::{
    decode, AccessToken, TokenPair, LOGIN_PATH, PROFILE_PATH, REFRESH_PATH, REGISTER_PATH,
};
use crate::client::state::{AuthState, SignOutReason};
use crate::error::{field_errors, ClientError, ClientResult};

/// Which try of an original request is being dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    First,
    /// The request already triggered a refresh and gets no further one.
    Retry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefreshOutcome {
    Renewed,
    Failed,
}

type RefreshFuture = Shared<BoxFuture<'static, RefreshOutcome>>;

struct InFlightRefresh {
    id: u64,
    future: RefreshFuture,
}

struct SessionInner {
    transport: Arc<dyn HttpTransport>,
    tokens: Arc<dyn TokenStore>,
    state: watch::Sender<AuthState>,
    refresh: Mutex<Option<InFlightRefresh>>,
    next_refresh_id: AtomicU64,
}

//=========================================================================================
// SessionManager
//=========================================================================================

/// Cheap to clone; all clones share one session.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionInner>,
}

impl SessionManager {
    pub fn new(transport: Arc<dyn HttpTransport>, tokens: Arc<dyn TokenStore>) -> Self {
        let (state, _) = watch::channel(AuthState::SignedOut(SignOutReason::Initial));
        Self {
            inner: Arc::new(SessionInner {
                transport,
                tokens,
                state,
                refresh: Mutex::new(None),
                next_refresh_id: AtomicU64::new(1),
            }),
        }
    }

    /// Receives every change of the session state.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.inner.state.subscribe()
    }

    pub fn auth_state(&self) -> AuthState {
        self.inner.state.borrow().clone()
    }

    pub fn current_user(&self) -> Option<SessionUser> {
        self.inner.state.borrow().user().cloned()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.state.borrow().is_authenticated()
    }

    /// The signed-in user's role, for client-side gating.
    pub fn require_role(&self) -> ClientResult<Role> {
        self.inner.state.borrow().role().ok_or(ClientError::NotSignedIn)
    }

    //=====================================================================================
    // Guarded Dispatch
    //=====================================================================================

    /// Sends `request` with the current credentials, renewing them at most once.
    ///
    /// Every HTTP status comes back as a response; only transport failures and
    /// an unrecoverable session are errors.
    pub async fn call(&self, request: ApiRequest) -> ClientResult<ApiResponse> {
        let span = info_span!(
            "api_call",
            request_id = %Uuid::new_v4(),
            method = %request.method,
            path = %request.path,
        );
        self.dispatch(&request, Attempt::First).instrument(span).await
    }

    async fn dispatch(&self, request: &ApiRequest, mut attempt: Attempt) -> ClientResult<ApiResponse> {
        loop {
            // Read fresh every time; another task may have renewed or cleared it.
            let sent_with = self.access_token()?;
            debug!(?attempt, authenticated = sent_with.is_some(), "dispatching request");
            let response = self
                .inner
                .transport
                .send(&request.clone().with_bearer(sent_with.clone()))
                .await?;

            if !response.is_unauthorized() {
                return Ok(response);
            }

            match attempt {
                Attempt::Retry => {
                    warn!("request still unauthorized after renewing credentials");
                    return Ok(response);
                }
                Attempt::First => {
                    attempt = Attempt::Retry;
                    self.renew_after_rejection(sent_with.as_deref()).await?;
                }
            }
        }
    }

    /// Makes valid credentials available after a 401, or ends the session.
    async fn renew_after_rejection(&self, sent_with: Option<&str>) -> ClientResult<()> {
        let current = self.access_token()?;
        if current.is_some() && current.as_deref() != sent_with {
            debug!("credentials changed while the request was in flight, retrying with them");
            return Ok(());
        }
        match self.refresh_single_flight().await {
            RefreshOutcome::Renewed => Ok(()),
            RefreshOutcome::Failed => Err(ClientError::AuthExpired),
        }
    }

    /// Joins the refresh already in flight, or starts one.
    fn refresh_single_flight(&self) -> RefreshFuture {
        let mut slot = self.inner.refresh.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(in_flight) = slot.as_ref() {
            debug!(refresh_id = in_flight.id, "joining in-flight credential refresh");
            return in_flight.future.clone();
        }

        let id = self.inner.next_refresh_id.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::clone(&self.inner);
        let future = async move {
            let outcome = inner.perform_refresh().await;
            inner.finish_refresh(id);
            outcome
        }
        .boxed()
        .shared();
        *slot = Some(InFlightRefresh {
            id,
            future: future.clone(),
        });
        future
    }

    //=====================================================================================
    // Session Lifecycle
    //=====================================================================================

    /// Signs in, persists both tokens and loads the profile.
    /// Nothing is persisted when the server refuses the credentials.
    pub async fn login(&self, credentials: &Credentials) -> ClientResult<SessionUser> {
        let request = ApiRequest::post(LOGIN_PATH).with_json(serde_json::to_value(credentials)?);
        let response = self.send_public(&request).await?;
        if !response.is_success() {
            let message = response.message().unwrap_or_else(|| "Login failed".to_string());
            warn!(status = response.status, "login rejected: {}", message);
            return Err(ClientError::Rejected {
                status: response.status,
                message,
            });
        }

        let tokens: TokenPair = serde_json::from_value(response.body)?;
        self.inner
            .tokens
            .save(&CredentialPair::new(tokens.access, tokens.refresh))?;

        match self.fetch_profile().await {
            Ok(user) => {
                info!(user = %user.username, role = %user.role, "signed in");
                self.inner.state.send_replace(AuthState::SignedIn(user.clone()));
                Ok(user)
            }
            Err(e) => {
                warn!("could not load profile after login: {}", e);
                self.inner.clear_tokens();
                Err(e)
            }
        }
    }

    /// Creates an account. Does not sign in; server field errors come back verbatim.
    pub async fn register(&self, registration: &Registration) -> ClientResult<()> {
        let request =
            ApiRequest::post(REGISTER_PATH).with_json(serde_json::to_value(registration)?);
        let response = self.send_public(&request).await?;
        if response.is_success() {
            info!(username = %registration.username, "account registered");
            return Ok(());
        }

        warn!(status = response.status, "registration rejected");
        Err(match field_errors(&response.body) {
            Some(fields) => ClientError::FieldErrors(fields),
            None => ClientError::Rejected {
                status: response.status,
                message: response
                    .message()
                    .unwrap_or_else(|| "Registration failed".to_string()),
            },
        })
    }

    /// Forgets the session locally. Idempotent; never contacts the server.
    pub fn logout(&self) {
        self.inner.clear_tokens();
        self.inner
            .state
            .send_replace(AuthState::SignedOut(SignOutReason::LoggedOut));
        info!("signed out");
    }

    /// Picks up a stored session at process start.
    ///
    /// Any failure silently discards the stored tokens and leaves the client
    /// signed out.
    pub async fn restore_session(&self) -> Option<SessionUser> {
        match self.inner.tokens.load() {
            Ok(Some(_)) => {}
            Ok(None) => {
                self.inner
                    .state
                    .send_replace(AuthState::SignedOut(SignOutReason::Initial));
                return None;
            }
            Err(e) => {
                warn!("stored credentials are unreadable: {}", e);
                self.inner.clear_tokens();
                self.inner
                    .state
                    .send_replace(AuthState::SignedOut(SignOutReason::Initial));
                return None;
            }
        }

        self.inner.state.send_replace(AuthState::Restoring);
        match self.fetch_profile().await {
            Ok(user) => {
                info!(user = %user.username, "session restored");
                self.inner.state.send_replace(AuthState::SignedIn(user.clone()));
                Some(user)
            }
            Err(e) => {
                info!("stored session could not be restored: {}", e);
                self.inner.clear_tokens();
                self.inner
                    .state
                    .send_replace(AuthState::SignedOut(SignOutReason::Initial));
                None
            }
        }
    }

    /// Updates the profile and publishes the server's representation.
    pub async fn update_profile(&self, changes: &ProfileUpdate) -> ClientResult<SessionUser> {
        self.require_role()?;
        let request = ApiRequest::put(PROFILE_PATH).with_json(serde_json::to_value(changes)?);
        let user: SessionUser = decode(self.call(request).await?)?;
        // A logout while the request was in flight wins.
        let applied = self.inner.state.send_if_modified(|state| {
            if state.is_authenticated() {
                *state = AuthState::SignedIn(user.clone());
                true
            } else {
                false
            }
        });
        if applied {
            info!(user = %user.username, "profile updated");
        }
        Ok(user)
    }

    async fn fetch_profile(&self) -> ClientResult<SessionUser> {
        decode(self.call(ApiRequest::get(PROFILE_PATH)).await?)
    }

    /// Sends a credential endpoint request: no bearer, no refresh protocol.
    async fn send_public(&self, request: &ApiRequest) -> ClientResult<ApiResponse> {
        let span = info_span!(
            "api_call",
            request_id = %Uuid::new_v4(),
            method = %request.method,
            path = %request.path,
        );
        Ok(self.inner.transport.send(request).instrument(span).await?)
    }

    fn access_token(&self) -> ClientResult<Option<String>> {
        Ok(self.inner.tokens.load()?.map(|pair| pair.access))
    }
}

//=========================================================================================
// Refresh and Teardown
//=========================================================================================

impl SessionInner {
    async fn perform_refresh(&self) -> RefreshOutcome {
        let refresh = match self.tokens.load() {
            Ok(Some(pair)) => pair.refresh,
            Ok(None) => {
                info!("no refresh token stored, ending session");
                self.expire();
                return RefreshOutcome::Failed;
            }
            Err(e) => {
                error!("could not read stored credentials: {}", e);
                self.expire();
                return RefreshOutcome::Failed;
            }
        };

        let request = ApiRequest::post(REFRESH_PATH).with_json(json!({ "refresh": refresh }));
        let access = match self.transport.send(&request).await {
            Ok(response) if response.is_success() => {
                match serde_json::from_value::<AccessToken>(response.body) {
                    Ok(token) => token.access,
                    Err(e) => {
                        warn!("malformed refresh response: {}", e);
                        self.expire();
                        return RefreshOutcome::Failed;
                    }
                }
            }
            Ok(response) => {
                warn!(status = response.status, "credential refresh rejected");
                self.expire();
                return RefreshOutcome::Failed;
            }
            Err(e) => {
                warn!("credential refresh failed: {}", e);
                self.expire();
                return RefreshOutcome::Failed;
            }
        };

        match self.tokens.replace_access(&refresh, &access) {
            Ok(true) => {
                info!("access token renewed");
                RefreshOutcome::Renewed
            }
            Ok(false) => {
                info!("session changed during refresh, discarding the renewed token");
                RefreshOutcome::Failed
            }
            Err(e) => {
                error!("could not persist renewed access token: {}", e);
                self.expire();
                RefreshOutcome::Failed
            }
        }
    }

    fn finish_refresh(&self, id: u64) {
        let mut slot = self.refresh.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|in_flight| in_flight.id == id) {
            *slot = None;
        }
    }

    /// Tears the session down after an unrecoverable authorization failure.
    fn expire(&self) {
        self.clear_tokens();
        let expired = self.state.send_if_modified(|state| {
            let next = match state {
                AuthState::SignedIn(_) => AuthState::SignedOut(SignOutReason::SessionExpired),
                // Restoration failures stay silent.
                AuthState::Restoring => AuthState::SignedOut(SignOutReason::Initial),
                AuthState::SignedOut(_) => return false,
            };
            *state = next;
            true
        });
        if expired {
            warn!("session expired, sign-in required");
        }
    }

    fn clear_tokens(&self) {
        if let Err(e) = self.tokens.clear() {
            error!("failed to clear stored credentials: {}", e);
        }
    }
}
