//! Per-handshake session context.
//!
//! The protocol engine owns one [`Session`] per handshake and passes it to
//! the selection and verification calls. It carries the role, negotiated
//! certificate type, attached credentials, the active chain selection, the
//! parameter cache and the [`AuthInfo`] record.

use crate::auth_info::AuthInfo;
use crate::credentials::CertificateCredentials;
use crate::params::{get_ephemeral_params, EphemeralParams, ParamsKind, SessionParams};
use crate::selector::Selection;
use crate::types::CertificateType;
use crate::x509::CertStatus;
use crate::{CredError, Result};
use std::sync::Arc;

/// Which end of the handshake this session is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// Whether a server asks clients for a certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CertificateRequest {
    /// Do not ask.
    #[default]
    Ignore,
    /// Ask, but carry on without one.
    Request,
    /// Ask and fail the handshake without one.
    Require,
}

/// Progress of certificate authentication in a handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthState {
    #[default]
    NoCertExchanged,
    CertificateRequested,
    CertificateReceived,
    Verified(CertStatus),
    /// Verification could not run; carries the error code.
    VerificationFailed(i32),
}

/// Callback that signs handshake data with the selected certificate's key.
///
/// Receives the certificate type, the DER of the selected leaf and the data
/// to sign; returns the signature.
pub type SignFn = dyn Fn(CertificateType, &[u8], &[u8]) -> Result<Vec<u8>> + Send + Sync;

/// Mutable state of one handshake.
pub struct Session {
    role: Role,
    cert_type: CertificateType,
    credentials: Option<Arc<CertificateCredentials>>,
    cert_request: CertificateRequest,
    selected: Option<Selection>,
    params: SessionParams,
    auth_info: Option<AuthInfo>,
    auth_state: AuthState,
    sign_fn: Option<Box<SignFn>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("role", &self.role)
            .field("cert_type", &self.cert_type)
            .field("has_credentials", &self.credentials.is_some())
            .field("cert_request", &self.cert_request)
            .field("selected", &self.selected.is_some())
            .field("auth_state", &self.auth_state)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(role: Role) -> Self {
        Session {
            role,
            cert_type: CertificateType::X509,
            credentials: None,
            cert_request: CertificateRequest::Ignore,
            selected: None,
            params: SessionParams::default(),
            auth_info: None,
            auth_state: AuthState::NoCertExchanged,
            sign_fn: None,
        }
    }

    pub fn with_credentials(role: Role, credentials: Arc<CertificateCredentials>) -> Self {
        let mut session = Self::new(role);
        session.set_credentials(credentials);
        session
    }

    pub fn set_credentials(&mut self, credentials: Arc<CertificateCredentials>) {
        self.credentials = Some(credentials);
    }

    pub fn credentials(&self) -> Option<&Arc<CertificateCredentials>> {
        self.credentials.as_ref()
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn certificate_type(&self) -> CertificateType {
        self.cert_type
    }

    /// Record the certificate type the handshake negotiated.
    pub fn set_certificate_type(&mut self, cert_type: CertificateType) {
        self.cert_type = cert_type;
    }

    /// Server side: whether to request a client certificate.
    pub fn set_certificate_request(&mut self, request: CertificateRequest) {
        self.cert_request = request;
    }

    pub fn certificate_request(&self) -> CertificateRequest {
        self.cert_request
    }

    /// Record that a certificate request was sent (server) or received
    /// (client). A server configured to ignore client certificates sends
    /// none and this fails with `InvalidRequest`.
    pub fn mark_certificate_requested(&mut self) -> Result<()> {
        if self.role == Role::Server && self.cert_request == CertificateRequest::Ignore {
            return Err(CredError::InvalidRequest(
                "server is not configured to request client certificates".into(),
            ));
        }
        self.auth_info_or_insert().set_certificate_requested();
        self.auth_state = AuthState::CertificateRequested;
        Ok(())
    }

    /// Store the peer's certificate list (leaf first, DER).
    ///
    /// A client always accepts the server's list. A server accepts a list
    /// only after requesting one; an empty list is refused when the request
    /// mode is `Require`.
    pub fn receive_peer_certificates(&mut self, certs: Vec<Vec<u8>>) -> Result<()> {
        if self.role == Role::Server {
            let requested = self
                .auth_info
                .as_ref()
                .is_some_and(AuthInfo::certificate_requested);
            if !requested {
                return Err(CredError::InvalidRequest(
                    "client certificate received without a request".into(),
                ));
            }
            if certs.is_empty() && self.cert_request == CertificateRequest::Require {
                return Err(CredError::NoCertificateFound);
            }
        }
        let received = !certs.is_empty();
        self.auth_info_or_insert().set_raw_certificate_list(certs);
        if received {
            self.auth_state = AuthState::CertificateReceived;
        }
        log::debug!("stored peer certificate list, state {:?}", self.auth_state);
        Ok(())
    }

    pub fn auth_info(&self) -> Option<&AuthInfo> {
        self.auth_info.as_ref()
    }

    pub fn auth_info_mut(&mut self) -> Option<&mut AuthInfo> {
        self.auth_info.as_mut()
    }

    pub(crate) fn auth_info_or_insert(&mut self) -> &mut AuthInfo {
        self.auth_info.get_or_insert_with(AuthInfo::new)
    }

    pub fn auth_state(&self) -> AuthState {
        self.auth_state
    }

    pub(crate) fn set_auth_state(&mut self, state: AuthState) {
        self.auth_state = state;
    }

    // ---- selection ----

    pub fn selected(&self) -> Option<&Selection> {
        self.selected.as_ref()
    }

    pub(crate) fn replace_selected(&mut self, selection: Option<Selection>) -> Option<Selection> {
        std::mem::replace(&mut self.selected, selection)
    }

    // ---- ephemeral parameters ----

    /// Parameters of `kind` for this handshake; see [`get_ephemeral_params`].
    pub fn ephemeral_params(&mut self, kind: ParamsKind) -> Option<EphemeralParams> {
        get_ephemeral_params(self, kind)
    }

    pub(crate) fn params(&self) -> &SessionParams {
        &self.params
    }

    pub(crate) fn params_mut(&mut self) -> &mut SessionParams {
        &mut self.params
    }

    // ---- signing ----

    /// Install the callback that signs with the selected key.
    pub fn set_sign_callback<F>(&mut self, f: F)
    where
        F: Fn(CertificateType, &[u8], &[u8]) -> Result<Vec<u8>> + Send + Sync + 'static,
    {
        self.sign_fn = Some(Box::new(f));
    }

    pub fn sign_callback(&self) -> Option<&SignFn> {
        self.sign_fn.as_deref()
    }

    pub fn clear_sign_callback(&mut self) {
        self.sign_fn = None;
    }

    /// Sign `data` through the sign callback using the selected leaf.
    pub fn sign(&self, data: &[u8]) -> Result<Vec<u8>> {
        let selection = self
            .selected
            .as_ref()
            .ok_or(CredError::InsufficientCredentials)?;
        let leaf = selection
            .leaf()
            .raw()
            .ok_or_else(|| CredError::InvalidRequest("selected leaf has no raw encoding".into()))?;
        let sign = self
            .sign_callback()
            .ok_or_else(|| CredError::InvalidRequest("no sign callback installed".into()))?;
        sign(self.cert_type, leaf, data)
    }
}
