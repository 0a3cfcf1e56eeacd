//! certcred-lib: certificate credentials for a TLS handshake engine.
//!
//! Holds X.509 certificate chains with their private keys, trusted CAs,
//! CRLs and verification policy; selects the chain a session presents;
//! verifies the chain a peer sent; and keeps the per-handshake record of
//! what was exchanged. Wire parsing and cryptographic primitives belong to
//! the protocol engine that drives these calls.

mod bits;
pub mod auth_info;
pub mod cert;
pub mod config;
pub mod credentials;
mod fingerprint;
mod oid;
pub mod params;
pub mod selector;
pub mod session;
mod types;
mod util;
pub mod verify;
pub mod x509;

pub use auth_info::{AuthInfo, DhInfo, RsaInfo};
pub use bits::FlagLabels;
pub use cert::{Certificate, ConvFlags, MAX_PUBLIC_PARAMS_SIZE};
pub use config::{CredentialsConfig, KeyPairConfig};
pub use credentials::{CertKeyPair, CertificateCredentials};
pub use fingerprint::{compute_fingerprint, DigestAlgorithm};
pub use params::{DhParams, EphemeralParams, ParamsKind, RsaExportParams};
pub use selector::{
    client_select_cert, get_selected_cert, select_chain, server_select_cert, set_selected,
    supported_key_exchanges, KxAlgorithm, RetrieveRequest, Retrieved, Selection,
};
pub use session::{AuthState, CertificateRequest, Role, Session};
pub use types::{CertificateFormat, CertificateType, KeyUsage, PkAlgorithm, PublicParam};
pub use util::{format_timestamp, now_timestamp};
#[allow(deprecated)]
pub use verify::verify_peers_legacy;
pub use verify::{
    peer_activation_time, peer_expiration_time, try_peer_activation_time,
    try_peer_expiration_time, verify_peers, TIME_UNAVAILABLE,
};
pub use x509::{
    find_system_ca_bundle, parse_pem_chain, CaList, CertStatus, Crl, PrivateKey, VerifyFlags,
    VerifyPolicy, DEFAULT_VERIFY_BITS, DEFAULT_VERIFY_DEPTH,
};

/// Result alias used throughout certcred-lib.
pub type Result<T> = std::result::Result<T, CredError>;

/// Errors returned by certcred-lib.
#[derive(Debug, thiserror::Error)]
pub enum CredError {
    #[error("memory allocation failed")]
    Allocation,

    #[error("Failed to parse certificate: {0}")]
    Parse(String),

    #[error("Invalid PEM format: {0}")]
    Pem(String),

    #[error("Unsupported type: {0}")]
    UnsupportedType(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("No certificate was found")]
    NoCertificateFound,

    #[error("The selected certificate permits no key exchange algorithm")]
    NoSupportedAlgorithm,

    #[error("Insufficient credentials for the requested operation")]
    InsufficientCredentials,

    #[error("Constraint violated: {0}")]
    Constraint(String),

    #[error("Output buffer too small: {needed} bytes needed")]
    ShortBuffer { needed: usize },

    #[error("Certificate callback aborted the handshake: {0}")]
    CallbackAbort(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CredError {
    /// Stable negative integer for callers that still speak integer codes.
    pub fn code(&self) -> i32 {
        match self {
            CredError::Allocation => -25,
            CredError::Parse(_) => -69,
            CredError::Pem(_) => -34,
            CredError::UnsupportedType(_) => -61,
            CredError::InvalidRequest(_) => -50,
            CredError::NoCertificateFound => -49,
            CredError::NoSupportedAlgorithm => -48,
            CredError::InsufficientCredentials => -32,
            CredError::Constraint(_) => -101,
            CredError::ShortBuffer { .. } => -51,
            CredError::CallbackAbort(_) => -52,
            CredError::Io(_) => -64,
            CredError::Json(_) => -65,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_negative_and_distinct() {
        let errors = [
            CredError::Allocation,
            CredError::Parse(String::new()),
            CredError::Pem(String::new()),
            CredError::UnsupportedType(String::new()),
            CredError::InvalidRequest(String::new()),
            CredError::NoCertificateFound,
            CredError::NoSupportedAlgorithm,
            CredError::InsufficientCredentials,
            CredError::Constraint(String::new()),
            CredError::ShortBuffer { needed: 1 },
            CredError::CallbackAbort(String::new()),
            CredError::Io(std::io::Error::other("x")),
        ];
        let mut seen = std::collections::HashSet::new();
        for e in &errors {
            assert!(e.code() < 0, "{e} has non-negative code");
            assert!(seen.insert(e.code()), "{e} shares a code");
        }
    }

    #[test]
    fn credentials_are_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CertificateCredentials>();
        assert_send_sync::<std::sync::Arc<CertificateCredentials>>();
    }
}
