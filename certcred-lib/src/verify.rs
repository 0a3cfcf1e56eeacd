//! Peer certificate verification.
//!
//! Runs after the peer's certificate list has been stored on the session.
//! The chain is checked against the CA list, CRLs and policy of the
//! session's credentials; the outcome also moves the session's
//! [`AuthState`] forward.

use crate::credentials::CertificateCredentials;
use crate::session::{AuthState, Session};
use crate::types::CertificateType;
use crate::util::now_timestamp;
use crate::x509::{self, CertStatus};
use crate::{CredError, Result};

/// Returned by the sentinel time accessors when no time is available.
pub const TIME_UNAVAILABLE: i64 = -1;

fn session_credentials(session: &Session) -> Result<&CertificateCredentials> {
    session
        .credentials()
        .map(|c| c.as_ref())
        .ok_or_else(|| CredError::InvalidRequest("session has no certificate credentials".into()))
}

fn peer_certificates(session: &Session) -> Result<&[Vec<u8>]> {
    match session.auth_info() {
        Some(info) if info.ncerts() > 0 => Ok(info.raw_certificate_list()),
        _ => Err(CredError::NoCertificateFound),
    }
}

/// Verify the peer's certificate chain.
///
/// Returns the status bitmask; an empty mask means trusted. Errors mean the
/// chain could not be examined: no credentials, nothing received, an
/// unsupported certificate type, or a chain outside the depth and key-size
/// limits.
pub fn verify_peers(session: &mut Session) -> Result<CertStatus> {
    let result = verify_peers_at(session, now_timestamp());
    match &result {
        Ok(status) => session.set_auth_state(AuthState::Verified(*status)),
        Err(CredError::NoCertificateFound) | Err(CredError::InvalidRequest(_)) => {}
        Err(e) => session.set_auth_state(AuthState::VerificationFailed(e.code())),
    }
    result
}

fn verify_peers_at(session: &Session, now_ts: i64) -> Result<CertStatus> {
    let creds = session_credentials(session)?;
    let chain = peer_certificates(session)?;

    match session.certificate_type() {
        CertificateType::X509 => {
            log::debug!("verifying peer chain of {} certificates", chain.len());
            x509::verify_chain(
                chain,
                creds.ca_list(),
                creds.crls(),
                creds.verify_policy(),
                now_ts,
            )
        }
        other => Err(CredError::InvalidRequest(format!(
            "cannot verify {} certificates",
            other
        ))),
    }
}

/// Integer form of [`verify_peers`]: the status bits, or a negative error
/// code.
#[deprecated(note = "use verify_peers, which separates errors from status")]
pub fn verify_peers_legacy(session: &mut Session) -> i32 {
    match verify_peers(session) {
        Ok(status) => status.bits() as i32,
        Err(e) => e.code(),
    }
}

fn peer_leaf_time(session: &Session, pick: fn(&x509::ParsedCertificate<'_>) -> i64) -> Result<i64> {
    session_credentials(session)?;
    let leaf = peer_certificates(session)?
        .first()
        .ok_or(CredError::NoCertificateFound)?;
    match session.certificate_type() {
        CertificateType::X509 => Ok(pick(&x509::import(leaf)?)),
        other => Err(CredError::InvalidRequest(format!(
            "no validity period for {} certificates",
            other
        ))),
    }
}

/// Activation time of the peer's leaf certificate.
pub fn try_peer_activation_time(session: &Session) -> Result<i64> {
    peer_leaf_time(session, x509::activation_time)
}

/// Expiration time of the peer's leaf certificate.
pub fn try_peer_expiration_time(session: &Session) -> Result<i64> {
    peer_leaf_time(session, x509::expiration_time)
}

/// Activation time of the peer's leaf, or [`TIME_UNAVAILABLE`].
pub fn peer_activation_time(session: &Session) -> i64 {
    try_peer_activation_time(session).unwrap_or(TIME_UNAVAILABLE)
}

/// Expiration time of the peer's leaf, or [`TIME_UNAVAILABLE`].
pub fn peer_expiration_time(session: &Session) -> i64 {
    try_peer_expiration_time(session).unwrap_or(TIME_UNAVAILABLE)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::session::Role;
    use std::sync::Arc;

    #[test]
    fn requires_credentials() {
        let mut session = Session::new(Role::Client);
        session.receive_peer_certificates(vec![vec![0x30]]).unwrap();
        assert!(matches!(
            verify_peers(&mut session),
            Err(CredError::InvalidRequest(_))
        ));
        assert_eq!(session.auth_state(), AuthState::CertificateReceived);
    }

    #[test]
    fn nothing_received_is_not_found() {
        let creds = Arc::new(CertificateCredentials::new());
        let mut session = Session::with_credentials(Role::Client, creds);
        assert!(matches!(
            verify_peers(&mut session),
            Err(CredError::NoCertificateFound)
        ));
        assert_eq!(session.auth_state(), AuthState::NoCertExchanged);
    }

    #[test]
    fn openpgp_is_rejected() {
        let creds = Arc::new(CertificateCredentials::new());
        let mut session = Session::with_credentials(Role::Client, creds);
        session.set_certificate_type(CertificateType::OpenPgp);
        session.receive_peer_certificates(vec![vec![0x30]]).unwrap();
        assert!(matches!(
            verify_peers(&mut session),
            Err(CredError::InvalidRequest(_))
        ));
        assert_eq!(peer_activation_time(&session), TIME_UNAVAILABLE);
    }

    #[test]
    fn garbage_leaf_fails_verification() {
        let creds = Arc::new(CertificateCredentials::new());
        let mut session = Session::with_credentials(Role::Client, creds);
        session.receive_peer_certificates(vec![b"garbage".to_vec()]).unwrap();
        let err = verify_peers(&mut session).unwrap_err();
        assert!(matches!(err, CredError::Parse(_)));
        assert_eq!(session.auth_state(), AuthState::VerificationFailed(err.code()));
        assert!(matches!(
            try_peer_expiration_time(&session),
            Err(CredError::Parse(_))
        ));
        assert_eq!(peer_expiration_time(&session), TIME_UNAVAILABLE);
    }

    #[test]
    #[allow(deprecated)]
    fn legacy_returns_negative_codes() {
        let mut session = Session::new(Role::Client);
        assert_eq!(verify_peers_legacy(&mut session), -50);
        let creds = Arc::new(CertificateCredentials::new());
        let mut session = Session::with_credentials(Role::Client, creds);
        assert_eq!(
            verify_peers_legacy(&mut session),
            CredError::NoCertificateFound.code()
        );
    }
}
