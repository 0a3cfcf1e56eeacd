//! Choosing the certificate chain a session presents.
//!
//! A session presents at most one chain-and-key, its *selection*. It comes
//! either from the application's retrieve callback or from the first
//! stored chain whose leaf fits the negotiation. Key-exchange support of
//! the selection follows from the leaf's public-key algorithm and its key
//! usage.

use crate::cert::Certificate;
use crate::credentials::{CertKeyPair, CertificateCredentials};
use crate::session::{Role, Session};
use crate::types::{KeyUsage, PkAlgorithm};
use crate::x509::{self, PrivateKey};
use crate::{CredError, Result};
use serde::Serialize;
use std::sync::Arc;

/// Key-exchange algorithms, in canonical preference order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum KxAlgorithm {
    Rsa,
    RsaExport,
    DheRsa,
    DheDss,
    EcdheRsa,
    EcdheEcdsa,
    EcdhEcdsa,
    AnonDh,
}

impl KxAlgorithm {
    /// Every algorithm, in canonical order.
    pub const ALL: [KxAlgorithm; 8] = [
        KxAlgorithm::Rsa,
        KxAlgorithm::RsaExport,
        KxAlgorithm::DheRsa,
        KxAlgorithm::DheDss,
        KxAlgorithm::EcdheRsa,
        KxAlgorithm::EcdheEcdsa,
        KxAlgorithm::EcdhEcdsa,
        KxAlgorithm::AnonDh,
    ];

    /// Certificate key algorithm this exchange authenticates with, if any.
    pub fn pk_algorithm(self) -> Option<PkAlgorithm> {
        match self {
            KxAlgorithm::Rsa
            | KxAlgorithm::RsaExport
            | KxAlgorithm::DheRsa
            | KxAlgorithm::EcdheRsa => Some(PkAlgorithm::Rsa),
            KxAlgorithm::DheDss => Some(PkAlgorithm::Dsa),
            KxAlgorithm::EcdheEcdsa | KxAlgorithm::EcdhEcdsa => Some(PkAlgorithm::Ec),
            KxAlgorithm::AnonDh => None,
        }
    }

    /// Key usage the leaf must allow for this exchange. Plain RSA encrypts
    /// the premaster secret to the certificate key; static ECDH agrees on it;
    /// the others sign ephemeral parameters.
    pub fn required_key_usage(self) -> Option<KeyUsage> {
        match self {
            KxAlgorithm::Rsa => Some(KeyUsage::KEY_ENCIPHERMENT),
            KxAlgorithm::EcdhEcdsa => Some(KeyUsage::KEY_AGREEMENT),
            KxAlgorithm::AnonDh => None,
            _ => Some(KeyUsage::DIGITAL_SIGNATURE),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            KxAlgorithm::Rsa => "RSA",
            KxAlgorithm::RsaExport => "RSA-EXPORT",
            KxAlgorithm::DheRsa => "DHE-RSA",
            KxAlgorithm::DheDss => "DHE-DSS",
            KxAlgorithm::EcdheRsa => "ECDHE-RSA",
            KxAlgorithm::EcdheEcdsa => "ECDHE-ECDSA",
            KxAlgorithm::EcdhEcdsa => "ECDH-ECDSA",
            KxAlgorithm::AnonDh => "ANON-DH",
        }
    }
}

impl std::fmt::Display for KxAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The chain-and-key a session presents, tagged with who owns it.
#[derive(Debug, Clone)]
pub enum Selection {
    /// Handed over by a callback; released with the session.
    Owned(CertKeyPair),
    /// Shared with the credential store.
    Shared(Arc<CertKeyPair>),
}

impl Selection {
    pub fn pair(&self) -> &CertKeyPair {
        match self {
            Selection::Owned(pair) => pair,
            Selection::Shared(pair) => pair,
        }
    }

    pub fn chain(&self) -> &[Certificate] {
        self.pair().chain()
    }

    pub fn leaf(&self) -> &Certificate {
        self.pair().leaf()
    }

    pub fn key(&self) -> &PrivateKey {
        self.pair().key()
    }

    pub fn is_owned(&self) -> bool {
        matches!(self, Selection::Owned(_))
    }
}

/// What a retrieve callback hands back.
#[derive(Debug)]
pub enum Retrieved {
    /// Present no certificate.
    Nothing,
    /// A chain the session takes ownership of.
    Owned(CertKeyPair),
    /// A chain shared with the caller, typically one of the store's entries.
    Shared(Arc<CertKeyPair>),
}

/// Context given to a retrieve callback.
#[derive(Debug, Clone, Copy)]
pub struct RetrieveRequest<'a> {
    /// DER subject names of the CAs the peer accepts (client side only).
    pub peer_ca_names: &'a [Vec<u8>],
    /// Public-key algorithms the negotiation can use.
    pub pk_algorithms: &'a [PkAlgorithm],
}

/// Retrieve callback. An `Err` aborts the handshake.
pub type RetrieveFn =
    dyn Fn(&Session, &RetrieveRequest<'_>) -> Result<Retrieved> + Send + Sync;

/// Whether the key usage of `cert` allows `kx`. Certificates without a key
/// usage extension allow everything.
pub fn check_key_usage(cert: &Certificate, kx: KxAlgorithm) -> bool {
    match (cert.key_usage(), kx.required_key_usage()) {
        (Some(usage), Some(required)) if !usage.is_empty() => usage.contains(required),
        _ => true,
    }
}

/// Key exchanges a certificate can authenticate, in canonical order.
pub fn certificate_key_exchanges(cert: &Certificate) -> Vec<KxAlgorithm> {
    KxAlgorithm::ALL
        .iter()
        .copied()
        .filter(|kx| kx.pk_algorithm().as_ref() == Some(cert.pk_algorithm()))
        .filter(|kx| check_key_usage(cert, *kx))
        .collect()
}

/// Key exchanges the session's selected leaf supports.
///
/// Without a selection the list is empty. With one, an empty list is an
/// error: the certificate cannot be used at all.
pub fn supported_key_exchanges(session: &Session) -> Result<Vec<KxAlgorithm>> {
    let Some(selection) = session.selected() else {
        return Ok(Vec::new());
    };
    let algorithms = certificate_key_exchanges(selection.leaf());
    if algorithms.is_empty() {
        log::debug!(
            "selected {} certificate permits no key exchange",
            selection.leaf().pk_algorithm()
        );
        return Err(CredError::NoSupportedAlgorithm);
    }
    Ok(algorithms)
}

/// Index of the first stored chain whose leaf uses `pk`.
pub fn select_chain(creds: &CertificateCredentials, pk: &PkAlgorithm) -> Option<usize> {
    creds
        .entries()
        .iter()
        .position(|pair| pair.leaf().pk_algorithm() == pk)
}

/// Install `selection` on the session, releasing whatever it replaces.
pub fn set_selected(session: &mut Session, selection: Option<Selection>) {
    if let Some(previous) = session.replace_selected(selection) {
        log::trace!(
            "released previous {} selection",
            if previous.is_owned() { "owned" } else { "shared" }
        );
    }
}

/// The session's selected chain and key.
pub fn get_selected_cert(session: &Session) -> Option<(&[Certificate], &PrivateKey)> {
    session.selected().map(|s| (s.chain(), s.key()))
}

/// Server side: pick the chain to present for `requested_pk`, or for any
/// algorithm when `None`.
///
/// The server retrieve callback decides when installed; otherwise the first
/// matching stored chain is used and no match is `InsufficientCredentials`.
pub fn server_select_cert(session: &mut Session, requested_pk: Option<&PkAlgorithm>) -> Result<()> {
    let creds = Arc::clone(session.credentials().ok_or(CredError::InsufficientCredentials)?);

    if let Some(callback) = creds.server_retrieve_function() {
        let pk_algorithms: Vec<PkAlgorithm> = requested_pk.cloned().into_iter().collect();
        let request = RetrieveRequest {
            peer_ca_names: &[],
            pk_algorithms: &pk_algorithms,
        };
        return run_retrieve(session, callback, &request);
    }

    let index = match requested_pk {
        Some(pk) => select_chain(&creds, pk),
        None => (creds.ncerts() > 0).then_some(0),
    };
    match index.and_then(|i| creds.entry(i)) {
        Some(pair) => {
            log::debug!("server selected stored chain {:?}", index);
            set_selected(session, Some(Selection::Shared(Arc::clone(pair))));
            Ok(())
        }
        None => {
            log::debug!("no stored chain matches {:?}", requested_pk);
            Err(CredError::InsufficientCredentials)
        }
    }
}

/// Client side: pick the chain to answer a certificate request with.
///
/// The client retrieve callback decides when installed. Otherwise the first
/// stored chain whose leaf algorithm is in `pk_algorithms` and, when the
/// server listed CA names, which is issued under one of them. Finding
/// nothing is fine: the client then sends an empty certificate list.
pub fn client_select_cert(
    session: &mut Session,
    peer_ca_names: &[Vec<u8>],
    pk_algorithms: &[PkAlgorithm],
) -> Result<()> {
    let Some(creds) = session.credentials().map(Arc::clone) else {
        set_selected(session, None);
        return Ok(());
    };

    if let Some(callback) = creds.client_retrieve_function() {
        let request = RetrieveRequest {
            peer_ca_names,
            pk_algorithms,
        };
        return run_retrieve(session, callback, &request);
    }

    let found = creds.entries().iter().find(|pair| {
        pk_algorithms.contains(pair.leaf().pk_algorithm())
            && (peer_ca_names.is_empty() || issued_under(pair.chain(), peer_ca_names))
    });
    match found {
        Some(pair) => {
            log::debug!("client selected a stored {} chain", pair.leaf().pk_algorithm());
            set_selected(session, Some(Selection::Shared(Arc::clone(pair))));
        }
        None => {
            log::debug!("no stored chain fits the certificate request");
            set_selected(session, None);
        }
    }
    Ok(())
}

/// Whether any certificate of `chain` names one of `ca_names` as issuer.
fn issued_under(chain: &[Certificate], ca_names: &[Vec<u8>]) -> bool {
    chain.iter().filter_map(Certificate::raw).any(|der| {
        x509::import(der)
            .map(|parsed| ca_names.iter().any(|name| name.as_slice() == x509::issuer_dn(&parsed)))
            .unwrap_or(false)
    })
}

fn run_retrieve(
    session: &mut Session,
    callback: &RetrieveFn,
    request: &RetrieveRequest<'_>,
) -> Result<()> {
    let retrieved = callback(session, request).map_err(|e| match e {
        CredError::CallbackAbort(_) => e,
        other => CredError::CallbackAbort(other.to_string()),
    })?;
    let selection = match retrieved {
        Retrieved::Nothing => None,
        Retrieved::Owned(pair) => Some(Selection::Owned(pair)),
        Retrieved::Shared(pair) => Some(Selection::Shared(pair)),
    };
    log::debug!(
        "{} retrieve callback returned {}",
        match session.role() {
            Role::Client => "client",
            Role::Server => "server",
        },
        if selection.is_some() { "a chain" } else { "nothing" }
    );
    set_selected(session, selection);
    Ok(())
}
