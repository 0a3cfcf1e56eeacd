//! Ephemeral key-exchange parameters (DH groups and RSA-export keys).
//!
//! A session asks for parameters of one kind; the answer comes from the
//! session's own cache, then the parameters stored on the credentials, then
//! the credentials' params callback. The callback runs at most once per
//! kind per session, whether or not it produced anything.

use crate::session::Session;
use crate::types::CertificateFormat;
use crate::{CredError, Result};
use std::sync::Arc;
use x509_parser::prelude::*;

/// Which ephemeral parameters are wanted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamsKind {
    Dh,
    RsaExport,
}

/// Diffie-Hellman group parameters (PKCS #3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhParams {
    prime: Vec<u8>,
    generator: Vec<u8>,
}

impl DhParams {
    pub fn new(prime: &[u8], generator: &[u8]) -> Result<Self> {
        let prime = strip_leading_zeros(prime);
        let generator = strip_leading_zeros(generator);
        if prime.is_empty() || generator.is_empty() {
            return Err(CredError::InvalidRequest(
                "DH prime and generator must be non-zero".into(),
            ));
        }
        Ok(DhParams {
            prime: prime.to_vec(),
            generator: generator.to_vec(),
        })
    }

    /// Import `DHParameter ::= SEQUENCE { prime, base, ... }` from DER or
    /// from a PEM `DH PARAMETERS` block.
    pub fn import(raw: &[u8], format: CertificateFormat) -> Result<Self> {
        match format {
            CertificateFormat::Der => Self::from_der(raw),
            CertificateFormat::Pem => {
                for pem in Pem::iter_from_buffer(raw) {
                    let pem = pem.map_err(|e| CredError::Pem(format!("{}", e)))?;
                    if pem.label == "DH PARAMETERS" {
                        return Self::from_der(&pem.contents);
                    }
                }
                Err(CredError::Pem("no DH PARAMETERS block found".into()))
            }
        }
    }

    fn from_der(der: &[u8]) -> Result<Self> {
        let (_, parsed) = x509_parser::der_parser::parse_der(der)
            .map_err(|e| CredError::Parse(format!("DH parameters: {}", e)))?;
        let seq = parsed
            .as_sequence()
            .map_err(|e| CredError::Parse(format!("DH parameters: {}", e)))?;
        let mut ints = seq.iter().take(2).map(|item| {
            item.as_bigint()
                .map(|b| b.to_bytes_be().1)
                .map_err(|e| CredError::Parse(format!("DH parameters: {}", e)))
        });
        match (ints.next(), ints.next()) {
            (Some(p), Some(g)) => Self::new(&p?, &g?),
            _ => Err(CredError::Parse(
                "DH parameters: expected prime and generator".into(),
            )),
        }
    }

    pub fn prime(&self) -> &[u8] {
        &self.prime
    }

    pub fn generator(&self) -> &[u8] {
        &self.generator
    }

    /// Size of the group in bits.
    pub fn bits(&self) -> u32 {
        crate::util::bit_length(&self.prime)
    }
}

/// Temporary RSA key used by export cipher suites.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsaExportParams {
    modulus: Vec<u8>,
    exponent: Vec<u8>,
}

impl RsaExportParams {
    pub fn new(modulus: &[u8], exponent: &[u8]) -> Result<Self> {
        let modulus = strip_leading_zeros(modulus);
        let exponent = strip_leading_zeros(exponent);
        if modulus.is_empty() || exponent.is_empty() {
            return Err(CredError::InvalidRequest(
                "RSA modulus and exponent must be non-zero".into(),
            ));
        }
        Ok(RsaExportParams {
            modulus: modulus.to_vec(),
            exponent: exponent.to_vec(),
        })
    }

    pub fn modulus(&self) -> &[u8] {
        &self.modulus
    }

    pub fn exponent(&self) -> &[u8] {
        &self.exponent
    }

    pub fn bits(&self) -> u32 {
        crate::util::bit_length(&self.modulus)
    }
}

/// Parameters handed out to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EphemeralParams {
    Dh(Arc<DhParams>),
    RsaExport(Arc<RsaExportParams>),
}

impl EphemeralParams {
    pub fn kind(&self) -> ParamsKind {
        match self {
            EphemeralParams::Dh(_) => ParamsKind::Dh,
            EphemeralParams::RsaExport(_) => ParamsKind::RsaExport,
        }
    }
}

/// Application callback producing parameters on demand.
pub type ParamsFn = dyn Fn(ParamsKind) -> Option<EphemeralParams> + Send + Sync;

/// Per-session parameter cache.
#[derive(Debug, Default)]
pub(crate) struct SessionParams {
    dh: Option<Arc<DhParams>>,
    rsa_export: Option<Arc<RsaExportParams>>,
    dh_attempted: bool,
    rsa_export_attempted: bool,
}

impl SessionParams {
    fn cached(&self, kind: ParamsKind) -> Option<EphemeralParams> {
        match kind {
            ParamsKind::Dh => self.dh.clone().map(EphemeralParams::Dh),
            ParamsKind::RsaExport => self.rsa_export.clone().map(EphemeralParams::RsaExport),
        }
    }

    fn store(&mut self, params: &EphemeralParams) {
        match params {
            EphemeralParams::Dh(p) => self.dh = Some(Arc::clone(p)),
            EphemeralParams::RsaExport(p) => self.rsa_export = Some(Arc::clone(p)),
        }
    }

    /// Marks the callback as tried for `kind`; returns whether it already was.
    fn mark_attempted(&mut self, kind: ParamsKind) -> bool {
        let flag = match kind {
            ParamsKind::Dh => &mut self.dh_attempted,
            ParamsKind::RsaExport => &mut self.rsa_export_attempted,
        };
        std::mem::replace(flag, true)
    }
}

/// Resolve parameters of `kind` for a session.
///
/// Returns `None` when the session has no certificate credentials or no
/// source has parameters of that kind.
pub fn get_ephemeral_params(session: &mut Session, kind: ParamsKind) -> Option<EphemeralParams> {
    if let Some(params) = session.params().cached(kind) {
        return Some(params);
    }

    let creds = Arc::clone(session.credentials()?);

    if let Some(params) = creds.static_params(kind) {
        install(session, &params);
        return Some(params);
    }

    let callback = creds.params_function()?;
    if session.params_mut().mark_attempted(kind) {
        return None;
    }
    log::debug!("asking the params callback for {:?} parameters", kind);
    match callback(kind) {
        Some(params) if params.kind() == kind => {
            install(session, &params);
            Some(params)
        }
        Some(other) => {
            log::warn!(
                "params callback returned {:?} parameters when {:?} were requested",
                other.kind(),
                kind
            );
            None
        }
        None => None,
    }
}

/// Cache resolved parameters on the session and copy them into its
/// auth-info record.
fn install(session: &mut Session, params: &EphemeralParams) {
    session.params_mut().store(params);
    let info = session.auth_info_or_insert();
    match params {
        EphemeralParams::Dh(p) => info.record_dh(p),
        EphemeralParams::RsaExport(p) => info.record_rsa_export(p),
    }
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    bytes.get(start..).unwrap_or_default()
}
