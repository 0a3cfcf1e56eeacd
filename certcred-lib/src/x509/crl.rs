//! Certificate revocation lists.

use crate::types::CertificateFormat;
use crate::{CredError, Result};
use x509_parser::prelude::*;
use x509_parser::revocation_list::CertificateRevocationList;

/// A parsed-and-validated CRL kept as DER.
#[derive(Clone, PartialEq, Eq)]
pub struct Crl {
    der: Vec<u8>,
    issuer: Vec<u8>,
    revoked: usize,
}

impl std::fmt::Debug for Crl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crl")
            .field("len", &self.der.len())
            .field("revoked", &self.revoked)
            .finish()
    }
}

impl Crl {
    /// Validate and keep one DER-encoded CRL.
    pub fn from_der(der: Vec<u8>) -> Result<Self> {
        let (issuer, revoked) = {
            let (_, crl) = CertificateRevocationList::from_der(&der)
                .map_err(|e| CredError::Parse(format!("CRL: {}", e)))?;
            (
                crl.issuer().as_raw().to_vec(),
                crl.iter_revoked_certificates().count(),
            )
        };
        Ok(Crl {
            der,
            issuer,
            revoked,
        })
    }

    /// Import every CRL in the input: all `X509 CRL` blocks of a PEM file,
    /// or a single DER CRL.
    pub fn import(raw: &[u8], format: CertificateFormat) -> Result<Vec<Crl>> {
        match format {
            CertificateFormat::Pem => parse_pem_crl(raw)?
                .into_iter()
                .map(Crl::from_der)
                .collect(),
            CertificateFormat::Der => Ok(vec![Crl::from_der(raw.to_vec())?]),
        }
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Raw DER of the CRL issuer name.
    pub fn issuer_raw(&self) -> &[u8] {
        &self.issuer
    }

    /// Number of revoked entries.
    pub fn revoked_count(&self) -> usize {
        self.revoked
    }
}

/// Parse a PEM-encoded CRL file into DER-encoded CRL data.
pub fn parse_pem_crl(input: &[u8]) -> Result<Vec<Vec<u8>>> {
    let mut crls = Vec::new();
    for pem_result in Pem::iter_from_buffer(input) {
        match pem_result {
            Ok(pem) => {
                if pem.label == "X509 CRL" {
                    crls.push(pem.contents);
                }
            }
            Err(e) => {
                if !crls.is_empty() {
                    break;
                }
                return Err(CredError::Pem(format!("failed to parse CRL PEM: {}", e)));
            }
        }
    }
    if crls.is_empty() {
        return Err(CredError::Pem("no CRLs found in PEM input".into()));
    }
    Ok(crls)
}

/// RFC 5280 name of a CRL reason code.
fn format_crl_reason(rc: &x509_parser::x509::ReasonCode) -> &'static str {
    match rc.0 {
        1 => "keyCompromise",
        2 => "cACompromise",
        3 => "affiliationChanged",
        4 => "superseded",
        5 => "cessationOfOperation",
        6 => "certificateHold",
        8 => "removeFromCRL",
        9 => "privilegeWithdrawn",
        10 => "aACompromise",
        _ => "unspecified",
    }
}

/// Look `cert` up in the CRLs issued by its issuer.
///
/// A CRL counts only when it names the same issuer, is current at `now_ts`,
/// and (when the issuer certificate is known) carries a valid signature.
/// Returns the revocation reason when the serial is listed.
pub fn check_crl_revocation(
    cert: &X509Certificate<'_>,
    crls: &[Crl],
    issuer_cert: Option<&X509Certificate<'_>>,
    now_ts: i64,
) -> Option<&'static str> {
    let serial = cert.raw_serial();
    let issuer_raw = cert.issuer().as_raw();

    for entry in crls.iter().filter(|c| c.issuer_raw() == issuer_raw) {
        let (_, crl) = match CertificateRevocationList::from_der(entry.der()) {
            Ok(c) => c,
            Err(_) => continue,
        };

        if now_ts < crl.last_update().timestamp() {
            log::debug!("skipping CRL that is not yet valid");
            continue;
        }
        if let Some(next_update) = crl.next_update() {
            if now_ts > next_update.timestamp() {
                log::debug!("skipping expired CRL");
                continue;
            }
        }

        if let Some(issuer) = issuer_cert {
            if crl.verify_signature(issuer.public_key()).is_err() {
                log::warn!("ignoring CRL whose signature does not verify");
                continue;
            }
        }

        for revoked in crl.iter_revoked_certificates() {
            if revoked.raw_serial() == serial {
                return Some(
                    revoked
                        .reason_code()
                        .map(|rc| format_crl_reason(&rc.1))
                        .unwrap_or("unspecified"),
                );
            }
        }
    }

    None
}
