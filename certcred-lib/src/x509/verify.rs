//! Certificate chain verification against a CA list.
//!
//! The outcome of a chain that could be examined is a [`CertStatus`]
//! bitmask, never an error: every failed check contributes its own bit and
//! any failure also sets [`CertStatus::INVALID`]. Errors are reserved for
//! chains that cannot be examined at all (empty, unparsable, or outside the
//! configured depth and key-size limits).

use super::crl::{check_crl_revocation, Crl};
use super::trust::CaList;
use super::ParsedCertificate;
use crate::bits::FlagLabels;
use crate::oid;
use crate::{CredError, Result};
use serde::{Deserialize, Serialize};
use x509_parser::prelude::*;

/// Default maximum number of certificates in a peer chain.
pub const DEFAULT_VERIFY_DEPTH: usize = 6;

/// Default maximum public-key size, in bits, of any certificate in a peer chain.
pub const DEFAULT_VERIFY_BITS: u32 = 8200;

bitflags::bitflags! {
    /// Verification outcome; empty means trusted.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct CertStatus: u32 {
        /// Umbrella bit: the chain is not trusted.
        const INVALID = 2;
        const REVOKED = 32;
        const SIGNER_NOT_FOUND = 64;
        const SIGNER_NOT_CA = 128;
        const INSECURE_ALGORITHM = 256;
        const NOT_ACTIVATED = 512;
        const EXPIRED = 1024;
        const SIGNATURE_FAILURE = 2048;
    }
}

impl CertStatus {
    /// True when no failure bit is set.
    pub fn is_trusted(self) -> bool {
        self.is_empty()
    }
}

impl std::fmt::Display for CertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            f.write_str("trusted")
        } else {
            f.write_str(&self.labels().join(", "))
        }
    }
}

bitflags::bitflags! {
    /// Verification policy flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct VerifyFlags: u32 {
        /// Do not require issuers to be CA certificates.
        const DISABLE_CA_SIGN = 1;
        /// Accept version 1 certificates as trusted CAs.
        const ALLOW_X509_V1_CA_CRT = 2;
        /// A peer certificate that is itself in the CA list is not trusted on that basis alone.
        const DO_NOT_ALLOW_SAME = 4;
        /// Accept version 1 certificates as intermediate CAs too.
        const ALLOW_ANY_X509_V1_CA_CRT = 8;
        const ALLOW_SIGN_RSA_MD2 = 16;
        const ALLOW_SIGN_RSA_MD5 = 32;
        const DISABLE_TIME_CHECKS = 64;
        const DISABLE_CRL_CHECKS = 128;
    }
}

/// Limits and flags applied when verifying a peer chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyPolicy {
    pub flags: VerifyFlags,
    /// Maximum number of certificates in the peer chain.
    pub max_depth: usize,
    /// Maximum public-key size in bits.
    pub max_bits: u32,
}

impl Default for VerifyPolicy {
    fn default() -> Self {
        VerifyPolicy {
            flags: VerifyFlags::empty(),
            max_depth: DEFAULT_VERIFY_DEPTH,
            max_bits: DEFAULT_VERIFY_BITS,
        }
    }
}

/// Verify a DER chain (leaf first) against `cas` and `crls` at `now_ts`.
pub fn verify_chain(
    chain: &[Vec<u8>],
    cas: &CaList,
    crls: &[Crl],
    policy: &VerifyPolicy,
    now_ts: i64,
) -> Result<CertStatus> {
    if chain.is_empty() {
        return Err(CredError::NoCertificateFound);
    }
    if chain.len() > policy.max_depth {
        return Err(CredError::Constraint(format!(
            "chain of {} certificates exceeds the maximum depth of {}",
            chain.len(),
            policy.max_depth
        )));
    }

    let parsed = chain
        .iter()
        .enumerate()
        .map(|(i, der)| {
            super::import(der)
                .map_err(|e| CredError::Parse(format!("certificate at depth {}: {}", i, e)))
        })
        .collect::<Result<Vec<_>>>()?;

    check_key_sizes(&parsed, policy.max_bits)?;

    let flags = policy.flags;
    let mut status = CertStatus::empty();

    if !flags.contains(VerifyFlags::DISABLE_TIME_CHECKS) {
        status |= check_chain_time_validity(&parsed, now_ts);
    }
    status |= check_chain_signature_algorithms(&parsed, flags);
    status |= check_chain_signatures(&parsed);
    // Trusted CAs may be v1 under either flag, untrusted issuers only under ALLOW_ANY.
    let trusted_v1_ok = flags
        .intersects(VerifyFlags::ALLOW_X509_V1_CA_CRT | VerifyFlags::ALLOW_ANY_X509_V1_CA_CRT);
    let any_v1_ok = flags.contains(VerifyFlags::ALLOW_ANY_X509_V1_CA_CRT);
    if !flags.contains(VerifyFlags::DISABLE_CA_SIGN) {
        let bad_issuer = parsed.iter().skip(1).any(|c| {
            let v1_ok = if cas.contains(c.der()) {
                trusted_v1_ok
            } else {
                any_v1_ok
            };
            !may_sign(c.x509(), v1_ok)
        });
        if bad_issuer {
            status |= CertStatus::SIGNER_NOT_CA;
        }
    }

    let (anchor_status, anchor) = find_trust_anchor(&parsed, cas, flags);
    status |= anchor_status;
    if let Some(ca) = &anchor {
        if !flags.contains(VerifyFlags::DISABLE_CA_SIGN) && !may_sign(ca.x509(), trusted_v1_ok) {
            status |= CertStatus::SIGNER_NOT_CA;
        }
    }

    if !flags.contains(VerifyFlags::DISABLE_CRL_CHECKS) && !crls.is_empty() {
        status |= check_chain_revocation(&parsed, anchor.as_ref(), crls, now_ts);
    }

    if !status.is_empty() {
        status |= CertStatus::INVALID;
    }
    log::debug!(
        "verified chain of {} certificates: {}",
        parsed.len(),
        status
    );
    Ok(status)
}

fn check_key_sizes(parsed: &[ParsedCertificate<'_>], max_bits: u32) -> Result<()> {
    for (i, cert) in parsed.iter().enumerate() {
        let bits = match super::extract_params(cert) {
            Ok(params) => super::key_bits(cert, &params),
            Err(CredError::UnsupportedType(e)) => {
                log::debug!("key size limit skipped at depth {}: {}", i, e);
                continue;
            }
            Err(e) => {
                return Err(CredError::Parse(format!(
                    "public key of certificate at depth {}: {}",
                    i, e
                )))
            }
        };
        if bits > max_bits {
            return Err(CredError::Constraint(format!(
                "certificate at depth {} has a {}-bit key, above the limit of {}",
                i, bits, max_bits
            )));
        }
    }
    Ok(())
}

fn check_chain_time_validity(parsed: &[ParsedCertificate<'_>], now_ts: i64) -> CertStatus {
    let mut status = CertStatus::empty();
    for cert in parsed {
        if now_ts < super::activation_time(cert) {
            status |= CertStatus::NOT_ACTIVATED;
        }
        if now_ts > super::expiration_time(cert) {
            status |= CertStatus::EXPIRED;
        }
    }
    status
}

fn is_self_signed(cert: &X509Certificate<'_>) -> bool {
    cert.subject().as_raw() == cert.issuer().as_raw() && cert.verify_signature(None).is_ok()
}

/// MD2 and MD5 signatures are refused unless explicitly allowed. A
/// self-signed certificate's own signature is not part of the trust path.
fn check_chain_signature_algorithms(
    parsed: &[ParsedCertificate<'_>],
    flags: VerifyFlags,
) -> CertStatus {
    let insecure = parsed
        .iter()
        .map(ParsedCertificate::x509)
        .filter(|c| !is_self_signed(c))
        .any(|c| match c.signature_algorithm.algorithm.to_id_string().as_str() {
            oid::MD2_WITH_RSA => !flags.contains(VerifyFlags::ALLOW_SIGN_RSA_MD2),
            oid::MD5_WITH_RSA => !flags.contains(VerifyFlags::ALLOW_SIGN_RSA_MD5),
            _ => false,
        });
    if insecure {
        CertStatus::INSECURE_ALGORITHM
    } else {
        CertStatus::empty()
    }
}

/// Each certificate must be signed by the next one in the chain.
fn check_chain_signatures(parsed: &[ParsedCertificate<'_>]) -> CertStatus {
    let mut status = CertStatus::empty();
    for (depth, (child, parent)) in parsed.iter().zip(parsed.iter().skip(1)).enumerate() {
        if child.x509().issuer().as_raw() != parent.x509().subject().as_raw() {
            log::debug!("certificate at depth {} is not issued by the next one", depth);
            status |= CertStatus::SIGNER_NOT_FOUND;
        } else if let Err(e) = child.x509().verify_signature(Some(parent.x509().public_key())) {
            log::debug!("signature at depth {} does not verify: {}", depth, e);
            status |= CertStatus::SIGNATURE_FAILURE;
        }
    }
    status
}

/// Whether `cert` may act as an issuer: CA basic constraints, or a v1
/// certificate when `v1_ok`, and key usage (when present) allowing
/// certificate signing.
fn may_sign(cert: &X509Certificate<'_>, v1_ok: bool) -> bool {
    let ca = match cert.basic_constraints().ok().flatten() {
        Some(bc) => bc.value.ca,
        None => v1_ok && cert.version().0 == 0,
    };
    let key_cert_sign = match cert.key_usage().ok().flatten() {
        Some(ku) => ku.value.key_cert_sign(),
        None => true,
    };
    ca && key_cert_sign
}

/// Anchor the chain in the CA list.
///
/// A chain certificate that is itself trusted anchors the chain unless
/// `DO_NOT_ALLOW_SAME` is set. Otherwise the last certificate must be
/// signed by a trusted CA with a matching subject, which is returned.
fn find_trust_anchor<'ca>(
    parsed: &[ParsedCertificate<'_>],
    cas: &'ca CaList,
    flags: VerifyFlags,
) -> (CertStatus, Option<ParsedCertificate<'ca>>) {
    if !flags.contains(VerifyFlags::DO_NOT_ALLOW_SAME)
        && parsed.iter().any(|c| cas.contains(c.der()))
    {
        return (CertStatus::empty(), None);
    }

    let Some(last) = parsed.last() else {
        return (CertStatus::SIGNER_NOT_FOUND, None);
    };

    let mut candidates = 0;
    for ca_der in cas.find_by_subject_raw(last.x509().issuer().as_raw()) {
        let Ok(ca) = super::import(ca_der) else {
            continue;
        };
        candidates += 1;
        if last.x509().verify_signature(Some(ca.x509().public_key())).is_ok() {
            return (CertStatus::empty(), Some(ca));
        }
    }

    if candidates > 0 {
        log::debug!("no trusted issuer's key verifies the last certificate");
        (CertStatus::SIGNATURE_FAILURE, None)
    } else {
        log::debug!("issuer of the last certificate is not in the CA list");
        (CertStatus::SIGNER_NOT_FOUND, None)
    }
}

fn check_chain_revocation(
    parsed: &[ParsedCertificate<'_>],
    anchor: Option<&ParsedCertificate<'_>>,
    crls: &[Crl],
    now_ts: i64,
) -> CertStatus {
    for (depth, cert) in parsed.iter().enumerate() {
        let revoked = match parsed.get(depth + 1) {
            Some(next) => check_crl_revocation(cert.x509(), crls, Some(next.x509()), now_ts),
            None => check_crl_revocation(
                cert.x509(),
                crls,
                anchor.map(ParsedCertificate::x509),
                now_ts,
            ),
        };
        if let Some(reason) = revoked {
            log::debug!("certificate at depth {} is revoked ({})", depth, reason);
            return CertStatus::REVOKED;
        }
    }
    CertStatus::empty()
}
