//! X.509 trust-chain format engine.
//!
//! Everything that speaks ASN.1 lives under this module and is backed by
//! `x509-parser`. The rest of the crate sees certificates as DER bytes, a
//! borrowed [`ParsedCertificate`], or the normalized [`crate::Certificate`].

mod crl;
mod params;
mod privkey;
mod trust;
mod verify;

use crate::types::{CertificateFormat, KeyUsage, PkAlgorithm};
use crate::util;
use crate::{CredError, Result};
use std::borrow::Cow;
use x509_parser::prelude::*;

pub use crl::{check_crl_revocation, parse_pem_crl, Crl};
pub use params::{extract_params, key_bits};
pub use privkey::{KeyEncoding, PrivateKey};
pub use trust::{find_system_ca_bundle, CaList};
pub use verify::{
    verify_chain, CertStatus, VerifyFlags, VerifyPolicy, DEFAULT_VERIFY_BITS,
    DEFAULT_VERIFY_DEPTH,
};

const CERTIFICATE_LABELS: &[&str] = &["CERTIFICATE", "TRUSTED CERTIFICATE", "X509 CERTIFICATE"];

/// An imported certificate together with the exact DER it was parsed from.
pub struct ParsedCertificate<'a> {
    der: &'a [u8],
    x509: X509Certificate<'a>,
}

impl<'a> ParsedCertificate<'a> {
    /// The DER encoding of this certificate, without trailing input.
    pub fn der(&self) -> &'a [u8] {
        self.der
    }

    pub fn x509(&self) -> &X509Certificate<'a> {
        &self.x509
    }
}

impl std::fmt::Debug for ParsedCertificate<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParsedCertificate")
            .field("len", &self.der.len())
            .field("subject", &self.x509.subject().to_string())
            .finish()
    }
}

/// Get DER bytes out of raw input in the given format.
///
/// DER input is borrowed unchanged; PEM input is decoded from its first
/// certificate block.
pub fn decode(raw: &[u8], format: CertificateFormat) -> Result<Cow<'_, [u8]>> {
    if raw.is_empty() {
        return Err(CredError::Parse("empty input".into()));
    }
    match format {
        CertificateFormat::Der => Ok(Cow::Borrowed(raw)),
        CertificateFormat::Pem => {
            let (_, pem) = x509_parser::pem::parse_x509_pem(raw)
                .map_err(|e| CredError::Pem(format!("{}", e)))?;
            if !CERTIFICATE_LABELS.contains(&pem.label.as_str()) {
                return Err(CredError::Pem(format!(
                    "expected CERTIFICATE, got {}",
                    pem.label
                )));
            }
            Ok(Cow::Owned(pem.contents))
        }
    }
}

/// Import a DER certificate.
pub fn import(der: &[u8]) -> Result<ParsedCertificate<'_>> {
    let (remaining, x509) =
        X509Certificate::from_der(der).map_err(|e| CredError::Parse(format!("{}", e)))?;

    // X509Certificate::from_der accepts any version integer; only v1..v3 exist.
    if x509.version().0 > 2 {
        return Err(CredError::Parse(format!(
            "unsupported certificate version {}",
            x509.version().0
        )));
    }

    let cert_len = der.len() - remaining.len();
    let exact = der.get(..cert_len).unwrap_or(der);
    Ok(ParsedCertificate { der: exact, x509 })
}

/// Export a certificate into `out`, returning the number of bytes written.
///
/// Fails with [`CredError::ShortBuffer`] carrying the exact size needed
/// when `out` is too small; nothing is written in that case.
pub fn export(
    cert: &ParsedCertificate<'_>,
    format: CertificateFormat,
    out: &mut [u8],
) -> Result<usize> {
    let pem;
    let bytes: &[u8] = match format {
        CertificateFormat::Der => cert.der,
        CertificateFormat::Pem => {
            pem = util::pem_encode("CERTIFICATE", cert.der);
            pem.as_bytes()
        }
    };
    let needed = bytes.len();
    match out.get_mut(..needed) {
        Some(dst) => {
            dst.copy_from_slice(bytes);
            Ok(needed)
        }
        None => Err(CredError::ShortBuffer { needed }),
    }
}

/// Subject public-key algorithm.
pub fn pk_algorithm(cert: &ParsedCertificate<'_>) -> PkAlgorithm {
    let spki = cert.x509.public_key();
    PkAlgorithm::from_oid(&spki.algorithm.algorithm.to_id_string())
}

/// Key usage bits, or `None` when the extension is absent or malformed.
pub fn key_usage(cert: &ParsedCertificate<'_>) -> Option<KeyUsage> {
    let ext = cert.x509.key_usage().ok().flatten()?;
    let ku = &ext.value;
    let mut bits = KeyUsage::empty();
    let table = [
        (ku.digital_signature(), KeyUsage::DIGITAL_SIGNATURE),
        (ku.non_repudiation(), KeyUsage::NON_REPUDIATION),
        (ku.key_encipherment(), KeyUsage::KEY_ENCIPHERMENT),
        (ku.data_encipherment(), KeyUsage::DATA_ENCIPHERMENT),
        (ku.key_agreement(), KeyUsage::KEY_AGREEMENT),
        (ku.key_cert_sign(), KeyUsage::KEY_CERT_SIGN),
        (ku.crl_sign(), KeyUsage::CRL_SIGN),
        (ku.encipher_only(), KeyUsage::ENCIPHER_ONLY),
        (ku.decipher_only(), KeyUsage::DECIPHER_ONLY),
    ];
    for (set, bit) in table {
        bits.set(bit, set);
    }
    Some(bits)
}

/// Structure version, 1 through 3.
pub fn version(cert: &ParsedCertificate<'_>) -> u32 {
    cert.x509.version().0 + 1
}

/// Start of the validity period as a Unix timestamp.
pub fn activation_time(cert: &ParsedCertificate<'_>) -> i64 {
    cert.x509.validity().not_before.timestamp()
}

/// End of the validity period as a Unix timestamp.
pub fn expiration_time(cert: &ParsedCertificate<'_>) -> i64 {
    cert.x509.validity().not_after.timestamp()
}

/// Raw DER of the issuer name.
pub fn issuer_dn<'a>(cert: &'a ParsedCertificate<'_>) -> &'a [u8] {
    cert.x509.issuer().as_raw()
}

/// Raw DER of the subject name.
pub fn subject_dn<'a>(cert: &'a ParsedCertificate<'_>) -> &'a [u8] {
    cert.x509.subject().as_raw()
}

/// Parse a PEM bundle into DER-encoded certificates, in file order.
pub fn parse_pem_chain(input: &[u8]) -> Result<Vec<Vec<u8>>> {
    let mut certs = Vec::new();

    for pem_result in Pem::iter_from_buffer(input) {
        match pem_result {
            Ok(pem) => {
                if CERTIFICATE_LABELS.contains(&pem.label.as_str()) {
                    certs.push(pem.contents);
                }
            }
            Err(e) => {
                // Trailing garbage after at least one certificate is tolerated.
                if !certs.is_empty() {
                    break;
                }
                return Err(CredError::Pem(format!("failed to parse PEM: {}", e)));
            }
        }
    }

    if certs.is_empty() {
        return Err(CredError::Pem("no certificates found in PEM input".into()));
    }

    Ok(certs)
}

/// Split raw input into DER certificates: every block of a PEM bundle, or
/// the single certificate of a DER input.
pub fn split_certificates(raw: &[u8], format: CertificateFormat) -> Result<Vec<Vec<u8>>> {
    match format {
        CertificateFormat::Pem => parse_pem_chain(raw),
        CertificateFormat::Der => {
            let parsed = import(raw)?;
            Ok(vec![parsed.der().to_vec()])
        }
    }
}
