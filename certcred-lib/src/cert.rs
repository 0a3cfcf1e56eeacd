//! Certificate object model.
//!
//! A [`Certificate`] is the normalized form the handshake code works with:
//! the public-key algorithm and parameters, key usage and version pulled
//! out of an X.509 certificate, plus (unless opted out) a copy of its DER.

use crate::fingerprint::{compute_fingerprint, DigestAlgorithm};
use crate::types::{CertificateFormat, CertificateType, KeyUsage, PkAlgorithm, PublicParam};
use crate::x509::{self, ParsedCertificate};
use crate::{CredError, Result};

/// Upper bound on the number of public-key parameters of any algorithm.
pub const MAX_PUBLIC_PARAMS_SIZE: usize = 4;

/// First buffer size tried when re-encoding a certificate.
const SMALL_DER: usize = 512;

bitflags::bitflags! {
    /// What [`Certificate::normalize`] extracts. Empty means everything.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ConvFlags: u8 {
        /// Do not keep a copy of the raw DER.
        const NO_COPY = 1;
        /// Extract key usage and version but not the public-key parameters.
        const ONLY_EXTENSIONS = 2;
        /// Extract the public-key parameters but not key usage and version.
        const ONLY_PUBKEY = 4;
    }
}

/// A normalized certificate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Certificate {
    raw: Option<Vec<u8>>,
    cert_type: CertificateType,
    pk_algorithm: PkAlgorithm,
    params: Vec<PublicParam>,
    key_bits: Option<u32>,
    key_usage: Option<KeyUsage>,
    version: Option<u32>,
}

impl Certificate {
    /// Normalize an X.509 certificate given as DER or PEM.
    pub fn normalize(raw: &[u8], format: CertificateFormat, flags: ConvFlags) -> Result<Self> {
        Self::import(CertificateType::X509, raw, format, flags)
    }

    /// Normalize a certificate of the given type.
    pub fn import(
        cert_type: CertificateType,
        raw: &[u8],
        format: CertificateFormat,
        flags: ConvFlags,
    ) -> Result<Self> {
        match cert_type {
            CertificateType::X509 => {
                let der = x509::decode(raw, format)?;
                let parsed = x509::import(&der)?;
                Self::from_parsed(&parsed, flags)
            }
            other => Err(CredError::UnsupportedType(format!(
                "{} certificates",
                other
            ))),
        }
    }

    /// Normalize an already-imported X.509 certificate.
    pub fn from_parsed(parsed: &ParsedCertificate<'_>, flags: ConvFlags) -> Result<Self> {
        let mut cert = Certificate {
            cert_type: CertificateType::X509,
            pk_algorithm: x509::pk_algorithm(parsed),
            ..Default::default()
        };

        if !flags.contains(ConvFlags::NO_COPY) {
            cert.raw = Some(export_to_vec(parsed, CertificateFormat::Der)?);
        }

        let mut wanted = flags;
        wanted.remove(ConvFlags::NO_COPY);
        let everything = wanted.is_empty();

        if everything || wanted.contains(ConvFlags::ONLY_EXTENSIONS) {
            cert.key_usage = x509::key_usage(parsed);
            cert.version = Some(x509::version(parsed));
        }

        if everything || wanted.contains(ConvFlags::ONLY_PUBKEY) {
            let params = x509::extract_params(parsed)?;
            cert.key_bits = Some(x509::key_bits(parsed, &params));
            cert.params = params;
        }

        Ok(cert)
    }

    /// Reset to the zero value. Safe to call any number of times.
    pub fn clear(&mut self) {
        *self = Certificate::default();
    }

    /// Raw DER, absent when normalized with [`ConvFlags::NO_COPY`].
    pub fn raw(&self) -> Option<&[u8]> {
        self.raw.as_deref()
    }

    pub fn cert_type(&self) -> CertificateType {
        self.cert_type
    }

    pub fn pk_algorithm(&self) -> &PkAlgorithm {
        &self.pk_algorithm
    }

    pub fn params(&self) -> &[PublicParam] {
        &self.params
    }

    /// Public-key size in bits, when parameters were extracted.
    pub fn key_bits(&self) -> Option<u32> {
        self.key_bits
    }

    pub fn key_usage(&self) -> Option<KeyUsage> {
        self.key_usage
    }

    pub fn version(&self) -> Option<u32> {
        self.version
    }

    /// Fingerprint of the raw DER, if it was kept.
    pub fn fingerprint(&self, algorithm: DigestAlgorithm) -> Option<String> {
        self.raw().map(|der| compute_fingerprint(der, algorithm))
    }

    #[cfg(test)]
    pub(crate) fn synthetic(pk_algorithm: PkAlgorithm, key_usage: Option<KeyUsage>) -> Self {
        Certificate {
            pk_algorithm,
            key_usage,
            version: Some(3),
            ..Default::default()
        }
    }
}

/// Encode into a growable buffer: try [`SMALL_DER`] bytes first, then
/// resize to exactly what the engine asks for and retry once.
fn export_to_vec(parsed: &ParsedCertificate<'_>, format: CertificateFormat) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    grow_to(&mut buf, SMALL_DER)?;

    let written = match x509::export(parsed, format, &mut buf) {
        Ok(n) => n,
        Err(CredError::ShortBuffer { needed }) => {
            log::trace!("re-encoding certificate into {} bytes", needed);
            grow_to(&mut buf, needed)?;
            x509::export(parsed, format, &mut buf)?
        }
        Err(e) => return Err(e),
    };

    buf.truncate(written);
    Ok(buf)
}

fn grow_to(buf: &mut Vec<u8>, len: usize) -> Result<()> {
    buf.try_reserve_exact(len.saturating_sub(buf.len()))
        .map_err(|_| CredError::Allocation)?;
    buf.resize(len, 0);
    Ok(())
}
