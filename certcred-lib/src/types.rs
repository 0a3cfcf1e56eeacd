//! Certificate data types shared by the object model and the X.509 engine.

use serde::{Deserialize, Serialize};

/// Certificate type negotiated for a session.
///
/// Only X.509 has an engine behind it. OpenPGP is recognised so that a
/// session negotiating it is rejected cleanly rather than misparsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertificateType {
    #[default]
    X509,
    OpenPgp,
}

impl std::fmt::Display for CertificateType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CertificateType::X509 => write!(f, "X.509"),
            CertificateType::OpenPgp => write!(f, "OpenPGP"),
        }
    }
}

/// Encoding of certificate and key input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertificateFormat {
    Der,
    #[default]
    Pem,
}

impl CertificateFormat {
    /// PEM if the input starts with a PEM armour line, DER otherwise.
    pub fn detect(input: &[u8]) -> Self {
        if crate::util::is_pem(input) {
            CertificateFormat::Pem
        } else {
            CertificateFormat::Der
        }
    }
}

/// Subject public-key algorithm of a certificate or private key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum PkAlgorithm {
    Rsa,
    Dsa,
    Ec,
    Ed25519,
    Ed448,
    /// Any other algorithm, carrying its dotted OID.
    Unknown(String),
}

impl Default for PkAlgorithm {
    fn default() -> Self {
        PkAlgorithm::Unknown(String::new())
    }
}

impl PkAlgorithm {
    pub fn from_oid(oid: &str) -> Self {
        match oid {
            crate::oid::RSA_ENCRYPTION | crate::oid::RSASSA_PSS => PkAlgorithm::Rsa,
            crate::oid::DSA => PkAlgorithm::Dsa,
            crate::oid::EC_PUBLIC_KEY => PkAlgorithm::Ec,
            crate::oid::ED25519 => PkAlgorithm::Ed25519,
            crate::oid::ED448 => PkAlgorithm::Ed448,
            other => PkAlgorithm::Unknown(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            PkAlgorithm::Rsa => "RSA",
            PkAlgorithm::Dsa => "DSA",
            PkAlgorithm::Ec => "EC",
            PkAlgorithm::Ed25519 => "Ed25519",
            PkAlgorithm::Ed448 => "Ed448",
            PkAlgorithm::Unknown(oid) if oid.is_empty() => "unknown",
            PkAlgorithm::Unknown(oid) => oid,
        }
    }
}

impl std::fmt::Display for PkAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

bitflags::bitflags! {
    /// X.509 key-usage bits, numbered as the DER bit string lays them out.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct KeyUsage: u16 {
        const DIGITAL_SIGNATURE = 128;
        const NON_REPUDIATION = 64;
        const KEY_ENCIPHERMENT = 32;
        const DATA_ENCIPHERMENT = 16;
        const KEY_AGREEMENT = 8;
        const KEY_CERT_SIGN = 4;
        const CRL_SIGN = 2;
        const ENCIPHER_ONLY = 1;
        const DECIPHER_ONLY = 32768;
    }
}

/// One public-key parameter: an unsigned big-endian integer, or an opaque
/// point/key for EC and EdDSA keys.
#[derive(Clone, PartialEq, Eq, Hash, Default, Serialize)]
pub struct PublicParam(#[serde(serialize_with = "serialize_hex")] Vec<u8>);

fn serialize_hex<S: serde::Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&hex::encode_upper(bytes))
}

impl PublicParam {
    /// Integer parameter from big-endian bytes; leading zero bytes are
    /// dropped, one zero byte is kept for the value zero.
    pub fn from_be_bytes(bytes: &[u8]) -> Self {
        let start = bytes
            .iter()
            .position(|b| *b != 0)
            .unwrap_or(bytes.len().saturating_sub(1));
        PublicParam(bytes.get(start..).unwrap_or_default().to_vec())
    }

    /// Opaque parameter kept byte for byte.
    pub fn opaque(bytes: &[u8]) -> Self {
        PublicParam(bytes.to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Bit length of the value as an unsigned integer.
    pub fn bit_length(&self) -> u32 {
        crate::util::bit_length(&self.0)
    }

    pub fn to_hex(&self) -> String {
        hex::encode_upper(&self.0)
    }
}

impl std::fmt::Debug for PublicParam {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicParam({} bits)", self.bit_length())
    }
}
