//! Public-key parameter extraction.
//!
//! Parameters come out in the order the key exchange code expects them:
//! RSA `[n, e]`, DSA `[p, q, g, y]`, EC `[point]`, EdDSA `[key]`.

use super::ParsedCertificate;
use crate::cert::MAX_PUBLIC_PARAMS_SIZE;
use crate::oid;
use crate::types::{PkAlgorithm, PublicParam};
use crate::{CredError, Result};
use x509_parser::der_parser::asn1_rs::ToDer;
use x509_parser::prelude::*;

/// Extract the subject public-key parameters of a certificate.
pub fn extract_params(cert: &ParsedCertificate<'_>) -> Result<Vec<PublicParam>> {
    let spki = cert.x509().public_key();
    let key_data: &[u8] = &spki.subject_public_key.data;

    let params = match super::pk_algorithm(cert) {
        PkAlgorithm::Rsa => der_integers(key_data, 2, "RSA public key")?,
        PkAlgorithm::Dsa => {
            let domain = spki
                .algorithm
                .parameters
                .as_ref()
                .ok_or_else(|| CredError::Parse("DSA key without domain parameters".into()))?
                .to_der_vec()
                .map_err(|e| CredError::Parse(format!("failed to encode DSA parameters: {}", e)))?;
            let mut params = der_integers(&domain, 3, "DSA parameters")?;
            params.push(der_integer(key_data, "DSA public value")?);
            params
        }
        PkAlgorithm::Ec | PkAlgorithm::Ed25519 | PkAlgorithm::Ed448 => {
            if key_data.is_empty() {
                return Err(CredError::Parse("empty public key".into()));
            }
            vec![PublicParam::opaque(key_data)]
        }
        PkAlgorithm::Unknown(oid) => {
            return Err(CredError::UnsupportedType(format!(
                "public key algorithm {}",
                oid
            )));
        }
    };

    if params.len() > MAX_PUBLIC_PARAMS_SIZE {
        return Err(CredError::Parse(format!(
            "{} public key parameters exceed the limit of {}",
            params.len(),
            MAX_PUBLIC_PARAMS_SIZE
        )));
    }
    Ok(params)
}

/// Key size in bits: modulus for RSA, prime for DSA, curve size for EC.
pub fn key_bits(cert: &ParsedCertificate<'_>, params: &[PublicParam]) -> u32 {
    let spki = cert.x509().public_key();
    match super::pk_algorithm(cert) {
        PkAlgorithm::Rsa | PkAlgorithm::Dsa => {
            params.first().map(PublicParam::bit_length).unwrap_or(0)
        }
        PkAlgorithm::Ec => curve_bits(&spki.algorithm).unwrap_or_else(|| {
            // Uncompressed point: 0x04 || X || Y
            params
                .first()
                .map(|p| (p.len().saturating_sub(1) / 2 * 8) as u32)
                .unwrap_or(0)
        }),
        PkAlgorithm::Ed25519 => 256,
        PkAlgorithm::Ed448 => 448,
        PkAlgorithm::Unknown(_) => 0,
    }
}

fn curve_bits(algo: &AlgorithmIdentifier) -> Option<u32> {
    let curve = algo.parameters.as_ref()?.as_oid().ok()?;
    match curve.to_id_string().as_str() {
        oid::CURVE_P256 => Some(256),
        oid::CURVE_P384 => Some(384),
        oid::CURVE_P521 => Some(521),
        _ => None,
    }
}

/// Parse a DER SEQUENCE holding at least `count` INTEGERs and return the
/// first `count` of them.
fn der_integers(data: &[u8], count: usize, what: &str) -> Result<Vec<PublicParam>> {
    let (_, parsed) = x509_parser::der_parser::parse_der(data)
        .map_err(|e| CredError::Parse(format!("{}: {}", what, e)))?;
    let seq = parsed
        .as_sequence()
        .map_err(|e| CredError::Parse(format!("{}: {}", what, e)))?;
    if seq.len() < count {
        return Err(CredError::Parse(format!(
            "{}: expected {} integers, found {}",
            what,
            count,
            seq.len()
        )));
    }
    seq.iter()
        .take(count)
        .map(|item| {
            let bigint = item
                .as_bigint()
                .map_err(|e| CredError::Parse(format!("{}: {}", what, e)))?;
            Ok(PublicParam::from_be_bytes(&bigint.to_bytes_be().1))
        })
        .collect()
}

fn der_integer(data: &[u8], what: &str) -> Result<PublicParam> {
    let (_, parsed) = x509_parser::der_parser::parse_der(data)
        .map_err(|e| CredError::Parse(format!("{}: {}", what, e)))?;
    let bigint = parsed
        .as_bigint()
        .map_err(|e| CredError::Parse(format!("{}: {}", what, e)))?;
    Ok(PublicParam::from_be_bytes(&bigint.to_bytes_be().1))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn der_integers_reads_rsa_style_sequence() {
        // SEQUENCE { INTEGER 0x00C3, INTEGER 65537 }
        let der = [0x30, 0x09, 0x02, 0x02, 0x00, 0xC3, 0x02, 0x03, 0x01, 0x00, 0x01];
        let params = der_integers(&der, 2, "test").unwrap();
        assert_eq!(params[0].as_bytes(), &[0xC3]);
        assert_eq!(params[1].as_bytes(), &[0x01, 0x00, 0x01]);
    }

    #[test]
    fn der_integers_rejects_short_sequence() {
        let der = [0x30, 0x03, 0x02, 0x01, 0x05];
        assert!(matches!(der_integers(&der, 2, "test"), Err(CredError::Parse(_))));
    }

    #[test]
    fn der_integer_reads_bare_integer() {
        let der = [0x02, 0x02, 0x01, 0xFF];
        assert_eq!(der_integer(&der, "test").unwrap().as_bytes(), &[0x01, 0xFF]);
    }
}
