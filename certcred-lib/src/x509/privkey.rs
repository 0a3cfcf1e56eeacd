//! Private key import.
//!
//! Keys are kept as validated DER in a zeroizing buffer. Signing belongs to
//! the protocol engine or the application's sign callback; this module only
//! knows which algorithm a key is for and which container it came in.

use crate::types::{CertificateFormat, PkAlgorithm};
use crate::{CredError, Result};
use x509_parser::der_parser::ber::{BerObject, BerObjectContent};
use x509_parser::prelude::*;
use zeroize::Zeroizing;

/// Container a private key was encoded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEncoding {
    /// `PrivateKeyInfo` (RFC 5208), PEM label `PRIVATE KEY`.
    Pkcs8,
    /// `RSAPrivateKey` (RFC 8017), PEM label `RSA PRIVATE KEY`.
    Pkcs1,
    /// `ECPrivateKey` (RFC 5915), PEM label `EC PRIVATE KEY`.
    Sec1,
    /// OpenSSL's bare DSA key sequence, PEM label `DSA PRIVATE KEY`.
    Dsa,
}

/// A private key matching the leaf of one certificate chain.
#[derive(Clone)]
pub struct PrivateKey {
    algorithm: PkAlgorithm,
    encoding: KeyEncoding,
    der: Zeroizing<Vec<u8>>,
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateKey")
            .field("algorithm", &self.algorithm)
            .field("encoding", &self.encoding)
            .finish_non_exhaustive()
    }
}

impl PrivateKey {
    /// Import a key from DER or PEM.
    ///
    /// PEM input uses the first private-key block; its label picks the
    /// container. DER input is recognised by structure.
    pub fn import(raw: &[u8], format: CertificateFormat) -> Result<Self> {
        if raw.is_empty() {
            return Err(CredError::Parse("empty private key".into()));
        }
        match format {
            CertificateFormat::Der => Self::from_der(raw),
            CertificateFormat::Pem => Self::from_pem(raw),
        }
    }

    fn from_pem(raw: &[u8]) -> Result<Self> {
        for pem_result in Pem::iter_from_buffer(raw) {
            let pem = pem_result.map_err(|e| CredError::Pem(format!("{}", e)))?;
            let encoding = match pem.label.as_str() {
                "PRIVATE KEY" => KeyEncoding::Pkcs8,
                "RSA PRIVATE KEY" => KeyEncoding::Pkcs1,
                "EC PRIVATE KEY" => KeyEncoding::Sec1,
                "DSA PRIVATE KEY" => KeyEncoding::Dsa,
                "ENCRYPTED PRIVATE KEY" => {
                    return Err(CredError::UnsupportedType(
                        "encrypted private keys".into(),
                    ))
                }
                // Parameter blocks ahead of the key are skipped.
                _ => continue,
            };
            let der = Zeroizing::new(pem.contents);
            let (found, algorithm) = classify(&der)?;
            if found != encoding {
                return Err(CredError::Parse(format!(
                    "PEM label {} does not match key structure",
                    pem.label
                )));
            }
            return Ok(PrivateKey {
                algorithm,
                encoding,
                der,
            });
        }
        Err(CredError::Pem("no private key found in PEM input".into()))
    }

    /// Import a DER key, detecting PKCS#8, PKCS#1, SEC1 or DSA structure.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let (encoding, algorithm) = classify(der)?;
        Ok(PrivateKey {
            algorithm,
            encoding,
            der: Zeroizing::new(der.to_vec()),
        })
    }

    pub fn algorithm(&self) -> &PkAlgorithm {
        &self.algorithm
    }

    pub fn encoding(&self) -> KeyEncoding {
        self.encoding
    }

    /// DER bytes of the key in its original container.
    pub fn as_der(&self) -> &[u8] {
        &self.der
    }
}

fn is_integer(obj: &BerObject<'_>) -> bool {
    matches!(obj.content, BerObjectContent::Integer(_))
}

fn is_octet_string(obj: &BerObject<'_>) -> bool {
    matches!(obj.content, BerObjectContent::OctetString(_))
}

/// Work out container and algorithm from the outer key SEQUENCE.
fn classify(der: &[u8]) -> Result<(KeyEncoding, PkAlgorithm)> {
    let (_, parsed) = x509_parser::der_parser::parse_der(der)
        .map_err(|e| CredError::Parse(format!("private key: {}", e)))?;
    let items = parsed
        .as_sequence()
        .map_err(|e| CredError::Parse(format!("private key: {}", e)))?;

    let version = items.first().filter(|v| is_integer(v));
    let second = items.get(1);
    let third = items.get(2);

    match (version.and_then(|v| v.as_u32().ok()), second, third) {
        // PrivateKeyInfo: version, AlgorithmIdentifier, OCTET STRING
        (Some(0 | 1), Some(alg), Some(key))
            if alg.as_sequence().is_ok() && is_octet_string(key) =>
        {
            let oid = alg
                .as_sequence()
                .ok()
                .and_then(|seq| seq.first())
                .and_then(|o| o.as_oid().ok())
                .ok_or_else(|| CredError::Parse("private key: missing algorithm OID".into()))?;
            Ok((KeyEncoding::Pkcs8, PkAlgorithm::from_oid(&oid.to_id_string())))
        }
        // ECPrivateKey: version 1, OCTET STRING, ...
        (Some(1), Some(key), _) if is_octet_string(key) => Ok((KeyEncoding::Sec1, PkAlgorithm::Ec)),
        // RSAPrivateKey: version and eight INTEGERs
        (Some(0), _, _) if items.len() >= 9 && items.iter().take(9).all(is_integer) => {
            Ok((KeyEncoding::Pkcs1, PkAlgorithm::Rsa))
        }
        // DSA: version, p, q, g, y, x
        (Some(0), _, _) if items.len() == 6 && items.iter().all(is_integer) => {
            Ok((KeyEncoding::Dsa, PkAlgorithm::Dsa))
        }
        _ => Err(CredError::Parse(
            "unrecognised private key structure".into(),
        )),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn int(v: u8) -> Vec<u8> {
        vec![0x02, 0x01, v]
    }

    fn seq(items: &[Vec<u8>]) -> Vec<u8> {
        let body: Vec<u8> = items.concat();
        let mut out = vec![0x30, body.len() as u8];
        out.extend(body);
        out
    }

    #[test]
    fn detects_pkcs1_rsa() {
        let der = seq(&(0..9).map(|_| int(1)).collect::<Vec<_>>());
        let mut items = vec![int(0)];
        items.extend((0..8).map(|_| int(3)));
        let der2 = seq(&items);
        assert!(PrivateKey::from_der(&der).is_err());
        let key = PrivateKey::from_der(&der2).unwrap();
        assert_eq!(key.encoding(), KeyEncoding::Pkcs1);
        assert_eq!(key.algorithm(), &PkAlgorithm::Rsa);
    }

    #[test]
    fn detects_dsa() {
        let mut items = vec![int(0)];
        items.extend((0..5).map(|_| int(7)));
        let key = PrivateKey::from_der(&seq(&items)).unwrap();
        assert_eq!(key.encoding(), KeyEncoding::Dsa);
        assert_eq!(key.algorithm(), &PkAlgorithm::Dsa);
    }

    #[test]
    fn detects_sec1() {
        let der = seq(&[int(1), vec![0x04, 0x02, 0xAA, 0xBB]]);
        let key = PrivateKey::from_der(&der).unwrap();
        assert_eq!(key.encoding(), KeyEncoding::Sec1);
        assert_eq!(key.algorithm(), &PkAlgorithm::Ec);
    }

    #[test]
    fn rejects_encrypted_pem() {
        let pem = crate::util::pem_encode("ENCRYPTED PRIVATE KEY", &[0x30, 0x00]);
        assert!(matches!(
            PrivateKey::import(pem.as_bytes(), CertificateFormat::Pem),
            Err(CredError::UnsupportedType(_))
        ));
    }

    #[test]
    fn debug_hides_key_material() {
        let der = seq(&[int(1), vec![0x04, 0x02, 0xAA, 0xBB]]);
        let key = PrivateKey::from_der(&der).unwrap();
        let shown = format!("{:?}", key);
        assert!(!shown.contains("170"));
        assert!(shown.contains("Sec1"));
    }
}
