#![allow(dead_code, clippy::expect_used, clippy::unwrap_used)]
//! Generated certificate fixtures shared by the integration tests.

use rcgen::{
    BasicConstraints, CertificateParams, CertificateRevocationListParams, DistinguishedName,
    DnType, IsCa, Issuer, KeyIdMethod, KeyPair, KeyUsagePurpose, RevokedCertParams,
    SerialNumber, SignatureAlgorithm,
};

/// A CA that can issue certificates and CRLs.
pub struct Authority {
    pub der: Vec<u8>,
    pub pem: String,
    pub issuer: Issuer<'static, KeyPair>,
}

/// An end-entity certificate with its private key.
pub struct Leaf {
    pub der: Vec<u8>,
    pub pem: String,
    pub key_der: Vec<u8>,
    pub key_pem: String,
}

fn named(cn: &str) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, cn);
    dn
}

fn ca_params(cn: &str) -> CertificateParams {
    let mut params = CertificateParams::default();
    params.distinguished_name = named(cn);
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
    ];
    params
}

/// Self-signed ECDSA P-256 root.
pub fn root_ca(cn: &str) -> Authority {
    let params = ca_params(cn);
    let key = KeyPair::generate().expect("generate root key");
    let cert = params.self_signed(&key).expect("self-sign root");
    Authority {
        der: cert.der().to_vec(),
        pem: cert.pem(),
        issuer: Issuer::new(params, key),
    }
}

/// Intermediate CA issued by `parent`.
pub fn intermediate_ca(cn: &str, parent: &Authority) -> Authority {
    let params = ca_params(cn);
    let key = KeyPair::generate().expect("generate intermediate key");
    let cert = params
        .signed_by(&key, &parent.issuer)
        .expect("sign intermediate");
    Authority {
        der: cert.der().to_vec(),
        pem: cert.pem(),
        issuer: Issuer::new(params, key),
    }
}

/// Issuer whose certificate says it is not a CA.
pub fn non_ca_issuer(cn: &str, parent: &Authority) -> Authority {
    let mut params = CertificateParams::default();
    params.distinguished_name = named(cn);
    params.is_ca = IsCa::ExplicitNoCa;
    let key = KeyPair::generate().expect("generate key");
    let cert = params.signed_by(&key, &parent.issuer).expect("sign non-CA issuer");
    Authority {
        der: cert.der().to_vec(),
        pem: cert.pem(),
        issuer: Issuer::new(params, key),
    }
}

/// Default leaf parameters: digital-signature key usage, no CA.
pub fn leaf_params(cn: &str) -> CertificateParams {
    let mut params = CertificateParams::new(vec![format!("{}.test", cn)]).expect("leaf params");
    params.distinguished_name = named(cn);
    params.is_ca = IsCa::NoCa;
    params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
    params
}

/// Leaf issued by `parent` with an ECDSA P-256 key.
pub fn leaf(cn: &str, parent: &Authority) -> Leaf {
    leaf_with(leaf_params(cn), &rcgen::PKCS_ECDSA_P256_SHA256, parent)
}

/// Leaf from custom parameters and key algorithm.
pub fn leaf_with(
    params: CertificateParams,
    alg: &'static SignatureAlgorithm,
    parent: &Authority,
) -> Leaf {
    let key = KeyPair::generate_for(alg).expect("generate leaf key");
    let cert = params.signed_by(&key, &parent.issuer).expect("sign leaf");
    Leaf {
        der: cert.der().to_vec(),
        pem: cert.pem(),
        key_der: key.serialize_der(),
        key_pem: key.serialize_pem(),
    }
}

/// Self-signed leaf, for tests that trust the peer certificate itself.
pub fn self_signed_leaf(cn: &str) -> Leaf {
    let params = leaf_params(cn);
    let key = KeyPair::generate().expect("generate key");
    let cert = params.self_signed(&key).expect("self-sign");
    Leaf {
        der: cert.der().to_vec(),
        pem: cert.pem(),
        key_der: key.serialize_der(),
        key_pem: key.serialize_pem(),
    }
}

/// CRL from `authority` revoking the given serials, valid 2000..2100.
pub fn crl(authority: &Authority, revoked_serials: &[u64]) -> Vec<u8> {
    let params = CertificateRevocationListParams {
        this_update: rcgen::date_time_ymd(2000, 1, 1),
        next_update: rcgen::date_time_ymd(2100, 1, 1),
        crl_number: SerialNumber::from(1u64),
        issuing_distribution_point: None,
        revoked_certs: revoked_serials
            .iter()
            .map(|serial| RevokedCertParams {
                serial_number: SerialNumber::from(*serial),
                revocation_time: rcgen::date_time_ymd(2001, 1, 1),
                reason_code: None,
                invalidity_date: None,
            })
            .collect(),
        key_identifier_method: KeyIdMethod::Sha256,
    };
    params
        .signed_by(&authority.issuer)
        .expect("sign CRL")
        .der()
        .to_vec()
}

/// PEM armor for DER with the given label.
pub fn pem(label: &str, der: &[u8]) -> String {
    use base64::Engine;
    let b64 = base64::engine::general_purpose::STANDARD.encode(der);
    let mut out = format!("-----BEGIN {}-----\n", label);
    for line in b64.as_bytes().chunks(64) {
        out.push_str(std::str::from_utf8(line).expect("base64 is ascii"));
        out.push('\n');
    }
    out.push_str(&format!("-----END {}-----\n", label));
    out
}

/// Concatenate PEM blocks into one bundle.
pub fn bundle(pems: &[&str]) -> String {
    pems.concat()
}
