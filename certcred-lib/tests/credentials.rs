#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic, clippy::indexing_slicing)]
//! Loading chains, keys, trust anchors and CRLs into a credential store.

mod common;

use certcred_lib::*;
use std::fs;

#[test]
fn key_pair_from_pem_memory() {
    let root = common::root_ca("Mem Root");
    let inter = common::intermediate_ca("Mem Inter", &root);
    let leaf = common::leaf("mem-leaf", &inter);
    let chain = common::bundle(&[&leaf.pem, &inter.pem]);

    let mut creds = CertificateCredentials::new();
    let index = creds
        .add_key_pair_mem(chain.as_bytes(), leaf.key_pem.as_bytes(), CertificateFormat::Pem)
        .unwrap();
    assert_eq!(index, 0);
    assert_eq!(creds.ncerts(), 1);
    assert_eq!(creds.cert_list_length(0), Some(2));
    assert_eq!(creds.cert_list(0).unwrap()[0].raw(), Some(leaf.der.as_slice()));
    assert_eq!(creds.cert_list(0).unwrap()[1].raw(), Some(inter.der.as_slice()));
    assert_eq!(creds.key(0).unwrap().algorithm(), &PkAlgorithm::Ec);
    assert!(creds.key(1).is_none());
}

#[test]
fn key_pair_from_der_files() {
    let root = common::root_ca("File Root");
    let leaf = common::leaf("file-leaf", &root);
    let dir = tempfile::tempdir().unwrap();
    let cert_path = dir.path().join("leaf.der");
    let key_path = dir.path().join("leaf.key.der");
    fs::write(&cert_path, &leaf.der).unwrap();
    fs::write(&key_path, &leaf.key_der).unwrap();

    let mut creds = CertificateCredentials::new();
    creds
        .add_key_pair_file(&cert_path, &key_path, CertificateFormat::Der)
        .unwrap();
    assert_eq!(creds.cert_list_length(0), Some(1));
    assert_eq!(creds.key(0).unwrap().as_der(), leaf.key_der.as_slice());
}

#[test]
fn missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut creds = CertificateCredentials::new();
    let err = creds
        .add_trust_file(&dir.path().join("absent.pem"), CertificateFormat::Pem)
        .unwrap_err();
    assert!(matches!(err, CredError::Io(_)));
    assert_eq!(creds.x509_ncas(), 0);
}

#[test]
fn garbage_key_leaves_store_unchanged() {
    let root = common::root_ca("Garbage Root");
    let leaf = common::leaf("garbage-leaf", &root);
    let mut creds = CertificateCredentials::new();
    assert!(creds
        .add_key_pair_mem(leaf.pem.as_bytes(), b"not a key", CertificateFormat::Pem)
        .is_err());
    assert_eq!(creds.ncerts(), 0);
}

#[test]
fn ca_names_follow_the_trust_list() {
    let a = common::root_ca("Names Root A");
    let b = common::root_ca("Names Root B");
    let mut creds = CertificateCredentials::new();

    assert_eq!(creds.add_trust_mem(a.pem.as_bytes(), CertificateFormat::Pem).unwrap(), 1);
    assert_eq!(creds.ca_names().len(), 1);

    let both = common::bundle(&[&a.pem, &b.pem]);
    // The duplicate of A is not added again.
    assert_eq!(creds.add_trust_mem(both.as_bytes(), CertificateFormat::Pem).unwrap(), 1);
    assert_eq!(creds.x509_ncas(), 2);
    assert_eq!(creds.ca_names().len(), 2);

    let b_subject = x509::subject_dn(&x509::import(&b.der).unwrap()).to_vec();
    assert!(creds.ca_names().contains(&b_subject));

    creds.free_ca_names();
    assert!(creds.ca_names().is_empty());
    assert_eq!(creds.x509_ncas(), 2);

    creds.free_cas();
    assert_eq!(creds.x509_ncas(), 0);
    assert!(creds.ca_names().is_empty());
}

#[test]
fn trust_dir_loads_pem_files_only() {
    let a = common::root_ca("Dir Root A");
    let b = common::root_ca("Dir Root B");
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.pem"), &a.pem).unwrap();
    fs::write(dir.path().join("b.crt"), &b.pem).unwrap();
    fs::write(dir.path().join("notes.txt"), "not a certificate").unwrap();

    let mut creds = CertificateCredentials::new();
    assert_eq!(creds.add_trust_dir(dir.path()).unwrap(), 2);
    assert_eq!(creds.ca_names().len(), 2);
}

#[test]
fn crls_load_from_der_and_pem() {
    let root = common::root_ca("CRL Root");
    let crl = common::crl(&root, &[7, 8]);
    let mut creds = CertificateCredentials::new();

    assert_eq!(creds.add_crl_mem(&crl, CertificateFormat::Der).unwrap(), 1);
    let pem = common::bundle(&[&common::pem("X509 CRL", &crl), &common::pem("X509 CRL", &crl)]);
    assert_eq!(creds.add_crl_mem(pem.as_bytes(), CertificateFormat::Pem).unwrap(), 2);
    assert_eq!(creds.x509_ncrls(), 3);
    assert_eq!(creds.crls()[0].revoked_count(), 2);

    let root_subject = x509::subject_dn(&x509::import(&root.der).unwrap()).to_vec();
    assert_eq!(creds.crls()[0].issuer_raw(), root_subject.as_slice());

    creds.free_crls();
    assert_eq!(creds.x509_ncrls(), 0);
}

#[test]
fn verify_limits_and_flags() {
    let mut creds = CertificateCredentials::new();
    assert_eq!(creds.verify_policy().max_depth, DEFAULT_VERIFY_DEPTH);
    assert_eq!(creds.verify_policy().max_bits, DEFAULT_VERIFY_BITS);
    creds.set_verify_limits(2048, 3);
    creds.set_verify_flags(VerifyFlags::DISABLE_TIME_CHECKS | VerifyFlags::DO_NOT_ALLOW_SAME);
    assert_eq!(creds.verify_policy().max_depth, 3);
    assert_eq!(creds.verify_policy().max_bits, 2048);
    assert!(creds.verify_policy().flags.contains(VerifyFlags::DO_NOT_ALLOW_SAME));
}

#[test]
fn free_releases_everything() {
    let root = common::root_ca("Free Root");
    let leaf = common::leaf("free-leaf", &root);
    let mut creds = CertificateCredentials::new();
    creds
        .add_key_pair_mem(leaf.pem.as_bytes(), leaf.key_pem.as_bytes(), CertificateFormat::Pem)
        .unwrap();
    creds.add_trust_mem(&root.der, CertificateFormat::Der).unwrap();
    creds.add_crl_mem(&common::crl(&root, &[]), CertificateFormat::Der).unwrap();

    creds.free_keys();
    assert_eq!(creds.ncerts(), 0);
    assert_eq!(creds.x509_ncas(), 1);
    creds.free();
}

#[test]
fn from_config_file_with_relative_paths() {
    let root = common::root_ca("Config Root");
    let leaf = common::leaf("config-leaf", &root);
    let crl = common::crl(&root, &[99]);
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("server.pem"), &leaf.pem).unwrap();
    fs::write(dir.path().join("server.key"), &leaf.key_pem).unwrap();
    fs::write(dir.path().join("ca.pem"), &root.pem).unwrap();
    fs::write(dir.path().join("revoked.pem"), common::pem("X509 CRL", &crl)).unwrap();
    let config_path = dir.path().join("creds.json");
    fs::write(
        &config_path,
        r#"{
            "key_pairs": [{"cert": "server.pem", "key": "server.key"}],
            "ca_files": ["ca.pem"],
            "crl_files": ["revoked.pem"],
            "verify_flags": ["disable-time-checks"],
            "max_depth": 2
        }"#,
    )
    .unwrap();

    let config = CredentialsConfig::from_file(&config_path).unwrap();
    assert!(config.ca_files[0].is_absolute());
    let creds = CertificateCredentials::from_config(&config).unwrap();
    assert_eq!(creds.ncerts(), 1);
    assert_eq!(creds.x509_ncas(), 1);
    assert_eq!(creds.x509_ncrls(), 1);
    assert_eq!(creds.ca_names().len(), 1);
    assert_eq!(creds.verify_policy().max_depth, 2);
    assert_eq!(creds.verify_policy().max_bits, DEFAULT_VERIFY_BITS);
    assert_eq!(creds.verify_policy().flags, VerifyFlags::DISABLE_TIME_CHECKS);
}

#[test]
fn config_with_unknown_flag_fails() {
    let config =
        CredentialsConfig::from_json(br#"{"verify_flags": ["trust-everything"]}"#).unwrap();
    assert!(matches!(
        CertificateCredentials::from_config(&config),
        Err(CredError::InvalidRequest(_))
    ));
}
