#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic, clippy::indexing_slicing)]
//! Verifying peer chains through a session.

mod common;

use certcred_lib::*;
use rcgen::SerialNumber;
use std::sync::Arc;

fn trusting(cas: &[&common::Authority]) -> CertificateCredentials {
    let mut creds = CertificateCredentials::new();
    for ca in cas {
        creds.add_trust_mem(&ca.der, CertificateFormat::Der).unwrap();
    }
    creds
}

fn client_with_peer(creds: CertificateCredentials, chain: &[&[u8]]) -> Session {
    let mut session = Session::with_credentials(Role::Client, Arc::new(creds));
    session
        .receive_peer_certificates(chain.iter().map(|c| c.to_vec()).collect())
        .unwrap();
    session
}

#[test]
fn trusted_chain_through_intermediate() {
    let root = common::root_ca("Trusted Root");
    let inter = common::intermediate_ca("Trusted Inter", &root);
    let leaf = common::leaf("trusted-leaf", &inter);
    let mut session = client_with_peer(trusting(&[&root]), &[&leaf.der, &inter.der]);

    let status = verify_peers(&mut session).unwrap();
    assert!(status.is_trusted(), "status {}", status);
    assert_eq!(session.auth_state(), AuthState::Verified(CertStatus::empty()));
}

#[test]
#[allow(deprecated)]
fn legacy_entry_point_returns_zero_for_trusted() {
    let root = common::root_ca("Legacy Root");
    let leaf = common::leaf("legacy-leaf", &root);
    let mut session = client_with_peer(trusting(&[&root]), &[&leaf.der]);
    assert_eq!(verify_peers_legacy(&mut session), 0);
}

#[test]
fn unknown_issuer_is_signer_not_found() {
    let root = common::root_ca("Unknown Root");
    let other = common::root_ca("Other Root");
    let leaf = common::leaf("unknown-leaf", &root);
    let mut session = client_with_peer(trusting(&[&other]), &[&leaf.der]);
    assert_eq!(
        verify_peers(&mut session).unwrap(),
        CertStatus::SIGNER_NOT_FOUND | CertStatus::INVALID
    );
}

#[test]
fn same_name_different_key_is_signature_failure() {
    let real = common::root_ca("Twin Root");
    let impostor = common::root_ca("Twin Root");
    let leaf = common::leaf("twin-leaf", &real);
    let mut session = client_with_peer(trusting(&[&impostor]), &[&leaf.der]);
    assert_eq!(
        verify_peers(&mut session).unwrap(),
        CertStatus::SIGNATURE_FAILURE | CertStatus::INVALID
    );
}

#[test]
fn broken_chain_order_is_signer_not_found() {
    let a = common::root_ca("Order Root A");
    let b = common::root_ca("Order Root B");
    let inter_b = common::intermediate_ca("Order Inter B", &b);
    let leaf = common::leaf("order-leaf", &a);
    let mut session = client_with_peer(trusting(&[&a, &b]), &[&leaf.der, &inter_b.der]);
    let status = verify_peers(&mut session).unwrap();
    assert!(status.contains(CertStatus::SIGNER_NOT_FOUND));
    assert!(status.contains(CertStatus::INVALID));
}

#[test]
fn expired_leaf() {
    let root = common::root_ca("Expired Root");
    let mut params = common::leaf_params("expired-leaf");
    params.not_before = rcgen::date_time_ymd(2000, 1, 1);
    params.not_after = rcgen::date_time_ymd(2001, 1, 1);
    let leaf = common::leaf_with(params, &rcgen::PKCS_ECDSA_P256_SHA256, &root);

    let mut session = client_with_peer(trusting(&[&root]), &[&leaf.der]);
    assert_eq!(
        verify_peers(&mut session).unwrap(),
        CertStatus::EXPIRED | CertStatus::INVALID
    );

    let mut creds = trusting(&[&root]);
    creds.set_verify_flags(VerifyFlags::DISABLE_TIME_CHECKS);
    let mut session = client_with_peer(creds, &[&leaf.der]);
    assert!(verify_peers(&mut session).unwrap().is_trusted());
}

#[test]
fn not_yet_valid_leaf() {
    let root = common::root_ca("Future Root");
    let mut params = common::leaf_params("future-leaf");
    params.not_before = rcgen::date_time_ymd(2090, 1, 1);
    params.not_after = rcgen::date_time_ymd(2095, 1, 1);
    let leaf = common::leaf_with(params, &rcgen::PKCS_ECDSA_P256_SHA256, &root);
    let mut session = client_with_peer(trusting(&[&root]), &[&leaf.der]);
    assert_eq!(
        verify_peers(&mut session).unwrap(),
        CertStatus::NOT_ACTIVATED | CertStatus::INVALID
    );
}

#[test]
fn revoked_leaf() {
    let root = common::root_ca("Revoking Root");
    let mut params = common::leaf_params("revoked-leaf");
    params.serial_number = Some(SerialNumber::from(42u64));
    let leaf = common::leaf_with(params, &rcgen::PKCS_ECDSA_P256_SHA256, &root);
    let crl = common::crl(&root, &[42]);

    let mut creds = trusting(&[&root]);
    creds.add_crl_mem(&crl, CertificateFormat::Der).unwrap();
    let mut session = client_with_peer(creds, &[&leaf.der]);
    assert_eq!(
        verify_peers(&mut session).unwrap(),
        CertStatus::REVOKED | CertStatus::INVALID
    );

    let mut creds = trusting(&[&root]);
    creds.add_crl_mem(&crl, CertificateFormat::Der).unwrap();
    creds.set_verify_flags(VerifyFlags::DISABLE_CRL_CHECKS);
    let mut session = client_with_peer(creds, &[&leaf.der]);
    assert!(verify_peers(&mut session).unwrap().is_trusted());
}

#[test]
fn crl_listing_other_serials_does_not_revoke() {
    let root = common::root_ca("Clean Root");
    let mut params = common::leaf_params("clean-leaf");
    params.serial_number = Some(SerialNumber::from(7u64));
    let leaf = common::leaf_with(params, &rcgen::PKCS_ECDSA_P256_SHA256, &root);
    let mut creds = trusting(&[&root]);
    creds
        .add_crl_mem(&common::crl(&root, &[8, 9]), CertificateFormat::Der)
        .unwrap();
    let mut session = client_with_peer(creds, &[&leaf.der]);
    assert!(verify_peers(&mut session).unwrap().is_trusted());
}

#[test]
fn chain_longer_than_max_depth_is_constraint_error() {
    let root = common::root_ca("Depth Root");
    let inter = common::intermediate_ca("Depth Inter", &root);
    let leaf = common::leaf("depth-leaf", &inter);
    let mut creds = trusting(&[&root]);
    creds.set_verify_limits(DEFAULT_VERIFY_BITS, 1);
    let mut session = client_with_peer(creds, &[&leaf.der, &inter.der]);

    let err = verify_peers(&mut session).unwrap_err();
    assert!(matches!(err, CredError::Constraint(_)));
    assert_eq!(session.auth_state(), AuthState::VerificationFailed(err.code()));
}

#[test]
fn key_larger_than_max_bits_is_constraint_error() {
    let root = common::root_ca("Bits Root");
    let leaf = common::leaf("bits-leaf", &root);
    let mut creds = trusting(&[&root]);
    creds.set_verify_limits(255, DEFAULT_VERIFY_DEPTH);
    let mut session = client_with_peer(creds, &[&leaf.der]);
    assert!(matches!(
        verify_peers(&mut session),
        Err(CredError::Constraint(_))
    ));
}

#[test]
fn non_ca_intermediate_is_signer_not_ca() {
    let root = common::root_ca("NotCA Root");
    let fake = common::non_ca_issuer("NotCA Issuer", &root);
    let leaf = common::leaf("notca-leaf", &fake);
    let mut session = client_with_peer(trusting(&[&root]), &[&leaf.der, &fake.der]);
    assert_eq!(
        verify_peers(&mut session).unwrap(),
        CertStatus::SIGNER_NOT_CA | CertStatus::INVALID
    );

    let mut creds = trusting(&[&root]);
    creds.set_verify_flags(VerifyFlags::DISABLE_CA_SIGN);
    let mut session = client_with_peer(creds, &[&leaf.der, &fake.der]);
    assert!(verify_peers(&mut session).unwrap().is_trusted());
}

#[test]
fn trusted_peer_certificate_and_do_not_allow_same() {
    let peer = common::self_signed_leaf("pinned-peer");
    let mut creds = CertificateCredentials::new();
    creds.add_trust_mem(&peer.der, CertificateFormat::Der).unwrap();
    let mut session = client_with_peer(creds, &[&peer.der]);
    assert!(verify_peers(&mut session).unwrap().is_trusted());

    let mut creds = CertificateCredentials::new();
    creds.add_trust_mem(&peer.der, CertificateFormat::Der).unwrap();
    creds.set_verify_flags(VerifyFlags::DO_NOT_ALLOW_SAME);
    let mut session = client_with_peer(creds, &[&peer.der]);
    let status = verify_peers(&mut session).unwrap();
    assert!(!status.is_trusted());
    assert!(status.contains(CertStatus::INVALID));
}

#[test]
fn server_verifies_required_client_certificate() {
    let root = common::root_ca("Client Auth Root");
    let leaf = common::leaf("client-auth", &root);
    let mut session = Session::with_credentials(Role::Server, Arc::new(trusting(&[&root])));
    session.set_certificate_request(CertificateRequest::Require);
    session.mark_certificate_requested().unwrap();
    session.receive_peer_certificates(vec![leaf.der.clone()]).unwrap();
    assert!(verify_peers(&mut session).unwrap().is_trusted());
    assert!(session.auth_info().unwrap().certificate_requested());
}

#[test]
fn peer_validity_times() {
    let root = common::root_ca("Times Root");
    let mut params = common::leaf_params("times-leaf");
    params.not_before = rcgen::date_time_ymd(2020, 1, 1);
    params.not_after = rcgen::date_time_ymd(2030, 1, 1);
    let leaf = common::leaf_with(params, &rcgen::PKCS_ECDSA_P256_SHA256, &root);
    let session = client_with_peer(trusting(&[&root]), &[&leaf.der]);

    assert_eq!(peer_activation_time(&session), 1_577_836_800);
    assert_eq!(peer_expiration_time(&session), 1_893_456_000);
    assert_eq!(try_peer_activation_time(&session).unwrap(), 1_577_836_800);
}

#[test]
fn peer_times_without_certificate() {
    let session = Session::with_credentials(Role::Client, Arc::new(CertificateCredentials::new()));
    assert_eq!(peer_activation_time(&session), TIME_UNAVAILABLE);
    assert_eq!(peer_expiration_time(&session), TIME_UNAVAILABLE);
    assert!(matches!(
        try_peer_expiration_time(&session),
        Err(CredError::NoCertificateFound)
    ));
}

#[test]
fn verify_chain_at_fixed_time() {
    let root = common::root_ca("Fixed Root");
    let mut params = common::leaf_params("fixed-leaf");
    params.not_before = rcgen::date_time_ymd(2020, 1, 1);
    params.not_after = rcgen::date_time_ymd(2030, 1, 1);
    let leaf = common::leaf_with(params, &rcgen::PKCS_ECDSA_P256_SHA256, &root);
    let mut cas = CaList::new();
    cas.add_der(&root.der).unwrap();
    let policy = VerifyPolicy::default();

    let chain = vec![leaf.der];
    let inside = x509::verify_chain(&chain, &cas, &[], &policy, 1_700_000_000).unwrap();
    assert!(inside.is_trusted());
    let after = x509::verify_chain(&chain, &cas, &[], &policy, 1_900_000_000).unwrap();
    assert_eq!(after, CertStatus::EXPIRED | CertStatus::INVALID);
}

const V1_ROOT: &[u8] = include_bytes!("data/v1-root.der");
const V1_LEAF: &[u8] = include_bytes!("data/v1-leaf.der");
const X25519_LEAF: &[u8] = include_bytes!("data/x25519-leaf.der");
const IN_2023: i64 = 1_700_000_000;

fn v1_policy(flags: VerifyFlags) -> (CaList, VerifyPolicy) {
    let mut cas = CaList::new();
    cas.add_der(V1_ROOT).unwrap();
    let policy = VerifyPolicy {
        flags,
        ..VerifyPolicy::default()
    };
    (cas, policy)
}

#[test]
fn trusted_v1_root_sent_by_peer_matches_leaf_only() {
    let (cas, policy) = v1_policy(VerifyFlags::ALLOW_X509_V1_CA_CRT);
    let leaf_only = vec![V1_LEAF.to_vec()];
    let with_root = vec![V1_LEAF.to_vec(), V1_ROOT.to_vec()];

    let status = x509::verify_chain(&leaf_only, &cas, &[], &policy, IN_2023).unwrap();
    assert!(status.is_trusted(), "status {}", status);
    let status = x509::verify_chain(&with_root, &cas, &[], &policy, IN_2023).unwrap();
    assert!(status.is_trusted(), "status {}", status);
}

#[test]
fn v1_root_needs_a_v1_flag() {
    let (cas, policy) = v1_policy(VerifyFlags::empty());
    for chain in [vec![V1_LEAF.to_vec()], vec![V1_LEAF.to_vec(), V1_ROOT.to_vec()]] {
        assert_eq!(
            x509::verify_chain(&chain, &cas, &[], &policy, IN_2023).unwrap(),
            CertStatus::SIGNER_NOT_CA | CertStatus::INVALID
        );
    }
}

#[test]
fn untrusted_v1_intermediate_needs_allow_any() {
    // The v1 certificate is only an intermediate here; its own leaf anchors the chain.
    let mut cas = CaList::new();
    cas.add_der(V1_LEAF).unwrap();
    let chain = vec![V1_LEAF.to_vec(), V1_ROOT.to_vec()];
    let policy = VerifyPolicy {
        flags: VerifyFlags::ALLOW_X509_V1_CA_CRT,
        ..VerifyPolicy::default()
    };
    assert_eq!(
        x509::verify_chain(&chain, &cas, &[], &policy, IN_2023).unwrap(),
        CertStatus::SIGNER_NOT_CA | CertStatus::INVALID
    );
    let policy = VerifyPolicy {
        flags: VerifyFlags::ALLOW_ANY_X509_V1_CA_CRT,
        ..VerifyPolicy::default()
    };
    assert!(x509::verify_chain(&chain, &cas, &[], &policy, IN_2023)
        .unwrap()
        .is_trusted());
}

#[test]
fn unknown_key_algorithm_skips_the_bit_limit() {
    let (cas, mut policy) = v1_policy(VerifyFlags::ALLOW_X509_V1_CA_CRT);
    policy.max_bits = 1;
    let status =
        x509::verify_chain(&[X25519_LEAF.to_vec()], &cas, &[], &policy, IN_2023).unwrap();
    assert!(status.is_trusted(), "status {}", status);

    assert!(matches!(
        x509::verify_chain(&[V1_LEAF.to_vec()], &cas, &[], &policy, IN_2023),
        Err(CredError::Constraint(_))
    ));
}
