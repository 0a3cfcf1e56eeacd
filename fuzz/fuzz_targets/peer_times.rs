#![no_main]

use certcred_lib::{
    peer_activation_time, peer_expiration_time, try_peer_activation_time,
    try_peer_expiration_time, verify_peers, CertificateCredentials, Role, Session,
    TIME_UNAVAILABLE,
};
use libfuzzer_sys::fuzz_target;
use std::sync::Arc;

fuzz_target!(|data: &[u8]| {
    // Split the input into a chain at 0xFF separators.
    let chain: Vec<Vec<u8>> = data.split(|b| *b == 0xFF).map(<[u8]>::to_vec).collect();
    let mut session =
        Session::with_credentials(Role::Client, Arc::new(CertificateCredentials::new()));
    if session.receive_peer_certificates(chain).is_err() {
        return;
    }

    // Sentinel accessors agree with the fallible ones.
    match try_peer_activation_time(&session) {
        Ok(ts) => assert_eq!(peer_activation_time(&session), ts),
        Err(_) => assert_eq!(peer_activation_time(&session), TIME_UNAVAILABLE),
    }
    match try_peer_expiration_time(&session) {
        Ok(ts) => assert_eq!(peer_expiration_time(&session), ts),
        Err(_) => assert_eq!(peer_expiration_time(&session), TIME_UNAVAILABLE),
    }

    // Nothing is trusted, so a parsable chain is never accepted.
    if let Ok(status) = verify_peers(&mut session) {
        assert!(!status.is_trusted());
    }
});
