#![no_main]

use certcred_lib::{Certificate, CertificateFormat, ConvFlags, DigestAlgorithm, PrivateKey};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Normalization must never panic, whatever the input or flags.
    let flags = ConvFlags::from_bits_truncate(data.first().copied().unwrap_or(0) & 0x07);
    for format in [CertificateFormat::Der, CertificateFormat::Pem] {
        if let Ok(cert) = Certificate::normalize(data, format, flags) {
            let _ = cert.fingerprint(DigestAlgorithm::Sha256);
            let _ = certcred_lib::selector::certificate_key_exchanges(&cert);

            // A kept DER copy normalizes to the same certificate.
            if let Some(raw) = cert.raw() {
                let again = Certificate::normalize(raw, CertificateFormat::Der, flags);
                assert_eq!(again.ok().as_ref(), Some(&cert), "renormalization differs");
            }
        }
        let _ = PrivateKey::import(data, format);
    }
});
