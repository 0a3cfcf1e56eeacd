//! Trusted CA list.
//!
//! Provides [`CaList`], the ordered set of trusted CA certificates a
//! credential store verifies peers against, indexed by subject name. System
//! trust discovery matches OpenSSL's lookup behavior.

use crate::types::CertificateFormat;
use crate::{CredError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Well-known CA bundle file paths, in order of preference.
const KNOWN_CA_BUNDLE_PATHS: &[&str] = &[
    "/etc/ssl/certs/ca-certificates.crt", // Debian/Ubuntu
    "/etc/pki/tls/certs/ca-bundle.crt",   // RHEL/CentOS/Fedora
    "/etc/ssl/ca-bundle.pem",             // openSUSE
    "/etc/ssl/cert.pem",                  // macOS, Alpine
];

/// Well-known CA certificate directory paths.
const KNOWN_CA_DIR_PATHS: &[&str] = &["/etc/ssl/certs"];

/// `.pem`, `.crt`, `.cer` and OpenSSL hash links (`XXXXXXXX.N`).
fn is_pem_cert_file(path: &Path) -> bool {
    let ext = match path.extension().and_then(|e| e.to_str()) {
        Some(e) => e,
        None => return false,
    };
    matches!(ext, "pem" | "crt" | "cer")
        || (ext.len() == 1 && ext.bytes().next().is_some_and(|b| b.is_ascii_digit()))
}

struct TrustedCa {
    der: Vec<u8>,
    subject: Vec<u8>,
}

/// Ordered list of trusted CA certificates.
#[derive(Default)]
pub struct CaList {
    certs: Vec<TrustedCa>,
    by_subject: HashMap<Vec<u8>, Vec<usize>>,
}

impl std::fmt::Debug for CaList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaList")
            .field("count", &self.certs.len())
            .finish()
    }
}

impl CaList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one DER certificate. Returns `false` if it was already trusted.
    pub fn add_der(&mut self, der: &[u8]) -> Result<bool> {
        let parsed = super::import(der)?;
        let exact = parsed.der();
        let subject = super::subject_dn(&parsed).to_vec();
        if self.contains(exact) {
            return Ok(false);
        }
        self.certs
            .try_reserve(1)
            .map_err(|_| CredError::Allocation)?;
        let index = self.certs.len();
        self.by_subject.entry(subject.clone()).or_default().push(index);
        self.certs.push(TrustedCa {
            der: exact.to_vec(),
            subject,
        });
        Ok(true)
    }

    /// Add all certificates from a PEM bundle, skipping entries that fail
    /// to parse. Returns the number added.
    pub fn add_pem_bundle(&mut self, pem_data: &[u8]) -> Result<usize> {
        let certs = super::parse_pem_chain(pem_data)?;
        let mut added = 0;
        for cert_der in certs {
            match self.add_der(&cert_der) {
                Ok(true) => added += 1,
                Ok(false) => log::debug!("skipping duplicate CA certificate"),
                Err(e) => log::warn!("skipping unparsable CA certificate: {}", e),
            }
        }
        Ok(added)
    }

    /// Add trust material in either encoding. Returns the number added.
    pub fn add_mem(&mut self, data: &[u8], format: CertificateFormat) -> Result<usize> {
        match format {
            CertificateFormat::Pem => self.add_pem_bundle(data),
            CertificateFormat::Der => self.add_der(data).map(usize::from),
        }
    }

    /// Load certificates from a directory of PEM files (like OpenSSL's -CApath).
    pub fn add_pem_directory(&mut self, dir: &Path) -> Result<usize> {
        let mut total = 0;
        let entries = std::fs::read_dir(dir).map_err(|e| {
            CredError::Io(std::io::Error::new(
                e.kind(),
                format!("{}: {}", dir.display(), e),
            ))
        })?;
        for entry in entries {
            let path = entry?.path();
            if !path.is_file() || !is_pem_cert_file(&path) {
                continue;
            }
            match std::fs::read(&path) {
                Ok(data) => match self.add_pem_bundle(&data) {
                    Ok(added) => total += added,
                    Err(e) => log::warn!("skipping {}: {}", path.display(), e),
                },
                Err(e) => log::warn!("cannot read {}: {}", path.display(), e),
            }
        }
        Ok(total)
    }

    /// Load the system trust store.
    ///
    /// Tries, in order: `SSL_CERT_FILE`, the bundle `openssl-probe` finds,
    /// well-known bundle paths, then `SSL_CERT_DIR`, the probed directory
    /// and well-known directories. Returns the number added.
    pub fn add_system(&mut self) -> Result<usize> {
        if let Some(bundle_path) = find_system_ca_bundle() {
            if let Ok(data) = std::fs::read(&bundle_path) {
                let added = self.add_pem_bundle(&data)?;
                if added > 0 {
                    log::debug!("loaded {} CAs from {}", added, bundle_path.display());
                    return Ok(added);
                }
            }
        }

        let probe = openssl_probe::probe();
        let dir_candidates = std::env::var("SSL_CERT_DIR")
            .ok()
            .into_iter()
            .chain(
                probe
                    .cert_dir
                    .iter()
                    .map(|p| p.to_string_lossy().into_owned()),
            )
            .chain(KNOWN_CA_DIR_PATHS.iter().map(|s| (*s).to_string()));

        for dir in dir_candidates {
            if let Ok(added) = self.add_pem_directory(Path::new(&dir)) {
                if added > 0 {
                    log::debug!("loaded {} CAs from {}", added, dir);
                    return Ok(added);
                }
            }
        }

        Err(CredError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "no system trust store found",
        )))
    }

    /// Trusted certificates whose subject equals `subject_raw`, in insertion order.
    pub fn find_by_subject_raw<'a>(
        &'a self,
        subject_raw: &[u8],
    ) -> impl Iterator<Item = &'a [u8]> + 'a {
        self.by_subject
            .get(subject_raw)
            .into_iter()
            .flatten()
            .filter_map(move |i| self.certs.get(*i))
            .map(|ca| ca.der.as_slice())
    }

    /// Whether exactly this DER certificate is trusted.
    pub fn contains(&self, der: &[u8]) -> bool {
        match super::import(der) {
            Ok(parsed) => self
                .find_by_subject_raw(super::subject_dn(&parsed))
                .any(|c| c == parsed.der()),
            Err(_) => false,
        }
    }

    /// DER subject names of all CAs, in insertion order.
    pub fn subject_names(&self) -> Vec<Vec<u8>> {
        self.certs.iter().map(|ca| ca.subject.clone()).collect()
    }

    /// Iterate over the DER certificates in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        self.certs.iter().map(|ca| ca.der.as_slice())
    }

    pub fn len(&self) -> usize {
        self.certs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certs.is_empty()
    }

    pub fn clear(&mut self) {
        self.certs.clear();
        self.by_subject.clear();
    }
}

/// Find the system CA bundle path (same location OpenSSL uses).
pub fn find_system_ca_bundle() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("SSL_CERT_FILE") {
        let p = PathBuf::from(&path);
        if p.exists() {
            return Some(p);
        }
    }

    let probe = openssl_probe::probe();
    if let Some(file) = probe.cert_file {
        let path = PathBuf::from(&file);
        if path.exists() {
            return Some(path);
        }
    }

    KNOWN_CA_BUNDLE_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}
