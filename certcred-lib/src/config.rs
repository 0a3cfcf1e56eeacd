//! Declarative credential configuration, loaded from JSON.
//!
//! ```json
//! {
//!   "key_pairs": [{ "cert": "server.pem", "key": "server.key" }],
//!   "ca_files": ["ca.pem"],
//!   "verify_flags": ["allow-x509-v1-ca-crt"],
//!   "max_depth": 4
//! }
//! ```

use crate::bits::FlagLabels;
use crate::types::CertificateFormat;
use crate::x509::VerifyFlags;
use crate::{CredError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// One certificate chain file and the key file that goes with it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeyPairConfig {
    pub cert: PathBuf,
    pub key: PathBuf,
    #[serde(default)]
    pub format: CertificateFormat,
}

/// Everything [`crate::CertificateCredentials::from_config`] loads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CredentialsConfig {
    pub key_pairs: Vec<KeyPairConfig>,
    /// PEM bundles of trusted CAs.
    pub ca_files: Vec<PathBuf>,
    /// Directories of PEM CA files, like OpenSSL's `-CApath`.
    pub ca_dirs: Vec<PathBuf>,
    /// Also trust the operating system's CA store.
    pub system_trust: bool,
    /// PEM files of CRLs.
    pub crl_files: Vec<PathBuf>,
    /// Names of [`VerifyFlags`], e.g. `"disable-time-checks"`.
    pub verify_flags: Vec<String>,
    pub max_depth: Option<usize>,
    pub max_bits: Option<u32>,
    /// PEM `DH PARAMETERS` file.
    pub dh_params_file: Option<PathBuf>,
}

impl CredentialsConfig {
    pub fn from_json(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }

    /// Load a JSON file. Relative paths inside it are resolved against the
    /// file's directory.
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read(path).map_err(|e| {
            CredError::Io(std::io::Error::new(
                e.kind(),
                format!("{}: {}", path.display(), e),
            ))
        })?;
        let mut config = Self::from_json(&data)?;
        if let Some(base) = path.parent() {
            config.resolve_relative_to(base);
        }
        Ok(config)
    }

    fn resolve_relative_to(&mut self, base: &Path) {
        let fix = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        for pair in &mut self.key_pairs {
            fix(&mut pair.cert);
            fix(&mut pair.key);
        }
        self.ca_files.iter_mut().for_each(fix);
        self.ca_dirs.iter_mut().for_each(fix);
        self.crl_files.iter_mut().for_each(fix);
        if let Some(p) = self.dh_params_file.as_mut() {
            fix(p);
        }
    }

    /// Combine the configured flag names.
    pub fn verify_flags(&self) -> Result<VerifyFlags> {
        self.verify_flags
            .iter()
            .try_fold(VerifyFlags::empty(), |acc, name| {
                VerifyFlags::from_label(name)
                    .map(|flag| acc | flag)
                    .ok_or_else(|| {
                        CredError::InvalidRequest(format!("unknown verify flag: {}", name))
                    })
            })
    }
}
