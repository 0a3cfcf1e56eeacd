//! Certificate credential store.
//!
//! [`CertificateCredentials`] owns everything a TLS endpoint needs to
//! authenticate with certificates: its own chains and keys, the CAs and
//! CRLs it trusts, the verification policy, and the callbacks and
//! ephemeral parameters the handshake may ask for. Sessions share a store
//! through an `Arc`; every mutating method takes `&mut self`, so a store is
//! only changed while no session holds it.

use crate::cert::{Certificate, ConvFlags};
use crate::config::CredentialsConfig;
use crate::params::{DhParams, EphemeralParams, ParamsFn, ParamsKind, RsaExportParams};
use crate::selector::RetrieveFn;
use crate::types::CertificateFormat;
use crate::x509::{self, CaList, Crl, PrivateKey, VerifyFlags, VerifyPolicy};
use crate::{CredError, Result};
use std::path::Path;
use std::sync::Arc;

/// One certificate chain (leaf first) and the private key of its leaf.
#[derive(Debug, Clone)]
pub struct CertKeyPair {
    chain: Vec<Certificate>,
    key: PrivateKey,
}

impl CertKeyPair {
    /// Pair a chain with its key. The chain must not be empty.
    pub fn new(chain: Vec<Certificate>, key: PrivateKey) -> Result<Self> {
        if chain.is_empty() {
            return Err(CredError::InvalidRequest(
                "a certificate chain needs at least one certificate".into(),
            ));
        }
        Ok(CertKeyPair { chain, key })
    }

    pub fn chain(&self) -> &[Certificate] {
        &self.chain
    }

    /// The end-entity certificate.
    #[allow(clippy::indexing_slicing)] // `new` refuses empty chains
    pub fn leaf(&self) -> &Certificate {
        &self.chain[0]
    }

    pub fn key(&self) -> &PrivateKey {
        &self.key
    }
}

/// Certificate credentials shared by the sessions of one endpoint.
#[derive(Default)]
pub struct CertificateCredentials {
    entries: Vec<Arc<CertKeyPair>>,
    cas: CaList,
    ca_names: Vec<Vec<u8>>,
    crls: Vec<Crl>,
    policy: VerifyPolicy,
    client_retrieve: Option<Box<RetrieveFn>>,
    server_retrieve: Option<Box<RetrieveFn>>,
    dh_params: Option<Arc<DhParams>>,
    rsa_export_params: Option<Arc<RsaExportParams>>,
    params_fn: Option<Box<ParamsFn>>,
}

impl std::fmt::Debug for CertificateCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateCredentials")
            .field("ncerts", &self.entries.len())
            .field("ncas", &self.cas.len())
            .field("ncrls", &self.crls.len())
            .field("policy", &self.policy)
            .field("client_retrieve", &self.client_retrieve.is_some())
            .field("server_retrieve", &self.server_retrieve.is_some())
            .field("dh_params", &self.dh_params.is_some())
            .field("rsa_export_params", &self.rsa_export_params.is_some())
            .field("params_fn", &self.params_fn.is_some())
            .finish()
    }
}

impl CertificateCredentials {
    /// Empty store with the default verification policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a configuration.
    pub fn from_config(config: &CredentialsConfig) -> Result<Self> {
        let mut creds = Self::new();

        for pair in &config.key_pairs {
            creds.add_key_pair_file(&pair.cert, &pair.key, pair.format)?;
        }
        for path in &config.ca_files {
            creds.add_trust_file(path, CertificateFormat::Pem)?;
        }
        for dir in &config.ca_dirs {
            creds.add_trust_dir(dir)?;
        }
        if config.system_trust {
            creds.add_system_trust()?;
        }
        for path in &config.crl_files {
            creds.add_crl_file(path, CertificateFormat::Pem)?;
        }

        creds.set_verify_flags(config.verify_flags()?);
        let defaults = VerifyPolicy::default();
        creds.set_verify_limits(
            config.max_bits.unwrap_or(defaults.max_bits),
            config.max_depth.unwrap_or(defaults.max_depth),
        );

        if let Some(path) = &config.dh_params_file {
            let data = read_file(path)?;
            creds.set_dh_params(DhParams::import(&data, CertificateFormat::Pem)?);
        }

        log::debug!("built credentials from config: {:?}", creds);
        Ok(creds)
    }

    // ---- lifecycle ----

    /// Drop every chain and key. The store stays usable.
    pub fn free_keys(&mut self) {
        self.entries.clear();
    }

    /// Drop every trusted CA, along with the cached CA names.
    pub fn free_cas(&mut self) {
        self.cas.clear();
        self.ca_names.clear();
    }

    /// Drop only the cached CA subject names.
    pub fn free_ca_names(&mut self) {
        self.ca_names.clear();
    }

    pub fn free_crls(&mut self) {
        self.crls.clear();
    }

    /// Release keys, CAs, CA names and CRLs, then the store itself.
    pub fn free(mut self) {
        self.free_keys();
        self.free_cas();
        self.free_ca_names();
        self.free_crls();
    }

    // ---- own chains and keys ----

    /// Add a chain (leaf first) with its private key. Returns its index.
    pub fn add_key_pair(&mut self, chain: Vec<Certificate>, key: PrivateKey) -> Result<usize> {
        let pair = CertKeyPair::new(chain, key)?;
        if pair.leaf().pk_algorithm() != pair.key().algorithm() {
            log::warn!(
                "key algorithm {} does not match leaf certificate algorithm {}",
                pair.key().algorithm(),
                pair.leaf().pk_algorithm()
            );
        }
        self.entries
            .try_reserve(1)
            .map_err(|_| CredError::Allocation)?;
        self.entries.push(Arc::new(pair));
        Ok(self.entries.len() - 1)
    }

    /// Add a chain and key from memory. PEM input may hold a whole chain.
    pub fn add_key_pair_mem(
        &mut self,
        cert_data: &[u8],
        key_data: &[u8],
        format: CertificateFormat,
    ) -> Result<usize> {
        let chain = x509::split_certificates(cert_data, format)?
            .iter()
            .map(|der| Certificate::normalize(der, CertificateFormat::Der, ConvFlags::empty()))
            .collect::<Result<Vec<_>>>()?;
        let key = PrivateKey::import(key_data, format)?;
        self.add_key_pair(chain, key)
    }

    pub fn add_key_pair_file(
        &mut self,
        cert_path: &Path,
        key_path: &Path,
        format: CertificateFormat,
    ) -> Result<usize> {
        let cert_data = read_file(cert_path)?;
        let key_data = read_file(key_path)?;
        self.add_key_pair_mem(&cert_data, &key_data, format)
    }

    pub fn ncerts(&self) -> usize {
        self.entries.len()
    }

    pub fn entry(&self, index: usize) -> Option<&Arc<CertKeyPair>> {
        self.entries.get(index)
    }

    pub fn entries(&self) -> &[Arc<CertKeyPair>] {
        &self.entries
    }

    pub fn cert_list(&self, index: usize) -> Option<&[Certificate]> {
        self.entries.get(index).map(|pair| pair.chain())
    }

    pub fn cert_list_length(&self, index: usize) -> Option<usize> {
        self.cert_list(index).map(<[Certificate]>::len)
    }

    pub fn key(&self, index: usize) -> Option<&PrivateKey> {
        self.entries.get(index).map(|pair| pair.key())
    }

    // ---- trust material ----

    /// Add trusted CAs from memory. Returns how many were added.
    pub fn add_trust_mem(&mut self, data: &[u8], format: CertificateFormat) -> Result<usize> {
        let added = self.cas.add_mem(data, format)?;
        self.refresh_ca_names();
        Ok(added)
    }

    pub fn add_trust_file(&mut self, path: &Path, format: CertificateFormat) -> Result<usize> {
        let data = read_file(path)?;
        self.add_trust_mem(&data, format)
    }

    /// Add every PEM certificate file in a directory.
    pub fn add_trust_dir(&mut self, dir: &Path) -> Result<usize> {
        let added = self.cas.add_pem_directory(dir)?;
        self.refresh_ca_names();
        Ok(added)
    }

    /// Add the operating system's trusted CAs.
    pub fn add_system_trust(&mut self) -> Result<usize> {
        let added = self.cas.add_system()?;
        self.refresh_ca_names();
        Ok(added)
    }

    fn refresh_ca_names(&mut self) {
        self.ca_names = self.cas.subject_names();
    }

    pub fn ca_list(&self) -> &CaList {
        &self.cas
    }

    pub fn x509_ncas(&self) -> usize {
        self.cas.len()
    }

    /// DER subject names of the trusted CAs, as sent in a certificate request.
    pub fn ca_names(&self) -> &[Vec<u8>] {
        &self.ca_names
    }

    /// Add CRLs from memory. Returns how many were added.
    pub fn add_crl_mem(&mut self, data: &[u8], format: CertificateFormat) -> Result<usize> {
        let crls = Crl::import(data, format)?;
        let added = crls.len();
        self.crls
            .try_reserve(added)
            .map_err(|_| CredError::Allocation)?;
        self.crls.extend(crls);
        Ok(added)
    }

    pub fn add_crl_file(&mut self, path: &Path, format: CertificateFormat) -> Result<usize> {
        let data = read_file(path)?;
        self.add_crl_mem(&data, format)
    }

    pub fn crls(&self) -> &[Crl] {
        &self.crls
    }

    pub fn x509_ncrls(&self) -> usize {
        self.crls.len()
    }

    // ---- verification policy ----

    pub fn set_verify_flags(&mut self, flags: VerifyFlags) {
        self.policy.flags = flags;
    }

    /// Limit peer key size and chain length.
    pub fn set_verify_limits(&mut self, max_bits: u32, max_depth: usize) {
        self.policy.max_bits = max_bits;
        self.policy.max_depth = max_depth;
    }

    pub fn verify_policy(&self) -> &VerifyPolicy {
        &self.policy
    }

    // ---- callbacks ----

    /// Callback choosing the client's certificate; replaces any previous one.
    pub fn set_client_retrieve_function<F>(&mut self, f: F)
    where
        F: Fn(&crate::Session, &crate::RetrieveRequest<'_>) -> Result<crate::Retrieved>
            + Send
            + Sync
            + 'static,
    {
        self.client_retrieve = Some(Box::new(f));
    }

    /// Callback choosing the server's certificate; replaces any previous one.
    pub fn set_server_retrieve_function<F>(&mut self, f: F)
    where
        F: Fn(&crate::Session, &crate::RetrieveRequest<'_>) -> Result<crate::Retrieved>
            + Send
            + Sync
            + 'static,
    {
        self.server_retrieve = Some(Box::new(f));
    }

    pub(crate) fn client_retrieve_function(&self) -> Option<&RetrieveFn> {
        self.client_retrieve.as_deref()
    }

    pub(crate) fn server_retrieve_function(&self) -> Option<&RetrieveFn> {
        self.server_retrieve.as_deref()
    }

    // ---- ephemeral parameters ----

    pub fn set_dh_params(&mut self, params: DhParams) {
        self.dh_params = Some(Arc::new(params));
    }

    pub fn set_rsa_export_params(&mut self, params: RsaExportParams) {
        self.rsa_export_params = Some(Arc::new(params));
    }

    /// Callback supplying parameters the store does not hold itself.
    pub fn set_params_function<F>(&mut self, f: F)
    where
        F: Fn(ParamsKind) -> Option<EphemeralParams> + Send + Sync + 'static,
    {
        self.params_fn = Some(Box::new(f));
    }

    pub(crate) fn static_params(&self, kind: ParamsKind) -> Option<EphemeralParams> {
        match kind {
            ParamsKind::Dh => self.dh_params.clone().map(EphemeralParams::Dh),
            ParamsKind::RsaExport => self
                .rsa_export_params
                .clone()
                .map(EphemeralParams::RsaExport),
        }
    }

    pub(crate) fn params_function(&self) -> Option<&ParamsFn> {
        self.params_fn.as_deref()
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| {
        CredError::Io(std::io::Error::new(
            e.kind(),
            format!("{}: {}", path.display(), e),
        ))
    })
}
