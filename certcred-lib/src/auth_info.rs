//! Per-handshake certificate authentication record.

use crate::params::{DhParams, RsaExportParams};

/// DH group used in the handshake, copied out of the shared parameters.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DhInfo {
    pub prime: Vec<u8>,
    pub generator: Vec<u8>,
}

/// RSA-export key used in the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RsaInfo {
    pub modulus: Vec<u8>,
    pub exponent: Vec<u8>,
}

/// What was requested and received during certificate authentication.
///
/// An empty certificate list means the peer sent no certificate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthInfo {
    certificate_requested: bool,
    dh: Option<DhInfo>,
    rsa_export: Option<RsaInfo>,
    raw_certificate_list: Vec<Vec<u8>>,
}

impl AuthInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn certificate_requested(&self) -> bool {
        self.certificate_requested
    }

    pub(crate) fn set_certificate_requested(&mut self) {
        self.certificate_requested = true;
    }

    /// Peer certificates as received, leaf first.
    pub fn raw_certificate_list(&self) -> &[Vec<u8>] {
        &self.raw_certificate_list
    }

    pub fn ncerts(&self) -> usize {
        self.raw_certificate_list.len()
    }

    pub(crate) fn set_raw_certificate_list(&mut self, certs: Vec<Vec<u8>>) {
        self.raw_certificate_list = certs;
    }

    pub fn dh(&self) -> Option<&DhInfo> {
        self.dh.as_ref()
    }

    /// Record the DH group used by this handshake.
    pub fn record_dh(&mut self, params: &DhParams) {
        self.dh = Some(DhInfo {
            prime: params.prime().to_vec(),
            generator: params.generator().to_vec(),
        });
    }

    pub fn rsa_export(&self) -> Option<&RsaInfo> {
        self.rsa_export.as_ref()
    }

    /// Record the RSA-export key used by this handshake.
    pub fn record_rsa_export(&mut self, params: &RsaExportParams) {
        self.rsa_export = Some(RsaInfo {
            modulus: params.modulus().to_vec(),
            exponent: params.exponent().to_vec(),
        });
    }
}
