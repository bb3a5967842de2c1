use crate::error::{Result, TillerError};
use serde::{Deserialize, Serialize};

/// TLS certificate bundle for L7 termination. Keyed by the certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertBundle {
    /// PEM-encoded certificate chain.
    pub cert: String,

    /// PEM-encoded private key.
    pub key: String,
}

impl CertBundle {
    pub fn same_key(&self, other: &CertBundle) -> bool {
        self.cert == other.cert
    }

    pub fn validate(&self) -> Result<()> {
        if !self.cert.contains("-----BEGIN") {
            return Err(TillerError::validation("cert is not PEM encoded"));
        }
        if !self.key.contains("-----BEGIN") {
            return Err(TillerError::validation("key is not PEM encoded"));
        }
        Ok(())
    }
}
