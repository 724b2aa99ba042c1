//! Epoch-bounded certificates.
//!
//! A certificate wraps an opaque payload together with an expiration epoch
//! and one or more ed25519 signatures over both. The wire form is bincode.

use serde::{Deserialize, Serialize};

use crate::crypto::{sign as sign_message, verify as verify_message, KeyPair, PublicKey, Sig};
use crate::encoding::{from_bytes, to_bytes};
use crate::error::CoreError;

pub const CERTIFICATE_VERSION: &str = "v0";
pub const KEY_TYPE_ED25519: &str = "ed25519";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertSignature {
    pub identity: PublicKey,
    pub signature: Sig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub version: String,
    pub key_type: String,
    pub expiration: u64,
    pub certified: Vec<u8>,
    pub signatures: Vec<CertSignature>,
}

impl Certificate {
    /// Bytes covered by every signature
    fn signing_message(&self) -> Result<Vec<u8>, CoreError> {
        to_bytes(&(
            &self.version,
            &self.key_type,
            self.expiration,
            &self.certified,
        ))
    }

    fn check_header(&self) -> Result<(), CoreError> {
        if self.version != CERTIFICATE_VERSION {
            return Err(CoreError::UnsupportedCertificate(format!(
                "version '{}'",
                self.version
            )));
        }
        if self.key_type != KEY_TYPE_ED25519 {
            return Err(CoreError::UnsupportedCertificate(format!(
                "key type '{}'",
                self.key_type
            )));
        }
        Ok(())
    }
}

/// Certify `payload` until `expiration` (inclusive).
pub fn sign(signer: &KeyPair, payload: &[u8], expiration: u64) -> Result<Vec<u8>, CoreError> {
    let mut cert = Certificate {
        version: CERTIFICATE_VERSION.to_string(),
        key_type: KEY_TYPE_ED25519.to_string(),
        expiration,
        certified: payload.to_vec(),
        signatures: Vec::new(),
    };
    let message = cert.signing_message()?;
    cert.signatures.push(CertSignature {
        identity: signer.public,
        signature: sign_message(&signer.secret, &message),
    });
    to_bytes(&cert)
}

/// Check `verifier` signed the blob and that it has not expired at `now`,
/// returning the certified payload.
pub fn verify(verifier: &PublicKey, blob: &[u8], now: u64) -> Result<Vec<u8>, CoreError> {
    let cert = get_certificate(blob)?;
    cert.check_header()?;

    let entry = cert
        .signatures
        .iter()
        .find(|s| s.identity == *verifier)
        .ok_or(CoreError::UnknownSigner)?;
    let message = cert.signing_message()?;
    verify_message(verifier, &message, &entry.signature)?;

    if now > cert.expiration {
        return Err(CoreError::CertificateExpired {
            expiration: cert.expiration,
            now,
        });
    }
    Ok(cert.certified)
}

pub fn get_certificate(blob: &[u8]) -> Result<Certificate, CoreError> {
    from_bytes(blob)
}

/// Payload without any signature check
pub fn get_certified(blob: &[u8]) -> Result<Vec<u8>, CoreError> {
    Ok(get_certificate(blob)?.certified)
}

pub fn get_signatures(blob: &[u8]) -> Result<Vec<CertSignature>, CoreError> {
    Ok(get_certificate(blob)?.signatures)
}
