//! Request signing for order-book endpoints that require authentication.
//!
//! Signature = RSA-PSS (SHA-256 digest, SHA-256 MGF1, salt length equal to
//! hash length) over `method ‖ path ‖ timestamp_ms ‖ body`. The header value
//! is base64(signature) alongside the key id and timestamp.

use crate::error::EngineError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pss::SigningKey;
use rsa::sha2::Sha256;
use rsa::signature::{RandomizedSigner, SignatureEncoding};
use rsa::RsaPrivateKey;
use std::path::Path;

pub struct KalshiSigner {
    key_id: String,
    signing_key: SigningKey<Sha256>,
}

/// Headers to attach to an authenticated request.
pub struct SignedHeaders {
    pub key_id: String,
    pub timestamp_ms: i64,
    pub signature_b64: String,
}

impl KalshiSigner {
    /// Loads a PKCS#1 PEM private key from disk. Fails with [`EngineError::ConfigError`]
    /// if the file is unreadable or the PEM is unparseable.
    pub fn from_pem_file(key_id: impl Into<String>, path: &Path) -> Result<Self, EngineError> {
        let pem = std::fs::read_to_string(path)
            .map_err(|e| EngineError::ConfigError(format!("cannot read private key {}: {e}", path.display())))?;
        let private_key = RsaPrivateKey::from_pkcs1_pem(&pem)
            .map_err(|e| EngineError::ConfigError(format!("unparseable PEM private key: {e}")))?;
        Ok(Self { key_id: key_id.into(), signing_key: SigningKey::<Sha256>::new(private_key) })
    }

    /// Signs `method ‖ path ‖ timestamp_ms ‖ body` and returns the headers to attach.
    pub fn sign(&self, method: &str, path: &str, timestamp_ms: i64, body: &[u8]) -> SignedHeaders {
        let mut message = Vec::with_capacity(method.len() + path.len() + 16 + body.len());
        message.extend_from_slice(method.as_bytes());
        message.extend_from_slice(path.as_bytes());
        message.extend_from_slice(timestamp_ms.to_string().as_bytes());
        message.extend_from_slice(body);

        let mut rng = rand::thread_rng();
        let signature = self.signing_key.sign_with_rng(&mut rng, &message);
        let signature_b64 = STANDARD.encode(signature.to_bytes());

        SignedHeaders { key_id: self.key_id.clone(), timestamp_ms, signature_b64 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs1::EncodeRsaPrivateKey;

    fn test_signer() -> KalshiSigner {
        let mut rng = rand::thread_rng();
        let private_key = RsaPrivateKey::new(&mut rng, 2048).unwrap();
        let pem = private_key.to_pkcs1_pem(Default::default()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key.pem");
        std::fs::write(&path, pem.as_str()).unwrap();
        let signer = KalshiSigner::from_pem_file("test-key", &path).unwrap();
        std::mem::forget(dir);
        signer
    }

    #[test]
    fn signs_without_error_and_produces_base64() {
        let signer = test_signer();
        let headers = signer.sign("GET", "/trade-api/v2/markets", 1_700_000_000_000, b"");
        assert_eq!(headers.key_id, "test-key");
        assert!(!headers.signature_b64.is_empty());
        assert!(STANDARD.decode(&headers.signature_b64).is_ok());
    }

    #[test]
    fn rejects_unparseable_pem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.pem");
        std::fs::write(&path, "not a real key").unwrap();
        let result = KalshiSigner::from_pem_file("k", &path);
        assert!(matches!(result, Err(EngineError::ConfigError(_))));
    }
}
