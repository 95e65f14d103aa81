//! Worker callback authentication.
//!
//! The worker signs each callback with HMAC-SHA256 under a shared secret and
//! sends `X-Signature: sha256=<hex digest>`. The signed material is the
//! request path, a newline, then the raw body, so a signature only verifies
//! on the job URL it was made for. Verification is constant-time.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

/// Header carrying the callback signature (lowercase, as HTTP normalizes it).
pub const SIGNATURE_HEADER: &str = "x-signature";

const SCHEME_PREFIX: &str = "sha256=";

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("callback secret must not be empty")]
    EmptySecret,

    #[error("missing callback signature")]
    Missing,

    #[error("malformed callback signature")]
    Malformed,

    #[error("callback signature does not match")]
    Mismatch,
}

#[derive(Clone)]
pub struct CallbackSigner {
    mac: HmacSha256,
}

impl CallbackSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, SignatureError> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Err(SignatureError::EmptySecret);
        }
        let mac = HmacSha256::new_from_slice(secret).map_err(|_| SignatureError::EmptySecret)?;
        Ok(Self { mac })
    }

    /// Header value for `body` posted to `path`.
    pub fn sign(&self, path: &str, body: &[u8]) -> String {
        let mac = self.keyed(path, body);
        format!("{SCHEME_PREFIX}{}", hex::encode(mac.finalize().into_bytes()))
    }

    pub fn verify(&self, header: Option<&str>, path: &str, body: &[u8]) -> Result<(), SignatureError> {
        let header = header.ok_or(SignatureError::Missing)?.trim();
        let digest = header
            .strip_prefix(SCHEME_PREFIX)
            .ok_or(SignatureError::Malformed)?;
        let expected = hex::decode(digest).map_err(|_| SignatureError::Malformed)?;

        self.keyed(path, body)
            .verify_slice(&expected)
            .map_err(|_| SignatureError::Mismatch)
    }

    fn keyed(&self, path: &str, body: &[u8]) -> HmacSha256 {
        let mut mac = self.mac.clone();
        mac.update(path.as_bytes());
        mac.update(b"\n");
        mac.update(body);
        mac
    }
}

impl core::fmt::Debug for CallbackSigner {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CallbackSigner").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PATH: &str = "/callbacks/jobs/0192b6f0-0000-7000-8000-000000000001";

    #[test]
    fn accepts_own_signature() {
        let signer = CallbackSigner::new("shared").unwrap();
        let body = br#"{"status":"processing","progress":40}"#;
        let sig = signer.sign(PATH, body);
        assert!(sig.starts_with("sha256="));
        assert_eq!(signer.verify(Some(&sig), PATH, body), Ok(()));
    }

    #[test]
    fn rejects_tampered_body_and_foreign_secret() {
        let signer = CallbackSigner::new("shared").unwrap();
        let sig = signer.sign(PATH, b"original");
        assert_eq!(signer.verify(Some(&sig), PATH, b"tampered"), Err(SignatureError::Mismatch));

        let other = CallbackSigner::new("other").unwrap();
        assert_eq!(other.verify(Some(&sig), PATH, b"original"), Err(SignatureError::Mismatch));
    }

    #[test]
    fn signature_is_bound_to_the_job_path() {
        let signer = CallbackSigner::new("shared").unwrap();
        let body = br#"{"status":"failed","error":{"code":"ANALYSIS_ERROR"}}"#;
        let sig = signer.sign(PATH, body);
        assert_eq!(
            signer.verify(Some(&sig), "/callbacks/jobs/0192b6f0-0000-7000-8000-000000000002", body),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn rejects_missing_or_malformed_headers() {
        let signer = CallbackSigner::new("shared").unwrap();
        assert_eq!(signer.verify(None, PATH, b"x"), Err(SignatureError::Missing));
        assert_eq!(signer.verify(Some("md5=abc"), PATH, b"x"), Err(SignatureError::Malformed));
        assert_eq!(signer.verify(Some("sha256=zz"), PATH, b"x"), Err(SignatureError::Malformed));
    }

    #[test]
    fn empty_secret_is_rejected() {
        assert_eq!(CallbackSigner::new("").unwrap_err(), SignatureError::EmptySecret);
    }
}
