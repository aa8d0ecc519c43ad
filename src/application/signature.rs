use crate::error::{EscrowError, Result};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_PREFIX: &str = "sha256=";

/// Authenticates raw webhook bytes before anything parses them.
///
/// Injected into the processor so tests and alternate providers can swap
/// the scheme without touching global state.
pub trait WebhookVerifier: Send + Sync {
    /// `Ok(false)` for a wrong or malformed signature, `Err` only for
    /// operator faults such as a missing secret.
    fn verify(&self, payload: &[u8], signature: &str) -> Result<bool>;
}

/// Hex-encoded HMAC-SHA256 over the exact request body.
pub struct HmacSha256Verifier {
    secret: Option<SecretString>,
}

impl HmacSha256Verifier {
    pub fn new(secret: Option<SecretString>) -> Self {
        Self { secret }
    }

    fn key(&self) -> Result<&str> {
        match &self.secret {
            Some(secret) if !secret.expose_secret().trim().is_empty() => {
                Ok(secret.expose_secret())
            }
            _ => Err(EscrowError::Configuration(
                "webhook signing secret is not configured".to_string(),
            )),
        }
    }
}

impl WebhookVerifier for HmacSha256Verifier {
    fn verify(&self, payload: &[u8], signature: &str) -> Result<bool> {
        let key = self.key()?;

        let normalized = signature.trim().to_ascii_lowercase();
        let provided = normalized
            .strip_prefix(SIGNATURE_PREFIX)
            .unwrap_or(&normalized);

        let Ok(provided) = hex::decode(provided) else {
            return Ok(false);
        };
        let expected = compute_signature(key.as_bytes(), payload)?;

        // ct_eq on slices of different lengths is false, not a panic
        Ok(expected.ct_eq(&provided).into())
    }
}

fn compute_signature(key: &[u8], payload: &[u8]) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| EscrowError::InternalError(Box::new(std::io::Error::other(e.to_string()))))?;
    mac.update(payload);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Hex signature a provider would send for `payload`.
pub fn sign(secret: &SecretString, payload: &[u8]) -> Result<String> {
    compute_signature(secret.expose_secret().as_bytes(), payload).map(hex::encode)
}
