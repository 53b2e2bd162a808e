//! Webhook signature verification (HMAC-SHA256).
//!
//! GitHub signs every delivery with the app's webhook secret and sends the
//! result in `X-Hub-Signature-256` as `sha256=<hex>`. Deliveries are verified
//! before their payload is parsed.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_PREFIX: &str = "sha256=";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("missing signature header")]
    Missing,

    /// Not `sha256=` followed by hex.
    #[error("malformed signature header")]
    Malformed,

    #[error("signature does not match payload")]
    Mismatch,
}

/// Decodes a `sha256=<hex>` header into the raw MAC bytes.
///
/// # Examples
///
/// ```
/// use backport_bot::webhooks::parse_signature_header;
///
/// assert_eq!(parse_signature_header("sha256=12ab"), Some(vec![0x12, 0xab]));
/// assert!(parse_signature_header("sha1=12ab").is_none());
/// assert!(parse_signature_header("sha256=xyz").is_none());
/// ```
pub fn parse_signature_header(header: &str) -> Option<Vec<u8>> {
    hex::decode(header.trim().strip_prefix(SIGNATURE_PREFIX)?).ok()
}

/// Checks deliveries against the webhook secret.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: SecretString,
}

impl SignatureVerifier {
    pub fn new(secret: SecretString) -> Self {
        SignatureVerifier { secret }
    }

    fn mac(&self) -> HmacSha256 {
        // HMAC accepts keys of any length.
        match HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes()) {
            Ok(mac) => mac,
            Err(_) => unreachable!("HMAC accepts keys of any length"),
        }
    }

    /// Verifies `payload` against the `X-Hub-Signature-256` header value.
    ///
    /// The comparison is constant-time.
    pub fn verify(&self, payload: &[u8], header: Option<&str>) -> Result<(), SignatureError> {
        let header = header.ok_or(SignatureError::Missing)?;
        let expected = parse_signature_header(header).ok_or(SignatureError::Malformed)?;

        let mut mac = self.mac();
        mac.update(payload);
        mac.verify_slice(&expected)
            .map_err(|_| SignatureError::Mismatch)
    }

    /// Signs `payload` the way GitHub does, as a header value.
    pub fn sign(&self, payload: &[u8]) -> String {
        let mut mac = self.mac();
        mac.update(payload);
        format!("{}{}", SIGNATURE_PREFIX, hex::encode(mac.finalize().into_bytes()))
    }
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier").finish_non_exhaustive()
    }
}
