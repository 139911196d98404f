use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_LEN: usize = 32;

/// Signed token body. Field order is the canonical key order.
#[derive(Serialize, Deserialize)]
struct AssetClaims {
    exp: i64,
    loc: String,
}

/// Stateless signer for time-limited asset references.
///
/// A token is `base64url(claims_json || hmac_sha256(claims_json))`. Nothing is
/// recorded on issue; revocation is only by secret rotation or expiry.
pub struct AssetSigner {
    secret: Vec<u8>,
}

impl AssetSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    /// Sign `location` for `ttl` from now.
    pub fn sign(&self, location: &str, ttl: Duration) -> Result<String, SigningError> {
        let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        self.sign_until(location, Utc::now().timestamp().saturating_add(ttl_secs))
    }

    /// Sign `location` with an absolute expiry in unix seconds.
    pub fn sign_until(&self, location: &str, expires_at: i64) -> Result<String, SigningError> {
        let claims = AssetClaims {
            exp: expires_at,
            loc: location.to_string(),
        };
        let mut token = serde_json::to_vec(&claims).map_err(SigningError::Encode)?;

        let mut mac = self.mac();
        mac.update(&token);
        token.extend_from_slice(&mac.finalize().into_bytes());

        Ok(URL_SAFE_NO_PAD.encode(token))
    }

    /// Verify a token and return the location it stands for.
    pub fn verify(&self, token: &str) -> Result<String, SigningError> {
        self.verify_at(token, Utc::now().timestamp())
    }

    pub fn verify_at(&self, token: &str, now: i64) -> Result<String, SigningError> {
        let raw = URL_SAFE_NO_PAD
            .decode(token.as_bytes())
            .map_err(|_| SigningError::InvalidSignature)?;
        if raw.len() <= SIGNATURE_LEN {
            return Err(SigningError::InvalidSignature);
        }

        let (body, signature) = raw.split_at(raw.len() - SIGNATURE_LEN);
        let mut mac = self.mac();
        mac.update(body);
        mac.verify_slice(signature)
            .map_err(|_| SigningError::InvalidSignature)?;

        let claims: AssetClaims =
            serde_json::from_slice(body).map_err(|_| SigningError::InvalidSignature)?;
        if now > claims.exp {
            return Err(SigningError::Expired);
        }

        Ok(claims.loc)
    }

    fn mac(&self) -> HmacSha256 {
        HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key length")
    }
}

/// Hex HMAC-SHA256 of a webhook body.
pub fn sign_webhook(secret: &[u8], body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Check a hex webhook signature over the exact request body.
pub fn verify_webhook(secret: &[u8], body: &[u8], signature: &str) -> Result<(), SigningError> {
    let expected = hex::decode(signature.trim()).map_err(|_| SigningError::InvalidSignature)?;
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| SigningError::InvalidSignature)
}

#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("token expired")]
    Expired,

    #[error("failed to encode token claims: {0}")]
    Encode(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOCATION: &str = "/srv/data/uploads/job/reference_video.mp4";

    #[test]
    fn test_round_trip() {
        let signer = AssetSigner::new("secret");
        let token = signer.sign(LOCATION, Duration::from_secs(60)).unwrap();
        assert_eq!(signer.verify(&token).unwrap(), LOCATION);
    }

    #[test]
    fn test_expired() {
        let signer = AssetSigner::new("secret");
        let now = Utc::now().timestamp();
        let token = signer.sign_until(LOCATION, now).unwrap();

        // Still valid at the expiry instant itself
        assert_eq!(signer.verify_at(&token, now).unwrap(), LOCATION);
        assert!(matches!(
            signer.verify_at(&token, now + 1),
            Err(SigningError::Expired)
        ));
    }

    #[test]
    fn test_every_single_bit_mutation_is_rejected() {
        let signer = AssetSigner::new("secret");
        let token = signer.sign(LOCATION, Duration::from_secs(600)).unwrap();
        let bytes = token.as_bytes();

        for index in 0..bytes.len() {
            for bit in 0..8 {
                let mut mutated = bytes.to_vec();
                mutated[index] ^= 1 << bit;
                let mutated = String::from_utf8_lossy(&mutated).into_owned();
                assert!(
                    matches!(
                        signer.verify(&mutated),
                        Err(SigningError::InvalidSignature)
                    ),
                    "mutation at byte {index} bit {bit} was accepted"
                );
            }
        }
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = AssetSigner::new("secret")
            .sign(LOCATION, Duration::from_secs(60))
            .unwrap();
        assert!(matches!(
            AssetSigner::new("rotated").verify(&token),
            Err(SigningError::InvalidSignature)
        ));
    }

    #[test]
    fn test_invalid_format() {
        let signer = AssetSigner::new("secret");
        assert!(matches!(
            signer.verify("not-a-valid-token"),
            Err(SigningError::InvalidSignature)
        ));
        assert!(matches!(signer.verify(""), Err(SigningError::InvalidSignature)));
    }

    #[test]
    fn test_webhook_signature() {
        let body = br#"{"job_id":"x","status":"completed"}"#;
        let signature = sign_webhook(b"cb-secret", body);
        assert_eq!(signature.len(), 64);

        assert!(verify_webhook(b"cb-secret", body, &signature).is_ok());
        assert!(verify_webhook(b"cb-secret", b"{}", &signature).is_err());
        assert!(verify_webhook(b"other", body, &signature).is_err());
        assert!(verify_webhook(b"cb-secret", body, "zz").is_err());
    }
}
