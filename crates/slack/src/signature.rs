//! Request signing for inbound Slack webhooks and the internal deferred-work hop.
//!
//! Both schemes compute `{version}=hex(HMAC-SHA256(secret, "{version}:{timestamp}:{body}"))`.
//! Slack uses version `v0`; the deferred hop uses its own version so a captured
//! Slack request can never be replayed against `/slack/lazy`.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const SLACK_SIGNATURE_HEADER: &str = "x-slack-signature";
pub const SLACK_TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";
pub const SLACK_RETRY_NUM_HEADER: &str = "x-slack-retry-num";
pub const LAZY_SIGNATURE_HEADER: &str = "x-eli5-lazy-signature";
pub const LAZY_TIMESTAMP_HEADER: &str = "x-eli5-lazy-timestamp";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignatureScheme {
    Slack,
    Lazy,
}

impl SignatureScheme {
    fn version(&self) -> &'static str {
        match self {
            Self::Slack => "v0",
            Self::Lazy => "eli5-lazy-v1",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing request timestamp header")]
    MissingTimestamp,
    #[error("missing request signature header")]
    MissingSignature,
    #[error("request timestamp `{0}` is not a unix timestamp")]
    InvalidTimestamp(String),
    #[error("request timestamp is {skew_secs}s away from now")]
    StaleTimestamp { skew_secs: i64 },
    #[error("request signature is malformed")]
    MalformedSignature,
    #[error("request signature does not match")]
    Mismatch,
    #[error("signing secret cannot key an hmac")]
    InvalidKey,
}

#[derive(Clone)]
pub struct SignatureVerifier {
    secret: SecretString,
    tolerance_secs: i64,
    scheme: SignatureScheme,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("tolerance_secs", &self.tolerance_secs)
            .field("scheme", &self.scheme)
            .finish_non_exhaustive()
    }
}

impl SignatureVerifier {
    pub fn new(secret: SecretString, tolerance_secs: u64, scheme: SignatureScheme) -> Self {
        Self { secret, tolerance_secs: i64::try_from(tolerance_secs).unwrap_or(i64::MAX), scheme }
    }

    pub fn slack(secret: SecretString, tolerance_secs: u64) -> Self {
        Self::new(secret, tolerance_secs, SignatureScheme::Slack)
    }

    pub fn lazy(secret: SecretString, tolerance_secs: u64) -> Self {
        Self::new(secret, tolerance_secs, SignatureScheme::Lazy)
    }

    pub fn verify(
        &self,
        timestamp: Option<&str>,
        signature: Option<&str>,
        body: &[u8],
    ) -> Result<(), SignatureError> {
        self.verify_at(timestamp, signature, body, chrono::Utc::now().timestamp())
    }

    pub fn verify_at(
        &self,
        timestamp: Option<&str>,
        signature: Option<&str>,
        body: &[u8],
        now: i64,
    ) -> Result<(), SignatureError> {
        let timestamp = timestamp.map(str::trim).ok_or(SignatureError::MissingTimestamp)?;
        let signature = signature.map(str::trim).ok_or(SignatureError::MissingSignature)?;

        let issued_at = timestamp
            .parse::<i64>()
            .map_err(|_| SignatureError::InvalidTimestamp(timestamp.to_owned()))?;
        let skew_secs = now.saturating_sub(issued_at);
        if skew_secs.abs() > self.tolerance_secs {
            return Err(SignatureError::StaleTimestamp { skew_secs });
        }

        let prefix = format!("{}=", self.scheme.version());
        let provided = signature
            .strip_prefix(&prefix)
            .and_then(|hex_digest| hex::decode(hex_digest).ok())
            .ok_or(SignatureError::MalformedSignature)?;

        self.mac(timestamp, body)?.verify_slice(&provided).map_err(|_| SignatureError::Mismatch)
    }

    /// Header value for `body` sent at `timestamp`.
    pub fn sign(&self, timestamp: i64, body: &[u8]) -> Result<String, SignatureError> {
        let digest = self.mac(&timestamp.to_string(), body)?.finalize().into_bytes();
        Ok(format!("{}={}", self.scheme.version(), hex::encode(digest)))
    }

    fn mac(&self, timestamp: &str, body: &[u8]) -> Result<HmacSha256, SignatureError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|_| SignatureError::InvalidKey)?;
        mac.update(self.scheme.version().as_bytes());
        mac.update(b":");
        mac.update(timestamp.as_bytes());
        mac.update(b":");
        mac.update(body);
        Ok(mac)
    }
}

#[cfg(test)]
mod tests {
    use super::{SignatureError, SignatureVerifier};

    const NOW: i64 = 1_531_420_618;

    fn verifier() -> SignatureVerifier {
        SignatureVerifier::slack("8f742231b10e8888abcd99yyyzzz85a5".to_owned().into(), 300)
    }

    #[test]
    fn accepts_slack_documented_example() {
        let body = b"token=xyzz0WbapA4vBCDEFasx0q6G&team_id=T1DC2JH3J&team_domain=testteamnow&channel_id=G8PSS9T3V&channel_name=foobar&user_id=U2CERLKJA&user_name=roadrunner&command=%2Fwebhook-collect&text=&response_url=https%3A%2F%2Fhooks.slack.com%2Fcommands%2FT1DC2JH3J%2F397700885554%2F96rGlfmibIGlgcZRskXaIFfN&trigger_id=398738663015.47445629121.803a0bc887a14d10d2c447fce8b6703c";
        let result = verifier().verify_at(
            Some("1531420618"),
            Some("v0=a2114d57b48eac39b9ad189dd8316235a7b4a8d21a10bd27519666489c69b503"),
            body,
            NOW,
        );

        assert_eq!(result, Ok(()));
    }

    #[test]
    fn sign_then_verify_and_reject_tampered_body() {
        let verifier = verifier();
        let signature = verifier.sign(NOW, b"payload=%7B%7D").expect("sign");

        assert!(signature.starts_with("v0="));
        assert_eq!(
            verifier.verify_at(Some("1531420618"), Some(&signature), b"payload=%7B%7D", NOW),
            Ok(())
        );
        assert_eq!(
            verifier.verify_at(Some("1531420618"), Some(&signature), b"payload=%7B1%7D", NOW),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn rejects_stale_and_future_timestamps() {
        let verifier = verifier();
        let signature = verifier.sign(NOW - 301, b"{}").expect("sign");
        let stale = verifier.verify_at(Some(&(NOW - 301).to_string()), Some(&signature), b"{}", NOW);
        assert_eq!(stale, Err(SignatureError::StaleTimestamp { skew_secs: 301 }));

        let signature = verifier.sign(NOW + 400, b"{}").expect("sign");
        let future = verifier.verify_at(Some(&(NOW + 400).to_string()), Some(&signature), b"{}", NOW);
        assert_eq!(future, Err(SignatureError::StaleTimestamp { skew_secs: -400 }));
    }

    #[test]
    fn rejects_missing_and_malformed_headers() {
        let verifier = verifier();
        assert_eq!(
            verifier.verify_at(None, Some("v0=00"), b"{}", NOW),
            Err(SignatureError::MissingTimestamp)
        );
        assert_eq!(
            verifier.verify_at(Some("1531420618"), None, b"{}", NOW),
            Err(SignatureError::MissingSignature)
        );
        assert_eq!(
            verifier.verify_at(Some("1531420618"), Some("v1=abcd"), b"{}", NOW),
            Err(SignatureError::MalformedSignature)
        );
        assert_eq!(
            verifier.verify_at(Some("yesterday"), Some("v0=abcd"), b"{}", NOW),
            Err(SignatureError::InvalidTimestamp("yesterday".to_owned()))
        );
    }

    #[test]
    fn lazy_signature_is_not_interchangeable_with_slack_signature() {
        let secret = "shared-secret".to_owned();
        let slack = SignatureVerifier::slack(secret.clone().into(), 300);
        let lazy = SignatureVerifier::lazy(secret.into(), 300);

        let slack_signature = slack.sign(NOW, b"{}").expect("sign");
        let lazy_signature = lazy.sign(NOW, b"{}").expect("sign");

        assert_eq!(lazy.verify_at(Some("1531420618"), Some(&lazy_signature), b"{}", NOW), Ok(()));
        assert_eq!(
            lazy.verify_at(Some("1531420618"), Some(&slack_signature), b"{}", NOW),
            Err(SignatureError::MalformedSignature)
        );
    }
}
