//! Authentication: credentials and login frame signing.
//!
//! ## Signature
//!
//! ```text
//! payload   = timestamp + separator + account_tag + separator + label
//! signature = encode(HMAC-SHA256(secret, payload))
//! ```
//!
//! The separator, label, timestamp unit and output encoding vary between
//! venues and are carried by [`LoginScheme`]. A missing account tag signs as
//! the empty string. The secret is never logged or exposed after construction.

use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};

use crate::error::AuthError;
use crate::ws::MessageOut;

type HmacSha256 = Hmac<sha2::Sha256>;

// ─── Credentials ─────────────────────────────────────────────────────────────

/// API credentials for the private feeds.
#[derive(Clone)]
pub struct Credentials {
    api_key: String,
    secret: String,
    account_tag: Option<String>,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            secret: secret.into(),
            account_tag: None,
        }
    }

    /// Sub-account or passphrase tag mixed into the signature.
    pub fn with_account_tag(mut self, tag: impl Into<String>) -> Self {
        self.account_tag = Some(tag.into());
        self
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn account_tag(&self) -> Option<&str> {
        self.account_tag.as_deref()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("secret", &"<redacted>")
            .field("account_tag", &self.account_tag)
            .finish()
    }
}

// ─── LoginScheme ─────────────────────────────────────────────────────────────

/// Output encoding of the signature bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SignatureEncoding {
    #[default]
    Hex,
    Base64,
}

/// Resolution of the login timestamp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TimestampUnit {
    #[default]
    Seconds,
    Millis,
}

/// Venue-specific parts of the signed login payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginScheme {
    pub separator: String,
    pub label: String,
    pub encoding: SignatureEncoding,
    pub timestamp_unit: TimestampUnit,
}

impl Default for LoginScheme {
    fn default() -> Self {
        Self {
            separator: "|".to_string(),
            label: "login".to_string(),
            encoding: SignatureEncoding::Hex,
            timestamp_unit: TimestampUnit::Seconds,
        }
    }
}

impl LoginScheme {
    /// Current time in the scheme's unit, as the decimal string that is signed.
    pub fn timestamp_now(&self) -> String {
        let now = Utc::now();
        match self.timestamp_unit {
            TimestampUnit::Seconds => now.timestamp().to_string(),
            TimestampUnit::Millis => now.timestamp_millis().to_string(),
        }
    }

    /// The exact string fed to the keyed hash.
    pub fn payload(&self, timestamp: &str, account_tag: Option<&str>) -> String {
        format!(
            "{}{}{}{}{}",
            timestamp,
            self.separator,
            account_tag.unwrap_or(""),
            self.separator,
            self.label
        )
    }

    /// Sign `payload` with `secret`.
    pub fn sign(&self, secret: &str, payload: &str) -> Result<String, AuthError> {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| AuthError::Signing(e.to_string()))?;
        mac.update(payload.as_bytes());
        let bytes = mac.finalize().into_bytes();
        Ok(match self.encoding {
            SignatureEncoding::Hex => hex::encode(bytes),
            SignatureEncoding::Base64 => base64::engine::general_purpose::STANDARD.encode(bytes),
        })
    }

    /// Build the login frame for `credentials` at `timestamp`.
    pub fn login_frame(
        &self,
        credentials: &Credentials,
        timestamp: String,
    ) -> Result<MessageOut, AuthError> {
        let payload = self.payload(&timestamp, credentials.account_tag());
        let signature = self.sign(&credentials.secret, &payload)?;
        Ok(MessageOut::Login(
            credentials.api_key.clone(),
            timestamp,
            signature,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_layout() {
        let scheme = LoginScheme::default();
        assert_eq!(scheme.payload("1700000000", Some("sub-1")), "1700000000|sub-1|login");
        assert_eq!(scheme.payload("1700000000", None), "1700000000||login");
    }

    #[test]
    fn test_sign_known_vector() {
        // RFC 4231 test case 2.
        let scheme = LoginScheme::default();
        let sig = scheme.sign("Jefe", "what do ya want for nothing?").unwrap();
        assert_eq!(
            sig,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_sign_base64() {
        let scheme = LoginScheme {
            encoding: SignatureEncoding::Base64,
            ..Default::default()
        };
        let sig = scheme.sign("Jefe", "what do ya want for nothing?").unwrap();
        assert_eq!(sig, "W9zBRr9gdU5qBCQmCJV1x1oAPwidJzmDnexYuWTsOEM=");
    }

    #[test]
    fn test_login_frame_shape() {
        let scheme = LoginScheme::default();
        let creds = Credentials::new("key-1", "secret").with_account_tag("main");
        let frame = scheme.login_frame(&creds, "1700000000".to_string()).unwrap();
        let json: serde_json::Value = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["op"], "login");
        assert_eq!(json["args"][0], "key-1");
        assert_eq!(json["args"][1], "1700000000");
        let expected = scheme.sign("secret", "1700000000|main|login").unwrap();
        assert_eq!(json["args"][2], expected);
    }

    #[test]
    fn test_timestamp_units() {
        let secs = LoginScheme::default().timestamp_now();
        let millis = LoginScheme {
            timestamp_unit: TimestampUnit::Millis,
            ..Default::default()
        }
        .timestamp_now();
        assert_eq!(secs.len() + 3, millis.len());

        let secs: i64 = secs.parse().unwrap();
        let millis: i64 = millis.parse().unwrap();
        assert!((millis / 1000 - secs).abs() <= 1);
        assert!(secs > 1_700_000_000);
    }

    #[test]
    fn test_credentials_debug_redacts_secret() {
        let creds = Credentials::new("key-1", "hunter2");
        let dbg = format!("{:?}", creds);
        assert!(dbg.contains("key-1"));
        assert!(!dbg.contains("hunter2"));
    }
}
