use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Message returned alongside every successful verification.
pub const AUTH_SUCCESS_MESSAGE: &str = "Authentication successful";

/// Response body for `GET /challenge`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeResponse {
    pub nonce: String,
}

/// Request body for `POST /verify`.
///
/// Fields are optional so that a missing field is reported as a malformed
/// request rather than a JSON deserialization failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerifyRequest {
    /// Claimed signer address (0x-prefixed hex)
    pub address: Option<String>,
    /// Signed message text, exactly as the wallet signed it
    pub message: Option<String>,
    /// Hex-encoded signature (EOA, ERC-1271 or ERC-6492 wrapped)
    pub signature: Option<String>,
}

impl VerifyRequest {
    /// Returns `(address, message, signature)` when all three fields are present
    /// and non-empty.
    pub fn fields(&self) -> Option<(&str, &str, &str)> {
        let address = self.address.as_deref().filter(|s| !s.is_empty())?;
        let message = self.message.as_deref().filter(|s| !s.is_empty())?;
        let signature = self.signature.as_deref().filter(|s| !s.is_empty())?;
        Some((address, message, signature))
    }
}

/// Outcome of a successful verification, as returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    pub success: bool,
    pub address: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl VerificationResult {
    pub fn authenticated(address: impl Into<String>) -> Self {
        Self {
            success: true,
            address: address.into(),
            message: AUTH_SUCCESS_MESSAGE.to_string(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_requires_all_non_empty() {
        let req = VerifyRequest {
            address: Some("0xabc".into()),
            message: Some("hello".into()),
            signature: Some("0x00".into()),
        };
        assert_eq!(req.fields(), Some(("0xabc", "hello", "0x00")));

        let missing = VerifyRequest {
            signature: None,
            ..req.clone()
        };
        assert!(missing.fields().is_none());

        let empty = VerifyRequest {
            message: Some(String::new()),
            ..req
        };
        assert!(empty.fields().is_none());
    }

    #[test]
    fn test_result_serializes_iso_timestamp() {
        let result = VerificationResult::authenticated("0xabc");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["message"], AUTH_SUCCESS_MESSAGE);
        let ts = json["timestamp"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(ts).is_ok());
    }
}
