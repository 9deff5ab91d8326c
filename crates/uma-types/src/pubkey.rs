//! `/.well-known/lnurlpubkey` responses.

use serde::{Deserialize, Serialize};

use crate::timestamp::UnixTimestamp;

/// Public keys a VASP publishes for signature verification and travel-rule encryption.
///
/// Keys are hex-encoded compressed secp256k1 points.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PubKeyResponse {
    pub signing_pub_key: String,
    pub encryption_pub_key: String,
    /// After this moment the keys must be fetched again.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_timestamp: Option<UnixTimestamp>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiration_is_optional() {
        let response: PubKeyResponse =
            serde_json::from_str(r#"{"signingPubKey":"02aa","encryptionPubKey":"03bb"}"#).unwrap();
        assert_eq!(response.expiration_timestamp, None);
        let json = serde_json::to_string(&response).unwrap();
        assert!(!json.contains("expirationTimestamp"));
    }
}
