//! Discovery responses returned by `/.well-known/lnurlp/{user}`.
//!
//! A plain LNURL-pay service and an UMA VASP answer the same endpoint. Which
//! of the two we are talking to is decided once, here, at parse time and kept
//! as [`LnurlpProtocol`] so later steps branch on a tag instead of probing
//! optional fields again.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::currency::Currency;
use crate::payer::{CounterPartyDataOptions, KycStatus};
use crate::timestamp::UnixTimestamp;
use crate::version::{UmaVersion, UmaVersionError};

const PAY_REQUEST_TAG: &str = "payRequest";

/// Signed compliance block of an UMA discovery response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LnurlComplianceResponse {
    pub kyc_status: KycStatus,
    pub signature: String,
    pub signature_nonce: String,
    pub signature_timestamp: UnixTimestamp,
    #[serde(default)]
    pub is_subject_to_travel_rule: bool,
    pub receiver_identifier: String,
}

impl LnurlComplianceResponse {
    /// Payload covered by [`Self::signature`]: `receiverIdentifier|nonce|timestamp`.
    pub fn signable_payload(&self) -> String {
        format!(
            "{}|{}|{}",
            self.receiver_identifier, self.signature_nonce, self.signature_timestamp
        )
    }
}

/// Which flavour of LNURL-pay the counterparty speaks.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum LnurlpProtocol {
    ProtocolAware {
        compliance: LnurlComplianceResponse,
        uma_version: UmaVersion,
    },
    PlainLnurl,
}

/// A parsed discovery response.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryResponse {
    pub callback: Url,
    /// Millisatoshis.
    pub min_sendable: u64,
    /// Millisatoshis.
    pub max_sendable: u64,
    pub metadata: String,
    pub currencies: Vec<Currency>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_payer_data: Option<CounterPartyDataOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment_allowed: Option<u32>,
    pub protocol: LnurlpProtocol,
}

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryParseError {
    #[error("Malformed lnurlp response: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unexpected lnurlp tag: {0}")]
    UnexpectedTag(String),
    #[error("Invalid lnurlp callback: {0}")]
    InvalidCallback(#[from] url::ParseError),
    #[error("Invalid UMA version in lnurlp response: {0}")]
    InvalidVersion(#[from] UmaVersionError),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LnurlpResponseWire {
    #[serde(default)]
    tag: Option<String>,
    callback: String,
    min_sendable: u64,
    max_sendable: u64,
    #[serde(default)]
    metadata: String,
    #[serde(default)]
    currencies: Option<Vec<Currency>>,
    #[serde(default, alias = "requiredPayerData")]
    payer_data: Option<CounterPartyDataOptions>,
    #[serde(default)]
    compliance: Option<LnurlComplianceResponse>,
    #[serde(default)]
    uma_version: Option<String>,
    #[serde(default)]
    comment_allowed: Option<u32>,
}

impl DiscoveryResponse {
    pub fn from_json(body: &str) -> Result<Self, DiscoveryParseError> {
        let wire: LnurlpResponseWire = serde_json::from_str(body)?;
        if let Some(tag) = wire.tag.as_deref() {
            if tag != PAY_REQUEST_TAG {
                return Err(DiscoveryParseError::UnexpectedTag(tag.to_string()));
            }
        }
        let callback = Url::parse(&wire.callback)?;
        // UMA needs every one of these; anything less is served as plain LNURL.
        let protocol = match (
            wire.compliance,
            wire.uma_version,
            wire.currencies.is_some(),
            wire.payer_data.is_some(),
        ) {
            (Some(compliance), Some(version), true, true) => LnurlpProtocol::ProtocolAware {
                compliance,
                uma_version: version.parse()?,
            },
            _ => LnurlpProtocol::PlainLnurl,
        };
        Ok(DiscoveryResponse {
            callback,
            min_sendable: wire.min_sendable,
            max_sendable: wire.max_sendable,
            metadata: wire.metadata,
            currencies: wire.currencies.unwrap_or_default(),
            required_payer_data: wire.payer_data,
            comment_allowed: wire.comment_allowed,
            protocol,
        })
    }

    pub fn is_protocol_aware(&self) -> bool {
        matches!(self.protocol, LnurlpProtocol::ProtocolAware { .. })
    }

    pub fn compliance(&self) -> Option<&LnurlComplianceResponse> {
        match &self.protocol {
            LnurlpProtocol::ProtocolAware { compliance, .. } => Some(compliance),
            LnurlpProtocol::PlainLnurl => None,
        }
    }

    pub fn uma_version(&self) -> Option<UmaVersion> {
        match &self.protocol {
            LnurlpProtocol::ProtocolAware { uma_version, .. } => Some(*uma_version),
            LnurlpProtocol::PlainLnurl => None,
        }
    }

    /// Receiver KYC status; plain LNURL receivers are never verified.
    pub fn receiver_kyc_status(&self) -> KycStatus {
        self.compliance()
            .map(|c| c.kyc_status)
            .unwrap_or(KycStatus::NotVerified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UMA_BODY: &str = r#"{
        "tag": "payRequest",
        "callback": "https://vasp2.example/api/uma/payreq/bob",
        "minSendable": 1000,
        "maxSendable": 1000000000,
        "metadata": "[[\"text/plain\",\"Pay to bob\"]]",
        "currencies": [{"code":"SAT","name":"Satoshis","symbol":"sat","multiplier":1000,"decimals":0}],
        "payerData": {"identifier":{"mandatory":true},"compliance":{"mandatory":true}},
        "compliance": {
            "kycStatus": "VERIFIED",
            "signature": "abcd",
            "signatureNonce": "123",
            "signatureTimestamp": 1700000000,
            "isSubjectToTravelRule": true,
            "receiverIdentifier": "$bob@vasp2.example"
        },
        "umaVersion": "1.0"
    }"#;

    #[test]
    fn parses_protocol_aware_response() {
        let response = DiscoveryResponse::from_json(UMA_BODY).unwrap();
        assert!(response.is_protocol_aware());
        assert_eq!(response.uma_version(), Some(UmaVersion::V1_0));
        assert_eq!(response.receiver_kyc_status(), KycStatus::Verified);
        assert_eq!(
            response.compliance().unwrap().signable_payload(),
            "$bob@vasp2.example|123|1700000000"
        );
    }

    #[test]
    fn parses_plain_lnurl_response() {
        let body = r#"{"tag":"payRequest","callback":"https://ln.example/cb","minSendable":1000,"maxSendable":2000,"metadata":"[]"}"#;
        let response = DiscoveryResponse::from_json(body).unwrap();
        assert!(!response.is_protocol_aware());
        assert!(response.currencies.is_empty());
        assert_eq!(response.receiver_kyc_status(), KycStatus::NotVerified);
    }

    #[test]
    fn compliance_without_currencies_is_plain_lnurl() {
        let body = r#"{"callback":"https://ln.example/cb","minSendable":1,"maxSendable":2,
            "compliance":{"kycStatus":"VERIFIED","signature":"aa","signatureNonce":"1","signatureTimestamp":1,"receiverIdentifier":"$x@y"},
            "umaVersion":"1.0"}"#;
        let response = DiscoveryResponse::from_json(body).unwrap();
        assert!(!response.is_protocol_aware());
    }

    #[test]
    fn rejects_wrong_tag_and_garbage() {
        let body = r#"{"tag":"withdrawRequest","callback":"https://ln.example/cb","minSendable":1,"maxSendable":2}"#;
        assert!(matches!(
            DiscoveryResponse::from_json(body),
            Err(DiscoveryParseError::UnexpectedTag(_))
        ));
        assert!(matches!(
            DiscoveryResponse::from_json("not json"),
            Err(DiscoveryParseError::Json(_))
        ));
    }
}
