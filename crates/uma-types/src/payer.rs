//! Payer and payee data exchanged during a pay request.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::timestamp::UnixTimestamp;

pub const IDENTIFIER_FIELD: &str = "identifier";
pub const NAME_FIELD: &str = "name";
pub const EMAIL_FIELD: &str = "email";
pub const COMPLIANCE_FIELD: &str = "compliance";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KycStatus {
    #[default]
    Unknown,
    NotVerified,
    Pending,
    Verified,
}

impl KycStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            KycStatus::Unknown => "UNKNOWN",
            KycStatus::NotVerified => "NOT_VERIFIED",
            KycStatus::Pending => "PENDING",
            KycStatus::Verified => "VERIFIED",
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown KYC status: {0}")]
pub struct UnknownKycStatus(pub String);

impl std::str::FromStr for KycStatus {
    type Err = UnknownKycStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UNKNOWN" => Ok(KycStatus::Unknown),
            "NOT_VERIFIED" => Ok(KycStatus::NotVerified),
            "PENDING" => Ok(KycStatus::Pending),
            "VERIFIED" => Ok(KycStatus::Verified),
            other => Err(UnknownKycStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CounterPartyDataOption {
    pub mandatory: bool,
}

/// Fields a counterparty asks for, keyed by field name (`identifier`, `name`, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(transparent)]
pub struct CounterPartyDataOptions(pub BTreeMap<String, CounterPartyDataOption>);

impl CounterPartyDataOptions {
    /// Whether the counterparty listed the field at all, mandatory or not.
    pub fn requests(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn is_mandatory(&self, field: &str) -> bool {
        self.0.get(field).map(|o| o.mandatory).unwrap_or(false)
    }

    pub fn with(mut self, field: &str, mandatory: bool) -> Self {
        self.0
            .insert(field.to_string(), CounterPartyDataOption { mandatory });
        self
    }

    /// Payee fields a sender asks for: optional name and email.
    pub fn optional_name_and_email() -> Self {
        Self::default()
            .with(NAME_FIELD, false)
            .with(EMAIL_FIELD, false)
    }
}

/// Payer data attached to a pay request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PayerData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compliance: Option<CompliancePayerData>,
}

impl PayerData {
    pub fn is_empty(&self) -> bool {
        self.identifier.is_none()
            && self.name.is_none()
            && self.email.is_none()
            && self.compliance.is_none()
    }
}

/// Signed compliance section of the payer data.
///
/// The signature covers `identifier|signatureNonce|signatureTimestamp`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompliancePayerData {
    #[serde(default)]
    pub utxos: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_pub_key: Option<String>,
    pub kyc_status: KycStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_travel_rule_info: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub travel_rule_format: Option<String>,
    pub signature: String,
    pub signature_nonce: String,
    pub signature_timestamp: UnixTimestamp,
    #[serde(default)]
    pub utxo_callback: String,
}
