//! Decoded UMA invoices.
//!
//! An UMA invoice is a receiver-signed request for payment that can be handed
//! to a sender out of band (QR code, link, or pushed to the sender's VASP).
//! The bech32 `uma1...` text form is encoded and decoded by the sender crate;
//! this module only holds the decoded fields.

use serde::{Deserialize, Serialize};

use crate::address::UMA_ADDRESS_PREFIX;
use crate::payer::{CounterPartyDataOptions, KycStatus};
use crate::timestamp::UnixTimestamp;

/// Human-readable prefix of bech32 encoded UMA invoices.
pub const UMA_INVOICE_HRP: &str = "uma";

/// Currency an invoice is denominated in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceCurrency {
    pub code: String,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UmaInvoice {
    pub receiver_uma: String,
    #[serde(rename = "invoiceUUID")]
    pub invoice_uuid: String,
    /// Smallest unit of [`Self::receiving_currency`].
    pub amount: u64,
    pub receiving_currency: InvoiceCurrency,
    pub expiration: UnixTimestamp,
    pub is_subject_to_travel_rule: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_payer_data: Option<CounterPartyDataOptions>,
    /// Comma separated list such as `"1.0,0.3"`.
    pub uma_versions: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment_chars_allowed: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_uma: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice_limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kyc_status: Option<KycStatus>,
    pub callback: String,
    /// Raw signature bytes over the invoice encoding without this field.
    #[serde(skip)]
    pub signature: Option<Vec<u8>>,
}

impl UmaInvoice {
    /// Domain of the receiving VASP, taken from [`Self::receiver_uma`].
    pub fn receiver_domain(&self) -> Option<&str> {
        self.receiver_uma
            .split_once('@')
            .map(|(_, domain)| domain)
            .filter(|domain| !domain.is_empty())
    }

    pub fn is_expired_at(&self, now: UnixTimestamp) -> bool {
        self.expiration < now
    }

    /// The receiver address with the `$` prefix UMA addresses always carry.
    pub fn receiver_address(&self) -> String {
        if self.receiver_uma.starts_with(UMA_ADDRESS_PREFIX) {
            self.receiver_uma.clone()
        } else {
            format!("{UMA_ADDRESS_PREFIX}{}", self.receiver_uma)
        }
    }
}
