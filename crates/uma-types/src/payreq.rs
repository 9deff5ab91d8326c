//! Pay requests sent to the discovery callback, and the responses carrying the invoice.
//!
//! The request wire form differs between UMA major versions:
//!
//! - v1: `{"convert": "USD", "amount": "1000" | "1000.SAT", "payerData": {...}, "payeeData": {...}, "umaMajorVersion": 1}`
//! - v0: `{"currency": "USD", "amount": 1000, "payerData": {...}}`
//!
//! Responses are tagged [`PayReqProtocol::ProtocolAware`] when they carry UMA
//! compliance and conversion data in either version's layout, and
//! [`PayReqProtocol::PlainLnurl`] otherwise.

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::currency::SAT_CURRENCY_CODE;
use crate::payer::{CounterPartyDataOptions, PayerData};
use crate::timestamp::UnixTimestamp;

/// A pay request to an UMA callback.
#[derive(Debug, Clone, PartialEq)]
pub struct PayRequest {
    pub receiving_currency_code: String,
    /// Smallest unit of the receiving currency, or millisatoshis when
    /// [`Self::is_amount_in_msats`] is set.
    pub amount: u64,
    pub is_amount_in_msats: bool,
    pub payer_data: PayerData,
    pub requested_payee_data: Option<CounterPartyDataOptions>,
    pub uma_major_version: u16,
    pub invoice_uuid: Option<String>,
    pub comment: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PayRequestV1<'a> {
    convert: &'a str,
    amount: String,
    payer_data: &'a PayerData,
    #[serde(skip_serializing_if = "Option::is_none")]
    payee_data: Option<&'a CounterPartyDataOptions>,
    uma_major_version: u16,
    #[serde(rename = "invoiceUUID", skip_serializing_if = "Option::is_none")]
    invoice_uuid: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    comment: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PayRequestV0<'a> {
    currency: &'a str,
    amount: u64,
    payer_data: &'a PayerData,
    #[serde(skip_serializing_if = "Option::is_none")]
    comment: Option<&'a str>,
}

impl Serialize for PayRequest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.uma_major_version == 0 {
            PayRequestV0 {
                currency: &self.receiving_currency_code,
                amount: self.amount,
                payer_data: &self.payer_data,
                comment: self.comment.as_deref(),
            }
            .serialize(serializer)
        } else {
            let amount = if self.is_amount_in_msats {
                format!("{}.{}", self.amount, SAT_CURRENCY_CODE)
            } else {
                self.amount.to_string()
            };
            PayRequestV1 {
                convert: &self.receiving_currency_code,
                amount,
                payer_data: &self.payer_data,
                payee_data: self.requested_payee_data.as_ref(),
                uma_major_version: self.uma_major_version,
                invoice_uuid: self.invoice_uuid.as_deref(),
                comment: self.comment.as_deref(),
            }
            .serialize(serializer)
        }
    }
}

/// Conversion details of a pay response, normalized across versions.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInfo {
    /// Amount in the smallest unit of the receiving currency.
    pub amount: Option<u64>,
    pub currency_code: String,
    pub decimals: u32,
    /// Millisatoshis per smallest unit of the receiving currency.
    pub multiplier: f64,
    pub exchange_fees_msats: u64,
}

/// Compliance data of the receiving VASP in a pay response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PayeeCompliance {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_pub_key: Option<String>,
    #[serde(default)]
    pub utxos: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utxo_callback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_nonce: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_timestamp: Option<UnixTimestamp>,
}

impl PayeeCompliance {
    /// Payload covered by the v1 payee signature: `sender|receiver|nonce|timestamp`.
    ///
    /// `None` when the response is missing the nonce or timestamp.
    pub fn signable_payload(&self, sender_address: &str, receiver_address: &str) -> Option<String> {
        let nonce = self.signature_nonce.as_deref()?;
        let timestamp = self.signature_timestamp?;
        Some(format!(
            "{sender_address}|{receiver_address}|{nonce}|{timestamp}"
        ))
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UmaPayReqResponse {
    pub major_version: u16,
    pub payment_info: PaymentInfo,
    pub compliance: PayeeCompliance,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payee_identifier: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PayReqProtocol {
    ProtocolAware(UmaPayReqResponse),
    PlainLnurl {
        #[serde(skip_serializing_if = "Option::is_none")]
        converted: Option<PaymentInfo>,
    },
}

/// A parsed pay response.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PayReqResponse {
    pub encoded_invoice: String,
    pub routes: Vec<Value>,
    pub protocol: PayReqProtocol,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConvertedWire {
    amount: u64,
    currency_code: String,
    #[serde(default)]
    decimals: u32,
    multiplier: f64,
    #[serde(default)]
    fee: u64,
}

impl From<ConvertedWire> for PaymentInfo {
    fn from(value: ConvertedWire) -> Self {
        PaymentInfo {
            amount: Some(value.amount),
            currency_code: value.currency_code,
            decimals: value.decimals,
            multiplier: value.multiplier,
            exchange_fees_msats: value.fee,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaymentInfoV0Wire {
    #[serde(default)]
    amount: Option<u64>,
    currency_code: String,
    #[serde(default)]
    decimals: u32,
    multiplier: f64,
    #[serde(default)]
    exchange_fees_millisatoshi: u64,
}

impl From<PaymentInfoV0Wire> for PaymentInfo {
    fn from(value: PaymentInfoV0Wire) -> Self {
        PaymentInfo {
            amount: value.amount,
            currency_code: value.currency_code,
            decimals: value.decimals,
            multiplier: value.multiplier,
            exchange_fees_msats: value.exchange_fees_millisatoshi,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PayeeDataWire {
    #[serde(default)]
    identifier: Option<String>,
    #[serde(default)]
    compliance: Option<PayeeCompliance>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PayReqResponseWire {
    pr: String,
    #[serde(default)]
    routes: Vec<Value>,
    #[serde(default)]
    converted: Option<ConvertedWire>,
    #[serde(default)]
    payee_data: Option<PayeeDataWire>,
    #[serde(default)]
    compliance: Option<PayeeCompliance>,
    #[serde(default)]
    payment_info: Option<PaymentInfoV0Wire>,
    #[serde(default)]
    uma_major_version: Option<u16>,
}

impl PayReqResponse {
    pub fn from_json(body: &str) -> Result<Self, serde_json::Error> {
        let wire: PayReqResponseWire = serde_json::from_str(body)?;
        let (payee_identifier, payee_compliance) = match wire.payee_data {
            Some(payee) => (payee.identifier, payee.compliance),
            None => (None, None),
        };
        let protocol = match (payee_compliance, wire.converted, wire.compliance, wire.payment_info) {
            (Some(compliance), Some(converted), _, _) => {
                PayReqProtocol::ProtocolAware(UmaPayReqResponse {
                    major_version: wire.uma_major_version.unwrap_or(1),
                    payment_info: converted.into(),
                    compliance,
                    payee_identifier,
                })
            }
            (_, _, Some(compliance), Some(payment_info)) => {
                PayReqProtocol::ProtocolAware(UmaPayReqResponse {
                    major_version: 0,
                    payment_info: payment_info.into(),
                    compliance,
                    payee_identifier,
                })
            }
            (_, converted, _, _) => PayReqProtocol::PlainLnurl {
                converted: converted.map(PaymentInfo::from),
            },
        };
        Ok(PayReqResponse {
            encoded_invoice: wire.pr,
            routes: wire.routes,
            protocol,
        })
    }

    pub fn protocol_aware(&self) -> Option<&UmaPayReqResponse> {
        match &self.protocol {
            PayReqProtocol::ProtocolAware(uma) => Some(uma),
            PayReqProtocol::PlainLnurl { .. } => None,
        }
    }

    /// Conversion info regardless of flavour, if the counterparty sent any.
    pub fn payment_info(&self) -> Option<&PaymentInfo> {
        match &self.protocol {
            PayReqProtocol::ProtocolAware(uma) => Some(&uma.payment_info),
            PayReqProtocol::PlainLnurl { converted } => converted.as_ref(),
        }
    }
}

/// LNURL error body: `{"status": "ERROR", "reason": "..."}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LnurlErrorResponse {
    pub status: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<Value>,
}

impl LnurlErrorResponse {
    /// Returns the error if `body` is an LNURL error response.
    pub fn from_body(body: &str) -> Option<Self> {
        serde_json::from_str::<LnurlErrorResponse>(body)
            .ok()
            .filter(|e| e.status.eq_ignore_ascii_case("ERROR"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payer::{CompliancePayerData, KycStatus};

    fn payer_data() -> PayerData {
        PayerData {
            identifier: Some("$alice@vasp1.example".to_string()),
            compliance: Some(CompliancePayerData {
                utxos: vec![],
                node_pub_key: None,
                kyc_status: KycStatus::NotVerified,
                encrypted_travel_rule_info: None,
                travel_rule_format: None,
                signature: "sig".to_string(),
                signature_nonce: "1".to_string(),
                signature_timestamp: UnixTimestamp::from_secs(10),
                utxo_callback: String::new(),
            }),
            ..Default::default()
        }
    }

    #[test]
    fn serializes_v1_request_with_msats_amount() {
        let request = PayRequest {
            receiving_currency_code: "USD".to_string(),
            amount: 5000,
            is_amount_in_msats: true,
            payer_data: payer_data(),
            requested_payee_data: Some(CounterPartyDataOptions::optional_name_and_email()),
            uma_major_version: 1,
            invoice_uuid: None,
            comment: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["convert"], "USD");
        assert_eq!(json["amount"], "5000.SAT");
        assert_eq!(json["umaMajorVersion"], 1);
        assert_eq!(json["payeeData"]["name"]["mandatory"], false);
        assert_eq!(json["payerData"]["compliance"]["kycStatus"], "NOT_VERIFIED");
        assert!(json.get("invoiceUUID").is_none());
    }

    #[test]
    fn serializes_v0_request() {
        let request = PayRequest {
            receiving_currency_code: "SAT".to_string(),
            amount: 42,
            is_amount_in_msats: false,
            payer_data: payer_data(),
            requested_payee_data: None,
            uma_major_version: 0,
            invoice_uuid: None,
            comment: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["currency"], "SAT");
        assert_eq!(json["amount"], 42);
        assert!(json.get("convert").is_none());
    }

    #[test]
    fn parses_v1_response() {
        let body = r#"{
            "pr": "lnbc1...",
            "routes": [],
            "converted": {"amount": 500, "currencyCode": "USD", "decimals": 2, "multiplier": 34150, "fee": 2000},
            "payeeData": {
                "identifier": "$bob@vasp2.example",
                "compliance": {"nodePubKey": "02ab", "utxos": [], "signature": "ff", "signatureNonce": "7", "signatureTimestamp": 1700000000}
            },
            "umaMajorVersion": 1
        }"#;
        let response = PayReqResponse::from_json(body).unwrap();
        let uma = response.protocol_aware().unwrap();
        assert_eq!(uma.major_version, 1);
        assert_eq!(uma.payment_info.amount, Some(500));
        assert_eq!(uma.payment_info.exchange_fees_msats, 2000);
        assert_eq!(
            uma.compliance.signable_payload("$alice@a", "$bob@b").as_deref(),
            Some("$alice@a|$bob@b|7|1700000000")
        );
    }

    #[test]
    fn parses_v0_response() {
        let body = r#"{
            "pr": "lnbc1...",
            "routes": [],
            "compliance": {"utxos": ["abc:1"], "utxoCallback": "https://vasp2/cb"},
            "paymentInfo": {"currencyCode": "SAT", "decimals": 0, "multiplier": 1000, "exchangeFeesMillisatoshi": 0}
        }"#;
        let response = PayReqResponse::from_json(body).unwrap();
        let uma = response.protocol_aware().unwrap();
        assert_eq!(uma.major_version, 0);
        assert_eq!(uma.payment_info.amount, None);
        assert_eq!(uma.compliance.utxos, vec!["abc:1".to_string()]);
    }

    #[test]
    fn parses_plain_lnurl_response() {
        let response = PayReqResponse::from_json(r#"{"pr":"lnbc1...","routes":[]}"#).unwrap();
        assert!(response.protocol_aware().is_none());
        assert!(response.payment_info().is_none());
    }

    #[test]
    fn detects_lnurl_error_body() {
        let error = LnurlErrorResponse::from_body(r#"{"status":"ERROR","reason":"amount too low"}"#);
        assert_eq!(error.unwrap().reason.as_deref(), Some("amount too low"));
        assert!(LnurlErrorResponse::from_body(r#"{"status":"OK"}"#).is_none());
        assert!(LnurlErrorResponse::from_body(r#"{"pr":"lnbc"}"#).is_none());
    }
}
