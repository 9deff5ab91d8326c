//! Invoice decoding: BOLT11 Lightning invoices and bech32 UMA invoices.
//!
//! UMA invoices (`uma1...`) are bech32 strings wrapping a flat list of TLV
//! records, one byte of tag and one byte of length each:
//!
//! | tag | field                  | encoding                       |
//! |-----|------------------------|--------------------------------|
//! | 0   | receiverUma            | utf-8                          |
//! | 1   | invoiceUUID            | utf-8                          |
//! | 2   | amount                 | big-endian unsigned            |
//! | 3   | receivingCurrency      | nested TLV (code, name, symbol, decimals) |
//! | 4   | expiration             | big-endian unsigned, seconds   |
//! | 5   | isSubjectToTravelRule  | one byte, 0 or 1               |
//! | 6   | requiredPayerData      | utf-8 `field:1,field:0`        |
//! | 7   | umaVersions            | utf-8 `1.0,0.3`                |
//! | 8   | commentCharsAllowed    | big-endian unsigned            |
//! | 9   | senderUma              | utf-8                          |
//! | 10  | invoiceLimit           | big-endian unsigned            |
//! | 11  | kycStatus              | utf-8 (`VERIFIED`, ...)        |
//! | 12  | callback               | utf-8                          |
//! | 100 | signature              | raw DER                        |
//!
//! The signature covers SHA-256 of the canonical encoding of every other
//! record, written in tag order.

use bech32::{Bech32, Hrp};
use lightning_invoice::Bolt11Invoice;
use secp256k1::PublicKey;
use serde::Serialize;
use std::str::FromStr;

use uma_types::invoice::{InvoiceCurrency, UMA_INVOICE_HRP, UmaInvoice};
use uma_types::payer::{CounterPartyDataOption, CounterPartyDataOptions, KycStatus};
use uma_types::timestamp::UnixTimestamp;

use crate::signing::{self, SignatureError, VaspSigner};

mod tag {
    pub const RECEIVER_UMA: u8 = 0;
    pub const INVOICE_UUID: u8 = 1;
    pub const AMOUNT: u8 = 2;
    pub const RECEIVING_CURRENCY: u8 = 3;
    pub const EXPIRATION: u8 = 4;
    pub const IS_SUBJECT_TO_TRAVEL_RULE: u8 = 5;
    pub const REQUIRED_PAYER_DATA: u8 = 6;
    pub const UMA_VERSIONS: u8 = 7;
    pub const COMMENT_CHARS_ALLOWED: u8 = 8;
    pub const SENDER_UMA: u8 = 9;
    pub const INVOICE_LIMIT: u8 = 10;
    pub const KYC_STATUS: u8 = 11;
    pub const CALLBACK: u8 = 12;
    pub const SIGNATURE: u8 = 100;

    pub const CURRENCY_CODE: u8 = 0;
    pub const CURRENCY_NAME: u8 = 1;
    pub const CURRENCY_SYMBOL: u8 = 2;
    pub const CURRENCY_DECIMALS: u8 = 3;
}

#[derive(Debug, thiserror::Error)]
pub enum InvoiceDecodeError {
    #[error("Invalid BOLT11 invoice: {0}")]
    Bolt11(String),
    #[error("Invalid bech32 encoding: {0}")]
    Bech32(String),
    #[error("Unexpected invoice prefix {0}")]
    UnexpectedHrp(String),
    #[error("Truncated TLV record")]
    Truncated,
    #[error("Value of TLV record {0} does not fit in 255 bytes")]
    FieldTooLong(u8),
    #[error("Missing invoice field {0}")]
    MissingField(&'static str),
    #[error("Invalid invoice field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl ToString) -> InvoiceDecodeError {
    InvoiceDecodeError::InvalidField {
        field,
        reason: reason.to_string(),
    }
}

/// The parts of a BOLT11 invoice the sender needs.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Bolt11Details {
    pub amount_msats: Option<u64>,
    pub payment_hash: String,
    pub payee_pub_key: String,
    pub network: String,
    pub created_at: UnixTimestamp,
    pub expires_at: UnixTimestamp,
}

/// A decoded invoice kept with a settlement entry.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DecodedInvoice {
    Bolt11(Bolt11Details),
    Uma(UmaInvoice),
}

/// Whether `text` looks like a bech32 UMA invoice rather than a handle.
pub fn is_uma_invoice(text: &str) -> bool {
    text.get(..UMA_INVOICE_HRP.len() + 1)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("uma1"))
}

/// Decodes invoice text. Decoding is pure, so the trait is synchronous.
pub trait InvoiceDecoder: Send + Sync {
    fn decode_bolt11(&self, encoded: &str) -> Result<Bolt11Details, InvoiceDecodeError>;

    fn decode_uma_invoice(&self, encoded: &str) -> Result<UmaInvoice, InvoiceDecodeError> {
        decode_uma_invoice(encoded)
    }
}

/// `lightning-invoice` backed decoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultInvoiceDecoder;

impl InvoiceDecoder for DefaultInvoiceDecoder {
    fn decode_bolt11(&self, encoded: &str) -> Result<Bolt11Details, InvoiceDecodeError> {
        let invoice = Bolt11Invoice::from_str(encoded.trim())
            .map_err(|e| InvoiceDecodeError::Bolt11(e.to_string()))?;
        let created_at = invoice.duration_since_epoch().as_secs();
        Ok(Bolt11Details {
            amount_msats: invoice.amount_milli_satoshis(),
            payment_hash: invoice.payment_hash().to_string(),
            payee_pub_key: hex::encode(invoice.get_payee_pub_key().serialize()),
            network: invoice.network().to_string(),
            created_at: UnixTimestamp::from_secs(created_at),
            expires_at: UnixTimestamp::from_secs(created_at + invoice.expiry_time().as_secs()),
        })
    }
}

struct TlvWriter(Vec<u8>);

impl TlvWriter {
    fn bytes(&mut self, tag: u8, value: &[u8]) -> Result<(), InvoiceDecodeError> {
        let len = u8::try_from(value.len()).map_err(|_| InvoiceDecodeError::FieldTooLong(tag))?;
        self.0.push(tag);
        self.0.push(len);
        self.0.extend_from_slice(value);
        Ok(())
    }

    fn str(&mut self, tag: u8, value: &str) -> Result<(), InvoiceDecodeError> {
        self.bytes(tag, value.as_bytes())
    }

    fn uint(&mut self, tag: u8, value: u64) -> Result<(), InvoiceDecodeError> {
        let be = value.to_be_bytes();
        let leading_zeros = be.iter().take_while(|b| **b == 0).count().min(be.len() - 1);
        self.bytes(tag, &be[leading_zeros..])
    }

    fn bool(&mut self, tag: u8, value: bool) -> Result<(), InvoiceDecodeError> {
        self.bytes(tag, &[u8::from(value)])
    }
}

fn read_records(mut bytes: &[u8]) -> Result<Vec<(u8, &[u8])>, InvoiceDecodeError> {
    let mut records = Vec::new();
    while !bytes.is_empty() {
        let [tag, len, rest @ ..] = bytes else {
            return Err(InvoiceDecodeError::Truncated);
        };
        let len = usize::from(*len);
        if rest.len() < len {
            return Err(InvoiceDecodeError::Truncated);
        }
        records.push((*tag, &rest[..len]));
        bytes = &rest[len..];
    }
    Ok(records)
}

fn read_str(field: &'static str, value: &[u8]) -> Result<String, InvoiceDecodeError> {
    String::from_utf8(value.to_vec()).map_err(|e| invalid(field, e))
}

fn read_uint(field: &'static str, value: &[u8]) -> Result<u64, InvoiceDecodeError> {
    if value.is_empty() || value.len() > 8 {
        return Err(invalid(field, format!("{} byte integer", value.len())));
    }
    Ok(value.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
}

fn encode_payer_data(options: &CounterPartyDataOptions) -> String {
    options
        .0
        .iter()
        .map(|(field, option)| format!("{field}:{}", u8::from(option.mandatory)))
        .collect::<Vec<_>>()
        .join(",")
}

fn decode_payer_data(value: &str) -> Result<CounterPartyDataOptions, InvoiceDecodeError> {
    let mut options = CounterPartyDataOptions::default();
    for entry in value.split(',').filter(|e| !e.is_empty()) {
        let (field, mandatory) = entry
            .split_once(':')
            .ok_or_else(|| invalid("requiredPayerData", entry))?;
        let mandatory = match mandatory {
            "1" => true,
            "0" => false,
            other => return Err(invalid("requiredPayerData", other)),
        };
        options
            .0
            .insert(field.to_string(), CounterPartyDataOption { mandatory });
    }
    Ok(options)
}

fn encode_currency(currency: &InvoiceCurrency) -> Result<Vec<u8>, InvoiceDecodeError> {
    let mut writer = TlvWriter(Vec::new());
    writer.str(tag::CURRENCY_CODE, &currency.code)?;
    writer.str(tag::CURRENCY_NAME, &currency.name)?;
    writer.str(tag::CURRENCY_SYMBOL, &currency.symbol)?;
    writer.uint(tag::CURRENCY_DECIMALS, u64::from(currency.decimals))?;
    Ok(writer.0)
}

fn decode_currency(bytes: &[u8]) -> Result<InvoiceCurrency, InvoiceDecodeError> {
    let (mut code, mut name, mut symbol, mut decimals) = (None, None, None, None);
    for (record_tag, value) in read_records(bytes)? {
        match record_tag {
            tag::CURRENCY_CODE => code = Some(read_str("receivingCurrency.code", value)?),
            tag::CURRENCY_NAME => name = Some(read_str("receivingCurrency.name", value)?),
            tag::CURRENCY_SYMBOL => symbol = Some(read_str("receivingCurrency.symbol", value)?),
            tag::CURRENCY_DECIMALS => {
                let raw = read_uint("receivingCurrency.decimals", value)?;
                decimals = Some(
                    u8::try_from(raw).map_err(|e| invalid("receivingCurrency.decimals", e))?,
                );
            }
            _ => {}
        }
    }
    Ok(InvoiceCurrency {
        code: code.ok_or(InvoiceDecodeError::MissingField("receivingCurrency.code"))?,
        name: name.unwrap_or_default(),
        symbol: symbol.unwrap_or_default(),
        decimals: decimals.unwrap_or_default(),
    })
}

/// Canonical TLV bytes of every field except the signature.
pub fn uma_invoice_signable_bytes(invoice: &UmaInvoice) -> Result<Vec<u8>, InvoiceDecodeError> {
    let mut writer = TlvWriter(Vec::new());
    writer.str(tag::RECEIVER_UMA, &invoice.receiver_uma)?;
    writer.str(tag::INVOICE_UUID, &invoice.invoice_uuid)?;
    writer.uint(tag::AMOUNT, invoice.amount)?;
    writer.bytes(tag::RECEIVING_CURRENCY, &encode_currency(&invoice.receiving_currency)?)?;
    writer.uint(tag::EXPIRATION, invoice.expiration.as_secs())?;
    writer.bool(tag::IS_SUBJECT_TO_TRAVEL_RULE, invoice.is_subject_to_travel_rule)?;
    if let Some(required) = &invoice.required_payer_data {
        writer.str(tag::REQUIRED_PAYER_DATA, &encode_payer_data(required))?;
    }
    writer.str(tag::UMA_VERSIONS, &invoice.uma_versions)?;
    if let Some(chars) = invoice.comment_chars_allowed {
        writer.uint(tag::COMMENT_CHARS_ALLOWED, u64::from(chars))?;
    }
    if let Some(sender) = &invoice.sender_uma {
        writer.str(tag::SENDER_UMA, sender)?;
    }
    if let Some(limit) = invoice.invoice_limit {
        writer.uint(tag::INVOICE_LIMIT, limit)?;
    }
    if let Some(kyc_status) = invoice.kyc_status {
        writer.str(tag::KYC_STATUS, kyc_status.as_str())?;
    }
    writer.str(tag::CALLBACK, &invoice.callback)?;
    Ok(writer.0)
}

pub fn encode_uma_invoice(invoice: &UmaInvoice) -> Result<String, InvoiceDecodeError> {
    let mut bytes = uma_invoice_signable_bytes(invoice)?;
    if let Some(signature) = &invoice.signature {
        let mut writer = TlvWriter(bytes);
        writer.bytes(tag::SIGNATURE, signature)?;
        bytes = writer.0;
    }
    let hrp = Hrp::parse(UMA_INVOICE_HRP).map_err(|e| InvoiceDecodeError::Bech32(e.to_string()))?;
    bech32::encode::<Bech32>(hrp, &bytes).map_err(|e| InvoiceDecodeError::Bech32(e.to_string()))
}

pub fn decode_uma_invoice(encoded: &str) -> Result<UmaInvoice, InvoiceDecodeError> {
    let (hrp, bytes) =
        bech32::decode(encoded.trim()).map_err(|e| InvoiceDecodeError::Bech32(e.to_string()))?;
    let hrp = hrp.to_string();
    if !hrp.eq_ignore_ascii_case(UMA_INVOICE_HRP) {
        return Err(InvoiceDecodeError::UnexpectedHrp(hrp));
    }

    let mut receiver_uma = None;
    let mut invoice_uuid = None;
    let mut amount = None;
    let mut receiving_currency = None;
    let mut expiration = None;
    let mut is_subject_to_travel_rule = false;
    let mut required_payer_data = None;
    let mut uma_versions = None;
    let mut comment_chars_allowed = None;
    let mut sender_uma = None;
    let mut invoice_limit = None;
    let mut kyc_status = None;
    let mut callback = None;
    let mut signature = None;

    for (record_tag, value) in read_records(&bytes)? {
        match record_tag {
            tag::RECEIVER_UMA => receiver_uma = Some(read_str("receiverUma", value)?),
            tag::INVOICE_UUID => invoice_uuid = Some(read_str("invoiceUUID", value)?),
            tag::AMOUNT => amount = Some(read_uint("amount", value)?),
            tag::RECEIVING_CURRENCY => receiving_currency = Some(decode_currency(value)?),
            tag::EXPIRATION => {
                expiration = Some(UnixTimestamp::from_secs(read_uint("expiration", value)?))
            }
            tag::IS_SUBJECT_TO_TRAVEL_RULE => {
                is_subject_to_travel_rule = read_uint("isSubjectToTravelRule", value)? != 0
            }
            tag::REQUIRED_PAYER_DATA => {
                required_payer_data = Some(decode_payer_data(&read_str(
                    "requiredPayerData",
                    value,
                )?)?)
            }
            tag::UMA_VERSIONS => uma_versions = Some(read_str("umaVersions", value)?),
            tag::COMMENT_CHARS_ALLOWED => {
                let raw = read_uint("commentCharsAllowed", value)?;
                comment_chars_allowed =
                    Some(u16::try_from(raw).map_err(|e| invalid("commentCharsAllowed", e))?);
            }
            tag::SENDER_UMA => sender_uma = Some(read_str("senderUma", value)?),
            tag::INVOICE_LIMIT => invoice_limit = Some(read_uint("invoiceLimit", value)?),
            tag::KYC_STATUS => {
                let raw = read_str("kycStatus", value)?;
                kyc_status = Some(KycStatus::from_str(&raw).map_err(|e| invalid("kycStatus", e))?);
            }
            tag::CALLBACK => callback = Some(read_str("callback", value)?),
            tag::SIGNATURE => signature = Some(value.to_vec()),
            unknown => tracing::debug!(tag = unknown, "Skipping unknown UMA invoice field"),
        }
    }

    Ok(UmaInvoice {
        receiver_uma: receiver_uma.ok_or(InvoiceDecodeError::MissingField("receiverUma"))?,
        invoice_uuid: invoice_uuid.ok_or(InvoiceDecodeError::MissingField("invoiceUUID"))?,
        amount: amount.ok_or(InvoiceDecodeError::MissingField("amount"))?,
        receiving_currency: receiving_currency
            .ok_or(InvoiceDecodeError::MissingField("receivingCurrency"))?,
        expiration: expiration.ok_or(InvoiceDecodeError::MissingField("expiration"))?,
        is_subject_to_travel_rule,
        required_payer_data,
        uma_versions: uma_versions.ok_or(InvoiceDecodeError::MissingField("umaVersions"))?,
        comment_chars_allowed,
        sender_uma,
        invoice_limit,
        kyc_status,
        callback: callback.ok_or(InvoiceDecodeError::MissingField("callback"))?,
        signature,
    })
}

/// Attaches a signature over the canonical encoding.
pub fn sign_uma_invoice(
    invoice: &mut UmaInvoice,
    signer: &VaspSigner,
) -> Result<(), InvoiceDecodeError> {
    let bytes = uma_invoice_signable_bytes(invoice)?;
    invoice.signature = Some(signer.sign_raw(&bytes));
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum InvoiceSignatureError {
    #[error("Invoice is not signed")]
    Unsigned,
    #[error(transparent)]
    Encoding(#[from] InvoiceDecodeError),
    #[error(transparent)]
    Signature(#[from] SignatureError),
}

pub fn verify_uma_invoice_signature(
    invoice: &UmaInvoice,
    key: &PublicKey,
) -> Result<(), InvoiceSignatureError> {
    let signature = invoice
        .signature
        .as_deref()
        .ok_or(InvoiceSignatureError::Unsigned)?;
    let bytes = uma_invoice_signable_bytes(invoice)?;
    signing::verify(&bytes, signature, key)?;
    Ok(())
}
