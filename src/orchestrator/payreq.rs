use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;
use std::str::FromStr;
use tracing::instrument;
use url::Url;

use uma_types::currency::{Currency, SAT_CURRENCY_CODE, find_currency};
use uma_types::payer::{
    CompliancePayerData, CounterPartyDataOptions, EMAIL_FIELD, IDENTIFIER_FIELD, KycStatus,
    NAME_FIELD, PayerData,
};
use uma_types::payreq::{LnurlErrorResponse, PayReqResponse, PayRequest, PaymentInfo};

use super::{HttpReply, ProtocolOrchestrator, SenderContext, SettlementResponse};
use crate::error::UmaError;
use crate::invoice::{Bolt11Details, DecodedInvoice};
use crate::keys::CounterpartyKeys;
use crate::signing::verify_pay_response;
use crate::store::{DiscoveryEntry, SettlementEntry};

/// Default conversion when a plain LNURL callback quotes none.
const MSATS_PER_SAT: f64 = 1000.0;

/// Query of `GET /payreq/{handle}`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayReqParams {
    #[serde(default)]
    pub amount: Option<String>,
    #[serde(default)]
    pub receiving_currency_code: Option<String>,
    #[serde(default)]
    pub is_amount_in_msats: bool,
    #[serde(default)]
    pub sending_currency: Option<String>,
}

/// Everything the protocol-aware negotiation needs, whichever way the payment started.
pub(super) struct AwarePayment<'a> {
    pub callback: Url,
    pub receiver_address: String,
    pub sender_address: String,
    pub receiving_currency_code: String,
    pub amount: u64,
    pub is_amount_in_msats: bool,
    pub major_version: u16,
    pub invoice_uuid: Option<String>,
    pub payer_name: Option<String>,
    pub payer_email: Option<String>,
    /// Where the receiving VASP reports the payment's UTXOs.
    pub utxo_callback: String,
    pub keys: &'a CounterpartyKeys,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// A positive whole amount.
fn parse_amount(raw: Option<&str>) -> Result<u64, UmaError> {
    let raw = non_empty(raw).ok_or_else(|| UmaError::InvalidInput("amount is required".into()))?;
    let amount = Decimal::from_str(raw)
        .map_err(|_| UmaError::InvalidInput(format!("amount {raw} is not a number")))?;
    if !amount.fract().is_zero() {
        return Err(UmaError::InvalidInput(format!(
            "amount {raw} must be a whole number in the smallest unit of its currency"
        )));
    }
    if amount.is_sign_negative() || amount.is_zero() {
        return Err(UmaError::InvalidInput(format!(
            "amount {raw} must be greater than zero"
        )));
    }
    amount
        .to_u64()
        .ok_or_else(|| UmaError::InvalidInput(format!("amount {raw} is out of range")))
}

/// Fails on a non-2xx reply or an LNURL error body.
fn ensure_payreq_succeeded(reply: &HttpReply) -> Result<(), UmaError> {
    let lnurl_error = LnurlErrorResponse::from_body(&reply.body);
    if reply.status.is_success() && lnurl_error.is_none() {
        return Ok(());
    }
    let reason = lnurl_error
        .and_then(|e| e.reason)
        .unwrap_or_else(|| format!("callback answered {}", reply.status));
    tracing::warn!(status = %reply.status, reason, "Pay request rejected");
    Err(UmaError::PayReqFailed {
        status: Some(reply.status.as_u16()),
        reason,
    })
}

fn transport_failure(e: reqwest::Error) -> UmaError {
    tracing::warn!(error = %e, "Pay request did not complete");
    UmaError::PayReqFailed {
        status: None,
        reason: e.to_string(),
    }
}

/// Receiving-currency amount when the counterparty quoted a rate but no amount.
fn receiving_amount(info: &PaymentInfo, amount_msats: u64) -> u64 {
    info.amount.unwrap_or_else(|| {
        if info.multiplier > 0.0 {
            (amount_msats.saturating_sub(info.exchange_fees_msats) as f64 / info.multiplier).round()
                as u64
        } else {
            0
        }
    })
}

impl ProtocolOrchestrator {
    /// Requests an invoice for a discovered receiver and stores it under a settlement handle.
    #[instrument(skip_all, fields(handle = %handle))]
    pub async fn pay_request(
        &self,
        sender: &SenderContext,
        handle: &str,
        params: PayReqParams,
    ) -> Result<SettlementResponse, UmaError> {
        if handle.is_empty() {
            return Err(UmaError::RequestNotFound("Missing discovery handle".into()));
        }
        let entry = self
            .store
            .get_discovery(handle)
            .ok_or_else(|| UmaError::RequestNotFound(format!("No discovery for handle {handle}")))?;
        let amount = parse_amount(params.amount.as_deref())?;
        if !entry.response.is_protocol_aware() {
            return self.plain_pay_request(sender, &entry, amount, &params).await;
        }

        if sender.user.uma_user_name.trim().is_empty() {
            return Err(UmaError::RequestNotFound(
                "Calling user has no UMA user name".into(),
            ));
        }
        let currency_code = non_empty(params.receiving_currency_code.as_deref())
            .ok_or_else(|| UmaError::InvalidCurrency("receivingCurrencyCode is required".into()))?;
        let currency = find_currency(&entry.response.currencies, currency_code).ok_or_else(|| {
            UmaError::InvalidCurrency(format!(
                "{currency_code} is not offered by {}",
                entry.receiver
            ))
        })?;
        let sending_currency =
            non_empty(params.sending_currency.as_deref()).unwrap_or(SAT_CURRENCY_CODE);
        if sending_currency != SAT_CURRENCY_CODE {
            return Err(UmaError::InvalidCurrency(format!(
                "Only {SAT_CURRENCY_CODE} can be sent, got {sending_currency}"
            )));
        }

        let keys = self.counterparty_keys(entry.receiver.domain()).await?;
        let payment = AwarePayment {
            callback: entry.response.callback.clone(),
            receiver_address: entry.receiver.to_string(),
            sender_address: sender.address(),
            receiving_currency_code: currency.code.clone(),
            amount,
            is_amount_in_msats: params.is_amount_in_msats,
            major_version: entry.response.uma_version().map_or(1, |v| v.major),
            invoice_uuid: None,
            payer_name: None,
            payer_email: None,
            utxo_callback: sender.utxo_callback_url(),
            keys: &keys,
        };
        self.negotiate_aware_payment(payment).await
    }

    /// Sends a signed pay request to an UMA callback and stores the returned invoice.
    pub(super) async fn negotiate_aware_payment(
        &self,
        payment: AwarePayment<'_>,
    ) -> Result<SettlementResponse, UmaError> {
        let signed = self.signer.sign_with_nonce(&payment.sender_address);
        let compliance = CompliancePayerData {
            utxos: Vec::new(),
            node_pub_key: None,
            kyc_status: KycStatus::NotVerified,
            encrypted_travel_rule_info: None,
            travel_rule_format: None,
            signature: signed.signature,
            signature_nonce: signed.nonce,
            signature_timestamp: signed.timestamp,
            utxo_callback: payment.utxo_callback,
        };
        let request = PayRequest {
            receiving_currency_code: payment.receiving_currency_code.clone(),
            amount: payment.amount,
            is_amount_in_msats: payment.is_amount_in_msats,
            payer_data: PayerData {
                identifier: Some(payment.sender_address.clone()),
                name: payment.payer_name,
                email: payment.payer_email,
                compliance: Some(compliance),
            },
            requested_payee_data: Some(CounterPartyDataOptions::optional_name_and_email()),
            uma_major_version: payment.major_version,
            invoice_uuid: payment.invoice_uuid.clone(),
            comment: None,
        };

        let reply = self
            .send(self.http.post(payment.callback).json(&request))
            .await
            .map_err(transport_failure)?;
        ensure_payreq_succeeded(&reply)?;
        let response = PayReqResponse::from_json(&reply.body)
            .map_err(|e| UmaError::PayReqParse(e.to_string()))?;
        let Some(uma) = response.protocol_aware() else {
            return Err(UmaError::MissingRequiredUmaParameters(
                "Pay response carries no compliance or conversion data".into(),
            ));
        };
        // The version we negotiated decides, never the one the response claims.
        if payment.major_version != 0 {
            verify_pay_response(
                &uma.compliance,
                &payment.sender_address,
                &payment.receiver_address,
                &payment.keys.signing_key,
                &self.nonces,
            )
            .map_err(|e| {
                tracing::warn!(error = %e, "Pay response signature rejected");
                UmaError::InvalidSignature(format!("Pay response: {e}"))
            })?;
        }
        if uma.major_version != payment.major_version {
            tracing::warn!(
                negotiated = payment.major_version,
                declared = uma.major_version,
                "Pay response declares another UMA version"
            );
            return Err(UmaError::PayReqParse(format!(
                "Pay response is UMA v{} but v{} was negotiated",
                uma.major_version, payment.major_version
            )));
        }

        let details = self
            .invoice_decoder
            .decode_bolt11(&response.encoded_invoice)
            .map_err(|e| UmaError::Internal(format!("Undecodable invoice in pay response: {e}")))?;
        let amount_msats = details
            .amount_msats
            .ok_or_else(|| UmaError::Internal("Invoice in pay response has no amount".into()))?;
        let info = &uma.payment_info;
        let settlement = SettlementResponse {
            sender_currencies: vec![Currency::sats()],
            handle: String::new(),
            encoded_invoice: response.encoded_invoice.clone(),
            amount_msats,
            amount_receiving_currency: receiving_amount(info, amount_msats),
            conversion_rate: info.multiplier,
            exchange_fees_msats: info.exchange_fees_msats,
            receiving_currency_code: info.currency_code.clone(),
        };
        let handle = self.store_settlement(
            payment.sender_address,
            payment.invoice_uuid,
            &settlement,
            details,
        );
        Ok(SettlementResponse { handle, ..settlement })
    }

    /// Plain LNURL-pay: a GET with the amount in the query, no signatures.
    async fn plain_pay_request(
        &self,
        sender: &SenderContext,
        entry: &DiscoveryEntry,
        amount: u64,
        params: &PayReqParams,
    ) -> Result<SettlementResponse, UmaError> {
        let sending_currency = non_empty(params.sending_currency.as_deref());
        let receiving_currency = non_empty(params.receiving_currency_code.as_deref());
        let amount_param = match (params.is_amount_in_msats, sending_currency) {
            (true, _) => format!("{amount}.{SAT_CURRENCY_CODE}"),
            (false, Some(code)) => format!("{amount}.{code}"),
            (false, None) => amount.to_string(),
        };
        let wants_identifier = entry
            .response
            .required_payer_data
            .as_ref()
            .is_some_and(|fields| fields.requests(IDENTIFIER_FIELD));
        let payer_data = if wants_identifier {
            let payer = PayerData {
                identifier: Some(sender.address()),
                ..Default::default()
            };
            Some(serde_json::to_string(&payer).map_err(|e| UmaError::Internal(e.to_string()))?)
        } else {
            None
        };

        let mut url = entry.response.callback.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("amount", &amount_param);
            if let Some(code) = receiving_currency {
                query.append_pair("convert", code);
            }
            if let Some(payer_data) = &payer_data {
                query.append_pair("payerData", payer_data);
            }
        }

        let reply = self
            .send(self.http.get(url))
            .await
            .map_err(transport_failure)?;
        ensure_payreq_succeeded(&reply)?;
        let response = PayReqResponse::from_json(&reply.body)
            .map_err(|e| UmaError::PayReqParse(e.to_string()))?;
        let details = self
            .invoice_decoder
            .decode_bolt11(&response.encoded_invoice)
            .map_err(|e| UmaError::InvalidInvoice(e.to_string()))?;
        let amount_msats = details
            .amount_msats
            .ok_or_else(|| UmaError::InvalidInvoice("Invoice has no amount".into()))?;
        let info = response.payment_info();
        let settlement = SettlementResponse {
            sender_currencies: vec![Currency::sats()],
            handle: String::new(),
            encoded_invoice: response.encoded_invoice.clone(),
            amount_msats,
            amount_receiving_currency: info.and_then(|i| i.amount).unwrap_or(amount_msats),
            conversion_rate: info.map_or(MSATS_PER_SAT, |i| i.multiplier),
            exchange_fees_msats: info.map_or(0, |i| i.exchange_fees_msats),
            receiving_currency_code: receiving_currency.unwrap_or(SAT_CURRENCY_CODE).to_string(),
        };
        let handle = self.store_settlement(sender.address(), None, &settlement, details);
        Ok(SettlementResponse { handle, ..settlement })
    }

    fn store_settlement(
        &self,
        payer_identifier: String,
        invoice_uuid: Option<String>,
        settlement: &SettlementResponse,
        details: Bolt11Details,
    ) -> String {
        let handle = self.store.put_settlement(SettlementEntry {
            payer_identifier,
            encoded_invoice: settlement.encoded_invoice.clone(),
            invoice_uuid,
            invoice: DecodedInvoice::Bolt11(details),
            sender_currencies: settlement.sender_currencies.clone(),
        });
        tracing::info!(
            handle,
            amount_msats = settlement.amount_msats,
            currency = %settlement.receiving_currency_code,
            "Settlement ready"
        );
        handle
    }
}

/// Payer fields an UMA invoice asks for that the calling user can fill.
pub(super) fn requested_profile(
    requested: Option<&CounterPartyDataOptions>,
    sender: &SenderContext,
) -> (Option<String>, Option<String>) {
    let Some(requested) = requested else {
        return (None, None);
    };
    let name = requested
        .requests(NAME_FIELD)
        .then(|| sender.user.name.clone())
        .flatten();
    let email = requested
        .requests(EMAIL_FIELD)
        .then(|| sender.user.email.clone())
        .flatten();
    (name, email)
}
