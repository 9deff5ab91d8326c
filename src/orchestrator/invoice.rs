use tracing::instrument;
use url::Url;

use uma_types::currency::Currency;
use uma_types::invoice::UmaInvoice;
use uma_types::timestamp::UnixTimestamp;
use uma_types::version::select_from_version_list;

use super::payreq::{AwarePayment, requested_profile};
use super::{ProtocolOrchestrator, SenderContext, SettlementResponse};
use crate::error::UmaError;
use crate::invoice::{DecodedInvoice, is_uma_invoice, verify_uma_invoice_signature};
use crate::keys::CounterpartyKeys;
use crate::store::SettlementEntry;

impl ProtocolOrchestrator {
    /// Pays an UMA invoice, given either encoded or as a settlement handle holding one.
    #[instrument(skip_all)]
    pub async fn pay_invoice(
        &self,
        sender: &SenderContext,
        invoice_or_handle: &str,
    ) -> Result<SettlementResponse, UmaError> {
        let text = invoice_or_handle.trim();
        if text.is_empty() {
            return Err(UmaError::InvalidInput("invoice is required".into()));
        }
        let encoded = if is_uma_invoice(text) {
            text.to_string()
        } else {
            let entry = self.store.get_settlement(text).ok_or_else(|| {
                UmaError::RequestNotFound(format!("No settlement for handle {text}"))
            })?;
            match entry.invoice {
                DecodedInvoice::Uma(_) => entry.encoded_invoice,
                DecodedInvoice::Bolt11(_) => {
                    return Err(UmaError::InvalidInvoice(format!(
                        "Settlement {text} does not hold an UMA invoice"
                    )));
                }
            }
        };

        let invoice = self.decode_uma_invoice(&encoded)?;
        if invoice.is_expired_at(UnixTimestamp::now()) {
            return Err(UmaError::InvoiceExpired(format!(
                "Invoice {} expired at {}",
                invoice.invoice_uuid, invoice.expiration
            )));
        }
        let keys = self.verified_invoice_keys(&invoice).await?;

        let version = select_from_version_list(&invoice.uma_versions)
            .map_err(|e| UmaError::InvalidInvoice(e.to_string()))?;
        let callback = Url::parse(&invoice.callback)
            .map_err(|e| UmaError::InvalidInvoice(format!("callback: {e}")))?;
        let (payer_name, payer_email) =
            requested_profile(invoice.required_payer_data.as_ref(), sender);
        tracing::debug!(invoice_uuid = %invoice.invoice_uuid, %version, "Paying UMA invoice");
        let payment = AwarePayment {
            callback,
            receiver_address: invoice.receiver_address(),
            sender_address: invoice.sender_uma.clone().unwrap_or_else(|| sender.address()),
            receiving_currency_code: invoice.receiving_currency.code.clone(),
            amount: invoice.amount,
            is_amount_in_msats: false,
            major_version: version.major,
            invoice_uuid: Some(invoice.invoice_uuid.clone()),
            payer_name,
            payer_email,
            utxo_callback: sender.utxo_callback_url(),
            keys: &keys,
        };
        self.negotiate_aware_payment(payment).await
    }

    /// Verifies an invoice pushed by a receiving VASP and parks it under a settlement handle.
    ///
    /// Nothing is sent to the invoice callback until the invoice is paid.
    #[instrument(skip_all)]
    pub async fn receive_invoice(
        &self,
        sender: &SenderContext,
        encoded: &str,
    ) -> Result<String, UmaError> {
        let encoded = encoded.trim();
        if encoded.is_empty() {
            return Err(UmaError::InvalidInput("invoice is required".into()));
        }
        let invoice = self.decode_uma_invoice(encoded)?;
        self.verified_invoice_keys(&invoice).await?;
        let invoice_uuid = invoice.invoice_uuid.clone();
        let handle = self.store.put_settlement(SettlementEntry {
            payer_identifier: invoice.sender_uma.clone().unwrap_or_else(|| sender.address()),
            encoded_invoice: encoded.to_string(),
            invoice_uuid: Some(invoice_uuid.clone()),
            invoice: DecodedInvoice::Uma(invoice),
            sender_currencies: vec![Currency::sats()],
        });
        tracing::info!(handle, invoice_uuid, "Stored UMA invoice for payment");
        Ok(handle)
    }

    fn decode_uma_invoice(&self, encoded: &str) -> Result<UmaInvoice, UmaError> {
        self.invoice_decoder
            .decode_uma_invoice(encoded)
            .map_err(|e| UmaError::InvalidInvoice(e.to_string()))
    }

    /// Keys of the invoice's receiving domain, once they have checked its signature.
    async fn verified_invoice_keys(
        &self,
        invoice: &UmaInvoice,
    ) -> Result<CounterpartyKeys, UmaError> {
        let domain = invoice.receiver_domain().ok_or_else(|| {
            UmaError::InvalidInvoice(format!("Receiver {} has no domain", invoice.receiver_uma))
        })?;
        let keys = self.counterparty_keys(domain).await?;
        verify_uma_invoice_signature(invoice, &keys.signing_key).map_err(|e| {
            tracing::warn!(domain, error = %e, "UMA invoice signature rejected");
            UmaError::InvalidSignature(format!("Invoice {}: {e}", invoice.invoice_uuid))
        })?;
        Ok(keys)
    }
}
