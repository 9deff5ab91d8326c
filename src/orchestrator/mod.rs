//! The sending side of an UMA / LNURL-pay payment.
//!
//! A payment goes through these states, stopping at the first error:
//!
//! ```text
//! START -> DISCOVERING -> (VERSION_RETRY) -> DISCOVERED -> NEGOTIATING_PAYMENT
//!       -> (SIGNATURE_VERIFIED | UNVERIFIED) -> SETTLEMENT_READY
//! ```
//!
//! - [`ProtocolOrchestrator::discover`] resolves a receiver address and leaves
//!   a discovery handle behind.
//! - [`ProtocolOrchestrator::pay_request`] turns a discovery handle and an
//!   amount into an invoice and a settlement handle.
//! - [`ProtocolOrchestrator::pay_invoice`] does the same starting from an UMA
//!   invoice, given raw or by a settlement handle.
//! - [`ProtocolOrchestrator::receive_invoice`] verifies and parks an UMA
//!   invoice pushed to us by a receiving VASP.
//! - [`ProtocolOrchestrator::receive_utxo_callback`] verifies the UTXO report
//!   a receiving VASP sends once a payment has settled.
//!
//! Only the discovery request is ever retried, once, when the counterparty
//! rejects our protocol version.

mod callback;
mod discovery;
mod invoice;
mod payreq;


use reqwest::{Client, RequestBuilder, StatusCode};
use secp256k1::PublicKey;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use uma_types::currency::Currency;
use uma_types::payer::KycStatus;

use crate::error::UmaError;
use crate::invoice::InvoiceDecoder;
use crate::keys::{CounterpartyKeyResolver, CounterpartyKeys};
use crate::signing::{NonceCache, VaspSigner, scheme_for_domain};
use crate::store::{PendingEntry, PendingRequestStore};
use crate::users::LocalUser;

pub use payreq::PayReqParams;

/// Default deadline of every outbound request.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(20);
/// Path of the UTXO callback route, advertised in every pay request.
pub const UTXO_CALLBACK_PATH: &str = "/utxoCallback";
/// Default age after which counterparty signatures are rejected.
pub const DEFAULT_NONCE_WINDOW: Duration = Duration::from_secs(6 * 60 * 60);

/// Who is sending: the calling local user at this VASP's domain.
#[derive(Debug, Clone)]
pub struct SenderContext {
    pub user: LocalUser,
    pub vasp_domain: String,
}

impl SenderContext {
    pub fn address(&self) -> String {
        self.user.uma_address(&self.vasp_domain)
    }

    /// Our endpoint for post-transaction UTXO callbacks.
    pub fn utxo_callback_url(&self) -> String {
        format!(
            "{}://{}{UTXO_CALLBACK_PATH}",
            scheme_for_domain(&self.vasp_domain),
            self.vasp_domain
        )
    }
}

/// Result of a discovery.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LookupResponse {
    pub sender_currencies: Vec<Currency>,
    pub receiver_currencies: Vec<Currency>,
    pub min_sendable_sats: u64,
    pub max_sendable_sats: u64,
    pub handle: String,
    pub receiver_kyc_status: KycStatus,
}

/// A payable invoice and the conversion the counterparty quoted for it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SettlementResponse {
    pub sender_currencies: Vec<Currency>,
    pub handle: String,
    pub encoded_invoice: String,
    pub amount_msats: u64,
    pub amount_receiving_currency: u64,
    /// Millisatoshis per smallest unit of the receiving currency.
    pub conversion_rate: f64,
    pub exchange_fees_msats: u64,
    pub receiving_currency_code: String,
}

/// Status and body of a counterparty response.
struct HttpReply {
    status: StatusCode,
    body: String,
}

/// Runs the payment phases against counterparties.
///
/// Holds no per-payment state of its own: everything between phases lives in
/// the shared [`PendingRequestStore`].
pub struct ProtocolOrchestrator {
    http: Client,
    http_timeout: Duration,
    signer: VaspSigner,
    key_resolver: Arc<dyn CounterpartyKeyResolver>,
    invoice_decoder: Arc<dyn InvoiceDecoder>,
    nonces: NonceCache,
    store: Arc<PendingRequestStore>,
    is_subject_to_travel_rule: bool,
}

impl ProtocolOrchestrator {
    pub fn new(
        signer: VaspSigner,
        key_resolver: Arc<dyn CounterpartyKeyResolver>,
        invoice_decoder: Arc<dyn InvoiceDecoder>,
        store: Arc<PendingRequestStore>,
    ) -> Self {
        Self {
            http: Client::new(),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            signer,
            key_resolver,
            invoice_decoder,
            nonces: NonceCache::new(DEFAULT_NONCE_WINDOW),
            store,
            is_subject_to_travel_rule: true,
        }
    }

    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    pub fn with_nonce_window(mut self, window: Duration) -> Self {
        self.nonces = NonceCache::new(window);
        self
    }

    pub fn with_travel_rule(mut self, is_subject_to_travel_rule: bool) -> Self {
        self.is_subject_to_travel_rule = is_subject_to_travel_rule;
        self
    }

    pub fn signing_public_key(&self) -> &PublicKey {
        self.signer.public_key()
    }

    pub fn store(&self) -> &PendingRequestStore {
        &self.store
    }

    pub fn pending_requests(&self) -> Vec<PendingEntry> {
        self.store.list_pending()
    }

    async fn send(&self, request: RequestBuilder) -> Result<HttpReply, reqwest::Error> {
        let response = request.timeout(self.http_timeout).send().await?;
        let status = response.status();
        let body = response.text().await?;
        Ok(HttpReply { status, body })
    }

    async fn counterparty_keys(&self, domain: &str) -> Result<CounterpartyKeys, UmaError> {
        self.key_resolver.keys_for(domain).await.map_err(|e| {
            tracing::warn!(domain, error = %e, "Failed to fetch counterparty keys");
            UmaError::CounterpartyKeyFetch(format!("{domain}: {e}"))
        })
    }
}
