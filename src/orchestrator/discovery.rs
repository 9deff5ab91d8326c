use reqwest::StatusCode;
use tracing::instrument;
use url::Url;

use uma_types::address::ReceiverAddress;
use uma_types::currency::Currency;
use uma_types::lnurlp::{DiscoveryResponse, LnurlpProtocol};
use uma_types::version::{UmaVersion, UnsupportedVersionResponse, select_highest_supported};

use super::{LookupResponse, ProtocolOrchestrator, SenderContext};
use crate::error::UmaError;
use crate::signing::{lnurlp_url, signed_lnurlp_url, verify_lnurlp_response};
use crate::store::DiscoveryEntry;

/// Number of times a discovery is re-issued after a `412 Precondition Failed`.
const MAX_VERSION_RETRIES: usize = 1;

impl ProtocolOrchestrator {
    /// Resolves `receiver` and stores the result under a fresh discovery handle.
    #[instrument(skip_all, fields(receiver = %receiver))]
    pub async fn discover(
        &self,
        sender: &SenderContext,
        receiver: &str,
    ) -> Result<LookupResponse, UmaError> {
        let receiver: ReceiverAddress = receiver
            .parse()
            .map_err(|e| UmaError::InvalidInput(format!("{e}")))?;
        let body = self.fetch_lnurlp(sender, &receiver).await?;
        let response = DiscoveryResponse::from_json(&body).map_err(|e| {
            tracing::warn!(error = %e, "Unparseable lnurlp response");
            UmaError::DiscoveryParse(e.to_string())
        })?;
        if receiver.is_protocol_aware() && !response.is_protocol_aware() {
            tracing::warn!(
                domain = receiver.domain(),
                "UMA address answered without compliance data, continuing as plain LNURL"
            );
        }

        let receiver_currencies = match &response.protocol {
            LnurlpProtocol::ProtocolAware { compliance, .. } => {
                let keys = self.counterparty_keys(receiver.domain()).await?;
                verify_lnurlp_response(compliance, &keys.signing_key, &self.nonces).map_err(
                    |e| {
                        tracing::warn!(error = %e, "lnurlp response signature rejected");
                        UmaError::InvalidSignature(format!(
                            "lnurlp response from {}: {e}",
                            receiver.domain()
                        ))
                    },
                )?;
                response.currencies.clone()
            }
            LnurlpProtocol::PlainLnurl if response.currencies.is_empty() => vec![Currency::sats()],
            LnurlpProtocol::PlainLnurl => response.currencies.clone(),
        };

        let lookup = LookupResponse {
            sender_currencies: vec![Currency::sats()],
            receiver_currencies,
            min_sendable_sats: response.min_sendable.div_ceil(1000),
            max_sendable_sats: response.max_sendable / 1000,
            handle: String::new(),
            receiver_kyc_status: response.receiver_kyc_status(),
        };
        let protocol_aware = response.is_protocol_aware();
        let handle = self.store.put_discovery(DiscoveryEntry { receiver, response });
        tracing::info!(handle, protocol_aware, "Discovery completed");
        Ok(LookupResponse { handle, ..lookup })
    }

    /// Fetches the raw lnurlp body, renegotiating the version at most once.
    async fn fetch_lnurlp(
        &self,
        sender: &SenderContext,
        receiver: &ReceiverAddress,
    ) -> Result<String, UmaError> {
        let mut version = UmaVersion::CURRENT;
        let mut retries = 0;
        loop {
            let url = self.discovery_url(sender, receiver, version)?;
            let reply = self.send(self.http.get(url)).await.map_err(|e| {
                tracing::warn!(error = %e, retries, "lnurlp request failed");
                UmaError::DiscoveryTransport(e.to_string())
            })?;
            if reply.status == StatusCode::PRECONDITION_FAILED
                && receiver.is_protocol_aware()
                && retries < MAX_VERSION_RETRIES
            {
                version = renegotiate_version(&reply.body)?;
                retries += 1;
                tracing::info!(%version, "Counterparty rejected UMA version, retrying");
                continue;
            }
            if !reply.status.is_success() {
                tracing::warn!(status = %reply.status, "lnurlp request rejected");
                return Err(UmaError::DiscoveryRequestFailed {
                    status: reply.status.as_u16(),
                });
            }
            return Ok(reply.body);
        }
    }

    fn discovery_url(
        &self,
        sender: &SenderContext,
        receiver: &ReceiverAddress,
        version: UmaVersion,
    ) -> Result<Url, UmaError> {
        if receiver.is_protocol_aware() {
            signed_lnurlp_url(
                &self.signer,
                receiver,
                &sender.vasp_domain,
                self.is_subject_to_travel_rule,
                version,
            )
            .map_err(|e| UmaError::InvalidInput(format!("{receiver}: {e}")))
        } else {
            lnurlp_url(receiver).map_err(|e| UmaError::InvalidInput(format!("{receiver}: {e}")))
        }
    }
}

/// Picks the version to retry with from a `412` body.
///
/// Failures here count as a failed exchange with the counterparty, not as a
/// rejected request.
fn renegotiate_version(body: &str) -> Result<UmaVersion, UmaError> {
    let unsupported: UnsupportedVersionResponse = serde_json::from_str(body).map_err(|e| {
        UmaError::DiscoveryTransport(format!("Unreadable unsupported version response: {e}"))
    })?;
    select_highest_supported(&unsupported.supported_major_versions)
        .map_err(|e| UmaError::DiscoveryTransport(e.to_string()))
}
