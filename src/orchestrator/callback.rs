use tracing::instrument;

use uma_types::callback::PostTransactionCallback;

use super::ProtocolOrchestrator;
use crate::error::UmaError;
use crate::signing::verify_post_transaction_callback;

impl ProtocolOrchestrator {
    /// Checks a UTXO report against the published keys of the VASP that sent it.
    ///
    /// Nothing is stored; a verified report is only logged.
    #[instrument(skip_all)]
    pub async fn receive_utxo_callback(
        &self,
        callback: &PostTransactionCallback,
        tx_id: Option<&str>,
    ) -> Result<(), UmaError> {
        let domain = callback
            .vasp_domain
            .as_deref()
            .map(str::trim)
            .filter(|domain| !domain.is_empty())
            .ok_or_else(|| UmaError::InvalidInput("vaspDomain is required".into()))?;
        let keys = self.counterparty_keys(domain).await?;
        verify_post_transaction_callback(callback, &keys.signing_key, &self.nonces).map_err(
            |e| {
                tracing::warn!(domain, error = %e, "UTXO callback signature rejected");
                UmaError::InvalidSignature(format!("UTXO callback from {domain}: {e}"))
            },
        )?;
        tracing::info!(
            domain,
            tx_id,
            utxos = callback.utxos.len(),
            "Received UTXO callback"
        );
        Ok(())
    }
}
