//! Post-transaction callbacks a receiving VASP sends to the `utxoCallback`
//! advertised in our pay request, once the Lightning payment has settled.

use serde::{Deserialize, Serialize};

use crate::timestamp::UnixTimestamp;

/// One channel UTXO used by the payment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UtxoWithAmount {
    pub utxo: String,
    /// Millisatoshis carried through this UTXO.
    pub amount: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PostTransactionCallback {
    pub utxos: Vec<UtxoWithAmount>,
    /// Domain whose published keys signed this callback. Absent before v1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vasp_domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_nonce: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_timestamp: Option<UnixTimestamp>,
}

impl PostTransactionCallback {
    /// Payload covered by [`Self::signature`]: `nonce|timestamp`.
    pub fn signable_payload(&self) -> Option<String> {
        let nonce = self.signature_nonce.as_deref()?;
        let timestamp = self.signature_timestamp?;
        Some(format!("{nonce}|{timestamp}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_signed_callback() {
        let body = r#"{
            "utxos": [{"utxo": "abc:0", "amount": 1000}],
            "vaspDomain": "vasp2.example",
            "signature": "30440220",
            "signatureNonce": "42",
            "signatureTimestamp": 1700000000
        }"#;
        let callback: PostTransactionCallback = serde_json::from_str(body).unwrap();
        assert_eq!(callback.utxos[0].amount, 1000);
        assert_eq!(callback.vasp_domain.as_deref(), Some("vasp2.example"));
        assert_eq!(callback.signable_payload().as_deref(), Some("42|1700000000"));
    }

    #[test]
    fn unsigned_callback_has_no_payload() {
        let callback: PostTransactionCallback =
            serde_json::from_str(r#"{"utxos": []}"#).unwrap();
        assert_eq!(callback.signable_payload(), None);
    }
}
