//! Signatures over UMA messages.
//!
//! Every signed UMA message signs a `|`-joined payload that ends with a nonce
//! and a timestamp, e.g. `$bob@vasp2.example|4213897|1700000000` for a
//! discovery request. The payload is hashed with SHA-256 and signed with
//! ECDSA over secp256k1; signatures travel hex-encoded in DER form.
//!
//! Verification of counterparty messages goes through a [`NonceCache`], which
//! rejects replays and signatures older than its window.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use secp256k1::ecdsa::Signature;
use secp256k1::{Message, PublicKey, SECP256K1, SecretKey};
use sha2::{Digest, Sha256};
use std::time::Duration;
use url::Url;

use uma_types::address::ReceiverAddress;
use uma_types::callback::PostTransactionCallback;
use uma_types::lnurlp::LnurlComplianceResponse;
use uma_types::payreq::PayeeCompliance;
use uma_types::timestamp::UnixTimestamp;
use uma_types::version::UmaVersion;

#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("Signature is not valid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
    #[error("Malformed signature: {0}")]
    Malformed(secp256k1::Error),
    #[error("Malformed public key: {0}")]
    InvalidPublicKey(secp256k1::Error),
    #[error("Signature does not match the signed payload")]
    Mismatch,
    #[error("Signed message is missing {0}")]
    MissingField(&'static str),
    #[error("Nonce {0} has already been used")]
    NonceReused(String),
    #[error("Signature timestamp {0} is outside the accepted window")]
    TimestampTooOld(UnixTimestamp),
    #[error("Failed to build lnurlp url: {0}")]
    Url(#[from] url::ParseError),
}

fn digest(payload: &[u8]) -> Message {
    let hash: [u8; 32] = Sha256::digest(payload).into();
    Message::from_digest(hash)
}

/// Output of [`VaspSigner::sign_with_nonce`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedPayload {
    pub signature: String,
    pub nonce: String,
    pub timestamp: UnixTimestamp,
}

/// Signs outgoing messages with this VASP's signing key.
#[derive(Debug, Clone)]
pub struct VaspSigner {
    secret_key: SecretKey,
    public_key: PublicKey,
}

impl VaspSigner {
    pub fn new(secret_key: SecretKey) -> Self {
        let public_key = PublicKey::from_secret_key(SECP256K1, &secret_key);
        Self {
            secret_key,
            public_key,
        }
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// DER signature over SHA-256 of `payload`.
    pub fn sign_raw(&self, payload: &[u8]) -> Vec<u8> {
        let signature = SECP256K1.sign_ecdsa(&digest(payload), &self.secret_key);
        signature.serialize_der().to_vec()
    }

    pub fn sign(&self, payload: &[u8]) -> String {
        hex::encode(self.sign_raw(payload))
    }

    /// Signs `{prefix}|{nonce}|{timestamp}` with a fresh nonce and the current time.
    pub fn sign_with_nonce(&self, prefix: &str) -> SignedPayload {
        let nonce = generate_nonce();
        let timestamp = UnixTimestamp::now();
        let signature = self.sign(format!("{prefix}|{nonce}|{timestamp}").as_bytes());
        SignedPayload {
            signature,
            nonce,
            timestamp,
        }
    }
}

pub fn generate_nonce() -> String {
    rand::random::<u64>().to_string()
}

pub fn parse_public_key(hex_key: &str) -> Result<PublicKey, SignatureError> {
    let bytes = hex::decode(hex_key)?;
    PublicKey::from_slice(&bytes).map_err(SignatureError::InvalidPublicKey)
}

/// Verifies a raw DER or compact signature.
pub fn verify(payload: &[u8], signature: &[u8], key: &PublicKey) -> Result<(), SignatureError> {
    let mut signature = Signature::from_der(signature)
        .or_else(|_| Signature::from_compact(signature))
        .map_err(SignatureError::Malformed)?;
    signature.normalize_s();
    SECP256K1
        .verify_ecdsa(&digest(payload), &signature, key)
        .map_err(|_| SignatureError::Mismatch)
}

pub fn verify_hex(payload: &[u8], signature_hex: &str, key: &PublicKey) -> Result<(), SignatureError> {
    let signature = hex::decode(signature_hex)?;
    verify(payload, &signature, key)
}

/// Verifies the compliance signature of a protocol-aware discovery response.
pub fn verify_lnurlp_response(
    compliance: &LnurlComplianceResponse,
    key: &PublicKey,
    nonces: &NonceCache,
) -> Result<(), SignatureError> {
    nonces.check_and_save(&compliance.signature_nonce, compliance.signature_timestamp)?;
    verify_hex(
        compliance.signable_payload().as_bytes(),
        &compliance.signature,
        key,
    )
}

/// Verifies the payee signature of a v1 pay response.
pub fn verify_pay_response(
    compliance: &PayeeCompliance,
    sender_address: &str,
    receiver_address: &str,
    key: &PublicKey,
    nonces: &NonceCache,
) -> Result<(), SignatureError> {
    let signature = compliance
        .signature
        .as_deref()
        .ok_or(SignatureError::MissingField("signature"))?;
    let (Some(nonce), Some(timestamp), Some(payload)) = (
        compliance.signature_nonce.as_deref(),
        compliance.signature_timestamp,
        compliance.signable_payload(sender_address, receiver_address),
    ) else {
        return Err(SignatureError::MissingField("signature nonce or timestamp"));
    };
    nonces.check_and_save(nonce, timestamp)?;
    verify_hex(payload.as_bytes(), signature, key)
}

/// Verifies the signature of a post-transaction UTXO callback.
pub fn verify_post_transaction_callback(
    callback: &PostTransactionCallback,
    key: &PublicKey,
    nonces: &NonceCache,
) -> Result<(), SignatureError> {
    let signature = callback
        .signature
        .as_deref()
        .ok_or(SignatureError::MissingField("signature"))?;
    let (Some(nonce), Some(timestamp), Some(payload)) = (
        callback.signature_nonce.as_deref(),
        callback.signature_timestamp,
        callback.signable_payload(),
    ) else {
        return Err(SignatureError::MissingField("signature nonce or timestamp"));
    };
    nonces.check_and_save(nonce, timestamp)?;
    verify_hex(payload.as_bytes(), signature, key)
}

/// `http` for local counterparties, `https` for everything else.
pub fn scheme_for_domain(domain: &str) -> &'static str {
    if domain.starts_with("localhost:") || domain.starts_with("127.0.0.1:") {
        "http"
    } else {
        "https"
    }
}

/// `{scheme}://{domain}/.well-known/lnurlp/{identifier}` without any query.
pub fn lnurlp_url(receiver: &ReceiverAddress) -> Result<Url, url::ParseError> {
    Url::parse(&format!(
        "{}://{}/.well-known/lnurlp/{}",
        scheme_for_domain(receiver.domain()),
        receiver.domain(),
        receiver.lnurlp_identifier()
    ))
}

/// Builds the signed discovery URL for an UMA receiver.
///
/// The signature covers `receiverAddress|nonce|timestamp`.
pub fn signed_lnurlp_url(
    signer: &VaspSigner,
    receiver: &ReceiverAddress,
    sending_vasp_domain: &str,
    is_subject_to_travel_rule: bool,
    version: UmaVersion,
) -> Result<Url, SignatureError> {
    let mut url = lnurlp_url(receiver)?;
    let signed = signer.sign_with_nonce(&receiver.to_string());
    url.query_pairs_mut()
        .append_pair("signature", &signed.signature)
        .append_pair("vaspDomain", sending_vasp_domain)
        .append_pair("nonce", &signed.nonce)
        .append_pair(
            "isSubjectToTravelRule",
            if is_subject_to_travel_rule { "true" } else { "false" },
        )
        .append_pair("timestamp", &signed.timestamp.to_string())
        .append_pair("umaVersion", &version.to_string());
    Ok(url)
}

/// Replay protection for counterparty signatures.
///
/// A nonce is accepted once. Signatures with a timestamp older than the
/// window are rejected outright, and remembered nonces are dropped once they
/// fall out of the window.
#[derive(Debug)]
pub struct NonceCache {
    window: Duration,
    seen: DashMap<String, UnixTimestamp>,
}

impl NonceCache {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: DashMap::new(),
        }
    }

    pub fn check_and_save(&self, nonce: &str, timestamp: UnixTimestamp) -> Result<(), SignatureError> {
        let oldest_valid = UnixTimestamp::now() - self.window.as_secs();
        if timestamp < oldest_valid {
            return Err(SignatureError::TimestampTooOld(timestamp));
        }
        self.seen.retain(|_, seen_at| *seen_at >= oldest_valid);
        match self.seen.entry(nonce.to_string()) {
            Entry::Occupied(_) => Err(SignatureError::NonceReused(nonce.to_string())),
            Entry::Vacant(entry) => {
                entry.insert(timestamp);
                Ok(())
            }
        }
    }
}
