//! Core wire types for the sending side of the UMA protocol.
//!
//! UMA (Universal Money Address) layers signatures, compliance data and
//! currency negotiation on top of LNURL-pay. This crate holds the serde
//! representations of every message a sending VASP exchanges with a receiving
//! counterparty, plus the small value types those messages are built from.
//!
//! # Modules
//!
//! - [`address`] - Parsing of `$user@domain` / `user@domain` receiver addresses.
//! - [`callback`] - Post-transaction UTXO callbacks from a receiving VASP.
//! - [`config`] - [`LiteralOrEnv`](config::LiteralOrEnv) for config values that may reference env vars.
//! - [`currency`] - Currencies advertised by a receiving VASP.
//! - [`invoice`] - Decoded UMA invoices (the bech32 `uma1...` form is handled by the sender crate).
//! - [`lnurlp`] - Discovery (`/.well-known/lnurlp`) responses, tagged protocol-aware vs plain LNURL.
//! - [`payer`] - Payer/payee data options, payer data and KYC status.
//! - [`payreq`] - Pay requests and pay responses for both UMA major versions.
//! - [`pubkey`] - `/.well-known/lnurlpubkey` responses.
//! - [`timestamp`] - Unix timestamps as used in signatures and expirations.
//! - [`version`] - Protocol version parsing and negotiation.

pub mod address;
pub mod callback;
pub mod config;
pub mod currency;
pub mod invoice;
pub mod lnurlp;
pub mod payer;
pub mod payreq;
pub mod pubkey;
pub mod timestamp;
pub mod version;
