//! Sending VASP for the [UMA](https://www.uma.me) protocol and plain LNURL-pay.
//!
//! The crate resolves a receiver address, negotiates a protocol version,
//! exchanges signed pay requests with the receiving VASP, and hands back a
//! Lightning invoice together with the quoted conversion. Everything between
//! those steps is kept in an in-memory store under opaque handles.
//!
//! # Modules
//!
//! - [`orchestrator`] - The payment phases: discovery, pay request, UMA invoice payment.
//! - [`store`] - Pending discovery and settlement state keyed by handle.
//! - [`keys`] - Counterparty signing and encryption keys, fetched and cached per domain.
//! - [`signing`] - Our signatures, counterparty signature checks, and replay protection.
//! - [`invoice`] - BOLT11 and UMA invoice decoding.
//! - [`users`] - Who the local caller is.
//! - [`handlers`] - HTTP routes over the orchestrator.
//! - [`config`] - Server configuration.
//! - [`error`] - The error taxonomy and its HTTP rendering.
//! - [`util`] - Shutdown signals and telemetry.
//!
//! Wire types shared with receiving VASPs live in the `uma-types` crate.

pub mod config;
pub mod error;
pub mod handlers;
pub mod invoice;
pub mod keys;
pub mod orchestrator;
pub mod signing;
pub mod store;
pub mod users;
pub mod util;
