//! UMA sending VASP HTTP entrypoint.
//!
//! Serves the sending side of UMA and plain LNURL-pay payments for one local
//! user: discovery, signed pay requests, UMA invoice payment, and the
//! counterparty-facing `/.well-known` documents.
//!
//! Environment:
//! - `.env` values loaded at startup
//! - `CONFIG` points at the JSON configuration (default `config.json`)
//! - `HOST`, `PORT` control binding address when the config omits them
//! - `RUST_LOG` sets the log filter
//! - `OTEL_*` variables enable OTLP export when built with `telemetry`

mod run;

use std::process;

use crate::run::run;

#[tokio::main]
async fn main() {
    let result = run().await;
    if let Err(e) = result {
        println!("{e}");
        process::exit(1)
    }
}
