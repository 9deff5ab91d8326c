//! Currencies advertised by a receiving VASP in its discovery response.

use serde::{Deserialize, Serialize};

/// Code of the sender's base unit. Amounts in this currency are millisatoshis.
pub const SAT_CURRENCY_CODE: &str = "SAT";

/// A currency the receiver can be paid in.
///
/// `multiplier` is the number of millisatoshis per smallest unit of the currency
/// (e.g. cents for USD), which is why it is fractional.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Currency {
    pub code: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub symbol: String,
    pub multiplier: f64,
    #[serde(default)]
    pub decimals: u32,
    /// UMA v1 send limits, in the smallest unit of the currency.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub convertible: Option<CurrencyConvertible>,
    /// UMA v0 send limits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_sendable: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_sendable: Option<u64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CurrencyConvertible {
    pub min: u64,
    pub max: u64,
}

impl Currency {
    /// Satoshis, the only currency a sender can spend from.
    pub fn sats() -> Self {
        Currency {
            code: SAT_CURRENCY_CODE.to_string(),
            name: "Satoshis".to_string(),
            symbol: "sat".to_string(),
            multiplier: 1000.0,
            decimals: 0,
            convertible: None,
            min_sendable: Some(1),
            max_sendable: Some(10_000_000_000),
        }
    }
}

/// Finds a currency by code in an advertised list.
pub fn find_currency<'a>(currencies: &'a [Currency], code: &str) -> Option<&'a Currency> {
    currencies.iter().find(|c| c.code == code)
}
