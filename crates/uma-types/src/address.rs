//! Receiver addresses: `user@domain`, optionally prefixed with `$`.
//!
//! The `$` prefix marks an UMA address, which triggers a signed, versioned
//! discovery request. Without it the address is treated as a plain Lightning
//! Address and resolved with an unsigned LNURL-pay lookup.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Prefix marking a protocol-aware (UMA) address.
pub const UMA_ADDRESS_PREFIX: char = '$';

/// A parsed receiver address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReceiverAddress {
    user: String,
    domain: String,
    protocol_aware: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReceiverAddressError {
    #[error("Receiver address is empty")]
    Empty,
    #[error("Receiver address {0} is missing '@'")]
    MissingSeparator(String),
    #[error("Receiver address {0} has an empty user or domain")]
    EmptyPart(String),
    #[error("Receiver address {0} contains more than one '@'")]
    TooManySeparators(String),
}

impl ReceiverAddress {
    /// User part without the `$` prefix.
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Domain (possibly with a `:port`) of the receiving VASP.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn is_protocol_aware(&self) -> bool {
        self.protocol_aware
    }

    /// The identifier used in the `/.well-known/lnurlp/{identifier}` path.
    ///
    /// UMA keeps the `$` prefix in the path, plain LNURL does not have one.
    pub fn lnurlp_identifier(&self) -> String {
        if self.protocol_aware {
            format!("{UMA_ADDRESS_PREFIX}{}", self.user)
        } else {
            self.user.clone()
        }
    }
}

impl Display for ReceiverAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.lnurlp_identifier(), self.domain)
    }
}

impl FromStr for ReceiverAddress {
    type Err = ReceiverAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ReceiverAddressError::Empty);
        }
        let (local_part, domain) = s
            .split_once('@')
            .ok_or_else(|| ReceiverAddressError::MissingSeparator(s.to_string()))?;
        if domain.contains('@') {
            return Err(ReceiverAddressError::TooManySeparators(s.to_string()));
        }
        let (user, protocol_aware) = match local_part.strip_prefix(UMA_ADDRESS_PREFIX) {
            Some(user) => (user, true),
            None => (local_part, false),
        };
        if user.is_empty() || domain.is_empty() {
            return Err(ReceiverAddressError::EmptyPart(s.to_string()));
        }
        Ok(ReceiverAddress {
            user: user.to_string(),
            domain: domain.to_string(),
            protocol_aware,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_uma_address() {
        let address: ReceiverAddress = "$alice@example.com".parse().unwrap();
        assert_eq!(address.user(), "alice");
        assert_eq!(address.domain(), "example.com");
        assert!(address.is_protocol_aware());
        assert_eq!(address.lnurlp_identifier(), "$alice");
        assert_eq!(address.to_string(), "$alice@example.com");
    }

    #[test]
    fn parses_plain_lightning_address() {
        let address: ReceiverAddress = "bob@localhost:8080".parse().unwrap();
        assert_eq!(address.user(), "bob");
        assert_eq!(address.domain(), "localhost:8080");
        assert!(!address.is_protocol_aware());
        assert_eq!(address.lnurlp_identifier(), "bob");
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert_eq!(
            "".parse::<ReceiverAddress>(),
            Err(ReceiverAddressError::Empty)
        );
        assert!(matches!(
            "alice".parse::<ReceiverAddress>(),
            Err(ReceiverAddressError::MissingSeparator(_))
        ));
        assert!(matches!(
            "@example.com".parse::<ReceiverAddress>(),
            Err(ReceiverAddressError::EmptyPart(_))
        ));
        assert!(matches!(
            "alice@".parse::<ReceiverAddress>(),
            Err(ReceiverAddressError::EmptyPart(_))
        ));
        assert!(matches!(
            "$@example.com".parse::<ReceiverAddress>(),
            Err(ReceiverAddressError::EmptyPart(_))
        ));
        assert!(matches!(
            "a@b@c".parse::<ReceiverAddress>(),
            Err(ReceiverAddressError::TooManySeparators(_))
        ));
    }
}
