//! Public keys of counterparty VASPs.
//!
//! Every UMA VASP publishes its signing and encryption keys at
//! `/.well-known/lnurlpubkey`. The [`CachingKeyResolver`] fetches them with
//! `reqwest` and keeps them per domain until the published expiration passes.

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::{Client, StatusCode};
use secp256k1::PublicKey;
use std::time::Duration;
use url::Url;

use uma_types::pubkey::PubKeyResponse;
use uma_types::timestamp::UnixTimestamp;

use crate::signing::{SignatureError, parse_public_key, scheme_for_domain};

/// Keys of one counterparty domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterpartyKeys {
    pub signing_key: PublicKey,
    pub encryption_key: PublicKey,
    pub expires_at: Option<UnixTimestamp>,
}

impl CounterpartyKeys {
    pub fn is_valid_at(&self, now: UnixTimestamp) -> bool {
        self.expires_at.is_none_or(|expires_at| expires_at > now)
    }
}

impl TryFrom<PubKeyResponse> for CounterpartyKeys {
    type Error = SignatureError;

    fn try_from(value: PubKeyResponse) -> Result<Self, Self::Error> {
        Ok(CounterpartyKeys {
            signing_key: parse_public_key(&value.signing_pub_key)?,
            encryption_key: parse_public_key(&value.encryption_pub_key)?,
            expires_at: value.expiration_timestamp,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum KeyResolverError {
    #[error("URL parse error: {context}: {source}")]
    UrlParse {
        context: &'static str,
        #[source]
        source: url::ParseError,
    },
    #[error("HTTP error: {context}: {source}")]
    Http {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("Failed to deserialize JSON: {context}: {source}")]
    JsonDeserialization {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("Unexpected HTTP status {status}: {context}: {body}")]
    HttpStatus {
        context: &'static str,
        status: StatusCode,
        body: String,
    },
    #[error("Failed to read response body as text: {context}: {source}")]
    ResponseBodyRead {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("Invalid public key published by {domain}: {source}")]
    InvalidKey {
        domain: String,
        #[source]
        source: SignatureError,
    },
}

/// Source of counterparty keys, possibly cached.
#[async_trait]
pub trait CounterpartyKeyResolver: Send + Sync {
    async fn keys_for(&self, domain: &str) -> Result<CounterpartyKeys, KeyResolverError>;
}

/// Fetches `/.well-known/lnurlpubkey` and caches the result per domain.
#[derive(Debug)]
pub struct CachingKeyResolver {
    client: Client,
    timeout: Option<Duration>,
    cache: DashMap<String, CounterpartyKeys>,
}

impl Default for CachingKeyResolver {
    fn default() -> Self {
        Self::new(Client::new())
    }
}

impl CachingKeyResolver {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            timeout: None,
            cache: DashMap::new(),
        }
    }

    /// Sets a timeout for all future key fetches.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn pubkey_url(domain: &str) -> Result<Url, KeyResolverError> {
        let url = format!(
            "{}://{}/.well-known/lnurlpubkey",
            scheme_for_domain(domain),
            domain
        );
        Url::parse(&url).map_err(|e| KeyResolverError::UrlParse {
            context: "Failed to construct lnurlpubkey URL",
            source: e,
        })
    }

    /// Drops a cached entry, forcing the next lookup to fetch again.
    pub fn evict(&self, domain: &str) {
        self.cache.remove(domain);
    }

    async fn fetch(&self, domain: &str) -> Result<CounterpartyKeys, KeyResolverError> {
        let context = "GET /.well-known/lnurlpubkey";
        let url = Self::pubkey_url(domain)?;
        let mut req = self.client.get(url);
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        let http_response = req
            .send()
            .await
            .map_err(|e| KeyResolverError::Http { context, source: e })?;
        if http_response.status() != StatusCode::OK {
            let status = http_response.status();
            let body = http_response
                .text()
                .await
                .map_err(|e| KeyResolverError::ResponseBodyRead { context, source: e })?;
            return Err(KeyResolverError::HttpStatus {
                context,
                status,
                body,
            });
        }
        let response = http_response
            .json::<PubKeyResponse>()
            .await
            .map_err(|e| KeyResolverError::JsonDeserialization { context, source: e })?;
        CounterpartyKeys::try_from(response).map_err(|e| KeyResolverError::InvalidKey {
            domain: domain.to_string(),
            source: e,
        })
    }
}

#[async_trait]
impl CounterpartyKeyResolver for CachingKeyResolver {
    async fn keys_for(&self, domain: &str) -> Result<CounterpartyKeys, KeyResolverError> {
        if let Some(keys) = self.cache.get(domain) {
            if keys.is_valid_at(UnixTimestamp::now()) {
                return Ok(keys.clone());
            }
        }
        tracing::debug!(domain, "Public key cache miss");
        let keys = self.fetch(domain).await?;
        self.cache.insert(domain.to_string(), keys.clone());
        Ok(keys)
    }
}
