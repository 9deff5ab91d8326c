//! In-memory state between the steps of a payment.
//!
//! Discovery leaves a [`DiscoveryEntry`] behind for the following pay request,
//! and a pay request leaves a [`SettlementEntry`] behind for the client to pay.
//! Both are keyed by opaque UUIDv4 handles. Entries are written once and read
//! many times; a handle never maps to a different entry during its lifetime.
//!
//! One [`PendingRequestStore`] is built per service instance and shared by
//! reference with the orchestrator and the handlers.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

use uma_types::address::ReceiverAddress;
use uma_types::currency::Currency;
use uma_types::lnurlp::DiscoveryResponse;

use crate::invoice::DecodedInvoice;

/// A discovery response waiting for a pay request.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryEntry {
    #[serde(serialize_with = "serialize_display")]
    pub receiver: ReceiverAddress,
    pub response: DiscoveryResponse,
}

/// A negotiated invoice waiting to be paid.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SettlementEntry {
    pub payer_identifier: String,
    pub encoded_invoice: String,
    /// Set when the payment started from an UMA invoice rather than discovery.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice_uuid: Option<String>,
    pub invoice: DecodedInvoice,
    pub sender_currencies: Vec<Currency>,
}

/// One item of [`PendingRequestStore::list_pending`].
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PendingEntry {
    Discovery {
        handle: String,
        #[serde(flatten)]
        entry: DiscoveryEntry,
    },
    Settlement {
        handle: String,
        #[serde(flatten)]
        entry: SettlementEntry,
    },
}

fn serialize_display<T: std::fmt::Display, S: serde::Serializer>(
    value: &T,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

#[derive(Debug)]
struct Stored<T> {
    value: T,
    stored_at: Instant,
}

/// Write-once map from freshly generated handles to values.
#[derive(Debug)]
struct HandleMap<T> {
    entries: DashMap<String, Stored<T>>,
    ttl: Option<Duration>,
}

impl<T: Clone> HandleMap<T> {
    fn new(ttl: Option<Duration>) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    fn is_live(&self, stored: &Stored<T>, now: Instant) -> bool {
        self.ttl
            .is_none_or(|ttl| now.saturating_duration_since(stored.stored_at) < ttl)
    }

    fn purge_expired(&self, now: Instant) {
        if self.ttl.is_some() {
            self.entries.retain(|_, stored| self.is_live(stored, now));
        }
    }

    fn put(&self, value: T, now: Instant) -> String {
        let stored = Stored {
            value,
            stored_at: now,
        };
        loop {
            let handle = Uuid::new_v4().to_string();
            if let Entry::Vacant(vacant) = self.entries.entry(handle.clone()) {
                vacant.insert(stored);
                return handle;
            }
        }
    }

    fn get(&self, handle: &str) -> Option<T> {
        let stored = self.entries.get(handle)?;
        self.is_live(&stored, Instant::now())
            .then(|| stored.value.clone())
    }

    fn live_entries(&self) -> Vec<(String, T)> {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|item| self.is_live(item.value(), now))
            .map(|item| (item.key().clone(), item.value().value.clone()))
            .collect()
    }
}

/// Pending discovery and settlement state, keyed by handle.
#[derive(Debug)]
pub struct PendingRequestStore {
    discoveries: HandleMap<DiscoveryEntry>,
    settlements: HandleMap<SettlementEntry>,
}

impl Default for PendingRequestStore {
    fn default() -> Self {
        Self::new(None)
    }
}

impl PendingRequestStore {
    /// `ttl` of `None` keeps entries for the lifetime of the store.
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            discoveries: HandleMap::new(ttl),
            settlements: HandleMap::new(ttl),
        }
    }

    /// Drops expired entries of both kinds, whichever kind is being written.
    fn purge_expired(&self) -> Instant {
        let now = Instant::now();
        self.discoveries.purge_expired(now);
        self.settlements.purge_expired(now);
        now
    }

    pub fn put_discovery(&self, entry: DiscoveryEntry) -> String {
        let now = self.purge_expired();
        self.discoveries.put(entry, now)
    }

    pub fn get_discovery(&self, handle: &str) -> Option<DiscoveryEntry> {
        self.discoveries.get(handle)
    }

    pub fn put_settlement(&self, entry: SettlementEntry) -> String {
        let now = self.purge_expired();
        self.settlements.put(entry, now)
    }

    pub fn get_settlement(&self, handle: &str) -> Option<SettlementEntry> {
        self.settlements.get(handle)
    }

    /// Every live entry of both kinds, discoveries first.
    pub fn list_pending(&self) -> Vec<PendingEntry> {
        let discoveries = self
            .discoveries
            .live_entries()
            .into_iter()
            .map(|(handle, entry)| PendingEntry::Discovery { handle, entry });
        let settlements = self
            .settlements
            .live_entries()
            .into_iter()
            .map(|(handle, entry)| PendingEntry::Settlement { handle, entry });
        discoveries.chain(settlements).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoice::Bolt11Details;
    use std::collections::HashSet;
    use std::sync::Arc;
    use uma_types::timestamp::UnixTimestamp;

    fn settlement(payer: &str) -> SettlementEntry {
        SettlementEntry {
            payer_identifier: payer.to_string(),
            encoded_invoice: format!("lnbc-{payer}"),
            invoice_uuid: None,
            invoice: DecodedInvoice::Bolt11(Bolt11Details {
                amount_msats: Some(1000),
                payment_hash: "00".repeat(32),
                payee_pub_key: "02".to_string(),
                network: "bitcoin".to_string(),
                created_at: UnixTimestamp::from_secs(0),
                expires_at: UnixTimestamp::from_secs(3600),
            }),
            sender_currencies: vec![Currency::sats()],
        }
    }

    fn discovery() -> DiscoveryEntry {
        let body = r#"{"tag":"payRequest","callback":"https://ln.example/cb","minSendable":1000,"maxSendable":2000,"metadata":"[]"}"#;
        DiscoveryEntry {
            receiver: "bob@ln.example".parse().unwrap(),
            response: DiscoveryResponse::from_json(body).unwrap(),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_puts_yield_distinct_handles() {
        let store = Arc::new(PendingRequestStore::default());
        let tasks = (0..64).map(|i| {
            let store = store.clone();
            tokio::spawn(async move {
                let payer = format!("payer-{i}");
                let handle = store.put_settlement(settlement(&payer));
                (handle, payer)
            })
        });
        let mut handles = HashSet::new();
        for task in tasks.collect::<Vec<_>>() {
            let (handle, payer) = task.await.unwrap();
            assert_eq!(store.get_settlement(&handle).unwrap().payer_identifier, payer);
            assert!(handles.insert(handle));
        }
        assert_eq!(handles.len(), 64);
    }

    #[test]
    fn kinds_do_not_share_handles() {
        let store = PendingRequestStore::default();
        let handle = store.put_discovery(discovery());
        assert!(store.get_discovery(&handle).is_some());
        assert!(store.get_settlement(&handle).is_none());
        assert!(store.get_discovery("missing").is_none());
        // Lookups do not consume the entry.
        assert!(store.get_discovery(&handle).is_some());
    }

    #[test]
    fn lists_entries_tagged_by_kind() {
        let store = PendingRequestStore::default();
        let discovery_handle = store.put_discovery(discovery());
        store.put_settlement(settlement("alice"));
        let pending = store.list_pending();
        assert_eq!(pending.len(), 2);
        let json = serde_json::to_value(&pending).unwrap();
        assert_eq!(json[0]["kind"], "discovery");
        assert_eq!(json[0]["handle"], discovery_handle.as_str());
        assert_eq!(json[0]["receiver"], "bob@ln.example");
        assert_eq!(json[1]["kind"], "settlement");
        assert_eq!(json[1]["invoice"]["type"], "bolt11");
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entries_are_invisible() {
        let store = PendingRequestStore::new(Some(Duration::from_secs(60)));
        let old = store.put_settlement(settlement("old"));
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(store.get_settlement(&old).is_none());
        let fresh = store.put_settlement(settlement("fresh"));
        assert!(store.get_settlement(&fresh).is_some());
        assert_eq!(store.list_pending().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn writing_one_kind_purges_the_other() {
        let store = PendingRequestStore::new(Some(Duration::from_secs(60)));
        store.put_settlement(settlement("old"));
        store.put_discovery(discovery());
        tokio::time::advance(Duration::from_secs(61)).await;

        store.put_discovery(discovery());
        assert!(store.settlements.entries.is_empty());
        assert_eq!(store.discoveries.entries.len(), 1);

        tokio::time::advance(Duration::from_secs(61)).await;
        store.put_settlement(settlement("fresh"));
        assert!(store.discoveries.entries.is_empty());
        assert_eq!(store.settlements.entries.len(), 1);
    }
}
