//! Transaction identifier allocation and subscription bookkeeping

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};

use parking_lot::Mutex;
use tracing::debug;

use crate::{Error, Result};

/// Local AF transaction identifier
pub type TransactionId = u32;

/// Exclusive upper bound of transaction identifiers (`i32::MAX`)
pub const TRANSACTION_ID_LIMIT: TransactionId = 0x7fff_ffff;

/// What the gateway remembers about a live transaction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionEntry {
    /// Downstream subscription the transaction belongs to, once known
    pub subscription_id: Option<String>,
    /// The consumer's own notification destination
    pub notification_destination: Option<String>,
}

#[derive(Debug, Default)]
struct Inner {
    transactions: BTreeMap<TransactionId, TransactionEntry>,
    subscriptions: HashMap<String, TransactionId>,
}

/// Registry of live transaction ids and the subscriptions using them.
///
/// Allocation continues upward from the greatest live id and only wraps to 1
/// once that id reaches the top of the range, so ids freed below the current
/// maximum are not handed out again until a wrap.
#[derive(Debug)]
pub struct TransactionRegistry {
    inner: Mutex<Inner>,
    limit: TransactionId,
}

impl Default for TransactionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionRegistry {
    /// Registry over the full `[1, i32::MAX)` range
    #[must_use]
    pub fn new() -> Self {
        Self::with_limit(TRANSACTION_ID_LIMIT)
    }

    /// Registry over `[1, limit)`. Limits below 2 are raised to 2 so id 1
    /// always exists.
    #[must_use]
    pub fn with_limit(limit: TransactionId) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            limit: limit.max(2),
        }
    }

    /// Reserve a fresh transaction id for `entry`
    pub fn allocate(&self, entry: TransactionEntry) -> Result<TransactionId> {
        let mut inner = self.inner.lock();
        let highest = self.limit - 1;
        let current_max = inner.transactions.keys().next_back().copied().unwrap_or(0);

        let mut cursor = if current_max >= highest { 0 } else { current_max };
        while cursor < highest {
            cursor += 1;
            if let Entry::Vacant(slot) = inner.transactions.entry(cursor) {
                slot.insert(entry);
                debug!(transaction_id = cursor, "Allocated transaction id");
                return Ok(cursor);
            }
        }

        Err(Error::PoolExhausted)
    }

    /// Free a transaction id. Releasing an unknown id is a no-op.
    pub fn release(&self, id: TransactionId) -> Option<TransactionEntry> {
        let mut inner = self.inner.lock();
        let entry = inner.transactions.remove(&id)?;
        if let Some(sub) = &entry.subscription_id {
            if inner.subscriptions.get(sub) == Some(&id) {
                inner.subscriptions.remove(sub);
            }
        }
        debug!(transaction_id = id, "Released transaction id");
        Some(entry)
    }

    /// Associate a subscription with a live transaction
    pub fn bind(&self, subscription_id: &str, id: TransactionId) -> Result<()> {
        let mut inner = self.inner.lock();
        let entry = inner
            .transactions
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("transaction {id}")))?;
        entry.subscription_id = Some(subscription_id.to_string());

        if let Some(previous) = inner.subscriptions.insert(subscription_id.to_string(), id) {
            if previous != id {
                inner.transactions.remove(&previous);
                debug!(subscription_id, transaction_id = previous, "Replaced transaction of subscription");
            }
        }
        Ok(())
    }

    /// Drop a subscription record and release its transaction
    pub fn unbind(&self, subscription_id: &str) -> Option<TransactionId> {
        let mut inner = self.inner.lock();
        let id = inner.subscriptions.remove(subscription_id)?;
        inner.transactions.remove(&id);
        debug!(subscription_id, transaction_id = id, "Removed subscription record");
        Some(id)
    }

    /// Transaction currently bound to a subscription
    #[must_use]
    pub fn transaction_for(&self, subscription_id: &str) -> Option<TransactionId> {
        self.inner.lock().subscriptions.get(subscription_id).copied()
    }

    /// Snapshot of a transaction entry
    #[must_use]
    pub fn get(&self, id: TransactionId) -> Option<TransactionEntry> {
        self.inner.lock().transactions.get(&id).cloned()
    }

    /// Replace the consumer notification destination of a live transaction
    pub fn set_notification_destination(&self, id: TransactionId, destination: Option<String>) {
        if let Some(entry) = self.inner.lock().transactions.get_mut(&id) {
            entry.notification_destination = destination;
        }
    }

    /// Whether an id is currently reserved
    #[must_use]
    pub fn contains(&self, id: TransactionId) -> bool {
        self.inner.lock().transactions.contains_key(&id)
    }

    /// Number of live transactions
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().transactions.len()
    }

    /// Whether no transaction is live
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of subscription records
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.inner.lock().subscriptions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_allocation_is_one() {
        let registry = TransactionRegistry::new();
        assert_eq!(registry.allocate(TransactionEntry::default()).unwrap(), 1);
        assert_eq!(registry.allocate(TransactionEntry::default()).unwrap(), 2);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_freed_ids_below_max_are_not_reused() {
        let registry = TransactionRegistry::new();
        for _ in 0..3 {
            registry.allocate(TransactionEntry::default()).unwrap();
        }
        registry.release(2);

        assert_eq!(registry.allocate(TransactionEntry::default()).unwrap(), 4);
        assert!(!registry.contains(2));
    }

    #[test]
    fn test_wraps_when_max_id_is_live() {
        let registry = TransactionRegistry::with_limit(5);
        for expected in 1..=4 {
            assert_eq!(registry.allocate(TransactionEntry::default()).unwrap(), expected);
        }
        registry.release(2);

        // 4 is the highest representable id, so the search restarts at 1
        assert_eq!(registry.allocate(TransactionEntry::default()).unwrap(), 2);
    }

    #[test]
    fn test_exhaustion() {
        let registry = TransactionRegistry::with_limit(4);
        for _ in 0..3 {
            registry.allocate(TransactionEntry::default()).unwrap();
        }
        assert!(matches!(
            registry.allocate(TransactionEntry::default()),
            Err(Error::PoolExhausted)
        ));
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_tiny_limit_still_offers_one_id() {
        let registry = TransactionRegistry::with_limit(0);
        assert_eq!(registry.allocate(TransactionEntry::default()).unwrap(), 1);
        assert!(matches!(
            registry.allocate(TransactionEntry::default()),
            Err(Error::PoolExhausted)
        ));
    }

    #[test]
    fn test_allocation_returns_previously_absent_key() {
        let registry = TransactionRegistry::with_limit(64);
        let mut seen = std::collections::HashSet::new();
        for round in 0..200u32 {
            match registry.allocate(TransactionEntry::default()) {
                Ok(id) => {
                    assert!(seen.insert(id), "id {id} handed out twice while live");
                    assert!(registry.contains(id));
                }
                Err(Error::PoolExhausted) => {
                    assert_eq!(registry.len(), 63);
                    break;
                }
                Err(e) => panic!("unexpected error {e}"),
            }
            if round % 3 == 0 {
                let victim = *seen.iter().next().unwrap();
                registry.release(victim);
                seen.remove(&victim);
            }
        }
    }

    #[test]
    fn test_release_is_idempotent() {
        let registry = TransactionRegistry::new();
        let id = registry.allocate(TransactionEntry::default()).unwrap();
        assert!(registry.release(id).is_some());
        assert!(registry.release(id).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_bind_and_unbind() {
        let registry = TransactionRegistry::new();
        let id = registry
            .allocate(TransactionEntry {
                notification_destination: Some("http://consumer/notify".to_string()),
                ..Default::default()
            })
            .unwrap();
        registry.bind("sub-1", id).unwrap();

        assert_eq!(registry.transaction_for("sub-1"), Some(id));
        assert_eq!(registry.get(id).unwrap().subscription_id.as_deref(), Some("sub-1"));

        assert_eq!(registry.unbind("sub-1"), Some(id));
        assert!(registry.is_empty());
        assert_eq!(registry.subscription_count(), 0);
        assert_eq!(registry.unbind("sub-1"), None);
    }

    #[test]
    fn test_rebinding_releases_previous_transaction() {
        let registry = TransactionRegistry::new();
        let first = registry.allocate(TransactionEntry::default()).unwrap();
        registry.bind("sub-1", first).unwrap();
        let second = registry.allocate(TransactionEntry::default()).unwrap();
        registry.bind("sub-1", second).unwrap();

        assert!(!registry.contains(first));
        assert_eq!(registry.transaction_for("sub-1"), Some(second));
    }

    #[test]
    fn test_release_drops_subscription_record() {
        let registry = TransactionRegistry::new();
        let id = registry.allocate(TransactionEntry::default()).unwrap();
        registry.bind("sub-1", id).unwrap();
        registry.release(id);
        assert_eq!(registry.transaction_for("sub-1"), None);
    }
}
