//! The transaction pool implementation

use crate::{PoolError, PoolResult};
use dpos_core::{
    Address, ChainId, CoreError, Gas, Hash, Nonce, Transaction, Wei, TRANSACTION_GAS_PRICE,
    TRANSACTION_MAX_GAS,
};
use parking_lot::Mutex;
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

/// How long a bucket may sit untouched before the whole bucket is evicted
pub const DEFAULT_BUCKET_EXPIRY: Duration = Duration::from_secs(90 * 60);

/// Events published by the pool
#[derive(Debug, Clone)]
pub enum PoolEvent {
    /// A transaction passed admission
    Admitted {
        hash: Hash,
        from: Address,
        gas_price: Wei,
    },
}

/// Per-sender pending transactions, ordered by nonce
struct Bucket {
    /// nonce -> slot id in the pool arena
    txs: BTreeMap<Nonce, u64>,
    /// Touched on every admission into this bucket
    last_update: SystemTime,
}

impl Bucket {
    fn new() -> Self {
        Self {
            txs: BTreeMap::new(),
            last_update: SystemTime::now(),
        }
    }
}

/// State behind the pool-wide lock
///
/// Transactions live once, in `arena`; `all` and the per-bucket nonce maps
/// hold arena ids. The arena id is assigned monotonically and doubles as
/// insertion order.
struct PoolInner {
    buckets: HashMap<Address, Bucket>,
    all: HashMap<Hash, u64>,
    arena: HashMap<u64, Transaction>,
    next_id: u64,
    min_gas_price: Wei,
    max_gas_limit: Gas,
}

/// Bounded, per-sender-bucketed transaction pool
///
/// Every operation takes the single pool lock for its full duration, so the
/// capacity bound and the hash/bucket cross-indices are never observably
/// inconsistent. Admission events are published only after the lock is
/// released.
pub struct TransactionPool {
    chain_id: ChainId,
    capacity: usize,
    bucket_expiry: Duration,
    inner: Mutex<PoolInner>,
    event_sender: Option<UnboundedSender<PoolEvent>>,
}

impl TransactionPool {
    /// Create a pool accepting transactions for `chain_id`, holding at most
    /// `capacity` transactions
    pub fn new(chain_id: ChainId, capacity: usize) -> Self {
        Self {
            chain_id,
            capacity,
            bucket_expiry: DEFAULT_BUCKET_EXPIRY,
            inner: Mutex::new(PoolInner {
                buckets: HashMap::new(),
                all: HashMap::new(),
                arena: HashMap::new(),
                next_id: 0,
                min_gas_price: TRANSACTION_GAS_PRICE,
                max_gas_limit: TRANSACTION_MAX_GAS,
            }),
            event_sender: None,
        }
    }

    /// Override the bucket expiry window
    pub fn with_bucket_expiry(mut self, expiry: Duration) -> Self {
        self.bucket_expiry = expiry;
        self
    }

    /// Set the sink for pool events
    pub fn set_event_sender(&mut self, sender: UnboundedSender<PoolEvent>) {
        self.event_sender = Some(sender);
    }

    /// Admit a signed transaction into the pool
    ///
    /// Checks run in a fixed order and the first failure wins: chain id,
    /// presence of a signature, gas price floor, gas limit ceiling,
    /// duplicate hash, signature integrity. A transaction with the same
    /// (sender, nonce) as a pending one replaces it only at a strictly
    /// higher gas price. If the pool overflows, one transaction is dropped:
    /// the highest nonce from the bucket whose head is cheapest.
    pub fn push(&self, tx: Transaction) -> PoolResult<()> {
        if tx.chain_id != self.chain_id {
            return Err(PoolError::InvalidChainId {
                expected: self.chain_id,
                got: tx.chain_id,
            });
        }

        if tx.signature.is_none() {
            return Err(PoolError::Unsigned);
        }

        let mut inner = self.inner.lock();

        if tx.gas_price < inner.min_gas_price {
            return Err(PoolError::BelowGasPrice {
                min: inner.min_gas_price,
                got: tx.gas_price,
            });
        }

        if tx.gas_limit > inner.max_gas_limit {
            return Err(PoolError::InvalidGasLimit {
                max: inner.max_gas_limit,
                got: tx.gas_limit,
            });
        }

        if inner.all.contains_key(&tx.hash) {
            return Err(PoolError::Duplicate(tx.hash));
        }

        tx.verify_integrity().map_err(|e| match e {
            CoreError::Unsigned => PoolError::Unsigned,
            CoreError::BadSignature | CoreError::InvalidHash(_) => PoolError::BadSignature,
            other => PoolError::Core(other),
        })?;

        let from = tx.from;
        let nonce = tx.nonce;
        let hash = tx.hash;
        let gas_price = tx.gas_price;

        // Same-nonce replacement: strictly higher price displaces the
        // pending transaction, anything else is rejected.
        let displaced = match inner
            .buckets
            .get(&from)
            .and_then(|bucket| bucket.txs.get(&nonce).copied())
        {
            Some(old_id) => {
                let old_price = inner
                    .arena
                    .get(&old_id)
                    .map(|old| old.gas_price)
                    .unwrap_or_default();
                if gas_price <= old_price {
                    return Err(PoolError::ReplacementUnderpriced);
                }
                Some(old_id)
            }
            None => None,
        };

        if let Some(old_id) = displaced {
            if let Some(old) = inner.arena.remove(&old_id) {
                inner.all.remove(&old.hash);
                debug!(sender = %from, nonce, old = %old.hash, new = %hash, "replaced pending transaction");
            }
        }

        let id = inner.next_id;
        inner.next_id += 1;
        inner.all.insert(hash, id);
        inner.arena.insert(id, tx);

        let bucket = inner.buckets.entry(from).or_insert_with(Bucket::new);
        bucket.txs.insert(nonce, id);
        bucket.last_update = SystemTime::now();

        if inner.all.len() > self.capacity {
            if let Some(victim) = evict_one(&mut inner) {
                debug!(dropped = %victim.hash, sender = %victim.from, "pool over capacity");
            } else {
                warn!("pool over capacity but no eviction victim found");
            }
        }

        drop(inner);

        self.publish(PoolEvent::Admitted {
            hash,
            from,
            gas_price,
        });
        Ok(())
    }

    /// Remove and return the globally best pending transaction
    ///
    /// Only bucket heads (lowest nonce per sender) are candidates; the head
    /// with the highest gas price wins, ties broken by lower nonce, then by
    /// earlier insertion. Returns `None` when the pool is empty.
    pub fn pop(&self) -> Option<Transaction> {
        let mut inner = self.inner.lock();

        let (sender, nonce, id) = inner
            .buckets
            .iter()
            .filter_map(|(addr, bucket)| {
                let (&nonce, &id) = bucket.txs.first_key_value()?;
                let price = inner.arena.get(&id)?.gas_price;
                Some((*addr, nonce, id, price))
            })
            .max_by_key(|&(_, nonce, id, price)| (price, Reverse(nonce), Reverse(id)))
            .map(|(addr, nonce, id, _)| (addr, nonce, id))?;

        if let Some(bucket) = inner.buckets.get_mut(&sender) {
            bucket.txs.remove(&nonce);
            if bucket.txs.is_empty() {
                inner.buckets.remove(&sender);
            }
        }

        let tx = inner.arena.remove(&id)?;
        inner.all.remove(&tx.hash);
        Some(tx)
    }

    /// Drop every bucket that has been idle longer than the expiry window
    ///
    /// A bucket exactly at the boundary survives; strictly older ones are
    /// removed together with all their transactions.
    pub fn evict_expired(&self) {
        let mut inner = self.inner.lock();
        let now = SystemTime::now();

        let expired: Vec<Address> = inner
            .buckets
            .iter()
            .filter(|(_, bucket)| {
                now.duration_since(bucket.last_update).unwrap_or_default() > self.bucket_expiry
            })
            .map(|(addr, _)| *addr)
            .collect();

        for sender in expired {
            if let Some(bucket) = inner.buckets.remove(&sender) {
                info!(sender = %sender, count = bucket.txs.len(), "evicting expired bucket");
                for (_, id) in bucket.txs {
                    if let Some(tx) = inner.arena.remove(&id) {
                        inner.all.remove(&tx.hash);
                    }
                }
            }
        }
    }

    /// Update the gas admission bounds; `None` resets to the defaults
    pub fn set_gas_config(&self, min_gas_price: Option<Wei>, max_gas_limit: Option<Gas>) {
        let mut inner = self.inner.lock();
        inner.min_gas_price = min_gas_price.unwrap_or(TRANSACTION_GAS_PRICE);
        inner.max_gas_limit = max_gas_limit.unwrap_or(TRANSACTION_MAX_GAS);
    }

    /// Current (min gas price, max gas limit) admission bounds
    pub fn gas_config(&self) -> (Wei, Gas) {
        let inner = self.inner.lock();
        (inner.min_gas_price, inner.max_gas_limit)
    }

    /// Look up a pending transaction by hash
    pub fn get_by_hash(&self, hash: &Hash) -> Option<Transaction> {
        let inner = self.inner.lock();
        let id = inner.all.get(hash)?;
        inner.arena.get(id).cloned()
    }

    /// Number of pending transactions
    pub fn len(&self) -> usize {
        self.inner.lock().all.len()
    }

    /// Whether the pool holds no transactions
    pub fn is_empty(&self) -> bool {
        self.inner.lock().all.is_empty()
    }

    fn publish(&self, event: PoolEvent) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event) {
                warn!("failed to publish pool event: {}", e);
            }
        }
    }
}

/// Drop one transaction to restore the capacity bound
///
/// Victim selection: the bucket whose head has the lowest gas price loses
/// its highest-nonce entry. Head-price ties prefer the bucket with the
/// higher tail nonce (the furthest-future transaction overall), then the
/// smaller sender address.
fn evict_one(inner: &mut PoolInner) -> Option<Transaction> {
    let victim_sender = inner
        .buckets
        .iter()
        .filter_map(|(addr, bucket)| {
            let (_, &head_id) = bucket.txs.first_key_value()?;
            let head_price = inner.arena.get(&head_id)?.gas_price;
            let (&tail_nonce, _) = bucket.txs.last_key_value()?;
            Some((*addr, head_price, tail_nonce))
        })
        .min_by_key(|&(addr, price, tail_nonce)| (price, Reverse(tail_nonce), addr))
        .map(|(addr, _, _)| addr)?;

    let victim_id = {
        let bucket = inner.buckets.get_mut(&victim_sender)?;
        let (&nonce, &id) = bucket.txs.last_key_value()?;
        bucket.txs.remove(&nonce);
        if bucket.txs.is_empty() {
            inner.buckets.remove(&victim_sender);
        }
        id
    };

    let victim = inner.arena.remove(&victim_id)?;
    inner.all.remove(&victim.hash);
    Some(victim)
}

/// Periodically evict expired buckets until the pool is dropped
pub async fn run_eviction_loop(pool: Arc<TransactionPool>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    loop {
        ticker.tick().await;
        pool.evict_expired();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dpos_core::{KeypairSigner, PayloadType, Signer};
    use tokio::sync::mpsc;

    const CHAIN_ID: ChainId = 100;

    fn signer(seed: u8) -> KeypairSigner {
        KeypairSigner::from_secret_bytes(&[seed; 32]).unwrap()
    }

    fn signed_tx(signer: &KeypairSigner, nonce: Nonce, gas_price: Wei) -> Transaction {
        signed_tx_on(signer, CHAIN_ID, nonce, gas_price)
    }

    fn signed_tx_on(
        signer: &KeypairSigner,
        chain_id: ChainId,
        nonce: Nonce,
        gas_price: Wei,
    ) -> Transaction {
        let mut tx = Transaction::new(
            chain_id,
            signer.address(),
            Address::zero(),
            0,
            nonce,
            PayloadType::Binary,
            vec![nonce as u8],
            gas_price,
            200_000,
        )
        .unwrap();
        let sig = signer.sign(&tx.hash).unwrap();
        tx.signature = Some(sig);
        tx
    }

    #[test]
    fn test_push_pop_identity() {
        let pool = TransactionPool::new(CHAIN_ID, 3);
        assert!(pool.is_empty());
        assert!(pool.pop().is_none());

        let tx = signed_tx(&signer(0x11), 1, TRANSACTION_GAS_PRICE);
        pool.push(tx.clone()).unwrap();
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.get_by_hash(&tx.hash).unwrap().hash, tx.hash);

        let popped = pool.pop().unwrap();
        assert_eq!(popped, tx);
        assert!(pool.is_empty());
        assert!(pool.pop().is_none());
    }

    #[test]
    fn test_duplicate_push_fails() {
        let pool = TransactionPool::new(CHAIN_ID, 3);
        let tx = signed_tx(&signer(0x11), 1, TRANSACTION_GAS_PRICE);

        pool.push(tx.clone()).unwrap();
        assert!(matches!(
            pool.push(tx).unwrap_err(),
            PoolError::Duplicate(_)
        ));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_admission_checks() {
        let pool = TransactionPool::new(CHAIN_ID, 3);
        let s1 = signer(0x11);

        // wrong chain
        let tx = signed_tx_on(&s1, CHAIN_ID + 1, 1, TRANSACTION_GAS_PRICE);
        assert!(matches!(
            pool.push(tx).unwrap_err(),
            PoolError::InvalidChainId { .. }
        ));

        // unsigned
        let mut tx = signed_tx(&s1, 1, TRANSACTION_GAS_PRICE);
        tx.signature = None;
        assert!(matches!(pool.push(tx).unwrap_err(), PoolError::Unsigned));

        // below the gas price floor
        let tx = signed_tx(&s1, 1, TRANSACTION_GAS_PRICE - 1);
        assert!(matches!(
            pool.push(tx).unwrap_err(),
            PoolError::BelowGasPrice { .. }
        ));

        // above the gas limit ceiling after tightening the config
        pool.set_gas_config(None, Some(100_000));
        let tx = signed_tx(&s1, 1, TRANSACTION_GAS_PRICE);
        assert!(matches!(
            pool.push(tx).unwrap_err(),
            PoolError::InvalidGasLimit { max: 100_000, .. }
        ));

        // signature by a key that does not own `from`
        pool.set_gas_config(None, None);
        let mut tx = signed_tx(&s1, 1, TRANSACTION_GAS_PRICE);
        tx.signature = Some(signer(0x22).sign(&tx.hash).unwrap());
        assert!(matches!(
            pool.push(tx).unwrap_err(),
            PoolError::BadSignature
        ));

        assert!(pool.is_empty());
    }

    #[test]
    fn test_capacity_evicts_cheapest_buckets_tail() {
        let pool = TransactionPool::new(CHAIN_ID, 3);
        let s1 = signer(0x11);
        let s2 = signer(0x22);

        let tx0 = signed_tx(&s1, 10, TRANSACTION_GAS_PRICE);
        let tx1 = signed_tx(&s2, 1, TRANSACTION_GAS_PRICE * 2);
        let tx2 = signed_tx(&s1, 1, TRANSACTION_GAS_PRICE);
        let tx3 = signed_tx(&s1, 2, TRANSACTION_GAS_PRICE);

        pool.push(tx0.clone()).unwrap();
        pool.push(tx1.clone()).unwrap();
        pool.push(tx2.clone()).unwrap();
        assert_eq!(pool.len(), 3);
        assert!(pool.get_by_hash(&tx0.hash).is_some());

        // the overflow drops the furthest-future tx of the cheapest bucket,
        // not the newcomer
        pool.push(tx3.clone()).unwrap();
        assert_eq!(pool.len(), 3);
        assert!(pool.get_by_hash(&tx0.hash).is_none());
        assert!(pool.get_by_hash(&tx1.hash).is_some());
        assert!(pool.get_by_hash(&tx2.hash).is_some());
        assert!(pool.get_by_hash(&tx3.hash).is_some());
    }

    #[test]
    fn test_capacity_eviction_tie_prefers_furthest_nonce() {
        let pool = TransactionPool::new(CHAIN_ID, 2);
        let s1 = signer(0x11);
        let s2 = signer(0x22);

        let a1 = signed_tx(&s1, 1, TRANSACTION_GAS_PRICE);
        let b1 = signed_tx(&s2, 1, TRANSACTION_GAS_PRICE);
        let b2 = signed_tx(&s2, 2, TRANSACTION_GAS_PRICE);

        pool.push(a1.clone()).unwrap();
        pool.push(b1.clone()).unwrap();
        // both heads are equally priced; the bucket with the higher tail
        // nonce loses its tail, which here is the newcomer itself
        pool.push(b2.clone()).unwrap();

        assert_eq!(pool.len(), 2);
        assert!(pool.get_by_hash(&a1.hash).is_some());
        assert!(pool.get_by_hash(&b1.hash).is_some());
        assert!(pool.get_by_hash(&b2.hash).is_none());
    }

    #[test]
    fn test_pop_order() {
        let pool = TransactionPool::new(CHAIN_ID, 64);
        let s1 = signer(0x11);
        let s2 = signer(0x22);
        let high = TRANSACTION_GAS_PRICE * 2;

        pool.push(signed_tx(&s1, 3, TRANSACTION_GAS_PRICE)).unwrap();
        pool.push(signed_tx(&s2, 2, high)).unwrap();
        pool.push(signed_tx(&s1, 2, TRANSACTION_GAS_PRICE)).unwrap();
        pool.push(signed_tx(&s1, 1, TRANSACTION_GAS_PRICE)).unwrap();
        pool.push(signed_tx(&s2, 1, high)).unwrap();

        let order: Vec<(Address, Nonce)> = std::iter::from_fn(|| pool.pop())
            .map(|tx| (tx.from, tx.nonce))
            .collect();
        assert_eq!(
            order,
            vec![
                (s2.address(), 1),
                (s2.address(), 2),
                (s1.address(), 1),
                (s1.address(), 2),
                (s1.address(), 3),
            ]
        );
        assert!(pool.is_empty());
    }

    #[test]
    fn test_replacement_rules() {
        let pool = TransactionPool::new(CHAIN_ID, 8);
        let s1 = signer(0x11);

        let cheap = signed_tx(&s1, 1, TRANSACTION_GAS_PRICE);
        pool.push(cheap.clone()).unwrap();

        // equal price: rejected
        let equal = signed_tx(&s1, 1, TRANSACTION_GAS_PRICE);
        assert!(matches!(
            pool.push(equal).unwrap_err(),
            PoolError::ReplacementUnderpriced
        ));

        // strictly higher price: displaces the pending tx
        let pricier = signed_tx(&s1, 1, TRANSACTION_GAS_PRICE + 1);
        pool.push(pricier.clone()).unwrap();
        assert_eq!(pool.len(), 1);
        assert!(pool.get_by_hash(&cheap.hash).is_none());

        let popped = pool.pop().unwrap();
        assert_eq!(popped.hash, pricier.hash);
    }

    #[test]
    fn test_bucket_expiry() {
        let pool = TransactionPool::new(CHAIN_ID, 16);
        let s1 = signer(0x11);
        let s2 = signer(0x22);

        let tx_a = signed_tx(&s1, 1, TRANSACTION_GAS_PRICE);
        let tx_b = signed_tx(&s1, 2, TRANSACTION_GAS_PRICE);
        let tx_c = signed_tx(&s2, 1, TRANSACTION_GAS_PRICE);
        pool.push(tx_a.clone()).unwrap();
        pool.push(tx_b.clone()).unwrap();
        pool.push(tx_c.clone()).unwrap();

        let backdate = |minutes: u64| {
            let mut inner = pool.inner.lock();
            let bucket = inner.buckets.get_mut(&s1.address()).unwrap();
            bucket.last_update = SystemTime::now() - Duration::from_secs(minutes * 60);
        };

        // 89 minutes idle: inside the window, bucket survives
        backdate(89);
        pool.evict_expired();
        assert!(pool.get_by_hash(&tx_a.hash).is_some());
        assert!(pool.get_by_hash(&tx_b.hash).is_some());
        assert!(pool.inner.lock().buckets.contains_key(&s1.address()));

        // 91 minutes idle: bucket and all its transactions are gone
        backdate(91);
        pool.evict_expired();
        assert!(pool.get_by_hash(&tx_a.hash).is_none());
        assert!(pool.get_by_hash(&tx_b.hash).is_none());
        assert!(pool.get_by_hash(&tx_c.hash).is_some());
        assert!(!pool.inner.lock().buckets.contains_key(&s1.address()));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_gas_config_reset() {
        let pool = TransactionPool::new(CHAIN_ID, 3);

        pool.set_gas_config(Some(1), Some(1));
        assert_eq!(pool.gas_config(), (1, 1));

        pool.set_gas_config(None, None);
        assert_eq!(
            pool.gas_config(),
            (TRANSACTION_GAS_PRICE, TRANSACTION_MAX_GAS)
        );
    }

    #[test]
    fn test_admission_event_published() {
        let mut pool = TransactionPool::new(CHAIN_ID, 3);
        let (sender, mut receiver) = mpsc::unbounded_channel();
        pool.set_event_sender(sender);

        let tx = signed_tx(&signer(0x11), 1, TRANSACTION_GAS_PRICE);
        pool.push(tx.clone()).unwrap();

        match receiver.try_recv().unwrap() {
            PoolEvent::Admitted { hash, from, .. } => {
                assert_eq!(hash, tx.hash);
                assert_eq!(from, tx.from);
            }
        }
    }

    #[test]
    fn test_cross_index_invariants() {
        let pool = TransactionPool::new(CHAIN_ID, 4);
        let signers: Vec<KeypairSigner> = (1u8..=3).map(|i| signer(0x10 * i)).collect();

        for (i, s) in signers.iter().enumerate() {
            for nonce in 1..=3 {
                let _ = pool.push(signed_tx(s, nonce, TRANSACTION_GAS_PRICE * (i as u128 + 1)));
            }
        }
        pool.pop();

        let inner = pool.inner.lock();
        assert!(inner.all.len() <= 4);
        assert_eq!(inner.all.len(), inner.arena.len());
        let bucket_total: usize = inner.buckets.values().map(|b| b.txs.len()).sum();
        assert_eq!(bucket_total, inner.all.len());
        for (hash, id) in &inner.all {
            assert_eq!(inner.arena[id].hash, *hash);
        }
    }
}
