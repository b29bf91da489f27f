use std::collections::{BTreeSet, HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{CacheStore, Op, StoreError, StoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    List,
    Set,
    Counter,
}

#[derive(Debug)]
enum Value {
    List(VecDeque<String>),
    Set(BTreeSet<String>),
    Counter(u64),
}

impl Value {
    fn kind(&self) -> Kind {
        match self {
            Value::List(_) => Kind::List,
            Value::Set(_) => Kind::Set,
            Value::Counter(_) => Kind::Counter,
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Value::List(list) => list.is_empty(),
            Value::Set(set) => set.is_empty(),
            Value::Counter(_) => false,
        }
    }
}

#[derive(Debug)]
struct Slot {
    value: Value,
    expires_at: Option<Instant>,
}

impl Slot {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |deadline| now < deadline)
    }
}

/// In-process cache store. Expired keys are dropped lazily when touched and in
/// bulk by [`CacheStore::purge_expired`].
#[derive(Default)]
pub struct MemoryStore {
    slots: Mutex<HashMap<String, Slot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Returns the live slot for `key`, evicting it first if it has expired.
fn live<'a>(slots: &'a mut HashMap<String, Slot>, key: &str, now: Instant) -> Option<&'a mut Slot> {
    if slots.get(key).is_some_and(|slot| !slot.is_live(now)) {
        slots.remove(key);
    }
    slots.get_mut(key)
}

fn op_key(op: &Op) -> &str {
    match op {
        Op::PushFront { key, .. }
        | Op::PushBack { key, .. }
        | Op::Trim { key, .. }
        | Op::Delete { key }
        | Op::Expire { key, .. } => key,
    }
}

/// Walks the batch tracking only key types, so a batch that would hit a wrong
/// type is rejected before anything is written.
fn check_batch(slots: &HashMap<String, Slot>, ops: &[Op], now: Instant) -> StoreResult<()> {
    let mut kinds: HashMap<&str, Option<Kind>> = HashMap::new();
    for op in ops {
        let key = op_key(op);
        let kind = kinds.entry(key).or_insert_with(|| {
            slots
                .get(key)
                .filter(|slot| slot.is_live(now))
                .map(|slot| slot.value.kind())
        });
        match op {
            Op::PushFront { .. } | Op::PushBack { .. } => match *kind {
                Some(Kind::List) | None => *kind = Some(Kind::List),
                Some(_) => return Err(StoreError::WrongType(key.to_string())),
            },
            Op::Trim { .. } => {
                if kind.is_some_and(|k| k != Kind::List) {
                    return Err(StoreError::WrongType(key.to_string()));
                }
            }
            Op::Delete { .. } => *kind = None,
            Op::Expire { .. } => {}
        }
    }
    Ok(())
}

fn list_entry<'a>(slots: &'a mut HashMap<String, Slot>, key: &str) -> StoreResult<&'a mut VecDeque<String>> {
    let slot = slots.entry(key.to_string()).or_insert_with(|| Slot {
        value: Value::List(VecDeque::new()),
        expires_at: None,
    });
    match &mut slot.value {
        Value::List(list) => Ok(list),
        _ => Err(StoreError::WrongType(key.to_string())),
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn atomic(&self, ops: Vec<Op>) -> StoreResult<()> {
        let mut slots = self.slots.lock().await;
        let now = Instant::now();

        check_batch(&slots, &ops, now)?;

        for op in ops {
            // Expired keys must not leak their old contents into the batch.
            live(&mut slots, op_key(&op), now);
            match op {
                Op::PushFront { key, value } => {
                    list_entry(&mut slots, &key)?.push_front(value);
                }
                // An empty list is an absent key.
                Op::PushBack { values, .. } if values.is_empty() => {}
                Op::PushBack { key, values } => {
                    list_entry(&mut slots, &key)?.extend(values);
                }
                Op::Trim { key, keep } => {
                    if let Some(Slot {
                        value: Value::List(list),
                        ..
                    }) = slots.get_mut(&key)
                    {
                        list.truncate(keep);
                    }
                    if slots.get(&key).is_some_and(|slot| slot.value.is_empty()) {
                        slots.remove(&key);
                    }
                }
                Op::Delete { key } => {
                    slots.remove(&key);
                }
                Op::Expire { key, ttl } => {
                    if let Some(slot) = slots.get_mut(&key) {
                        slot.expires_at = Some(now + ttl);
                    }
                }
            }
        }
        Ok(())
    }

    async fn range(&self, key: &str, offset: usize, limit: usize) -> StoreResult<Vec<String>> {
        let mut slots = self.slots.lock().await;
        match live(&mut slots, key, Instant::now()) {
            None => Ok(Vec::new()),
            Some(Slot {
                value: Value::List(list),
                ..
            }) => Ok(list.iter().skip(offset).take(limit).cloned().collect()),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
        }
    }

    async fn set_add(&self, key: &str, member: &str) -> StoreResult<bool> {
        let mut slots = self.slots.lock().await;
        live(&mut slots, key, Instant::now());
        let slot = slots.entry(key.to_string()).or_insert_with(|| Slot {
            value: Value::Set(BTreeSet::new()),
            expires_at: None,
        });
        match &mut slot.value {
            Value::Set(set) => Ok(set.insert(member.to_string())),
            _ => Err(StoreError::WrongType(key.to_string())),
        }
    }

    async fn set_remove(&self, key: &str, member: &str) -> StoreResult<bool> {
        let mut slots = self.slots.lock().await;
        let removed = match live(&mut slots, key, Instant::now()) {
            None => return Ok(false),
            Some(Slot {
                value: Value::Set(set),
                ..
            }) => set.remove(member),
            Some(_) => return Err(StoreError::WrongType(key.to_string())),
        };
        if slots.get(key).is_some_and(|slot| slot.value.is_empty()) {
            slots.remove(key);
        }
        Ok(removed)
    }

    async fn set_contains(&self, key: &str, member: &str) -> StoreResult<bool> {
        let mut slots = self.slots.lock().await;
        match live(&mut slots, key, Instant::now()) {
            None => Ok(false),
            Some(Slot {
                value: Value::Set(set),
                ..
            }) => Ok(set.contains(member)),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
        }
    }

    async fn set_members(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut slots = self.slots.lock().await;
        match live(&mut slots, key, Instant::now()) {
            None => Ok(Vec::new()),
            Some(Slot {
                value: Value::Set(set),
                ..
            }) => Ok(set.iter().cloned().collect()),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
        }
    }

    async fn incr(&self, key: &str, ttl: Duration) -> StoreResult<u64> {
        let mut slots = self.slots.lock().await;
        let now = Instant::now();
        match live(&mut slots, key, now) {
            None => {
                slots.insert(
                    key.to_string(),
                    Slot {
                        value: Value::Counter(1),
                        expires_at: Some(now + ttl),
                    },
                );
                Ok(1)
            }
            Some(Slot {
                value: Value::Counter(count),
                ..
            }) => {
                *count += 1;
                Ok(*count)
            }
            Some(_) => Err(StoreError::WrongType(key.to_string())),
        }
    }

    async fn purge_expired(&self) -> StoreResult<usize> {
        let mut slots = self.slots.lock().await;
        let now = Instant::now();
        let before = slots.len();
        slots.retain(|_, slot| slot.is_live(now));
        Ok(before - slots.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::conformance;
    use std::sync::Arc;

    #[tokio::test]
    async fn push_trim_range() {
        conformance::push_trim_range(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn delete_then_rewrite() {
        conformance::delete_then_rewrite(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn failed_batch_changes_nothing() {
        conformance::failed_batch_changes_nothing(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn sets() {
        conformance::sets(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn wrong_type_reads() {
        conformance::wrong_type_reads(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn zero_ttl_expires_immediately() {
        conformance::zero_ttl_expires_immediately(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn counters() {
        conformance::counters(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn offsets_past_i64_read_empty() {
        conformance::offsets_past_i64_read_empty(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn empty_push_back_leaves_no_key() {
        conformance::empty_push_back_leaves_no_key(&MemoryStore::new()).await;
    }

    #[tokio::test(start_paused = true)]
    async fn list_expires_after_ttl() {
        let store = MemoryStore::new();
        store
            .atomic(vec![
                Op::PushBack {
                    key: "home".into(),
                    values: vec!["a".into()],
                },
                Op::Expire {
                    key: "home".into(),
                    ttl: Duration::from_secs(24 * 3600),
                },
            ])
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(23 * 3600)).await;
        assert_eq!(store.range("home", 0, 10).await.unwrap(), vec!["a"]);

        tokio::time::advance(Duration::from_secs(2 * 3600)).await;
        assert!(store.range("home", 0, 10).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn counter_window_resets_after_ttl() {
        let store = MemoryStore::new();
        let window = Duration::from_secs(60);
        assert_eq!(store.incr("rl", window).await.unwrap(), 1);
        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(store.incr("rl", window).await.unwrap(), 2);
        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(store.incr("rl", window).await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn purge_drops_only_expired_keys() {
        let store = MemoryStore::new();
        store.set_add("keep", "x").await.unwrap();
        store.incr("drop", Duration::from_secs(1)).await.unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert!(store.set_contains("keep", "x").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn push_onto_expired_list_starts_fresh() {
        let store = MemoryStore::new();
        store
            .atomic(vec![
                Op::PushFront {
                    key: "l".into(),
                    value: "old".into(),
                },
                Op::Expire {
                    key: "l".into(),
                    ttl: Duration::from_secs(5),
                },
            ])
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(6)).await;
        store
            .atomic(vec![Op::PushFront {
                key: "l".into(),
                value: "new".into(),
            }])
            .await
            .unwrap();
        assert_eq!(store.range("l", 0, 10).await.unwrap(), vec!["new"]);
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_sweep_reclaims_expired_keys() {
        let store = Arc::new(MemoryStore::new());
        store.incr("short", Duration::from_secs(1)).await.unwrap();
        store.set_add("keep", "x").await.unwrap();

        let sweep = crate::cache::spawn_expiry_sweep(store.clone(), Duration::from_secs(10));
        tokio::time::sleep(Duration::from_secs(11)).await;

        assert_eq!(store.slots.lock().await.len(), 1);
        sweep.abort();
    }
}
