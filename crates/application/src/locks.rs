//! 进程内的按聚合加锁

use std::sync::Arc;

use dashmap::DashMap;
use domain::{PartyId, UserId};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// 锁的排序即加锁顺序：所有用户键排在派对键之前。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LockKey {
    User(UserId),
    Party(PartyId),
}

/// 已持有的一组聚合锁，drop 时一并释放
pub struct LockSet {
    keys: Vec<LockKey>,
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl LockSet {
    pub fn holds(&self, key: LockKey) -> bool {
        self.keys.contains(&key)
    }
}

#[derive(Default)]
pub struct AggregateLocks {
    table: DashMap<LockKey, Arc<Mutex<()>>>,
}

impl AggregateLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: LockKey) -> Arc<Mutex<()>> {
        self.table.entry(key).or_default().clone()
    }

    /// 按全局顺序获取一组锁，重复的键只锁一次。
    pub async fn acquire(&self, keys: impl IntoIterator<Item = LockKey>) -> LockSet {
        let mut keys: Vec<LockKey> = keys.into_iter().collect();
        keys.sort();
        keys.dedup();

        let mut guards = Vec::with_capacity(keys.len());
        for key in &keys {
            guards.push(self.slot(*key).lock_owned().await);
        }
        LockSet {
            keys,
            _guards: guards,
        }
    }

    /// 在已持有的锁之上追加一个键。
    ///
    /// 新键必须排在所有已持有键之后，否则可能与其他任务形成环形等待。
    pub async fn extend(&self, set: &mut LockSet, key: LockKey) {
        if set.holds(key) {
            return;
        }
        debug_assert!(
            set.keys.last().map_or(true, |last| *last < key),
            "lock {key:?} acquired out of order"
        );
        let guard = self.slot(key).lock_owned().await;
        set.keys.push(key);
        set._guards.push(guard);
    }

    /// 清理没有任务持有的锁条目
    pub fn prune(&self) -> usize {
        let before = self.table.len();
        self.table.retain(|_, slot| Arc::strong_count(slot) > 1);
        before.saturating_sub(self.table.len())
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
