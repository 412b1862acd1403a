//! 实时事件分发与连接注册表
//!
//! 注册表记录 `连接 -> uid` 的映射，一个 uid 可以同时有多个连接（多设备）。
//! 通知按收件人解析到各自的连接后逐个投递，未认证的连接不会收到任何通知。

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use domain::{Notification, UserId};
use serde::Serialize;
use tokio::sync::{mpsc, RwLock};

use crate::broadcaster::{BroadcastError, EventPublisher};
use crate::locks::{AggregateLocks, LockKey, LockSet};
use crate::presence::PresenceDirectory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// 直接回复单个连接的控制帧，与事件帧使用相同的信封格式
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ControlFrame {
    Authenticated { uid: UserId },
    Error { code: String, message: String },
}

/// 认证或断开引起的在线状态跃迁
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PresenceChange {
    /// 第一个连接完成认证的用户
    pub came_online: Option<UserId>,
    /// 最后一个连接已关闭的用户
    pub went_offline: Option<UserId>,
}

/// 一次在线状态跃迁。持有期间同一 uid 的后续跃迁会等待，
/// 调用方应在广播完上下线通知之后再释放。
pub struct PresenceTransition {
    pub change: PresenceChange,
    _order: LockSet,
}

struct ConnectionEntry {
    uid: Option<UserId>,
    sender: mpsc::Sender<String>,
}

#[derive(Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    by_user: HashMap<UserId, HashSet<ConnectionId>>,
}

impl ConnectionRegistry {
    fn insert(&mut self, id: ConnectionId, sender: mpsc::Sender<String>) {
        self.connections
            .insert(id, ConnectionEntry { uid: None, sender });
    }

    /// 把连接从当前 uid 上解绑，返回因此离线的 uid
    fn unbind(&mut self, id: ConnectionId) -> Option<UserId> {
        let uid = self.connections.get_mut(&id)?.uid.take()?;
        let remaining = self.by_user.get_mut(&uid).map(|set| {
            set.remove(&id);
            set.len()
        });
        if remaining == Some(0) {
            self.by_user.remove(&uid);
            return Some(uid);
        }
        None
    }

    fn bind(&mut self, id: ConnectionId, uid: UserId) -> Option<PresenceChange> {
        let current = self.connections.get(&id)?.uid;
        if current == Some(uid) {
            return Some(PresenceChange::default());
        }

        let went_offline = self.unbind(id);
        let entry = self.connections.get_mut(&id)?;
        entry.uid = Some(uid);

        let set = self.by_user.entry(uid).or_default();
        let first = set.is_empty();
        set.insert(id);

        Some(PresenceChange {
            came_online: first.then_some(uid),
            went_offline,
        })
    }

    fn remove(&mut self, id: ConnectionId) -> Option<UserId> {
        let went_offline = self.unbind(id);
        self.connections.remove(&id);
        went_offline
    }

    fn senders_of(&self, uid: UserId) -> impl Iterator<Item = (ConnectionId, &mpsc::Sender<String>)> + '_ {
        self.by_user
            .get(&uid)
            .into_iter()
            .flatten()
            .filter_map(|id| self.connections.get(id).map(|entry| (*id, &entry.sender)))
    }

    pub fn is_online(&self, uid: UserId) -> bool {
        self.by_user.contains_key(&uid)
    }
}

/// 事件分发组件，连接注册表只通过它修改。
pub struct EventFanout {
    registry: RwLock<ConnectionRegistry>,
    transitions: AggregateLocks,
    next_id: AtomicU64,
    buffer: usize,
}

impl EventFanout {
    /// `buffer` 为每个连接可积压的帧数，写满后新的帧会被丢弃
    pub fn new(buffer: usize) -> Self {
        Self {
            registry: RwLock::new(ConnectionRegistry::default()),
            transitions: AggregateLocks::new(),
            next_id: AtomicU64::new(1),
            buffer: buffer.max(1),
        }
    }

    /// 登记一个尚未认证的连接，返回它的出站帧接收端
    pub async fn connect(&self) -> (ConnectionId, mpsc::Receiver<String>) {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.buffer);
        self.registry.write().await.insert(id, tx);
        tracing::debug!(connection_id = %id, "connection registered");
        (id, rx)
    }

    /// 将连接绑定到 uid。连接已不存在时返回 `None`。
    ///
    /// 涉及的 uid（新绑定的以及被替换的）在跃迁期间加锁，
    /// 同一用户的上线和离线通知因此按发生顺序广播。
    pub async fn authenticate(&self, id: ConnectionId, uid: UserId) -> Option<PresenceTransition> {
        let previous = self.uid_of(id).await;
        let keys = std::iter::once(uid).chain(previous).map(LockKey::User);
        let order = self.transitions.acquire(keys).await;

        let change = self.registry.write().await.bind(id, uid)?;
        tracing::info!(connection_id = %id, user_id = %uid, "connection authenticated");
        Some(PresenceTransition { change, _order: order })
    }

    /// 注销连接。连接未知时返回 `None`，`went_offline` 为最后一个连接随之关闭的 uid。
    pub async fn disconnect(&self, id: ConnectionId) -> Option<PresenceTransition> {
        let previous = self.uid_of(id).await;
        let order = self.transitions.acquire(previous.map(LockKey::User)).await;

        let mut registry = self.registry.write().await;
        if !registry.connections.contains_key(&id) {
            return None;
        }
        let went_offline = registry.remove(id);
        drop(registry);
        tracing::debug!(connection_id = %id, offline = ?went_offline, "connection removed");

        Some(PresenceTransition {
            change: PresenceChange {
                came_online: None,
                went_offline,
            },
            _order: order,
        })
    }

    /// 回收空闲的跃迁锁槽位
    pub fn prune_transitions(&self) -> usize {
        self.transitions.prune()
    }

    pub async fn uid_of(&self, id: ConnectionId) -> Option<UserId> {
        self.registry
            .read()
            .await
            .connections
            .get(&id)
            .and_then(|entry| entry.uid)
    }

    /// 向单个连接发送控制帧
    pub async fn send_control(&self, id: ConnectionId, frame: &ControlFrame) {
        let payload = match serde_json::to_string(frame) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(error = %err, "failed to serialize control frame");
                return;
            }
        };
        let registry = self.registry.read().await;
        if let Some(entry) = registry.connections.get(&id) {
            if let Err(err) = entry.sender.try_send(payload) {
                tracing::warn!(connection_id = %id, error = %err, "dropped control frame");
            }
        }
    }
}

#[async_trait]
impl EventPublisher for EventFanout {
    async fn publish(&self, notification: Notification) -> Result<(), BroadcastError> {
        let name = notification.event.name();
        let payload = serde_json::to_string(&notification.event)
            .map_err(|err| BroadcastError::failed(err.to_string()))?;

        let registry = self.registry.read().await;
        let mut delivered = 0usize;
        for uid in &notification.recipients {
            for (id, sender) in registry.senders_of(*uid) {
                match sender.try_send(payload.clone()) {
                    Ok(()) => delivered += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::warn!(connection_id = %id, user_id = %uid, event = name, "connection buffer full, event dropped");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        tracing::debug!(connection_id = %id, user_id = %uid, event = name, "connection closed, event dropped");
                    }
                }
            }
        }
        tracing::debug!(event = name, recipients = notification.recipients.len(), delivered, "event published");
        Ok(())
    }
}

#[async_trait]
impl PresenceDirectory for EventFanout {
    async fn is_online(&self, user_id: UserId) -> bool {
        self.registry.read().await.is_online(user_id)
    }

    async fn online_among(&self, users: &[UserId]) -> HashSet<UserId> {
        let registry = self.registry.read().await;
        users
            .iter()
            .copied()
            .filter(|uid| registry.is_online(*uid))
            .collect()
    }
}
