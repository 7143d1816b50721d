//! Session registry: live connections, user→owner assignment, and delivery.
//!
//! Each identity has at most one live channel; a newer registration
//! supersedes the older one. Registrations carry a [`ConnectionId`] and are
//! only removed by the connection that owns them, so a superseded socket
//! closing late never evicts its successor.
//!
//! Owner resolution for a user is a prioritized chain (owner declared at
//! connect time, then the in-process cache, then the durable conversation
//! record) with a sticky write-through to the durable store. The cache only
//! holds users with a live connection; a disconnect evicts the entry and
//! later lookups fall back to the durable record.
//!
//! Map locks are synchronous and held only for lookups and inserts; nothing
//! here awaits while holding one.

use relaydesk_core::error::MemoryError;
use relaydesk_core::identity::{OwnerId, UserId};
use relaydesk_core::store::ConversationStore;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use crate::protocol::ServerEvent;

pub type ConnectionId = u64;

/// A delivery target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    User(UserId),
    Owner(OwnerId),
}

struct Channel {
    id: ConnectionId,
    tx: mpsc::Sender<ServerEvent>,
}

/// Handle returned to the socket task that registered.
pub struct Connection {
    pub id: ConnectionId,
    /// Events routed to this connection.
    pub rx: mpsc::Receiver<ServerEvent>,
    /// Direct replies to this connection (history, errors, ...).
    pub reply: mpsc::Sender<ServerEvent>,
}

pub struct SessionRouter {
    users: RwLock<HashMap<UserId, Channel>>,
    owners: RwLock<HashMap<OwnerId, Channel>>,
    assignments: RwLock<HashMap<UserId, OwnerId>>,
    conversations: Arc<dyn ConversationStore>,
    next_id: AtomicU64,
    buffer: usize,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

impl SessionRouter {
    pub fn new(conversations: Arc<dyn ConversationStore>, buffer: usize) -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            owners: RwLock::new(HashMap::new()),
            assignments: RwLock::new(HashMap::new()),
            conversations,
            next_id: AtomicU64::new(1),
            buffer: buffer.max(1),
        }
    }

    fn open_channel(&self) -> (Channel, Connection) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.buffer);
        let connection = Connection {
            id,
            rx,
            reply: tx.clone(),
        };
        (Channel { id, tx }, connection)
    }

    /// Register a user connection and resolve its owner.
    ///
    /// The resolved owner, if any, is told the user connected.
    pub async fn register_user(&self, user: &UserId, declared: Option<OwnerId>) -> (Connection, Option<OwnerId>) {
        let owner = self.resolve_with(user, declared).await;

        let (channel, connection) = self.open_channel();
        if let Some(old) = write(&self.users).insert(user.clone(), channel) {
            debug!(user_id = %user, superseded = old.id, "User connection superseded");
        }
        info!(user_id = %user, owner_id = ?owner, connection = connection.id, "User connected");

        if let Some(owner) = &owner {
            self.forward(
                &Endpoint::Owner(owner.clone()),
                ServerEvent::UserConnected { user_id: user.clone() },
            );
        }
        (connection, owner)
    }

    /// Register an owner connection, superseding any previous one.
    pub fn register_owner(&self, owner: &OwnerId) -> Connection {
        let (channel, connection) = self.open_channel();
        if let Some(old) = write(&self.owners).insert(owner.clone(), channel) {
            debug!(owner_id = %owner, superseded = old.id, "Owner connection superseded");
        }
        info!(owner_id = %owner, connection = connection.id, "Owner connected");
        connection
    }

    /// Remove a user registration if `id` is still the current one.
    ///
    /// Returns whether it was removed; only then is the owner told and the
    /// cached assignment dropped.
    pub fn unregister_user(&self, user: &UserId, id: ConnectionId) -> bool {
        let removed = {
            let mut users = write(&self.users);
            let current = users.get(user).is_some_and(|c| c.id == id);
            current && users.remove(user).is_some()
        };
        if removed {
            info!(user_id = %user, connection = id, "User disconnected");
            let owner = write(&self.assignments).remove(user);
            if let Some(owner) = owner {
                self.forward(&Endpoint::Owner(owner), ServerEvent::UserDisconnected { user_id: user.clone() });
            }
        }
        removed
    }

    pub fn unregister_owner(&self, owner: &OwnerId, id: ConnectionId) -> bool {
        let mut owners = write(&self.owners);
        if !owners.get(owner).is_some_and(|c| c.id == id) {
            return false;
        }
        owners.remove(owner);
        info!(owner_id = %owner, connection = id, "Owner disconnected");
        true
    }

    /// Queue `event` on the destination's live channel.
    ///
    /// Returns `false` when the destination is offline or its queue is full.
    /// Never falls back to another identity.
    pub fn forward(&self, to: &Endpoint, event: ServerEvent) -> bool {
        let tx = match to {
            Endpoint::User(user) => read(&self.users).get(user).map(|c| c.tx.clone()),
            Endpoint::Owner(owner) => read(&self.owners).get(owner).map(|c| c.tx.clone()),
        };
        let Some(tx) = tx else {
            debug!(to = ?to, "Destination offline, live delivery skipped");
            return false;
        };
        match tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(to = ?to, "Outbound queue full, event dropped");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// The user's owner: cache first, then the durable record.
    ///
    /// A durable hit is cached only while the user is online.
    pub async fn resolve_owner(&self, user: &UserId) -> Option<OwnerId> {
        if let Some(owner) = self.assigned_owner(user) {
            return Some(owner);
        }
        let stored = self.stored_owner(user).await?;
        self.cache_if_online(user, &stored);
        Some(stored)
    }

    /// Cached assignment only; never touches storage.
    pub fn assigned_owner(&self, user: &UserId) -> Option<OwnerId> {
        read(&self.assignments).get(user).cloned()
    }

    /// Explicitly move `user` to `owner`, durably.
    pub async fn reassign(&self, user: &UserId, owner: &OwnerId) -> Result<(), MemoryError> {
        self.conversations.assign_owner(user, owner).await?;
        let previous = self.cache_if_online(user, owner);
        if previous.as_ref() != Some(owner) {
            info!(user_id = %user, owner_id = %owner, previous = ?previous, "User reassigned");
        }
        Ok(())
    }

    /// Live users assigned to `owner`, sorted by id.
    pub fn active_users(&self, owner: &OwnerId) -> Vec<UserId> {
        let users = read(&self.users);
        let assignments = read(&self.assignments);
        let mut out: Vec<UserId> = users
            .keys()
            .filter(|u| assignments.get(*u) == Some(owner))
            .cloned()
            .collect();
        out.sort();
        out
    }

    pub fn is_user_online(&self, user: &UserId) -> bool {
        read(&self.users).contains_key(user)
    }

    pub fn is_owner_online(&self, owner: &OwnerId) -> bool {
        read(&self.owners).contains_key(owner)
    }

    /// Cache `owner` for a live user; for an offline one, drop any stale entry.
    /// Returns the previous cached value.
    fn cache_if_online(&self, user: &UserId, owner: &OwnerId) -> Option<OwnerId> {
        let users = read(&self.users);
        let mut assignments = write(&self.assignments);
        if users.contains_key(user) {
            assignments.insert(user.clone(), owner.clone())
        } else {
            assignments.remove(user)
        }
    }

    async fn stored_owner(&self, user: &UserId) -> Option<OwnerId> {
        match self.conversations.owner_of(user).await {
            Ok(owner) => owner,
            Err(e) => {
                warn!(user_id = %user, error = %e, "Owner lookup failed");
                None
            }
        }
    }

    /// declared → cache → durable, persisting the result when it changed.
    async fn resolve_with(&self, user: &UserId, declared: Option<OwnerId>) -> Option<OwnerId> {
        let stored = self.stored_owner(user).await;
        let resolved = declared.or_else(|| self.assigned_owner(user)).or_else(|| stored.clone())?;

        if stored.as_ref() != Some(&resolved) {
            if let Err(e) = self.conversations.assign_owner(user, &resolved).await {
                warn!(user_id = %user, owner_id = %resolved, error = %e, "Could not persist owner assignment");
            }
        }
        write(&self.assignments).insert(user.clone(), resolved.clone());
        Some(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaydesk_core::conversation::ChatMessage;
    use relaydesk_memory::InMemoryStore;

    fn router() -> (SessionRouter, InMemoryStore) {
        let store = InMemoryStore::new();
        (SessionRouter::new(Arc::new(store.clone()), 8), store)
    }

    fn ping() -> ServerEvent {
        ServerEvent::error("ping")
    }

    #[tokio::test]
    async fn declared_owner_is_sticky() {
        let (router, store) = router();
        let user = UserId::from("u1");
        let acme = OwnerId::from("acme");

        let (_conn, owner) = router.register_user(&user, Some(acme.clone())).await;
        assert_eq!(owner, Some(acme.clone()));
        assert_eq!(store.owner_of(&user).await.unwrap(), Some(acme.clone()));

        // reconnect without declaring: still acme
        let (_conn, owner) = router.register_user(&user, None).await;
        assert_eq!(owner, Some(acme));
    }

    #[tokio::test]
    async fn durable_owner_is_used_when_nothing_else_known() {
        let (router, store) = router();
        let user = UserId::from("u1");
        store
            .append(&user, Some(&OwnerId::from("globex")), ChatMessage::user("hi"))
            .await
            .unwrap();

        assert_eq!(router.resolve_owner(&user).await, Some(OwnerId::from("globex")));
        // offline users are not cached
        assert_eq!(router.assigned_owner(&user), None);
    }

    #[tokio::test]
    async fn disconnect_evicts_cached_assignment() {
        let (router, _) = router();
        let user = UserId::from("u1");
        let acme = OwnerId::from("acme");

        let (conn, _) = router.register_user(&user, Some(acme.clone())).await;
        assert_eq!(router.assigned_owner(&user), Some(acme.clone()));

        assert!(router.unregister_user(&user, conn.id));
        assert_eq!(router.assigned_owner(&user), None);
        // durable record still answers, without re-filling the cache
        assert_eq!(router.resolve_owner(&user).await, Some(acme.clone()));
        assert_eq!(router.assigned_owner(&user), None);

        router.reassign(&user, &OwnerId::from("globex")).await.unwrap();
        assert_eq!(router.assigned_owner(&user), None);
        assert_eq!(router.resolve_owner(&user).await, Some(OwnerId::from("globex")));
    }

    #[tokio::test]
    async fn unassigned_user_resolves_to_none() {
        let (router, _) = router();
        let (_conn, owner) = router.register_user(&UserId::from("u1"), None).await;
        assert_eq!(owner, None);
    }

    #[tokio::test]
    async fn presence_goes_only_to_resolved_owner() {
        let (router, _) = router();
        let acme = OwnerId::from("acme");
        let globex = OwnerId::from("globex");
        let mut acme_conn = router.register_owner(&acme);
        let mut globex_conn = router.register_owner(&globex);

        let user = UserId::from("u1");
        let (conn, _) = router.register_user(&user, Some(acme.clone())).await;
        assert_eq!(
            acme_conn.rx.try_recv().unwrap(),
            ServerEvent::UserConnected { user_id: user.clone() }
        );

        assert!(router.unregister_user(&user, conn.id));
        assert_eq!(
            acme_conn.rx.try_recv().unwrap(),
            ServerEvent::UserDisconnected { user_id: user }
        );
        assert!(globex_conn.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn forward_never_reaches_another_owner() {
        let (router, _) = router();
        let mut globex_conn = router.register_owner(&OwnerId::from("globex"));

        assert!(!router.forward(&Endpoint::Owner(OwnerId::from("acme")), ping()));
        assert!(globex_conn.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn newer_owner_connection_supersedes() {
        let (router, _) = router();
        let acme = OwnerId::from("acme");
        let mut first = router.register_owner(&acme);
        let mut second = router.register_owner(&acme);

        assert!(router.forward(&Endpoint::Owner(acme.clone()), ping()));
        assert!(first.rx.try_recv().is_err());
        assert_eq!(second.rx.try_recv().unwrap(), ping());

        // stale close is ignored
        assert!(!router.unregister_owner(&acme, first.id));
        assert!(router.is_owner_online(&acme));
        assert!(router.unregister_owner(&acme, second.id));
        assert!(!router.is_owner_online(&acme));
    }

    #[tokio::test]
    async fn superseded_user_close_emits_nothing() {
        let (router, _) = router();
        let acme = OwnerId::from("acme");
        let mut owner_conn = router.register_owner(&acme);
        let user = UserId::from("u1");

        let (old, _) = router.register_user(&user, Some(acme.clone())).await;
        let (_new, _) = router.register_user(&user, None).await;
        // two connects
        assert!(owner_conn.rx.try_recv().is_ok());
        assert!(owner_conn.rx.try_recv().is_ok());

        assert!(!router.unregister_user(&user, old.id));
        assert!(owner_conn.rx.try_recv().is_err());
        assert!(router.is_user_online(&user));
    }

    #[tokio::test]
    async fn full_queue_drops_event() {
        let store = InMemoryStore::new();
        let router = SessionRouter::new(Arc::new(store), 1);
        let acme = OwnerId::from("acme");
        let _conn = router.register_owner(&acme);

        assert!(router.forward(&Endpoint::Owner(acme.clone()), ping()));
        assert!(!router.forward(&Endpoint::Owner(acme), ping()));
    }

    #[tokio::test]
    async fn active_users_are_scoped_and_sorted() {
        let (router, _) = router();
        let acme = OwnerId::from("acme");
        let (_b, _) = router.register_user(&UserId::from("b"), Some(acme.clone())).await;
        let (_a, _) = router.register_user(&UserId::from("a"), Some(acme.clone())).await;
        let (_c, _) = router.register_user(&UserId::from("c"), Some(OwnerId::from("globex"))).await;

        assert_eq!(router.active_users(&acme), vec![UserId::from("a"), UserId::from("b")]);
    }

    #[tokio::test]
    async fn reassign_updates_cache_and_store() {
        let (router, store) = router();
        let user = UserId::from("u1");
        router.register_user(&user, Some(OwnerId::from("acme"))).await;
        router.reassign(&user, &OwnerId::from("globex")).await.unwrap();

        assert_eq!(router.assigned_owner(&user), Some(OwnerId::from("globex")));
        assert_eq!(store.owner_of(&user).await.unwrap(), Some(OwnerId::from("globex")));
    }
}
