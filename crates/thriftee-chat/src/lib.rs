//! Chat bootstrap and message-feed state.
//!
//! Opening a conversation is lookup-or-create: re-entry returns the existing
//! thread instead of forking a second one. The residual check-then-act race
//! is defused by deriving the thread id deterministically from the
//! (listing, buyer, seller) triple, so two racing initiations collide on the
//! backend's primary key rather than producing two threads.

use chrono::Utc;
use thiserror::Error;
use thriftee_core::{ChatMessage, ConversationThread};
use thriftee_store::{AuthProvider, ChatStore, StoreError};
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

pub const CRATE_NAME: &str = "thriftee-chat";

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("no active session; log in to chat")]
    Unauthenticated,
    #[error("cannot open a chat on your own posting")]
    SelfChat,
    #[error("chat bootstrap failed: {0}")]
    Bootstrap(#[from] StoreError),
}

/// Deterministic thread identity for one (listing, buyer, seller) triple.
pub fn thread_id(listing_id: Uuid, buyer_id: Uuid, seller_id: Uuid) -> Uuid {
    let key = format!("{listing_id}:{buyer_id}:{seller_id}");
    Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes())
}

/// Locates or creates the conversation thread between the current user
/// (buyer) and `seller_id` about `listing_id`.
///
/// Fails before touching the store when there is no session or the viewer
/// owns the posting; store failures during lookup or create wrap as
/// [`ChatError::Bootstrap`] with nothing assumed committed.
pub async fn start_chat(
    store: &dyn ChatStore,
    auth: &dyn AuthProvider,
    listing_id: Uuid,
    seller_id: Uuid,
) -> Result<ConversationThread, ChatError> {
    let buyer_id = auth.current_user().ok_or(ChatError::Unauthenticated)?;
    if buyer_id == seller_id {
        return Err(ChatError::SelfChat);
    }

    if let Some(existing) = store.find_thread(listing_id, buyer_id, seller_id).await? {
        return Ok(existing);
    }

    let thread = ConversationThread {
        id: thread_id(listing_id, buyer_id, seller_id),
        listing_id,
        buyer_id,
        seller_id,
        created_at: Utc::now(),
    };
    info!(thread = %thread.id, %listing_id, "opening new chat thread");
    Ok(store.create_thread(thread).await?)
}

/// One chat view's message list.
///
/// Realtime delivery is at-least-once and not ordered relative to the
/// initial fetch, so inserts are keyed on message id: duplicates drop,
/// stragglers splice in at their timestamp position.
#[derive(Debug, Clone, Default)]
pub struct MessageFeed {
    messages: Vec<ChatMessage>,
}

impl MessageFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_initial(mut messages: Vec<ChatMessage>) -> Self {
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Self { messages }
    }

    /// Applies one delivered insert; returns whether it was new.
    pub fn apply(&mut self, message: ChatMessage) -> bool {
        if self.messages.iter().any(|m| m.id == message.id) {
            return false;
        }
        let at = self
            .messages
            .partition_point(|m| m.created_at <= message.created_at);
        self.messages.insert(at, message);
        true
    }

    /// Oldest first, as the chat view renders them.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Applies everything currently queued on a subscription without waiting.
/// Returns how many of the delivered messages were new.
pub fn drain_pending(feed: &mut MessageFeed, rx: &mut mpsc::Receiver<ChatMessage>) -> usize {
    let mut applied = 0;
    while let Ok(message) = rx.try_recv() {
        if feed.apply(message) {
            applied += 1;
        }
    }
    applied
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration};
    use thriftee_store::{FixedSession, MemoryStore};

    fn base_time() -> DateTime<chrono::Utc> {
        DateTime::parse_from_rfc3339("2026-02-24T12:00:00Z")
            .expect("ts")
            .with_timezone(&chrono::Utc)
    }

    fn message(thread: Uuid, offset_secs: i64) -> ChatMessage {
        ChatMessage {
            id: Uuid::new_v4(),
            thread_id: thread,
            sender_id: Uuid::new_v4(),
            body: format!("message at +{offset_secs}s"),
            created_at: base_time() + Duration::seconds(offset_secs),
        }
    }

    #[tokio::test]
    async fn bootstrap_requires_a_session() {
        let store = MemoryStore::new();
        let result = start_chat(&store, &FixedSession(None), Uuid::new_v4(), Uuid::new_v4()).await;
        assert!(matches!(result, Err(ChatError::Unauthenticated)));
    }

    #[tokio::test]
    async fn self_chat_is_rejected_without_writes() {
        let store = MemoryStore::new();
        let me = Uuid::new_v4();
        let result = start_chat(&store, &FixedSession(Some(me)), Uuid::new_v4(), me).await;
        assert!(matches!(result, Err(ChatError::SelfChat)));
        assert!(store.threads_for_user(me).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sequential_bootstraps_return_the_same_thread() {
        let store = MemoryStore::new();
        let buyer = Uuid::new_v4();
        let seller = Uuid::new_v4();
        let listing = Uuid::new_v4();
        let auth = FixedSession(Some(buyer));

        let first = start_chat(&store, &auth, listing, seller).await.unwrap();
        let second = start_chat(&store, &auth, listing, seller).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(store.threads_for_user(buyer).await.unwrap().len(), 1);
    }

    #[test]
    fn thread_identity_is_deterministic_per_triple() {
        let listing = Uuid::new_v4();
        let buyer = Uuid::new_v4();
        let seller = Uuid::new_v4();

        assert_eq!(
            thread_id(listing, buyer, seller),
            thread_id(listing, buyer, seller)
        );
        assert_ne!(
            thread_id(listing, buyer, seller),
            thread_id(listing, seller, buyer)
        );
    }

    #[test]
    fn duplicate_deliveries_are_dropped() {
        let thread = Uuid::new_v4();
        let msg = message(thread, 1);
        let mut feed = MessageFeed::from_initial(vec![msg.clone()]);

        assert!(!feed.apply(msg));
        assert_eq!(feed.len(), 1);
    }

    #[test]
    fn out_of_order_deliveries_splice_in_by_timestamp() {
        let thread = Uuid::new_v4();
        let early = message(thread, 1);
        let late = message(thread, 30);
        let middle = message(thread, 10);

        let mut feed = MessageFeed::from_initial(vec![late.clone(), early.clone()]);
        assert_eq!(feed.messages()[0], early);

        assert!(feed.apply(middle.clone()));
        let bodies: Vec<_> = feed.messages().iter().map(|m| m.body.clone()).collect();
        assert_eq!(bodies, vec![early.body, middle.body, late.body]);
    }

    #[tokio::test]
    async fn subscription_overlap_with_the_initial_fetch_is_absorbed() {
        let store = MemoryStore::new();
        let thread = Uuid::new_v4();

        let first = message(thread, 1);
        store.send_message(first.clone()).await.unwrap();

        let mut rx = store.subscribe_messages(thread).await.unwrap();
        let second = message(thread, 2);
        store.send_message(second.clone()).await.unwrap();

        // The initial fetch already contains both rows, so the delivery of
        // `second` over the subscription is a duplicate.
        let mut feed = MessageFeed::from_initial(store.fetch_messages(thread).await.unwrap());
        assert_eq!(feed.len(), 2);

        let delivered = rx.recv().await.expect("subscription delivers");
        assert!(!feed.apply(delivered));
        assert_eq!(feed.len(), 2);
    }

    #[tokio::test]
    async fn drain_pending_counts_only_new_messages() {
        let thread = Uuid::new_v4();
        let known = message(thread, 1);
        let fresh = message(thread, 2);
        let mut feed = MessageFeed::from_initial(vec![known.clone()]);

        let (tx, mut rx) = mpsc::channel(8);
        tx.send(known).await.unwrap();
        tx.send(fresh.clone()).await.unwrap();
        tx.send(fresh).await.unwrap();

        assert_eq!(drain_pending(&mut feed, &mut rx), 1);
        assert_eq!(feed.len(), 2);
    }
}
