//! In-memory backend used by tests and demo serving.

use std::collections::HashMap;

use async_trait::async_trait;
use thriftee_core::{ChatMessage, ConversationThread, Listing, UserProfile, WantedRequest};
use tokio::sync::{broadcast, mpsc, RwLock};
use uuid::Uuid;

use crate::{ChatStore, MarketStore, ServerPredicate, StoreError};

pub struct MemoryStore {
    listings: RwLock<HashMap<Uuid, Listing>>,
    requests: RwLock<HashMap<Uuid, WantedRequest>>,
    profiles: RwLock<HashMap<Uuid, UserProfile>>,
    threads: RwLock<HashMap<Uuid, ConversationThread>>,
    messages: RwLock<Vec<ChatMessage>>,
    message_events: broadcast::Sender<ChatMessage>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (message_events, _) = broadcast::channel(64);
        Self {
            listings: RwLock::new(HashMap::new()),
            requests: RwLock::new(HashMap::new()),
            profiles: RwLock::new(HashMap::new()),
            threads: RwLock::new(HashMap::new()),
            messages: RwLock::new(Vec::new()),
            message_events,
        }
    }

    pub async fn upsert_profile(&self, profile: UserProfile) {
        self.profiles.write().await.insert(profile.id, profile);
    }
}

fn listing_keeps(predicate: &ServerPredicate, listing: &Listing) -> bool {
    match predicate {
        ServerPredicate::All => true,
        // Columns outside the browse vocabulary are not evaluated here.
        ServerPredicate::Eq { column, value } => match *column {
            "is_sold" => listing.is_sold.to_string() == *value,
            "user_id" => listing.owner_id.to_string() == *value,
            _ => true,
        },
    }
}

fn request_keeps(predicate: &ServerPredicate, request: &WantedRequest) -> bool {
    match predicate {
        ServerPredicate::All => true,
        ServerPredicate::Eq { column, value } => match *column {
            "user_id" => request.owner_id.to_string() == *value,
            _ => true,
        },
    }
}

#[async_trait]
impl MarketStore for MemoryStore {
    async fn fetch_listings(&self, predicate: ServerPredicate) -> Result<Vec<Listing>, StoreError> {
        Ok(self
            .listings
            .read()
            .await
            .values()
            .filter(|listing| listing_keeps(&predicate, listing))
            .cloned()
            .collect())
    }

    async fn fetch_requests(
        &self,
        predicate: ServerPredicate,
    ) -> Result<Vec<WantedRequest>, StoreError> {
        Ok(self
            .requests
            .read()
            .await
            .values()
            .filter(|request| request_keeps(&predicate, request))
            .cloned()
            .collect())
    }

    async fn fetch_listing(&self, id: Uuid) -> Result<Option<Listing>, StoreError> {
        Ok(self.listings.read().await.get(&id).cloned())
    }

    async fn insert_listing(&self, listing: Listing) -> Result<(), StoreError> {
        self.listings.write().await.insert(listing.id, listing);
        Ok(())
    }

    async fn insert_request(&self, request: WantedRequest) -> Result<(), StoreError> {
        self.requests.write().await.insert(request.id, request);
        Ok(())
    }

    async fn mark_sold(&self, id: Uuid) -> Result<(), StoreError> {
        match self.listings.write().await.get_mut(&id) {
            Some(listing) => {
                listing.is_sold = true;
                Ok(())
            }
            None => Err(StoreError::NotFound {
                entity: "listing",
                id,
            }),
        }
    }

    async fn delete_listing(&self, id: Uuid) -> Result<(), StoreError> {
        match self.listings.write().await.remove(&id) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound {
                entity: "listing",
                id,
            }),
        }
    }

    async fn delete_request(&self, id: Uuid) -> Result<(), StoreError> {
        match self.requests.write().await.remove(&id) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound {
                entity: "request",
                id,
            }),
        }
    }

    async fn fetch_profile(&self, user_id: Uuid) -> Result<Option<UserProfile>, StoreError> {
        Ok(self.profiles.read().await.get(&user_id).cloned())
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn find_thread(
        &self,
        listing_id: Uuid,
        buyer_id: Uuid,
        seller_id: Uuid,
    ) -> Result<Option<ConversationThread>, StoreError> {
        Ok(self
            .threads
            .read()
            .await
            .values()
            .find(|thread| {
                thread.listing_id == listing_id
                    && thread.buyer_id == buyer_id
                    && thread.seller_id == seller_id
            })
            .cloned())
    }

    async fn create_thread(
        &self,
        thread: ConversationThread,
    ) -> Result<ConversationThread, StoreError> {
        // Duplicate ids collapse onto the existing row, mirroring the
        // backend's primary-key conflict handling for the deterministic
        // thread identity.
        let mut threads = self.threads.write().await;
        Ok(threads.entry(thread.id).or_insert(thread).clone())
    }

    async fn threads_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<ConversationThread>, StoreError> {
        let mut threads = self
            .threads
            .read()
            .await
            .values()
            .filter(|thread| thread.buyer_id == user_id || thread.seller_id == user_id)
            .cloned()
            .collect::<Vec<_>>();
        threads.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(threads)
    }

    async fn fetch_messages(&self, thread_id: Uuid) -> Result<Vec<ChatMessage>, StoreError> {
        let mut messages = self
            .messages
            .read()
            .await
            .iter()
            .filter(|message| message.thread_id == thread_id)
            .cloned()
            .collect::<Vec<_>>();
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(messages)
    }

    async fn send_message(&self, message: ChatMessage) -> Result<(), StoreError> {
        self.messages.write().await.push(message.clone());
        // No receivers is fine; browsing without an open chat view.
        let _ = self.message_events.send(message);
        Ok(())
    }

    async fn subscribe_messages(
        &self,
        thread_id: Uuid,
    ) -> Result<mpsc::Receiver<ChatMessage>, StoreError> {
        let (tx, rx) = mpsc::channel(64);
        let mut events = self.message_events.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(message) if message.thread_id == thread_id => {
                        if tx.send(message).await.is_err() {
                            return;
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        });
        Ok(rx)
    }
}
