//! Store boundary for Thriftee: trait contracts toward the hosted backend,
//! plus the in-memory and REST implementations.
//!
//! Everything durable (listings, requests, chats, messages, profiles) lives
//! in an external backend-as-a-service reached over HTTP. The traits here
//! are the only surface the rest of the workspace sees; richer filtering
//! than one column equality happens client-side in `thriftee-core`.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use thriftee_core::{ChatMessage, ConversationThread, Listing, UserProfile, WantedRequest};
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

pub mod memory;
pub mod rest;
pub mod wire;

pub use memory::MemoryStore;
pub use rest::RestStore;

pub const CRATE_NAME: &str = "thriftee-store";

/// Coarse predicate the backend evaluates server-side. Anything richer is
/// out of its vocabulary and runs client-side after the fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerPredicate {
    All,
    Eq { column: &'static str, value: String },
}

impl ServerPredicate {
    /// Listings still for sale: the one predicate the browse views use.
    pub fn unsold() -> Self {
        Self::Eq {
            column: "is_sold",
            value: "false".to_string(),
        }
    }

    /// Rows owned by one user, for profile management views.
    pub fn owned_by(user_id: Uuid) -> Self {
        Self::Eq {
            column: "user_id",
            value: user_id.to_string(),
        }
    }

    /// Rendered as a `column=eq.value` query pair for the REST row API;
    /// `All` contributes nothing.
    pub fn query_pair(&self) -> Option<(String, String)> {
        match self {
            Self::All => None,
            Self::Eq { column, value } => Some(((*column).to_string(), format!("eq.{value}"))),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("request failed after retries: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("backend status {status} for {url}")]
    Backend { status: u16, url: String },
    #[error("malformed {table} row: {reason}")]
    MalformedRecord { table: &'static str, reason: String },
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },
}

/// Listing/request tables and the profiles attached to them.
#[async_trait]
pub trait MarketStore: Send + Sync {
    async fn fetch_listings(&self, predicate: ServerPredicate) -> Result<Vec<Listing>, StoreError>;
    async fn fetch_requests(
        &self,
        predicate: ServerPredicate,
    ) -> Result<Vec<WantedRequest>, StoreError>;
    async fn fetch_listing(&self, id: Uuid) -> Result<Option<Listing>, StoreError>;
    async fn insert_listing(&self, listing: Listing) -> Result<(), StoreError>;
    async fn insert_request(&self, request: WantedRequest) -> Result<(), StoreError>;
    async fn mark_sold(&self, id: Uuid) -> Result<(), StoreError>;
    async fn delete_listing(&self, id: Uuid) -> Result<(), StoreError>;
    async fn delete_request(&self, id: Uuid) -> Result<(), StoreError>;
    async fn fetch_profile(&self, user_id: Uuid) -> Result<Option<UserProfile>, StoreError>;
}

/// Conversation threads and their messages.
///
/// `subscribe_messages` hands back a channel of inserts delivered
/// at-least-once and in no guaranteed order relative to the initial fetch;
/// consumers dedup by message id (`thriftee_chat::MessageFeed`).
#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn find_thread(
        &self,
        listing_id: Uuid,
        buyer_id: Uuid,
        seller_id: Uuid,
    ) -> Result<Option<ConversationThread>, StoreError>;
    async fn create_thread(
        &self,
        thread: ConversationThread,
    ) -> Result<ConversationThread, StoreError>;
    async fn threads_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<ConversationThread>, StoreError>;
    async fn fetch_messages(&self, thread_id: Uuid) -> Result<Vec<ChatMessage>, StoreError>;
    async fn send_message(&self, message: ChatMessage) -> Result<(), StoreError>;
    async fn subscribe_messages(
        &self,
        thread_id: Uuid,
    ) -> Result<mpsc::Receiver<ChatMessage>, StoreError>;
}

/// Session lookup. Provided by the hosting surface; consumed, never
/// implemented, by the chat bootstrap.
pub trait AuthProvider: Send + Sync {
    fn current_user(&self) -> Option<Uuid>;
}

/// Fixed session for tests, demos and header-resolved web requests.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedSession(pub Option<Uuid>);

impl AuthProvider for FixedSession {
    fn current_user(&self) -> Option<Uuid> {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
    pub chat_poll_interval: Duration,
}

impl StoreConfig {
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("THRIFTEE_BACKEND_URL").ok()?;
        let config = Self {
            base_url,
            api_key: std::env::var("THRIFTEE_API_KEY").unwrap_or_default(),
            timeout: Duration::from_secs(
                std::env::var("THRIFTEE_HTTP_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(20),
            ),
            chat_poll_interval: Duration::from_secs(
                std::env::var("THRIFTEE_CHAT_POLL_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(3),
            ),
        };
        info!(base_url = %config.base_url, "using REST backend");
        Some(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsold_predicate_renders_an_equality_pair() {
        let pair = ServerPredicate::unsold().query_pair();
        assert_eq!(
            pair,
            Some(("is_sold".to_string(), "eq.false".to_string()))
        );
    }

    #[test]
    fn all_predicate_contributes_no_query_pair() {
        assert_eq!(ServerPredicate::All.query_pair(), None);
    }

    #[test]
    fn owned_by_targets_the_user_column() {
        let user = Uuid::new_v4();
        let (column, value) = ServerPredicate::owned_by(user).query_pair().expect("pair");
        assert_eq!(column, "user_id");
        assert_eq!(value, format!("eq.{user}"));
    }
}
