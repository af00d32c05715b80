//! REST row-API backend.
//!
//! Speaks the hosted platform's PostgREST-style surface: equality filters in
//! the query string, JSON row arrays in and out. Transient failures (5xx,
//! 429, transport errors) retry under a bounded exponential backoff; every
//! other failure surfaces immediately as a `StoreError`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde_json::{json, Value as JsonValue};
use thriftee_core::{ChatMessage, ConversationThread, Listing, UserProfile, WantedRequest};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::wire::{
    decode_rows, RawListingRow, RawMessageRow, RawProfileRow, RawRequestRow, RawThreadRow,
};
use crate::{ChatStore, MarketStore, ServerPredicate, StoreConfig, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retryable,
    NonRetryable,
}

pub fn classify_status(status: StatusCode) -> RetryDisposition {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

pub fn classify_reqwest_error(err: &reqwest::Error) -> RetryDisposition {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl BackoffPolicy {
    pub fn delay_for_attempt(&self, attempt_index: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt_index as u32).unwrap_or(u32::MAX);
        let delay = self.base_delay.saturating_mul(factor);
        delay.min(self.max_delay)
    }
}

#[derive(Clone)]
pub struct RestStore {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    backoff: BackoffPolicy,
    chat_poll_interval: Duration,
}

impl RestStore {
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            backoff: BackoffPolicy::default(),
            chat_poll_interval: config.chat_poll_interval,
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
    }

    async fn send_with_retry(
        &self,
        build: impl Fn() -> RequestBuilder,
    ) -> Result<reqwest::Response, StoreError> {
        let mut last_request_error: Option<reqwest::Error> = None;

        for attempt in 0..=self.backoff.max_retries {
            match build().send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return Ok(resp);
                    }
                    let url = resp.url().to_string();
                    if classify_status(status) == RetryDisposition::Retryable
                        && attempt < self.backoff.max_retries
                    {
                        debug!(%url, status = status.as_u16(), attempt, "retrying backend call");
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                        continue;
                    }
                    return Err(StoreError::Backend {
                        status: status.as_u16(),
                        url,
                    });
                }
                Err(err) => {
                    if classify_reqwest_error(&err) == RetryDisposition::Retryable
                        && attempt < self.backoff.max_retries
                    {
                        last_request_error = Some(err);
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                        continue;
                    }
                    return Err(StoreError::Transport(err));
                }
            }
        }

        Err(StoreError::Transport(
            last_request_error.expect("retry loop captures the final request error"),
        ))
    }

    async fn get_rows(
        &self,
        table: &'static str,
        query: &[(String, String)],
    ) -> Result<Vec<JsonValue>, StoreError> {
        let url = self.table_url(table);
        let resp = self
            .send_with_retry(|| self.request(Method::GET, &url).query(query))
            .await?;
        Ok(resp.json::<Vec<JsonValue>>().await?)
    }

    async fn insert_row(
        &self,
        table: &'static str,
        row: JsonValue,
    ) -> Result<(), StoreError> {
        let url = self.table_url(table);
        self.send_with_retry(|| {
            self.request(Method::POST, &url)
                .header("Prefer", "return=minimal")
                .json(&row)
        })
        .await?;
        Ok(())
    }
}

fn id_query(id: Uuid) -> [(String, String); 1] {
    [("id".to_string(), format!("eq.{id}"))]
}

#[async_trait]
impl MarketStore for RestStore {
    async fn fetch_listings(&self, predicate: ServerPredicate) -> Result<Vec<Listing>, StoreError> {
        let query: Vec<_> = predicate.query_pair().into_iter().collect();
        let rows = self.get_rows("items", &query).await?;
        Ok(decode_rows::<RawListingRow, _>("items", rows))
    }

    async fn fetch_requests(
        &self,
        predicate: ServerPredicate,
    ) -> Result<Vec<WantedRequest>, StoreError> {
        let query: Vec<_> = predicate.query_pair().into_iter().collect();
        let rows = self.get_rows("requests", &query).await?;
        Ok(decode_rows::<RawRequestRow, _>("requests", rows))
    }

    async fn fetch_listing(&self, id: Uuid) -> Result<Option<Listing>, StoreError> {
        let rows = self.get_rows("items", &id_query(id)).await?;
        Ok(decode_rows::<RawListingRow, _>("items", rows).into_iter().next())
    }

    async fn insert_listing(&self, listing: Listing) -> Result<(), StoreError> {
        self.insert_row("items", serde_json::to_value(RawListingRow::from(&listing)).expect("listing row serializes"))
            .await
    }

    async fn insert_request(&self, request: WantedRequest) -> Result<(), StoreError> {
        self.insert_row("requests", serde_json::to_value(RawRequestRow::from(&request)).expect("request row serializes"))
            .await
    }

    async fn mark_sold(&self, id: Uuid) -> Result<(), StoreError> {
        let url = self.table_url("items");
        self.send_with_retry(|| {
            self.request(Method::PATCH, &url)
                .query(&id_query(id))
                .json(&json!({ "is_sold": true }))
        })
        .await?;
        Ok(())
    }

    async fn delete_listing(&self, id: Uuid) -> Result<(), StoreError> {
        let url = self.table_url("items");
        self.send_with_retry(|| self.request(Method::DELETE, &url).query(&id_query(id)))
            .await?;
        Ok(())
    }

    async fn delete_request(&self, id: Uuid) -> Result<(), StoreError> {
        let url = self.table_url("requests");
        self.send_with_retry(|| self.request(Method::DELETE, &url).query(&id_query(id)))
            .await?;
        Ok(())
    }

    async fn fetch_profile(&self, user_id: Uuid) -> Result<Option<UserProfile>, StoreError> {
        let rows = self.get_rows("users", &id_query(user_id)).await?;
        Ok(decode_rows::<RawProfileRow, _>("users", rows).into_iter().next())
    }
}

#[async_trait]
impl ChatStore for RestStore {
    async fn find_thread(
        &self,
        listing_id: Uuid,
        buyer_id: Uuid,
        seller_id: Uuid,
    ) -> Result<Option<ConversationThread>, StoreError> {
        let query = [
            ("item_id".to_string(), format!("eq.{listing_id}")),
            ("buyer_id".to_string(), format!("eq.{buyer_id}")),
            ("seller_id".to_string(), format!("eq.{seller_id}")),
        ];
        let rows = self.get_rows("chats", &query).await?;
        Ok(decode_rows::<RawThreadRow, _>("chats", rows).into_iter().next())
    }

    async fn create_thread(
        &self,
        thread: ConversationThread,
    ) -> Result<ConversationThread, StoreError> {
        let url = self.table_url("chats");
        let row = serde_json::to_value(RawThreadRow::from(&thread)).expect("thread row serializes");
        let resp = self
            .send_with_retry(|| {
                self.request(Method::POST, &url)
                    .header("Prefer", "return=representation")
                    .json(&row)
            })
            .await?;
        let rows = resp.json::<Vec<JsonValue>>().await?;
        // An empty representation means the insert was absorbed by the
        // primary-key conflict of a racing duplicate; the thread identity is
        // deterministic either way.
        Ok(decode_rows::<RawThreadRow, _>("chats", rows)
            .into_iter()
            .next()
            .unwrap_or(thread))
    }

    async fn threads_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<ConversationThread>, StoreError> {
        let query = [
            (
                "or".to_string(),
                format!("(buyer_id.eq.{user_id},seller_id.eq.{user_id})"),
            ),
            ("order".to_string(), "created_at.desc".to_string()),
        ];
        let rows = self.get_rows("chats", &query).await?;
        Ok(decode_rows::<RawThreadRow, _>("chats", rows))
    }

    async fn fetch_messages(&self, thread_id: Uuid) -> Result<Vec<ChatMessage>, StoreError> {
        let query = [
            ("chat_id".to_string(), format!("eq.{thread_id}")),
            ("order".to_string(), "created_at.asc".to_string()),
        ];
        let rows = self.get_rows("messages", &query).await?;
        Ok(decode_rows::<RawMessageRow, _>("messages", rows))
    }

    async fn send_message(&self, message: ChatMessage) -> Result<(), StoreError> {
        self.insert_row(
            "messages",
            serde_json::to_value(RawMessageRow::from(&message)).expect("message row serializes"),
        )
        .await
    }

    /// Polling stand-in for the platform's realtime channel: refetches the
    /// thread on an interval and forwards every row. Delivery is therefore
    /// at-least-once with duplicates; the message feed dedups by id.
    async fn subscribe_messages(
        &self,
        thread_id: Uuid,
    ) -> Result<mpsc::Receiver<ChatMessage>, StoreError> {
        let (tx, rx) = mpsc::channel(64);
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(store.chat_poll_interval);
            loop {
                ticker.tick().await;
                match store.fetch_messages(thread_id).await {
                    Ok(messages) => {
                        for message in messages {
                            if tx.send(message).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(err) => warn!(%thread_id, %err, "message poll failed"),
                }
            }
        });
        Ok(rx)
    }
}
