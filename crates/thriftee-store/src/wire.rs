//! Wire-level row shapes for the backend tables.
//!
//! Backend rows are loosely typed: optional columns may be missing or null
//! depending on which client wrote them. These structs absorb that at the
//! boundary, so the domain types in `thriftee-core` never carry defensive
//! null handling. A row missing a required column is dropped with a warning
//! rather than failing the whole fetch.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thriftee_core::{ChatMessage, ConversationThread, Listing, UserProfile, WantedRequest};
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawListingRow {
    pub id: Uuid,
    pub name: String,
    pub price: u32,
    #[serde(default)]
    pub description: Option<String>,
    pub city: String,
    #[serde(default)]
    pub locality: Option<String>,
    #[serde(default)]
    pub images: Option<Vec<String>>,
    #[serde(default)]
    pub quality_rating: Option<u8>,
    #[serde(default)]
    pub has_receipt: Option<bool>,
    #[serde(default)]
    pub has_delivery: Option<bool>,
    #[serde(default)]
    pub is_verified: Option<bool>,
    #[serde(default)]
    pub is_sold: Option<bool>,
    pub created_at: DateTime<Utc>,
    pub user_id: Uuid,
}

impl From<RawListingRow> for Listing {
    fn from(row: RawListingRow) -> Self {
        Listing {
            id: row.id,
            name: row.name,
            price: row.price,
            description: row.description.unwrap_or_default(),
            city: row.city,
            locality: row.locality,
            images: row.images.unwrap_or_default(),
            quality_rating: row.quality_rating.unwrap_or(0),
            has_receipt: row.has_receipt.unwrap_or(false),
            has_delivery: row.has_delivery.unwrap_or(false),
            is_verified: row.is_verified.unwrap_or(false),
            is_sold: row.is_sold.unwrap_or(false),
            created_at: row.created_at,
            owner_id: row.user_id,
        }
    }
}

impl From<&Listing> for RawListingRow {
    fn from(listing: &Listing) -> Self {
        RawListingRow {
            id: listing.id,
            name: listing.name.clone(),
            price: listing.price,
            description: Some(listing.description.clone()),
            city: listing.city.clone(),
            locality: listing.locality.clone(),
            images: Some(listing.images.clone()),
            quality_rating: Some(listing.quality_rating),
            has_receipt: Some(listing.has_receipt),
            has_delivery: Some(listing.has_delivery),
            is_verified: Some(listing.is_verified),
            is_sold: Some(listing.is_sold),
            created_at: listing.created_at,
            user_id: listing.owner_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRequestRow {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub budget: u32,
    pub city: String,
    #[serde(default)]
    pub locality: Option<String>,
    #[serde(default)]
    pub quality_min: Option<u8>,
    #[serde(default)]
    pub delivery_needed: Option<bool>,
    pub created_at: DateTime<Utc>,
    pub user_id: Uuid,
}

impl From<RawRequestRow> for WantedRequest {
    fn from(row: RawRequestRow) -> Self {
        WantedRequest {
            id: row.id,
            title: row.title,
            description: row.description,
            budget: row.budget,
            city: row.city,
            locality: row.locality,
            quality_min: row.quality_min.unwrap_or(0),
            delivery_needed: row.delivery_needed.unwrap_or(false),
            created_at: row.created_at,
            owner_id: row.user_id,
        }
    }
}

impl From<&WantedRequest> for RawRequestRow {
    fn from(request: &WantedRequest) -> Self {
        RawRequestRow {
            id: request.id,
            title: request.title.clone(),
            description: request.description.clone(),
            budget: request.budget,
            city: request.city.clone(),
            locality: request.locality.clone(),
            quality_min: Some(request.quality_min),
            delivery_needed: Some(request.delivery_needed),
            created_at: request.created_at,
            user_id: request.owner_id,
        }
    }
}

/// Chat threads live in the `chats` table; its listing column is `item_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawThreadRow {
    pub id: Uuid,
    pub item_id: Uuid,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl From<RawThreadRow> for ConversationThread {
    fn from(row: RawThreadRow) -> Self {
        ConversationThread {
            id: row.id,
            listing_id: row.item_id,
            buyer_id: row.buyer_id,
            seller_id: row.seller_id,
            created_at: row.created_at,
        }
    }
}

impl From<&ConversationThread> for RawThreadRow {
    fn from(thread: &ConversationThread) -> Self {
        RawThreadRow {
            id: thread.id,
            item_id: thread.listing_id,
            buyer_id: thread.buyer_id,
            seller_id: thread.seller_id,
            created_at: thread.created_at,
        }
    }
}

/// Messages carry their text in the `content` column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMessageRow {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub sender_id: Uuid,
    #[serde(default)]
    pub content: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<RawMessageRow> for ChatMessage {
    fn from(row: RawMessageRow) -> Self {
        ChatMessage {
            id: row.id,
            thread_id: row.chat_id,
            sender_id: row.sender_id,
            body: row.content.unwrap_or_default(),
            created_at: row.created_at,
        }
    }
}

impl From<&ChatMessage> for RawMessageRow {
    fn from(message: &ChatMessage) -> Self {
        RawMessageRow {
            id: message.id,
            chat_id: message.thread_id,
            sender_id: message.sender_id,
            content: Some(message.body.clone()),
            created_at: message.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawProfileRow {
    pub id: Uuid,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    pub date_joined: DateTime<Utc>,
}

impl From<RawProfileRow> for UserProfile {
    fn from(row: RawProfileRow) -> Self {
        UserProfile {
            id: row.id,
            name: row.name.unwrap_or_default(),
            city: row.city.unwrap_or_default(),
            avatar_url: row.avatar_url,
            joined_at: row.date_joined,
        }
    }
}

/// Decodes each row independently so one malformed row is skipped with a
/// warning instead of poisoning the whole result set.
pub fn decode_rows<W, T>(table: &'static str, rows: Vec<serde_json::Value>) -> Vec<T>
where
    W: DeserializeOwned + Into<T>,
{
    rows.into_iter()
        .filter_map(|row| match serde_json::from_value::<W>(row) {
            Ok(decoded) => Some(decoded.into()),
            Err(err) => {
                warn!(table, %err, "skipping malformed row");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_optional_columns_default_to_neutral_values() {
        let row = json!({
            "id": "5e9b9f64-7b2c-4a1d-bd0f-0b9e9b9f64aa",
            "name": "Desk Lamp",
            "price": 900,
            "city": "Mumbai",
            "created_at": "2026-02-24T12:00:00Z",
            "user_id": "0e1b9f64-7b2c-4a1d-bd0f-0b9e9b9f64bb"
        });

        let listings: Vec<Listing> = decode_rows::<RawListingRow, _>("items", vec![row]);
        assert_eq!(listings.len(), 1);
        let listing = &listings[0];
        assert!(listing.images.is_empty());
        assert!(!listing.has_receipt);
        assert!(!listing.has_delivery);
        assert!(!listing.is_verified);
        assert!(!listing.is_sold);
        assert_eq!(listing.quality_rating, 0);
        assert_eq!(listing.description, "");
    }

    #[test]
    fn null_optional_columns_are_treated_like_missing_ones() {
        let row = json!({
            "id": "5e9b9f64-7b2c-4a1d-bd0f-0b9e9b9f64aa",
            "name": "Desk Lamp",
            "price": 900,
            "city": "Mumbai",
            "images": null,
            "has_delivery": null,
            "created_at": "2026-02-24T12:00:00Z",
            "user_id": "0e1b9f64-7b2c-4a1d-bd0f-0b9e9b9f64bb"
        });

        let listings: Vec<Listing> = decode_rows::<RawListingRow, _>("items", vec![row]);
        assert_eq!(listings.len(), 1);
        assert!(listings[0].images.is_empty());
        assert!(!listings[0].has_delivery);
    }

    #[test]
    fn rows_missing_required_columns_are_skipped_not_fatal() {
        let good = json!({
            "id": "5e9b9f64-7b2c-4a1d-bd0f-0b9e9b9f64aa",
            "name": "Chair",
            "price": 100,
            "city": "Delhi",
            "created_at": "2026-02-24T12:00:00Z",
            "user_id": "0e1b9f64-7b2c-4a1d-bd0f-0b9e9b9f64bb"
        });
        let bad = json!({ "name": "No id or price" });

        let listings: Vec<Listing> = decode_rows::<RawListingRow, _>("items", vec![bad, good]);
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].name, "Chair");
    }

    #[test]
    fn undefined_delivery_flag_is_excluded_by_a_delivery_filter() {
        let row = json!({
            "id": "5e9b9f64-7b2c-4a1d-bd0f-0b9e9b9f64aa",
            "name": "Mirror",
            "price": 700,
            "city": "Delhi",
            "created_at": "2026-02-24T12:00:00Z",
            "user_id": "0e1b9f64-7b2c-4a1d-bd0f-0b9e9b9f64bb"
        });
        let listings: Vec<Listing> = decode_rows::<RawListingRow, _>("items", vec![row]);

        let config = thriftee_core::FilterConfig {
            require_delivery: true,
            ..Default::default()
        };
        assert!(!config.matches(&listings[0]));
    }

    #[test]
    fn message_content_maps_onto_body() {
        let row = json!({
            "id": "5e9b9f64-7b2c-4a1d-bd0f-0b9e9b9f64aa",
            "chat_id": "6e9b9f64-7b2c-4a1d-bd0f-0b9e9b9f64ab",
            "sender_id": "0e1b9f64-7b2c-4a1d-bd0f-0b9e9b9f64bb",
            "content": "still available?",
            "created_at": "2026-02-24T12:00:00Z"
        });

        let messages: Vec<ChatMessage> = decode_rows::<RawMessageRow, _>("messages", vec![row]);
        assert_eq!(messages[0].body, "still available?");
    }
}
