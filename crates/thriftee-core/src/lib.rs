//! Core domain model and browse engines for Thriftee.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod browse;
pub mod filter;
pub mod reveal;
pub mod time;

pub use browse::{Browsable, BrowseView, FetchGeneration};
pub use filter::{FilterConfig, Filterable, Searchable};
pub use reveal::{Reveal, PAGE_SIZE};
pub use time::format_age;

pub const CRATE_NAME: &str = "thriftee-core";

/// A second-hand item offered for sale.
///
/// Mutated only to flip `is_sold` or to be deleted by its owner; every other
/// field is fixed at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: Uuid,
    pub name: String,
    pub price: u32,
    pub description: String,
    pub city: String,
    pub locality: Option<String>,
    pub images: Vec<String>,
    pub quality_rating: u8,
    pub has_receipt: bool,
    pub has_delivery: bool,
    pub is_verified: bool,
    pub is_sold: bool,
    pub created_at: DateTime<Utc>,
    pub owner_id: Uuid,
}

/// A want-to-buy posting. Lifecycle mirrors `Listing` minus the sold flag.
///
/// `quality_min` is the requester's acceptance threshold, not a rating of
/// the posting itself; the browse filters compare it the same way they
/// compare a listing's own rating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WantedRequest {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub budget: u32,
    pub city: String,
    pub locality: Option<String>,
    pub quality_min: u8,
    pub delivery_needed: bool,
    pub created_at: DateTime<Utc>,
    pub owner_id: Uuid,
}

/// One buyer/seller conversation about one listing.
///
/// At most one thread exists per (listing, buyer, seller) triple; the chat
/// bootstrap derives the id deterministically from that triple so a racing
/// second creation collides instead of forking the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationThread {
    pub id: Uuid,
    pub listing_id: Uuid,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub thread_id: Uuid,
    pub sender_id: Uuid,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// Public profile fields attached to listings and chats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub city: String,
    pub avatar_url: Option<String>,
    pub joined_at: DateTime<Utc>,
}

impl UserProfile {
    /// Whole months between joining and `at`, for "seller since" captions.
    pub fn months_member(&self, at: DateTime<Utc>) -> i64 {
        (at - self.joined_at).num_days() / 30
    }
}
