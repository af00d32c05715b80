//! Axum JSON surface over the Thriftee browse and chat operations.
//!
//! Page markup and styling are out of scope; this crate exposes the core's
//! operations to whatever front end consumes them. One request is one view
//! interaction: browse handlers rebuild the view state from query params,
//! fetch once, and run the filter/reveal engines over the result.

use std::sync::Arc;

use axum::{
    extract::{Path as AxumPath, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use thriftee_chat::ChatError;
use thriftee_core::{
    format_age, BrowseView, FilterConfig, Listing, WantedRequest, PAGE_SIZE,
};
use thriftee_store::{AuthProvider, ChatStore, MarketStore, ServerPredicate, StoreError};
use tokio::net::TcpListener;
use tracing::error;
use uuid::Uuid;

pub const CRATE_NAME: &str = "thriftee-web";

#[derive(Clone)]
pub struct AppState {
    pub market: Arc<dyn MarketStore>,
    pub chat: Arc<dyn ChatStore>,
    pub auth: Arc<dyn AuthProvider>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("log in to continue")]
    Unauthenticated,
    #[error("only the owner may do that")]
    Forbidden,
    #[error(transparent)]
    Chat(#[from] ChatError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Unauthenticated | ApiError::Chat(ChatError::Unauthenticated) => {
                StatusCode::UNAUTHORIZED
            }
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::Chat(ChatError::SelfChat) => StatusCode::CONFLICT,
            ApiError::Store(StoreError::NotFound { .. }) => StatusCode::NOT_FOUND,
            ApiError::Chat(ChatError::Bootstrap(_)) | ApiError::Store(_) => {
                error!(err = %self, "backend call failed");
                StatusCode::BAD_GATEWAY
            }
        };
        (status, self.to_string()).into_response()
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/listings", get(browse_listings).post(create_listing))
        .route("/listings/{id}", get(listing_detail).delete(delete_listing))
        .route("/listings/{id}/sold", post(mark_sold))
        .route("/requests", get(browse_requests).post(create_request))
        .route("/requests/{id}", delete(delete_request))
        .route("/chats", get(list_chats).post(open_chat))
        .route("/chats/{id}/messages", get(list_messages).post(send_message))
        .with_state(Arc::new(state))
}

pub async fn serve(state: AppState, port: u16) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    axum::serve(listener, app(state)).await?;
    Ok(())
}

/// Demo session resolution: an `x-user-id` header wins, otherwise whatever
/// session the configured provider holds.
fn request_user(state: &AppState, headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v).ok())
        .or_else(|| state.auth.current_user())
}

#[derive(Debug, Deserialize, Default)]
struct BrowseQuery {
    q: Option<String>,
    min_amount: Option<u32>,
    max_amount: Option<u32>,
    min_quality: Option<u8>,
    city: Option<String>,
    receipt: Option<bool>,
    delivery: Option<bool>,
    verified: Option<bool>,
    /// How many times the view's "load more" has been pressed.
    pages: Option<usize>,
}

impl BrowseQuery {
    fn filter_config(&self) -> FilterConfig {
        FilterConfig {
            min_amount: self.min_amount,
            max_amount: self.max_amount,
            min_quality: self.min_quality.unwrap_or(0),
            city: self.city.clone(),
            require_receipt: self.receipt.unwrap_or(false),
            require_delivery: self.delivery.unwrap_or(false),
            require_verified: self.verified.unwrap_or(false),
            query: self.q.clone().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize)]
struct BrowsePage<T> {
    cards: Vec<T>,
    total_matching: usize,
    has_more: bool,
}

#[derive(Debug, Serialize)]
struct ListingCard {
    id: Uuid,
    name: String,
    price: u32,
    city: String,
    locality: Option<String>,
    images: Vec<String>,
    quality_rating: u8,
    has_receipt: bool,
    has_delivery: bool,
    is_verified: bool,
    posted: String,
    owner_id: Uuid,
}

impl ListingCard {
    fn from_listing(listing: &Listing, now: DateTime<Utc>) -> Self {
        Self {
            id: listing.id,
            name: listing.name.clone(),
            price: listing.price,
            city: listing.city.clone(),
            locality: listing.locality.clone(),
            images: listing.images.clone(),
            quality_rating: listing.quality_rating,
            has_receipt: listing.has_receipt,
            has_delivery: listing.has_delivery,
            is_verified: listing.is_verified,
            posted: format_age(listing.created_at, now),
            owner_id: listing.owner_id,
        }
    }
}

#[derive(Debug, Serialize)]
struct RequestCard {
    id: Uuid,
    title: String,
    description: Option<String>,
    budget: u32,
    city: String,
    locality: Option<String>,
    quality_min: u8,
    delivery_needed: bool,
    posted: String,
    owner_id: Uuid,
}

impl RequestCard {
    fn from_request(request: &WantedRequest, now: DateTime<Utc>) -> Self {
        Self {
            id: request.id,
            title: request.title.clone(),
            description: request.description.clone(),
            budget: request.budget,
            city: request.city.clone(),
            locality: request.locality.clone(),
            quality_min: request.quality_min,
            delivery_needed: request.delivery_needed,
            posted: format_age(request.created_at, now),
            owner_id: request.owner_id,
        }
    }
}

fn revealed_pages<R>(view: &mut BrowseView<R>, pages: Option<usize>)
where
    R: thriftee_core::Browsable,
{
    // Anything past the last page is a no-op, so the clamp only bounds work.
    let pages = pages
        .unwrap_or(0)
        .min(view.total_matching() / PAGE_SIZE + 1);
    for _ in 0..pages {
        view.load_more();
    }
}

async fn browse_listings(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BrowseQuery>,
) -> Result<Json<BrowsePage<ListingCard>>, ApiError> {
    let mut view = BrowseView::new();
    let generation = view.begin_fetch();
    let records = state.market.fetch_listings(ServerPredicate::unsold()).await?;
    view.complete_fetch(generation, records);
    view.set_config(query.filter_config());
    revealed_pages(&mut view, query.pages);

    let now = Utc::now();
    Ok(Json(BrowsePage {
        total_matching: view.total_matching(),
        has_more: view.has_more(),
        cards: view
            .visible()
            .into_iter()
            .map(|listing| ListingCard::from_listing(listing, now))
            .collect(),
    }))
}

async fn browse_requests(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BrowseQuery>,
) -> Result<Json<BrowsePage<RequestCard>>, ApiError> {
    let mut view = BrowseView::new();
    let generation = view.begin_fetch();
    let records = state.market.fetch_requests(ServerPredicate::All).await?;
    view.complete_fetch(generation, records);
    view.set_config(query.filter_config());
    revealed_pages(&mut view, query.pages);

    let now = Utc::now();
    Ok(Json(BrowsePage {
        total_matching: view.total_matching(),
        has_more: view.has_more(),
        cards: view
            .visible()
            .into_iter()
            .map(|request| RequestCard::from_request(request, now))
            .collect(),
    }))
}

#[derive(Debug, Serialize)]
struct ListingDetail {
    #[serde(flatten)]
    card: ListingCard,
    description: String,
    is_sold: bool,
    seller_since_months: Option<i64>,
}

async fn listing_detail(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<Uuid>,
) -> Result<Json<ListingDetail>, ApiError> {
    let listing = state
        .market
        .fetch_listing(id)
        .await?
        .ok_or(StoreError::NotFound {
            entity: "listing",
            id,
        })?;
    let seller_since_months = state
        .market
        .fetch_profile(listing.owner_id)
        .await?
        .map(|profile| profile.months_member(listing.created_at));

    Ok(Json(ListingDetail {
        card: ListingCard::from_listing(&listing, Utc::now()),
        description: listing.description.clone(),
        is_sold: listing.is_sold,
        seller_since_months,
    }))
}

#[derive(Debug, Deserialize)]
struct NewListing {
    name: String,
    price: u32,
    #[serde(default)]
    description: String,
    city: String,
    #[serde(default)]
    locality: Option<String>,
    #[serde(default)]
    images: Vec<String>,
    #[serde(default)]
    quality_rating: u8,
    #[serde(default)]
    has_receipt: bool,
    #[serde(default)]
    has_delivery: bool,
}

async fn create_listing(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<NewListing>,
) -> Result<(StatusCode, Json<Listing>), ApiError> {
    let owner_id = request_user(&state, &headers).ok_or(ApiError::Unauthenticated)?;
    let listing = Listing {
        id: Uuid::new_v4(),
        name: body.name,
        price: body.price,
        description: body.description,
        city: body.city,
        locality: body.locality,
        images: body.images,
        quality_rating: body.quality_rating.min(5),
        has_receipt: body.has_receipt,
        has_delivery: body.has_delivery,
        is_verified: false,
        is_sold: false,
        created_at: Utc::now(),
        owner_id,
    };
    state.market.insert_listing(listing.clone()).await?;
    Ok((StatusCode::CREATED, Json(listing)))
}

#[derive(Debug, Deserialize)]
struct NewRequest {
    title: String,
    #[serde(default)]
    description: Option<String>,
    budget: u32,
    city: String,
    #[serde(default)]
    locality: Option<String>,
    #[serde(default)]
    quality_min: u8,
    #[serde(default)]
    delivery_needed: bool,
}

async fn create_request(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<NewRequest>,
) -> Result<(StatusCode, Json<WantedRequest>), ApiError> {
    let owner_id = request_user(&state, &headers).ok_or(ApiError::Unauthenticated)?;
    let request = WantedRequest {
        id: Uuid::new_v4(),
        title: body.title,
        description: body.description,
        budget: body.budget,
        city: body.city,
        locality: body.locality,
        quality_min: body.quality_min.min(5),
        delivery_needed: body.delivery_needed,
        created_at: Utc::now(),
        owner_id,
    };
    state.market.insert_request(request.clone()).await?;
    Ok((StatusCode::CREATED, Json(request)))
}

async fn owned_listing(state: &AppState, headers: &HeaderMap, id: Uuid) -> Result<Listing, ApiError> {
    let user = request_user(state, headers).ok_or(ApiError::Unauthenticated)?;
    let listing = state
        .market
        .fetch_listing(id)
        .await?
        .ok_or(StoreError::NotFound {
            entity: "listing",
            id,
        })?;
    if listing.owner_id != user {
        return Err(ApiError::Forbidden);
    }
    Ok(listing)
}

async fn mark_sold(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AxumPath(id): AxumPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    owned_listing(&state, &headers, id).await?;
    state.market.mark_sold(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_listing(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AxumPath(id): AxumPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    owned_listing(&state, &headers, id).await?;
    state.market.delete_listing(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_request(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AxumPath(id): AxumPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    let user = request_user(&state, &headers).ok_or(ApiError::Unauthenticated)?;
    let requests = state
        .market
        .fetch_requests(ServerPredicate::owned_by(user))
        .await?;
    if !requests.iter().any(|request| request.id == id) {
        return Err(ApiError::Forbidden);
    }
    state.market.delete_request(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct OpenChat {
    listing_id: Uuid,
    seller_id: Uuid,
}

async fn open_chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<OpenChat>,
) -> Result<Json<thriftee_core::ConversationThread>, ApiError> {
    let session = thriftee_store::FixedSession(request_user(&state, &headers));
    let thread =
        thriftee_chat::start_chat(state.chat.as_ref(), &session, body.listing_id, body.seller_id)
            .await?;
    Ok(Json(thread))
}

async fn list_chats(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<thriftee_core::ConversationThread>>, ApiError> {
    let user = request_user(&state, &headers).ok_or(ApiError::Unauthenticated)?;
    Ok(Json(state.chat.threads_for_user(user).await?))
}

async fn list_messages(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<Uuid>,
) -> Result<Json<Vec<thriftee_core::ChatMessage>>, ApiError> {
    Ok(Json(state.chat.fetch_messages(id).await?))
}

#[derive(Debug, Deserialize)]
struct NewMessage {
    body: String,
}

async fn send_message(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AxumPath(id): AxumPath<Uuid>,
    Json(body): Json<NewMessage>,
) -> Result<(StatusCode, Json<thriftee_core::ChatMessage>), ApiError> {
    let sender_id = request_user(&state, &headers).ok_or(ApiError::Unauthenticated)?;
    let message = thriftee_core::ChatMessage {
        id: Uuid::new_v4(),
        thread_id: id,
        sender_id,
        body: body.body,
        created_at: Utc::now(),
    };
    state.chat.send_message(message.clone()).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;
    use thriftee_store::{FixedSession, MemoryStore};
    use tower::ServiceExt;

    async fn seeded_state() -> (AppState, Uuid, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let seller = Uuid::new_v4();
        let listing_id = Uuid::new_v4();

        let listing = Listing {
            id: listing_id,
            name: "Desk Lamp".to_string(),
            price: 900,
            description: "Warm light".to_string(),
            city: "Mumbai".to_string(),
            locality: None,
            images: Vec::new(),
            quality_rating: 4,
            has_receipt: true,
            has_delivery: false,
            is_verified: false,
            is_sold: false,
            created_at: Utc::now(),
            owner_id: seller,
        };
        let sold = Listing {
            id: Uuid::new_v4(),
            name: "Gone Chair".to_string(),
            is_sold: true,
            ..listing.clone()
        };
        let pricey = Listing {
            id: Uuid::new_v4(),
            name: "Antique Cabinet".to_string(),
            price: 45_000,
            city: "Delhi".to_string(),
            ..listing.clone()
        };

        store.insert_listing(listing).await.unwrap();
        store.insert_listing(sold).await.unwrap();
        store.insert_listing(pricey).await.unwrap();

        let state = AppState {
            market: store.clone(),
            chat: store,
            auth: Arc::new(FixedSession(None)),
        };
        (state, seller, listing_id)
    }

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn browse_returns_only_unsold_matches_with_reveal_metadata() {
        let (state, _, _) = seeded_state().await;
        let app = app(state);

        let resp = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/listings?max_amount=5000")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let page = body_json(resp).await;
        assert_eq!(page["total_matching"], 1);
        assert_eq!(page["has_more"], false);
        assert_eq!(page["cards"][0]["name"], "Desk Lamp");
        assert!(page["cards"][0]["posted"]
            .as_str()
            .unwrap()
            .starts_with("Posted "));
    }

    #[tokio::test]
    async fn search_query_filters_by_name_or_city() {
        let (state, _, _) = seeded_state().await;
        let app = app(state);

        let resp = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/listings?q=lamp")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let page = body_json(resp).await;
        assert_eq!(page["total_matching"], 1);
        assert_eq!(page["cards"][0]["name"], "Desk Lamp");
    }

    #[tokio::test]
    async fn opening_a_chat_requires_a_session() {
        let (state, seller, listing_id) = seeded_state().await;
        let app = app(state);

        let body = serde_json::json!({ "listing_id": listing_id, "seller_id": seller });
        let resp = app
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/chats")
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_vec(&body).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn self_chat_maps_to_conflict() {
        let (state, seller, listing_id) = seeded_state().await;
        let app = app(state);

        let body = serde_json::json!({ "listing_id": listing_id, "seller_id": seller });
        let resp = app
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/chats")
                    .header("content-type", "application/json")
                    .header("x-user-id", seller.to_string())
                    .body(Body::from(serde_json::to_vec(&body).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn repeated_chat_opens_return_the_same_thread() {
        let (state, seller, listing_id) = seeded_state().await;
        let app = app(state);
        let buyer = Uuid::new_v4();
        let body = serde_json::json!({ "listing_id": listing_id, "seller_id": seller });

        let mut ids = Vec::new();
        for _ in 0..2 {
            let resp = app
                .clone()
                .oneshot(
                    axum::http::Request::builder()
                        .method("POST")
                        .uri("/chats")
                        .header("content-type", "application/json")
                        .header("x-user-id", buyer.to_string())
                        .body(Body::from(serde_json::to_vec(&body).unwrap()))
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::OK);
            ids.push(body_json(resp).await["id"].as_str().unwrap().to_string());
        }
        assert_eq!(ids[0], ids[1]);
    }

    #[tokio::test]
    async fn only_the_owner_can_mark_sold() {
        let (state, seller, listing_id) = seeded_state().await;
        let app = app(state);

        let stranger = app
            .clone()
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri(format!("/listings/{listing_id}/sold"))
                    .header("x-user-id", Uuid::new_v4().to_string())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(stranger.status(), StatusCode::FORBIDDEN);

        let owner = app
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri(format!("/listings/{listing_id}/sold"))
                    .header("x-user-id", seller.to_string())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(owner.status(), StatusCode::NO_CONTENT);
    }
}
