use std::sync::{Arc, OnceLock};

use anyhow::Result;
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use thriftee_core::{Listing, UserProfile, WantedRequest};
use thriftee_store::{
    FixedSession, MarketStore, MemoryStore, RestStore, StoreConfig,
};
use thriftee_web::AppState;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "thriftee")]
#[command(about = "Thriftee marketplace server")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the JSON API, against the REST backend when configured, else an
    /// in-memory store seeded with the demo dataset.
    Serve,
    /// Print the demo dataset.
    Seed,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let port: u16 = std::env::var("THRIFTEE_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8000);
            let state = build_state().await?;
            info!(port, "serving");
            thriftee_web::serve(state, port).await?;
        }
        Commands::Seed => {
            println!("{}", serde_json::to_string_pretty(demo_data())?);
        }
    }

    Ok(())
}

async fn build_state() -> Result<AppState> {
    match StoreConfig::from_env() {
        Some(config) => {
            let store = Arc::new(RestStore::new(&config)?);
            Ok(AppState {
                market: store.clone(),
                chat: store,
                auth: Arc::new(FixedSession(None)),
            })
        }
        None => {
            let store = Arc::new(MemoryStore::new());
            seed(store.as_ref()).await?;
            info!("no backend configured; serving the seeded in-memory store");
            Ok(AppState {
                market: store.clone(),
                chat: store,
                auth: Arc::new(FixedSession(None)),
            })
        }
    }
}

#[derive(Debug, Serialize)]
struct DemoData {
    profiles: Vec<UserProfile>,
    listings: Vec<Listing>,
    requests: Vec<WantedRequest>,
}

/// Built once per process and shared by `serve` and `seed`.
fn demo_data() -> &'static DemoData {
    static DEMO: OnceLock<DemoData> = OnceLock::new();
    DEMO.get_or_init(|| {
        let now = Utc::now();
        let asha = UserProfile {
            id: Uuid::new_v4(),
            name: "Asha".to_string(),
            city: "Mumbai".to_string(),
            avatar_url: None,
            joined_at: now - Duration::days(200),
        };
        let ravi = UserProfile {
            id: Uuid::new_v4(),
            name: "Ravi".to_string(),
            city: "Delhi".to_string(),
            avatar_url: None,
            joined_at: now - Duration::days(40),
        };

        let listings = vec![
            Listing {
                id: Uuid::new_v4(),
                name: "Desk Lamp".to_string(),
                price: 900,
                description: "Warm light, brass finish".to_string(),
                city: "Mumbai".to_string(),
                locality: Some("Bandra".to_string()),
                images: Vec::new(),
                quality_rating: 4,
                has_receipt: true,
                has_delivery: false,
                is_verified: true,
                is_sold: false,
                created_at: now - Duration::minutes(45),
                owner_id: asha.id,
            },
            Listing {
                id: Uuid::new_v4(),
                name: "Bookshelf".to_string(),
                price: 3200,
                description: "Five shelves, solid wood".to_string(),
                city: "Delhi".to_string(),
                locality: None,
                images: Vec::new(),
                quality_rating: 3,
                has_receipt: false,
                has_delivery: true,
                is_verified: false,
                is_sold: false,
                created_at: now - Duration::hours(5),
                owner_id: ravi.id,
            },
            Listing {
                id: Uuid::new_v4(),
                name: "Office Chair".to_string(),
                price: 5500,
                description: "Ergonomic, slight wear".to_string(),
                city: "Delhi".to_string(),
                locality: Some("Saket".to_string()),
                images: Vec::new(),
                quality_rating: 5,
                has_receipt: true,
                has_delivery: true,
                is_verified: false,
                is_sold: false,
                created_at: now - Duration::days(2),
                owner_id: ravi.id,
            },
        ];

        let requests = vec![WantedRequest {
            id: Uuid::new_v4(),
            title: "Study Table".to_string(),
            description: Some("Compact, under a meter wide".to_string()),
            budget: 2500,
            city: "Mumbai".to_string(),
            locality: None,
            quality_min: 3,
            delivery_needed: true,
            created_at: now - Duration::hours(20),
            owner_id: asha.id,
        }];

        DemoData {
            profiles: vec![asha, ravi],
            listings,
            requests,
        }
    })
}

async fn seed(store: &MemoryStore) -> Result<()> {
    let data = demo_data();
    for profile in &data.profiles {
        store.upsert_profile(profile.clone()).await;
    }
    for listing in &data.listings {
        store.insert_listing(listing.clone()).await?;
    }
    for request in &data.requests {
        store.insert_request(request.clone()).await?;
    }
    info!(
        listings = data.listings.len(),
        requests = data.requests.len(),
        "seeded demo data"
    );
    Ok(())
}
