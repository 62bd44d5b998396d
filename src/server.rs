//! HTTP API for the front end.
//!
//! Exposes catalog listing, the three recommendation strategies, and the
//! user interaction/deck operations as a JSON API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Liveness check |
//! | `POST` | `/cards` | Paged/filtered catalog listing |
//! | `POST` | `/card_recommendation` | Item-based recommendations |
//! | `POST` | `/user_recommendation` | User-based recommendations |
//! | `POST` | `/card_search` | Personalized hybrid search |
//! | `POST` | `/add_interaction` | Record one interaction event |
//! | `POST` | `/get_interactions` | All recorded interaction events |
//! | `POST` | `/delete_all_interactions` | Clear a user's history |
//! | `POST` | `/save_deck` | Persist the deck blob |
//! | `POST` | `/get_deck` | Load the deck blob |
//!
//! # Error Contract
//!
//! Internal failures never cross the boundary: every handler answers with a
//! status code plus an empty or default-shaped body, and a failed
//! recommendation strategy degrades to random cards inside the router rather
//! than failing the request.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted; the API is consumed by a
//! browser front end served from a different origin.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::config::Config;
use crate::models::InteractionKind;
use crate::recommend::{RecommendationRequest, RecommendationRouter};
use crate::store::HttpRecommendStore;
use crate::users::UserInteractionStore;

/// Shared application state passed to all route handlers. Both halves hold
/// the same store handle; the backend is the sole serialization point and no
/// in-process locking happens here.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<RecommendationRouter>,
    pub users: Arc<UserInteractionStore>,
}

/// Build the application router with all routes and the CORS layer.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/cards", post(handle_cards))
        .route("/card_recommendation", post(handle_card_recommendation))
        .route("/user_recommendation", post(handle_user_recommendation))
        .route("/card_search", post(handle_card_search))
        .route("/add_interaction", post(handle_add_interaction))
        .route("/get_interactions", post(handle_get_interactions))
        .route(
            "/delete_all_interactions",
            post(handle_delete_all_interactions),
        )
        .route("/save_deck", post(handle_save_deck))
        .route("/get_deck", post(handle_get_deck))
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server.
///
/// Constructs the single shared store handle, binds to `[server].bind`, and
/// serves until SIGINT/SIGTERM; the handle is dropped on the way out.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let store = Arc::new(HttpRecommendStore::new(&config.store)?);
    let state = AppState {
        router: Arc::new(RecommendationRouter::new(
            store.clone(),
            config.recommend.clone(),
        )),
        users: Arc::new(UserInteractionStore::new(store)),
    };

    let bind_addr = &config.server.bind;
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!("API server listening on http://{}", bind_addr);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received terminate signal, shutting down"),
    }
}

// ============ request payloads ============

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CardsPayload {
    page: u64,
    page_size: u64,
    user_id: String,
    #[serde(default)]
    color_filter: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CardRecommendationPayload {
    card_ids: Vec<String>,
    number_of_cards: usize,
    user_id: String,
    #[serde(default)]
    color_filter: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserRecommendationPayload {
    user_id: String,
    number_of_cards: usize,
    #[serde(default)]
    color_filter: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchCardsPayload {
    query: String,
    user_id: String,
    number_of_cards: usize,
    number_of_interactions: i64,
    number_of_deck: i64,
    #[serde(default = "default_search_type")]
    search_type: String,
    #[serde(default)]
    color_filter: Vec<String>,
}

fn default_search_type() -> String {
    "hybrid".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddInteractionPayload {
    user_id: String,
    card_id: String,
    interaction: InteractionKind,
    weight: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserPayload {
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct SaveDeckPayload {
    #[serde(rename = "userId")]
    user_id: String,
    deck_string: String,
}

// ============ handlers ============

fn cards_body(cards: &[crate::models::CardRecord]) -> Json<Value> {
    Json(json!({ "cards": cards, "total": cards.len() }))
}

fn page_body(page: &crate::recommend::RecommendationPage) -> Json<Value> {
    Json(json!({ "cards": page.cards, "total": page.total }))
}

fn no_cards() -> Json<Value> {
    Json(json!({ "cards": [], "total": 0 }))
}

async fn handle_health() -> Json<Value> {
    Json(json!({ "connected": true }))
}

async fn handle_cards(
    State(state): State<AppState>,
    Json(payload): Json<CardsPayload>,
) -> (StatusCode, Json<Value>) {
    info!(user = %payload.user_id, page = payload.page, "listing cards");

    match state
        .router
        .list_cards(payload.page, payload.page_size, &payload.color_filter)
        .await
    {
        Ok(cards) => (StatusCode::OK, cards_body(&cards)),
        Err(e) => {
            error!(error = %e, "card listing failed");
            (StatusCode::BAD_REQUEST, no_cards())
        }
    }
}

async fn handle_card_recommendation(
    State(state): State<AppState>,
    Json(payload): Json<CardRecommendationPayload>,
) -> (StatusCode, Json<Value>) {
    info!(user = %payload.user_id, "item-based recommendation");

    if payload.card_ids.is_empty() {
        return (StatusCode::BAD_REQUEST, no_cards());
    }

    let page = state
        .router
        .recommend(
            RecommendationRequest::ItemBased {
                ids: payload.card_ids,
                limit: payload.number_of_cards,
            },
            &payload.color_filter,
        )
        .await;
    (StatusCode::OK, page_body(&page))
}

async fn handle_user_recommendation(
    State(state): State<AppState>,
    Json(payload): Json<UserRecommendationPayload>,
) -> (StatusCode, Json<Value>) {
    info!(user = %payload.user_id, "user-based recommendation");

    let page = state
        .router
        .recommend(
            RecommendationRequest::UserBased {
                user_id: payload.user_id,
                limit: payload.number_of_cards,
            },
            &payload.color_filter,
        )
        .await;
    (StatusCode::OK, page_body(&page))
}

async fn handle_card_search(
    State(state): State<AppState>,
    Json(payload): Json<SearchCardsPayload>,
) -> (StatusCode, Json<Value>) {
    let page = state
        .router
        .recommend(
            RecommendationRequest::Search {
                query: payload.query,
                user_id: payload.user_id,
                limit: payload.number_of_cards,
                interaction_count: payload.number_of_interactions,
                deck_size: payload.number_of_deck,
                search_type: payload.search_type,
            },
            &payload.color_filter,
        )
        .await;
    (StatusCode::OK, page_body(&page))
}

async fn handle_add_interaction(
    State(state): State<AppState>,
    Json(payload): Json<AddInteractionPayload>,
) -> (StatusCode, Json<Value>) {
    info!(
        user = %payload.user_id,
        card = %payload.card_id,
        kind = %payload.interaction,
        "adding interaction"
    );

    match state
        .users
        .record_interaction(
            &payload.user_id,
            &payload.card_id,
            payload.interaction,
            payload.weight,
        )
        .await
    {
        Ok(()) => (StatusCode::OK, Json(Value::Null)),
        Err(e) => {
            error!(error = %e, "adding interaction failed");
            (StatusCode::BAD_REQUEST, Json(Value::Null))
        }
    }
}

async fn handle_get_interactions(
    State(state): State<AppState>,
    Json(payload): Json<UserPayload>,
) -> (StatusCode, Json<Value>) {
    info!(user = %payload.user_id, "listing interactions");

    let details = state.users.list_interactions(&payload.user_id).await;
    (StatusCode::OK, Json(json!(details)))
}

async fn handle_delete_all_interactions(
    State(state): State<AppState>,
    Json(payload): Json<UserPayload>,
) -> (StatusCode, Json<Value>) {
    info!(user = %payload.user_id, "deleting all interactions");

    match state.users.delete_all_interactions(&payload.user_id).await {
        Ok(()) => (StatusCode::OK, Json(Value::Null)),
        Err(e) => {
            error!(error = %e, "deleting interactions failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(Value::Null))
        }
    }
}

async fn handle_save_deck(
    State(state): State<AppState>,
    Json(payload): Json<SaveDeckPayload>,
) -> (StatusCode, Json<Value>) {
    info!(user = %payload.user_id, "saving deck");

    match state
        .users
        .save_deck(&payload.user_id, &payload.deck_string)
        .await
    {
        Ok(()) => (StatusCode::OK, Json(Value::Null)),
        Err(e) => {
            error!(error = %e, "saving deck failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(Value::Null))
        }
    }
}

async fn handle_get_deck(
    State(state): State<AppState>,
    Json(payload): Json<UserPayload>,
) -> (StatusCode, Json<Value>) {
    info!(user = %payload.user_id, "loading deck");

    match state.users.load_deck(&payload.user_id).await {
        Ok(deck) => (StatusCode::OK, Json(json!(deck))),
        Err(e) => {
            error!(error = %e, "loading deck failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(Value::Null))
        }
    }
}
