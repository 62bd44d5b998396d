//! Recommendation store abstraction and HTTP client.
//!
//! The vector/recommendation engine is an external service; this module is
//! the seam. [`RecommendStore`] captures the operations the orchestration
//! layer needs (item/user CRUD, training control, recommendation and search)
//! and [`HttpRecommendStore`] implements them over the service's JSON API
//! with a single shared `reqwest` client.
//!
//! Policy lives above this seam: the client performs no retries. Ingestion
//! fails fast on write errors, the training lifecycle owns its own poll
//! cadence, and the router converts strategy failures into fallback sampling.

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

use crate::config::StoreConfig;
use crate::models::{
    CardRecord, CollectionSchema, Interaction, InteractionKind, TrainStatus, UserRecord,
};

/// Error at the store seam. Everything the remote service can do wrong
/// collapses into these three cases; callers decide whether a failure is
/// fatal (ingestion, training) or recoverable (recommendation fallback).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("request to recommendation store failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("recommendation store returned {status}: {message}")]
    Remote { status: u16, message: String },
    #[error("unexpected response from recommendation store: {0}")]
    Decode(String),
}

impl StoreError {
    pub fn remote(status: u16, message: impl Into<String>) -> Self {
        StoreError::Remote {
            status,
            message: message.into(),
        }
    }
}

/// The opaque recommendation store.
///
/// One shared handle is constructed at process start and used by every
/// request handler concurrently; implementations must be safe for concurrent
/// use (the backend is the sole serialization point).
#[async_trait]
pub trait RecommendStore: Send + Sync {
    // ---- collection ----

    /// Install the collection schema.
    async fn create_collection(&self, schema: &CollectionSchema) -> Result<(), StoreError>;

    /// Drop the collection and everything in it.
    async fn delete_collection(&self) -> Result<(), StoreError>;

    /// Insert a batch of items. Not idempotent: re-inserting an id is a
    /// remote error, which is why ingestion aborts rather than retries.
    async fn add_items(&self, items: &[CardRecord]) -> Result<(), StoreError>;

    /// Total number of items in the collection.
    async fn item_count(&self) -> Result<u64, StoreError>;

    /// Fetch a page of items ordered by name ascending.
    async fn fetch_page(&self, limit: u64, offset: u64) -> Result<Vec<CardRecord>, StoreError>;

    /// Fetch up to `limit` items whose color identity contains all of
    /// `colors`, ordered by name ascending.
    async fn fetch_where_colors(
        &self,
        colors: &[String],
        limit: u64,
    ) -> Result<Vec<CardRecord>, StoreError>;

    /// Fetch items by id. Unknown ids are silently absent from the result.
    async fn fetch_by_ids(&self, ids: &[String]) -> Result<Vec<CardRecord>, StoreError>;

    // ---- training ----

    /// Start a training run. `overwrite` discards any previous trained
    /// state. The service rejects the call while a run is in progress.
    async fn start_training(&self, overwrite: bool) -> Result<(), StoreError>;

    /// Whether a training run is currently in progress.
    async fn is_training(&self) -> Result<bool, StoreError>;

    /// The raw status of the latest training run.
    async fn train_status(&self) -> Result<TrainStatus, StoreError>;

    // ---- recommendation ----

    /// Similar items to one item, with the item itself removed from the
    /// result set.
    async fn recommend_from_item(
        &self,
        item_id: &str,
        limit: usize,
        colors: &[String],
    ) -> Result<Vec<CardRecord>, StoreError>;

    /// Similar items to a set of items (aggregated by the backend), with the
    /// query items removed from the result set.
    async fn recommend_from_items(
        &self,
        item_ids: &[String],
        limit: usize,
        colors: &[String],
    ) -> Result<Vec<CardRecord>, StoreError>;

    /// Affinity recommendations from a user's most recent `history`
    /// interactions.
    async fn recommend_from_user(
        &self,
        user_id: &str,
        limit: usize,
        history: usize,
        colors: &[String],
    ) -> Result<Vec<CardRecord>, StoreError>;

    /// Hybrid text search. `influence` weights personalization against raw
    /// query relevance.
    #[allow(clippy::too_many_arguments)]
    async fn search(
        &self,
        query: &str,
        user_id: &str,
        limit: usize,
        influence: f64,
        search_type: &str,
        colors: &[String],
    ) -> Result<Vec<CardRecord>, StoreError>;

    // ---- users ----

    async fn user_exists(&self, user_id: &str) -> Result<bool, StoreError>;

    async fn create_user(&self, user: &UserRecord) -> Result<(), StoreError>;

    async fn update_user(&self, user: &UserRecord) -> Result<(), StoreError>;

    async fn get_user(&self, user_id: &str) -> Result<UserRecord, StoreError>;

    async fn add_interaction(
        &self,
        user_id: &str,
        item_id: &str,
        kind: InteractionKind,
        weight: f64,
    ) -> Result<(), StoreError>;

    /// All recorded interaction events for a user, in recording order.
    async fn interactions(&self, user_id: &str) -> Result<Vec<Interaction>, StoreError>;

    async fn delete_interactions(&self, user_id: &str) -> Result<(), StoreError>;
}

// ============ HTTP implementation ============

/// [`RecommendStore`] over the service's JSON HTTP API.
pub struct HttpRecommendStore {
    client: reqwest::Client,
    base_url: String,
    collection: String,
    api_key: Option<String>,
}

impl HttpRecommendStore {
    /// Build a store handle from configuration. The API key is read from the
    /// environment variable named by `api_key_env`; when unset, requests are
    /// sent unauthenticated.
    pub fn new(config: &StoreConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            collection: config.collection.clone(),
            api_key: std::env::var(&config.api_key_env).ok(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/v1{}", self.base_url, path)
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, StoreError> {
        let mut req = self.client.request(method, self.endpoint(path));
        if let Some(key) = &self.api_key {
            req = req.header("X-Api-Key", key);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }

        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(StoreError::remote(status.as_u16(), message));
        }

        if status == StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }
        response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }

    async fn get(&self, path: &str) -> Result<Value, StoreError> {
        self.request(Method::GET, path, None).await
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, StoreError> {
        self.request(Method::POST, path, Some(body)).await
    }
}

/// Contains-all filter on color identity, in the service's filter shape.
/// `None` when no colors are given.
fn color_filter(colors: &[String]) -> Value {
    if colors.is_empty() {
        Value::Null
    } else {
        json!([{
            "property_name": "color_identity",
            "operator": "ContainsAll",
            "value": colors,
        }])
    }
}

/// Extract card records from a response's object list. Objects carry their
/// fields under `properties`; a flat object is accepted as well.
fn cards_from(value: &Value, key: &str) -> Result<Vec<CardRecord>, StoreError> {
    let arr = value
        .get(key)
        .and_then(Value::as_array)
        .ok_or_else(|| StoreError::Decode(format!("missing `{key}` array")))?;

    arr.iter()
        .map(|obj| {
            let props = obj.get("properties").unwrap_or(obj);
            serde_json::from_value(props.clone()).map_err(|e| StoreError::Decode(e.to_string()))
        })
        .collect()
}

#[async_trait]
impl RecommendStore for HttpRecommendStore {
    async fn create_collection(&self, schema: &CollectionSchema) -> Result<(), StoreError> {
        let body = serde_json::to_value(schema).map_err(|e| StoreError::Decode(e.to_string()))?;
        self.post("/collection", body).await?;
        Ok(())
    }

    async fn delete_collection(&self) -> Result<(), StoreError> {
        self.request(
            Method::DELETE,
            &format!("/collection/{}", self.collection),
            None,
        )
        .await?;
        Ok(())
    }

    async fn add_items(&self, items: &[CardRecord]) -> Result<(), StoreError> {
        let payload: Vec<Value> = items
            .iter()
            .map(|card| {
                json!({
                    "id": card.card_id,
                    "properties": card,
                })
            })
            .collect();
        self.post("/item/batch", json!({ "items": payload })).await?;
        Ok(())
    }

    async fn item_count(&self) -> Result<u64, StoreError> {
        let value = self.get("/collection/count").await?;
        value
            .get("total")
            .and_then(Value::as_u64)
            .ok_or_else(|| StoreError::Decode("missing `total`".to_string()))
    }

    async fn fetch_page(&self, limit: u64, offset: u64) -> Result<Vec<CardRecord>, StoreError> {
        let value = self
            .post(
                "/collection/query",
                json!({
                    "limit": limit,
                    "offset": offset,
                    "sort": { "property": "name", "ascending": true },
                }),
            )
            .await?;
        cards_from(&value, "objects")
    }

    async fn fetch_where_colors(
        &self,
        colors: &[String],
        limit: u64,
    ) -> Result<Vec<CardRecord>, StoreError> {
        let value = self
            .post(
                "/collection/query",
                json!({
                    "limit": limit,
                    "sort": { "property": "name", "ascending": true },
                    "filters": color_filter(colors),
                }),
            )
            .await?;
        cards_from(&value, "objects")
    }

    async fn fetch_by_ids(&self, ids: &[String]) -> Result<Vec<CardRecord>, StoreError> {
        let value = self
            .post("/collection/objects", json!({ "ids": ids }))
            .await?;
        cards_from(&value, "objects")
    }

    async fn start_training(&self, overwrite: bool) -> Result<(), StoreError> {
        self.post("/train", json!({ "overwrite": overwrite })).await?;
        Ok(())
    }

    async fn is_training(&self) -> Result<bool, StoreError> {
        let value = self.get("/is_training").await?;
        value
            .get("is_training")
            .and_then(Value::as_bool)
            .ok_or_else(|| StoreError::Decode("missing `is_training`".to_string()))
    }

    async fn train_status(&self) -> Result<TrainStatus, StoreError> {
        let value = self.get("/train/status").await?;
        serde_json::from_value(value).map_err(|e| StoreError::Decode(e.to_string()))
    }

    async fn recommend_from_item(
        &self,
        item_id: &str,
        limit: usize,
        colors: &[String],
    ) -> Result<Vec<CardRecord>, StoreError> {
        let value = self
            .post(
                "/recommendation/item/from_item",
                json!({
                    "item_id": item_id,
                    "limit": limit,
                    "remove_reference": true,
                    "filters": color_filter(colors),
                }),
            )
            .await?;
        cards_from(&value, "recommendations")
    }

    async fn recommend_from_items(
        &self,
        item_ids: &[String],
        limit: usize,
        colors: &[String],
    ) -> Result<Vec<CardRecord>, StoreError> {
        let value = self
            .post(
                "/recommendation/item/from_items",
                json!({
                    "item_ids": item_ids,
                    "limit": limit,
                    "remove_reference": true,
                    "filters": color_filter(colors),
                }),
            )
            .await?;
        cards_from(&value, "recommendations")
    }

    async fn recommend_from_user(
        &self,
        user_id: &str,
        limit: usize,
        history: usize,
        colors: &[String],
    ) -> Result<Vec<CardRecord>, StoreError> {
        let value = self
            .post(
                "/recommendation/item/from_user",
                json!({
                    "user_id": user_id,
                    "limit": limit,
                    "remove_reference": true,
                    "top_n_interactions": history,
                    "filters": color_filter(colors),
                }),
            )
            .await?;
        cards_from(&value, "recommendations")
    }

    async fn search(
        &self,
        query: &str,
        user_id: &str,
        limit: usize,
        influence: f64,
        search_type: &str,
        colors: &[String],
    ) -> Result<Vec<CardRecord>, StoreError> {
        let value = self
            .post(
                "/search",
                json!({
                    "text": query,
                    "user_id": user_id,
                    "limit": limit,
                    "influence_factor": influence,
                    "search_type": search_type,
                    "filters": color_filter(colors),
                }),
            )
            .await?;
        cards_from(&value, "results")
    }

    async fn user_exists(&self, user_id: &str) -> Result<bool, StoreError> {
        let value = self.get(&format!("/user/{user_id}/exists")).await?;
        value
            .get("exists")
            .and_then(Value::as_bool)
            .ok_or_else(|| StoreError::Decode("missing `exists`".to_string()))
    }

    async fn create_user(&self, user: &UserRecord) -> Result<(), StoreError> {
        self.post(
            "/user",
            json!({
                "id": user.id,
                "properties": { "decks": user.decks },
            }),
        )
        .await?;
        Ok(())
    }

    async fn update_user(&self, user: &UserRecord) -> Result<(), StoreError> {
        self.request(
            Method::PUT,
            "/user",
            Some(json!({
                "id": user.id,
                "properties": { "decks": user.decks },
            })),
        )
        .await?;
        Ok(())
    }

    async fn get_user(&self, user_id: &str) -> Result<UserRecord, StoreError> {
        let value = self.get(&format!("/user/{user_id}")).await?;
        let id = value
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or(user_id)
            .to_string();
        let decks = value
            .get("properties")
            .and_then(|p| p.get("decks"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Ok(UserRecord { id, decks })
    }

    async fn add_interaction(
        &self,
        user_id: &str,
        item_id: &str,
        kind: InteractionKind,
        weight: f64,
    ) -> Result<(), StoreError> {
        self.post(
            "/user/interaction",
            json!({
                "user_id": user_id,
                "item_id": item_id,
                "interaction_property_name": kind.to_string(),
                "weight": weight,
            }),
        )
        .await?;
        Ok(())
    }

    async fn interactions(&self, user_id: &str) -> Result<Vec<Interaction>, StoreError> {
        let value = self.get(&format!("/user/{user_id}/interactions")).await?;
        let arr = value
            .as_array()
            .or_else(|| value.get("interactions").and_then(Value::as_array))
            .ok_or_else(|| StoreError::Decode("missing interaction array".to_string()))?;
        arr.iter()
            .map(|v| {
                serde_json::from_value(v.clone()).map_err(|e| StoreError::Decode(e.to_string()))
            })
            .collect()
    }

    async fn delete_interactions(&self, user_id: &str) -> Result<(), StoreError> {
        self.request(
            Method::DELETE,
            &format!("/user/{user_id}/interactions"),
            None,
        )
        .await?;
        Ok(())
    }
}

// ============ scripted in-memory fake for unit tests ============
