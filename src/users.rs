//! User provisioning, interactions, and deck persistence.
//!
//! Users are created lazily: every write path provisions the user record
//! first (ensure-then-act), so no interaction or deck write ever targets a
//! missing user. A missing user on the read paths is normal cold-start, not
//! an anomaly.

use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::warn;

use crate::models::{Interaction, InteractionDetail, InteractionKind, UserRecord};
use crate::store::{RecommendStore, StoreError};

/// Thin layer over the store's user operations, owning only the
/// provisioning/idempotency logic. All persisted state lives in the store.
pub struct UserInteractionStore {
    store: Arc<dyn RecommendStore>,
}

impl UserInteractionStore {
    pub fn new(store: Arc<dyn RecommendStore>) -> Self {
        Self { store }
    }

    /// Idempotent provisioning: create the user with an empty deck if absent.
    ///
    /// Infallible: provisioning must never block the caller's primary
    /// action. An existence-check failure is treated as "does not
    /// exist" (provision anyway), and a creation failure is logged and
    /// swallowed; if the user did exist after all, the create is rejected by
    /// the store and ignored here.
    pub async fn ensure_user(&self, user_id: &str) {
        let exists = match self.store.user_exists(user_id).await {
            Ok(exists) => exists,
            Err(e) => {
                warn!(user = %user_id, error = %e, "user existence check failed, provisioning anyway");
                false
            }
        };

        if !exists {
            if let Err(e) = self.store.create_user(&UserRecord::empty(user_id)).await {
                warn!(user = %user_id, error = %e, "user provisioning failed");
            }
        }
    }

    /// Record one interaction event. Events accumulate; they never overwrite.
    pub async fn record_interaction(
        &self,
        user_id: &str,
        card_id: &str,
        kind: InteractionKind,
        weight: f64,
    ) -> Result<(), StoreError> {
        self.ensure_user(user_id).await;
        self.store
            .add_interaction(user_id, card_id, kind, weight)
            .await
    }

    /// All recorded interaction events, joined with card names and images.
    ///
    /// A retrieval failure yields an empty list: a user the store does not
    /// know yet simply has no interactions. A failed card-info lookup
    /// degrades to empty display fields rather than dropping events.
    pub async fn list_interactions(&self, user_id: &str) -> Vec<InteractionDetail> {
        self.ensure_user(user_id).await;

        let events: Vec<Interaction> = match self.store.interactions(user_id).await {
            Ok(events) => events,
            Err(e) => {
                warn!(user = %user_id, error = %e, "interaction retrieval failed, treating as cold start");
                return Vec::new();
            }
        };

        let ids: Vec<String> = events
            .iter()
            .map(|event| event.item_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let cards = match self.store.fetch_by_ids(&ids).await {
            Ok(cards) => cards,
            Err(e) => {
                warn!(user = %user_id, error = %e, "card info lookup failed");
                Vec::new()
            }
        };

        events
            .into_iter()
            .map(|event| {
                let info = cards.iter().find(|c| c.card_id == event.item_id);
                InteractionDetail {
                    item_id: event.item_id,
                    name: info.map(|c| c.name.clone()).unwrap_or_default(),
                    interaction_property_name: event.interaction_property_name,
                    weight: event.weight,
                    image_uri: info.map(|c| c.image_uri.clone()).unwrap_or_default(),
                }
            })
            .collect()
    }

    pub async fn delete_all_interactions(&self, user_id: &str) -> Result<(), StoreError> {
        self.ensure_user(user_id).await;
        self.store.delete_interactions(user_id).await
    }

    pub async fn save_deck(&self, user_id: &str, deck: &str) -> Result<(), StoreError> {
        self.ensure_user(user_id).await;
        self.store
            .update_user(&UserRecord {
                id: user_id.to_string(),
                decks: deck.to_string(),
            })
            .await
    }

    pub async fn load_deck(&self, user_id: &str) -> Result<String, StoreError> {
        self.ensure_user(user_id).await;
        Ok(self.store.get_user(user_id).await?.decks)
    }
}
