//! Recommendation request routing.
//!
//! Picks a strategy purely from the request shape (item similarity, user
//! affinity, or hybrid text search) and converts any strategy failure into
//! random catalog sampling instead of an error. The fallback is an explicit
//! branch on the strategy `Result`, not implicit control flow: the caller
//! always receives a well-formed [`RecommendationPage`], degraded or not.

use rand::seq::SliceRandom;
use rand::Rng;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::RecommendConfig;
use crate::models::CardRecord;
use crate::store::{RecommendStore, StoreError};

/// Personalization never exceeds this weight, so at least 20% of a hybrid
/// search always rests on raw query relevance.
pub const PERSONALIZATION_CEILING: f64 = 0.8;

/// Below this many recorded interactions, personalization is untrusted and
/// search degrades to pure text relevance.
pub const COLD_START_MIN_INTERACTIONS: i64 = 5;

/// Weight of personalization against lexical/semantic match for a hybrid
/// search: `clamp((interactions/2 + deck_size) / 100, 0, 0.8)`, forced to
/// zero for cold-start users.
pub fn influence_factor(interaction_count: i64, deck_size: i64) -> f64 {
    if interaction_count < COLD_START_MIN_INTERACTIONS {
        return 0.0;
    }
    let raw = interaction_count as f64 / 2.0 + deck_size as f64;
    (raw / 100.0).clamp(0.0, PERSONALIZATION_CEILING)
}

/// A recommendation request. Strategy selection is a pure function of this
/// shape; the color filter rides alongside and applies to every strategy.
#[derive(Debug, Clone)]
pub enum RecommendationRequest {
    /// Similarity to one or more items. `ids` must be non-empty.
    ItemBased { ids: Vec<String>, limit: usize },
    /// Affinity from the user's recent interactions.
    UserBased { user_id: String, limit: usize },
    /// Hybrid text search, personalized by the influence factor.
    Search {
        query: String,
        user_id: String,
        limit: usize,
        interaction_count: i64,
        deck_size: i64,
        search_type: String,
    },
}

impl RecommendationRequest {
    fn limit(&self) -> usize {
        match self {
            RecommendationRequest::ItemBased { limit, .. }
            | RecommendationRequest::UserBased { limit, .. }
            | RecommendationRequest::Search { limit, .. } => *limit,
        }
    }
}

/// An ordered result page, front = most relevant. `degraded` marks pages
/// served from the random-fallback path rather than the requested strategy.
#[derive(Debug, Clone)]
pub struct RecommendationPage {
    pub cards: Vec<CardRecord>,
    pub total: usize,
    pub degraded: bool,
}

impl RecommendationPage {
    fn from_cards(cards: Vec<CardRecord>) -> Self {
        Self {
            total: cards.len(),
            cards,
            degraded: false,
        }
    }

    fn degraded(cards: Vec<CardRecord>) -> Self {
        Self {
            total: cards.len(),
            cards,
            degraded: true,
        }
    }
}

/// Routes recommendation requests against the shared store handle.
pub struct RecommendationRouter {
    store: Arc<dyn RecommendStore>,
    config: RecommendConfig,
}

impl RecommendationRouter {
    pub fn new(store: Arc<dyn RecommendStore>, config: RecommendConfig) -> Self {
        Self { store, config }
    }

    /// Answer a recommendation request. Never fails: a strategy error is
    /// logged and converted into uniform random sampling over the catalog.
    pub async fn recommend(
        &self,
        request: RecommendationRequest,
        colors: &[String],
    ) -> RecommendationPage {
        let limit = request.limit();
        match self.dispatch(&request, colors).await {
            Ok(cards) => RecommendationPage::from_cards(cards),
            Err(e) => {
                warn!(error = %e, "recommendation strategy failed, sampling at random");
                self.random_fallback(limit).await
            }
        }
    }

    async fn dispatch(
        &self,
        request: &RecommendationRequest,
        colors: &[String],
    ) -> Result<Vec<CardRecord>, StoreError> {
        match request {
            RecommendationRequest::ItemBased { ids, limit } if ids.len() == 1 => {
                self.store
                    .recommend_from_item(&ids[0], *limit, colors)
                    .await
            }
            RecommendationRequest::ItemBased { ids, limit } => {
                self.store.recommend_from_items(ids, *limit, colors).await
            }
            RecommendationRequest::UserBased { user_id, limit } => {
                self.store
                    .recommend_from_user(user_id, *limit, self.config.user_history_limit, colors)
                    .await
            }
            RecommendationRequest::Search {
                query,
                user_id,
                limit,
                interaction_count,
                deck_size,
                search_type,
            } => {
                let influence = influence_factor(*interaction_count, *deck_size);
                info!(
                    query = %query,
                    user = %user_id,
                    influence,
                    search_type = %search_type,
                    "searching cards"
                );
                self.store
                    .search(query, user_id, *limit, influence, search_type, colors)
                    .await
            }
        }
    }

    /// Uniform random sampling over the full catalog: one remote count, then
    /// one fresh random-offset read per requested card. Errors here are also
    /// swallowed: an empty catalog, or an unreachable one, yields an empty
    /// page, never an error.
    async fn random_fallback(&self, limit: usize) -> RecommendationPage {
        let count = match self.store.item_count().await {
            Ok(count) => count,
            Err(e) => {
                warn!(error = %e, "catalog count unavailable during fallback");
                return RecommendationPage::degraded(Vec::new());
            }
        };
        if count == 0 {
            warn!("catalog is empty, returning no fallback cards");
            return RecommendationPage::degraded(Vec::new());
        }

        let mut cards = Vec::with_capacity(limit);
        for _ in 0..limit {
            let offset = rand::thread_rng().gen_range(0..count);
            match self.store.fetch_page(1, offset).await {
                Ok(mut page) => {
                    if let Some(card) = page.pop() {
                        cards.push(card);
                    }
                }
                Err(e) => warn!(error = %e, "fallback sample read failed"),
            }
        }
        RecommendationPage::degraded(cards)
    }

    /// Paged catalog listing, ordered by name.
    ///
    /// With a color filter the backend cannot paginate a filtered+shuffled
    /// set reliably, so a bounded superset is fetched, shuffled locally, and
    /// truncated to the page size; pages lose page-N exactness but stop
    /// repeating the same cards. Errors propagate; listing has no fallback.
    pub async fn list_cards(
        &self,
        page: u64,
        page_size: u64,
        colors: &[String],
    ) -> Result<Vec<CardRecord>, StoreError> {
        if colors.is_empty() {
            let offset = page_size * page.saturating_sub(1);
            self.store.fetch_page(page_size, offset).await
        } else {
            let mut cards = self
                .store
                .fetch_where_colors(colors, self.config.filtered_scan_limit)
                .await?;
            cards.shuffle(&mut rand::thread_rng());
            cards.truncate(page_size as usize);
            Ok(cards)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::{card, FakeStore};
    use std::sync::atomic::Ordering;

    fn router(store: FakeStore) -> RecommendationRouter {
        RecommendationRouter::new(Arc::new(store), RecommendConfig::default())
    }

    fn catalog() -> Vec<CardRecord> {
        vec![
            card("a", "Ancestral Recall", &["U"]),
            card("b", "Black Lotus", &[]),
            card("c", "Counterspell", &["U"]),
            card("d", "Dark Ritual", &["B"]),
            card("e", "Elvish Mystic", &["G"]),
        ]
    }

    #[test]
    fn influence_factor_cold_start_forces_zero() {
        // raw = 4/2 + 50 = 52 -> 0.52, but under five interactions -> 0.
        assert_eq!(influence_factor(4, 50), 0.0);
    }

    #[test]
    fn influence_factor_hits_ceiling() {
        // raw = 10/2 + 80 = 85 -> clamped to 0.8.
        assert_eq!(influence_factor(10, 80), 0.8);
    }

    #[test]
    fn influence_factor_mid_range() {
        // raw = 10/2 + 20 = 25 -> 0.25.
        assert!((influence_factor(10, 20) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn influence_factor_stays_bounded() {
        for interactions in 0..200 {
            for deck in [0i64, 1, 10, 60, 250] {
                let f = influence_factor(interactions, deck);
                assert!((0.0..=PERSONALIZATION_CEILING).contains(&f));
                if interactions < COLD_START_MIN_INTERACTIONS {
                    assert_eq!(f, 0.0);
                }
            }
        }
    }

    #[tokio::test]
    async fn item_based_excludes_the_query_items() {
        let router = router(FakeStore::with_cards(catalog()));
        let page = router
            .recommend(
                RecommendationRequest::ItemBased {
                    ids: vec!["a".to_string(), "b".to_string()],
                    limit: 10,
                },
                &[],
            )
            .await;

        assert!(!page.degraded);
        assert_eq!(page.total, page.cards.len());
        assert!(page.cards.iter().all(|c| c.card_id != "a" && c.card_id != "b"));
    }

    #[tokio::test]
    async fn color_filter_applies_to_every_strategy() {
        let colors = vec!["U".to_string()];
        for request in [
            RecommendationRequest::ItemBased {
                ids: vec!["d".to_string()],
                limit: 10,
            },
            RecommendationRequest::UserBased {
                user_id: "u1".to_string(),
                limit: 10,
            },
            RecommendationRequest::Search {
                query: String::new(),
                user_id: "u1".to_string(),
                limit: 10,
                interaction_count: 0,
                deck_size: 0,
                search_type: "hybrid".to_string(),
            },
        ] {
            let router = router(FakeStore::with_cards(catalog()));
            let page = router.recommend(request, &colors).await;
            assert!(!page.degraded);
            assert!(
                page.cards
                    .iter()
                    .all(|c| c.color_identity.contains(&"U".to_string())),
                "non-blue card leaked through the filter"
            );
        }
    }

    #[tokio::test]
    async fn strategy_failure_falls_back_to_random_sampling() {
        let store = FakeStore::with_cards(catalog());
        store.fail_strategies.store(true, Ordering::SeqCst);
        let router = router(store);

        for _ in 0..3 {
            let page = router
                .recommend(
                    RecommendationRequest::UserBased {
                        user_id: "u1".to_string(),
                        limit: 4,
                    },
                    &[],
                )
                .await;
            assert!(page.degraded);
            assert!(page.cards.len() <= 4);
            assert_eq!(page.total, page.cards.len());
        }
    }

    #[tokio::test]
    async fn empty_catalog_fallback_is_an_empty_page() {
        let store = FakeStore::new();
        store.fail_strategies.store(true, Ordering::SeqCst);
        let router = router(store);

        let page = router
            .recommend(
                RecommendationRequest::ItemBased {
                    ids: vec!["a".to_string()],
                    limit: 6,
                },
                &[],
            )
            .await;
        assert!(page.degraded);
        assert!(page.cards.is_empty());
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn unreachable_catalog_fallback_is_still_a_page() {
        let store = FakeStore::with_cards(catalog());
        store.fail_strategies.store(true, Ordering::SeqCst);
        store.fail_count.store(true, Ordering::SeqCst);
        let router = router(store);

        let page = router
            .recommend(
                RecommendationRequest::Search {
                    query: "bolt".to_string(),
                    user_id: "u1".to_string(),
                    limit: 3,
                    interaction_count: 9,
                    deck_size: 10,
                    search_type: "hybrid".to_string(),
                },
                &[],
            )
            .await;
        assert!(page.degraded);
        assert!(page.cards.is_empty());
    }

    #[tokio::test]
    async fn unfiltered_listing_pages_by_offset() {
        let router = router(FakeStore::with_cards(catalog()));

        let first = router.list_cards(1, 2, &[]).await.unwrap();
        let second = router.list_cards(2, 2, &[]).await.unwrap();

        // Name-ordered, non-overlapping pages.
        assert_eq!(first[0].name, "Ancestral Recall");
        assert_eq!(first[1].name, "Black Lotus");
        assert_eq!(second[0].name, "Counterspell");
        assert_eq!(second[1].name, "Dark Ritual");
    }

    #[tokio::test]
    async fn filtered_listing_shuffles_a_bounded_superset() {
        let router = router(FakeStore::with_cards(catalog()));

        let page = router.list_cards(1, 1, &["U".to_string()]).await.unwrap();
        assert_eq!(page.len(), 1);
        assert!(page[0].color_identity.contains(&"U".to_string()));
    }

    #[tokio::test]
    async fn listing_errors_propagate() {
        let store = FakeStore::with_cards(catalog());
        store.fail_fetch.store(true, Ordering::SeqCst);
        let router = router(store);

        assert!(router.list_cards(1, 10, &[]).await.is_err());
    }
}
