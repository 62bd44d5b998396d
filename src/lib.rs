//! # deckseer
//!
//! Card catalog ingestion and recommendation serving over a vector-backed
//! recommendation store.
//!
//! deckseer streams a card catalog into an external recommendation service
//! in resumable batches, drives the service's asynchronous training run to
//! completion, and serves item-based, user-based, and hybrid-search
//! recommendations to a front end, degrading to random catalog sampling
//! whenever a strategy fails, so the front end always gets cards.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────┐   ┌───────────────┐
//! │ Catalog      │──▶│  Ingestion   │──▶│  Recommend    │
//! │ JSONL        │   │ batch+train │   │  store (HTTP) │
//! └──────────────┘   └─────────────┘   └──────┬────────┘
//!                                             │
//!                         ┌───────────────────┤
//!                         ▼                   ▼
//!                    ┌──────────┐       ┌──────────┐
//!                    │   CLI    │       │   HTTP   │
//!                    │  (seer)  │       │   API    │
//!                    └──────────┘       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! seer init                     # install the collection schema
//! seer fetch                    # download the card catalog
//! seer ingest --train-at 10000  # stream the catalog, train at the watermark
//! seer status --watch           # follow an in-flight training run
//! seer serve                    # start the HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types and the collection schema |
//! | [`normalize`] | Raw catalog record → fixed-shape card record |
//! | [`store`] | Recommendation store seam + HTTP client |
//! | [`ingest`] | Batch ingestion pipeline with training watermark |
//! | [`progress`] | Advisory ingest progress reporting |
//! | [`training`] | Training lifecycle state machine |
//! | [`recommend`] | Strategy routing, influence factor, random fallback |
//! | [`users`] | Idempotent user provisioning, interactions, decks |
//! | [`server`] | HTTP API server |
//! | [`dataset`] | Bulk catalog download |

pub mod config;
pub mod dataset;
pub mod ingest;
pub mod models;
pub mod normalize;
pub mod progress;
pub mod recommend;
pub mod server;
pub mod store;
pub mod training;
pub mod users;
