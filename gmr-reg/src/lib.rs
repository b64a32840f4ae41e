//! gmr-reg library - Genomic Metadata Registry service
//!
//! Validates submitted metadata payloads against versioned JSON Schemas,
//! assigns durable identifiers, stores the donor/specimen/sample/file
//! graph, and verifies declared files against object storage at publish
//! time.

use axum::Router;
use sqlx::SqlitePool;
use std::sync::Arc;

pub mod api;
pub mod db;
pub mod error;
pub mod identifiers;
pub mod lifecycle;
pub mod model;
pub mod pagination;
pub mod payload;
pub mod reconcile;
pub mod schema_registry;
pub mod storage;
pub mod submit;
pub mod validator;

use identifiers::{IdAuthority, IdService};
use lifecycle::LifecycleManager;
use schema_registry::SchemaRegistry;
use storage::StorageGateway;
use submit::SubmissionOrchestrator;
use validator::PayloadValidator;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Versioned analysis-type store
    pub schemas: SchemaRegistry,
    /// Analysis state machine and reads
    pub lifecycle: LifecycleManager,
    /// Payload intake
    pub submissions: Arc<SubmissionOrchestrator>,
}

impl AppState {
    /// Wire the engine onto the given pool and collaborators
    pub fn new(
        db: SqlitePool,
        storage: Arc<dyn StorageGateway>,
        authority: Arc<dyn IdAuthority>,
        enforce_latest: bool,
    ) -> Self {
        let schemas = SchemaRegistry::new(db.clone());
        let lifecycle = LifecycleManager::new(db.clone(), storage);
        let ids = IdService::new(db.clone(), authority);
        let validator = PayloadValidator::new(schemas.clone(), enforce_latest);
        let submissions = Arc::new(SubmissionOrchestrator::new(db.clone(), validator, ids));

        Self {
            db,
            schemas,
            lifecycle,
            submissions,
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, post, put};

    Router::new()
        .route("/submit/:study_id", post(api::submit_payload))
        .route(
            "/studies/:study_id/analyses",
            get(api::list_analyses),
        )
        .route(
            "/studies/:study_id/analyses/:analysis_id",
            get(api::deep_read_analysis),
        )
        .route(
            "/studies/:study_id/analyses/:analysis_id/publish",
            put(api::publish_analysis),
        )
        .route(
            "/studies/:study_id/analyses/:analysis_id/unpublish",
            put(api::unpublish_analysis),
        )
        .route(
            "/studies/:study_id/analyses/:analysis_id/suppress",
            put(api::suppress_analysis),
        )
        .route(
            "/schemas",
            post(api::register_analysis_type).get(api::list_analysis_types),
        )
        .route("/schemas/:id", get(api::get_analysis_type))
        .merge(api::health_routes())
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}
