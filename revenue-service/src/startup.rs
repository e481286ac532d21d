//! Application startup and lifecycle management.

use crate::config::RevenueConfig;
use crate::handlers;
use crate::middleware::http_metrics_middleware;
use crate::services::{
    metrics::init_metrics, AttachmentStorage, Database, LocalStorage, MemoryStore, RevenueService,
    RevenueStore,
};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{http_request_span, request_id_middleware};
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<RevenueService>,
    pub store: Arc<dyn RevenueStore>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn RevenueStore>,
        storage: Arc<dyn AttachmentStorage>,
        collection_window_months: u32,
    ) -> Self {
        let service = Arc::new(RevenueService::new(
            store.clone(),
            storage,
            collection_window_months,
        ));
        Self { service, store }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_handler))
        .route(
            "/revenues",
            post(handlers::create_revenue).get(handlers::list_revenues),
        )
        .route(
            "/revenues/:revenue_id",
            get(handlers::get_revenue)
                .patch(handlers::update_revenue)
                .delete(handlers::delete_revenue),
        )
        .route(
            "/revenues/:revenue_id/installments",
            post(handlers::add_installments),
        )
        .route(
            "/revenues/:revenue_id/payments",
            post(handlers::record_payments),
        )
        .route(
            "/revenues/:revenue_id/loan",
            post(handlers::refresh_loan).get(handlers::get_loan),
        )
        .route(
            "/installments/:installment_id/payments",
            post(handlers::record_installment_payment),
        )
        .route("/assignments/sync", post(handlers::sync_assignment))
        .layer(middleware::from_fn(http_metrics_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(http_request_span))
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    server: Box<dyn std::future::Future<Output = std::io::Result<()>> + Send + Unpin>,
    state: AppState,
}

impl Application {
    pub async fn build(config: RevenueConfig) -> Result<Self, AppError> {
        init_metrics();

        let store: Arc<dyn RevenueStore> = match &config.database {
            Some(database) => {
                let db = Database::new(
                    &database.url,
                    database.max_connections,
                    database.min_connections,
                )
                .await
                .map_err(|e| {
                    tracing::error!(error = %e, "Failed to connect to PostgreSQL");
                    e
                })?;
                db.run_migrations().await.map_err(|e| {
                    tracing::error!(error = %e, "Failed to run migrations");
                    e
                })?;
                Arc::new(db)
            }
            None => {
                tracing::warn!("DATABASE_URL not set - using the in-memory store");
                Arc::new(MemoryStore::new())
            }
        };

        let storage: Arc<dyn AttachmentStorage> = Arc::new(
            LocalStorage::new(&config.storage.local_path)
                .await
                .map_err(|e| {
                    tracing::error!(
                        error = %e,
                        path = %config.storage.local_path,
                        "Failed to initialize attachment storage"
                    );
                    e
                })?,
        );

        let state = AppState::new(store, storage, config.collection_window_months);
        let app = build_router(state.clone());

        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(
            service = %config.service_name,
            version = %config.service_version,
            port = port,
            "Service ready to accept connections"
        );

        let server = axum::serve(listener, app);

        Ok(Self {
            port,
            server: Box::new(server.into_future()),
            state,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        self.server.await
    }
}
