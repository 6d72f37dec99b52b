//! Serves the figures behind the Routes, Families and Volunteers dashboard tabs

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use serde_json::json;
use std::{future::Future, sync::Arc};
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::{config::DashboardConfig, dal::PgDashboardStore};

/// Routes tab, one entry per dispatch
#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
pub struct DispatchFigures {
    pub dispatch_name: Option<String>,
    pub stops: i64,
    pub completed_stops: i64,
    pub skipped_stops: i64,
    /// Share of stops with a known outcome that were completed
    pub completion_rate: Option<f64>,
    pub distance_km: Option<f64>,
}

/// Families tab, one entry per forward sortation area
#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
pub struct FamilyFigures {
    pub fsa: String,
    pub families: i64,
    pub stops: i64,
}

/// Volunteers tab, one entry per driver
#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
pub struct VolunteerFigures {
    pub driver_name: String,
    pub dispatches: i64,
    pub stops: i64,
    pub avg_minutes_between_stops: Option<f64>,
}

pub trait DashboardStore: Send + Sync + 'static {
    fn dispatch_figures(&self) -> impl Future<Output = anyhow::Result<Vec<DispatchFigures>>> + Send;
    fn family_figures(&self) -> impl Future<Output = anyhow::Result<Vec<FamilyFigures>>> + Send;
    fn volunteer_figures(
        &self,
    ) -> impl Future<Output = anyhow::Result<Vec<VolunteerFigures>>> + Send;
}

#[derive(Debug)]
pub struct DashboardError(anyhow::Error);

impl From<anyhow::Error> for DashboardError {
    fn from(e: anyhow::Error) -> Self {
        DashboardError(e)
    }
}

impl IntoResponse for DashboardError {
    fn into_response(self) -> Response {
        error!("{:?}", self.0);

        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": format!("{:#}", self.0) })),
        )
            .into_response()
    }
}

pub fn router<S: DashboardStore>(store: Arc<S>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/routes", get(routes::<S>))
        .route("/families", get(families::<S>))
        .route("/volunteers", get(volunteers::<S>))
        .with_state(store)
}

async fn health() -> &'static str {
    "ok"
}

async fn routes<S: DashboardStore>(
    State(store): State<Arc<S>>,
) -> Result<Json<Vec<DispatchFigures>>, DashboardError> {
    Ok(Json(store.dispatch_figures().await?))
}

async fn families<S: DashboardStore>(
    State(store): State<Arc<S>>,
) -> Result<Json<Vec<FamilyFigures>>, DashboardError> {
    Ok(Json(store.family_figures().await?))
}

async fn volunteers<S: DashboardStore>(
    State(store): State<Arc<S>>,
) -> Result<Json<Vec<VolunteerFigures>>, DashboardError> {
    Ok(Json(store.volunteer_figures().await?))
}

pub async fn serve(config: &DashboardConfig) -> anyhow::Result<()> {
    let pool = sqlx::PgPool::connect(&config.database_url).await?;
    let store = Arc::new(PgDashboardStore::new(pool, config.table.clone()));

    let listener = TcpListener::bind(config.bind).await?;
    info!("dashboard listening on {}", config.bind);

    axum::serve(listener, router(store))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("couldn't listen for ctrl-c: {e}");
    }
    info!("shutting down dashboard");
}
