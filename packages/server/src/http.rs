//! HTTP trigger surface.
//!
//! Thin axum layer over the crawl service: plan comes from the `x-plan`
//! header (auth lives outside this system), errors map to JSON bodies.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use uuid::Uuid;

use crawler::{PageFetcher, PlanTier};

use crate::crawl_service::{CrawlService, CrawlServiceError, CrawlTrigger};
use crate::store::{Store, StoreError, StoreResolver};

pub struct AppState<F> {
    pub service: CrawlService<F>,
    pub resolver: Arc<StoreResolver>,
}

impl<F> Clone for AppState<F> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            resolver: self.resolver.clone(),
        }
    }
}

pub fn build_router<F: PageFetcher + 'static>(state: AppState<F>) -> Router {
    Router::new()
        .route("/health", get(health::<F>))
        .route("/api/datasets/:id/crawl", post(trigger_crawl::<F>))
        .route("/api/datasets/:id/export", get(export_rows::<F>))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .with_state(state)
}

fn plan_from_headers(headers: &HeaderMap) -> PlanTier {
    headers
        .get("x-plan")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
        .unwrap_or(PlanTier::Demo)
}

fn error_response(err: CrawlServiceError) -> Response {
    let status = match &err {
        CrawlServiceError::InvalidInput { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        CrawlServiceError::Store(StoreError::Unavailable) => StatusCode::SERVICE_UNAVAILABLE,
        CrawlServiceError::Store(StoreError::NotFound { .. }) => StatusCode::NOT_FOUND,
        CrawlServiceError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}

async fn health<F: PageFetcher + 'static>(State(state): State<AppState<F>>) -> Response {
    match state.resolver.recheck().await {
        Ok(store) => Json(json!({ "status": "ok", "backend": store.name() })).into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "unavailable", "error": e.to_string() })),
        )
            .into_response(),
    }
}

#[derive(Debug, Default, Deserialize)]
struct CrawlBody {
    max_depth: Option<usize>,
    pages_limit: Option<usize>,
}

async fn trigger_crawl<F: PageFetcher + 'static>(
    State(state): State<AppState<F>>,
    Path(dataset_id): Path<Uuid>,
    headers: HeaderMap,
    body: Option<Json<CrawlBody>>,
) -> Response {
    let body = body.map(|Json(body)| body).unwrap_or_default();
    let trigger = CrawlTrigger {
        dataset_id,
        plan: plan_from_headers(&headers),
        max_depth: body.max_depth,
        pages_limit: body.pages_limit,
    };

    match state.service.trigger_crawl(trigger).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => error_response(e),
    }
}

async fn export_rows<F: PageFetcher + 'static>(
    State(state): State<AppState<F>>,
    Path(dataset_id): Path<Uuid>,
    headers: HeaderMap,
) -> Response {
    let plan = plan_from_headers(&headers);
    match state.service.export_rows(dataset_id, plan).await {
        Ok((rows, gate)) => {
            let row_count = rows.len();
            Json(json!({
                "rows": rows,
                "row_count": row_count,
                "gated": gate.gated,
                "watermark": gate.watermark,
            }))
            .into_response()
        }
        Err(e) => error_response(e),
    }
}
