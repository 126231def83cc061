// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use std::sync::Arc;

use axum::extract::{Path, Query, Request as AxumRequest, State};
use axum::http::header::AUTHORIZATION;
use axum::http::StatusCode;
use axum::middleware::{from_fn_with_state, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use ocstore_kernel::{ArtifactKind, ContentAddress};
use tower_http::trace::TraceLayer;

use crate::api::*;
use crate::app::Application;
use crate::errors::EngineError;
use crate::repo::ContentRepo;

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<ContentRepo>,
    pub app: Arc<Application>,
    pub max_list_items: usize,
}

impl AppState {
    fn ensure_ready(&self) -> Result<(), EngineError> {
        if self.app.can_process() {
            Ok(())
        } else {
            Err(EngineError::Unavailable)
        }
    }
}

async fn auth_guard(
    State(token): State<Arc<String>>,
    req: AxumRequest,
    next: Next,
) -> Result<Response, StatusCode> {
    let provided = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|val| val.to_str().ok())
        .and_then(|val| val.strip_prefix("Bearer "));

    if provided == Some(token.as_str()) {
        Ok(next.run(req).await)
    } else {
        Err(StatusCode::UNAUTHORIZED)
    }
}

pub fn build_router(state: AppState, auth_token: Option<String>) -> Router {
    let mut app = Router::new()
        .route("/msg-data/envelope", post(save_envelope))
        .route("/msg-data/receipt", post(save_receipt))
        .route("/msg-data", get(list_artifacts))
        .route("/msg-data/:cid", get(get_artifact))
        .route("/metrics", get(metrics_handler))
        .with_state(state);

    if let Some(token) = auth_token {
        tracing::info!("Auth Enabled: Bearer token required");
        app = app.layer(from_fn_with_state(Arc::new(token), auth_guard));
    } else {
        tracing::warn!("Auth Disabled: No token configured");
    }

    app.layer(TraceLayer::new_for_http())
}

async fn save(
    state: &AppState,
    kind: ArtifactKind,
    req: SaveArtifactRequest,
) -> Result<Json<Success<SaveArtifactResponse>>, EngineError> {
    state.ensure_ready()?;

    let data = decode_base64(&req.data)
        .filter(|d| !d.is_empty())
        .ok_or_else(|| EngineError::InvalidInput("Missing or invalid body parameters".to_string()))?;

    let saved = state
        .repo
        .save_artifact(data, kind, Utc::now(), req.harvest_now)
        .await?;
    Ok(Json(Success::new(SaveArtifactResponse::from(&saved))))
}

async fn save_envelope(
    State(state): State<AppState>,
    Json(req): Json<SaveArtifactRequest>,
) -> Result<Json<Success<SaveArtifactResponse>>, EngineError> {
    save(&state, ArtifactKind::Envelope, req).await
}

async fn save_receipt(
    State(state): State<AppState>,
    Json(req): Json<SaveArtifactRequest>,
) -> Result<Json<Success<SaveArtifactResponse>>, EngineError> {
    save(&state, ArtifactKind::Receipt, req).await
}

fn invalid_params() -> EngineError {
    EngineError::InvalidInput("Invalid request parameters".to_string())
}

async fn list_artifacts(
    State(state): State<AppState>,
    Query(params): Query<ListArtifactsQuery>,
) -> Result<Json<Success<ArtifactListResponse>>, EngineError> {
    state.ensure_ready()?;

    let retrieved_after = params
        .retrieved_after
        .as_deref()
        .map(|s| DateTime::parse_from_rfc3339(s).map(|d| d.with_timezone(&Utc)))
        .transpose()
        .map_err(|_| invalid_params())?;

    let limit = match params.limit.as_deref() {
        None => state.max_list_items,
        Some(s) => match s.parse::<usize>() {
            Ok(n) if n >= 1 && n <= state.max_list_items => n,
            _ => return Err(invalid_params()),
        },
    };

    let skip = params
        .skip
        .as_deref()
        .map(str::parse::<usize>)
        .transpose()
        .map_err(|_| invalid_params())?
        .unwrap_or(0);

    let page = state.repo.list_harvested_artifacts(retrieved_after, Some(limit), skip);
    Ok(Json(Success::new(page.into())))
}

async fn get_artifact(
    State(state): State<AppState>,
    Path(cid): Path<String>,
    Query(params): Query<GetArtifactQuery>,
) -> Result<Json<Success<ArtifactItem>>, EngineError> {
    state.ensure_ready()?;

    let include_saved_only = match params.include_saved_only.as_deref() {
        None | Some("false") | Some("0") => false,
        Some("true") | Some("1") => true,
        Some(_) => return Err(invalid_params()),
    };

    let view = state
        .repo
        .get_artifact_by_address(&ContentAddress::new(cid), include_saved_only)
        .ok_or(EngineError::NotFound)?;
    Ok(Json(Success::new(view.into())))
}

async fn metrics_handler() -> String {
    crate::telemetry::get_metrics()
}
