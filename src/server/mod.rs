//! HTTP front end.
//!
//! Thin axum layer over [`RecommendationService`]: request parsing, status
//! mapping, and the user-visible notice strings. All recommendation logic
//! lives in the engine.

use crate::catalog::TrackInfo;
use crate::engine::{EngineError, RecommendMode, Recommendation, RecommendationService};
use crate::explain::ExplanationGenerator;
use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

const DEFAULT_RECOMMEND_COUNT: usize = 5;
const DEFAULT_SEARCH_LIMIT: usize = 5;

#[derive(Clone)]
pub struct ServerState {
    pub service: Arc<RecommendationService>,
    pub explainer: Arc<dyn ExplanationGenerator>,
    pub start_time: Instant,
}

#[derive(Serialize)]
struct ServerStats {
    uptime: String,
    version: &'static str,
    corpus_tracks: usize,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

fn engine_error_response(err: EngineError) -> Response {
    match &err {
        EngineError::TrackNotFound(_) => (StatusCode::NOT_FOUND, err.to_string()).into_response(),
        EngineError::Upstream(_) => (StatusCode::BAD_GATEWAY, err.to_string()).into_response(),
        EngineError::Store(_) | EngineError::Index(_) => {
            error!("Internal failure serving request: {}", err);
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}

async fn home(State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        version: env!("CARGO_PKG_VERSION"),
        corpus_tracks: state.service.corpus_len().await,
    };
    Json(stats)
}

#[derive(Deserialize)]
struct SearchParams {
    q: String,
    limit: Option<usize>,
}

#[derive(Serialize)]
struct CandidateTrack {
    id: String,
    name: String,
    artist: String,
}

impl From<TrackInfo> for CandidateTrack {
    fn from(info: TrackInfo) -> Self {
        Self {
            id: info.id,
            name: info.name,
            artist: info.artist,
        }
    }
}

async fn search_candidates(
    State(state): State<ServerState>,
    Query(params): Query<SearchParams>,
) -> Response {
    let query = params.q.trim();
    if query.is_empty() {
        return Json(Vec::<CandidateTrack>::new()).into_response();
    }

    let limit = params.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
    match state.service.search_candidates(query, limit).await {
        Ok(tracks) => Json(
            tracks
                .into_iter()
                .map(CandidateTrack::from)
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(err) => engine_error_response(err),
    }
}

#[derive(Deserialize, Debug)]
struct RecommendBody {
    track_id: String,
    count: Option<usize>,
}

#[derive(Serialize)]
struct RecommendResponse {
    mode: RecommendMode,
    notice: String,
    source: CandidateTrack,
    results: Vec<Recommendation>,
    explanation: String,
}

fn mode_notice(mode: RecommendMode, empty: bool) -> String {
    if empty {
        return "No similar tracks found.".to_string();
    }
    match mode {
        RecommendMode::Combined => {
            "Track is in the local corpus; ranked with the combined attribute + embedding index."
                .to_string()
        }
        RecommendMode::AttributesOnly => {
            "Track is not in the local corpus; ranked with catalog attributes only.".to_string()
        }
    }
}

async fn recommend(State(state): State<ServerState>, Json(body): Json<RecommendBody>) -> Response {
    let count = body.count.unwrap_or(DEFAULT_RECOMMEND_COUNT);
    match state.service.recommend(&body.track_id, count).await {
        Ok((source, outcome)) => {
            let explanation = state.explainer.explain(&source, &outcome.results);
            let response = RecommendResponse {
                notice: mode_notice(outcome.mode, outcome.results.is_empty()),
                mode: outcome.mode,
                source: source.into(),
                results: outcome.results,
                explanation,
            };
            Json(response).into_response()
        }
        Err(err) => engine_error_response(err),
    }
}

#[derive(Deserialize, Debug)]
struct IngestBody {
    track_id: String,
}

#[derive(Serialize)]
struct IngestResponse {
    added: bool,
    degraded: bool,
    notice: Option<String>,
    track: crate::store::TrackMeta,
}

async fn ingest_track(State(state): State<ServerState>, Json(body): Json<IngestBody>) -> Response {
    match state.service.ingest(&body.track_id).await {
        Ok(outcome) => {
            let notice = match (outcome.added, outcome.degraded) {
                (false, _) => Some("Track is already in the corpus.".to_string()),
                (true, true) => Some(
                    "Embedding unavailable, stored with attribute data only (degraded mode)."
                        .to_string(),
                ),
                (true, false) => None,
            };
            Json(IngestResponse {
                added: outcome.added,
                degraded: outcome.degraded,
                notice,
                track: outcome.track,
            })
            .into_response()
        }
        Err(err) => engine_error_response(err),
    }
}

#[derive(Serialize)]
struct ReloadResponse {
    corpus_tracks: usize,
}

async fn reload_corpus(State(state): State<ServerState>) -> Response {
    match state.service.reload().await {
        Ok(corpus_tracks) => Json(ReloadResponse { corpus_tracks }).into_response(),
        Err(err) => engine_error_response(err),
    }
}

pub fn make_router(state: ServerState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/search", get(search_candidates))
        .route("/recommend", post(recommend))
        .route("/tracks", post(ingest_track))
        .route("/admin/reload", post(reload_corpus))
        .with_state(state)
}

pub async fn run_server(state: ServerState, port: u16) -> Result<()> {
    let router = make_router(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!("Listening on port {}", port);
    axum::serve(listener, router).await?;
    Ok(())
}
