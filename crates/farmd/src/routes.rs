//! API routes for farmd
//!
//! Each handler does one prediction and/or one language-model call, then
//! returns JSON. LLM calls run on the blocking pool since the client is
//! synchronous.

use crate::server::AppState;
use crate::session::{Page, SessionInfo};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use farm_common::{Advisor, Crop, LlmClient, Review, ReviewDraft, TrendPoint, UsagePredictor};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

type AppStateArc = Arc<AppState>;
type ApiError = (StatusCode, String);

// ============================================================================
// Health Routes
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub records: usize,
    pub regions: usize,
    pub sessions: usize,
}

pub fn health_routes() -> Router<AppStateArc> {
    Router::new().route("/v1/health", get(health_check))
}

async fn health_check(State(state): State<AppStateArc>) -> Json<HealthResponse> {
    let sessions = state.sessions.read().await.len();

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        records: state.dataset.len(),
        regions: state.predictor.encoding().len(),
        sessions,
    })
}

// ============================================================================
// Data Routes
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct RegionEntry {
    pub code: i64,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegionsResponse {
    pub regions: Vec<RegionEntry>,
}

#[derive(Debug, Deserialize)]
pub struct TrendQuery {
    pub start: Option<i32>,
    pub end: Option<i32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TrendResponse {
    pub start: i32,
    pub end: i32,
    pub points: Vec<TrendPoint>,
}

pub fn data_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/v1/regions", get(list_regions))
        .route("/v1/trend", get(trend))
}

async fn list_regions(State(state): State<AppStateArc>) -> Json<RegionsResponse> {
    let regions = state
        .predictor
        .encoding()
        .regions()
        .iter()
        .enumerate()
        .map(|(code, name)| RegionEntry {
            code: code as i64,
            name: name.clone(),
        })
        .collect();

    Json(RegionsResponse { regions })
}

/// Missing bounds default to the dataset's year range
async fn trend(
    State(state): State<AppStateArc>,
    Query(query): Query<TrendQuery>,
) -> Json<TrendResponse> {
    let (first, last) = state.dataset.year_range().unwrap_or((0, 0));
    let start = query.start.unwrap_or(first);
    let end = query.end.unwrap_or(last);

    Json(TrendResponse {
        start,
        end,
        points: state.dataset.trend(start, end),
    })
}

// ============================================================================
// Prediction and Advice Routes
// ============================================================================

/// A region given either as its integer code or as its name
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RegionRef {
    Code(i64),
    Name(String),
}

/// Prompt form: codes as digits, names as given
impl fmt::Display for RegionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegionRef::Code(code) => write!(f, "{}", code),
            RegionRef::Name(name) => f.write_str(name),
        }
    }
}

impl RegionRef {
    /// Codes pass through unchecked; names must be known
    fn resolve(&self, predictor: &UsagePredictor) -> Result<i64, ApiError> {
        match self {
            RegionRef::Code(code) => Ok(*code),
            RegionRef::Name(name) => predictor.encoding().encode(name).ok_or_else(|| {
                (
                    StatusCode::NOT_FOUND,
                    format!("Region '{}' not found in dataset", name),
                )
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    pub region: RegionRef,
    pub year: i32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PredictResponse {
    pub region_code: i64,
    /// Region name when the code is inside the encoded range
    pub region: Option<String>,
    pub year: i32,
    pub predicted: f64,
    pub predicted_rounded: f64,
}

#[derive(Debug, Deserialize)]
pub struct ExplainRequest {
    pub value: f64,
    pub region: RegionRef,
    pub year: i32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AdviceResponse {
    pub advice: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub prediction: PredictResponse,
    pub advice: String,
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AskResponse {
    pub answer: String,
}

pub fn advice_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/v1/predict", post(predict))
        .route("/v1/explain", post(explain))
        .route("/v1/analyze", post(analyze))
        .route("/v1/ask", post(ask))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn run_prediction(state: &AppState, req: &PredictRequest) -> Result<PredictResponse, ApiError> {
    let region_code = req.region.resolve(&state.predictor)?;
    let predicted = state.predictor.predict(region_code, req.year);

    Ok(PredictResponse {
        region_code,
        region: state
            .predictor
            .encoding()
            .decode(region_code)
            .map(String::from),
        year: req.year,
        predicted,
        predicted_rounded: round2(predicted),
    })
}

async fn predict(
    State(state): State<AppStateArc>,
    Json(req): Json<PredictRequest>,
) -> Result<Json<PredictResponse>, ApiError> {
    let response = run_prediction(&state, &req)?;
    info!(
        "  Predicted {:.2} for region {} in {}",
        response.predicted, response.region_code, response.year
    );
    Ok(Json(response))
}

/// Run a blocking advisor call off the async workers
async fn blocking_advice<F>(state: &AppState, call: F) -> Result<String, ApiError>
where
    F: FnOnce(&Advisor<dyn LlmClient>) -> String + Send + 'static,
{
    let advisor = Arc::clone(&state.advisor);
    tokio::task::spawn_blocking(move || call(&*advisor))
        .await
        .map_err(|e| {
            warn!("  Advice task failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })
}

async fn explain(
    State(state): State<AppStateArc>,
    Json(req): Json<ExplainRequest>,
) -> Result<Json<AdviceResponse>, ApiError> {
    let region = req.region.to_string();
    let advice = blocking_advice(&state, move |advisor| {
        advisor.explain_prediction(req.value, &region, req.year)
    })
    .await?;

    Ok(Json(AdviceResponse { advice }))
}

/// Predict, then explain the prediction
async fn analyze(
    State(state): State<AppStateArc>,
    Json(req): Json<PredictRequest>,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let prediction = run_prediction(&state, &req)?;
    info!(
        "  Analyzing region {} in {}: predicted {:.2}",
        prediction.region_code, prediction.year, prediction.predicted
    );

    let (value, region, year) = (
        prediction.predicted,
        prediction.region_code.to_string(),
        prediction.year,
    );
    let advice = blocking_advice(&state, move |advisor| {
        advisor.explain_prediction(value, &region, year)
    })
    .await?;

    Ok(Json(AnalyzeResponse { prediction, advice }))
}

async fn ask(
    State(state): State<AppStateArc>,
    Json(req): Json<AskRequest>,
) -> Result<Json<AskResponse>, ApiError> {
    if req.question.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "Please enter a question".to_string(),
        ));
    }

    let answer = blocking_advice(&state, move |advisor| {
        advisor.answer_question(&req.question)
    })
    .await?;

    Ok(Json(AskResponse { answer }))
}

// ============================================================================
// Session Routes
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct NavigateRequest {
    pub page: Page,
}

/// A stored review plus its star rendering
#[derive(Debug, Serialize, Deserialize)]
pub struct ReviewView {
    pub pesticide: String,
    pub crop: Crop,
    pub rating: u8,
    pub comment: String,
    pub stars: String,
}

impl From<&Review> for ReviewView {
    fn from(review: &Review) -> Self {
        Self {
            pesticide: review.pesticide.clone(),
            crop: review.crop,
            rating: review.rating,
            comment: review.comment.clone(),
            stars: review.stars(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReviewsResponse {
    pub reviews: Vec<ReviewView>,
}

pub fn session_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/v1/sessions", post(create_session))
        .route("/v1/sessions/:id", get(get_session).delete(delete_session))
        .route("/v1/sessions/:id/page", post(navigate))
        .route(
            "/v1/sessions/:id/reviews",
            get(list_reviews).post(submit_review),
        )
}

fn session_not_found(id: &Uuid) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        format!("Session '{}' not found", id),
    )
}

async fn create_session(State(state): State<AppStateArc>) -> (StatusCode, Json<SessionInfo>) {
    let mut sessions = state.sessions.write().await;
    let info = SessionInfo::from(sessions.create());
    info!("  Session {} created", info.id);
    (StatusCode::CREATED, Json(info))
}

async fn get_session(
    State(state): State<AppStateArc>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionInfo>, ApiError> {
    let sessions = state.sessions.read().await;
    let session = sessions.get(&id).ok_or_else(|| session_not_found(&id))?;
    Ok(Json(SessionInfo::from(session)))
}

async fn delete_session(
    State(state): State<AppStateArc>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let mut sessions = state.sessions.write().await;
    sessions.remove(&id).ok_or_else(|| session_not_found(&id))?;
    info!("  Session {} ended", id);
    Ok(StatusCode::NO_CONTENT)
}

async fn navigate(
    State(state): State<AppStateArc>,
    Path(id): Path<Uuid>,
    Json(req): Json<NavigateRequest>,
) -> Result<Json<SessionInfo>, ApiError> {
    let mut sessions = state.sessions.write().await;
    let session = sessions.get_mut(&id).ok_or_else(|| session_not_found(&id))?;
    session.page = req.page;
    Ok(Json(SessionInfo::from(&*session)))
}

async fn list_reviews(
    State(state): State<AppStateArc>,
    Path(id): Path<Uuid>,
) -> Result<Json<ReviewsResponse>, ApiError> {
    let sessions = state.sessions.read().await;
    let session = sessions.get(&id).ok_or_else(|| session_not_found(&id))?;

    Ok(Json(ReviewsResponse {
        reviews: session.reviews.reviews().iter().map(ReviewView::from).collect(),
    }))
}

async fn submit_review(
    State(state): State<AppStateArc>,
    Path(id): Path<Uuid>,
    Json(draft): Json<ReviewDraft>,
) -> Result<(StatusCode, Json<ReviewView>), ApiError> {
    let mut sessions = state.sessions.write().await;
    let session = sessions.get_mut(&id).ok_or_else(|| session_not_found(&id))?;

    let review = session.reviews.submit(draft).map_err(|e| {
        info!("  Review rejected for session {}: {}", id, e);
        (StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
    })?;

    Ok((StatusCode::CREATED, Json(ReviewView::from(review))))
}
