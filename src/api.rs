use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::{
    errors::{ApiError, ErrorContext},
    models::*,
    progress_service::ProgressTracker,
};

// Import logging macros
use crate::{log_api_start, log_api_success, log_api_warn, log_validation};

const DEFAULT_HISTORY_LIMIT: usize = 20;

type ApiResult<T> = Result<Json<ApiResponse<T>>, (StatusCode, Json<ApiResponse<()>>)>;

#[derive(Clone)]
pub struct AppState {
    pub tracker: Arc<Mutex<ProgressTracker>>,
}

impl AppState {
    pub fn new(tracker: ProgressTracker) -> Self {
        Self {
            tracker: Arc::new(Mutex::new(tracker)),
        }
    }
}

#[derive(Deserialize)]
pub struct HistoryParams {
    pub limit: Option<usize>,
}

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

// Progress endpoints
pub async fn get_progress(State(state): State<AppState>) -> Json<ApiResponse<UserProgress>> {
    log_api_start!("get_progress");
    let tracker = state.tracker.lock().await;
    Json(ApiResponse::success(tracker.progress().clone()))
}

pub async fn get_progress_summary(
    State(state): State<AppState>,
) -> Json<ApiResponse<ProgressSummary>> {
    log_api_start!("get_progress_summary");
    let tracker = state.tracker.lock().await;
    Json(ApiResponse::success(tracker.summary(Utc::now())))
}

pub async fn reset_progress(State(state): State<AppState>) -> Json<ApiResponse<bool>> {
    log_api_start!("reset_progress");
    state.tracker.lock().await.reset_progress().await;
    log_api_success!("reset_progress", "all progress cleared");
    Json(ApiResponse::success(true))
}

// Flashcard endpoints
pub async fn study_flashcard(
    State(state): State<AppState>,
    Path(card_id): Path<String>,
    Json(request): Json<StudyFlashcardRequest>,
) -> ApiResult<CardSchedulingState> {
    log_api_start!("study_flashcard", card_id = card_id);

    if !(0..=5).contains(&request.quality) {
        let error = ApiError::ValidationError(format!(
            "quality must be between 0 and 5, got {}",
            request.quality
        ));
        log_validation!(failure, "study_flashcard", error = error);
        let context = ErrorContext::new("study_flashcard", "flashcard").with_id(&card_id);
        return Err(error.to_response_with_context(context));
    }
    if request.domain_id.trim().is_empty() {
        let error = ApiError::ValidationError("domainId must not be empty".to_string());
        let context = ErrorContext::new("study_flashcard", "flashcard").with_id(&card_id);
        return Err(error.to_response_with_context(context));
    }

    let next = state
        .tracker
        .lock()
        .await
        .record_flashcard_study(&card_id, &request.domain_id, request.quality)
        .await;

    log_api_success!("study_flashcard", card_id = card_id, format!("next review in {} day(s)", next.interval));
    Ok(Json(ApiResponse::success(next)))
}

pub async fn get_flashcard(
    State(state): State<AppState>,
    Path(card_id): Path<String>,
) -> ApiResult<CardSchedulingState> {
    log_api_start!("get_flashcard", card_id = card_id);
    let tracker = state.tracker.lock().await;

    match tracker.card_state(&card_id) {
        Some(card) => Ok(Json(ApiResponse::success(card.clone()))),
        None => {
            log_api_warn!("get_flashcard", card_id = card_id, "flashcard has not been studied");
            let error = ApiError::NotFound(format!("Flashcard '{}' has no progress", card_id));
            let context = ErrorContext::new("get_flashcard", "flashcard")
                .with_id(&card_id)
                .with_user_message("Flashcard has not been studied yet");
            Err(error.to_response_with_context(context))
        }
    }
}

pub async fn get_due_flashcards(
    State(state): State<AppState>,
) -> Json<ApiResponse<Vec<CardSchedulingState>>> {
    log_api_start!("get_due_flashcards");
    let due = state.tracker.lock().await.due_cards(Utc::now());
    log_api_success!("get_due_flashcards", count = due.len(), "due flashcards listed");
    Json(ApiResponse::success(due))
}

// Quiz endpoints
pub async fn answer_question(
    State(state): State<AppState>,
    Path(question_id): Path<String>,
    Json(request): Json<AnswerQuestionRequest>,
) -> ApiResult<QuizResult> {
    log_api_start!("answer_question", question_id = question_id);

    if request.domain_id.trim().is_empty() {
        let error = ApiError::ValidationError("domainId must not be empty".to_string());
        let context = ErrorContext::new("answer_question", "question").with_id(&question_id);
        return Err(error.to_response_with_context(context));
    }

    let result = state
        .tracker
        .lock()
        .await
        .record_quiz_answer(
            &question_id,
            &request.domain_id,
            request.correct,
            request.selected_answer,
        )
        .await;

    log_api_success!("answer_question", question_id = question_id, "answer recorded");
    Ok(Json(ApiResponse::success(result)))
}

pub async fn get_quiz_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> ApiResult<Vec<QuizResult>> {
    log_api_start!("get_quiz_history");
    let limit = params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    if limit == 0 {
        let error = ApiError::BadRequest("limit must be at least 1".to_string());
        return Err(error.to_response_with_context(ErrorContext::new("get_quiz_history", "quiz_history")));
    }
    if limit > QUIZ_HISTORY_LIMIT {
        log_api_warn!("get_quiz_history", format!("limit {} exceeds retained history", limit));
    }

    let results = state.tracker.lock().await.recent_quiz_results(limit);
    Ok(Json(ApiResponse::success(results)))
}

// Mastery endpoints
pub async fn get_overall_mastery(State(state): State<AppState>) -> Json<ApiResponse<OverallMastery>> {
    log_api_start!("get_overall_mastery");
    let overall = state.tracker.lock().await.overall_mastery();
    Json(ApiResponse::success(OverallMastery { overall }))
}

pub async fn get_domain_mastery(
    State(state): State<AppState>,
    Path(domain_id): Path<String>,
) -> Json<ApiResponse<DomainMastery>> {
    log_api_start!("get_domain_mastery", domain_id = domain_id);
    let mastery = state.tracker.lock().await.domain_mastery(&domain_id);
    Json(ApiResponse::success(DomainMastery { domain_id, mastery }))
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Progress routes
        .route("/api/progress", get(get_progress).delete(reset_progress))
        .route("/api/progress/summary", get(get_progress_summary))
        // Flashcard routes
        .route("/api/flashcards/due", get(get_due_flashcards))
        .route("/api/flashcards/:card_id", get(get_flashcard))
        .route("/api/flashcards/:card_id/study", post(study_flashcard))
        // Quiz routes
        .route("/api/questions/:question_id/answer", post(answer_question))
        .route("/api/quiz/history", get(get_quiz_history))
        // Mastery routes
        .route("/api/mastery", get(get_overall_mastery))
        .route("/api/domains/:domain_id/mastery", get(get_domain_mastery))
        .with_state(state)
}
