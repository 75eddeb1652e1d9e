// Fee Registry - JSON API
//
// Thin HTTP surface over `RegistryGateway`. Every handler borrows the
// shared gateway, asks it one question and wraps the answer in the
// `{ success, data, error }` envelope.

use crate::gateway::{GatewayError, NewPayment, RegistryGateway, StudentStatusRow};
use crate::ledger::{LedgerError, PaymentRecord};
use crate::reconciliation::StudentFeeReport;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

/// Header set by the session layer in front of this service
pub const STAFF_USER_HEADER: &str = "x-staff-user";

type Clock = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub gateway: RegistryGateway,
    pub recent_limit: usize,
    clock: Clock,
}

impl AppState {
    /// State reading the local wall clock
    pub fn new(gateway: RegistryGateway, recent_limit: usize) -> Self {
        Self::with_clock(gateway, recent_limit, || chrono::Local::now().date_naive())
    }

    pub fn with_clock<F>(gateway: RegistryGateway, recent_limit: usize, clock: F) -> Self
    where
        F: Fn() -> NaiveDate + Send + Sync + 'static,
    {
        AppState {
            gateway,
            recent_limit,
            clock: Arc::new(clock),
        }
    }

    fn today(&self) -> NaiveDate {
        (self.clock)()
    }
}

/// API Response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn err(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

/// Gateway failure rendered as an HTTP error
pub struct ApiError(GatewayError);

impl From<GatewayError> for ApiError {
    fn from(e: GatewayError) -> Self {
        ApiError(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            GatewayError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            GatewayError::Forbidden { .. } => StatusCode::FORBIDDEN,
            GatewayError::StudentNotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::Ledger(LedgerError::UnknownStudent(_)) => StatusCode::NOT_FOUND,
            GatewayError::Ledger(LedgerError::InvalidAmount(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            GatewayError::Ledger(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self.0, "request failed");
        }
        (status, Json(ApiResponse::<()>::err(self.0.to_string()))).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<usize>,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/students?limit=N - Recent students with current status
async fn list_students(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Vec<StudentStatusRow>> {
    let limit = params.limit.unwrap_or(state.recent_limit);
    let rows = state
        .gateway
        .recent_students_with_status(limit, &state.today())?;

    Ok(Json(ApiResponse::ok(rows)))
}

/// GET /api/students/:reg - Full fee report
async fn student_report(
    State(state): State<AppState>,
    Path(reg_number): Path<String>,
) -> ApiResult<StudentFeeReport> {
    let report = state.gateway.student_report(&reg_number, &state.today())?;
    Ok(Json(ApiResponse::ok(report)))
}

/// GET /api/students/:reg/payments - Payment history, newest first
async fn student_payments(
    State(state): State<AppState>,
    Path(reg_number): Path<String>,
) -> ApiResult<Vec<PaymentRecord>> {
    let history = state.gateway.payment_history(&reg_number)?;
    Ok(Json(ApiResponse::ok(history)))
}

/// GET /api/defaulters - Students owing for the current period
async fn defaulters(State(state): State<AppState>) -> ApiResult<Vec<StudentStatusRow>> {
    let rows = state.gateway.defaulters(&state.today())?;
    Ok(Json(ApiResponse::ok(rows)))
}

/// POST /api/payments - Record a payment (admin only)
async fn record_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payment): Json<NewPayment>,
) -> Result<(StatusCode, Json<ApiResponse<PaymentRecord>>), ApiError> {
    let actor = headers
        .get(STAFF_USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .unwrap_or_default();

    let record = state
        .gateway
        .record_payment(actor, payment, state.today())?;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(record))))
}

// ============================================================================
// Router
// ============================================================================

pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/students", get(list_students))
        .route("/students/:reg", get(student_report))
        .route("/students/:reg/payments", get(student_payments))
        .route("/defaulters", get(defaulters))
        .route("/payments", post(record_payment))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
