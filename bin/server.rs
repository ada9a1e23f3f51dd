// MemoGarden - Web Server
// REST API with Axum over the Core API
//
// Each request opens its own Core (one connection); nothing is shared between
// requests except the database path and the settings.

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    extract::{Path, Query, State},
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use memogarden_core::observability::init_tracing;
use memogarden_core::{
    Core, Database, Error, NewRecurrence, NewTransaction, Recurrence, RecurrenceFilter, RecurrencePatch,
    Settings, Transaction, TransactionFilter, TransactionPatch, DEFAULT_LIST_LIMIT,
};

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Database>,
    settings: Arc<Settings>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }
}

impl ApiResponse<()> {
    fn failure(message: String) -> Self {
        Self {
            success: false,
            data: (),
            error: Some(message),
        }
    }
}

// ============================================================================
// Error mapping
// ============================================================================

enum ApiError {
    /// Failure reported by the Core API
    Core(Error),
    /// The blocking task running the request panicked or was cancelled
    Internal(String),
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError::Core(err)
    }
}

// Malformed bodies and query strings are caller input errors like any other
// validation failure, so they share the 400 envelope.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Core(Error::Validation(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Core(Error::Validation(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Core(err) => {
                let status = match &err {
                    Error::NotFound { .. } => StatusCode::NOT_FOUND,
                    Error::DuplicateEntity { .. } => StatusCode::CONFLICT,
                    err if err.is_client_error() => StatusCode::BAD_REQUEST,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, err.to_string())
            }
            ApiError::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %message, "request failed");
        }

        (status, Json(ApiResponse::failure(message))).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

/// Run `work` against a fresh Core on the blocking pool, so a writer waiting
/// on the SQLite busy timeout never stalls a runtime worker.
async fn with_core<T, F>(state: &AppState, work: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&Core) -> memogarden_core::Result<T> + Send + 'static,
{
    let db = Arc::clone(&state.db);
    let outcome = tokio::task::spawn_blocking(move || {
        let core = db.core()?;
        work(&core)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("request task failed: {}", e)))?;

    Ok(outcome?)
}

// ============================================================================
// Request bodies and query strings
// ============================================================================

/// POST /transactions body; currency falls back to the configured default
#[derive(Deserialize)]
struct CreateTransactionRequest {
    amount: f64,
    transaction_date: NaiveDate,
    account: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    recurrence_id: Option<String>,
}

impl CreateTransactionRequest {
    fn into_new(self, default_currency: &str) -> NewTransaction {
        let currency = self
            .currency
            .map(|c| c.to_uppercase())
            .unwrap_or_else(|| default_currency.to_string());

        let mut tx = NewTransaction::new(self.amount, self.transaction_date, self.account, currency)
            .with_description(self.description);
        tx.category = self.category;
        tx.notes = self.notes;
        tx.recurrence_id = self.recurrence_id;
        if let Some(author) = self.author {
            tx.author = author;
        }
        tx
    }
}

#[derive(Deserialize)]
struct TransactionQuery {
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    account: Option<String>,
    category: Option<String>,
    #[serde(default)]
    include_superseded: bool,
    limit: Option<u32>,
    offset: Option<u32>,
}

#[derive(Deserialize)]
struct RecurrenceQuery {
    valid_from: Option<DateTime<Utc>>,
    valid_until: Option<DateTime<Utc>>,
    #[serde(default)]
    include_superseded: bool,
    limit: Option<u32>,
    offset: Option<u32>,
}

#[derive(Serialize)]
struct DeletedResponse {
    id: String,
    superseded_by: String,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// POST /transactions - Record a transaction
async fn create_transaction(
    State(state): State<AppState>,
    body: Result<Json<CreateTransactionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<Transaction>>), ApiError> {
    let Json(body) = body?;
    let tx = body.into_new(&state.settings.default_currency);

    let created = with_core(&state, move |core| {
        let id = core.transaction().record(&tx)?;
        core.transaction().get_by_id(&id)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(created))))
}

/// GET /transactions - List transactions with filters
async fn list_transactions(
    State(state): State<AppState>,
    query: Result<Query<TransactionQuery>, QueryRejection>,
) -> ApiResult<Vec<Transaction>> {
    let Query(query) = query?;
    let filter = TransactionFilter {
        start_date: query.start_date,
        end_date: query.end_date,
        account: query.account,
        category: query.category,
        include_superseded: query.include_superseded,
    };
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    let offset = query.offset.unwrap_or(0);

    let rows = with_core(&state, move |core| {
        core.transaction().list(&filter, limit, offset)
    })
    .await?;
    Ok(Json(ApiResponse::ok(rows)))
}

/// GET /transactions/:id
async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Transaction> {
    let tx = with_core(&state, move |core| core.transaction().get_by_id(&id)).await?;
    Ok(Json(ApiResponse::ok(tx)))
}

/// PUT /transactions/:id - Partial update
async fn update_transaction(
    State(state): State<AppState>,
    Path(id): Path<String>,
    patch: Result<Json<TransactionPatch>, JsonRejection>,
) -> ApiResult<Transaction> {
    let Json(patch) = patch?;
    if patch.is_empty() {
        return Err(Error::MalformedUpdate { id }.into());
    }

    let updated = with_core(&state, move |core| {
        core.transaction().update(&id, &patch)?;
        core.transaction().get_by_id(&id)
    })
    .await?;
    Ok(Json(ApiResponse::ok(updated)))
}

/// DELETE /transactions/:id - Soft delete
async fn delete_transaction(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<DeletedResponse> {
    let target = id.clone();
    let superseded_by =
        with_core(&state, move |core| core.transaction().delete(&target)).await?;
    Ok(Json(ApiResponse::ok(DeletedResponse { id, superseded_by })))
}

/// GET /transactions/accounts - Distinct account labels
async fn list_accounts(State(state): State<AppState>) -> ApiResult<Vec<String>> {
    let accounts = with_core(&state, |core| core.transaction().accounts()).await?;
    Ok(Json(ApiResponse::ok(accounts)))
}

/// GET /transactions/categories - Distinct category labels
async fn list_categories(State(state): State<AppState>) -> ApiResult<Vec<String>> {
    let categories = with_core(&state, |core| core.transaction().categories()).await?;
    Ok(Json(ApiResponse::ok(categories)))
}

/// POST /recurrences
async fn create_recurrence(
    State(state): State<AppState>,
    body: Result<Json<NewRecurrence>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<Recurrence>>), ApiError> {
    let Json(body) = body?;

    let created = with_core(&state, move |core| {
        let id = core.recurrence().record(&body)?;
        core.recurrence().get_by_id(&id)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(created))))
}

/// GET /recurrences
async fn list_recurrences(
    State(state): State<AppState>,
    query: Result<Query<RecurrenceQuery>, QueryRejection>,
) -> ApiResult<Vec<Recurrence>> {
    let Query(query) = query?;
    let filter = RecurrenceFilter {
        valid_from: query.valid_from,
        valid_until: query.valid_until,
        include_superseded: query.include_superseded,
    };
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    let offset = query.offset.unwrap_or(0);

    let rows = with_core(&state, move |core| {
        core.recurrence().list(&filter, limit, offset)
    })
    .await?;
    Ok(Json(ApiResponse::ok(rows)))
}

/// GET /recurrences/:id
async fn get_recurrence(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Recurrence> {
    let recurrence = with_core(&state, move |core| core.recurrence().get_by_id(&id)).await?;
    Ok(Json(ApiResponse::ok(recurrence)))
}

/// PUT /recurrences/:id
async fn update_recurrence(
    State(state): State<AppState>,
    Path(id): Path<String>,
    patch: Result<Json<RecurrencePatch>, JsonRejection>,
) -> ApiResult<Recurrence> {
    let Json(patch) = patch?;
    if patch.is_empty() {
        return Err(Error::MalformedUpdate { id }.into());
    }

    let updated = with_core(&state, move |core| {
        core.recurrence().update(&id, &patch)?;
        core.recurrence().get_by_id(&id)
    })
    .await?;
    Ok(Json(ApiResponse::ok(updated)))
}

/// DELETE /recurrences/:id
async fn delete_recurrence(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<DeletedResponse> {
    let target = id.clone();
    let superseded_by =
        with_core(&state, move |core| core.recurrence().delete(&target)).await?;
    Ok(Json(ApiResponse::ok(DeletedResponse { id, superseded_by })))
}

// ============================================================================
// Router
// ============================================================================

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    if origins.iter().any(|origin| origin == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    layer.allow_origin(AllowOrigin::list(origins))
}

fn app(state: AppState) -> Router {
    let prefix = state.settings.api_v1_prefix.clone();
    let cors = cors_layer(&state.settings.cors_origins);

    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/transactions", get(list_transactions).post(create_transaction))
        .route("/transactions/accounts", get(list_accounts))
        .route("/transactions/categories", get(list_categories))
        .route(
            "/transactions/:id",
            get(get_transaction)
                .put(update_transaction)
                .delete(delete_transaction),
        )
        .route("/recurrences", get(list_recurrences).post(create_recurrence))
        .route(
            "/recurrences/:id",
            get(get_recurrence)
                .put(update_recurrence)
                .delete(delete_recurrence),
        )
        .with_state(state);

    Router::new()
        .nest(&prefix, api_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use anyhow::Context;

    let config_path = std::env::var_os("MEMOGARDEN_CONFIG").map(std::path::PathBuf::from);
    let settings = Settings::load(config_path.as_deref()).context("Failed to load configuration")?;
    init_tracing(&settings.log_filter);

    let db = Database::from_settings(&settings);
    db.init()
        .with_context(|| format!("Failed to initialize {}", db.path().display()))?;
    info!(path = %db.path().display(), "database ready");

    let addr = settings.bind_address.clone();
    let prefix = settings.api_v1_prefix.clone();
    let state = AppState {
        db: Arc::new(db),
        settings: Arc::new(settings),
    };

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!(address = %addr, prefix = %prefix, "server listening");

    axum::serve(listener, app(state))
        .await
        .context("Server error")?;

    Ok(())
}
