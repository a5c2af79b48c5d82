//! HTTP API server.
//!
//! Exposes listing, retrieval, search, markdown import and user accounts as
//! a JSON API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/api/v1/content` | List records (`module`, `subcategory`, `skip`, `limit`) |
//! | `GET`  | `/api/v1/content/{id}` | One record by id |
//! | `GET`  | `/api/v1/search` | Substring search (`query`, `module`, `skip`, `limit`) |
//! | `POST` | `/api/v1/import-md/text` | Import one markdown document from a JSON body |
//! | `POST` | `/api/v1/import-md/file` | Import one uploaded markdown file (multipart `file`) |
//! | `POST` | `/api/v1/import-md/files` | Import uploaded markdown files (multipart `files`) |
//! | `POST` | `/api/v1/auth/register` | Create an account |
//! | `POST` | `/api/v1/auth/login` | Form `username` + `password` → token pair |
//! | `POST` | `/api/v1/auth/refresh` | Refresh token → new token pair |
//! | `GET`  | `/api/v1/auth/me` | Current user (bearer) |
//! | `GET`/`PUT` | `/api/v1/auth/profile` | Read or patch nickname, avatar, bio (bearer) |
//! | `POST` | `/api/v1/auth/password/reset/request` | Issue a 1-hour reset token |
//! | `POST` | `/api/v1/auth/password/reset/confirm` | Set a new password with a reset token |
//! | `POST` | `/api/v1/auth/email/verify/request` | Issue a 24-hour verification token |
//! | `POST` | `/api/v1/auth/email/verify/confirm` | Mark the email verified |
//! | `POST`/`GET` | `/api/v1/auth/favorites` | Add or list favorites (bearer) |
//! | `GET`  | `/api/v1/auth/favorites/with-content` | Favorites with content summaries (bearer) |
//! | `DELETE` | `/api/v1/auth/favorites/{content_id}` | Remove a favorite (bearer) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `unauthorized` (401), `not_found` (404),
//! `conflict` (409), `internal` (500). A document that fails to import is not
//! an HTTP error: it is reported as a `failed` outcome in a 200 response.
//!
//! # Local images
//!
//! Imports received over HTTP only inline local image files under the
//! configured `import.base_dir`. Without one, local image references are
//! dropped and only URLs are kept.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser front-ends can
//! call the API directly.

use axum::{
    extract::{
        multipart::MultipartRejection,
        rejection::{FormRejection, JsonRejection, QueryRejection},
        DefaultBodyLimit, FromRequestParts, Multipart, Path, Query, State,
    },
    http::{header, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::auth::favorites::{self, Favorite, FavoriteWithContent, NewFavorite};
use crate::auth::{AuthError, AuthService, ProfileUpdate, RegisterRequest, TokenPair, User};
use crate::config::{Config, DEV_JWT_SECRET};
use crate::content::{self, ListParams};
use crate::db;
use crate::extract::LocalImages;
use crate::ingest::{self, ImportOptions, ImportOutcome};
use crate::migrate::apply_schema;
use crate::models::ContentRecord;
use crate::search::{self, SearchParams};
use crate::store::sqlite::SqliteStore;
use crate::store::{ContentStore, SearchPage};

const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn ContentStore>,
    pub auth: Arc<AuthService>,
}

/// Starts the HTTP server against the configured SQLite database.
///
/// Creates the schema if needed, binds to `[server].bind` and runs until the
/// process is terminated. Content and accounts share one connection pool.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;

    if config.auth.jwt_secret == DEV_JWT_SECRET {
        tracing::warn!("auth.jwt_secret is the development default; set it or AUTH_JWT_SECRET");
    }

    let bind_addr = config.server.bind.clone();
    let app = router(AppState {
        config: Arc::new(config.clone()),
        store: Arc::new(SqliteStore::new(pool.clone())),
        auth: Arc::new(AuthService::new(pool, &config.auth)),
    });

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "server listening");
    println!("learnbase API listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/v1/content", get(handle_list_content))
        .route("/api/v1/content/{id}", get(handle_get_content))
        .route("/api/v1/search", get(handle_search))
        .route("/api/v1/import-md/text", post(handle_import_text))
        .route("/api/v1/import-md/file", post(handle_import_file))
        .route("/api/v1/import-md/files", post(handle_import_files))
        .nest("/api/v1/auth", auth_routes())
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .with_state(state)
}

fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(handle_register))
        .route("/login", post(handle_login))
        .route("/refresh", post(handle_refresh))
        .route("/me", get(handle_me))
        .route("/profile", get(handle_me).put(handle_update_profile))
        .route("/password/reset/request", post(handle_password_reset_request))
        .route("/password/reset/confirm", post(handle_password_reset_confirm))
        .route("/email/verify/request", post(handle_email_verify_request))
        .route("/email/verify/confirm", post(handle_email_verify_confirm))
        .route("/favorites", post(handle_add_favorite).get(handle_list_favorites))
        .route("/favorites/with-content", get(handle_favorites_with_content))
        .route("/favorites/{content_id}", delete(handle_remove_favorite))
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`, `"not_found"`).
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        if self.status == StatusCode::UNAUTHORIZED {
            let challenge = [(header::WWW_AUTHENTICATE, "Bearer")];
            return (self.status, challenge, Json(body)).into_response();
        }
        (self.status, Json(body)).into_response()
    }
}

fn error(status: StatusCode, code: &str, message: impl Into<String>) -> AppError {
    AppError {
        status,
        code: code.to_string(),
        message: message.into(),
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    error(StatusCode::BAD_REQUEST, "bad_request", message)
}

fn unauthorized(message: impl Into<String>) -> AppError {
    error(StatusCode::UNAUTHORIZED, "unauthorized", message)
}

fn not_found(message: impl Into<String>) -> AppError {
    error(StatusCode::NOT_FOUND, "not_found", message)
}

fn conflict(message: impl Into<String>) -> AppError {
    error(StatusCode::CONFLICT, "conflict", message)
}

fn internal(message: impl Into<String>) -> AppError {
    error(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
}

/// Maps library errors onto HTTP statuses: lookups that miss become 404,
/// everything else is a 500.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        let msg = format!("{:#}", err);
        if msg.contains("not found") {
            not_found(msg)
        } else {
            tracing::error!(error = %msg, "request failed");
            internal(msg)
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        let msg = err.to_string();
        match err {
            AuthError::UsernameTaken
            | AuthError::EmailTaken
            | AuthError::InvalidResetToken
            | AuthError::InvalidVerifyToken
            | AuthError::Invalid(_) => bad_request(msg),
            AuthError::InvalidCredentials | AuthError::InvalidToken => unauthorized(msg),
            AuthError::UserNotFound | AuthError::FavoriteNotFound => not_found(msg),
            AuthError::FavoriteExists => conflict(msg),
            AuthError::Storage(_) => {
                tracing::error!(error = %msg, "auth request failed");
                internal(msg)
            }
        }
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

impl From<FormRejection> for AppError {
    fn from(rejection: FormRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

impl From<MultipartRejection> for AppError {
    fn from(rejection: MultipartRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ Content ============

async fn handle_list_content(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<Vec<ContentRecord>>, AppError> {
    let Query(params) = params?;
    let records = content::list_content(state.store.as_ref(), &state.config, params).await?;
    Ok(Json(records))
}

async fn handle_get_content(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ContentRecord>, AppError> {
    let record = content::get_content(state.store.as_ref(), &id).await?;
    Ok(Json(record))
}

// ============ GET /api/v1/search ============

/// Unlike the CLI, a blank query is a client error here.
async fn handle_search(
    State(state): State<AppState>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Json<SearchPage>, AppError> {
    let Query(params) = params?;
    if params.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    let page = search::search_content(state.store.as_ref(), &state.config, params).await?;
    Ok(Json(page))
}

// ============ POST /api/v1/import-md/* ============

#[derive(Debug, Deserialize)]
struct ImportTextRequest {
    md_text: String,
    #[serde(default)]
    overwrite: bool,
    #[serde(default)]
    base_dir: Option<PathBuf>,
}

#[derive(Serialize)]
struct ImportFilesResponse {
    results: Vec<ImportOutcome>,
}

/// Import options for a request. Local images are confined to the
/// configured base directory whatever `base_dir` the request names.
fn import_options(
    config: &Config,
    overwrite: bool,
    base_dir: Option<PathBuf>,
) -> Result<ImportOptions, AppError> {
    let policy = match &config.import.base_dir {
        Some(root) => LocalImages::Confined(root.clone()),
        None => LocalImages::Deny,
    };
    let options = ImportOptions::from_config(&config.import, overwrite)?;
    Ok(options.with_base_dir(base_dir).with_local_images(policy))
}

async fn handle_import_text(
    State(state): State<AppState>,
    body: Result<Json<ImportTextRequest>, JsonRejection>,
) -> Result<Json<ImportOutcome>, AppError> {
    let Json(req) = body?;
    let options = import_options(&state.config, req.overwrite, req.base_dir)?;
    let outcome = ingest::import_text(state.store.as_ref(), &req.md_text, None, &options).await;
    Ok(Json(outcome))
}

struct Upload {
    file_name: Option<String>,
    bytes: Vec<u8>,
}

/// Fields of an import upload form.
struct ImportForm {
    uploads: Vec<Upload>,
    overwrite: bool,
    base_dir: Option<PathBuf>,
}

/// Read an upload form whose files arrive in `file_field`. Other unknown
/// fields are ignored.
async fn read_import_form(
    mut multipart: Multipart,
    file_field: &str,
) -> Result<ImportForm, AppError> {
    let mut form = ImportForm {
        uploads: Vec::new(),
        overwrite: false,
        base_dir: None,
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == file_field {
            let file_name = field.file_name().map(str::to_string);
            let bytes = field
                .bytes()
                .await
                .map_err(|e| bad_request(e.body_text()))?;
            form.uploads.push(Upload {
                file_name,
                bytes: bytes.to_vec(),
            });
            continue;
        }
        match name.as_str() {
            "overwrite" => {
                let value = field.text().await.map_err(|e| bad_request(e.body_text()))?;
                form.overwrite = parse_form_bool(&value)
                    .ok_or_else(|| bad_request(format!("invalid overwrite value: {}", value)))?;
            }
            "base_dir" => {
                let value = field.text().await.map_err(|e| bad_request(e.body_text()))?;
                if !value.trim().is_empty() {
                    form.base_dir = Some(PathBuf::from(value.trim()));
                }
            }
            _ => {}
        }
    }

    Ok(form)
}

/// Decode an uploaded file as UTF-8, dropping byte sequences that are not.
fn decode_upload(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            tracing::debug!(error = %e, "upload is not valid UTF-8; dropping invalid bytes");
            String::from_utf8_lossy(e.as_bytes()).replace(char::REPLACEMENT_CHARACTER, "")
        }
    }
}

async fn handle_import_file(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ImportOutcome>, AppError> {
    let form = read_import_form(multipart?, "file").await?;
    let mut uploads = form.uploads.into_iter();
    let upload = match (uploads.next(), uploads.next()) {
        (Some(upload), None) => upload,
        (None, _) => return Err(bad_request("a file is required in field 'file'")),
        (Some(_), Some(_)) => {
            return Err(bad_request("field 'file' takes one file; use /import-md/files"))
        }
    };

    let options = import_options(&state.config, form.overwrite, form.base_dir)?;
    let text = decode_upload(upload.bytes);
    let outcome =
        ingest::import_text(state.store.as_ref(), &text, upload.file_name, &options).await;
    Ok(Json(outcome))
}

async fn handle_import_files(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ImportFilesResponse>, AppError> {
    let form = read_import_form(multipart?, "files").await?;
    if form.uploads.is_empty() {
        return Err(bad_request("at least one file is required in field 'files'"));
    }

    let options = import_options(&state.config, form.overwrite, form.base_dir)?;
    let mut results = Vec::with_capacity(form.uploads.len());
    for upload in form.uploads {
        let text = decode_upload(upload.bytes);
        results.push(
            ingest::import_text(state.store.as_ref(), &text, upload.file_name, &options).await,
        );
    }

    Ok(Json(ImportFilesResponse { results }))
}

fn parse_form_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "false" | "0" | "no" | "off" => Some(false),
        "true" | "1" | "yes" | "on" => Some(true),
        _ => None,
    }
}

// ============ /api/v1/auth ============

/// The user behind a valid `Authorization: Bearer <access token>` header.
struct AuthUser(User);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, AppError> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(bearer_token)
            .ok_or_else(|| unauthorized("missing bearer token"))?;
        let user = state.auth.authenticate(token).await?;
        Ok(AuthUser(user))
    }
}

fn bearer_token(header_value: &str) -> Option<&str> {
    let (scheme, token) = header_value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

#[derive(Deserialize)]
struct LoginForm {
    username: String,
    password: String,
}

#[derive(Deserialize)]
struct RefreshRequest {
    refresh_token: String,
}

#[derive(Deserialize)]
struct EmailRequest {
    email: String,
}

#[derive(Deserialize)]
struct PasswordResetConfirm {
    token: String,
    new_password: String,
}

#[derive(Deserialize)]
struct TokenRequest {
    token: String,
}

#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
}

const OK: StatusResponse = StatusResponse { status: "ok" };

#[derive(Serialize)]
struct DeletedResponse {
    deleted: u64,
}

async fn handle_register(
    State(state): State<AppState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Json<User>, AppError> {
    let Json(req) = body?;
    Ok(Json(state.auth.register(&req).await?))
}

async fn handle_login(
    State(state): State<AppState>,
    form: Result<Form<LoginForm>, FormRejection>,
) -> Result<Json<TokenPair>, AppError> {
    let Form(form) = form?;
    Ok(Json(state.auth.login(&form.username, &form.password).await?))
}

async fn handle_refresh(
    State(state): State<AppState>,
    body: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<Json<TokenPair>, AppError> {
    let Json(req) = body?;
    Ok(Json(state.auth.refresh(&req.refresh_token).await?))
}

async fn handle_me(AuthUser(user): AuthUser) -> Json<User> {
    Json(user)
}

async fn handle_update_profile(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    body: Result<Json<ProfileUpdate>, JsonRejection>,
) -> Result<Json<User>, AppError> {
    let Json(update) = body?;
    Ok(Json(state.auth.update_profile(user.id, &update).await?))
}

/// Answers `ok` whether or not the email belongs to an account.
async fn handle_password_reset_request(
    State(state): State<AppState>,
    body: Result<Json<EmailRequest>, JsonRejection>,
) -> Result<Json<StatusResponse>, AppError> {
    let Json(req) = body?;
    state.auth.request_password_reset(&req.email).await?;
    Ok(Json(OK))
}

async fn handle_password_reset_confirm(
    State(state): State<AppState>,
    body: Result<Json<PasswordResetConfirm>, JsonRejection>,
) -> Result<Json<StatusResponse>, AppError> {
    let Json(req) = body?;
    state
        .auth
        .confirm_password_reset(&req.token, &req.new_password)
        .await?;
    Ok(Json(OK))
}

async fn handle_email_verify_request(
    State(state): State<AppState>,
    body: Result<Json<EmailRequest>, JsonRejection>,
) -> Result<Json<StatusResponse>, AppError> {
    let Json(req) = body?;
    state.auth.request_email_verification(&req.email).await?;
    Ok(Json(OK))
}

async fn handle_email_verify_confirm(
    State(state): State<AppState>,
    body: Result<Json<TokenRequest>, JsonRejection>,
) -> Result<Json<StatusResponse>, AppError> {
    let Json(req) = body?;
    state.auth.confirm_email_verification(&req.token).await?;
    Ok(Json(OK))
}

async fn handle_add_favorite(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    body: Result<Json<NewFavorite>, JsonRejection>,
) -> Result<Json<Favorite>, AppError> {
    let Json(new) = body?;
    Ok(Json(state.auth.add_favorite(user.id, &new).await?))
}

async fn handle_list_favorites(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<Favorite>>, AppError> {
    Ok(Json(state.auth.list_favorites(user.id).await?))
}

async fn handle_favorites_with_content(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<FavoriteWithContent>>, AppError> {
    let listed =
        favorites::favorites_with_content(&state.auth, state.store.as_ref(), user.id).await?;
    Ok(Json(listed))
}

async fn handle_remove_favorite(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(content_id): Path<String>,
) -> Result<Json<DeletedResponse>, AppError> {
    let deleted = state.auth.remove_favorite(user.id, &content_id).await?;
    Ok(Json(DeletedResponse { deleted }))
}
