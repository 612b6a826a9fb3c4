//! JSON/HTTP surface over the workflow engine.
//!
//! Handlers claim the session's studio with a non-blocking lock; a request
//! that lands while another operation is in flight gets a 409 instead of
//! queueing behind it.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::assets::{AdCopy, GeneratedImage, ImageAsset};
use crate::config::AdminConfig;
use crate::error::StudioError;
use crate::history::HistoryItem;
use crate::payments::{CREDIT_PACKAGES, Gateway, PaymentError};
use crate::session::{Session, SessionRegistry};
use crate::settings::Settings;

const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;
const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionRegistry>,
    /// Admin surface is disabled entirely when no token is configured.
    pub admin_token: Option<String>,
    pub config_path: Arc<PathBuf>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/auth/signup", post(signup))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/studio", get(studio_snapshot))
        .route("/api/studio/settings", put(update_settings))
        .route(
            "/api/studio/upload",
            post(upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/api/studio/remove-background", post(remove_background))
        .route("/api/studio/generate", post(generate))
        .route("/api/studio/regenerate", post(regenerate))
        .route("/api/studio/history", get(history))
        .route("/api/credits/packages", get(packages))
        .route("/api/credits/checkout", post(checkout))
        .route("/api/credits/confirm", post(confirm_purchase))
        .route("/api/credits/cancel", post(cancel_checkout))
        .route("/api/admin/settings", get(admin_settings).put(save_admin_settings))
        .with_state(state)
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(ErrorResponse { error: message.to_string() })).into_response()
}

fn error_response(err: StudioError) -> Response {
    let status = match &err {
        StudioError::NotAuthenticated => StatusCode::UNAUTHORIZED,
        StudioError::InsufficientCredits(_) => StatusCode::PAYMENT_REQUIRED,
        StudioError::Busy => StatusCode::CONFLICT,
        StudioError::Superseded => StatusCode::GONE,
        StudioError::Backend(_) => StatusCode::BAD_GATEWAY,
        StudioError::Image(_) => StatusCode::INTERNAL_SERVER_ERROR,
        StudioError::Payment(PaymentError::Transport(_)) => StatusCode::BAD_GATEWAY,
        StudioError::Payment(PaymentError::Unverified(_)) => StatusCode::PAYMENT_REQUIRED,
        _ => StatusCode::BAD_REQUEST,
    };
    json_error(status, &err.to_string())
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

fn require_session(state: &AppState, headers: &HeaderMap) -> Result<Arc<Session>, Response> {
    bearer_token(headers)
        .and_then(|token| state.sessions.get(token))
        .ok_or_else(|| json_error(StatusCode::UNAUTHORIZED, "please log in first"))
}

fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    let Some(expected) = state.admin_token.as_deref() else {
        return Err(json_error(StatusCode::FORBIDDEN, "admin surface is disabled"));
    };
    let provided = headers
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok());
    if provided != Some(expected) {
        return Err(json_error(StatusCode::FORBIDDEN, "admin access denied"));
    }
    Ok(())
}

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Deserialize)]
struct SignupRequest {
    email: String,
    password: String,
    confirm_password: String,
}

#[derive(Serialize)]
struct AuthResponse {
    token: String,
    email: String,
    credits: u32,
}

async fn auth_response(session: &Arc<Session>) -> Response {
    let credits = session.studio().lock().await.credits();
    (
        StatusCode::OK,
        Json(AuthResponse {
            token: session.token().to_string(),
            email: session.email().to_string(),
            credits,
        }),
    )
        .into_response()
}

async fn login(State(state): State<AppState>, Json(request): Json<LoginRequest>) -> Response {
    match state.sessions.login(&request.email, &request.password) {
        Ok(session) => auth_response(&session).await,
        Err(err) => json_error(StatusCode::BAD_REQUEST, &err.to_string()),
    }
}

async fn signup(State(state): State<AppState>, Json(request): Json<SignupRequest>) -> Response {
    match state.sessions.signup(
        &request.email,
        &request.password,
        &request.confirm_password,
    ) {
        Ok(session) => auth_response(&session).await,
        Err(err) => json_error(StatusCode::BAD_REQUEST, &err.to_string()),
    }
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(token) = bearer_token(&headers) {
        if let Some(session) = state.sessions.remove(token) {
            session.studio().lock().await.logout();
        }
    }
    StatusCode::NO_CONTENT.into_response()
}

#[derive(Serialize)]
struct SourceInfo {
    id: String,
    name: String,
    mime_type: String,
    preview: String,
}

impl SourceInfo {
    fn from_asset(asset: &ImageAsset) -> Self {
        Self {
            id: asset.id.clone(),
            name: asset.name.clone(),
            mime_type: asset.mime_type.clone(),
            preview: asset.preview_uri(),
        }
    }
}

#[derive(Serialize)]
struct StudioSnapshot {
    email: String,
    credits: u32,
    settings: Settings,
    source: Option<SourceInfo>,
    images: Vec<GeneratedImage>,
    ad_copies: Vec<AdCopy>,
}

async fn studio_snapshot(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let session = match require_session(&state, &headers) {
        Ok(session) => session,
        Err(response) => return response,
    };
    let studio = session.studio();
    let studio = studio.lock().await;
    Json(StudioSnapshot {
        email: session.email().to_string(),
        credits: studio.credits(),
        settings: studio.settings().clone(),
        source: studio.source().map(SourceInfo::from_asset),
        images: studio.images().to_vec(),
        ad_copies: studio.ad_copies().to_vec(),
    })
    .into_response()
}

async fn update_settings(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(settings): Json<Settings>,
) -> Response {
    let session = match require_session(&state, &headers) {
        Ok(session) => session,
        Err(response) => return response,
    };
    let mut studio = match session.try_studio() {
        Ok(guard) => guard,
        Err(err) => return error_response(err),
    };
    match studio.set_settings(settings) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(err),
    }
}

async fn upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    let session = match require_session(&state, &headers) {
        Ok(session) => session,
        Err(response) => return response,
    };

    let mut file_name = None;
    let mut bytes = None;
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                if field.name() == Some("file") {
                    file_name = Some(field.file_name().unwrap_or("upload").to_string());
                    match field.bytes().await {
                        Ok(data) => bytes = Some(data),
                        Err(err) => {
                            return json_error(
                                StatusCode::BAD_REQUEST,
                                &format!("failed to read upload: {err}"),
                            );
                        }
                    }
                    break;
                }
            }
            Ok(None) => break,
            Err(err) => {
                return json_error(
                    StatusCode::BAD_REQUEST,
                    &format!("failed to read form data: {err}"),
                );
            }
        }
    }

    let Some(file_name) = file_name else {
        return json_error(StatusCode::BAD_REQUEST, "no file field in upload");
    };
    let Some(bytes) = bytes else {
        return json_error(StatusCode::BAD_REQUEST, "no file field in upload");
    };
    if bytes.is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "uploaded file is empty");
    }

    let mut studio = match session.try_studio() {
        Ok(guard) => guard,
        Err(err) => return error_response(err),
    };
    match studio.upload_image(&file_name, &bytes) {
        Ok(asset) => Json(SourceInfo::from_asset(asset)).into_response(),
        Err(err) => error_response(err),
    }
}

async fn remove_background(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let session = match require_session(&state, &headers) {
        Ok(session) => session,
        Err(response) => return response,
    };
    let mut studio = match session.try_studio() {
        Ok(guard) => guard,
        Err(err) => return error_response(err),
    };
    match studio.remove_background().await {
        Ok(asset) => Json(SourceInfo::from_asset(asset)).into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Serialize)]
struct GenerateResult {
    rendered: usize,
    dropped: usize,
    charged: u32,
    credits: u32,
    images: Vec<GeneratedImage>,
    ad_copies: Vec<AdCopy>,
}

async fn generate(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let session = match require_session(&state, &headers) {
        Ok(session) => session,
        Err(response) => return response,
    };
    let mut studio = match session.try_studio() {
        Ok(guard) => guard,
        Err(err) => return error_response(err),
    };
    match studio.generate().await {
        Ok(outcome) => {
            if let Some(directive) = outcome.auto_clear {
                session.arm_auto_clear(directive);
            }
            Json(GenerateResult {
                rendered: outcome.rendered,
                dropped: outcome.dropped,
                charged: outcome.charged,
                credits: studio.credits(),
                images: studio.images().to_vec(),
                ad_copies: studio.ad_copies().to_vec(),
            })
            .into_response()
        }
        Err(err) => error_response(err),
    }
}

#[derive(Deserialize)]
struct RegenerateRequest {
    image_id: String,
    prompt: String,
}

async fn regenerate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<RegenerateRequest>,
) -> Response {
    let session = match require_session(&state, &headers) {
        Ok(session) => session,
        Err(response) => return response,
    };
    let mut studio = match session.try_studio() {
        Ok(guard) => guard,
        Err(err) => return error_response(err),
    };
    match studio.regenerate_image(&request.image_id, &request.prompt).await {
        Ok(()) => {
            let image = studio
                .images()
                .iter()
                .find(|image| image.id == request.image_id)
                .cloned();
            Json(image).into_response()
        }
        Err(err) => error_response(err),
    }
}

async fn history(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let session = match require_session(&state, &headers) {
        Ok(session) => session,
        Err(response) => return response,
    };
    let studio = session.studio();
    let studio = studio.lock().await;
    let items: Vec<HistoryItem> = studio.history().to_vec();
    Json(items).into_response()
}

async fn packages() -> Response {
    Json(CREDIT_PACKAGES).into_response()
}

#[derive(Deserialize)]
struct CheckoutRequest {
    package_id: String,
    gateway: Gateway,
}

async fn checkout(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CheckoutRequest>,
) -> Response {
    let session = match require_session(&state, &headers) {
        Ok(session) => session,
        Err(response) => return response,
    };
    let mut studio = match session.try_studio() {
        Ok(guard) => guard,
        Err(err) => return error_response(err),
    };
    match studio.begin_checkout(&request.package_id, request.gateway) {
        Ok(intent) => Json(intent).into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Deserialize)]
struct CheckoutReference {
    reference: String,
}

#[derive(Serialize)]
struct PurchaseResult {
    credits_added: u32,
    balance: u32,
}

async fn confirm_purchase(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CheckoutReference>,
) -> Response {
    let session = match require_session(&state, &headers) {
        Ok(session) => session,
        Err(response) => return response,
    };
    let mut studio = match session.try_studio() {
        Ok(guard) => guard,
        Err(err) => return error_response(err),
    };
    match studio.confirm_purchase(&request.reference).await {
        Ok(credits_added) => Json(PurchaseResult {
            credits_added,
            balance: studio.credits(),
        })
        .into_response(),
        Err(err) => error_response(err),
    }
}

async fn cancel_checkout(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CheckoutReference>,
) -> Response {
    let session = match require_session(&state, &headers) {
        Ok(session) => session,
        Err(response) => return response,
    };
    let mut studio = match session.try_studio() {
        Ok(guard) => guard,
        Err(err) => return error_response(err),
    };
    studio.cancel_checkout(&request.reference);
    StatusCode::NO_CONTENT.into_response()
}

async fn admin_settings(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(response) = require_admin(&state, &headers) {
        return response;
    }
    Json(state.sessions.admin().get()).into_response()
}

async fn save_admin_settings(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(config): Json<AdminConfig>,
) -> Response {
    if let Err(response) = require_admin(&state, &headers) {
        return response;
    }
    state.sessions.admin().set(config.clone());
    if let Err(err) = config.save(&state.config_path).await {
        tracing::error!(%err, "failed to persist admin settings");
        return json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "settings applied but could not be persisted",
        );
    }
    StatusCode::NO_CONTENT.into_response()
}
