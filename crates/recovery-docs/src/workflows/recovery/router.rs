use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, warn};

use super::domain::{Actor, CaseId, DocumentId};
use super::provider::{ProviderError, SigningProvider};
use super::repository::{CaseRepository, RepositoryError};
use super::service::{
    AdHocDocumentRequest, ErrorKind, IntakeSubmission, RecoveryCaseService, RecoveryServiceError,
    SendForSigningRequest,
};
use super::session::{SessionError, SessionRegistry, SessionToken};
use super::signing::SignatureCapture;
use super::webhook::SigningEvent;

/// Shared handler state: the case service plus the session registry used to resolve actors.
pub struct RecoveryRouterState<R, P> {
    pub service: Arc<RecoveryCaseService<R, P>>,
    pub sessions: Arc<SessionRegistry>,
    pub require_session: bool,
}

// Derived Clone would demand R: Clone and P: Clone.
impl<R, P> Clone for RecoveryRouterState<R, P> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            sessions: self.sessions.clone(),
            require_session: self.require_session,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct FieldsUpdate {
    pub fields: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct MailingUpdate {
    #[serde(default)]
    pub tracking_number: String,
}

/// Router builder exposing case intake, the document lifecycle, and the provider webhook.
pub fn recovery_router<R, P>(
    service: Arc<RecoveryCaseService<R, P>>,
    sessions: Arc<SessionRegistry>,
    require_session: bool,
) -> Router
where
    R: CaseRepository + 'static,
    P: SigningProvider + 'static,
{
    let state = RecoveryRouterState {
        service,
        sessions,
        require_session,
    };

    Router::new()
        .route("/api/v1/cases", post(create_case_handler::<R, P>))
        .route("/api/v1/cases/:case_id", get(case_handler::<R, P>))
        .route("/api/v1/documents", post(prepare_document_handler::<R, P>))
        .route("/api/v1/documents/:document_id", get(document_handler::<R, P>))
        .route(
            "/api/v1/documents/:document_id/audit",
            get(audit_handler::<R, P>),
        )
        .route(
            "/api/v1/documents/:document_id/fields",
            post(update_fields_handler::<R, P>),
        )
        .route(
            "/api/v1/documents/:document_id/ready",
            post(mark_ready_handler::<R, P>),
        )
        .route(
            "/api/v1/documents/:document_id/sign",
            post(sign_handler::<R, P>),
        )
        .route(
            "/api/v1/documents/:document_id/notarize",
            post(notarize_handler::<R, P>),
        )
        .route(
            "/api/v1/documents/:document_id/print",
            post(print_handler::<R, P>),
        )
        .route(
            "/api/v1/documents/:document_id/mail",
            post(mail_handler::<R, P>),
        )
        .route(
            "/api/v1/documents/:document_id/send",
            post(send_handler::<R, P>),
        )
        .route(
            "/api/v1/documents/:document_id/refresh",
            post(refresh_handler::<R, P>),
        )
        .route(
            "/api/v1/documents/:document_id/prepare",
            post(prepare_fields_handler::<R, P>),
        )
        .route("/api/v1/webhooks/signing", post(webhook_handler::<R, P>))
        .with_state(state)
}

pub(crate) async fn create_case_handler<R, P>(
    State(state): State<RecoveryRouterState<R, P>>,
    headers: HeaderMap,
    axum::Json(intake): axum::Json<IntakeSubmission>,
) -> Response
where
    R: CaseRepository + 'static,
    P: SigningProvider + 'static,
{
    let actor = match resolve_actor(&state, &headers) {
        Ok(actor) => actor,
        Err(rejection) => return rejection,
    };
    match state.service.create_case(intake, &actor) {
        Ok(created) => (StatusCode::CREATED, axum::Json(created)).into_response(),
        Err(err) => service_error_response(err),
    }
}

pub(crate) async fn case_handler<R, P>(
    State(state): State<RecoveryRouterState<R, P>>,
    Path(case_id): Path<String>,
) -> Response
where
    R: CaseRepository + 'static,
    P: SigningProvider + 'static,
{
    match state.service.get_case(&CaseId(case_id)) {
        Ok(overview) => (StatusCode::OK, axum::Json(overview)).into_response(),
        Err(err) => service_error_response(err),
    }
}

pub(crate) async fn prepare_document_handler<R, P>(
    State(state): State<RecoveryRouterState<R, P>>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<AdHocDocumentRequest>,
) -> Response
where
    R: CaseRepository + 'static,
    P: SigningProvider + 'static,
{
    let actor = match resolve_actor(&state, &headers) {
        Ok(actor) => actor,
        Err(rejection) => return rejection,
    };
    match state.service.prepare_document(request, &actor) {
        Ok(document) => (StatusCode::CREATED, axum::Json(document)).into_response(),
        Err(err) => service_error_response(err),
    }
}

pub(crate) async fn document_handler<R, P>(
    State(state): State<RecoveryRouterState<R, P>>,
    Path(document_id): Path<String>,
) -> Response
where
    R: CaseRepository + 'static,
    P: SigningProvider + 'static,
{
    match state.service.get_document(&DocumentId(document_id)) {
        Ok(document) => (StatusCode::OK, axum::Json(document)).into_response(),
        Err(err) => service_error_response(err),
    }
}

pub(crate) async fn audit_handler<R, P>(
    State(state): State<RecoveryRouterState<R, P>>,
    Path(document_id): Path<String>,
) -> Response
where
    R: CaseRepository + 'static,
    P: SigningProvider + 'static,
{
    match state.service.audit_trail(&DocumentId(document_id)) {
        Ok(entries) => (StatusCode::OK, axum::Json(entries)).into_response(),
        Err(err) => service_error_response(err),
    }
}

pub(crate) async fn update_fields_handler<R, P>(
    State(state): State<RecoveryRouterState<R, P>>,
    headers: HeaderMap,
    Path(document_id): Path<String>,
    axum::Json(update): axum::Json<FieldsUpdate>,
) -> Response
where
    R: CaseRepository + 'static,
    P: SigningProvider + 'static,
{
    let actor = match resolve_actor(&state, &headers) {
        Ok(actor) => actor,
        Err(rejection) => return rejection,
    };
    document_response(
        state
            .service
            .update_fields(&DocumentId(document_id), update.fields, &actor),
    )
}

pub(crate) async fn mark_ready_handler<R, P>(
    State(state): State<RecoveryRouterState<R, P>>,
    headers: HeaderMap,
    Path(document_id): Path<String>,
) -> Response
where
    R: CaseRepository + 'static,
    P: SigningProvider + 'static,
{
    let actor = match resolve_actor(&state, &headers) {
        Ok(actor) => actor,
        Err(rejection) => return rejection,
    };
    document_response(state.service.mark_ready(&DocumentId(document_id), &actor))
}

/// An empty body is accepted here so the service can reject the missing signature itself.
pub(crate) async fn sign_handler<R, P>(
    State(state): State<RecoveryRouterState<R, P>>,
    headers: HeaderMap,
    Path(document_id): Path<String>,
    body: Bytes,
) -> Response
where
    R: CaseRepository + 'static,
    P: SigningProvider + 'static,
{
    let actor = match resolve_actor(&state, &headers) {
        Ok(actor) => actor,
        Err(rejection) => return rejection,
    };
    let capture: SignatureCapture = match optional_json(&body) {
        Ok(capture) => capture,
        Err(rejection) => return rejection,
    };
    document_response(
        state
            .service
            .sign(&DocumentId(document_id), capture, &actor),
    )
}

pub(crate) async fn notarize_handler<R, P>(
    State(state): State<RecoveryRouterState<R, P>>,
    headers: HeaderMap,
    Path(document_id): Path<String>,
) -> Response
where
    R: CaseRepository + 'static,
    P: SigningProvider + 'static,
{
    let actor = match resolve_actor(&state, &headers) {
        Ok(actor) => actor,
        Err(rejection) => return rejection,
    };
    document_response(state.service.notarize(&DocumentId(document_id), &actor))
}

pub(crate) async fn print_handler<R, P>(
    State(state): State<RecoveryRouterState<R, P>>,
    headers: HeaderMap,
    Path(document_id): Path<String>,
) -> Response
where
    R: CaseRepository + 'static,
    P: SigningProvider + 'static,
{
    let actor = match resolve_actor(&state, &headers) {
        Ok(actor) => actor,
        Err(rejection) => return rejection,
    };
    document_response(state.service.mark_printed(&DocumentId(document_id), &actor))
}

pub(crate) async fn mail_handler<R, P>(
    State(state): State<RecoveryRouterState<R, P>>,
    headers: HeaderMap,
    Path(document_id): Path<String>,
    body: Bytes,
) -> Response
where
    R: CaseRepository + 'static,
    P: SigningProvider + 'static,
{
    let actor = match resolve_actor(&state, &headers) {
        Ok(actor) => actor,
        Err(rejection) => return rejection,
    };
    let update: MailingUpdate = match optional_json(&body) {
        Ok(update) => update,
        Err(rejection) => return rejection,
    };
    document_response(state.service.mark_mailed(
        &DocumentId(document_id),
        update.tracking_number,
        &actor,
    ))
}

pub(crate) async fn send_handler<R, P>(
    State(state): State<RecoveryRouterState<R, P>>,
    headers: HeaderMap,
    Path(document_id): Path<String>,
    body: Bytes,
) -> Response
where
    R: CaseRepository + 'static,
    P: SigningProvider + 'static,
{
    let actor = match resolve_actor(&state, &headers) {
        Ok(actor) => actor,
        Err(rejection) => return rejection,
    };
    let request: SendForSigningRequest = match optional_json(&body) {
        Ok(request) => request,
        Err(rejection) => return rejection,
    };
    document_response(
        state
            .service
            .send_for_signing(&DocumentId(document_id), request, &actor)
            .await,
    )
}

pub(crate) async fn refresh_handler<R, P>(
    State(state): State<RecoveryRouterState<R, P>>,
    headers: HeaderMap,
    Path(document_id): Path<String>,
) -> Response
where
    R: CaseRepository + 'static,
    P: SigningProvider + 'static,
{
    let actor = match resolve_actor(&state, &headers) {
        Ok(actor) => actor,
        Err(rejection) => return rejection,
    };
    document_response(
        state
            .service
            .refresh_signing_session(&DocumentId(document_id), &actor)
            .await,
    )
}

pub(crate) async fn prepare_fields_handler<R, P>(
    State(state): State<RecoveryRouterState<R, P>>,
    headers: HeaderMap,
    Path(document_id): Path<String>,
) -> Response
where
    R: CaseRepository + 'static,
    P: SigningProvider + 'static,
{
    let actor = match resolve_actor(&state, &headers) {
        Ok(actor) => actor,
        Err(rejection) => return rejection,
    };
    document_response(
        state
            .service
            .repopulate_document(&DocumentId(document_id), &actor),
    )
}

/// Acknowledges every well-formed payload so the provider does not retry; processing failures
/// are logged rather than returned.
pub(crate) async fn webhook_handler<R, P>(
    State(state): State<RecoveryRouterState<R, P>>,
    body: Bytes,
) -> Response
where
    R: CaseRepository + 'static,
    P: SigningProvider + 'static,
{
    let event = match SigningEvent::from_slice(&body) {
        Ok(event) => event,
        Err(err) => {
            warn!(error = %err, "rejecting malformed signing webhook");
            let payload = json!({
                "received": false,
                "error": err.to_string(),
            });
            return (StatusCode::BAD_REQUEST, axum::Json(payload)).into_response();
        }
    };

    let event_type = event.event_type().to_string();
    let payload = match state.service.handle_signing_event(event) {
        Ok(outcome) => json!({
            "received": true,
            "event_type": outcome.event_type,
            "handled": outcome.handled,
            "documents_updated": outcome.documents_updated,
        }),
        Err(err) => {
            error!(event_type = %event_type, error = %err, "signing webhook processing failed");
            json!({
                "received": true,
                "event_type": event_type,
                "handled": false,
                "documents_updated": 0,
            })
        }
    };
    (StatusCode::OK, axum::Json(payload)).into_response()
}

fn resolve_actor<R, P>(
    state: &RecoveryRouterState<R, P>,
    headers: &HeaderMap,
) -> Result<Actor, Response> {
    match bearer_token(headers) {
        Some(token) => state
            .sessions
            .validate(&SessionToken(token), Utc::now())
            .map(|session| session.actor())
            .map_err(session_rejection),
        None if state.require_session => Err(unauthorized("a session token is required")),
        None => Ok(Actor::Anonymous),
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))?
        .trim();
    (!token.is_empty()).then(|| token.to_string())
}

fn session_rejection(err: SessionError) -> Response {
    match err {
        SessionError::Store(store) => {
            error!(error = %store, "session lookup failed");
            let payload = json!({ "error": "session store unavailable" });
            (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
        }
        other => unauthorized(&other.to_string()),
    }
}

fn unauthorized(message: &str) -> Response {
    let payload = json!({ "error": message });
    (StatusCode::UNAUTHORIZED, axum::Json(payload)).into_response()
}

/// Parse an optional JSON body; an empty body yields the type's default.
fn optional_json<T>(body: &Bytes) -> Result<T, Response>
where
    T: DeserializeOwned + Default,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|err| {
        let payload = json!({ "error": format!("invalid request body: {err}") });
        (StatusCode::BAD_REQUEST, axum::Json(payload)).into_response()
    })
}

fn document_response<T: serde::Serialize>(result: Result<T, RecoveryServiceError>) -> Response {
    match result {
        Ok(document) => (StatusCode::OK, axum::Json(document)).into_response(),
        Err(err) => service_error_response(err),
    }
}

pub(crate) fn service_error_response(err: RecoveryServiceError) -> Response {
    let status = match (&err, err.kind()) {
        (RecoveryServiceError::Provider(ProviderError::Timeout(_)), _) => {
            StatusCode::GATEWAY_TIMEOUT
        }
        (RecoveryServiceError::Repository(RepositoryError::Conflict), _) => StatusCode::CONFLICT,
        (_, ErrorKind::Validation) => StatusCode::UNPROCESSABLE_ENTITY,
        (_, ErrorKind::NotFound) => StatusCode::NOT_FOUND,
        (_, ErrorKind::Upstream) => StatusCode::BAD_GATEWAY,
        (_, ErrorKind::Persistence) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!(error = %err, status = status.as_u16(), "recovery request failed");
    }
    let payload = json!({ "error": err.to_string() });
    (status, axum::Json(payload)).into_response()
}
