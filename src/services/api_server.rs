// src/services/api_server.rs
//! API Server for certificate issuance and verification
//!
//! This module exposes the certificate services over HTTP using Axum.
//!
//! Endpoints:
//! - Single and batch issuance (instructors and administrators)
//! - Public verification by code
//! - Revocation and the verification attempt log (administrators)
//! - Certificate lookup by id
//! - Health with store counters
//!
//! Callers authenticate with an HS256 bearer token; requests without one run
//! as the anonymous actor, which may only verify.

use crate::error::CertificateError;
use crate::models::actor::Actor;
use crate::models::batch::BatchIssueSummary;
use crate::models::certificate::Certificate;
use crate::models::verification::{VerificationAttempt, VerificationResult, VerifierContext};
use crate::services::authenticator::TokenAuthenticator;
use crate::services::batch_issuer::BatchIssuer;
use crate::services::certificate_issuer::{CertificateIssuer, IssueRequest};
use crate::services::revocation::RevocationService;
use crate::services::verifier::Verifier;
use crate::storage::{CertificateStore, StoreStats};
use axum::{
    extract::{Json, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

// API request and response structures

/// Response for a single issuance
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IssueCertificateResponse {
    #[serde(flatten)]
    certificate: Certificate,
    /// Shareable link, also the QR payload
    verification_url: String,
}

/// Request payload for batch issuance
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueBatchRequest {
    batch_id: String,
}

/// Query string of the public verification endpoint
#[derive(Deserialize)]
struct VerifyQuery {
    #[serde(default)]
    code: String,
}

/// Request payload for revoking a certificate
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RevokeCertificateRequest {
    certificate_id: Uuid,
    #[serde(default)]
    reason: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    store: StoreStats,
}

/// API server state containing all service dependencies
#[derive(Clone)]
pub struct ApiServer {
    /// Service for single issuance and certificate lookup
    issuer: Arc<CertificateIssuer>,

    /// Service for issuing a whole batch
    batch_issuer: Arc<BatchIssuer>,

    /// Service for public verification
    verifier: Arc<Verifier>,

    /// Service for revocation
    revoker: Arc<RevocationService>,

    /// Resolves the calling actor from request headers
    authenticator: Arc<TokenAuthenticator>,

    /// Store handle for health counters
    store: Arc<dyn CertificateStore>,
}

impl ApiServer {
    /// Creates a new instance of the API server
    pub fn new(
        issuer: CertificateIssuer,
        batch_issuer: BatchIssuer,
        verifier: Verifier,
        revoker: RevocationService,
        authenticator: TokenAuthenticator,
        store: Arc<dyn CertificateStore>,
    ) -> Self {
        ApiServer {
            issuer: Arc::new(issuer),
            batch_issuer: Arc::new(batch_issuer),
            verifier: Arc::new(verifier),
            revoker: Arc::new(revoker),
            authenticator: Arc::new(authenticator),
            store,
        }
    }

    /// Builds the router with every endpoint mounted.
    pub fn router(self) -> Router {
        Router::new()
            .route("/issue-certificate", post(Self::issue_certificate_handler))
            .route("/issue-batch", post(Self::issue_batch_handler))
            .route("/verify", get(Self::verify_handler))
            .route("/revoke-certificate", post(Self::revoke_certificate_handler))
            .route("/certificates/:id", get(Self::get_certificate_handler))
            .route("/verification-attempts", get(Self::verification_attempts_handler))
            .route("/health", get(Self::health_handler))
            .layer(CorsLayer::permissive())
            .with_state(Arc::new(self))
    }

    /// Binds `addr` and serves until `shutdown` resolves.
    pub async fn run(
        self,
        addr: SocketAddr,
        shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> std::io::Result<()> {
        let app = self.router();
        let listener = tokio::net::TcpListener::bind(addr).await?;
        log::info!("API server listening on http://{}", listener.local_addr()?);
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
    }

    fn actor(&self, headers: &HeaderMap) -> Result<Actor, CertificateError> {
        self.authenticator.actor_from_headers(headers)
    }

    // =====================
    // Issuance Handlers
    // =====================

    /// Issues a certificate for one holder
    ///
    /// # Endpoint
    /// POST /issue-certificate
    ///
    /// # Responses
    /// - 201 Created: The certificate and its verification URL
    /// - 409 Conflict: An active certificate exists (`existing` in the body)
    /// - 401 / 422 / 503: see [`CertificateError`]
    async fn issue_certificate_handler(
        State(state): State<Arc<ApiServer>>,
        headers: HeaderMap,
        Json(payload): Json<IssueRequest>,
    ) -> Result<impl IntoResponse, CertificateError> {
        let actor = state.actor(&headers)?;
        let certificate = state.issuer.issue(&actor, payload).await?;
        let verification_url = state.verifier.verification_url(&certificate.verification_code);
        Ok((
            StatusCode::CREATED,
            Json(IssueCertificateResponse {
                certificate,
                verification_url,
            }),
        ))
    }

    /// Issues certificates for every eligible participant of a batch
    ///
    /// # Endpoint
    /// POST /issue-batch
    ///
    /// # Responses
    /// - 200 OK: Summary with issued, skipped and failed participants
    async fn issue_batch_handler(
        State(state): State<Arc<ApiServer>>,
        headers: HeaderMap,
        Json(payload): Json<IssueBatchRequest>,
    ) -> Result<Json<BatchIssueSummary>, CertificateError> {
        let actor = state.actor(&headers)?;
        let summary = state
            .batch_issuer
            .issue_for_batch(&actor, &payload.batch_id)
            .await?;
        Ok(Json(summary))
    }

    // =====================
    // Verification Handlers
    // =====================

    /// Public verification
    ///
    /// # Endpoint
    /// GET /verify?code=...
    ///
    /// # Responses
    /// - 200 OK: `verified`, `revoked` or `notFound`
    /// - 503 Service Unavailable: the attempt could not be recorded
    async fn verify_handler(
        State(state): State<Arc<ApiServer>>,
        headers: HeaderMap,
        Query(query): Query<VerifyQuery>,
    ) -> Result<Json<VerificationResult>, CertificateError> {
        let result = state
            .verifier
            .verify(&query.code, verifier_context(&headers))
            .await?;
        Ok(Json(result))
    }

    /// Attempt log for a code
    ///
    /// # Endpoint
    /// GET /verification-attempts?code=...
    async fn verification_attempts_handler(
        State(state): State<Arc<ApiServer>>,
        headers: HeaderMap,
        Query(query): Query<VerifyQuery>,
    ) -> Result<Json<Vec<VerificationAttempt>>, CertificateError> {
        let actor = state.actor(&headers)?;
        let attempts = state.verifier.attempts_for_code(&actor, &query.code).await?;
        Ok(Json(attempts))
    }

    // =====================
    // Certificate Management Handlers
    // =====================

    /// Revokes a certificate
    ///
    /// # Endpoint
    /// POST /revoke-certificate
    ///
    /// # Responses
    /// - 200 OK: The revoked certificate
    /// - 404 Not Found / 409 Conflict (already revoked)
    async fn revoke_certificate_handler(
        State(state): State<Arc<ApiServer>>,
        headers: HeaderMap,
        Json(payload): Json<RevokeCertificateRequest>,
    ) -> Result<Json<Certificate>, CertificateError> {
        let actor = state.actor(&headers)?;
        let certificate = state
            .revoker
            .revoke(&actor, payload.certificate_id, &payload.reason)
            .await?;
        Ok(Json(certificate))
    }

    /// Full certificate record
    ///
    /// # Endpoint
    /// GET /certificates/:id
    async fn get_certificate_handler(
        State(state): State<Arc<ApiServer>>,
        headers: HeaderMap,
        Path(id): Path<Uuid>,
    ) -> Result<Json<Certificate>, CertificateError> {
        let actor = state.actor(&headers)?;
        Ok(Json(state.issuer.get_certificate(&actor, id).await?))
    }

    /// # Endpoint
    /// GET /health
    async fn health_handler(
        State(state): State<Arc<ApiServer>>,
    ) -> Result<Json<HealthResponse>, CertificateError> {
        let stats = state.store.stats().await?;
        Ok(Json(HealthResponse {
            status: "ok",
            store: stats,
        }))
    }
}

/// Describes the verifier from request headers.
fn verifier_context(headers: &HeaderMap) -> VerifierContext {
    let header_value = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    VerifierContext::new(
        header_value(header::ORIGIN).or_else(|| header_value(header::REFERER)),
        header_value(header::USER_AGENT),
    )
}
