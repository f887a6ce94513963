//! The intake API: three endpoints, a uniform error body, permissive CORS,
//! and a coarse per-IP throttle; nothing in this module ever blocks on the
//! poller or the submitter, only on the store.

mod error;
mod middleware;

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use relay_sql::{NewJob, Outcome, Status, StatusCounts, Store};

pub use error::ApiError;
pub use middleware::{
    new_ip_limiter, IpLimiter, DEFAULT_PER_IP_BURST, DEFAULT_PER_IP_REFILL_PER_SEC,
};

/// Domains CCTP recognizes as burn sources for this deployment, excluding
/// the destination's own domain (`0`). See DESIGN.md for why this list is
/// a concrete decision rather than a literal spec value: the source spec
/// leaves the allow-list's membership to the implementer.
const RECOGNIZED_SOURCE_DOMAINS: &[i64] = &[1, 2, 3, 6, 7, 10];

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
}

pub fn build_router(state: AppState, ip_limiter: Arc<middleware::IpLimiter>) -> Router {
    Router::new()
        .route("/relay", post(submit_job))
        .route("/relay/{tx_hash}", get(query_job))
        .route("/health", get(health))
        .layer(axum::middleware::from_fn_with_state(
            ip_limiter,
            middleware::per_ip_rate_limit,
        ))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitJobRequest {
    source_domain: i64,
    tx_hash: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitJobResponse {
    tx_hash: String,
    status: Status,
    message: String,
}

fn is_well_formed_tx_hash(tx_hash: &str) -> bool {
    match tx_hash.strip_prefix("0x") {
        Some(bytes) => bytes.len() == 64 && bytes.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

async fn submit_job(
    State(state): State<AppState>,
    Json(body): Json<SubmitJobRequest>,
) -> Result<(StatusCode, Json<SubmitJobResponse>), ApiError> {
    if !RECOGNIZED_SOURCE_DOMAINS.contains(&body.source_domain) {
        return Err(ApiError::bad_request(format!(
            "unrecognized sourceDomain {}",
            body.source_domain
        )));
    }
    if !is_well_formed_tx_hash(&body.tx_hash) {
        return Err(ApiError::bad_request(
            "txHash must match ^0x[a-fA-F0-9]{64}$",
        ));
    }

    let tx_hash = body.tx_hash.to_lowercase();

    if let Some(existing) = state.store.try_get(&tx_hash).await? {
        return Ok((
            StatusCode::OK,
            Json(SubmitJobResponse {
                tx_hash: existing.tx_hash,
                status: existing.status,
                message: "job already exists".to_string(),
            }),
        ));
    }

    match state
        .store
        .create(NewJob {
            tx_hash: tx_hash.clone(),
            source_domain: body.source_domain,
        })
        .await
    {
        Ok(job) => Ok((
            StatusCode::CREATED,
            Json(SubmitJobResponse {
                tx_hash: job.tx_hash,
                status: job.status,
                message: "job created".to_string(),
            }),
        )),
        Err(relay_sql::StoreError::Conflict(_)) => {
            // Lost the race between `try_get` and `create`; the row now
            // exists, so this is still idempotent success.
            let existing = state.store.get(&tx_hash).await?;
            Ok((
                StatusCode::OK,
                Json(SubmitJobResponse {
                    tx_hash: existing.tx_hash,
                    status: existing.status,
                    message: "job already exists".to_string(),
                }),
            ))
        }
        Err(other) => Err(other.into()),
    }
}

/// The narrow projection `GET /relay/{txHash}` returns. Deliberately omits
/// the attested payload, decoded fields, and operational counters; see
/// §4.2's requirement that those never leak to a client.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JobView {
    tx_hash: String,
    source_domain: i64,
    status: Status,
    outcome: Option<Outcome>,
    error: Option<String>,
    dest_tx_hash: Option<String>,
    created_at: DateTime<Utc>,
    attested_at: Option<DateTime<Utc>>,
    submitted_at: Option<DateTime<Utc>>,
    confirmed_at: Option<DateTime<Utc>>,
}

impl From<relay_sql::RelayJob> for JobView {
    fn from(job: relay_sql::RelayJob) -> Self {
        Self {
            tx_hash: job.tx_hash,
            source_domain: job.source_domain,
            status: job.status,
            outcome: job.outcome,
            error: job.error_message,
            dest_tx_hash: job.dest_tx_hash,
            created_at: job.created_at,
            attested_at: job.attested_at,
            submitted_at: job.submitted_at,
            confirmed_at: job.confirmed_at,
        }
    }
}

async fn query_job(
    State(state): State<AppState>,
    Path(tx_hash): Path<String>,
) -> Result<Json<JobView>, ApiError> {
    let job = state.store.get(&tx_hash.to_lowercase()).await?;
    Ok(Json(job.into()))
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    jobs: StatusCounts,
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    match tokio::time::timeout(std::time::Duration::from_secs(2), state.store.ping()).await {
        Ok(Ok(())) => match state.store.count_by_status().await {
            Ok(jobs) => (
                StatusCode::OK,
                Json(HealthResponse {
                    status: "healthy",
                    jobs,
                }),
            ),
            Err(err) => {
                tracing::error!(error = ?err, "health check failed to count jobs");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(HealthResponse {
                        status: "unhealthy",
                        jobs: StatusCounts::default(),
                    }),
                )
            }
        },
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(HealthResponse {
                status: "unhealthy",
                jobs: StatusCounts::default(),
            }),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tx_hash_shape_is_enforced() {
        assert!(is_well_formed_tx_hash(
            "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"
        ));
        // the 0x prefix is required, not optional: a bare hex string of the
        // right length is rejected, otherwise it would be stored verbatim
        // and a later `GET /relay/0x...` would 404 against it.
        assert!(!is_well_formed_tx_hash(
            "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"
        ));
        assert!(!is_well_formed_tx_hash("0xdead"));
        assert!(!is_well_formed_tx_hash(
            "0xzzzzaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"
        ));
    }
}
