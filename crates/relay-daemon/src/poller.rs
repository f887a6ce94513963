//! The attestation poller: advances `pending`/`polling` jobs toward
//! `attested` (or `failed`) by polling the upstream attestation API through
//! the process-wide rate limiter, then handing a successful result to the
//! message validator before persisting it.

use std::time::{Duration, Instant};

use chrono::Utc;
use futures::FutureExt;

use relay_attestation::{AttestationClient, PollResponse};
use relay_ratelimit::RateLimiter;
use relay_sql::{JobUpdate, RelayJob, Status, Store};

use crate::Shutdown;

/// Per-cycle batch size: the poller never advances more than this many
/// jobs in one pass, bounding per-cycle latency variance.
const BATCH_SIZE: i64 = 20;

/// How long the poller backs off, process-wide, after an upstream 429.
const THROTTLE_BACKOFF: Duration = Duration::from_secs(60);

pub struct PollerConfig {
    pub cycle_interval: Duration,
    pub attestation_timeout: chrono::Duration,
    pub local_domain: u32,
    pub router: alloy_primitives::Address,
}

enum JobOutcome {
    Continue,
    Throttled,
}

fn is_attestation_timed_out(age: chrono::Duration, timeout: chrono::Duration) -> bool {
    age > timeout
}

fn decode_hex_message(message: &str) -> anyhow::Result<Vec<u8>> {
    let trimmed = message.strip_prefix("0x").unwrap_or(message);
    Ok(hex::decode(trimmed)?)
}

/// Runs the poller loop until `shutdown` resolves. Returns `Ok(())` only on
/// a clean shutdown; any unexpected error from the store itself (as opposed
/// to a per-job failure, which is caught and logged) propagates up so
/// `main`'s `try_join!` treats it as a real crash.
pub async fn run(
    store: Store,
    attestation: AttestationClient,
    limiter: RateLimiter,
    config: PollerConfig,
    shutdown: Shutdown,
) -> anyhow::Result<()> {
    let mut throttled_until: Option<Instant> = None;

    loop {
        if shutdown.clone().now_or_never().is_some() {
            tracing::info!("poller loop shutting down");
            return Ok(());
        }

        if let Some(deadline) = throttled_until.take() {
            let now = Instant::now();
            if now < deadline {
                tokio::select! {
                    _ = tokio::time::sleep(deadline - now) => {}
                    _ = shutdown.clone() => {
                        tracing::info!("poller loop shutting down during throttle back-off");
                        return Ok(());
                    }
                }
            }
        }

        let jobs = store
            .list_by_status(&[Status::Pending, Status::Polling], BATCH_SIZE)
            .await?;

        for job in &jobs {
            match process_job(&store, &attestation, &limiter, &config, job).await {
                Ok(JobOutcome::Continue) => {}
                Ok(JobOutcome::Throttled) => {
                    tracing::warn!(
                        tx_hash = %job.tx_hash,
                        "attestation upstream throttled the poller; backing off 60s"
                    );
                    throttled_until = Some(Instant::now() + THROTTLE_BACKOFF);
                    break;
                }
                Err(err) => {
                    tracing::error!(
                        tx_hash = %job.tx_hash,
                        error = ?err,
                        "poller failed to process job this cycle"
                    );
                }
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(config.cycle_interval) => {}
            _ = shutdown.clone() => {
                tracing::info!("poller loop shutting down");
                return Ok(());
            }
        }
    }
}

async fn process_job(
    store: &Store,
    attestation: &AttestationClient,
    limiter: &RateLimiter,
    config: &PollerConfig,
    job: &RelayJob,
) -> anyhow::Result<JobOutcome> {
    let age = Utc::now() - job.created_at;
    if is_attestation_timed_out(age, config.attestation_timeout) {
        store
            .update(
                &job.tx_hash,
                JobUpdate::PollerFailed {
                    error_message: "attestation_timeout".to_string(),
                },
            )
            .await?;
        tracing::warn!(tx_hash = %job.tx_hash, "attestation timed out");
        return Ok(JobOutcome::Continue);
    }

    if job.status == Status::Pending {
        store.update(&job.tx_hash, JobUpdate::MarkPolling).await?;
    }

    limiter.acquire().await;

    let response = match attestation.poll(job.source_domain, &job.tx_hash).await {
        Ok(response) => response,
        Err(err) => {
            tracing::warn!(tx_hash = %job.tx_hash, error = ?err, "attestation request failed");
            store
                .update(&job.tx_hash, JobUpdate::PollAttemptNoResult)
                .await?;
            return Ok(JobOutcome::Continue);
        }
    };

    match response {
        PollResponse::NotFound => {
            tracing::debug!(tx_hash = %job.tx_hash, "attestation not yet indexed");
            store
                .update(&job.tx_hash, JobUpdate::PollAttemptNoResult)
                .await?;
            Ok(JobOutcome::Continue)
        }
        PollResponse::Throttled => Ok(JobOutcome::Throttled),
        PollResponse::Unavailable { status } => {
            tracing::warn!(tx_hash = %job.tx_hash, status, "attestation endpoint unavailable");
            store
                .update(&job.tx_hash, JobUpdate::PollAttemptNoResult)
                .await?;
            Ok(JobOutcome::Continue)
        }
        PollResponse::Pending => {
            tracing::debug!(tx_hash = %job.tx_hash, "attestation still pending");
            store
                .update(&job.tx_hash, JobUpdate::PollAttemptNoResult)
                .await?;
            Ok(JobOutcome::Continue)
        }
        PollResponse::Attested(result) => {
            let message_bytes = decode_hex_message(&result.message)?;
            match relay_validator::validate(&message_bytes, config.local_domain, config.router) {
                Ok(validated) => {
                    if validated.destination_caller_is_zero {
                        tracing::warn!(
                            tx_hash = %job.tx_hash,
                            "destinationCaller is zero; message is exposed to front-running"
                        );
                    }
                    store
                        .update(
                            &job.tx_hash,
                            JobUpdate::Attested {
                                attested_message: result.message,
                                attestation: result.attestation,
                                attestation_nonce: result.event_nonce,
                                mint_recipient: format!("{:#x}", validated.mint_recipient),
                                destination_domain: validated.destination_domain as i64,
                                amount: validated.amount,
                            },
                        )
                        .await?;
                    tracing::info!(tx_hash = %job.tx_hash, "attestation validated");
                }
                Err(err) => {
                    tracing::warn!(tx_hash = %job.tx_hash, error = %err, "validator rejected attestation");
                    store
                        .update(
                            &job.tx_hash,
                            JobUpdate::PollerFailed {
                                error_message: err.to_string(),
                            },
                        )
                        .await?;
                }
            }
            Ok(JobOutcome::Continue)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_boundary_is_strictly_greater_than() {
        let timeout = chrono::Duration::milliseconds(1_800_000);
        assert!(!is_attestation_timed_out(
            chrono::Duration::milliseconds(1_800_000),
            timeout
        ));
        assert!(is_attestation_timed_out(
            chrono::Duration::milliseconds(1_800_001),
            timeout
        ));
    }

    #[test]
    fn decode_hex_message_accepts_0x_prefix_or_bare_hex() {
        assert_eq!(decode_hex_message("0xdead").unwrap(), vec![0xde, 0xad]);
        assert_eq!(decode_hex_message("dead").unwrap(), vec![0xde, 0xad]);
    }
}
