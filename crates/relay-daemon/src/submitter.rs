//! The submitter: strictly sequential destination-side processing of
//! `attested` jobs: simulate, broadcast, await confirmation, classify the
//! outcome from event logs. Plus the startup restart-recovery sweep over
//! jobs left in `submitted` across a crash.

use std::time::Duration;

use alloy_primitives::{TxHash, U256};
use alloy_rpc_types_eth::TransactionReceipt;
use futures::FutureExt;

use relay_chain::{ChainClient, SubmissionOutcome};
use relay_sql::{JobUpdate, Outcome, RelayJob, Status, Store};

use crate::Shutdown;

pub struct SubmitterConfig {
    /// Sleep between iterations when there is no attested job to process.
    pub poll_interval: Duration,
    pub max_retries: u32,
    /// `relayFee` argument forwarded unmodified to `receiveAndForward`.
    pub relay_fee: U256,
    /// How long a freshly broadcast tx is awaited before the submitter
    /// moves on, leaving the job in `submitted` for the next restart's
    /// recovery sweep rather than looping here indefinitely.
    pub confirmation_wait: Duration,
    pub confirmation_poll_interval: Duration,
    /// Bound on how long the restart sweep itself waits for a still-pending
    /// destination transaction before concluding it was dropped.
    pub recovery_wait: Duration,
}

/// The floor between submitter iterations, regardless of outcome, so a
/// string of immediate transient failures cannot spin the loop.
const ITERATION_FLOOR: Duration = Duration::from_secs(1);

fn decode_hex(value: &str) -> anyhow::Result<Vec<u8>> {
    let trimmed = value.strip_prefix("0x").unwrap_or(value);
    Ok(hex::decode(trimmed)?)
}

/// Terminal-vs-transient decision for one submission failure, pure given
/// the job's current retry count so it can be unit tested without a chain
/// or a store.
fn classify_failure(retry_count: i64, max_retries: u32, reason: String) -> JobUpdate {
    if relay_chain::is_terminal_revert(&reason) {
        return JobUpdate::Failed {
            error_message: reason,
        };
    }
    if retry_count + 1 >= max_retries as i64 {
        JobUpdate::Failed {
            error_message: reason,
        }
    } else {
        JobUpdate::TransientRetry {
            error_message: reason,
        }
    }
}

pub async fn run(
    store: Store,
    chain: ChainClient,
    config: SubmitterConfig,
    shutdown: Shutdown,
) -> anyhow::Result<()> {
    recover(&store, &chain, &config).await?;

    loop {
        if shutdown.clone().now_or_never().is_some() {
            tracing::info!("submitter loop shutting down");
            return Ok(());
        }

        match store.oldest_by_status(Status::Attested).await? {
            None => {
                tokio::select! {
                    _ = tokio::time::sleep(config.poll_interval) => {}
                    _ = shutdown.clone() => {
                        tracing::info!("submitter loop shutting down");
                        return Ok(());
                    }
                }
                continue;
            }
            Some(job) => {
                if let Err(err) = process_attested_job(&store, &chain, &config, &job).await {
                    tracing::error!(tx_hash = %job.tx_hash, error = ?err, "submitter failed to process job");
                }
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(ITERATION_FLOOR) => {}
            _ = shutdown.clone() => {
                tracing::info!("submitter loop shutting down");
                return Ok(());
            }
        }
    }
}

async fn process_attested_job(
    store: &Store,
    chain: &ChainClient,
    config: &SubmitterConfig,
    job: &RelayJob,
) -> anyhow::Result<()> {
    let message = decode_hex(
        job.attested_message
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("attested job {} has no attested_message", job.tx_hash))?,
    )?;
    let attestation = decode_hex(
        job.attestation
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("attested job {} has no attestation", job.tx_hash))?,
    )?;

    if let Err(err) = chain.simulate(&message, &attestation, config.relay_fee).await {
        tracing::warn!(tx_hash = %job.tx_hash, error = %err, "dry-run simulation reverted");
        let update = classify_failure(job.retry_count, config.max_retries, err.to_string());
        store.update(&job.tx_hash, update).await?;
        return Ok(());
    }

    let dest_tx_hash = match chain.broadcast(&message, &attestation, config.relay_fee).await {
        Ok(hash) => hash,
        Err(err) => {
            tracing::warn!(tx_hash = %job.tx_hash, error = %err, "broadcast failed");
            let update = classify_failure(job.retry_count, config.max_retries, err.to_string());
            store.update(&job.tx_hash, update).await?;
            return Ok(());
        }
    };

    // Persisted before awaiting confirmation: a crash here is recoverable
    // via the restart sweep, never via a duplicate broadcast.
    store
        .update(
            &job.tx_hash,
            JobUpdate::Submitted {
                dest_tx_hash: format!("{dest_tx_hash:#x}"),
            },
        )
        .await?;
    tracing::info!(tx_hash = %job.tx_hash, dest_tx_hash = %format!("{dest_tx_hash:#x}"), "broadcast destination transaction");

    await_and_finalize(store, chain, job, dest_tx_hash, config).await
}

async fn await_and_finalize(
    store: &Store,
    chain: &ChainClient,
    job: &RelayJob,
    tx_hash: TxHash,
    config: &SubmitterConfig,
) -> anyhow::Result<()> {
    match chain
        .wait_for_receipt(tx_hash, config.confirmation_wait, config.confirmation_poll_interval)
        .await
    {
        Ok(Some(receipt)) => finalize_receipt(store, job, receipt, config.max_retries).await,
        Ok(None) => {
            tracing::warn!(
                tx_hash = %job.tx_hash,
                "destination transaction not confirmed within the wait window; left in `submitted`"
            );
            Ok(())
        }
        Err(err) => {
            tracing::error!(tx_hash = %job.tx_hash, error = ?err, "failed to fetch destination receipt");
            Ok(())
        }
    }
}

async fn finalize_receipt(
    store: &Store,
    job: &RelayJob,
    receipt: TransactionReceipt,
    max_retries: u32,
) -> anyhow::Result<()> {
    if !receipt.inner.status() {
        tracing::warn!(tx_hash = %job.tx_hash, "destination transaction reverted on-chain");
        let update = classify_failure(
            job.retry_count,
            max_retries,
            "destination transaction reverted".to_string(),
        );
        store.update(&job.tx_hash, update).await?;
        return Ok(());
    }

    let topics0: Vec<_> = receipt
        .inner
        .logs()
        .iter()
        .filter_map(|log| log.topics().first().copied())
        .collect();
    let classification = relay_chain::classify_topics(topics0.iter());

    if classification.recovered_from_consumed_nonce {
        tracing::warn!(tx_hash = %job.tx_hash, "destination recovered from a consumed nonce");
    }

    let outcome = match classification.outcome {
        Some(SubmissionOutcome::Forwarded) => Outcome::Forwarded,
        Some(SubmissionOutcome::Fallback) => Outcome::Fallback,
        Some(SubmissionOutcome::OperatorRouted) => {
            tracing::warn!(tx_hash = %job.tx_hash, "confirmed with operator-routed outcome");
            Outcome::OperatorRouted
        }
        None => {
            // A successful receipt that carries none of the three known
            // events is not representable by the `outcome` column's
            // `confirmed`-only invariant; treat it as a terminal failure
            // rather than inventing an outcome value. See DESIGN.md.
            tracing::error!(
                tx_hash = %job.tx_hash,
                "destination transaction succeeded but emitted no recognized outcome event"
            );
            store
                .update(
                    &job.tx_hash,
                    JobUpdate::Failed {
                        error_message: "no recognized outcome event in receipt logs".to_string(),
                    },
                )
                .await?;
            return Ok(());
        }
    };

    let dest_block_number = receipt.block_number.unwrap_or_default() as i64;
    store
        .update(
            &job.tx_hash,
            JobUpdate::Confirmed {
                outcome,
                dest_block_number,
            },
        )
        .await?;
    tracing::info!(tx_hash = %job.tx_hash, %outcome, "destination transaction confirmed");
    Ok(())
}

/// Rescues every job left in `submitted` across a crash: looks up the
/// destination receipt by hash, finalizes it if mined, keeps waiting if
/// still pending, or requeues as `attested` if the transaction appears to
/// have been dropped from the mempool.
pub async fn recover(
    store: &Store,
    chain: &ChainClient,
    config: &SubmitterConfig,
) -> anyhow::Result<()> {
    let submitted = store.list_by_status(&[Status::Submitted], i64::MAX).await?;
    if !submitted.is_empty() {
        tracing::info!(count = submitted.len(), "restart recovery sweep starting");
    }

    for job in submitted {
        if let Err(err) = recover_job(store, chain, config, &job).await {
            tracing::error!(tx_hash = %job.tx_hash, error = ?err, "restart recovery failed for job");
        }
    }
    Ok(())
}

async fn recover_job(
    store: &Store,
    chain: &ChainClient,
    config: &SubmitterConfig,
    job: &RelayJob,
) -> anyhow::Result<()> {
    let Some(dest_tx_hash) = job.dest_tx_hash.as_deref() else {
        tracing::error!(tx_hash = %job.tx_hash, "submitted job has no destTxHash; cannot recover");
        return Ok(());
    };
    let tx_hash: TxHash = dest_tx_hash
        .parse()
        .map_err(|err| anyhow::anyhow!("stored destTxHash is not a valid hash: {err}"))?;

    if let Some(receipt) = chain.get_receipt(tx_hash).await? {
        tracing::info!(tx_hash = %job.tx_hash, "restart recovery found a mined destination receipt");
        return finalize_receipt(store, job, receipt, config.max_retries).await;
    }

    match chain
        .wait_for_receipt(tx_hash, config.recovery_wait, config.confirmation_poll_interval)
        .await?
    {
        Some(receipt) => finalize_receipt(store, job, receipt, config.max_retries).await,
        None => {
            tracing::warn!(
                tx_hash = %job.tx_hash,
                "destination transaction appears dropped; requeuing as attested"
            );
            store
                .update(
                    &job.tx_hash,
                    JobUpdate::TransientRetry {
                        error_message: "restart recovery: destination transaction not found, requeued"
                            .to_string(),
                    },
                )
                .await?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_revert_fails_regardless_of_retry_budget() {
        let update = classify_failure(0, 3, "transfer settled".to_string());
        assert!(matches!(update, JobUpdate::Failed { .. }));
    }

    #[test]
    fn transient_failure_retries_until_budget_exhausted() {
        let update = classify_failure(0, 3, "timeout talking to node".to_string());
        assert!(matches!(update, JobUpdate::TransientRetry { .. }));

        let update = classify_failure(1, 3, "timeout talking to node".to_string());
        assert!(matches!(update, JobUpdate::TransientRetry { .. }));

        // retry_count = max_retries - 1: the NEXT failure exhausts the budget.
        let update = classify_failure(2, 3, "timeout talking to node".to_string());
        assert!(matches!(update, JobUpdate::Failed { .. }));
    }

    #[test]
    fn decode_hex_strips_0x_prefix() {
        assert_eq!(decode_hex("0xdead").unwrap(), vec![0xde, 0xad]);
        assert_eq!(decode_hex("dead").unwrap(), vec![0xde, 0xad]);
    }
}
