use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status is the relay job's position in the permitted transition graph:
///
/// ```text
/// pending -> polling -> attested -> submitted -> confirmed
///    \          \           \            \
///     `----------`-----------`------------`--> failed
/// ```
///
/// `confirmed` and `failed` are terminal. `attested` is the one state a job
/// may re-enter, when the submitter classifies a failure as transient and
/// there is retry budget remaining (see the submitter's retry policy).
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    Polling,
    Attested,
    Submitted,
    Confirmed,
    Failed,
}

impl Status {
    /// Whether `self` is one of the two sink states, after which no component
    /// will ever mutate the job again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Confirmed | Status::Failed)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Status::Pending => "pending",
            Status::Polling => "polling",
            Status::Attested => "attested",
            Status::Submitted => "submitted",
            Status::Confirmed => "confirmed",
            Status::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Outcome classifies a `confirmed` job by which destination-contract event
/// its submission receipt carried. Set iff `status = confirmed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Forwarded,
    Fallback,
    OperatorRouted,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Outcome::Forwarded => "forwarded",
            Outcome::Fallback => "fallback",
            Outcome::OperatorRouted => "operator_routed",
        };
        f.write_str(s)
    }
}

/// RelayJob is the full persisted row for one burn-and-mint transfer. It is
/// the server-internal shape; the intake API's query endpoint exposes a
/// narrower projection of it (see `relay-daemon::api::query_job`), never
/// this struct directly, so that attested payloads and operational counters
/// never leak to a client.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize)]
pub struct RelayJob {
    pub tx_hash: String,
    pub source_domain: i64,
    pub status: Status,

    pub attested_message: Option<String>,
    pub attestation: Option<String>,
    pub attestation_nonce: Option<String>,

    pub mint_recipient: Option<String>,
    pub destination_domain: Option<i64>,
    pub amount: Option<String>,

    pub dest_tx_hash: Option<String>,
    pub dest_block_number: Option<i64>,
    pub outcome: Option<Outcome>,

    pub error_message: Option<String>,
    pub poll_attempts: i64,
    pub retry_count: i64,

    pub created_at: DateTime<Utc>,
    pub attested_at: Option<DateTime<Utc>>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// NewJob is what intake supplies to `Store::create`. Every field the store
/// doesn't receive here starts out null/zero per the intake contract.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub tx_hash: String,
    pub source_domain: i64,
}

/// JobUpdate is a per-transition update variant. Each constructor corresponds
/// to exactly one edge in the status graph and carries only the fields that
/// transition sets, so a caller cannot accidentally clear a field that
/// transition doesn't own. `updated_at` is stamped by the store itself, never
/// by the caller.
#[derive(Debug, Clone)]
pub enum JobUpdate {
    /// `pending -> polling`, persisted before the upstream call is issued.
    MarkPolling,
    /// A poll attempt happened but produced nothing new yet.
    PollAttemptNoResult,
    /// `pending|polling -> attested`.
    Attested {
        attested_message: String,
        attestation: String,
        attestation_nonce: String,
        mint_recipient: String,
        destination_domain: i64,
        amount: String,
    },
    /// `attested -> submitted`, persisted before awaiting confirmation.
    Submitted { dest_tx_hash: String },
    /// `submitted -> confirmed`.
    Confirmed {
        outcome: Outcome,
        dest_block_number: i64,
    },
    /// `pending|polling -> failed`: a submission-side terminal failure,
    /// counted against `retry_count` per §3 (the submitter's retry budget).
    Failed { error_message: String },
    /// `pending|polling -> failed`: attestation timeout or validator
    /// rejection. Unlike [`JobUpdate::Failed`], leaves `retry_count`
    /// untouched — that counter belongs to the submitter's retry policy,
    /// not to the poller, which never retries a job it fails.
    PollerFailed { error_message: String },
    /// `attested -> attested`: a transient submission failure with retry
    /// budget remaining.
    TransientRetry { error_message: String },
}

/// StatusCounts backs the `/health` endpoint's per-status counters.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StatusCounts {
    pub pending: i64,
    pub polling: i64,
    pub attested: i64,
    pub submitted: i64,
    pub confirmed: i64,
    pub failed: i64,
}
