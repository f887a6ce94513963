//! Process configuration: one typed struct, parsed once at startup from
//! environment variables (with CLI flag overrides for convenience), built
//! and validated before any of the three loops starts.

use alloy_primitives::{Address, U256};
use clap::Parser;

/// All recognized configuration. Every field states its own name, default,
/// and required/optional status via `clap`'s env integration, so there is
/// exactly one place that documents the configuration surface.
#[derive(Parser)]
#[clap(author, version, about = "Off-chain cross-chain relay orchestrator", long_about = None)]
pub struct Args {
    /// Selects the upstream attestation API's base URL (testnet vs mainnet).
    #[clap(long, env = "IS_TESTNET", default_value = "false")]
    pub is_testnet: bool,

    /// Address of the destination router contract this process submits to.
    #[clap(long, env = "ROUTER_ADDRESS")]
    pub router_address: Address,

    /// JSON-RPC HTTP endpoint of the destination chain.
    #[clap(long, env = "ETHEREUM_RPC_URL")]
    pub ethereum_rpc_url: url::Url,

    /// Hex-encoded signing key used to broadcast destination transactions.
    /// Never logged, even at debug level; see [`Args`]'s `Debug` impl.
    #[clap(long, env = "RELAYER_PRIVATE_KEY")]
    pub relayer_private_key: String,

    /// Expected address of the relayer signing key, checked against the
    /// key-derived address at startup as a configuration sanity check.
    #[clap(long, env = "TRANSMITTER_ADDRESS")]
    pub transmitter_address: Address,

    /// Port the intake API listens on.
    #[clap(long, env = "API_PORT", default_value = "3000")]
    pub api_port: u16,

    /// Sleep between attestation-poller cycles.
    #[clap(long, env = "POLL_CYCLE_INTERVAL_MS", default_value = "2000")]
    pub poll_cycle_interval_ms: u64,

    /// A job older than this (by `createdAt`) with no attestation yet is
    /// transitioned to `failed` with reason `attestation_timeout`.
    #[clap(long, env = "ATTESTATION_TIMEOUT_MS", default_value = "1800000")]
    pub attestation_timeout_ms: i64,

    /// Transient submission failures are retried up to this many times
    /// before the job is marked `failed`.
    #[clap(long, env = "MAX_RETRIES", default_value = "3")]
    pub max_retries: u32,

    /// Sleep between submitter iterations when there is no attested job to
    /// process (and the floor between every iteration regardless).
    #[clap(long, env = "SUBMITTER_POLL_INTERVAL_MS", default_value = "2000")]
    pub submitter_poll_interval_ms: u64,

    /// The `relayFee` argument passed, unmodified, to `receiveAndForward`.
    #[clap(long, env = "RELAY_FEE", default_value = "0")]
    pub relay_fee: U256,

    /// Path to the SQLite database file.
    #[clap(long, env = "DB_PATH", default_value = "./data/relay.db")]
    pub db_path: String,
}

impl std::fmt::Debug for Args {
    /// Mirrors every field except the raw private key, which is replaced
    /// with a fixed redaction marker so it can never end up in a log line
    /// via `tracing::info!(?args, ...)`.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Args")
            .field("is_testnet", &self.is_testnet)
            .field("router_address", &self.router_address)
            .field("ethereum_rpc_url", &self.ethereum_rpc_url)
            .field("relayer_private_key", &"<redacted>")
            .field("transmitter_address", &self.transmitter_address)
            .field("api_port", &self.api_port)
            .field("poll_cycle_interval_ms", &self.poll_cycle_interval_ms)
            .field("attestation_timeout_ms", &self.attestation_timeout_ms)
            .field("max_retries", &self.max_retries)
            .field(
                "submitter_poll_interval_ms",
                &self.submitter_poll_interval_ms,
            )
            .field("relay_fee", &self.relay_fee)
            .field("db_path", &self.db_path)
            .finish()
    }
}

impl Args {
    /// Decodes `relayer_private_key` into the raw 32 bytes a signer needs,
    /// accepting either an 0x-prefixed or bare hex string.
    pub fn private_key_bytes(&self) -> anyhow::Result<[u8; 32]> {
        let trimmed = self.relayer_private_key.trim_start_matches("0x");
        let bytes = hex::decode(trimmed)
            .map_err(|err| anyhow::anyhow!("RELAYER_PRIVATE_KEY is not valid hex: {err}"))?;
        bytes
            .try_into()
            .map_err(|_| anyhow::anyhow!("RELAYER_PRIVATE_KEY must decode to exactly 32 bytes"))
    }

    pub fn poll_cycle_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_cycle_interval_ms)
    }

    pub fn submitter_poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.submitter_poll_interval_ms)
    }

    pub fn attestation_timeout(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.attestation_timeout_ms)
    }
}
