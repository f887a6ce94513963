//! `relayd`: the off-chain cross-chain relay orchestrator. Three cooperative
//! tasks (the intake API, the attestation poller, the submitter) share
//! nothing but the job store and a shutdown signal.

mod api;
mod config;
mod poller;
mod submitter;

use std::net::SocketAddr;

use anyhow::Context;
use clap::Parser;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;

use relay_attestation::AttestationClient;
use relay_chain::ChainClient;
use relay_ratelimit::RateLimiter;
use relay_sql::Store;

use config::Args;

/// The destination domain identifier used throughout this deployment
/// (`0` in the external CCTP-style protocol this orchestrator was built
/// against); see the validator's `local_domain` parameter.
const LOCAL_DOMAIN: u32 = 0;

/// A single shutdown signal, cloned into every loop. Satisfied by ctrl-c
/// (or a caught termination signal); each loop observes it at the top of
/// every iteration and during any otherwise-blocking wait.
pub type Shutdown = Shared<BoxFuture<'static, ()>>;

fn main() -> anyhow::Result<()> {
    // Several dependencies (reqwest, alloy's HTTP transport) pull in
    // rustls; without an explicit default provider, the first TLS
    // handshake panics if more than one provider is compiled in.
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .expect("failed to install default rustls crypto provider");

    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_ansi(!matches!(std::env::var("NO_COLOR"), Ok(v) if v == "1"))
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("setting tracing default subscriber failed");

    let args = Args::parse();
    tracing::info!(?args, "relayd starting");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let result = runtime.block_on(async_main(args));

    tracing::info!(?result, "relayd shutting down");
    runtime.shutdown_timeout(std::time::Duration::from_secs(5));
    result
}

async fn async_main(args: Args) -> anyhow::Result<()> {
    // Bind the API port before doing anything else, so a supervisor that
    // probes the port immediately after spawning this process never races
    // startup.
    let listener = tokio::net::TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], args.api_port)))
        .await
        .context("failed to bind API port")?;

    let store = Store::connect(&args.db_path)
        .await
        .context("failed to open job store")?;

    let private_key = args
        .private_key_bytes()
        .context("failed to decode RELAYER_PRIVATE_KEY")?;

    let chain = ChainClient::connect(&args.ethereum_rpc_url, &private_key, args.router_address)
        .context("failed to construct destination chain client")?;

    if chain.signer_address() != args.transmitter_address {
        anyhow::bail!(
            "TRANSMITTER_ADDRESS {:#x} does not match the address derived from RELAYER_PRIVATE_KEY ({:#x})",
            args.transmitter_address,
            chain.signer_address()
        );
    }

    let attestation = AttestationClient::new(args.is_testnet);
    let limiter = RateLimiter::default_margin();

    let shutdown: Shutdown = tokio::signal::ctrl_c().map(|_| ()).boxed().shared();

    let api_state = api::AppState {
        store: store.clone(),
    };
    let ip_limiter = api::new_ip_limiter(
        api::DEFAULT_PER_IP_BURST,
        api::DEFAULT_PER_IP_REFILL_PER_SEC,
    );
    let router = api::build_router(api_state, ip_limiter);
    let api_server = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown.clone());
    let api_fut = async move { anyhow::Result::Ok(api_server.await?) };

    let poller_config = poller::PollerConfig {
        cycle_interval: args.poll_cycle_interval(),
        attestation_timeout: args.attestation_timeout(),
        local_domain: LOCAL_DOMAIN,
        router: args.router_address,
    };
    let poller_fut = poller::run(
        store.clone(),
        attestation.clone(),
        limiter.clone(),
        poller_config,
        shutdown.clone(),
    );

    let submitter_config = submitter::SubmitterConfig {
        poll_interval: args.submitter_poll_interval(),
        max_retries: args.max_retries,
        relay_fee: args.relay_fee,
        confirmation_wait: std::time::Duration::from_secs(120),
        confirmation_poll_interval: std::time::Duration::from_secs(3),
        recovery_wait: std::time::Duration::from_secs(60),
    };
    let submitter_fut = submitter::run(store.clone(), chain, submitter_config, shutdown.clone());

    let ((), (), ()) = tokio::try_join!(api_fut, poller_fut, submitter_fut)?;
    Ok(())
}
