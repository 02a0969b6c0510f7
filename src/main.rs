//! Process entry point: bootstrap the database connection, report readiness,
//! wait for shutdown.
//!
//! Exit codes are distinct per failure family so the hosting platform can
//! tell configuration mistakes from transient infrastructure failures:
//! 78 config, 66 credential, 69 fatal connection failure, 75 retries
//! exhausted or deadline exceeded, 0 graceful shutdown after ready.

use cloudsql_bootstrap::{
    Bootstrapper, ChannelConnector, ConnectionConfig, Credential, Error, RetryPolicy,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Overall deadline for the startup bootstrap; serverless platforms stop
/// routing to containers that take longer than this to become ready anyway
const BOOTSTRAP_DEADLINE: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(err) = run().await {
        error!(error = %err, "startup failed");
        std::process::exit(err.exit_code());
    }
}

async fn run() -> Result<(), Error> {
    let config = ConnectionConfig::from_env()?;
    info!(
        instance = %config.instance,
        database = %config.database,
        user = %config.user,
        "configuration loaded"
    );

    let credential = Arc::new(Credential::resolve(config.credential_path())?);
    info!(service_account = %credential.client_email(), "credential resolved");

    let bootstrapper = Bootstrapper::new(ChannelConnector::new(&config, credential))
        .with_policy(RetryPolicy::default())
        .with_deadline(BOOTSTRAP_DEADLINE);
    let health = bootstrapper.health_signal();

    let handle = bootstrapper.connect().await?;
    info!(
        ready = health.is_ready(),
        server_version = handle.server_version().unwrap_or("unknown"),
        listen_port = config.listen_port,
        "database connection established"
    );

    // The application layer takes over from here; this binary just holds the
    // connection until the platform asks it to stop
    wait_for_shutdown().await?;

    info!("shutting down");
    if let Err(err) = handle.close().await {
        // The session may already be gone; shutdown stays graceful
        tracing::debug!(error = %err, "error closing connection during shutdown");
    }
    Ok(())
}

/// Wait for SIGINT or SIGTERM (the platform sends SIGTERM before stopping a
/// container)
async fn wait_for_shutdown() -> Result<(), Error> {
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = sigterm.recv() => {}
    }
    Ok(())
}
