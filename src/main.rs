//! mailhog-operator binary.
//!
//! Runs the MailhogInstance controller on the replica holding the
//! `mailhog-operator-leader` Lease. The health server starts first so probes
//! answer while a replica waits on standby.
//!
//! `mailhog-operator --print-crd` prints the CustomResourceDefinition and exits.

use std::sync::Arc;
use std::time::Duration;

use kube::{Client, CustomResourceExt};
use tokio::signal;
use tracing::{error, info, warn};

use mailhog_operator::OperatorConfig;
use mailhog_operator::crd::MailhogInstance;
use mailhog_operator::health::{HealthState, run_health_server};
use mailhog_operator::leader::LeaderLease;
use mailhog_operator::run_controller;

const LEASE_NAME: &str = "mailhog-operator-leader";
const LEASE_DURATION: Duration = Duration::from_secs(15);
const LEASE_RENEW_INTERVAL: Duration = Duration::from_secs(5);

/// Time given to in-flight passes before the process exits.
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::args().skip(1).any(|arg| arg == "--print-crd") {
        print!("{}", serde_yaml::to_string(&MailhogInstance::crd())?);
        return Ok(());
    }

    init_tracing()?;

    let config = OperatorConfig::from_env();
    info!(
        watch_namespace = ?config.watch_namespace,
        requeue_interval_secs = config.requeue_interval.as_secs(),
        health_port = config.health_port,
        "Starting mailhog-operator"
    );

    let client = Client::try_default().await?;
    let health_state = Arc::new(HealthState::new());

    let health_handle = {
        let health_state = health_state.clone();
        let port = config.health_port;
        tokio::spawn(async move {
            if let Err(e) = run_health_server(health_state, port).await {
                error!("Health server error: {}", e);
            }
        })
    };

    let lease = Arc::new(leader_lease(client.clone(), &config));
    acquire_leadership(&lease).await;
    let mut renewal_handle = tokio::spawn(keep_leadership(lease.clone()));

    let controller_handle = {
        let health_state = health_state.clone();
        tokio::spawn(run_controller(client, config, Some(health_state)))
    };

    tokio::select! {
        result = controller_handle => {
            if let Err(e) = result {
                error!("Controller task panicked: {}", e);
            }
        }
        result = health_handle => {
            if let Err(e) = result {
                error!("Health server task panicked: {}", e);
            }
        }
        // Renewal only returns by panicking; losing the lease exits the process.
        Err(e) = &mut renewal_handle => {
            error!("Lease renewal task panicked: {}", e);
        }
        _ = shutdown_signal() => {
            info!("Received shutdown signal");
            health_state.set_ready(false).await;
            tokio::time::sleep(SHUTDOWN_GRACE_PERIOD).await;
            renewal_handle.abort();
            if let Err(e) = lease.release().await {
                warn!(error = %e, "Failed to release lease");
            }
        }
    }

    info!("Operator stopped");
    Ok(())
}

fn init_tracing() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mailhog_operator=info".parse()?)
                .add_directive("kube=info".parse()?),
        )
        .json()
        .init();
    Ok(())
}

/// Lease for this replica, identified by its pod name.
fn leader_lease(client: Client, config: &OperatorConfig) -> LeaderLease {
    let holder = config.pod_name.clone().unwrap_or_else(|| {
        warn!("POD_NAME not set, using hostname");
        hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string())
    });
    let namespace = config.pod_namespace.clone().unwrap_or_else(|| {
        warn!("POD_NAMESPACE not set, using 'default'");
        "default".to_string()
    });
    info!(
        holder = %holder,
        namespace = %namespace,
        lease = LEASE_NAME,
        "Joining leader election"
    );
    LeaderLease::new(client, &namespace, LEASE_NAME, holder, LEASE_DURATION)
}

async fn acquire_leadership(lease: &LeaderLease) {
    loop {
        match lease.try_acquire_or_renew().await {
            Ok(true) => return,
            Ok(false) => info!("Another replica is leader, standing by"),
            Err(e) => warn!(error = %e, "Failed to acquire lease, retrying"),
        }
        tokio::time::sleep(LEASE_RENEW_INTERVAL).await;
    }
}

/// Renew until the lease is lost, then exit so Kubernetes restarts the pod
/// into a fresh election.
#[allow(clippy::exit)]
async fn keep_leadership(lease: Arc<LeaderLease>) {
    loop {
        tokio::time::sleep(LEASE_RENEW_INTERVAL).await;
        match lease.try_acquire_or_renew().await {
            Ok(true) => {}
            Ok(false) => {
                error!(holder = %lease.holder(), "Lost leadership, exiting");
                std::process::exit(1);
            }
            Err(e) => {
                error!(error = %e, "Failed to renew lease, exiting");
                std::process::exit(1);
            }
        }
    }
}

/// Wait for SIGTERM or SIGINT.
///
/// Signal handler setup failures are fatal.
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
