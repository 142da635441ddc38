//! Gateway server

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::router::{AppState, create_api_router, create_intake_router};
use crate::config::Config;
use crate::{Error, Result};

/// AF gateway server: operator API and notification intake listeners
pub struct Gateway {
    /// Configuration
    config: Config,
    /// Shared state
    state: Arc<AppState>,
    /// Cancelled to begin shutdown
    shutdown: CancellationToken,
}

impl Gateway {
    /// Create a new gateway
    pub fn new(config: Config) -> Result<Self> {
        let state = Arc::new(AppState::new(&config)?);
        Ok(Self {
            config,
            state,
            shutdown: CancellationToken::new(),
        })
    }

    /// Shared state
    #[must_use]
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Token that stops the gateway when cancelled
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Bind the configured addresses and run until a shutdown signal
    pub async fn run(self) -> Result<()> {
        let api_addr = socket_addr(&self.config.server.host, self.config.server.port)?;
        let intake_addr = socket_addr(
            &self.config.notifications.host,
            self.config.notifications.port,
        )?;

        let api_listener = TcpListener::bind(api_addr)
            .await
            .map_err(|e| Error::Config(format!("Failed to bind API listener {api_addr}: {e}")))?;
        let intake_listener = TcpListener::bind(intake_addr)
            .await
            .map_err(|e| Error::Config(format!("Failed to bind intake listener {intake_addr}: {e}")))?;

        tokio::spawn(shutdown_signal(self.shutdown.clone()));
        self.serve(api_listener, intake_listener).await
    }

    /// Serve on already bound listeners until the shutdown token is cancelled
    pub async fn serve(self, api_listener: TcpListener, intake_listener: TcpListener) -> Result<()> {
        info!(
            api = %api_listener.local_addr()?,
            intake = %intake_listener.local_addr()?,
            af_id = %self.state.af_id,
            nef = %self.state.nef.base_url(),
            pcf = %self.state.pcf.base_url(),
            "AF gateway listening"
        );

        let api = axum::serve(api_listener, create_api_router(Arc::clone(&self.state)))
            .with_graceful_shutdown(self.shutdown.clone().cancelled_owned());
        let intake = axum::serve(intake_listener, create_intake_router(Arc::clone(&self.state)))
            .with_graceful_shutdown(self.shutdown.clone().cancelled_owned());

        let servers = async move { tokio::try_join!(api.into_future(), intake.into_future()) };
        tokio::pin!(servers);

        tokio::select! {
            result = &mut servers => {
                result?;
            }
            () = self.shutdown.cancelled() => {
                info!(timeout = ?self.config.server.shutdown_timeout, "Draining in-flight requests");
                match tokio::time::timeout(self.config.server.shutdown_timeout, &mut servers).await {
                    Ok(result) => {
                        result?;
                    }
                    Err(_) => warn!("Drain timed out, closing listeners"),
                }
            }
        }

        self.state.connections.shutdown().await;
        info!("AF gateway stopped");
        Ok(())
    }
}

fn socket_addr(host: &str, port: u16) -> Result<SocketAddr> {
    let ip = host
        .parse()
        .map_err(|e| Error::Config(format!("Invalid host {host}: {e}")))?;
    Ok(SocketAddr::new(ip, port))
}

/// Cancel `shutdown` on Ctrl+C or SIGTERM
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
        () = shutdown.cancelled() => return,
    }

    info!("Shutdown signal received");
    shutdown.cancel();
}
