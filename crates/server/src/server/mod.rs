//! Game server implementation.
//!
//! The supervisor owns the listening socket and the shared store. It starts
//! one simulation engine task and `workers` connection workers, feeds
//! accepted connections to the workers round-robin, and on shutdown stops
//! every unit and waits for it before closing the socket.

use crate::config::Config;
use crate::error::ServerError;
use futures_util::future::join_all;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub mod client;
pub mod game;
pub mod game_state;
pub mod store;
pub mod worker;

pub use game::{run_game_loop, SimulationEngine};
pub use game_state::{GameState, LoginError, LoginGrant};
pub use store::SharedStore;
pub use worker::{Handoff, Worker};

/// Connections that may wait in one worker's queue before handoff falls
/// through to the next worker.
const HANDOFF_QUEUE: usize = 64;

/// A bound, not yet running server.
pub struct Server {
    config: Config,
    listener: TcpListener,
    store: SharedStore,
}

impl Server {
    /// Create the shared store and bind the listening socket.
    pub async fn bind(config: Config) -> Result<Self, ServerError> {
        config.validate()?;

        let store = SharedStore::new(GameState::new(&config, &mut rand::rng()));

        let addr = format!("{}:{}", config.server.bind, config.server.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        info!("Listening on {}", listener.local_addr()?);

        Ok(Self {
            config,
            listener,
            store,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle to the shared store, for inspection.
    pub fn store(&self) -> SharedStore {
        self.store.clone()
    }

    /// Run until `shutdown` resolves, then stop every unit and wait for it.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut units: Vec<JoinHandle<Result<(), ServerError>>> = Vec::new();

        let engine = SimulationEngine::new(Duration::from_millis(self.config.server.tick_interval_ms));
        units.push(tokio::spawn(run_game_loop(
            self.store.clone(),
            engine,
            shutdown_rx.clone(),
        )));

        let mut queues = Vec::with_capacity(self.config.server.workers);
        for id in 0..self.config.server.workers {
            let (tx, rx) = mpsc::channel(HANDOFF_QUEUE);
            let worker = Worker::new(
                id,
                self.store.clone(),
                rx,
                self.config.server.max_connections_per_worker,
            );
            units.push(tokio::spawn(worker.run(shutdown_rx.clone())));
            queues.push(tx);
        }
        info!("Started game loop and {} workers", queues.len());

        tokio::pin!(shutdown);
        let mut next = 0;
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            warn!("Failed to set TCP_NODELAY for {}: {}", addr, e);
                        }
                        next = dispatch(&queues, next, (stream, addr));
                    }
                    Err(e) => warn!("Accept failed: {}", e),
                },
            }
        }

        info!("Shutting down...");
        if let Err(e) = self.store.with_lock(|state| state.stop()) {
            error!("Could not clear running flag: {}", e);
        }
        let _ = shutdown_tx.send(true);
        drop(queues);

        let mut result = Ok(());
        for joined in join_all(units).await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!("Server unit failed: {}", e);
                    result = Err(e);
                }
                Err(e) => error!("Server unit panicked: {}", e),
            }
        }

        drop(self.listener);
        info!("Server stopped");
        result
    }
}

/// Hand a connection to the first worker at or after `start` whose queue
/// has room. Returns where the next search should start.
fn dispatch(queues: &[mpsc::Sender<Handoff>], start: usize, mut handoff: Handoff) -> usize {
    let n = queues.len();
    for i in 0..n {
        let idx = (start + i) % n;
        match queues[idx].try_send(handoff) {
            Ok(()) => return (idx + 1) % n,
            Err(TrySendError::Full(h)) | Err(TrySendError::Closed(h)) => handoff = h,
        }
    }
    warn!("All workers busy, dropping connection from {}", handoff.1);
    start
}

/// Run a server with `config` until SIGINT or SIGTERM.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let server = Server::bind(config).await?;
    server.run_until(shutdown_signal()).await?;
    Ok(())
}

/// Resolves on the first termination signal.
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
            (Ok(mut sigint), Ok(mut sigterm)) => {
                tokio::select! {
                    _ = sigint.recv() => info!("Received SIGINT"),
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                }
                return;
            }
            _ => warn!("Failed to install signal handlers, falling back to Ctrl+C"),
        }
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C"),
        Err(e) => {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
