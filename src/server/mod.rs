//! Server lifecycle: start, serve, drain, stop.
//!
//! ```text
//! Initializing ──start()──▶ Running ──shutdown future──▶ Draining ──▶ Stopped
//! ```
//!
//! [`Server::start`] builds the route table (a bad table fails here, before
//! anything is bound), binds the listener, flips [`Health`] Up, and spawns
//! the accept loop on a background task. [`Running::shutdown_on`] then
//! waits for the shutdown future. When it fires:
//!
//! 1. Health flips Down, so `/health` starts answering `503` and a load
//!    balancer stops sending traffic.
//! 2. The accept loop stops; no new connections are taken.
//! 3. Every open connection is told to shut down gracefully: keep-alive is
//!    disabled, in-flight requests finish, idle connections close.
//! 4. All connection tasks get `shutdown_timeout` (30 s by default) to
//!    finish. Whatever is still running after that is aborted and
//!    [`Error::ShutdownTimeout`] is returned.
//!
//! The shutdown trigger is any `Future<Output = ()>`: [`shutdown_signal`]
//! for a real process, a channel in tests.

mod conn;
mod signal;

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::config::{ListenerFailure, ServerConfig};
use crate::error::Error;
use crate::health::{Health, HealthState};
use crate::router::{Dispatcher, Router};

use self::conn::Limits;

pub use self::signal::shutdown_signal;

/// Lifecycle state, observable through [`Server::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Initializing,
    Running,
    Draining,
    Stopped,
}

/// A configured server that has not started yet.
pub struct Server {
    config: ServerConfig,
    router: Router,
    health: Health,
    phase: watch::Sender<Phase>,
}

impl Server {
    pub fn new(config: ServerConfig, router: Router) -> Self {
        let (phase, _) = watch::channel(Phase::Initializing);
        Self { config, router, health: Health::new(), phase }
    }

    /// Use an existing health cell instead of a fresh one.
    #[must_use]
    pub fn with_health(mut self, health: Health) -> Self {
        self.health = health;
        self
    }

    pub fn health(&self) -> Health {
        self.health.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    /// Initializing → Running.
    pub async fn start(self) -> Result<Running, Error> {
        let dispatcher = Arc::new(self.router.build(&self.health)?);

        let listener = TcpListener::bind(self.config.socket_addr()).await?;
        let local_addr = listener.local_addr()?;

        let limits = Limits {
            read: self.config.read_timeout,
            write: self.config.write_timeout,
            idle: self.config.idle_timeout,
            max_body: self.config.max_body_size,
        };
        let (stop_tx, stop_rx) = watch::channel(false);
        let (failed_tx, failed_rx) = oneshot::channel();
        let accept = tokio::spawn(accept_loop(listener, dispatcher, limits, stop_rx, failed_tx));

        self.health.set(HealthState::Up);
        self.phase.send_replace(Phase::Running);
        info!(addr = %local_addr, "HTTP server started on http://{local_addr}/");

        Ok(Running {
            local_addr,
            config: self.config,
            health: self.health,
            phase: self.phase,
            stop: stop_tx,
            accept,
            failed: failed_rx,
        })
    }

    /// Start, then serve until `shutdown` resolves and the drain finishes.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<(), Error> {
        self.start().await?.shutdown_on(shutdown).await
    }
}

/// A server whose accept loop is live.
pub struct Running {
    local_addr: SocketAddr,
    config: ServerConfig,
    health: Health,
    phase: watch::Sender<Phase>,
    stop: watch::Sender<bool>,
    accept: JoinHandle<JoinSet<()>>,
    failed: oneshot::Receiver<io::Error>,
}

impl Running {
    /// The bound address; useful when the configured port was `0`.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn health(&self) -> Health {
        self.health.clone()
    }

    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    /// Running → Draining → Stopped.
    ///
    /// Blocks until `shutdown` resolves (or, under
    /// [`ListenerFailure::Shutdown`], until the accept loop dies), then
    /// drains within the configured deadline.
    pub async fn shutdown_on(self, shutdown: impl Future<Output = ()>) -> Result<(), Error> {
        let Running { config, health, phase, stop, accept, failed, .. } = self;

        let listener_error = wait_for_trigger(shutdown, failed, config.listener_failure).await;

        info!("server gracefully shutting down");
        health.set(HealthState::Down);
        phase.send_replace(Phase::Draining);
        // Stops the accept loop and asks every connection to close gracefully.
        stop.send_replace(true);

        let tasks = match accept.await {
            Ok(tasks) => tasks,
            Err(e) => {
                error!(error = %e, "accept loop task failed");
                JoinSet::new()
            }
        };
        let drained = drain(tasks, config.shutdown_timeout).await;
        phase.send_replace(Phase::Stopped);

        drained?;
        match listener_error {
            Some(e) => Err(Error::Listener(e)),
            None => {
                info!("server stopped");
                Ok(())
            }
        }
    }
}

async fn wait_for_trigger(
    shutdown: impl Future<Output = ()>,
    failed: oneshot::Receiver<io::Error>,
    policy: ListenerFailure,
) -> Option<io::Error> {
    if policy == ListenerFailure::LogOnly {
        shutdown.await;
        return None;
    }

    tokio::pin!(shutdown);
    let failure = tokio::select! {
        () = &mut shutdown => return None,
        res = failed => res.ok(),
    };
    if failure.is_none() {
        // The accept loop ended without reporting; keep waiting for the signal.
        shutdown.await;
    }
    failure
}

// ── Accept loop ───────────────────────────────────────────────────────────────

async fn accept_loop(
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    limits: Limits,
    mut stop: watch::Receiver<bool>,
    failed: oneshot::Sender<io::Error>,
) -> JoinSet<()> {
    let mut tasks = JoinSet::new();
    let mut failed = Some(failed);
    let mut accepting = true;

    loop {
        tokio::select! {
            // Shutdown first, so a trigger stops accepting even with a
            // backlog of queued connections.
            biased;

            _ = stop.changed() => {
                debug!(in_flight = tasks.len(), "accept loop stopping");
                break;
            }

            res = listener.accept(), if accepting => match res {
                Ok((stream, remote_addr)) => {
                    tasks.spawn(conn::serve(
                        stream,
                        remote_addr,
                        Arc::clone(&dispatcher),
                        limits,
                        stop.clone(),
                    ));
                }
                Err(e) if is_transient(&e) => {
                    warn!(error = %e, "accept error");
                }
                Err(e) => {
                    error!(error = %e, "listener stopped accepting connections");
                    accepting = false;
                    if let Some(tx) = failed.take() {
                        let _ = tx.send(e);
                    }
                }
            },

            // Reap finished connection tasks so the JoinSet does not grow
            // without bound on long-running servers.
            Some(res) = tasks.join_next(), if !tasks.is_empty() => log_join(res),
        }
    }

    tasks
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::TimedOut
            | io::ErrorKind::WouldBlock
    )
}

fn log_join(res: Result<(), tokio::task::JoinError>) {
    if let Err(e) = res {
        if e.is_panic() {
            error!("connection task panicked: {e}");
        }
    }
}

/// Waits up to `deadline` for every connection task, then aborts the rest.
async fn drain(mut tasks: JoinSet<()>, deadline: Duration) -> Result<(), Error> {
    info!(in_flight = tasks.len(), ?deadline, "draining connections");

    let finished = tokio::time::timeout(deadline, async {
        while let Some(res) = tasks.join_next().await {
            log_join(res);
        }
    })
    .await;

    if finished.is_ok() {
        return Ok(());
    }

    let remaining = tasks.len();
    tasks.shutdown().await;
    error!(remaining, ?deadline, "could not gracefully shut down server, connections aborted");
    Err(Error::ShutdownTimeout(deadline))
}
