//! Process manager seam.
//!
//! # Responsibilities
//! - Bind the public listener before any worker exists
//! - Populate every slot and refuse to start unless all of them boot
//! - Run the HTTP front end (and the admin API when enabled)
//! - Tear everything down on `stop`, reaping every child
//!
//! # Shutdown Order
//! 1. The front end stops accepting and finishes the requests it holds
//!    (bounded by the graceful timeout)
//! 2. Only then are the slots drained and their processes killed
//!
//! # Design Decisions
//! - `ProcessManager` is the only thing startup talks to; `PreforkManager` is
//!   one implementation of it
//! - Bind failures surface before any child is spawned, so a second instance
//!   on a taken port never forks workers

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::admin::{self, AdminState};
use crate::config::LaunchConfig;
use crate::error::LaunchError;
use crate::http::HttpServer;
use crate::lifecycle::Shutdown;
use crate::net::Listener;
use crate::workers::{SlotSupervisor, SupervisorEvent, WorkerPool};

type ServeTask = JoinHandle<io::Result<()>>;

/// Starts and stops a group of worker processes behind one listener.
#[async_trait]
pub trait ProcessManager: Send + Sync {
    async fn start(&self, config: Arc<LaunchConfig>) -> Result<ServerHandle, LaunchError>;

    async fn stop(&self, handle: ServerHandle) -> Result<(), LaunchError>;
}

/// A running process group.
pub struct ServerHandle {
    local_addr: SocketAddr,
    admin_addr: Option<SocketAddr>,
    pool: Arc<WorkerPool>,
    /// Stops the public and admin servers.
    shutdown: Shutdown,
    /// Stops the slot supervisors.
    workers_shutdown: Shutdown,
    graceful_timeout: Duration,
    events: mpsc::UnboundedReceiver<SupervisorEvent>,
    server: Option<ServeTask>,
    admin: Option<ServeTask>,
    supervisors: Vec<JoinHandle<()>>,
}

impl ServerHandle {
    /// Address of the public listener.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn admin_addr(&self) -> Option<SocketAddr> {
        self.admin_addr
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// Handle that stops the front end when triggered; [`wait`](Self::wait)
    /// then returns and the group can be stopped.
    pub fn shutdown(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Resolve when the group can no longer serve: a slot halted, the HTTP
    /// server stopped, or every supervisor finished.
    pub async fn wait(&mut self) -> Result<(), LaunchError> {
        let events = &mut self.events;
        let server = &mut self.server;

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(SupervisorEvent::Halted { worker_id, error }) => {
                        tracing::error!(worker_id, error = %error, "Worker slot halted");
                        return Err(LaunchError::AppLoad(error));
                    }
                    Some(_) => continue,
                    None => return Ok(()),
                },
                result = join_running(server) => return result,
            }
        }
    }
}

/// Await the task in `slot` once; pending forever when it was already taken.
async fn join_running(slot: &mut Option<ServeTask>) -> Result<(), LaunchError> {
    let Some(task) = slot.as_mut() else {
        return std::future::pending().await;
    };
    let joined = task.await;
    *slot = None;
    flatten(joined)
}

fn flatten(joined: Result<io::Result<()>, tokio::task::JoinError>) -> Result<(), LaunchError> {
    match joined {
        Ok(result) => result.map_err(LaunchError::Io),
        Err(e) => Err(LaunchError::Io(io::Error::other(e))),
    }
}

/// Prefork manager: one arbiter process, `workers.count` child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct PreforkManager;

impl PreforkManager {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessManager for PreforkManager {
    async fn start(&self, config: Arc<LaunchConfig>) -> Result<ServerHandle, LaunchError> {
        let listener = Listener::bind(&config.bind_address()).await?;
        let local_addr = listener.local_addr();

        let admin_listener = if config.admin.enabled {
            Some(Listener::bind(&config.admin.bind_address).await?)
        } else {
            None
        };

        let pool = Arc::new(WorkerPool::new(config.workers.count));
        let shutdown = Shutdown::new();
        let workers_shutdown = Shutdown::new();
        let (events_tx, mut events) = mpsc::unbounded_channel();

        let mut supervisors: Vec<JoinHandle<()>> = pool
            .workers()
            .iter()
            .map(|worker| {
                let supervisor = SlotSupervisor::new(
                    Arc::clone(worker),
                    Arc::clone(&pool),
                    Arc::clone(&config),
                    workers_shutdown.subscribe(),
                    events_tx.clone(),
                );
                tokio::spawn(supervisor.run())
            })
            .collect();
        drop(events_tx);

        tracing::info!(
            workers = pool.len(),
            app = %config.app,
            profile = %config.profile,
            "Booting workers"
        );

        let mut booted = 0;
        while booted < pool.len() {
            match events.recv().await {
                Some(SupervisorEvent::Booted { worker_id }) => {
                    booted += 1;
                    tracing::debug!(worker_id, booted, "Worker slot up");
                }
                Some(
                    SupervisorEvent::StartupFailed { worker_id, error }
                    | SupervisorEvent::Halted { worker_id, error },
                ) => {
                    tracing::error!(worker_id, error = %error, "Worker failed to boot, aborting startup");
                    workers_shutdown.trigger();
                    join_all(supervisors.drain(..)).await;
                    return Err(LaunchError::AppLoad(error));
                }
                None => {
                    workers_shutdown.trigger();
                    join_all(supervisors.drain(..)).await;
                    return Err(LaunchError::Io(io::Error::other(
                        "worker supervisors exited during startup",
                    )));
                }
            }
        }

        let server = HttpServer::new(Arc::clone(&config), Arc::clone(&pool));
        let server = tokio::spawn(server.run(listener.into_inner(), shutdown.subscribe()));

        let (admin_addr, admin) = match admin_listener {
            Some(admin_listener) => {
                let addr = admin_listener.local_addr();
                let state = AdminState::new(Arc::clone(&config), Arc::clone(&pool), local_addr);
                let task = tokio::spawn(admin::serve(
                    admin_listener.into_inner(),
                    state,
                    shutdown.subscribe(),
                ));
                (Some(addr), Some(task))
            }
            None => (None, None),
        };

        tracing::info!(
            address = %local_addr,
            workers = pool.len(),
            pids = ?pool.pids(),
            timeout = ?config.request_timeout(),
            "Launcher listening"
        );

        Ok(ServerHandle {
            local_addr,
            admin_addr,
            pool,
            shutdown,
            workers_shutdown,
            graceful_timeout: config.workers.graceful_timeout(),
            events,
            server: Some(server),
            admin,
            supervisors,
        })
    }

    async fn stop(&self, mut handle: ServerHandle) -> Result<(), LaunchError> {
        tracing::info!(address = %handle.local_addr, "Stopping launcher");
        handle.shutdown.trigger();

        let mut result = Ok(());
        let mut record = |joined| {
            if let Err(e) = flatten(joined) {
                tracing::error!(error = %e, "Server task failed during shutdown");
                if result.is_ok() {
                    result = Err(e);
                }
            }
        };

        // Workers stay up until the front end has answered what it accepted.
        if let Some(mut server) = handle.server.take() {
            match tokio::time::timeout(handle.graceful_timeout, &mut server).await {
                Ok(joined) => record(joined),
                Err(_) => {
                    tracing::warn!(
                        timeout = ?handle.graceful_timeout,
                        "Requests still in flight after graceful timeout, stopping workers"
                    );
                    handle.workers_shutdown.trigger();
                    record(server.await);
                }
            }
        }
        handle.workers_shutdown.trigger();

        if let Some(admin) = handle.admin.take() {
            record(admin.await);
        }

        for joined in join_all(handle.supervisors.drain(..)).await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Slot supervisor panicked");
            }
        }

        tracing::info!(remaining = ?handle.pool.pids(), "All workers stopped");
        result
    }
}
