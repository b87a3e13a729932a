//! OS signal handling.
//!
//! SIGTERM and SIGINT both request a graceful stop. Handlers are installed
//! before any worker is spawned so an early signal cannot kill the arbiter
//! with its default disposition and leave children behind.

use std::io;

/// Which signal ended the wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Terminate,
    Interrupt,
}

impl Termination {
    pub fn as_str(self) -> &'static str {
        match self {
            Termination::Terminate => "SIGTERM",
            Termination::Interrupt => "SIGINT",
        }
    }
}

#[cfg(unix)]
pub struct Signals {
    term: tokio::signal::unix::Signal,
    int: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Signals {
    pub fn register() -> io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            term: signal(SignalKind::terminate())?,
            int: signal(SignalKind::interrupt())?,
        })
    }

    pub async fn recv(&mut self) -> Termination {
        tokio::select! {
            _ = self.term.recv() => Termination::Terminate,
            _ = self.int.recv() => Termination::Interrupt,
        }
    }
}

#[cfg(not(unix))]
pub struct Signals;

#[cfg(not(unix))]
impl Signals {
    pub fn register() -> io::Result<Self> {
        Ok(Self)
    }

    pub async fn recv(&mut self) -> Termination {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        Termination::Interrupt
    }
}
