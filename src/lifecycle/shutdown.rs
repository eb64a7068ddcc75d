//! Signal handling for graceful shutdown

use std::io;

use tokio::signal::unix::{signal, Signal, SignalKind};
use tracing::debug;

use crate::orchestrator::AssistantHandle;

/// Handles shutdown signals (SIGTERM, SIGINT)
pub struct ShutdownSignal {
    sigterm: Signal,
    sigint: Signal,
}

impl ShutdownSignal {
    /// Register the signal handlers
    ///
    /// Must be called from inside a tokio runtime.
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            sigterm: signal(SignalKind::terminate())?,
            sigint: signal(SignalKind::interrupt())?,
        })
    }

    /// Wait for a shutdown signal
    pub async fn wait(&mut self) {
        tokio::select! {
            _ = self.sigterm.recv() => {
                debug!("received SIGTERM");
            }
            _ = self.sigint.recv() => {
                debug!("received SIGINT");
            }
        }
    }

    /// Forward the first signal to the assistant as a shutdown request
    pub fn forward_to(mut self, handle: AssistantHandle) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.wait().await;
            handle.shutdown();
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_registers_inside_runtime() {
        assert!(ShutdownSignal::new().is_ok());
    }
}
