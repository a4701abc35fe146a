// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Shutdown of the running gateway.
//!
//! A termination signal or an explicit [`ShutdownCoordinator::request`]
//! records a [`ShutdownReason`] once; the future handed to `Gateway::run`
//! then resolves and the gateway stops its sessions.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{info, warn};

/// Why the gateway is stopping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// SIGTERM, usually from the service manager.
    Terminate,
    /// SIGINT or Ctrl+C from an operator.
    Interrupt,
    /// Requested from inside the process.
    Requested,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Terminate => "SIGTERM",
            Self::Interrupt => "interrupt",
            Self::Requested => "request",
        })
    }
}

// =============================================================================
// ShutdownCoordinator
// =============================================================================

/// Records the first shutdown reason and wakes every waiter.
///
/// ```ignore
/// let coordinator = ShutdownCoordinator::new();
/// tokio::spawn({
///     let coordinator = coordinator.clone();
///     async move { coordinator.listen_for_signals().await }
/// });
/// gateway.run(coordinator.stopped()).await;
/// ```
#[derive(Debug, Clone)]
pub struct ShutdownCoordinator {
    reason: Arc<Mutex<Option<ShutdownReason>>>,
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownCoordinator {
    /// Creates a coordinator with no shutdown pending.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            reason: Arc::new(Mutex::new(None)),
            tx: Arc::new(tx),
        }
    }

    /// Records `reason` and wakes waiters. Later calls are ignored.
    ///
    /// Returns `true` if this call initiated shutdown.
    pub fn request(&self, reason: ShutdownReason) -> bool {
        {
            let mut slot = self.reason.lock();
            if slot.is_some() {
                return false;
            }
            *slot = Some(reason);
        }
        info!(%reason, "Gateway shutdown initiated");
        self.tx.send_replace(true);
        true
    }

    /// The recorded reason, once shutdown has been initiated.
    pub fn reason(&self) -> Option<ShutdownReason> {
        *self.reason.lock()
    }

    /// Resolves once shutdown is initiated, immediately if it already was.
    pub fn stopped(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.tx.subscribe();
        async move {
            // An error means the coordinator is gone, which also ends the run.
            let _ = rx.wait_for(|stopping| *stopping).await;
        }
    }

    /// Waits for a termination signal and records it.
    ///
    /// Returns early when shutdown is requested some other way.
    pub async fn listen_for_signals(&self) {
        tokio::select! {
            reason = os_signal() => {
                self.request(reason);
            }
            _ = self.stopped() => {}
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves on the first termination signal. Pends forever if no handler
/// can be registered.
#[cfg(unix)]
async fn os_signal() -> ShutdownReason {
    use tokio::signal::unix::{signal, SignalKind};

    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => tokio::select! {
            _ = sigterm.recv() => ShutdownReason::Terminate,
            _ = sigint.recv() => ShutdownReason::Interrupt,
        },
        (Err(e), _) | (_, Err(e)) => {
            warn!(error = %e, "Signal handlers unavailable, gateway runs until killed");
            std::future::pending().await
        }
    }
}

#[cfg(not(unix))]
async fn os_signal() -> ShutdownReason {
    match tokio::signal::ctrl_c().await {
        Ok(()) => ShutdownReason::Interrupt,
        Err(e) => {
            warn!(error = %e, "Ctrl+C handler unavailable, gateway runs until killed");
            std::future::pending().await
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_first_reason_wins() {
        let coordinator = ShutdownCoordinator::new();
        assert_eq!(coordinator.reason(), None);

        assert!(coordinator.request(ShutdownReason::Terminate));
        assert!(!coordinator.request(ShutdownReason::Requested));
        assert_eq!(coordinator.reason(), Some(ShutdownReason::Terminate));
    }

    #[tokio::test]
    async fn test_stopped_resolves_on_request() {
        let coordinator = ShutdownCoordinator::new();
        let stopped = coordinator.stopped();

        let trigger = coordinator.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.request(ShutdownReason::Requested);
        });

        tokio::time::timeout(Duration::from_secs(1), stopped)
            .await
            .expect("stop future should resolve");
    }

    #[tokio::test]
    async fn test_stopped_after_request_is_ready() {
        let coordinator = ShutdownCoordinator::new();
        coordinator.request(ShutdownReason::Requested);
        tokio::time::timeout(Duration::from_millis(100), coordinator.stopped())
            .await
            .expect("late waiter should resolve immediately");
    }

    #[tokio::test]
    async fn test_listener_returns_on_request() {
        let coordinator = ShutdownCoordinator::new();
        let listener = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.listen_for_signals().await })
        };
        tokio::task::yield_now().await;
        coordinator.request(ShutdownReason::Requested);
        tokio::time::timeout(Duration::from_secs(1), listener)
            .await
            .expect("listener should finish")
            .unwrap();
        assert_eq!(coordinator.reason(), Some(ShutdownReason::Requested));
    }
}
