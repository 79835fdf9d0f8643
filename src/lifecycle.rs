//! Listener start/stop sequencing.
//!
//! On a termination signal the orchestrator flips readiness off, waits for
//! load balancers to notice, stops accepting connections, then gives
//! in-flight requests a bounded window to finish. Requests still running
//! after that window are cancelled and answered with 503 before the server
//! task is torn down.

use std::fmt;
use std::future::Future;
use std::io;
use std::time::Duration;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::response::ApiResponse;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Starting,
    Serving,
    Draining,
    ShuttingDown,
    Stopped,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Starting => "starting",
            LifecycleState::Serving => "serving",
            LifecycleState::Draining => "draining",
            LifecycleState::ShuttingDown => "shutting_down",
            LifecycleState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownTimings {
    /// Wait between flipping readiness off and closing the listener.
    pub drain_delay: Duration,
    /// Upper bound on waiting for in-flight requests.
    pub graceful_timeout: Duration,
    /// Extra time given to cancelled requests before the server task is aborted.
    pub hard_kill_grace: Duration,
}

impl Default for ShutdownTimings {
    fn default() -> Self {
        ShutdownTimings {
            drain_delay: Duration::from_secs(5),
            graceful_timeout: Duration::from_secs(15),
            hard_kill_grace: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Every in-flight request finished within the graceful timeout.
    Graceful,
    /// Outstanding requests were cancelled.
    Forced,
}

/// Read-only view of the lifecycle state for readiness probes.
#[derive(Debug, Clone)]
pub struct Readiness {
    rx: watch::Receiver<LifecycleState>,
}

impl Readiness {
    pub fn state(&self) -> LifecycleState {
        *self.rx.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == LifecycleState::Serving
    }
}

pub struct Lifecycle {
    state: watch::Sender<LifecycleState>,
    timings: ShutdownTimings,
}

impl Lifecycle {
    pub fn new(timings: ShutdownTimings) -> Self {
        let (state, _) = watch::channel(LifecycleState::Starting);
        Lifecycle { state, timings }
    }

    pub fn readiness(&self) -> Readiness {
        Readiness {
            rx: self.state.subscribe(),
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    fn transition(&self, next: LifecycleState) {
        let prev = self.state.send_replace(next);
        tracing::debug!(from = %prev, to = %next, "Lifecycle transition");
    }

    /// Serve `app` on `listener` until `signal` resolves, then run the
    /// drain sequence. Returns once the server has stopped.
    pub async fn run<F>(
        self,
        listener: TcpListener,
        app: Router,
        signal: F,
    ) -> io::Result<ShutdownOutcome>
    where
        F: Future<Output = ()>,
    {
        let abandon = CancellationToken::new();
        let stop_accepting = CancellationToken::new();

        let app = app.layer(middleware::from_fn_with_state(
            abandon.clone(),
            abandon_on_shutdown,
        ));

        let addr = listener.local_addr()?;
        let stop = stop_accepting.clone();
        let mut server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { stop.cancelled().await })
                .await
        });

        self.transition(LifecycleState::Serving);
        tracing::info!(%addr, "Starting server");

        tokio::select! {
            _ = signal => {}
            joined = &mut server => {
                self.transition(LifecycleState::Stopped);
                return match joined {
                    Ok(Ok(())) => Err(io::Error::other("server stopped before shutdown was requested")),
                    Ok(Err(e)) => Err(e),
                    Err(e) => Err(io::Error::other(e)),
                };
            }
        }

        self.transition(LifecycleState::Draining);
        tracing::info!("Received shutdown signal, shutting down");

        tokio::time::sleep(self.timings.drain_delay).await;
        tracing::info!("Readiness check propagated, now waiting for ongoing requests to finish");

        self.transition(LifecycleState::ShuttingDown);
        stop_accepting.cancel();

        let outcome = match tokio::time::timeout(self.timings.graceful_timeout, &mut server).await {
            Ok(joined) => {
                abandon.cancel();
                match joined {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => tracing::error!(error = %e, "Server error while draining"),
                    Err(e) => tracing::error!(error = %e, "Server task failed while draining"),
                }
                ShutdownOutcome::Graceful
            }
            Err(_) => {
                tracing::warn!(
                    "Failed to wait for ongoing requests to finish, waiting for forced cancellation"
                );
                abandon.cancel();
                if tokio::time::timeout(self.timings.hard_kill_grace, &mut server)
                    .await
                    .is_err()
                {
                    server.abort();
                }
                ShutdownOutcome::Forced
            }
        };

        self.transition(LifecycleState::Stopped);
        tracing::info!(?outcome, "Server shut down");

        Ok(outcome)
    }
}

async fn abandon_on_shutdown(
    State(abandon): State<CancellationToken>,
    req: Request,
    next: Next,
) -> Response {
    tokio::select! {
        res = next.run(req) => res,
        _ = abandon.cancelled() => {
            tracing::warn!("Request cancelled by forced shutdown");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                ApiResponse::<()>::failure("server is shutting down"),
            )
                .into_response()
        }
    }
}

/// Resolve on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
