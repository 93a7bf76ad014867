//! Runs the long-lived pieces of a service until one fails or a shutdown signal arrives.
//!
//! Every app process gets a name and a child of the shared cancellation token.
//! After all processes stop, closers run concurrently under one timeout and
//! [`Runner::run`] hands back the exit code for `main` to return.
//!
//! ```no_run
//! use ingest_runner::Runner;
//! use std::time::Duration;
//!
//! # async fn example() -> i32 {
//! Runner::new()
//!     .with_app_process("heartbeat", |ctx| async move {
//!         ctx.cancelled().await;
//!         Ok(())
//!     })
//!     .with_closer("flush", || async move { Ok(()) })
//!     .with_closer_timeout(Duration::from_secs(5))
//!     .run()
//!     .await
//! # }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub type BoxedResultFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// A long-running process; it must return once its token is cancelled
pub type AppProcess = Box<dyn FnOnce(CancellationToken) -> BoxedResultFuture + Send>;

/// Cleanup run after every app process has stopped
pub type Closer = Box<dyn FnOnce() -> BoxedResultFuture + Send>;

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;

pub struct Runner {
    app_processes: Vec<(String, AppProcess)>,
    closers: Vec<(String, Closer)>,
    closer_timeout: Duration,
    cancellation_token: CancellationToken,
    handle_signals: bool,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    /// Closer timeout defaults to 10 seconds; SIGINT/SIGTERM handling is on
    pub fn new() -> Self {
        Self {
            app_processes: Vec::new(),
            closers: Vec::new(),
            closer_timeout: Duration::from_secs(10),
            cancellation_token: CancellationToken::new(),
            handle_signals: true,
        }
    }

    /// Add a process. If any process fails, the others are cancelled.
    pub fn with_app_process<F, Fut>(mut self, name: impl Into<String>, process: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.app_processes
            .push((name.into(), Box::new(|token| Box::pin(process(token)))));
        self
    }

    /// Add a closer. Every closer runs even if some fail.
    pub fn with_closer<F, Fut>(mut self, name: impl Into<String>, closer: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.closers
            .push((name.into(), Box::new(|| Box::pin(closer()))));
        self
    }

    pub fn with_closer_timeout(mut self, timeout: Duration) -> Self {
        self.closer_timeout = timeout;
        self
    }

    /// Use an externally owned token, e.g. to stop the runner from a test
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    pub fn with_signal_handling(mut self, enabled: bool) -> Self {
        self.handle_signals = enabled;
        self
    }

    /// Run until a process fails, every process returns, or a signal arrives.
    ///
    /// Returns [`EXIT_FAILURE`] when a process failed or panicked before
    /// shutdown was requested, otherwise [`EXIT_SUCCESS`].
    pub async fn run(self) -> i32 {
        let token = self.cancellation_token;
        let mut join_set = JoinSet::new();

        for (name, process) in self.app_processes {
            let process_token = token.child_token();
            info!(process = %name, "Starting app process");
            join_set.spawn(async move { (name, process(process_token).await) });
        }

        if self.handle_signals {
            tokio::spawn(wait_for_shutdown_signal(token.clone()));
        }

        let mut failed = false;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((name, Ok(()))) => {
                    debug!(process = %name, "App process completed");
                }
                Ok((name, Err(err))) => {
                    if !token.is_cancelled() {
                        error!(process = %name, error = %format!("{:#}", err), "App process failed");
                        failed = true;
                        token.cancel();
                    } else {
                        warn!(process = %name, error = %format!("{:#}", err), "App process failed during shutdown");
                    }
                }
                Err(err) => {
                    error!(error = %err, "App process panicked");
                    if !token.is_cancelled() {
                        failed = true;
                        token.cancel();
                    }
                }
            }
        }

        run_closers(self.closers, self.closer_timeout).await;

        if failed {
            error!("Application exiting with error");
            EXIT_FAILURE
        } else {
            info!("Application exiting normally");
            EXIT_SUCCESS
        }
    }
}

async fn wait_for_shutdown_signal(token: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Received SIGINT"),
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                    _ = token.cancelled() => return,
                }
            }
            Err(err) => {
                error!(error = %err, "Failed to install SIGTERM handler");
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Received SIGINT"),
                    _ = token.cancelled() => return,
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Received SIGINT"),
            _ = token.cancelled() => return,
        }
    }

    token.cancel();
}

async fn run_closers(closers: Vec<(String, Closer)>, closer_timeout: Duration) {
    if closers.is_empty() {
        return;
    }

    info!(timeout_ms = closer_timeout.as_millis(), "Running closers");

    let mut closer_set = JoinSet::new();
    for (name, closer) in closers {
        closer_set.spawn(async move { (name, closer().await) });
    }

    let drain = async {
        while let Some(joined) = closer_set.join_next().await {
            match joined {
                Ok((name, Ok(()))) => debug!(closer = %name, "Closer completed"),
                Ok((name, Err(err))) => {
                    error!(closer = %name, error = %format!("{:#}", err), "Closer failed")
                }
                Err(err) => error!(error = %err, "Closer panicked"),
            }
        }
    };

    if tokio::time::timeout(closer_timeout, drain).await.is_err() {
        error!(timeout_ms = closer_timeout.as_millis(), "Closers timed out");
        closer_set.abort_all();
    } else {
        info!("All closers completed");
    }
}
