//! A concurrent application runner that manages long-running processes with graceful shutdown.
//!
//! This runner orchestrates named app processes and cleanup functions:
//! - Concurrent execution of every registered process
//! - Cancellation on SIGTERM/SIGINT or on the first process failure
//! - A drain period in which cancelled processes may finish their current work
//! - Cleanup execution regardless of process outcome, bounded by a timeout
//!
//! # Example
//!
//! ```no_run
//! use agent_runner::Runner;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let runner = Runner::new()
//!         .with_named_process("heartbeat", |ctx| async move {
//!             loop {
//!                 tokio::select! {
//!                     _ = ctx.cancelled() => break,
//!                     _ = tokio::time::sleep(Duration::from_secs(1)) => {
//!                         tracing::info!("still alive");
//!                     }
//!                 }
//!             }
//!             Ok(())
//!         })
//!         .with_closer(|| async move {
//!             tracing::info!("Cleaning up resources");
//!             Ok(())
//!         })
//!         .with_shutdown_timeout(Duration::from_secs(30));
//!
//!     runner.run().await;
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Boxed future produced by processes and closers.
pub type BoxedTask = Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send>>;

/// Type alias for an app process function.
/// Takes a cancellation token and returns a future that resolves to Result<(), anyhow::Error>
pub type AppProcess = Box<dyn FnOnce(CancellationToken) -> BoxedTask + Send>;

/// Type alias for a closer function.
pub type Closer = Box<dyn FnOnce() -> BoxedTask + Send>;

/// A process together with the name it is logged under.
pub struct NamedProcess {
    pub name: String,
    pub process: AppProcess,
}

/// A concurrent application runner that manages long-running processes with graceful shutdown.
///
/// - App processes run concurrently until one fails or a shutdown signal is received
/// - After cancellation, processes get `shutdown_timeout` to return before being aborted
/// - Closers execute afterward, regardless of process outcome
pub struct Runner {
    app_processes: Vec<NamedProcess>,
    closers: Vec<Closer>,
    closer_timeout: Duration,
    shutdown_timeout: Duration,
    cancellation_token: CancellationToken,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    /// Creates a new Runner with default configuration.
    ///
    /// Default settings:
    /// - Closer timeout: 10 seconds
    /// - Shutdown (drain) timeout: 30 seconds
    /// - No app processes or closers
    pub fn new() -> Self {
        Self {
            app_processes: Vec::new(),
            closers: Vec::new(),
            closer_timeout: Duration::from_secs(10),
            shutdown_timeout: Duration::from_secs(30),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Adds an app process logged as `process-<n>`.
    pub fn with_app_process<F, Fut>(self, process: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        let name = format!("process-{}", self.app_processes.len());
        self.with_named_process(name, process)
    }

    /// Adds an app process under a name used in lifecycle logs.
    ///
    /// If any process returns an error, all processes are cancelled and
    /// closers are executed.
    pub fn with_named_process<F, Fut>(mut self, name: impl Into<String>, process: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        self.app_processes.push(NamedProcess {
            name: name.into(),
            process: Box::new(|token| Box::pin(process(token))),
        });
        self
    }

    /// Adds already boxed processes, as produced by worker modules.
    pub fn with_processes(mut self, processes: Vec<NamedProcess>) -> Self {
        self.app_processes.extend(processes);
        self
    }

    /// Adds a closer to the runner.
    ///
    /// Closers are executed after all app processes have stopped,
    /// regardless of whether they stopped due to error or cancellation.
    /// All closers will attempt to execute even if some fail.
    pub fn with_closer<F, Fut>(mut self, closer: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        self.closers.push(Box::new(|| Box::pin(closer())));
        self
    }

    /// Sets the timeout for executing closers. Default is 10 seconds.
    pub fn with_closer_timeout(mut self, timeout: Duration) -> Self {
        self.closer_timeout = timeout;
        self
    }

    /// Sets how long cancelled processes may keep running before they are
    /// aborted. Default is 30 seconds.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Sets a custom cancellation token.
    ///
    /// This allows external control over process cancellation.
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    /// Runs until shutdown, then exits the process (code 1 if a process failed).
    pub async fn run(self) {
        let token = self.cancellation_token.clone();
        spawn_signal_handlers(token);

        match self.run_until_complete().await {
            Ok(()) => {
                tracing::info!("Application exiting normally");
                std::process::exit(0);
            }
            Err(err) => {
                tracing::error!("Application exiting with error: {:#}", err);
                std::process::exit(1);
            }
        }
    }

    /// Runs all app processes to completion without installing signal
    /// handlers or exiting.
    ///
    /// 1. Spawns all app processes concurrently
    /// 2. Cancels the token when any process fails
    /// 3. After cancellation, waits up to the shutdown timeout for the rest
    /// 4. Executes all closers with the configured timeout
    ///
    /// Returns the first process error, if any.
    pub async fn run_until_complete(self) -> anyhow::Result<()> {
        let token = self.cancellation_token;
        let mut join_set = JoinSet::new();

        for NamedProcess { name, process } in self.app_processes {
            let process_token = token.clone();
            join_set.spawn(async move {
                tracing::info!(process = %name, "App process started");
                let result = process(process_token).await;
                (name, result)
            });
        }

        let mut first_error = None;
        let mut drain_deadline = None;
        loop {
            let next = if token.is_cancelled() {
                let deadline = *drain_deadline
                    .get_or_insert_with(|| tokio::time::Instant::now() + self.shutdown_timeout);
                match tokio::time::timeout_at(deadline, join_set.join_next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        tracing::warn!(
                            remaining = join_set.len(),
                            "App processes did not stop within {:?}, aborting",
                            self.shutdown_timeout
                        );
                        join_set.shutdown().await;
                        break;
                    }
                }
            } else {
                tokio::select! {
                    next = join_set.join_next() => next,
                    _ = token.cancelled() => continue,
                }
            };

            let Some(result) = next else {
                break;
            };

            match result {
                Ok((name, Ok(()))) => {
                    tracing::info!(process = %name, "App process stopped");
                }
                Ok((name, Err(err))) => {
                    tracing::error!(process = %name, "App process error: {:#}", err);
                    if first_error.is_none() {
                        first_error = Some(err.context(format!("process {} failed", name)));
                    }
                    token.cancel();
                }
                Err(err) => {
                    tracing::error!("App process panicked: {}", err);
                    if first_error.is_none() {
                        first_error = Some(anyhow::anyhow!("app process panicked: {}", err));
                    }
                    token.cancel();
                }
            }
        }

        if !self.closers.is_empty() {
            tracing::info!("Running closers with timeout of {:?}", self.closer_timeout);

            match tokio::time::timeout(self.closer_timeout, run_closers(self.closers)).await {
                Ok(()) => tracing::info!("All closers completed"),
                Err(_) => tracing::error!("Closers timed out after {:?}", self.closer_timeout),
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn spawn_signal_handlers(token: CancellationToken) {
    let signal_token = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Received shutdown signal");
                signal_token.cancel();
            }
            Err(err) => {
                tracing::error!("Error setting up signal handler: {}", err);
            }
        }
    });

    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("Failed to set up SIGTERM handler");
        sigterm.recv().await;
        tracing::info!("Received SIGTERM signal");
        token.cancel();
    });
}

/// Runs all closers concurrently.
async fn run_closers(closers: Vec<Closer>) {
    let mut closer_set = JoinSet::new();

    for closer in closers {
        closer_set.spawn(closer());
    }

    while let Some(result) = closer_set.join_next().await {
        match result {
            Ok(Ok(())) => tracing::debug!("Closer completed successfully"),
            Ok(Err(err)) => tracing::error!("Closer error: {:#}", err),
            Err(err) => tracing::error!("Closer panicked: {}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_cancelled_processes_drain_before_closers() {
        let drained = Arc::new(AtomicBool::new(false));
        let closer_saw_drained = Arc::new(AtomicBool::new(false));
        let token = CancellationToken::new();

        let runner = Runner::new()
            .with_named_process("worker", {
                let drained = drained.clone();
                move |ctx| async move {
                    ctx.cancelled().await;
                    // finish the batch in hand
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    drained.store(true, Ordering::SeqCst);
                    Ok(())
                }
            })
            .with_closer({
                let drained = drained.clone();
                let seen = closer_saw_drained.clone();
                move || async move {
                    seen.store(drained.load(Ordering::SeqCst), Ordering::SeqCst);
                    Ok(())
                }
            })
            .with_cancellation_token(token.clone());

        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });

        let result = runner.run_until_complete().await;

        assert!(result.is_ok());
        assert!(closer_saw_drained.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_failing_process_cancels_others_and_is_reported() {
        let token = CancellationToken::new();
        let observed_cancel = Arc::new(AtomicBool::new(false));

        let runner = Runner::new()
            .with_named_process("broken", |_ctx| async move {
                Err(anyhow::anyhow!("boom"))
            })
            .with_named_process("healthy", {
                let observed = observed_cancel.clone();
                move |ctx| async move {
                    ctx.cancelled().await;
                    observed.store(true, Ordering::SeqCst);
                    Ok(())
                }
            })
            .with_cancellation_token(token.clone());

        let result = runner.run_until_complete().await;

        let err = result.unwrap_err();
        assert!(format!("{:#}", err).contains("broken"));
        assert!(observed_cancel.load(Ordering::SeqCst));
        assert!(token.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_process_is_aborted_after_shutdown_timeout() {
        let token = CancellationToken::new();
        let closer_runs = Arc::new(AtomicUsize::new(0));

        let runner = Runner::new()
            .with_named_process("stuck", |_ctx| async move {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            })
            .with_closer({
                let runs = closer_runs.clone();
                move || async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .with_shutdown_timeout(Duration::from_secs(5))
            .with_cancellation_token(token.clone());

        token.cancel();
        let result = runner.run_until_complete().await;

        assert!(result.is_ok());
        assert_eq!(closer_runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_closer_errors_do_not_stop_other_closers() {
        let counter = Arc::new(AtomicUsize::new(0));

        let runner = Runner::new()
            .with_closer(|| async move { Err(anyhow::anyhow!("close failed")) })
            .with_closer({
                let c = counter.clone();
                move || async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .with_closer_timeout(Duration::from_secs(1));

        run_closers(runner.closers).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unnamed_processes_get_indexed_names() {
        let runner = Runner::new()
            .with_app_process(|_ctx| async move { Ok(()) })
            .with_app_process(|_ctx| async move { Ok(()) });

        let names: Vec<&str> = runner
            .app_processes
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(names, vec!["process-0", "process-1"]);
    }
}
