//! Background replay of the registry log into the cache.
//!
//! One listener tails the log from its oldest retained record and folds each
//! record into the [`RegistryCache`]. When the reader fails, the supervisor
//! restarts a fresh listener from the beginning after an exponential backoff.
//! Once `max_restarts` consecutive attempts have failed the health signal
//! turns `Degraded`, the restart alert fires once, and retries continue at
//! `max_delay` until the log comes back. A listener only counts as recovered
//! once it has stayed up for at least `max_delay`.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use backon::{BackoffBuilder, ExponentialBuilder};
use serde::Deserialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::cache::RegistryCache;
use crate::log::{LogClient, LogError, ReaderOptions};
use crate::utils::retry::restart_backoff;

/// Replay supervisor configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// First restart delay.
    pub min_delay_ms: u64,
    /// Upper bound for restart delays, also the retry period once degraded
    /// and the uptime after which a listener counts as recovered.
    pub max_delay_ms: u64,
    /// Consecutive failed restarts before the replay is reported degraded.
    pub max_restarts: usize,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: 100,
            max_delay_ms: 30_000,
            max_restarts: 10,
        }
    }
}

impl ReplayConfig {
    pub fn min_delay(&self) -> Duration {
        Duration::from_millis(self.min_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn backoff(&self) -> ExponentialBuilder {
        restart_backoff(self.min_delay(), self.max_delay(), self.max_restarts)
    }
}

/// Observable state of the replay listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayHealth {
    /// No reader opened yet.
    Starting,
    /// A reader is open and records are being folded.
    Tailing { restarts: u64 },
    /// The last reader failed; a new one opens after `delay`.
    Restarting { attempt: usize, delay: Duration },
    /// The restart ceiling was hit; still retrying at the maximum delay.
    Degraded { attempt: usize },
    /// Shut down.
    Stopped,
}

impl ReplayHealth {
    pub fn is_tailing(&self) -> bool {
        matches!(self, ReplayHealth::Tailing { .. })
    }
}

/// Called once each time the restart ceiling is crossed, with the attempt
/// count and the last reader error.
pub type RestartAlert = Arc<dyn Fn(usize, &LogError) + Send + Sync>;

enum ListenOutcome {
    Shutdown,
    Failed { error: LogError, uptime: Duration },
}

struct Supervisor {
    client: Arc<dyn LogClient>,
    log_name: String,
    cache: Arc<RegistryCache>,
    config: ReplayConfig,
    health: watch::Sender<ReplayHealth>,
    shutdown: watch::Receiver<bool>,
    alert: Option<RestartAlert>,
}

impl Supervisor {
    async fn run(mut self) {
        let mut backoff = self.config.backoff().build();
        let mut attempt: usize = 0;
        let mut restarts: u64 = 0;
        let mut alerted = false;

        loop {
            let (error, uptime) = match self.listen(restarts).await {
                ListenOutcome::Shutdown => break,
                ListenOutcome::Failed { error, uptime } => (error, uptime),
            };

            // A listener that held up for a full backoff period was healthy.
            if uptime >= self.config.max_delay() {
                backoff = self.config.backoff().build();
                attempt = 0;
                alerted = false;
            }
            attempt += 1;
            restarts += 1;

            let delay = match backoff.next() {
                Some(delay) => {
                    warn!(
                        log = %self.log_name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Replay listener terminated, restarting"
                    );
                    self.health
                        .send_replace(ReplayHealth::Restarting { attempt, delay });
                    delay
                }
                None => {
                    self.health.send_replace(ReplayHealth::Degraded { attempt });
                    if !alerted {
                        error!(
                            log = %self.log_name,
                            attempt,
                            error = %error,
                            "Replay restart ceiling reached, log still unavailable"
                        );
                        if let Some(alert) = &self.alert {
                            alert(attempt, &error);
                        }
                        alerted = true;
                    }
                    self.config.max_delay()
                }
            };

            if self.sleep_or_shutdown(delay).await {
                break;
            }
        }

        self.health.send_replace(ReplayHealth::Stopped);
        info!(log = %self.log_name, "Replay listener stopped");
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Tail the log until the reader fails or shutdown is requested.
    async fn listen(&mut self, restarts: u64) -> ListenOutcome {
        if self.shutdown_requested() {
            return ListenOutcome::Shutdown;
        }

        let mut reader = match self
            .client
            .open_reader(&self.log_name, ReaderOptions::replay())
            .await
        {
            Ok(reader) => reader,
            Err(error) => {
                error!(
                    log = %self.log_name,
                    error = %error,
                    "Replay listener failed to open reader"
                );
                return ListenOutcome::Failed {
                    error,
                    uptime: Duration::ZERO,
                };
            }
        };

        info!(log = %self.log_name, restarts, "Replay listener tailing registry log");
        self.health.send_replace(ReplayHealth::Tailing { restarts });

        let started = Instant::now();
        let mut delivered: u64 = 0;
        let outcome = loop {
            tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break ListenOutcome::Shutdown;
                    }
                }
                next = reader.next() => match next {
                    Ok(record) => {
                        delivered += 1;
                        self.cache.fold_record(&record).await;
                    }
                    Err(error) => {
                        error!(
                            log = %self.log_name,
                            error = %error,
                            delivered,
                            "Replay reader failed"
                        );
                        break ListenOutcome::Failed {
                            error,
                            uptime: started.elapsed(),
                        };
                    }
                },
            }
        };

        reader.close().await;
        outcome
    }

    /// Returns true when shutdown was requested during the wait.
    async fn sleep_or_shutdown(&mut self, delay: Duration) -> bool {
        if self.shutdown_requested() {
            return true;
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => false,
            changed = self.shutdown.changed() => changed.is_err() || *self.shutdown.borrow(),
        }
    }
}

/// Handle to the running replay supervisor.
///
/// Dropping the handle requests shutdown; `stop` additionally waits until
/// the reader has been closed.
pub(crate) struct ReplayTask {
    shutdown: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl fmt::Debug for ReplayTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplayTask")
            .field("running", &self.handle.is_some())
            .finish()
    }
}

impl ReplayTask {
    /// Spawn the supervisor on the current tokio runtime.
    pub(crate) fn spawn(
        client: Arc<dyn LogClient>,
        log_name: String,
        cache: Arc<RegistryCache>,
        config: ReplayConfig,
        health: watch::Sender<ReplayHealth>,
        alert: Option<RestartAlert>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let supervisor = Supervisor {
            client,
            log_name,
            cache,
            config,
            health,
            shutdown: shutdown_rx,
            alert,
        };
        let handle = tokio::spawn(supervisor.run());

        Self {
            shutdown: shutdown_tx,
            handle: Some(handle),
        }
    }

    /// Signal shutdown and wait for the supervisor to release its reader.
    pub(crate) async fn stop(&mut self) {
        self.shutdown.send_replace(true);
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Replay task ended abnormally");
            }
        }
    }
}

impl Drop for ReplayTask {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}
