use super::backoff::BackoffScheduler;
use super::history::{ErrorHistory, ErrorRecord};
use super::prober::{HealthProber, HttpProber, ProbeError, ProbeResult};
use super::publisher::{StatusPublisher, Subscription};
use super::{ConnectionState, Mode, Status};
use crate::config::MonitorConfig;
use crate::metrics::Metrics;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

type InFlightProbe = Shared<BoxFuture<'static, bool>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Manual { force: bool },
    /// Carries the retry token current when the timer was armed
    Timer { retry: u64 },
}

struct Core {
    state: ConnectionState,
    history: ErrorHistory,
    in_flight: Option<(InFlightProbe, AbortHandle)>,
    // A probe only applies its result if the epoch it started in is current
    epoch: u64,
    // Bumped per scheduled retry; a timer fire only counts for the latest one
    retry_token: u64,
    disposed: bool,
}

impl Core {
    fn abandon_in_flight(&mut self) {
        if let Some((_, task)) = self.in_flight.take() {
            task.abort();
            debug!("Abandoned in-flight probe");
        }
        self.epoch = self.epoch.wrapping_add(1);
    }
}

struct Inner {
    url: String,
    timeout: Duration,
    prober: Arc<dyn HealthProber>,
    scheduler: BackoffScheduler,
    publisher: StatusPublisher,
    core: Mutex<Core>,
}

/// Owns the connection state machine for one monitored dependency.
///
/// Every operation serializes on a single lock that is never held across an
/// await; the probe itself runs on its own task and at most one is in flight.
/// Dropping the controller disposes it.
pub struct ConnectionController {
    inner: Arc<Inner>,
}

impl ConnectionController {
    /// Build a controller probing `config.health_check_url` over HTTP
    pub fn from_config(config: &MonitorConfig) -> anyhow::Result<Self> {
        let prober = HttpProber::new(config.health_check_url.clone())?;
        Self::new(config, Arc::new(prober))
    }

    /// Build a controller around a custom prober. Fails on invalid configuration.
    pub fn new(config: &MonitorConfig, prober: Arc<dyn HealthProber>) -> anyhow::Result<Self> {
        config.validate()?;

        let mut state = ConnectionState::new(config.max_attempts);
        if config.start_in_fallback {
            state.mode = Mode::Fallback;
        }

        let inner = Arc::new(Inner {
            url: config.health_check_url.clone(),
            timeout: config.timeout(),
            prober,
            scheduler: BackoffScheduler::new(config.initial_delay(), config.max_delay()),
            publisher: StatusPublisher::new(state.clone()),
            core: Mutex::new(Core {
                state,
                history: ErrorHistory::new(config.error_history_capacity),
                in_flight: None,
                epoch: 0,
                retry_token: 0,
                disposed: false,
            }),
        });

        info!(
            url = %inner.url,
            max_attempts = config.max_attempts,
            mode = %inner.publisher.current().mode,
            "Connection controller created"
        );

        Ok(Self { inner })
    }

    /// Probe the dependency if policy allows and return the resulting
    /// availability.
    ///
    /// In fallback mode this returns `true` without probing. In live mode a
    /// forced call always probes; an unforced one only probes while the
    /// status is still unknown and otherwise answers from the cached state.
    /// Calls arriving while a probe is in flight join that probe. A joined
    /// caller whose probe ends after a switch to fallback gets `true`.
    pub async fn check_availability(&self, force: bool) -> bool {
        self.inner.check(Trigger::Manual { force }).await
    }

    /// Forget consecutive failures and cancel any scheduled retry. Does not probe.
    pub fn reset_attempts(&self) {
        let mut core = self.inner.core.lock();
        if core.disposed {
            return;
        }

        self.inner.scheduler.disarm();
        core.abandon_in_flight();
        core.state.status = Status::Unknown;
        core.state.attempt_count = 0;
        core.state.next_check_at = None;

        info!(url = %self.inner.url, "Connection attempts reset");
        self.inner.publisher.publish(core.state.clone());
    }

    /// Switch between the live dependency and the fallback source
    pub fn set_mode(&self, mode: Mode) {
        let mut core = self.inner.core.lock();
        if core.disposed || core.state.mode == mode {
            return;
        }

        core.state.mode = mode;
        match mode {
            Mode::Fallback => {
                self.inner.scheduler.disarm();
                core.state.next_check_at = None;
                info!(url = %self.inner.url, "Switched to fallback mode, probing suspended");
            }
            Mode::Live => {
                core.abandon_in_flight();
                core.state.status = Status::Unknown;
                core.state.attempt_count = 0;
                core.state.next_check_at = None;
                info!(url = %self.inner.url, "Switched to live mode");
            }
        }

        self.inner.publisher.publish(core.state.clone());
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ConnectionState) + Send + Sync + 'static,
    {
        self.inner.publisher.subscribe(listener)
    }

    pub fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.inner.publisher.watch()
    }

    /// Read-only copy of the current state
    pub fn snapshot(&self) -> ConnectionState {
        self.inner.publisher.current()
    }

    /// Recent probe failures, most recent first
    pub fn error_history(&self) -> Vec<ErrorRecord> {
        self.inner.core.lock().history.snapshot()
    }

    pub fn health_check_url(&self) -> &str {
        &self.inner.url
    }

    /// Cancel the retry timer and abandon any in-flight probe. Further
    /// operations are ignored.
    pub fn dispose(&self) {
        let mut core = self.inner.core.lock();
        if core.disposed {
            return;
        }

        core.disposed = true;
        self.inner.scheduler.disarm();
        core.abandon_in_flight();
        info!(url = %self.inner.url, "Connection controller disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.core.lock().disposed
    }
}

impl Drop for ConnectionController {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl Inner {
    async fn check(self: &Arc<Self>, trigger: Trigger) -> bool {
        let probe = {
            let mut core = self.core.lock();
            if core.disposed {
                return core.state.is_available();
            }

            if core.state.mode == Mode::Fallback {
                debug!(?trigger, "Fallback mode active, skipping probe");
                return true;
            }

            let joined = core.in_flight.as_ref().map(|(probe, _)| probe.clone());
            match joined {
                Some(in_flight) => {
                    debug!(?trigger, "Probe already in flight, joining it");
                    in_flight
                }
                None => {
                    let should_probe = match trigger {
                        Trigger::Manual { force: true } => true,
                        Trigger::Manual { force: false } => core.state.status == Status::Unknown,
                        Trigger::Timer { retry } => {
                            core.state.status == Status::Unavailable && core.retry_token == retry
                        }
                    };
                    if !should_probe {
                        return core.state.is_available();
                    }
                    self.start_probe(&mut core)
                }
            }
        };

        if probe.await {
            return true;
        }
        // Fallback substitutes for the dependency even if the joined probe failed
        self.core.lock().state.mode == Mode::Fallback
    }

    fn start_probe(self: &Arc<Self>, core: &mut Core) -> InFlightProbe {
        self.scheduler.disarm();
        core.state.status = Status::Checking;
        core.state.next_check_at = None;

        let epoch = core.epoch;
        let inner = Arc::clone(self);
        let task = tokio::spawn(async move {
            let result = match AssertUnwindSafe(inner.prober.probe(inner.timeout))
                .catch_unwind()
                .await
            {
                Ok(result) => result,
                Err(_) => {
                    warn!(url = %inner.url, "Health prober panicked, treating as failure");
                    ProbeResult::failure(&ProbeError::Panicked, 0)
                }
            };
            inner.complete_probe(epoch, result)
        });

        let abort = task.abort_handle();
        // An aborted probe reports unavailable to whoever was waiting on it
        let in_flight = async move { task.await.unwrap_or(false) }.boxed().shared();
        core.in_flight = Some((in_flight.clone(), abort));

        debug!(url = %self.url, attempt = core.state.attempt_count, "Probing dependency");
        self.publisher.publish(core.state.clone());
        in_flight
    }

    fn complete_probe(self: &Arc<Self>, epoch: u64, result: ProbeResult) -> bool {
        let mut core = self.core.lock();
        if core.disposed || core.epoch != epoch {
            debug!("Discarding stale probe result");
            return result.available;
        }

        Metrics::record_probe(&result);

        core.in_flight = None;
        core.state.last_checked_at = Some(result.observed_at);

        if result.available {
            self.scheduler.disarm();
            let recovering = core.state.attempt_count > 0;
            core.state.status = Status::Available;
            core.state.attempt_count = 0;
            core.state.last_error = None;
            core.state.next_check_at = None;

            if recovering {
                info!(url = %self.url, latency_ms = result.latency_ms, "Dependency recovered");
            } else {
                debug!(url = %self.url, latency_ms = result.latency_ms, "Dependency available");
            }
        } else {
            let message = result
                .error
                .clone()
                .unwrap_or_else(|| "Probe failed".to_string());
            core.history
                .append(ErrorRecord::new(result.observed_at, message.clone()));
            core.state.last_error = Some(message);

            let previous = core.state.attempt_count;
            let max_attempts = core.state.max_attempts;

            if previous.saturating_add(1) >= max_attempts {
                self.scheduler.disarm();
                core.state.status = Status::Exhausted;
                core.state.attempt_count = max_attempts;
                core.state.next_check_at = None;
                warn!(
                    url = %self.url,
                    attempts = max_attempts,
                    error = ?core.state.last_error,
                    "Dependency unavailable, automatic retries exhausted"
                );
            } else {
                core.state.status = Status::Unavailable;
                core.state.attempt_count = previous + 1;

                if core.state.mode == Mode::Live {
                    let delay = self.scheduler.delay_for_attempt(previous);
                    core.state.next_check_at =
                        Some(result.observed_at.saturating_add(delay.as_millis() as u64));
                    self.schedule_retry(&mut core, delay);
                    warn!(
                        url = %self.url,
                        attempt = core.state.attempt_count,
                        retry_in_ms = delay.as_millis() as u64,
                        error = ?core.state.last_error,
                        "Dependency unavailable"
                    );
                } else {
                    core.state.next_check_at = None;
                }
            }
        }

        self.publisher.publish(core.state.clone());
        result.available
    }

    fn schedule_retry(self: &Arc<Self>, core: &mut Core, delay: Duration) {
        core.retry_token = core.retry_token.wrapping_add(1);
        let retry = core.retry_token;
        let weak = Arc::downgrade(self);
        self.scheduler.arm(delay, move || async move {
            if let Some(inner) = weak.upgrade() {
                inner.check(Trigger::Timer { retry }).await;
            }
        });
    }
}
