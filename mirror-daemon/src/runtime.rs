use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use mirror_sync::{sync, EventSink, LogSink, SyncOptions, SyncReport};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::MirrorConfig;
use crate::error::{io_err, DaemonError};
use crate::logging::init_logging;

/// Sink shared between the scheduler and the blocking pass threads.
pub type SharedSink = Arc<dyn EventSink + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Tick,
    Request,
}

impl Trigger {
    fn label(self) -> &'static str {
        match self {
            Trigger::Tick => "interval",
            Trigger::Request => "request",
        }
    }
}

struct PassRequest {
    respond_to: oneshot::Sender<Result<SyncReport, String>>,
}

/// What each pass needs, detached from logging settings.
#[derive(Clone)]
struct PassJob {
    source: PathBuf,
    replica: PathBuf,
    interval: Duration,
    options: SyncOptions,
    sink: SharedSink,
}

/// Control surface for a running scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    requests: mpsc::Sender<PassRequest>,
    shutdown: broadcast::Sender<()>,
}

impl SchedulerHandle {
    /// Queue a pass behind any pass already running and wait for its report.
    pub async fn sync_now(&self) -> Result<SyncReport, DaemonError> {
        let (tx, rx) = oneshot::channel();
        self.requests
            .send(PassRequest { respond_to: tx })
            .await
            .map_err(|_| DaemonError::ChannelClosed("pass queue"))?;

        let outcome = rx
            .await
            .map_err(|_| DaemonError::ChannelClosed("pass response"))?;
        outcome.map_err(DaemonError::Runtime)
    }

    /// Ask the scheduler to exit after the pass in progress, if any.
    pub fn stop(&self) {
        let _ = self.shutdown.send(());
    }

    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown.subscribe()
    }
}

/// Start the mirror and block the current thread until ctrl-c.
pub fn start_blocking(config: &MirrorConfig) -> Result<(), DaemonError> {
    config.validate()?;
    init_logging(&config.log)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(config.clone()))
}

/// Run one pass with logging installed, without a scheduler.
pub fn run_once(config: &MirrorConfig) -> Result<SyncReport, DaemonError> {
    config.validate()?;
    init_logging(&config.log)?;
    Ok(sync(&config.source, &config.replica, &LogSink, &config.options))
}

/// Run the scheduler until ctrl-c or [`SchedulerHandle::stop`].
pub async fn run(config: MirrorConfig) -> Result<(), DaemonError> {
    let (handle, scheduler) = spawn(&config);
    tracing::info!(
        source = %config.source.display(),
        replica = %config.replica.display(),
        interval_secs = config.interval.as_secs(),
        "mirror started",
    );

    let signal_handle = {
        let handle = handle.clone();
        let mut shutdown_rx = handle.subscribe_shutdown();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    handle.stop();
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down");
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Runtime(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (scheduler_result, signal_result) = tokio::join!(scheduler, signal_handle);
    handle_join("scheduler", scheduler_result)?;
    handle_join("signal_handler", signal_result)?;
    tracing::info!("mirror stopped");
    Ok(())
}

/// Spawn the scheduler task, reporting pass events through [`LogSink`].
pub fn spawn(config: &MirrorConfig) -> (SchedulerHandle, JoinHandle<Result<(), DaemonError>>) {
    spawn_with_sink(config, Arc::new(LogSink))
}

/// Spawn the scheduler task with a custom event sink.
///
/// The first pass starts immediately; later passes follow every
/// `config.interval`. Ticks that come due while a pass is still running are
/// skipped, and requests queue behind it, so passes never overlap.
pub fn spawn_with_sink(
    config: &MirrorConfig,
    sink: SharedSink,
) -> (SchedulerHandle, JoinHandle<Result<(), DaemonError>>) {
    let (request_tx, request_rx) = mpsc::channel::<PassRequest>(16);
    let (shutdown_tx, _) = broadcast::channel::<()>(4);

    let job = PassJob {
        source: config.source.clone(),
        replica: config.replica.clone(),
        interval: config.interval,
        options: config.options.clone(),
        sink,
    };

    let task = {
        let shutdown = shutdown_tx.clone();
        let shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            let result = scheduler_task(job, request_rx, shutdown_rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    (
        SchedulerHandle {
            requests: request_tx,
            shutdown: shutdown_tx,
        },
        task,
    )
}

async fn scheduler_task(
    job: PassJob,
    mut request_rx: mpsc::Receiver<PassRequest>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    if job.interval.is_zero() {
        return Err(DaemonError::Config(
            "interval must be greater than zero".to_string(),
        ));
    }

    let mut interval = tokio::time::interval(job.interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut passes = 0u64;

    loop {
        // Shutdown wins, then the due tick, then queued requests.
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                passes += 1;
                let _ = run_pass(&job, Trigger::Tick, passes).await;
            }
            maybe_request = request_rx.recv() => {
                let Some(request) = maybe_request else { break };
                passes += 1;
                let outcome = run_pass(&job, Trigger::Request, passes).await;
                let _ = request.respond_to.send(outcome);
            }
        }
    }

    tracing::debug!(passes, "scheduler exiting");
    Ok(())
}

/// Run one pass on the blocking pool. Failures are logged, never propagated,
/// so the next interval always gets a chance to heal the replica.
async fn run_pass(job: &PassJob, trigger: Trigger, pass: u64) -> Result<SyncReport, String> {
    let started = Instant::now();
    let source = job.source.clone();
    let replica = job.replica.clone();
    let options = job.options.clone();
    let sink = job.sink.clone();

    let joined = tokio::task::spawn_blocking(move || {
        sync(&source, &replica, sink.as_ref(), &options)
    })
    .await;

    match joined {
        Ok(report) => {
            if let Some(reason) = &report.aborted {
                tracing::error!(
                    pass,
                    trigger = trigger.label(),
                    error = %reason,
                    "sync pass aborted; retrying next interval",
                );
            } else {
                tracing::debug!(
                    pass,
                    trigger = trigger.label(),
                    mutations = report.mutations(),
                    failures = report.failures.len(),
                    duration_ms = started.elapsed().as_millis() as u64,
                    "sync pass finished",
                );
            }
            Ok(report)
        }
        Err(err) => {
            tracing::error!(pass, error = %err, "sync pass panicked; retrying next interval");
            Err(format!("sync pass join error: {err}"))
        }
    }
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Runtime(format!(
            "{task} task join failure: {err}"
        ))),
    }
}
