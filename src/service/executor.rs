// src/service/executor.rs

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::{ProctorError, Result};
use crate::events::EventBus;
use crate::process::{
    ExitInfo, ExitWatch, LogLine, LogRing, ProcessControl, SpawnedProcess, TerminationStep,
    spawn_process, terminate, validate_process, wait_for_release,
};
use crate::service::events::ServiceEvent;
use crate::service::handle::{ServiceHandle, StopOptions, StopReport};
use crate::service::readiness::{ReadinessMatcher, port_of};
use crate::task::ServiceTask;
use crate::types::{OutputStream, ServiceStatus, ShutdownSignal};

pub const DEFAULT_LOG_CAPACITY: usize = 1000;
pub const DEFAULT_PORT_CHECK_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_PORT_CHECK_RETRIES: u32 = 10;
pub const DEFAULT_KILL_WAIT: Duration = Duration::from_secs(2);
pub const DEFAULT_MAX_LINE_BYTES: usize = 64 * 1024;

/// How long the exit monitor waits for the output readers to hit EOF before
/// deciding how the service ended.
const EXIT_DRAIN_GRACE: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceExecutorConfig {
    /// Lines kept per service; older lines are dropped.
    pub log_capacity: usize,
    pub port_check_interval: Duration,
    pub port_check_retries: u32,
    /// Bounded wait for the reap after a forced kill.
    pub kill_wait: Duration,
    /// Longer output lines are split into pieces of at most this many bytes.
    pub max_line_bytes: usize,
}

impl Default for ServiceExecutorConfig {
    fn default() -> Self {
        Self {
            log_capacity: DEFAULT_LOG_CAPACITY,
            port_check_interval: DEFAULT_PORT_CHECK_INTERVAL,
            port_check_retries: DEFAULT_PORT_CHECK_RETRIES,
            kill_wait: DEFAULT_KILL_WAIT,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }
}

/// Supervises long-running services.
///
/// Cheap to clone; clones share the registry and the event bus. Services
/// keep running when the executor is dropped, so call
/// [`stop_all`](Self::stop_all) before shutting down.
#[derive(Debug, Clone, Default)]
pub struct ServiceExecutor {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    config: ServiceExecutorConfig,
    registry: Mutex<HashMap<String, Arc<ServiceRecord>>>,
    events: EventBus<ServiceEvent>,
}

/// The live record of one service instance.
#[derive(Debug)]
struct ServiceRecord {
    id: String,
    task: ServiceTask,
    created_at: DateTime<Utc>,
    pid: Option<u32>,
    control: ProcessControl,
    exit: ExitWatch,
    status: watch::Sender<ServiceStatus>,
    state: Mutex<RecordState>,
    logs: Mutex<LogRing>,
}

#[derive(Debug)]
struct RecordState {
    endpoints: BTreeMap<String, String>,
    matches: BTreeMap<String, Vec<Option<String>>>,
    matcher: ReadinessMatcher,
    stop_requested: bool,
    readiness_timer: Option<JoinHandle<()>>,
}

impl ServiceRecord {
    fn status(&self) -> ServiceStatus {
        *self.status.borrow()
    }

    /// Move to `next` if the state machine allows it.
    fn transition(&self, next: ServiceStatus) -> bool {
        let moved = self.status.send_if_modified(|current| {
            if current.can_transition_to(next) {
                *current = next;
                true
            } else {
                false
            }
        });
        if moved {
            debug!(service = %self.id, status = %next, "service status changed");
        }
        moved
    }

    fn cancel_readiness_timer(&self) {
        if let Some(timer) = self.state.lock().readiness_timer.take() {
            timer.abort();
        }
    }

    fn snapshot(&self) -> ServiceHandle {
        let state = self.state.lock();
        ServiceHandle {
            id: self.id.clone(),
            task_id: self.task.descriptor.id.clone(),
            title: self.task.title().to_string(),
            pid: self.pid,
            status: self.status(),
            endpoints: state.endpoints.clone(),
            matches: state.matches.clone(),
            created_at: self.created_at,
        }
    }

    /// Ports of resolved endpoints flagged for release monitoring.
    fn monitored_ports(&self) -> Vec<u16> {
        let state = self.state.lock();
        let mut ports: Vec<u16> = self
            .task
            .monitored_endpoints()
            .filter_map(|ep| state.endpoints.get(&ep.endpoint_name))
            .filter_map(|url| port_of(url))
            .collect();
        ports.sort_unstable();
        ports.dedup();
        ports
    }
}

impl ServiceExecutor {
    pub fn new(config: ServiceExecutorConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                registry: Mutex::new(HashMap::new()),
                events: EventBus::new(),
            }),
        }
    }

    pub fn config(&self) -> &ServiceExecutorConfig {
        &self.inner.config
    }

    /// Receive every [`ServiceEvent`] emitted from now on.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ServiceEvent> {
        self.inner.events.subscribe()
    }

    /// Spawn `task` and wait for its boot to resolve.
    ///
    /// The returned snapshot is `running` once every readiness pattern
    /// matched or the readiness timeout elapsed. A spawn failure or an exit
    /// during boot yields a `failed` snapshot of a service that is already
    /// gone from the registry. Only descriptor validation errors are
    /// returned as `Err`.
    pub async fn start(&self, task: ServiceTask) -> Result<ServiceHandle> {
        validate_process(&task.process)?;
        let matcher = ReadinessMatcher::new(&task.readiness.patterns)?;

        let id = Uuid::new_v4().to_string();
        let created_at = Utc::now();
        info!(
            service = %id,
            title = %task.title(),
            cmd = %task.process.command_line(),
            patterns = matcher.len(),
            "starting service"
        );

        let SpawnedProcess {
            pid,
            stdout,
            stderr,
            exit,
            control,
        } = match spawn_process(&task.process, true) {
            Ok(spawned) => spawned,
            Err(err) => {
                warn!(service = %id, program = %task.process.command, error = %err, "failed to spawn service");
                self.inner.events.emit(ServiceEvent::ServiceFailed {
                    service_id: id.clone(),
                    reason: format!("failed to spawn '{}': {err}", task.process.command),
                });
                return Ok(ServiceHandle {
                    id,
                    task_id: task.descriptor.id.clone(),
                    title: task.title().to_string(),
                    pid: None,
                    status: ServiceStatus::Failed,
                    endpoints: BTreeMap::new(),
                    matches: BTreeMap::new(),
                    created_at,
                });
            }
        };

        let (status_tx, mut status_rx) = watch::channel(ServiceStatus::Booting);
        let readiness_timeout = task.readiness.timeout;
        let ready_at_once = matcher.is_complete();

        let record = Arc::new(ServiceRecord {
            id: id.clone(),
            task,
            created_at,
            pid,
            control,
            exit,
            status: status_tx,
            state: Mutex::new(RecordState {
                endpoints: BTreeMap::new(),
                matches: BTreeMap::new(),
                matcher,
                stop_requested: false,
                readiness_timer: None,
            }),
            logs: Mutex::new(LogRing::new(self.inner.config.log_capacity)),
        });

        self.inner
            .registry
            .lock()
            .insert(id.clone(), Arc::clone(&record));

        info!(service = %id, pid = ?pid, "service process spawned");
        self.inner.events.emit(ServiceEvent::ProcessSpawned {
            service_id: id.clone(),
            pid,
        });
        self.inner.events.emit(ServiceEvent::ServiceStarted {
            service_id: id.clone(),
            title: record.task.title().to_string(),
        });

        if ready_at_once {
            self.inner.mark_ready(&record);
        } else {
            let inner = Arc::clone(&self.inner);
            let rec = Arc::clone(&record);
            let timer = tokio::spawn(async move {
                sleep(readiness_timeout).await;
                inner.boot_timed_out(&rec);
            });
            record.state.lock().readiness_timer = Some(timer);
        }

        let mut readers = Vec::with_capacity(2);
        if let Some(out) = stdout {
            readers.push(tokio::spawn(read_lines(
                out,
                OutputStream::Stdout,
                Arc::clone(&self.inner),
                Arc::clone(&record),
            )));
        }
        if let Some(err) = stderr {
            readers.push(tokio::spawn(read_lines(
                err,
                OutputStream::Stderr,
                Arc::clone(&self.inner),
                Arc::clone(&record),
            )));
        }

        {
            let inner = Arc::clone(&self.inner);
            let rec = Arc::clone(&record);
            let mut exit = rec.exit.clone();
            tokio::spawn(async move {
                let info = exit.wait().await;
                // Lines written just before the exit still count towards
                // readiness. Grandchildren may hold the pipes open, hence
                // the bound.
                let drained = timeout(EXIT_DRAIN_GRACE, async {
                    for reader in readers {
                        let _ = reader.await;
                    }
                })
                .await;
                if drained.is_err() {
                    debug!(service = %rec.id, "output still open after exit");
                }
                inner.process_exited(&rec, info);
            });
        }

        let _ = status_rx
            .wait_for(|s| *s != ServiceStatus::Booting)
            .await;

        Ok(record.snapshot())
    }

    /// Stop the service `id` and wait until it is gone.
    ///
    /// A service still booting is first promoted to `running` (reported as
    /// a boot timeout) and then stopped normally.
    pub async fn stop(&self, id: &str, options: StopOptions) -> Result<StopReport> {
        let record = self.record(id)?;

        {
            let mut state = record.state.lock();
            if state.stop_requested || record.status().is_terminal() {
                return Err(ProctorError::ServiceNotFound(id.to_string()));
            }
            state.stop_requested = true;
        }

        if record.status() == ServiceStatus::Booting {
            self.inner.boot_timed_out(&record);
        }
        record.cancel_readiness_timer();

        let graceful = record.task.graceful_shutdown;
        let signal = if options.force {
            ShutdownSignal::Kill
        } else {
            graceful.signal
        };
        let grace = options.timeout.unwrap_or(graceful.timeout);

        record.transition(ServiceStatus::Stopping);
        info!(
            service = %id,
            pid = ?record.pid,
            signal = %signal,
            grace_ms = grace.as_millis() as u64,
            force = options.force,
            "stopping service"
        );
        self.inner.events.emit(ServiceEvent::ServiceStopping {
            service_id: id.to_string(),
            signal,
            force: options.force,
        });

        let events = self.inner.events.clone();
        let service_id = id.to_string();
        let mut on_step = move |step: TerminationStep| match step {
            TerminationStep::SignalSent(delivery) => events.emit(ServiceEvent::ShutdownSignalSent {
                service_id: service_id.clone(),
                signal: delivery.signal,
                target: delivery.target,
            }),
            TerminationStep::ForceKilled(delivery) => {
                events.emit(ServiceEvent::ProcessForceKilled {
                    service_id: service_id.clone(),
                    target: delivery.target,
                })
            }
        };

        let mut exit = record.exit.clone();
        let report = terminate(
            &record.control,
            &mut exit,
            signal,
            grace,
            self.inner.config.kill_wait,
            &mut on_step,
        )
        .await;

        let ports = self.inner.verify_port_release(&record).await;

        record.transition(ServiceStatus::Stopped);
        self.inner.remove(id);
        info!(
            service = %id,
            exit_code = ?report.exit.and_then(|e| e.code),
            forced = report.was_forced(),
            "service stopped"
        );
        self.inner.events.emit(ServiceEvent::ServiceStopped {
            service_id: id.to_string(),
            exit: report.exit,
        });

        Ok(StopReport {
            id: id.to_string(),
            exit: report.exit,
            forced: report.was_forced(),
            ports,
        })
    }

    /// Gracefully stop `id` and start a fresh instance of the same
    /// descriptor. The new service has a new id; nothing carries over.
    pub async fn restart(&self, id: &str) -> Result<ServiceHandle> {
        let task = self.record(id)?.task.clone();
        info!(service = %id, title = %task.title(), "restarting service");
        self.stop(id, StopOptions::graceful()).await?;
        self.start(task).await
    }

    pub fn get(&self, id: &str) -> Result<ServiceHandle> {
        self.record(id).map(|r| r.snapshot())
    }

    /// Every registered service, oldest first.
    pub fn list(&self) -> Vec<ServiceHandle> {
        let records: Vec<Arc<ServiceRecord>> =
            self.inner.registry.lock().values().cloned().collect();
        let mut handles: Vec<ServiceHandle> = records.iter().map(|r| r.snapshot()).collect();
        handles.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        handles
    }

    /// Buffered log lines of `id`; the last `tail` lines when given.
    pub fn logs(&self, id: &str, tail: Option<usize>) -> Result<Vec<LogLine>> {
        let record = self.record(id)?;
        let logs = record.logs.lock();
        Ok(match tail {
            Some(n) => logs.tail(n),
            None => logs.snapshot(),
        })
    }

    /// Gracefully stop every registered service concurrently.
    pub async fn stop_all(&self) -> Vec<Result<StopReport>> {
        let ids: Vec<String> = self.inner.registry.lock().keys().cloned().collect();
        if ids.is_empty() {
            return Vec::new();
        }
        info!(count = ids.len(), "stopping all services");

        let mut set = JoinSet::new();
        for id in ids {
            let executor = self.clone();
            set.spawn(async move { executor.stop(&id, StopOptions::graceful()).await });
        }

        let mut results = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => results.push(Err(ProctorError::Other(e.into()))),
            }
        }
        results
    }

    fn record(&self, id: &str) -> Result<Arc<ServiceRecord>> {
        self.inner
            .registry
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| ProctorError::ServiceNotFound(id.to_string()))
    }
}

impl Inner {
    fn remove(&self, id: &str) {
        self.registry.lock().remove(id);
    }

    fn mark_ready(&self, record: &ServiceRecord) {
        if !record.transition(ServiceStatus::Running) {
            return;
        }
        record.cancel_readiness_timer();
        let endpoints = record.state.lock().endpoints.clone();
        info!(service = %record.id, endpoints = ?endpoints, "service ready");
        self.events.emit(ServiceEvent::ServiceReady {
            service_id: record.id.clone(),
            endpoints,
        });
    }

    fn boot_timed_out(&self, record: &ServiceRecord) {
        if !record.transition(ServiceStatus::Running) {
            return;
        }
        let (unmatched, endpoints) = {
            let state = record.state.lock();
            (state.matcher.unmatched(), state.endpoints.clone())
        };
        warn!(
            service = %record.id,
            unmatched = ?unmatched,
            "readiness patterns did not all match in time; treating service as running"
        );
        self.events.emit(ServiceEvent::BootTimeout {
            service_id: record.id.clone(),
            unmatched,
            endpoints,
        });
    }

    fn on_line(&self, record: &ServiceRecord, stream: OutputStream, line: &str) {
        record.logs.lock().push(LogLine::new(stream, line));
        self.events.emit(ServiceEvent::Output {
            service_id: record.id.clone(),
            stream,
            line: line.to_string(),
        });

        if record.status().is_terminal() {
            return;
        }

        let complete = {
            let mut state = record.state.lock();
            if state.matcher.is_complete() {
                return;
            }
            for m in state.matcher.feed(line) {
                debug!(service = %record.id, pattern = %m.pattern, "readiness pattern matched");
                for (name, url) in m.endpoints {
                    state.endpoints.entry(name).or_insert(url);
                }
                state.matches.insert(m.pattern, m.captures);
            }
            state.matcher.is_complete()
        };

        if complete && record.status() == ServiceStatus::Booting {
            self.mark_ready(record);
        }
    }

    fn process_exited(&self, record: &ServiceRecord, exit: Option<ExitInfo>) {
        record.cancel_readiness_timer();

        // Decided under the state lock so a concurrent stop sees either the
        // terminal status or nothing.
        let state = record.state.lock();
        if state.stop_requested {
            return;
        }
        let failed = record.transition(ServiceStatus::Failed);
        let exited = !failed && record.transition(ServiceStatus::Exited);
        drop(state);

        let describe = match exit {
            Some(ExitInfo { code: Some(code), .. }) => format!("exit code {code}"),
            Some(ExitInfo {
                signal: Some(sig), ..
            }) => format!("signal {sig}"),
            _ => "unknown status".to_string(),
        };

        if failed {
            self.remove(&record.id);
            warn!(service = %record.id, exit = %describe, "service exited while booting");
            self.events.emit(ServiceEvent::ServiceFailed {
                service_id: record.id.clone(),
                reason: format!("process exited during boot with {describe}"),
            });
        } else if exited {
            self.remove(&record.id);
            warn!(service = %record.id, exit = %describe, "service exited unexpectedly");
            self.events.emit(ServiceEvent::ServiceExited {
                service_id: record.id.clone(),
                exit,
            });
        }
    }

    async fn verify_port_release(
        &self,
        record: &ServiceRecord,
    ) -> Option<crate::process::PortReleaseOutcome> {
        let ports = record.monitored_ports();
        if ports.is_empty() {
            return None;
        }

        debug!(service = %record.id, ports = ?ports, "checking port release");
        self.events.emit(ServiceEvent::CheckingPortRelease {
            service_id: record.id.clone(),
            ports: ports.clone(),
        });

        let outcome = wait_for_release(
            &ports,
            self.config.port_check_interval,
            self.config.port_check_retries,
        )
        .await;

        if outcome.all_released() {
            self.events.emit(ServiceEvent::PortsReleased {
                service_id: record.id.clone(),
                ports: outcome.released.clone(),
            });
        } else {
            warn!(
                service = %record.id,
                still_bound = ?outcome.still_bound,
                checks = outcome.checks,
                "ports still bound after service stopped"
            );
            self.events.emit(ServiceEvent::PortReleaseTimedOut {
                service_id: record.id.clone(),
                still_bound: outcome.still_bound.clone(),
                released: outcome.released.clone(),
            });
        }

        Some(outcome)
    }
}

/// Feed every line of `reader` to the record until EOF.
async fn read_lines<R>(reader: R, stream: OutputStream, inner: Arc<Inner>, record: Arc<ServiceRecord>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let max_line = inner.config.max_line_bytes.max(1);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match read_capped_line(&mut reader, &mut buf, max_line).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&buf);
                inner.on_line(&record, stream, text.trim_end_matches(['\n', '\r']));
            }
            Err(e) => {
                debug!(service = %record.id, stream = %stream, error = %e, "service output read failed");
                break;
            }
        }
    }
    debug!(service = %record.id, stream = %stream, "service output closed");
}

/// Like `read_until(b'\n')`, but returns early once `buf` holds `max` bytes.
/// The rest of an overlong line comes back on the following calls.
async fn read_capped_line<R>(reader: &mut R, buf: &mut Vec<u8>, max: usize) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(buf.len());
        }

        let room = max.saturating_sub(buf.len());
        let window = &available[..available.len().min(room)];
        if let Some(i) = window.iter().position(|b| *b == b'\n') {
            buf.extend_from_slice(&window[..=i]);
            reader.consume(i + 1);
            return Ok(buf.len());
        }

        let taken = window.len();
        buf.extend_from_slice(window);
        reader.consume(taken);
        if buf.len() >= max {
            return Ok(buf.len());
        }
    }
}
