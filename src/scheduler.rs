//! Reminder scheduler.
//!
//! A cancellable periodic task re-reads the current task list through an accessor, finds
//! reminder candidates that are due, shows one notification per reminder and writes
//! `reminder.notified = true` back to the task store. Per-task failures are reported to the
//! [`ReminderObserver`] and never abort a pass.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Local, TimeZone, Utc};
use log::debug;
use serde_json::Value;
use tokio::runtime::{Handle, TryCurrentError};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::date::{normalize_in, LocalFields, RawDate};
use crate::events::{ReminderObserver, SchedulerEvent};
use crate::models::{Settings, Task, TaskPatch, DEFAULT_REMINDER_BODY};
use crate::notify::NotificationSink;
use crate::store::TaskStore;
use crate::window::{is_due_within, DUE_TOLERANCE_MINUTES};

pub const TICK_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub tick_interval: Duration,
    pub tolerance_minutes: u32,
    /// Notification body for tasks without a description.
    pub default_body: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: TICK_INTERVAL,
            tolerance_minutes: DUE_TOLERANCE_MINUTES,
            default_body: DEFAULT_REMINDER_BODY.to_string(),
        }
    }
}

impl From<&Settings> for SchedulerConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            tick_interval: Duration::from_secs(settings.tick_interval_secs.max(1)),
            tolerance_minutes: settings.due_tolerance_minutes,
            default_body: settings.default_body.clone(),
        }
    }
}

/// Source of "now" and of the zone whose wall clock reminders are compared in.
pub trait Clock: Send + Sync + 'static {
    type Zone: TimeZone;

    fn now(&self) -> DateTime<Utc>;
    fn zone(&self) -> Self::Zone;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    type Zone = Local;

    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn zone(&self) -> Self::Zone {
        Local
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessorFailure {
    Panicked(String),
    NotACollection(String),
    Source(String),
}

impl std::fmt::Display for AccessorFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccessorFailure::Panicked(message) => write!(f, "task accessor panicked: {message}"),
            AccessorFailure::NotACollection(kind) => {
                write!(f, "task accessor returned {kind} instead of a list")
            }
            AccessorFailure::Source(message) => write!(f, "task accessor failed: {message}"),
        }
    }
}

impl std::error::Error for AccessorFailure {}

/// Tasks seen by one pass, plus descriptions of entries that could not be read as tasks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskSnapshot {
    pub tasks: Vec<Task>,
    pub malformed: Vec<String>,
}

/// What a task accessor may hand back.
pub trait IntoSnapshot {
    fn into_snapshot(self) -> Result<TaskSnapshot, AccessorFailure>;
}

impl TaskSnapshot {
    /// Tasks without an id cannot be acknowledged, so they count as malformed.
    fn push(&mut self, task: Task) {
        if task.id.trim().is_empty() {
            self.malformed.push(format!("task {:?} has no id", task.title));
        } else {
            self.tasks.push(task);
        }
    }
}

impl IntoSnapshot for Vec<Task> {
    fn into_snapshot(self) -> Result<TaskSnapshot, AccessorFailure> {
        let mut snapshot = TaskSnapshot::default();
        for task in self {
            snapshot.push(task);
        }
        Ok(snapshot)
    }
}

impl<E: std::fmt::Display> IntoSnapshot for Result<Vec<Task>, E> {
    fn into_snapshot(self) -> Result<TaskSnapshot, AccessorFailure> {
        self.map_err(|err| AccessorFailure::Source(err.to_string()))
            .and_then(IntoSnapshot::into_snapshot)
    }
}

impl IntoSnapshot for Value {
    fn into_snapshot(self) -> Result<TaskSnapshot, AccessorFailure> {
        match self {
            Value::Array(items) => {
                let mut snapshot = TaskSnapshot::default();
                for item in items {
                    match serde_json::from_value::<Task>(item) {
                        Ok(task) => snapshot.push(task),
                        Err(err) => snapshot.malformed.push(err.to_string()),
                    }
                }
                Ok(snapshot)
            }
            other => Err(AccessorFailure::NotACollection(
                json_kind(&other).to_string(),
            )),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

type TasksAccessor = Arc<dyn Fn() -> Result<TaskSnapshot, AccessorFailure> + Send + Sync>;

#[derive(Debug)]
pub enum SchedulerError {
    InvalidStart(String),
}

impl std::fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulerError::InvalidStart(message) => {
                write!(f, "cannot start reminder scheduler: {message}")
            }
        }
    }
}

impl std::error::Error for SchedulerError {}

/// Outcome of one evaluation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub tasks: usize,
    pub candidates: usize,
    pub fired: Vec<String>,
}

pub struct ReminderScheduler<C: Clock = SystemClock> {
    inner: Arc<Inner<C>>,
}

impl<C: Clock> Clone for ReminderScheduler<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<C> {
    clock: C,
    sink: NotificationSink,
    store: Arc<dyn TaskStore>,
    observer: Arc<dyn ReminderObserver>,
    config: SchedulerConfig,
    run: Mutex<RunSlot>,
    /// Reminder instant (epoch millis) already shown, per task id.
    delivered: Mutex<HashMap<String, i64>>,
    /// Runtime for the tick loop and write-backs; the caller's runtime when unset.
    runtime: Mutex<Option<Handle>>,
}

#[derive(Default)]
struct RunSlot {
    generation: u64,
    cancel: Option<CancellationToken>,
}

impl ReminderScheduler<SystemClock> {
    pub fn new(
        sink: NotificationSink,
        store: Arc<dyn TaskStore>,
        observer: Arc<dyn ReminderObserver>,
        config: SchedulerConfig,
    ) -> Self {
        Self::with_clock(SystemClock, sink, store, observer, config)
    }
}

impl<C: Clock> ReminderScheduler<C> {
    pub fn with_clock(
        clock: C,
        sink: NotificationSink,
        store: Arc<dyn TaskStore>,
        observer: Arc<dyn ReminderObserver>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                clock,
                sink,
                store,
                observer,
                config,
                run: Mutex::new(RunSlot::default()),
                delivered: Mutex::new(HashMap::new()),
                runtime: Mutex::new(None),
            }),
        }
    }

    /// Pins the runtime timers and write-backs are spawned on, so `start` works from threads
    /// that are not inside a Tokio runtime (e.g. a GUI event loop).
    pub fn with_runtime(self, runtime: Handle) -> Self {
        self.set_runtime(runtime);
        self
    }

    pub fn set_runtime(&self, runtime: Handle) {
        *self.inner.runtime.lock().expect("state poisoned") = Some(runtime);
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    pub fn sink(&self) -> &NotificationSink {
        &self.inner.sink
    }

    pub fn is_running(&self) -> bool {
        let slot = self.inner.run.lock().expect("state poisoned");
        slot.cancel.is_some()
    }

    /// Asks for notification permission. A `true` result is the caller's cue to [`start`].
    ///
    /// [`start`]: ReminderScheduler::start
    pub async fn enable_reminders(&self) -> bool {
        self.inner.sink.request_permission().await
    }

    /// Runs one pass immediately, then one per tick interval until [`stop`].
    ///
    /// Calling this while already running is a no-op. Fails only when no runtime was pinned
    /// with [`with_runtime`] and the caller is not inside one.
    ///
    /// The accessor runs while the scheduler's run lock is held: it must not call back into
    /// the scheduler (`is_running`, `stop`, ...) or it deadlocks.
    ///
    /// [`with_runtime`]: ReminderScheduler::with_runtime
    /// [`stop`]: ReminderScheduler::stop
    pub fn start<F, S>(&self, accessor: F) -> Result<(), SchedulerError>
    where
        F: Fn() -> S + Send + Sync + 'static,
        S: IntoSnapshot,
    {
        let runtime = self.inner.runtime().map_err(|err| {
            SchedulerError::InvalidStart(format!("no async runtime to arm the timer on: {err}"))
        })?;

        let mut slot = self.inner.run.lock().expect("state poisoned");
        if slot.cancel.is_some() {
            debug!("reminder scheduler already running; start ignored");
            return Ok(());
        }
        let accessor: TasksAccessor = Arc::new(move || accessor().into_snapshot());
        slot.generation += 1;
        let generation = slot.generation;
        let cancel = CancellationToken::new();
        slot.cancel = Some(cancel.clone());

        self.inner.emit(SchedulerEvent::Started {
            interval_secs: self.inner.config.tick_interval.as_secs(),
        });
        self.inner.run_pass(fetch_snapshot(&accessor));
        drop(slot);

        let inner = Arc::clone(&self.inner);
        runtime.spawn(inner.tick_loop(generation, cancel, accessor));
        Ok(())
    }

    /// No pass starts after this returns. In-flight write-backs are left to finish.
    pub fn stop(&self) {
        let mut slot = self.inner.run.lock().expect("state poisoned");
        if let Some(cancel) = slot.cancel.take() {
            slot.generation += 1;
            cancel.cancel();
            drop(slot);
            self.inner.emit(SchedulerEvent::Stopped);
        }
    }

    /// Runs a single pass over `tasks` right now, outside the timer.
    pub fn check_reminders<S: IntoSnapshot>(&self, tasks: S) -> PassReport {
        let _slot = self.inner.run.lock().expect("state poisoned");
        self.inner.run_pass(tasks.into_snapshot())
    }
}

impl<C: Clock> Inner<C> {
    fn emit(&self, event: SchedulerEvent) {
        self.observer.on_event(&event);
    }

    fn runtime(&self) -> Result<Handle, TryCurrentError> {
        let pinned = self.runtime.lock().expect("state poisoned").clone();
        match pinned {
            Some(runtime) => Ok(runtime),
            None => Handle::try_current(),
        }
    }

    async fn tick_loop(
        self: Arc<Self>,
        generation: u64,
        cancel: CancellationToken,
        accessor: TasksAccessor,
    ) {
        let period = self.config.tick_interval.max(Duration::from_millis(1));
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    if !self.tick(generation, &accessor) {
                        break;
                    }
                }
            }
        }
    }

    /// Holds the run slot for the whole pass so `stop` waits for it.
    fn tick(self: &Arc<Self>, generation: u64, accessor: &TasksAccessor) -> bool {
        let slot = self.run.lock().expect("state poisoned");
        if slot.generation != generation || slot.cancel.is_none() {
            return false;
        }
        self.run_pass(fetch_snapshot(accessor));
        true
    }

    fn run_pass(
        self: &Arc<Self>,
        fetched: Result<TaskSnapshot, AccessorFailure>,
    ) -> PassReport {
        let snapshot = match fetched {
            Ok(snapshot) => snapshot,
            Err(failure) => {
                self.emit(SchedulerEvent::AccessorFailed {
                    error: failure.to_string(),
                });
                return PassReport::default();
            }
        };
        for error in &snapshot.malformed {
            self.emit(SchedulerEvent::MalformedTask {
                error: error.clone(),
            });
        }

        let candidates: Vec<(&Task, &RawDate)> = snapshot
            .tasks
            .iter()
            .filter_map(|task| task.pending_reminder_date().map(|date| (task, date)))
            .collect();
        let mut report = PassReport {
            tasks: snapshot.tasks.len(),
            candidates: candidates.len(),
            fired: Vec::new(),
        };
        self.emit(SchedulerEvent::PassStarted {
            tasks: report.tasks,
            candidates: report.candidates,
        });
        self.prune_deliveries(&candidates);
        if candidates.is_empty() {
            return report;
        }
        if !self.sink.has_permission() {
            self.emit(SchedulerEvent::PermissionMissing {
                candidates: report.candidates,
            });
            return report;
        }

        let zone = self.clock.zone();
        let now = LocalFields::from_instant(&self.clock.now(), &zone);
        let mut seen = HashSet::new();
        for (task, raw) in candidates {
            if !seen.insert(task.id.as_str()) {
                continue;
            }
            let normalized = match normalize_in(raw, &zone) {
                Ok(normalized) => normalized,
                Err(err) => {
                    self.emit(SchedulerEvent::NormalizationFailed {
                        task_id: task.id.clone(),
                        error: err.to_string(),
                    });
                    continue;
                }
            };
            if !is_due_within(&normalized.local, &now, self.config.tolerance_minutes) {
                self.emit(SchedulerEvent::NotDue {
                    task_id: task.id.clone(),
                    remind_at: normalized.local.to_string(),
                });
                continue;
            }
            let remind_at = normalized.instant.timestamp_millis();
            if !self.record_delivery(&task.id, remind_at) {
                self.emit(SchedulerEvent::AlreadyDelivered {
                    task_id: task.id.clone(),
                });
                continue;
            }

            // An untitled task gets no alert but is still acknowledged.
            if task.title.trim().is_empty() {
                self.emit(SchedulerEvent::AlertRejected {
                    task_id: task.id.clone(),
                    reason: "missing title".to_string(),
                });
                self.spawn_write_back(task.id.clone(), remind_at);
                continue;
            }
            let title = format!("Task Reminder: {}", task.title);
            let body = task
                .description
                .as_deref()
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .unwrap_or(&self.config.default_body);
            self.sink.show(&title, body);
            self.emit(SchedulerEvent::Fired {
                task_id: task.id.clone(),
                title: task.title.clone(),
                remind_at,
            });
            report.fired.push(task.id.clone());
            self.spawn_write_back(task.id.clone(), remind_at);
        }
        report
    }

    /// Fire-and-continue acknowledgement. A failed write forgets the delivery so a later
    /// pass may notify again.
    fn spawn_write_back(self: &Arc<Self>, task_id: String, remind_at: i64) {
        let runtime = match self.runtime() {
            Ok(runtime) => runtime,
            Err(err) => {
                self.forget_delivery(&task_id, remind_at);
                self.emit(SchedulerEvent::WriteBackFailed {
                    task_id,
                    error: err.to_string(),
                });
                return;
            }
        };
        let inner = Arc::clone(self);
        runtime.spawn(async move {
            match inner.store.update(&task_id, TaskPatch::mark_notified()).await {
                Ok(_) => inner.emit(SchedulerEvent::WriteBackSucceeded { task_id }),
                Err(err) => {
                    inner.forget_delivery(&task_id, remind_at);
                    inner.emit(SchedulerEvent::WriteBackFailed {
                        task_id,
                        error: err.to_string(),
                    });
                }
            }
        });
    }

    fn record_delivery(&self, task_id: &str, remind_at: i64) -> bool {
        let mut delivered = self.delivered.lock().expect("state poisoned");
        if delivered.get(task_id) == Some(&remind_at) {
            return false;
        }
        delivered.insert(task_id.to_string(), remind_at);
        true
    }

    fn forget_delivery(&self, task_id: &str, remind_at: i64) {
        let mut delivered = self.delivered.lock().expect("state poisoned");
        if delivered.get(task_id) == Some(&remind_at) {
            delivered.remove(task_id);
        }
    }

    fn prune_deliveries(&self, candidates: &[(&Task, &RawDate)]) {
        let live: HashSet<&str> = candidates.iter().map(|(task, _)| task.id.as_str()).collect();
        let mut delivered = self.delivered.lock().expect("state poisoned");
        delivered.retain(|task_id, _| live.contains(task_id.as_str()));
    }
}

fn fetch_snapshot(accessor: &TasksAccessor) -> Result<TaskSnapshot, AccessorFailure> {
    match panic::catch_unwind(AssertUnwindSafe(|| accessor())) {
        Ok(result) => result,
        Err(payload) => Err(AccessorFailure::Panicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .copied()
        .map(str::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "<non-string panic payload>".to_string())
}
