use log::{debug, info, warn};
use serde::Serialize;

#[cfg(all(feature = "app", not(test)))]
use tauri::{AppHandle, Emitter, Runtime};

use crate::models::Task;

pub const EVENT_REMINDER: &str = "reminder_fired";
pub const EVENT_STATE_UPDATED: &str = "state_updated";

#[derive(Debug, Clone, Serialize)]
pub struct StatePayload {
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReminderPayload {
    pub task_id: String,
    pub title: String,
    /// Milliseconds since the Unix epoch.
    pub remind_at: i64,
}

/// Everything the reminder scheduler reports about its work.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SchedulerEvent {
    Started { interval_secs: u64 },
    Stopped,
    PassStarted { tasks: usize, candidates: usize },
    AccessorFailed { error: String },
    MalformedTask { error: String },
    PermissionMissing { candidates: usize },
    NormalizationFailed { task_id: String, error: String },
    NotDue { task_id: String, remind_at: String },
    AlreadyDelivered { task_id: String },
    AlertRejected { task_id: String, reason: String },
    Fired { task_id: String, title: String, remind_at: i64 },
    WriteBackSucceeded { task_id: String },
    WriteBackFailed { task_id: String, error: String },
}

/// Receives scheduler events. Called while a pass is in progress, so implementations must
/// not call back into the scheduler.
pub trait ReminderObserver: Send + Sync {
    fn on_event(&self, event: &SchedulerEvent);
}

/// Routes scheduler events to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl ReminderObserver for LogObserver {
    fn on_event(&self, event: &SchedulerEvent) {
        match event {
            SchedulerEvent::Started { interval_secs } => {
                info!("reminder scheduler started interval_secs={interval_secs}")
            }
            SchedulerEvent::Stopped => info!("reminder scheduler stopped"),
            SchedulerEvent::PassStarted { tasks, candidates } => {
                debug!("reminder pass tasks={tasks} candidates={candidates}")
            }
            SchedulerEvent::AccessorFailed { error } => {
                warn!("reminder pass skipped, task list unavailable: {error}")
            }
            SchedulerEvent::MalformedTask { error } => {
                warn!("reminder pass ignored malformed task entry: {error}")
            }
            SchedulerEvent::PermissionMissing { candidates } => {
                debug!("reminder pass skipped without notification permission candidates={candidates}")
            }
            SchedulerEvent::NormalizationFailed { task_id, error } => {
                warn!("reminder skipped task_id={task_id}: {error}")
            }
            SchedulerEvent::NotDue { task_id, remind_at } => {
                debug!("reminder not due task_id={task_id} remind_at={remind_at}")
            }
            SchedulerEvent::AlreadyDelivered { task_id } => {
                debug!("reminder already delivered task_id={task_id}")
            }
            SchedulerEvent::AlertRejected { task_id, reason } => {
                warn!("reminder not shown task_id={task_id}: {reason}")
            }
            SchedulerEvent::Fired {
                task_id,
                title,
                remind_at,
            } => info!("reminder fired task_id={task_id} title={title:?} remind_at={remind_at}"),
            SchedulerEvent::WriteBackSucceeded { task_id } => {
                debug!("reminder marked notified task_id={task_id}")
            }
            SchedulerEvent::WriteBackFailed { task_id, error } => {
                warn!("failed to mark reminder notified task_id={task_id}: {error}")
            }
        }
    }
}

/// Forwards fired reminders to the frontend and logs everything.
#[cfg(all(feature = "app", not(test)))]
pub struct TauriObserver<R: Runtime> {
    app: AppHandle<R>,
}

#[cfg(all(feature = "app", not(test)))]
impl<R: Runtime> TauriObserver<R> {
    pub fn new(app: AppHandle<R>) -> Self {
        Self { app }
    }
}

#[cfg(all(feature = "app", not(test)))]
impl<R: Runtime> ReminderObserver for TauriObserver<R> {
    fn on_event(&self, event: &SchedulerEvent) {
        LogObserver.on_event(event);
        if let SchedulerEvent::Fired {
            task_id,
            title,
            remind_at,
        } = event
        {
            let payload = ReminderPayload {
                task_id: task_id.clone(),
                title: title.clone(),
                remind_at: *remind_at,
            };
            let _ = self.app.emit(EVENT_REMINDER, payload);
        }
    }
}
