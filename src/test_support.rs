//! Recording fakes shared by the scheduler, notification and command tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::events::{ReminderObserver, SchedulerEvent};
use crate::models::{Task, TaskFilter, TaskPatch};
use crate::notify::{Alert, NotificationPlatform, NotifyError, PermissionState};
use crate::scheduler::Clock;
use crate::store::{StoreError, TaskStore};

pub struct RecordingPlatform {
    state: Mutex<PermissionState>,
    prompt_result: Mutex<PermissionState>,
    prompts: AtomicUsize,
    displayed: Mutex<Vec<Alert>>,
    fail_display: AtomicBool,
}

impl RecordingPlatform {
    pub fn new(state: PermissionState) -> Self {
        Self {
            state: Mutex::new(state),
            prompt_result: Mutex::new(state),
            prompts: AtomicUsize::new(0),
            displayed: Mutex::new(Vec::new()),
            fail_display: AtomicBool::new(false),
        }
    }

    pub fn set_state(&self, state: PermissionState) {
        *self.state.lock().unwrap() = state;
    }

    pub fn set_prompt_result(&self, state: PermissionState) {
        *self.prompt_result.lock().unwrap() = state;
    }

    pub fn fail_display(&self, fail: bool) {
        self.fail_display.store(fail, Ordering::SeqCst);
    }

    pub fn prompts(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }

    pub fn displayed(&self) -> Vec<Alert> {
        self.displayed.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationPlatform for RecordingPlatform {
    fn permission_state(&self) -> PermissionState {
        *self.state.lock().unwrap()
    }

    async fn request_permission(&self) -> Result<PermissionState, NotifyError> {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        let result = *self.prompt_result.lock().unwrap();
        self.set_state(result);
        Ok(result)
    }

    fn display(&self, alert: &Alert) -> Result<(), NotifyError> {
        if self.fail_display.load(Ordering::SeqCst) {
            return Err(NotifyError::Platform("display refused".to_string()));
        }
        self.displayed.lock().unwrap().push(alert.clone());
        Ok(())
    }
}

/// Task store that records every write and can be told to fail them.
#[derive(Default)]
pub struct RecordingStore {
    updates: Mutex<Vec<(String, TaskPatch)>>,
    fail_updates: AtomicBool,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    pub fn updates(&self) -> Vec<(String, TaskPatch)> {
        self.updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskStore for RecordingStore {
    async fn list(&self, _filter: Option<&TaskFilter>) -> Result<Vec<Task>, StoreError> {
        Ok(Vec::new())
    }

    async fn create(&self, task: Task) -> Result<Task, StoreError> {
        Ok(task)
    }

    async fn update(&self, id: &str, patch: TaskPatch) -> Result<Task, StoreError> {
        self.updates.lock().unwrap().push((id.to_string(), patch));
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(StoreError::Invalid("store offline".to_string()));
        }
        Ok(Task::new(id))
    }

    async fn delete(&self, _id: &str) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Clock pinned to a settable instant in a fixed zone.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    zone: chrono_tz::Tz,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>, zone: chrono_tz::Tz) -> Self {
        Self {
            now: Mutex::new(now),
            zone,
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }
}

impl Clock for Arc<ManualClock> {
    type Zone = chrono_tz::Tz;

    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    fn zone(&self) -> Self::Zone {
        self.zone
    }
}

#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<SchedulerEvent>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<SchedulerEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, predicate: impl Fn(&SchedulerEvent) -> bool) -> usize {
        self.events().iter().filter(|event| predicate(event)).count()
    }
}

impl ReminderObserver for RecordingObserver {
    fn on_event(&self, event: &SchedulerEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
