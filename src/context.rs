use std::sync::Arc;

use log::info;
use tokio::runtime::Handle;

use crate::events::ReminderObserver;
use crate::notify::{NotificationSink, PermissionState};
use crate::scheduler::{Clock, ReminderScheduler, SchedulerConfig, SchedulerError, SystemClock};
use crate::state::AppState;

/// Owns the task state and the reminder scheduler that watches it.
///
/// Dropping the context stops the scheduler.
pub struct ReminderContext<C: Clock = SystemClock> {
    state: AppState,
    scheduler: ReminderScheduler<C>,
}

impl ReminderContext<SystemClock> {
    pub fn new(
        state: AppState,
        sink: NotificationSink,
        observer: Arc<dyn ReminderObserver>,
    ) -> Self {
        Self::with_clock(SystemClock, state, sink, observer)
    }
}

impl<C: Clock> ReminderContext<C> {
    pub fn with_clock(
        clock: C,
        state: AppState,
        sink: NotificationSink,
        observer: Arc<dyn ReminderObserver>,
    ) -> Self {
        let config = SchedulerConfig::from(&state.settings());
        let scheduler =
            ReminderScheduler::with_clock(clock, sink, Arc::new(state.clone()), observer, config);
        Self { state, scheduler }
    }

    /// Runtime the scheduler spawns on when started from outside one.
    pub fn with_runtime(self, runtime: Handle) -> Self {
        self.scheduler.set_runtime(runtime);
        self
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn scheduler(&self) -> &ReminderScheduler<C> {
        &self.scheduler
    }

    pub fn permission_state(&self) -> PermissionState {
        self.scheduler.sink().permission_state()
    }

    /// Startup sequence: ask for permission, then start watching. Returns whether the
    /// scheduler ended up running.
    pub async fn init(&self) -> Result<bool, SchedulerError> {
        if !self.state.settings().reminders_enabled {
            info!("reminders disabled in settings; scheduler not started");
            return Ok(false);
        }
        if !self.scheduler.enable_reminders().await {
            info!(
                "notification permission not granted state={:?}; reminders will wait",
                self.permission_state()
            );
        }
        // Passes stay inert until permission arrives, so starting regardless is harmless.
        self.start_reminders()?;
        Ok(true)
    }

    pub fn start_reminders(&self) -> Result<(), SchedulerError> {
        let state = self.state.clone();
        self.scheduler.start(move || state.tasks())
    }

    pub fn stop_reminders(&self) {
        self.scheduler.stop();
    }

    pub fn shutdown(&self) {
        self.stop_reminders();
    }
}

impl<C: Clock> Drop for ReminderContext<C> {
    fn drop(&mut self) {
        self.scheduler.stop();
    }
}
