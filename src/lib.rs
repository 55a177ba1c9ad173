pub mod context;
pub mod date;
pub mod events;
pub mod models;
pub mod notify;
pub mod scheduler;
pub mod state;
pub mod storage;
pub mod store;
pub mod window;

#[cfg(any(feature = "app", test))]
mod commands;
#[cfg(any(feature = "app", test))]
mod logging;
#[cfg(all(feature = "app", not(test)))]
mod windows;

#[cfg(test)]
mod test_support;

pub use context::ReminderContext;
pub use date::{normalize, normalize_in, LocalFields, NormalizationError, NormalizedInstant, RawDate};
pub use events::{LogObserver, ReminderObserver, SchedulerEvent};
pub use models::{Reminder, Settings, Task, TaskFilter, TaskPatch};
pub use notify::{NotificationPlatform, NotificationSink, NotifyError, PermissionState};
pub use scheduler::{Clock, ReminderScheduler, SchedulerConfig, SchedulerError, SystemClock};
pub use state::AppState;
pub use store::{StoreError, TaskStore};
pub use window::is_due;

#[cfg(all(feature = "app", not(test)))]
use std::sync::Arc;

#[cfg(all(feature = "app", not(test)))]
use log::{info, warn};
#[cfg(all(feature = "app", not(test)))]
use tauri::{Manager, RunEvent};

#[cfg(all(feature = "app", not(test)))]
use crate::commands::*;
#[cfg(all(feature = "app", not(test)))]
use crate::events::TauriObserver;
#[cfg(all(feature = "app", not(test)))]
use crate::logging::init_logging;
#[cfg(all(feature = "app", not(test)))]
use crate::notify::TauriNotificationPlatform;
#[cfg(all(feature = "app", not(test)))]
use crate::storage::Storage;

#[cfg_attr(mobile, tauri::mobile_entry_point)]
#[cfg(all(feature = "app", not(test)))]
pub fn run() {
    let app = tauri::Builder::default()
        .plugin(tauri_plugin_notification::init())
        .setup(|app| {
            let data_dir = app.path().app_data_dir()?;
            if let Err(err) = init_logging(&data_dir) {
                eprintln!("failed to initialize logging: {err}");
            }

            let storage = Storage::new(data_dir);
            storage.ensure_dirs()?;
            let tasks = storage
                .load_tasks()
                .map(|data| data.tasks)
                .unwrap_or_else(|err| {
                    warn!("starting with an empty task list: {err}");
                    Vec::new()
                });
            let settings = storage
                .load_settings()
                .map(|data| data.settings)
                .unwrap_or_else(|err| {
                    warn!("using default settings: {err}");
                    Settings::default()
                });
            info!("loaded {} tasks", tasks.len());

            let state = AppState::with_storage(tasks, settings, storage);
            let sink = NotificationSink::new(Arc::new(TauriNotificationPlatform::new(
                app.handle().clone(),
            )));
            let observer = Arc::new(TauriObserver::new(app.handle().clone()));
            // Commands run on the main thread; timers go to Tauri's shared runtime.
            let runtime = tauri::async_runtime::handle().inner().clone();
            app.manage(ReminderContext::new(state, sink, observer).with_runtime(runtime));

            let handle = app.handle().clone();
            tauri::async_runtime::spawn(async move {
                let context = handle.state::<ReminderContext>();
                match context.init().await {
                    Ok(running) => info!("reminder startup complete running={running}"),
                    Err(err) => warn!("reminder scheduler not started: {err}"),
                }
            });

            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            list_tasks,
            create_task,
            update_task,
            toggle_task_completion,
            delete_task,
            used_categories,
            notification_permission,
            enable_reminders,
            start_reminders,
            stop_reminders,
        ])
        .build(tauri::generate_context!())
        .expect("error while building tauri application");

    app.run(|handle, event| {
        if let RunEvent::Exit = event {
            handle.state::<ReminderContext>().shutdown();
        }
    });
}
