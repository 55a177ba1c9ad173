use crate::context::ReminderContext;
use crate::events::StatePayload;
#[cfg(all(feature = "app", not(test)))]
use crate::events::EVENT_STATE_UPDATED;
use crate::models::{Task, TaskFilter, TaskPatch, PREDEFINED_CATEGORIES};
use crate::notify::PermissionState;
use crate::scheduler::Clock;
use crate::state::AppState;
use crate::store::StoreError;

#[cfg(all(feature = "app", not(test)))]
use tauri::{AppHandle, Emitter, Manager, Runtime, State};

#[derive(Debug, serde::Serialize)]
pub struct CommandResult<T> {
    pub ok: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CategoriesPayload {
    pub predefined: Vec<String>,
    pub used: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ReminderStatus {
    pub permission: PermissionState,
    pub running: bool,
}

trait CommandCtx {
    fn emit_state_updated(&self, payload: StatePayload);
}

fn ok<T>(data: T) -> CommandResult<T> {
    CommandResult {
        ok: true,
        data: Some(data),
        error: None,
    }
}

fn err<T>(message: &str) -> CommandResult<T> {
    CommandResult {
        ok: false,
        data: None,
        error: Some(message.to_string()),
    }
}

fn store_err<T>(error: StoreError) -> CommandResult<T> {
    err(&error.to_string())
}

fn broadcast(ctx: &impl CommandCtx, state: &AppState) {
    ctx.emit_state_updated(StatePayload {
        tasks: state.list_tasks(None),
    });
}

fn status<C: Clock>(context: &ReminderContext<C>) -> ReminderStatus {
    ReminderStatus {
        permission: context.permission_state(),
        running: context.scheduler().is_running(),
    }
}

#[cfg(all(feature = "app", not(test)))]
struct TauriCommandCtx<'a, R: Runtime> {
    app: &'a AppHandle<R>,
}

#[cfg(all(feature = "app", not(test)))]
impl<R: Runtime> CommandCtx for TauriCommandCtx<'_, R> {
    fn emit_state_updated(&self, payload: StatePayload) {
        let _ = self.app.emit(EVENT_STATE_UPDATED, payload);
    }
}

fn list_tasks_impl(state: &AppState, filter: Option<TaskFilter>) -> CommandResult<Vec<Task>> {
    ok(state.list_tasks(filter.as_ref()))
}

fn create_task_impl(ctx: &impl CommandCtx, state: &AppState, task: Task) -> CommandResult<Task> {
    match state.create_task(task) {
        Ok(task) => {
            broadcast(ctx, state);
            ok(task)
        }
        Err(error) => store_err(error),
    }
}

fn update_task_impl(
    ctx: &impl CommandCtx,
    state: &AppState,
    task_id: &str,
    patch: TaskPatch,
) -> CommandResult<Task> {
    match state.update_task(task_id, patch) {
        Ok(task) => {
            broadcast(ctx, state);
            ok(task)
        }
        Err(error) => store_err(error),
    }
}

fn toggle_task_completion_impl(
    ctx: &impl CommandCtx,
    state: &AppState,
    task_id: &str,
) -> CommandResult<Task> {
    match state.toggle_completion(task_id) {
        Ok(task) => {
            broadcast(ctx, state);
            ok(task)
        }
        Err(error) => store_err(error),
    }
}

fn delete_task_impl(ctx: &impl CommandCtx, state: &AppState, task_id: &str) -> CommandResult<bool> {
    match state.remove_task(task_id) {
        Ok(()) => {
            broadcast(ctx, state);
            ok(true)
        }
        Err(error) => store_err(error),
    }
}

fn categories_impl(state: &AppState) -> CommandResult<CategoriesPayload> {
    ok(CategoriesPayload {
        predefined: PREDEFINED_CATEGORIES.iter().map(|c| c.to_string()).collect(),
        used: state.used_categories(),
    })
}

fn notification_permission_impl<C: Clock>(
    context: &ReminderContext<C>,
) -> CommandResult<ReminderStatus> {
    ok(status(context))
}

/// Prompts for permission and, once granted, makes sure the scheduler is watching.
async fn enable_reminders_impl<C: Clock>(
    context: &ReminderContext<C>,
) -> CommandResult<ReminderStatus> {
    if !context.scheduler().enable_reminders().await {
        return ok(status(context));
    }
    if let Err(error) = context.start_reminders() {
        return err(&error.to_string());
    }
    ok(status(context))
}

fn start_reminders_impl<C: Clock>(context: &ReminderContext<C>) -> CommandResult<ReminderStatus> {
    match context.start_reminders() {
        Ok(()) => ok(status(context)),
        Err(error) => err(&error.to_string()),
    }
}

fn stop_reminders_impl<C: Clock>(context: &ReminderContext<C>) -> CommandResult<ReminderStatus> {
    context.stop_reminders();
    ok(status(context))
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn list_tasks(
    context: State<ReminderContext>,
    filter: Option<TaskFilter>,
) -> CommandResult<Vec<Task>> {
    list_tasks_impl(context.state(), filter)
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn create_task(
    app: AppHandle,
    context: State<ReminderContext>,
    task: Task,
) -> CommandResult<Task> {
    let ctx = TauriCommandCtx { app: &app };
    create_task_impl(&ctx, context.state(), task)
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn update_task(
    app: AppHandle,
    context: State<ReminderContext>,
    task_id: String,
    patch: TaskPatch,
) -> CommandResult<Task> {
    let ctx = TauriCommandCtx { app: &app };
    update_task_impl(&ctx, context.state(), &task_id, patch)
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn toggle_task_completion(
    app: AppHandle,
    context: State<ReminderContext>,
    task_id: String,
) -> CommandResult<Task> {
    let ctx = TauriCommandCtx { app: &app };
    toggle_task_completion_impl(&ctx, context.state(), &task_id)
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn delete_task(
    app: AppHandle,
    context: State<ReminderContext>,
    task_id: String,
) -> CommandResult<bool> {
    let ctx = TauriCommandCtx { app: &app };
    delete_task_impl(&ctx, context.state(), &task_id)
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn used_categories(context: State<ReminderContext>) -> CommandResult<CategoriesPayload> {
    categories_impl(context.state())
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn notification_permission(context: State<ReminderContext>) -> CommandResult<ReminderStatus> {
    notification_permission_impl(context.inner())
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub async fn enable_reminders(app: AppHandle) -> CommandResult<ReminderStatus> {
    let context = app.state::<ReminderContext>();
    enable_reminders_impl(context.inner()).await
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn start_reminders(context: State<ReminderContext>) -> CommandResult<ReminderStatus> {
    start_reminders_impl(context.inner())
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn stop_reminders(context: State<ReminderContext>) -> CommandResult<ReminderStatus> {
    stop_reminders_impl(context.inner())
}
