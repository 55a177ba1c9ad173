use tauri::{AppHandle, Manager, Runtime};

const MAIN_WINDOW: &str = "main";

/// Brings the task list to the front. Called whenever a persistent reminder is displayed.
pub fn show_main_window<R: Runtime>(app: &AppHandle<R>) {
    if let Some(window) = app.get_webview_window(MAIN_WINDOW) {
        let _ = window.unminimize();
        let _ = window.show();
        let _ = window.set_focus();
    }
}
