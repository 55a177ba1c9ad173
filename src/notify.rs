use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info, warn};
use serde::Serialize;

#[cfg(all(feature = "app", not(test)))]
use tauri::{AppHandle, Runtime};
#[cfg(all(feature = "app", not(test)))]
use tauri_plugin_notification::NotificationExt;

#[cfg(all(feature = "app", not(test)))]
use crate::windows::show_main_window;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionState {
    Granted,
    Denied,
    /// Neither granted nor denied yet; asking will prompt the user.
    Undetermined,
    /// The platform cannot show notifications at all.
    Unsupported,
}

/// A user-visible alert as handed to the platform.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct Alert {
    pub title: String,
    pub body: String,
    /// Stay on screen until the user interacts with it.
    pub require_interaction: bool,
    /// Clicking the alert brings the application to the front.
    pub focus_on_click: bool,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl Alert {
    pub fn new(title: &str, body: &str) -> Self {
        Self {
            title: title.to_string(),
            body: body.to_string(),
            require_interaction: true,
            focus_on_click: true,
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

#[derive(Debug)]
pub enum NotifyError {
    PermissionUnavailable(PermissionState),
    InvalidAlert(&'static str),
    Platform(String),
}

impl std::fmt::Display for NotifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotifyError::PermissionUnavailable(state) => {
                write!(f, "notification permission unavailable ({state:?})")
            }
            NotifyError::InvalidAlert(reason) => write!(f, "invalid alert: {reason}"),
            NotifyError::Platform(message) => write!(f, "platform error: {message}"),
        }
    }
}

impl std::error::Error for NotifyError {}

/// The permission-gated alert primitive of the host platform.
#[async_trait]
pub trait NotificationPlatform: Send + Sync {
    /// Current permission state. Must never prompt.
    fn permission_state(&self) -> PermissionState;

    /// Shows the user-facing permission prompt and reports the resulting state.
    async fn request_permission(&self) -> Result<PermissionState, NotifyError>;

    fn display(&self, alert: &Alert) -> Result<(), NotifyError>;
}

/// Best-effort notification delivery. Nothing here returns an error to the caller of
/// [`NotificationSink::show`]; failures are logged and dropped.
#[derive(Clone)]
pub struct NotificationSink {
    platform: Arc<dyn NotificationPlatform>,
}

impl NotificationSink {
    pub fn new(platform: Arc<dyn NotificationPlatform>) -> Self {
        Self { platform }
    }

    pub fn permission_state(&self) -> PermissionState {
        self.platform.permission_state()
    }

    pub fn has_permission(&self) -> bool {
        self.permission_state() == PermissionState::Granted
    }

    /// Prompts only while the state is undetermined. Returns whether permission is granted.
    pub async fn request_permission(&self) -> bool {
        match self.platform.permission_state() {
            PermissionState::Granted => true,
            PermissionState::Denied => {
                debug!("notification permission previously denied; not prompting");
                false
            }
            PermissionState::Unsupported => {
                info!("notifications are not supported on this platform");
                false
            }
            PermissionState::Undetermined => match self.platform.request_permission().await {
                Ok(state) => {
                    info!("notification permission prompt result={state:?}");
                    state == PermissionState::Granted
                }
                Err(err) => {
                    warn!("notification permission request failed: {err}");
                    false
                }
            },
        }
    }

    pub fn show(&self, title: &str, body: &str) {
        if let Err(err) = self.try_show(title, body) {
            warn!("notification not shown title={title:?}: {err}");
        }
    }

    pub fn try_show(&self, title: &str, body: &str) -> Result<(), NotifyError> {
        let state = self.platform.permission_state();
        if state != PermissionState::Granted {
            return Err(NotifyError::PermissionUnavailable(state));
        }
        if title.trim().is_empty() {
            return Err(NotifyError::InvalidAlert("missing title"));
        }
        self.platform.display(&Alert::new(title, body))?;
        debug!("notification shown title={title:?}");
        Ok(())
    }
}

#[cfg(all(feature = "app", not(test)))]
pub struct TauriNotificationPlatform<R: Runtime> {
    app: AppHandle<R>,
}

#[cfg(all(feature = "app", not(test)))]
impl<R: Runtime> TauriNotificationPlatform<R> {
    pub fn new(app: AppHandle<R>) -> Self {
        Self { app }
    }
}

#[cfg(all(feature = "app", not(test)))]
fn from_plugin_state(state: tauri::plugin::PermissionState) -> PermissionState {
    match state {
        tauri::plugin::PermissionState::Granted => PermissionState::Granted,
        tauri::plugin::PermissionState::Denied => PermissionState::Denied,
        _ => PermissionState::Undetermined,
    }
}

#[cfg(all(feature = "app", not(test)))]
#[async_trait]
impl<R: Runtime> NotificationPlatform for TauriNotificationPlatform<R> {
    fn permission_state(&self) -> PermissionState {
        match self.app.notification().permission_state() {
            Ok(state) => from_plugin_state(state),
            Err(err) => {
                warn!("notification permission query failed: {err}");
                PermissionState::Unsupported
            }
        }
    }

    async fn request_permission(&self) -> Result<PermissionState, NotifyError> {
        self.app
            .notification()
            .request_permission()
            .map(from_plugin_state)
            .map_err(|err| NotifyError::Platform(err.to_string()))
    }

    fn display(&self, alert: &Alert) -> Result<(), NotifyError> {
        let mut builder = self
            .app
            .notification()
            .builder()
            .title(alert.title.clone())
            .body(alert.body.clone());
        // The desktop plugin has no click callback; the toast just dismisses itself.
        if alert.focus_on_click {
            builder = builder.auto_cancel();
        }
        builder
            .show()
            .map_err(|err| NotifyError::Platform(err.to_string()))?;
        // Desktop toasts vanish on their own, so the app raises itself on every reminder.
        if alert.require_interaction {
            show_main_window(&self.app);
        }
        Ok(())
    }
}
