use serde::{Deserialize, Serialize};

use crate::date::RawDate;

pub type Timestamp = i64;

pub const PREDEFINED_CATEGORIES: [&str; 8] = [
    "Work",
    "Personal",
    "Shopping",
    "Health",
    "Education",
    "Finance",
    "Home",
    "Other",
];

pub const DEFAULT_REMINDER_BODY: &str = "It's time for your task!";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct Reminder {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub date: Option<RawDate>,
    #[serde(default)]
    pub notified: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct Task {
    #[serde(default, alias = "_id")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub due_date: Option<RawDate>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub reminder: Option<Reminder>,
    #[serde(default)]
    pub created_at: Timestamp,
    #[serde(default)]
    pub updated_at: Timestamp,
}

impl Task {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            title: title.into(),
            description: None,
            due_date: None,
            category: None,
            completed: false,
            reminder: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    pub fn with_reminder(mut self, date: impl Into<RawDate>) -> Self {
        self.reminder = Some(Reminder {
            enabled: true,
            date: Some(date.into()),
            notified: false,
        });
        self
    }

    /// The reminder date when this task is a reminder candidate.
    pub fn pending_reminder_date(&self) -> Option<&RawDate> {
        if self.completed {
            return None;
        }
        let reminder = self.reminder.as_ref()?;
        if !reminder.enabled || reminder.notified {
            return None;
        }
        reminder.date.as_ref()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct ReminderPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<RawDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notified: Option<bool>,
}

/// Partial update applied by the task store. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<RawDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminder: Option<ReminderPatch>,
}

impl TaskPatch {
    /// The acknowledgement the reminder engine writes back after a notification fired.
    pub fn mark_notified() -> Self {
        Self {
            reminder: Some(ReminderPatch {
                notified: Some(true),
                ..ReminderPatch::default()
            }),
            ..Self::default()
        }
    }

    pub fn completed(completed: bool) -> Self {
        Self {
            completed: Some(completed),
            ..Self::default()
        }
    }

    pub fn apply(self, task: &mut Task) {
        if let Some(title) = self.title {
            task.title = title;
        }
        if let Some(description) = self.description {
            task.description = Some(description).filter(|text| !text.trim().is_empty());
        }
        if let Some(due_date) = self.due_date {
            task.due_date = Some(due_date);
        }
        if let Some(category) = self.category {
            task.category = Some(category).filter(|text| !text.trim().is_empty());
        }
        if let Some(completed) = self.completed {
            task.completed = completed;
        }
        if let Some(patch) = self.reminder {
            let reminder = task.reminder.get_or_insert_with(Reminder::default);
            if let Some(enabled) = patch.enabled {
                reminder.enabled = enabled;
            }
            if let Some(date) = patch.date {
                // A moved reminder is a new reminder: re-arm it unless the patch says otherwise.
                if reminder.date.as_ref() != Some(&date) && patch.notified.is_none() {
                    reminder.notified = false;
                }
                reminder.date = Some(date);
            }
            if let Some(notified) = patch.notified {
                reminder.notified = notified;
            }
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct TaskFilter {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        if let Some(category) = self.category.as_deref().filter(|c| !c.is_empty()) {
            if task.category.as_deref() != Some(category) {
                return false;
            }
        }
        let Some(needle) = self
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        else {
            return true;
        };
        let needle = needle.to_lowercase();
        task.title.to_lowercase().contains(&needle)
            || task
                .description
                .as_deref()
                .is_some_and(|text| text.to_lowercase().contains(&needle))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct Settings {
    #[serde(default = "default_reminders_enabled")]
    pub reminders_enabled: bool,
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
    #[serde(default = "default_due_tolerance_minutes")]
    pub due_tolerance_minutes: u32,
    #[serde(default = "default_reminder_body")]
    pub default_body: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            reminders_enabled: default_reminders_enabled(),
            tick_interval_secs: default_tick_interval_secs(),
            due_tolerance_minutes: default_due_tolerance_minutes(),
            default_body: default_reminder_body(),
        }
    }
}

fn default_reminders_enabled() -> bool {
    true
}

fn default_tick_interval_secs() -> u64 {
    10
}

fn default_due_tolerance_minutes() -> u32 {
    5
}

fn default_reminder_body() -> String {
    DEFAULT_REMINDER_BODY.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TasksFile {
    pub schema_version: u32,
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SettingsFile {
    pub schema_version: u32,
    pub settings: Settings,
}
