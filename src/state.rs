use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use log::warn;

use crate::models::{Settings, SettingsFile, Task, TaskFilter, TaskPatch, TasksFile};
use crate::storage::Storage;
use crate::store::{StoreError, TaskStore};

const SCHEMA_VERSION: u32 = 1;

/// In-memory task store, optionally mirrored to the app-data JSON files on every change.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<Mutex<AppData>>,
    storage: Option<Storage>,
}

impl AppState {
    pub fn new(tasks: Vec<Task>, settings: Settings) -> Self {
        Self {
            inner: Arc::new(Mutex::new(AppData {
                tasks,
                settings,
                next_seq: 0,
            })),
            storage: None,
        }
    }

    pub fn with_storage(tasks: Vec<Task>, settings: Settings, storage: Storage) -> Self {
        let mut state = Self::new(tasks, settings);
        state.storage = Some(storage);
        state
    }

    pub fn tasks_file(&self) -> TasksFile {
        let guard = self.inner.lock().expect("state poisoned");
        TasksFile {
            schema_version: SCHEMA_VERSION,
            tasks: guard.tasks.clone(),
        }
    }

    pub fn settings_file(&self) -> SettingsFile {
        let guard = self.inner.lock().expect("state poisoned");
        SettingsFile {
            schema_version: SCHEMA_VERSION,
            settings: guard.settings.clone(),
        }
    }

    /// Snapshot of every task, newest first.
    pub fn tasks(&self) -> Vec<Task> {
        let guard = self.inner.lock().expect("state poisoned");
        guard.tasks.clone()
    }

    pub fn list_tasks(&self, filter: Option<&TaskFilter>) -> Vec<Task> {
        let guard = self.inner.lock().expect("state poisoned");
        let mut tasks: Vec<Task> = guard
            .tasks
            .iter()
            .filter(|task| filter.map_or(true, |filter| filter.matches(task)))
            .cloned()
            .collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        tasks
    }

    pub fn create_task(&self, task: Task) -> Result<Task, StoreError> {
        let mut task = task;
        task.title = task.title.trim().to_string();
        if task.title.is_empty() {
            return Err(StoreError::Invalid("title must not be empty".to_string()));
        }
        let mut guard = self.inner.lock().expect("state poisoned");
        let now = Utc::now();
        guard.next_seq += 1;
        if task.id.is_empty() || guard.tasks.iter().any(|t| t.id == task.id) {
            task.id = format!("{}-{}", now.timestamp_millis(), guard.next_seq);
        }
        task.created_at = now.timestamp();
        task.updated_at = now.timestamp();
        guard.tasks.insert(0, task.clone());
        self.persist_tasks(&guard)?;
        Ok(task)
    }

    /// The patch stays applied in memory even when persisting fails; the error only reports
    /// that the files on disk are behind.
    pub fn update_task(&self, task_id: &str, patch: TaskPatch) -> Result<Task, StoreError> {
        if patch.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(StoreError::Invalid("title must not be empty".to_string()));
        }
        let mut guard = self.inner.lock().expect("state poisoned");
        let task = guard
            .tasks
            .iter_mut()
            .find(|t| t.id == task_id)
            .ok_or_else(|| StoreError::NotFound(task_id.to_string()))?;
        patch.apply(task);
        task.updated_at = Utc::now().timestamp();
        let updated = task.clone();
        self.persist_tasks(&guard)?;
        Ok(updated)
    }

    pub fn toggle_completion(&self, task_id: &str) -> Result<Task, StoreError> {
        let completed = self
            .tasks()
            .into_iter()
            .find(|t| t.id == task_id)
            .map(|t| t.completed)
            .ok_or_else(|| StoreError::NotFound(task_id.to_string()))?;
        self.update_task(task_id, TaskPatch::completed(!completed))
    }

    pub fn remove_task(&self, task_id: &str) -> Result<(), StoreError> {
        let mut guard = self.inner.lock().expect("state poisoned");
        let before = guard.tasks.len();
        guard.tasks.retain(|task| task.id != task_id);
        if guard.tasks.len() == before {
            return Err(StoreError::NotFound(task_id.to_string()));
        }
        self.persist_tasks(&guard)?;
        Ok(())
    }

    /// Distinct categories currently in use, sorted.
    pub fn used_categories(&self) -> Vec<String> {
        let guard = self.inner.lock().expect("state poisoned");
        guard
            .tasks
            .iter()
            .filter_map(|task| task.category.clone())
            .filter(|category| !category.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn settings(&self) -> Settings {
        let guard = self.inner.lock().expect("state poisoned");
        guard.settings.clone()
    }

    pub fn update_settings(&self, settings: Settings) -> Result<(), StoreError> {
        let mut guard = self.inner.lock().expect("state poisoned");
        guard.settings = settings;
        if let Some(storage) = &self.storage {
            storage.save_settings(&SettingsFile {
                schema_version: SCHEMA_VERSION,
                settings: guard.settings.clone(),
            })?;
        }
        Ok(())
    }

    fn persist_tasks(&self, data: &AppData) -> Result<(), StoreError> {
        let Some(storage) = &self.storage else {
            return Ok(());
        };
        storage
            .save_tasks(&TasksFile {
                schema_version: SCHEMA_VERSION,
                tasks: data.tasks.clone(),
            })
            .map_err(|err| {
                warn!("failed to persist tasks: {err}");
                StoreError::from(err)
            })
    }
}

#[async_trait]
impl TaskStore for AppState {
    async fn list(&self, filter: Option<&TaskFilter>) -> Result<Vec<Task>, StoreError> {
        Ok(self.list_tasks(filter))
    }

    async fn create(&self, task: Task) -> Result<Task, StoreError> {
        self.create_task(task)
    }

    async fn update(&self, id: &str, patch: TaskPatch) -> Result<Task, StoreError> {
        self.update_task(id, patch)
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.remove_task(id)
    }
}

#[derive(Debug)]
struct AppData {
    tasks: Vec<Task>,
    settings: Settings,
    next_seq: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::date::RawDate;
    use crate::models::ReminderPatch;

    fn make_task(id: &str, created_at: i64, category: Option<&str>) -> Task {
        let mut task = Task::new(format!("task-{id}"));
        task.id = id.to_string();
        task.created_at = created_at;
        task.category = category.map(str::to_string);
        task
    }

    #[test]
    fn create_assigns_id_and_timestamps() {
        let state = AppState::new(Vec::new(), Settings::default());
        let first = state.create_task(Task::new("  first  ")).unwrap();
        let second = state.create_task(Task::new("second")).unwrap();

        assert!(!first.id.is_empty());
        assert_ne!(first.id, second.id);
        assert_eq!(first.title, "first");
        assert!(first.created_at > 0);
        assert_eq!(first.created_at, first.updated_at);

        let listed = state.list_tasks(None);
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, second.id, "newest first");
    }

    #[test]
    fn create_rejects_blank_titles_and_replaces_duplicate_ids() {
        let state = AppState::new(vec![make_task("a", 1, None)], Settings::default());
        assert!(matches!(
            state.create_task(Task::new("   ")),
            Err(StoreError::Invalid(_))
        ));

        let mut duplicate = Task::new("dup");
        duplicate.id = "a".to_string();
        let created = state.create_task(duplicate).unwrap();
        assert_ne!(created.id, "a");
        assert_eq!(state.tasks().len(), 2);
    }

    #[test]
    fn list_filters_and_orders_newest_first() {
        let state = AppState::new(
            vec![
                make_task("old", 10, Some("Work")),
                make_task("new", 30, Some("Home")),
                make_task("mid", 20, Some("Work")),
            ],
            Settings::default(),
        );

        let ids: Vec<String> = state.list_tasks(None).into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);

        let work = state.list_tasks(Some(&TaskFilter {
            search: None,
            category: Some("Work".to_string()),
        }));
        let ids: Vec<String> = work.into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["mid", "old"]);

        let searched = state.list_tasks(Some(&TaskFilter {
            search: Some("TASK-NEW".to_string()),
            category: None,
        }));
        assert_eq!(searched.len(), 1);
        assert_eq!(searched[0].id, "new");
    }

    #[test]
    fn update_applies_patch_and_reports_missing() {
        let mut task = make_task("a", 1, None).with_reminder("2024-06-01T10:00:00Z");
        task.reminder.as_mut().unwrap().notified = true;
        let state = AppState::new(vec![task], Settings::default());

        let updated = state
            .update_task(
                "a",
                TaskPatch {
                    reminder: Some(ReminderPatch {
                        date: Some(RawDate::from("2024-06-02T10:00:00Z")),
                        ..ReminderPatch::default()
                    }),
                    ..TaskPatch::default()
                },
            )
            .unwrap();
        assert!(!updated.reminder.as_ref().unwrap().notified);
        assert!(updated.updated_at > 1);

        assert!(matches!(
            state.update_task("missing", TaskPatch::mark_notified()),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            state.update_task(
                "a",
                TaskPatch {
                    title: Some(" ".to_string()),
                    ..TaskPatch::default()
                }
            ),
            Err(StoreError::Invalid(_))
        ));
    }

    #[test]
    fn toggle_and_remove() {
        let state = AppState::new(vec![make_task("a", 1, None)], Settings::default());
        assert!(state.toggle_completion("a").unwrap().completed);
        assert!(!state.toggle_completion("a").unwrap().completed);
        assert!(matches!(
            state.toggle_completion("missing"),
            Err(StoreError::NotFound(_))
        ));

        state.remove_task("a").unwrap();
        assert!(state.tasks().is_empty());
        assert!(matches!(
            state.remove_task("a"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn used_categories_are_distinct_and_sorted() {
        let state = AppState::new(
            vec![
                make_task("a", 1, Some("Work")),
                make_task("b", 2, Some("Home")),
                make_task("c", 3, Some("Work")),
                make_task("d", 4, None),
            ],
            Settings::default(),
        );
        assert_eq!(state.used_categories(), vec!["Home", "Work"]);
    }

    #[test]
    fn file_backed_state_persists_every_change() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf());
        let state = AppState::with_storage(Vec::new(), Settings::default(), storage.clone());

        let created = state.create_task(Task::new("persist me")).unwrap();
        state
            .update_task(&created.id, TaskPatch::completed(true))
            .unwrap();
        let on_disk = storage.load_tasks().unwrap();
        assert_eq!(on_disk.schema_version, SCHEMA_VERSION);
        assert_eq!(on_disk.tasks.len(), 1);
        assert!(on_disk.tasks[0].completed);

        let mut settings = Settings::default();
        settings.reminders_enabled = false;
        state.update_settings(settings).unwrap();
        assert!(!storage.load_settings().unwrap().settings.reminders_enabled);
    }

    #[test]
    fn failed_persist_keeps_the_in_memory_change() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "").unwrap();
        let mut task = make_task("a", 1, None).with_reminder("2024-06-01T10:00:00Z");
        task.id = "a".to_string();
        let state = AppState::with_storage(vec![task], Settings::default(), Storage::new(blocker));

        let result = state.update_task("a", TaskPatch::mark_notified());

        assert!(matches!(result, Err(StoreError::Storage(_))));
        assert!(state.tasks()[0].reminder.as_ref().unwrap().notified);
    }

    #[tokio::test]
    async fn task_store_trait_delegates_to_state() {
        let state = AppState::new(Vec::new(), Settings::default());
        let store: &dyn TaskStore = &state;

        let created = store
            .create(Task::new("via trait").with_reminder("2024-06-01T10:00:00Z"))
            .await
            .unwrap();
        let updated = store
            .update(&created.id, TaskPatch::mark_notified())
            .await
            .unwrap();
        assert!(updated.reminder.unwrap().notified);
        assert_eq!(store.list(None).await.unwrap().len(), 1);
        store.delete(&created.id).await.unwrap();
        assert!(store.list(None).await.unwrap().is_empty());
    }
}
