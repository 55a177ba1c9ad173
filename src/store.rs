use async_trait::async_trait;

use crate::models::{Task, TaskFilter, TaskPatch};
use crate::storage::StorageError;

#[derive(Debug)]
pub enum StoreError {
    NotFound(String),
    Invalid(String),
    Storage(StorageError),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NotFound(id) => write!(f, "task not found: {id}"),
            StoreError::Invalid(message) => write!(f, "invalid task: {message}"),
            StoreError::Storage(err) => write!(f, "storage error: {err}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<StorageError> for StoreError {
    fn from(value: StorageError) -> Self {
        StoreError::Storage(value)
    }
}

/// Request/response access to task records keyed by id.
///
/// The reminder engine only ever calls [`TaskStore::update`] with
/// [`TaskPatch::mark_notified`]; the rest serves the host UI.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn list(&self, filter: Option<&TaskFilter>) -> Result<Vec<Task>, StoreError>;
    async fn create(&self, task: Task) -> Result<Task, StoreError>;
    async fn update(&self, id: &str, patch: TaskPatch) -> Result<Task, StoreError>;
    async fn delete(&self, id: &str) -> Result<(), StoreError>;
}
