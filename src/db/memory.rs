//! In-process stores for tests and for hosts that keep tasks elsewhere.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{AppError, AppResult};
use crate::models::feedback::BiasKey;
use crate::models::task::Task;
use crate::services::providers::{BiasRepository, TaskStore};

#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    tasks: RwLock<HashMap<String, Task>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tasks(tasks: impl IntoIterator<Item = Task>) -> Self {
        let map = tasks.into_iter().map(|task| (task.id.clone(), task)).collect();
        Self {
            tasks: RwLock::new(map),
        }
    }

    pub fn get(&self, id: &str) -> AppResult<Option<Task>> {
        let guard = self.read()?;
        Ok(guard.get(id).cloned())
    }

    fn read(&self) -> AppResult<std::sync::RwLockReadGuard<'_, HashMap<String, Task>>> {
        self.tasks
            .read()
            .map_err(|_| AppError::other("task store lock poisoned"))
    }

    fn write(&self) -> AppResult<std::sync::RwLockWriteGuard<'_, HashMap<String, Task>>> {
        self.tasks
            .write()
            .map_err(|_| AppError::other("task store lock poisoned"))
    }
}

impl TaskStore for InMemoryTaskStore {
    fn create(&self, task: &Task) -> AppResult<()> {
        let mut guard = self.write()?;
        if guard.contains_key(&task.id) {
            return Err(AppError::conflict(format!("task {} already exists", task.id)));
        }
        guard.insert(task.id.clone(), task.clone());
        Ok(())
    }

    fn update(&self, task: &Task) -> AppResult<()> {
        let mut guard = self.write()?;
        match guard.get_mut(&task.id) {
            Some(existing) => {
                *existing = task.clone();
                Ok(())
            }
            None => Err(AppError::not_found()),
        }
    }

    fn update_batch(&self, tasks: &[Task]) -> AppResult<()> {
        let mut guard = self.write()?;
        for task in tasks {
            guard.insert(task.id.clone(), task.clone());
        }
        Ok(())
    }

    fn delete(&self, ids: &[String]) -> AppResult<()> {
        let mut guard = self.write()?;
        for id in ids {
            guard.remove(id);
        }
        Ok(())
    }

    fn list_current(&self) -> AppResult<Vec<Task>> {
        let guard = self.read()?;
        let mut tasks: Vec<Task> = guard.values().cloned().collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(tasks)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryBiasRepository {
    values: RwLock<HashMap<BiasKey, f64>>,
}

impl InMemoryBiasRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BiasRepository for InMemoryBiasRepository {
    fn get(&self, key: &BiasKey) -> AppResult<Option<f64>> {
        let guard = self
            .values
            .read()
            .map_err(|_| AppError::other("bias store lock poisoned"))?;
        Ok(guard.get(key).copied())
    }

    fn set(&self, key: &BiasKey, value: f64) -> AppResult<()> {
        let mut guard = self
            .values
            .write()
            .map_err(|_| AppError::other("bias store lock poisoned"))?;
        guard.insert(key.clone(), value);
        Ok(())
    }

    fn list(&self) -> AppResult<Vec<(BiasKey, f64)>> {
        let guard = self
            .values
            .read()
            .map_err(|_| AppError::other("bias store lock poisoned"))?;
        Ok(guard.iter().map(|(key, value)| (key.clone(), *value)).collect())
    }
}
