use anyhow::anyhow;
use chrono::Utc;
use tracing::{debug, info};

use crate::form::{DeviceForm, TaskForm};
use crate::model::{Device, Task, TrackerConfig, Variant};
use crate::storage::KeyValueStorage;
use crate::store::ConfigStore;

/// True iff there is at least one task and every task is done today.
///
/// An empty task list never counts as done, so a reward plug cannot be
/// unlocked by deleting every chore.
pub fn is_all_done(cfg: &TrackerConfig) -> bool {
    !cfg.tasks.is_empty() && cfg.tasks.iter().all(|t| cfg.is_done(&t.id))
}

/// Timestamp-derived id not used by any existing entity.
pub fn fresh_id<'a, I>(existing: I, now_millis: i64) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let taken: Vec<&str> = existing.into_iter().collect();
    let mut candidate = now_millis;
    loop {
        let id = candidate.to_string();
        if !taken.contains(&id.as_str()) {
            return id;
        }
        candidate += 1;
    }
}

/// In-memory config plus the store it came from.
///
/// Every mutation runs read-modify-persist: it edits the owned config and
/// then writes the whole object back through one persist call.
#[derive(Debug)]
pub struct Tracker<S> {
    store: ConfigStore<S>,
    cfg: TrackerConfig,
}

impl<S: KeyValueStorage> Tracker<S> {
    #[tracing::instrument(skip(store))]
    pub fn open(mut store: ConfigStore<S>) -> anyhow::Result<Self> {
        let cfg = store.load()?;
        Ok(Self { store, cfg })
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.cfg
    }

    pub fn variant(&self) -> Variant {
        self.store.variant()
    }

    pub fn store(&self) -> &ConfigStore<S> {
        &self.store
    }

    pub fn is_all_done(&self) -> bool {
        is_all_done(&self.cfg)
    }

    fn persist(&mut self) -> anyhow::Result<()> {
        self.store.save(&self.cfg)
    }

    #[tracing::instrument(skip(self))]
    pub fn toggle_task(&mut self, task_id: &str, checked: bool) -> anyhow::Result<()> {
        if self.cfg.task(task_id).is_none() {
            return Err(anyhow!("task not found: {task_id}"));
        }

        if checked {
            if !self.cfg.is_done(task_id) {
                self.cfg.done_today.push(task_id.to_string());
            }
        } else {
            self.cfg.done_today.retain(|id| id != task_id);
        }

        debug!(done = self.cfg.done_today.len(), all_done = self.is_all_done(), "toggled task");
        self.persist()
    }

    #[tracing::instrument(skip(self))]
    pub fn reset_day(&mut self) -> anyhow::Result<()> {
        info!(cleared = self.cfg.done_today.len(), "resetting day");
        self.cfg.done_today.clear();
        self.persist()
    }

    /// Creates or updates a task from the form, returning its id.
    #[tracing::instrument(skip(self, form), fields(id = %form.id))]
    pub fn save_task(&mut self, form: &TaskForm) -> anyhow::Result<String> {
        let id = if form.id.trim().is_empty() {
            fresh_id(self.cfg.tasks.iter().map(|t| t.id.as_str()), Utc::now().timestamp_millis())
        } else {
            form.id.trim().to_string()
        };

        let task = Task::new(id.clone(), form.name.trim(), form.frequency.trim());
        match self.cfg.tasks.iter().position(|t| t.id == id) {
            Some(idx) => {
                debug!(id = %id, "updating task");
                self.cfg.tasks[idx] = task;
            }
            None => {
                debug!(id = %id, "appending task");
                self.cfg.tasks.push(task);
            }
        }

        self.persist()?;
        Ok(id)
    }

    /// Removes the task and its completion mark.
    #[tracing::instrument(skip(self))]
    pub fn delete_task(&mut self, task_id: &str) -> anyhow::Result<Task> {
        let idx = self
            .cfg
            .tasks
            .iter()
            .position(|t| t.id == task_id)
            .ok_or_else(|| anyhow!("task not found: {task_id}"))?;

        let removed = self.cfg.tasks.remove(idx);
        self.cfg.done_today.retain(|id| id != task_id);
        self.persist()?;
        Ok(removed)
    }

    /// Creates or updates a device from the form, returning its id.
    ///
    /// Updating keeps fields the form does not carry, such as the other
    /// variant's identifier.
    #[tracing::instrument(skip(self, form), fields(id = %form.id))]
    pub fn save_device(&mut self, form: &DeviceForm) -> anyhow::Result<String> {
        let variant = self.variant();
        let id = if form.id.trim().is_empty() {
            fresh_id(self.cfg.devices.iter().map(|d| d.id.as_str()), Utc::now().timestamp_millis())
        } else {
            form.id.trim().to_string()
        };

        let apply = |device: &mut Device| {
            device.name = form.name.trim().to_string();
            device.mode = form.mode;
            device.set_target(variant, form.target.trim().to_string());
        };

        match self.cfg.devices.iter().position(|d| d.id == id) {
            Some(idx) => {
                debug!(id = %id, "updating device");
                apply(&mut self.cfg.devices[idx]);
            }
            None => {
                debug!(id = %id, "appending device");
                let mut device = Device::new(id.clone(), "", form.mode);
                apply(&mut device);
                self.cfg.devices.push(device);
            }
        }

        self.persist()?;
        Ok(id)
    }

    #[tracing::instrument(skip(self))]
    pub fn delete_device(&mut self, device_id: &str) -> anyhow::Result<Device> {
        let idx = self
            .cfg
            .devices
            .iter()
            .position(|d| d.id == device_id)
            .ok_or_else(|| anyhow!("device not found: {device_id}"))?;

        let removed = self.cfg.devices.remove(idx);
        self.persist()?;
        Ok(removed)
    }
}
