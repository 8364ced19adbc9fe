use anyhow::anyhow;

use crate::model::{DEFAULT_FREQUENCY, Device, Mode, Task, Variant};

/// The shared device editor. An empty `id` means "create".
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceForm {
    pub id: String,
    pub name: String,
    /// `ip` for the local variant, `deviceName` for the cloud one.
    pub target: String,
    pub mode: Mode,
}

impl DeviceForm {
    pub fn from_device(device: &Device, variant: Variant) -> Self {
        Self {
            id: device.id.clone(),
            name: device.name.clone(),
            target: device.target(variant).to_string(),
            mode: device.mode,
        }
    }

    /// Applies one `key=value` field as typed by the user.
    pub fn set_field(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "id" => self.id = value.to_string(),
            "name" => self.name = value.to_string(),
            "target" | "ip" | "deviceName" | "device" => self.target = value.to_string(),
            "mode" => self.mode = value.parse()?,
            other => return Err(anyhow!("unknown device field: {other}")),
        }
        Ok(())
    }
}

/// The shared task editor. An empty `id` means "create".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskForm {
    pub id: String,
    pub name: String,
    pub frequency: String,
}

impl Default for TaskForm {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            frequency: DEFAULT_FREQUENCY.to_string(),
        }
    }
}

impl TaskForm {
    pub fn from_task(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            name: task.name.clone(),
            frequency: task.frequency.clone(),
        }
    }

    pub fn set_field(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "id" => self.id = value.to_string(),
            "name" => self.name = value.to_string(),
            "frequency" | "freq" => self.frequency = value.to_string(),
            other => return Err(anyhow!("unknown task field: {other}")),
        }
        Ok(())
    }
}
