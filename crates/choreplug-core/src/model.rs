use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

/// Which transport a build talks to. Fixed per binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// Direct HTTP to the plug's `/cm` endpoint, addressed by IP.
    Local,
    /// Through the cloud relay, addressed by device name.
    Cloud,
}

impl Variant {
    pub fn as_str(self) -> &'static str {
        match self {
            Variant::Local => "local",
            Variant::Cloud => "cloud",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// The TV may only be switched on once every task is done.
    #[default]
    Reward,
    /// The TV is switched off while tasks are outstanding.
    Punishment,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Reward => "reward",
            Mode::Punishment => "punishment",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reward" => Ok(Mode::Reward),
            "punishment" => Ok(Mode::Punishment),
            other => Err(anyhow!(
                "invalid mode: {other} (expected reward or punishment)"
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub mode: Mode,

    /// Cloud identifier, e.g. `living_room_plug`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,

    /// Local identifier, a dotted IPv4 address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Device {
    pub fn new(id: impl Into<String>, name: impl Into<String>, mode: Mode) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            mode,
            device_name: None,
            ip: None,
            extra: BTreeMap::new(),
        }
    }

    /// The identifier the given variant addresses the plug by, empty when unset.
    pub fn target(&self, variant: Variant) -> &str {
        let value = match variant {
            Variant::Local => self.ip.as_deref(),
            Variant::Cloud => self.device_name.as_deref(),
        };
        value.unwrap_or_default()
    }

    pub fn set_target(&mut self, variant: Variant, value: String) {
        match variant {
            Variant::Local => self.ip = Some(value),
            Variant::Cloud => self.device_name = Some(value),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: String,
    pub name: String,
    #[serde(default = "default_frequency")]
    pub frequency: String,
}

pub const DEFAULT_FREQUENCY: &str = "daily";

fn default_frequency() -> String {
    DEFAULT_FREQUENCY.to_string()
}

impl Task {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        frequency: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            frequency: frequency.into(),
        }
    }
}

/// Root object persisted as a single JSON blob.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TrackerConfig {
    #[serde(default)]
    pub devices: Vec<Device>,

    #[serde(default)]
    pub tasks: Vec<Task>,

    /// Ids of the tasks completed today. Unique; only cleared by a reset.
    #[serde(default)]
    pub done_today: Vec<String>,
}

impl TrackerConfig {
    /// First-run contents: one plug and two daily chores.
    pub fn seed(variant: Variant) -> Self {
        let mut tv = Device::new("1", "Living room TV", Mode::Reward);
        match variant {
            Variant::Cloud => tv.device_name = Some("living_room_plug".to_string()),
            Variant::Local => tv.ip = Some("192.168.1.50".to_string()),
        }

        Self {
            devices: vec![tv],
            tasks: vec![
                Task::new("1", "Dishes", DEFAULT_FREQUENCY),
                Task::new("2", "Tidy the living room", DEFAULT_FREQUENCY),
            ],
            done_today: vec![],
        }
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn device(&self, id: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.id == id)
    }

    pub fn is_done(&self, task_id: &str) -> bool {
        self.done_today.iter().any(|id| id == task_id)
    }
}
