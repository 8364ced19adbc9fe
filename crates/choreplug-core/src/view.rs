//! Declarative description of the two pages.
//!
//! [`build`] is a pure function of the config, the active page, and the
//! editor forms. Any front end (the terminal renderer here) consumes the
//! returned [`View`] and owns how it is displayed.

use crate::command::Action;
use crate::form::{DeviceForm, TaskForm};
use crate::model::{Device, Mode, TrackerConfig, Variant};
use crate::tracker::is_all_done;

pub const STATUS_ALLOWED: &str = "Tasks done -> TV allowed";
pub const STATUS_BLOCKED: &str = "Tasks incomplete -> TV blocked";
pub const STATUS_PUNISHED: &str = "Tasks incomplete -> TV off (punishment)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Page {
    #[default]
    Today,
    Config,
}

/// Editor state carried between renders of the config page.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Forms {
    pub device: DeviceForm,
    pub task: TaskForm,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View {
    Today(TodayView),
    Config(ConfigView),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodayView {
    pub tasks: Vec<TaskCheck>,
    pub devices: Vec<DeviceCard>,
    pub all_done: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskCheck {
    pub id: String,
    pub name: String,
    pub checked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCard {
    pub id: String,
    pub name: String,
    pub status: &'static str,
    pub target: String,
    pub mode: Mode,
    pub actions: [Action; 3],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigView {
    pub devices: Vec<DeviceRow>,
    pub tasks: Vec<TaskRow>,
    pub device_form: DeviceForm,
    pub task_form: TaskForm,
    /// `IP` or `Device name`, depending on the variant.
    pub target_label: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRow {
    pub id: String,
    pub name: String,
    pub target: String,
    pub mode: Mode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRow {
    pub id: String,
    pub name: String,
    pub frequency: String,
}

pub fn status_text(mode: Mode, all_done: bool) -> &'static str {
    match (mode, all_done) {
        (_, true) => STATUS_ALLOWED,
        (Mode::Reward, false) => STATUS_BLOCKED,
        (Mode::Punishment, false) => STATUS_PUNISHED,
    }
}

fn target_or(device: &Device, variant: Variant, placeholder: &str) -> String {
    match device.target(variant) {
        "" => placeholder.to_string(),
        target => target.to_string(),
    }
}

pub fn build(cfg: &TrackerConfig, variant: Variant, page: Page, forms: &Forms) -> View {
    match page {
        Page::Today => View::Today(today(cfg, variant)),
        Page::Config => View::Config(config(cfg, variant, forms)),
    }
}

fn today(cfg: &TrackerConfig, variant: Variant) -> TodayView {
    let all_done = is_all_done(cfg);

    let tasks = cfg
        .tasks
        .iter()
        .map(|task| TaskCheck {
            id: task.id.clone(),
            name: task.name.clone(),
            checked: cfg.is_done(&task.id),
        })
        .collect();

    let devices = cfg
        .devices
        .iter()
        .map(|device| DeviceCard {
            id: device.id.clone(),
            name: device.name.clone(),
            status: status_text(device.mode, all_done),
            target: target_or(device, variant, "(to configure)"),
            mode: device.mode,
            actions: [Action::On, Action::Off, Action::Logical],
        })
        .collect();

    TodayView {
        tasks,
        devices,
        all_done,
    }
}

fn config(cfg: &TrackerConfig, variant: Variant, forms: &Forms) -> ConfigView {
    ConfigView {
        devices: cfg
            .devices
            .iter()
            .map(|device| DeviceRow {
                id: device.id.clone(),
                name: device.name.clone(),
                target: target_or(device, variant, "(empty)"),
                mode: device.mode,
            })
            .collect(),
        tasks: cfg
            .tasks
            .iter()
            .map(|task| TaskRow {
                id: task.id.clone(),
                name: task.name.clone(),
                frequency: task.frequency.clone(),
            })
            .collect(),
        device_form: forms.device.clone(),
        task_form: forms.task.clone(),
        target_label: match variant {
            Variant::Local => "IP",
            Variant::Cloud => "Device name",
        },
    }
}
