use anyhow::{Context, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::cli::{Invocation, KeyVal};
use crate::command::{Action, CommandSender, HttpTransport, Outcome};
use crate::config::Config;
use crate::form::{DeviceForm, TaskForm};
use crate::render::Renderer;
use crate::storage::KeyValueStorage;
use crate::tracker::Tracker;
use crate::view::{self, Forms, Page};

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "today",
        "config",
        "check",
        "uncheck",
        "reset",
        "on",
        "off",
        "logical",
        "task-edit",
        "task-save",
        "task-delete",
        "device-edit",
        "device-save",
        "device-delete",
        "help",
        "version",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

#[instrument(skip(tracker, cfg, renderer, inv))]
pub fn dispatch<S: KeyValueStorage>(
    tracker: &mut Tracker<S>,
    cfg: &Config,
    renderer: &Renderer,
    inv: Invocation,
) -> anyhow::Result<()> {
    let command = inv.command.as_str();
    let args = &inv.command_args;

    debug!(command, args = ?args, "dispatching command");

    match command {
        "today" => show(tracker, renderer, Page::Today, &Forms::default()),
        "config" => show(tracker, renderer, Page::Config, &Forms::default()),
        "check" => cmd_toggle(tracker, renderer, args, true),
        "uncheck" => cmd_toggle(tracker, renderer, args, false),
        "reset" => cmd_reset(tracker, renderer),
        "on" | "off" | "logical" => {
            let action: Action = command.parse()?;
            cmd_device_action(tracker, cfg, args, action)
        }
        "task-edit" => cmd_task_edit(tracker, renderer, args),
        "task-save" => cmd_task_save(tracker, renderer, args),
        "task-delete" => cmd_task_delete(tracker, renderer, args),
        "device-edit" => cmd_device_edit(tracker, renderer, args),
        "device-save" => cmd_device_save(tracker, renderer, args),
        "device-delete" => cmd_device_delete(tracker, renderer, args),
        "help" => cmd_help(),
        "version" => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        other => Err(anyhow!("unknown command: {other}")),
    }
}

fn show<S: KeyValueStorage>(
    tracker: &Tracker<S>,
    renderer: &Renderer,
    page: Page,
    forms: &Forms,
) -> anyhow::Result<()> {
    let view = view::build(tracker.config(), tracker.variant(), page, forms);
    renderer.print_view(&view)
}

fn single_id<'a>(args: &'a [String], what: &str) -> anyhow::Result<&'a str> {
    match args {
        [id] => Ok(id.as_str()),
        [] => Err(anyhow!("{what} id required")),
        _ => Err(anyhow!("expected exactly one {what} id, got {}", args.len())),
    }
}

fn parse_fields(args: &[String]) -> anyhow::Result<Vec<KeyVal>> {
    args.iter()
        .map(|arg| arg.parse::<KeyVal>().with_context(|| format!("invalid field: {arg}")))
        .collect()
}

/// Finds an explicit `id=` among the fields.
fn field_id(fields: &[KeyVal]) -> Option<&str> {
    fields
        .iter()
        .rev()
        .find(|kv| kv.key == "id")
        .map(|kv| kv.value.as_str())
        .filter(|id| !id.trim().is_empty())
}

#[instrument(skip(tracker, renderer, args))]
fn cmd_toggle<S: KeyValueStorage>(
    tracker: &mut Tracker<S>,
    renderer: &Renderer,
    args: &[String],
    checked: bool,
) -> anyhow::Result<()> {
    let id = single_id(args, "task")?;
    info!(task = %id, checked, "command toggle");
    tracker.toggle_task(id, checked)?;
    show(tracker, renderer, Page::Today, &Forms::default())
}

#[instrument(skip(tracker, renderer))]
fn cmd_reset<S: KeyValueStorage>(
    tracker: &mut Tracker<S>,
    renderer: &Renderer,
) -> anyhow::Result<()> {
    info!("command reset");
    tracker.reset_day()?;
    show(tracker, renderer, Page::Today, &Forms::default())
}

#[instrument(skip(tracker, cfg, args))]
fn cmd_device_action<S: KeyValueStorage>(
    tracker: &Tracker<S>,
    cfg: &Config,
    args: &[String],
    action: Action,
) -> anyhow::Result<()> {
    let id = single_id(args, "device")?;
    let device = tracker
        .config()
        .device(id)
        .ok_or_else(|| anyhow!("device not found: {id}"))?;
    info!(device = %id, action = %action, "command device action");

    let transport = HttpTransport::new(cfg.http_timeout()?)?;
    let sender = CommandSender::new(tracker.variant(), cfg.api_base(), transport);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed building async runtime")?;
    let outcome = runtime.block_on(sender.trigger(device, action, tracker.is_all_done()))?;

    match outcome {
        Outcome::Sent { action, response } => {
            debug!(%response, "command response");
            println!(
                "Command '{action}' sent to {} ({}).",
                device.name,
                tracker.variant().as_str()
            );
        }
        Outcome::Blocked { warning } => {
            warn!(device = %id, "logical action blocked");
            println!("{warning}");
        }
    }
    Ok(())
}

#[instrument(skip(tracker, renderer, args))]
fn cmd_task_edit<S: KeyValueStorage>(
    tracker: &Tracker<S>,
    renderer: &Renderer,
    args: &[String],
) -> anyhow::Result<()> {
    let id = single_id(args, "task")?;
    let task = tracker
        .config()
        .task(id)
        .ok_or_else(|| anyhow!("task not found: {id}"))?;
    let forms = Forms {
        task: TaskForm::from_task(task),
        ..Forms::default()
    };
    show(tracker, renderer, Page::Config, &forms)
}

#[instrument(skip(tracker, renderer, args))]
fn cmd_task_save<S: KeyValueStorage>(
    tracker: &mut Tracker<S>,
    renderer: &Renderer,
    args: &[String],
) -> anyhow::Result<()> {
    let fields = parse_fields(args)?;

    // Editing an existing task starts from its current values.
    let mut form = field_id(&fields)
        .and_then(|id| tracker.config().task(id))
        .map(TaskForm::from_task)
        .unwrap_or_default();
    for kv in &fields {
        form.set_field(&kv.key, &kv.value)?;
    }
    if form.name.trim().is_empty() {
        return Err(anyhow!("task-save requires name=<name>"));
    }

    let id = tracker.save_task(&form)?;
    println!("Saved task {id}.");
    show(tracker, renderer, Page::Config, &Forms::default())
}

#[instrument(skip(tracker, renderer, args))]
fn cmd_task_delete<S: KeyValueStorage>(
    tracker: &mut Tracker<S>,
    renderer: &Renderer,
    args: &[String],
) -> anyhow::Result<()> {
    let id = single_id(args, "task")?;
    let removed = tracker.delete_task(id)?;
    println!("Deleted task {} '{}'.", removed.id, removed.name);
    show(tracker, renderer, Page::Config, &Forms::default())
}

#[instrument(skip(tracker, renderer, args))]
fn cmd_device_edit<S: KeyValueStorage>(
    tracker: &Tracker<S>,
    renderer: &Renderer,
    args: &[String],
) -> anyhow::Result<()> {
    let id = single_id(args, "device")?;
    let device = tracker
        .config()
        .device(id)
        .ok_or_else(|| anyhow!("device not found: {id}"))?;
    let forms = Forms {
        device: DeviceForm::from_device(device, tracker.variant()),
        ..Forms::default()
    };
    show(tracker, renderer, Page::Config, &forms)
}

#[instrument(skip(tracker, renderer, args))]
fn cmd_device_save<S: KeyValueStorage>(
    tracker: &mut Tracker<S>,
    renderer: &Renderer,
    args: &[String],
) -> anyhow::Result<()> {
    let fields = parse_fields(args)?;
    let variant = tracker.variant();

    let mut form = field_id(&fields)
        .and_then(|id| tracker.config().device(id))
        .map(|device| DeviceForm::from_device(device, variant))
        .unwrap_or_default();
    for kv in &fields {
        form.set_field(&kv.key, &kv.value)?;
    }
    if form.name.trim().is_empty() {
        return Err(anyhow!("device-save requires name=<name>"));
    }

    let id = tracker.save_device(&form)?;
    println!("Saved device {id}.");
    show(tracker, renderer, Page::Config, &Forms::default())
}

#[instrument(skip(tracker, renderer, args))]
fn cmd_device_delete<S: KeyValueStorage>(
    tracker: &mut Tracker<S>,
    renderer: &Renderer,
    args: &[String],
) -> anyhow::Result<()> {
    let id = single_id(args, "device")?;
    let removed = tracker.delete_device(id)?;
    println!("Deleted device {} '{}'.", removed.id, removed.name);
    show(tracker, renderer, Page::Config, &Forms::default())
}

fn cmd_help() -> anyhow::Result<()> {
    println!(
        "usage: choreplug [-v|-q] [--rc KEY=VALUE] [--rcfile PATH] [--data DIR] [COMMAND] [ARGS]

settings:
  --rc KEY=VALUE or rc.KEY=VALUE anywhere on the line overrides the rc file
  (e.g. rc.color=off, rc.api.base=http://localhost:3000)

pages:
  today                        tasks and plug status (default)
  config                       devices, tasks and editor forms

today:
  check <task-id>              mark a task done
  uncheck <task-id>            clear a task's mark
  reset                        clear every mark for a new day
  on <device-id>               force the plug on
  off <device-id>              force the plug off
  logical <device-id>          switch according to mode and progress

config:
  task-edit <id>               load a task into the form
  task-save [id=..] name=.. [frequency=..]
  task-delete <id>
  device-edit <id>             load a device into the form
  device-save [id=..] name=.. target=.. [mode=reward|punishment]
  device-delete <id>

commands may be shortened to any unique prefix"
    );
    Ok(())
}
