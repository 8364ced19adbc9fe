use std::io::{self, IsTerminal, Write};

use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::view::{ConfigView, TodayView, View};

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color = cfg.get_bool("color")?.unwrap_or(true);

        Ok(Self {
            color: color && io::stdout().is_terminal(),
        })
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    #[tracing::instrument(skip(self, view))]
    pub fn print_view(&self, view: &View) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        self.write_view(&mut out, view)
    }

    pub fn write_view<W: Write>(&self, out: &mut W, view: &View) -> anyhow::Result<()> {
        match view {
            View::Today(today) => self.write_today(out, today),
            View::Config(config) => self.write_config(out, config),
        }
    }

    fn write_today<W: Write>(&self, out: &mut W, view: &TodayView) -> anyhow::Result<()> {
        writeln!(out, "{}", self.paint("Today", "1"))?;
        writeln!(out)?;

        let rows = view
            .tasks
            .iter()
            .map(|task| {
                let mark = if task.checked {
                    self.paint("[x]", "32")
                } else {
                    "[ ]".to_string()
                };
                vec![self.paint(&task.id, "33"), mark, task.name.clone()]
            })
            .collect();
        write_table(&mut *out, headers(&["ID", "Done", "Task"]), rows)?;
        writeln!(out)?;

        let rows = view
            .devices
            .iter()
            .map(|device| {
                let status = if view.all_done {
                    self.paint(device.status, "32")
                } else {
                    self.paint(device.status, "31")
                };
                let actions = device
                    .actions
                    .iter()
                    .map(|a| a.as_str())
                    .collect::<Vec<_>>()
                    .join("/");
                vec![
                    self.paint(&device.id, "33"),
                    device.name.clone(),
                    device.target.clone(),
                    device.mode.to_string(),
                    status,
                    actions,
                ]
            })
            .collect();
        write_table(
            &mut *out,
            headers(&["ID", "Device", "Target", "Mode", "Status", "Actions"]),
            rows,
        )?;
        writeln!(out)?;
        writeln!(out, "reset: clear today's checks")?;
        Ok(())
    }

    fn write_config<W: Write>(&self, out: &mut W, view: &ConfigView) -> anyhow::Result<()> {
        writeln!(out, "{}", self.paint("Config", "1"))?;
        writeln!(out)?;

        let rows = view
            .devices
            .iter()
            .map(|device| {
                vec![
                    self.paint(&device.id, "33"),
                    device.name.clone(),
                    device.target.clone(),
                    device.mode.to_string(),
                ]
            })
            .collect();
        write_table(
            &mut *out,
            headers(&["ID", "Device", view.target_label, "Mode"]),
            rows,
        )?;
        writeln!(out)?;

        let rows = view
            .tasks
            .iter()
            .map(|task| {
                vec![
                    self.paint(&task.id, "33"),
                    task.name.clone(),
                    task.frequency.clone(),
                ]
            })
            .collect();
        write_table(&mut *out, headers(&["ID", "Task", "Frequency"]), rows)?;
        writeln!(out)?;

        let device = &view.device_form;
        writeln!(out, "{}", self.paint("Device form", "1"))?;
        writeln!(out, "id        {}", device.id)?;
        writeln!(out, "name      {}", device.name)?;
        writeln!(out, "target    {}", device.target)?;
        writeln!(out, "mode      {}", device.mode)?;
        writeln!(out)?;

        let task = &view.task_form;
        writeln!(out, "{}", self.paint("Task form", "1"))?;
        writeln!(out, "id        {}", task.id)?;
        writeln!(out, "name      {}", task.name)?;
        writeln!(out, "frequency {}", task.frequency)?;
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn headers(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{TrackerConfig, Variant};
    use crate::view::{Forms, Page, build};

    fn render(view: &View) -> String {
        let mut buf = Vec::new();
        Renderer::plain().write_view(&mut buf, view).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn today_lists_tasks_and_device_status() {
        let mut cfg = TrackerConfig::seed(Variant::Cloud);
        cfg.done_today = vec!["1".to_string(), "2".to_string()];

        let text = render(&build(&cfg, Variant::Cloud, Page::Today, &Forms::default()));
        assert!(text.lines().any(|line| line.contains("[x]") && line.contains("Dishes")));
        assert!(text.contains("living_room_plug"));
        assert!(text.contains("Tasks done -> TV allowed"));
        assert!(text.contains("on/off/logical"));
    }

    #[test]
    fn config_uses_variant_target_header() {
        let cfg = TrackerConfig::seed(Variant::Local);
        let text = render(&build(&cfg, Variant::Local, Page::Config, &Forms::default()));
        assert!(text.lines().any(|line| line.starts_with("ID Device") && line.contains("IP")));
        assert!(text.contains("frequency daily"));
    }

    #[test]
    fn color_setting_must_be_a_switch() {
        let mut cfg = Config::defaults();
        cfg.apply_overrides([("color".to_string(), "off".to_string())]);
        assert!(!Renderer::new(&cfg).unwrap().color);

        cfg.apply_overrides([("color".to_string(), "rainbow".to_string())]);
        let err = Renderer::new(&cfg).unwrap_err();
        assert!(err.to_string().contains("invalid color setting"));
    }

    #[test]
    fn strip_ansi_keeps_visible_text() {
        assert_eq!(strip_ansi("\x1b[33m12\x1b[0m"), "12");
    }
}
