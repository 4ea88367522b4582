use std::io::{self, IsTerminal, Write};

use chrono::{Local, NaiveDate};
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::datetime::format_due_date;
use crate::task::{Priority, Task};

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color = cfg.get_bool("color")?.unwrap_or(true);
        Ok(Self { color })
    }

    #[tracing::instrument(skip(self, tasks, today))]
    pub fn print_task_table(
        &mut self,
        tasks: &[&Task],
        total: usize,
        today: NaiveDate,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        if tasks.is_empty() {
            writeln!(out, "No matching tasks.")?;
            return Ok(());
        }

        let headers = vec![
            "ID".to_string(),
            "Done".to_string(),
            "Pri".to_string(),
            "Due".to_string(),
            "Title".to_string(),
            "Tags".to_string(),
            "Sub".to_string(),
        ];

        let mut rows = Vec::with_capacity(tasks.len());

        for task in tasks {
            let id = self.paint(task.short_id(), "33");
            let done = if task.completed { "[x]" } else { "[ ]" }.to_string();
            let priority = self.paint_priority(task.priority);

            let due = task.due_date.map(format_due_date).unwrap_or_default();
            let due = match task.due_date {
                Some(date) if date < today && !task.completed => self.paint(&due, "31"),
                _ => due,
            };

            let title = if task.completed {
                self.paint(&task.title, "2")
            } else {
                task.title.clone()
            };
            let tags = task
                .tags
                .iter()
                .map(|tag| format!("#{tag}"))
                .collect::<Vec<_>>()
                .join(" ");
            let subtasks = if task.subtasks.is_empty() {
                String::new()
            } else {
                format!("{}/{}", task.completed_subtasks(), task.subtasks.len())
            };

            rows.push(vec![id, done, priority, due, title, tags, subtasks]);
        }

        write_table(&mut out, headers, rows)?;
        writeln!(out)?;
        writeln!(out, "{} of {} tasks", tasks.len(), total)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, task))]
    pub fn print_task_info(&mut self, task: &Task) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(out, "id          {}", task.id)?;
        writeln!(out, "title       {}", task.title)?;
        writeln!(
            out,
            "status      {}",
            if task.completed { "completed" } else { "open" }
        )?;
        writeln!(out, "priority    {}", self.paint_priority(task.priority))?;
        if let Some(description) = task.description.as_deref() {
            writeln!(out, "description {description}")?;
        }
        if let Some(due) = task.due_date {
            writeln!(out, "due         {}", format_due_date(due))?;
        }
        if !task.tags.is_empty() {
            writeln!(out, "tags        {}", task.tags.join(", "))?;
        }
        writeln!(
            out,
            "created     {}",
            task.created_at
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M")
        )?;

        if !task.subtasks.is_empty() {
            writeln!(out)?;
            writeln!(
                out,
                "subtasks ({}/{})",
                task.completed_subtasks(),
                task.subtasks.len()
            )?;
            for subtask in &task.subtasks {
                let mark = if subtask.completed { "[x]" } else { "[ ]" };
                let short = subtask.id.get(..8).unwrap_or(&subtask.id);
                writeln!(out, "  {mark} {} {}", self.paint(short, "33"), subtask.text)?;
            }
        }

        Ok(())
    }

    pub fn print_celebration(&mut self, message: &str) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "{}", self.paint("Awesome!", "1;32"))?;
        writeln!(out, "{message}")?;
        Ok(())
    }

    fn paint_priority(&self, priority: Priority) -> String {
        let code = match priority {
            Priority::High => "31",
            Priority::Medium => "33",
            Priority::Low => "32",
        };
        self.paint(priority.label(), code)
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
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

    for (idx, header) in headers.iter().enumerate() {
        write!(writer, "{:width$} ", header, width = widths[idx])?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = *width)?;
    }
    writeln!(writer)?;

    for row in rows {
        for (idx, cell) in row.iter().enumerate() {
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

    #[test]
    fn table_pads_by_display_width() {
        let mut buf = Vec::new();
        write_table(
            &mut buf,
            vec!["Title".into(), "Pri".into()],
            vec![
                vec!["牛乳を買う".into(), "\x1b[31mHigh\x1b[0m".into()],
                vec!["x".into(), "Low".into()],
            ],
        )
        .expect("write table");

        let text = String::from_utf8(buf).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        // Five wide characters occupy ten columns.
        assert_eq!(lines[0], "Title      Pri  ");
        assert_eq!(lines[3], "x          Low  ");
    }

    #[test]
    fn color_setting_is_validated() {
        let mut cfg = Config::default();
        cfg.apply_overrides(vec![("color".to_string(), "off".to_string())]);
        let renderer = Renderer::new(&cfg).expect("renderer");
        assert_eq!(renderer.paint("x", "31"), "x");

        cfg.apply_overrides(vec![("color".to_string(), "rainbow".to_string())]);
        assert!(Renderer::new(&cfg).is_err());
    }

    #[test]
    fn strips_color_codes() {
        assert_eq!(strip_ansi("\x1b[1;32mok\x1b[0m"), "ok");
    }
}
