use std::io::{self, IsTerminal, Write};

use chrono::{DateTime, Utc};
use unicode_width::UnicodeWidthStr;

use crate::category::Category;
use crate::config::Config;
use crate::datetime::format_local;
use crate::notify::Reminder;
use crate::task::{Priority, Task};
use crate::view::{CategoryGroup, Stats, deadline_status};

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> Self {
        Self { color: cfg.color }
    }

    #[tracing::instrument(skip_all, fields(count = tasks.len()))]
    pub fn print_task_table(
        &mut self,
        tasks: &[&Task],
        categories: &[Category],
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        if tasks.is_empty() {
            writeln!(out, "No tasks found")?;
            return Ok(());
        }

        let headers = ["ID", "", "Pri", "Deadline", "Category", "Title", "Tags"]
            .map(String::from)
            .to_vec();
        let rows = tasks
            .iter()
            .map(|task| self.task_row(task, categories, now))
            .collect();

        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(groups = groups.len()))]
    pub fn print_groups(
        &mut self,
        groups: &[CategoryGroup<'_>],
        categories: &[Category],
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        if groups.is_empty() {
            println!("No tasks found");
            return Ok(());
        }

        for group in groups {
            let heading = format!(
                "{} ({}/{}, {}%)",
                group.category.name,
                group.completed,
                group.tasks.len(),
                group.progress
            );
            println!("{}", self.paint(&heading, "1"));
            if group.tasks.is_empty() {
                println!("  No tasks in this category");
            } else {
                self.print_task_table(&group.tasks, categories, now)?;
            }
            println!();
        }
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(task_id = %task.id))]
    pub fn print_task_info(
        &mut self,
        task: &Task,
        category: Option<&Category>,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(out, "id          {}", task.id)?;
        writeln!(out, "title       {}", task.title)?;
        if let Some(description) = &task.description {
            writeln!(out, "notes       {description}")?;
        }
        writeln!(
            out,
            "status      {}",
            if task.completed { "completed" } else { "active" }
        )?;
        writeln!(out, "priority    {}", task.priority)?;
        writeln!(
            out,
            "category    {}",
            category.map(|c| c.name.as_str()).unwrap_or(&task.category_id)
        )?;
        writeln!(out, "tags        {}", task.tags.join(", "))?;
        if let Some(deadline) = task.deadline {
            let status = deadline_status(deadline, now);
            writeln!(
                out,
                "deadline    {} ({})",
                format_local(deadline),
                status.label
            )?;
        }
        writeln!(out, "created     {}", format_local(task.created_at))?;
        writeln!(out, "updated     {}", format_local(task.updated_at))?;
        if let Some(at) = task.last_notified {
            writeln!(out, "reminded    {}", format_local(at))?;
        }

        Ok(())
    }

    pub fn print_categories(
        &mut self,
        categories: &[Category],
        tasks: &[Task],
        selected: Option<&str>,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let headers = ["", "ID", "Name", "Color", "Tasks"].map(String::from).to_vec();
        let rows = categories
            .iter()
            .map(|category| {
                let count = tasks
                    .iter()
                    .filter(|t| t.category_id == category.id)
                    .count();
                let marker = if selected == Some(category.id.as_str()) {
                    "*"
                } else {
                    ""
                };
                vec![
                    marker.to_string(),
                    category.id.clone(),
                    category.name.clone(),
                    category.color.clone(),
                    count.to_string(),
                ]
            })
            .collect();

        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    pub fn print_stats(&mut self, stats: Stats) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "{}", stats.summary())?;
        if stats.total > 0 {
            writeln!(out, "{} active", stats.total - stats.completed)?;
        }
        Ok(())
    }

    /// Terminal rendition of an in-app toast.
    pub fn print_toast(&mut self, reminder: &Reminder) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let headline = self.paint(&reminder.headline(), "1;33");
        writeln!(out, "{headline}")?;
        for line in reminder.body().lines() {
            writeln!(out, "  {line}")?;
        }
        Ok(())
    }

    fn task_row(&self, task: &Task, categories: &[Category], now: DateTime<Utc>) -> Vec<String> {
        let check = if task.completed { "[x]" } else { "[ ]" };

        let priority = match task.priority {
            Priority::High => self.paint("high", "31"),
            Priority::Medium => self.paint("medium", "33"),
            Priority::Low => self.paint("low", "32"),
        };

        let deadline = match task.deadline {
            Some(deadline) if !task.completed => {
                let status = deadline_status(deadline, now);
                let text = format!("{} {}", format_local(deadline), status.label);
                if status.overdue {
                    self.paint(&text, "31")
                } else if status.urgent {
                    self.paint(&text, "33")
                } else {
                    text
                }
            }
            Some(deadline) => format_local(deadline),
            None => String::new(),
        };

        let category = categories
            .iter()
            .find(|c| c.id == task.category_id)
            .map(|c| c.name.clone())
            .unwrap_or_else(|| task.category_id.clone());

        let tags = task
            .tags
            .iter()
            .map(|tag| format!("#{tag}"))
            .collect::<Vec<_>>()
            .join(" ");

        vec![
            short_id(&task.id).to_string(),
            check.to_string(),
            priority,
            deadline,
            category,
            task.title.clone(),
            tags,
        ]
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

/// Leading part of an id, long enough to type back in.
pub fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths: Vec<usize> = headers
        .iter()
        .map(|header| UnicodeWidthStr::width(header.as_str()))
        .collect();

    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(visible_width(cell));
        }
    }

    for (header, width) in headers.iter().zip(&widths) {
        write!(writer, "{header:width$} ")?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "")?;
    }
    writeln!(writer)?;

    for row in rows {
        for (cell, width) in row.iter().zip(&widths).take(column_count) {
            let padding = width.saturating_sub(visible_width(cell));
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn visible_width(cell: &str) -> usize {
    UnicodeWidthStr::width(strip_ansi(cell).as_str())
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
    fn table_pads_by_visible_width() {
        let mut buf = Vec::new();
        write_table(
            &mut buf,
            vec!["A".to_string(), "Title".to_string()],
            vec![
                vec!["\x1b[31mxy\x1b[0m".to_string(), "日本".to_string()],
                vec!["z".to_string(), "ok".to_string()],
            ],
        )
        .unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "A  Title ");
        assert_eq!(lines[1], "-- ----- ");
        assert_eq!(lines[3], "z  ok    ");
        assert_eq!(strip_ansi(lines[2]), "xy 日本  ");
    }

    #[test]
    fn short_id_handles_short_input() {
        assert_eq!(short_id("0123456789abcdef"), "01234567");
        assert_eq!(short_id("abc"), "abc");
    }
}
