use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::{Datelike, NaiveDate};
use unicode_width::UnicodeWidthStr;

use crate::analytics::{Summary, days_in_month};
use crate::category::Category;
use crate::config::Config;
use crate::identity::UserProfile;
use crate::scheduler::Occupancy;
use crate::slots::{SlotId, TimeSlot, format_clock_label};
use crate::task::Task;

const BAR_WIDTH: usize = 30;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color = cfg.get_bool("color")?.unwrap_or(true);
        Ok(Self { color })
    }

    /// One line per slot: marker, time range, and the holder if any.
    /// `[*]` marks the pending selection, `[#]` a booked slot.
    #[tracing::instrument(skip_all, fields(date = %date))]
    pub fn print_slot_grid(
        &mut self,
        date: NaiveDate,
        slots: &[TimeSlot],
        occupancy: &Occupancy,
        selection: &[SlotId],
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "{}", date.format("%A, %B %-d %Y"))?;

        let headers = vec![
            " ".to_string(),
            "Slot".to_string(),
            "Time".to_string(),
            "Task".to_string(),
            "Category".to_string(),
        ];

        let mut rows = Vec::with_capacity(slots.len());
        for slot in slots {
            let (marker, task, category) = match occupancy.get(&slot.id) {
                Some(holder) => (
                    "[#]".to_string(),
                    format!("{} ({})", holder.title, holder.task_id),
                    self.paint_category(holder.category),
                ),
                None if selection.contains(&slot.id) => {
                    (self.paint("[*]", "1;33"), String::new(), String::new())
                }
                None => ("[ ]".to_string(), String::new(), String::new()),
            };
            rows.push(vec![
                marker,
                slot.id.offset().to_string(),
                slot.display_text(),
                task,
                category,
            ]);
        }

        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, tasks))]
    pub fn print_task_table(&mut self, tasks: &[Task]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        if tasks.is_empty() {
            writeln!(out, "No tasks.")?;
            return Ok(());
        }

        let headers = vec![
            "ID".to_string(),
            "Date".to_string(),
            "Slots".to_string(),
            "Hours".to_string(),
            "Category".to_string(),
            "Title".to_string(),
        ];

        let mut rows = Vec::with_capacity(tasks.len());
        for task in tasks {
            rows.push(vec![
                self.paint(&task.id.to_string(), "33"),
                task.date.format("%Y-%m-%d").to_string(),
                slot_span(&task.slot_ids),
                format_hours(task.total_hours()),
                self.paint_category(task.category),
                task.title.clone(),
            ]);
        }

        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, task))]
    pub fn print_task_info(&mut self, task: &Task) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(out, "id        {}", task.id)?;
        writeln!(out, "title     {}", task.title)?;
        writeln!(out, "category  {}", self.paint_category(task.category))?;
        writeln!(out, "date      {}", task.date.format("%Y-%m-%d"))?;
        writeln!(out, "slots     {}", slot_span(&task.slot_ids))?;
        writeln!(out, "duration  {} min", task.total_duration())?;
        writeln!(out, "created   {}", task.created_at.format("%Y%m%dT%H%M%SZ"))?;

        Ok(())
    }

    pub fn print_summary(&mut self, label: &str, summary: &Summary) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "{}", self.paint(label, "1"))?;
        writeln!(out, "  tasks        {}", summary.task_count)?;
        writeln!(out, "  hours        {}", format_hours(summary.hours_planned))?;
        writeln!(out, "  active days  {}", summary.active_days)?;
        Ok(())
    }

    /// Horizontal bar per category, scaled to the largest value.
    #[tracing::instrument(skip_all)]
    pub fn print_category_chart(
        &mut self,
        hours: &BTreeMap<Category, f64>,
        counts: &BTreeMap<Category, usize>,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        if hours.is_empty() {
            writeln!(out, "No tasks in range.")?;
            return Ok(());
        }

        let max = hours.values().copied().fold(0.0_f64, f64::max);
        let headers = vec![
            "Category".to_string(),
            "Hours".to_string(),
            "Tasks".to_string(),
            String::new(),
        ];

        let mut rows = Vec::with_capacity(hours.len());
        for (category, value) in hours {
            let filled = if max > 0.0 {
                ((value / max) * BAR_WIDTH as f64).round() as usize
            } else {
                0
            };
            let (r, g, b) = category.rgb();
            let bar = self.paint(&"#".repeat(filled.max(1)), &format!("38;2;{r};{g};{b}"));
            rows.push(vec![
                self.paint_category(*category),
                format_hours(*value),
                counts.get(category).copied().unwrap_or(0).to_string(),
                bar,
            ]);
        }

        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    /// Sunday-first month grid. Days with tasks carry a `*` painted in the
    /// colour of that day's marker category.
    #[tracing::instrument(skip(self, completed, markers))]
    pub fn print_month_calendar(
        &mut self,
        year: i32,
        month: u32,
        completed: &BTreeSet<u32>,
        markers: &BTreeMap<u32, Category>,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let first = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| anyhow!("invalid month {year}-{month:02}"))?;

        writeln!(out, "{}", self.paint(&first.format("%B %Y").to_string(), "1"))?;
        writeln!(out, " Su  Mo  Tu  We  Th  Fr  Sa")?;

        let lead = first.weekday().num_days_from_sunday() as usize;
        let mut line = "    ".repeat(lead);
        let mut column = lead;

        for day in 1..=days_in_month(year, month) {
            let cell = if completed.contains(&day) {
                let mark = match markers.get(&day) {
                    Some(category) => {
                        let (r, g, b) = category.rgb();
                        self.paint("*", &format!("38;2;{r};{g};{b}"))
                    }
                    None => "*".to_string(),
                };
                format!("{day:>3}{mark}")
            } else {
                format!("{day:>3} ")
            };
            line.push_str(&cell);
            column += 1;
            if column == 7 {
                writeln!(out, "{}", line.trim_end())?;
                line.clear();
                column = 0;
            }
        }
        if !line.is_empty() {
            writeln!(out, "{}", line.trim_end())?;
        }

        writeln!(out, "{} day(s) with tasks", completed.len())?;
        Ok(())
    }

    pub fn print_profile(&mut self, profile: &UserProfile) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "name  {}", profile.display_name)?;
        writeln!(out, "id    {}", profile.id)?;
        Ok(())
    }

    fn paint_category(&self, category: Category) -> String {
        let (r, g, b) = category.rgb();
        self.paint(category.name(), &format!("38;2;{r};{g};{b}"))
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn format_hours(hours: f64) -> String {
    format!("{hours:.1}")
}

/// `9:00 AM-10:00 AM` for contiguous runs, comma separated otherwise.
fn slot_span(slots: &[SlotId]) -> String {
    let mut runs: Vec<(SlotId, SlotId)> = Vec::new();
    for slot in slots {
        match runs.last_mut() {
            Some((_, end)) if end.end_offset() == slot.offset() => *end = *slot,
            _ => runs.push((*slot, *slot)),
        }
    }

    runs.iter()
        .map(|(start, end)| {
            format!(
                "{}-{}",
                start.label(),
                format_clock_label(end.end_offset())
            )
        })
        .collect::<Vec<_>>()
        .join(", ")
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
