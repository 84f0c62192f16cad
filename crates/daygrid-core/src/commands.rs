use std::fs;
use std::path::Path;

use anyhow::{Context, anyhow};
use chrono::{Datelike, NaiveDate};
use tracing::{debug, info, instrument, warn};

use crate::analytics::{
    DateRange, count_by_category, completed_days_in_month, day_categories_in_month,
    filter_by_category, filter_by_date_range, recent_tasks, sum_duration_by_category, summarize,
};
use crate::category::{Category, CategoryFilter};
use crate::cli::Command;
use crate::config::Config;
use crate::datastore::TaskRepository;
use crate::datetime::parse_month_expr;
use crate::error::ScheduleError;
use crate::identity::{IdentityProvider, LocalIdentity};
use crate::render::Renderer;
use crate::scheduler::Scheduler;
use crate::slots::SlotId;
use crate::task::TaskId;

#[instrument(skip(scheduler, cfg, renderer, command, data_dir))]
pub fn dispatch<R: TaskRepository>(
    scheduler: &mut Scheduler<R>,
    cfg: &Config,
    renderer: &mut Renderer,
    command: Command,
    data_dir: &Path,
) -> anyhow::Result<()> {
    debug!(?command, date = %scheduler.active_date(), "dispatching command");

    match command {
        Command::Slots => cmd_slots(scheduler, renderer),
        Command::Add {
            title,
            slots,
            category,
        } => cmd_add(scheduler, cfg, renderer, &title, &slots, category.as_deref()),
        Command::Edit {
            id,
            title,
            category,
            slots,
        } => cmd_edit(
            scheduler,
            renderer,
            &id,
            title.as_deref(),
            category.as_deref(),
            &slots,
        ),
        Command::Delete { id } => cmd_delete(scheduler, &id),
        Command::Clear { slots } => cmd_clear(scheduler, &slots),
        Command::List {
            range,
            category,
            recent,
        } => cmd_list(scheduler, renderer, range, &category, recent),
        Command::Stats { range, category } => cmd_stats(scheduler, renderer, range, &category),
        Command::Calendar { month } => cmd_calendar(scheduler, renderer, month.as_deref()),
        Command::ImportLegacy { file } => cmd_import_legacy(scheduler, &file),
        Command::Whoami => cmd_whoami(cfg, renderer, data_dir),
    }
}

fn cmd_slots<R: TaskRepository>(
    scheduler: &Scheduler<R>,
    renderer: &mut Renderer,
) -> anyhow::Result<()> {
    let date = scheduler.active_date();
    let occupancy = scheduler.occupancy_for(date)?;
    info!(date = %date, booked = occupancy.len(), "command slots");
    renderer.print_slot_grid(date, scheduler.slots(), &occupancy, &scheduler.selection())
}

#[instrument(skip(scheduler, cfg, renderer, slots))]
fn cmd_add<R: TaskRepository>(
    scheduler: &mut Scheduler<R>,
    cfg: &Config,
    renderer: &mut Renderer,
    title: &str,
    slots: &[String],
    category: Option<&str>,
) -> anyhow::Result<()> {
    info!("command add");

    let category = match category {
        Some(raw) => raw.parse::<Category>()?,
        None => cfg.default_category()?,
    };

    for slot in parse_slot_args(slots)? {
        if !scheduler.selection().contains(&slot) {
            scheduler.toggle_slot_selection(slot);
        }
    }

    let task = scheduler.commit_selection(title, category)?;
    println!("Created task {}.", task.id);
    renderer.print_task_info(&task)
}

#[instrument(skip(scheduler, renderer, title, slots))]
fn cmd_edit<R: TaskRepository>(
    scheduler: &mut Scheduler<R>,
    renderer: &mut Renderer,
    raw_id: &str,
    title: Option<&str>,
    category: Option<&str>,
    slots: &[String],
) -> anyhow::Result<()> {
    info!("command edit");

    let id: TaskId = raw_id.parse()?;
    let current = scheduler
        .load_tasks()?
        .into_iter()
        .find(|t| t.id == id)
        .ok_or(ScheduleError::NotFound(id))?;

    let title = title.unwrap_or(&current.title).to_string();
    let category = match category {
        Some(raw) => raw.parse::<Category>()?,
        None => current.category,
    };
    let slots = if slots.is_empty() {
        current.slot_ids.clone()
    } else {
        parse_slot_args(slots)?
    };

    let updated = scheduler
        .commit_edit_task(id, &title, category, &slots)?
        .ok_or(ScheduleError::NotFound(id))?;
    println!("Updated task {}.", updated.id);
    renderer.print_task_info(&updated)
}

#[instrument(skip(scheduler))]
fn cmd_delete<R: TaskRepository>(scheduler: &mut Scheduler<R>, raw_id: &str) -> anyhow::Result<()> {
    let id: TaskId = raw_id.parse()?;
    if scheduler.delete_task(id)? {
        println!("Deleted task {id}.");
    } else {
        warn!(task_id = %id, "nothing to delete");
        println!("No task {id}.");
    }
    Ok(())
}

#[instrument(skip(scheduler, slots))]
fn cmd_clear<R: TaskRepository>(scheduler: &mut Scheduler<R>, slots: &[String]) -> anyhow::Result<()> {
    scheduler.clear_selection();
    for slot in parse_slot_args(slots)? {
        if !scheduler.selection().contains(&slot) {
            scheduler.toggle_slot_selection(slot);
        }
    }

    for task in scheduler.tasks_in_selection()? {
        debug!(task_id = %task.id, title = %task.title, "clearing task");
    }
    let removed = scheduler.delete_tasks_in_selection()?;
    println!(
        "Deleted {removed} task(s) on {}.",
        scheduler.active_date().format("%Y-%m-%d")
    );
    Ok(())
}

#[instrument(skip(scheduler, renderer))]
fn cmd_list<R: TaskRepository>(
    scheduler: &Scheduler<R>,
    renderer: &mut Renderer,
    range: DateRange,
    category: &str,
    recent: Option<usize>,
) -> anyhow::Result<()> {
    let filter: CategoryFilter = category.parse()?;
    let all = scheduler.load_tasks()?;

    let mut tasks = match recent {
        Some(limit) => recent_tasks(&filter_by_category(&all, filter), limit),
        None => {
            let in_range = filter_by_date_range(&all, range, scheduler.active_date());
            filter_by_category(&in_range, filter)
        }
    };
    if recent.is_none() {
        tasks.sort_by_key(|t| (t.date, t.slot_ids.first().copied(), t.id));
    }

    info!(count = tasks.len(), "command list");
    renderer.print_task_table(&tasks)
}

#[instrument(skip(scheduler, renderer))]
fn cmd_stats<R: TaskRepository>(
    scheduler: &Scheduler<R>,
    renderer: &mut Renderer,
    range: DateRange,
    category: &str,
) -> anyhow::Result<()> {
    let filter: CategoryFilter = category.parse()?;
    let all = scheduler.load_tasks()?;
    let anchor = scheduler.active_date();
    let tasks = filter_by_category(&filter_by_date_range(&all, range, anchor), filter);

    let label = format!("{range} of {} ({filter})", anchor.format("%Y-%m-%d"));
    renderer.print_summary(&label, &summarize(&tasks))?;
    println!();
    renderer.print_category_chart(&sum_duration_by_category(&tasks), &count_by_category(&tasks))
}

#[instrument(skip(scheduler, renderer))]
fn cmd_calendar<R: TaskRepository>(
    scheduler: &Scheduler<R>,
    renderer: &mut Renderer,
    month: Option<&str>,
) -> anyhow::Result<()> {
    let (year, month) = match month {
        Some(raw) => parse_month_expr(raw)?,
        None => {
            let date: NaiveDate = scheduler.active_date();
            (date.year(), date.month())
        }
    };

    let tasks = scheduler.load_tasks()?;
    let completed = completed_days_in_month(&tasks, year, month);
    let markers = day_categories_in_month(&tasks, year, month);
    renderer.print_month_calendar(year, month, &completed, &markers)
}

#[instrument(skip(scheduler))]
fn cmd_import_legacy<R: TaskRepository>(
    scheduler: &mut Scheduler<R>,
    file: &Path,
) -> anyhow::Result<()> {
    let raw = fs::read_to_string(file)
        .with_context(|| format!("failed reading {}", file.display()))?;
    let report = scheduler.import_legacy(&raw)?;

    println!("Imported {} task(s).", report.tasks.len());
    for line in &report.skipped {
        println!("  skipped {line}");
    }
    Ok(())
}

fn cmd_whoami(cfg: &Config, renderer: &mut Renderer, data_dir: &Path) -> anyhow::Result<()> {
    let identity = LocalIdentity::new(data_dir, &cfg.user_name());
    let profile = identity.sign_in()?;
    renderer.print_profile(&profile)
}

fn parse_slot_args(raw: &[String]) -> anyhow::Result<Vec<SlotId>> {
    if raw.is_empty() {
        return Err(anyhow!("at least one --slot is required"));
    }
    raw.iter()
        .map(|token| SlotId::parse(token).with_context(|| format!("invalid slot '{token}'")))
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{cmd_add, cmd_clear, cmd_edit, parse_slot_args};
    use crate::category::Category;
    use crate::config::Config;
    use crate::datastore::MemoryStore;
    use crate::render::Renderer;
    use crate::scheduler::Scheduler;
    use crate::slots::SlotId;

    fn planner() -> (Scheduler<MemoryStore>, Renderer, Config) {
        let mut cfg = Config::default();
        cfg.apply_overrides(vec![("rc.color".to_string(), "off".to_string())]);
        let renderer = Renderer::new(&cfg).expect("renderer");
        let date = NaiveDate::from_ymd_opt(2025, 3, 23).expect("date");
        (Scheduler::new(MemoryStore::new(), date), renderer, cfg)
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn add_uses_default_category_and_ignores_repeated_slots() {
        let (mut scheduler, mut renderer, cfg) = planner();
        cmd_add(
            &mut scheduler,
            &cfg,
            &mut renderer,
            "Gym",
            &strings(&["9:00 AM", "9:00", "9:30 AM"]),
            None,
        )
        .expect("add");

        let tasks = scheduler.repository().snapshot();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].category, Category::Work);
        assert_eq!(tasks[0].total_duration(), 60);
        assert!(scheduler.selection().is_empty());
    }

    #[test]
    fn edit_keeps_unspecified_fields() {
        let (mut scheduler, mut renderer, cfg) = planner();
        cmd_add(
            &mut scheduler,
            &cfg,
            &mut renderer,
            "Gym",
            &strings(&["9:00 AM"]),
            Some("Personal"),
        )
        .expect("add");
        let id = scheduler.repository().snapshot()[0].id.to_string();

        cmd_edit(&mut scheduler, &mut renderer, &id, Some("Run"), None, &[]).expect("edit");

        let task = &scheduler.repository().snapshot()[0];
        assert_eq!(task.title, "Run");
        assert_eq!(task.category, Category::Personal);
        assert_eq!(task.slot_ids, vec![SlotId::from_hm(9, 0).expect("slot")]);
    }

    #[test]
    fn edit_of_unknown_id_is_an_error() {
        let (mut scheduler, mut renderer, _cfg) = planner();
        assert!(cmd_edit(&mut scheduler, &mut renderer, "99", None, None, &[]).is_err());
    }

    #[test]
    fn clear_removes_overlapping_tasks() {
        let (mut scheduler, mut renderer, cfg) = planner();
        cmd_add(
            &mut scheduler,
            &cfg,
            &mut renderer,
            "Gym",
            &strings(&["9:00 AM", "9:30 AM"]),
            None,
        )
        .expect("add");

        cmd_clear(&mut scheduler, &strings(&["9:30 AM"])).expect("clear");
        assert!(scheduler.repository().snapshot().is_empty());
    }

    #[test]
    fn slot_arguments_must_parse() {
        assert!(parse_slot_args(&strings(&["25:00"])).is_err());
        assert!(parse_slot_args(&[]).is_err());
    }
}
