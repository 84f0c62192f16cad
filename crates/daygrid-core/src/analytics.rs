use std::collections::{
  BTreeMap,
  BTreeSet
};
use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{
  Datelike,
  Days,
  NaiveDate,
  NaiveDateTime,
  NaiveTime
};
use serde::Serialize;
use tracing::trace;

use crate::category::{
  Category,
  CategoryFilter
};
use crate::datetime::week_start_sunday;
use crate::task::Task;

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  clap::ValueEnum,
)]
pub enum DateRange {
  #[default]
  Day,
  Week,
  Month,
  Year
}

impl fmt::Display for DateRange {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(match self {
      | DateRange::Day => "day",
      | DateRange::Week => "week",
      | DateRange::Month => "month",
      | DateRange::Year => "year"
    })
  }
}

impl FromStr for DateRange {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "day" => Ok(DateRange::Day),
      | "week" => Ok(DateRange::Week),
      | "month" => Ok(DateRange::Month),
      | "year" => Ok(DateRange::Year),
      | other => {
        Err(anyhow!(
          "unknown date range \
           '{other}': expected day, \
           week, month or year"
        ))
      }
    }
  }
}

/// Inclusive timestamp window.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub struct DateWindow {
  pub start: NaiveDateTime,
  pub end:   NaiveDateTime
}

impl DateWindow {
  /// Window for `range` around
  /// `anchor`: from the first day's
  /// 00:00:00 to the last day's
  /// 23:59:59. Weeks run Sunday to
  /// Saturday.
  pub fn for_range(
    range: DateRange,
    anchor: NaiveDate
  ) -> Self {
    let (first, last) = match range {
      | DateRange::Day => {
        (anchor, anchor)
      }
      | DateRange::Week => {
        let start =
          week_start_sunday(anchor);
        let end = start
          .checked_add_days(Days::new(6))
          .unwrap_or(start);
        (start, end)
      }
      | DateRange::Month => {
        let start = anchor
          .with_day(1)
          .unwrap_or(anchor);
        let days = days_in_month(
          anchor.year(),
          anchor.month()
        );
        let end = anchor
          .with_day(days)
          .unwrap_or(anchor);
        (start, end)
      }
      | DateRange::Year => {
        let start = NaiveDate::from_ymd_opt(
          anchor.year(),
          1,
          1
        )
        .unwrap_or(anchor);
        let end = NaiveDate::from_ymd_opt(
          anchor.year(),
          12,
          31
        )
        .unwrap_or(anchor);
        (start, end)
      }
    };

    Self {
      start: first
        .and_time(NaiveTime::MIN),
      end:   last.and_time(end_of_day())
    }
  }

  /// A task date counts from its
  /// midnight.
  pub fn contains(
    &self,
    date: NaiveDate
  ) -> bool {
    let at = date.and_time(NaiveTime::MIN);
    self.start <= at && at <= self.end
  }
}

fn end_of_day() -> NaiveTime {
  NaiveTime::from_hms_opt(23, 59, 59)
    .unwrap_or(NaiveTime::MIN)
}

pub fn days_in_month(
  year: i32,
  month: u32
) -> u32 {
  let first =
    NaiveDate::from_ymd_opt(
      year, month, 1
    );
  let next = if month == 12 {
    NaiveDate::from_ymd_opt(
      year + 1,
      1,
      1
    )
  } else {
    NaiveDate::from_ymd_opt(
      year,
      month + 1,
      1
    )
  };
  match (first, next) {
    | (Some(first), Some(next)) => {
      u32::try_from(
        next
          .signed_duration_since(first)
          .num_days()
      )
      .unwrap_or(0)
    }
    | _ => 0
  }
}

pub fn filter_by_date_range(
  tasks: &[Task],
  range: DateRange,
  anchor: NaiveDate
) -> Vec<Task> {
  let window =
    DateWindow::for_range(range, anchor);
  trace!(
    %range,
    start = %window.start,
    end = %window.end,
    "filtering by date window"
  );
  tasks
    .iter()
    .filter(|t| window.contains(t.date))
    .cloned()
    .collect()
}

pub fn filter_by_category(
  tasks: &[Task],
  filter: CategoryFilter
) -> Vec<Task> {
  tasks
    .iter()
    .filter(|t| filter.matches(t.category))
    .cloned()
    .collect()
}

/// Planned hours per category.
pub fn sum_duration_by_category(
  tasks: &[Task]
) -> BTreeMap<Category, f64> {
  let mut out = BTreeMap::new();
  for task in tasks {
    *out
      .entry(task.category)
      .or_insert(0.0) +=
      task.total_hours();
  }
  out
}

pub fn count_by_category(
  tasks: &[Task]
) -> BTreeMap<Category, usize> {
  let mut out = BTreeMap::new();
  for task in tasks {
    *out
      .entry(task.category)
      .or_insert(0) += 1;
  }
  out
}

pub fn active_days_count(
  tasks: &[Task]
) -> usize {
  tasks
    .iter()
    .map(|t| t.date)
    .collect::<BTreeSet<_>>()
    .len()
}

/// Days of `month` in `year` with at
/// least one task.
pub fn completed_days_in_month(
  tasks: &[Task],
  year: i32,
  month: u32
) -> BTreeSet<u32> {
  tasks
    .iter()
    .filter(|t| {
      t.date.year() == year
        && t.date.month() == month
    })
    .map(|t| t.date.day())
    .collect()
}

/// Marker category per day of the
/// month: the earliest-created task
/// on that day wins.
pub fn day_categories_in_month(
  tasks: &[Task],
  year: i32,
  month: u32
) -> BTreeMap<u32, Category> {
  let mut firsts: BTreeMap<
    u32,
    &Task
  > = BTreeMap::new();
  for task in tasks.iter().filter(|t| {
    t.date.year() == year
      && t.date.month() == month
  }) {
    let entry = firsts
      .entry(task.date.day())
      .or_insert(task);
    if (task.created_at, task.id)
      < (entry.created_at, entry.id)
    {
      *entry = task;
    }
  }
  firsts
    .into_iter()
    .map(|(day, task)| {
      (day, task.category)
    })
    .collect()
}

/// Newest first by creation time.
pub fn recent_tasks(
  tasks: &[Task],
  limit: usize
) -> Vec<Task> {
  let mut sorted = tasks.to_vec();
  sorted.sort_by(|a, b| {
    (b.created_at, b.id)
      .cmp(&(a.created_at, a.id))
  });
  sorted.truncate(limit);
  sorted
}

#[derive(
  Debug, Clone, PartialEq, Serialize,
)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
  pub task_count:    usize,
  pub hours_planned: f64,
  pub active_days:   usize
}

pub fn summarize(
  tasks: &[Task]
) -> Summary {
  Summary {
    task_count:    tasks.len(),
    hours_planned: tasks
      .iter()
      .map(Task::total_hours)
      .sum(),
    active_days:   active_days_count(
      tasks
    )
  }
}
