use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, error, info, instrument};

use crate::category::Category;
use crate::datastore::TaskRepository;
use crate::error::{ScheduleError, ScheduleResult};
use crate::legacy::{LegacyImport, import_legacy};
use crate::slots::{SlotId, TimeSlot, generate_slots};
use crate::task::{Task, TaskId, normalize_slots};

/// Who holds a slot on a given date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotOccupant {
    pub task_id: TaskId,
    pub category: Category,
    pub title: String,
}

pub type Occupancy = BTreeMap<SlotId, SlotOccupant>;

/// Slot occupancy for `date`, derived from the task list.
pub fn occupancy_of(tasks: &[Task], date: NaiveDate) -> Occupancy {
    let mut out = Occupancy::new();
    for task in tasks.iter().filter(|t| t.date == date) {
        for slot in &task.slot_ids {
            out.insert(
                *slot,
                SlotOccupant {
                    task_id: task.id,
                    category: task.category,
                    title: task.title.clone(),
                },
            );
        }
    }
    out
}

/// First task on `date` (other than `exclude`) holding any of `slots`, with
/// the slots it holds.
pub fn find_conflict(
    tasks: &[Task],
    date: NaiveDate,
    slots: &[SlotId],
    exclude: Option<TaskId>,
) -> Option<(TaskId, Vec<SlotId>)> {
    tasks
        .iter()
        .filter(|t| t.date == date && Some(t.id) != exclude)
        .find_map(|task| {
            let taken: Vec<SlotId> = slots.iter().copied().filter(|s| task.occupies(*s)).collect();
            (!taken.is_empty()).then_some((task.id, taken))
        })
}

fn validate_submission(title: &str, selected: &[SlotId]) -> ScheduleResult<Vec<SlotId>> {
    if title.trim().is_empty() {
        return Err(ScheduleError::Validation("title cannot be empty".to_string()));
    }
    if selected.is_empty() {
        return Err(ScheduleError::Validation(
            "select at least one time slot".to_string(),
        ));
    }
    Ok(normalize_slots(selected))
}

fn store_error(err: anyhow::Error) -> ScheduleError {
    let detail = format!("{err:#}");
    error!(error = %detail, "task store operation failed");
    ScheduleError::Store(err)
}

/// Mediates slot selection and every task mutation for one active date.
///
/// Occupancy is never cached: each operation reads the whole collection from
/// the repository, validates, and writes it back. In-memory state (the
/// selection) only changes after a write succeeds.
pub struct Scheduler<R> {
    repo: R,
    slots: Vec<TimeSlot>,
    active_date: NaiveDate,
    selection: BTreeSet<SlotId>,
    clock: fn() -> DateTime<Utc>,
}

impl<R: TaskRepository> Scheduler<R> {
    pub fn new(repo: R, active_date: NaiveDate) -> Self {
        Self {
            repo,
            slots: generate_slots(),
            active_date,
            selection: BTreeSet::new(),
            clock: Utc::now,
        }
    }

    /// Replaces the time source used for task ids and `created_at`.
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn slots(&self) -> &[TimeSlot] {
        &self.slots
    }

    pub fn active_date(&self) -> NaiveDate {
        self.active_date
    }

    pub fn selection(&self) -> Vec<SlotId> {
        self.selection.iter().copied().collect()
    }

    /// Switches the active date; the selection never carries across dates.
    pub fn select_date(&mut self, date: NaiveDate) {
        if date != self.active_date {
            debug!(from = %self.active_date, to = %date, "switching active date");
        }
        self.active_date = date;
        self.selection.clear();
    }

    /// Flips `slot` in the selection and returns whether it is now selected.
    pub fn toggle_slot_selection(&mut self, slot: SlotId) -> bool {
        if self.selection.remove(&slot) {
            false
        } else {
            self.selection.insert(slot);
            true
        }
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    pub fn load_tasks(&self) -> ScheduleResult<Vec<Task>> {
        self.repo.load_all_tasks().map_err(store_error)
    }

    pub fn tasks_for_date(&self, date: NaiveDate) -> ScheduleResult<Vec<Task>> {
        let mut tasks: Vec<Task> = self
            .load_tasks()?
            .into_iter()
            .filter(|t| t.date == date)
            .collect();
        tasks.sort_by_key(|t| (t.slot_ids.first().copied(), t.id));
        Ok(tasks)
    }

    #[instrument(skip(self))]
    pub fn occupancy_for(&self, date: NaiveDate) -> ScheduleResult<Occupancy> {
        Ok(occupancy_of(&self.load_tasks()?, date))
    }

    #[instrument(skip(self, title, selected), fields(slots = selected.len()))]
    pub fn commit_new_task(
        &mut self,
        title: &str,
        category: Category,
        selected: &[SlotId],
        date: NaiveDate,
    ) -> ScheduleResult<Task> {
        let slots = validate_submission(title, selected)?;
        let mut tasks = self.load_tasks()?;

        if let Some((task_id, taken)) = find_conflict(&tasks, date, &slots, None) {
            debug!(%task_id, taken = taken.len(), "rejecting double booking");
            return Err(ScheduleError::Conflict {
                slots: taken,
                task_id,
            });
        }

        let now = (self.clock)();
        let task = Task::new(TaskId::next(&tasks, now), title, category, date, &slots, now);
        tasks.push(task.clone());
        self.repo.save_all_tasks(&tasks).map_err(store_error)?;

        if date == self.active_date {
            self.selection.clear();
        }
        info!(task_id = %task.id, minutes = task.total_duration(), "task committed");
        Ok(task)
    }

    /// Commits the current selection on the active date.
    pub fn commit_selection(&mut self, title: &str, category: Category) -> ScheduleResult<Task> {
        let selected = self.selection();
        let date = self.active_date;
        self.commit_new_task(title, category, &selected, date)
    }

    /// Full replace of title, category and slots. Returns `Ok(None)` when the
    /// id is unknown.
    #[instrument(skip(self, title, selected), fields(slots = selected.len()))]
    pub fn commit_edit_task(
        &mut self,
        id: TaskId,
        title: &str,
        category: Category,
        selected: &[SlotId],
    ) -> ScheduleResult<Option<Task>> {
        let slots = validate_submission(title, selected)?;
        let mut tasks = self.load_tasks()?;

        let Some(idx) = tasks.iter().position(|t| t.id == id) else {
            debug!(error = %ScheduleError::NotFound(id), "edit ignored");
            return Ok(None);
        };
        let date = tasks[idx].date;

        if let Some((task_id, taken)) = find_conflict(&tasks, date, &slots, Some(id)) {
            debug!(%task_id, taken = taken.len(), "rejecting edit overlapping another task");
            return Err(ScheduleError::Conflict {
                slots: taken,
                task_id,
            });
        }

        let task = &mut tasks[idx];
        task.title = title.trim().to_string();
        task.category = category;
        task.slot_ids = slots;
        let updated = task.clone();

        self.repo.save_all_tasks(&tasks).map_err(store_error)?;

        if date == self.active_date {
            self.selection.clear();
        }
        info!(task_id = %updated.id, "task updated");
        Ok(Some(updated))
    }

    /// Removes the task and releases its slots. Deleting an unknown id is a
    /// no-op that returns `Ok(false)` without writing.
    #[instrument(skip(self))]
    pub fn delete_task(&mut self, id: TaskId) -> ScheduleResult<bool> {
        let mut tasks = self.load_tasks()?;
        let Some(idx) = tasks.iter().position(|t| t.id == id) else {
            debug!(error = %ScheduleError::NotFound(id), "delete ignored");
            return Ok(false);
        };

        let removed = tasks.remove(idx);
        self.repo.save_all_tasks(&tasks).map_err(store_error)?;

        if removed.date == self.active_date {
            for slot in &removed.slot_ids {
                self.selection.remove(slot);
            }
        }
        info!(task_id = %id, "task deleted");
        Ok(true)
    }

    /// Tasks on the active date touching any selected slot, in slot order.
    pub fn tasks_in_selection(&self) -> ScheduleResult<Vec<Task>> {
        let selected = self.selection();
        Ok(self
            .tasks_for_date(self.active_date)?
            .into_iter()
            .filter(|t| t.overlaps(&selected))
            .collect())
    }

    /// Deletes every task on the active date touching the selection in a
    /// single write, then clears the selection.
    #[instrument(skip(self))]
    pub fn delete_tasks_in_selection(&mut self) -> ScheduleResult<usize> {
        let selected = self.selection();
        if selected.is_empty() {
            return Err(ScheduleError::Validation(
                "select at least one time slot".to_string(),
            ));
        }

        let tasks = self.load_tasks()?;
        let before = tasks.len();
        let date = self.active_date;
        let kept: Vec<Task> = tasks
            .into_iter()
            .filter(|t| !(t.date == date && t.overlaps(&selected)))
            .collect();
        let removed = before - kept.len();

        if removed > 0 {
            self.repo.save_all_tasks(&kept).map_err(store_error)?;
        }
        self.selection.clear();
        info!(removed, "deleted tasks in selection");
        Ok(removed)
    }

    /// Merges records from the earlier app's storage format into the store.
    #[instrument(skip(self, raw))]
    pub fn import_legacy(&mut self, raw: &str) -> ScheduleResult<LegacyImport> {
        let mut tasks = self.load_tasks()?;
        let now = (self.clock)();
        let report = import_legacy(raw, &tasks, now)
            .map_err(|err| ScheduleError::Validation(format!("{err:#}")))?;

        if !report.tasks.is_empty() {
            tasks.extend(report.tasks.iter().cloned());
            self.repo.save_all_tasks(&tasks).map_err(store_error)?;
        }
        info!(
            imported = report.tasks.len(),
            skipped = report.skipped.len(),
            "legacy import finished"
        );
        Ok(report)
    }
}
