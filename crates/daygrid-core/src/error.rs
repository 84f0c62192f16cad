//! Errors raised by the scheduling engine.
//!
//! Every variant is recoverable: the engine rejects the operation before
//! anything is written, so retrying the user action is always safe.

use thiserror::Error;

use crate::slots::SlotId;
use crate::task::TaskId;

pub type ScheduleResult<T> = core::result::Result<T, ScheduleError>;

#[derive(Debug, Error)]
pub enum ScheduleError {
    /// Empty title, empty selection or a slot outside the day grid.
    #[error("invalid task: {0}")]
    Validation(String),

    /// One or more selected slots already belong to another task on that date.
    #[error("{} already taken by task {task_id}", describe_slots(.slots))]
    Conflict { slots: Vec<SlotId>, task_id: TaskId },

    /// Loading or saving the task collection failed.
    #[error("task store failure: {0:#}")]
    Store(#[source] anyhow::Error),

    /// Only surfaced to callers that ask for strict lookups; the engine's
    /// edit and delete treat a missing id as a no-op.
    #[error("task {0} not found")]
    NotFound(TaskId),
}

impl ScheduleError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, ScheduleError::Conflict { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, ScheduleError::Validation(_))
    }
}

fn describe_slots(slots: &[SlotId]) -> String {
    let labels: Vec<String> = slots.iter().map(|slot| slot.label()).collect();
    match labels.len() {
        1 => format!("slot {}", labels[0]),
        _ => format!("slots {}", labels.join(", ")),
    }
}
