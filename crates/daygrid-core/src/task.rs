use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::category::Category;
use crate::datetime::compact_utc_serde;
use crate::slots::{SLOT_MINUTES, SlotId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl TaskId {
    /// Millisecond timestamp of `now`, bumped past every id already in use.
    /// When the id space above the largest id is exhausted, the nearest free
    /// id at or below `now` is used instead.
    pub fn next(existing: &[Task], now: DateTime<Utc>) -> Self {
        let stamp = u64::try_from(now.timestamp_millis()).unwrap_or(0);
        let used: BTreeSet<u64> = existing.iter().map(|t| t.id.0).collect();

        let candidate = match used.last() {
            Some(max) => max.checked_add(1).map_or(stamp, |floor| stamp.max(floor)),
            None => stamp,
        };
        if !used.contains(&candidate) {
            return Self(candidate);
        }

        Self((0..=stamp).rev().find(|id| !used.contains(id)).unwrap_or(0))
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for TaskId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(TaskId)
            .map_err(|_| anyhow!("invalid task id: {s}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,

    pub title: String,

    pub category: Category,

    pub date: NaiveDate,

    #[serde(deserialize_with = "deserialize_slot_ids")]
    pub slot_ids: Vec<SlotId>,

    #[serde(with = "compact_utc_serde")]
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(
        id: TaskId,
        title: &str,
        category: Category,
        date: NaiveDate,
        slot_ids: &[SlotId],
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            title: title.trim().to_string(),
            category,
            date,
            slot_ids: normalize_slots(slot_ids),
            created_at: now,
        }
    }

    /// Minutes covered by the task's slots.
    pub fn total_duration(&self) -> u32 {
        self.slot_ids.len() as u32 * u32::from(SLOT_MINUTES)
    }

    pub fn total_hours(&self) -> f64 {
        f64::from(self.total_duration()) / 60.0
    }

    pub fn occupies(&self, slot: SlotId) -> bool {
        self.slot_ids.contains(&slot)
    }

    pub fn overlaps(&self, slots: &[SlotId]) -> bool {
        slots.iter().any(|slot| self.occupies(*slot))
    }
}

/// Canonical slot order: ascending, no duplicates.
pub fn normalize_slots(slots: &[SlotId]) -> Vec<SlotId> {
    let mut out = slots.to_vec();
    out.sort_unstable();
    out.dedup();
    out
}

/// Stored slot lists are brought back to canonical order on load, whatever
/// order or duplicates the file carried.
fn deserialize_slot_ids<'de, D>(deserializer: D) -> Result<Vec<SlotId>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<SlotId>::deserialize(deserializer)?;
    Ok(normalize_slots(&raw))
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};

    use super::{Task, TaskId};
    use crate::category::Category;
    use crate::slots::SlotId;

    fn slot(hour: u32, minute: u32) -> SlotId {
        SlotId::from_hm(hour, minute).expect("valid slot")
    }

    #[test]
    fn duration_derives_from_slot_count() {
        let now = Utc.with_ymd_and_hms(2025, 3, 23, 8, 0, 0).single().expect("valid now");
        let date = NaiveDate::from_ymd_opt(2025, 3, 23).expect("valid date");
        let task = Task::new(
            TaskId(1),
            "  Gym ",
            Category::Personal,
            date,
            &[slot(9, 30), slot(9, 0), slot(9, 30)],
            now,
        );

        assert_eq!(task.title, "Gym");
        assert_eq!(task.slot_ids, vec![slot(9, 0), slot(9, 30)]);
        assert_eq!(task.total_duration(), 60);
        assert!((task.total_hours() - 1.0).abs() < f64::EPSILON);
        assert!(task.occupies(slot(9, 30)));
        assert!(!task.occupies(slot(10, 0)));
    }

    #[test]
    fn next_id_never_collides() {
        let now = Utc.with_ymd_and_hms(2025, 3, 23, 8, 0, 0).single().expect("valid now");
        let date = NaiveDate::from_ymd_opt(2025, 3, 23).expect("valid date");
        let first_id = TaskId::next(&[], now);
        assert_eq!(first_id.0, now.timestamp_millis() as u64);

        let first = Task::new(first_id, "a", Category::Work, date, &[slot(1, 0)], now);
        let second_id = TaskId::next(&[first], now);
        assert_eq!(second_id.0, first_id.0 + 1);
    }

    #[test]
    fn next_id_survives_the_top_of_the_id_space() {
        let now = Utc.with_ymd_and_hms(2025, 3, 23, 8, 0, 0).single().expect("valid now");
        let date = NaiveDate::from_ymd_opt(2025, 3, 23).expect("valid date");
        let stamp = now.timestamp_millis() as u64;

        let top = Task::new(TaskId(u64::MAX), "a", Category::Work, date, &[slot(1, 0)], now);
        assert_eq!(TaskId::next(&[top.clone()], now), TaskId(stamp));

        let at_stamp = Task::new(TaskId(stamp), "b", Category::Work, date, &[slot(2, 0)], now);
        assert_eq!(TaskId::next(&[top, at_stamp], now), TaskId(stamp - 1));
    }

    #[test]
    fn loaded_slot_lists_are_sorted_and_deduped() {
        let raw = r#"{"id": 3, "title": "Gym", "category": "Personal",
            "date": "2025-03-23", "slotIds": [600, 570, 540, 570],
            "createdAt": "20250323T080000Z"}"#;
        let task: Task = serde_json::from_str(raw).expect("deserialize");

        assert_eq!(task.slot_ids, vec![slot(9, 0), slot(9, 30), slot(10, 0)]);
        assert_eq!(task.total_duration(), 90);
        assert!(task.occupies(slot(10, 0)));
    }

    #[test]
    fn persists_with_camel_case_fields() {
        let now = Utc.with_ymd_and_hms(2025, 3, 23, 8, 0, 0).single().expect("valid now");
        let date = NaiveDate::from_ymd_opt(2025, 3, 23).expect("valid date");
        let task = Task::new(TaskId(7), "Standup", Category::TeamTime, date, &[slot(9, 0)], now);

        let value = serde_json::to_value(&task).expect("serialize");
        assert_eq!(value["id"], 7);
        assert_eq!(value["category"], "Team Time");
        assert_eq!(value["date"], "2025-03-23");
        assert_eq!(value["slotIds"], serde_json::json!([540]));
        assert_eq!(value["createdAt"], "20250323T080000Z");

        let back: Task = serde_json::from_value(value).expect("deserialize");
        assert_eq!(back, task);
    }
}
