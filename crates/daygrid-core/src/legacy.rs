//! Reader for the task records written by the earlier app.
//!
//! Those records are a bare JSON array of objects shaped like
//! `{"id": "1742716800000", "task": "Gym", "category": "Personal",
//! "date": "Sun Mar 23 2025", "timeSlotIds": ["9:0-9:30"], ...}`. Extra
//! fields (`timeSlots`, `totalTime`, `timestamp`) are derived data and are
//! ignored. Records that cannot be expressed as a valid [`Task`] are
//! skipped and reported rather than aborting the whole import.

use anyhow::{Context, anyhow};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::category::Category;
use crate::datetime::LEGACY_DATE_FORMAT;
use crate::scheduler::find_conflict;
use crate::slots::SlotId;
use crate::task::{Task, TaskId};

const MAX_LEGACY_YEAR: i32 = 9999;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyRecord {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    task: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    time_slot_ids: Vec<String>,
}

#[derive(Debug, Default)]
pub struct LegacyImport {
    pub tasks: Vec<Task>,
    /// One human-readable line per skipped record.
    pub skipped: Vec<String>,
}

/// Converts legacy records, checking each against `existing` and against the
/// records accepted before it so occupancy stays exclusive.
pub fn import_legacy(
    raw: &str,
    existing: &[Task],
    now: DateTime<Utc>,
) -> anyhow::Result<LegacyImport> {
    let records: Vec<LegacyRecord> =
        serde_json::from_str(raw).context("legacy data must be a JSON array of tasks")?;

    let mut known: Vec<Task> = existing.to_vec();
    let mut report = LegacyImport::default();

    for (idx, record) in records.into_iter().enumerate() {
        match convert_record(record, &known, now) {
            Ok(task) => {
                known.push(task.clone());
                report.tasks.push(task);
            }
            Err(err) => {
                warn!(record = idx, error = %err, "skipping legacy record");
                report.skipped.push(format!("record {}: {err}", idx + 1));
            }
        }
    }

    Ok(report)
}

fn convert_record(
    record: LegacyRecord,
    known: &[Task],
    now: DateTime<Utc>,
) -> anyhow::Result<Task> {
    let title = record.task.unwrap_or_default();
    if title.trim().is_empty() {
        return Err(anyhow!("missing task title"));
    }

    let category: Category = record
        .category
        .as_deref()
        .ok_or_else(|| anyhow!("missing category"))?
        .parse()?;

    let raw_date = record.date.ok_or_else(|| anyhow!("missing date"))?;
    let date = parse_legacy_date(&raw_date)?;

    if record.time_slot_ids.is_empty() {
        return Err(anyhow!("no time slots"));
    }
    let slots = record
        .time_slot_ids
        .iter()
        .map(|key| SlotId::parse(key))
        .collect::<anyhow::Result<Vec<_>>>()?;

    if let Some((task_id, taken)) = find_conflict(known, date, &slots, None) {
        let labels: Vec<String> = taken.iter().map(|s| s.label()).collect();
        return Err(anyhow!(
            "{} on {date} already held by task {task_id}",
            labels.join(", ")
        ));
    }

    let stamp = record.id.as_ref().and_then(legacy_stamp);
    let id = match stamp {
        Some((millis, _)) if known.iter().all(|t| t.id.0 != millis) => TaskId(millis),
        _ => TaskId::next(known, now),
    };
    let created_at = stamp.map_or(now, |(_, at)| at);

    Ok(Task::new(id, &title, category, date, &slots, created_at))
}

fn parse_legacy_date(raw: &str) -> anyhow::Result<NaiveDate> {
    let trimmed = raw.trim();
    NaiveDate::parse_from_str(trimmed, LEGACY_DATE_FORMAT)
        .or_else(|_| NaiveDate::parse_from_str(trimmed, "%Y-%m-%d"))
        .map_err(|_| anyhow!("unrecognized date '{trimmed}'"))
}

/// Legacy ids were `Date.now()` values. Anything that is not a timestamp
/// between the epoch and `MAX_LEGACY_YEAR` gets a fresh id instead.
fn legacy_stamp(value: &Value) -> Option<(u64, DateTime<Utc>)> {
    let millis: u64 = match value {
        Value::String(s) => s.trim().parse().ok()?,
        Value::Number(n) => n.as_u64()?,
        _ => return None,
    };
    let at = DateTime::<Utc>::from_timestamp_millis(i64::try_from(millis).ok()?)?;
    (at.year() <= MAX_LEGACY_YEAR).then_some((millis, at))
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};

    use super::import_legacy;
    use crate::category::Category;
    use crate::slots::SlotId;
    use crate::task::TaskId;

    const SAMPLE: &str = r#"[
      {"id": "1742716800000", "task": "Gym", "category": "Personal",
       "date": "Sun Mar 23 2025", "timeSlotIds": ["9:0-9:30", "9:30-10:0"],
       "timeSlots": ["9:00 AM - 9:30 AM", "9:30 AM - 10:00 AM"], "totalTime": 1},
      {"id": "1742716900000", "task": "Standup", "category": "Team Time",
       "date": "Sun Mar 23 2025", "timeSlotIds": ["9:30-10:0"]},
      {"id": "1742717000000", "task": "", "category": "Work",
       "date": "Sun Mar 23 2025", "timeSlotIds": ["11:0-11:30"]},
      {"id": "1742717100000", "task": "Essay", "category": "School",
       "date": "Mon Mar 24 2025", "timeSlotIds": ["13:0-13:30"]}
    ]"#;

    #[test]
    fn converts_records_and_reports_skips() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).single().expect("valid now");
        let report = import_legacy(SAMPLE, &[], now).expect("import");

        assert_eq!(report.tasks.len(), 2);
        assert_eq!(report.skipped.len(), 2);

        let gym = &report.tasks[0];
        assert_eq!(gym.id, TaskId(1_742_716_800_000));
        assert_eq!(gym.category, Category::Personal);
        assert_eq!(gym.date, NaiveDate::from_ymd_opt(2025, 3, 23).expect("date"));
        assert_eq!(
            gym.slot_ids,
            vec![
                SlotId::from_hm(9, 0).expect("slot"),
                SlotId::from_hm(9, 30).expect("slot")
            ]
        );
        assert_eq!(gym.created_at.timestamp_millis(), 1_742_716_800_000);

        assert_eq!(report.tasks[1].title, "Essay");
        assert!(report.skipped[0].starts_with("record 2:"));
    }

    #[test]
    fn implausible_ids_get_fresh_ones() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).single().expect("valid now");
        let raw = r#"[
          {"id": "18446744073709551615", "task": "A", "category": "Work",
           "date": "2025-03-23", "timeSlotIds": ["9:0-9:30"]},
          {"id": "18446744073709551615", "task": "B", "category": "Work",
           "date": "2025-03-23", "timeSlotIds": ["10:0-10:30"]}
        ]"#;
        let report = import_legacy(raw, &[], now).expect("import");

        assert_eq!(report.tasks.len(), 2);
        assert!(report.skipped.is_empty());
        let stamp = now.timestamp_millis() as u64;
        assert_eq!(report.tasks[0].id, TaskId(stamp));
        assert_eq!(report.tasks[1].id, TaskId(stamp + 1));
        assert_eq!(report.tasks[0].created_at, now);
    }

    #[test]
    fn rejects_non_array_payloads() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).single().expect("valid now");
        assert!(import_legacy(r#"{"tasks": []}"#, &[], now).is_err());
    }
}
