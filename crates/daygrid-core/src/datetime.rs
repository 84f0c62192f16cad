use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Datelike,
  Days,
  Local,
  NaiveDate,
  Utc,
  Weekday
};
use chrono_tz::Tz;
use serde::Deserialize;

const TIMEZONE_CONFIG_FILE: &str =
  "daygrid-time.toml";
const TIMEZONE_ENV_VAR: &str =
  "DAYGRID_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str =
  "DAYGRID_TIME_CONFIG";

/// `Date.prototype.toDateString()`
/// layout used by earlier app data.
pub const LEGACY_DATE_FORMAT: &str =
  "%a %b %d %Y";

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
  timezone: Option<String>,
  time:     Option<TimezoneSection>
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
  timezone: Option<String>
}

/// Configured planner timezone, or
/// `None` to follow the system zone.
pub fn project_timezone()
-> Option<&'static Tz> {
  static PROJECT_TZ: OnceLock<
    Option<Tz>
  > = OnceLock::new();
  PROJECT_TZ
    .get_or_init(
      resolve_project_timezone
    )
    .as_ref()
}

/// Calendar date of `now` in the
/// planner timezone.
#[must_use]
pub fn local_date(
  now: DateTime<Utc>
) -> NaiveDate {
  match project_timezone() {
    | Some(tz) => {
      now.with_timezone(tz).date_naive()
    }
    | None => {
      now
        .with_timezone(&Local)
        .date_naive()
    }
  }
}

fn resolve_project_timezone()
-> Option<Tz> {
  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
    && let Some(tz) = parse_timezone(
      &raw,
      TIMEZONE_ENV_VAR
    )
  {
    return Some(tz);
  }

  if let Some(path) =
    timezone_config_path()
    && let Some(tz) =
      load_timezone_from_file(&path)
  {
    return Some(tz);
  }

  tracing::debug!(
    "no planner timezone configured; \
     using system local time"
  );
  None
}

fn timezone_config_path()
-> Option<PathBuf> {
  if let Ok(raw) = std::env::var(
    TIMEZONE_CONFIG_ENV_VAR
  ) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
      return Some(PathBuf::from(
        trimmed
      ));
    }
  }

  std::env::current_dir().ok().map(
    |dir| {
      dir.join(TIMEZONE_CONFIG_FILE)
    }
  )
}

fn load_timezone_from_file(
  path: &PathBuf
) -> Option<Tz> {
  if !path.exists() {
    tracing::debug!(
      file = %path.display(),
      "timezone config file not found"
    );
    return None;
  }

  let raw = match fs::read_to_string(
    path
  ) {
    | Ok(raw) => raw,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed reading timezone config file"
      );
      return None;
    }
  };

  let parsed = match toml::from_str::<
    TimezoneConfig
  >(&raw)
  {
    | Ok(parsed) => parsed,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed parsing timezone config file"
      );
      return None;
    }
  };

  let timezone =
    parsed.timezone.or_else(|| {
      parsed.time.and_then(|section| {
        section.timezone
      })
    });
  let Some(timezone) = timezone else {
    tracing::warn!(
      file = %path.display(),
      "timezone config had no timezone field"
    );
    return None;
  };

  parse_timezone(
    timezone.as_str(),
    &format!("file:{}", path.display())
  )
}

fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    tracing::warn!(
      source,
      "timezone source was empty"
    );
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::info!(
        source,
        timezone = %trimmed,
        "configured planner timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}

#[tracing::instrument(skip(now), fields(input = input))]
pub fn parse_date_expr(
  input: &str,
  now: DateTime<Utc>
) -> anyhow::Result<NaiveDate> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();
  let today = local_date(now);

  match lower.as_str() {
    | "today" => return Ok(today),
    | "tomorrow" => {
      return today
        .checked_add_days(Days::new(1))
        .ok_or_else(|| {
          anyhow!(
            "date out of range: \
             tomorrow"
          )
        });
    }
    | "yesterday" => {
      return today
        .checked_sub_days(Days::new(1))
        .ok_or_else(|| {
          anyhow!(
            "date out of range: \
             yesterday"
          )
        });
    }
    | _ => {}
  }

  if let Some(target_weekday) =
    parse_weekday_name(&lower)
  {
    return Ok(next_weekday_date(
      today,
      target_weekday
    ));
  }

  if let Ok(date) =
    NaiveDate::parse_from_str(
      token, "%Y-%m-%d"
    )
  {
    return Ok(date);
  }

  if let Ok(date) =
    NaiveDate::parse_from_str(
      token,
      LEGACY_DATE_FORMAT
    )
  {
    return Ok(date);
  }

  Err(anyhow!(
    "unrecognized date '{token}': \
     expected today, tomorrow, \
     yesterday, a weekday name, \
     YYYY-MM-DD or 'Sun Mar 23 2025'"
  ))
}

/// Parses `YYYY-MM` into `(year,
/// month)`.
pub fn parse_month_expr(
  input: &str
) -> anyhow::Result<(i32, u32)> {
  let token = input.trim();
  let (year, month) = token
    .split_once('-')
    .ok_or_else(|| {
      anyhow!(
        "expected YYYY-MM, got \
         '{token}'"
      )
    })?;
  let year: i32 = year
    .parse()
    .with_context(|| {
      format!("invalid year in '{token}'")
    })?;
  let month: u32 = month
    .parse()
    .with_context(|| {
      format!(
        "invalid month in '{token}'"
      )
    })?;
  if !(1..=12).contains(&month) {
    return Err(anyhow!(
      "month must be 1-12, got \
       {month}"
    ));
  }
  Ok((year, month))
}

/// First day of the Sunday-based week
/// containing `date`.
#[must_use]
pub fn week_start_sunday(
  date: NaiveDate
) -> NaiveDate {
  let back = u64::from(
    date
      .weekday()
      .num_days_from_sunday()
  );
  date
    .checked_sub_days(Days::new(back))
    .unwrap_or(date)
}

fn parse_weekday_name(
  token: &str
) -> Option<Weekday> {
  match token.trim() {
    | "monday" | "mon" => {
      Some(Weekday::Mon)
    }
    | "tuesday" | "tue" | "tues" => {
      Some(Weekday::Tue)
    }
    | "wednesday" | "wed" => {
      Some(Weekday::Wed)
    }
    | "thursday" | "thu" | "thur"
    | "thurs" => Some(Weekday::Thu),
    | "friday" | "fri" => {
      Some(Weekday::Fri)
    }
    | "saturday" | "sat" => {
      Some(Weekday::Sat)
    }
    | "sunday" | "sun" => {
      Some(Weekday::Sun)
    }
    | _ => None
  }
}

fn next_weekday_date(
  from: NaiveDate,
  target: Weekday
) -> NaiveDate {
  let from_idx = from
    .weekday()
    .num_days_from_monday();
  let target_idx =
    target.num_days_from_monday();
  let mut delta =
    (7 + target_idx - from_idx) % 7;
  if delta == 0 {
    delta = 7;
  }
  from
    .checked_add_days(Days::new(
      u64::from(delta)
    ))
    .unwrap_or(from)
}

#[cfg(test)]
mod tests {
  use chrono::{
    NaiveDate,
    TimeZone,
    Utc
  };

  use super::{
    local_date,
    parse_date_expr,
    parse_month_expr,
    week_start_sunday
  };

  fn ymd(
    y: i32,
    m: u32,
    d: u32
  ) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d)
      .expect("valid date")
  }

  #[test]
  fn parses_iso_and_legacy_dates() {
    let now = Utc
      .with_ymd_and_hms(
        2026, 2, 17, 12, 0, 0
      )
      .single()
      .expect("valid now");
    assert_eq!(
      parse_date_expr("2025-03-23", now)
        .expect("iso"),
      ymd(2025, 3, 23)
    );
    assert_eq!(
      parse_date_expr(
        "Sun Mar 23 2025",
        now
      )
      .expect("legacy"),
      ymd(2025, 3, 23)
    );
    assert!(
      parse_date_expr("someday", now)
        .is_err()
    );
  }

  #[test]
  fn relative_words_follow_today() {
    let now = Utc
      .with_ymd_and_hms(
        2026, 2, 17, 12, 0, 0
      )
      .single()
      .expect("valid now");
    let today = local_date(now);
    assert_eq!(
      parse_date_expr("today", now)
        .expect("today"),
      today
    );
    assert_eq!(
      parse_date_expr("tomorrow", now)
        .expect("tomorrow")
        .signed_duration_since(today)
        .num_days(),
      1
    );
    assert_eq!(
      parse_date_expr("Yesterday", now)
        .expect("yesterday")
        .signed_duration_since(today)
        .num_days(),
      -1
    );

    let next_wed =
      parse_date_expr("wednesday", now)
        .expect("weekday");
    let delta = next_wed
      .signed_duration_since(today)
      .num_days();
    assert!((1..=7).contains(&delta));
    assert_eq!(
      next_wed.format("%a").to_string(),
      "Wed"
    );
  }

  #[test]
  fn parses_month_expr() {
    assert_eq!(
      parse_month_expr("2025-03")
        .expect("month"),
      (2025, 3)
    );
    assert!(
      parse_month_expr("2025-13")
        .is_err()
    );
    assert!(
      parse_month_expr("March")
        .is_err()
    );
  }

  #[test]
  fn week_starts_on_sunday() {
    // 2025-03-26 is a Wednesday.
    assert_eq!(
      week_start_sunday(ymd(
        2025, 3, 26
      )),
      ymd(2025, 3, 23)
    );
    assert_eq!(
      week_start_sunday(ymd(
        2025, 3, 23
      )),
      ymd(2025, 3, 23)
    );
    assert_eq!(
      week_start_sunday(ymd(
        2025, 3, 29
      )),
      ymd(2025, 3, 23)
    );
  }
}

pub mod compact_utc_serde {
  use chrono::{
    DateTime,
    NaiveDateTime,
    Utc
  };
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };

  pub fn serialize<S>(
    dt: &DateTime<Utc>,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    serializer.serialize_str(
      &dt
        .format("%Y%m%dT%H%M%SZ")
        .to_string()
    )
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<DateTime<Utc>, D::Error>
  where
    D: Deserializer<'de>
  {
    let raw = String::deserialize(
      deserializer
    )?;
    NaiveDateTime::parse_from_str(&raw, "%Y%m%dT%H%M%SZ")
            .map(|ndt| DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc))
            .map_err(serde::de::Error::custom)
  }
}
