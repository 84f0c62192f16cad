use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use anyhow::anyhow;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const SLOT_MINUTES: u16 = 30;
pub const MINUTES_PER_DAY: u16 = 24 * 60;
pub const SLOTS_PER_DAY: usize = (MINUTES_PER_DAY / SLOT_MINUTES) as usize;

const LEGACY_KEY_PATTERN: &str = r"^(\d{1,2}):(\d{1,2})-(\d{1,2}):(\d{1,2})$";
const CLOCK_PATTERN: &str = r"(?i)^(?P<hour>\d{1,2}):(?P<minute>\d{2})\s*(?P<ampm>[ap]m)?$";

static LEGACY_KEY_RE: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
static CLOCK_RE: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();

/// Start of a slot, as minutes after midnight.
///
/// Always a multiple of [`SLOT_MINUTES`] below [`MINUTES_PER_DAY`], so the
/// value doubles as a stable id that is identical for every day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct SlotId(u16);

impl SlotId {
    pub fn new(offset: u16) -> Option<Self> {
        (offset < MINUTES_PER_DAY && offset % SLOT_MINUTES == 0).then_some(Self(offset))
    }

    pub fn from_hm(hour: u32, minute: u32) -> Option<Self> {
        if hour > 23 || minute > 59 {
            return None;
        }
        let offset = u16::try_from(hour * 60 + minute).ok()?;
        Self::new(offset)
    }

    pub fn offset(self) -> u16 {
        self.0
    }

    pub fn hour(self) -> u32 {
        u32::from(self.0 / 60)
    }

    pub fn minute(self) -> u32 {
        u32::from(self.0 % 60)
    }

    /// Offset where the slot ends; the last slot of the day wraps to 0.
    pub fn end_offset(self) -> u16 {
        (self.0 + SLOT_MINUTES) % MINUTES_PER_DAY
    }

    /// Position of the slot in the day grid.
    pub fn index(self) -> usize {
        usize::from(self.0 / SLOT_MINUTES)
    }

    pub fn label(self) -> String {
        format_clock_label(self.0)
    }

    /// Accepts `9:30 AM`, `9:30pm`, `21:30`, a raw minute offset (`570`), or
    /// the `h:m-h:m` slot keys written by earlier versions of the app.
    pub fn parse(input: &str) -> anyhow::Result<Self> {
        let token = input.trim();
        if token.is_empty() {
            return Err(anyhow!("slot cannot be empty"));
        }

        if token.chars().all(|c| c.is_ascii_digit()) {
            let offset: u16 = token
                .parse()
                .map_err(|_| anyhow!("slot offset out of range: {token}"))?;
            return Self::new(offset).ok_or_else(|| {
                anyhow!(
                    "slot offset {offset} must be a multiple of {SLOT_MINUTES} below {MINUTES_PER_DAY}"
                )
            });
        }

        let key_re = cached_regex(&LEGACY_KEY_RE, LEGACY_KEY_PATTERN)?;
        if let Some(slot) = parse_legacy_key(key_re, token) {
            return Ok(slot);
        }

        let clock_re = cached_regex(&CLOCK_RE, CLOCK_PATTERN)?;
        let (hour, minute) = parse_clock_time(clock_re, token)
            .ok_or_else(|| anyhow!("unrecognized slot time: {token} (try 9:30 AM or 21:30)"))?;
        Self::from_hm(hour, minute)
            .ok_or_else(|| anyhow!("slot times must start on the hour or half hour: {token}"))
    }
}

impl TryFrom<u16> for SlotId {
    type Error = String;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| {
            format!(
                "invalid slot offset {value}: expected a multiple of {SLOT_MINUTES} below {MINUTES_PER_DAY}"
            )
        })
    }
}

impl From<SlotId> for u16 {
    fn from(id: SlotId) -> Self {
        id.0
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

impl FromStr for SlotId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSlot {
    pub id: SlotId,
    pub start_label: String,
    pub end_label: String,
}

impl TimeSlot {
    fn from_id(id: SlotId) -> Self {
        Self {
            id,
            start_label: format_clock_label(id.offset()),
            end_label: format_clock_label(id.end_offset()),
        }
    }

    pub fn display_text(&self) -> String {
        format!("{} - {}", self.start_label, self.end_label)
    }
}

/// The day template: 48 half-hour slots from midnight to midnight.
///
/// Carries no occupancy; callers layer that on per date.
pub fn generate_slots() -> Vec<TimeSlot> {
    (0..MINUTES_PER_DAY)
        .step_by(usize::from(SLOT_MINUTES))
        .filter_map(SlotId::new)
        .map(TimeSlot::from_id)
        .collect()
}

/// 12-hour clock label for a minute offset, e.g. `0 -> "12:00 AM"`.
pub fn format_clock_label(offset: u16) -> String {
    let offset = offset % MINUTES_PER_DAY;
    let hour = offset / 60;
    let minute = offset % 60;
    let display_hour = match hour {
        0 => 12,
        h if h > 12 => h - 12,
        h => h,
    };
    let period = if hour >= 12 { "PM" } else { "AM" };
    format!("{display_hour}:{minute:02} {period}")
}

fn cached_regex(
    cell: &'static OnceLock<Result<Regex, regex::Error>>,
    pattern: &str,
) -> anyhow::Result<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern))
        .as_ref()
        .map_err(|err| anyhow!("invalid slot pattern {pattern}: {err}"))
}

fn parse_legacy_key(key_re: &Regex, token: &str) -> Option<SlotId> {
    let captures = key_re.captures(token)?;
    let field = |idx: usize| -> Option<u32> { captures.get(idx)?.as_str().parse().ok() };

    let slot = SlotId::from_hm(field(1)?, field(2)?)?;
    let end = SlotId::from_hm(field(3)?, field(4)?)?;
    (end.offset() == slot.end_offset()).then_some(slot)
}

fn parse_clock_time(clock_re: &Regex, token: &str) -> Option<(u32, u32)> {
    let captures = clock_re.captures(token.trim())?;

    let raw_hour = captures.name("hour")?.as_str().parse::<u32>().ok()?;
    let minute = captures.name("minute")?.as_str().parse::<u32>().ok()?;
    if minute > 59 {
        return None;
    }

    let hour = if let Some(ampm_match) = captures.name("ampm") {
        if raw_hour == 0 || raw_hour > 12 {
            return None;
        }
        match ampm_match.as_str().to_ascii_lowercase().as_str() {
            "am" => raw_hour % 12,
            "pm" => raw_hour % 12 + 12,
            _ => return None,
        }
    } else {
        if raw_hour > 23 {
            return None;
        }
        raw_hour
    };

    Some((hour, minute))
}

#[cfg(test)]
mod tests {
    use super::{
        CLOCK_PATTERN, CLOCK_RE, LEGACY_KEY_PATTERN, LEGACY_KEY_RE, SLOTS_PER_DAY, SlotId,
        cached_regex, format_clock_label, generate_slots,
    };

    #[test]
    fn slot_patterns_compile_once() {
        let first = cached_regex(&CLOCK_RE, CLOCK_PATTERN).expect("clock pattern");
        let second = cached_regex(&CLOCK_RE, CLOCK_PATTERN).expect("clock pattern");
        assert!(std::ptr::eq(first, second));
        assert!(cached_regex(&LEGACY_KEY_RE, LEGACY_KEY_PATTERN).is_ok());
    }

    #[test]
    fn grid_has_48_contiguous_slots() {
        let slots = generate_slots();
        assert_eq!(slots.len(), SLOTS_PER_DAY);
        assert_eq!(slots.len(), 48);
        assert_eq!(slots[0].start_label, "12:00 AM");
        assert_eq!(slots[0].id.offset(), 0);

        for pair in slots.windows(2) {
            assert!(pair[0].id < pair[1].id);
            assert_eq!(pair[0].id.end_offset(), pair[1].id.offset());
            assert_eq!(pair[0].end_label, pair[1].start_label);
        }

        let last = slots.last().expect("last slot");
        assert_eq!(last.start_label, "11:30 PM");
        assert_eq!(last.end_label, "12:00 AM");
    }

    #[test]
    fn grid_is_identical_across_calls() {
        assert_eq!(generate_slots(), generate_slots());
    }

    #[test]
    fn labels_handle_midnight_and_noon() {
        assert_eq!(format_clock_label(0), "12:00 AM");
        assert_eq!(format_clock_label(30), "12:30 AM");
        assert_eq!(format_clock_label(11 * 60 + 30), "11:30 AM");
        assert_eq!(format_clock_label(12 * 60), "12:00 PM");
        assert_eq!(format_clock_label(13 * 60), "1:00 PM");
        assert_eq!(format_clock_label(23 * 60 + 30), "11:30 PM");

        let noon = &generate_slots()[24];
        assert_eq!(noon.display_text(), "12:00 PM - 12:30 PM");
    }

    #[test]
    fn parses_slot_tokens() {
        let nine_thirty = SlotId::from_hm(9, 30).expect("valid slot");
        assert_eq!(SlotId::parse("9:30 AM").expect("label"), nine_thirty);
        assert_eq!(SlotId::parse("9:30am").expect("compact label"), nine_thirty);
        assert_eq!(SlotId::parse("09:30").expect("24h"), nine_thirty);
        assert_eq!(SlotId::parse("570").expect("offset"), nine_thirty);
        assert_eq!(SlotId::parse("9:30-10:0").expect("legacy key"), nine_thirty);
        assert_eq!(SlotId::parse("12:00 AM").expect("midnight").offset(), 0);
        assert_eq!(SlotId::parse("12:30 PM").expect("noon").offset(), 750);
        assert_eq!(SlotId::parse("23:30-0:0").expect("wrap key").offset(), 1410);
    }

    #[test]
    fn rejects_off_grid_tokens() {
        assert!(SlotId::parse("9:15 AM").is_err());
        assert!(SlotId::parse("1440").is_err());
        assert!(SlotId::parse("45").is_err());
        assert!(SlotId::parse("13:00 PM").is_err());
        assert!(SlotId::parse("9:0-10:0").is_err());
        assert!(SlotId::parse("").is_err());
        assert!(SlotId::parse("noon").is_err());
    }

    #[test]
    fn serializes_as_minute_offset() {
        let slot = SlotId::from_hm(21, 0).expect("valid slot");
        assert_eq!(serde_json::to_string(&slot).expect("serialize"), "1260");
        let back: SlotId = serde_json::from_str("1260").expect("deserialize");
        assert_eq!(back, slot);
        assert!(serde_json::from_str::<SlotId>("1261").is_err());
    }
}
