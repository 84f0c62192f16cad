use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    Work,
    Personal,
    Meeting,
    School,
    #[serde(rename = "Team Time")]
    TeamTime,
    Friends,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Work,
        Category::Personal,
        Category::Meeting,
        Category::School,
        Category::TeamTime,
        Category::Friends,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Category::Work => "Work",
            Category::Personal => "Personal",
            Category::Meeting => "Meeting",
            Category::School => "School",
            Category::TeamTime => "Team Time",
            Category::Friends => "Friends",
        }
    }

    /// The one display color for each category, as `#RRGGBB`.
    pub fn color(self) -> &'static str {
        match self {
            Category::Work => "#FF5252",
            Category::Personal => "#4CAF50",
            Category::Meeting => "#2196F3",
            Category::School => "#FFC107",
            Category::TeamTime => "#03A9F4",
            Category::Friends => "#9C27B0",
        }
    }

    /// Color as an `(r, g, b)` triple for terminal truecolor output.
    pub fn rgb(self) -> (u8, u8, u8) {
        let hex = &self.color()[1..];
        let channel = |range: std::ops::Range<usize>| {
            hex.get(range)
                .and_then(|part| u8::from_str_radix(part, 16).ok())
                .unwrap_or(0)
        };
        (channel(0..2), channel(2..4), channel(4..6))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Category {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '_'))
            .collect::<String>()
            .to_ascii_lowercase();

        Category::ALL
            .into_iter()
            .find(|category| category.name().replace(' ', "").to_ascii_lowercase() == normalized)
            .ok_or_else(|| {
                let known: Vec<&str> = Category::ALL.iter().map(|c| c.name()).collect();
                anyhow!("unknown category '{}': expected one of {}", s.trim(), known.join(", "))
            })
    }
}

/// Category axis of the analytics filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CategoryFilter {
    #[default]
    All,
    Only(Category),
}

impl CategoryFilter {
    pub fn matches(self, category: Category) -> bool {
        match self {
            CategoryFilter::All => true,
            CategoryFilter::Only(wanted) => wanted == category,
        }
    }
}

impl fmt::Display for CategoryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CategoryFilter::All => f.write_str("All"),
            CategoryFilter::Only(category) => category.fmt(f),
        }
    }
}

impl FromStr for CategoryFilter {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(CategoryFilter::All);
        }
        s.parse().map(CategoryFilter::Only)
    }
}

#[cfg(test)]
mod tests {
    use super::{Category, CategoryFilter};

    #[test]
    fn parses_names_loosely() {
        assert_eq!("work".parse::<Category>().expect("work"), Category::Work);
        assert_eq!("Team Time".parse::<Category>().expect("team time"), Category::TeamTime);
        assert_eq!("team-time".parse::<Category>().expect("kebab"), Category::TeamTime);
        assert_eq!(" FRIENDS ".parse::<Category>().expect("upper"), Category::Friends);
        assert!("Chores".parse::<Category>().is_err());
    }

    #[test]
    fn every_category_has_a_distinct_color() {
        let mut colors: Vec<&str> = Category::ALL.iter().map(|c| c.color()).collect();
        colors.sort_unstable();
        colors.dedup();
        assert_eq!(colors.len(), Category::ALL.len());
        assert_eq!(Category::Friends.rgb(), (0x9C, 0x27, 0xB0));
    }

    #[test]
    fn serializes_display_names() {
        let json = serde_json::to_string(&Category::TeamTime).expect("serialize");
        assert_eq!(json, "\"Team Time\"");
        let back: Category = serde_json::from_str("\"Meeting\"").expect("deserialize");
        assert_eq!(back, Category::Meeting);
    }

    #[test]
    fn all_filter_matches_everything() {
        let all: CategoryFilter = "All".parse().expect("all");
        assert!(Category::ALL.iter().all(|c| all.matches(*c)));

        let school: CategoryFilter = "school".parse().expect("school");
        assert!(school.matches(Category::School));
        assert!(!school.matches(Category::Work));
    }
}
