//! A library with common utilities for roller derby game statistics.

pub mod chart_series;
#[cfg(feature = "network")]
pub mod client_api;
pub mod conversions;
pub mod jam_stats;
pub mod selection;

use clap::ValueEnum;
use conversions::{deserialize_one_or_many, deserialize_start_date};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

pub use selection::{RequestToken, Selection, SelectionTracker};

pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const CLIENT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// One of the two teams playing a game.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum TeamSide {
    Home,
    Visiting,
}

impl TeamSide {
    #[must_use]
    pub fn opposite(self) -> TeamSide {
        match self {
            TeamSide::Home => TeamSide::Visiting,
            TeamSide::Visiting => TeamSide::Home,
        }
    }
}

impl fmt::Display for TeamSide {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TeamSide::Home => write!(f, "home"),
            TeamSide::Visiting => write!(f, "visiting"),
        }
    }
}

impl FromStr for TeamSide {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "home" => Ok(TeamSide::Home),
            "visiting" => Ok(TeamSide::Visiting),
            other => Err(format!("unknown team side: {other:?}")),
        }
    }
}

/// Which part of the game the stats are restricted to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum, Default)]
pub enum PeriodFilter {
    /// The full game, both periods.
    #[default]
    #[serde(rename = "all")]
    #[value(name = "all")]
    All,
    #[serde(rename = "1")]
    #[value(name = "1")]
    First,
    #[serde(rename = "2")]
    #[value(name = "2")]
    Second,
}

impl PeriodFilter {
    /// Whether a jam played in `period` passes this filter.
    #[must_use]
    pub fn matches(self, period: u8) -> bool {
        match self {
            PeriodFilter::All => true,
            PeriodFilter::First => period == 1,
            PeriodFilter::Second => period == 2,
        }
    }
}

impl fmt::Display for PeriodFilter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PeriodFilter::All => write!(f, "all"),
            PeriodFilter::First => write!(f, "1"),
            PeriodFilter::Second => write!(f, "2"),
        }
    }
}

impl FromStr for PeriodFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(PeriodFilter::All),
            "1" => Ok(PeriodFilter::First),
            "2" => Ok(PeriodFilter::Second),
            other => Err(format!("unknown period filter: {other:?}")),
        }
    }
}

/// A single jam as stored in the `jams` table.
/// The same slot (game, period, jam number) appears at most once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JamRecord {
    #[serde(default)]
    pub game_id: String,
    pub period: u8,
    pub jam_number: u32,
    #[serde(default)]
    pub home_jammer_id: Option<String>,
    #[serde(default)]
    pub home_line_id: Option<String>,
    #[serde(default)]
    pub home_points: Option<u32>,
    #[serde(default)]
    pub visiting_jammer_id: Option<String>,
    #[serde(default)]
    pub visiting_line_id: Option<String>,
    #[serde(default)]
    pub visiting_points: Option<u32>,
    #[serde(default)]
    pub lead_team: Option<TeamSide>,
}

impl JamRecord {
    #[must_use]
    pub fn jammer_id(&self, side: TeamSide) -> Option<&str> {
        match side {
            TeamSide::Home => self.home_jammer_id.as_deref(),
            TeamSide::Visiting => self.visiting_jammer_id.as_deref(),
        }
    }

    #[must_use]
    pub fn line_id(&self, side: TeamSide) -> Option<&str> {
        match side {
            TeamSide::Home => self.home_line_id.as_deref(),
            TeamSide::Visiting => self.visiting_line_id.as_deref(),
        }
    }

    /// Points scored by `side` in this jam. Missing values count as zero.
    #[must_use]
    pub fn points(&self, side: TeamSide) -> u32 {
        match side {
            TeamSide::Home => self.home_points.unwrap_or(0),
            TeamSide::Visiting => self.visiting_points.unwrap_or(0),
        }
    }

    #[must_use]
    pub fn had_lead(&self, side: TeamSide) -> bool {
        self.lead_team == Some(side)
    }
}

/// A skater as returned by the skater registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skater {
    pub id: String,
    pub number: String,
    pub name: String,
}

/// A named group of blockers on a game roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterLine {
    pub id: String,
    pub name: String,
}

pub type SkaterRegistry = HashMap<String, Skater>;
pub type LineRegistry = HashMap<String, RosterLine>;

/// Index a list of skaters by id.
#[must_use]
pub fn skater_registry(skaters: Vec<Skater>) -> SkaterRegistry {
    skaters.into_iter().map(|s| (s.id.clone(), s)).collect()
}

/// Index a list of roster lines by id.
#[must_use]
pub fn line_registry(lines: Vec<RosterLine>) -> LineRegistry {
    lines.into_iter().map(|l| (l.id.clone(), l)).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

/// The game header, with both teams embedded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Game {
    pub id: String,
    pub home_team_id: String,
    #[serde(default)]
    pub home_team_color: Option<String>,
    pub visiting_team_id: String,
    #[serde(default)]
    pub visiting_team_color: Option<String>,
    #[serde(default, deserialize_with = "deserialize_start_date")]
    pub start_date: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default, deserialize_with = "deserialize_one_or_many")]
    pub home_team: Option<Team>,
    #[serde(default, deserialize_with = "deserialize_one_or_many")]
    pub visiting_team: Option<Team>,
}

impl Game {
    /// Display name of a team, falling back to "Home Team" / "Visiting Team".
    #[must_use]
    pub fn team_name(&self, side: TeamSide) -> &str {
        let team = match side {
            TeamSide::Home => self.home_team.as_ref(),
            TeamSide::Visiting => self.visiting_team.as_ref(),
        };
        match (team, side) {
            (Some(t), _) => &t.name,
            (None, TeamSide::Home) => "Home Team",
            (None, TeamSide::Visiting) => "Visiting Team",
        }
    }
}

/// Per-jammer counters for one side of one game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JammerSummary {
    pub skater_id: String,
    pub skater_number: String,
    pub skater_name: String,
    pub jam_count: u32,
    pub lead_count: u32,
    pub lead_percentage: f64,
    pub points_for: u32,
    pub points_against: u32,
}

/// Per-line counters for one side of one game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineSummary {
    pub line_id: String,
    pub line_name: String,
    pub jam_count: u32,
    pub lead_count: u32,
    pub lead_percentage: f64,
    pub points_for: u32,
    pub points_against: u32,
}

/// Running score after a jam.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelinePoint {
    pub label: String,
    pub home_score: u32,
    pub visiting_score: u32,
}

/// Everything the stats page shows for one selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameStatsReport {
    pub selection: Selection,
    /// Jams with a jammer recorded for the selected side.
    pub total_jams: usize,
    pub jammers: Vec<JammerSummary>,
    pub lines: Vec<LineSummary>,
    pub timeline: Vec<TimelinePoint>,
    pub final_score: (u32, u32),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_team_side_opposite() {
        assert_eq!(TeamSide::Home.opposite(), TeamSide::Visiting);
        assert_eq!(TeamSide::Visiting.opposite(), TeamSide::Home);
    }

    #[test]
    fn test_period_filter_matches() {
        assert!(PeriodFilter::All.matches(1));
        assert!(PeriodFilter::All.matches(2));
        assert!(PeriodFilter::First.matches(1));
        assert!(!PeriodFilter::First.matches(2));
        assert!(PeriodFilter::Second.matches(2));
        assert!(!PeriodFilter::Second.matches(1));
    }

    #[test]
    fn test_parse_selectors() {
        assert_eq!("visiting".parse::<TeamSide>(), Ok(TeamSide::Visiting));
        assert_eq!(" Home ".parse::<TeamSide>(), Ok(TeamSide::Home));
        assert!("away".parse::<TeamSide>().is_err());
        assert_eq!("all".parse::<PeriodFilter>(), Ok(PeriodFilter::All));
        assert_eq!("2".parse::<PeriodFilter>(), Ok(PeriodFilter::Second));
        assert!("3".parse::<PeriodFilter>().is_err());
    }

    #[test]
    fn test_jam_record_deserialize_nulls() {
        let jam: JamRecord = serde_json::from_str(
            r#"{
                "game_id": "g1",
                "period": 1,
                "jam_number": 3,
                "home_jammer_id": null,
                "home_points": null,
                "visiting_jammer_id": "s9",
                "visiting_points": 4,
                "lead_team": "visiting"
            }"#,
        )
        .unwrap();

        assert_eq!(jam.jammer_id(TeamSide::Home), None);
        assert_eq!(jam.jammer_id(TeamSide::Visiting), Some("s9"));
        assert_eq!(jam.line_id(TeamSide::Home), None);
        assert_eq!(jam.points(TeamSide::Home), 0);
        assert_eq!(jam.points(TeamSide::Visiting), 4);
        assert!(jam.had_lead(TeamSide::Visiting));
        assert!(!jam.had_lead(TeamSide::Home));
    }

    #[test]
    fn test_jam_record_rejects_negative_points() {
        let result: Result<JamRecord, _> =
            serde_json::from_str(r#"{"period": 1, "jam_number": 1, "home_points": -2}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_period_filter_serde() {
        assert_eq!(serde_json::to_string(&PeriodFilter::All).unwrap(), "\"all\"");
        assert_eq!(serde_json::to_string(&PeriodFilter::First).unwrap(), "\"1\"");
        let parsed: PeriodFilter = serde_json::from_str("\"2\"").unwrap();
        assert_eq!(parsed, PeriodFilter::Second);
    }

    #[test]
    fn test_game_team_name_fallback() {
        let game: Game = serde_json::from_str(
            r#"{
                "id": "g1",
                "home_team_id": "t1",
                "visiting_team_id": "t2",
                "home_team": [{"id": "t1", "name": "Rollergirls", "city": "Lyon", "country": "FR"}],
                "visiting_team": null
            }"#,
        )
        .unwrap();

        assert_eq!(game.team_name(TeamSide::Home), "Rollergirls");
        assert_eq!(game.team_name(TeamSide::Visiting), "Visiting Team");
    }
}
