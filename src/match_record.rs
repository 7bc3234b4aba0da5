use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{NaiveDate, NaiveTime, Timelike};

pub const DEFAULT_KICKOFF_HOUR: u32 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Venue {
    Home,
    Away,
}

impl Venue {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "home" | "h" => Some(Venue::Home),
            "away" | "a" => Some(Venue::Away),
            _ => None,
        }
    }

    pub fn code(self) -> f64 {
        match self {
            Venue::Home => 1.0,
            Venue::Away => 0.0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Venue::Home => "Home",
            Venue::Away => "Away",
        }
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchResult {
    Win,
    Draw,
    Loss,
}

impl MatchResult {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "W" | "WIN" => Some(MatchResult::Win),
            "D" | "DRAW" => Some(MatchResult::Draw),
            "L" | "LOSS" => Some(MatchResult::Loss),
            _ => None,
        }
    }

    pub fn from_goals(goals_for: f64, goals_against: f64) -> Self {
        if goals_for > goals_against {
            MatchResult::Win
        } else if goals_for < goals_against {
            MatchResult::Loss
        } else {
            MatchResult::Draw
        }
    }

    pub fn points(self) -> f64 {
        match self {
            MatchResult::Win => 3.0,
            MatchResult::Draw => 1.0,
            MatchResult::Loss => 0.0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MatchResult::Win => "W",
            MatchResult::Draw => "D",
            MatchResult::Loss => "L",
        }
    }
}

/// Per-match stat columns that may feed `<key>_rolling` predictors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StatColumn {
    GoalsFor,
    GoalsAgainst,
    Shots,
    ShotsOnTarget,
    Distance,
    FreeKicks,
    Penalties,
    PenaltyAttempts,
}

impl StatColumn {
    pub const ALL: [StatColumn; 8] = [
        StatColumn::GoalsFor,
        StatColumn::GoalsAgainst,
        StatColumn::Shots,
        StatColumn::ShotsOnTarget,
        StatColumn::Distance,
        StatColumn::FreeKicks,
        StatColumn::Penalties,
        StatColumn::PenaltyAttempts,
    ];

    pub const CORE: [StatColumn; 4] = [
        StatColumn::GoalsFor,
        StatColumn::GoalsAgainst,
        StatColumn::Shots,
        StatColumn::ShotsOnTarget,
    ];

    pub fn key(self) -> &'static str {
        match self {
            StatColumn::GoalsFor => "gf",
            StatColumn::GoalsAgainst => "ga",
            StatColumn::Shots => "sh",
            StatColumn::ShotsOnTarget => "sot",
            StatColumn::Distance => "dist",
            StatColumn::FreeKicks => "fk",
            StatColumn::Penalties => "pk",
            StatColumn::PenaltyAttempts => "pkatt",
        }
    }

    pub fn rolling_name(self) -> String {
        format!("{}_rolling", self.key())
    }

    pub fn from_rolling_name(name: &str) -> Option<Self> {
        let key = name.strip_suffix("_rolling")?;
        Self::ALL.into_iter().find(|c| c.key() == key)
    }

    /// League-typical value used when a team has no earlier match to average.
    pub fn prior(self) -> f64 {
        match self {
            StatColumn::GoalsFor => 1.5,
            StatColumn::GoalsAgainst => 1.0,
            StatColumn::Shots => 12.0,
            StatColumn::ShotsOnTarget => 5.0,
            StatColumn::Distance => 15.0,
            StatColumn::FreeKicks => 2.0,
            StatColumn::Penalties => 0.5,
            StatColumn::PenaltyAttempts => 0.5,
        }
    }

    /// Stand-in for a core stat when the input carried no stat columns at all.
    pub fn from_result(result: MatchResult) -> f64 {
        match result {
            MatchResult::Win => 2.0,
            MatchResult::Draw => 1.0,
            MatchResult::Loss => 0.5,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatLine {
    pub goals_for: f64,
    pub goals_against: f64,
    pub shots: f64,
    pub shots_on_target: f64,
    pub distance: Option<f64>,
    pub free_kicks: Option<f64>,
    pub penalties: Option<f64>,
    pub penalty_attempts: Option<f64>,
}

impl StatLine {
    pub fn get(&self, column: StatColumn) -> Option<f64> {
        match column {
            StatColumn::GoalsFor => Some(self.goals_for),
            StatColumn::GoalsAgainst => Some(self.goals_against),
            StatColumn::Shots => Some(self.shots),
            StatColumn::ShotsOnTarget => Some(self.shots_on_target),
            StatColumn::Distance => self.distance,
            StatColumn::FreeKicks => self.free_kicks,
            StatColumn::Penalties => self.penalties,
            StatColumn::PenaltyAttempts => self.penalty_attempts,
        }
    }

    pub fn set(&mut self, column: StatColumn, value: f64) {
        match column {
            StatColumn::GoalsFor => self.goals_for = value,
            StatColumn::GoalsAgainst => self.goals_against = value,
            StatColumn::Shots => self.shots = value,
            StatColumn::ShotsOnTarget => self.shots_on_target = value,
            StatColumn::Distance => self.distance = Some(value),
            StatColumn::FreeKicks => self.free_kicks = Some(value),
            StatColumn::Penalties => self.penalties = Some(value),
            StatColumn::PenaltyAttempts => self.penalty_attempts = Some(value),
        }
    }
}

/// Decimal prices for the three outcomes of the fixture, each > 1.0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarketOdds {
    pub home_win: f64,
    pub draw: f64,
    pub away_win: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Weather {
    pub temperature_c: Option<f64>,
    pub precipitation_mm: Option<f64>,
    pub wind_kph: Option<f64>,
    pub humidity: Option<f64>,
}

/// One team's view of one fixture. Every fixture appears twice, mirrored.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchRecord {
    pub date: NaiveDate,
    pub kickoff: Option<NaiveTime>,
    pub team: String,
    pub opponent: String,
    pub venue: Venue,
    pub result: MatchResult,
    pub stats: StatLine,
    pub odds: Option<MarketOdds>,
    pub weather: Option<Weather>,
    pub match_id: Option<String>,
    pub season: Option<String>,
}

impl MatchRecord {
    pub fn points(&self) -> f64 {
        self.result.points()
    }

    pub fn is_win(&self) -> bool {
        self.result == MatchResult::Win
    }

    pub fn is_draw(&self) -> bool {
        self.result == MatchResult::Draw
    }

    pub fn clean_sheet(&self) -> bool {
        self.stats.goals_against == 0.0
    }

    pub fn failed_to_score(&self) -> bool {
        self.stats.goals_for == 0.0
    }

    pub fn hour(&self) -> u32 {
        self.kickoff
            .map(|t| t.hour())
            .unwrap_or(DEFAULT_KICKOFF_HOUR)
    }
}

/// Validated rows plus the set of stat columns the source actually carried.
#[derive(Debug, Clone, Default)]
pub struct MatchTable {
    pub records: Vec<MatchRecord>,
    pub stat_columns: BTreeSet<StatColumn>,
}

impl MatchTable {
    pub fn new(records: Vec<MatchRecord>, stat_columns: BTreeSet<StatColumn>) -> Self {
        Self {
            records,
            stat_columns,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Record indices grouped per team, each group in date order (input order on ties).
pub fn team_histories(records: &[MatchRecord]) -> BTreeMap<&str, Vec<usize>> {
    let mut out: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (idx, record) in records.iter().enumerate() {
        out.entry(record.team.as_str()).or_default().push(idx);
    }
    for indices in out.values_mut() {
        indices.sort_by_key(|&i| records[i].date);
    }
    out
}

/// Indices of `records` ordered by (team, date), stable on ties.
pub fn team_date_order(records: &[MatchRecord]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..records.len()).collect();
    order.sort_by(|&a, &b| {
        records[a]
            .team
            .cmp(&records[b].team)
            .then(records[a].date.cmp(&records[b].date))
    });
    order
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    pub fn record(
        day: NaiveDate,
        team: &str,
        opponent: &str,
        venue: Venue,
        goals_for: f64,
        goals_against: f64,
    ) -> MatchRecord {
        MatchRecord {
            date: day,
            kickoff: None,
            team: team.to_string(),
            opponent: opponent.to_string(),
            venue,
            result: MatchResult::from_goals(goals_for, goals_against),
            stats: StatLine {
                goals_for,
                goals_against,
                shots: 10.0,
                shots_on_target: 4.0,
                ..Default::default()
            },
            odds: None,
            weather: None,
            match_id: None,
            season: None,
        }
    }
}
