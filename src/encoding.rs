use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::match_record::{DEFAULT_KICKOFF_HOUR, MatchRecord, MatchResult, Venue};

/// Integer codes for team names, assigned in sorted-name order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoricalEncoder {
    codes: BTreeMap<String, u32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Encoded {
    pub team_code: f64,
    pub opp_code: f64,
    pub venue_code: f64,
    pub hour: f64,
    pub day_code: f64,
    pub target: u8,
}

impl CategoricalEncoder {
    /// Codes cover every name seen as either team or opponent.
    pub fn fit(records: &[MatchRecord]) -> Self {
        let mut names: Vec<&str> = records
            .iter()
            .flat_map(|r| [r.team.as_str(), r.opponent.as_str()])
            .collect();
        names.sort_unstable();
        names.dedup();
        let codes = names
            .into_iter()
            .enumerate()
            .map(|(i, name)| (name.to_string(), i as u32))
            .collect();
        Self { codes }
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn code(&self, team: &str) -> Option<u32> {
        self.codes.get(team).copied()
    }

    /// Unknown names map to 0.
    pub fn code_or_default(&self, team: &str) -> f64 {
        self.code(team).map(f64::from).unwrap_or(0.0)
    }

    pub fn encode(&self, record: &MatchRecord) -> Encoded {
        Encoded {
            team_code: self.code_or_default(&record.team),
            opp_code: self.code_or_default(&record.opponent),
            venue_code: record.venue.code(),
            hour: f64::from(record.hour()),
            day_code: day_code(record.date),
            target: win_target(record.result),
        }
    }
}

/// Monday = 0.
pub fn day_code(date: NaiveDate) -> f64 {
    f64::from(date.weekday().num_days_from_monday())
}

pub fn win_target(result: MatchResult) -> u8 {
    u8::from(result == MatchResult::Win)
}

pub fn venue_code(venue: Option<Venue>) -> f64 {
    venue.map(Venue::code).unwrap_or(1.0)
}

pub fn default_hour() -> f64 {
    f64::from(DEFAULT_KICKOFF_HOUR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::match_record::fixtures::{date, record};

    #[test]
    fn codes_follow_sorted_names() {
        let records = vec![
            record(date(2023, 1, 1), "Chelsea", "Arsenal", Venue::Home, 1.0, 0.0),
            record(date(2023, 1, 1), "Arsenal", "Chelsea", Venue::Away, 0.0, 1.0),
            record(date(2023, 1, 8), "Brentford", "Chelsea", Venue::Home, 2.0, 2.0),
        ];
        let enc = CategoricalEncoder::fit(&records);
        assert_eq!(enc.len(), 3);
        assert_eq!(enc.code("Arsenal"), Some(0));
        assert_eq!(enc.code("Brentford"), Some(1));
        assert_eq!(enc.code("Chelsea"), Some(2));
        assert_eq!(enc.code_or_default("Fulham"), 0.0);
    }

    #[test]
    fn encode_derives_calendar_and_target() {
        let r = record(date(2023, 1, 1), "A", "B", Venue::Away, 3.0, 1.0);
        let enc = CategoricalEncoder::fit(std::slice::from_ref(&r));
        let e = enc.encode(&r);
        assert_eq!(e.venue_code, 0.0);
        // 2023-01-01 was a Sunday
        assert_eq!(e.day_code, 6.0);
        assert_eq!(e.hour, 15.0);
        assert_eq!(e.target, 1);
        assert_eq!(e.opp_code, 1.0);
    }
}
