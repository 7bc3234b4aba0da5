use std::collections::BTreeMap;

use crate::match_record::{MatchRecord, Venue};

pub const HOME_WIN_PCT_PRIOR: f64 = 0.5;
pub const AWAY_WIN_PCT_PRIOR: f64 = 0.3;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VenueAverages {
    pub matches: usize,
    pub points: f64,
    pub goals_for: f64,
    pub goals_against: f64,
    pub win_rate: f64,
}

/// A team's whole-history means at home and away. `None` when it never played there.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VenueSplit {
    pub home: Option<VenueAverages>,
    pub away: Option<VenueAverages>,
}

impl VenueSplit {
    pub fn at(&self, venue: Venue) -> Option<&VenueAverages> {
        match venue {
            Venue::Home => self.home.as_ref(),
            Venue::Away => self.away.as_ref(),
        }
    }

    pub fn home_advantage(&self) -> Option<f64> {
        Some(self.home?.points - self.away?.points)
    }

    pub fn named_values(&self) -> Vec<(String, Option<f64>)> {
        let mut out = Vec::with_capacity(9);
        for (label, avg) in [("home", self.home), ("away", self.away)] {
            out.push((format!("{label}_avg_points"), avg.map(|a| a.points)));
            out.push((format!("{label}_avg_goals_for"), avg.map(|a| a.goals_for)));
            out.push((format!("{label}_avg_goals_against"), avg.map(|a| a.goals_against)));
            out.push((format!("{label}_win_rate"), avg.map(|a| a.win_rate)));
        }
        out.push(("home_advantage".to_string(), self.home_advantage()));
        out
    }
}

#[derive(Default)]
struct Totals {
    n: usize,
    points: f64,
    gf: f64,
    ga: f64,
    wins: f64,
}

impl Totals {
    fn mean(&self) -> Option<VenueAverages> {
        if self.n == 0 {
            return None;
        }
        let n = self.n as f64;
        Some(VenueAverages {
            matches: self.n,
            points: self.points / n,
            goals_for: self.gf / n,
            goals_against: self.ga / n,
            win_rate: self.wins / n,
        })
    }
}

pub fn venue_splits(records: &[MatchRecord]) -> BTreeMap<String, VenueSplit> {
    let mut totals: BTreeMap<&str, [Totals; 2]> = BTreeMap::new();
    for r in records {
        let slot = &mut totals.entry(r.team.as_str()).or_default()[match r.venue {
            Venue::Home => 0,
            Venue::Away => 1,
        }];
        slot.n += 1;
        slot.points += r.points();
        slot.gf += r.stats.goals_for;
        slot.ga += r.stats.goals_against;
        if r.is_win() {
            slot.wins += 1.0;
        }
    }
    totals
        .into_iter()
        .map(|(team, [home, away])| {
            (
                team.to_string(),
                VenueSplit {
                    home: home.mean(),
                    away: away.mean(),
                },
            )
        })
        .collect()
}

/// Team's home win share, falling back to a neutral prior.
pub fn team_home_win_pct(splits: &BTreeMap<String, VenueSplit>, team: &str) -> f64 {
    splits
        .get(team)
        .and_then(|s| s.home)
        .map(|h| h.win_rate)
        .unwrap_or(HOME_WIN_PCT_PRIOR)
}

pub fn team_away_win_pct(splits: &BTreeMap<String, VenueSplit>, team: &str) -> f64 {
    splits
        .get(team)
        .and_then(|s| s.away)
        .map(|a| a.win_rate)
        .unwrap_or(AWAY_WIN_PCT_PRIOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::match_record::fixtures::{date, record};

    #[test]
    fn splits_by_venue_and_computes_advantage() {
        let records = vec![
            record(date(2023, 1, 1), "A", "B", Venue::Home, 2.0, 0.0),
            record(date(2023, 1, 8), "A", "C", Venue::Home, 1.0, 1.0),
            record(date(2023, 1, 15), "A", "D", Venue::Away, 0.0, 3.0),
        ];
        let splits = venue_splits(&records);
        let a = splits["A"];
        let home = a.home.unwrap();
        assert_eq!(home.matches, 2);
        assert_eq!(home.points, 2.0);
        assert_eq!(home.goals_for, 1.5);
        assert_eq!(home.win_rate, 0.5);
        assert_eq!(a.away.unwrap().goals_against, 3.0);
        assert_eq!(a.home_advantage(), Some(2.0));
    }

    #[test]
    fn one_sided_history_leaves_other_venue_unset() {
        let records = vec![record(date(2023, 1, 1), "A", "B", Venue::Away, 1.0, 0.0)];
        let splits = venue_splits(&records);
        assert!(splits["A"].home.is_none());
        assert_eq!(splits["A"].home_advantage(), None);
        assert_eq!(team_home_win_pct(&splits, "A"), HOME_WIN_PCT_PRIOR);
        assert_eq!(team_away_win_pct(&splits, "A"), 1.0);
        assert_eq!(team_away_win_pct(&splits, "Z"), AWAY_WIN_PCT_PRIOR);
    }
}
