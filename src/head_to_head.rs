use std::collections::BTreeMap;

use crate::match_record::MatchRecord;

pub const NEUTRAL_RATE: f64 = 0.5;

/// Record of one team against one opponent, from the team's side.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HeadToHead {
    pub matches: usize,
    pub wins: usize,
    pub draws: usize,
    pub losses: usize,
    pub goals_for: f64,
    pub goals_against: f64,
}

impl HeadToHead {
    fn ratio(&self, total: f64) -> f64 {
        if self.matches == 0 {
            0.0
        } else {
            total / self.matches as f64
        }
    }

    pub fn win_rate(&self) -> f64 {
        if self.matches == 0 {
            NEUTRAL_RATE
        } else {
            self.wins as f64 / self.matches as f64
        }
    }

    pub fn points_per_game(&self) -> f64 {
        if self.matches == 0 {
            NEUTRAL_RATE
        } else {
            (3 * self.wins + self.draws) as f64 / self.matches as f64
        }
    }

    pub fn avg_goals_for(&self) -> f64 {
        self.ratio(self.goals_for)
    }

    pub fn avg_goals_against(&self) -> f64 {
        self.ratio(self.goals_against)
    }

    pub fn named_values(&self) -> [(&'static str, f64); 10] {
        [
            ("h2h_matches", self.matches as f64),
            ("h2h_wins", self.wins as f64),
            ("h2h_draws", self.draws as f64),
            ("h2h_losses", self.losses as f64),
            ("h2h_goals_for", self.goals_for),
            ("h2h_goals_against", self.goals_against),
            ("h2h_win_rate", self.win_rate()),
            ("h2h_points_per_game", self.points_per_game()),
            ("h2h_avg_goals_for", self.avg_goals_for()),
            ("h2h_avg_goals_against", self.avg_goals_against()),
        ]
    }
}

/// Ordered (team, opponent) pairs with at least one meeting.
#[derive(Debug, Clone, Default)]
pub struct HeadToHeadTable {
    pairs: BTreeMap<(String, String), HeadToHead>,
}

impl HeadToHeadTable {
    pub fn build(records: &[MatchRecord]) -> Self {
        let mut pairs: BTreeMap<(String, String), HeadToHead> = BTreeMap::new();
        for r in records {
            let h = pairs
                .entry((r.team.clone(), r.opponent.clone()))
                .or_default();
            h.matches += 1;
            if r.is_win() {
                h.wins += 1;
            } else if r.is_draw() {
                h.draws += 1;
            } else {
                h.losses += 1;
            }
            h.goals_for += r.stats.goals_for;
            h.goals_against += r.stats.goals_against;
        }
        Self { pairs }
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Unknown pairs yield zero counts and neutral rates.
    pub fn get(&self, team: &str, opponent: &str) -> HeadToHead {
        self.pairs
            .get(&(team.to_string(), opponent.to_string()))
            .copied()
            .unwrap_or_default()
    }
}
