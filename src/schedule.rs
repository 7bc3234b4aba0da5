use std::collections::BTreeMap;

use crate::match_record::{MatchRecord, team_histories};

pub const DENSITY_WINDOW_DAYS: i64 = 30;
pub const QUICK_TURNAROUND_DAYS: i64 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RestBucket {
    Short,
    Medium,
    Long,
}

impl RestBucket {
    pub const ALL: [RestBucket; 3] = [RestBucket::Short, RestBucket::Medium, RestBucket::Long];

    /// (0, 3], (3, 6], (6, inf). A zero-day gap falls in no bucket.
    pub fn of(days: i64) -> Option<Self> {
        match days {
            d if d <= 0 => None,
            1..=3 => Some(RestBucket::Short),
            4..=6 => Some(RestBucket::Medium),
            _ => Some(RestBucket::Long),
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            RestBucket::Short => "short",
            RestBucket::Medium => "medium",
            RestBucket::Long => "long",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScheduleFeatures {
    pub days_since_last_match: Option<i64>,
    pub match_density_30d: usize,
    pub quick_turnaround: bool,
}

/// Mean points per rest bucket, empty buckets already filled.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RestProfile {
    pub short: Option<f64>,
    pub medium: Option<f64>,
    pub long: Option<f64>,
}

impl RestProfile {
    pub fn get(&self, bucket: RestBucket) -> Option<f64> {
        match bucket {
            RestBucket::Short => self.short,
            RestBucket::Medium => self.medium,
            RestBucket::Long => self.long,
        }
    }

    pub fn named_values(&self) -> [(String, Option<f64>); 3] {
        RestBucket::ALL.map(|b| (format!("{}_rest_performance", b.key()), self.get(b)))
    }
}

pub struct Schedule {
    pub rows: Vec<ScheduleFeatures>,
    pub rest: BTreeMap<String, RestProfile>,
}

/// Per-row gaps and congestion plus per-team rest profiles.
///
/// Density uses a trailing two-pointer over each team's dated history, so the
/// whole pass is linear after sorting.
pub fn schedule_features(records: &[MatchRecord]) -> Schedule {
    let mut rows = vec![ScheduleFeatures::default(); records.len()];
    let mut rest = BTreeMap::new();

    for (team, history) in team_histories(records) {
        let mut tail = 0;
        let mut buckets: BTreeMap<RestBucket, (usize, f64)> = BTreeMap::new();
        for (pos, &idx) in history.iter().enumerate() {
            let date = records[idx].date;
            while tail < pos && (date - records[history[tail]].date).num_days() > DENSITY_WINDOW_DAYS
            {
                tail += 1;
            }
            let gap = (pos > 0).then(|| (date - records[history[pos - 1]].date).num_days());
            rows[idx] = ScheduleFeatures {
                days_since_last_match: gap,
                match_density_30d: pos - tail,
                quick_turnaround: gap.is_some_and(|g| g < QUICK_TURNAROUND_DAYS),
            };
            if let Some(bucket) = gap.and_then(RestBucket::of) {
                let slot = buckets.entry(bucket).or_default();
                slot.0 += 1;
                slot.1 += records[idx].points();
            }
        }
        rest.insert(team.to_string(), rest_profile(&buckets));
    }

    Schedule { rows, rest }
}

fn rest_profile(buckets: &BTreeMap<RestBucket, (usize, f64)>) -> RestProfile {
    let means: BTreeMap<RestBucket, f64> = buckets
        .iter()
        .filter(|(_, (n, _))| *n > 0)
        .map(|(b, (n, total))| (*b, total / *n as f64))
        .collect();
    let fallback =
        (!means.is_empty()).then(|| means.values().sum::<f64>() / means.len() as f64);
    let fill = |b: RestBucket| means.get(&b).copied().or(fallback);
    RestProfile {
        short: fill(RestBucket::Short),
        medium: fill(RestBucket::Medium),
        long: fill(RestBucket::Long),
    }
}
