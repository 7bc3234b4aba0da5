use crate::match_record::{MatchRecord, team_histories};

pub const DEFAULT_WINDOWS: [usize; 3] = [3, 5, 10];

/// Aggregates over the matches strictly before one record.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WindowForm {
    pub window: usize,
    pub matches: usize,
    pub points: f64,
    pub goals_for: f64,
    pub goals_against: f64,
    pub win_rate: f64,
    pub clean_sheets: f64,
    pub failed_to_score: f64,
}

impl WindowForm {
    pub fn goal_diff(&self) -> f64 {
        self.goals_for - self.goals_against
    }

    pub fn mean_points(&self) -> f64 {
        if self.matches == 0 {
            0.0
        } else {
            self.points / self.matches as f64
        }
    }

    pub fn named_values(&self) -> [(String, f64); 7] {
        let w = self.window;
        [
            (format!("points_last_{w}"), self.points),
            (format!("goals_for_last_{w}"), self.goals_for),
            (format!("goals_against_last_{w}"), self.goals_against),
            (format!("goal_diff_last_{w}"), self.goal_diff()),
            (format!("win_rate_last_{w}"), self.win_rate),
            (format!("clean_sheets_last_{w}"), self.clean_sheets),
            (format!("failed_to_score_last_{w}"), self.failed_to_score),
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormFeatures {
    pub windows: Vec<WindowForm>,
    pub points_momentum: f64,
    pub goals_momentum: f64,
}

impl FormFeatures {
    pub fn window(&self, size: usize) -> Option<&WindowForm> {
        self.windows.iter().find(|w| w.window == size)
    }

    pub fn named_values(&self) -> Vec<(String, f64)> {
        let mut out: Vec<(String, f64)> =
            self.windows.iter().flat_map(|w| w.named_values()).collect();
        out.push(("points_momentum".to_string(), self.points_momentum));
        out.push(("goals_momentum".to_string(), self.goals_momentum));
        out
    }
}

/// Running totals so any window is a difference of two prefixes.
#[derive(Debug, Clone, Copy, Default)]
struct Prefix {
    points: f64,
    goals_for: f64,
    goals_against: f64,
    wins: f64,
    clean_sheets: f64,
    failed_to_score: f64,
}

impl Prefix {
    fn push(&self, r: &MatchRecord) -> Self {
        Self {
            points: self.points + r.points(),
            goals_for: self.goals_for + r.stats.goals_for,
            goals_against: self.goals_against + r.stats.goals_against,
            wins: self.wins + f64::from(u8::from(r.is_win())),
            clean_sheets: self.clean_sheets + f64::from(u8::from(r.clean_sheet())),
            failed_to_score: self.failed_to_score + f64::from(u8::from(r.failed_to_score())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RollingFormAggregator {
    windows: Vec<usize>,
}

impl Default for RollingFormAggregator {
    fn default() -> Self {
        Self::new(&DEFAULT_WINDOWS)
    }
}

impl RollingFormAggregator {
    /// Window sizes are sorted and deduplicated; zero is ignored.
    pub fn new(windows: &[usize]) -> Self {
        let mut windows: Vec<usize> = windows.iter().copied().filter(|w| *w > 0).collect();
        windows.sort_unstable();
        windows.dedup();
        if windows.is_empty() {
            windows = DEFAULT_WINDOWS.to_vec();
        }
        Self { windows }
    }

    pub fn windows(&self) -> &[usize] {
        &self.windows
    }

    /// Form for every record, aligned with `records`.
    ///
    /// Only a team's matches on earlier dates contribute, so a second record on
    /// the same day sees the same history as the first.
    pub fn compute(&self, records: &[MatchRecord]) -> Vec<FormFeatures> {
        let mut out = vec![FormFeatures::default(); records.len()];
        for history in team_histories(records).values() {
            let mut prefix = Vec::with_capacity(history.len() + 1);
            prefix.push(Prefix::default());
            for &idx in history {
                let next = prefix[prefix.len() - 1].push(&records[idx]);
                prefix.push(next);
            }

            let mut day_start = 0;
            for (pos, &idx) in history.iter().enumerate() {
                if pos > 0 && records[history[pos - 1]].date != records[idx].date {
                    day_start = pos;
                }
                out[idx] = self.features_at(&prefix, day_start);
            }
        }
        out
    }

    /// `end` is the count of prior matches available.
    fn features_at(&self, prefix: &[Prefix], end: usize) -> FormFeatures {
        let windows: Vec<WindowForm> = self
            .windows
            .iter()
            .map(|&window| {
                let start = end.saturating_sub(window);
                let matches = end - start;
                let (hi, lo) = (prefix[end], prefix[start]);
                let win_rate = if matches == 0 {
                    0.0
                } else {
                    (hi.wins - lo.wins) / matches as f64
                };
                WindowForm {
                    window,
                    matches,
                    points: hi.points - lo.points,
                    goals_for: hi.goals_for - lo.goals_for,
                    goals_against: hi.goals_against - lo.goals_against,
                    win_rate,
                    clean_sheets: hi.clean_sheets - lo.clean_sheets,
                    failed_to_score: hi.failed_to_score - lo.failed_to_score,
                }
            })
            .collect();

        let (points_momentum, goals_momentum) = match (windows.first(), windows.last()) {
            (Some(short), Some(long)) if short.window != long.window => (
                short.points / short.window as f64 - long.points / long.window as f64,
                short.goals_for / short.window as f64 - long.goals_for / long.window as f64,
            ),
            _ => (0.0, 0.0),
        };

        FormFeatures {
            windows,
            points_momentum,
            goals_momentum,
        }
    }
}
