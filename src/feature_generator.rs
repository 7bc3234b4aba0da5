use std::collections::BTreeMap;

use tracing::debug;

use crate::encoding::{CategoricalEncoder, Encoded};
use crate::form::{FormFeatures, RollingFormAggregator};
use crate::head_to_head::{HeadToHead, HeadToHeadTable};
use crate::market_odds::OddsFeatures;
use crate::match_record::{MatchRecord, team_date_order};
use crate::schedule::{RestProfile, ScheduleFeatures, schedule_features};
use crate::venue_split::{VenueSplit, team_away_win_pct, team_home_win_pct, venue_splits};
use crate::weather::{WeatherImpacts, weather_impacts};

/// A match record with every derived column attached.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub record: MatchRecord,
    pub encoded: Encoded,
    pub form: FormFeatures,
    pub form_3: f64,
    pub goal_diff: f64,
    pub shot_efficiency: f64,
    pub venue: VenueSplit,
    pub team_home_win_pct: f64,
    pub opp_away_win_pct: f64,
    pub head_to_head: HeadToHead,
    pub odds: Option<OddsFeatures>,
    pub weather: Option<WeatherImpacts>,
    pub schedule: ScheduleFeatures,
    pub rest: RestProfile,
}

impl FeatureRow {
    /// Every derived column by name. `None` marks a value that could not be computed.
    pub fn named_values(&self) -> Vec<(String, Option<f64>)> {
        let e = &self.encoded;
        let mut out: Vec<(String, Option<f64>)> = vec![
            ("team_code".to_string(), Some(e.team_code)),
            ("opp_code".to_string(), Some(e.opp_code)),
            ("venue_code".to_string(), Some(e.venue_code)),
            ("hour".to_string(), Some(e.hour)),
            ("day_code".to_string(), Some(e.day_code)),
            ("target".to_string(), Some(f64::from(e.target))),
            ("goal_diff".to_string(), Some(self.goal_diff)),
            ("shot_efficiency".to_string(), Some(self.shot_efficiency)),
            ("form_3".to_string(), Some(self.form_3)),
        ];
        out.extend(
            self.form
                .named_values()
                .into_iter()
                .map(|(k, v)| (k, Some(v))),
        );
        out.extend(self.venue.named_values());
        out.push(("team_home_win_pct".to_string(), Some(self.team_home_win_pct)));
        out.push(("opp_away_win_pct".to_string(), Some(self.opp_away_win_pct)));
        out.extend(
            self.head_to_head
                .named_values()
                .into_iter()
                .map(|(k, v)| (k.to_string(), Some(v))),
        );
        out.extend(
            OddsFeatures::named_values(self.odds.as_ref())
                .into_iter()
                .map(|(k, v)| (k.to_string(), v)),
        );
        out.extend(WeatherImpacts::named_values(self.weather.as_ref()));
        let s = &self.schedule;
        out.push((
            "days_since_last_match".to_string(),
            s.days_since_last_match.map(|d| d as f64),
        ));
        out.push((
            "match_density_30d".to_string(),
            Some(s.match_density_30d as f64),
        ));
        out.push((
            "quick_turnaround".to_string(),
            Some(f64::from(u8::from(s.quick_turnaround))),
        ));
        out.extend(self.rest.named_values());
        out
    }

    /// Columns built only from the team's earlier matches.
    pub fn form_values(&self) -> Vec<(String, f64)> {
        let mut out = vec![("form_3".to_string(), self.form_3)];
        out.extend(self.form.named_values());
        out
    }

    pub fn value(&self, name: &str) -> Option<f64> {
        self.named_values()
            .into_iter()
            .find(|(k, _)| k == name)
            .and_then(|(_, v)| v)
    }
}

#[derive(Debug, Clone, Default)]
pub struct FeatureGenerator {
    aggregator: RollingFormAggregator,
}

impl FeatureGenerator {
    pub fn new(windows: &[usize]) -> Self {
        Self {
            aggregator: RollingFormAggregator::new(windows),
        }
    }

    pub fn windows(&self) -> &[usize] {
        self.aggregator.windows()
    }

    /// Rows come back ordered by team then date. The input is not modified.
    pub fn generate(&self, records: &[MatchRecord]) -> Vec<FeatureRow> {
        let encoder = CategoricalEncoder::fit(records);
        let form = self.aggregator.compute(records);
        let short_form = RollingFormAggregator::new(&[3]).compute(records);
        let splits = venue_splits(records);
        let h2h = HeadToHeadTable::build(records);
        let weather: BTreeMap<String, WeatherImpacts> = weather_impacts(records);
        let schedule = schedule_features(records);

        debug!(
            rows = records.len(),
            teams = splits.len(),
            pairs = h2h.len(),
            "generating features"
        );

        team_date_order(records)
            .into_iter()
            .map(|idx| {
                let r = &records[idx];
                let form_3 = short_form[idx]
                    .window(3)
                    .map(|w| w.mean_points())
                    .unwrap_or(0.0);
                FeatureRow {
                    record: r.clone(),
                    encoded: encoder.encode(r),
                    form: form[idx].clone(),
                    form_3,
                    goal_diff: r.stats.goals_for - r.stats.goals_against,
                    shot_efficiency: r.stats.shots_on_target / r.stats.shots.max(1.0),
                    venue: splits.get(&r.team).copied().unwrap_or_default(),
                    team_home_win_pct: team_home_win_pct(&splits, &r.team),
                    opp_away_win_pct: team_away_win_pct(&splits, &r.opponent),
                    head_to_head: h2h.get(&r.team, &r.opponent),
                    odds: OddsFeatures::for_record(r),
                    weather: weather.get(&r.team).cloned(),
                    schedule: schedule.rows[idx],
                    rest: schedule.rest.get(&r.team).copied().unwrap_or_default(),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::match_record::Venue;
    use crate::match_record::fixtures::{date, record};

    #[test]
    fn rows_sorted_and_complete() {
        let records = vec![
            record(date(2023, 1, 8), "B", "A", Venue::Home, 0.0, 1.0),
            record(date(2023, 1, 8), "A", "B", Venue::Away, 1.0, 0.0),
            record(date(2023, 1, 1), "A", "C", Venue::Home, 2.0, 2.0),
        ];
        let rows = FeatureGenerator::default().generate(&records);
        let order: Vec<(&str, u32)> = rows
            .iter()
            .map(|r| (r.record.team.as_str(), chrono::Datelike::day(&r.record.date)))
            .collect();
        assert_eq!(order, vec![("A", 1), ("A", 8), ("B", 8)]);
        assert_eq!(rows[1].form_3, 1.0);
        assert_eq!(rows[1].value("points_last_3"), Some(1.0));
        assert_eq!(rows[0].value("days_since_last_match"), None);
        assert_eq!(rows[1].value("days_since_last_match"), Some(7.0));
        assert_eq!(rows[0].value("h2h_win_rate"), Some(0.0));
        assert_eq!(rows[0].value("win_surprise"), None);
    }

    #[test]
    fn named_columns_are_stable_across_rows() {
        let records = vec![
            record(date(2023, 1, 1), "A", "B", Venue::Home, 1.0, 0.0),
            record(date(2023, 1, 1), "B", "A", Venue::Away, 0.0, 1.0),
        ];
        let rows = FeatureGenerator::new(&[2, 4]).generate(&records);
        let names = |r: &FeatureRow| -> Vec<String> {
            r.named_values().into_iter().map(|(k, _)| k).collect()
        };
        assert_eq!(names(&rows[0]), names(&rows[1]));
        assert!(names(&rows[0]).contains(&"goals_for_last_4".to_string()));
        assert_eq!(rows[0].shot_efficiency, 0.4);
    }
}
