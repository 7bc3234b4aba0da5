use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::encoding::{CategoricalEncoder, day_code};
use crate::form::RollingFormAggregator;
use crate::ingest::{parse_date, parse_kickoff};
use crate::match_record::{MatchRecord, MatchResult, StatColumn, StatLine, Venue};
use crate::metrics::predicted_label;
use crate::model::TrainedModel;
use crate::model_data::predictor_default;
use crate::team_names::TeamAliases;

pub const KEY_FACTOR_COUNT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Home,
    Away,
}

/// One upcoming match plus the predicted team's recent per-match averages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRequest {
    pub home_team: String,
    pub away_team: String,
    pub match_date: String,
    #[serde(default)]
    pub match_time: Option<String>,
    pub team_to_predict: Side,
    pub goals_for: f64,
    pub goals_against: f64,
    pub shots: f64,
    pub shots_on_target: f64,
    #[serde(default)]
    pub distance: Option<f64>,
    #[serde(default)]
    pub free_kicks: Option<f64>,
    #[serde(default)]
    pub penalties: Option<f64>,
    #[serde(default)]
    pub penalty_attempts: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyFactor {
    pub feature: String,
    pub importance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub team: String,
    pub opponent: String,
    pub win_probability: f64,
    pub prediction: String,
    pub key_factors: Vec<KeyFactor>,
}

pub fn label_for(probability: f64) -> &'static str {
    if predicted_label(probability) == 1 {
        "WIN"
    } else {
        "NOT WIN"
    }
}

impl PredictionRequest {
    fn stat_line(&self) -> StatLine {
        StatLine {
            goals_for: self.goals_for,
            goals_against: self.goals_against,
            shots: self.shots,
            shots_on_target: self.shots_on_target,
            distance: self.distance,
            free_kicks: self.free_kicks,
            penalties: self.penalties,
            penalty_attempts: self.penalty_attempts,
        }
    }
}

/// Predictor values for one request, keyed by column name.
///
/// Codes come from the history's team list (unknown teams get 0). Form columns
/// are computed from the team's matches before the request date.
pub fn request_features(
    request: &PredictionRequest,
    history: &[MatchRecord],
    aliases: &TeamAliases,
    windows: &[usize],
    today: NaiveDate,
) -> (MatchRecord, HashMap<String, f64>) {
    let home = aliases.canonical(&request.home_team);
    let away = aliases.canonical(&request.away_team);
    let (team, opponent, venue) = match request.team_to_predict {
        Side::Home => (home, away, Venue::Home),
        Side::Away => (away, home, Venue::Away),
    };
    let date = parse_date(request.match_date.trim()).unwrap_or_else(|| {
        warn!(raw = %request.match_date, "unparseable match date, using {today}");
        today
    });
    let kickoff = request.match_time.as_deref().and_then(|t| parse_kickoff(t.trim()));

    let stats = request.stat_line();
    let target = MatchRecord {
        date,
        kickoff,
        team: team.clone(),
        opponent: opponent.clone(),
        venue,
        result: MatchResult::from_goals(stats.goals_for, stats.goals_against),
        stats,
        odds: None,
        weather: None,
        match_id: None,
        season: None,
    };

    let encoder = CategoricalEncoder::fit(history);
    let mut values: HashMap<String, f64> = HashMap::new();
    values.insert("team_code".to_string(), encoder.code_or_default(&team));
    values.insert("opp_code".to_string(), encoder.code_or_default(&opponent));
    values.insert("venue_code".to_string(), venue.code());
    values.insert("hour".to_string(), f64::from(target.hour()));
    values.insert("day_code".to_string(), day_code(date));
    for column in StatColumn::ALL {
        if let Some(v) = target.stats.get(column) {
            values.insert(column.rolling_name(), v);
        }
    }

    let mut team_history: Vec<MatchRecord> = history
        .iter()
        .filter(|r| r.team == team && r.date < date)
        .cloned()
        .collect();
    team_history.push(target.clone());
    let last = team_history.len() - 1;
    let form = RollingFormAggregator::new(windows).compute(&team_history);
    let short = RollingFormAggregator::new(&[3]).compute(&team_history);
    values.insert(
        "form_3".to_string(),
        short[last].window(3).map(|w| w.mean_points()).unwrap_or(0.0),
    );
    for (name, v) in form[last].named_values() {
        values.insert(name, v);
    }

    (target, values)
}

pub fn predict_match(
    model: &TrainedModel,
    request: &PredictionRequest,
    history: &[MatchRecord],
    aliases: &TeamAliases,
    windows: &[usize],
    today: NaiveDate,
) -> PredictionResponse {
    let (target, values) = request_features(request, history, aliases, windows, today);
    let row: Vec<f64> = model
        .predictors
        .iter()
        .map(|p| values.get(p).copied().unwrap_or_else(|| predictor_default(p)))
        .collect();
    let win_probability = model
        .predict_proba(std::slice::from_ref(&row))
        .first()
        .map(|p| p[1])
        .unwrap_or(0.5);
    debug!(team = %target.team, opponent = %target.opponent, win_probability, "prediction");

    PredictionResponse {
        team: target.team,
        opponent: target.opponent,
        win_probability,
        prediction: label_for(win_probability).to_string(),
        key_factors: model
            .get_feature_importance()
            .into_iter()
            .take(KEY_FACTOR_COUNT)
            .map(|(feature, importance)| KeyFactor {
                feature,
                importance,
            })
            .collect(),
    }
}
