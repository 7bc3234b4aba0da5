use crate::match_record::{MarketOdds, MatchRecord, Venue};

const XG_WEIGHTS: [f64; 3] = [1.5, 0.9, 0.6];

/// Overround-free probabilities for home win, draw, away win.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImpliedProbabilities {
    pub home_win: f64,
    pub draw: f64,
    pub away_win: f64,
}

impl ImpliedProbabilities {
    pub fn from_odds(odds: &MarketOdds) -> Self {
        let raw = [1.0 / odds.home_win, 1.0 / odds.draw, 1.0 / odds.away_win];
        let total: f64 = raw.iter().sum();
        Self {
            home_win: raw[0] / total,
            draw: raw[1] / total,
            away_win: raw[2] / total,
        }
    }

    /// Sum of raw implied probabilities minus one.
    pub fn overround(odds: &MarketOdds) -> f64 {
        1.0 / odds.home_win + 1.0 / odds.draw + 1.0 / odds.away_win - 1.0
    }

    /// Fixed linear proxy, not a calibrated goals model.
    pub fn expected_goals(&self) -> f64 {
        XG_WEIGHTS[0] * self.home_win + XG_WEIGHTS[1] * self.draw + XG_WEIGHTS[2] * self.away_win
    }

    pub fn win_probability_for(&self, venue: Venue) -> f64 {
        match venue {
            Venue::Home => self.home_win,
            Venue::Away => self.away_win,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OddsFeatures {
    pub implied: ImpliedProbabilities,
    pub expected_goals: f64,
    pub win_surprise: f64,
}

impl OddsFeatures {
    pub fn for_record(record: &MatchRecord) -> Option<Self> {
        let odds = record.odds.as_ref()?;
        let implied = ImpliedProbabilities::from_odds(odds);
        let won = f64::from(u8::from(record.is_win()));
        Some(Self {
            implied,
            expected_goals: implied.expected_goals(),
            win_surprise: won - implied.win_probability_for(record.venue),
        })
    }

    pub fn named_values(this: Option<&Self>) -> [(&'static str, Option<f64>); 5] {
        [
            ("implied_home_prob", this.map(|o| o.implied.home_win)),
            ("implied_draw_prob", this.map(|o| o.implied.draw)),
            ("implied_away_prob", this.map(|o| o.implied.away_win)),
            ("market_expected_goals", this.map(|o| o.expected_goals)),
            ("win_surprise", this.map(|o| o.win_surprise)),
        ]
    }
}
