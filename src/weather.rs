use std::collections::BTreeMap;

use crate::match_record::{MatchRecord, Venue, Weather};

pub const RAIN_MM: f64 = 1.0;
pub const WIND_KPH: f64 = 25.0;
pub const COLD_C: f64 = 5.0;
pub const HOT_C: f64 = 25.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Condition {
    Rainy,
    Windy,
    Cold,
    Hot,
}

impl Condition {
    pub const ALL: [Condition; 4] = [
        Condition::Rainy,
        Condition::Windy,
        Condition::Cold,
        Condition::Hot,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Condition::Rainy => "rain",
            Condition::Windy => "wind",
            Condition::Cold => "cold",
            Condition::Hot => "heat",
        }
    }

    /// `None` when the reading this condition depends on is missing.
    pub fn holds(self, weather: &Weather) -> Option<bool> {
        match self {
            Condition::Rainy => weather.precipitation_mm.map(|v| v > RAIN_MM),
            Condition::Windy => weather.wind_kph.map(|v| v > WIND_KPH),
            Condition::Cold => weather.temperature_c.map(|v| v < COLD_C),
            Condition::Hot => weather.temperature_c.map(|v| v > HOT_C),
        }
    }
}

/// Mean points under a condition minus mean points across all rows with the reading.
/// Unset unless the team has rows both meeting and missing the condition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeatherImpacts {
    impacts: BTreeMap<(Venue, Condition), f64>,
}

impl WeatherImpacts {
    pub fn get(&self, venue: Venue, condition: Condition) -> Option<f64> {
        self.impacts.get(&(venue, condition)).copied()
    }

    pub fn named_values(this: Option<&Self>) -> Vec<(String, Option<f64>)> {
        let mut out = Vec::with_capacity(8);
        for venue in [Venue::Home, Venue::Away] {
            for condition in Condition::ALL {
                let name = format!(
                    "{}_{}_impact",
                    venue.label().to_ascii_lowercase(),
                    condition.key()
                );
                out.push((name, this.and_then(|w| w.get(venue, condition))));
            }
        }
        out
    }
}

#[derive(Default, Clone, Copy)]
struct Sum {
    n: usize,
    points: f64,
}

impl Sum {
    fn add(&mut self, points: f64) {
        self.n += 1;
        self.points += points;
    }

    fn mean(&self) -> Option<f64> {
        (self.n > 0).then(|| self.points / self.n as f64)
    }
}

/// Per-team impacts. Teams without any weather readings are absent from the map.
pub fn weather_impacts(records: &[MatchRecord]) -> BTreeMap<String, WeatherImpacts> {
    // (team, venue, condition) -> (rows with reading, rows where condition holds)
    let mut sums: BTreeMap<(&str, Venue, Condition), (Sum, Sum)> = BTreeMap::new();
    for r in records {
        let Some(weather) = r.weather.as_ref() else {
            continue;
        };
        for condition in Condition::ALL {
            let Some(holds) = condition.holds(weather) else {
                continue;
            };
            let (all, hit) = sums
                .entry((r.team.as_str(), r.venue, condition))
                .or_default();
            all.add(r.points());
            if holds {
                hit.add(r.points());
            }
        }
    }

    let mut out: BTreeMap<String, WeatherImpacts> = BTreeMap::new();
    for ((team, venue, condition), (all, hit)) in sums {
        let entry = out.entry(team.to_string()).or_default();
        // needs rows on both sides of the threshold
        if hit.n == all.n {
            continue;
        }
        if let (Some(cond_mean), Some(base)) = (hit.mean(), all.mean()) {
            entry.impacts.insert((venue, condition), cond_mean - base);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::match_record::fixtures::{date, record};

    fn with_weather(mut r: MatchRecord, temp: f64, rain: f64) -> MatchRecord {
        r.weather = Some(Weather {
            temperature_c: Some(temp),
            precipitation_mm: Some(rain),
            ..Default::default()
        });
        r
    }

    #[test]
    fn thresholds_are_strict() {
        let w = Weather {
            temperature_c: Some(25.0),
            precipitation_mm: Some(1.0),
            wind_kph: Some(25.1),
            humidity: None,
        };
        assert_eq!(Condition::Rainy.holds(&w), Some(false));
        assert_eq!(Condition::Hot.holds(&w), Some(false));
        assert_eq!(Condition::Windy.holds(&w), Some(true));
        assert_eq!(Condition::Cold.holds(&Weather::default()), None);
    }

    #[test]
    fn impact_compares_condition_with_baseline() {
        let records = vec![
            with_weather(record(date(2023, 1, 1), "A", "B", Venue::Home, 0.0, 1.0), 3.0, 5.0),
            with_weather(record(date(2023, 1, 8), "A", "C", Venue::Home, 2.0, 0.0), 12.0, 0.0),
            with_weather(record(date(2023, 1, 15), "A", "D", Venue::Home, 1.0, 0.0), 14.0, 0.0),
        ];
        let impacts = weather_impacts(&records);
        let a = &impacts["A"];
        // rainy mean 0, baseline 2
        assert_eq!(a.get(Venue::Home, Condition::Rainy), Some(-2.0));
        assert_eq!(a.get(Venue::Home, Condition::Cold), Some(-2.0));
        // never hot: unset, not zero
        assert_eq!(a.get(Venue::Home, Condition::Hot), None);
        assert_eq!(a.get(Venue::Away, Condition::Rainy), None);
        assert_eq!(a.get(Venue::Home, Condition::Windy), None);
    }

    #[test]
    fn condition_on_every_row_leaves_impact_unset() {
        let records = vec![
            with_weather(record(date(2023, 1, 1), "A", "B", Venue::Away, 0.0, 1.0), 10.0, 4.0),
            with_weather(record(date(2023, 1, 8), "A", "C", Venue::Away, 2.0, 0.0), 11.0, 6.0),
        ];
        let a = &weather_impacts(&records)["A"];
        assert_eq!(a.get(Venue::Away, Condition::Rainy), None);
        // cold never holds, so there is nothing to compare either
        assert_eq!(a.get(Venue::Away, Condition::Cold), None);
    }

    #[test]
    fn named_values_without_data_are_unset() {
        let values = WeatherImpacts::named_values(None);
        assert_eq!(values.len(), 8);
        assert!(values.iter().all(|(_, v)| v.is_none()));
        assert_eq!(values[0].0, "home_rain_impact");
    }
}
