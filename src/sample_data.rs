//! Deterministic synthetic season for demos and benchmarks.
//!
//! A double round robin where each fixture yields two mirrored rows sharing a
//! `match_id`. Goals are Poisson draws from fixed team strengths, so the same
//! seed always produces the same season.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Days, NaiveDate, NaiveTime};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal, Poisson};
use serde::Serialize;

use crate::match_record::{MarketOdds, MatchRecord, MatchResult, StatLine, Venue, Weather};

const TEAMS: [&str; 20] = [
    "Arsenal",
    "Aston Villa",
    "Bournemouth",
    "Brentford",
    "Brighton",
    "Chelsea",
    "Crystal Palace",
    "Everton",
    "Fulham",
    "Liverpool",
    "Luton Town",
    "Manchester City",
    "Manchester United",
    "Newcastle United",
    "Nottingham Forest",
    "Sheffield United",
    "Tottenham Hotspur",
    "West Ham United",
    "Wolverhampton Wanderers",
    "Burnley",
];

const KICKOFFS: [(u32, u32); 4] = [(12, 30), (15, 0), (17, 30), (20, 0)];
const BASE_RATE: f64 = 1.35;
const HOME_EDGE: f64 = 1.15;
const DRAW_SHARE: f64 = 0.26;
const MARGIN: f64 = 1.05;
const SEASON: &str = "2023-2024";

#[derive(Debug, Clone)]
pub struct SampleSeason {
    pub records: Vec<MatchRecord>,
    /// One row per bookmaker quote, two quotes per fixture.
    pub odds: Vec<SampleOdds>,
    pub weather: Vec<SampleWeather>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SampleOdds {
    pub match_id: String,
    pub bookmaker: String,
    pub home_win_odds: f64,
    pub draw_odds: f64,
    pub away_win_odds: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SampleWeather {
    pub match_id: String,
    pub temperature_c: f64,
    pub precipitation_mm: f64,
    pub wind_kph: f64,
    pub humidity: f64,
    pub condition: String,
}

#[derive(Serialize)]
struct MatchCsvRow<'a> {
    date: String,
    time: Option<String>,
    team: &'a str,
    opponent: &'a str,
    venue: &'a str,
    result: &'a str,
    gf: f64,
    ga: f64,
    sh: f64,
    sot: f64,
    dist: Option<f64>,
    fk: Option<f64>,
    pk: Option<f64>,
    pkatt: Option<f64>,
    match_id: Option<&'a str>,
    season: Option<&'a str>,
}

/// Circle-method pairings: `n - 1` rounds of `n / 2` fixtures, `n` even.
fn round_robin(n: usize) -> Vec<Vec<(usize, usize)>> {
    let mut ring: Vec<usize> = (1..n).collect();
    let mut rounds = Vec::with_capacity(n.saturating_sub(1));
    for round in 0..n.saturating_sub(1) {
        let mut slots = Vec::with_capacity(n);
        slots.push(0);
        slots.extend_from_slice(&ring);
        let fixtures = (0..n / 2)
            .map(|i| {
                let (a, b) = (slots[i], slots[n - 1 - i]);
                if (round + i) % 2 == 0 { (a, b) } else { (b, a) }
            })
            .collect();
        rounds.push(fixtures);
        ring.rotate_right(1);
    }
    rounds
}

fn poisson(rate: f64, rng: &mut StdRng) -> f64 {
    match Poisson::new(rate.max(0.05)) {
        Ok(dist) => dist.sample(rng),
        Err(_) => 0.0,
    }
}

fn team_stats(goals: f64, rate: f64, rng: &mut StdRng) -> StatLine {
    let shots = (rate * 7.5 + goals * 1.5 + rng.gen_range(-2.0..2.0_f64)).round().max(goals);
    let on_target = (shots * rng.gen_range(0.28..0.45)).round().clamp(goals, shots);
    let penalty_attempts = f64::from(u8::from(rng.gen_bool(0.12)));
    let penalties = if penalty_attempts > 0.0 && goals > 0.0 && rng.gen_bool(0.8) {
        1.0
    } else {
        0.0
    };
    StatLine {
        goals_for: goals,
        goals_against: 0.0,
        shots,
        shots_on_target: on_target,
        distance: Some((rng.gen_range(14.0..20.0_f64) * 10.0).round() / 10.0),
        free_kicks: Some(f64::from(rng.gen_range(0..4_u8))),
        penalties: Some(penalties),
        penalty_attempts: Some(penalty_attempts),
    }
}

fn fair_odds(home_strength: f64, away_strength: f64) -> [f64; 3] {
    let home = home_strength * HOME_EDGE;
    let p_home = (1.0 - DRAW_SHARE) * home / (home + away_strength);
    let p_away = 1.0 - DRAW_SHARE - p_home;
    [p_home, DRAW_SHARE, p_away].map(|p| 1.0 / (p * MARGIN))
}

impl SampleSeason {
    /// `n_teams` is clamped to an even number between 2 and 20.
    pub fn generate(n_teams: usize, seed: u64) -> Self {
        let n = (n_teams.clamp(2, TEAMS.len()) / 2) * 2;
        let mut rng = StdRng::seed_from_u64(seed);
        let strengths: Vec<f64> = (0..n).map(|_| rng.gen_range(0.7..1.4)).collect();
        let temperature = Normal::new(12.0, 6.0).ok();

        let first = round_robin(n);
        let second: Vec<Vec<(usize, usize)>> = first
            .iter()
            .map(|r| r.iter().map(|&(h, a)| (a, h)).collect())
            .collect();
        let opening_day = NaiveDate::from_ymd_opt(2023, 8, 12).unwrap_or_default();

        let mut season = SampleSeason {
            records: Vec::new(),
            odds: Vec::new(),
            weather: Vec::new(),
        };
        for (round, fixtures) in first.iter().chain(second.iter()).enumerate() {
            let date = opening_day + Days::new(7 * round as u64);
            for (slot, &(h, a)) in fixtures.iter().enumerate() {
                let match_id = format!("r{:02}-{:02}", round + 1, slot + 1);
                let (kh, km) = KICKOFFS[slot % KICKOFFS.len()];
                let kickoff = NaiveTime::from_hms_opt(kh, km, 0);

                let home_rate = BASE_RATE * HOME_EDGE * strengths[h] / strengths[a];
                let away_rate = BASE_RATE * strengths[a] / strengths[h];
                let home_goals = poisson(home_rate, &mut rng);
                let away_goals = poisson(away_rate, &mut rng);
                let mut home_stats = team_stats(home_goals, home_rate, &mut rng);
                let mut away_stats = team_stats(away_goals, away_rate, &mut rng);
                home_stats.goals_against = away_goals;
                away_stats.goals_against = home_goals;

                let [oh, od, oa] = fair_odds(strengths[h], strengths[a]);
                let odds = MarketOdds {
                    home_win: oh,
                    draw: od,
                    away_win: oa,
                };
                for bookmaker in ["alpha", "beta"] {
                    let jitter = rng.gen_range(0.97..1.03);
                    season.odds.push(SampleOdds {
                        match_id: match_id.clone(),
                        bookmaker: bookmaker.to_string(),
                        home_win_odds: oh * jitter,
                        draw_odds: od,
                        away_win_odds: oa / jitter,
                    });
                }

                let rain = if rng.gen_bool(0.3) {
                    rng.gen_range(0.5..8.0)
                } else {
                    0.0
                };
                let weather = Weather {
                    temperature_c: Some(
                        temperature
                            .as_ref()
                            .map(|d| d.sample(&mut rng))
                            .unwrap_or(12.0),
                    ),
                    precipitation_mm: Some(rain),
                    wind_kph: Some(rng.gen_range(5.0..35.0)),
                    humidity: Some(rng.gen_range(50.0..95.0)),
                };
                season.weather.push(SampleWeather {
                    match_id: match_id.clone(),
                    temperature_c: weather.temperature_c.unwrap_or_default(),
                    precipitation_mm: rain,
                    wind_kph: weather.wind_kph.unwrap_or_default(),
                    humidity: weather.humidity.unwrap_or_default(),
                    condition: if rain > 1.0 { "Rain" } else { "Clear" }.to_string(),
                });

                let row = |team: usize, opp: usize, venue: Venue, stats: StatLine| MatchRecord {
                    date,
                    kickoff,
                    team: TEAMS[team].to_string(),
                    opponent: TEAMS[opp].to_string(),
                    venue,
                    result: MatchResult::from_goals(stats.goals_for, stats.goals_against),
                    stats,
                    odds: Some(odds),
                    weather: Some(weather),
                    match_id: Some(match_id.clone()),
                    season: Some(SEASON.to_string()),
                };
                season.records.push(row(h, a, Venue::Home, home_stats));
                season.records.push(row(a, h, Venue::Away, away_stats));
            }
        }
        season
    }

    /// Write `matches.csv`, `odds.csv` and `weather.csv` into `dir`.
    pub fn write_all(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
        write_matches_csv(&dir.join("matches.csv"), &self.records)?;
        write_serialized(&dir.join("odds.csv"), &self.odds)?;
        write_serialized(&dir.join("weather.csv"), &self.weather)?;
        Ok(())
    }
}

fn write_serialized<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut wtr =
        csv::Writer::from_path(path).with_context(|| format!("create {}", path.display()))?;
    for row in rows {
        wtr.serialize(row).context("write csv row")?;
    }
    wtr.flush().context("flush csv")?;
    Ok(())
}

/// Match rows in the ingest layout, one row per team per fixture.
pub fn write_matches_csv(path: &Path, records: &[MatchRecord]) -> Result<()> {
    let rows: Vec<MatchCsvRow<'_>> = records
        .iter()
        .map(|r| MatchCsvRow {
            date: r.date.format("%Y-%m-%d").to_string(),
            time: r.kickoff.map(|t| t.format("%H:%M").to_string()),
            team: &r.team,
            opponent: &r.opponent,
            venue: r.venue.label(),
            result: r.result.label(),
            gf: r.stats.goals_for,
            ga: r.stats.goals_against,
            sh: r.stats.shots,
            sot: r.stats.shots_on_target,
            dist: r.stats.distance,
            fk: r.stats.free_kicks,
            pk: r.stats.penalties,
            pkatt: r.stats.penalty_attempts,
            match_id: r.match_id.as_deref(),
            season: r.season.as_deref(),
        })
        .collect();
    write_serialized(path, &rows)
}
